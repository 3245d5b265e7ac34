//! `mathtutor plot` — Plot a function of x in the terminal.

use super::session::TutorSession;

pub async fn run(expression: String) -> Result<(), Box<dyn std::error::Error>> {
    let session = TutorSession::open()?;
    session.ask(&format!("plot {expression}")).await;
    Ok(())
}
