//! `mathtutor load` — Load the language model and report progress.
//!
//! With the local backend this downloads and caches the weights, so later
//! sessions start faster.

use mathtutor_tutor::LoadOutcome;

use super::session::TutorSession;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let session = TutorSession::open()?;
    match session.load_model().await {
        LoadOutcome::Failed(message) => Err(message.into()),
        _ => Ok(()),
    }
}
