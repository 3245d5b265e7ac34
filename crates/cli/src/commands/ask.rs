//! `mathtutor ask` — Answer a single question.

use super::session::TutorSession;

pub async fn run(question: String, speak: bool, load: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = TutorSession::open()?;
    if speak {
        session = session.with_speech();
    }

    if load || session.config.model.autoload {
        session.load_model().await;
    }

    session.ask(&question).await;
    Ok(())
}
