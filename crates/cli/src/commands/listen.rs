//! `mathtutor listen` — Take one spoken question and answer it.

use mathtutor_media::listener_from_config;

use super::session::TutorSession;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let session = TutorSession::open()?;
    let listener = listener_from_config(&session.config.speech);

    eprintln!("  Listening...");
    let transcript = listener.listen().await?;
    if transcript.is_empty() {
        return Err("No speech detected.".into());
    }
    eprintln!("  Heard: {transcript}");

    session.ask(&transcript).await;
    Ok(())
}
