//! `mathtutor ocr` — Recognize a question in an image and answer it.

use std::path::PathBuf;

use mathtutor_core::media::TextRecognizer;
use mathtutor_media::TesseractRecognizer;

use super::session::TutorSession;

pub async fn run(image: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let session = TutorSession::open()?;
    let bytes = tokio::fs::read(&image)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", image.display()))?;

    let recognizer = TesseractRecognizer::from_config(&session.config.ocr);
    let question = recognizer
        .recognize(&bytes)
        .await
        .map_err(|e| format!("OCR failed: {e}"))?;
    if question.is_empty() {
        return Err("No text found in the image.".into());
    }
    eprintln!("  Recognized: {question}");

    session.ask(&question).await;
    Ok(())
}
