//! Text recognition through the Tesseract command-line tool.

use async_trait::async_trait;
use mathtutor_config::OcrConfig;
use mathtutor_core::error::MediaError;
use mathtutor_core::media::TextRecognizer;
use tracing::info;

use crate::process::run_capture;

/// Runs `tesseract stdin stdout -l <language>` with the image on stdin.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    command: String,
    language: String,
}

impl TesseractRecognizer {
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(&config.command, &config.language)
    }

    fn args(&self) -> Vec<String> {
        vec![
            "stdin".into(),
            "stdout".into(),
            "-l".into(),
            self.language.clone(),
        ]
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, image: &[u8]) -> Result<String, MediaError> {
        if image.is_empty() {
            return Err(MediaError::Recognition("image is empty".into()));
        }
        let text = run_capture(&self.command, &self.args(), Some(image)).await?;
        let text = text.trim().to_string();
        info!(chars = text.len(), "Recognized text from image");
        Ok(text)
    }
}
