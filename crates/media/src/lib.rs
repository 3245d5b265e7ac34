//! Media adapters for MathTutor: a terminal plotter, speech through
//! external synthesizer/recognizer programs, and Tesseract OCR.

pub mod chart;
pub mod ocr;
mod process;
pub mod speech;

pub use chart::AsciiPlotter;
pub use ocr::TesseractRecognizer;
pub use speech::{
    CommandListener, CommandSpeaker, NoSpeechInput, SilentSpeaker, listener_from_config,
    speaker_from_config,
};
