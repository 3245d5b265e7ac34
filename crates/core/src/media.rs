//! Presentation-side collaborators: plotting, speech and OCR.
//!
//! The pipeline only needs to hand a sampled series to a plotter; the
//! shells use speech and OCR to turn audio or images into questions and
//! to read answers aloud.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MediaError;

/// The x range a function is sampled over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotDomain {
    pub x_min: f64,
    pub x_max: f64,
    pub step: f64,
}

impl Default for PlotDomain {
    fn default() -> Self {
        Self {
            x_min: -10.0,
            x_max: 10.0,
            step: 0.2,
        }
    }
}

impl PlotDomain {
    /// Number of samples, endpoints included.
    pub fn sample_count(&self) -> usize {
        if self.step <= 0.0 || self.x_max < self.x_min {
            return 0;
        }
        // Small epsilon so 20 / 0.2 lands on 100, not 99.999…
        ((self.x_max - self.x_min) / self.step + 1e-9).floor() as usize + 1
    }

    /// The x values, computed by index to avoid accumulated drift.
    pub fn xs(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.sample_count()).map(move |i| self.x_min + i as f64 * self.step)
    }
}

/// One sampled point. `y` is `None` where the function is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    pub x: f64,
    pub y: Option<f64>,
}

/// A sampled function ready for charting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSeries {
    /// The expression as the user typed it (chart label)
    pub label: String,
    pub domain: PlotDomain,
    pub points: Vec<PlotPoint>,
}

impl PlotSeries {
    /// Points with a defined y value.
    pub fn defined(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.iter().filter_map(|p| p.y.map(|y| (p.x, y)))
    }
}

/// Draws (or records) a sampled series.
pub trait Plotter: Send + Sync {
    fn plot(&self, series: &PlotSeries) -> Result<(), MediaError>;
}

/// A plotter that draws nothing; callers read the series from the answer.
pub struct NullPlotter;

impl Plotter for NullPlotter {
    fn plot(&self, _series: &PlotSeries) -> Result<(), MediaError> {
        Ok(())
    }
}

/// Reads text aloud. At most one utterance is active at a time: a new
/// call cancels whatever is still being spoken.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), MediaError>;
}

/// Single-shot speech recognition yielding one transcript.
#[async_trait]
pub trait SpeechInput: Send + Sync {
    async fn listen(&self) -> Result<String, MediaError>;
}

/// Optical character recognition over an encoded image.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<String, MediaError>;
}
