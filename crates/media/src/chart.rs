//! Terminal line chart for a sampled function.

use std::io::Write;

use mathtutor_config::PlotConfig;
use mathtutor_core::error::MediaError;
use mathtutor_core::media::{PlotSeries, Plotter};

/// Draws a [`PlotSeries`] as a character grid on stdout.
#[derive(Debug, Clone, Copy)]
pub struct AsciiPlotter {
    width: usize,
    height: usize,
}

impl Default for AsciiPlotter {
    fn default() -> Self {
        Self::new(72, 20)
    }
}

impl AsciiPlotter {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.max(8),
            height: height.max(4),
        }
    }

    pub fn from_config(config: &PlotConfig) -> Self {
        Self::new(config.width, config.height)
    }

    /// The chart as text: a title line, the grid with the y range on the
    /// first and last rows, and the x range underneath.
    pub fn render(&self, series: &PlotSeries) -> Result<String, MediaError> {
        let defined: Vec<(f64, f64)> = series.defined().collect();
        if defined.is_empty() {
            return Err(MediaError::Plot(format!(
                "{} has no real values on [{}, {}]",
                series.label, series.domain.x_min, series.domain.x_max
            )));
        }

        let (x_min, x_max) = (series.domain.x_min, series.domain.x_max);
        let (mut y_min, mut y_max) = defined
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| {
                (lo.min(y), hi.max(y))
            });
        if (y_max - y_min).abs() < f64::EPSILON {
            y_min -= 1.0;
            y_max += 1.0;
        }

        let column = |x: f64| {
            let t = (x - x_min) / (x_max - x_min);
            ((t * (self.width - 1) as f64).round() as usize).min(self.width - 1)
        };
        let row = |y: f64| {
            let t = (y_max - y) / (y_max - y_min);
            ((t * (self.height - 1) as f64).round() as usize).min(self.height - 1)
        };

        let mut grid = vec![vec![' '; self.width]; self.height];
        if y_min < 0.0 && y_max > 0.0 {
            grid[row(0.0)].fill('-');
        }
        if x_min < 0.0 && x_max > 0.0 {
            let c = column(0.0);
            for line in grid.iter_mut() {
                line[c] = '|';
            }
        }
        for &(x, y) in &defined {
            grid[row(y)][column(x)] = '*';
        }

        let y_labels = [format!("{y_max:.2}"), format!("{y_min:.2}")];
        let gutter = y_labels.iter().map(String::len).max().unwrap_or(0);

        let mut out = format!("y = {}\n", series.label);
        for (i, line) in grid.iter().enumerate() {
            let label = match i {
                0 => y_labels[0].as_str(),
                i if i == self.height - 1 => y_labels[1].as_str(),
                _ => "",
            };
            let line: String = line.iter().collect();
            out.push_str(&format!("{label:>gutter$} {}\n", line.trim_end()));
        }
        let x_left = format!("{x_min}");
        let x_right = format!("{x_max}");
        let pad = self.width.saturating_sub(x_left.len() + x_right.len());
        out.push_str(&format!("{:gutter$} {x_left}{:pad$}{x_right}\n", "", ""));
        Ok(out)
    }
}

impl Plotter for AsciiPlotter {
    fn plot(&self, series: &PlotSeries) -> Result<(), MediaError> {
        let chart = self.render(series)?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(chart.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}
