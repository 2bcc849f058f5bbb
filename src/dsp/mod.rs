pub mod rolling;
pub mod spectral_gate;
pub mod utils;

pub use rolling::{BlockStats, RollingStatistics, WINDOW_CAPACITY};
pub use spectral_gate::{GatedBlock, SpectralGate};

use serde::Serialize;

/// One `(x, y)` point of a plotted series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
}

impl PlotPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
