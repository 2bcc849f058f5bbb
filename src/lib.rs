//! Block-based spectral noise gate for continuous voltage acquisition.
//!
//! Each acquired block goes through the same pipeline:
//! forward FFT → per-bin magnitude gate → inverse FFT → mean-abs / RMS
//! reduction → rolling RMS history. The two plot series and the latest
//! mean-abs value are handed to the output sinks once per block.
//!
//! [`StreamController`] wires an [`AcquisitionSource`] to a
//! [`BlockProcessor`] and the [`PlotSink`] / [`ScalarSink`] pair, with all
//! blocks of a run processed one at a time on a dedicated worker.

pub mod acquisition;
pub mod config;
pub mod controller;
pub mod dsp;
pub mod error;
mod meters;
pub mod processor;
pub mod sinks;
pub mod threshold;

pub use acquisition::{AcquisitionSource, BlockDelivery, WavFileSource};
pub use config::RunConfig;
pub use controller::{RunState, StreamController};
pub use dsp::{BlockStats, GatedBlock, PlotPoint, RollingStatistics, SpectralGate, WINDOW_CAPACITY};
pub use error::{GateError, Result};
pub use meters::StreamMeters;
pub use processor::{BlockOutput, BlockProcessor};
pub use sinks::{FileScalarSink, JsonPlotSink, LogPlotSink, PlotSink, ScalarSink};
pub use threshold::{raw_label, threshold_from_raw, SharedThreshold};
