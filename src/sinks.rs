//! Output collaborators: the plot surface and the latest-value store.

use log::{debug, trace};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::dsp::PlotPoint;
use crate::error::{GateError, Result};

pub const SPECTRUM_SERIES: &str = "spectrum";
pub const ROLLING_SERIES: &str = "rolling_rms";

/// Receives both plotted series once per block. Each call replaces whatever
/// was drawn before.
pub trait PlotSink: Send {
    fn render(&mut self, spectrum: &[PlotPoint], rolling: &[PlotPoint]) -> Result<()>;
}

/// Keeps exactly one scalar, overwritten on every block.
pub trait ScalarSink: Send {
    fn store(&mut self, value: f64) -> Result<()>;
}

/// Writes the value as plain decimal text, replacing the file contents.
#[derive(Debug, Clone)]
pub struct FileScalarSink {
    path: PathBuf,
}

impl FileScalarSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScalarSink for FileScalarSink {
    fn store(&mut self, value: f64) -> Result<()> {
        std::fs::write(&self.path, value.to_string()).map_err(GateError::Persistence)
    }
}

#[derive(Serialize)]
struct PlotSnapshot<'a> {
    spectrum: &'a [PlotPoint],
    rolling_rms: &'a [PlotPoint],
}

/// Dumps both series to a JSON file, rewritten every block.
#[derive(Debug, Clone)]
pub struct JsonPlotSink {
    path: PathBuf,
}

impl JsonPlotSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PlotSink for JsonPlotSink {
    fn render(&mut self, spectrum: &[PlotPoint], rolling: &[PlotPoint]) -> Result<()> {
        let snapshot = PlotSnapshot {
            spectrum,
            rolling_rms: rolling,
        };
        let json = serde_json::to_vec(&snapshot).map_err(|e| GateError::Render(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| {
            GateError::Render(format!("{}: {}", self.path.display(), e))
        })
    }
}

/// Logs a one-line summary per block instead of drawing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPlotSink;

impl PlotSink for LogPlotSink {
    fn render(&mut self, spectrum: &[PlotPoint], rolling: &[PlotPoint]) -> Result<()> {
        let peak = spectrum
            .iter()
            .copied()
            .max_by(|a, b| a.y.total_cmp(&b.y));
        match (peak, rolling.last()) {
            (Some(peak), Some(latest)) => debug!(
                "{SPECTRUM_SERIES}: peak {:.6} at {:.2} Hz, {ROLLING_SERIES}: {:.6} ({} points)",
                peak.y,
                peak.x,
                latest.y,
                rolling.len()
            ),
            _ => trace!("empty plot frame"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_scalar_sink_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.txt");
        let mut sink = FileScalarSink::new(&path);

        sink.store(0.123456789).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0.123456789");

        sink.store(2.5).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2.5");
        assert_eq!(sink.path(), path.as_path());
    }

    #[test]
    fn test_file_scalar_sink_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileScalarSink::new(dir.path().join("missing").join("latest.txt"));
        let err = sink.store(1.0).unwrap_err();
        assert!(matches!(err, GateError::Persistence(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_json_plot_sink_replaces_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.json");
        let mut sink = JsonPlotSink::new(&path);

        sink.render(
            &[PlotPoint::new(1.0, 0.5), PlotPoint::new(2.0, 0.25)],
            &[PlotPoint::new(0.5, 0.7)],
        )
        .unwrap();
        sink.render(&[PlotPoint::new(1.0, 0.1)], &[]).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[SPECTRUM_SERIES].as_array().unwrap().len(), 1);
        assert_eq!(value[SPECTRUM_SERIES][0]["y"], 0.1);
        assert!(value[ROLLING_SERIES].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_log_plot_sink_accepts_empty() {
        let mut sink = LogPlotSink;
        assert!(sink.render(&[], &[]).is_ok());
        assert!(sink
            .render(&[PlotPoint::new(10.0, 0.3)], &[PlotPoint::new(0.5, 0.2)])
            .is_ok());
    }
}
