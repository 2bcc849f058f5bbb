//! Run configuration: acquisition channel, voltage range, block geometry,
//! initial threshold and where the latest value is persisted. Loaded from JSON
//! with every field optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GateError, Result};

// =============================================================================
// RUN CONFIGURATION
// =============================================================================

const DEFAULT_PHYSICAL_CHANNEL: &str = "Dev1/ai0";
const DEFAULT_MIN_VOLTAGE: f64 = -1.0;
const DEFAULT_MAX_VOLTAGE: f64 = 10.0;
const DEFAULT_SAMPLE_RATE: f64 = 10_000.0;
const DEFAULT_BLOCK_SIZE: usize = 1000;
// Blocks buffered between acquisition and the worker.
const DEFAULT_QUEUE_DEPTH: usize = 10;
const DEFAULT_PERSIST_FILE: &str = "daqgate_latest.txt";

/// Everything a run needs, fixed from `start()` until the run ends.
///
/// The channel and voltage range are only consumed by the acquisition
/// source; the gate math only sees the block size and sample rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub physical_channel: String,
    pub min_voltage: f64,
    pub max_voltage: f64,
    /// Hz.
    pub sample_rate: f64,
    /// Samples per block (N).
    pub block_size: usize,
    /// Initial threshold, compared against `1/sqrt(N)`-scaled bin magnitudes.
    pub threshold: f64,
    pub queue_depth: usize,
    pub persist_path: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            physical_channel: DEFAULT_PHYSICAL_CHANNEL.to_string(),
            min_voltage: DEFAULT_MIN_VOLTAGE,
            max_voltage: DEFAULT_MAX_VOLTAGE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            threshold: 0.0,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            persist_path: std::env::temp_dir().join(DEFAULT_PERSIST_FILE),
        }
    }
}

impl RunConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(GateError::Configuration(
                "block size must be greater than zero".into(),
            ));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(GateError::Configuration(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if !(self.min_voltage < self.max_voltage) {
            return Err(GateError::Configuration(format!(
                "voltage range [{}, {}] is empty",
                self.min_voltage, self.max_voltage
            )));
        }
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(GateError::Configuration(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        if self.queue_depth == 0 {
            return Err(GateError::Configuration(
                "queue depth must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Channel number from the trailing `ai<k>` of the physical channel,
    /// e.g. `Dev1/ai3` -> 3.
    pub fn channel_index(&self) -> Result<usize> {
        let name = self
            .physical_channel
            .rsplit('/')
            .next()
            .unwrap_or(&self.physical_channel);
        name.strip_prefix("ai")
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| {
                GateError::Configuration(format!(
                    "unrecognized physical channel '{}'",
                    self.physical_channel
                ))
            })
    }

    /// Wall-clock length of one block.
    pub fn block_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.block_size as f64 / self.sample_rate)
    }
}
