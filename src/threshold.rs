//! Threshold control: the raw slider value, its linear mapping into magnitude
//! units, and the atomic cell the processing worker reads once per block.

use std::sync::atomic::{AtomicU64, Ordering};

/// Top of the raw control range.
pub const RAW_MAX: u32 = 200;
/// Raw units per magnitude unit.
pub const RAW_SCALE: f64 = 1000.0;

/// Maps a raw control value (0..=200) to a threshold. Values past the end of
/// the range clamp to it.
pub fn threshold_from_raw(raw: u32) -> f64 {
    raw.min(RAW_MAX) as f64 / RAW_SCALE
}

/// Display label for a raw control position.
pub fn raw_label(raw: u32) -> String {
    raw.min(RAW_MAX).to_string()
}

/// Lock-free threshold shared between control and processing threads.
#[derive(Debug, Default)]
pub struct SharedThreshold {
    bits: AtomicU64,
}

impl SharedThreshold {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}
