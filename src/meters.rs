//! Thread-safe metering for the block stream.
//!
//! Counters and last-value gauges are plain atomics so the acquisition side,
//! the processing worker and any observer can touch them without locks.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-run stream counters plus the latest block statistics.
#[derive(Debug, Default)]
pub struct StreamMeters {
    blocks_received: AtomicU64,
    blocks_dropped: AtomicU64,
    blocks_processed: AtomicU64,
    blocks_failed: AtomicU64,
    blocks_discarded: AtomicU64,
    persistence_failures: AtomicU64,
    render_failures: AtomicU64,
    last_mean_abs: AtomicU64,
    last_rms: AtomicU64,
}

impl StreamMeters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.blocks_received.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_dropped(&self) {
        self.blocks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self, mean_abs: f64, rms: f64) {
        self.last_mean_abs
            .store(mean_abs.to_bits(), Ordering::Relaxed);
        self.last_rms.store(rms.to_bits(), Ordering::Relaxed);
        self.blocks_processed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_failed(&self) {
        self.blocks_failed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_discarded(&self) {
        self.blocks_discarded.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_render_failure(&self) {
        self.render_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_blocks_received(&self) -> u64 {
        self.blocks_received.load(Ordering::Acquire)
    }

    pub fn get_blocks_dropped(&self) -> u64 {
        self.blocks_dropped.load(Ordering::Relaxed)
    }

    pub fn get_blocks_processed(&self) -> u64 {
        self.blocks_processed.load(Ordering::Acquire)
    }

    pub fn get_blocks_failed(&self) -> u64 {
        self.blocks_failed.load(Ordering::Acquire)
    }

    pub fn get_blocks_discarded(&self) -> u64 {
        self.blocks_discarded.load(Ordering::Acquire)
    }

    pub fn get_persistence_failures(&self) -> u64 {
        self.persistence_failures.load(Ordering::Relaxed)
    }

    pub fn get_render_failures(&self) -> u64 {
        self.render_failures.load(Ordering::Relaxed)
    }

    pub fn get_last_mean_abs(&self) -> f64 {
        f64::from_bits(self.last_mean_abs.load(Ordering::Relaxed))
    }

    pub fn get_last_rms(&self) -> f64 {
        f64::from_bits(self.last_rms.load(Ordering::Relaxed))
    }

    /// True once every received block has been processed, failed or
    /// discarded.
    pub fn is_settled(&self) -> bool {
        let handled =
            self.get_blocks_processed() + self.get_blocks_failed() + self.get_blocks_discarded();
        handled >= self.get_blocks_received()
    }
}
