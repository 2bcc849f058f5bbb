//! Rolling block statistics.
//!
//! Each block is reduced to a mean-absolute and an RMS value; the RMS values
//! are kept in a bounded FIFO so the plot shows the most recent history.

use ringbuf::{Consumer, Producer, RingBuffer};

use crate::dsp::utils::{frame_mean_abs, frame_rms};
use crate::dsp::PlotPoint;

/// Number of block values kept in the history window.
pub const WINDOW_CAPACITY: usize = 200;

/// Time-domain reduction of one block.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BlockStats {
    pub mean_abs: f64,
    pub rms: f64,
}

/// Bounded history of per-block values. Oldest value is evicted first.
pub struct RollingStatistics {
    producer: Producer<f64>,
    consumer: Consumer<f64>,
}

impl Default for RollingStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingStatistics {
    pub fn new() -> Self {
        Self::with_capacity(WINDOW_CAPACITY)
    }

    fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        let (producer, consumer) = RingBuffer::<f64>::new(capacity).split();
        Self { producer, consumer }
    }

    /// Mean of `|x|` and root of the mean of `x²`. An empty block reduces to
    /// zeros.
    pub fn reduce(block: &[f64]) -> BlockStats {
        BlockStats {
            mean_abs: frame_mean_abs(block),
            rms: frame_rms(block),
        }
    }

    pub fn append(&mut self, value: f64) {
        if self.producer.is_full() {
            let _ = self.consumer.pop();
        }
        let _ = self.producer.push(value);
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.consumer.capacity()
    }

    /// Window contents, oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.consumer.iter().copied()
    }

    /// Plot points for the current window. Point `i` of `m` sits at
    /// `x = ((i + 1) / m) / 2`, so the series always spans (0, 0.5] no matter
    /// how full the window is. Display axis only, not elapsed time.
    pub fn points(&self) -> impl Iterator<Item = PlotPoint> + '_ {
        let m = self.len() as f64;
        self.consumer
            .iter()
            .enumerate()
            .map(move |(i, &v)| PlotPoint::new(((i as f64 + 1.0) / m) / 2.0, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce() {
        let stats = RollingStatistics::reduce(&[3.0, -4.0]);
        assert!((stats.mean_abs - 3.5).abs() < 1e-12);
        assert!((stats.rms - 12.5f64.sqrt()).abs() < 1e-12);

        let silent = RollingStatistics::reduce(&[0.0; 16]);
        assert_eq!(silent, BlockStats::default());

        assert_eq!(RollingStatistics::reduce(&[]), BlockStats::default());
    }

    #[test]
    fn test_reduce_non_negative() {
        let blocks: [&[f64]; 3] = [&[-1.0, -2.0, -3.0], &[1e-3, -1e-3], &[0.0, 0.0, 1e-9]];
        for block in blocks {
            let stats = RollingStatistics::reduce(block);
            assert!(stats.mean_abs >= 0.0);
            assert!(stats.rms > 0.0);
        }
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = RollingStatistics::new();
        assert_eq!(window.capacity(), WINDOW_CAPACITY);
        for v in 0..=200 {
            window.append(v as f64);
            assert!(window.len() <= WINDOW_CAPACITY);
        }
        let values: Vec<f64> = window.values().collect();
        let expected: Vec<f64> = (1..=200).map(|v| v as f64).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_points_normalized_axis() {
        let mut window = RollingStatistics::new();
        for v in [0.1, 0.2, 0.3, 0.4] {
            window.append(v);
        }
        let points: Vec<PlotPoint> = window.points().collect();
        let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
        assert_eq!(xs, vec![0.125, 0.25, 0.375, 0.5]);
        assert_eq!(ys, vec![0.1, 0.2, 0.3, 0.4]);

        // Restartable: a second read sees the same contents, then the update.
        assert_eq!(window.points().count(), 4);
        window.append(0.5);
        let last = window.points().last().unwrap();
        assert_eq!(last, PlotPoint::new(0.5, 0.5));
        assert_eq!(window.points().next().unwrap().x, 0.1);
    }

    #[test]
    fn test_small_capacity() {
        let mut window = RollingStatistics::with_capacity(2);
        window.append(1.0);
        window.append(2.0);
        window.append(3.0);
        assert_eq!(window.values().collect::<Vec<_>>(), vec![2.0, 3.0]);
    }
}
