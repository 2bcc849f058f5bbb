//! Per-block pipeline: spectral gate, then rolling statistics on the gated
//! signal.

use crate::dsp::{BlockStats, PlotPoint, RollingStatistics, SpectralGate};
use crate::error::Result;

/// Everything produced for one block. Either all of it exists or the block
/// failed; there is no partial output.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOutput {
    /// `(frequency Hz, magnitude)` for bins `1..N`.
    pub spectrum: Vec<PlotPoint>,
    /// Rolling RMS history after this block was appended.
    pub rolling: Vec<PlotPoint>,
    pub stats: BlockStats,
    /// Scalar handed to persistence (the gated block's mean absolute value).
    pub persisted: f64,
}

pub struct BlockProcessor {
    gate: SpectralGate,
    history: RollingStatistics,
}

impl BlockProcessor {
    pub fn new(block_size: usize) -> Result<Self> {
        Ok(Self {
            gate: SpectralGate::new(block_size)?,
            history: RollingStatistics::new(),
        })
    }

    pub fn block_size(&self) -> usize {
        self.gate.block_size()
    }

    pub fn history(&self) -> &RollingStatistics {
        &self.history
    }

    pub fn process(
        &mut self,
        block: &[f64],
        threshold: f64,
        sample_rate: f64,
    ) -> Result<BlockOutput> {
        // Nothing below can fail, so the window is only touched on success.
        let gated = self.gate.gate(block, threshold)?;
        let spectrum = gated.spectrum_points(sample_rate).collect();

        let stats = RollingStatistics::reduce(&gated.samples);
        self.history.append(stats.rms);
        let rolling = self.history.points().collect();

        Ok(BlockOutput {
            spectrum,
            rolling,
            stats,
            persisted: stats.mean_abs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateError;

    const REFERENCE: [f64; 8] = [1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0, 0.0];

    #[test]
    fn test_reference_block_end_to_end() {
        let mut proc = BlockProcessor::new(8).unwrap();
        let out = proc.process(&REFERENCE, 0.0, 8.0).unwrap();

        assert_eq!(out.spectrum.len(), 7);
        assert!((out.stats.rms - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);
        assert!((out.stats.mean_abs - 0.5).abs() < 1e-9);
        assert_eq!(out.persisted, out.stats.mean_abs);

        assert_eq!(out.rolling.len(), 1);
        assert_eq!(out.rolling[0].x, 0.5);
        assert_eq!(out.rolling[0].y, out.stats.rms);
    }

    #[test]
    fn test_statistics_use_gated_block() {
        // Constant offset plus a tone; a high threshold strips the tone.
        let block: Vec<f64> = REFERENCE.iter().map(|v| v + 2.0).collect();
        let mut proc = BlockProcessor::new(8).unwrap();
        let out = proc.process(&block, 5.0, 8.0).unwrap();
        assert!((out.stats.mean_abs - 2.0).abs() < 1e-9);
        assert!((out.stats.rms - 2.0).abs() < 1e-9);

        let raw = RollingStatistics::reduce(&block);
        assert!((raw.rms - out.stats.rms).abs() > 0.05);
    }

    #[test]
    fn test_history_accumulates() {
        let mut proc = BlockProcessor::new(8).unwrap();
        for _ in 0..3 {
            proc.process(&REFERENCE, 0.0, 8.0).unwrap();
        }
        let out = proc.process(&[0.0; 8], 0.0, 8.0).unwrap();
        let xs: Vec<f64> = out.rolling.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.125, 0.25, 0.375, 0.5]);
        assert_eq!(out.rolling[3].y, 0.0);
        assert_eq!(proc.history().len(), 4);
    }

    #[test]
    fn test_failed_block_leaves_history_alone() {
        let mut proc = BlockProcessor::new(8).unwrap();
        proc.process(&REFERENCE, 0.0, 8.0).unwrap();

        let err = proc.process(&[1.0; 4], 0.0, 8.0).unwrap_err();
        assert!(matches!(
            err,
            GateError::InvalidBlockSize {
                expected: 8,
                actual: 4
            }
        ));
        assert_eq!(proc.history().len(), 1);
    }

    #[test]
    fn test_spectrum_frequency_axis() {
        let mut proc = BlockProcessor::new(10).unwrap();
        let out = proc.process(&[0.0; 10], 0.0, 1000.0).unwrap();
        let xs: Vec<f64> = out.spectrum.iter().map(|p| p.x).collect();
        let expected: Vec<f64> = (1..10).map(|i| 100.0 * i as f64).collect();
        assert_eq!(xs, expected);
        assert_eq!(proc.block_size(), 10);
    }
}
