//! Spectral Gate (per-block FFT threshold)
//!
//! Removes low-magnitude frequency content from one acquisition block:
//! forward DFT, per-bin keep/zero decision, inverse DFT.
//!
//! # Gate Rule
//! For every bin `i` in `1..N` (the DC bin is passed through untouched):
//! 1. `mag = (2 / N) * |X[i]|`, the single-sided amplitude of that bin.
//! 2. `mag < threshold` clears the bin, otherwise the bin is doubled to fold
//!    the mirrored negative-frequency energy into the positive half.
//! 3. Bins above `N / 2` are then cleared unconditionally.
//!
//! Step 3 runs after step 2, so doubling is dead work for the upper half.
//! Output is unchanged either way, but the order is kept as is.
//!
//! # Transform
//! Block length is whatever the run was configured with, not a power of two.
//! rustfft plans mixed-radix / Bluestein transforms for arbitrary N. Both
//! directions are scaled by `1 / sqrt(N)` (symmetric), so with threshold 0 and
//! no Nyquist content the block round-trips unchanged. Magnitudes, and the
//! threshold they are compared against, live on that symmetric scale: a tone
//! of amplitude `a` in bin `k` reads `a / sqrt(N)`.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::dsp::PlotPoint;
use crate::error::{GateError, Result};

/// Fixed-length spectral gate. Plans are built once per run.
pub struct SpectralGate {
    len: usize,
    fft: Arc<dyn Fft<f64>>,
    ifft: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex<f64>>,
}

/// Result of gating one block.
#[derive(Debug, Clone, PartialEq)]
pub struct GatedBlock {
    /// Real part of the inverse transform, same length as the input.
    pub samples: Vec<f64>,
    /// Pre-gate magnitude of bins `1..N`, in bin order.
    pub magnitudes: Vec<f64>,
}

impl GatedBlock {
    /// `(frequency, magnitude)` for every non-DC bin. Frequency of bin `i` is
    /// `i * sample_rate / N`.
    pub fn spectrum_points(&self, sample_rate: f64) -> impl Iterator<Item = PlotPoint> + '_ {
        let hz_per_bin = sample_rate / self.samples.len() as f64;
        self.magnitudes
            .iter()
            .enumerate()
            .map(move |(k, &mag)| PlotPoint::new(hz_per_bin * (k + 1) as f64, mag))
    }
}

impl SpectralGate {
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(GateError::Configuration(
                "spectral gate length must be greater than zero".into(),
            ));
        }
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(len);
        let ifft = planner.plan_fft_inverse(len);
        Ok(Self {
            len,
            fft,
            ifft,
            scratch: vec![Complex::new(0.0, 0.0); len],
        })
    }

    pub fn block_size(&self) -> usize {
        self.len
    }

    pub fn gate(&mut self, block: &[f64], threshold: f64) -> Result<GatedBlock> {
        if block.is_empty() || block.len() != self.len {
            return Err(GateError::InvalidBlockSize {
                expected: self.len,
                actual: block.len(),
            });
        }

        for (slot, &x) in self.scratch.iter_mut().zip(block) {
            *slot = Complex::new(x, 0.0);
        }
        let norm = 1.0 / (self.len as f64).sqrt();
        self.fft.process(&mut self.scratch);
        for bin in self.scratch.iter_mut() {
            *bin *= norm;
        }

        let mut magnitudes = Vec::with_capacity(self.len - 1);
        apply_gate(&mut self.scratch, threshold, &mut magnitudes);

        self.ifft.process(&mut self.scratch);
        let samples = self.scratch.iter().map(|c| c.re * norm).collect();

        Ok(GatedBlock {
            samples,
            magnitudes,
        })
    }
}

/// Applies the gate rule in place to a symmetrically scaled forward spectrum
/// and records the pre-gate magnitude of every non-DC bin.
pub(crate) fn apply_gate(
    spectrum: &mut [Complex<f64>],
    threshold: f64,
    magnitudes: &mut Vec<f64>,
) {
    let n = spectrum.len();
    let half = n / 2;
    let amp_scale = 2.0 / n as f64;
    let zero = Complex::new(0.0, 0.0);

    magnitudes.clear();
    for i in 1..n {
        let mag = amp_scale * spectrum[i].norm();
        magnitudes.push(mag);

        if mag < threshold {
            spectrum[i] = zero;
        } else {
            spectrum[i] *= 2.0;
        }

        // Must stay after the threshold decision.
        if i > half {
            spectrum[i] = zero;
        }
    }
}
