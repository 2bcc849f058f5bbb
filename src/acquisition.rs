//! Acquisition side of the stream.
//!
//! A source is handed a [`BlockDelivery`] when the controller starts and
//! pushes one fixed-size block per acquisition event through it. Delivery
//! never blocks: when the worker is behind and the queue is full the block is
//! dropped and counted.

use crossbeam_channel::{Sender, TrySendError};
use hound::{SampleFormat, WavReader};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::RunConfig;
use crate::error::{GateError, Result};
use crate::meters::StreamMeters;

/// Out-of-band messages for the processing worker.
#[derive(Debug)]
pub(crate) enum Control {
    Fault(String),
    Shutdown,
}

/// Push handle given to an acquisition source for the duration of one run.
#[derive(Clone)]
pub struct BlockDelivery {
    blocks: Sender<Vec<f64>>,
    control: Sender<Control>,
    meters: Arc<StreamMeters>,
}

impl BlockDelivery {
    pub(crate) fn new(
        blocks: Sender<Vec<f64>>,
        control: Sender<Control>,
        meters: Arc<StreamMeters>,
    ) -> Self {
        Self {
            blocks,
            control,
            meters,
        }
    }

    /// Queues a block for processing. Returns false if it was not accepted.
    pub fn deliver(&self, block: Vec<f64>) -> bool {
        match self.blocks.try_send(block) {
            Ok(()) => {
                self.meters.record_received();
                true
            }
            Err(TrySendError::Full(_)) => {
                self.meters.record_dropped();
                warn!("processing queue full, dropping block");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("block delivered after the run ended");
                false
            }
        }
    }

    /// Reports an acquisition fault (overflow, device error). Ends the run.
    pub fn fail(&self, reason: impl Into<String>) {
        if self.control.send(Control::Fault(reason.into())).is_err() {
            debug!("acquisition fault reported after the run ended");
        }
    }
}

/// Something that produces blocks once registered.
pub trait AcquisitionSource: Send {
    /// Begin delivering `config.block_size`-sample blocks through `delivery`.
    fn register(&mut self, config: &RunConfig, delivery: BlockDelivery) -> Result<()>;

    /// Stop delivering. Must not return while a delivery is still in progress.
    fn unregister(&mut self);
}

// =============================================================================
// WAV replay
// =============================================================================

type SampleIter = Box<dyn Iterator<Item = std::result::Result<f64, hound::Error>> + Send>;

/// Replays one channel of a WAV recording as if it were a live input.
///
/// Integer samples are normalized to [-1, 1]; float samples are used as they
/// are. Everything is clamped to the configured voltage range.
pub struct WavFileSource {
    path: PathBuf,
    paced: bool,
    halt: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl WavFileSource {
    /// `paced` delivers one block every `block_size / sample_rate` seconds;
    /// otherwise blocks are pushed as fast as they can be read.
    pub fn new(path: impl Into<PathBuf>, paced: bool) -> Self {
        Self {
            path: path.into(),
            paced,
            halt: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Set once the recording has been fully delivered or reading failed.
    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        self.finished.clone()
    }

    fn open_samples(path: &Path, channel: usize) -> Result<(SampleIter, usize, u32)> {
        let reader = WavReader::open(path)
            .map_err(|e| GateError::Acquisition(format!("{}: {}", path.display(), e)))?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channel >= channels {
            return Err(GateError::Configuration(format!(
                "channel ai{} not present, recording has {} channel(s)",
                channel, channels
            )));
        }

        let samples: SampleIter = match spec.sample_format {
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f64;
                Box::new(
                    reader
                        .into_samples::<i32>()
                        .map(move |s| s.map(|v| v as f64 / scale)),
                )
            }
            SampleFormat::Float => Box::new(
                reader
                    .into_samples::<f32>()
                    .map(|s| s.map(|v| v as f64)),
            ),
        };
        Ok((samples, channels, spec.sample_rate))
    }
}

impl AcquisitionSource for WavFileSource {
    fn register(&mut self, config: &RunConfig, delivery: BlockDelivery) -> Result<()> {
        self.unregister();

        let channel = config.channel_index()?;
        let (samples, channels, file_rate) = Self::open_samples(&self.path, channel)?;
        if (file_rate as f64 - config.sample_rate).abs() > f64::EPSILON {
            warn!(
                "{} was recorded at {} Hz, replaying at {} Hz",
                self.path.display(),
                file_rate,
                config.sample_rate
            );
        }

        self.halt.store(false, Ordering::Release);
        self.finished.store(false, Ordering::Release);

        let halt = self.halt.clone();
        let finished = self.finished.clone();
        let block_size = config.block_size;
        let (lo, hi) = (config.min_voltage, config.max_voltage);
        let pace = self.paced.then(|| config.block_duration());
        let name = self.path.display().to_string();

        let handle = thread::Builder::new()
            .name("wav-acquisition".into())
            .spawn(move || {
                let mut block = Vec::with_capacity(block_size);
                let mut delivered = 0usize;
                for (idx, sample) in samples.enumerate() {
                    if halt.load(Ordering::Acquire) {
                        break;
                    }
                    let value = match sample {
                        Ok(v) => v,
                        Err(e) => {
                            error!("reading {}: {}", name, e);
                            delivery.fail(format!("{}: {}", name, e));
                            break;
                        }
                    };
                    if idx % channels != channel {
                        continue;
                    }
                    block.push(value.clamp(lo, hi));
                    if block.len() == block_size {
                        let full = std::mem::replace(&mut block, Vec::with_capacity(block_size));
                        delivery.deliver(full);
                        delivered += 1;
                        if let Some(pace) = pace {
                            thread::sleep(pace);
                        }
                    }
                }
                if !block.is_empty() {
                    debug!("discarding {} trailing samples", block.len());
                }
                info!("{}: {} block(s) delivered", name, delivered);
                finished.store(true, Ordering::Release);
            })
            .map_err(|e| GateError::Acquisition(e.to_string()))?;

        self.reader = Some(handle);
        Ok(())
    }

    fn unregister(&mut self) {
        self.halt.store(true, Ordering::Release);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                error!("wav acquisition thread panicked");
            }
        }
    }
}

impl Drop for WavFileSource {
    fn drop(&mut self) {
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded, Receiver};
    use std::time::Duration;

    fn delivery(depth: usize) -> (BlockDelivery, Receiver<Vec<f64>>, Receiver<Control>, Arc<StreamMeters>) {
        let (btx, brx) = bounded(depth);
        let (ctx, crx) = unbounded();
        let meters = Arc::new(StreamMeters::new());
        (BlockDelivery::new(btx, ctx, meters.clone()), brx, crx, meters)
    }

    fn write_wav(path: &Path, channels: u16, frames: &[[i16; 2]]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 1000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for &s in &frame[..channels as usize] {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    fn wait_finished(flag: &AtomicBool) {
        for _ in 0..500 {
            if flag.load(Ordering::Acquire) {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("source never finished");
    }

    #[test]
    fn test_delivery_drops_when_full() {
        let (d, rx, _crx, meters) = delivery(1);
        assert!(d.deliver(vec![1.0]));
        assert!(!d.deliver(vec![2.0]));
        assert_eq!(meters.get_blocks_received(), 1);
        assert_eq!(meters.get_blocks_dropped(), 1);
        assert_eq!(rx.recv().unwrap(), vec![1.0]);
    }

    #[test]
    fn test_delivery_after_disconnect() {
        let (d, rx, crx, meters) = delivery(4);
        drop(rx);
        drop(crx);
        assert!(!d.deliver(vec![1.0]));
        d.fail("late");
        assert_eq!(meters.get_blocks_received(), 0);
        assert_eq!(meters.get_blocks_dropped(), 0);
    }

    #[test]
    fn test_fault_goes_out_of_band() {
        let (d, _rx, crx, _meters) = delivery(1);
        assert!(d.deliver(vec![0.0]));
        d.fail("overflow");
        match crx.try_recv().unwrap() {
            Control::Fault(reason) => assert_eq!(reason, "overflow"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wav_replay_selects_channel_and_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two.wav");
        // Channel 1 carries a ramp; channel 0 is constant.
        let frames: Vec<[i16; 2]> = (0..10).map(|i| [1000, (i * 1024) as i16]).collect();
        write_wav(&path, 2, &frames);

        let config = RunConfig {
            physical_channel: "Dev1/ai1".into(),
            block_size: 4,
            sample_rate: 1000.0,
            min_voltage: -1.0,
            max_voltage: 0.2,
            ..Default::default()
        };
        let (d, rx, _crx, _meters) = delivery(16);
        let mut source = WavFileSource::new(&path, false);
        let finished = source.finished_flag();
        source.register(&config, d).unwrap();
        wait_finished(&finished);
        source.unregister();

        let blocks: Vec<Vec<f64>> = rx.try_iter().collect();
        // 10 frames at N = 4: two full blocks, trailing two samples dropped.
        assert_eq!(blocks.len(), 2);
        let expected_first: Vec<f64> = (0..4).map(|i| (i * 1024) as f64 / 32768.0).collect();
        assert_eq!(blocks[0], expected_first);
        // 7 * 1024 / 32768 = 0.21875 clamps to the range top.
        assert_eq!(blocks[1][3], 0.2);
    }

    #[test]
    fn test_wav_missing_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 1, &[[0, 0]; 8]);

        let config = RunConfig {
            physical_channel: "Dev1/ai2".into(),
            block_size: 4,
            ..Default::default()
        };
        let (d, _rx, _crx, _meters) = delivery(4);
        let mut source = WavFileSource::new(&path, false);
        assert!(matches!(
            source.register(&config, d),
            Err(GateError::Configuration(_))
        ));
    }

    #[test]
    fn test_wav_missing_file() {
        let config = RunConfig::default();
        let (d, _rx, _crx, _meters) = delivery(4);
        let mut source = WavFileSource::new("/nonexistent/recording.wav", false);
        assert!(matches!(
            source.register(&config, d),
            Err(GateError::Acquisition(_))
        ));
    }
}
