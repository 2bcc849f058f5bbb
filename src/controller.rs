//! Stream Controller
//!
//! Owns the run lifecycle and everything shared between the acquisition side
//! and the processing side.
//!
//! # Lifecycle
//! - **Idle**: constructed or reset; nothing registered.
//! - **Running**: registered with the acquisition source; blocks are queued to
//!   a single worker thread and processed strictly one at a time.
//! - **Stopped**: after `stop()` or a fatal failure. `start()` begins a fresh
//!   run (new history window); `reset()` returns to Idle.
//!
//! # Threading
//! - Blocks: bounded queue, dropped with a warning when full.
//! - Faults and shutdown: separate unbounded control queue.
//! - Threshold: atomic, read once when a block's processing begins.
//! - The pipeline (processor, sinks, source, state) sits behind one mutex.
//!   The worker holds it for a whole block, and `stop()` takes it to flip the
//!   state, so once `stop()` returns nothing more reaches the sinks.
//!
//! Control methods must not be called from inside a sink callback.

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::acquisition::{AcquisitionSource, BlockDelivery, Control};
use crate::config::RunConfig;
use crate::error::{GateError, Result};
use crate::meters::StreamMeters;
use crate::processor::BlockProcessor;
use crate::sinks::{PlotSink, ScalarSink};
use crate::threshold::SharedThreshold;

const IDLE_POLL: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

struct Pipeline {
    state: RunState,
    config: RunConfig,
    processor: Option<BlockProcessor>,
    source: Box<dyn AcquisitionSource>,
    plot: Box<dyn PlotSink>,
    store: Box<dyn ScalarSink>,
    last_error: Option<GateError>,
}

impl Pipeline {
    /// Ends the run after a fatal error.
    fn halt(&mut self, err: GateError) {
        error!("stream stopped: {}", err);
        self.state = RunState::Stopped;
        self.source.unregister();
        self.last_error = Some(err);
    }

    fn report(&mut self, err: GateError) {
        warn!("{}", err);
        self.last_error = Some(err);
    }
}

struct Shared {
    pipeline: Mutex<Pipeline>,
    threshold: SharedThreshold,
    meters: Arc<StreamMeters>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Pipeline> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Worker {
    control: Sender<Control>,
    handle: JoinHandle<()>,
}

pub struct StreamController {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl StreamController {
    pub fn new(
        config: RunConfig,
        source: Box<dyn AcquisitionSource>,
        plot: Box<dyn PlotSink>,
        store: Box<dyn ScalarSink>,
    ) -> Self {
        let threshold = SharedThreshold::new(config.threshold);
        Self {
            shared: Arc::new(Shared {
                pipeline: Mutex::new(Pipeline {
                    state: RunState::Idle,
                    config,
                    processor: None,
                    source,
                    plot,
                    store,
                    last_error: None,
                }),
                threshold,
                meters: Arc::new(StreamMeters::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> RunState {
        self.shared.lock().state
    }

    pub fn meters(&self) -> Arc<StreamMeters> {
        self.shared.meters.clone()
    }

    pub fn config(&self) -> RunConfig {
        self.shared.lock().config.clone()
    }

    /// Replaces the configuration used by the next `start()`. The config's
    /// threshold becomes the live threshold right away.
    pub fn configure(&self, config: RunConfig) -> Result<()> {
        let mut pipeline = self.shared.lock();
        if pipeline.state == RunState::Running {
            return Err(GateError::InvalidTransition {
                operation: "reconfigure",
                state: pipeline.state,
            });
        }
        check_threshold(config.threshold)?;
        self.shared.threshold.store(config.threshold);
        pipeline.config = config;
        Ok(())
    }

    pub fn threshold(&self) -> f64 {
        self.shared.threshold.load()
    }

    /// Takes effect from the next block whose processing starts.
    pub fn set_threshold(&self, value: f64) -> Result<()> {
        check_threshold(value)?;
        self.shared.threshold.store(value);
        debug!("threshold set to {}", value);
        Ok(())
    }

    /// Most recent error reported by the stream, fatal or not.
    pub fn take_error(&self) -> Option<GateError> {
        self.shared.lock().last_error.take()
    }

    pub fn start(&self) -> Result<()> {
        let mut worker_slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pipeline = self.shared.lock();

        if pipeline.state == RunState::Running {
            return Err(GateError::InvalidTransition {
                operation: "start",
                state: pipeline.state,
            });
        }
        pipeline.config.validate()?;

        // Previous worker has already left its loop (stop or fatal error).
        if let Some(previous) = worker_slot.take() {
            drop(pipeline);
            Self::join_worker(previous);
            pipeline = self.shared.lock();
        }

        let processor = BlockProcessor::new(pipeline.config.block_size)?;
        let (block_tx, block_rx) = bounded::<Vec<f64>>(pipeline.config.queue_depth);
        let (control_tx, control_rx) = unbounded::<Control>();
        let delivery = BlockDelivery::new(block_tx, control_tx.clone(), self.shared.meters.clone());

        let config = pipeline.config.clone();
        pipeline.source.register(&config, delivery)?;

        pipeline.processor = Some(processor);
        pipeline.last_error = None;
        pipeline.state = RunState::Running;
        drop(pipeline);

        let shared = self.shared.clone();
        let handle = match thread::Builder::new()
            .name("block-worker".into())
            .spawn(move || run_worker(shared, block_rx, control_rx))
        {
            Ok(handle) => handle,
            Err(e) => {
                let mut pipeline = self.shared.lock();
                pipeline.state = RunState::Stopped;
                pipeline.source.unregister();
                return Err(GateError::Io(e));
            }
        };
        *worker_slot = Some(Worker {
            control: control_tx,
            handle,
        });

        info!(
            "stream started: {} at {} Hz, {} samples per block",
            config.physical_channel, config.sample_rate, config.block_size
        );
        Ok(())
    }

    /// Stops a running stream. Returns once the in-flight block (if any) is
    /// finished; nothing is rendered or stored after that. Not running is a
    /// no-op.
    pub fn stop(&self) -> Result<()> {
        let mut worker_slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut pipeline = self.shared.lock();
            if pipeline.state != RunState::Running {
                debug!("stop ignored while {}", pipeline.state);
            } else {
                pipeline.state = RunState::Stopped;
                pipeline.source.unregister();
                info!("stream stopped");
            }
        }
        if let Some(worker) = worker_slot.take() {
            Self::join_worker(worker);
        }
        Ok(())
    }

    /// Returns a stopped controller to Idle and drops the previous run's
    /// history and error.
    pub fn reset(&self) -> Result<()> {
        let mut worker_slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pipeline = self.shared.lock();
        match pipeline.state {
            RunState::Running => Err(GateError::InvalidTransition {
                operation: "reset",
                state: pipeline.state,
            }),
            RunState::Idle => Ok(()),
            RunState::Stopped => {
                pipeline.processor = None;
                pipeline.last_error = None;
                pipeline.state = RunState::Idle;
                drop(pipeline);
                if let Some(worker) = worker_slot.take() {
                    Self::join_worker(worker);
                }
                Ok(())
            }
        }
    }

    /// Waits until every received block has been handled, the run has ended,
    /// or the timeout passes. Returns true if the stream settled.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.meters.is_settled() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL);
        }
    }

    fn join_worker(worker: Worker) {
        let _ = worker.control.send(Control::Shutdown);
        if worker.handle.join().is_err() {
            error!("block worker panicked");
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn check_threshold(value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(GateError::Configuration(format!(
            "threshold must be a non-negative number, got {}",
            value
        )))
    }
}

fn run_worker(shared: Arc<Shared>, blocks: Receiver<Vec<f64>>, control: Receiver<Control>) {
    debug!("block worker started");
    loop {
        let keep_going = select! {
            recv(control) -> msg => match msg {
                Ok(Control::Fault(reason)) => {
                    let mut pipeline = shared.lock();
                    if pipeline.state == RunState::Running {
                        pipeline.halt(GateError::Acquisition(reason));
                        false
                    } else {
                        debug!("fault after stop ignored: {}", reason);
                        true
                    }
                }
                Ok(Control::Shutdown) | Err(_) => false,
            },
            recv(blocks) -> msg => match msg {
                Ok(block) => handle_block(&shared, block),
                Err(_) => false,
            },
        };
        if !keep_going {
            break;
        }
    }
    // Anything still queued belongs to a finished run.
    for _ in blocks.try_iter() {
        shared.meters.record_discarded();
    }
    debug!("block worker exited");
}

/// Runs one block through the pipeline. Returns false when the run is over.
fn handle_block(shared: &Shared, block: Vec<f64>) -> bool {
    let mut guard = shared.lock();
    let pipeline = &mut *guard;

    if pipeline.state != RunState::Running {
        shared.meters.record_discarded();
        return true;
    }
    let threshold = shared.threshold.load();
    let sample_rate = pipeline.config.sample_rate;

    let result = match pipeline.processor.as_mut() {
        Some(processor) => processor.process(&block, threshold, sample_rate),
        None => Err(GateError::Configuration("no processor for this run".into())),
    };
    let output = match result {
        Ok(output) => output,
        Err(err) => {
            shared.meters.record_failed();
            pipeline.halt(err);
            return false;
        }
    };

    if let Err(err) = pipeline.plot.render(&output.spectrum, &output.rolling) {
        shared.meters.record_render_failure();
        pipeline.report(err);
    }
    if let Err(err) = pipeline.store.store(output.persisted) {
        shared.meters.record_persistence_failure();
        pipeline.report(err);
    }
    shared
        .meters
        .record_processed(output.stats.mean_abs, output.stats.rms);
    true
}
