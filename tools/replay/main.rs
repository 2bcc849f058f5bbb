use anyhow::{Context, Result};
use clap::Parser;
use daqgate::{
    raw_label, threshold_from_raw, FileScalarSink, JsonPlotSink, LogPlotSink, PlotSink, RunConfig,
    RunState, StreamController, WavFileSource,
};
use log::info;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Replay a WAV recording through the spectral gate as if it were live input.
#[derive(Parser, Debug)]
#[command(name = "gate_replay", version)]
struct Args {
    /// Recording to replay.
    input: PathBuf,

    /// JSON run configuration; unspecified fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Physical channel, e.g. Dev1/ai1 for the second WAV channel.
    #[arg(long)]
    channel: Option<String>,

    #[arg(long)]
    sample_rate: Option<f64>,

    #[arg(long)]
    block_size: Option<usize>,

    /// Threshold control position, 0..=200.
    #[arg(long)]
    threshold_raw: Option<u32>,

    /// Where the latest mean-abs value is written.
    #[arg(long)]
    persist: Option<PathBuf>,

    /// Write both plot series here as JSON after every block.
    #[arg(long)]
    plot_out: Option<PathBuf>,

    /// Deliver blocks as fast as they are read. Blocks are dropped when the
    /// processing queue fills up.
    #[arg(long)]
    no_pacing: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RunConfig::from_json_file(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(channel) = args.channel {
        config.physical_channel = channel;
    }
    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(n) = args.block_size {
        config.block_size = n;
    }
    if let Some(raw) = args.threshold_raw {
        config.threshold = threshold_from_raw(raw);
        info!("threshold control at {}", raw_label(raw));
    }
    if let Some(path) = args.persist {
        config.persist_path = path;
    }

    let source = WavFileSource::new(&args.input, !args.no_pacing);
    let finished = source.finished_flag();
    let plot: Box<dyn PlotSink> = match &args.plot_out {
        Some(path) => Box::new(JsonPlotSink::new(path)),
        None => Box::new(LogPlotSink),
    };
    let store = FileScalarSink::new(&config.persist_path);

    let controller = StreamController::new(config, Box::new(source), plot, Box::new(store));
    controller
        .start()
        .with_context(|| format!("failed to start replay of '{}'", args.input.display()))?;

    while !finished.load(Ordering::Acquire) && controller.state() == RunState::Running {
        std::thread::sleep(Duration::from_millis(20));
    }
    controller.wait_idle(Duration::from_secs(5));
    controller.stop()?;

    let meters = controller.meters();
    println!("Replay summary for '{}':", args.input.display());
    println!("  blocks processed     : {}", meters.get_blocks_processed());
    println!("  blocks dropped       : {}", meters.get_blocks_dropped());
    println!("  persistence failures : {}", meters.get_persistence_failures());
    println!("  last mean abs        : {:.6}", meters.get_last_mean_abs());
    println!("  last rms             : {:.6}", meters.get_last_rms());

    if let Some(err) = controller.take_error() {
        if err.is_fatal() {
            return Err(err).context("replay ended early");
        }
        log::warn!("last reported error: {}", err);
    }
    Ok(())
}
