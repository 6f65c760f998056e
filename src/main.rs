// logpulse - main.rs
//
// Application entry point. Handles:
// 1. CLI argument parsing and validation
// 2. Logging initialisation (debug mode support)
// 3. Pipeline wiring: bus, registry, workers, reporter, watcher
// 4. Signal-driven graceful shutdown

use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use logpulse::app::bus::EventBus;
use logpulse::app::coordinator::{Coordinator, CoordinatorConfig};
use logpulse::app::registry::FileStateRegistry;
use logpulse::app::reporter::Reporter;
use logpulse::app::watcher::{DirWatcher, WatchConfig};
use logpulse::util::constants;
use logpulse::util::error::{ConfigError, Result};

/// logpulse - watch a directory tree of log files and report aggregated
/// statistics.
///
/// Tails every *.log / *.txt file under the watch path, parses appended
/// records, and prints level counts, top message keys, and latency
/// percentiles on a fixed interval.
#[derive(Parser, Debug)]
#[command(name = constants::APP_NAME, version, about)]
struct Cli {
    /// Directory to watch (must exist).
    watch_path: PathBuf,

    /// Number of worker threads (default: CPU count).
    #[arg(
        short = 'w',
        long = "workers",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    workers: Option<u64>,

    /// Event queue capacity.
    #[arg(
        short = 'q',
        long = "queue-capacity",
        default_value_t = constants::DEFAULT_QUEUE_CAPACITY as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    queue_capacity: u64,

    /// Report interval in seconds.
    #[arg(
        short = 'i',
        long = "report-interval",
        default_value_t = constants::DEFAULT_REPORT_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    report_interval: u64,

    /// Number of top message keys per report.
    #[arg(
        short = 'k',
        long = "topk",
        default_value_t = constants::DEFAULT_TOP_K as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    topk: u64,

    /// Directory poll interval in milliseconds.
    #[arg(
        long = "poll-interval",
        default_value_t = constants::DEFAULT_WATCH_POLL_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_interval: u64,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    logpulse::util::logging::init(cli.debug);

    tracing::info!(
        version = constants::APP_VERSION,
        watch_path = %cli.watch_path.display(),
        "logpulse starting"
    );

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "fatal error");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let workers = resolve_workers(cli.workers)?;
    let poll_interval = validate_poll_interval(cli.poll_interval)?;

    let bus = Arc::new(EventBus::new(cli.queue_capacity as usize));
    let registry = Arc::new(FileStateRegistry::new());

    let coordinator = Coordinator::start(
        Arc::clone(&bus),
        Arc::clone(&registry),
        CoordinatorConfig {
            workers,
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            dequeue_timeout: Duration::from_millis(constants::DEQUEUE_TIMEOUT_MS),
        },
    );

    let reporter = Reporter::start(
        coordinator.slots(),
        Arc::clone(&bus),
        Arc::clone(&registry),
        Duration::from_secs(cli.report_interval),
        cli.topk as usize,
    );

    let mut watcher = DirWatcher::start(
        cli.watch_path.clone(),
        Arc::clone(&bus),
        WatchConfig {
            poll_interval,
            ..Default::default()
        },
    )?;

    tracing::info!(
        workers,
        queue_capacity = cli.queue_capacity,
        report_interval_secs = cli.report_interval,
        top_k = cli.topk,
        "pipeline running; press Ctrl-C to stop"
    );

    // Park until SIGINT/SIGTERM. The handler only signals; all teardown
    // happens on this thread.
    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .expect("install signal handler");
    let _ = shutdown_rx.recv();

    tracing::info!("shutdown requested");

    // Producers first, then drain the workers, then flush one last
    // report so nothing processed since the previous tick is lost.
    watcher.stop();
    coordinator.stop();
    reporter.stop();

    tracing::info!("logpulse stopped");
    Ok(())
}

/// Resolve the worker count: explicit value, bounded; omitted means one
/// worker per CPU core.
fn resolve_workers(requested: Option<u64>) -> Result<usize> {
    let workers = match requested {
        None => num_cpus::get().max(1),
        Some(n) => n as usize,
    };
    if workers > constants::ABSOLUTE_MAX_WORKERS {
        return Err(ConfigError::ValueOutOfRange {
            field: "workers",
            value: workers.to_string(),
            expected: format!("1..={}", constants::ABSOLUTE_MAX_WORKERS),
        }
        .into());
    }
    Ok(workers)
}

/// Bound the poll interval to its configured range.
fn validate_poll_interval(ms: u64) -> Result<Duration> {
    if !(constants::MIN_WATCH_POLL_INTERVAL_MS..=constants::MAX_WATCH_POLL_INTERVAL_MS)
        .contains(&ms)
    {
        return Err(ConfigError::ValueOutOfRange {
            field: "poll-interval",
            value: ms.to_string(),
            expected: format!(
                "{}..={} ms",
                constants::MIN_WATCH_POLL_INTERVAL_MS,
                constants::MAX_WATCH_POLL_INTERVAL_MS
            ),
        }
        .into());
    }
    Ok(Duration::from_millis(ms))
}
