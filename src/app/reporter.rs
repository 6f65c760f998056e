// logpulse - app/reporter.rs
//
// Periodic aggregation and console output.
//
// Each worker owns a slot holding two stats buffers and an atomic index
// naming the live one. Workers write to the live buffer; at each report
// tick the reporter swaps the index (release/acquire, publishing the
// worker's prior writes) and folds the retired buffer into the interval
// snapshot before resetting it for reuse. The per-buffer mutex closes the
// window where a worker read the index just before the swap; outside that
// instant it is uncontended.
//
// The rendered block goes to stdout; the agent's own diagnostics stay on
// stderr so the two streams can be piped independently.

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::app::bus::EventBus;
use crate::app::registry::FileStateRegistry;
use crate::core::model::{FsEvent, FsEventKind, GlobalSnapshot, LogLevel};
use crate::core::stats::{top_k, StatsBuffer};
use crate::util::constants::REPORT_CANCEL_CHECK_INTERVAL_MS;

// =============================================================================
// Worker slot (double buffer)
// =============================================================================

/// One worker's pair of stats buffers plus the live-buffer index.
#[derive(Debug, Default)]
pub struct WorkerSlot {
    buffers: [Mutex<StatsBuffer>; 2],
    live: AtomicUsize,
}

impl WorkerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the current live buffer. Called only by the owning
    /// worker.
    pub fn with_live<R>(&self, f: impl FnOnce(&mut StatsBuffer) -> R) -> R {
        let idx = self.live.load(Ordering::Acquire);
        let mut guard = self.buffers[idx].lock();
        f(&mut guard)
    }

    /// Reporter side: retire the live buffer, fold it into `into`, and
    /// reset it for reuse. The worker's next write lands in the other
    /// buffer.
    pub fn swap_and_collect(&self, into: &mut StatsBuffer) {
        let retired = self.live.fetch_xor(1, Ordering::AcqRel);
        let mut guard = self.buffers[retired].lock();
        into.merge_from(&guard);
        guard.reset();
    }
}

// =============================================================================
// Snapshot assembly
// =============================================================================

/// Swap every slot and assemble the merged interval snapshot.
pub fn collect_snapshot(
    slots: &[Arc<WorkerSlot>],
    bus: &EventBus<FsEvent>,
    registry: &FileStateRegistry,
    k: usize,
) -> GlobalSnapshot {
    let mut merged = StatsBuffer::new();
    for slot in slots {
        slot.swap_and_collect(&mut merged);
    }

    GlobalSnapshot {
        fs_events: merged.fs_events,
        lines_processed: merged.lines_processed,
        malformed: merged.malformed,
        level_counts: merged.level_counts,
        top_keys: top_k(&merged.message_counts, k),
        p50: merged.latency.percentile(0.50),
        p95: merged.latency.percentile(0.95),
        p99: merged.latency.percentile(0.99),
        latency_samples: merged.latency.count(),
        file_not_found: merged.file_not_found,
        access_denied: merged.access_denied,
        io_errors: merged.io_errors,
        truncations: merged.truncations,
        bus_published: bus.published_count(),
        bus_dropped: bus.dropped_count(),
        tracked_files: registry.len(),
    }
}

/// Render one snapshot as the periodic console block.
pub fn render_snapshot(snapshot: &GlobalSnapshot) -> String {
    use std::fmt::Write;

    fn pct(value: Option<usize>) -> String {
        value.map_or_else(|| "none".to_string(), |v| v.to_string())
    }

    let mut out = String::new();
    let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let _ = writeln!(out, "=== logpulse report {stamp} ===");

    let _ = write!(out, "fs events  :");
    for kind in FsEventKind::all() {
        let _ = write!(out, " {}={}", kind.label(), snapshot.fs_events[kind.bin()]);
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "lines      : processed={} malformed={}",
        snapshot.lines_processed, snapshot.malformed
    );

    let _ = write!(out, "levels     :");
    for level in LogLevel::all() {
        let _ = write!(
            out,
            " {}={}",
            level.label(),
            snapshot.level_counts[level.bin()]
        );
    }
    let _ = writeln!(out);

    if snapshot.top_keys.is_empty() {
        let _ = writeln!(out, "top keys   : none");
    } else {
        let _ = writeln!(out, "top keys   :");
        for (rank, (key, count)) in snapshot.top_keys.iter().enumerate() {
            let _ = writeln!(out, "  {:>2}. {key} ({count})", rank + 1);
        }
    }

    let _ = writeln!(
        out,
        "latency ms : p50={} p95={} p99={} samples={}",
        pct(snapshot.p50),
        pct(snapshot.p95),
        pct(snapshot.p99),
        snapshot.latency_samples
    );

    let _ = writeln!(
        out,
        "io errors  : not_found={} access_denied={} io={} truncations={}",
        snapshot.file_not_found, snapshot.access_denied, snapshot.io_errors, snapshot.truncations
    );

    let _ = writeln!(
        out,
        "bus        : published={} dropped={} tracked_files={}",
        snapshot.bus_published, snapshot.bus_dropped, snapshot.tracked_files
    );

    out
}

// =============================================================================
// Reporter thread
// =============================================================================

/// Background thread that snapshots and renders on a fixed interval.
pub struct Reporter {
    slots: Vec<Arc<WorkerSlot>>,
    bus: Arc<EventBus<FsEvent>>,
    registry: Arc<FileStateRegistry>,
    top_k: usize,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Reporter {
    /// Spawn the reporter. Reports every `interval` until `stop`.
    pub fn start(
        slots: Vec<Arc<WorkerSlot>>,
        bus: Arc<EventBus<FsEvent>>,
        registry: Arc<FileStateRegistry>,
        interval: Duration,
        top_k: usize,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));

        let thread_slots = slots.clone();
        let thread_bus = Arc::clone(&bus);
        let thread_registry = Arc::clone(&registry);
        let thread_cancel = Arc::clone(&cancel);

        let handle = std::thread::spawn(move || {
            run_reporter(
                thread_slots,
                thread_bus,
                thread_registry,
                thread_cancel,
                interval,
                top_k,
            );
        });

        tracing::info!(interval_ms = interval.as_millis() as u64, top_k, "reporter started");

        Self {
            slots,
            bus,
            registry,
            top_k,
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop the thread and emit one final snapshot so lines processed
    /// since the last tick are not lost.
    pub fn stop(mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let snapshot = collect_snapshot(&self.slots, &self.bus, &self.registry, self.top_k);
        emit(&snapshot);
        tracing::info!("reporter stopped");
    }
}

/// Reporter loop: interruptible interval sleep, then swap/merge/render.
fn run_reporter(
    slots: Vec<Arc<WorkerSlot>>,
    bus: Arc<EventBus<FsEvent>>,
    registry: Arc<FileStateRegistry>,
    cancel: Arc<AtomicBool>,
    interval: Duration,
    top_k: usize,
) {
    let check = Duration::from_millis(REPORT_CANCEL_CHECK_INTERVAL_MS);
    let slices = (interval.as_millis() / check.as_millis()).max(1) as u64;

    loop {
        // Sleep in sub-intervals so a stop request is honoured promptly.
        for _ in 0..slices {
            std::thread::sleep(check);
            if cancel.load(Ordering::SeqCst) {
                return;
            }
        }

        let snapshot = collect_snapshot(&slots, &bus, &registry, top_k);
        emit(&snapshot);
    }
}

/// Write one rendered block to stdout and flush, so reports are visible
/// immediately even when stdout is block-buffered (piped).
fn emit(snapshot: &GlobalSnapshot) {
    use std::io::Write;

    let text = render_snapshot(snapshot);
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}
