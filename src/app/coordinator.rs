// logpulse - app/coordinator.rs
//
// Worker pool consuming the event bus and dispatching per-path file work.
//
// Per-path single concurrency without a central lock table: each event
// marks its file state dirty and try-acquires the state's gate. A
// contended attempt is simply dropped; the current gate holder re-checks
// the dirty flag under the gate before releasing it, so the coalesced
// event's work still happens. Delete-pending states are honoured the same
// way: either the marking worker acquires the gate and finalises, or the
// holder observes the flag after its dirty loop and finalises itself.
//
// Stale captures: a worker that obtained a state before another worker
// finalised it detects the obsolescence by generation/epoch comparison
// and abandons the work rather than resurrecting dead state.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::app::bus::EventBus;
use crate::app::processor::process_once;
use crate::app::registry::FileStateRegistry;
use crate::app::reporter::WorkerSlot;
use crate::core::model::{FsEvent, FsEventKind};
use crate::util::constants::{DEFAULT_CHUNK_SIZE, DEQUEUE_TIMEOUT_MS};

/// Tunables for the worker pool.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Number of worker threads. Must be > 0 (the CLI resolves 0 to the
    /// CPU count before construction).
    pub workers: usize,
    /// Scratch chunk size per worker for tail reads.
    pub chunk_size: usize,
    /// How long a worker blocks per dequeue before re-checking shutdown.
    pub dequeue_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            dequeue_timeout: Duration::from_millis(DEQUEUE_TIMEOUT_MS),
        }
    }
}

/// Owns the worker threads and their stats slots.
pub struct Coordinator {
    bus: Arc<EventBus<FsEvent>>,
    slots: Vec<Arc<WorkerSlot>>,
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Coordinator {
    /// Spawn the worker pool. Workers begin consuming immediately.
    pub fn start(
        bus: Arc<EventBus<FsEvent>>,
        registry: Arc<FileStateRegistry>,
        config: CoordinatorConfig,
    ) -> Self {
        assert!(config.workers > 0, "worker count must be > 0");

        let running = Arc::new(AtomicBool::new(true));
        let slots: Vec<Arc<WorkerSlot>> = (0..config.workers)
            .map(|_| Arc::new(WorkerSlot::new()))
            .collect();

        let handles = slots
            .iter()
            .enumerate()
            .map(|(worker_id, slot)| {
                let bus = Arc::clone(&bus);
                let registry = Arc::clone(&registry);
                let slot = Arc::clone(slot);
                let running = Arc::clone(&running);
                let chunk_size = config.chunk_size;
                let timeout = config.dequeue_timeout;
                std::thread::Builder::new()
                    .name(format!("logpulse-worker-{worker_id}"))
                    .spawn(move || {
                        worker_loop(worker_id, &bus, &registry, &slot, &running, chunk_size, timeout);
                    })
                    .expect("spawn worker thread")
            })
            .collect();

        tracing::info!(workers = config.workers, "coordinator started");

        Self {
            bus,
            slots,
            running,
            handles,
        }
    }

    /// Stats slots, one per worker, shared with the reporter.
    pub fn slots(&self) -> Vec<Arc<WorkerSlot>> {
        self.slots.clone()
    }

    /// Cooperative shutdown: stop the bus, let workers drain it, and join
    /// them. Workers blocked in a dequeue wake within the dequeue
    /// timeout; a worker mid-`process_once` finishes its current call.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.bus.stop();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        tracing::info!("coordinator stopped");
    }
}

// =============================================================================
// Worker loop
// =============================================================================

fn worker_loop(
    worker_id: usize,
    bus: &EventBus<FsEvent>,
    registry: &FileStateRegistry,
    slot: &WorkerSlot,
    running: &AtomicBool,
    chunk_size: usize,
    timeout: Duration,
) {
    tracing::debug!(worker_id, "worker running");
    let mut scratch = vec![0u8; chunk_size];

    loop {
        match bus.try_dequeue(timeout) {
            Some(event) => handle_event(&event, registry, slot, &mut scratch),
            None => {
                // Timeout, or the bus is stopped and drained. Keep
                // draining while a stop is in flight; exit once told to.
                if !running.load(Ordering::SeqCst) {
                    break;
                }
            }
        }
    }

    tracing::debug!(worker_id, "worker exited");
}

/// Per-event state machine.
fn handle_event(
    event: &FsEvent,
    registry: &FileStateRegistry,
    slot: &WorkerSlot,
    scratch: &mut [u8],
) {
    slot.with_live(|stats| stats.record_fs_event(event.kind));

    match event.kind {
        FsEventKind::Created | FsEventKind::Modified => {
            if event.processable {
                ensure_and_process(&event.path, registry, slot, scratch);
            }
        }
        FsEventKind::Deleted => {
            handle_delete(&event.path, registry);
        }
        FsEventKind::Renamed => {
            // Old path state dies before the new path is created, so the
            // new state never inherits a stale cursor.
            if let Some(old_path) = &event.old_path {
                handle_delete(old_path, registry);
            }
            if event.processable {
                ensure_and_process(&event.path, registry, slot, scratch);
            }
        }
    }
}

/// Created/Modified path: ensure a state exists, mark it dirty, and if
/// the gate is free, process until clean.
fn ensure_and_process(
    path: &Path,
    registry: &FileStateRegistry,
    slot: &WorkerSlot,
    scratch: &mut [u8],
) {
    let state = registry.get_or_create(path);

    if !state.mark_dirty_if_allowed() {
        // Delete already pending; the finalising worker owns this path.
        return;
    }

    let Some(mut cursor) = state.gate.try_lock() else {
        // Contended: the holder re-checks dirty under the gate, so this
        // event is coalesced into its loop.
        return;
    };

    if !registry.is_current(path, &state) {
        // Captured before a finalise; the work belongs to the successor
        // state (created by whichever event follows the delete).
        return;
    }

    while state.take_dirty() {
        slot.with_live(|stats| {
            process_once(path, &mut cursor, stats, scratch);
        });
    }

    // A delete marked while we held the gate would find it contended;
    // honour it here under the same hold.
    if state.is_delete_pending() {
        cursor.offset = 0;
        cursor.carry.clear();
        registry.finalize_delete(path);
    }
}

/// Deleted path (or the old half of a rename): mark delete-pending and
/// finalise if the gate is free; otherwise the holder finalises.
fn handle_delete(path: &Path, registry: &FileStateRegistry) {
    let Some(state) = registry.try_get(path) else {
        return;
    };

    state.mark_delete_pending();

    let Some(mut cursor) = state.gate.try_lock() else {
        return;
    };

    if registry.is_current(path, &state) {
        cursor.offset = 0;
        cursor.carry.clear();
        registry.finalize_delete(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::reporter::collect_snapshot;
    use crate::core::model::LogLevel;
    use crate::core::stats::StatsBuffer;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn test_config(workers: usize) -> CoordinatorConfig {
        CoordinatorConfig {
            workers,
            chunk_size: DEFAULT_CHUNK_SIZE,
            dequeue_timeout: Duration::from_millis(20),
        }
    }

    /// Drain the bus and merge all worker buffers after a stop.
    fn drain_and_merge(coordinator: Coordinator) -> StatsBuffer {
        let slots = coordinator.slots();
        coordinator.stop();
        let mut merged = StatsBuffer::new();
        for slot in &slots {
            // Both buffers of each slot: one swap collects the live side,
            // a second collects the other.
            slot.swap_and_collect(&mut merged);
            slot.swap_and_collect(&mut merged);
        }
        merged
    }

    #[test]
    fn test_start_stop_without_events() {
        let bus = Arc::new(EventBus::new(16));
        let registry = Arc::new(FileStateRegistry::new());
        let coordinator = Coordinator::start(bus, registry, test_config(2));
        coordinator.stop();
    }

    /// Events published before stop are drained and processed.
    #[test]
    fn test_processes_created_file() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("app.log");
        fs::write(
            &path,
            b"2023-01-02T03:04:05Z INFO request_started latency_ms=5\n\
              2023-01-02T03:04:06Z ERROR db_write latency_ms=40\n",
        )
        .unwrap();

        let bus = Arc::new(EventBus::new(16));
        let registry = Arc::new(FileStateRegistry::new());
        let coordinator = Coordinator::start(Arc::clone(&bus), Arc::clone(&registry), test_config(2));

        assert!(bus.publish(FsEvent::new(FsEventKind::Created, path.clone())));
        bus.stop();

        let merged = drain_and_merge(coordinator);
        assert_eq!(merged.lines_processed, 2);
        assert_eq!(merged.malformed, 0);
        assert_eq!(merged.level_counts[LogLevel::Info.bin()], 1);
        assert_eq!(merged.level_counts[LogLevel::Error.bin()], 1);
        assert_eq!(merged.fs_events[FsEventKind::Created.bin()], 1);
        assert_eq!(merged.latency.count(), 2);
        assert_eq!(registry.len(), 1);
    }

    /// Redundant Modified events for one path coalesce: every line is
    /// counted exactly once no matter how many events fired.
    #[test]
    fn test_duplicate_events_do_not_double_count() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("busy.log");
        let mut f = fs::File::create(&path).unwrap();
        for i in 0..200 {
            writeln!(f, "2023-01-02T03:04:05Z INFO key_{i}").unwrap();
        }
        drop(f);

        let bus = Arc::new(EventBus::new(1024));
        let registry = Arc::new(FileStateRegistry::new());
        let coordinator = Coordinator::start(Arc::clone(&bus), Arc::clone(&registry), test_config(4));

        for _ in 0..50 {
            bus.publish(FsEvent::new(FsEventKind::Modified, path.clone()));
        }
        bus.stop();

        let merged = drain_and_merge(coordinator);
        assert_eq!(merged.lines_processed, 200);
        assert_eq!(merged.fs_events[FsEventKind::Modified.bin()], 50);
    }

    /// Deleted events finalise the state and bump the epoch.
    #[test]
    fn test_delete_finalises_state() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("gone.log");
        fs::write(&path, b"2023-01-02T03:04:05Z INFO once\n").unwrap();

        let bus = Arc::new(EventBus::new(16));
        let registry = Arc::new(FileStateRegistry::new());
        // One worker so Created is fully handled before Deleted.
        let coordinator = Coordinator::start(Arc::clone(&bus), Arc::clone(&registry), test_config(1));

        bus.publish(FsEvent::new(FsEventKind::Created, path.clone()));
        bus.publish(FsEvent::new(FsEventKind::Deleted, path.clone()));
        bus.stop();

        let merged = drain_and_merge(coordinator);
        assert!(registry.try_get(&path).is_none());
        assert_eq!(registry.epoch(&path), 1);
        assert_eq!(merged.fs_events[FsEventKind::Deleted.bin()], 1);
    }

    /// Renames finalise the old path before tracking the new one.
    #[test]
    fn test_rename_moves_state() {
        let dir = TempDir::new().expect("tmpdir");
        let old_path = dir.path().join("old.log");
        let new_path = dir.path().join("new.log");
        fs::write(&old_path, b"2023-01-02T03:04:05Z INFO before\n").unwrap();

        let bus = Arc::new(EventBus::new(16));
        let registry = Arc::new(FileStateRegistry::new());
        let coordinator = Coordinator::start(Arc::clone(&bus), Arc::clone(&registry), test_config(1));

        bus.publish(FsEvent::new(FsEventKind::Created, old_path.clone()));
        // Let the worker finish the first read before the file moves.
        std::thread::sleep(Duration::from_millis(200));
        fs::rename(&old_path, &new_path).unwrap();
        bus.publish(FsEvent::renamed(old_path.clone(), new_path.clone()));
        bus.stop();

        let merged = drain_and_merge(coordinator);
        assert!(registry.try_get(&old_path).is_none());
        assert_eq!(registry.epoch(&old_path), 1);
        assert!(registry.try_get(&new_path).is_some());
        // The renamed file's content is re-read from offset zero under
        // its new path.
        assert_eq!(merged.lines_processed, 2);
        assert_eq!(merged.fs_events[FsEventKind::Renamed.bin()], 1);
    }

    /// A rename to a non-processable extension still reclaims the old
    /// state but creates nothing for the new path.
    #[test]
    fn test_rename_out_of_scope_reclaims_state() {
        let dir = TempDir::new().expect("tmpdir");
        let old_path = dir.path().join("app.log");
        let new_path = dir.path().join("app.bak");
        fs::write(&old_path, b"2023-01-02T03:04:05Z INFO line\n").unwrap();

        let bus = Arc::new(EventBus::new(16));
        let registry = Arc::new(FileStateRegistry::new());
        let coordinator = Coordinator::start(Arc::clone(&bus), Arc::clone(&registry), test_config(1));

        bus.publish(FsEvent::new(FsEventKind::Created, old_path.clone()));
        fs::rename(&old_path, &new_path).unwrap();
        bus.publish(FsEvent::renamed(old_path.clone(), new_path.clone()));
        bus.stop();

        drain_and_merge(coordinator);
        assert!(registry.try_get(&old_path).is_none());
        assert!(registry.try_get(&new_path).is_none());
    }

    /// Non-processable Created/Modified events touch the counters only.
    #[test]
    fn test_non_processable_events_are_book_keeping_only() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("core.dump");
        fs::write(&path, b"binary").unwrap();

        let bus = Arc::new(EventBus::new(16));
        let registry = Arc::new(FileStateRegistry::new());
        let coordinator = Coordinator::start(Arc::clone(&bus), Arc::clone(&registry), test_config(1));

        bus.publish(FsEvent::new(FsEventKind::Created, path.clone()));
        bus.publish(FsEvent::new(FsEventKind::Modified, path.clone()));
        bus.stop();

        let merged = drain_and_merge(coordinator);
        assert!(registry.is_empty());
        assert_eq!(merged.lines_processed, 0);
        assert_eq!(merged.fs_events[FsEventKind::Created.bin()], 1);
        assert_eq!(merged.fs_events[FsEventKind::Modified.bin()], 1);
    }

    /// Appends between events are picked up incrementally, not re-read.
    #[test]
    fn test_incremental_tailing_across_events() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("grow.log");
        fs::write(&path, b"2023-01-02T03:04:05Z INFO first\n").unwrap();

        let bus = Arc::new(EventBus::new(16));
        let registry = Arc::new(FileStateRegistry::new());
        let coordinator = Coordinator::start(Arc::clone(&bus), Arc::clone(&registry), test_config(1));

        bus.publish(FsEvent::new(FsEventKind::Created, path.clone()));
        // Give the single worker time to process before appending.
        std::thread::sleep(Duration::from_millis(200));

        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"2023-01-02T03:04:06Z INFO second\n").unwrap();
        drop(f);
        bus.publish(FsEvent::new(FsEventKind::Modified, path.clone()));
        bus.stop();

        let merged = drain_and_merge(coordinator);
        assert_eq!(merged.lines_processed, 2);
        assert_eq!(merged.message_counts["first"], 1);
        assert_eq!(merged.message_counts["second"], 1);
    }

    /// End-to-end sanity through the snapshot path as the reporter sees
    /// it.
    #[test]
    fn test_snapshot_after_processing() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("snap.log");
        fs::write(
            &path,
            b"2023-01-02T03:04:05Z INFO request_started latency_ms=123\n",
        )
        .unwrap();

        let bus = Arc::new(EventBus::new(16));
        let registry = Arc::new(FileStateRegistry::new());
        let coordinator = Coordinator::start(Arc::clone(&bus), Arc::clone(&registry), test_config(2));

        bus.publish(FsEvent::new(FsEventKind::Created, path.clone()));
        bus.stop();
        let slots = coordinator.slots();
        coordinator.stop();

        let snapshot = collect_snapshot(&slots, &bus, &registry, 10);
        assert_eq!(snapshot.lines_processed, 1);
        assert_eq!(
            snapshot.top_keys,
            vec![("request_started".to_string(), 1)]
        );
        assert_eq!(snapshot.p50, Some(123));
        assert_eq!(snapshot.bus_published, 1);
        assert_eq!(snapshot.tracked_files, 1);
    }
}
