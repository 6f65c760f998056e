// logpulse - app/watcher.rs
//
// Polling filesystem-watch adapter: walks the watched tree on a fixed
// interval, diffs it against the previously observed state, and publishes
// one FsEvent per change on the bounded bus.
//
// The adapter tracks every regular file (not just *.log / *.txt) so that
// delete book-keeping stays correct for files renamed out of scope; the
// `processable` flag on each event tells the workers whether to tail it.
// A rename is observed by this adapter as Deleted + Created; a poll diff
// cannot correlate the two paths.
//
// Publishing uses the bus's non-blocking publish only; a full bus sheds
// the event (counted by the bus) rather than stalling the poll loop.

use glob::Pattern;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use crate::app::bus::EventBus;
use crate::core::model::{FsEvent, FsEventKind};
use crate::util::constants::{
    WATCH_CANCEL_CHECK_INTERVAL_MS, WATCH_EXCLUDE_PATTERNS, WATCH_MAX_DEPTH,
};
use crate::util::error::{AgentError, Result, WatchError};

// =============================================================================
// Watch configuration
// =============================================================================

/// Tunables for the polling watcher.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// How often to walk the tree looking for changes.
    pub poll_interval: Duration,
    /// Maximum directory recursion depth.
    pub max_depth: usize,
    /// Glob patterns (file or directory names) to skip entirely.
    pub exclude_patterns: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        use crate::util::constants;
        Self {
            poll_interval: Duration::from_millis(constants::DEFAULT_WATCH_POLL_INTERVAL_MS),
            max_depth: WATCH_MAX_DEPTH,
            exclude_patterns: WATCH_EXCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

/// Size + mtime signature used to detect appends and rewrites between
/// polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileSig {
    len: u64,
    mtime: Option<SystemTime>,
}

// =============================================================================
// DirWatcher
// =============================================================================

/// Background polling watcher publishing FsEvents to the bus.
pub struct DirWatcher {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DirWatcher {
    /// Validate `root` and start the poll thread. The first poll emits
    /// Created events for files already present, so an agent pointed at
    /// an existing tree begins tailing immediately.
    pub fn start(root: PathBuf, bus: Arc<EventBus<FsEvent>>, config: WatchConfig) -> Result<Self> {
        let meta = match std::fs::metadata(&root) {
            Ok(meta) => meta,
            Err(e) => {
                return Err(match e.kind() {
                    std::io::ErrorKind::NotFound => {
                        WatchError::RootNotFound { path: root }.into()
                    }
                    std::io::ErrorKind::PermissionDenied => WatchError::PermissionDenied {
                        path: root,
                        source: e,
                    }
                    .into(),
                    _ => AgentError::Io {
                        path: root,
                        operation: "stat watch root",
                        source: e,
                    },
                });
            }
        };
        if !meta.is_dir() {
            return Err(WatchError::NotADirectory { path: root }.into());
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let thread_cancel = Arc::clone(&cancel);
        let handle = std::thread::Builder::new()
            .name("logpulse-watcher".to_string())
            .spawn(move || run_watcher(root, bus, config, thread_cancel))
            .expect("spawn watcher thread");

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }

    /// Signal the poll thread to stop and wait for it to exit.
    /// Idempotent; also runs on drop.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            tracing::info!("watcher stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for DirWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Background thread
// =============================================================================

fn run_watcher(
    root: PathBuf,
    bus: Arc<EventBus<FsEvent>>,
    config: WatchConfig,
    cancel: Arc<AtomicBool>,
) {
    // Compile glob patterns once for the lifetime of this watcher.
    let exclude_pats: Vec<Pattern> = config
        .exclude_patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect();

    let check = Duration::from_millis(WATCH_CANCEL_CHECK_INTERVAL_MS);
    let slices = (config.poll_interval.as_millis() / check.as_millis()).max(1) as u64;

    let mut known: HashMap<PathBuf, FileSig> = HashMap::new();

    tracing::debug!(root = %root.display(), "watcher thread running");

    loop {
        scan_once(&root, &exclude_pats, config.max_depth, &mut known, &bus);

        // Sleep in sub-intervals so cancellation is detected promptly.
        for _ in 0..slices {
            if cancel.load(Ordering::SeqCst) {
                tracing::debug!("watcher thread: cancel flag set, exiting");
                return;
            }
            std::thread::sleep(check);
        }
    }
}

/// Walk the tree once, publish Created/Modified/Deleted events for the
/// differences against `known`, and update `known` in place.
fn scan_once(
    root: &Path,
    exclude_pats: &[Pattern],
    max_depth: usize,
    known: &mut HashMap<PathBuf, FileSig>,
    bus: &EventBus<FsEvent>,
) {
    let mut seen: HashMap<PathBuf, FileSig> = HashMap::with_capacity(known.len());

    let walker = walkdir::WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            // Never descend into excluded directories; skips the whole
            // subtree with a single check.
            let name = entry.file_name().to_string_lossy();
            !exclude_pats.iter().any(|p| p.matches(&name))
        });

    // Per-entry walk errors are non-fatal: the entry is skipped and
    // reappears on a later poll if it becomes readable.
    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let sig = FileSig {
            len: meta.len(),
            mtime: meta.modified().ok(),
        };
        seen.insert(entry.path().to_path_buf(), sig);
    }

    // New and changed files.
    for (path, sig) in &seen {
        match known.get(path) {
            None => {
                bus.publish(FsEvent::new(FsEventKind::Created, path.clone()));
            }
            Some(old) if old != sig => {
                bus.publish(FsEvent::new(FsEventKind::Modified, path.clone()));
            }
            Some(_) => {}
        }
    }

    // Vanished files.
    for path in known.keys() {
        if !seen.contains_key(path) {
            bus.publish(FsEvent::new(FsEventKind::Deleted, path.clone()));
        }
    }

    *known = seen;
}
