// logpulse - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Every tunable bound in the agent lives here so tests and the CLI layer
// reference the same values.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "logpulse";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Event bus
// =============================================================================

/// Default bounded capacity of the filesystem-event bus.
/// When the bus is full, the incoming event is dropped (drop-newest policy)
/// and counted rather than blocking the watcher thread.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// How long a worker blocks in `try_dequeue` before re-checking the
/// shutdown flag (ms). Bounds the latency of a cooperative stop.
pub const DEQUEUE_TIMEOUT_MS: u64 = 200;

// =============================================================================
// Workers
// =============================================================================

/// Hard upper bound on the worker count (prevents configuration mistakes).
pub const ABSOLUTE_MAX_WORKERS: usize = 256;

// =============================================================================
// Tailing
// =============================================================================

/// Chunk size in bytes for incremental tail reads. Each worker owns one
/// scratch buffer of this size, reused across every `read_appended` call.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024; // 64 KiB

// =============================================================================
// Latency histogram geometry
// =============================================================================

/// Largest latency (ms) with a dedicated histogram bin. Samples above this
/// land in the overflow bin; negative samples clamp to bin 0.
pub const HISTOGRAM_MAX_MS: usize = 10_000;

/// Index of the overflow bin.
pub const HISTOGRAM_OVERFLOW_BIN: usize = HISTOGRAM_MAX_MS + 1;

/// Total number of bins: one per millisecond in 0..=HISTOGRAM_MAX_MS,
/// plus the overflow bin.
pub const HISTOGRAM_BINS: usize = HISTOGRAM_MAX_MS + 2;

// =============================================================================
// Reporting
// =============================================================================

/// Default report interval in seconds.
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 2;

/// Default number of top message keys included in each report.
pub const DEFAULT_TOP_K: usize = 10;

/// How often the reporter thread checks its cancel flag within each
/// report-interval sleep (ms).
pub const REPORT_CANCEL_CHECK_INTERVAL_MS: u64 = 100;

// =============================================================================
// Directory watcher
// =============================================================================

/// How often the polling watch adapter walks the directory tree (ms).
pub const DEFAULT_WATCH_POLL_INTERVAL_MS: u64 = 500;

/// Minimum user-configurable watch poll interval (ms).
pub const MIN_WATCH_POLL_INTERVAL_MS: u64 = 50;

/// Maximum user-configurable watch poll interval (ms).
pub const MAX_WATCH_POLL_INTERVAL_MS: u64 = 60_000; // 60 s

/// How often the cancel flag is checked within each watch poll sleep (ms).
pub const WATCH_CANCEL_CHECK_INTERVAL_MS: u64 = 100;

/// Maximum directory recursion depth for the polling watcher.
pub const WATCH_MAX_DEPTH: usize = 10;

/// File extensions the pipeline tails and parses. Events for other files
/// still flow through the bus so delete/rename book-keeping stays correct.
pub const PROCESSABLE_EXTENSIONS: &[&str] = &["log", "txt"];

/// Include glob patterns matching the processable extensions.
pub const WATCH_INCLUDE_PATTERNS: &[&str] = &["*.log", "*.txt"];

/// Glob patterns (file or directory names) the watcher never descends
/// into or reports. Keeps rotation artefacts and VCS noise off the bus.
pub const WATCH_EXCLUDE_PATTERNS: &[&str] = &["*.gz", "*.zip", "*.bak", "*.tmp", ".git"];

// =============================================================================
// Shutdown
// =============================================================================

/// Grace period for worker threads to drain the bus and exit after a stop
/// request (ms). Workers blocked in `try_dequeue` wake within
/// DEQUEUE_TIMEOUT_MS, so this only needs to cover in-flight file work.
pub const SHUTDOWN_GRACE_MS: u64 = 5_000;

// =============================================================================
// Logging
// =============================================================================

/// Default log level for the agent's own diagnostics.
pub const DEFAULT_LOG_LEVEL: &str = "info";
