// logpulse - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies.
//
// These types are the shared vocabulary across all layers.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::util::constants::PROCESSABLE_EXTENSIONS;

// =============================================================================
// Filesystem events
// =============================================================================

/// The kind of filesystem change observed by the watch adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

impl FsEventKind {
    /// Returns all variants in display order.
    pub fn all() -> &'static [FsEventKind] {
        &[
            FsEventKind::Created,
            FsEventKind::Modified,
            FsEventKind::Deleted,
            FsEventKind::Renamed,
        ]
    }

    /// Stable index into per-kind counter arrays.
    pub fn bin(self) -> usize {
        match self {
            FsEventKind::Created => 0,
            FsEventKind::Modified => 1,
            FsEventKind::Deleted => 2,
            FsEventKind::Renamed => 3,
        }
    }

    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            FsEventKind::Created => "created",
            FsEventKind::Modified => "modified",
            FsEventKind::Deleted => "deleted",
            FsEventKind::Renamed => "renamed",
        }
    }
}

/// Number of `FsEventKind` variants, for fixed counter arrays.
pub const FS_EVENT_KINDS: usize = 4;

/// Immutable record of one filesystem change, published on the event bus
/// by the watch adapter.
///
/// `processable` is true iff the file name carries an accepted extension.
/// Non-processable events still flow so that delete/rename book-keeping
/// stays correct for files renamed out of scope.
#[derive(Debug, Clone)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
    /// Previous path, set only for `Renamed`.
    pub old_path: Option<PathBuf>,
    /// When the watcher observed the change.
    pub timestamp: DateTime<Utc>,
    pub processable: bool,
}

impl FsEvent {
    /// Construct an event for `path`, deriving `processable` from the
    /// file extension.
    pub fn new(kind: FsEventKind, path: PathBuf) -> Self {
        let processable = is_processable_path(&path);
        Self {
            kind,
            path,
            old_path: None,
            timestamp: Utc::now(),
            processable,
        }
    }

    /// Construct a rename event. `processable` reflects the new path.
    pub fn renamed(old_path: PathBuf, new_path: PathBuf) -> Self {
        let processable = is_processable_path(&new_path);
        Self {
            kind: FsEventKind::Renamed,
            path: new_path,
            old_path: Some(old_path),
            timestamp: Utc::now(),
            processable,
        }
    }
}

/// Returns true iff `path` has one of the accepted log file extensions
/// (ASCII case-insensitive).
pub fn is_processable_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            PROCESSABLE_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false)
}

// =============================================================================
// Log levels
// =============================================================================

/// Normalised log level parsed from a record's level token.
///
/// Only the four exact tokens DEBUG, INFO, WARN, ERROR map to their
/// variants; every other token maps to `Other`. An unrecognised level
/// never fails the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    #[default]
    Other,
}

impl LogLevel {
    /// Returns all variants in display order.
    pub fn all() -> &'static [LogLevel] {
        &[
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
            LogLevel::Other,
        ]
    }

    /// Map a raw level token to its variant. Byte-exact match, no case
    /// folding: real-world emitters that matter write upper-case levels.
    pub fn from_token(token: &[u8]) -> Self {
        match token {
            b"DEBUG" => LogLevel::Debug,
            b"INFO" => LogLevel::Info,
            b"WARN" => LogLevel::Warn,
            b"ERROR" => LogLevel::Error,
            _ => LogLevel::Other,
        }
    }

    /// Stable index into fixed level-count arrays.
    pub fn bin(self) -> usize {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Warn => 2,
            LogLevel::Error => 3,
            LogLevel::Other => 4,
        }
    }

    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Other => "OTHER",
        }
    }
}

/// Number of `LogLevel` variants, for fixed counter arrays.
pub const LOG_LEVELS: usize = 5;

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Parsed line
// =============================================================================

/// One successfully parsed log record.
///
/// `key` borrows from the scanned line and is valid only while that view
/// is; callers copy it before the input is released.
#[derive(Debug, Clone, Copy)]
pub struct ParsedLine<'a> {
    /// Record timestamp, normalised to UTC.
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// First whitespace-delimited token after the level.
    pub key: &'a [u8],
    /// Value of `latency_ms=<digits>` if present and parseable.
    pub latency_ms: Option<u64>,
}

// =============================================================================
// Global snapshot
// =============================================================================

/// Merged aggregate for one reporting interval, produced by the reporter
/// from all swapped worker buffers and handed to the rendering layer.
#[derive(Debug, Clone, Default)]
pub struct GlobalSnapshot {
    /// Filesystem events observed, indexed by `FsEventKind::bin`.
    pub fs_events: [u64; FS_EVENT_KINDS],
    /// Complete lines fed to the parser.
    pub lines_processed: u64,
    /// Lines rejected by the parser.
    pub malformed: u64,
    /// Parsed records per level, indexed by `LogLevel::bin`.
    pub level_counts: [u64; LOG_LEVELS],
    /// Top-K message keys with counts, count-descending then key-ascending.
    pub top_keys: Vec<(String, u64)>,
    /// Latency percentiles in ms (bin index). `None` when no samples.
    pub p50: Option<usize>,
    pub p95: Option<usize>,
    pub p99: Option<usize>,
    /// Latency samples merged into this snapshot.
    pub latency_samples: u64,
    /// Tailer error taxonomy.
    pub file_not_found: u64,
    pub access_denied: u64,
    pub io_errors: u64,
    /// Truncation resets observed by the tailer.
    pub truncations: u64,
    /// Bus counters at snapshot time (cumulative since start).
    pub bus_published: u64,
    pub bus_dropped: u64,
    /// Number of files currently tracked by the registry.
    pub tracked_files: usize,
}
