// logpulse - core/stats.rs
//
// Per-worker statistics accumulator and snapshot maths.
//
// Each worker owns two StatsBuffers and writes to the live one; the
// reporter swaps them each interval and merges the retired buffers into a
// global snapshot. Buffers are reused across intervals: reset keeps map
// capacity so steady-state reporting does not reallocate.

use std::collections::HashMap;

use crate::core::histogram::LatencyHistogram;
use crate::core::model::{FsEventKind, LogLevel, FS_EVENT_KINDS, LOG_LEVELS};

// =============================================================================
// Stats buffer
// =============================================================================

/// Mutable per-worker scratch statistics. Sole writer is the owning
/// worker; the reporter reads it only after the double-buffer swap.
#[derive(Debug, Default)]
pub struct StatsBuffer {
    /// Complete lines fed to the parser.
    pub lines_processed: u64,
    /// Lines rejected by the parser.
    pub malformed: u64,
    /// Filesystem events handled, indexed by `FsEventKind::bin`.
    pub fs_events: [u64; FS_EVENT_KINDS],
    /// Tailer error taxonomy.
    pub file_not_found: u64,
    pub access_denied: u64,
    pub io_errors: u64,
    /// Truncation resets observed by the tailer.
    pub truncations: u64,
    /// Parsed records per level, indexed by `LogLevel::bin`.
    pub level_counts: [u64; LOG_LEVELS],
    /// Message-key occurrence counts.
    pub message_counts: HashMap<String, u64>,
    /// Latency samples from `latency_ms=` fields.
    pub latency: LatencyHistogram,
}

impl StatsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one filesystem event of the given kind.
    pub fn record_fs_event(&mut self, kind: FsEventKind) {
        self.fs_events[kind.bin()] += 1;
    }

    /// Account one successfully parsed record. The key is copied to an
    /// owned string here; the borrowed view must not outlive the call.
    pub fn record_parsed(&mut self, level: LogLevel, key: &[u8], latency_ms: Option<u64>) {
        self.level_counts[level.bin()] += 1;
        let key = String::from_utf8_lossy(key).into_owned();
        *self.message_counts.entry(key).or_insert(0) += 1;
        if let Some(ms) = latency_ms {
            // u64 -> i64 saturation keeps absurd values in the overflow bin.
            self.latency.add(ms.min(i64::MAX as u64) as i64);
        }
    }

    /// Sum every counter of `other` into `self`. Used by the reporter to
    /// fold retired buffers into the interval snapshot.
    pub fn merge_from(&mut self, other: &StatsBuffer) {
        self.lines_processed += other.lines_processed;
        self.malformed += other.malformed;
        for (dst, src) in self.fs_events.iter_mut().zip(other.fs_events.iter()) {
            *dst += *src;
        }
        self.file_not_found += other.file_not_found;
        self.access_denied += other.access_denied;
        self.io_errors += other.io_errors;
        self.truncations += other.truncations;
        for (dst, src) in self.level_counts.iter_mut().zip(other.level_counts.iter()) {
            *dst += *src;
        }
        for (key, count) in &other.message_counts {
            *self.message_counts.entry(key.clone()).or_insert(0) += count;
        }
        self.latency.merge_from(&other.latency);
    }

    /// Zero every counter for reuse. Map and histogram capacity is kept.
    pub fn reset(&mut self) {
        self.lines_processed = 0;
        self.malformed = 0;
        self.fs_events = [0; FS_EVENT_KINDS];
        self.file_not_found = 0;
        self.access_denied = 0;
        self.io_errors = 0;
        self.truncations = 0;
        self.level_counts = [0; LOG_LEVELS];
        self.message_counts.clear();
        self.latency.reset();
    }
}

// =============================================================================
// Top-K
// =============================================================================

/// The K largest message keys by count.
///
/// Ties break by ordinal (byte-wise) ascending key, so the result is
/// stable across runs regardless of map iteration order.
pub fn top_k(counts: &HashMap<String, u64>, k: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(&String, u64)> = counts.iter().map(|(key, &n)| (key, n)).collect();
    entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries
        .into_iter()
        .take(k)
        .map(|(key, n)| (key.clone(), n))
        .collect()
}
