// logpulse - app/processor.rs
//
// One tailing pass over one file: read appended bytes, split them into
// lines across chunk boundaries, parse each line, and account everything
// on the worker's stats buffer.
//
// Callers hold the file's gate for the whole call; the &mut TailCursor
// parameter can only be produced from that lock, so per-path exclusion is
// enforced by construction.

use std::path::Path;

use crate::app::registry::TailCursor;
use crate::app::tailer::{read_appended, TailOutcome, TailStatus};
use crate::core::parser::parse_line;
use crate::core::scanner::scan;
use crate::core::stats::StatsBuffer;

/// Tail `path` once from the cursor's offset, feeding complete lines
/// through the parser into `stats`.
///
/// Offset commit rule (advance only after success): the cursor's offset
/// is updated iff bytes were consumed or a truncation was reset. An error
/// before any byte arrived leaves the cursor untouched, so the next dirty
/// cycle retries from the same point.
pub fn process_once(
    path: &Path,
    cursor: &mut TailCursor,
    stats: &mut StatsBuffer,
    scratch: &mut [u8],
) -> TailOutcome {
    // An imminent truncation invalidates the carried fragment: the bytes
    // it came from no longer exist, so they must not prefix post-reset
    // content. Checked here because the tailer only reports truncation
    // after the chunks have already been delivered. The metadata race
    // (truncation landing between this check and the tailer's) at worst
    // garbles one line, which the parser counts as malformed.
    if let Ok(meta) = std::fs::metadata(path) {
        if meta.len() < cursor.offset {
            cursor.carry.clear();
        }
    }

    let mut local_offset = cursor.offset;
    let carry = &mut cursor.carry;

    let outcome = read_appended(path, &mut local_offset, scratch, |chunk| {
        scan(chunk, carry, |line| {
            stats.lines_processed += 1;
            match parse_line(line) {
                Some(parsed) => {
                    stats.record_parsed(parsed.level, parsed.key, parsed.latency_ms);
                }
                None => stats.malformed += 1,
            }
        });
    });

    match outcome.status {
        TailStatus::FileNotFound => stats.file_not_found += 1,
        TailStatus::AccessDenied => stats.access_denied += 1,
        TailStatus::IoError => stats.io_errors += 1,
        TailStatus::TruncatedReset => stats.truncations += 1,
        TailStatus::ReadSome | TailStatus::NoData => {}
    }

    if outcome.bytes_read > 0 || outcome.status == TailStatus::TruncatedReset {
        cursor.offset = local_offset;
    }

    outcome
}
