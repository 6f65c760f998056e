// logpulse - core/parser.rs
//
// Single-line record parsing. The grammar is fixed:
//
//   <timestamp> SP <level> SP <message-key> [SP <rest>...]
//
// with an optional `latency_ms=<digits>` anywhere after the key.
// The parser borrows from its input and never allocates; the caller
// copies the message key before the line view is released.
//
// Failure policy: an unparseable timestamp (or a line with fewer than
// three tokens) rejects the whole line; an unrecognised level or a
// malformed latency value does not.

use chrono::{DateTime, Utc};
use memchr::memmem;
use std::sync::OnceLock;

use crate::core::model::{LogLevel, ParsedLine};

/// Literal marker preceding a latency value.
const LATENCY_MARKER: &[u8] = b"latency_ms=";

/// Parse one complete line (no trailing LF/CR).
///
/// Returns `None` when the line does not satisfy the grammar; the caller
/// accounts it as malformed. Unknown levels map to `LogLevel::Other` and
/// an absent or unparseable latency leaves `latency_ms` as `None`; both
/// still produce a parsed line.
pub fn parse_line(line: &[u8]) -> Option<ParsedLine<'_>> {
    let mut rest = line;

    let ts_token = next_token(&mut rest)?;
    let ts_str = std::str::from_utf8(ts_token).ok()?;
    // RFC 3339 / ISO-8601 with `Z` or `±HH:MM`, normalised to UTC.
    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(ts_str)
        .ok()?
        .with_timezone(&Utc);

    let level_token = next_token(&mut rest)?;
    let level = LogLevel::from_token(level_token);

    let key = next_token(&mut rest)?;

    let latency_ms = find_latency(rest);

    Some(ParsedLine {
        timestamp,
        level,
        key,
        latency_ms,
    })
}

/// Advance past leading spaces/tabs and return the next token, or `None`
/// when the input is exhausted.
fn next_token<'a>(rest: &mut &'a [u8]) -> Option<&'a [u8]> {
    let mut i = 0;
    while i < rest.len() && matches!(rest[i], b' ' | b'\t') {
        i += 1;
    }
    if i == rest.len() {
        *rest = &rest[i..];
        return None;
    }
    let start = i;
    while i < rest.len() && !matches!(rest[i], b' ' | b'\t') {
        i += 1;
    }
    let token = &rest[start..i];
    *rest = &rest[i..];
    Some(token)
}

/// Locate `latency_ms=` in the bytes after the key and parse the decimal
/// digit run that follows it. Any failure (marker absent, no digits,
/// value exceeding u64) yields `None`.
fn find_latency(rest: &[u8]) -> Option<u64> {
    static FINDER: OnceLock<memmem::Finder<'static>> = OnceLock::new();
    let finder = FINDER.get_or_init(|| memmem::Finder::new(LATENCY_MARKER));

    let pos = finder.find(rest)?;
    let digits = &rest[pos + LATENCY_MARKER.len()..];
    let end = digits
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    // The run is pure ASCII digits; only u64 overflow can fail here.
    std::str::from_utf8(&digits[..end]).ok()?.parse::<u64>().ok()
}
