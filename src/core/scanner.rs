// logpulse - core/scanner.rs
//
// Zero-copy line scanning over byte chunks that arrive fitfully from the
// tailer. A chunk boundary can land anywhere, including between a CR and
// its LF, so bytes after the final newline of each chunk are carried in a
// partial-line buffer and logically prepended to the next chunk.
//
// Lines are emitted as borrowed views excluding the terminating LF and at
// most one preceding CR. The view is valid only for the duration of the
// emit call; consumers copy what they need.

use memchr::memchr;

// =============================================================================
// Partial-line buffer
// =============================================================================

/// Growable byte buffer carrying an unterminated line fragment between
/// chunks.
///
/// The backing allocation is created lazily on first append and released
/// again by `clear`, so idle file states (and finalised ones) hold no
/// heap memory for their carry.
#[derive(Debug, Default)]
pub struct PartialLineBuffer {
    buf: Option<Vec<u8>>,
}

impl PartialLineBuffer {
    pub fn new() -> Self {
        Self { buf: None }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.as_ref().map_or(true, |b| b.is_empty())
    }

    pub fn len(&self) -> usize {
        self.buf.as_ref().map_or(0, |b| b.len())
    }

    /// Append bytes, allocating the backing buffer on first use.
    pub fn extend(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.buf.get_or_insert_with(Vec::new).extend_from_slice(bytes);
    }

    /// View of the carried bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }

    /// Empty the buffer and release its allocation.
    pub fn clear(&mut self) {
        self.buf = None;
    }
}

// =============================================================================
// Line scanner
// =============================================================================

/// Split the logical concatenation `carry ++ chunk` into complete lines.
///
/// `emit` is invoked once per complete line with a view that excludes the
/// terminating LF and, if present, one preceding CR. Empty lines between
/// consecutive newlines are emitted as zero-length views. Bytes after the
/// final LF become the new carry.
///
/// Allocation-free except for lazy growth of the carry.
pub fn scan(chunk: &[u8], carry: &mut PartialLineBuffer, mut emit: impl FnMut(&[u8])) {
    let mut rest = chunk;

    // A pending fragment means the first LF in this chunk terminates a
    // line that started in an earlier chunk.
    if !carry.is_empty() {
        match memchr(b'\n', rest) {
            Some(i) => {
                carry.extend(&rest[..i]);
                emit(trim_cr(carry.as_bytes()));
                carry.clear();
                rest = &rest[i + 1..];
            }
            None => {
                // Still no newline; the whole chunk extends the fragment.
                carry.extend(rest);
                return;
            }
        }
    }

    // Remaining complete lines borrow straight from the chunk.
    while let Some(i) = memchr(b'\n', rest) {
        emit(trim_cr(&rest[..i]));
        rest = &rest[i + 1..];
    }

    if !rest.is_empty() {
        carry.extend(rest);
    }
}

/// Strip at most one trailing CR (CRLF termination).
fn trim_cr(line: &[u8]) -> &[u8] {
    match line {
        [head @ .., b'\r'] => head,
        _ => line,
    }
}
