// logpulse - app/tailer.rs
//
// Incremental file tailing: read the bytes appended since a caller-held
// offset, detect truncation, and surface I/O failures as statuses rather
// than errors so one unreadable file never stops the pipeline.
//
// The chunk buffer is owned by the calling worker and reused across every
// call, so steady-state tailing performs no allocation. Chunk views are
// borrowed and valid only inside the `on_chunk` callback.
//
// std's File::open shares the handle for concurrent append, delete, and
// rename on all supported platforms (on Windows it maps to
// FILE_SHARE_READ | WRITE | DELETE), so writers are never blocked.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Result classification of one `read_appended` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailStatus {
    /// New bytes were read and delivered.
    ReadSome,
    /// Nothing appended since the current offset.
    NoData,
    /// The file shrank below the offset; reading restarted from zero.
    TruncatedReset,
    /// The file no longer exists.
    FileNotFound,
    /// The file exists but cannot be opened.
    AccessDenied,
    /// Any other I/O failure, at open time or mid-read.
    IoError,
}

/// Outcome of one tail call: status plus the bytes actually consumed.
#[derive(Debug, Clone, Copy)]
pub struct TailOutcome {
    pub status: TailStatus,
    pub bytes_read: u64,
}

impl TailOutcome {
    fn failed(status: TailStatus) -> Self {
        Self {
            status,
            bytes_read: 0,
        }
    }
}

/// Read every byte appended after `*offset`, invoking `on_chunk` once per
/// filled chunk view.
///
/// Truncation (current length < offset) restarts from byte zero and the
/// outcome is `TruncatedReset` even when nothing follows the reset point.
/// On open or metadata failure `*offset` is left untouched and no
/// callback runs. Otherwise `*offset` advances over exactly the bytes
/// consumed, including the bytes consumed before a mid-read failure:
/// those chunks were already delivered, so re-reading them would
/// double-count lines.
pub fn read_appended(
    path: &Path,
    offset: &mut u64,
    scratch: &mut [u8],
    mut on_chunk: impl FnMut(&[u8]),
) -> TailOutcome {
    debug_assert!(!scratch.is_empty(), "chunk scratch buffer must be non-empty");

    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => return TailOutcome::failed(classify_open_error(&e)),
    };

    let length = match file.metadata() {
        Ok(m) => m.len(),
        Err(e) => return TailOutcome::failed(classify_open_error(&e)),
    };

    let truncated = length < *offset;
    let effective_offset = if truncated {
        tracing::debug!(
            file = %path.display(),
            old_offset = *offset,
            new_length = length,
            "file truncated; resetting offset"
        );
        0
    } else {
        *offset
    };

    if effective_offset >= length {
        if truncated {
            // The reset itself must be committed or every subsequent call
            // would re-detect the same truncation.
            *offset = effective_offset;
            return TailOutcome {
                status: TailStatus::TruncatedReset,
                bytes_read: 0,
            };
        }
        return TailOutcome::failed(TailStatus::NoData);
    }

    if let Err(e) = file.seek(SeekFrom::Start(effective_offset)) {
        return TailOutcome::failed(classify_open_error(&e));
    }

    // Bound this call to the length observed above; bytes appended while
    // we read belong to the next dirty cycle.
    let budget = length - effective_offset;
    let mut bytes_read: u64 = 0;
    let mut status = if truncated {
        TailStatus::TruncatedReset
    } else {
        TailStatus::ReadSome
    };

    while bytes_read < budget {
        let want = scratch.len().min((budget - bytes_read) as usize);
        match file.read(&mut scratch[..want]) {
            // Writer shrank the file under us; stop at what we have.
            Ok(0) => break,
            Ok(n) => {
                on_chunk(&scratch[..n]);
                bytes_read += n as u64;
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "tail read failed mid-stream");
                status = TailStatus::IoError;
                break;
            }
        }
    }

    if truncated || bytes_read > 0 {
        *offset = effective_offset + bytes_read;
    }

    if status == TailStatus::ReadSome && bytes_read == 0 {
        status = TailStatus::NoData;
    }

    TailOutcome { status, bytes_read }
}

/// Map open/stat/seek failures onto the tail status taxonomy.
fn classify_open_error(e: &io::Error) -> TailStatus {
    match e.kind() {
        io::ErrorKind::NotFound => TailStatus::FileNotFound,
        io::ErrorKind::PermissionDenied => TailStatus::AccessDenied,
        _ => TailStatus::IoError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::DEFAULT_CHUNK_SIZE;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn tail_to_vec(path: &Path, offset: &mut u64, scratch: &mut [u8]) -> (TailOutcome, Vec<u8>) {
        let mut collected = Vec::new();
        let outcome = read_appended(path, offset, scratch, |chunk| {
            collected.extend_from_slice(chunk);
        });
        (outcome, collected)
    }

    #[test]
    fn test_reads_appended_bytes_and_advances_offset() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("app.log");
        fs::write(&path, b"hello\n").expect("write");

        let mut scratch = vec![0u8; DEFAULT_CHUNK_SIZE];
        let mut offset = 0u64;

        let (outcome, bytes) = tail_to_vec(&path, &mut offset, &mut scratch);
        assert_eq!(outcome.status, TailStatus::ReadSome);
        assert_eq!(outcome.bytes_read, 6);
        assert_eq!(offset, 6);
        assert_eq!(bytes, b"hello\n");

        // Nothing new yet.
        let (outcome, bytes) = tail_to_vec(&path, &mut offset, &mut scratch);
        assert_eq!(outcome.status, TailStatus::NoData);
        assert_eq!(outcome.bytes_read, 0);
        assert!(bytes.is_empty());
        assert_eq!(offset, 6);

        // Append and tail again: only the new bytes arrive.
        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"world\n").unwrap();
        drop(f);

        let (outcome, bytes) = tail_to_vec(&path, &mut offset, &mut scratch);
        assert_eq!(outcome.status, TailStatus::ReadSome);
        assert_eq!(bytes, b"world\n");
        assert_eq!(offset, 12);
    }

    /// Truncation resets to byte zero and re-reads the rewritten prefix.
    #[test]
    fn test_truncation_resets_offset() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("rotate.log");
        fs::write(&path, b"12345678").expect("write");

        let mut scratch = vec![0u8; DEFAULT_CHUNK_SIZE];
        let mut offset = 0u64;
        tail_to_vec(&path, &mut offset, &mut scratch);
        assert_eq!(offset, 8);

        // Shrink to 3 bytes.
        fs::write(&path, b"abc").expect("truncate");

        let (outcome, bytes) = tail_to_vec(&path, &mut offset, &mut scratch);
        assert_eq!(outcome.status, TailStatus::TruncatedReset);
        assert_eq!(bytes, b"abc");
        assert!(offset <= 3);
        assert_eq!(offset, 3);

        // Subsequent appends read from the reset point only.
        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"de").unwrap();
        drop(f);
        let (outcome, bytes) = tail_to_vec(&path, &mut offset, &mut scratch);
        assert_eq!(outcome.status, TailStatus::ReadSome);
        assert_eq!(bytes, b"de");
    }

    /// Truncation to empty still commits the reset so the next call does
    /// not re-detect it.
    #[test]
    fn test_truncation_to_empty_commits_reset() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("empty.log");
        fs::write(&path, b"content").expect("write");

        let mut scratch = vec![0u8; 64];
        let mut offset = 0u64;
        tail_to_vec(&path, &mut offset, &mut scratch);
        assert_eq!(offset, 7);

        fs::write(&path, b"").expect("truncate to empty");

        let (outcome, bytes) = tail_to_vec(&path, &mut offset, &mut scratch);
        assert_eq!(outcome.status, TailStatus::TruncatedReset);
        assert_eq!(outcome.bytes_read, 0);
        assert!(bytes.is_empty());
        assert_eq!(offset, 0);

        let (outcome, _) = tail_to_vec(&path, &mut offset, &mut scratch);
        assert_eq!(outcome.status, TailStatus::NoData);
    }

    /// A missing file reports FileNotFound and leaves the offset alone.
    #[test]
    fn test_missing_file_leaves_offset_untouched() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("gone.log");

        let mut scratch = vec![0u8; 64];
        let mut offset = 42u64;
        let (outcome, bytes) = tail_to_vec(&path, &mut offset, &mut scratch);
        assert_eq!(outcome.status, TailStatus::FileNotFound);
        assert_eq!(outcome.bytes_read, 0);
        assert!(bytes.is_empty());
        assert_eq!(offset, 42);
    }

    /// Content larger than the scratch buffer arrives as multiple chunks.
    #[test]
    fn test_multiple_chunks_for_large_appends() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("big.log");
        let content: Vec<u8> = (0..100u8).collect();
        fs::write(&path, &content).expect("write");

        let mut scratch = vec![0u8; 16];
        let mut offset = 0u64;
        let mut chunk_count = 0usize;
        let mut collected = Vec::new();
        let outcome = read_appended(&path, &mut offset, &mut scratch, |chunk| {
            chunk_count += 1;
            assert!(chunk.len() <= 16);
            collected.extend_from_slice(chunk);
        });

        assert_eq!(outcome.status, TailStatus::ReadSome);
        assert_eq!(collected, content);
        assert_eq!(offset, 100);
        assert!(chunk_count >= 7, "expected several chunk callbacks");
    }
}
