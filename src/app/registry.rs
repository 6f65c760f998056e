// logpulse - app/registry.rs
//
// Per-path tailing state with an epoch lifecycle.
//
// Concurrency discipline:
//   - `offset` and `carry` are only touched under the per-state gate.
//   - `dirty` and `delete_pending` live in one atomic flag word so the
//     invariant "delete-pending clears dirty and blocks re-dirtying" is a
//     single compare-and-swap, settable without holding the gate.
//   - A state's `generation` equals the path's epoch at creation + 1.
//     `finalize_delete` bumps the epoch, so a worker holding a capture
//     taken before the finalise sees `generation != epoch + 1` and knows
//     its work is obsolete. Pointer identity is never compared.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::core::scanner::PartialLineBuffer;

const DIRTY: u8 = 0b01;
const DELETE_PENDING: u8 = 0b10;

// =============================================================================
// File state
// =============================================================================

/// Tail position and partial-line carry for one file. Guarded by the
/// owning state's gate.
#[derive(Debug, Default)]
pub struct TailCursor {
    /// Bytes of the file already consumed.
    pub offset: u64,
    /// Unterminated line fragment from the last consumed chunk.
    pub carry: PartialLineBuffer,
}

/// Mutable per-path record shared between workers.
#[derive(Debug)]
pub struct FileState {
    flags: AtomicU8,
    /// Mutual-exclusion gate over the tail cursor. Workers try-acquire it;
    /// a contended attempt is coalesced into the holder's dirty re-check.
    pub gate: Mutex<TailCursor>,
    generation: u64,
}

impl FileState {
    fn new(generation: u64) -> Self {
        Self {
            flags: AtomicU8::new(0),
            gate: Mutex::new(TailCursor::default()),
            generation,
        }
    }

    /// Identity stamp assigned at creation: epoch(path) + 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Set the dirty flag unless a delete is pending. Returns true iff
    /// the flag was set (or already set).
    pub fn mark_dirty_if_allowed(&self) -> bool {
        self.flags
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |flags| {
                if flags & DELETE_PENDING != 0 {
                    None
                } else {
                    Some(flags | DIRTY)
                }
            })
            .is_ok()
    }

    /// Clear and return the dirty flag. Called by the gate holder at the
    /// top of each reprocess cycle.
    pub fn take_dirty(&self) -> bool {
        self.flags.fetch_and(!DIRTY, Ordering::AcqRel) & DIRTY != 0
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.load(Ordering::Acquire) & DIRTY != 0
    }

    /// Flag the state for deletion. Clears dirty in the same atomic step
    /// and blocks any further dirtying.
    pub fn mark_delete_pending(&self) {
        // The closure never returns None, so the update cannot fail.
        let _ = self
            .flags
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |flags| {
                Some((flags | DELETE_PENDING) & !DIRTY)
            });
    }

    pub fn is_delete_pending(&self) -> bool {
        self.flags.load(Ordering::Acquire) & DELETE_PENDING != 0
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Concurrent mapping from path to tailing state, plus the per-path epoch
/// counters that outlive individual states.
#[derive(Debug, Default)]
pub struct FileStateRegistry {
    states: DashMap<PathBuf, Arc<FileState>>,
    epochs: DashMap<PathBuf, u64>,
}

impl FileStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic get-or-insert. Concurrent first creations all observe the
    /// same instance.
    pub fn get_or_create(&self, path: &Path) -> Arc<FileState> {
        if let Some(existing) = self.states.get(path) {
            return Arc::clone(&existing);
        }
        let entry = self
            .states
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(FileState::new(self.epoch(path) + 1)));
        Arc::clone(&entry)
    }

    /// Lock-free lookup of an existing state.
    pub fn try_get(&self, path: &Path) -> Option<Arc<FileState>> {
        self.states.get(path).map(|entry| Arc::clone(&entry))
    }

    /// Times a state for this path has been finalised.
    pub fn epoch(&self, path: &Path) -> u64 {
        self.epochs.get(path).map(|e| *e).unwrap_or(0)
    }

    /// True iff `state` is the registry's current generation for `path`.
    /// A stale capture (taken before a finalise) fails this check.
    pub fn is_current(&self, path: &Path, state: &FileState) -> bool {
        state.generation() == self.epoch(path) + 1
    }

    /// Remove the state for `path` and bump its epoch. A subsequent
    /// `get_or_create` builds a fresh state with a strictly larger
    /// generation.
    ///
    /// Callers finalising a live state hold its gate and clear the cursor
    /// (offset and carry allocation) under that same hold; this method
    /// deliberately takes no gate so it can be called from inside one.
    pub fn finalize_delete(&self, path: &Path) {
        if !self.states.contains_key(path) {
            return;
        }
        // Epoch first, then removal. A get-or-create racing with the
        // removal must never observe an empty map with the old epoch, or
        // the successor state would be born already-obsolete. Between the
        // bump and the removal it simply sees the old (now stale) state,
        // which the generation check rejects.
        *self.epochs.entry(path.to_path_buf()).or_insert(0) += 1;
        self.states.remove(path);
        tracing::debug!(file = %path.display(), "file state finalised");
    }

    /// Number of files currently tracked.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let registry = FileStateRegistry::new();
        let path = Path::new("/p.log");
        let a = registry.get_or_create(path);
        let b = registry.get_or_create(path);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    /// Delete/recreate: the fresh state has a strictly larger generation
    /// and an empty cursor.
    #[test]
    fn test_delete_recreate_epoch_cycle() {
        let registry = FileStateRegistry::new();
        let path = Path::new("/p.log");

        let first = registry.get_or_create(path);
        assert_eq!(first.generation(), 1);
        first.gate.lock().offset = 99;
        first.gate.lock().carry.extend(b"partial");

        registry.finalize_delete(path);
        assert_eq!(registry.epoch(path), 1);
        assert!(registry.try_get(path).is_none());

        let second = registry.get_or_create(path);
        assert_eq!(second.generation(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        let cursor = second.gate.lock();
        assert_eq!(cursor.offset, 0);
        assert!(cursor.carry.is_empty());
    }

    /// A capture taken before the finalise is detectably obsolete.
    #[test]
    fn test_stale_capture_fails_is_current() {
        let registry = FileStateRegistry::new();
        let path = Path::new("/p.log");

        let stale = registry.get_or_create(path);
        assert!(registry.is_current(path, &stale));

        registry.finalize_delete(path);
        assert!(!registry.is_current(path, &stale));

        let fresh = registry.get_or_create(path);
        assert!(registry.is_current(path, &fresh));
        assert!(!registry.is_current(path, &stale));
    }

    /// Delete-pending clears dirty and blocks re-dirtying.
    #[test]
    fn test_delete_pending_blocks_dirty() {
        let state = FileState::new(1);
        assert!(state.mark_dirty_if_allowed());
        assert!(state.is_dirty());

        state.mark_delete_pending();
        assert!(!state.is_dirty());
        assert!(state.is_delete_pending());
        assert!(!state.mark_dirty_if_allowed());
        assert!(!state.is_dirty());
    }

    #[test]
    fn test_take_dirty_clears_flag() {
        let state = FileState::new(1);
        state.mark_dirty_if_allowed();
        assert!(state.take_dirty());
        assert!(!state.take_dirty());
        assert!(!state.is_dirty());
    }

    /// Finalising a path with no state is a no-op and does not advance
    /// the epoch.
    #[test]
    fn test_finalize_unknown_path_is_noop() {
        let registry = FileStateRegistry::new();
        let path = Path::new("/never-seen.log");
        registry.finalize_delete(path);
        assert_eq!(registry.epoch(path), 0);
    }

    /// Concurrent first creation must hand every thread the same state.
    #[test]
    fn test_concurrent_get_or_create() {
        let registry = Arc::new(FileStateRegistry::new());
        let path = PathBuf::from("/race.log");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let path = path.clone();
                std::thread::spawn(move || registry.get_or_create(&path))
            })
            .collect();

        let states: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for state in &states[1..] {
            assert!(Arc::ptr_eq(&states[0], state));
        }
        assert_eq!(registry.len(), 1);
    }
}
