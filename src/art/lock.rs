//! Optimistic lock-coupling protocol (C5).
//!
//! Each node's version word packs three things into one `u64`: bit 0 marks
//! the node obsolete (logically removed, storage reclaimable once no reader
//! can still be holding a stale reference), bit 1 is the write-lock bit, and
//! bits 2.. are a change counter bumped on every write-unlock. Readers never
//! block: they spin only while the lock bit is set, then validate that the
//! version hasn't moved before trusting anything they read.
//!
//! This mirrors the OLC B+Tree lineage in this crate's ancestry (see the
//! `vlock`/`BPRestart`/`fetch_add(0b10, Release)` pattern retained in this
//! crate's git history from a prior database-engine experiment) rather than
//! anything resembling a blocking `RwLock` — `parking_lot` has no role here
//! because the contract this engine needs (read without blocking writers,
//! validate afterwards, restart on conflict) is not what a blocking latch
//! provides.

use std::sync::atomic::{AtomicU64, Ordering};

pub const OBSOLETE: u64 = 0b01;
pub const LOCKED: u64 = 0b10;

/// A node's in-progress optimistic operation hit a concurrent mutation and
/// must restart from the sentinel root. Never surfaced to callers of the
/// four public tree operations — it is caught and retried internally.
#[derive(Debug, Clone, Copy)]
pub struct Restart;

#[inline]
pub fn is_locked(version: u64) -> bool {
    version & LOCKED != 0
}

#[inline]
pub fn is_obsolete(version: u64) -> bool {
    version & OBSOLETE != 0
}

/// Thin, stateless wrapper over a node's version word. Read-only
/// (`read_lock`/`read_unlock`/`check`) methods take `&AtomicU64` directly;
/// write operations are exposed the same way since at most a handful of
/// nodes are ever write-locked concurrently by one thread (grandparent,
/// parent, current — see spec.md §5) and a RAII guard per node would not
/// simplify the asymmetric unlock-normal vs. unlock-obsolete choice each
/// call site has to make.
pub struct OptLock;

impl OptLock {
    /// Spin until unlocked, then return the observed version — or signal a
    /// restart if the node is already obsolete.
    pub fn read_lock(version_word: &AtomicU64) -> Result<u64, Restart> {
        loop {
            let v = version_word.load(Ordering::Acquire);
            if is_locked(v) {
                std::hint::spin_loop();
                continue;
            }
            if is_obsolete(v) {
                return Err(Restart);
            }
            return Ok(v);
        }
    }

    /// Validate that the version word still matches what an earlier
    /// `read_lock` observed.
    pub fn check(version_word: &AtomicU64, captured: u64) -> Result<(), Restart> {
        if version_word.load(Ordering::Acquire) == captured {
            Ok(())
        } else {
            Err(Restart)
        }
    }

    /// Alias for `check` used at the end of a read-only step, kept as a
    /// separate name to match the read/write-lock/unlock vocabulary in
    /// spec.md §4.5.
    pub fn read_unlock(version_word: &AtomicU64, captured: u64) -> Result<(), Restart> {
        Self::check(version_word, captured)
    }

    /// Promote a captured read version to an exclusive write lock via CAS.
    pub fn upgrade(version_word: &AtomicU64, captured: u64) -> Result<(), Restart> {
        version_word
            .compare_exchange_weak(
                captured,
                captured | LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .map(|_| ())
            .map_err(|_| Restart)
    }

    /// Like `upgrade`, but releases an already write-locked node first on
    /// CAS failure before signalling the restart, so a failed upgrade never
    /// leaks a lock held earlier in the same operation.
    pub fn upgrade_and_release(
        version_word: &AtomicU64,
        captured: u64,
        already_locked: &AtomicU64,
    ) -> Result<(), Restart> {
        match Self::upgrade(version_word, captured) {
            Ok(()) => Ok(()),
            Err(Restart) => {
                Self::write_unlock(already_locked);
                Err(Restart)
            }
        }
    }

    /// Release a write lock, advancing the change counter. The `+= 2`
    /// carries out of the lock bit and into the counter in one add, the
    /// same trick used by every OLC implementation in this lineage.
    pub fn write_unlock(version_word: &AtomicU64) {
        version_word.fetch_add(LOCKED, Ordering::Release);
    }

    /// Release a write lock and mark the node obsolete in the same step.
    pub fn write_unlock_obsolete(version_word: &AtomicU64) {
        version_word.fetch_add(LOCKED | OBSOLETE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_lock_then_unlock_roundtrip() {
        let v = AtomicU64::new(0);
        let version = OptLock::read_lock(&v).unwrap();
        OptLock::read_unlock(&v, version).unwrap();
    }

    #[test]
    fn upgrade_then_write_unlock_advances_counter() {
        let v = AtomicU64::new(0);
        let version = OptLock::read_lock(&v).unwrap();
        OptLock::upgrade(&v, version).unwrap();
        assert!(is_locked(v.load(Ordering::Acquire)));
        OptLock::write_unlock(&v);
        let after = v.load(Ordering::Acquire);
        assert!(!is_locked(after));
        assert!(!is_obsolete(after));
        assert_eq!(after, version + 0b100);
    }

    #[test]
    fn write_unlock_obsolete_sets_obsolete_bit() {
        let v = AtomicU64::new(0);
        let version = OptLock::read_lock(&v).unwrap();
        OptLock::upgrade(&v, version).unwrap();
        OptLock::write_unlock_obsolete(&v);
        let after = v.load(Ordering::Acquire);
        assert!(is_obsolete(after));
        assert!(!is_locked(after));
        assert!(OptLock::read_lock(&v).is_err());
    }

    #[test]
    fn concurrent_upgrade_loses_restarts() {
        let v = AtomicU64::new(0);
        let version = OptLock::read_lock(&v).unwrap();
        OptLock::upgrade(&v, version).unwrap();
        // A second reader captured the same version before our upgrade.
        assert!(OptLock::upgrade(&v, version).is_err());
        OptLock::write_unlock(&v);
    }
}
