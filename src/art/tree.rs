//! Tree operations over the sentinel root (C4): `upsert`, `lookup`,
//! `remove`, `len`.
//!
//! Every operation is a lock-coupled descent starting from a fixed
//! sentinel slot (`meta_version`/`root`) rather than the real root node
//! itself, so "the root changed" (grown, split, collapsed) is just another
//! instance of "a parent's child slot changed" instead of a special case.
//! A [`Restart`] anywhere along the descent aborts the whole operation and
//! starts over from the sentinel; there is no partial-progress resume.

use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use super::lock::{OptLock, Restart};
use super::mutate::{self, AddOutcome, RemoveOutcome};
use super::node::Node;
use super::pool::NodePool;
use super::search;
use super::stats::ShapeStats;

/// Tuning knobs for a [`RadixTree`]. See `SPEC_FULL.md` §8.
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-kind cap on each thread's node free-list.
    pub initial_pool_capacity: usize,
    /// Whether [`RadixTree::shape_stats`] is expected to be called; purely
    /// advisory, `shape_stats` works regardless — kept so callers can
    /// document intent the way `memkv::Config::auto_compact` did for its
    /// now-dropped compaction feature.
    pub collect_shape_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            initial_pool_capacity: 64,
            collect_shape_stats: false,
        }
    }
}

/// A concurrent, in-memory ordered index from byte-string keys to values of
/// type `V`, backed by an Adaptive Radix Tree.
///
/// All four operations (`upsert`, `lookup`, `remove`, `len`) are lock-free
/// for readers and lock-coupled for writers: a writer only ever holds the
/// write lock on a small, bounded chain of ancestors (parent, current, and
/// occasionally grandparent during a split), never the whole tree.
pub struct RadixTree<V> {
    meta_version: AtomicU64,
    root: AtomicPtr<Node<V>>,
    pool: NodePool<V>,
    len: AtomicUsize,
    config: Config,
}

// Safety: every node reachable from `root` is owned exactly once by the
// tree (never aliased by a live `&mut` outside the optimistic-lock
// protocol), and the protocol's version checks are what make sharing a
// `&RadixTree<V>` across threads sound, the same argument the teacher
// crate makes for its own Send/Sync arena and KV wrapper.
unsafe impl<V: Send> Send for RadixTree<V> {}
unsafe impl<V: Send> Sync for RadixTree<V> {}

impl<V> RadixTree<V> {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        RadixTree {
            meta_version: AtomicU64::new(0),
            root: AtomicPtr::new(std::ptr::null_mut()),
            pool: NodePool::new(config.initial_pool_capacity),
            len: AtomicUsize::new(0),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(super) fn meta_version(&self) -> &AtomicU64 {
        &self.meta_version
    }

    pub(super) fn root_ptr(&self) -> &AtomicPtr<Node<V>> {
        &self.root
    }

    /// Walk the tree and tally per-kind node counts. A debug/test aid, not
    /// on the hot path; see `SPEC_FULL.md` §8 (P6) and §11.
    pub fn shape_stats(&self) -> ShapeStats
    where
        V: Clone,
    {
        loop {
            if let Ok(stats) = self.try_shape_stats() {
                return stats;
            }
        }
    }

    fn try_shape_stats(&self) -> Result<ShapeStats, Restart> {
        let mut stats = ShapeStats::default();
        let meta_v = OptLock::read_lock(&self.meta_version)?;
        let root_ptr = self.root.load(Ordering::Acquire);
        OptLock::read_unlock(&self.meta_version, meta_v)?;
        if !root_ptr.is_null() {
            self.walk_stats(root_ptr, &mut stats)?;
        }
        Ok(stats)
    }

    fn walk_stats(&self, node_ptr: *mut Node<V>, stats: &mut ShapeStats) -> Result<(), Restart> {
        let node = unsafe { &*node_ptr };
        let v = OptLock::read_lock(node.version())?;
        stats.record(node);
        if !node.is_leaf() {
            if let Some(terminal) = node.terminal() {
                let t = terminal.load(Ordering::Acquire);
                if !t.is_null() {
                    self.walk_stats(t, stats)?;
                }
            }
            for byte in 0..=255u8 {
                if let Some(slot) = search::find_child(node, byte) {
                    let child = slot.load(Ordering::Acquire);
                    if !child.is_null() {
                        self.walk_stats(child, stats)?;
                    }
                }
                if byte == 255 {
                    break;
                }
            }
        }
        OptLock::read_unlock(node.version(), v)
    }

    pub fn lookup(&self, key: &[u8]) -> Option<V>
    where
        V: Clone,
    {
        loop {
            if let Ok(result) = self.try_lookup(key) {
                return result;
            }
        }
    }

    fn try_lookup(&self, key: &[u8]) -> Result<Option<V>, Restart>
    where
        V: Clone,
    {
        let meta_v = OptLock::read_lock(&self.meta_version)?;
        let mut node_ptr = self.root.load(Ordering::Acquire);
        OptLock::read_unlock(&self.meta_version, meta_v)?;
        if node_ptr.is_null() {
            return Ok(None);
        }

        let mut depth = 0usize;
        loop {
            let node = unsafe { &*node_ptr };
            let node_v = OptLock::read_lock(node.version())?;

            if node.is_leaf() {
                let found = node.leaf_matches(key).then(|| node.leaf_value().clone());
                OptLock::read_unlock(node.version(), node_v)?;
                return Ok(found);
            }

            if !prefix_matches(node, key, depth)? {
                OptLock::read_unlock(node.version(), node_v)?;
                return Ok(None);
            }
            depth += node.prefix_len();

            if depth == key.len() {
                let terminal_ptr = node
                    .terminal()
                    .map(|slot| slot.load(Ordering::Acquire))
                    .unwrap_or(std::ptr::null_mut());
                OptLock::read_unlock(node.version(), node_v)?;
                if terminal_ptr.is_null() {
                    return Ok(None);
                }
                let terminal = unsafe { &*terminal_ptr };
                let tv = OptLock::read_lock(terminal.version())?;
                let value = terminal.leaf_value().clone();
                OptLock::read_unlock(terminal.version(), tv)?;
                return Ok(Some(value));
            }
            if depth > key.len() {
                OptLock::read_unlock(node.version(), node_v)?;
                return Ok(None);
            }

            let byte = key[depth];
            let child_ptr = search::find_child(node, byte)
                .map(|slot| slot.load(Ordering::Acquire))
                .unwrap_or(std::ptr::null_mut());
            OptLock::read_unlock(node.version(), node_v)?;
            if child_ptr.is_null() {
                return Ok(None);
            }
            node_ptr = child_ptr;
            depth += 1;
        }
    }

    pub fn upsert(&self, key: &[u8], value: V) -> Option<V>
    where
        V: Clone,
    {
        let mut value = Some(value);
        loop {
            match self.try_upsert(key, value.take().unwrap()) {
                Ok(old) => return old,
                Err((Restart, v)) => value = Some(v),
            }
        }
    }

    /// On `Err`, the unconsumed `value` is handed back so the caller can
    /// retry without having moved it into a half-completed mutation —
    /// every path below that actually allocates a leaf (consuming `value`)
    /// only does so after its lock acquisitions have already succeeded, so
    /// a `Restart` is never returned once `value` has been consumed.
    fn try_upsert(&self, key: &[u8], value: V) -> Result<Option<V>, (Restart, V)>
    where
        V: Clone,
    {
        macro_rules! bail {
            ($value:expr) => {
                return Err((Restart, $value))
            };
        }

        let meta_v = match OptLock::read_lock(&self.meta_version) {
            Ok(v) => v,
            Err(_) => bail!(value),
        };
        let root_ptr = self.root.load(Ordering::Acquire);

        if root_ptr.is_null() {
            if OptLock::upgrade(&self.meta_version, meta_v).is_err() {
                bail!(value);
            }
            if !self.root.load(Ordering::Relaxed).is_null() {
                OptLock::write_unlock(&self.meta_version);
                bail!(value);
            }
            let leaf = Box::into_raw(self.pool.alloc_leaf(key, value));
            self.root.store(leaf, Ordering::Release);
            self.len.fetch_add(1, Ordering::Relaxed);
            OptLock::write_unlock(&self.meta_version);
            return Ok(None);
        }
        if OptLock::check(&self.meta_version, meta_v).is_err() {
            bail!(value);
        }

        let mut parent_version: &AtomicU64 = &self.meta_version;
        let mut parent_captured = meta_v;
        let mut parent_slot: &AtomicPtr<Node<V>> = &self.root;
        let mut current_ptr = root_ptr;
        let mut depth = 0usize;

        loop {
            let current = unsafe { &*current_ptr };
            let current_captured = match OptLock::read_lock(current.version()) {
                Ok(v) => v,
                Err(_) => bail!(value),
            };
            if OptLock::check(parent_version, parent_captured).is_err() {
                bail!(value);
            }

            if current.is_leaf() {
                if current.leaf_matches(key) {
                    if OptLock::upgrade(current.version(), current_captured).is_err() {
                        bail!(value);
                    }
                    let current_mut = unsafe { &mut *current_ptr };
                    let old = std::mem::replace(current_mut.leaf_value_mut(), value);
                    OptLock::write_unlock(current_mut.version());
                    return Ok(Some(old));
                }

                if OptLock::check(current.version(), current_captured).is_err() {
                    bail!(value);
                }
                if OptLock::upgrade(parent_version, parent_captured).is_err() {
                    bail!(value);
                }
                if parent_slot.load(Ordering::Relaxed) != current_ptr {
                    OptLock::write_unlock(parent_version);
                    bail!(value);
                }

                let old_key_owned = current.leaf_key().to_vec();
                let common = common_prefix_len(&old_key_owned[depth..], &key[depth..]);
                let split_at = depth + common;
                // One of the two keys may be a byte-for-byte prefix of the
                // other (spec.md §8 scenario 4): the shorter one is fully
                // consumed at `split_at` and has no discriminating byte to
                // sit beside its sibling, so it becomes the new node's
                // `terminal` leaf instead of a second keyed child.
                let old_exhausted = split_at == old_key_owned.len();
                let new_exhausted = split_at == key.len();
                debug_assert!(!(old_exhausted && new_exhausted), "leaf_matches would have caught exact equality");
                let new_leaf = Box::into_raw(self.pool.alloc_leaf(key, value));
                let mut split = self.pool.alloc_n4();
                if let Node::N4(n4) = split.as_mut() {
                    n4.prefix_len = common as u32;
                    let cap = common.min(super::node::INLINE_PREFIX_MAX);
                    n4.prefix[..cap].copy_from_slice(&key[depth..depth + cap]);
                    if old_exhausted {
                        n4.terminal.store(current_ptr, Ordering::Relaxed);
                        n4.child_num = 1;
                        n4.keys[0] = key[split_at];
                        n4.children[0].store(new_leaf, Ordering::Relaxed);
                    } else if new_exhausted {
                        n4.terminal.store(new_leaf, Ordering::Relaxed);
                        n4.child_num = 1;
                        n4.keys[0] = old_key_owned[split_at];
                        n4.children[0].store(current_ptr, Ordering::Relaxed);
                    } else {
                        n4.child_num = 2;
                        let old_byte = old_key_owned[split_at];
                        let new_byte = key[split_at];
                        if old_byte < new_byte {
                            n4.keys[0] = old_byte;
                            n4.children[0].store(current_ptr, Ordering::Relaxed);
                            n4.keys[1] = new_byte;
                            n4.children[1].store(new_leaf, Ordering::Relaxed);
                        } else {
                            n4.keys[0] = new_byte;
                            n4.children[0].store(new_leaf, Ordering::Relaxed);
                            n4.keys[1] = old_byte;
                            n4.children[1].store(current_ptr, Ordering::Relaxed);
                        }
                    }
                }
                let split_ptr = Box::into_raw(split);
                parent_slot.store(split_ptr, Ordering::Release);
                self.len.fetch_add(1, Ordering::Relaxed);
                OptLock::write_unlock(parent_version);
                return Ok(None);
            }

            let node_prefix_len = current.prefix_len();
            if node_prefix_len > 0 {
                let matched = match matched_prefix_len(current, key, depth) {
                    Ok(m) => m,
                    Err(_) => bail!(value),
                };
                if matched < node_prefix_len {
                    if OptLock::check(current.version(), current_captured).is_err() {
                        bail!(value);
                    }
                    if OptLock::upgrade(parent_version, parent_captured).is_err() {
                        bail!(value);
                    }
                    if parent_slot.load(Ordering::Relaxed) != current_ptr {
                        OptLock::write_unlock(parent_version);
                        bail!(value);
                    }
                    if OptLock::upgrade(current.version(), current_captured).is_err() {
                        OptLock::write_unlock(parent_version);
                        bail!(value);
                    }

                    let old_byte = match prefix_byte_at(current, depth, matched) {
                        Ok(b) => b,
                        Err(_) => {
                            OptLock::write_unlock(current.version());
                            OptLock::write_unlock(parent_version);
                            bail!(value);
                        }
                    };
                    let current_mut = unsafe { &mut *current_ptr };
                    // The search key can't have overrun the node's full
                    // prefix here (that's the `matched == node_prefix_len`
                    // case handled below), but it can run out exactly at
                    // the divergence point (spec.md §8 scenario 4) — then
                    // there is no discriminating byte for the new leaf and
                    // it becomes this split node's `terminal` instead.
                    let new_exhausted = depth + matched == key.len();
                    let new_leaf = Box::into_raw(self.pool.alloc_leaf(key, value));

                    current_mut.remove_prefix(matched + 1);
                    let mut split = self.pool.alloc_n4();
                    if let Node::N4(n4) = split.as_mut() {
                        n4.prefix_len = matched as u32;
                        let cap = matched.min(super::node::INLINE_PREFIX_MAX);
                        n4.prefix[..cap].copy_from_slice(&key[depth..depth + cap]);
                        if new_exhausted {
                            n4.terminal.store(new_leaf, Ordering::Relaxed);
                            n4.child_num = 1;
                            n4.keys[0] = old_byte;
                            n4.children[0].store(current_ptr, Ordering::Relaxed);
                        } else {
                            let new_byte = key[depth + matched];
                            n4.child_num = 2;
                            if old_byte < new_byte {
                                n4.keys[0] = old_byte;
                                n4.children[0].store(current_ptr, Ordering::Relaxed);
                                n4.keys[1] = new_byte;
                                n4.children[1].store(new_leaf, Ordering::Relaxed);
                            } else {
                                n4.keys[0] = new_byte;
                                n4.children[0].store(new_leaf, Ordering::Relaxed);
                                n4.keys[1] = old_byte;
                                n4.children[1].store(current_ptr, Ordering::Relaxed);
                            }
                        }
                    }
                    let split_ptr = Box::into_raw(split);
                    parent_slot.store(split_ptr, Ordering::Release);
                    OptLock::write_unlock(current_mut.version());
                    self.len.fetch_add(1, Ordering::Relaxed);
                    OptLock::write_unlock(parent_version);
                    return Ok(None);
                }
                depth += node_prefix_len;
            }

            if depth == key.len() {
                let terminal_ptr = current
                    .terminal()
                    .map(|slot| slot.load(Ordering::Acquire))
                    .unwrap_or(std::ptr::null_mut());
                if !terminal_ptr.is_null() {
                    let terminal = unsafe { &*terminal_ptr };
                    let terminal_v = match OptLock::read_lock(terminal.version()) {
                        Ok(v) => v,
                        Err(_) => bail!(value),
                    };
                    if OptLock::upgrade(terminal.version(), terminal_v).is_err() {
                        bail!(value);
                    }
                    let terminal_mut = unsafe { &mut *terminal_ptr };
                    let old = std::mem::replace(terminal_mut.leaf_value_mut(), value);
                    OptLock::write_unlock(terminal_mut.version());
                    return Ok(Some(old));
                }

                if OptLock::upgrade(current.version(), current_captured).is_err() {
                    bail!(value);
                }
                let current_mut = unsafe { &mut *current_ptr };
                if let Some(slot) = current_mut.terminal() {
                    if !slot.load(Ordering::Relaxed).is_null() {
                        // Lost the race with another writer installing a
                        // terminal value; restart and let the other path
                        // (terminal already present) handle it.
                        OptLock::write_unlock(current_mut.version());
                        bail!(value);
                    }
                }
                let new_leaf = Box::into_raw(self.pool.alloc_leaf(key, value));
                if let Some(slot) = current_mut.terminal() {
                    slot.store(new_leaf, Ordering::Release);
                }
                self.len.fetch_add(1, Ordering::Relaxed);
                OptLock::write_unlock(current_mut.version());
                return Ok(None);
            }

            let byte = key[depth];
            let child_ptr = search::find_child(current, byte)
                .map(|slot| slot.load(Ordering::Acquire))
                .unwrap_or(std::ptr::null_mut());

            if child_ptr.is_null() {
                if OptLock::upgrade(current.version(), current_captured).is_err() {
                    bail!(value);
                }
                let current_mut = unsafe { &mut *current_ptr };
                let new_leaf = Box::into_raw(self.pool.alloc_leaf(key, value));
                match mutate::add_child(current_mut, &self.pool, byte, new_leaf) {
                    AddOutcome::InPlace => {
                        OptLock::write_unlock(current_mut.version());
                    }
                    AddOutcome::Grown(grown) => {
                        if OptLock::upgrade(parent_version, parent_captured).is_err() {
                            // The grow computed a replacement node but never
                            // linked it in — `current` itself was never
                            // touched by `add_child` in the Grown case, so
                            // nothing has been committed. Release the lock,
                            // reclaim the not-yet-linked leaf and discard
                            // the spare replacement, then restart — handing
                            // the value back rather than reporting success
                            // for a key that was never actually inserted.
                            OptLock::write_unlock(current_mut.version());
                            let recovered = reclaim_leaf_value(new_leaf);
                            drop(grown);
                            bail!(recovered);
                        }
                        let grown_ptr = Box::into_raw(grown);
                        parent_slot.store(grown_ptr, Ordering::Release);
                        OptLock::write_unlock_obsolete(current_mut.version());
                        unsafe { self.pool.free(current_ptr) };
                        OptLock::write_unlock(parent_version);
                    }
                }
                self.len.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }

            if OptLock::read_unlock(current.version(), current_captured).is_err() {
                bail!(value);
            }
            parent_version = current.version();
            parent_captured = current_captured;
            parent_slot = search::find_child(current, byte).expect("byte located just above");
            current_ptr = child_ptr;
            depth += 1;
        }
    }

    pub fn remove(&self, key: &[u8]) -> Option<V>
    where
        V: Clone,
    {
        loop {
            if let Ok(result) = self.try_remove(key) {
                return result;
            }
        }
    }

    fn try_remove(&self, key: &[u8]) -> Result<Option<V>, Restart>
    where
        V: Clone,
    {
        let meta_v = OptLock::read_lock(&self.meta_version)?;
        let root_ptr = self.root.load(Ordering::Acquire);
        OptLock::read_unlock(&self.meta_version, meta_v)?;
        if root_ptr.is_null() {
            return Ok(None);
        }

        if unsafe { &*root_ptr }.is_leaf() {
            let root = unsafe { &*root_ptr };
            let root_v = OptLock::read_lock(root.version())?;
            if !root.leaf_matches(key) {
                OptLock::read_unlock(root.version(), root_v)?;
                return Ok(None);
            }
            OptLock::check(root.version(), root_v)?;
            OptLock::upgrade(&self.meta_version, meta_v)?;
            if self.root.load(Ordering::Relaxed) != root_ptr {
                OptLock::write_unlock(&self.meta_version);
                return Err(Restart);
            }
            if OptLock::upgrade(root.version(), root_v).is_err() {
                OptLock::write_unlock(&self.meta_version);
                return Err(Restart);
            }
            self.root.store(std::ptr::null_mut(), Ordering::Release);
            let value = root.leaf_value().clone();
            OptLock::write_unlock_obsolete(root.version());
            unsafe { self.pool.free(root_ptr) };
            self.len.fetch_sub(1, Ordering::Relaxed);
            OptLock::write_unlock(&self.meta_version);
            return Ok(Some(value));
        }

        let mut parent_version: &AtomicU64 = &self.meta_version;
        let mut parent_captured = meta_v;
        let mut parent_slot: &AtomicPtr<Node<V>> = &self.root;
        let mut current_ptr = root_ptr;
        let mut depth = 0usize;

        loop {
            let current = unsafe { &*current_ptr };
            let current_captured = OptLock::read_lock(current.version())?;
            OptLock::check(parent_version, parent_captured)?;

            if !prefix_matches(current, key, depth)? {
                OptLock::read_unlock(current.version(), current_captured)?;
                return Ok(None);
            }
            depth += current.prefix_len();

            if depth == key.len() {
                let terminal_ptr = current
                    .terminal()
                    .map(|slot| slot.load(Ordering::Acquire))
                    .unwrap_or(std::ptr::null_mut());
                if terminal_ptr.is_null() {
                    OptLock::read_unlock(current.version(), current_captured)?;
                    return Ok(None);
                }
                OptLock::check(current.version(), current_captured)?;
                OptLock::upgrade(current.version(), current_captured)?;
                let current_mut = unsafe { &mut *current_ptr };
                let slot = current_mut.terminal().expect("checked non-leaf above");
                let leaf_ptr = slot.load(Ordering::Relaxed);
                slot.store(std::ptr::null_mut(), Ordering::Release);
                let leaf = unsafe { &*leaf_ptr };
                let value = leaf.leaf_value().clone();

                // Removing the terminal can leave an N4 with exactly one
                // remaining keyed child and no terminal — the same
                // path-compression case I2 names for child removal. Collapse
                // it into that sole child when the ancestor lock is free;
                // if not, leave the degenerate node in place (still correct,
                // just one extra hop) for a future mutation to compact.
                let collapse = match current_mut {
                    Node::N4(n4) if n4.child_num == 1 => {
                        Some((n4.children[0].load(Ordering::Relaxed), n4.keys[0]))
                    }
                    _ => None,
                };
                match collapse {
                    Some((sole_child, sole_byte))
                        if OptLock::upgrade(parent_version, parent_captured).is_ok() =>
                    {
                        let parent_prefix = current_mut.inline_prefix().to_vec();
                        let parent_prefix_len = current_mut.prefix_len();
                        let sole = unsafe { &mut *sole_child };
                        mutate::prepend_prefix(sole, &parent_prefix, parent_prefix_len, sole_byte);
                        parent_slot.store(sole_child, Ordering::Release);
                        OptLock::write_unlock_obsolete(current_mut.version());
                        unsafe { self.pool.free(current_ptr) };
                        OptLock::write_unlock(parent_version);
                    }
                    _ => {
                        OptLock::write_unlock(current_mut.version());
                    }
                }
                unsafe { self.pool.free(leaf_ptr) };
                self.len.fetch_sub(1, Ordering::Relaxed);
                return Ok(Some(value));
            }

            let byte = key[depth];
            let child_slot = match search::find_child(current, byte) {
                Some(slot) => slot,
                None => {
                    OptLock::read_unlock(current.version(), current_captured)?;
                    return Ok(None);
                }
            };
            let child_ptr = child_slot.load(Ordering::Acquire);
            let child = unsafe { &*child_ptr };
            let child_captured = OptLock::read_lock(child.version())?;
            OptLock::check(current.version(), current_captured)?;

            if child.is_leaf() {
                if !child.leaf_matches(key) {
                    OptLock::read_unlock(child.version(), child_captured)?;
                    return Ok(None);
                }
                OptLock::check(child.version(), child_captured)?;
                OptLock::upgrade(current.version(), current_captured)?;
                if child_slot.load(Ordering::Relaxed) != child_ptr {
                    OptLock::write_unlock(current.version());
                    return Err(Restart);
                }
                if OptLock::upgrade(child.version(), child_captured).is_err() {
                    OptLock::write_unlock(current.version());
                    return Err(Restart);
                }
                let current_mut = unsafe { &mut *current_ptr };
                let value = child.leaf_value().clone();
                let outcome = mutate::remove_child(current_mut, &self.pool, byte);
                OptLock::write_unlock_obsolete(child.version());
                unsafe { self.pool.free(child_ptr) };

                match outcome {
                    RemoveOutcome::InPlace => {
                        OptLock::write_unlock(current_mut.version());
                    }
                    RemoveOutcome::Shrunk(shrunk) => {
                        if OptLock::upgrade(parent_version, parent_captured).is_err() {
                            OptLock::write_unlock(current_mut.version());
                            self.len.fetch_sub(1, Ordering::Relaxed);
                            return Ok(Some(value));
                        }
                        let shrunk_ptr = Box::into_raw(shrunk);
                        parent_slot.store(shrunk_ptr, Ordering::Release);
                        OptLock::write_unlock_obsolete(current_mut.version());
                        unsafe { self.pool.free(current_ptr) };
                        OptLock::write_unlock(parent_version);
                    }
                    RemoveOutcome::Merge { sole_child, sole_byte } => {
                        if OptLock::upgrade(parent_version, parent_captured).is_err() {
                            OptLock::write_unlock(current_mut.version());
                            self.len.fetch_sub(1, Ordering::Relaxed);
                            return Ok(Some(value));
                        }
                        let parent_prefix = current_mut.inline_prefix().to_vec();
                        let parent_prefix_len = current_mut.prefix_len();
                        let sole = unsafe { &mut *sole_child };
                        mutate::prepend_prefix(sole, &parent_prefix, parent_prefix_len, sole_byte);
                        parent_slot.store(sole_child, Ordering::Release);
                        OptLock::write_unlock_obsolete(current_mut.version());
                        unsafe { self.pool.free(current_ptr) };
                        OptLock::write_unlock(parent_version);
                    }
                }
                self.len.fetch_sub(1, Ordering::Relaxed);
                return Ok(Some(value));
            }

            OptLock::read_unlock(current.version(), current_captured)?;
            parent_version = current.version();
            parent_captured = current_captured;
            parent_slot = child_slot;
            current_ptr = child_ptr;
            depth += 1;
        }
    }
}

impl<V> Default for RadixTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare `node`'s compressed prefix (inline, plus a leftmost-leaf
/// consultation for the bytes beyond `INLINE_PREFIX_MAX`) against
/// `key[depth..]`.
fn prefix_matches<V>(node: &Node<V>, key: &[u8], depth: usize) -> Result<bool, Restart> {
    Ok(matched_prefix_len(node, key, depth)? == node.prefix_len())
}

/// How many bytes of `node`'s compressed prefix match `key` starting at
/// `depth`, capped at the first mismatch or the end of `key`.
fn matched_prefix_len<V>(node: &Node<V>, key: &[u8], depth: usize) -> Result<usize, Restart> {
    let inline = node.inline_prefix();
    let cmp_len = inline.len().min(key.len().saturating_sub(depth));
    let mut matched = 0usize;
    for i in 0..cmp_len {
        if key[depth + i] != inline[i] {
            return Ok(matched);
        }
        matched += 1;
    }
    if matched < inline.len() {
        // key ran out before the inline prefix did
        return Ok(matched);
    }
    if node.prefix_len() <= super::node::INLINE_PREFIX_MAX {
        return Ok(matched);
    }
    // Prefix continues past the inline cap; consult a leftmost leaf for the
    // remaining bytes (spec.md's Open Question, decided as OQ-1).
    let remaining = node.prefix_len() - super::node::INLINE_PREFIX_MAX;
    let leaf_key = leftmost_leaf_key(node)?;
    let tail_start = depth + super::node::INLINE_PREFIX_MAX;
    let avail = key.len().saturating_sub(tail_start).min(remaining);
    for i in 0..avail {
        if leaf_key.get(tail_start + i) != key.get(tail_start + i) {
            return Ok(super::node::INLINE_PREFIX_MAX + i);
        }
        matched += 1;
    }
    Ok(matched)
}

/// The byte at absolute key position `depth + offset` within `node`'s
/// compressed prefix, recovered from a leftmost-leaf consultation when
/// `offset` falls beyond the inline cap.
fn prefix_byte_at<V>(node: &Node<V>, depth: usize, offset: usize) -> Result<u8, Restart> {
    let inline = node.inline_prefix();
    if offset < inline.len() {
        return Ok(inline[offset]);
    }
    let leaf_key = leftmost_leaf_key(node)?;
    leaf_key.get(depth + offset).copied().ok_or(Restart)
}

fn leftmost_leaf_key<V>(node: &Node<V>) -> Result<Vec<u8>, Restart> {
    let mut current_ptr = match search::first_child(node) {
        Some(slot) => slot.load(Ordering::Acquire),
        None => return Err(Restart),
    };
    loop {
        if current_ptr.is_null() {
            return Err(Restart);
        }
        let current = unsafe { &*current_ptr };
        let v = OptLock::read_lock(current.version())?;
        if current.is_leaf() {
            let key = current.leaf_key().to_vec();
            OptLock::read_unlock(current.version(), v)?;
            return Ok(key);
        }
        let next_ptr = match search::first_child(current) {
            Some(slot) => slot.load(Ordering::Acquire),
            None => {
                OptLock::read_unlock(current.version(), v)?;
                return Err(Restart);
            }
        };
        OptLock::read_unlock(current.version(), v)?;
        current_ptr = next_ptr;
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Reclaim a freshly allocated, not-yet-linked leaf and hand back its
/// value — used when a speculative insert has to be unwound because a
/// later lock acquisition in the same operation failed.
fn reclaim_leaf_value<V>(leaf_ptr: *mut Node<V>) -> V {
    let leaf_box = unsafe { Box::from_raw(leaf_ptr) };
    match *leaf_box {
        Node::Leaf(n) => n.value,
        _ => unreachable!("reclaim_leaf_value called on a non-leaf pointer"),
    }
}
