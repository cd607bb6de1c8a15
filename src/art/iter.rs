//! Best-effort range and prefix iteration, generalized from the teacher's
//! `AdaptiveRadixTree::range`/`prefix_scan` (`memkv::art::mod`).
//!
//! Not one of the four contractual operations (`SPEC_FULL.md` §6/§11):
//! each call takes a single optimistic read pass over the whole subtree and
//! collects into a `Vec`, so it is a snapshot at the moment it ran, not a
//! linearizable view — a concurrent insert or remove may or may not be
//! reflected in the result. Intended for tests and debugging, not as a
//! primary query path.

use std::sync::atomic::Ordering;

use super::lock::OptLock;
use super::node::Node;
use super::search;
use super::tree::RadixTree;

impl<V: Clone> RadixTree<V> {
    /// All `(key, value)` pairs whose key starts with `prefix`, in no
    /// particular order.
    pub fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, V)> {
        loop {
            let mut out = Vec::new();
            if self.try_prefix_scan(prefix, &mut out).is_ok() {
                return out;
            }
            out.clear();
        }
    }

    fn try_prefix_scan(
        &self,
        prefix: &[u8],
        out: &mut Vec<(Vec<u8>, V)>,
    ) -> Result<(), super::lock::Restart> {
        let meta_v = OptLock::read_lock(self.meta_version())?;
        let root_ptr = self.root_ptr().load(Ordering::Acquire);
        OptLock::read_unlock(self.meta_version(), meta_v)?;
        if root_ptr.is_null() {
            return Ok(());
        }
        collect_with_prefix_filter(root_ptr, prefix, out)
    }

    /// All `(key, value)` pairs with `start <= key < end`, in no particular
    /// order — callers that need sorted output should sort the result
    /// themselves, the same way the teacher's own `range` leaves ordering
    /// to its caller's `BTreeMap`-backed delta layer in the general case.
    pub fn range_scan(&self, start: &[u8], end: &[u8]) -> Vec<(Vec<u8>, V)> {
        loop {
            let mut out = Vec::new();
            if self.try_range_scan(start, end, &mut out).is_ok() {
                return out;
            }
            out.clear();
        }
    }

    fn try_range_scan(
        &self,
        start: &[u8],
        end: &[u8],
        out: &mut Vec<(Vec<u8>, V)>,
    ) -> Result<(), super::lock::Restart> {
        let meta_v = OptLock::read_lock(self.meta_version())?;
        let root_ptr = self.root_ptr().load(Ordering::Acquire);
        OptLock::read_unlock(self.meta_version(), meta_v)?;
        if root_ptr.is_null() {
            return Ok(());
        }
        let mut all = Vec::new();
        collect_all(root_ptr, &mut all)?;
        out.extend(
            all.into_iter()
                .filter(|(k, _)| k.as_slice() >= start && k.as_slice() < end),
        );
        Ok(())
    }
}

fn collect_all<V: Clone>(
    node_ptr: *mut Node<V>,
    out: &mut Vec<(Vec<u8>, V)>,
) -> Result<(), super::lock::Restart> {
    let node = unsafe { &*node_ptr };
    let v = OptLock::read_lock(node.version())?;

    if node.is_leaf() {
        out.push((node.leaf_key().to_vec(), node.leaf_value().clone()));
        return OptLock::read_unlock(node.version(), v);
    }

    if let Some(terminal) = node.terminal() {
        let t = terminal.load(Ordering::Acquire);
        if !t.is_null() {
            collect_all(t, out)?;
        }
    }
    for byte in 0u16..=255 {
        if let Some(slot) = search::find_child(node, byte as u8) {
            let child = slot.load(Ordering::Acquire);
            if !child.is_null() {
                collect_all(child, out)?;
            }
        }
    }
    OptLock::read_unlock(node.version(), v)
}

fn collect_with_prefix_filter<V: Clone>(
    node_ptr: *mut Node<V>,
    prefix: &[u8],
    out: &mut Vec<(Vec<u8>, V)>,
) -> Result<(), super::lock::Restart> {
    let mut all = Vec::new();
    collect_all(node_ptr, &mut all)?;
    out.extend(all.into_iter().filter(|(k, _)| k.starts_with(prefix)));
    Ok(())
}
