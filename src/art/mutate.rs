//! Structural mutation: add/remove child, grow, shrink, path compression
//! (C3).
//!
//! Every function here assumes the caller already holds the node's write
//! lock (via [`crate::art::lock::OptLock::upgrade`]) and, for growth or
//! path-compression merges that swap the parent's child slot, the parent's
//! write lock too — lock coupling per spec.md §5. None of these functions
//! touch the version word themselves; the caller bumps it via
//! `write_unlock`/`write_unlock_obsolete` once the swap is visible.

use std::sync::atomic::Ordering;

use super::node::{
    InlineKey, N16Node, N256Node, N48Node, N4Node, Node, NodeType, INLINE_PREFIX_MAX,
};
use super::pool::NodePool;

/// Shrink thresholds per spec.md §3 (I2) and §4.3: a node shrinks one step
/// down exactly when its child count drops to the next-smaller layout's
/// capacity (4/16/48 for N16/N48/N256 respectively) — no extra hysteresis
/// gap, so P6 ("every N16/N48/N256 has more children than its previous
/// layout's capacity, except immediately after growth") always holds once
/// a removal settles.
const N256_SHRINK_AT: usize = 48;
const N48_SHRINK_AT: usize = 16;
const N16_SHRINK_AT: usize = 4;

/// Outcome of [`add_child`]: either the child fit in place, or the node had
/// to grow and `node_ptr`'s parent slot must be repointed at the returned
/// box (with the old node freed back to the pool once unlinked).
pub enum AddOutcome<V> {
    InPlace,
    Grown(Box<Node<V>>),
}

/// Outcome of [`remove_child`]: the child was removed in place, the node
/// shrank to a smaller layout, or — for an N4 left with exactly one child —
/// the node should be elided entirely and replaced by that one remaining
/// child (with the removed node's own prefix folded onto the front of the
/// child's prefix). The last case is path compression, spec.md §4.3.
pub enum RemoveOutcome<V> {
    InPlace,
    Shrunk(Box<Node<V>>),
    Merge { sole_child: *mut Node<V>, sole_byte: u8 },
}

/// Add (or replace) the child at `byte`. Panics if called on a leaf — a
/// leaf never has children, callers must have already branched on
/// `NodeType::Leaf` well before reaching here.
pub fn add_child<V>(node: &mut Node<V>, pool: &NodePool<V>, byte: u8, child: *mut Node<V>) -> AddOutcome<V> {
    match node {
        Node::Leaf(_) => panic!("cannot add a child to a leaf"),
        Node::N4(n) => add_child_n4(n, pool, byte, child),
        Node::N16(n) => add_child_n16(n, pool, byte, child),
        Node::N48(n) => add_child_n48(n, pool, byte, child),
        Node::N256(n) => {
            add_child_n256(n, byte, child);
            AddOutcome::InPlace
        }
    }
}

fn add_child_n4<V>(n: &mut N4Node<V>, pool: &NodePool<V>, byte: u8, child: *mut Node<V>) -> AddOutcome<V> {
    let count = n.child_num as usize;
    for i in 0..count {
        if n.keys[i] == byte {
            n.children[i].store(child, Ordering::Release);
            return AddOutcome::InPlace;
        }
    }
    if count < 4 {
        n.keys[count] = byte;
        n.children[count].store(child, Ordering::Release);
        n.child_num += 1;
        AddOutcome::InPlace
    } else {
        let mut entries: Vec<(u8, *mut Node<V>)> = (0..4)
            .map(|i| (n.keys[i], n.children[i].load(Ordering::Relaxed)))
            .collect();
        entries.push((byte, child));
        entries.sort_unstable_by_key(|(k, _)| *k);

        let mut grown = pool.alloc_n16();
        if let Node::N16(n16) = grown.as_mut() {
            n16.prefix_len = n.prefix_len;
            n16.prefix = n.prefix;
            n16.child_num = entries.len() as u16;
            n16.terminal
                .store(n.terminal.load(Ordering::Relaxed), Ordering::Relaxed);
            for (i, (k, p)) in entries.into_iter().enumerate() {
                n16.keys[i] = k;
                n16.children[i].store(p, Ordering::Relaxed);
            }
        }
        AddOutcome::Grown(grown)
    }
}

fn add_child_n16<V>(n: &mut N16Node<V>, pool: &NodePool<V>, byte: u8, child: *mut Node<V>) -> AddOutcome<V> {
    let count = n.child_num as usize;
    if let Ok(i) = n.keys[..count].binary_search(&byte) {
        n.children[i].store(child, Ordering::Release);
        return AddOutcome::InPlace;
    }
    if count < 16 {
        let insert_at = n.keys[..count].partition_point(|&k| k < byte);
        for i in (insert_at..count).rev() {
            n.keys[i + 1] = n.keys[i];
            let moved = n.children[i].load(Ordering::Relaxed);
            n.children[i + 1].store(moved, Ordering::Relaxed);
        }
        n.keys[insert_at] = byte;
        n.children[insert_at].store(child, Ordering::Release);
        n.child_num += 1;
        AddOutcome::InPlace
    } else {
        let mut grown = pool.alloc_n48();
        if let Node::N48(n48) = grown.as_mut() {
            n48.prefix_len = n.prefix_len;
            n48.prefix = n.prefix;
            n48.terminal
                .store(n.terminal.load(Ordering::Relaxed), Ordering::Relaxed);
            for i in 0..count {
                let p = n.children[i].load(Ordering::Relaxed);
                n48.payload.children[i].store(p, Ordering::Relaxed);
                n48.payload.side[n.keys[i] as usize] = (i + 1) as u8;
            }
            n48.payload.side[byte as usize] = (count + 1) as u8;
            n48.payload.children[count].store(child, Ordering::Relaxed);
            n48.child_num = (count + 1) as u16;
        }
        AddOutcome::Grown(grown)
    }
}

fn add_child_n48<V>(n: &mut N48Node<V>, pool: &NodePool<V>, byte: u8, child: *mut Node<V>) -> AddOutcome<V> {
    let existing = n.payload.side[byte as usize];
    if existing != 0 {
        n.payload.children[(existing - 1) as usize].store(child, Ordering::Release);
        return AddOutcome::InPlace;
    }
    let count = n.child_num as usize;
    if count < 48 {
        n.payload.children[count].store(child, Ordering::Release);
        n.payload.side[byte as usize] = (count + 1) as u8;
        n.child_num += 1;
        AddOutcome::InPlace
    } else {
        let mut grown = pool.alloc_n256();
        if let Node::N256(n256) = grown.as_mut() {
            n256.prefix_len = n.prefix_len;
            n256.prefix = n.prefix;
            n256.terminal
                .store(n.terminal.load(Ordering::Relaxed), Ordering::Relaxed);
            for key_byte in 0..256usize {
                let slot = n.payload.side[key_byte];
                if slot != 0 {
                    let p = n.payload.children[(slot - 1) as usize].load(Ordering::Relaxed);
                    n256.children[key_byte].store(p, Ordering::Relaxed);
                }
            }
            n256.children[byte as usize].store(child, Ordering::Relaxed);
            n256.child_num = (count + 1) as u16;
        }
        AddOutcome::Grown(grown)
    }
}

fn add_child_n256<V>(n: &mut N256Node<V>, byte: u8, child: *mut Node<V>) {
    let slot = &n.children[byte as usize];
    if slot.load(Ordering::Relaxed).is_null() {
        n.child_num += 1;
    }
    slot.store(child, Ordering::Release);
}

/// Remove the child at `byte`, shrinking or flagging a path-compression
/// merge as the child count dictates. Panics if called on a leaf or if
/// `byte` has no child — callers look the child up via
/// [`super::search::find_child`] before calling this, so an absent child
/// here is a logic error, not a recoverable runtime condition.
pub fn remove_child<V>(node: &mut Node<V>, pool: &NodePool<V>, byte: u8) -> RemoveOutcome<V> {
    match node {
        Node::Leaf(_) => panic!("cannot remove a child from a leaf"),
        Node::N4(n) => remove_child_n4(n, byte),
        Node::N16(n) => remove_child_n16(n, pool, byte),
        Node::N48(n) => remove_child_n48(n, pool, byte),
        Node::N256(n) => remove_child_n256(n, pool, byte),
    }
}

fn remove_child_n4<V>(n: &mut N4Node<V>, byte: u8) -> RemoveOutcome<V> {
    let count = n.child_num as usize;
    let idx = n.keys[..count]
        .iter()
        .position(|&k| k == byte)
        .expect("byte must have a child to remove");
    for i in idx..count - 1 {
        n.keys[i] = n.keys[i + 1];
        let moved = n.children[i + 1].load(Ordering::Relaxed);
        n.children[i].store(moved, Ordering::Relaxed);
    }
    n.children[count - 1].store(std::ptr::null_mut(), Ordering::Relaxed);
    n.child_num -= 1;

    if n.child_num == 0 {
        // The one keyed child just removed was this node's last — only its
        // `terminal` leaf (a key that ended exactly at this depth) remains.
        // Collapse the node into that leaf directly; a leaf already carries
        // its own full key, so no prefix folding is needed (`prepend_prefix`
        // no-ops for a leaf target).
        let terminal_ptr = n.terminal.load(Ordering::Relaxed);
        debug_assert!(!terminal_ptr.is_null(), "child_num 1->0 with no terminal violates I4");
        return RemoveOutcome::Merge {
            sole_child: terminal_ptr,
            sole_byte: 0,
        };
    }

    // Only collapse this node away if it now holds nothing but the one
    // remaining child — a node with a terminal value still needs to exist
    // to hold that value even with a single child.
    if n.child_num == 1 && n.terminal.load(Ordering::Relaxed).is_null() {
        RemoveOutcome::Merge {
            sole_child: n.children[0].load(Ordering::Relaxed),
            sole_byte: n.keys[0],
        }
    } else {
        RemoveOutcome::InPlace
    }
}

fn remove_child_n16<V>(n: &mut N16Node<V>, pool: &NodePool<V>, byte: u8) -> RemoveOutcome<V> {
    let count = n.child_num as usize;
    let idx = n.keys[..count]
        .binary_search(&byte)
        .expect("byte must have a child to remove");
    for i in idx..count - 1 {
        n.keys[i] = n.keys[i + 1];
        let moved = n.children[i + 1].load(Ordering::Relaxed);
        n.children[i].store(moved, Ordering::Relaxed);
    }
    n.children[count - 1].store(std::ptr::null_mut(), Ordering::Relaxed);
    n.child_num -= 1;

    if (n.child_num as usize) <= N16_SHRINK_AT {
        let remaining = n.child_num as usize;
        let mut shrunk = pool.alloc_n4();
        if let Node::N4(n4) = shrunk.as_mut() {
            n4.prefix_len = n.prefix_len;
            n4.prefix = n.prefix;
            n4.terminal
                .store(n.terminal.load(Ordering::Relaxed), Ordering::Relaxed);
            n4.child_num = remaining as u16;
            for i in 0..remaining {
                n4.keys[i] = n.keys[i];
                let p = n.children[i].load(Ordering::Relaxed);
                n4.children[i].store(p, Ordering::Relaxed);
            }
        }
        RemoveOutcome::Shrunk(shrunk)
    } else {
        RemoveOutcome::InPlace
    }
}

fn remove_child_n48<V>(n: &mut N48Node<V>, pool: &NodePool<V>, byte: u8) -> RemoveOutcome<V> {
    let slot = n.payload.side[byte as usize];
    assert!(slot != 0, "byte must have a child to remove");
    n.payload.children[(slot - 1) as usize].store(std::ptr::null_mut(), Ordering::Relaxed);
    n.payload.side[byte as usize] = 0;
    n.child_num -= 1;

    if (n.child_num as usize) <= N48_SHRINK_AT {
        let mut shrunk = pool.alloc_n16();
        if let Node::N16(n16) = shrunk.as_mut() {
            n16.prefix_len = n.prefix_len;
            n16.prefix = n.prefix;
            n16.terminal
                .store(n.terminal.load(Ordering::Relaxed), Ordering::Relaxed);
            let mut i = 0usize;
            for key_byte in 0..256usize {
                let s = n.payload.side[key_byte];
                if s != 0 {
                    let p = n.payload.children[(s - 1) as usize].load(Ordering::Relaxed);
                    n16.keys[i] = key_byte as u8;
                    n16.children[i].store(p, Ordering::Relaxed);
                    i += 1;
                }
            }
            n16.child_num = i as u16;
        }
        RemoveOutcome::Shrunk(shrunk)
    } else {
        RemoveOutcome::InPlace
    }
}

fn remove_child_n256<V>(n: &mut N256Node<V>, pool: &NodePool<V>, byte: u8) -> RemoveOutcome<V> {
    assert!(
        !n.children[byte as usize].load(Ordering::Relaxed).is_null(),
        "byte must have a child to remove"
    );
    n.children[byte as usize].store(std::ptr::null_mut(), Ordering::Relaxed);
    n.child_num -= 1;

    if (n.child_num as usize) <= N256_SHRINK_AT {
        let mut shrunk = pool.alloc_n48();
        if let Node::N48(n48) = shrunk.as_mut() {
            n48.prefix_len = n.prefix_len;
            n48.prefix = n.prefix;
            n48.terminal
                .store(n.terminal.load(Ordering::Relaxed), Ordering::Relaxed);
            let mut i = 0usize;
            for key_byte in 0..256usize {
                let p = n.children[key_byte].load(Ordering::Relaxed);
                if !p.is_null() {
                    n48.payload.children[i].store(p, Ordering::Relaxed);
                    n48.payload.side[key_byte] = (i + 1) as u8;
                    i += 1;
                }
            }
            n48.child_num = i as u16;
        }
        RemoveOutcome::Shrunk(shrunk)
    } else {
        RemoveOutcome::InPlace
    }
}

/// Fold a byte and a parent's compressed prefix onto the front of a child's
/// prefix during path compression — used when an N4 shrinks to its sole
/// remaining child. `parent_prefix_inline` is the parent's inline bytes
/// (up to `INLINE_PREFIX_MAX`, possibly shorter than its true prefix);
/// `parent_prefix_len` is that true length, needed separately because a
/// parent whose own prefix already exceeded the inline cap would otherwise
/// have its length understated here. Bytes beyond `INLINE_PREFIX_MAX` are
/// silently dropped from the inline store (see
/// [`super::node::Node::set_prefix`]); exact recovery beyond the cap always
/// goes through a leftmost-leaf consultation instead (spec.md's Open
/// Question, decided as OQ-1).
pub fn prepend_prefix<V>(
    child: &mut Node<V>,
    parent_prefix_inline: &[u8],
    parent_prefix_len: usize,
    discriminator: u8,
) {
    if child.is_leaf() {
        return;
    }
    let mut combined: InlineKey = InlineKey::new();
    combined.extend_from_slice(parent_prefix_inline);
    combined.push(discriminator);
    let new_len = parent_prefix_len + 1 + child.prefix_len();
    combined.extend_from_slice(child.inline_prefix());
    combined.truncate(INLINE_PREFIX_MAX);
    child.set_prefix(&combined);
    // set_prefix recomputed the length from `combined`'s truncated length;
    // restore the true (possibly over-cap) length.
    force_prefix_len(child, new_len);
}

fn force_prefix_len<V>(node: &mut Node<V>, len: usize) {
    match node {
        Node::Leaf(_) => {}
        Node::N4(n) => n.prefix_len = len as u32,
        Node::N16(n) => n.prefix_len = len as u32,
        Node::N48(n) => n.prefix_len = len as u32,
        Node::N256(n) => n.prefix_len = len as u32,
    }
}

pub fn node_type_after_shrink<V>(outcome: &RemoveOutcome<V>) -> Option<NodeType> {
    match outcome {
        RemoveOutcome::Shrunk(b) => Some(b.node_type()),
        _ => None,
    }
}
