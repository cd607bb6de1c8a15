//! Node layouts for the Adaptive Radix Tree (C1).
//!
//! Every node carries a small header — a version word, a child count, and a
//! compressed-prefix slot — followed by a layout-specific child area. The
//! four inner layouts (N4/N16/N48/N256) trade fan-out for per-node memory;
//! [`Node`] dispatches on its own tag rather than through virtual calls, so
//! the hot traversal path never goes through a vtable.

use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use smallvec::SmallVec;

/// Prefix bytes beyond this length are not stored inline; a node whose
/// compressed prefix is longer than this must consult a descendant leaf to
/// recover the remaining bytes (see [`crate::art::tree::leftmost_leaf_prefix`]).
pub const INLINE_PREFIX_MAX: usize = 8;

/// Leaf keys inline up to [`INLINE_PREFIX_MAX`] bytes and spill to the heap
/// beyond that, same cutoff as an inner node's compressed prefix.
pub type InlineKey = SmallVec<[u8; INLINE_PREFIX_MAX]>;

/// Tag identifying which layout a [`Node`] currently uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Leaf,
    N4,
    N16,
    N48,
    N256,
}

/// A child pointer as stored in an inner node's child area.
///
/// Nodes are allocated on the heap (via [`crate::art::pool::NodePool`]) and
/// referenced through raw pointers rather than `Box` so that a reader who
/// captured a pointer before a concurrent writer replaced or freed it can
/// still detect that it is stale (via the version protocol in
/// [`crate::art::lock`]) instead of being statically prevented from holding
/// it. This is the same trade race-prone, version-checked pointer discipline
/// as the OLC B+Tree in this crate's lineage: the parent's `AtomicPtr` slot
/// is only ever mutated while the parent's write lock is held, and a read
/// observing a torn value is caught by the read-unlock version check, never
/// acted upon directly.
pub type ChildPtr<V> = AtomicPtr<Node<V>>;

/// Fields shared by every inner layout, inlined instead of factored into a
/// common struct so each variant's size (and therefore allocation size via
/// [`crate::art::pool::NodePool`]) reflects only that layout's own arrays —
/// mirroring the teacher crate's choice to `Box` only the large N48/N256
/// payloads rather than pay a max-variant-size tax on every node.
macro_rules! inner_header_fields {
    () => {
        pub version: AtomicU64,
        pub from_pool: bool,
        pub prefix_len: u32,
        pub prefix: [u8; INLINE_PREFIX_MAX],
        pub child_num: u16,
        /// Set when some inserted key's path ends exactly at this node (it
        /// is a strict prefix of another key sharing this node). Points at
        /// a standalone [`Node::Leaf`], never at an inner node. Null when
        /// no such key exists. Mirrors the teacher's `leaf_value` field on
        /// its own Node4/Node16/Node48/Node256 variants, generalized to an
        /// atomic child slot so it can be read and lock-coupled exactly
        /// like any other child pointer.
        ///
        /// A deliberate divergence from the byte-0 sentinel convention
        /// the original C++ implementation uses for this same case (see
        /// SPEC_FULL.md §11/OQ-5): that convention is sound only for
        /// NUL-terminated C-string keys, whereas keys here are arbitrary
        /// byte strings, so this node carries one extra `AtomicPtr` over
        /// spec.md §4.1's per-kind byte formulas instead.
        pub terminal: ChildPtr<V>,
    };
}

pub struct N4Node<V> {
    inner_header_fields!();
    pub keys: [u8; 4],
    pub children: [ChildPtr<V>; 4],
}

pub struct N16Node<V> {
    inner_header_fields!();
    pub keys: [u8; 16],
    pub children: [ChildPtr<V>; 16],
}

/// N48's side table and children live behind a `Box` so an `N4`/`N16`/`Leaf`
/// node never pays for N48's 256-byte side table in its own size.
pub struct N48Payload<V> {
    /// `side[byte]` is 0 for "absent", else a 1-based index into `children`.
    pub side: [u8; 256],
    pub children: [ChildPtr<V>; 48],
}

pub struct N48Node<V> {
    inner_header_fields!();
    pub payload: Box<N48Payload<V>>,
}

pub struct N256Node<V> {
    inner_header_fields!();
    pub children: Box<[ChildPtr<V>; 256]>,
}

pub struct LeafNode<V> {
    pub version: AtomicU64,
    pub from_pool: bool,
    pub key: InlineKey,
    pub value: V,
}

/// A node in the tree: a leaf carrying a full key and value, or one of the
/// four adaptively-sized inner layouts.
pub enum Node<V> {
    Leaf(LeafNode<V>),
    N4(N4Node<V>),
    N16(N16Node<V>),
    N48(N48Node<V>),
    N256(N256Node<V>),
}

impl<V> Node<V> {
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Leaf(_) => NodeType::Leaf,
            Node::N4(_) => NodeType::N4,
            Node::N16(_) => NodeType::N16,
            Node::N48(_) => NodeType::N48,
            Node::N256(_) => NodeType::N256,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// The node's version word (C5's optimistic lock operates on this).
    pub fn version(&self) -> &AtomicU64 {
        match self {
            Node::Leaf(n) => &n.version,
            Node::N4(n) => &n.version,
            Node::N16(n) => &n.version,
            Node::N48(n) => &n.version,
            Node::N256(n) => &n.version,
        }
    }

    pub fn from_pool(&self) -> bool {
        match self {
            Node::Leaf(n) => n.from_pool,
            Node::N4(n) => n.from_pool,
            Node::N16(n) => n.from_pool,
            Node::N48(n) => n.from_pool,
            Node::N256(n) => n.from_pool,
        }
    }

    pub fn set_from_pool(&mut self, v: bool) {
        match self {
            Node::Leaf(n) => n.from_pool = v,
            Node::N4(n) => n.from_pool = v,
            Node::N16(n) => n.from_pool = v,
            Node::N48(n) => n.from_pool = v,
            Node::N256(n) => n.from_pool = v,
        }
    }

    /// Number of children for an inner node; leaves are treated as 1 per
    /// spec.md §3 (the common-header field is "unused" on a leaf).
    pub fn child_num(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::N4(n) => n.child_num as usize,
            Node::N16(n) => n.child_num as usize,
            Node::N48(n) => n.child_num as usize,
            Node::N256(n) => n.child_num as usize,
        }
    }

    /// Length of the compressed prefix (inner) — 0 for a leaf.
    pub fn prefix_len(&self) -> usize {
        match self {
            Node::Leaf(_) => 0,
            Node::N4(n) => n.prefix_len as usize,
            Node::N16(n) => n.prefix_len as usize,
            Node::N48(n) => n.prefix_len as usize,
            Node::N256(n) => n.prefix_len as usize,
        }
    }

    /// The inline prefix bytes actually stored (up to `INLINE_PREFIX_MAX`).
    /// If `prefix_len() > INLINE_PREFIX_MAX`, the remaining bytes must be
    /// recovered from a descendant leaf — see `get_key_bytes` doc below.
    pub fn inline_prefix(&self) -> &[u8] {
        let len = self.prefix_len().min(INLINE_PREFIX_MAX);
        match self {
            Node::Leaf(_) => &[],
            Node::N4(n) => &n.prefix[..len],
            Node::N16(n) => &n.prefix[..len],
            Node::N48(n) => &n.prefix[..len],
            Node::N256(n) => &n.prefix[..len],
        }
    }

    pub fn set_prefix(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(INLINE_PREFIX_MAX);
        match self {
            Node::Leaf(_) => {}
            Node::N4(n) => {
                n.prefix_len = bytes.len() as u32;
                n.prefix[..len].copy_from_slice(&bytes[..len]);
            }
            Node::N16(n) => {
                n.prefix_len = bytes.len() as u32;
                n.prefix[..len].copy_from_slice(&bytes[..len]);
            }
            Node::N48(n) => {
                n.prefix_len = bytes.len() as u32;
                n.prefix[..len].copy_from_slice(&bytes[..len]);
            }
            Node::N256(n) => {
                n.prefix_len = bytes.len() as u32;
                n.prefix[..len].copy_from_slice(&bytes[..len]);
            }
        }
    }

    pub fn reset_prefix(&mut self) {
        self.set_prefix(&[]);
    }

    /// Drop the first `n` bytes of the compressed prefix — used by path
    /// compression/decompression in C3 when a discriminating byte is
    /// folded into a child's prefix or peeled off into a new split node.
    ///
    /// When the prefix is longer than `INLINE_PREFIX_MAX`, the inline bytes
    /// no longer reflect the true prefix tail; callers that need exact bytes
    /// past the inline cap must re-derive them from a leaf first.
    pub fn remove_prefix(&mut self, n: usize) {
        let old_len = self.prefix_len();
        debug_assert!(n <= old_len);
        let new_len = old_len - n;
        let inline_old = self.inline_prefix();
        let keep = inline_old.get(n..).unwrap_or(&[]).to_vec();
        match self {
            Node::Leaf(_) => {}
            _ => {
                self.set_prefix(&keep);
                // set_prefix recomputed prefix_len from `keep.len()`, which
                // is wrong when the true prefix extends past the inline
                // cap; restore the real remaining length.
                self.force_prefix_len(new_len);
            }
        }
    }

    fn force_prefix_len(&mut self, len: usize) {
        match self {
            Node::Leaf(_) => {}
            Node::N4(n) => n.prefix_len = len as u32,
            Node::N16(n) => n.prefix_len = len as u32,
            Node::N48(n) => n.prefix_len = len as u32,
            Node::N256(n) => n.prefix_len = len as u32,
        }
    }

    /// Full stored key for a leaf, panics on an inner node — the caller is
    /// expected to have matched on `NodeType::Leaf` first.
    pub fn leaf_key(&self) -> &[u8] {
        match self {
            Node::Leaf(n) => &n.key,
            _ => panic!("leaf_key called on an inner node"),
        }
    }

    pub fn leaf_value(&self) -> &V {
        match self {
            Node::Leaf(n) => &n.value,
            _ => panic!("leaf_value called on an inner node"),
        }
    }

    pub fn leaf_value_mut(&mut self) -> &mut V {
        match self {
            Node::Leaf(n) => &mut n.value,
            _ => panic!("leaf_value_mut called on an inner node"),
        }
    }

    /// Total byte equality between this leaf's stored key and `k` — the
    /// terminal check used at the end of every lookup/upsert/remove descent.
    pub fn leaf_matches(&self, k: &[u8]) -> bool {
        self.leaf_key() == k
    }

    /// The slot holding this inner node's terminal leaf, if any — `None`
    /// (not null) for a leaf, since leaves don't have one.
    pub fn terminal(&self) -> Option<&ChildPtr<V>> {
        match self {
            Node::Leaf(_) => None,
            Node::N4(n) => Some(&n.terminal),
            Node::N16(n) => Some(&n.terminal),
            Node::N48(n) => Some(&n.terminal),
            Node::N256(n) => Some(&n.terminal),
        }
    }

    /// Blank an inner node back to its empty state before it goes back on
    /// the pool's free-list — every child slot (and, for N48, the side
    /// table) must read as absent again, since [`super::search::find_child`]
    /// on N48/N256 trusts the full table/array rather than bounding its
    /// scan by `child_num` the way N4/N16 do. A no-op for a leaf; leaf
    /// reuse overwrites `key`/`value` directly at the allocation site
    /// instead (see [`super::pool::NodePool::alloc_leaf`]).
    pub fn reset(&mut self) {
        match self {
            Node::Leaf(_) => {}
            Node::N4(n) => {
                n.child_num = 0;
                n.prefix_len = 0;
                n.prefix = [0; INLINE_PREFIX_MAX];
                n.terminal.store(std::ptr::null_mut(), Ordering::Relaxed);
                n.keys = [0; 4];
                for c in n.children.iter() {
                    c.store(std::ptr::null_mut(), Ordering::Relaxed);
                }
            }
            Node::N16(n) => {
                n.child_num = 0;
                n.prefix_len = 0;
                n.prefix = [0; INLINE_PREFIX_MAX];
                n.terminal.store(std::ptr::null_mut(), Ordering::Relaxed);
                n.keys = [0; 16];
                for c in n.children.iter() {
                    c.store(std::ptr::null_mut(), Ordering::Relaxed);
                }
            }
            Node::N48(n) => {
                n.child_num = 0;
                n.prefix_len = 0;
                n.prefix = [0; INLINE_PREFIX_MAX];
                n.terminal.store(std::ptr::null_mut(), Ordering::Relaxed);
                n.payload.side = [0; 256];
                for c in n.payload.children.iter() {
                    c.store(std::ptr::null_mut(), Ordering::Relaxed);
                }
            }
            Node::N256(n) => {
                n.child_num = 0;
                n.prefix_len = 0;
                n.prefix = [0; INLINE_PREFIX_MAX];
                n.terminal.store(std::ptr::null_mut(), Ordering::Relaxed);
                for c in n.children.iter() {
                    c.store(std::ptr::null_mut(), Ordering::Relaxed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_prefix_roundtrip() {
        let mut n = Node::<u64>::N4(N4Node {
            version: AtomicU64::new(0),
            from_pool: false,
            prefix_len: 0,
            prefix: [0; INLINE_PREFIX_MAX],
            child_num: 0,
            terminal: AtomicPtr::new(std::ptr::null_mut()),
            keys: [0; 4],
            children: std::array::from_fn(|_| AtomicPtr::new(std::ptr::null_mut())),
        });
        n.set_prefix(b"abcd");
        assert_eq!(n.inline_prefix(), b"abcd");
        assert_eq!(n.prefix_len(), 4);
        n.remove_prefix(2);
        assert_eq!(n.inline_prefix(), b"cd");
        assert_eq!(n.prefix_len(), 2);
    }
}
