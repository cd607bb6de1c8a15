//! Per-thread node free-lists (C5).
//!
//! Each thread keeps one free-list per node kind. A node freed by the thread
//! that allocated it — the common case, since lock coupling means the
//! thread doing the structural mutation already owns the node it's
//! replacing — goes back onto that list instead of through the allocator.
//! `from_pool` on each node marks whether it came from the list, so an
//! overflow node allocated when the list was empty is plainly `Box::new`'d
//! and, symmetrically, is truly deallocated rather than pooled when freed —
//! the bound keeps one runaway thread from holding an unbounded number of
//! blank nodes hostage in its free-list.

use std::sync::atomic::{AtomicPtr, AtomicU64};

use thread_local::ThreadLocal;

use super::node::{
    InlineKey, LeafNode, N16Node, N48Node, N48Payload, N256Node, N4Node, Node, NodeType,
    INLINE_PREFIX_MAX,
};

fn empty_children<V, const N: usize>() -> [AtomicPtr<Node<V>>; N] {
    std::array::from_fn(|_| AtomicPtr::new(std::ptr::null_mut()))
}

fn blank_n4<V>() -> Box<Node<V>> {
    Box::new(Node::N4(N4Node {
        version: AtomicU64::new(0),
        from_pool: false,
        prefix_len: 0,
        prefix: [0; INLINE_PREFIX_MAX],
        child_num: 0,
        terminal: AtomicPtr::new(std::ptr::null_mut()),
        keys: [0; 4],
        children: empty_children(),
    }))
}

fn blank_n16<V>() -> Box<Node<V>> {
    Box::new(Node::N16(N16Node {
        version: AtomicU64::new(0),
        from_pool: false,
        prefix_len: 0,
        prefix: [0; INLINE_PREFIX_MAX],
        child_num: 0,
        terminal: AtomicPtr::new(std::ptr::null_mut()),
        keys: [0; 16],
        children: empty_children(),
    }))
}

fn blank_n48<V>() -> Box<Node<V>> {
    Box::new(Node::N48(N48Node {
        version: AtomicU64::new(0),
        from_pool: false,
        prefix_len: 0,
        prefix: [0; INLINE_PREFIX_MAX],
        child_num: 0,
        terminal: AtomicPtr::new(std::ptr::null_mut()),
        payload: Box::new(N48Payload {
            side: [0; 256],
            children: empty_children(),
        }),
    }))
}

fn blank_n256<V>() -> Box<Node<V>> {
    Box::new(Node::N256(N256Node {
        version: AtomicU64::new(0),
        from_pool: false,
        prefix_len: 0,
        prefix: [0; INLINE_PREFIX_MAX],
        child_num: 0,
        terminal: AtomicPtr::new(std::ptr::null_mut()),
        children: Box::new(empty_children()),
    }))
}

/// One thread's stash of reusable, blank nodes, one list per kind.
struct FreeLists<V> {
    leaf: Vec<Box<Node<V>>>,
    n4: Vec<Box<Node<V>>>,
    n16: Vec<Box<Node<V>>>,
    n48: Vec<Box<Node<V>>>,
    n256: Vec<Box<Node<V>>>,
}

impl<V> FreeLists<V> {
    fn new() -> Self {
        FreeLists {
            leaf: Vec::new(),
            n4: Vec::new(),
            n16: Vec::new(),
            n48: Vec::new(),
            n256: Vec::new(),
        }
    }

    fn list_for(&mut self, kind: NodeType) -> &mut Vec<Box<Node<V>>> {
        match kind {
            NodeType::Leaf => &mut self.leaf,
            NodeType::N4 => &mut self.n4,
            NodeType::N16 => &mut self.n16,
            NodeType::N48 => &mut self.n48,
            NodeType::N256 => &mut self.n256,
        }
    }
}

/// Thread-local node pool shared by all [`crate::art::tree::RadixTree`]
/// instances on the current thread. Bounded by `capacity` per kind; nodes
/// allocated beyond that bound are `from_pool = false` and are freed for
/// real (not pooled) when the tree is done with them.
pub struct NodePool<V> {
    lists: ThreadLocal<std::cell::RefCell<FreeLists<V>>>,
    capacity: usize,
}

impl<V> NodePool<V> {
    pub fn new(capacity: usize) -> Self {
        NodePool {
            lists: ThreadLocal::new(),
            capacity,
        }
    }

    fn with_lists<R>(&self, f: impl FnOnce(&mut FreeLists<V>) -> R) -> R {
        let cell = self
            .lists
            .get_or(|| std::cell::RefCell::new(FreeLists::new()));
        f(&mut cell.borrow_mut())
    }

    fn alloc(&self, kind: NodeType, fresh: impl FnOnce() -> Box<Node<V>>) -> Box<Node<V>> {
        self.with_lists(|lists| {
            let list = lists.list_for(kind);
            match list.pop() {
                Some(node) => node,
                None => fresh(),
            }
        })
    }

    /// Leaves are not pooled as blanks the way inner nodes are — a leaf's
    /// `value` has no universal placeholder for an arbitrary `V`. Instead,
    /// reuse a freed leaf's box (if any is available) by overwriting its
    /// key and value in place.
    pub fn alloc_leaf(&self, key: &[u8], value: V) -> Box<Node<V>> {
        match self.with_lists(|lists| lists.leaf.pop()) {
            Some(mut node) => {
                if let Node::Leaf(n) = node.as_mut() {
                    n.key = InlineKey::from_slice(key);
                    n.value = value;
                    n.from_pool = true;
                }
                node
            }
            None => Box::new(Node::Leaf(LeafNode {
                version: AtomicU64::new(0),
                from_pool: false,
                key: InlineKey::from_slice(key),
                value,
            })),
        }
    }

    pub fn alloc_n4(&self) -> Box<Node<V>> {
        self.alloc(NodeType::N4, blank_n4::<V>)
    }

    pub fn alloc_n16(&self) -> Box<Node<V>> {
        self.alloc(NodeType::N16, blank_n16::<V>)
    }

    pub fn alloc_n48(&self) -> Box<Node<V>> {
        self.alloc(NodeType::N48, blank_n48::<V>)
    }

    pub fn alloc_n256(&self) -> Box<Node<V>> {
        self.alloc(NodeType::N256, blank_n256::<V>)
    }

    /// Reclaim a node that is no longer reachable and has been marked
    /// obsolete (see [`crate::art::lock::OptLock::write_unlock_obsolete`]).
    ///
    /// # Safety
    /// `ptr` must be a unique, non-null pointer previously produced by one
    /// of this pool's `alloc_*` methods (via `Box::into_raw`), never
    /// accessed again by any other thread after this call — the caller must
    /// have already observed the node's obsolete bit and ensured no
    /// in-flight reader still depends on the version-check protocol to
    /// notice it. See spec.md's Open Question on reclamation (SPEC_FULL.md
    /// OQ-2) for the residual hazard this crate accepts.
    pub unsafe fn free(&self, ptr: *mut Node<V>) {
        let mut node = unsafe { Box::from_raw(ptr) };
        // `from_pool` was set at this node's last allocation: `true` if it
        // was handed out of a free-list (taken from the pool), `false` if
        // it was `Box::new`'d fresh because the list was empty at the time.
        // Only the former is eligible to go back onto the list; the latter
        // is destroyed for real, exactly as spec.md requires and mirroring
        // `art-node-pool.h`'s `return_new_node` (`is_from_new()` ? `delete`
        // : reset + `return_object`).
        if !node.from_pool() {
            return;
        }
        // Blank every child slot (and N48's side table) before the node can
        // be handed back out — `find_child` on N48/N256 trusts the whole
        // table/array rather than bounding its scan by `child_num`, so a
        // stale non-null slot from this node's previous life would read
        // back as a phantom child.
        node.reset();
        let kind = node.node_type();
        let mut node = Some(node);
        self.with_lists(|lists| {
            let list = lists.list_for(kind);
            if list.len() < self.capacity {
                list.push(node.take().unwrap());
            }
        });
        // `node` is `None` if it was pushed onto the free-list above, or
        // `Some` (and drops here for real) if the list was already full.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_n4_is_not_from_pool_and_is_not_recycled_on_free() {
        let pool: NodePool<u64> = NodePool::new(4);
        let mut n = pool.alloc_n4();
        assert!(!n.from_pool());
        n.set_from_pool(true);
        let ptr = Box::into_raw(n);
        unsafe { pool.free(ptr) };
        // The freed node was pool-sourced (marked so above), so it is reset
        // and pushed back; the next alloc reuses it.
        let n2 = pool.alloc_n4();
        assert!(n2.from_pool());
    }

    #[test]
    fn fresh_node_freed_without_ever_being_pool_sourced_is_destroyed() {
        let pool: NodePool<u64> = NodePool::new(4);
        let n = pool.alloc_n4();
        assert!(!n.from_pool());
        let ptr = Box::into_raw(n);
        unsafe { pool.free(ptr) };
        // `from_pool` was false, so the node above was dropped for real
        // rather than pushed onto the free-list; this alloc must build
        // another fresh node rather than reuse it.
        let n2 = pool.alloc_n4();
        assert!(!n2.from_pool());
    }

    #[test]
    fn alloc_leaf_sets_key_and_value() {
        let pool: NodePool<u64> = NodePool::new(4);
        let leaf = pool.alloc_leaf(b"hello", 42);
        assert_eq!(leaf.leaf_key(), b"hello");
        assert_eq!(*leaf.leaf_value(), 42);
    }

    #[test]
    fn pool_bounded_by_capacity() {
        let pool: NodePool<u64> = NodePool::new(1);
        let mut a = pool.alloc_n4();
        let mut b = pool.alloc_n4();
        a.set_from_pool(true);
        b.set_from_pool(true);
        let a = Box::into_raw(a);
        let b = Box::into_raw(b);
        unsafe {
            pool.free(a);
            pool.free(b);
        }
        // Only one slot of capacity; the second free doesn't fit and is
        // dropped for real, so only one alloc comes back from the list
        // before a fresh (non-pooled) node is needed again.
        let c = pool.alloc_n4();
        assert!(c.from_pool());
        let d = pool.alloc_n4();
        assert!(!d.from_pool());
    }
}
