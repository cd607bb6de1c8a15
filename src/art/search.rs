//! Child search per node layout (C2).
//!
//! N4 and the non-SIMD N16 path are a linear/binary scan over a handful of
//! bytes — cheap enough that branch prediction and cache locality beat any
//! cleverness. N48 and N256 are O(1) table lookups. Every function here
//! returns the *slot* (`&ChildPtr<V>`) rather than the pointer it currently
//! holds, so the caller decides when to load it (typically right before
//! read-locking the child, to keep the window between load and lock as
//! short as possible).

use std::sync::atomic::Ordering;

use super::node::{ChildPtr, N16Node, N48Node, N4Node, N256Node, Node};

/// Dispatch to the right layout's search. Returns `None` on a leaf (a leaf
/// has no children) or when `byte` has no child.
pub fn find_child<V>(node: &Node<V>, byte: u8) -> Option<&ChildPtr<V>> {
    match node {
        Node::Leaf(_) => None,
        Node::N4(n) => find_child_n4(n, byte),
        Node::N16(n) => find_child_n16(n, byte),
        Node::N48(n) => find_child_n48(n, byte),
        Node::N256(n) => find_child_n256(n, byte),
    }
}

fn find_child_n4<V>(n: &N4Node<V>, byte: u8) -> Option<&ChildPtr<V>> {
    let count = n.child_num as usize;
    for i in 0..count {
        if n.keys[i] == byte {
            return Some(&n.children[i]);
        }
    }
    None
}

/// Keys are kept sorted for N16 so both the portable fallback (binary
/// search) and the `simd` feature's vectorized compare can assume sorted
/// order; see [`super::mutate::add_child_n16`] for where that order is
/// maintained on insert.
fn find_child_n16<V>(n: &N16Node<V>, byte: u8) -> Option<&ChildPtr<V>> {
    let count = n.child_num as usize;

    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    {
        if let Some(i) = find_child_n16_simd(&n.keys, count, byte) {
            return Some(&n.children[i]);
        }
        return None;
    }

    #[cfg(not(all(feature = "simd", target_arch = "x86_64")))]
    {
        n.keys[..count]
            .binary_search(&byte)
            .ok()
            .map(|i| &n.children[i])
    }
}

/// SSE2 equal-byte compare over up to 16 keys at once, masked to the
/// `count` of keys actually in use. Only compiled under the `simd` feature
/// on x86_64; every other configuration uses the portable binary search
/// above instead.
#[cfg(all(feature = "simd", target_arch = "x86_64"))]
fn find_child_n16_simd(keys: &[u8; 16], count: usize, byte: u8) -> Option<usize> {
    use std::arch::x86_64::{
        _mm_cmpeq_epi8, _mm_loadu_si128, _mm_movemask_epi8, _mm_set1_epi8,
    };

    // Safety: `keys` is a 16-byte array, a valid source for an unaligned
    // 128-bit load; the comparison and mask extraction are pure SSE2 and
    // available unconditionally on x86_64.
    unsafe {
        let key_vec = _mm_set1_epi8(byte as i8);
        let data = _mm_loadu_si128(keys.as_ptr() as *const _);
        let cmp = _mm_cmpeq_epi8(data, key_vec);
        let mask = _mm_movemask_epi8(cmp) as u32 & ((1u32 << count) - 1);
        if mask == 0 {
            None
        } else {
            Some(mask.trailing_zeros() as usize)
        }
    }
}

fn find_child_n48<V>(n: &N48Node<V>, byte: u8) -> Option<&ChildPtr<V>> {
    let slot = n.payload.side[byte as usize];
    if slot == 0 {
        None
    } else {
        Some(&n.payload.children[(slot - 1) as usize])
    }
}

fn find_child_n256<V>(n: &N256Node<V>, byte: u8) -> Option<&ChildPtr<V>> {
    let ptr = n.children[byte as usize].load(Ordering::Relaxed);
    if ptr.is_null() {
        None
    } else {
        Some(&n.children[byte as usize])
    }
}

/// The smallest child byte of an inner node, used by the leftmost-leaf
/// prefix consultation (spec.md's Open Question, decided as OQ-1 in
/// SPEC_FULL.md: lock-coupled exactly like any other descent step).
pub fn first_child<V>(node: &Node<V>) -> Option<&ChildPtr<V>> {
    match node {
        Node::Leaf(_) => None,
        Node::N4(n) => (n.child_num > 0).then(|| &n.children[0]),
        Node::N16(n) => (n.child_num > 0).then(|| &n.children[0]),
        Node::N48(n) => n
            .payload
            .side
            .iter()
            .position(|&s| s != 0)
            .map(|byte| &n.payload.children[(n.payload.side[byte] - 1) as usize]),
        Node::N256(n) => n.children.iter().find(|c| !c.load(Ordering::Relaxed).is_null()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::art::node::{NodeType, N4Node, INLINE_PREFIX_MAX};
    use std::sync::atomic::{AtomicPtr, AtomicU64};

    fn empty_n4<V>() -> Node<V> {
        Node::N4(N4Node {
            version: AtomicU64::new(0),
            from_pool: false,
            prefix_len: 0,
            prefix: [0; INLINE_PREFIX_MAX],
            child_num: 2,
            terminal: AtomicPtr::new(std::ptr::null_mut()),
            keys: [b'a', b'c', 0, 0],
            children: std::array::from_fn(|_| AtomicPtr::new(std::ptr::null_mut())),
        })
    }

    #[test]
    fn n4_find_child_hits_and_misses() {
        let n = empty_n4::<u64>();
        assert!(find_child(&n, b'a').is_some());
        assert!(find_child(&n, b'z').is_none());
        assert_eq!(n.node_type(), NodeType::N4);
    }
}
