//! # radix-index - a concurrent, in-memory Adaptive Radix Tree
//!
//! An ordered index from byte-string keys to values of type `V`, built on an
//! Adaptive Radix Tree (ART) with Optimistic Lock Coupling (OLC) for
//! concurrency: readers never block and never take a lock, writers only ever
//! hold a short, bounded chain of per-node locks (parent, current, and
//! occasionally grandparent during a split or merge), never the whole tree.
//!
//! ## Architecture
//!
//! - **Adaptive node layouts** (`art::node`): four inner layouts (N4/N16/N48/
//!   N256) trading fan-out for per-node memory, chosen adaptively as a node
//!   grows or shrinks.
//! - **Optimistic Lock Coupling** (`art::lock`): a 64-bit version word per
//!   node encodes a lock bit, an obsolete bit, and a change counter; readers
//!   validate their observations against this word instead of holding a lock.
//! - **Thread-local node pooling** (`art::pool`): freed nodes of a given kind
//!   are recycled from a bounded per-thread free list before falling back to
//!   the allocator.
//!
//! ## Example
//!
//! ```rust
//! use radix_index::RadixTree;
//!
//! let tree = RadixTree::new();
//! tree.upsert(b"user:1001", 42u64);
//! tree.upsert(b"user:1002", 43u64);
//!
//! assert_eq!(tree.lookup(b"user:1001"), Some(42));
//!
//! for (key, value) in tree.prefix_scan(b"user:") {
//!     println!("{:?} -> {}", key, value);
//! }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod art;

pub use art::{Config, RadixTree, ShapeStats};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_operations() {
        let tree: RadixTree<u64> = RadixTree::new();

        assert!(tree.upsert(b"key1", 1).is_none());
        assert!(tree.upsert(b"key2", 2).is_none());
        assert_eq!(tree.upsert(b"key1", 10), Some(1));

        assert_eq!(tree.lookup(b"key1"), Some(10));
        assert_eq!(tree.lookup(b"key2"), Some(2));
        assert_eq!(tree.lookup(b"key3"), None);

        assert_eq!(tree.len(), 2);

        assert_eq!(tree.remove(b"key1"), Some(10));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.lookup(b"key1"), None);
    }

    #[test]
    fn prefix_scan() {
        let tree: RadixTree<u64> = RadixTree::new();

        tree.upsert(b"user:1001", 1);
        tree.upsert(b"user:1002", 2);
        tree.upsert(b"user:1003", 3);
        tree.upsert(b"post:1001", 100);

        let users = tree.prefix_scan(b"user:");
        assert_eq!(users.len(), 3);
    }

    #[test]
    fn empty_key() {
        let tree: RadixTree<u64> = RadixTree::new();
        tree.upsert(b"", 42);
        assert_eq!(tree.lookup(b""), Some(42));
    }

    #[test]
    fn key_is_prefix_of_another_key() {
        let tree: RadixTree<u64> = RadixTree::new();
        tree.upsert(b"app", 1);
        tree.upsert(b"apple", 2);
        tree.upsert(b"application", 3);

        assert_eq!(tree.lookup(b"app"), Some(1));
        assert_eq!(tree.lookup(b"apple"), Some(2));
        assert_eq!(tree.lookup(b"application"), Some(3));

        assert_eq!(tree.remove(b"app"), Some(1));
        assert_eq!(tree.lookup(b"app"), None);
        assert_eq!(tree.lookup(b"apple"), Some(2));
    }
}

#[cfg(test)]
mod stress_tests {
    use super::*;

    #[test]
    fn large_scale() {
        let tree: RadixTree<u64> = RadixTree::new();

        let mut keys = Vec::new();
        for i in 0..10000 {
            let key = format!("domain{}.com/path/{}/item{}", i % 100, i / 100, i);
            keys.push(key);
        }

        for (i, key) in keys.iter().enumerate() {
            tree.upsert(key.as_bytes(), i as u64);
        }

        assert_eq!(tree.len(), 10000);

        let mut correct = 0;
        for (i, key) in keys.iter().enumerate() {
            if tree.lookup(key.as_bytes()) == Some(i as u64) {
                correct += 1;
            }
        }
        assert_eq!(correct, 10000, "Only {}/10000 correct", correct);
    }
}
