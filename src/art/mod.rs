//! Adaptive Radix Tree: node layouts, child search, structural mutation,
//! the optimistic concurrency protocol, and the tree operations built on
//! top of them.

pub mod debug;
pub mod iter;
pub mod lock;
pub mod mutate;
pub mod node;
pub mod pool;
pub mod search;
pub mod stats;
pub mod tree;

pub use stats::ShapeStats;
pub use tree::{Config, RadixTree};
