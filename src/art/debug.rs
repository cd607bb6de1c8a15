//! Debug pretty-printer, generalized from the teacher's `art::debug`. A
//! tree is printed under a single optimistic read pass, same as
//! `shape_stats` — it's a best-effort snapshot, not a consistent view under
//! concurrent writers, and it's not where any real work happens.

use std::fmt;
use std::sync::atomic::Ordering;

use super::lock::OptLock;
use super::node::Node;
use super::search;
use super::tree::RadixTree;

impl<V: fmt::Debug + Clone> RadixTree<V> {
    /// Render the tree as an indented tree of nodes. Retries from the root
    /// on a concurrent-mutation restart, same as every other operation.
    pub fn debug_print(&self) -> String {
        loop {
            if let Ok(s) = self.try_debug_print() {
                return s;
            }
        }
    }

    fn try_debug_print(&self) -> Result<String, super::lock::Restart> {
        let meta_v = OptLock::read_lock(self.meta_version())?;
        let root_ptr = self.root_ptr().load(Ordering::Acquire);
        OptLock::read_unlock(self.meta_version(), meta_v)?;

        let mut out = String::new();
        if root_ptr.is_null() {
            out.push_str("(empty)\n");
        } else {
            debug_node(root_ptr, 0, &mut out)?;
        }
        Ok(out)
    }
}

fn debug_node<V: fmt::Debug>(
    node_ptr: *mut Node<V>,
    depth: usize,
    out: &mut String,
) -> Result<(), super::lock::Restart> {
    let node = unsafe { &*node_ptr };
    let v = OptLock::read_lock(node.version())?;
    let indent = "  ".repeat(depth);

    if node.is_leaf() {
        out.push_str(&format!(
            "{}Leaf {:?} -> {:?}\n",
            indent,
            String::from_utf8_lossy(node.leaf_key()),
            node.leaf_value()
        ));
        OptLock::read_unlock(node.version(), v)?;
        return Ok(());
    }

    out.push_str(&format!(
        "{}{:?} (prefix={:?}, children={})\n",
        indent,
        node.node_type(),
        String::from_utf8_lossy(node.inline_prefix()),
        node.child_num()
    ));

    if let Some(terminal) = node.terminal() {
        let t = terminal.load(Ordering::Acquire);
        if !t.is_null() {
            out.push_str(&format!("{}  [terminal] ->\n", indent));
            debug_node(t, depth + 2, out)?;
        }
    }

    for byte in 0u16..=255 {
        let byte = byte as u8;
        if let Some(slot) = search::find_child(node, byte) {
            let child = slot.load(Ordering::Acquire);
            if !child.is_null() {
                out.push_str(&format!("{}  [{:#04x}] ->\n", indent, byte));
                debug_node(child, depth + 2, out)?;
            }
        }
    }

    OptLock::read_unlock(node.version(), v)
}
