//! Basic usage example for radix-index.

use radix_index::RadixTree;

fn main() {
    let tree: RadixTree<u64> = RadixTree::new();

    println!("Inserting data...");
    tree.upsert(b"user:1001", 1001);
    tree.upsert(b"user:1002", 1002);
    tree.upsert(b"user:1003", 1003);
    tree.upsert(b"post:100", 100);
    tree.upsert(b"post:101", 101);

    println!("\nPoint lookups:");
    println!("  user:1001 = {:?}", tree.lookup(b"user:1001"));
    println!("  user:9999 = {:?}", tree.lookup(b"user:9999"));

    println!("\nPrefix scan for 'user:':");
    for (key, value) in tree.prefix_scan(b"user:") {
        println!("  {} = {}", String::from_utf8_lossy(&key), value);
    }

    println!("\nRange query [post:100, post:102):");
    for (key, value) in tree.range_scan(b"post:100", b"post:102") {
        println!("  {} = {}", String::from_utf8_lossy(&key), value);
    }

    let stats = tree.shape_stats();
    println!("\nShape statistics:");
    println!("  Leaves: {}", stats.leaf_count);
    println!("  N4: {}", stats.n4_count);
    println!("  N16: {}", stats.n16_count);
    println!("  N48: {}", stats.n48_count);
    println!("  N256: {}", stats.n256_count);
    println!("  Total nodes: {}", stats.total_nodes());

    println!("\nUpdating user:1001...");
    let old = tree.upsert(b"user:1001", 9999);
    println!("  Old value: {:?}", old);
    println!("  New value: {:?}", tree.lookup(b"user:1001"));

    println!("\nRemoving user:1002...");
    let removed = tree.remove(b"user:1002");
    println!("  Removed: {:?}", removed);
    println!("  Still present: {}", tree.lookup(b"user:1002").is_some());

    println!("\nFinal count: {} keys", tree.len());
}
