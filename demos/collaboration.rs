// Copyright 2025 The poslist Developers. Licensed under MIT or Apache-2.0.
//! Two replicas share a position tree: one edits, the other mirrors the
//! edit through the node metadata and position it receives.

use poslist::{List, Order, ReplicaId};

fn main() {
    let mut order = Order::new(ReplicaId::new(1));
    let mut todo = List::new();

    todo.push(&mut order, "buy milk".to_string()).unwrap();
    let (bread, _) = todo.push(&mut order, "bake bread".to_string()).unwrap();
    todo.insert(&mut order, bread, "eat bread".to_string()).unwrap();

    println!("local list:");
    for (pos, item) in todo.iter(&order, ..) {
        let index = todo.index_of(&order, pos).unwrap().unwrap();
        println!("  {index}: {item} (at {pos:?})");
    }

    // ship the node tree and the contents to a second replica
    let mut remote_order = Order::load(ReplicaId::new(2), order.save()).unwrap();
    let mut remote = List::new();
    remote.load(&remote_order, todo.save()).unwrap();

    let (pos, meta) = remote
        .insert_at(&mut remote_order, 0, "wake up".to_string())
        .unwrap();

    // the first replica mirrors the remote edit: metadata first, value second
    order.register_nodes(meta).unwrap();
    todo.set(&order, pos, "wake up".to_string()).unwrap();

    println!("after the remote edit:");
    for item in todo.values(&order) {
        println!("  {item}");
    }
}
