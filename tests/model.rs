// Copyright 2025 The poslist Developers. Licensed under MIT or Apache-2.0.
//! Property tests driving a [`List`] with random operation sequences
//! against a plain `Vec` model.

use poslist::{List, Order, ReplicaId};
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;

#[derive(Clone, Debug)]
enum Op {
    InsertAt(usize, u16),
    Push(u16),
    DeleteAt(usize),
    Overwrite(usize, u16),
    DeletePosition(usize),
}

impl Arbitrary for Op {
    fn arbitrary(g: &mut Gen) -> Self {
        match u8::arbitrary(g) % 5 {
            0 => Op::InsertAt(usize::arbitrary(g), u16::arbitrary(g)),
            1 => Op::Push(u16::arbitrary(g)),
            2 => Op::DeleteAt(usize::arbitrary(g)),
            3 => Op::Overwrite(usize::arbitrary(g), u16::arbitrary(g)),
            _ => Op::DeletePosition(usize::arbitrary(g)),
        }
    }
}

fn apply(
    op: Op,
    order: &mut Order,
    list: &mut List<u16>,
    model: &mut Vec<u16>,
) {
    match op {
        Op::InsertAt(index, value) => {
            let index = index % (model.len() + 1);
            list.insert_at(order, index, value).unwrap();
            model.insert(index, value);
        }
        Op::Push(value) => {
            list.push(order, value).unwrap();
            model.push(value);
        }
        Op::DeleteAt(index) => {
            if !model.is_empty() {
                let index = index % model.len();
                list.delete_at(order, index, 1).unwrap();
                model.remove(index);
            }
        }
        Op::Overwrite(index, value) => {
            if !model.is_empty() {
                let index = index % model.len();
                let pos = list.position_at(order, index).unwrap();
                list.set(order, pos, value).unwrap();
                model[index] = value;
            }
        }
        Op::DeletePosition(index) => {
            if !model.is_empty() {
                let index = index % model.len();
                let pos = list.position_at(order, index).unwrap();
                assert_eq!(list.delete(order, pos).unwrap(), Some(model[index]));
                model.remove(index);
            }
        }
    }
}

#[quickcheck]
fn random_edits_match_a_vec_model(ops: Vec<Op>) -> bool {
    let mut order = Order::new(ReplicaId::new(1));
    let mut list = List::new();
    let mut model: Vec<u16> = Vec::new();

    for op in ops {
        apply(op, &mut order, &mut list, &mut model);
        list.check_invariants(&order);
    }

    let values: Vec<u16> = list.values(&order).copied().collect();
    if values != model {
        return false;
    }
    for (index, _) in model.iter().enumerate() {
        let pos = list.position_at(&order, index).unwrap();
        if list.index_of(&order, pos).unwrap() != Some(index) {
            return false;
        }
    }
    true
}

#[quickcheck]
fn reload_preserves_every_query(ops: Vec<Op>) -> bool {
    let mut order = Order::new(ReplicaId::new(1));
    let mut list = List::new();
    let mut model: Vec<u16> = Vec::new();
    for op in ops {
        apply(op, &mut order, &mut list, &mut model);
    }

    let mut reloaded = List::new();
    reloaded.load(&order, list.save()).unwrap();
    reloaded.check_invariants(&order);

    if reloaded != list || reloaded.len() != list.len() {
        return false;
    }
    if !reloaded.iter(&order, ..).eq(list.iter(&order, ..)) {
        return false;
    }
    for (pos, _) in list.iter(&order, ..) {
        if reloaded.index_of(&order, pos).unwrap() != list.index_of(&order, pos).unwrap() {
            return false;
        }
    }
    true
}

#[quickcheck]
fn slices_agree_with_the_full_walk(ops: Vec<Op>, start: usize, len: usize) -> bool {
    let mut order = Order::new(ReplicaId::new(1));
    let mut list = List::new();
    let mut model: Vec<u16> = Vec::new();
    for op in ops {
        apply(op, &mut order, &mut list, &mut model);
    }

    let start = if model.is_empty() { 0 } else { start % (model.len() + 1) };
    let end = (start + len % 64).min(model.len());
    let window: Vec<u16> = list
        .iter(&order, start..end)
        .map(|(_, &v)| v)
        .collect();
    window == model[start.min(end)..end]
}
