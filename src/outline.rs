// Copyright 2025 The poslist Developers. Licensed under MIT or Apache-2.0.
//! The presence-only facade over [`ItemList`].

use crate::{
    item_list::{ItemList, SearchDir},
    order::{NodeId, NodeMeta, Order, Position},
    sparse::SparseItems,
    ListError,
};
use std::{collections::BTreeMap, ops::RangeBounds};

/// The saved form of an [`Outline`]: per node, alternating present/absent
/// run lengths, starting with a present length (possibly zero).
///
/// For example, `[0, 2, 3]` encodes two absent slots followed by three
/// present ones.
pub type OutlineSavedState = BTreeMap<NodeId, Vec<usize>>;

/// The set of present positions of a list, without the values.
///
/// An `Outline` answers the same ordering and indexing queries as a
/// [`List`](crate::List) — lengths, `position ↔ index` translation, in-order
/// iteration — while storing nothing per entry but its presence. Use it when
/// the values live elsewhere (an external store keyed by position, say) and
/// this crate only needs to maintain the order.
///
/// It shares [`ItemList`] with `List`, so mixing the two over one [`Order`]
/// is well defined: an outline can mirror the positions of any list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outline {
    items: ItemList<usize>,
}

impl Outline {
    /// Creates an empty outline.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of present positions.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if no position is present.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True if `pos` is present.
    pub fn has(&self, pos: Position) -> bool {
        self.items.has(pos)
    }

    /// Marks `pos` present. Returns true if it was previously absent.
    pub fn add(&mut self, order: &Order, pos: Position) -> Result<bool, ListError> {
        let displaced = self.items.set(order, pos, 1usize)?;
        Ok(displaced.count() == 0)
    }

    /// Marks the `count` consecutive slots starting at `start` present.
    /// Returns how many of them were previously absent.
    pub fn add_run(
        &mut self,
        order: &Order,
        start: Position,
        count: usize,
    ) -> Result<usize, ListError> {
        let displaced = self.items.set(order, start, count)?;
        Ok(count - displaced.count())
    }

    /// Marks `pos` absent. Returns true if it was previously present.
    pub fn delete(&mut self, order: &Order, pos: Position) -> Result<bool, ListError> {
        let displaced = self.items.delete(order, pos, 1)?;
        Ok(displaced.count() == 1)
    }

    /// Marks the `count` consecutive slots starting at `start` absent.
    /// Returns how many of them were previously present.
    pub fn delete_run(
        &mut self,
        order: &Order,
        start: Position,
        count: usize,
    ) -> Result<usize, ListError> {
        Ok(self.items.delete(order, start, count)?.count())
    }

    /// Deletes the `count` present positions at indices
    /// `[index, index + count)`.
    pub fn delete_at(&mut self, order: &Order, index: usize, count: usize) -> Result<(), ListError> {
        self.items.delete_at(order, index, count)
    }

    /// Makes a fresh position immediately after `prev` present.
    ///
    /// Returns it and, when allocation created a node, the node's
    /// [`NodeMeta`].
    pub fn insert(
        &mut self,
        order: &mut Order,
        prev: Position,
    ) -> Result<(Position, Option<NodeMeta>), ListError> {
        self.items.insert(order, prev, 1usize)
    }

    /// Makes `count` fresh positions present starting at index `index`
    /// (which may equal the current length, appending).
    ///
    /// Returns the first of them; the rest follow slot by slot in the same
    /// node.
    pub fn insert_at(
        &mut self,
        order: &mut Order,
        index: usize,
        count: usize,
    ) -> Result<(Position, Option<NodeMeta>), ListError> {
        self.items.insert_at(order, index, count)
    }

    /// Removes every position. The order is untouched.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// The present position at index `index`.
    pub fn position_at(&self, order: &Order, index: usize) -> Result<Position, ListError> {
        self.items.position_at(order, index)
    }

    /// The index of `pos`, or `None` if it is absent.
    pub fn index_of(&self, order: &Order, pos: Position) -> Result<Option<usize>, ListError> {
        let index = self
            .items
            .index_of_position(order, pos, SearchDir::None)?;
        Ok(usize::try_from(index).ok())
    }

    /// The index of `pos` under an explicit absent-position policy; see
    /// [`SearchDir`].
    pub fn index_of_position(
        &self,
        order: &Order,
        pos: Position,
        dir: SearchDir,
    ) -> Result<isize, ListError> {
        self.items.index_of_position(order, pos, dir)
    }

    /// Iterates the present positions whose indices fall in `range`, in
    /// list order. The range is clamped to the outline's length.
    pub fn positions<'a>(
        &'a self,
        order: &'a Order,
        range: impl RangeBounds<usize>,
    ) -> impl Iterator<Item = Position> + 'a {
        self.items.entries(order, range).map(|(pos, _)| pos)
    }

    /// Saves the contents as per-node alternating run lengths.
    pub fn save(&self) -> OutlineSavedState {
        self.items.save(|values| {
            let mut lens = Vec::new();
            let mut expect_present = true;
            for run in values.runs() {
                if run.is_present() != expect_present {
                    lens.push(0);
                    expect_present = !expect_present;
                }
                lens.push(run.len());
                expect_present = !expect_present;
            }
            lens
        })
    }

    /// Replaces the contents with a saved state.
    ///
    /// Every node id must already be known to `order`; see
    /// [`ItemList::load`] for the failure contract.
    pub fn load(&mut self, order: &Order, saved: OutlineSavedState) -> Result<(), ListError> {
        self.items.load(order, saved, |lens| {
            let mut values = SparseItems::new();
            let mut present = true;
            for len in lens {
                if len > 0 {
                    if present {
                        values.append_item(len);
                    } else {
                        values.append_absent(len);
                    }
                }
                present = !present;
            }
            values.trim();
            values
        })
    }

    /// Asserts every bookkeeping invariant. Test support.
    #[doc(hidden)]
    pub fn check_invariants(&self, order: &Order) {
        self.items.check_invariants(order);
    }
}
