// Copyright 2025 The poslist Developers. Licensed under MIT or Apache-2.0.
//! The value-carrying facade over [`ItemList`].

use crate::{
    item_list::{ItemList, SearchDir},
    order::{NodeId, NodeMeta, Order, Position, MIN_POSITION},
    sparse::SparseItems,
    ListError,
};
use std::{collections::BTreeMap, ops::RangeBounds};

/// The saved form of a [`List`]: per node, the present slots and their
/// values.
///
/// Both map levels are sorted, so serialising a saved state is
/// deterministic; loading accepts entries in any order. With the `serde`
/// feature this serialises to nested JSON objects keyed by node id strings
/// and slot numbers.
pub type ListSavedState<T> = BTreeMap<NodeId, BTreeMap<usize, T>>;

/// A list of values keyed by [`Position`]s, indexable both by position and
/// by integer index.
///
/// This is the facade most users want; it stores one value per present slot.
/// All operations that have to place a position in the total order take the
/// shared [`Order`] as an argument, and the `insert*` family additionally
/// takes it mutably to allocate fresh positions. For a value-free variant
/// that only tracks which positions are present, see
/// [`Outline`](crate::Outline).
///
/// ```rust
/// use poslist::{List, Order, ReplicaId};
///
/// let mut order = Order::new(ReplicaId::new(1));
/// let mut list = List::new();
/// let (pos, _) = list.push(&mut order, 10).unwrap();
/// list.push(&mut order, 30).unwrap();
/// list.insert(&mut order, pos, 20).unwrap();
/// let values: Vec<i32> = list.values(&order).copied().collect();
/// assert_eq!(values, [10, 20, 30]);
/// ```
#[derive(Clone, Debug)]
pub struct List<T> {
    items: ItemList<Vec<T>>,
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self {
            items: ItemList::default(),
        }
    }
}

impl<T: Clone + PartialEq> PartialEq for List<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Clone> List<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of values in the list.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the list holds no values.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The value at `pos`, if one is present there.
    pub fn get(&self, pos: Position) -> Option<&T> {
        self.items.get(pos)
    }

    /// True if a value is present at `pos`.
    pub fn has(&self, pos: Position) -> bool {
        self.items.has(pos)
    }

    /// Writes `value` at `pos` — an existing position, whether or not it
    /// currently holds a value. Returns the value it replaced, if any.
    ///
    /// To give `value` a *new* place in the list, use [`List::insert`] /
    /// [`List::insert_at`] instead.
    pub fn set(&mut self, order: &Order, pos: Position, value: T) -> Result<Option<T>, ListError> {
        let displaced = self.items.set(order, pos, vec![value])?;
        Ok(displaced.get_info(0).0.cloned())
    }

    /// Deletes the value at `pos`, returning it. Deleting an already-absent
    /// position is a no-op returning `None`; the position stays usable.
    pub fn delete(&mut self, order: &Order, pos: Position) -> Result<Option<T>, ListError> {
        let displaced = self.items.delete(order, pos, 1)?;
        Ok(displaced.get_info(0).0.cloned())
    }

    /// Deletes the `count` values at list indices `[index, index + count)`.
    pub fn delete_at(&mut self, order: &Order, index: usize, count: usize) -> Result<(), ListError> {
        self.items.delete_at(order, index, count)
    }

    /// Inserts `value` at a fresh position immediately after `prev` (which
    /// may be [`MIN_POSITION`] for the front of the list).
    ///
    /// Returns the new position and, when allocation created a node, its
    /// [`NodeMeta`] for distribution to collaborators.
    pub fn insert(
        &mut self,
        order: &mut Order,
        prev: Position,
        value: T,
    ) -> Result<(Position, Option<NodeMeta>), ListError> {
        self.items.insert(order, prev, vec![value])
    }

    /// Inserts `value` at a fresh position so that it ends up at list index
    /// `index` (which may equal the current length, appending).
    ///
    /// See [`List::insert`] for the return value.
    pub fn insert_at(
        &mut self,
        order: &mut Order,
        index: usize,
        value: T,
    ) -> Result<(Position, Option<NodeMeta>), ListError> {
        self.items.insert_at(order, index, vec![value])
    }

    /// Appends `value` at the end of the list.
    ///
    /// See [`List::insert`] for the return value.
    pub fn push(
        &mut self,
        order: &mut Order,
        value: T,
    ) -> Result<(Position, Option<NodeMeta>), ListError> {
        let len = self.len();
        self.insert_at(order, len, value)
    }

    /// Removes every value. Positions stay valid for later writes.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// The position of the value at list index `index`.
    pub fn position_at(&self, order: &Order, index: usize) -> Result<Position, ListError> {
        self.items.position_at(order, index)
    }

    /// The list index of the value at `pos`, or `None` if `pos` holds no
    /// value.
    pub fn index_of(&self, order: &Order, pos: Position) -> Result<Option<usize>, ListError> {
        let index = self
            .items
            .index_of_position(order, pos, SearchDir::None)?;
        Ok(usize::try_from(index).ok())
    }

    /// The list index of `pos` under an explicit absent-position policy;
    /// see [`SearchDir`].
    pub fn index_of_position(
        &self,
        order: &Order,
        pos: Position,
        dir: SearchDir,
    ) -> Result<isize, ListError> {
        self.items.index_of_position(order, pos, dir)
    }

    /// The cursor sitting between list indices `index - 1` and `index`: the
    /// position of the entry to its left, or [`MIN_POSITION`] at the front.
    ///
    /// A cursor stays attached to its left neighbour as the list changes,
    /// which is the usual caret behaviour in editors.
    pub fn cursor_at(&self, order: &Order, index: usize) -> Result<Position, ListError> {
        if index == 0 {
            Ok(MIN_POSITION)
        } else {
            self.position_at(order, index - 1)
        }
    }

    /// Where the cursor `cursor` currently sits: the index such that
    /// everything at or right of it is right of the cursor.
    pub fn index_of_cursor(&self, order: &Order, cursor: Position) -> Result<usize, ListError> {
        let left = self
            .items
            .index_of_position(order, cursor, SearchDir::Left)?;
        Ok((left + 1) as usize)
    }

    /// Iterates the `(position, value)` pairs whose indices fall in `range`,
    /// in list order. The range is clamped to the list length.
    pub fn iter<'a>(
        &'a self,
        order: &'a Order,
        range: impl RangeBounds<usize>,
    ) -> impl Iterator<Item = (Position, &'a T)> {
        self.items.entries(order, range)
    }

    /// Iterates all values in list order.
    pub fn values<'a>(&'a self, order: &'a Order) -> impl Iterator<Item = &'a T> {
        self.iter(order, ..).map(|(_, value)| value)
    }

    /// Saves the contents as per-node slot/value maps.
    ///
    /// Pair with [`Order::save`] when the node tree has to travel too.
    pub fn save(&self) -> ListSavedState<T> {
        self.items.save(|values| {
            let mut slots = BTreeMap::new();
            let mut slicer = values.slicer();
            while let Some((slot, value)) = slicer.next_before(None) {
                slots.insert(slot, value.clone());
            }
            slots
        })
    }

    /// Replaces the contents with a saved state.
    ///
    /// Every node id must already be known to `order`; see
    /// [`ItemList::load`] for the failure contract.
    pub fn load(&mut self, order: &Order, saved: ListSavedState<T>) -> Result<(), ListError> {
        self.items.load(order, saved, |slots| {
            let mut values = SparseItems::new();
            let mut next_slot = 0;
            let mut run: Vec<T> = Vec::new();
            for (slot, value) in slots {
                if slot != next_slot {
                    if !run.is_empty() {
                        values.append_item(std::mem::take(&mut run));
                    }
                    values.append_absent(slot - next_slot);
                }
                run.push(value);
                next_slot = slot + 1;
            }
            if !run.is_empty() {
                values.append_item(run);
            }
            values
        })
    }

    /// Asserts every bookkeeping invariant. Test support.
    #[doc(hidden)]
    pub fn check_invariants(&self, order: &Order) {
        self.items.check_invariants(order);
    }
}
