// Copyright 2025 The poslist Developers. Licensed under MIT or Apache-2.0.
//! # The position-keyed list core
//!
//! This module provides [`ItemList`], the structure behind both
//! [`List`](crate::List) and [`Outline`](crate::Outline). It maps positions
//! drawn from an [`Order`] to values, and keeps just enough derived
//! bookkeeping to translate between positions and dense list indices without
//! rescanning the tree:
//!
//! - per node, the values themselves, as a sparse run-length sequence;
//! - per node, a **subtree total**: the number of present values in the node
//!   and all of its descendants;
//! - per node, the count of the parent's own present slots that precede the
//!   node's anchor, so that index lookups need not rescan parent run lists.
//!
//! A node has a record exactly while its subtree total is positive. Records
//! are created on demand on the write path and destroyed the moment their
//! total reaches zero, so memory is proportional to the populated part of
//! the tree, not to the tree itself.
//!
//! The [`Order`] is read, never written, except by the `insert*` operations,
//! which ask it to allocate positions. It is passed into each call rather
//! than owned: any number of lists can be keyed by one order.

use crate::{
    create_map,
    order::{ChildRef, NodeId, NodeMeta, Order, Position, MAX_POSITION, MIN_POSITION},
    sparse::{RunItem, Slicer, SparseItems},
    ListError,
};
use smallvec::SmallVec;
use std::{
    cell::Cell,
    collections::{BTreeMap, HashMap},
    ops::{Bound, RangeBounds},
};

/// How [`ItemList::index_of_position`] treats a position that holds no
/// value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SearchDir {
    /// Return `-1` for absent positions.
    None,
    /// Return the index of the nearest present position to the left, or
    /// `-1` if there is none.
    Left,
    /// Return the index of the nearest present position to the right, or
    /// the list length if there is none.
    Right,
}

/// Everything tracked for one node with a positive subtree total.
#[derive(Clone, Debug, PartialEq)]
struct NodeData<I> {
    /// Present values in this node plus all descendants.
    total: usize,
    /// Present slots of the parent that precede this node's anchor.
    parent_values_before: usize,
    /// This node's own slots.
    values: SparseItems<I>,
}

/// A sequence of items keyed by [`Position`]s, indexable both ways.
///
/// This is the core type; unless you are building your own facade, you
/// probably want [`List`](crate::List) or [`Outline`](crate::Outline)
/// instead. The `I` parameter is the item shape stored per present run —
/// see [`RunItem`].
///
/// # Position validity
///
/// Read accessors ([`ItemList::get`], [`ItemList::has`]) treat positions of
/// unknown nodes as absent. Everything that has to place a position in the
/// total order resolves its node through the [`Order`] and reports
/// [`ListError::MissingNode`] if it has never been registered there.
#[derive(Clone, Debug)]
pub struct ItemList<I> {
    state: HashMap<NodeId, NodeData<I>, ahash::RandomState>,
    /// Memo for [`ItemList::index_of_position`]: the number of values that
    /// precede the entire subtree of the given node. Single entry; dropped
    /// whenever a mutation touches any *other* node (a mutation inside the
    /// memoised node's own subtree cannot change what comes before it).
    before_node_memo: Cell<Option<(NodeId, usize)>>,
}

impl<I> Default for ItemList<I> {
    fn default() -> Self {
        Self {
            state: create_map(),
            before_node_memo: Cell::new(None),
        }
    }
}

impl<I: RunItem + PartialEq> PartialEq for ItemList<I> {
    fn eq(&self, other: &Self) -> bool {
        // the memo is derived state and deliberately not compared
        self.state == other.state
    }
}

impl<I: RunItem> ItemList<I> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of present values.
    pub fn len(&self) -> usize {
        self.state.get(&NodeId::ROOT).map_or(0, |data| data.total)
    }

    /// True if no value is present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value at `pos`, if one is present there.
    pub fn get(&self, pos: Position) -> Option<&I::Value> {
        self.state
            .get(&pos.node)
            .and_then(|data| data.values.get_info(pos.slot).0)
    }

    /// True if a value is present at `pos`.
    pub fn has(&self, pos: Position) -> bool {
        self.get(pos).is_some()
    }

    /// Writes `item` over the `item.len()` slots starting at `start`,
    /// overwriting whatever was there.
    ///
    /// Returns exactly what previously occupied those slots; its
    /// [`count`](SparseItems::count) is the number of values destroyed. An
    /// empty item is a no-op beyond resolving the node.
    pub fn set(
        &mut self,
        order: &Order,
        start: Position,
        item: I,
    ) -> Result<SparseItems<I>, ListError> {
        order.entry(start.node)?;
        let len = item.len();
        if len == 0 {
            return Ok(SparseItems::new());
        }
        let last = self.validated_last_slot(start, len)?;
        if start.node.is_root() && last > 1 {
            return Err(ListError::InvalidPosition {
                pos: Position::new(start.node, last),
                reason: "the root node only has slots 0 and 1",
            });
        }

        if !self.state.contains_key(&start.node) {
            let seeded = self.seed_parent_values_before(order, start.node)?;
            self.state.insert(
                start.node,
                NodeData {
                    total: 0,
                    parent_values_before: seeded,
                    values: SparseItems::new(),
                },
            );
        }
        let data = self.state.get_mut(&start.node).expect("ensured above");
        let displaced = data.values.set(start.slot, item);
        let delta = len as isize - displaced.count() as isize;
        self.after_update(order, start.node, delta)?;
        Ok(displaced)
    }

    /// Marks the `count` slots starting at `start` absent.
    ///
    /// Returns exactly what previously occupied those slots. Deleting slots
    /// that are already absent (or belong to a node holding nothing) is a
    /// no-op. A zero `count` is a no-op beyond resolving the node.
    pub fn delete(
        &mut self,
        order: &Order,
        start: Position,
        count: usize,
    ) -> Result<SparseItems<I>, ListError> {
        order.entry(start.node)?;
        if count == 0 {
            return Ok(SparseItems::new());
        }
        let last = self.validated_last_slot(start, count)?;
        if start.node.is_root() && last > 1 {
            return Err(ListError::InvalidPosition {
                pos: Position::new(start.node, last),
                reason: "the root node only has slots 0 and 1",
            });
        }

        let Some(data) = self.state.get_mut(&start.node) else {
            return Ok(SparseItems::new());
        };
        let displaced = data.values.delete(start.slot, count);
        let delta = -(displaced.count() as isize);
        self.after_update(order, start.node, delta)?;
        Ok(displaced)
    }

    fn validated_last_slot(&self, start: Position, count: usize) -> Result<usize, ListError> {
        let past_end = start.slot.checked_add(count).ok_or(ListError::InvalidCount {
            count,
            reason: "slot arithmetic overflow",
        })?;
        Ok(past_end - 1)
    }

    /// Inserts `item` immediately after the position `prev`, allocating
    /// fresh positions through `order`.
    ///
    /// `prev` may be [`MIN_POSITION`] to insert at the front; it may not be
    /// [`MAX_POSITION`]. Returns the position of the first inserted value
    /// (the rest follow it slot by slot in the same node) and the metadata
    /// of the newly created node, if allocation needed one.
    pub fn insert(
        &mut self,
        order: &mut Order,
        prev: Position,
        item: I,
    ) -> Result<(Position, Option<NodeMeta>), ListError> {
        if item.is_empty() {
            return Err(ListError::InvalidInsertion("nothing to insert"));
        }
        if prev == MAX_POSITION {
            return Err(ListError::InvalidInsertion(
                "cannot insert after the maximum position",
            ));
        }
        let next_index = (self.index_of_position(order, prev, SearchDir::Left)? + 1) as usize;
        let next = if next_index == self.len() {
            MAX_POSITION
        } else {
            self.position_at(order, next_index)?
        };
        let (start, created) = order.create_positions(prev, next, item.len())?;
        self.set(order, start, item)?;
        Ok((start, created))
    }

    /// Inserts `item` so that its first value ends up at list index `index`
    /// (which may equal the current length, appending).
    ///
    /// See [`ItemList::insert`] for the return value.
    pub fn insert_at(
        &mut self,
        order: &mut Order,
        index: usize,
        item: I,
    ) -> Result<(Position, Option<NodeMeta>), ListError> {
        let len = self.len();
        if index > len {
            return Err(ListError::IndexOutOfBounds { index, len });
        }
        if item.is_empty() {
            return Err(ListError::InvalidInsertion("nothing to insert"));
        }
        let prev = if index == 0 {
            MIN_POSITION
        } else {
            self.position_at(order, index - 1)?
        };
        let next = if index == len {
            MAX_POSITION
        } else {
            self.position_at(order, index)?
        };
        let (start, created) = order.create_positions(prev, next, item.len())?;
        self.set(order, start, item)?;
        Ok((start, created))
    }

    /// Deletes the `count` values at list indices `[index, index + count)`.
    pub fn delete_at(
        &mut self,
        order: &Order,
        index: usize,
        count: usize,
    ) -> Result<(), ListError> {
        let len = self.len();
        let past_end = index.checked_add(count).ok_or(ListError::InvalidCount {
            count,
            reason: "index arithmetic overflow",
        })?;
        if past_end > len {
            return Err(ListError::IndexOutOfBounds { index: past_end, len });
        }
        for _ in 0..count {
            let pos = self.position_at(order, index)?;
            self.delete(order, pos, 1)?;
        }
        Ok(())
    }

    /// Removes every value. The order is untouched; positions stay valid
    /// for later writes.
    pub fn clear(&mut self) {
        self.state.clear();
        self.before_node_memo.set(None);
    }

    /// The list index of `pos`.
    ///
    /// If a value is present at `pos`, this is its index regardless of
    /// `dir`. Otherwise the result depends on `dir`; see [`SearchDir`]. The
    /// `Left`/`Right` forms are what you want for cursors: they answer
    /// "where would this position fall today".
    pub fn index_of_position(
        &self,
        order: &Order,
        pos: Position,
        dir: SearchDir,
    ) -> Result<isize, ListError> {
        order.entry(pos.node)?;
        let (present, mut values_before) = match self.state.get(&pos.node) {
            Some(data) => {
                let (value, before) = data.values.get_info(pos.slot);
                (value.is_some(), before)
            }
            None => (false, 0),
        };
        for child in order.child_refs(pos.node)? {
            if child.next_value_index() > pos.slot {
                break;
            }
            values_before += self.total(child.id);
        }
        let index = (values_before + self.before_node(order, pos.node)?) as isize;
        Ok(match (present, dir) {
            (true, _) => index,
            (false, SearchDir::None) => -1,
            (false, SearchDir::Left) => index - 1,
            (false, SearchDir::Right) => index,
        })
    }

    /// The position of the value at list index `index`.
    pub fn position_at(&self, order: &Order, index: usize) -> Result<Position, ListError> {
        let len = self.len();
        if index >= len {
            return Err(ListError::IndexOutOfBounds { index, len });
        }
        let mut remaining = index;
        let mut current = NodeId::ROOT;
        'descend: loop {
            let data = self.state.get(&current).ok_or(ListError::InternalInvariant(
                "descent reached a node without a record",
            ))?;
            // walk the children in order; between two consecutive recorded
            // children lie `parent_values_before` − previous counterpart of
            // the node's own values
            let mut from_slot = 0;
            let mut prev_before = 0;
            for child in order.child_refs(current)? {
                let Some(child_data) = self.state.get(&child.id) else {
                    continue;
                };
                let own_between = child_data.parent_values_before - prev_before;
                if remaining < own_between {
                    return self.own_position_at(data, current, from_slot, remaining);
                }
                remaining -= own_between;
                if remaining < child_data.total {
                    current = child.id;
                    continue 'descend;
                }
                remaining -= child_data.total;
                prev_before = child_data.parent_values_before;
                from_slot = child.next_value_index();
            }
            // past the last recorded child: only the node's own tail remains
            let tail = data.values.count() - prev_before;
            if remaining < tail {
                return self.own_position_at(data, current, from_slot, remaining);
            }
            return Err(ListError::InternalInvariant(
                "ran out of children while locating an index",
            ));
        }
    }

    fn own_position_at(
        &self,
        data: &NodeData<I>,
        node: NodeId,
        from_slot: usize,
        k: usize,
    ) -> Result<Position, ListError> {
        let slot = data
            .values
            .find_present(from_slot, k)
            .ok_or(ListError::InternalInvariant(
                "present count disagrees with child offsets",
            ))?;
        Ok(Position::new(node, slot))
    }

    /// The number of values that precede the entire subtree of `node`,
    /// memoised for the most recently asked node.
    fn before_node(&self, order: &Order, node: NodeId) -> Result<usize, ListError> {
        if let Some((memoised, before)) = self.before_node_memo.get() {
            if memoised == node {
                return Ok(before);
            }
        }
        let mut before = 0;
        let mut cur = node;
        while let Some(parent) = order.parent(cur)? {
            before += match self.state.get(&cur) {
                Some(data) => data.parent_values_before,
                // no record: derive the offset on demand
                None => {
                    let anchor = order.next_value_index(cur)?;
                    self.state
                        .get(&parent)
                        .map_or(0, |p| p.values.get_info(anchor).1)
                }
            };
            for sibling in order.child_refs(parent)? {
                if sibling.id == cur {
                    break;
                }
                before += self.total(sibling.id);
            }
            cur = parent;
        }
        self.before_node_memo.set(Some((node, before)));
        Ok(before)
    }

    fn total(&self, node: NodeId) -> usize {
        self.state.get(&node).map_or(0, |data| data.total)
    }

    /// Restores the derived bookkeeping after the values of `node` changed
    /// by `delta` present slots: drop the memo if it is for another node,
    /// add `delta` to the subtree total of every node up to the root
    /// (creating and destroying records as totals cross zero), then refresh
    /// the stored parent offsets of `node`'s direct children.
    fn after_update(&mut self, order: &Order, node: NodeId, delta: isize) -> Result<(), ListError> {
        if self.before_node_memo.get().map(|(n, _)| n) != Some(node) {
            self.before_node_memo.set(None);
        }
        if delta != 0 {
            let mut cur = node;
            loop {
                if !self.state.contains_key(&cur) {
                    let seeded = self.seed_parent_values_before(order, cur)?;
                    self.state.insert(
                        cur,
                        NodeData {
                            total: 0,
                            parent_values_before: seeded,
                            values: SparseItems::new(),
                        },
                    );
                }
                let data = self.state.get_mut(&cur).expect("ensured above");
                data.total = data
                    .total
                    .checked_add_signed(delta)
                    .expect("subtree totals never go negative");
                if data.total == 0 {
                    self.state.remove(&cur);
                }
                match order.parent(cur)? {
                    Some(parent) => cur = parent,
                    None => break,
                }
            }
        }
        // totals first, offsets second: a child record destroyed by the walk
        // above is skipped here naturally
        let refreshed: SmallVec<[(NodeId, usize); 8]> = {
            let values = self.state.get(&node).map(|data| &data.values);
            order
                .child_refs(node)?
                .iter()
                .filter(|child| self.state.contains_key(&child.id))
                .map(|child| {
                    let before =
                        values.map_or(0, |v| v.get_info(child.next_value_index()).1);
                    (child.id, before)
                })
                .collect()
        };
        for (child, before) in refreshed {
            self.state
                .get_mut(&child)
                .expect("collected from the state map just above")
                .parent_values_before = before;
        }
        Ok(())
    }

    /// The count of parent present slots before `node`'s anchor, read from
    /// the parent's current values (zero when the parent holds nothing).
    fn seed_parent_values_before(&self, order: &Order, node: NodeId) -> Result<usize, ListError> {
        let Some(parent) = order.parent(node)? else {
            return Ok(0);
        };
        let anchor = order.next_value_index(node)?;
        Ok(self
            .state
            .get(&parent)
            .map_or(0, |data| data.values.get_info(anchor).1))
    }

    /// Iterates the `(position, value)` pairs whose list indices fall in
    /// `range`, in list order.
    ///
    /// The range is clamped to `0..len`; an inverted range yields nothing.
    /// Iteration uses an explicit stack (deep trees cannot overflow the call
    /// stack) and skips whole subtrees that end before the range starts.
    pub fn entries<'a>(
        &'a self,
        order: &'a Order,
        range: impl RangeBounds<usize>,
    ) -> Entries<'a, I> {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        };
        let end = end.min(len);
        let mut entries = Entries {
            list: self,
            order,
            stack: Vec::new(),
            index: 0,
            start,
            end,
        };
        if start < end {
            if let Some(root) = self.state.get(&NodeId::ROOT) {
                entries.push_frame(NodeId::ROOT, root);
            }
        }
        entries
    }

    /// Saves the list as a map from node id to the encoding `f` makes of
    /// that node's sparse values. Exactly the nodes with at least one
    /// present slot appear; the map is sorted by node id.
    pub fn save<S>(&self, mut f: impl FnMut(&SparseItems<I>) -> S) -> BTreeMap<NodeId, S> {
        self.state
            .iter()
            .filter(|(_, data)| !data.values.is_empty())
            .map(|(&node, data)| (node, f(&data.values)))
            .collect()
    }

    /// Replaces this list's contents with a saved state, decoding each
    /// node's values with `g`.
    ///
    /// Every node id must be known to `order` (register collaborators'
    /// [`NodeMeta`]s first); the first unknown one fails the load, and a
    /// failed load leaves unspecified partial contents — treat it as total.
    pub fn load<S>(
        &mut self,
        order: &Order,
        saved: impl IntoIterator<Item = (NodeId, S)>,
        mut g: impl FnMut(S) -> SparseItems<I>,
    ) -> Result<(), ListError> {
        self.clear();
        for (node, stored) in saved {
            order.entry(node)?;
            let values = g(stored);
            let count = values.count();
            if self.state.contains_key(&node) {
                let data = self.state.get_mut(&node).expect("checked above");
                debug_assert!(data.values.is_empty(), "node loaded twice");
                data.values = values;
            } else {
                let seeded = self.seed_parent_values_before(order, node)?;
                self.state.insert(
                    node,
                    NodeData {
                        total: 0,
                        parent_values_before: seeded,
                        values,
                    },
                );
            }
            self.after_update(order, node, count as isize)?;
        }
        Ok(())
    }

    /// Asserts every bookkeeping invariant. Test support.
    #[doc(hidden)]
    pub fn check_invariants(&self, order: &Order) {
        let mut own_sum = 0;
        for (&node, data) in &self.state {
            assert!(data.total > 0, "record with zero total at {node}");
            data.values.check_normal_form();
            own_sum += data.values.count();

            let child_sum: usize = order
                .child_refs(node)
                .expect("record nodes are known to the order")
                .iter()
                .filter_map(|c| self.state.get(&c.id))
                .map(|d| d.total)
                .sum();
            assert_eq!(
                data.total,
                data.values.count() + child_sum,
                "subtree total mismatch at {node}"
            );

            if let Some(parent) = order
                .parent(node)
                .expect("record nodes are known to the order")
            {
                let parent_data = self
                    .state
                    .get(&parent)
                    .unwrap_or_else(|| panic!("record at {node} but none at its parent"));
                let anchor = order
                    .next_value_index(node)
                    .expect("record nodes are known to the order");
                assert_eq!(
                    data.parent_values_before,
                    parent_data.values.get_info(anchor).1,
                    "stale parent offset at {node}"
                );
            }
        }
        assert_eq!(own_sum, self.len(), "present slots disagree with length");
    }
}

struct Frame<'a, I> {
    node: NodeId,
    children: &'a [ChildRef],
    next_child: usize,
    /// The anchor of `children[next_child]`, bounding the current slice of
    /// the node's own values; `None` past the last child.
    end_slot: Option<usize>,
    slicer: Slicer<'a, I>,
}

/// Iterator over a slice of an [`ItemList`] in list order.
///
/// Produced by [`ItemList::entries`]; yields `(position, value)` pairs.
/// Single pass, not restartable. Because it borrows the list, mutating
/// during iteration is rejected at compile time.
pub struct Entries<'a, I> {
    list: &'a ItemList<I>,
    order: &'a Order,
    stack: Vec<Frame<'a, I>>,
    /// List index of the next present value the walk will reach (emitted or
    /// not).
    index: usize,
    start: usize,
    end: usize,
}

impl<'a, I: RunItem> Entries<'a, I> {
    fn push_frame(&mut self, node: NodeId, data: &'a NodeData<I>) {
        let children = self
            .order
            .child_refs(node)
            .expect("records only exist for known nodes");
        self.stack.push(Frame {
            node,
            children,
            next_child: 0,
            end_slot: children.first().map(|c| c.next_value_index()),
            slicer: data.values.slicer(),
        });
    }
}

impl<'a, I: RunItem> Iterator for Entries<'a, I> {
    type Item = (Position, &'a I::Value);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.index >= self.end {
                self.stack.clear();
                return None;
            }
            let frame = self.stack.last_mut()?;

            // drain the node's own values up to the next child's anchor
            if let Some((slot, value)) = frame.slicer.next_before(frame.end_slot) {
                let node = frame.node;
                let index = self.index;
                self.index += 1;
                if index >= self.start {
                    return Some((Position::new(node, slot), value));
                }
                continue;
            }

            if frame.next_child == frame.children.len() {
                self.stack.pop();
                continue;
            }
            let child = frame.children[frame.next_child];
            frame.next_child += 1;
            frame.end_slot = frame
                .children
                .get(frame.next_child)
                .map(|c| c.next_value_index());

            if let Some(data) = self.list.state.get(&child.id) {
                if self.index + data.total > self.start {
                    self.push_frame(child.id, data);
                } else {
                    // the whole subtree ends before the slice starts
                    self.index += data.total;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::ReplicaId;

    type StrList = ItemList<Vec<&'static str>>;

    fn setup() -> (Order, StrList) {
        (Order::new(ReplicaId::new(1)), ItemList::new())
    }

    fn contents(order: &Order, list: &StrList) -> Vec<&'static str> {
        list.entries(order, ..).map(|(_, &v)| v).collect()
    }

    #[test]
    fn empty_list() {
        let (order, list) = setup();
        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
        assert_eq!(list.entries(&order, ..).count(), 0);
        assert!(matches!(
            list.position_at(&order, 0),
            Err(ListError::IndexOutOfBounds { index: 0, len: 0 })
        ));
        list.check_invariants(&order);
    }

    #[test]
    fn root_slots_hold_values() {
        let (order, mut list) = setup();
        list.set(&order, Position::new(NodeId::ROOT, 0), vec!["a"]).unwrap();
        list.set(&order, Position::new(NodeId::ROOT, 1), vec!["b"]).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.position_at(&order, 0).unwrap(), Position::new(NodeId::ROOT, 0));
        assert_eq!(list.position_at(&order, 1).unwrap(), Position::new(NodeId::ROOT, 1));
        assert_eq!(list.get(Position::new(NodeId::ROOT, 0)), Some(&"a"));
        list.check_invariants(&order);

        // slot 2 does not exist on the root
        assert!(matches!(
            list.set(&order, Position::new(NodeId::ROOT, 2), vec!["c"]),
            Err(ListError::InvalidPosition { .. })
        ));
        // nor does a multi-slot write that would reach past slot 1
        assert!(matches!(
            list.set(&order, Position::new(NodeId::ROOT, 1), vec!["b", "c"]),
            Err(ListError::InvalidPosition { .. })
        ));
        // but a zero-length write is a no-op, not an error
        assert!(list
            .set(&order, Position::new(NodeId::ROOT, 5), Vec::new())
            .unwrap()
            .is_empty());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn delete_middle_keeps_neighbours() {
        let (mut order, mut list) = setup();
        let (start, _) = list.insert_at(&mut order, 0, vec!["a", "b", "c"]).unwrap();
        let node = start.node;
        assert_eq!(list.len(), 3);

        let displaced = list.delete(&order, Position::new(node, 1), 1).unwrap();
        assert_eq!(displaced.count(), 1);
        assert_eq!(list.len(), 2);
        assert_eq!(
            list.index_of_position(&order, Position::new(node, 1), SearchDir::None)
                .unwrap(),
            -1
        );
        assert_eq!(
            list.index_of_position(&order, Position::new(node, 1), SearchDir::Left)
                .unwrap(),
            0
        );
        assert_eq!(
            list.index_of_position(&order, Position::new(node, 1), SearchDir::Right)
                .unwrap(),
            1
        );
        assert_eq!(list.get(Position::new(node, 2)), Some(&"c"));
        list.check_invariants(&order);

        // deleting the already-absent slot again changes nothing
        let displaced = list.delete(&order, Position::new(node, 1), 1).unwrap();
        assert_eq!(displaced.count(), 0);
        assert_eq!(list.len(), 2);
        list.check_invariants(&order);
    }

    #[test]
    fn children_interleave_with_parent_slots() {
        let (mut order, mut list) = setup();
        let r2 = ReplicaId::new(2);
        let c1 = NodeMeta {
            id: NodeId::new(r2, 0),
            parent: NodeId::ROOT,
            offset: 1, // anchored before root slot 1
        };
        let c2 = NodeMeta {
            id: NodeId::new(r2, 1),
            parent: NodeId::ROOT,
            offset: 3, // anchored past root slot 1
        };
        order.register_nodes([c1, c2]).unwrap();

        list.set(&order, Position::new(NodeId::ROOT, 0), vec!["r0"]).unwrap();
        list.set(&order, Position::new(NodeId::ROOT, 1), vec!["r1"]).unwrap();
        list.set(&order, Position::new(c1.id, 0), vec!["c1a"]).unwrap();
        list.set(&order, Position::new(c2.id, 0), vec!["c2a", "c2b"]).unwrap();

        assert_eq!(list.len(), 5);
        assert_eq!(contents(&order, &list), vec!["r0", "c1a", "r1", "c2a", "c2b"]);
        for (expect, pos) in [
            (0, Position::new(NodeId::ROOT, 0)),
            (1, Position::new(c1.id, 0)),
            (2, Position::new(NodeId::ROOT, 1)),
            (3, Position::new(c2.id, 0)),
            (4, Position::new(c2.id, 1)),
        ] {
            assert_eq!(
                list.index_of_position(&order, pos, SearchDir::None).unwrap(),
                expect
            );
            assert_eq!(list.position_at(&order, expect as usize).unwrap(), pos);
        }
        list.check_invariants(&order);
    }

    #[test]
    fn index_round_trips_after_scattered_edits() {
        let (mut order, mut list) = setup();
        list.insert_at(&mut order, 0, vec!["d", "e"]).unwrap();
        list.insert_at(&mut order, 0, vec!["a", "b", "c"]).unwrap();
        list.insert_at(&mut order, 4, vec!["x"]).unwrap();
        list.delete_at(&order, 1, 2).unwrap();
        list.insert_at(&mut order, 3, vec!["y", "z"]).unwrap();

        list.check_invariants(&order);
        let len = list.len();
        assert_eq!(len, 6);
        for index in 0..len {
            let pos = list.position_at(&order, index).unwrap();
            assert_eq!(
                list.index_of_position(&order, pos, SearchDir::None).unwrap(),
                index as isize
            );
        }
        for (pos, _) in list.entries(&order, ..) {
            let index = list.index_of_position(&order, pos, SearchDir::None).unwrap();
            assert_eq!(list.position_at(&order, index as usize).unwrap(), pos);
        }
    }

    #[test]
    fn insert_after_position() {
        let (mut order, mut list) = setup();
        let (a, _) = list.insert(&mut order, MIN_POSITION, vec!["a"]).unwrap();
        let (_c, _) = list.insert(&mut order, a, vec!["c"]).unwrap();
        let (_b, _) = list.insert(&mut order, a, vec!["b"]).unwrap();
        assert_eq!(contents(&order, &list), vec!["a", "b", "c"]);

        // inserting after a deleted position still lands between its
        // neighbours
        list.delete(&order, a, 1).unwrap();
        list.insert(&mut order, a, vec!["a2"]).unwrap();
        assert_eq!(contents(&order, &list), vec!["a2", "b", "c"]);
        list.check_invariants(&order);
    }

    #[test]
    fn insert_rejects_the_unrepresentable() {
        let (mut order, mut list) = setup();
        assert!(matches!(
            list.insert(&mut order, MAX_POSITION, vec!["x"]),
            Err(ListError::InvalidInsertion(_))
        ));
        assert!(matches!(
            list.insert(&mut order, MIN_POSITION, Vec::<&str>::new()),
            Err(ListError::InvalidInsertion(_))
        ));
        assert!(matches!(
            list.insert_at(&mut order, 1, vec!["x"]),
            Err(ListError::IndexOutOfBounds { .. })
        ));
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn records_vanish_when_emptied() {
        let (mut order, mut list) = setup();
        let (start, _) = list.insert_at(&mut order, 0, vec!["a", "b"]).unwrap();
        list.insert_at(&mut order, 0, vec!["front"]).unwrap();
        assert_eq!(list.len(), 3);

        list.delete(&order, start, 2).unwrap();
        assert_eq!(list.len(), 1);
        list.check_invariants(&order);
        // only the node still holding a value is saved
        assert_eq!(list.save(|v| v.count()).len(), 1);

        list.clear();
        assert_eq!(list.len(), 0);
        assert_eq!(list.entries(&order, ..).count(), 0);
        assert!(list.save(|v| v.count()).is_empty());
        list.check_invariants(&order);
    }

    #[test]
    fn entries_slices_and_clamps() {
        let (mut order, mut list) = setup();
        for i in 0..8 {
            let values: Vec<&'static str> =
                vec![["a", "b", "c", "d", "e", "f", "g", "h"][i]];
            list.insert_at(&mut order, i, values).unwrap();
        }
        let all = contents(&order, &list);

        let slice: Vec<_> = list.entries(&order, 2..5).map(|(_, &v)| v).collect();
        assert_eq!(slice, &all[2..5]);
        let tail: Vec<_> = list.entries(&order, 6..).map(|(_, &v)| v).collect();
        assert_eq!(tail, &all[6..]);
        let clamped: Vec<_> = list.entries(&order, 5..100).map(|(_, &v)| v).collect();
        assert_eq!(clamped, &all[5..]);
        assert_eq!(list.entries(&order, 3..3).count(), 0);
        #[allow(clippy::reversed_empty_ranges)]
        let inverted = list.entries(&order, 5..2).count();
        assert_eq!(inverted, 0);
        assert_eq!(list.entries(&order, 100..).count(), 0);
    }

    #[test]
    fn memo_survives_only_same_node_mutations() {
        let (mut order, mut list) = setup();
        // [a1, a2, a3], then [b1, a1, a2, a3] with b1 on its own node
        let (a, _) = list.insert_at(&mut order, 0, vec!["a1", "a2", "a3"]).unwrap();
        let (b, _) = list.insert_at(&mut order, 0, vec!["b1"]).unwrap();
        assert_ne!(a.node, b.node);

        // prime the memo for a's node, then mutate a's node: memo survives
        // and stays correct, because nothing before the subtree changed
        for slot in 0..3 {
            list.index_of_position(&order, Position::new(a.node, slot), SearchDir::None)
                .unwrap();
        }
        list.delete(&order, Position::new(a.node, 1), 1).unwrap();
        // [b1, a1, a3]
        assert_eq!(
            list.index_of_position(&order, Position::new(a.node, 2), SearchDir::None)
                .unwrap(),
            2
        );

        // mutate a different node: memo is dropped and recomputed
        list.insert_at(&mut order, 0, vec!["front"]).unwrap();
        // [front, b1, a1, a3]
        assert_eq!(
            list.index_of_position(&order, Position::new(a.node, 2), SearchDir::None)
                .unwrap(),
            3
        );
        assert_eq!(
            list.index_of_position(&order, b, SearchDir::None).unwrap(),
            1
        );

        // and every answer matches a memo-free list built from scratch
        let mut fresh = StrList::new();
        fresh
            .load(&order, list.save(SparseItems::clone), |values| values)
            .unwrap_or_else(|e| panic!("reload failed: {e}"));
        for index in 0..list.len() {
            let pos = list.position_at(&order, index).unwrap();
            assert_eq!(
                fresh
                    .index_of_position(&order, pos, SearchDir::None)
                    .unwrap(),
                index as isize
            );
        }
    }

    #[test]
    fn unknown_nodes_error_where_order_is_consulted() {
        let (order, mut list) = setup();
        let ghost = Position::new(NodeId::new(ReplicaId::new(9), 0), 0);
        assert_eq!(list.get(ghost), None);
        assert!(!list.has(ghost));
        assert_eq!(
            list.index_of_position(&order, ghost, SearchDir::None),
            Err(ListError::MissingNode(ghost.node))
        );
        assert_eq!(
            list.set(&order, ghost, vec!["x"]),
            Err(ListError::MissingNode(ghost.node))
        );
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn save_load_round_trip() {
        let (mut order, mut list) = setup();
        list.insert_at(&mut order, 0, vec!["a", "b", "c"]).unwrap();
        list.insert_at(&mut order, 1, vec!["x", "y"]).unwrap();
        list.delete_at(&order, 3, 1).unwrap();

        let saved = list.save(SparseItems::clone);
        let mut reloaded = StrList::new();
        reloaded.load(&order, saved, |values| values).unwrap();

        assert_eq!(reloaded, list);
        assert_eq!(reloaded.len(), list.len());
        reloaded.check_invariants(&order);
        assert!(list
            .entries(&order, ..)
            .eq(reloaded.entries(&order, ..)));
    }

    #[test]
    fn load_rejects_unknown_nodes() {
        let (order, mut list) = setup();
        let ghost = NodeId::new(ReplicaId::new(9), 0);
        let mut values = SparseItems::new();
        values.append_item(vec!["x"]);
        assert_eq!(
            list.load(&order, [(ghost, values)], |v| v),
            Err(ListError::MissingNode(ghost))
        );
    }

    #[quickcheck]
    fn set_then_delete_is_identity(slots: Vec<u8>) -> bool {
        let (mut order, mut list) = setup();
        list.insert_at(&mut order, 0, vec!["a", "b", "c", "d"])
            .ok();
        let baseline = list.clone();
        let node = list.position_at(&order, 0).unwrap().node;

        for &slot in &slots {
            let slot = usize::from(slot);
            let displaced = list.set(&order, Position::new(node, slot), vec!["w"]).unwrap();
            if displaced.count() == 0 {
                list.delete(&order, Position::new(node, slot), 1).unwrap();
            } else {
                // the slot held a value before; writing it back restores it
                let previous = displaced.get_info(0).0.copied().unwrap();
                list.set(&order, Position::new(node, slot), vec![previous])
                    .unwrap();
            }
            list.check_invariants(&order);
        }
        list == baseline
    }
}
