// Copyright 2025 The poslist Developers. Licensed under MIT or Apache-2.0.
//! # The position tree
//!
//! This module provides [`Order`], the allocator and registry for the
//! tree-structured total order that every list in this crate is keyed by.
//!
//! ## Nodes and anchors
//!
//! Positions come in batches called *nodes*: a [`NodeId`] plus an unbounded
//! range of slots, of which a list may fill any subset. Every node except the
//! distinguished root is anchored inside its parent via an `offset`: a node
//! with offset `2·s + 1` is a *right child* of the parent slot `s` (its
//! subtree sorts immediately after `(parent, s)`), and a node with offset
//! `2·s` is a *left child* (its subtree sorts immediately before
//! `(parent, s)`). Siblings sort by `(offset, id)`. The slot index at or
//! before which a child is anchored — `(offset + 1) / 2` — is its
//! *next-value index*.
//!
//! The root only admits slots `0` and `1`; those two positions double as the
//! [`MIN_POSITION`] and [`MAX_POSITION`] sentinels that bound every list.
//!
//! ## Allocation
//!
//! [`Order::create_positions`] hands out `n` consecutive fresh positions
//! strictly between two existing ones. When the preceding position is the
//! frontier of a node this `Order` created, the node is simply extended and
//! no new node is needed; otherwise exactly one new node is created and its
//! [`NodeMeta`] returned so it can be shipped to collaborators. Nodes learned
//! from collaborators are admitted with [`Order::register_nodes`].
//!
//! An `Order` never forgets a node, and it never moves one: the tree only
//! grows, which is what makes positions permanent identifiers.

use crate::{create_map, ListError};
use std::{cmp::Ordering, collections::HashMap, fmt, str::FromStr};

/// Identifies the actor that creates nodes through one [`Order`].
///
/// Replica `0` is reserved for the root node, so a `ReplicaId` is always
/// non-zero. Two `Order`s that allocate concurrently must use distinct
/// replica ids, otherwise they will mint colliding [`NodeId`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ReplicaId(u64);

impl ReplicaId {
    /// Creates a replica id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is zero, which is reserved for the root node.
    pub fn new(id: u64) -> Self {
        assert!(id != 0, "replica id 0 is reserved for the root node");
        Self(id)
    }

    /// The raw id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifies one node of the position tree.
///
/// Ids are globally unique without coordination because they pair the
/// creating replica with a per-replica counter. The distinguished root is
/// [`NodeId::ROOT`].
///
/// A `NodeId` displays (and, with the `serde` feature, serialises) as
/// `"root"` or `"{replica}.{counter}"`, and parses back via [`FromStr`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    replica: u64,
    counter: u64,
}

impl NodeId {
    /// The root of every position tree.
    pub const ROOT: NodeId = NodeId {
        replica: 0,
        counter: 0,
    };

    /// The id of the `counter`-th node created by `replica`.
    pub fn new(replica: ReplicaId, counter: u64) -> Self {
        Self {
            replica: replica.get(),
            counter,
        }
    }

    /// True for [`NodeId::ROOT`].
    pub fn is_root(self) -> bool {
        self.replica == 0
    }

    /// The creating replica, or `None` for the root.
    pub fn replica(self) -> Option<ReplicaId> {
        (self.replica != 0).then_some(ReplicaId(self.replica))
    }

    /// The creating replica's counter value for this node.
    pub fn counter(self) -> u64 {
        self.counter
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "root")
        } else {
            write!(f, "{}.{}", self.replica, self.counter)
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Error parsing a [`NodeId`] from its string form.
#[derive(Debug)]
pub struct ParseNodeIdError(&'static str);

impl fmt::Display for ParseNodeIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ParseNodeIdError {}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "root" {
            return Ok(NodeId::ROOT);
        }
        let (replica, counter) = s
            .split_once('.')
            .ok_or(ParseNodeIdError("expected `root` or `replica.counter`"))?;
        let replica: u64 = replica
            .parse()
            .map_err(|_| ParseNodeIdError("replica is not a decimal number"))?;
        let counter: u64 = counter
            .parse()
            .map_err(|_| ParseNodeIdError("counter is not a decimal number"))?;
        if replica == 0 {
            return Err(ParseNodeIdError("replica 0 is reserved for the root"));
        }
        Ok(NodeId { replica, counter })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for NodeId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A place in the total order: one slot of one node.
///
/// Positions are cheap `Copy` keys; resolving what (if anything) lives at a
/// position is the job of a list, and resolving how two positions compare is
/// the job of [`Order::cmp_positions`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    /// The node this position belongs to.
    pub node: NodeId,
    /// The slot within the node.
    pub slot: usize,
}

impl Position {
    /// Creates the position for `slot` of `node`.
    pub const fn new(node: NodeId, slot: usize) -> Self {
        Self { node, slot }
    }
}

/// The least position of every order: slot `0` of the root.
///
/// Used as the lower endpoint when inserting at the front of a list.
pub const MIN_POSITION: Position = Position::new(NodeId::ROOT, 0);

/// The greatest position of every order: slot `1` of the root.
///
/// Used as the upper endpoint when inserting at the back of a list. Nothing
/// can be inserted after it.
pub const MAX_POSITION: Position = Position::new(NodeId::ROOT, 1);

/// The creation record of one node: everything a collaborating `Order`
/// needs to mirror it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeMeta {
    /// The node's id.
    pub id: NodeId,
    /// The node it is anchored inside.
    pub parent: NodeId,
    /// The anchor encoding; see the module docs.
    pub offset: usize,
}

impl NodeMeta {
    /// The parent slot index at or before which this node is anchored.
    pub fn next_value_index(&self) -> usize {
        (self.offset + 1) / 2
    }
}

/// A child edge, ordered by `(offset, id)` within its parent.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct ChildRef {
    pub(crate) offset: usize,
    pub(crate) id: NodeId,
}

impl ChildRef {
    pub(crate) fn next_value_index(self) -> usize {
        (self.offset + 1) / 2
    }
}

pub(crate) struct NodeEntry {
    /// `None` only for the root.
    pub(crate) parent: Option<NodeId>,
    pub(crate) offset: usize,
    /// Sorted by `(offset, id)`.
    pub(crate) children: Vec<ChildRef>,
    /// Slots this `Order` has handed out from the node. Only meaningful for
    /// nodes it created itself; zero means the node cannot be extended.
    handed_out: usize,
    /// Created by this `Order` instance (as opposed to registered or loaded).
    ours: bool,
}

/// The position tree: node registry and position allocator.
///
/// See the module docs for the model. An `Order` is deliberately small: it
/// knows nothing about values, lengths, or indices — those live in the lists
/// keyed by it. Any number of lists can share one `Order`.
pub struct Order {
    replica: ReplicaId,
    next_counter: u64,
    nodes: HashMap<NodeId, NodeEntry, ahash::RandomState>,
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Order")
            .field("replica", &self.replica)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl Order {
    /// Creates an order containing only the root node.
    pub fn new(replica: ReplicaId) -> Self {
        let mut nodes = create_map();
        nodes.insert(
            NodeId::ROOT,
            NodeEntry {
                parent: None,
                offset: 0,
                children: Vec::new(),
                // the two sentinel slots are taken
                handed_out: 2,
                ours: false,
            },
        );
        Self {
            replica,
            next_counter: 0,
            nodes,
        }
    }

    /// The replica this order creates nodes as.
    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    /// True if `id` is the root or a node this order has created or
    /// registered.
    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// The creation record of `id`, or `None` if the node is unknown or is
    /// the root (which has no creation record).
    pub fn node_meta(&self, id: NodeId) -> Option<NodeMeta> {
        let entry = self.nodes.get(&id)?;
        entry.parent.map(|parent| NodeMeta {
            id,
            parent,
            offset: entry.offset,
        })
    }

    /// The parent of `id`, or `None` for the root.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, ListError> {
        Ok(self.entry(id)?.parent)
    }

    /// The parent slot index at or before which `id` is anchored.
    ///
    /// Zero for the root (which has no anchor).
    pub fn next_value_index(&self, id: NodeId) -> Result<usize, ListError> {
        Ok((self.entry(id)?.offset + 1) / 2)
    }

    /// The children of `id` in sibling order.
    pub fn children(&self, id: NodeId) -> Result<impl ExactSizeIterator<Item = NodeId> + '_, ListError> {
        Ok(self.entry(id)?.children.iter().map(|c| c.id))
    }

    pub(crate) fn entry(&self, id: NodeId) -> Result<&NodeEntry, ListError> {
        self.nodes.get(&id).ok_or(ListError::MissingNode(id))
    }

    pub(crate) fn child_refs(&self, id: NodeId) -> Result<&[ChildRef], ListError> {
        Ok(&self.entry(id)?.children)
    }

    /// Allocates `count` consecutive positions strictly between `prev` and
    /// `next`, which must be existing positions with `prev` before `next`.
    ///
    /// Returns the first new position (the rest follow it slot by slot
    /// within the same node) and, when a new node had to be created, its
    /// [`NodeMeta`] for distribution to collaborators. The result is
    /// deterministic given the current tree.
    pub fn create_positions(
        &mut self,
        prev: Position,
        next: Position,
        count: usize,
    ) -> Result<(Position, Option<NodeMeta>), ListError> {
        if count == 0 {
            return Err(ListError::InvalidCount {
                count,
                reason: "cannot allocate zero positions",
            });
        }
        if prev == MAX_POSITION {
            return Err(ListError::InvalidInsertion(
                "no position exists after the maximum position",
            ));
        }
        self.entry(prev.node)?;
        self.entry(next.node)?;

        let overflow = ListError::InvalidCount {
            count,
            reason: "slot arithmetic overflow",
        };
        let in_gap = self.lies_in_gap(prev, next)?;

        if !in_gap && !prev.node.is_root() {
            // `next` does not sort before (prev.node, prev.slot + 1), so if
            // prev is the frontier of a node we created, we can hand out its
            // next slots without growing the tree.
            let frontier = prev.slot.checked_add(1).ok_or(overflow)?;
            let entry = self.nodes.get(&prev.node).expect("validated above");
            if entry.ours
                && entry.handed_out == frontier
                && next != Position::new(prev.node, frontier)
            {
                let handed_out = frontier.checked_add(count).ok_or(overflow)?;
                self.nodes
                    .get_mut(&prev.node)
                    .expect("validated above")
                    .handed_out = handed_out;
                return Ok((Position::new(prev.node, frontier), None));
            }
        }

        let (parent, offset) = if in_gap {
            // left child of next: sorts immediately before it, and after
            // everything that already sorts before it (including prev)
            (next.node, next.slot.checked_mul(2).ok_or(overflow)?)
        } else {
            // right child of prev: sorts immediately after it
            let offset = prev
                .slot
                .checked_mul(2)
                .and_then(|o| o.checked_add(1))
                .ok_or(overflow)?;
            (prev.node, offset)
        };

        let id = NodeId {
            replica: self.replica.get(),
            counter: self.next_counter,
        };
        self.next_counter += 1;
        let meta = NodeMeta { id, parent, offset };
        self.insert_node(meta, true, count);
        Ok((Position::new(id, 0), Some(meta)))
    }

    /// Admits node creation records produced elsewhere (by a collaborating
    /// replica, or by [`Order::save`]).
    ///
    /// The batch may be in any order, including children before parents, as
    /// long as every parent is either already known or part of the batch.
    /// Re-registering a known node with identical metadata is a no-op;
    /// conflicting metadata is an error.
    pub fn register_nodes(
        &mut self,
        metas: impl IntoIterator<Item = NodeMeta>,
    ) -> Result<(), ListError> {
        let mut pending: Vec<NodeMeta> = metas.into_iter().collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut i = 0;
            while i < pending.len() {
                let meta = pending[i];
                if self.nodes.contains_key(&meta.parent) {
                    self.admit(meta)?;
                    pending.swap_remove(i);
                } else {
                    i += 1;
                }
            }
            if pending.len() == before {
                return Err(ListError::MissingNode(pending[0].parent));
            }
        }
        Ok(())
    }

    fn admit(&mut self, meta: NodeMeta) -> Result<(), ListError> {
        if meta.id.is_root() {
            return Err(ListError::InvalidPosition {
                pos: Position::new(meta.id, 0),
                reason: "the root node cannot be redefined",
            });
        }
        if let Some(existing) = self.nodes.get(&meta.id) {
            return if existing.parent == Some(meta.parent) && existing.offset == meta.offset {
                Ok(())
            } else {
                Err(ListError::InvalidPosition {
                    pos: Position::new(meta.id, 0),
                    reason: "node already registered with a different parent or anchor",
                })
            };
        }
        if meta.id.replica == self.replica.get() {
            // one of ours coming back from a save; never extend it, but keep
            // minting fresh counters past it
            self.next_counter = self.next_counter.max(meta.id.counter.saturating_add(1));
        }
        self.insert_node(meta, false, 0);
        Ok(())
    }

    fn insert_node(&mut self, meta: NodeMeta, ours: bool, handed_out: usize) {
        let NodeMeta { id, parent, offset } = meta;
        self.nodes.insert(
            id,
            NodeEntry {
                parent: Some(parent),
                offset,
                children: Vec::new(),
                handed_out,
                ours,
            },
        );
        let siblings = &mut self
            .nodes
            .get_mut(&parent)
            .expect("callers check the parent exists")
            .children;
        let at = siblings.partition_point(|c| (c.offset, c.id) <= (offset, id));
        siblings.insert(at, ChildRef { offset, id });
    }

    /// True if `next` sorts strictly between `prev` and the position
    /// immediately after `prev` within `prev`'s own node — that is, inside
    /// one of the subtrees anchored in that gap.
    fn lies_in_gap(&self, prev: Position, next: Position) -> Result<bool, ListError> {
        if next.node == prev.node {
            return Ok(false);
        }
        let gap = [
            prev.slot.checked_mul(2).and_then(|o| o.checked_add(1)),
            prev.slot.checked_mul(2).and_then(|o| o.checked_add(2)),
        ];
        let mut cur = next.node;
        loop {
            let entry = self.entry(cur)?;
            let Some(parent) = entry.parent else {
                return Ok(false);
            };
            if parent == prev.node {
                return Ok(gap.contains(&Some(entry.offset)));
            }
            cur = parent;
        }
    }

    /// Compares two positions in list order.
    pub fn cmp_positions(&self, a: Position, b: Position) -> Result<Ordering, ListError> {
        if a == b {
            return Ok(Ordering::Equal);
        }
        Ok(self.position_key(a)?.cmp(&self.position_key(b)?))
    }

    /// The root-to-position path of anchor keys, comparable lexicographically.
    ///
    /// Each ancestor edge contributes `(offset, Some(id))`; the terminal slot
    /// contributes `(2·slot + 1, None)`, which sorts before any same-offset
    /// child subtree because `None < Some(_)`.
    fn position_key(&self, p: Position) -> Result<Vec<(usize, Option<NodeId>)>, ListError> {
        let mut path = Vec::new();
        let mut cur = p.node;
        while let Some(parent) = self.entry(cur)?.parent {
            path.push((self.entry(cur)?.offset, Some(cur)));
            cur = parent;
        }
        path.reverse();
        path.push((2 * p.slot + 1, None));
        Ok(path)
    }

    /// All node creation records known to this order, sorted by id.
    ///
    /// Feeding the result to [`Order::load`] reproduces the tree.
    pub fn save(&self) -> Vec<NodeMeta> {
        let mut metas: Vec<NodeMeta> = self
            .nodes
            .iter()
            .filter_map(|(&id, entry)| {
                entry.parent.map(|parent| NodeMeta {
                    id,
                    parent,
                    offset: entry.offset,
                })
            })
            .collect();
        metas.sort_unstable_by_key(|m| m.id);
        metas
    }

    /// Reconstructs an order from [`Order::save`] output.
    ///
    /// Nodes previously created under `replica` are admitted but will not be
    /// extended by future allocations; fresh node ids continue past them.
    pub fn load(
        replica: ReplicaId,
        saved: impl IntoIterator<Item = NodeMeta>,
    ) -> Result<Self, ListError> {
        let mut order = Self::new(replica);
        order.register_nodes(saved)?;
        Ok(order)
    }
}
