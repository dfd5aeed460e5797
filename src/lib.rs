// Copyright 2025 The poslist Developers. Licensed under MIT or Apache-2.0.
//! # poslist: An Indexable Position-Keyed List
//!
//! This crate provides the local (single-replica) view layer used on top of a
//! collaborative position allocator, such as a list CRDT: a dense,
//! integer-indexed sequence of values whose entries are keyed by opaque,
//! tree-structured **positions** drawn from a total order.
//!
//! Given positions produced here or elsewhere, it answers:
//!
//! - "what value sits at this position?" ([`List::get`])
//! - "what is the list index of this position?" ([`List::index_of`])
//! - "what position lies at this index?" ([`List::position_at`])
//! - "insert here and give me a fresh position" ([`List::insert_at`])
//! - "iterate in list order" ([`List::iter`])
//!
//! ## Core Concepts
//!
//! ### Positions and the node tree
//!
//! A [`Position`] is a pair of a [`NodeId`] and a slot index. Nodes form a
//! tree owned by an [`Order`]: each node is anchored between two slots of its
//! parent, and **list order** is the depth-first traversal that interleaves a
//! node's own slots with its children's subtrees. Because a position's place
//! in that traversal never changes, positions are stable identifiers: an
//! insertion or deletion elsewhere in the list never renumbers them. This is
//! the same idea that underpins list CRDTs (Martin Kleppmann; Moving elements
//! in list CRDTs (2020)), except that this crate only *consumes* the order —
//! reconciling concurrent edits is the job of whatever produced the
//! positions.
//!
//! ### Sparse storage
//!
//! Values are stored per node as an alternating run-length sequence of
//! present and absent slots ([`SparseItems`]). Deleting a value leaves an
//! absent slot behind; the slot (and its position) can be filled again later.
//! Each node with any present descendant additionally carries a subtree
//! total, which is what makes index↔position translation logarithmic in the
//! tree depth rather than linear in the list length.
//!
//! ### Two facades, one core
//!
//! [`List`] carries one value per present slot. [`Outline`] carries no values
//! at all — it only tracks which positions are present, which is enough to
//! answer ordering and indexing queries about positions whose values live
//! elsewhere. Both are thin wrappers around [`ItemList`], the core structure,
//! parameterised by the item shape ([`RunItem`]).
//!
//! ## Getting Started
//!
//! ```rust
//! use poslist::{List, Order, ReplicaId};
//!
//! let mut order = Order::new(ReplicaId::new(1));
//! let mut list = List::new();
//!
//! // Insertions allocate fresh positions through the order.
//! let (hello, _) = list.insert_at(&mut order, 0, "hello").unwrap();
//! list.insert_at(&mut order, 1, "world").unwrap();
//!
//! assert_eq!(list.len(), 2);
//! assert_eq!(list.get(hello), Some(&"hello"));
//! assert_eq!(list.index_of(&order, hello).unwrap(), Some(0));
//!
//! // Positions survive edits elsewhere in the list.
//! list.insert_at(&mut order, 0, "oh,").unwrap();
//! assert_eq!(list.index_of(&order, hello).unwrap(), Some(1));
//!
//! let words: Vec<&str> = list.iter(&order, ..).map(|(_, v)| *v).collect();
//! assert_eq!(words, ["oh,", "hello", "world"]);
//! ```
//!
//! ## Scope of this Crate
//!
//! This is a local data structure. It does not include networking, a merge
//! algorithm, or persistence I/O. Saved states ([`List::save`],
//! [`Outline::save`], [`Order::save`]) are plain data; shipping them between
//! replicas, and delivering node metadata ([`NodeMeta`]) to peers that need
//! it, is up to you.
//!
//! All operations are synchronous and the types are not internally
//! synchronised; callers requiring concurrent access must serialise it.
//!
//! ## Features
//!
//! - `serde`: derives `Serialize`/`Deserialize` for positions, node metadata,
//!   and the saved-state types. Enabled by default.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use std::{collections::HashMap, error, fmt};

pub mod item_list;
pub mod list;
pub mod order;
pub mod outline;
pub mod sparse;

pub use item_list::{Entries, ItemList, SearchDir};
pub use list::{List, ListSavedState};
pub use order::{NodeId, NodeMeta, Order, Position, ReplicaId, MAX_POSITION, MIN_POSITION};
pub use outline::{Outline, OutlineSavedState};
pub use sparse::{RunItem, SparseItems};

/// Create a hash map with the crate's standard hasher.
pub(crate) fn create_map<K, V>() -> HashMap<K, V, ahash::RandomState> {
    HashMap::default()
}

/// The error surface of this crate.
///
/// Every fallible operation validates its inputs before mutating any state,
/// so an `Err` always leaves the structure it was called on unchanged. The
/// one exception is [`ItemList::load`], which fails fast on the first unknown
/// node and leaves partial state behind; treat a failed load as total.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListError {
    /// A position refers to a slot its node does not admit.
    ///
    /// The root node only has slots `0` and `1`; any write that would touch a
    /// root slot beyond those fails with this error.
    InvalidPosition {
        /// The offending position.
        pos: Position,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// An insertion was requested that cannot produce a position.
    InvalidInsertion(&'static str),
    /// A position or saved state referenced a node the [`Order`] has never
    /// heard of.
    MissingNode(NodeId),
    /// An index-based operation was given an index outside the list.
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The list length at the time of the call.
        len: usize,
    },
    /// A slot count that cannot be honoured (for example, one whose slot
    /// arithmetic would overflow `usize`).
    InvalidCount {
        /// The requested count.
        count: usize,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// An internal bookkeeping invariant (subtree totals, child offsets) was
    /// found violated. Not recoverable; indicates a bug or a corrupted load.
    InternalInvariant(&'static str),
}

impl fmt::Display for ListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListError::InvalidPosition { pos, reason } => {
                write!(f, "invalid position {pos:?}: {reason}")
            }
            ListError::InvalidInsertion(reason) => write!(f, "invalid insertion: {reason}"),
            ListError::MissingNode(id) => write!(f, "unknown node {id}"),
            ListError::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for list of length {len}")
            }
            ListError::InvalidCount { count, reason } => {
                write!(f, "invalid count {count}: {reason}")
            }
            ListError::InternalInvariant(what) => {
                write!(f, "internal invariant violated: {what}")
            }
        }
    }
}

impl error::Error for ListError {}
