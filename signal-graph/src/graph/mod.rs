//! Dependency Graph
//!
//! This module holds the data side of the signal graph: the node records,
//! the arena that owns them, and the batch queues. It never calls user code;
//! the reactive layer drives it.
//!
//! # Overview
//!
//! The graph carries two kinds of edges:
//!
//! - ownership edges form a forest: a scope (or computation) owns the nodes
//!   created while it was the current scope, and disposing it disposes them;
//! - dependency edges form a DAG: a computation lists the readable nodes it
//!   read during its last run (`sources`), and each readable node lists the
//!   computations that read it (`subscribers`).
//!
//! # Design Decisions
//!
//! 1. All nodes of one context live in a single generational arena. Queues
//!    and dependency sets hold plain ids, so a node disposed mid-batch simply
//!    stops resolving and is skipped.
//!
//! 2. Dependency sets are insertion-ordered (`IndexSet`) so propagation order
//!    follows read order and is reproducible.

mod arena;
mod node;
mod queue;

pub(crate) use arena::{IdList, NodeArena};
pub(crate) use node::{AnyValue, ComputeFn, EqualsFn, Node};
pub use node::{NodeId, NodeKind, ScopeState};
pub(crate) use queue::{BatchMode, UpdateQueues};
