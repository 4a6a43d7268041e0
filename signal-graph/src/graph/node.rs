//! Graph Nodes
//!
//! Every participant in the graph (signal, plain scope, memo, effect) is a
//! `Node` stored in the arena. The kind decides which fields are used:
//!
//! | kind   | value | sources | subscribers | children | compute |
//! |--------|-------|---------|-------------|----------|---------|
//! | Signal | yes   |         | yes         |          |         |
//! | Scope  |       |         |             | yes      |         |
//! | Memo   | yes   | yes     | yes         | yes      | yes     |
//! | Effect | yes   | yes     |             | yes      | yes     |

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::error::BoxError;
use crate::reactive::SignalContext;

slotmap::new_key_type! {
    /// Generational identifier of a node. Once the node is disposed the id
    /// never resolves again, even if its slot is reused.
    pub struct NodeId;
}

pub(crate) type AnyValue = Rc<dyn Any>;
pub(crate) type EqualsFn = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;
pub(crate) type ComputeFn =
    Box<dyn FnMut(&SignalContext, &dyn Any) -> Result<AnyValue, BoxError>>;
pub(crate) type Task = Box<dyn FnOnce(&SignalContext)>;

/// The kind of node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A mutable value cell. Has subscribers, never sources.
    Signal,

    /// A plain ownership boundary. Owns children and cleanups, never runs.
    Scope,

    /// A pure computation. Runs in the memo phase of a batch and can be read
    /// like a signal.
    Memo,

    /// An effectful computation. Runs after every memo of the batch settled.
    Effect,
}

impl NodeKind {
    /// Memos and effects re-run; signals and plain scopes do not.
    pub fn is_computation(self) -> bool {
        matches!(self, Self::Memo | Self::Effect)
    }

    /// Whether the node can be read and carries subscribers.
    pub fn is_readable(self) -> bool {
        matches!(self, Self::Signal | Self::Memo)
    }
}

/// Scheduling state of a computation.
///
/// `Clean` means "no flag set": never scheduled, settled after a run, or
/// re-armed by `look_upstream`. Plain scopes and signals stay `Clean`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeState {
    #[default]
    Clean,

    /// A direct source changed. The computation must re-run.
    Stale,

    /// Something upstream is stale. Resolving it decides whether this
    /// computation re-runs.
    Pending,
}

pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) state: ScopeState,

    /// Epoch of the last run. `None` until the first run.
    pub(crate) updated_time: Option<u64>,

    pub(crate) owner: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,

    pub(crate) value: Option<AnyValue>,
    pub(crate) equals: Option<EqualsFn>,

    /// Taken out while the computation runs.
    pub(crate) compute: Option<ComputeFn>,

    /// Readable nodes this computation read during its last run.
    pub(crate) sources: IndexSet<NodeId>,

    /// Computations that read this node.
    pub(crate) subscribers: IndexSet<NodeId>,

    pub(crate) tasks: VecDeque<Task>,
    pub(crate) cleanups: Vec<Task>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, owner: Option<NodeId>) -> Self {
        Self {
            kind,
            state: ScopeState::Clean,
            updated_time: None,
            owner,
            children: Vec::new(),
            value: None,
            equals: None,
            compute: None,
            sources: IndexSet::new(),
            subscribers: IndexSet::new(),
            tasks: VecDeque::new(),
            cleanups: Vec::new(),
        }
    }

    pub(crate) fn signal(owner: Option<NodeId>, value: AnyValue, equals: Option<EqualsFn>) -> Self {
        let mut node = Self::new(NodeKind::Signal, owner);
        node.value = Some(value);
        node.equals = equals;
        node
    }

    pub(crate) fn computation(
        kind: NodeKind,
        owner: Option<NodeId>,
        initial: AnyValue,
        compute: ComputeFn,
        equals: Option<EqualsFn>,
    ) -> Self {
        debug_assert!(kind.is_computation());
        let mut node = Self::new(kind, owner);
        node.value = Some(initial);
        node.compute = Some(compute);
        node.equals = equals;
        node
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.state == ScopeState::Clean
    }

    /// A computation whose compute fn is out on the stack.
    pub(crate) fn is_running(&self) -> bool {
        self.kind.is_computation() && self.compute.is_none()
    }

    /// Whether the node has not run yet in `epoch`.
    pub(crate) fn behind(&self, epoch: u64) -> bool {
        self.updated_time.map_or(true, |time| time < epoch)
    }

    /// Whether a stored value equals `next` under the node's predicate.
    /// Nodes without a predicate never compare equal.
    pub(crate) fn holds_equal(&self, next: &dyn Any) -> bool {
        match (&self.equals, &self.value) {
            (Some(equals), Some(current)) => equals(current.as_ref(), next),
            _ => false,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("updated_time", &self.updated_time)
            .field("owner", &self.owner)
            .field("children", &self.children.len())
            .field("sources", &self.sources.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
