//! Node Arena
//!
//! Generational storage for every node of one context, plus the edge
//! bookkeeping that has to touch two nodes at once:
//!
//! - ownership edges (`owner` / `children`), the only owning relation;
//! - dependency edges (`sources` / `subscribers`), rebuilt on every run;
//! - stale/pending marking when a readable node changes.
//!
//! Nothing here runs user code. The context borrows the arena, mutates it,
//! and releases the borrow before calling into compute functions.

use slotmap::SlotMap;
use smallvec::SmallVec;

use super::node::{Node, NodeId, NodeKind, ScopeState};
use super::queue::UpdateQueues;

pub(crate) type IdList = SmallVec<[NodeId; 8]>;

#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    nodes: SlotMap<NodeId, Node>,
}

impl NodeArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a node and register it with its owner.
    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        let owner = node.owner;
        let id = self.nodes.insert(node);
        match owner.and_then(|owner| self.nodes.get_mut(owner)) {
            Some(owner) => owner.children.push(id),
            None => {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.owner = None;
                }
            }
        }
        id
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Record that `subscriber` read `source`. Idempotent.
    pub(crate) fn link(&mut self, source: NodeId, subscriber: NodeId) {
        if !self.nodes.contains_key(subscriber) {
            return;
        }
        let Some(node) = self.nodes.get_mut(source) else {
            return;
        };
        node.subscribers.insert(subscriber);
        if let Some(node) = self.nodes.get_mut(subscriber) {
            node.sources.insert(source);
        }
    }

    /// Drop every dependency edge of `id` and clear its sources.
    pub(crate) fn unlink_sources(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let sources = std::mem::take(&mut node.sources);
        for source in sources {
            if let Some(source) = self.nodes.get_mut(source) {
                source.subscribers.shift_remove(&id);
            }
        }
    }

    /// Remove `id` from its owner's children. The node keeps its own children.
    pub(crate) fn detach_from_owner(&mut self, id: NodeId) {
        let Some(owner) = self.nodes.get_mut(id).and_then(|node| node.owner.take()) else {
            return;
        };
        if let Some(owner) = self.nodes.get_mut(owner) {
            owner.children.retain(|child| *child != id);
        }
    }

    pub(crate) fn take_children(&mut self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get_mut(id)
            .map(|node| std::mem::take(&mut node.children))
            .unwrap_or_default()
    }

    /// Unlink and remove a node whose children are already gone. The caller
    /// runs the returned node's cleanups.
    pub(crate) fn release(&mut self, id: NodeId) -> Option<Node> {
        self.unlink_sources(id);
        self.nodes.remove(id)
    }

    /// The owner chain above `id` whose members still have to run in `epoch`.
    /// Nearest owner first.
    pub(crate) fn active_ancestors(&self, id: NodeId, epoch: u64) -> IdList {
        let mut ancestors = IdList::new();
        let mut cursor = self.nodes.get(id).and_then(|node| node.owner);
        while let Some(owner) = cursor {
            if !self.is_active_computation(owner, epoch) {
                break;
            }
            ancestors.push(owner);
            cursor = self.nodes.get(owner).and_then(|node| node.owner);
        }
        ancestors
    }

    /// Clear the flag of every live node in `ids`. Used for queue entries a
    /// failed batch dropped, so the next write schedules them again.
    pub(crate) fn settle(&mut self, ids: &[NodeId]) {
        for id in ids {
            if let Some(node) = self.nodes.get_mut(*id) {
                node.state = ScopeState::Clean;
            }
        }
    }

    /// A live computation that has not run in `epoch` and has a flag set.
    pub(crate) fn is_active_computation(&self, id: NodeId, epoch: u64) -> bool {
        self.nodes.get(id).is_some_and(|node| {
            node.kind.is_computation() && node.behind(epoch) && !node.is_clean()
        })
    }

    /// A readable node changed: every subscriber becomes stale. Subscribers
    /// that were clean are queued, and a clean memo also marks its own
    /// downstream as pending. A computation that is running is left alone,
    /// so its own writes never schedule it again.
    pub(crate) fn mark_subscribers(&mut self, source: NodeId, queues: &mut UpdateQueues) {
        let subscribers: IdList = match self.nodes.get(source) {
            Some(node) => node.subscribers.iter().copied().collect(),
            None => return,
        };

        for id in subscribers {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            if node.is_running() {
                continue;
            }
            let kind = node.kind;
            if node.is_clean() {
                queues.enqueue(id, kind);
                if kind == NodeKind::Memo {
                    self.mark_downstream(id, queues);
                }
            }
            if let Some(node) = self.nodes.get_mut(id) {
                node.state = ScopeState::Stale;
            }
        }
    }

    fn mark_downstream(&mut self, memo: NodeId, queues: &mut UpdateQueues) {
        let subscribers: IdList = match self.nodes.get(memo) {
            Some(node) => node.subscribers.iter().copied().collect(),
            None => return,
        };

        for id in subscribers {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            if !node.is_clean() || node.is_running() {
                continue;
            }
            node.state = ScopeState::Pending;
            let kind = node.kind;
            queues.enqueue(id, kind);
            if kind == NodeKind::Memo {
                self.mark_downstream(id, queues);
            }
        }
    }
}
