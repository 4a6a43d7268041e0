//! Signal Context
//!
//! The context coordinates one reactive root: it owns the node arena, the
//! scope and computation stacks used for automatic dependency tracking, and
//! the batch queues.
//!
//! # Update algorithm
//!
//! Writing a signal marks its subscribers stale and queues them by kind:
//! memos go to the memo queue, effects to the effect queue. A memo that was
//! clean also marks everything downstream of it as pending. The batch then
//! completes in two phases:
//!
//! 1. Every queued memo is resolved. A stale memo first resolves the chain of
//!    owners above it that still have to run this epoch (top-most first), then
//!    re-runs. A pending node looks upstream and only re-runs if a source memo
//!    actually changed.
//! 2. The effect queue is taken and flushed inside a fresh batch, so writes
//!    made by effects start a new epoch instead of corrupting this one.
//!
//! Re-entrant `run_updates` calls collapse into the open batch.
//!
//! # Stacks
//!
//! Compute functions run with their node pushed on both stacks. The pushes
//! are paired with pops by a guard, so the stacks stay balanced even if a
//! compute function panics.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::config::GraphConfig;
use crate::error::{Error, Result};
use crate::graph::{AnyValue, BatchMode, IdList, Node, NodeArena, NodeId, NodeKind, ScopeState, UpdateQueues};

use super::runtime::RootProvider;

pub struct SignalContext {
    pub(super) graph: RefCell<NodeArena>,
    queues: RefCell<UpdateQueues>,
    scope_stack: RefCell<Vec<NodeId>>,
    /// `None` entries are untracked regions.
    computation_stack: RefCell<Vec<Option<NodeId>>>,
    pub(super) roots: RefCell<IndexSet<NodeId>>,
    pub(super) root_provider: RefCell<Option<Rc<dyn RootProvider>>>,
    flush_depth: Cell<usize>,
    config: GraphConfig,
    span: tracing::Span,
}

impl SignalContext {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        let span = tracing::debug_span!(
            "signal_context",
            label = config.label.as_deref().unwrap_or("default")
        );
        Self {
            graph: RefCell::new(NodeArena::new()),
            queues: RefCell::new(UpdateQueues::new()),
            scope_stack: RefCell::new(Vec::new()),
            computation_stack: RefCell::new(Vec::new()),
            roots: RefCell::new(IndexSet::new()),
            root_provider: RefCell::new(None),
            flush_depth: Cell::new(0),
            config,
            span,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Stacks
    // ------------------------------------------------------------------

    pub fn push_scope(&self, scope: NodeId) {
        self.scope_stack.borrow_mut().push(scope);
    }

    pub fn pop_scope(&self) -> Option<NodeId> {
        self.scope_stack.borrow_mut().pop()
    }

    pub fn top_scope(&self) -> Option<NodeId> {
        self.scope_stack.borrow().last().copied()
    }

    pub fn push_computation(&self, computation: NodeId) {
        self.computation_stack.borrow_mut().push(Some(computation));
    }

    /// Pops the top entry, which may be an untracked marker.
    pub fn pop_computation(&self) {
        self.computation_stack.borrow_mut().pop();
    }

    /// The computation that reads currently register with. `None` outside
    /// any computation and inside untracked regions.
    pub fn top_computation(&self) -> Option<NodeId> {
        self.computation_stack.borrow().last().copied().flatten()
    }

    /// Raw untracked marker. `true` pushes the marker, `false` pops the top
    /// entry. Calls must be paired; prefer [`untrack`](Self::untrack).
    pub fn mark_untrack(&self, enable: bool) {
        if enable {
            self.computation_stack.borrow_mut().push(None);
        } else {
            self.pop_computation();
        }
    }

    /// Run `f` without registering any dependency.
    pub fn untrack<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        let _guard = StackGuard::untracked(self);
        f(self)
    }

    pub(super) fn enter_scope(&self, scope: NodeId) -> StackGuard<'_> {
        StackGuard::scope(self, scope)
    }

    // ------------------------------------------------------------------
    // Batching
    // ------------------------------------------------------------------

    /// Number of batches opened so far. Each batch is one epoch.
    pub fn exec_count(&self) -> u64 {
        self.queues.borrow().exec_count()
    }

    pub fn is_batching(&self) -> bool {
        self.queues.borrow().is_batching()
    }

    /// Run `body` as one batch. Writes inside it only queue work; memos are
    /// resolved and effects flushed once `body` returns. Inside an open batch
    /// the body just runs inline.
    ///
    /// An error from `body` or from any computation aborts the batch: the
    /// queues it owns are dropped, the nodes left in them are reset to clean
    /// so a later write schedules them again, and the error is returned.
    pub fn run_updates<R>(&self, body: impl FnOnce(&Self) -> Result<R>) -> Result<R> {
        let mode = self.queues.borrow_mut().open();
        let BatchMode::Owner { wait } = mode else {
            return body(self);
        };

        let _entered = self.span.enter();
        trace!(
            epoch = self.exec_count(),
            wait,
            pending_effects = self.queues.borrow().effect_len(),
            "batch opened"
        );

        let result = body(self).and_then(|value| self.complete_updates(wait).map(|()| value));
        if let Err(err) = &result {
            let dropped = self.queues.borrow_mut().abort(wait);
            debug!(error = %err, wait, dropped = dropped.len(), "batch aborted");
            self.graph.borrow_mut().settle(&dropped);
        }
        result
    }

    fn complete_updates(&self, wait: bool) -> Result<()> {
        if self.is_batching() {
            debug!(
                epoch = self.exec_count(),
                count = self.queues.borrow().memo_len(),
                "resolving memos"
            );
            let mut index = 0;
            while let Some(id) = self.queued_memo(index) {
                self.run_computation(id)?;
                index += 1;
            }
            self.queues.borrow_mut().close_memos();
        }

        if wait {
            return Ok(());
        }

        let effects = self.queues.borrow_mut().take_effects();
        let Some(effects) = effects.filter(|effects| !effects.is_empty()) else {
            return Ok(());
        };

        let depth = self.flush_depth.get();
        if depth >= self.config.max_update_depth {
            self.graph.borrow_mut().settle(&effects);
            return Err(Error::UpdateDepthExceeded {
                limit: self.config.max_update_depth,
            });
        }

        debug!(count = effects.len(), depth, "flushing effects");
        self.flush_depth.set(depth + 1);
        let result = self.run_updates(|cx| {
            for (index, id) in effects.iter().enumerate() {
                if let Err(err) = cx.run_computation(*id) {
                    cx.graph.borrow_mut().settle(&effects[index + 1..]);
                    return Err(err);
                }
            }
            Ok(())
        });
        self.flush_depth.set(depth);
        result
    }

    fn queued_memo(&self, index: usize) -> Option<NodeId> {
        self.queues.borrow().memo_at(index)
    }

    /// Queue a computation by kind. Signals and plain scopes are ignored.
    pub fn enqueue_computation(&self, id: NodeId) {
        let kind = self.graph.borrow().get(id).map(|node| node.kind);
        if let Some(kind) = kind {
            self.queues.borrow_mut().enqueue(id, kind);
        }
    }

    pub(super) fn mark_subscribers(&self, id: NodeId) {
        let mut graph = self.graph.borrow_mut();
        let mut queues = self.queues.borrow_mut();
        graph.mark_subscribers(id, &mut queues);
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// A live computation that still has to run this epoch.
    pub fn is_scope_active_computation(&self, id: NodeId) -> bool {
        let epoch = self.exec_count();
        self.graph.borrow().is_active_computation(id, epoch)
    }

    /// Resolve one queued computation.
    ///
    /// Disposed and clean nodes are skipped. A pending node looks upstream.
    /// A stale node first resolves the owners above it that still have to run
    /// this epoch, outermost first, so a re-running owner can dispose it
    /// before it runs for nothing.
    pub fn run_computation(&self, id: NodeId) -> Result<()> {
        let state = self.state(id);
        match state {
            None | Some(ScopeState::Clean) => return Ok(()),
            Some(ScopeState::Pending) => return self.look_upstream(id, None),
            Some(ScopeState::Stale) => {}
        }

        let ancestors: IdList = {
            let epoch = self.exec_count();
            self.graph.borrow().active_ancestors(id, epoch)
        };

        for node in ancestors.iter().rev().copied().chain(std::iter::once(id)) {
            match self.state(node) {
                Some(ScopeState::Stale) => self.update_computation(node)?,
                Some(ScopeState::Pending) => {
                    // Resolve in a nested batch so memos it schedules do not
                    // leak into the queue being drained.
                    let detached = self.queues.borrow_mut().detach_memos();
                    let result = self.run_updates(|cx| cx.look_upstream(node, Some(id)));
                    self.queues.borrow_mut().restore_memos(detached);
                    result?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Settle a pending node: clear its flag, then resolve every source memo
    /// that is stale (re-run it) or pending (recurse). A source that changes
    /// marks this node stale again and queues it.
    pub(crate) fn look_upstream(&self, id: NodeId, ignore: Option<NodeId>) -> Result<()> {
        let sources: IdList = {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return Ok(());
            };
            node.state = ScopeState::Clean;
            node.sources.iter().copied().collect()
        };

        for source in sources {
            let epoch = self.exec_count();
            let upstream = self
                .graph
                .borrow()
                .get(source)
                .filter(|node| node.kind.is_computation())
                .map(|node| (node.state, node.behind(epoch)));

            match upstream {
                Some((ScopeState::Stale, behind)) if behind && Some(source) != ignore => {
                    self.run_computation(source)?;
                }
                Some((ScopeState::Pending, _)) => self.look_upstream(source, ignore)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Clean up and re-run a computation in the current epoch.
    pub(crate) fn update_computation(&self, id: NodeId) -> Result<()> {
        {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return Ok(());
            };
            if node.is_running() {
                // Further up the stack.
                trace!(node = ?id, "skipping re-entrant run");
                node.state = ScopeState::Clean;
                return Ok(());
            }
        }
        self.clean_node(id);

        let epoch = self.exec_count();
        let _guard = StackGuard::computation(self, id);
        self.invoke(id, epoch)
    }

    fn invoke(&self, id: NodeId, epoch: u64) -> Result<()> {
        let taken = {
            let mut graph = self.graph.borrow_mut();
            graph.get_mut(id).and_then(|node| {
                let previous = node.value.clone()?;
                let compute = node.compute.take()?;
                Some((previous, compute))
            })
        };
        let Some((previous, mut compute)) = taken else {
            return Ok(());
        };

        trace!(node = ?id, epoch, "running computation");
        let outcome = compute(self, previous.as_ref());

        let propagate = {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                // Disposed by its own run.
                return outcome.map(drop).map_err(|source| Error::Compute { node: id, source });
            };
            node.compute = Some(compute);

            let next = match outcome {
                Ok(next) => next,
                Err(source) => {
                    debug!(node = ?id, error = %source, "computation failed");
                    return Err(Error::Compute { node: id, source });
                }
            };

            let propagate = node.kind == NodeKind::Memo
                && node.updated_time.is_some()
                && !node.subscribers.is_empty()
                && !node.holds_equal(next.as_ref());
            node.value = Some(next);
            node.updated_time = Some(epoch);
            propagate
        };

        if propagate {
            self.run_updates(|cx| {
                cx.mark_subscribers(id);
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Drop a computation's dependencies, dispose what it owns and run its
    /// cleanups before it re-runs.
    fn clean_node(&self, id: NodeId) {
        let (children, cleanups) = {
            let mut graph = self.graph.borrow_mut();
            graph.unlink_sources(id);
            let Some(node) = graph.get_mut(id) else {
                return;
            };
            node.state = ScopeState::Clean;
            (
                std::mem::take(&mut node.children),
                std::mem::take(&mut node.cleanups),
            )
        };

        for child in children.into_iter().rev() {
            self.will_destroy(child);
        }
        for cleanup in cleanups.into_iter().rev() {
            cleanup(self);
        }
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Owner for a node created now: the current scope, else the host's
    /// ambient root.
    pub(super) fn current_owner(&self) -> Option<NodeId> {
        if let Some(scope) = self.top_scope() {
            return Some(scope);
        }
        let provider = self.root_provider.borrow().clone();
        provider
            .and_then(|provider| provider.current_root())
            .map(|scope| scope.id())
            .filter(|id| self.graph.borrow().contains(*id))
    }

    pub(super) fn insert_node(&self, node: Node) -> NodeId {
        let kind = node.kind;
        let (id, owned) = {
            let mut graph = self.graph.borrow_mut();
            let id = graph.insert(node);
            let owned = graph.get(id).is_some_and(|node| node.owner.is_some());
            (id, owned)
        };
        if kind != NodeKind::Signal && !owned {
            self.record_scope(id);
        }
        id
    }

    /// Read a node's value, registering the current computation as a
    /// subscriber when `track` is set.
    pub(super) fn read_any(&self, id: NodeId, track: bool) -> Result<AnyValue> {
        let listener = if track { self.top_computation() } else { None };
        let mut graph = self.graph.borrow_mut();
        let (value, readable) = match graph.get(id) {
            Some(node) => (node.value.clone(), node.kind.is_readable()),
            None => return Err(Error::Disposed(id)),
        };
        let value = value.ok_or(Error::Disposed(id))?;

        if let Some(listener) = listener.filter(|listener| readable && *listener != id) {
            graph.link(id, listener);
        }
        Ok(value)
    }

    pub(super) fn read<T: Clone + 'static>(&self, id: NodeId, track: bool) -> Result<T> {
        let value = self.read_any(id, track)?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| Error::type_mismatch::<T>(id))
    }

    pub(super) fn with_value<T: 'static, R>(
        &self,
        id: NodeId,
        track: bool,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R> {
        let value = self.read_any(id, track)?;
        let value = value
            .downcast_ref::<T>()
            .ok_or_else(|| Error::type_mismatch::<T>(id))?;
        Ok(f(value))
    }

    /// Store a new value and mark subscribers. Unless `skip_compare` is set,
    /// a value equal to the current one is dropped.
    pub(super) fn write<T: 'static>(&self, id: NodeId, value: T, skip_compare: bool) -> Result<()> {
        {
            let mut graph = self.graph.borrow_mut();
            let node = graph.get_mut(id).ok_or(Error::Disposed(id))?;
            if !node.value.as_deref().is_some_and(|current| current.is::<T>()) {
                return Err(Error::type_mismatch::<T>(id));
            }
            if !skip_compare && node.holds_equal(&value) {
                return Ok(());
            }
            node.value = Some(Rc::new(value));
            if node.subscribers.is_empty() {
                return Ok(());
            }
        }

        self.run_updates(|cx| {
            cx.mark_subscribers(id);
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------

    /// Detach a node from its owner and destroy it with everything it owns.
    pub fn dispose(&self, id: NodeId) {
        self.remove_self(id);
        self.will_destroy(id);
    }

    /// Detach a node from its owner's children without destroying anything.
    pub fn remove_self(&self, id: NodeId) {
        self.graph.borrow_mut().detach_from_owner(id);
    }

    /// Destroy a node: children first (newest first, depth-first), then its
    /// own dependencies, cleanups and storage. Unflushed tasks are dropped.
    pub fn will_destroy(&self, id: NodeId) {
        let children = self.graph.borrow_mut().take_children(id);
        for child in children.into_iter().rev() {
            self.will_destroy(child);
        }

        let released = self.graph.borrow_mut().release(id);
        self.erase_scope(id);

        if let Some(node) = released {
            trace!(node = ?id, kind = ?node.kind, "node destroyed");
            for cleanup in node.cleanups.into_iter().rev() {
                cleanup(self);
            }
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.graph.borrow().len()
    }

    pub fn is_disposed(&self, id: NodeId) -> bool {
        !self.graph.borrow().contains(id)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.graph.borrow().get(id).map(|node| node.kind)
    }

    pub fn state(&self, id: NodeId) -> Option<ScopeState> {
        self.graph.borrow().get(id).map(|node| node.state)
    }

    pub fn owner(&self, id: NodeId) -> Option<NodeId> {
        self.graph.borrow().get(id).and_then(|node| node.owner)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.graph
            .borrow()
            .get(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn source_count(&self, id: NodeId) -> usize {
        self.graph.borrow().get(id).map_or(0, |node| node.sources.len())
    }

    pub fn subscriber_count(&self, id: NodeId) -> usize {
        self.graph.borrow().get(id).map_or(0, |node| node.subscribers.len())
    }

    /// Epoch of the node's last run, `None` if it never ran.
    pub fn updated_time(&self, id: NodeId) -> Option<u64> {
        self.graph.borrow().get(id).and_then(|node| node.updated_time)
    }
}

impl Default for SignalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalContext")
            .field("label", &self.config.label)
            .field("exec_count", &self.exec_count())
            .field("node_count", &self.node_count())
            .field("roots", &self.roots.borrow().len())
            .finish()
    }
}

/// Pops what it pushed when dropped, so the stacks stay balanced on early
/// returns and unwinding.
pub(super) struct StackGuard<'a> {
    cx: &'a SignalContext,
    scope: Option<NodeId>,
    computation: bool,
}

impl<'a> StackGuard<'a> {
    fn computation(cx: &'a SignalContext, id: NodeId) -> Self {
        cx.push_scope(id);
        cx.push_computation(id);
        Self {
            cx,
            scope: Some(id),
            computation: true,
        }
    }

    fn scope(cx: &'a SignalContext, id: NodeId) -> Self {
        cx.push_scope(id);
        Self {
            cx,
            scope: Some(id),
            computation: false,
        }
    }

    fn untracked(cx: &'a SignalContext) -> Self {
        cx.mark_untrack(true);
        Self {
            cx,
            scope: None,
            computation: true,
        }
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        if self.computation {
            self.cx.pop_computation();
        }
        if let Some(expected) = self.scope {
            let popped = self.cx.pop_scope();
            debug_assert_eq!(
                popped,
                Some(expected),
                "scope stack mismatch: expected {expected:?}, got {popped:?}"
            );
        }
    }
}
