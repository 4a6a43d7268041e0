//! Scopes
//!
//! A scope is an ownership boundary. Every node created while a scope is the
//! current scope becomes its child, and disposing the scope disposes them
//! all: children first, newest first, depth-first.
//!
//! Computations are scopes too. What they create during a run is disposed
//! before their next run.
//!
//! Each scope also carries a FIFO of deferred tasks and a list of cleanup
//! callbacks.

use std::fmt;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::graph::{Node, NodeId, NodeKind};

use super::SignalContext;

/// Handle to a plain scope, or to the scope side of any computation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope {
    id: NodeId,
}

impl Scope {
    pub(crate) fn from_id(id: NodeId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Run `f` with this scope as the current scope, so nodes it creates are
    /// owned by it.
    pub fn run<R>(&self, cx: &SignalContext, f: impl FnOnce(&SignalContext) -> R) -> Result<R> {
        if cx.is_disposed(self.id) {
            return Err(Error::Disposed(self.id));
        }
        let _guard = cx.enter_scope(self.id);
        Ok(f(cx))
    }

    /// Queue a callback until the next [`flush_tasks`](Self::flush_tasks).
    pub fn enqueue_task(
        &self,
        cx: &SignalContext,
        task: impl FnOnce(&SignalContext) + 'static,
    ) -> Result<()> {
        let mut graph = cx.graph.borrow_mut();
        let node = graph.get_mut(self.id).ok_or(Error::Disposed(self.id))?;
        node.tasks.push_back(Box::new(task));
        Ok(())
    }

    /// Run this scope's queued tasks in order. Child scopes keep their own
    /// tasks, and tasks queued while flushing wait for the next flush.
    pub fn flush_tasks(&self, cx: &SignalContext) -> Result<()> {
        let tasks = {
            let mut graph = cx.graph.borrow_mut();
            let node = graph.get_mut(self.id).ok_or(Error::Disposed(self.id))?;
            std::mem::take(&mut node.tasks)
        };
        if tasks.is_empty() {
            return Ok(());
        }

        trace!(scope = ?self.id, count = tasks.len(), "flushing tasks");
        let _guard = cx.enter_scope(self.id);
        for task in tasks {
            task(cx);
        }
        Ok(())
    }

    pub fn pending_tasks(&self, cx: &SignalContext) -> usize {
        cx.graph.borrow().get(self.id).map_or(0, |node| node.tasks.len())
    }

    /// Register a callback that runs when this scope is disposed, or before
    /// the next run if the scope is a computation.
    pub fn on_cleanup(
        &self,
        cx: &SignalContext,
        cleanup: impl FnOnce(&SignalContext) + 'static,
    ) -> Result<()> {
        let mut graph = cx.graph.borrow_mut();
        let node = graph.get_mut(self.id).ok_or(Error::Disposed(self.id))?;
        node.cleanups.push(Box::new(cleanup));
        Ok(())
    }

    pub fn dispose(&self, cx: &SignalContext) {
        cx.dispose(self.id);
    }

    pub fn is_disposed(&self, cx: &SignalContext) -> bool {
        cx.is_disposed(self.id)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scope").field(&self.id).finish()
    }
}

impl<T: 'static> From<super::Computation<T>> for Scope {
    fn from(computation: super::Computation<T>) -> Self {
        Self::from_id(computation.id())
    }
}

impl<T: 'static> From<super::Memo<T>> for Scope {
    fn from(memo: super::Memo<T>) -> Self {
        Self::from_id(memo.id())
    }
}

impl SignalContext {
    /// Create a scope owned by the current scope and run `f` inside it.
    /// A scope created with nothing above it is recorded as a root.
    pub fn create_scope<R>(&self, f: impl FnOnce(&Self, Scope) -> R) -> R {
        let node = Node::new(NodeKind::Scope, self.current_owner());
        let scope = Scope::from_id(self.insert_node(node));
        let _guard = self.enter_scope(scope.id);
        f(self, scope)
    }

    /// The scope new nodes would be owned by, if any.
    pub fn current_scope(&self) -> Option<Scope> {
        self.current_owner().map(Scope::from_id)
    }

    /// Register a cleanup on the current scope. Returns `false` when there is
    /// no scope to attach it to; the callback is dropped in that case.
    pub fn on_cleanup(&self, cleanup: impl FnOnce(&SignalContext) + 'static) -> bool {
        match self.current_scope() {
            Some(scope) => scope.on_cleanup(self, cleanup).is_ok(),
            None => {
                debug!("cleanup registered outside any scope is never run");
                false
            }
        }
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn logger() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn FnOnce(&SignalContext)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &str| -> Box<dyn FnOnce(&SignalContext)> {
            let sink = sink.clone();
            let name = name.to_string();
            Box::new(move |_: &SignalContext| sink.borrow_mut().push(name))
        };
        (log, make)
    }

    #[test]
    fn nodes_created_inside_are_owned() {
        let cx = SignalContext::new();
        let (scope, signal) = cx.create_scope(|cx, scope| (scope, cx.create_signal(1)));

        assert_eq!(cx.owner(signal.id()), Some(scope.id()));
        assert_eq!(cx.children(scope.id()), vec![signal.id()]);
        assert_eq!(cx.top_scope(), None);

        scope.dispose(&cx);
        assert!(signal.is_disposed(&cx));
    }

    #[test]
    fn dispose_runs_children_newest_first_then_self() {
        let cx = SignalContext::new();
        let (log, entry) = logger();

        let parent = cx.create_scope(|cx, parent| {
            cx.create_scope(|cx, _| {
                cx.create_scope(|cx, _| cx.on_cleanup(entry("a.inner")));
                cx.on_cleanup(entry("a"));
            });
            cx.create_scope(|cx, _| cx.on_cleanup(entry("b")));
            cx.on_cleanup(entry("parent"));
            parent
        });

        parent.dispose(&cx);
        assert_eq!(*log.borrow(), vec!["b", "a.inner", "a", "parent"]);
        assert_eq!(cx.node_count(), 0);
    }

    #[test]
    fn remove_self_only_detaches() {
        let cx = SignalContext::new();
        let (parent, child) = cx.create_scope(|cx, parent| (parent, cx.create_scope(|_, child| child)));

        cx.remove_self(child.id());
        assert!(cx.children(parent.id()).is_empty());

        parent.dispose(&cx);
        assert!(!child.is_disposed(&cx));
        child.dispose(&cx);
        assert!(child.is_disposed(&cx));
    }

    #[test]
    fn flush_runs_tasks_in_order() {
        let cx = SignalContext::new();
        let (log, entry) = logger();
        let scope = cx.create_scope(|_, scope| scope);

        scope.enqueue_task(&cx, entry("first")).unwrap();
        scope.enqueue_task(&cx, entry("second")).unwrap();
        assert_eq!(scope.pending_tasks(&cx), 2);

        scope.flush_tasks(&cx).unwrap();
        assert_eq!(*log.borrow(), vec!["first", "second"]);
        assert_eq!(scope.pending_tasks(&cx), 0);
    }

    #[test]
    fn flush_leaves_child_tasks_queued() {
        let cx = SignalContext::new();
        let (log, entry) = logger();
        let (parent, child) = cx.create_scope(|cx, parent| (parent, cx.create_scope(|_, child| child)));

        parent.enqueue_task(&cx, entry("parent")).unwrap();
        child.enqueue_task(&cx, entry("child")).unwrap();

        parent.flush_tasks(&cx).unwrap();
        assert_eq!(*log.borrow(), vec!["parent"]);
        assert_eq!(child.pending_tasks(&cx), 1);
    }

    #[test]
    fn task_queued_during_flush_waits() {
        let cx = SignalContext::new();
        let runs = Rc::new(Cell::new(0));
        let scope = cx.create_scope(|_, scope| scope);

        let counter = runs.clone();
        scope
            .enqueue_task(&cx, move |cx| {
                counter.set(counter.get() + 1);
                let counter = counter.clone();
                scope
                    .enqueue_task(cx, move |_| counter.set(counter.get() + 1))
                    .unwrap();
            })
            .unwrap();

        scope.flush_tasks(&cx).unwrap();
        assert_eq!(runs.get(), 1);
        assert_eq!(scope.pending_tasks(&cx), 1);

        scope.flush_tasks(&cx).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn dispose_drops_unflushed_tasks() {
        let cx = SignalContext::new();
        let token = Rc::new(());
        let scope = cx.create_scope(|_, scope| scope);

        let held = token.clone();
        scope.enqueue_task(&cx, move |_| drop(held)).unwrap();
        assert_eq!(Rc::strong_count(&token), 2);

        scope.dispose(&cx);
        assert_eq!(Rc::strong_count(&token), 1);
        assert!(matches!(scope.flush_tasks(&cx), Err(Error::Disposed(_))));
    }

    #[test]
    fn cleanup_runs_before_rerun() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(0);
        let (log, entry) = logger();

        cx.create_effect(
            move |cx, _| {
                let value = signal.get(cx);
                cx.on_cleanup(entry(&format!("cleanup {value}")));
            },
            (),
        )
        .unwrap();
        assert!(log.borrow().is_empty());

        signal.set(&cx, 1).unwrap();
        assert_eq!(*log.borrow(), vec!["cleanup 0"]);
    }

    #[test]
    fn cleanup_without_scope_is_rejected() {
        let cx = SignalContext::new();
        assert!(!cx.on_cleanup(|_| {}));
    }

    #[test]
    fn run_adopts_new_nodes() {
        let cx = SignalContext::new();
        let scope = cx.create_scope(|_, scope| scope);
        let signal = scope.run(&cx, |cx| cx.create_signal("owned")).unwrap();
        assert_eq!(cx.owner(signal.id()), Some(scope.id()));

        scope.dispose(&cx);
        assert!(matches!(scope.run(&cx, |_| ()), Err(Error::Disposed(_))));
    }

    #[test]
    fn computations_convert_into_scopes() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(1);
        let memo = cx.create_memo(move |cx, _| signal.get(cx) * 2, 0).unwrap();
        let effect = cx.create_effect(move |cx, _| memo.get(cx), 0).unwrap();

        let cleaned = Rc::new(Cell::new(0));
        let memo_scope = Scope::from(memo);
        let effect_scope: Scope = effect.into();
        assert_eq!(memo_scope.id(), memo.id());
        assert_eq!(effect_scope.id(), effect.id());

        let count = cleaned.clone();
        memo_scope
            .on_cleanup(&cx, move |_| count.set(count.get() + 1))
            .unwrap();
        signal.set(&cx, 2).unwrap();
        assert_eq!(cleaned.get(), 1);

        effect_scope.dispose(&cx);
        assert!(effect.is_disposed(&cx));
        assert!(!memo.is_disposed(&cx));
    }
}
