//! Roots and Host Integration
//!
//! Nodes created with nothing on the scope stack have no owner. The context
//! keeps every such scope (plain or computation) in a root registry and
//! disposes them all when it is dropped.
//!
//! An embedding can instead supply an ambient root through a
//! [`RootProvider`]: while installed, ownerless nodes attach to the scope it
//! returns. [`RootHandle`] ties a root scope's lifetime to a Rust value, which
//! is the usual way for a host to hook its own teardown into disposal.

use std::rc::Rc;

use tracing::debug;

use crate::graph::{Node, NodeId, NodeKind};

use super::{Scope, SignalContext};

/// Supplies the scope that ownerless nodes attach to.
pub trait RootProvider {
    fn current_root(&self) -> Option<Scope>;
}

impl<F> RootProvider for F
where
    F: Fn() -> Option<Scope>,
{
    fn current_root(&self) -> Option<Scope> {
        self()
    }
}

/// A root scope disposed when the handle is dropped.
///
/// # Example
///
/// ```
/// use signal_graph::SignalContext;
///
/// let cx = SignalContext::new();
/// let signal = {
///     let root = cx.create_root();
///     root.run(|cx| cx.create_signal(1))
/// };
/// assert!(signal.is_disposed(&cx));
/// ```
pub struct RootHandle<'a> {
    cx: &'a SignalContext,
    scope: Scope,
}

impl<'a> RootHandle<'a> {
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Run `f` with the root as the current scope.
    pub fn run<R>(&self, f: impl FnOnce(&SignalContext) -> R) -> R {
        let _guard = self.cx.enter_scope(self.scope.id());
        f(self.cx)
    }

    /// Give up the handle without disposing the root. It stays registered
    /// and is disposed explicitly or when the context is dropped.
    pub fn leak(self) -> Scope {
        let scope = self.scope;
        std::mem::forget(self);
        scope
    }
}

impl Drop for RootHandle<'_> {
    fn drop(&mut self) {
        self.cx.dispose(self.scope.id());
    }
}

impl SignalContext {
    /// Create a root scope, independent of the current scope.
    pub fn create_root(&self) -> RootHandle<'_> {
        let id = self.insert_node(Node::new(NodeKind::Scope, None));
        RootHandle {
            cx: self,
            scope: Scope::from_id(id),
        }
    }

    pub fn set_root_provider(&self, provider: impl RootProvider + 'static) {
        *self.root_provider.borrow_mut() = Some(Rc::new(provider));
    }

    pub fn clear_root_provider(&self) {
        self.root_provider.borrow_mut().take();
    }

    pub fn record_scope(&self, id: NodeId) {
        self.roots.borrow_mut().insert(id);
    }

    pub fn erase_scope(&self, id: NodeId) {
        self.roots.borrow_mut().shift_remove(&id);
    }

    pub fn root_scopes(&self) -> Vec<NodeId> {
        self.roots.borrow().iter().copied().collect()
    }

    /// Dispose every recorded root, newest first.
    pub fn will_destroy_all(&self) {
        let roots: Vec<NodeId> = self.roots.borrow_mut().drain(..).collect();
        if roots.is_empty() {
            return;
        }
        debug!(count = roots.len(), "disposing all roots");
        for root in roots.into_iter().rev() {
            self.will_destroy(root);
        }
    }
}

impl Drop for SignalContext {
    fn drop(&mut self) {
        self.will_destroy_all();
    }
}

// ---- Tests ----
