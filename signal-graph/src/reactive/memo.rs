//! Memo Implementation
//!
//! A Memo is a derived value: a pure computation whose result can be read and
//! tracked like a signal.
//!
//! # How Memos Work
//!
//! 1. The memo runs once at creation and caches its result.
//!
//! 2. When a source changes, the memo is queued in the memo phase of the
//!    batch and everything downstream of it is marked pending.
//!
//! 3. After a re-run, subscribers are marked stale. With an `equals`
//!    predicate that reports the new result equal to the old one, the new
//!    result is stored but subscribers are left alone, and pending
//!    subscribers settle without running.
//!
//! Memos carry no equality by default: every re-run propagates unless an
//! `equals` predicate is supplied.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::{BoxError, Result};
use crate::graph::{NodeId, NodeKind};

use super::effect::{erase_compute, infallible};
use super::signal::erase_equals;
use super::SignalContext;

/// Options for [`SignalContext::create_memo_with`].
pub struct MemoOptions<T> {
    equals: Option<Box<dyn Fn(&T, &T) -> bool>>,
}

impl<T: 'static> MemoOptions<T> {
    pub fn new() -> Self {
        Self { equals: None }
    }

    /// Suppress propagation when `equals(old, new)` holds.
    pub fn equals(mut self, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        self.equals = Some(Box::new(equals));
        self
    }

    /// Compare results with `PartialEq`.
    pub fn partial_eq() -> Self
    where
        T: PartialEq,
    {
        Self::new().equals(T::eq)
    }
}

impl<T: 'static> Default for MemoOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MemoOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoOptions")
            .field("equals", &self.equals.is_some())
            .finish()
    }
}

/// Handle to a derived value of type `T`.
///
/// # Example
///
/// ```
/// use signal_graph::SignalContext;
///
/// let cx = SignalContext::new();
/// let count = cx.create_signal(2);
/// let doubled = cx.create_memo(move |cx, _| count.get(cx) * 2, 0).unwrap();
///
/// count.set(&cx, 5).unwrap();
/// assert_eq!(doubled.get(&cx), 10);
/// ```
pub struct Memo<T> {
    id: NodeId,
    marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Memo<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Read the cached result, tracking it in the current computation.
    ///
    /// # Panics
    ///
    /// Panics if the memo has been disposed.
    pub fn get(&self, cx: &SignalContext) -> T
    where
        T: Clone,
    {
        match self.try_get(cx) {
            Ok(value) => value,
            Err(err) => panic!("Memo::get: {err}"),
        }
    }

    pub fn try_get(&self, cx: &SignalContext) -> Result<T>
    where
        T: Clone,
    {
        cx.read(self.id, true)
    }

    pub fn get_untracked(&self, cx: &SignalContext) -> Result<T>
    where
        T: Clone,
    {
        cx.read(self.id, false)
    }

    pub fn with<R>(&self, cx: &SignalContext, f: impl FnOnce(&T) -> R) -> Result<R> {
        cx.with_value(self.id, true, f)
    }

    pub fn dispose(&self, cx: &SignalContext) {
        cx.dispose(self.id);
    }

    pub fn is_disposed(&self, cx: &SignalContext) -> bool {
        cx.is_disposed(self.id)
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Memo<T> {}

impl<T> PartialEq for Memo<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Memo<T> {}

impl<T> Hash for Memo<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Memo").field(&self.id).finish()
    }
}

impl SignalContext {
    /// Create a memo without an equality predicate.
    pub fn create_memo<T, F>(&self, f: F, initial: T) -> Result<Memo<T>>
    where
        T: 'static,
        F: FnMut(&SignalContext, &T) -> T + 'static,
    {
        self.create_memo_with(f, initial, MemoOptions::new())
    }

    pub fn create_memo_with<T, F>(&self, f: F, initial: T, options: MemoOptions<T>) -> Result<Memo<T>>
    where
        T: 'static,
        F: FnMut(&SignalContext, &T) -> T + 'static,
    {
        self.try_create_memo(infallible(f), initial, options)
    }

    pub fn try_create_memo<T, E, F>(&self, f: F, initial: T, options: MemoOptions<T>) -> Result<Memo<T>>
    where
        T: 'static,
        E: Into<BoxError>,
        F: FnMut(&SignalContext, &T) -> Result<T, E> + 'static,
    {
        let equals = options.equals.map(erase_equals);
        let id = self.spawn_computation(NodeKind::Memo, Rc::new(initial), erase_compute(f), equals)?;
        Ok(Memo {
            id,
            marker: PhantomData,
        })
    }
}

// ---- Tests ----
