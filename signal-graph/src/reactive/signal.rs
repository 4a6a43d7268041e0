//! Signal Implementation
//!
//! A Signal is the mutable source of the graph. It holds a value and tracks
//! which computations read it.
//!
//! # How Signals Work
//!
//! 1. Reading a signal inside a computation registers that computation as a
//!    subscriber (and the signal as one of its sources).
//!
//! 2. Writing a different value marks every subscriber stale and queues it.
//!    Outside a batch the write opens one, so the change has fully propagated
//!    by the time `set` returns.
//!
//! 3. Writing an equal value does nothing, unless the write asks to skip the
//!    comparison.
//!
//! # Memory Layout
//!
//! A `Signal<T>` is only a typed node id. The value lives in the context's
//! arena, so the handle is `Copy` and can be moved freely into closures.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::Result;
use crate::graph::{EqualsFn, Node, NodeId};

use super::SignalContext;

/// Options for a single write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Store and propagate even if the new value equals the current one.
    pub skip_compare: bool,
}

impl WriteOptions {
    pub fn skip_compare() -> Self {
        Self { skip_compare: true }
    }
}

/// Handle to a reactive value of type `T` stored in a [`SignalContext`].
///
/// # Example
///
/// ```
/// use signal_graph::SignalContext;
///
/// let cx = SignalContext::new();
/// let count = cx.create_signal(0);
///
/// count.set(&cx, 5).unwrap();
/// assert_eq!(count.get(&cx), 5);
/// ```
pub struct Signal<T> {
    id: NodeId,
    marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Signal<T> {
    pub(crate) fn from_id(id: NodeId) -> Self {
        Self {
            id,
            marker: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Read the value, tracking it in the current computation.
    ///
    /// # Panics
    ///
    /// Panics if the signal has been disposed. Use [`try_get`](Self::try_get)
    /// to handle that case.
    pub fn get(&self, cx: &SignalContext) -> T
    where
        T: Clone,
    {
        match self.try_get(cx) {
            Ok(value) => value,
            Err(err) => panic!("Signal::get: {err}"),
        }
    }

    pub fn try_get(&self, cx: &SignalContext) -> Result<T>
    where
        T: Clone,
    {
        cx.read(self.id, true)
    }

    /// Read the value without registering a dependency.
    pub fn get_untracked(&self, cx: &SignalContext) -> Result<T>
    where
        T: Clone,
    {
        cx.read(self.id, false)
    }

    /// Borrow the value for the duration of `f`, tracking it.
    pub fn with<R>(&self, cx: &SignalContext, f: impl FnOnce(&T) -> R) -> Result<R> {
        cx.with_value(self.id, true, f)
    }

    pub fn set(&self, cx: &SignalContext, value: T) -> Result<()> {
        self.set_with(cx, value, WriteOptions::default())
    }

    pub fn set_with(&self, cx: &SignalContext, value: T, options: WriteOptions) -> Result<()> {
        cx.write(self.id, value, options.skip_compare)
    }

    /// Modify the value in place. The result goes through the usual equality
    /// check, so an update that leaves the value unchanged propagates nothing.
    pub fn update(&self, cx: &SignalContext, f: impl FnOnce(&mut T)) -> Result<()>
    where
        T: Clone,
    {
        let mut value = self.get_untracked(cx)?;
        f(&mut value);
        self.set(cx, value)
    }

    pub fn dispose(&self, cx: &SignalContext) {
        cx.dispose(self.id);
    }

    pub fn is_disposed(&self, cx: &SignalContext) -> bool {
        cx.is_disposed(self.id)
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Signal<T> {}

impl<T> Hash for Signal<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signal").field(&self.id).finish()
    }
}

/// Wrap a typed predicate for storage on a node. Values of another type never
/// compare equal.
pub(crate) fn erase_equals<T: 'static>(equals: impl Fn(&T, &T) -> bool + 'static) -> EqualsFn {
    Rc::new(move |current: &dyn Any, next: &dyn Any| {
        match (current.downcast_ref::<T>(), next.downcast_ref::<T>()) {
            (Some(current), Some(next)) => equals(current, next),
            _ => false,
        }
    })
}

impl SignalContext {
    /// Create a signal compared with `PartialEq`, owned by the current scope.
    pub fn create_signal<T: PartialEq + 'static>(&self, value: T) -> Signal<T> {
        self.create_signal_with(value, T::eq)
    }

    /// Create a signal with a custom equality predicate. A predicate that
    /// always returns `false` makes every write propagate.
    pub fn create_signal_with<T: 'static>(
        &self,
        value: T,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Signal<T> {
        let node = Node::signal(
            self.current_owner(),
            Rc::new(value),
            Some(erase_equals(equals)),
        );
        Signal::from_id(self.insert_node(node))
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::Cell;

    #[test]
    fn test_signal_get_set() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(42);
        assert_eq!(signal.get(&cx), 42);

        signal.set(&cx, 100).unwrap();
        assert_eq!(signal.get(&cx), 100);
    }

    #[test]
    fn test_signal_update() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(vec![1, 2]);
        signal.update(&cx, |items| items.push(3)).unwrap();
        assert_eq!(signal.get(&cx), vec![1, 2, 3]);
    }

    #[test]
    fn test_signal_with_borrows() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(String::from("hello"));
        let len = signal.with(&cx, |text| text.len()).unwrap();
        assert_eq!(len, 5);
    }

    #[test]
    fn test_equal_write_does_not_propagate() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(1);
        let runs = Rc::new(Cell::new(0));

        let counter = runs.clone();
        cx.create_effect(
            move |cx, _| {
                signal.get(cx);
                counter.set(counter.get() + 1);
            },
            (),
        )
        .unwrap();
        assert_eq!(runs.get(), 1);

        signal.set(&cx, 1).unwrap();
        assert_eq!(runs.get(), 1);

        signal.set_with(&cx, 1, WriteOptions::skip_compare()).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_custom_equality() {
        let cx = SignalContext::new();
        // Only the sign matters.
        let signal = cx.create_signal_with(1i32, |a, b| a.signum() == b.signum());
        let runs = Rc::new(Cell::new(0));

        let counter = runs.clone();
        cx.create_effect(
            move |cx, _| {
                signal.get(cx);
                counter.set(counter.get() + 1);
            },
            (),
        )
        .unwrap();

        signal.set(&cx, 7).unwrap();
        assert_eq!(runs.get(), 1);
        // Equal under the predicate, but the new value is still not stored.
        assert_eq!(signal.get_untracked(&cx).unwrap(), 1);

        signal.set(&cx, -3).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_write_without_subscribers_opens_no_batch() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(0);
        let before = cx.exec_count();
        signal.set(&cx, 1).unwrap();
        assert_eq!(cx.exec_count(), before);
    }

    #[test]
    fn test_disposed_signal() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(0);
        signal.dispose(&cx);

        assert!(signal.is_disposed(&cx));
        assert!(matches!(signal.try_get(&cx), Err(Error::Disposed(id)) if id == signal.id()));
        assert!(matches!(signal.set(&cx, 1), Err(Error::Disposed(_))));
    }

    #[test]
    #[should_panic(expected = "disposed")]
    fn test_get_panics_after_dispose() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(0);
        signal.dispose(&cx);
        signal.get(&cx);
    }

    #[test]
    fn test_handle_from_other_context_is_rejected() {
        let first = SignalContext::new();
        let second = SignalContext::new();
        let number = first.create_signal(1i32);
        second.create_signal(String::new());

        // Same slot in a different arena holds a different type.
        let err = number.try_get(&second).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}
