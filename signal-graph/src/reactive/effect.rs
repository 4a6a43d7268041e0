//! Computation Implementation
//!
//! A computation is a function that re-runs whenever something it read
//! changes. It receives its previous result and returns the next one.
//!
//! # Kinds
//!
//! - Effects run after every memo of the batch has settled. They are the
//!   place for side effects.
//! - Pure computations (`is_effect == false`) run in the memo phase. A
//!   [`Memo`](super::Memo) is a pure computation that can also be read.
//!
//! # Lifecycle
//!
//! 1. The computation runs once at creation, which records its sources.
//!
//! 2. Before every re-run it drops its sources, disposes everything it
//!    created during the previous run, and runs the cleanups registered with
//!    `on_cleanup`.
//!
//! 3. Disposing it (or its owner) stops it for good.

use std::any::Any;
use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::{BoxError, Result};
use crate::graph::{AnyValue, ComputeFn, EqualsFn, Node, NodeId, NodeKind};

use super::SignalContext;

/// Handle to a memo-phase or effect computation.
pub struct Computation<T> {
    id: NodeId,
    marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Computation<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The latest result. Never tracked.
    pub fn value(&self, cx: &SignalContext) -> Result<T>
    where
        T: Clone,
    {
        cx.read(self.id, false)
    }

    pub fn with_value<R>(&self, cx: &SignalContext, f: impl FnOnce(&T) -> R) -> Result<R> {
        cx.with_value(self.id, false, f)
    }

    pub fn is_effect(&self, cx: &SignalContext) -> bool {
        cx.kind(self.id) == Some(NodeKind::Effect)
    }

    pub fn dispose(&self, cx: &SignalContext) {
        cx.dispose(self.id);
    }

    pub fn is_disposed(&self, cx: &SignalContext) -> bool {
        cx.is_disposed(self.id)
    }
}

impl<T> Clone for Computation<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Computation<T> {}

impl<T> PartialEq for Computation<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Computation<T> {}

impl<T> fmt::Debug for Computation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Computation").field(&self.id).finish()
    }
}

/// Lift an infallible compute function.
pub(crate) fn infallible<T, F>(mut f: F) -> impl FnMut(&SignalContext, &T) -> Result<T, Infallible>
where
    F: FnMut(&SignalContext, &T) -> T,
{
    move |cx: &SignalContext, previous: &T| -> Result<T, Infallible> { Ok(f(cx, previous)) }
}

/// Erase a typed compute function for storage on a node.
pub(crate) fn erase_compute<T, E, F>(mut f: F) -> ComputeFn
where
    T: 'static,
    E: Into<BoxError>,
    F: FnMut(&SignalContext, &T) -> Result<T, E> + 'static,
{
    Box::new(move |cx: &SignalContext, previous: &dyn Any| -> Result<AnyValue, BoxError> {
        let previous = previous.downcast_ref::<T>().ok_or_else(|| {
            BoxError::from(format!(
                "previous value is not a {}",
                std::any::type_name::<T>()
            ))
        })?;
        let next = f(cx, previous).map_err(Into::into)?;
        Ok(Rc::new(next) as AnyValue)
    })
}

impl SignalContext {
    /// Create a computation owned by the current scope and run it once.
    ///
    /// With `is_effect` the computation is queued as an effect on later
    /// changes; otherwise it runs in the memo phase.
    pub fn create_computation<T, F>(&self, f: F, initial: T, is_effect: bool) -> Result<Computation<T>>
    where
        T: 'static,
        F: FnMut(&SignalContext, &T) -> T + 'static,
    {
        self.try_create_computation(infallible(f), initial, is_effect)
    }

    /// Like [`create_computation`](Self::create_computation) with a fallible
    /// function. An error from any run surfaces as
    /// [`Error::Compute`](crate::Error::Compute).
    pub fn try_create_computation<T, E, F>(
        &self,
        f: F,
        initial: T,
        is_effect: bool,
    ) -> Result<Computation<T>>
    where
        T: 'static,
        E: Into<BoxError>,
        F: FnMut(&SignalContext, &T) -> Result<T, E> + 'static,
    {
        let kind = if is_effect {
            NodeKind::Effect
        } else {
            NodeKind::Memo
        };
        let id = self.spawn_computation(kind, Rc::new(initial), erase_compute(f), None)?;
        Ok(Computation {
            id,
            marker: PhantomData,
        })
    }

    pub fn create_effect<T, F>(&self, f: F, initial: T) -> Result<Computation<T>>
    where
        T: 'static,
        F: FnMut(&SignalContext, &T) -> T + 'static,
    {
        self.create_computation(f, initial, true)
    }

    pub fn try_create_effect<T, E, F>(&self, f: F, initial: T) -> Result<Computation<T>>
    where
        T: 'static,
        E: Into<BoxError>,
        F: FnMut(&SignalContext, &T) -> Result<T, E> + 'static,
    {
        self.try_create_computation(f, initial, true)
    }

    /// Insert a computation node and run it. A node whose first run fails is
    /// disposed again before the error is returned.
    pub(super) fn spawn_computation(
        &self,
        kind: NodeKind,
        initial: AnyValue,
        compute: ComputeFn,
        equals: Option<EqualsFn>,
    ) -> Result<NodeId> {
        let node = Node::computation(kind, self.current_owner(), initial, compute, equals);
        let id = self.insert_node(node);
        if let Err(err) = self.update_computation(id) {
            self.dispose(id);
            return Err(err);
        }
        Ok(id)
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::{Cell, RefCell};

    #[test]
    fn effect_runs_on_creation() {
        let cx = SignalContext::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();

        let effect = cx.create_effect(move |_, _| flag.set(true), ()).unwrap();

        assert!(ran.get());
        assert!(effect.is_effect(&cx));
        assert_eq!(cx.updated_time(effect.id()), Some(cx.exec_count()));
    }

    #[test]
    fn effect_reruns_on_change() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(1);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = seen.clone();
        cx.create_effect(move |cx, _| log.borrow_mut().push(signal.get(cx)), ())
            .unwrap();

        signal.set(&cx, 2).unwrap();
        signal.set(&cx, 3).unwrap();
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn computation_receives_previous_value() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(1);
        let sum = cx
            .create_effect(move |cx, total: &i32| total + signal.get(cx), 0)
            .unwrap();
        assert_eq!(sum.value(&cx).unwrap(), 1);

        signal.set(&cx, 10).unwrap();
        assert_eq!(sum.value(&cx).unwrap(), 11);
    }

    #[test]
    fn pure_computation_runs_before_effects() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(0);
        let order = Rc::new(RefCell::new(Vec::new()));

        let log = order.clone();
        cx.create_computation(
            move |cx, _| {
                signal.get(cx);
                log.borrow_mut().push("effect");
            },
            (),
            true,
        )
        .unwrap();
        let log = order.clone();
        let pure = cx
            .create_computation(
                move |cx, _| {
                    signal.get(cx);
                    log.borrow_mut().push("pure");
                },
                (),
                false,
            )
            .unwrap();
        assert!(!pure.is_effect(&cx));

        order.borrow_mut().clear();
        signal.set(&cx, 1).unwrap();
        assert_eq!(*order.borrow(), vec!["pure", "effect"]);
    }

    #[test]
    fn disposed_effect_stops_running() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(0);
        let runs = Rc::new(Cell::new(0));

        let counter = runs.clone();
        let effect = cx
            .create_effect(
                move |cx, _| {
                    signal.get(cx);
                    counter.set(counter.get() + 1);
                },
                (),
            )
            .unwrap();

        effect.dispose(&cx);
        assert_eq!(cx.subscriber_count(signal.id()), 0);

        signal.set(&cx, 1).unwrap();
        assert_eq!(runs.get(), 1);
        assert!(matches!(effect.value(&cx), Err(Error::Disposed(_))));
    }

    #[test]
    fn failing_first_run_disposes_node() {
        let cx = SignalContext::new();
        let before = cx.node_count();

        let err = cx
            .try_create_effect(|_, _: &()| Err("boom"), ())
            .unwrap_err();

        assert!(matches!(&err, Error::Compute { source, .. } if source.to_string() == "boom"));
        assert_eq!(cx.node_count(), before);
    }

    #[test]
    fn failing_rerun_surfaces_error() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(0);

        let effect = cx
            .try_create_effect(
                move |cx, _: &()| {
                    if signal.get(cx) > 0 {
                        return Err(format!("rejected {}", signal.get(cx)));
                    }
                    Ok(())
                },
                (),
            )
            .unwrap();
        assert_eq!(cx.source_count(effect.id()), 1);

        let err = signal.set(&cx, 1).unwrap_err();
        assert_eq!(err.node(), Some(effect.id()));
        assert!(err.to_string().contains("rejected 1"));
        // The failed run read the signal before failing.
        assert_eq!(cx.source_count(effect.id()), 1);
        assert!(!cx.is_batching());
    }

    #[test]
    fn rerun_disposes_children_created_by_previous_run() {
        let cx = SignalContext::new();
        let signal = cx.create_signal(0);
        let inner_runs = Rc::new(Cell::new(0));

        let counter = inner_runs.clone();
        let outer = cx
            .create_effect(
                move |cx, _| {
                    signal.get(cx);
                    let counter = counter.clone();
                    cx.create_effect(move |_, _| counter.set(counter.get() + 1), ())
                        .map(|inner| inner.id())
                        .ok()
                },
                None,
            )
            .unwrap();

        let first = outer.value(&cx).unwrap().unwrap();
        assert_eq!(cx.owner(first), Some(outer.id()));

        signal.set(&cx, 1).unwrap();
        let second = outer.value(&cx).unwrap().unwrap();

        assert!(cx.is_disposed(first));
        assert!(!cx.is_disposed(second));
        assert_eq!(cx.children(outer.id()), vec![second]);
        assert_eq!(inner_runs.get(), 2);
    }
}
