//! Signal Graph
//!
//! This crate provides a fine-grained reactive runtime. It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - Owned scopes with deferred tasks and cleanup callbacks
//! - Batched, glitch-free push-pull propagation
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `graph`: node storage, dependency edges and the batch queues
//! - `reactive`: the context and the typed handles built on it
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use signal_graph::SignalContext;
//!
//! let cx = SignalContext::new();
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! // Create a signal
//! let count = cx.create_signal(0);
//!
//! // Create a derived value
//! let doubled = cx.create_memo(move |cx, _| count.get(cx) * 2, 0).unwrap();
//!
//! // Create an effect
//! let sink = log.clone();
//! cx.create_effect(
//!     move |cx, _| sink.borrow_mut().push((count.get(cx), doubled.get(cx))),
//!     (),
//! )
//! .unwrap();
//!
//! // Update the signal; the effect runs once more
//! count.set(&cx, 5).unwrap();
//! assert_eq!(*log.borrow(), vec![(0, 0), (5, 10)]);
//! ```

pub mod graph;
pub mod reactive;

mod config;
mod error;

pub use config::{GraphConfig, DEFAULT_MAX_UPDATE_DEPTH};
pub use error::{BoxError, Error, Result};
pub use graph::{NodeId, NodeKind, ScopeState};
pub use reactive::{
    Computation, Memo, MemoOptions, RootHandle, RootProvider, Scope, Signal, SignalContext,
    WriteOptions,
};
