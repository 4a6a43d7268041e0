//! Reactive Primitives
//!
//! This module implements the user-facing side of the graph: signals, memos,
//! effects and scopes, all coordinated by a [`SignalContext`].
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. Reading it inside a memo or
//! effect registers a dependency; writing a different value marks every
//! dependent stale and schedules it.
//!
//! ## Memos
//!
//! A Memo is a derived value. It re-runs in the memo phase of a batch when a
//! source changed, and its result can be read and tracked like a signal.
//!
//! ## Effects
//!
//! An Effect re-runs after all memos of a batch settled. Effects are where
//! the graph talks to the outside world.
//!
//! ## Scopes
//!
//! Scopes own what is created inside them. Disposing a scope disposes its
//! children, runs cleanups and drops queued tasks.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: the context keeps a stack of running
//! computations and every read registers with the top of that stack. There
//! is no global state; each operation takes the context explicitly, so
//! several independent graphs can coexist on one thread.
//!
//! Propagation is push-pull. A write pushes stale/pending marks through the
//! graph; the batch then pulls: pending nodes check upstream before deciding
//! to run, so a node runs at most once per batch and never sees a
//! half-updated graph.

mod context;
mod effect;
mod memo;
mod runtime;
mod scope;
mod signal;

pub use context::SignalContext;
pub use effect::Computation;
pub use memo::{Memo, MemoOptions};
pub use runtime::{RootHandle, RootProvider};
pub use scope::Scope;
pub use signal::{Signal, WriteOptions};
