//! Update Queues
//!
//! The batch state machine behind `run_updates`. At most one memo queue and
//! one effect queue are open at a time:
//!
//! - memo queue open: a batch is running, nested batches run inline;
//! - memo queue closed, effect queue open: effects of an outer batch are
//!   still pending, so a new batch must leave them to that outer batch
//!   (`wait`);
//! - both closed: idle.
//!
//! Each batch that opens a memo queue starts a new epoch.

use super::node::{NodeId, NodeKind};

/// How a `run_updates` call participates in batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchMode {
    /// A memo queue is already open; the body runs inside the enclosing batch.
    Inline,

    /// This call opened the memo queue and must complete it. With `wait` set
    /// the effect queue belongs to an outer batch.
    Owner { wait: bool },
}

#[derive(Debug, Default)]
pub(crate) struct UpdateQueues {
    memos: Option<Vec<NodeId>>,
    effects: Option<Vec<NodeId>>,
    exec_count: u64,
}

impl UpdateQueues {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn exec_count(&self) -> u64 {
        self.exec_count
    }

    pub(crate) fn is_batching(&self) -> bool {
        self.memos.is_some()
    }

    pub(crate) fn open(&mut self) -> BatchMode {
        if self.memos.is_some() {
            return BatchMode::Inline;
        }

        self.memos = Some(Vec::new());
        let wait = self.effects.is_some();
        if !wait {
            self.effects = Some(Vec::new());
        }
        self.exec_count += 1;
        BatchMode::Owner { wait }
    }

    /// Queue a computation by kind. Duplicates are kept; running a settled
    /// computation is a no-op.
    pub(crate) fn enqueue(&mut self, id: NodeId, kind: NodeKind) {
        match kind {
            NodeKind::Memo => self.memos.get_or_insert_with(Vec::new).push(id),
            NodeKind::Effect => self.effects.get_or_insert_with(Vec::new).push(id),
            NodeKind::Signal | NodeKind::Scope => {}
        }
    }

    /// The memo queued at `index`, if the queue is open and that long.
    /// The queue may grow while it is being drained.
    pub(crate) fn memo_at(&self, index: usize) -> Option<NodeId> {
        self.memos.as_ref().and_then(|memos| memos.get(index).copied())
    }

    pub(crate) fn memo_len(&self) -> usize {
        self.memos.as_ref().map_or(0, Vec::len)
    }

    pub(crate) fn effect_len(&self) -> usize {
        self.effects.as_ref().map_or(0, Vec::len)
    }

    pub(crate) fn close_memos(&mut self) {
        self.memos = None;
    }

    pub(crate) fn take_effects(&mut self) -> Option<Vec<NodeId>> {
        self.effects.take()
    }

    /// Detach the open memo queue so a nested batch gets its own.
    pub(crate) fn detach_memos(&mut self) -> Option<Vec<NodeId>> {
        self.memos.take()
    }

    pub(crate) fn restore_memos(&mut self, memos: Option<Vec<NodeId>>) {
        self.memos = memos;
    }

    /// Drop the queues a failed batch owned and return what was in them.
    pub(crate) fn abort(&mut self, wait: bool) -> Vec<NodeId> {
        let mut dropped = self.memos.take().unwrap_or_default();
        if !wait {
            dropped.extend(self.effects.take().unwrap_or_default());
        }
        dropped
    }
}
