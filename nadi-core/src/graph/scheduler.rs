//! Update Scheduler
//!
//! The scheduler decides when and in which order queued effects run.
//!
//! # Algorithm
//!
//! 1. A write marks the graph dirty (see [`NodeArena::mark_changed`]) and
//!    hands every effect it reached to [`UpdateScheduler::enqueue`].
//! 2. While a batch is open nothing else happens.
//! 3. When the outermost batch closes the runtime flushes: it repeatedly
//!    takes the whole pending set as one *round* and runs each effect that
//!    is still dirty. Effects owned by older scopes run first; effects of
//!    the same scope run in creation order.
//! 4. Effects dirtied during a round are queued for the next round of the
//!    same flush, until a round ends with nothing pending.
//!
//! Derived nodes are never queued. They are pulled by whoever reads them.
//!
//! [`NodeArena::mark_changed`]: super::NodeArena::mark_changed

use std::collections::BTreeSet;

use super::node::{NodeId, RunKey};

/// Pending effects plus batch and flush bookkeeping.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    /// Effects waiting to run, in run order.
    pending: BTreeSet<RunKey>,

    /// Current batch nesting depth.
    batch_depth: usize,

    /// Whether a flush loop is currently running.
    flushing: bool,
}

impl UpdateScheduler {
    /// Create a new idle scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue effects. Already queued effects are not queued twice.
    pub fn enqueue<I>(&mut self, effects: I)
    where
        I: IntoIterator<Item = RunKey>,
    {
        self.pending.extend(effects);
    }

    /// Drop a queued effect, e.g. because it was disposed.
    pub fn dequeue(&mut self, effect: NodeId) {
        self.pending.retain(|key| key.effect != effect);
    }

    /// Take everything currently pending as one round, in run order.
    pub fn take_round(&mut self) -> Vec<RunKey> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Forget all pending work.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Whether any effect is waiting to run.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// The queued effects, in the order they would run.
    pub fn pending(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.pending.iter().map(|key| key.effect)
    }

    /// Open a batch. Returns the new depth.
    pub fn enter_batch(&mut self) -> usize {
        self.batch_depth += 1;
        self.batch_depth
    }

    /// Close a batch. Returns the remaining depth.
    pub fn exit_batch(&mut self) -> usize {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        self.batch_depth
    }

    /// Current batch nesting depth.
    pub fn batch_depth(&self) -> usize {
        self.batch_depth
    }

    /// Whether a batch is open.
    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    /// Mark the start of a flush. Returns `false` if one is already running,
    /// in which case the caller must leave the work to that flush.
    pub fn begin_flush(&mut self) -> bool {
        if self.flushing {
            return false;
        }
        self.flushing = true;
        true
    }

    /// Mark the end of a flush.
    pub fn end_flush(&mut self) {
        self.flushing = false;
    }

    /// Whether a flush loop is currently running.
    pub fn is_flushing(&self) -> bool {
        self.flushing
    }
}
