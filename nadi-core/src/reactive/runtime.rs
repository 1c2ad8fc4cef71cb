//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph and the effect queue, and decides
//! when queued effects run.
//!
//! # How It Works
//!
//! 1. Signals register a source node, memos and effects a computation node.
//!
//! 2. When a computation runs, every node it reads is recorded in its
//!    [`ReactiveContext`] frame. Afterwards the runtime replaces the
//!    computation's dependency edges with exactly that set.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Marks direct dependents `Dirty`
//!    b. Marks everything further downstream `MaybeDirty`
//!    c. Queues every effect it reached
//!    d. Flushes the queue, unless a batch or a flush is already running
//!
//! 4. A flush brings each queued effect up to date. Memos are pulled on the
//!    way: a `MaybeDirty` node first checks its derived dependencies and only
//!    re-runs if one of them actually produced a new value.
//!
//! # Threading
//!
//! There is one runtime per thread, kept in thread-local storage. Reactive
//! values are `!Send`; they never leave the thread that created them.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::context::ReactiveContext;
use super::subscriber::Subscriber;
use crate::config::{ConfigError, FlushMode, RuntimeConfig};
use crate::error::{catch_reactive, raise_on_err, ReactiveError};
use crate::graph::{DirtyState, Node, NodeArena, NodeId, NodeKind, RunKey, UpdateScheduler};

thread_local! {
    static STATE: RuntimeState = RuntimeState::default();
}

#[derive(Default)]
struct RuntimeState {
    graph: RefCell<NodeArena>,
    scheduler: RefCell<UpdateScheduler>,
    config: RefCell<RuntimeConfig>,
}

/// The per-thread reactive runtime.
///
/// All state lives in thread-local storage; this type only namespaces the
/// operations on it.
pub struct Runtime;

impl Runtime {
    /// Install a configuration for the current thread.
    pub fn configure(config: RuntimeConfig) -> Result<(), ConfigError> {
        config.validate()?;
        debug!(
            max_flush_rounds = config.max_flush_rounds,
            flush_mode = ?config.flush_mode,
            "configuring reactive runtime"
        );
        STATE.with(|state| *state.config.borrow_mut() = config);
        Ok(())
    }

    /// The configuration of the current thread.
    pub fn config() -> RuntimeConfig {
        STATE.with(|state| state.config.borrow().clone())
    }

    pub(crate) fn register_source(id: NodeId) {
        STATE.with(|state| state.graph.borrow_mut().add_node(Node::source(id)));
    }

    pub(crate) fn register_computation(id: NodeId, kind: NodeKind, subscriber: Weak<dyn Subscriber>) {
        STATE.with(|state| {
            state
                .graph
                .borrow_mut()
                .add_node(Node::computation(id, kind, subscriber))
        });
    }

    /// Record the creation order of the scope that owns `id`. Queued effects
    /// of older scopes run first.
    pub(crate) fn set_owner_order(id: NodeId, order: u64) {
        STATE.with(|state| {
            if let Some(node) = state.graph.borrow_mut().get_node_mut(id) {
                node.set_owner_order(order);
            }
        });
    }

    /// Remove a node and its edges, and drop it from the effect queue.
    ///
    /// Safe to call from destructors, including during thread teardown.
    pub(crate) fn unregister(id: NodeId) {
        let _ = STATE.try_with(|state| {
            let removed = state.graph.borrow_mut().remove_node(id);
            state.scheduler.borrow_mut().dequeue(id);
            removed
        });
    }

    /// Replace the dependency edges of `id` with `reads`.
    ///
    /// Returns `false` when the node no longer exists.
    pub(crate) fn commit_dependencies(id: NodeId, reads: &IndexSet<NodeId>) -> bool {
        STATE.with(|state| state.graph.borrow_mut().replace_dependencies(id, reads))
    }

    pub(crate) fn mark_clean(id: NodeId) {
        STATE.with(|state| {
            if let Some(node) = state.graph.borrow_mut().get_node_mut(id) {
                node.mark_clean();
            }
        });
    }

    pub(crate) fn confirm_dependents_dirty(id: NodeId) {
        STATE.with(|state| state.graph.borrow_mut().confirm_dependents_dirty(id));
    }

    /// Current dirty state of a node, `None` if it is not in the graph.
    pub fn dirty_state(id: NodeId) -> Option<DirtyState> {
        STATE.with(|state| state.graph.borrow().dirty_state(id))
    }

    /// Number of nodes that read `id`.
    pub fn dependent_count(id: NodeId) -> usize {
        STATE.with(|state| {
            state
                .graph
                .borrow()
                .get_node(id)
                .map_or(0, |node| node.dependents().len())
        })
    }

    /// Number of nodes `id` read during its last successful run.
    pub fn dependency_count(id: NodeId) -> usize {
        STATE.with(|state| {
            state
                .graph
                .borrow()
                .get_node(id)
                .map_or(0, |node| node.dependencies().len())
        })
    }

    fn subscriber(id: NodeId) -> Option<Rc<dyn Subscriber>> {
        STATE.with(|state| {
            state
                .graph
                .borrow()
                .get_node(id)
                .and_then(Node::subscriber)
                .and_then(Weak::upgrade)
        })
    }

    fn derived_dependencies(id: NodeId) -> Vec<NodeId> {
        STATE.with(|state| {
            let graph = state.graph.borrow();
            let Some(node) = graph.get_node(id) else {
                return Vec::new();
            };
            node.dependencies()
                .iter()
                .copied()
                .filter(|dep| {
                    graph
                        .get_node(*dep)
                        .is_some_and(|dep| dep.kind() == NodeKind::Derived)
                })
                .collect()
        })
    }

    /// Bring a computation up to date, running it only if needed.
    ///
    /// A `MaybeDirty` node validates its derived dependencies in the order it
    /// read them and stops as soon as one of them turns it `Dirty`. Returns
    /// whether the computation ran.
    pub(crate) fn update_if_necessary(id: NodeId) -> bool {
        if Self::dirty_state(id) == Some(DirtyState::MaybeDirty) {
            for dep in Self::derived_dependencies(id) {
                Self::update_if_necessary(dep);
                if Self::dirty_state(id) == Some(DirtyState::Dirty) {
                    break;
                }
            }
        }

        match Self::dirty_state(id) {
            Some(DirtyState::Dirty) => match Self::subscriber(id) {
                Some(subscriber) => {
                    subscriber.run();
                    true
                }
                None => false,
            },
            Some(DirtyState::MaybeDirty) => {
                Self::mark_clean(id);
                false
            }
            _ => false,
        }
    }

    /// Propagate a change of the source `id`.
    ///
    /// Flushes right away in [`FlushMode::Sync`] unless a batch or a flush is
    /// in progress, in which case the work is picked up by that batch or
    /// flush.
    pub(crate) fn notify_changed(id: NodeId) -> Result<(), ReactiveError> {
        let should_flush = STATE.with(|state| {
            let mut graph = state.graph.borrow_mut();
            let reached = graph.mark_changed(id);
            trace!(source = %id, effects = reached.len(), "source changed");

            let mut scheduler = state.scheduler.borrow_mut();
            scheduler.enqueue(reached.iter().filter_map(|effect| graph.run_key(*effect)));
            scheduler.has_pending()
                && !scheduler.is_batching()
                && !scheduler.is_flushing()
                && state.config.borrow().flush_mode == FlushMode::Sync
        });

        if should_flush {
            Self::run_flush()
        } else {
            Ok(())
        }
    }

    /// Run every queued effect until the queue settles.
    ///
    /// Does nothing inside a batch or while another flush is running; that
    /// batch or flush drains the queue instead.
    pub fn flush() -> Result<(), ReactiveError> {
        catch_reactive(Self::run_flush)
    }

    fn run_flush() -> Result<(), ReactiveError> {
        let (started, max_rounds) = STATE.with(|state| {
            let mut scheduler = state.scheduler.borrow_mut();
            let started = !scheduler.is_batching() && scheduler.begin_flush();
            (started, state.config.borrow().max_flush_rounds)
        });
        if !started {
            return Ok(());
        }

        let mut guard = FlushGuard {
            exit: FlushExit::Unwound,
            unfinished: VecDeque::new(),
        };
        debug!("flush started");
        let mut rounds = 0;
        let mut runs = 0;

        loop {
            let round = STATE.with(|state| state.scheduler.borrow_mut().take_round());
            if round.is_empty() {
                break;
            }

            rounds += 1;
            if rounds > max_rounds {
                guard.exit = FlushExit::Abandoned;
                warn!(rounds = max_rounds, "flush did not settle; dropping queued effects");
                return Err(ReactiveError::flush_limit(max_rounds));
            }

            guard.unfinished = round.into();
            while let Some(key) = guard.unfinished.pop_front() {
                let id = key.effect;
                // Disposed earlier in this flush.
                let Some(subscriber) = Self::subscriber(id) else {
                    continue;
                };
                if subscriber.is_disposed() {
                    continue;
                }
                drop(subscriber);

                match panic::catch_unwind(AssertUnwindSafe(|| Self::update_if_necessary(id))) {
                    Ok(true) => runs += 1,
                    Ok(false) => {}
                    Err(payload) => {
                        let infinite = payload
                            .downcast_ref::<ReactiveError>()
                            .is_some_and(ReactiveError::is_infinite_reaction);
                        if infinite {
                            guard.exit = FlushExit::Abandoned;
                        }
                        panic::resume_unwind(payload);
                    }
                }
            }
        }

        guard.exit = FlushExit::Settled;
        debug!(rounds, runs, "flush settled");
        Ok(())
    }

    /// Run `f` as one batch: writes inside it are propagated once, when the
    /// outermost batch ends.
    ///
    /// If `f` panics the batch is closed without flushing.
    pub fn batch<T>(f: impl FnOnce() -> T) -> Result<T, ReactiveError> {
        let value = Self::hold_flush(f);
        if Self::is_batching() {
            Ok(value)
        } else {
            Self::run_flush().map(|()| value)
        }
    }

    /// Like [`batch`](Self::batch), but the closing flush follows the
    /// configured [`FlushMode`]: in deferred mode the work stays queued.
    pub(crate) fn batch_with_flush_mode<T>(f: impl FnOnce() -> T) -> Result<T, ReactiveError> {
        let value = Self::hold_flush(f);
        let flush_now = STATE.with(|state| {
            !state.scheduler.borrow().is_batching()
                && state.config.borrow().flush_mode == FlushMode::Sync
        });
        if flush_now {
            Self::run_flush().map(|()| value)
        } else {
            Ok(value)
        }
    }

    fn hold_flush<T>(f: impl FnOnce() -> T) -> T {
        let depth = STATE.with(|state| state.scheduler.borrow_mut().enter_batch());
        trace!(depth, "entering batch");

        let _guard = BatchGuard;
        f()
    }

    /// Whether a batch is open on this thread.
    pub fn is_batching() -> bool {
        STATE.with(|state| state.scheduler.borrow().is_batching())
    }

    /// Whether a flush is running on this thread.
    pub fn is_flushing() -> bool {
        STATE.with(|state| state.scheduler.borrow().is_flushing())
    }

    /// Whether any effect is waiting for a flush.
    pub fn has_pending() -> bool {
        STATE.with(|state| state.scheduler.borrow().has_pending())
    }

    /// Number of nodes in this thread's graph.
    pub fn node_count() -> usize {
        STATE.with(|state| state.graph.borrow().node_count())
    }

    /// Capture the current graph for inspection.
    pub fn snapshot() -> GraphSnapshot {
        STATE.with(|state| {
            let graph = state.graph.borrow();
            let scheduler = state.scheduler.borrow();

            GraphSnapshot {
                nodes: graph
                    .nodes_in_order()
                    .into_iter()
                    .map(|node| NodeSnapshot {
                        id: node.id(),
                        kind: node.kind(),
                        state: node.dirty_state(),
                        dependencies: node.dependencies().iter().copied().collect(),
                        dependents: node.dependents().iter().copied().collect(),
                    })
                    .collect(),
                pending: scheduler.pending().collect(),
                batch_depth: scheduler.batch_depth(),
                flushing: scheduler.is_flushing(),
            }
        })
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<NodeId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushExit {
    Settled,
    /// Gave up on an infinite reaction.
    Abandoned,
    /// An effect panicked.
    Unwound,
}

/// Ends the flush.
///
/// An infinite reaction drops all queued work. When an effect panics for any
/// other reason, the effects of its round that had not run yet are queued
/// again, so they are not left dirty with nothing scheduled.
struct FlushGuard {
    exit: FlushExit,
    unfinished: VecDeque<RunKey>,
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = STATE.try_with(|state| {
            let mut scheduler = state.scheduler.borrow_mut();
            scheduler.end_flush();
            match self.exit {
                FlushExit::Settled => {}
                FlushExit::Abandoned => scheduler.clear(),
                FlushExit::Unwound => scheduler.enqueue(self.unfinished.drain(..)),
            }
        });
    }
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let _ = STATE.try_with(|state| state.scheduler.borrow_mut().exit_batch());
    }
}

/// A point-in-time view of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub state: DirtyState,
    pub dependencies: Vec<NodeId>,
    pub dependents: Vec<NodeId>,
}

/// A point-in-time view of the dependency graph of the current thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    /// Nodes in creation order.
    pub nodes: Vec<NodeSnapshot>,
    /// Effects waiting for a flush, in run order.
    pub pending: Vec<NodeId>,
    pub batch_depth: usize,
    pub flushing: bool,
}

impl GraphSnapshot {
    /// Look up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Render the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Run `f` as a batch; see [`Runtime::batch`].
///
/// # Panics
///
/// Raises [`ReactiveError`] if the flush at the end of the batch fails. Use
/// [`try_batch`] to get it as a value.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    raise_on_err(Runtime::batch(f))
}

/// Run `f` as a batch and return runtime errors instead of raising them.
pub fn try_batch<T>(f: impl FnOnce() -> T) -> Result<T, ReactiveError> {
    catch_reactive(|| Runtime::batch(f))
}

/// Run every queued effect now; see [`Runtime::flush`].
pub fn flush() -> Result<(), ReactiveError> {
    Runtime::flush()
}

/// Yield to the async executor, then flush.
///
/// With [`FlushMode::Deferred`] this is where queued writes take effect.
pub async fn tick() -> Result<(), ReactiveError> {
    tokio::task::yield_now().await;
    Runtime::flush()
}
