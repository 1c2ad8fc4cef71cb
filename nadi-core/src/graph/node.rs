//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.

use std::fmt;
use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use serde::Serialize;

use crate::reactive::Subscriber;

/// Unique identifier for a node in the dependency graph.
///
/// Ids are handed out from a monotonic counter, so comparing two ids
/// compares creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Where a queued effect runs within a flush round: effects of older owner
/// scopes first, then by the effect's own creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunKey {
    /// Creation order of the scope that owns the effect.
    pub owner: u64,
    pub effect: NodeId,
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Source,

    /// A derived node (memo). These have dependencies and may have dependents.
    /// They cache their computed value.
    Derived,

    /// An effect node. These are leaves of the graph.
    /// They have dependencies but no dependents (they produce side effects, not values).
    Effect,
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// The node might need to recompute. Something upstream changed, but
    /// only through derived nodes that have not been re-validated yet.
    MaybeDirty,

    /// The node definitely needs to recompute. A direct dependency changed.
    Dirty,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Current dirty state.
    dirty: DirtyState,

    /// Nodes that this node depends on, in the order they were first read.
    dependencies: IndexSet<NodeId>,

    /// Nodes that depend on this node, in subscription order.
    dependents: IndexSet<NodeId>,

    /// The computation behind a derived or effect node.
    subscriber: Option<Weak<dyn Subscriber>>,

    /// Creation order of the owning scope; orders queued effects.
    owner_order: u64,
}

impl Node {
    /// Create a new node with the given id and kind.
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            dirty: match kind {
                NodeKind::Source => DirtyState::Clean,
                NodeKind::Derived => DirtyState::Dirty, // Start dirty to ensure first computation
                NodeKind::Effect => DirtyState::Dirty,
            },
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
            subscriber: None,
            owner_order: 0,
        }
    }

    /// Create a new source (signal) node.
    pub fn source(id: NodeId) -> Self {
        Self::new(id, NodeKind::Source)
    }

    /// Create a node backed by a computation.
    pub fn computation(id: NodeId, kind: NodeKind, subscriber: Weak<dyn Subscriber>) -> Self {
        let mut node = Self::new(id, kind);
        node.subscriber = Some(subscriber);
        node
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Get the current dirty state.
    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    /// Check if the node needs any processing.
    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    /// Mark the node as clean.
    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Mark the node as maybe dirty. Never downgrades a dirty node.
    pub fn mark_maybe_dirty(&mut self) {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    /// Mark the node as definitely dirty (needs recomputation).
    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    /// The computation behind this node, if it is still alive.
    pub fn subscriber(&self) -> Option<&Weak<dyn Subscriber>> {
        self.subscriber.as_ref()
    }

    /// Record the creation order of the scope that owns this node.
    pub fn set_owner_order(&mut self, order: u64) {
        self.owner_order = order;
    }

    /// The scheduling position of this node when queued.
    pub fn run_key(&self) -> RunKey {
        RunKey {
            owner: self.owner_order,
            effect: self.id,
        }
    }

    /// Add a dependency (a node that this node reads from).
    pub fn add_dependency(&mut self, node_id: NodeId) {
        self.dependencies.insert(node_id);
    }

    /// Remove a dependency.
    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.shift_remove(&node_id);
    }

    /// Get all dependencies.
    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    /// Add a dependent (a node that reads from this node).
    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    /// Remove a dependent.
    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    /// Clear all dependencies.
    pub fn clear_dependencies(&mut self) {
        self.dependencies.clear();
    }
}
