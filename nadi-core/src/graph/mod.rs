//! Dependency Graph
//!
//! This module implements the computational dependency graph that tracks
//! relationships between reactive values and computations.
//!
//! # Overview
//!
//! - Nodes represent reactive values (signals) or computations (memos, effects)
//! - Edges represent dependencies: if A depends on B, there is an edge from B to A
//!
//! When a signal changes, we traverse the graph to find all affected nodes
//! and mark them dirty. Effects reached by the traversal are queued on the
//! [`UpdateScheduler`]; derived nodes wait until somebody reads them.
//!
//! # Design Decisions
//!
//! 1. We use a centralized arena rather than distributed linked lists because:
//!    - Disposal can detach a node from every neighbour in one place
//!    - It keeps typed values out of the graph (handles own their values)
//!    - It allows the whole graph to be snapshotted for debugging
//!
//! 2. The arena is indexed by node ID for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.

mod arena;
mod node;
mod scheduler;

pub use arena::{NodeArena, ReachedEffects};
pub use node::{DirtyState, Node, NodeId, NodeKind, RunKey};
pub use scheduler::UpdateScheduler;
