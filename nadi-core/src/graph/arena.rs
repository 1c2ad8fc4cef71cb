//! Node Arena
//!
//! Owns every node of the dependency graph and keeps forward and reverse
//! edges in sync. All dirty-state propagation happens here; running the
//! computations is left to the runtime.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::node::{DirtyState, Node, NodeId, NodeKind, RunKey};

/// Effects reached by a single change. Most writes touch only a handful.
pub type ReachedEffects = SmallVec<[NodeId; 8]>;

/// The arena of graph nodes, indexed by ID.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: HashMap<NodeId, Node>,
}

impl NodeArena {
    /// Create a new empty arena.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node. Returns the removed node
    /// so the caller decides when its subscriber handle is dropped.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(node_id);
            }
        }

        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }

        Some(node)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// The scheduling position of a node, if it still exists.
    pub fn run_key(&self, node_id: NodeId) -> Option<RunKey> {
        self.nodes.get(&node_id).map(Node::run_key)
    }

    /// Check whether a node is still part of the graph.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    ///
    /// Both nodes must exist; edges to removed nodes are never created.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if dependency == dependent
            || !self.nodes.contains_key(&dependency)
            || !self.nodes.contains_key(&dependent)
        {
            return;
        }
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.add_dependency(dependency);
        }
    }

    /// Remove a dependency edge.
    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Replace the dependency set of `node_id` with exactly `reads`.
    ///
    /// Edges to nodes no longer read are dropped, new ones are added, and the
    /// resulting dependency order matches the read order. Returns `false` if
    /// the node is gone (a disposed computation must not re-subscribe).
    pub fn replace_dependencies(&mut self, node_id: NodeId, reads: &IndexSet<NodeId>) -> bool {
        let previous = match self.nodes.get(&node_id) {
            Some(node) => node.dependencies().clone(),
            None => return false,
        };

        for stale in previous.iter().filter(|dep| !reads.contains(*dep)) {
            self.remove_edge(*stale, node_id);
        }

        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.clear_dependencies();
        }
        for dep in reads {
            self.add_edge(*dep, node_id);
        }

        true
    }

    /// Mark a source node as changed and propagate dirty flags.
    ///
    /// Direct dependents become `Dirty`; everything reachable through derived
    /// nodes becomes `MaybeDirty`. Returns every effect reached, which the
    /// scheduler queues.
    pub fn mark_changed(&mut self, source_id: NodeId) -> ReachedEffects {
        let mut effects = ReachedEffects::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        let direct: Vec<NodeId> = match self.nodes.get(&source_id) {
            Some(source) => source.dependents().iter().copied().collect(),
            None => return effects,
        };

        for dependent_id in direct {
            if let Some(node) = self.nodes.get_mut(&dependent_id) {
                node.mark_dirty();
                queue.push_back(dependent_id);
            }
        }

        // BFS to propagate maybe-dirty status
        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }

            let Some(node) = self.nodes.get(&node_id) else {
                continue;
            };

            match node.kind() {
                NodeKind::Effect => effects.push(node_id),
                NodeKind::Derived => {
                    let dependents: Vec<NodeId> = node.dependents().iter().copied().collect();
                    for dependent_id in dependents {
                        if let Some(dependent) = self.nodes.get_mut(&dependent_id) {
                            dependent.mark_maybe_dirty();
                            queue.push_back(dependent_id);
                        }
                    }
                }
                NodeKind::Source => {}
            }
        }

        effects
    }

    /// A derived node produced a new value: its dependents that were only
    /// `MaybeDirty` now definitely need to re-run.
    ///
    /// Clean dependents are left alone; they are either running right now
    /// (and will read the fresh value) or no longer reachable from a change.
    pub fn confirm_dependents_dirty(&mut self, node_id: NodeId) {
        let dependents: Vec<NodeId> = match self.nodes.get(&node_id) {
            Some(node) => node.dependents().iter().copied().collect(),
            None => return,
        };

        for dependent_id in dependents {
            if let Some(dependent) = self.nodes.get_mut(&dependent_id) {
                if dependent.dirty_state() == DirtyState::MaybeDirty {
                    dependent.mark_dirty();
                }
            }
        }
    }

    /// Get the dirty state of a node.
    pub fn dirty_state(&self, node_id: NodeId) -> Option<DirtyState> {
        self.nodes.get(&node_id).map(Node::dirty_state)
    }

    /// Iterate over all nodes in creation order.
    pub fn nodes_in_order(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.values().collect();
        nodes.sort_by_key(|node| node.id());
        nodes
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
