//! The control flow automaton produced by analyzing a piece of code.
//!
//! Nodes are abstract program points carrying an [`AbstractState`], edges are
//! instruction steps. For the single-instruction scenarios this crate
//! supports, every node has either zero successors (the instruction's
//! abstract effect is unreachable) or exactly one.

use crate::prelude::*;
use crate::state::{AbstractState, NodeId};
use fnv::FnvHashMap;
use petgraph::graph::{DiGraph, NodeIndex};


/// A graph of abstract program points with instruction-step edges.
///
/// Nodes are created once by the producing computation and never deleted.
#[derive(Debug, Clone)]
pub struct Cfa {
    graph: DiGraph<AbstractState, ()>,
    node_indices: FnvHashMap<NodeId, NodeIndex>,
}

impl Default for Cfa {
    fn default() -> Cfa {
        Cfa::new()
    }
}

impl Cfa {
    /// Create an empty control flow automaton.
    pub fn new() -> Cfa {
        Cfa {
            graph: DiGraph::new(),
            node_indices: FnvHashMap::default(),
        }
    }

    /// Add a program point to the automaton.
    ///
    /// Returns [`StateError::MalformedInput`] if a node with the same
    /// identifier already exists.
    pub fn add_node(&mut self, state: AbstractState) -> Result<NodeId, StateError> {
        let node_id = state.node_id();
        if self.node_indices.contains_key(&node_id) {
            return Err(StateError::MalformedInput(format!(
                "duplicate node id {node_id}"
            )));
        }
        let index = self.graph.add_node(state);
        self.node_indices.insert(node_id, index);
        Ok(node_id)
    }

    /// Add an instruction-step edge between two existing program points.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<(), StateError> {
        let from_index = self.index_of(from)?;
        let to_index = self.index_of(to)?;
        self.graph.add_edge(from_index, to_index, ());
        Ok(())
    }

    fn index_of(&self, node_id: NodeId) -> Result<NodeIndex, StateError> {
        self.node_indices
            .get(&node_id)
            .copied()
            .ok_or_else(|| StateError::MalformedInput(format!("unknown node id {node_id}")))
    }

    /// The state at the given program point, if it exists.
    pub fn get_node(&self, node_id: NodeId) -> Option<&AbstractState> {
        self.node_indices
            .get(&node_id)
            .map(|index| &self.graph[*index])
    }

    /// The first program point (in node insertion order) whose instruction
    /// pointer equals the given address.
    pub fn get_node_by_address(&self, address: u64) -> Option<&AbstractState> {
        self.graph
            .node_weights()
            .find(|state| state.address() == address)
    }

    /// The state at the entry program point (node id 0).
    pub fn entry(&self) -> Option<&AbstractState> {
        self.get_node(NodeId::ENTRY)
    }

    /// The successor program points of a node, in edge insertion order.
    pub fn successors(&self, node_id: NodeId) -> Vec<NodeId> {
        let Some(index) = self.node_indices.get(&node_id) else {
            return Vec::new();
        };
        // petgraph iterates neighbors newest edge first.
        let mut successors: Vec<NodeId> = self
            .graph
            .neighbors(*index)
            .map(|neighbor| self.graph[neighbor].node_id())
            .collect();
        successors.reverse();
        successors
    }

    /// The successor states of a node, in edge insertion order.
    pub fn next_states(&self, node_id: NodeId) -> Vec<&AbstractState> {
        self.successors(node_id)
            .into_iter()
            .filter_map(|successor| self.get_node(successor))
            .collect()
    }

    /// The number of program points in the automaton.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Iterate over all states in node insertion order.
    pub fn states(&self) -> impl Iterator<Item = &AbstractState> {
        self.graph.node_weights()
    }

    /// Iterate over all instruction-step edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.graph.edge_indices().filter_map(|edge| {
            let (from, to) = self.graph.edge_endpoints(edge)?;
            Some((self.graph[from].node_id(), self.graph[to].node_id()))
        })
    }
}
