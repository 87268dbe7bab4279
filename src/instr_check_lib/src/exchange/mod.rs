//! (De)serialization of the state and CFA descriptions exchanged with the
//! external analyzer.
//!
//! The analyzer consumes a textual initial-state description and produces a
//! textual description of the resulting control flow automaton. This module
//! owns the descriptor structs mirroring those documents and the conversions
//! into the internal model. Parse failures are reported as
//! [`StateError::MalformedInput`] and abort the single scenario, not the
//! whole test run.

use crate::cfa::Cfa;
use crate::prelude::*;
use crate::state::{AbstractState, NodeId};
use log::debug;

#[cfg(test)]
mod tests;

/// The raw fields of one abstract cell.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct CellDescriptor {
    /// The cell width in bits.
    pub width: u32,
    /// The known value bits.
    pub value: u64,
    /// Per-bit mask of unknown value bits.
    #[serde(default)]
    pub value_top: u64,
    /// Whether the cell is bottom.
    #[serde(default)]
    pub value_bottom: bool,
    /// Per-bit taint mask.
    #[serde(default)]
    pub taint: u64,
    /// Per-bit mask of unknown taint bits.
    #[serde(default)]
    pub taint_top: u64,
}

impl From<&AbstractCell> for CellDescriptor {
    fn from(cell: &AbstractCell) -> CellDescriptor {
        CellDescriptor {
            width: cell.width().as_u32(),
            value: cell.value(),
            value_top: cell.value_top(),
            value_bottom: cell.is_bottom(),
            taint: cell.taint(),
            taint_top: cell.taint_top(),
        }
    }
}

impl From<&CellDescriptor> for AbstractCell {
    fn from(descriptor: &CellDescriptor) -> AbstractCell {
        AbstractCell::from_parts(
            BitWidth::new(descriptor.width),
            descriptor.value,
            descriptor.value_top,
            descriptor.value_bottom,
            descriptor.taint,
            descriptor.taint_top,
        )
    }
}

/// The cell sequence recorded for one location.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct LocationEntry {
    /// The addressed location, region tag included.
    pub location: Location,
    /// The ordered cell sequence held by the location.
    pub cells: Vec<CellDescriptor>,
}

/// The description of one abstract state.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct StateDescriptor {
    /// The node identifier of the program point.
    pub node_id: u64,
    /// The instruction pointer address of the program point.
    pub address: u64,
    /// The recorded locations, one entry per location.
    #[serde(default)]
    pub locations: Vec<LocationEntry>,
}

impl From<&AbstractState> for StateDescriptor {
    fn from(state: &AbstractState) -> StateDescriptor {
        StateDescriptor {
            node_id: state.node_id().as_u64(),
            address: state.address(),
            locations: state
                .iter()
                .map(|(location, cells)| LocationEntry {
                    location: *location,
                    cells: cells.iter().map(CellDescriptor::from).collect(),
                })
                .collect(),
        }
    }
}

impl TryFrom<&StateDescriptor> for AbstractState {
    type Error = StateError;

    fn try_from(descriptor: &StateDescriptor) -> Result<AbstractState, StateError> {
        let mut state = AbstractState::new(NodeId::new(descriptor.node_id), descriptor.address);
        for entry in &descriptor.locations {
            let cells = entry.cells.iter().map(AbstractCell::from).collect();
            state.set_cells(entry.location, cells)?;
        }
        Ok(state)
    }
}

/// The description of a control flow automaton: its program points and the
/// instruction-step edges between them.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
pub struct CfaDescriptor {
    /// The program points of the automaton.
    pub nodes: Vec<StateDescriptor>,
    /// Directed edges as `(from, to)` node id pairs, in step order.
    #[serde(default)]
    pub edges: Vec<(u64, u64)>,
}

/// Parse an initial-state description.
pub fn parse_state(text: &str) -> Result<AbstractState, StateError> {
    let descriptor: StateDescriptor = serde_json::from_str(text)?;
    AbstractState::try_from(&descriptor)
}

/// Serialize a state into the exchange representation.
pub fn serialize_state(state: &AbstractState) -> Result<String, StateError> {
    Ok(serde_json::to_string_pretty(&StateDescriptor::from(state))?)
}

/// Parse an analyzer result description into a [`Cfa`].
pub fn parse_cfa(text: &str) -> Result<Cfa, StateError> {
    let descriptor: CfaDescriptor = serde_json::from_str(text)?;
    let mut cfa = Cfa::new();
    for node in &descriptor.nodes {
        cfa.add_node(AbstractState::try_from(node)?)?;
    }
    for (from, to) in &descriptor.edges {
        cfa.add_edge(NodeId::new(*from), NodeId::new(*to))?;
    }
    debug!(
        "parsed control flow automaton with {} nodes and {} edges",
        descriptor.nodes.len(),
        descriptor.edges.len()
    );
    Ok(cfa)
}

/// Serialize a [`Cfa`] into the exchange representation.
pub fn serialize_cfa(cfa: &Cfa) -> Result<String, StateError> {
    let descriptor = CfaDescriptor {
        nodes: cfa.states().map(StateDescriptor::from).collect(),
        edges: cfa
            .edges()
            .map(|(from, to)| (from.as_u64(), to.as_u64()))
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&descriptor)?)
}
