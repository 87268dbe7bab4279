//! The abstract machine state at a single program point.

use crate::prelude::*;
use std::collections::BTreeMap;


/// Identifier of a program point inside a [`Cfa`](crate::cfa::Cfa).
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// The entry node of every control flow automaton.
    pub const ENTRY: NodeId = NodeId(0);

    /// Create a node identifier from a raw number.
    pub fn new(id: u64) -> NodeId {
        NodeId(id)
    }

    /// The identifier as a raw number.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The identifier of the node created by the next deterministic
    /// instruction step.
    pub fn next(&self) -> NodeId {
        NodeId(self.0 + 1)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> NodeId {
        NodeId(id)
    }
}

/// The abstract machine state at one program point.
///
/// The state maps locations to ordered sequences of abstract cells. A
/// location may hold more than one cell at a time when the analyzer
/// represents it as a small disjunctive summary; the sequence order is
/// significant for comparison but carries no meaning beyond position.
///
/// States are snapshots: once a state takes part in a comparison it is never
/// mutated again. Derived states (e.g. the oracle's expected successor) are
/// built by cloning and updating the owned copy before it is published.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AbstractState {
    node_id: NodeId,
    address: u64,
    cells: BTreeMap<Location, Vec<AbstractCell>>,
}

impl AbstractState {
    /// Create an empty state for the given program point.
    pub fn new(node_id: NodeId, address: u64) -> AbstractState {
        AbstractState {
            node_id,
            address,
            cells: BTreeMap::new(),
        }
    }

    /// The identifier of the program point this state belongs to.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The instruction pointer address of the program point.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Advance the program point by one deterministic instruction step of
    /// the given byte length.
    pub fn advance(&mut self, instruction_len: u64) {
        self.node_id = self.node_id.next();
        self.address += instruction_len;
    }

    /// Assign a sequence of cells to a location, replacing any previous
    /// content.
    ///
    /// Returns [`StateError::WidthMismatch`] if the location has a canonical
    /// width and any of the cells disagrees with it.
    pub fn set_cells(
        &mut self,
        location: Location,
        cells: Vec<AbstractCell>,
    ) -> Result<(), StateError> {
        if let Some(expected) = location.canonical_width() {
            for cell in &cells {
                if cell.width() != expected {
                    return Err(StateError::WidthMismatch {
                        location,
                        expected,
                        found: cell.width(),
                    });
                }
            }
        }
        self.cells.insert(location, cells);
        Ok(())
    }

    /// Assign a single cell to a location, replacing any previous content.
    pub fn set_cell(&mut self, location: Location, cell: AbstractCell) -> Result<(), StateError> {
        self.set_cells(location, vec![cell])
    }

    /// The cell sequence at a location, if the state maps it.
    pub fn try_get(&self, location: &Location) -> Option<&[AbstractCell]> {
        self.cells.get(location).map(|cells| cells.as_slice())
    }

    /// The cell sequence at a location.
    ///
    /// Returns [`StateError::MissingLocation`] if the state does not map the
    /// location, which indicates a broken test setup.
    pub fn get(&self, location: &Location) -> Result<&[AbstractCell], StateError> {
        self.try_get(location)
            .ok_or(StateError::MissingLocation(*location))
    }

    /// The first cell at a location, for the common case of locations
    /// holding a single summary.
    pub fn get_single(&self, location: &Location) -> Result<&AbstractCell, StateError> {
        self.get(location)?
            .first()
            .ok_or(StateError::MissingLocation(*location))
    }

    /// Iterate over all mapped locations in their canonical order.
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.cells.keys()
    }

    /// Iterate over all location/cell-sequence pairs in canonical location
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = (&Location, &[AbstractCell])> {
        self.cells
            .iter()
            .map(|(location, cells)| (location, cells.as_slice()))
    }

    /// The number of mapped locations.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the state maps no location at all.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
