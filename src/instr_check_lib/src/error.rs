//! Error types shared by all modules of the crate.

use crate::abstract_domain::BitWidth;
use crate::location::Location;
use thiserror::Error;

/// Errors that can occur while building, parsing or querying abstract states.
///
/// A mismatch between an observed and an expected state is *not* an error:
/// it is the regular failure mode of a scenario check and is reported as a
/// structured diff (see the [`comparison`](crate::comparison) module).
/// Likewise, a dereference of a *bottom* pointer is a modeled
/// program-semantics outcome (zero successors), not an error.
#[derive(Debug, Error)]
pub enum StateError {
    /// An initial-state or analyzer-result description could not be parsed.
    /// Fatal to the single scenario, not to the whole test run.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// A lookup referenced a location that the state does not map.
    /// This indicates a broken test setup.
    #[error("no value recorded at location {0}")]
    MissingLocation(Location),
    /// An assigned cell's width disagrees with the canonical width of its
    /// location. Rejected at assignment time.
    #[error("width mismatch at {location}: the location holds {expected} values, got {found}")]
    WidthMismatch {
        /// The location the cell was assigned to.
        location: Location,
        /// The canonical width of the location.
        expected: BitWidth,
        /// The width of the rejected cell.
        found: BitWidth,
    },
    /// The oracle needed a concrete address but the pointer cell contains
    /// unknown or bottom bits, e.g. a push with an unconstrained stack
    /// pointer. Distinct from [`StateError::MissingLocation`]: the location
    /// to read or write could not even be determined.
    #[error("pointer at {location} has no concrete value")]
    UnresolvedPointer {
        /// The location holding the non-concrete pointer cell.
        location: Location,
    },
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> StateError {
        StateError::MalformedInput(err.to_string())
    }
}
