//! The value/taint abstract domain.
//!
//! The domain tracks, per bit of a fixed-width cell, whether the concrete
//! value of the bit is known and whether the bit carries taint. A separate
//! *bottom* marker signals that no concretization is possible at all, i.e.
//! that the value belongs to an unreachable state.

use crate::prelude::*;

mod cell;
pub use cell::AbstractCell;

/// The width of an abstract cell in bits.
///
/// Cells of different widths live in different domains and cannot be
/// combined. All bitmask fields of a cell are kept masked to its width.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct BitWidth(u32);

impl BitWidth {
    /// Create a new bit width. Panics for widths of 0 or above 64 bits.
    pub fn new(bits: u32) -> BitWidth {
        assert!(bits >= 1 && bits <= 64, "unsupported bit width {bits}");
        BitWidth(bits)
    }

    /// The width as a plain number of bits.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// A bitmask with exactly the low `self` bits set.
    pub fn mask(&self) -> u64 {
        if self.0 == 64 {
            u64::MAX
        } else {
            (1u64 << self.0) - 1
        }
    }
}

impl std::fmt::Display for BitWidth {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "u{}", self.0)
    }
}

impl From<u32> for BitWidth {
    fn from(bits: u32) -> BitWidth {
        BitWidth::new(bits)
    }
}
