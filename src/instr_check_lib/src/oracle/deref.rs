//! The reference pointer dereference policy used by the load forms of the
//! instruction catalogue.

use crate::prelude::*;
use crate::state::AbstractState;
use log::debug;

/// The memory region a pointer cell addresses.
///
/// Pointer cells do not carry a region themselves; the region follows from
/// the base register of the address computation. Addresses derived from the
/// stack pointer address stack memory, everything else addresses global
/// memory.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum PointerRegion {
    /// The stack memory region.
    Stack,
    /// The global memory region.
    Global,
}

impl PointerRegion {
    /// The region addressed by pointers computed from the given base
    /// register.
    pub fn of_base(base: Register) -> PointerRegion {
        if base == Register::Esp {
            PointerRegion::Stack
        } else {
            PointerRegion::Global
        }
    }

    /// The location addressed by a concrete pointer into this region.
    pub fn location(&self, address: u64) -> Location {
        match self {
            PointerRegion::Stack => Location::Stack(address),
            PointerRegion::Global => Location::Global(address),
        }
    }
}

/// The outcome of dereferencing an abstract pointer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Dereferenced {
    /// The pointer is bottom: the instruction's effect is unreachable and
    /// the analyzer must report zero successors for the node.
    Unreachable,
    /// The cell sequence read through the pointer.
    Cells(Vec<AbstractCell>),
}

/// Dereference the abstract pointer `pointer` into `region`, reading a value
/// of width `data_width` from `state`.
///
/// The policy, in order:
/// 1. A bottom pointer makes the instruction's effect unreachable; no cell
///    is produced.
/// 2. A pointer with any unknown address bit reads a single fully unknown
///    cell of the data width. The pointer's own taint information carries
///    over into the result.
/// 3. A concrete pointer reads the addressed location from the state. If the
///    pointer itself is tainted or has unknown taint status, the taint of
///    every resulting cell is forced to all ones; otherwise the cells are
///    returned unchanged, including their own taint.
pub fn dereference(
    state: &AbstractState,
    pointer: &AbstractCell,
    region: PointerRegion,
    data_width: BitWidth,
) -> Result<Dereferenced, StateError> {
    if pointer.is_bottom() {
        debug!("dereference of bottom pointer, effect is unreachable");
        return Ok(Dereferenced::Unreachable);
    }
    if pointer.value_top() != 0 {
        debug!(
            "dereference of pointer with unknown address bits {:#x}",
            pointer.value_top()
        );
        let unknown = AbstractCell::fully_unknown(data_width)
            .with_taint(pointer.taint())
            .with_taint_top(pointer.taint_top());
        return Ok(Dereferenced::Cells(vec![unknown]));
    }
    let location = region.location(pointer.value());
    let mut cells: Vec<AbstractCell> = state
        .get(&location)?
        .iter()
        .map(|cell| {
            if cell.width() > data_width {
                cell.truncate(data_width)
            } else {
                *cell
            }
        })
        .collect();
    if pointer.is_tainted() {
        for cell in &mut cells {
            *cell = cell.with_taint(data_width.mask());
        }
    }
    Ok(Dereferenced::Cells(cells))
}
