//! Exact structural comparison of abstract states and human-readable
//! mismatch reporting.

use crate::prelude::*;
use crate::state::AbstractState;
use itertools::Itertools;
use std::collections::BTreeSet;

/// A source of disassembly annotations for diff reports.
///
/// The core never disassembles instruction bytes itself; a harness may plug
/// in an external disassembler to make reports easier to read. A missing
/// disassembler (or a failing one) degrades to an empty annotation and never
/// affects the comparison itself.
pub trait Disassembler {
    /// Return a human-readable rendering of the given instruction bytes,
    /// or `None` if the bytes cannot be disassembled.
    fn disassemble(&self, bytes: &[u8]) -> Option<String>;
}

/// Check whether two states map every touched location to pairwise equal
/// cell sequences.
///
/// Cell equality is exact and structural, width included; a cell whose top
/// bits cover another's concrete bits is *not* equal to it. Node ids and
/// addresses are bookkeeping and do not take part in the comparison.
pub fn states_equal(left: &AbstractState, right: &AbstractState) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right.iter())
            .all(|((left_location, left_cells), (right_location, right_cells))| {
                left_location == right_location && left_cells == right_cells
            })
}

/// Produce a report line for every location where the two states disagree.
///
/// Returns the empty string iff the states are equal. The report never
/// raises on mismatch; a state mismatch is the regular failure mode of a
/// scenario check, not an exceptional condition.
pub fn diff(
    left: &AbstractState,
    right: &AbstractState,
    left_label: &str,
    right_label: &str,
) -> String {
    diff_filtered(left, right, left_label, right_label, &BTreeSet::new())
}

/// Like [`diff`], but skipping a set of locations that the comparison must
/// not constrain (e.g. flags the oracle declines to compute).
pub fn diff_filtered(
    left: &AbstractState,
    right: &AbstractState,
    left_label: &str,
    right_label: &str,
    ignored: &BTreeSet<Location>,
) -> String {
    itertools::merge(left.locations(), right.locations())
        .dedup()
        .filter(|location| !ignored.contains(*location))
        .filter_map(|location| {
            let left_cells = left.try_get(location);
            let right_cells = right.try_get(location);
            if left_cells == right_cells {
                return None;
            }
            Some(format!(
                "at {location}: {left_label} = {} | {right_label} = {}",
                format_cells(left_cells),
                format_cells(right_cells),
            ))
        })
        .join("\n")
}

/// Render a cell sequence for a diff report line.
fn format_cells(cells: Option<&[AbstractCell]>) -> String {
    match cells {
        None => "<absent>".to_string(),
        Some(cells) => format!("[{}]", cells.iter().map(AbstractCell::to_string).join(", ")),
    }
}
