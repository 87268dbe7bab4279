//! Reference formulas recomputing condition flags from an instruction
//! result.
//!
//! All formulas operate on the known value bits of the result alone: a
//! result containing top bits is treated as not provably zero, negative,
//! etc. The produced flag cells are concrete and untainted.

use crate::abstract_domain::{AbstractCell, BitWidth};

fn flag_cell(bit: u64) -> AbstractCell {
    AbstractCell::new(BitWidth::new(1), bit)
}

/// `ZF = 1` iff the result is exactly zero in all bits.
///
/// A result with any top bit is not provably zero and yields `ZF = 0`.
pub fn zero_flag(result: &AbstractCell) -> AbstractCell {
    flag_cell((result.value() == 0 && result.value_top() == 0) as u64)
}

/// `SF = 1` iff the sign bit of the result is set.
pub fn sign_flag(result: &AbstractCell) -> AbstractCell {
    let sign_bit = result.width().as_u32() - 1;
    flag_cell((result.value() >> sign_bit) & 1)
}

/// `PF = 1` iff the number of set bits in the low byte of the result is
/// even.
pub fn parity_flag(result: &AbstractCell) -> AbstractCell {
    flag_cell(((result.value() & 0xff).count_ones() % 2 == 0) as u64)
}

/// `AF` as bit 2 of `result ^ op1 ^ op2`, the auxiliary carry out of the
/// low nibble for two-operand arithmetic.
pub fn aux_carry_flag(
    result: &AbstractCell,
    operand1: &AbstractCell,
    operand2: &AbstractCell,
) -> AbstractCell {
    flag_cell(((result.value() ^ operand1.value() ^ operand2.value()) >> 2) & 1)
}
