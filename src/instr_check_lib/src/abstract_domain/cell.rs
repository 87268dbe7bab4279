use super::BitWidth;
use crate::prelude::*;

/// An abstract value of fixed bit-width combining a value domain and an
/// independent taint domain.
///
/// For every bit of the value, `value_top` records whether the concrete value
/// of that bit is unknown to the analysis. The `value_bottom` marker overrides
/// all other value content: it states that no concretization is possible,
/// i.e. that the cell belongs to an unreachable state. Taint is tracked per
/// bit in `taint`, with `taint_top` marking bits whose taint status is itself
/// unknown.
///
/// All bitmask fields are kept masked to the cell width. Cells are compared
/// by exact structural equality of all fields, width included; there is no
/// semantic subsumption between cells.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct AbstractCell {
    width: BitWidth,
    value: u64,
    value_top: u64,
    value_bottom: bool,
    taint: u64,
    taint_top: u64,
}

impl AbstractCell {
    /// Create a cell with a fully known, untainted value.
    pub fn new(width: BitWidth, value: u64) -> AbstractCell {
        AbstractCell {
            width,
            value: value & width.mask(),
            value_top: 0,
            value_bottom: false,
            taint: 0,
            taint_top: 0,
        }
    }

    /// Create a cell whose value is completely unknown (all bits top).
    pub fn fully_unknown(width: BitWidth) -> AbstractCell {
        AbstractCell {
            width,
            value: 0,
            value_top: width.mask(),
            value_bottom: false,
            taint: 0,
            taint_top: 0,
        }
    }

    /// Create the bottom cell of the given width.
    ///
    /// Bottom cells are kept in a canonical form with all other fields
    /// cleared, so that structural equality cannot distinguish two bottom
    /// cells of the same width.
    pub fn bottom(width: BitWidth) -> AbstractCell {
        AbstractCell {
            width,
            value: 0,
            value_top: 0,
            value_bottom: true,
            taint: 0,
            taint_top: 0,
        }
    }

    /// Create a cell from raw field values, normalizing bottom cells to their
    /// canonical form. Used when parsing external state descriptions.
    pub fn from_parts(
        width: BitWidth,
        value: u64,
        value_top: u64,
        value_bottom: bool,
        taint: u64,
        taint_top: u64,
    ) -> AbstractCell {
        if value_bottom {
            return AbstractCell::bottom(width);
        }
        AbstractCell::new(width, value)
            .with_value_top(value_top)
            .with_taint(taint)
            .with_taint_top(taint_top)
    }

    /// Return a copy of the cell with the given value-top mask.
    pub fn with_value_top(self, value_top: u64) -> AbstractCell {
        AbstractCell {
            value_top: value_top & self.width.mask(),
            ..self
        }
    }

    /// Return a copy of the cell with the given taint mask.
    pub fn with_taint(self, taint: u64) -> AbstractCell {
        AbstractCell {
            taint: taint & self.width.mask(),
            ..self
        }
    }

    /// Return a copy of the cell with the given taint-top mask.
    pub fn with_taint_top(self, taint_top: u64) -> AbstractCell {
        AbstractCell {
            taint_top: taint_top & self.width.mask(),
            ..self
        }
    }

    /// The width of the cell in bits.
    pub fn width(&self) -> BitWidth {
        self.width
    }

    /// The known value bits. Bits marked in [`AbstractCell::value_top`] are
    /// meaningless here and kept at zero by the combinators.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Per-bit mask of value bits unknown to the analysis.
    pub fn value_top(&self) -> u64 {
        self.value_top
    }

    /// Whether the cell is the bottom element (no concretization possible).
    pub fn is_bottom(&self) -> bool {
        self.value_bottom
    }

    /// Per-bit taint mask.
    pub fn taint(&self) -> u64 {
        self.taint
    }

    /// Per-bit mask of bits whose taint status is unknown.
    pub fn taint_top(&self) -> u64 {
        self.taint_top
    }

    /// Whether any bit of the cell carries taint or unknown taint status.
    pub fn is_tainted(&self) -> bool {
        self.taint != 0 || self.taint_top != 0
    }

    /// The concrete value of the cell, if it has one.
    ///
    /// Returns `None` for bottom cells and for cells with any unknown value
    /// bit. Taint does not affect concreteness.
    pub fn as_concrete(&self) -> Option<u64> {
        if self.value_bottom || self.value_top != 0 {
            None
        } else {
            Some(self.value)
        }
    }

    /// Bitwise union of the taint information of two cells.
    fn join_taint(&self, rhs: &AbstractCell) -> (u64, u64) {
        let mask = self.width.mask();
        (
            (self.taint | rhs.taint) & mask,
            (self.taint_top | rhs.taint_top) & mask,
        )
    }

    /// Add two cells of equal width, wrapping on overflow.
    ///
    /// Result bits below the lowest unknown input bit are computed exactly;
    /// all bits at or above it become unknown, since a carry out of an
    /// unknown bit can reach every higher bit. Taint is the union of the
    /// operand taints.
    pub fn add(&self, rhs: &AbstractCell) -> AbstractCell {
        assert_eq!(self.width, rhs.width);
        if self.value_bottom || rhs.value_bottom {
            return AbstractCell::bottom(self.width);
        }
        let mask = self.width.mask();
        let unknown = self.value_top | rhs.value_top;
        let (value, value_top) = if unknown == 0 {
            (self.value.wrapping_add(rhs.value) & mask, 0)
        } else {
            let known_low = (1u64 << unknown.trailing_zeros()) - 1;
            (
                (self.value & known_low).wrapping_add(rhs.value & known_low) & known_low,
                mask & !known_low,
            )
        };
        let (taint, taint_top) = self.join_taint(rhs);
        AbstractCell {
            width: self.width,
            value,
            value_top,
            value_bottom: false,
            taint,
            taint_top,
        }
    }

    /// Subtract `rhs` from `self`, wrapping on underflow.
    ///
    /// Same per-bit precision as [`AbstractCell::add`]: borrows only travel
    /// upwards, so bits below the lowest unknown input bit stay exact.
    pub fn sub(&self, rhs: &AbstractCell) -> AbstractCell {
        assert_eq!(self.width, rhs.width);
        if self.value_bottom || rhs.value_bottom {
            return AbstractCell::bottom(self.width);
        }
        let mask = self.width.mask();
        let unknown = self.value_top | rhs.value_top;
        let (value, value_top) = if unknown == 0 {
            (self.value.wrapping_sub(rhs.value) & mask, 0)
        } else {
            let known_low = (1u64 << unknown.trailing_zeros()) - 1;
            (
                (self.value & known_low).wrapping_sub(rhs.value & known_low) & known_low,
                mask & !known_low,
            )
        };
        let (taint, taint_top) = self.join_taint(rhs);
        AbstractCell {
            width: self.width,
            value,
            value_top,
            value_bottom: false,
            taint,
            taint_top,
        }
    }

    /// Bitwise AND of two cells of equal width.
    ///
    /// A result bit is known zero if either input bit is known zero, even if
    /// the other input bit is unknown.
    pub fn and(&self, rhs: &AbstractCell) -> AbstractCell {
        assert_eq!(self.width, rhs.width);
        if self.value_bottom || rhs.value_bottom {
            return AbstractCell::bottom(self.width);
        }
        let mask = self.width.mask();
        let known_zero =
            ((!self.value & !self.value_top) | (!rhs.value & !rhs.value_top)) & mask;
        let value_top = (self.value_top | rhs.value_top) & !known_zero;
        let value = self.value & rhs.value & !value_top;
        let (taint, taint_top) = self.join_taint(rhs);
        AbstractCell {
            width: self.width,
            value,
            value_top,
            value_bottom: false,
            taint,
            taint_top,
        }
    }

    /// Bitwise OR of two cells of equal width.
    ///
    /// A result bit is known one if either input bit is known one, even if
    /// the other input bit is unknown.
    pub fn or(&self, rhs: &AbstractCell) -> AbstractCell {
        assert_eq!(self.width, rhs.width);
        if self.value_bottom || rhs.value_bottom {
            return AbstractCell::bottom(self.width);
        }
        let mask = self.width.mask();
        let known_one =
            ((self.value & !self.value_top) | (rhs.value & !rhs.value_top)) & mask;
        let value_top = (self.value_top | rhs.value_top) & !known_one;
        let value = (self.value | rhs.value) & !value_top & mask;
        let (taint, taint_top) = self.join_taint(rhs);
        AbstractCell {
            width: self.width,
            value,
            value_top,
            value_bottom: false,
            taint,
            taint_top,
        }
    }

    /// Bitwise XOR of two cells of equal width.
    ///
    /// A result bit is unknown whenever either input bit is unknown.
    pub fn xor(&self, rhs: &AbstractCell) -> AbstractCell {
        assert_eq!(self.width, rhs.width);
        if self.value_bottom || rhs.value_bottom {
            return AbstractCell::bottom(self.width);
        }
        let mask = self.width.mask();
        let value_top = (self.value_top | rhs.value_top) & mask;
        let value = (self.value ^ rhs.value) & !value_top & mask;
        let (taint, taint_top) = self.join_taint(rhs);
        AbstractCell {
            width: self.width,
            value,
            value_top,
            value_bottom: false,
            taint,
            taint_top,
        }
    }

    /// Bitwise complement. Unknown bits stay unknown, taint is unchanged.
    pub fn not(&self) -> AbstractCell {
        if self.value_bottom {
            return *self;
        }
        AbstractCell {
            value: !self.value & self.width.mask() & !self.value_top,
            ..*self
        }
    }

    /// Two's complement negation.
    pub fn neg(&self) -> AbstractCell {
        self.not().add(&AbstractCell::new(self.width, 1))
    }

    /// Add a signed byte offset to the cell, e.g. for address displacement
    /// arithmetic.
    pub fn add_offset(&self, offset: i64) -> AbstractCell {
        if offset >= 0 {
            self.add(&AbstractCell::new(self.width, offset as u64))
        } else {
            self.sub(&AbstractCell::new(self.width, offset.unsigned_abs()))
        }
    }

    /// Truncate the cell to a smaller width, keeping the low bits of all
    /// per-bit masks.
    pub fn truncate(&self, width: BitWidth) -> AbstractCell {
        self.subpiece(0, width)
    }

    /// Extract `width` bits starting at bit `offset`, shifting all per-bit
    /// masks down accordingly.
    pub fn subpiece(&self, offset: u32, width: BitWidth) -> AbstractCell {
        assert!(offset + width.as_u32() <= self.width.as_u32());
        if self.value_bottom {
            return AbstractCell::bottom(width);
        }
        let mask = width.mask();
        AbstractCell {
            width,
            value: (self.value >> offset) & mask,
            value_top: (self.value_top >> offset) & mask,
            value_bottom: false,
            taint: (self.taint >> offset) & mask,
            taint_top: (self.taint_top >> offset) & mask,
        }
    }

    /// Replace `piece.width()` bits starting at bit `offset` with the given
    /// piece, all per-bit masks included. The bits outside the replaced
    /// range keep their value and taint information.
    pub fn splice(&self, offset: u32, piece: &AbstractCell) -> AbstractCell {
        assert!(offset + piece.width.as_u32() <= self.width.as_u32());
        if self.value_bottom || piece.value_bottom {
            return AbstractCell::bottom(self.width);
        }
        let keep = !(piece.width.mask() << offset) & self.width.mask();
        AbstractCell {
            width: self.width,
            value: (self.value & keep) | (piece.value << offset),
            value_top: (self.value_top & keep) | (piece.value_top << offset),
            value_bottom: false,
            taint: (self.taint & keep) | (piece.taint << offset),
            taint_top: (self.taint_top & keep) | (piece.taint_top << offset),
        }
    }

    /// Extend the cell to a larger width. The new high bits are known zero
    /// and untainted.
    pub fn zero_extend(&self, width: BitWidth) -> AbstractCell {
        assert!(width >= self.width);
        if self.value_bottom {
            return AbstractCell::bottom(width);
        }
        AbstractCell { width, ..*self }
    }
}

impl std::ops::Add for AbstractCell {
    type Output = AbstractCell;

    fn add(self, rhs: Self) -> AbstractCell {
        AbstractCell::add(&self, &rhs)
    }
}

impl std::ops::Sub for AbstractCell {
    type Output = AbstractCell;

    fn sub(self, rhs: Self) -> AbstractCell {
        AbstractCell::sub(&self, &rhs)
    }
}

impl std::ops::Neg for AbstractCell {
    type Output = AbstractCell;

    fn neg(self) -> AbstractCell {
        AbstractCell::neg(&self)
    }
}

impl std::ops::BitAnd for AbstractCell {
    type Output = AbstractCell;

    fn bitand(self, rhs: Self) -> AbstractCell {
        self.and(&rhs)
    }
}

impl std::ops::BitOr for AbstractCell {
    type Output = AbstractCell;

    fn bitor(self, rhs: Self) -> AbstractCell {
        self.or(&rhs)
    }
}

impl std::ops::BitXor for AbstractCell {
    type Output = AbstractCell;

    fn bitxor(self, rhs: Self) -> AbstractCell {
        self.xor(&rhs)
    }
}

impl std::fmt::Display for AbstractCell {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.value_bottom {
            return write!(formatter, "BOT:{}", self.width);
        }
        write!(formatter, "{:#x}:{}", self.value, self.width)?;
        if self.value_top != 0 {
            write!(formatter, "!{:#x}", self.value_top)?;
        }
        if self.taint != 0 {
            write!(formatter, "#{:#x}", self.taint)?;
        }
        if self.taint_top != 0 {
            write!(formatter, "?{:#x}", self.taint_top)?;
        }
        Ok(())
    }
}
