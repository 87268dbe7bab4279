//! Addressable locations of the abstract machine.
//!
//! Locations are split into disjoint regions: registers, individually
//! addressed condition flags, stack memory and global memory. The region tag
//! is part of a location's identity, so `Stack(0x1000)` and `Global(0x1000)`
//! never alias even though their addresses coincide.

use crate::abstract_domain::BitWidth;
use crate::prelude::*;

/// The general purpose registers of the 32-bit x86 machine.
///
/// The discriminant order matches the hardware register numbering used in
/// ModRM encodings.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Register {
    /// Accumulator.
    Eax,
    /// Counter.
    Ecx,
    /// Data.
    Edx,
    /// Base.
    Ebx,
    /// Stack pointer.
    Esp,
    /// Base/frame pointer.
    Ebp,
    /// Source index.
    Esi,
    /// Destination index.
    Edi,
}

impl Register {
    /// All general purpose registers in hardware numbering order.
    pub const ALL: [Register; 8] = [
        Register::Eax,
        Register::Ecx,
        Register::Edx,
        Register::Ebx,
        Register::Esp,
        Register::Ebp,
        Register::Esi,
        Register::Edi,
    ];

    /// The canonical width of a general purpose register.
    pub fn width(&self) -> BitWidth {
        BitWidth::new(32)
    }

    /// The register number used in ModRM/SIB encodings.
    pub fn encoding_index(&self) -> u8 {
        *self as u8
    }

    /// The conventional lowercase register name.
    pub fn name(&self) -> &'static str {
        match self {
            Register::Eax => "eax",
            Register::Ecx => "ecx",
            Register::Edx => "edx",
            Register::Ebx => "ebx",
            Register::Esp => "esp",
            Register::Ebp => "ebp",
            Register::Esi => "esi",
            Register::Edi => "edi",
        }
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str(self.name())
    }
}

/// The condition flags of the x86 status register, addressed individually
/// as one-bit locations.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Flag {
    /// Carry flag.
    Cf,
    /// Parity flag.
    Pf,
    /// Auxiliary carry flag.
    Af,
    /// Zero flag.
    Zf,
    /// Sign flag.
    Sf,
    /// Overflow flag.
    Of,
}

impl Flag {
    /// All modeled condition flags.
    pub const ALL: [Flag; 6] = [Flag::Cf, Flag::Pf, Flag::Af, Flag::Zf, Flag::Sf, Flag::Of];

    /// The canonical width of a flag location.
    pub fn width(&self) -> BitWidth {
        BitWidth::new(1)
    }

    /// The conventional lowercase flag name.
    pub fn name(&self) -> &'static str {
        match self {
            Flag::Cf => "cf",
            Flag::Pf => "pf",
            Flag::Af => "af",
            Flag::Zf => "zf",
            Flag::Sf => "sf",
            Flag::Of => "of",
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str(self.name())
    }
}

/// An addressable location of the abstract machine state.
///
/// Stack and global memory are addressed by byte address inside their
/// respective region. Memory locations have no canonical width: the width of
/// a memory cell is determined by the store that created it.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Location {
    /// A general purpose register.
    Register(Register),
    /// A condition flag.
    Flag(Flag),
    /// A byte address inside the stack region.
    Stack(u64),
    /// A byte address inside the global memory region.
    Global(u64),
}

impl Location {
    /// The canonical width of the location, if it has one.
    ///
    /// Registers and flags have fixed widths that assignments are checked
    /// against. Memory locations return `None`.
    pub fn canonical_width(&self) -> Option<BitWidth> {
        match self {
            Location::Register(register) => Some(register.width()),
            Location::Flag(flag) => Some(flag.width()),
            Location::Stack(_) | Location::Global(_) => None,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Location::Register(register) => write!(formatter, "reg[{register}]"),
            Location::Flag(flag) => write!(formatter, "flag[{flag}]"),
            Location::Stack(address) => write!(formatter, "stack[{address:#x}]"),
            Location::Global(address) => write!(formatter, "global[{address:#x}]"),
        }
    }
}
