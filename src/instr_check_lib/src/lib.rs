/*!
The main library for regression testing a binary-code static analyzer at the
granularity of single x86 instructions.

# What is instr_check

The analyzer under test computes, per instruction, an abstract machine state
combining a value domain with per-bit *unknown* (top) and *unreachable*
(bottom) markers and an independent taint domain tracking data provenance.
This library contains everything needed to verify such an analyzer without
reimplementing it:

* the value/taint domain itself ([`abstract_domain`]),
* an addressing model over registers, flags, stack and global memory that
  never aliases across regions ([`location`]),
* the abstract state container and the control flow automaton of program
  points the analyzer emits ([`state`], [`cfa`]),
* an independent oracle predicting the expected successor state for a fixed
  catalogue of instruction forms ([`oracle`]),
* an exact equality/diff engine for comparing observed against expected
  states ([`comparison`]),
* the scenario runner tying the pieces together ([`scenario`]) and the
  (de)serialization of the documents exchanged with the analyzer
  ([`exchange`]).

Invoking the analyzer itself (process execution, file handling) and
disassembling instruction bytes for diagnostics are boundaries owned by the
surrounding harness; the [`comparison::Disassembler`] trait is the only hook
the core offers for the latter.

# Usage

A typical scenario check looks like this:

```
use instr_check_lib::abstract_domain::{AbstractCell, BitWidth};
use instr_check_lib::location::{Flag, Location, Register};
use instr_check_lib::oracle::Instruction;
use instr_check_lib::scenario::Scenario;
use instr_check_lib::state::{AbstractState, NodeId};

let mut pre_state = AbstractState::new(NodeId::ENTRY, 0x1000);
for register in Register::ALL {
    pre_state.set_cell(
        Location::Register(register),
        AbstractCell::new(BitWidth::new(32), 0x42),
    )?;
}
for flag in Flag::ALL {
    pre_state.set_cell(Location::Flag(flag), AbstractCell::new(BitWidth::new(1), 0))?;
}

let scenario = Scenario::new(pre_state, Instruction::Inc(Register::Eax));
assert_eq!(scenario.bytes(), vec![0x40]);
// Hand the bytes and the serialized pre-state to the analyzer, parse its
// output with `exchange::parse_cfa` and call `scenario.check`.
# Ok::<(), instr_check_lib::error::StateError>(())
```
*/

pub mod abstract_domain;
pub mod cfa;
pub mod comparison;
pub mod error;
pub mod exchange;
pub mod location;
pub mod oracle;
pub mod scenario;
pub mod state;

mod prelude {
    pub use serde::{Deserialize, Serialize};

    pub use crate::abstract_domain::{AbstractCell, BitWidth};
    pub use crate::error::StateError;
    pub use crate::location::{Flag, Location, Register};
}
