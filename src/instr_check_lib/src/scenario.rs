//! Checking one single-instruction scenario against the analyzer's output.
//!
//! A scenario owns a pre-state and an instruction. Checking it against a
//! parsed [`Cfa`] fetches the successor(s) of the entry node, lets the
//! oracle predict the expected outcome and compares the two. The result is
//! a [`Verdict`], never a panic: state mismatches are the regular failure
//! mode of a regression run and must not stop the remaining scenarios.

use crate::cfa::Cfa;
use crate::comparison::Disassembler;
use crate::oracle::{Instruction, Prediction};
use crate::prelude::*;
use crate::state::AbstractState;
use colored::Colorize;
use log::debug;

/// One single-instruction regression scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// The abstract state fed to the analyzer.
    pub pre_state: AbstractState,
    /// The instruction under test.
    pub instruction: Instruction,
}

/// The outcome of checking a scenario.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Observed and expected state agree on every constrained location.
    Matches,
    /// The observed successor state disagrees with the prediction.
    Mismatch {
        /// The per-location diff report, possibly preceded by a
        /// disassembly annotation.
        report: String,
    },
    /// The entry node has the wrong number of successors.
    UnexpectedSuccessorCount {
        /// The number of successors the oracle predicts.
        expected: usize,
        /// The number of successors the analyzer reported.
        found: usize,
    },
}

impl Verdict {
    /// Whether the scenario passed.
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Matches)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Verdict::Matches => write!(formatter, "{}", "OK".green()),
            Verdict::Mismatch { report } => {
                write!(formatter, "{}\n{report}", "STATE MISMATCH".red())
            }
            Verdict::UnexpectedSuccessorCount { expected, found } => write!(
                formatter,
                "{}: expected {expected} successor state(s), found {found}",
                "UNEXPECTED SUCCESSORS".red()
            ),
        }
    }
}

impl Scenario {
    /// Create a scenario from a pre-state and an instruction.
    pub fn new(pre_state: AbstractState, instruction: Instruction) -> Scenario {
        Scenario {
            pre_state,
            instruction,
        }
    }

    /// The raw instruction bytes handed to the external analyzer.
    pub fn bytes(&self) -> Vec<u8> {
        self.instruction.encode()
    }

    /// Check the analyzer's output for this scenario.
    ///
    /// `disassembler` may annotate mismatch reports; without one the
    /// annotation is simply empty. Errors are setup problems (missing
    /// locations, malformed output); a plain disagreement between observed
    /// and expected state is reported in the verdict instead.
    pub fn check(
        &self,
        cfa: &Cfa,
        disassembler: Option<&dyn Disassembler>,
    ) -> Result<Verdict, StateError> {
        debug!("checking scenario `{}`", self.instruction);
        let successors = cfa.next_states(self.pre_state.node_id());

        match self.instruction.predict(&self.pre_state)? {
            Prediction::Unreachable => {
                if successors.is_empty() {
                    Ok(Verdict::Matches)
                } else {
                    Ok(Verdict::UnexpectedSuccessorCount {
                        expected: 0,
                        found: successors.len(),
                    })
                }
            }
            Prediction::Successor(expected) => {
                let [observed] = successors.as_slice() else {
                    return Ok(Verdict::UnexpectedSuccessorCount {
                        expected: 1,
                        found: successors.len(),
                    });
                };
                let report = expected.diff_against(observed, "observed", "expected");
                if report.is_empty() {
                    Ok(Verdict::Matches)
                } else {
                    let annotation = disassembler
                        .and_then(|disassembler| disassembler.disassemble(&self.bytes()))
                        .map(|listing| format!("{listing}\n"))
                        .unwrap_or_default();
                    Ok(Verdict::Mismatch {
                        report: format!("{annotation}{report}"),
                    })
                }
            }
        }
    }
}
