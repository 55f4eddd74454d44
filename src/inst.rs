//! Instructions and per-position execution flags
//!
//! An instruction is a single opcode byte. Which byte means what depends on
//! the instruction set the genome was built against (see `inst_lib`).
//! Flags live in the genome buffer next to each slot, not in the opcode.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single opcode, indexing into an [`InstSet`](crate::inst_lib::InstSet).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instruction(pub u8);

impl Instruction {
    /// Returned when reading past the end of memory. Never a nop, never in a set.
    pub const ERROR: Instruction = Instruction(255);

    #[inline]
    pub fn new(op: u8) -> Self {
        Self(op)
    }

    #[inline]
    pub fn op(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn is_error(self) -> bool {
        self == Self::ERROR
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Execution history of one memory slot.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct InstFlags: u8 {
        /// Written by a copy instruction
        const COPIED = 0x01;
        /// Changed by any mutation
        const MUTATED = 0x02;
        /// Executed (or consumed as a modifier) at least once
        const EXECUTED = 0x04;
        const BREAKPOINT = 0x08;
        /// Changed by a point mutation on divide
        const POINT_MUT = 0x10;
        /// Changed by a copy mutation
        const COPY_MUT = 0x20;
        /// Arrived through injection from another organism
        const INJECTED = 0x40;
    }
}
