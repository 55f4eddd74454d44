//! Organism faults
//!
//! A fault records that an instruction could not complete. It is reported
//! to the organism and never propagated as a Rust error.

use std::fmt;
use thiserror::Error;

/// Subsystem the fault came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultLocation {
    Alloc,
    Divide,
    Jump,
    Inject,
    Math,
    ThreadFork,
    ThreadKill,
    Instruction,
}

impl fmt::Display for FaultLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultLocation::Alloc => "alloc",
            FaultLocation::Divide => "divide",
            FaultLocation::Jump => "jump",
            FaultLocation::Inject => "inject",
            FaultLocation::Math => "math",
            FaultLocation::ThreadFork => "thread-fork",
            FaultLocation::ThreadKill => "thread-kill",
            FaultLocation::Instruction => "instruction",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultKind {
    Error,
    Warning,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Error => f.write_str("error"),
            FaultKind::Warning => f.write_str("warning"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{location} {kind}: {message}")]
pub struct Fault {
    pub location: FaultLocation,
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn error(location: FaultLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            kind: FaultKind::Error,
            message: message.into(),
        }
    }

    pub fn warning(location: FaultLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            kind: FaultKind::Warning,
            message: message.into(),
        }
    }
}
