//! Host-level errors
//!
//! These are mistakes made by whoever sets up the engine (bad config, bad
//! instruction names). Failures made by the organism itself are faults,
//! see [`crate::fault`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value is out of range or inconsistent with another value
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstSetError {
    /// Name not present in the instruction library
    #[error("unknown instruction `{0}`")]
    UnknownInstruction(String),

    #[error("instruction set is empty")]
    Empty,

    /// Opcodes are one byte and 255 is reserved for the error instruction
    #[error("instruction set has {0} entries, at most 255 allowed")]
    TooLarge(usize),

    /// Label nops must occupy the lowest opcodes
    #[error("nop `{0}` appears after a non-nop instruction")]
    NopsNotFirst(String),

    #[error("invalid label `{0}`")]
    InvalidLabel(String),
}
