//! Code labels: runs of nop modifiers used as addresses and small values
//!
//! A label is read from the nops that follow an instruction. Jumps and
//! searches look for the *complement* of a label, which is the label with
//! every modifier rotated by a fixed amount.

use crate::error::InstSetError;
use std::fmt;
use std::str::FromStr;

/// Longest label that will be recorded; extra nops are ignored.
pub const MAX_LABEL_SIZE: usize = 10;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CodeLabel {
    nops: Vec<u8>,
}

impl CodeLabel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nops(nops: &[u8]) -> Self {
        let mut label = Self::new();
        for &n in nops {
            label.add_nop(n);
        }
        label
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nops.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> u8 {
        self.nops[i]
    }

    pub fn nops(&self) -> &[u8] {
        &self.nops
    }

    pub fn clear(&mut self) {
        self.nops.clear();
    }

    /// Append a modifier; silently dropped once the label is full.
    pub fn add_nop(&mut self, nop: u8) {
        if self.nops.len() < MAX_LABEL_SIZE {
            self.nops.push(nop);
        }
    }

    /// Replace every modifier `v` by `(v + rot) % base`.
    pub fn rotate(&mut self, rot: u8, base: usize) {
        for n in self.nops.iter_mut() {
            *n = ((*n as usize + rot as usize) % base) as u8;
        }
    }

    /// Read the label as a base-`base` number, first nop most significant.
    pub fn as_int(&self, base: usize) -> i32 {
        self.nops
            .iter()
            .fold(0i32, |acc, &n| acc.wrapping_mul(base as i32).wrapping_add(n as i32))
    }
}

impl fmt::Display for CodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &n in &self.nops {
            write!(f, "{}", (b'A' + n) as char)?;
        }
        Ok(())
    }
}

impl FromStr for CodeLabel {
    type Err = InstSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut label = CodeLabel::new();
        for c in s.chars() {
            if !c.is_ascii_uppercase() {
                return Err(InstSetError::InvalidLabel(s.to_string()));
            }
            label.add_nop(c as u8 - b'A');
        }
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_complement() {
        // nop-A -> nop-B -> nop-C -> nop-A with three nops
        let mut label = CodeLabel::from_nops(&[0, 1, 2]);
        label.rotate(1, 3);
        assert_eq!(label.nops(), &[1, 2, 0]);

        // Rotating base times is the identity
        label.rotate(1, 3);
        label.rotate(1, 3);
        assert_eq!(label.nops(), &[0, 1, 2]);
    }

    #[test]
    fn test_as_int() {
        let label = CodeLabel::from_nops(&[1, 0, 2]);
        assert_eq!(label.as_int(3), 9 + 2);
        assert_eq!(CodeLabel::new().as_int(4), 0);
    }

    #[test]
    fn test_max_size() {
        let mut label = CodeLabel::new();
        for _ in 0..20 {
            label.add_nop(1);
        }
        assert_eq!(label.len(), MAX_LABEL_SIZE);
    }

    #[test]
    fn test_parse_and_display() {
        let label: CodeLabel = "CAB".parse().unwrap();
        assert_eq!(label.nops(), &[2, 0, 1]);
        assert_eq!(label.to_string(), "CAB");
        assert!("c1".parse::<CodeLabel>().is_err());
    }
}
