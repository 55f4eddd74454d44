//! Genome buffer: a resizable run of instructions with per-slot flags
//!
//! Heads are plain indices into a buffer and are never updated by it; any
//! resize must be followed by an explicit head adjustment in the engine.

use crate::inst::{InstFlags, Instruction};
use std::ops::Range;

/// Ordered instruction memory with execution-history flags per slot.
#[derive(Clone, Debug, Default)]
pub struct GenomeBuffer {
    insts: Vec<Instruction>,
    flags: Vec<InstFlags>,
    /// Tail contents dropped by the last shrink, reused by necro allocation
    freed: Vec<Instruction>,
}

impl GenomeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a buffer from a genome sequence with all flags clear.
    pub fn from_sequence(seq: &[Instruction]) -> Self {
        Self {
            insts: seq.to_vec(),
            flags: vec![InstFlags::empty(); seq.len()],
            freed: Vec::new(),
        }
    }

    pub fn filled(len: usize, fill: Instruction) -> Self {
        Self::from_sequence(&vec![fill; len])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    #[inline]
    pub fn get(&self, pos: usize) -> Instruction {
        self.insts[pos]
    }

    #[inline]
    pub fn set(&mut self, pos: usize, inst: Instruction) {
        self.insts[pos] = inst;
    }

    #[inline]
    pub fn flags(&self, pos: usize) -> InstFlags {
        self.flags[pos]
    }

    #[inline]
    pub fn has_flag(&self, pos: usize, flag: InstFlags) -> bool {
        self.flags[pos].contains(flag)
    }

    #[inline]
    pub fn set_flag(&mut self, pos: usize, flag: InstFlags) {
        self.flags[pos].insert(flag);
    }

    #[inline]
    pub fn clear_flag(&mut self, pos: usize, flag: InstFlags) {
        self.flags[pos].remove(flag);
    }

    pub fn clear_all_flags(&mut self) {
        self.flags.iter_mut().for_each(|f| *f = InstFlags::empty());
    }

    /// Copy one slot (instruction and flags) onto another.
    pub fn copy_slot(&mut self, dst: usize, src: usize) {
        self.insts[dst] = self.insts[src];
        self.flags[dst] = self.flags[src];
    }

    pub fn sequence(&self) -> &[Instruction] {
        &self.insts
    }

    pub fn to_sequence(&self) -> Vec<Instruction> {
        self.insts.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = Instruction> + '_ {
        self.insts.iter().copied()
    }

    /// True when the instructions (flags ignored) equal `seq`.
    pub fn same_sequence(&self, seq: &[Instruction]) -> bool {
        self.insts.as_slice() == seq
    }

    pub fn insert(&mut self, pos: usize, inst: Instruction) {
        self.insts.insert(pos, inst);
        self.flags.insert(pos, InstFlags::empty());
    }

    pub fn insert_slice(&mut self, pos: usize, seq: &[Instruction]) {
        self.insts.splice(pos..pos, seq.iter().copied());
        self.flags
            .splice(pos..pos, std::iter::repeat(InstFlags::empty()).take(seq.len()));
    }

    /// Remove `count` slots starting at `pos`. Clamped to the buffer end.
    pub fn remove(&mut self, pos: usize, count: usize) {
        let end = (pos + count).min(self.len());
        if pos >= end {
            return;
        }
        self.insts.drain(pos..end);
        self.flags.drain(pos..end);
    }

    /// Copy `[start, end)` out as a new buffer, flags included.
    pub fn crop(&self, start: usize, end: usize) -> GenomeBuffer {
        let end = end.min(self.len());
        let start = start.min(end);
        GenomeBuffer {
            insts: self.insts[start..end].to_vec(),
            flags: self.flags[start..end].to_vec(),
            freed: Vec::new(),
        }
    }

    /// Grow or shrink to `new_len`. New slots hold `fill` with clear flags;
    /// a shrink remembers the dropped tail for necro allocation.
    pub fn resize(&mut self, new_len: usize, fill: Instruction) {
        if new_len < self.len() {
            self.freed = self.insts[new_len..].to_vec();
        }
        self.insts.resize(new_len, fill);
        self.flags.resize(new_len, InstFlags::empty());
    }

    /// Grow back over previously freed memory. Returns how many of the new
    /// slots were recovered; any remainder is filled with `fill`.
    pub fn resize_old(&mut self, new_len: usize, fill: Instruction) -> usize {
        let old_len = self.len();
        if new_len <= old_len {
            self.resize(new_len, fill);
            return 0;
        }
        let wanted = new_len - old_len;
        let recovered = wanted.min(self.freed.len());
        let tail: Vec<Instruction> = self.freed.drain(..recovered).collect();
        self.insts.extend(tail);
        self.insts.resize(new_len, fill);
        self.flags.resize(new_len, InstFlags::empty());
        recovered
    }

    pub fn count_flagged(&self, range: Range<usize>, flag: InstFlags) -> usize {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        self.flags[start..end].iter().filter(|f| f.contains(flag)).count()
    }
}

impl PartialEq for GenomeBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.insts == other.insts
    }
}

impl Eq for GenomeBuffer {}

impl From<&[Instruction]> for GenomeBuffer {
    fn from(seq: &[Instruction]) -> Self {
        Self::from_sequence(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(ops: &[u8]) -> Vec<Instruction> {
        ops.iter().map(|&o| Instruction(o)).collect()
    }

    #[test]
    fn test_insert_remove_keep_flags_aligned() {
        let mut buf = GenomeBuffer::from_sequence(&seq(&[1, 2, 3, 4]));
        buf.set_flag(2, InstFlags::EXECUTED);

        buf.insert(0, Instruction(9));
        assert_eq!(buf.sequence(), seq(&[9, 1, 2, 3, 4]).as_slice());
        // Flag travels with the slot
        assert!(buf.has_flag(3, InstFlags::EXECUTED));
        assert!(!buf.has_flag(0, InstFlags::EXECUTED));

        buf.remove(1, 2);
        assert_eq!(buf.sequence(), seq(&[9, 3, 4]).as_slice());
        assert!(buf.has_flag(1, InstFlags::EXECUTED));

        buf.insert_slice(1, &seq(&[7, 7]));
        assert_eq!(buf.len(), 5);
        assert!(buf.has_flag(3, InstFlags::EXECUTED));
    }

    #[test]
    fn test_remove_is_clamped() {
        let mut buf = GenomeBuffer::from_sequence(&seq(&[1, 2, 3]));
        buf.remove(2, 10);
        assert_eq!(buf.sequence(), seq(&[1, 2]).as_slice());
        buf.remove(5, 1);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_crop_copies_flags() {
        let mut buf = GenomeBuffer::from_sequence(&seq(&[1, 2, 3, 4, 5]));
        buf.set_flag(3, InstFlags::COPIED);
        let child = buf.crop(2, 5);
        assert_eq!(child.sequence(), seq(&[3, 4, 5]).as_slice());
        assert!(child.has_flag(1, InstFlags::COPIED));
    }

    #[test]
    fn test_resize_old_recovers_freed_tail() {
        let mut buf = GenomeBuffer::from_sequence(&seq(&[1, 2, 3, 4, 5]));
        buf.resize(2, Instruction(0));
        assert_eq!(buf.sequence(), seq(&[1, 2]).as_slice());

        // Grow past the freed region: 3 recovered, 2 filled
        let recovered = buf.resize_old(7, Instruction(0));
        assert_eq!(recovered, 3);
        assert_eq!(buf.sequence(), seq(&[1, 2, 3, 4, 5, 0, 0]).as_slice());
    }

    #[test]
    fn test_count_flagged() {
        let mut buf = GenomeBuffer::filled(6, Instruction(0));
        buf.set_flag(0, InstFlags::EXECUTED);
        buf.set_flag(4, InstFlags::EXECUTED);
        buf.set_flag(5, InstFlags::COPIED);
        assert_eq!(buf.count_flagged(0..6, InstFlags::EXECUTED), 2);
        assert_eq!(buf.count_flagged(0..4, InstFlags::EXECUTED), 1);
        assert_eq!(buf.count_flagged(3..100, InstFlags::COPIED), 1);
    }
}
