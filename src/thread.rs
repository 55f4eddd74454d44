//! Threads: one cooperative execution context each
//!
//! A thread owns its registers, heads, local stacks and label scratch. Memory
//! and the global stack belong to the engine.

use crate::head::{Head, HeadId, NUM_HEADS};
use crate::label::CodeLabel;
use crate::stack::CpuStack;

/// Register file size; variants use a prefix of it.
pub const MAX_REGISTERS: usize = 4;

#[derive(Clone, Debug, PartialEq)]
pub struct Thread {
    pub id: usize,
    pub regs: [i32; MAX_REGISTERS],
    pub heads: [Head; NUM_HEADS],
    pub local_stacks: Vec<CpuStack>,
    /// Stack selected by `push`/`pop`; past the local stacks means global
    pub cur_stack: usize,
    pub cur_head: HeadId,
    pub read_label: CodeLabel,
    pub next_label: CodeLabel,
    /// Not running threads keep their slot but are skipped by the scheduler
    pub running: bool,
    /// Organism that created the thread's code (parasites differ from host)
    pub owner: Option<u64>,
}

impl Thread {
    pub fn new(id: usize, num_local_stacks: usize) -> Self {
        Self {
            id,
            regs: [0; MAX_REGISTERS],
            heads: [Head::default(); NUM_HEADS],
            local_stacks: vec![CpuStack::new(); num_local_stacks],
            cur_stack: 0,
            cur_head: HeadId::Ip,
            read_label: CodeLabel::new(),
            next_label: CodeLabel::new(),
            running: true,
            owner: None,
        }
    }

    /// Clear everything except the id, placing all heads in `space`.
    pub fn reset(&mut self, space: usize) {
        self.regs = [0; MAX_REGISTERS];
        self.heads = [Head::new(0, space); NUM_HEADS];
        self.local_stacks.iter_mut().for_each(CpuStack::clear);
        self.cur_stack = 0;
        self.cur_head = HeadId::Ip;
        self.read_label.clear();
        self.next_label.clear();
        self.running = true;
    }

    /// Heads back to the start of their space and local stacks cleared.
    pub fn reset_heads_and_stacks(&mut self, space: usize) {
        self.heads = [Head::new(0, space); NUM_HEADS];
        self.local_stacks.iter_mut().for_each(CpuStack::clear);
    }

    #[inline]
    pub fn head(&self, id: HeadId) -> &Head {
        &self.heads[id.index()]
    }

    #[inline]
    pub fn head_mut(&mut self, id: HeadId) -> &mut Head {
        &mut self.heads[id.index()]
    }

    #[inline]
    pub fn ip(&self) -> &Head {
        &self.heads[HeadId::Ip.index()]
    }

    #[inline]
    pub fn ip_mut(&mut self) -> &mut Head {
        &mut self.heads[HeadId::Ip.index()]
    }
}

/// Bitmask of live thread ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThreadIdChart(u32);

impl ThreadIdChart {
    pub fn new() -> Self {
        Self(0)
    }

    /// Take the lowest free id. `None` when all 32 are in use.
    pub fn claim(&mut self) -> Option<usize> {
        let id = (!self.0).trailing_zeros() as usize;
        if id >= 32 {
            return None;
        }
        self.0 |= 1 << id;
        Some(id)
    }

    pub fn release(&mut self, id: usize) {
        if id < 32 {
            self.0 &= !(1 << id);
        }
    }

    pub fn contains(&self, id: usize) -> bool {
        id < 32 && (self.0 >> id) & 1 == 1
    }

    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_claims_lowest_free() {
        let mut chart = ThreadIdChart::new();
        assert_eq!(chart.claim(), Some(0));
        assert_eq!(chart.claim(), Some(1));
        assert_eq!(chart.claim(), Some(2));
        chart.release(1);
        assert_eq!(chart.claim(), Some(1));
        assert_eq!(chart.count(), 3);
        assert_eq!(chart.bits(), 0b111);
    }

    #[test]
    fn test_chart_full() {
        let mut chart = ThreadIdChart::new();
        for i in 0..32 {
            assert_eq!(chart.claim(), Some(i));
        }
        assert_eq!(chart.claim(), None);
    }

    #[test]
    fn test_reset_keeps_id() {
        let mut t = Thread::new(5, 2);
        t.regs[1] = 9;
        t.local_stacks[1].push(3);
        t.heads[2].pos = 7;
        t.next_label.add_nop(1);
        t.reset(0);
        assert_eq!(t.id, 5);
        assert_eq!(t.regs, [0; MAX_REGISTERS]);
        assert_eq!(t.local_stacks[1].top(), 0);
        assert_eq!(t.heads[2].pos, 0);
        assert!(t.next_label.is_empty());
    }
}
