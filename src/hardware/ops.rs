//! Instruction bodies shared by the variants
//!
//! Each variant picks its own registers and heads from nop modifiers and
//! then calls into these. Return values follow instruction semantics: false
//! means the instruction failed.

use super::{Hardware, Variant, REG_BX, REG_CX};
use crate::context::Context;
use crate::fault::FaultLocation;
use crate::head::{Head, HeadId};
use crate::inst::{InstFlags, Instruction};
use crate::organism::Organism;

impl<V: Variant> Hardware<V> {
    /// Skip the next instruction.
    #[inline]
    pub fn skip_next(&mut self) {
        self.advance_head(HeadId::Ip);
    }

    /// Write `inst` under `head` as a copy. A mutated copy is flagged as
    /// such; `clear` drops stale mutation flags from an unmutated one.
    pub(crate) fn write_copied(&mut self, head: Head, inst: Instruction, mutated: bool, clear: bool) {
        let Some(idx) = self.write_at(head, inst) else {
            return;
        };
        let mem = &mut self.spaces[head.space];
        if mutated {
            mem.set_flag(idx, InstFlags::MUTATED | InstFlags::COPY_MUT);
        } else if clear {
            mem.clear_flag(idx, InstFlags::MUTATED | InstFlags::COPY_MUT);
        }
        mem.set_flag(idx, InstFlags::COPIED);
    }

    /// `dst = a / b`. Division by zero fails; `i32::MIN / -1` faults but
    /// leaves `dst` alone.
    pub(crate) fn op_div(&mut self, org: &mut dyn Organism, dst: usize, a: usize, b: usize) -> bool {
        let (x, y) = (self.reg(a), self.reg(b));
        if y == 0 {
            self.fault(org, FaultLocation::Math, "div: dividing by 0");
            return false;
        }
        if x == i32::MIN && y == -1 {
            self.fault(org, FaultLocation::Math, "div: Float exception");
        } else {
            self.set_reg(dst, x / y);
        }
        true
    }

    pub(crate) fn op_mod(&mut self, org: &mut dyn Organism, dst: usize, a: usize, b: usize) -> bool {
        let (x, y) = (self.reg(a), self.reg(b));
        if y == 0 {
            self.fault(org, FaultLocation::Math, "mod: modding by 0");
            return false;
        }
        self.set_reg(dst, x.wrapping_rem(y));
        true
    }

    /// Output the register, then load the next input into it.
    pub(crate) fn op_io(&mut self, ctx: &mut Context, org: &mut dyn Organism, reg: usize) {
        org.do_output(ctx, self.reg(reg));
        let value = org.next_input();
        self.set_reg(reg, value);
        org.do_input(value);
    }

    /// Allocate as much as the size range allows and put the old size
    /// in `dst`.
    pub(crate) fn op_max_alloc(&mut self, ctx: &mut Context, org: &mut dyn Organism, dst: usize) -> bool {
        let cur_size = self.memory().len() as i32;
        let by_range = (self.config.child_size_range * cur_size as f64) as i32;
        let alloc_size = by_range.min(self.config.max_creature_size as i32 - cur_size);
        if !self.allocate_main(ctx, org, alloc_size) {
            return false;
        }
        self.set_reg(dst, cur_size);
        true
    }

    /// Divide point and extra lines from the read and write heads. A write
    /// head at the front means "to the end of memory".
    fn head_divide_bounds(&mut self) -> (usize, usize) {
        self.adjust_heads();
        let len = self.memory().len();
        let divide_pos = self.head(HeadId::Read).index();
        let mut child_end = self.head(HeadId::Write).index();
        if child_end == 0 {
            child_end = len;
        }
        (divide_pos, len.saturating_sub(child_end))
    }

    pub(crate) fn op_head_divide(&mut self, ctx: &mut Context, org: &mut dyn Organism, mut_multiplier: f64) -> bool {
        let (divide_pos, extra_lines) = self.head_divide_bounds();
        let ok = self.divide_main(ctx, org, divide_pos, extra_lines, mut_multiplier);
        self.adjust_heads();
        ok
    }

    pub(crate) fn op_head_divide_rs(
        &mut self,
        ctx: &mut Context,
        org: &mut dyn Organism,
        mode: super::divide::Resample,
    ) -> bool {
        let (divide_pos, extra_lines) = self.head_divide_bounds();
        let ok = self.divide_rs(ctx, org, divide_pos, extra_lines, 1.0, mode);
        self.adjust_heads();
        ok
    }

    /// Read the instruction under `head` into `dst` as its opcode, subject
    /// to copy mutation.
    pub(crate) fn op_head_read(&mut self, ctx: &mut Context, dst: usize, head: HeadId) {
        self.adjust_head(head);
        let inst = if self.test_copy_mut(ctx) {
            self.inst_set.random_inst(ctx)
        } else {
            self.head_inst(head)
        };
        self.set_reg(dst, inst.op() as i32);
        self.read_inst(inst);
        self.advance_head(head);
    }

    /// Write the opcode in `src` under `head`. Out-of-range values write
    /// opcode 0.
    pub(crate) fn op_head_write(&mut self, src: usize, head: HeadId) {
        self.adjust_head(head);
        let mut value = self.reg(src);
        if value < 0 || value as usize >= self.inst_set.len() {
            value = 0;
        }
        if let Some(idx) = self.write_at(self.head(head), Instruction(value as u8)) {
            let space = self.head(head).space;
            self.spaces[space].set_flag(idx, InstFlags::COPIED);
        }
        self.advance_head(head);
    }

    /// Copy from the read head to the write head. The copy mutation rate
    /// is divided by `reduction`; `slip` enables copy slips, which move
    /// the read head to a random line.
    pub(crate) fn op_head_copy(&mut self, ctx: &mut Context, reduction: f64, slip: bool) {
        self.adjust_head(HeadId::Read);
        self.adjust_head(HeadId::Write);

        let mut inst = self.head_inst(HeadId::Read);
        self.read_inst(inst);
        let mutated = ctx.p(self.rates.copy_mut_prob / reduction);
        if mutated {
            inst = self.inst_set.random_inst(ctx);
        }
        self.write_copied(self.head(HeadId::Write), inst, mutated, false);
        self.advance_head(HeadId::Read);
        self.advance_head(HeadId::Write);

        if slip && self.test_copy_slip(ctx) {
            let pos = ctx.uint(self.genome.len().max(1)) as i32;
            self.set_head_pos(HeadId::Read, pos);
        }
    }

    /// Find the complement of the following label from the start of
    /// memory. BX gets the distance, CX the label size, and the flow head
    /// lands just past the match.
    pub(crate) fn op_head_search(&mut self) {
        self.read_label();
        self.complement_next_label();
        let found = self.find_label(0);
        let distance = found.pos - self.ip().pos;
        let size = self.cur().next_label.len() as i32;
        self.set_reg(REG_BX, distance);
        self.set_reg(REG_CX, size);
        self.set_head_to(HeadId::Flow, found);
        self.advance_head(HeadId::Flow);
    }

    /// Skip the next instruction unless the complement of the following
    /// label was the last thing copied.
    pub(crate) fn op_if_label(&mut self) {
        self.read_label();
        self.complement_next_label();
        if self.cur().next_label != self.cur().read_label {
            self.skip_next();
        }
    }

    pub(crate) fn op_move_head(&mut self, head: HeadId, target: HeadId) {
        let to = self.head(target);
        self.set_head_to(head, to);
        if head == HeadId::Ip {
            self.advance_ip = false;
        }
    }

    pub(crate) fn op_set_flow(&mut self, reg: usize) {
        let pos = self.reg(reg);
        self.set_head_pos(HeadId::Flow, pos);
    }

    /// Run `repro` when the configured time, cycle count or end-of-memory
    /// wrap is reached.
    pub(crate) fn check_implicit_repro(&mut self, ctx: &mut Context, org: &mut dyn Organism, wrapped: bool) {
        let implicit = self.config.implicit_repro;
        let ph = org.phenotype();
        let due = (implicit.time > 0 && ph.time_used >= implicit.time)
            || (implicit.cpu_cycles > 0 && ph.cpu_cycles_used >= implicit.cpu_cycles)
            || (implicit.end && wrapped);
        if due {
            log::debug!("organism {} implicit repro", org.id());
            self.repro(ctx, org);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::HardwareConfig;
    use crate::context::Context;
    use crate::hardware::cpu::Cpu;
    use crate::hardware::test_util::{factory, genome};
    use crate::hardware::{REG_AX, REG_BX, REG_CX};
    use crate::head::HeadId;
    use crate::inst::InstFlags;
    use crate::mutation::MutationRates;
    use crate::organism::BasicOrganism;

    fn quiet() -> HardwareConfig {
        HardwareConfig {
            mutations: MutationRates::none(),
            ..HardwareConfig::default()
        }
    }

    #[test]
    fn test_div_and_mod_faults() {
        let f = factory::<Cpu>(quiet());
        let mut hw = f.create(&genome(&f, &["nop-A"; 10].join(" ")));
        let mut org = BasicOrganism::default();

        hw.set_reg(REG_BX, 7);
        hw.set_reg(REG_CX, 0);
        assert!(!hw.op_div(&mut org, REG_BX, REG_BX, REG_CX));
        assert!(!hw.op_mod(&mut org, REG_BX, REG_BX, REG_CX));
        assert_eq!(org.faults[0].message, "div: dividing by 0");
        assert_eq!(org.faults[1].message, "mod: modding by 0");

        hw.set_reg(REG_BX, i32::MIN);
        hw.set_reg(REG_CX, -1);
        assert!(hw.op_div(&mut org, REG_AX, REG_BX, REG_CX));
        assert_eq!(org.faults[2].message, "div: Float exception");
        assert_eq!(hw.reg(REG_AX), 0);

        hw.set_reg(REG_BX, -7);
        hw.set_reg(REG_CX, 2);
        assert!(hw.op_div(&mut org, REG_AX, REG_BX, REG_CX));
        assert_eq!(hw.reg(REG_AX), -3);
        assert!(hw.op_mod(&mut org, REG_AX, REG_BX, REG_CX));
        assert_eq!(hw.reg(REG_AX), -1);
    }

    #[test]
    fn test_head_copy_flags_and_advances() {
        let f = factory::<Cpu>(quiet());
        let g = genome(&f, "inc dec nop-A nop-A nop-A nop-A nop-A nop-A nop-A nop-A");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        hw.set_head_pos(HeadId::Write, 5);
        hw.op_head_copy(&mut ctx, 1.0, true);
        assert_eq!(hw.memory().get(5), g[0]);
        assert!(hw.memory().has_flag(5, InstFlags::COPIED));
        assert!(!hw.memory().has_flag(5, InstFlags::COPY_MUT));
        assert_eq!(hw.head(HeadId::Read).pos, 1);
        assert_eq!(hw.head(HeadId::Write).pos, 6);
        assert!(hw.cur().read_label.is_empty());
    }

    #[test]
    fn test_head_write_clamps_value() {
        let f = factory::<Cpu>(quiet());
        let g = genome(&f, &["inc"; 10].join(" "));
        let mut hw = f.create(&g);
        hw.set_reg(REG_BX, 999);
        hw.op_head_write(REG_BX, HeadId::Write);
        assert_eq!(hw.memory().get(0).op(), 0);
        assert_eq!(hw.head(HeadId::Write).pos, 1);
    }

    #[test]
    fn test_io_swaps_output_for_input() {
        let f = factory::<Cpu>(quiet());
        let mut hw = f.create(&genome(&f, &["nop-A"; 10].join(" ")));
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::new(vec![11, 22]);
        hw.set_reg(REG_BX, 5);
        hw.op_io(&mut ctx, &mut org, REG_BX);
        assert_eq!(org.outputs, vec![5]);
        assert_eq!(hw.reg(REG_BX), 11);
        assert_eq!(org.consumed_inputs, vec![11]);
    }
}
