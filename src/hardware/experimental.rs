//! The experimental CPU
//!
//! A four-register heads CPU with a small instruction set. Arithmetic takes
//! its operands from modifiable registers, and `goto` jumps to `label`
//! markers instead of searching for complements. A probabilistic failure is
//! drawn after the cost gates and only skips the instruction; additional
//! time is charged when an instruction succeeds.

use super::{Hardware, Variant, VariantKind, REG_AX, REG_BX, REG_CX};
use crate::context::Context;
use crate::head::HeadId;
use crate::inst_lib::{InstLib, InstLibEntry};
use crate::organism::Organism;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpOp {
    Nop,
    IfNEqu,
    IfLess,
    Goto,
    GotoIfNEqu,
    GotoIfLess,
    Pop,
    Push,
    SwapStk,
    Swap,
    ShiftR,
    ShiftL,
    Inc,
    Dec,
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    Nand,
    Io,
    HAlloc,
    HDivide,
    HRead,
    HWrite,
    HCopy,
    HSearch,
    MovHead,
    JmpHead,
    GetHead,
    IfLabel,
    SetFlow,
    Transposon,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Experimental;

const DEFAULT_SET: [&str; 27] = [
    "nop-A", "nop-B", "nop-C", "nop-D", "if-n-equ", "if-less", "pop", "push", "swap-stk", "swap", "shift-r",
    "shift-l", "inc", "dec", "add", "sub", "nand", "IO", "h-alloc", "h-divide", "h-copy", "h-search",
    "mov-head", "jmp-head", "get-head", "if-label", "set-flow",
];

fn experimental_lib() -> InstLib<ExpOp> {
    use ExpOp::*;
    type E = InstLibEntry<ExpOp>;
    let nop_desc = "No-operation; modifies other instructions";
    InstLib::new(
        vec![
            E::nop("nop-A", Nop, 0, nop_desc).default_inst(),
            E::nop("nop-B", Nop, 1, nop_desc),
            E::nop("nop-C", Nop, 2, nop_desc),
            E::nop("nop-D", Nop, 3, nop_desc),
            E::new("NULL", Nop, "True no-operation"),
            E::new("nop-X", Nop, "True no-operation"),
            E::new("if-n-equ", IfNEqu, "Execute next if ?BX? != ?CX?"),
            E::new("if-less", IfLess, "Execute next if ?BX? < ?CX?"),
            E::new("label", Nop, "Marker for goto"),
            E::new("goto", Goto, "Move the IP to the label marker matching the following label"),
            E::new("goto-if-n-equ", GotoIfNEqu, "goto if ?BX? != ?CX?"),
            E::new("goto-if-less", GotoIfLess, "goto if ?BX? < ?CX?"),
            E::new("pop", Pop, "Pop the stack into ?BX?"),
            E::new("push", Push, "Push ?BX?"),
            E::new("swap-stk", SwapStk, "Toggle the active stack"),
            E::new("swap", Swap, "Swap ?BX? with ?CX?"),
            E::new("shift-r", ShiftR, "Shift ?BX? right by one"),
            E::new("shift-l", ShiftL, "Shift ?BX? left by one"),
            E::new("inc", Inc, "Increment ?BX?"),
            E::new("dec", Dec, "Decrement ?BX?"),
            E::new("add", Add, "?BX? = ?BX? + ?CX?"),
            E::new("sub", Sub, "?BX? = ?BX? - ?CX?"),
            E::new("mult", Mult, "?BX? = ?BX? * ?CX?"),
            E::new("div", Div, "?BX? = ?BX? / ?CX?"),
            E::new("mod", Mod, "?BX? = ?BX? % ?CX?"),
            E::new("nand", Nand, "?BX? = ?BX? nand ?CX?"),
            E::new("IO", Io, "Output ?BX?, then read the next input into it"),
            E::new("h-alloc", HAlloc, "Allocate maximal memory; ?AX? = old size"),
            E::new("h-divide", HDivide, "Divide between the read and write heads"),
            E::new("h-read", HRead, "?BX? = opcode under ?read? head"),
            E::new("h-write", HWrite, "Write opcode ?BX? under ?write? head"),
            E::new("h-copy", HCopy, "Copy from read head to write head"),
            E::new("h-search", HSearch, "Find the complement label; flow head after it"),
            E::new("mov-head", MovHead, "Move ?IP? to ?flow?"),
            E::new("jmp-head", JmpHead, "Move ?IP? by CX"),
            E::new("get-head", GetHead, "CX = ?IP? position"),
            E::new("if-label", IfLabel, "Execute next if the complement label was just copied"),
            E::new("set-flow", SetFlow, "Flow head = ?CX?"),
            E::new("transposon", Transposon, "Transposable element marker"),
        ],
        DEFAULT_SET.to_vec(),
    )
}

impl Variant for Experimental {
    type Op = ExpOp;

    const KIND: VariantKind = VariantKind::Experimental;
    const NUM_NOPS: usize = 4;
    const NUM_REGISTERS: usize = 4;
    const NUM_LOCAL_STACKS: usize = 1;
    const COMPLEMENT_SHIFT: u8 = 1;
    const FAIL_BEFORE_DISPATCH: bool = true;
    const CHARGE_ADDL_TIME_AFTER: bool = true;

    fn build_lib() -> InstLib<ExpOp> {
        experimental_lib()
    }

    fn new_state() -> Self {
        Experimental
    }

    fn execute(hw: &mut Hardware<Self>, ctx: &mut Context, org: &mut dyn Organism, op: ExpOp) -> bool {
        hw.dispatch(ctx, org, op)
    }
}

impl Hardware<Experimental> {
    fn dispatch(&mut self, ctx: &mut Context, org: &mut dyn Organism, op: ExpOp) -> bool {
        use ExpOp::*;
        match op {
            Nop => true,
            IfNEqu => {
                let (a, b) = self.operand_pair();
                if self.reg(a) == self.reg(b) {
                    self.skip_next();
                }
                true
            }
            IfLess => {
                let (a, b) = self.operand_pair();
                if self.reg(a) >= self.reg(b) {
                    self.skip_next();
                }
                true
            }
            Goto => {
                self.read_label();
                self.goto_marker();
                true
            }
            GotoIfNEqu => {
                let (a, b) = self.operand_pair();
                self.read_label();
                if self.reg(a) != self.reg(b) {
                    self.goto_marker();
                }
                true
            }
            GotoIfLess => {
                let (a, b) = self.operand_pair();
                self.read_label();
                if self.reg(a) < self.reg(b) {
                    self.goto_marker();
                }
                true
            }
            Pop => {
                let r = self.find_modified_register(REG_BX);
                let v = self.stack_pop();
                self.set_reg(r, v);
                true
            }
            Push => {
                let r = self.find_modified_register(REG_BX);
                self.stack_push(self.reg(r));
                true
            }
            SwapStk => {
                self.switch_stack();
                true
            }
            Swap => {
                let (a, b) = self.operand_pair();
                self.cur_mut().regs.swap(a, b);
                true
            }
            ShiftR => self.unary(|v| v >> 1),
            ShiftL => self.unary(|v| v << 1),
            Inc => self.unary(|v| v.wrapping_add(1)),
            Dec => self.unary(|v| v.wrapping_sub(1)),
            Add => self.binary(i32::wrapping_add),
            Sub => self.binary(i32::wrapping_sub),
            Mult => self.binary(i32::wrapping_mul),
            Nand => self.binary(|a, b| !(a & b)),
            Div => {
                let (dst, a, b) = self.operand_triple();
                self.op_div(org, dst, a, b)
            }
            Mod => {
                let (dst, a, b) = self.operand_triple();
                self.op_mod(org, dst, a, b)
            }
            Io => {
                let r = self.find_modified_register(REG_BX);
                self.op_io(ctx, org, r);
                true
            }
            HAlloc => {
                let dst = self.find_modified_register(REG_AX);
                self.op_max_alloc(ctx, org, dst)
            }
            HDivide => self.op_head_divide(ctx, org, 1.0),
            HRead => {
                let dst = self.find_modified_register(REG_BX);
                let head = self.find_modified_head(HeadId::Read);
                self.op_head_read(ctx, dst, head);
                true
            }
            HWrite => {
                let src = self.find_modified_register(REG_BX);
                let head = self.find_modified_head(HeadId::Write);
                self.op_head_write(src, head);
                true
            }
            HCopy => {
                self.op_head_copy(ctx, 1.0, false);
                true
            }
            HSearch => {
                self.op_head_search();
                true
            }
            MovHead => {
                let head = self.find_modified_head(HeadId::Ip);
                let target = self.find_modified_head(HeadId::Flow);
                self.op_move_head(head, target);
                true
            }
            JmpHead => {
                let head = self.find_modified_head(HeadId::Ip);
                let cx = self.reg(REG_CX);
                self.jump_head(head, cx);
                true
            }
            GetHead => {
                let head = self.find_modified_head(HeadId::Ip);
                self.set_reg(REG_CX, self.head(head).pos);
                true
            }
            IfLabel => {
                self.op_if_label();
                true
            }
            SetFlow => {
                let r = self.find_modified_register(REG_CX);
                self.op_set_flow(r);
                true
            }
            Transposon => {
                self.read_label();
                true
            }
        }
    }

    /// `?BX?` and the register modified after it, defaulting to the next.
    fn operand_pair(&mut self) -> (usize, usize) {
        let op1 = self.find_modified_register(REG_BX);
        let op2 = self.find_modified_next_register(op1);
        (op1, op2)
    }

    /// Destination plus two operands, each open to a modifier.
    fn operand_triple(&mut self) -> (usize, usize, usize) {
        let dst = self.find_modified_register(REG_BX);
        let op1 = self.find_modified_register(dst);
        let op2 = self.find_modified_next_register(op1);
        (dst, op1, op2)
    }

    fn unary(&mut self, f: impl FnOnce(i32) -> i32) -> bool {
        let r = self.find_modified_register(REG_BX);
        self.set_reg(r, f(self.reg(r)));
        true
    }

    fn binary(&mut self, f: impl FnOnce(i32, i32) -> i32) -> bool {
        let (dst, a, b) = self.operand_triple();
        self.set_reg(dst, f(self.reg(a), self.reg(b)));
        true
    }

    /// Move the IP onto the `label` marker spelling `next_label`; stays
    /// put when there is none.
    fn goto_marker(&mut self) {
        if let Some(pos) = self.find_marked_label("label") {
            self.set_head_pos(HeadId::Ip, pos as i32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HardwareConfig, InstEntryConfig};
    use crate::hardware::test_util::{factory, genome, run};
    use crate::hardware::REG_DX;
    use crate::inst::InstFlags;
    use crate::mutation::MutationRates;
    use crate::organism::BasicOrganism;

    fn quiet() -> HardwareConfig {
        HardwareConfig {
            mutations: MutationRates::none(),
            ..HardwareConfig::default()
        }
    }

    fn full_set() -> HardwareConfig {
        let lib = experimental_lib();
        HardwareConfig {
            inst_set: lib.entries().iter().map(|e| InstEntryConfig::named(e.name)).collect(),
            ..quiet()
        }
    }

    /// Heads replicator for four nops: `mov-head` takes a second modifier
    /// for its target, and labels complement to `A D B`.
    const ANCESTOR: &str = "h-alloc h-search nop-D nop-C nop-A mov-head nop-C nop-D \
        h-search h-copy if-label nop-D nop-C nop-A h-divide mov-head nop-A nop-D nop-B";

    #[test]
    fn test_default_set() {
        let f = factory::<Experimental>(quiet());
        assert_eq!(f.inst_set().len(), 27);
        assert_eq!(f.inst_set().num_nops(), 4);
        assert!(f.inst_set().inst("goto").is_none());
    }

    #[test]
    fn test_heads_ancestor_replicates() {
        let f = factory::<Experimental>(quiet());
        let g = genome(&f, ANCESTOR);
        let mut hw = f.create(&g);
        let mut ctx = Context::new(2);
        let mut org = BasicOrganism::default();
        let mut steps = 0;
        while org.offspring.is_empty() && steps < 1000 {
            hw.single_process(&mut ctx, &mut org);
            steps += 1;
        }
        assert_eq!(org.offspring.len(), 1);
        assert_eq!(org.offspring[0].genome, g);
        assert!(org.offspring[0].copy_true);
        assert_eq!(org.phenotype.copied_size, 19);
        assert!(org.faults.is_empty());
    }

    #[test]
    fn test_arithmetic_uses_modified_operands() {
        let f = factory::<Experimental>(full_set());
        let g = genome(&f, "add nop-A nop-C nop-D swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        hw.set_reg(REG_CX, 3);
        hw.set_reg(REG_DX, 4);
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(hw.reg(REG_AX), 7);
        assert_eq!(hw.ip().pos, 4);
    }

    #[test]
    fn test_swap_defaults_to_next_register() {
        let f = factory::<Experimental>(full_set());
        let g = genome(&f, "swap nop-C swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        hw.set_reg(REG_CX, 5);
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(hw.reg(REG_CX), 0);
        assert_eq!(hw.reg(REG_DX), 5);
    }

    #[test]
    fn test_goto_lands_on_exact_marker() {
        let f = factory::<Experimental>(full_set());
        let g = genome(
            &f,
            "goto nop-B inc label nop-B nop-C dec label nop-B inc swap-stk",
        );
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(hw.ip().pos, 8);
        run(&mut hw, &mut ctx, &mut org, 2);
        assert_eq!(hw.reg(REG_BX), 1);
        assert!(!hw.memory().has_flag(2, InstFlags::EXECUTED));
    }

    #[test]
    fn test_failure_skips_without_retry() {
        let mut set = experimental_lib().default_set_config();
        for line in set.iter_mut().filter(|l| l.name == "inc") {
            line.prob_fail = 1.0;
            line.addl_time_cost = 3;
        }
        let f = factory::<Experimental>(HardwareConfig { inst_set: set, ..quiet() });
        let g = genome(&f, "inc inc dec nop-A nop-A nop-A nop-A nop-A nop-A nop-A");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 3);
        assert_eq!(hw.reg(REG_BX), -1);
        assert_eq!(hw.ip().pos, 3);
        assert_eq!(org.phenotype.time_used, 3);
    }

    #[test]
    fn test_mov_head_to_modified_target() {
        let f = factory::<Experimental>(full_set());
        let g = genome(&f, "mov-head nop-C nop-B swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        hw.set_head_pos(HeadId::Read, 6);
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(hw.head(HeadId::Write).pos, 6);
        assert_eq!(hw.ip().pos, 3);
    }
}
