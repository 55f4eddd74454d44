//! The heads-based CPU
//!
//! Three nops, three registers, one local stack plus the global one.
//! Labels complement by rotating one step. The failure probability is a
//! cost gate (a failed draw retries the instruction next step) and the
//! additional time cost is charged on every dispatch.

use super::divide::Resample;
use super::{Hardware, Variant, VariantKind, REG_AX, REG_BX, REG_CX};
use crate::context::Context;
use crate::fault::FaultLocation;
use crate::head::HeadId;
use crate::inst::{InstFlags, Instruction};
use crate::inst_lib::{InstLib, InstLibEntry};
use crate::organism::Organism;

/// Twenty-line self-replicator written in the default instruction set.
pub const ANCESTOR: &str = "h-alloc h-search nop-C nop-A mov-head nop-C \
    nop-C nop-C nop-C nop-C nop-C \
    h-search h-copy if-label nop-C nop-A h-divide mov-head nop-A nop-B";

/// Number of slots in the market addressed by `sell` and `buy`.
pub const MARKET_SIZE: i32 = 10000;

/// Comparison used by the conditional family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Cmp {
    #[inline]
    pub fn holds(self, a: i32, b: i32) -> bool {
        match self {
            Cmp::Eq => a == b,
            Cmp::Ne => a != b,
            Cmp::Gt => a > b,
            Cmp::Ge => a >= b,
            Cmp::Lt => a < b,
            Cmp::Le => a <= b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CpuOp {
    Nop,
    /// Execute the next instruction only if `?BX? cmp 0`
    IfZero(Cmp),
    /// Execute the next instruction only if `?BX? cmp` the register after it
    IfCmp(Cmp),
    IfRegsNe(usize, usize),
    IfBit1,
    JumpF,
    JumpB,
    Call,
    Return,
    Throw,
    /// `true` throws when BX is zero, `false` when it is not
    ThrowIf(bool),
    Goto,
    GotoIf(bool),
    Pop,
    Push,
    PopReg(usize),
    PushReg(usize),
    SwapStk,
    FlipStk,
    Swap,
    SwapRegs(usize, usize),
    CopyReg,
    /// `dst = src`
    SetReg(usize, usize),
    Reset,
    ShiftR,
    ShiftL,
    Bit1,
    SetNum,
    Inc,
    Dec,
    Zero,
    Neg,
    Square,
    Sqrt,
    Not,
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    Nand,
    Nor,
    And,
    Order,
    Xor,
    Copy,
    Read,
    Write,
    StkRead,
    StkWrite,
    Compare,
    IfNCpy,
    Allocate,
    Divide,
    DivideRs,
    CAlloc,
    CDivide,
    Inject,
    InjectRand,
    Transposon,
    SearchF,
    SearchB,
    MemSize,
    Get,
    StkGet,
    StkLoad,
    Put,
    PutReset,
    Io,
    Send,
    Receive,
    Sell,
    Buy,
    RotateL,
    RotateR,
    SetCmut,
    ModCmut,
    ForkTh,
    ForkL,
    ForkLIf(bool),
    KillTh,
    IdTh,
    HAlloc,
    HAllocMw,
    /// Head divide with the divide mutation rate divided by the multiplier
    HDivide(u32),
    HDivideRs(Resample),
    HRead,
    HWrite,
    HCopy,
    /// Error-correcting copy: copy mutation rate divided by the value
    HCopyEc(u32),
    HSearch,
    HPush,
    HPop,
    SetHead,
    AdvHead,
    MovHead,
    JmpHead,
    GetHead,
    IfLabel,
    IfLabel2,
    SetFlow,
    Repro,
    Sterilize,
    Kazi,
    Die,
    Skip,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cpu;

const DEFAULT_SET: [&str; 26] = [
    "nop-A", "nop-B", "nop-C", "if-n-equ", "if-less", "pop", "push", "swap-stk", "swap", "shift-r", "shift-l",
    "inc", "dec", "add", "sub", "nand", "IO", "h-alloc", "h-divide", "h-copy", "h-search", "mov-head",
    "jmp-head", "get-head", "if-label", "set-flow",
];

fn cpu_lib() -> InstLib<CpuOp> {
    use CpuOp::*;
    type E = InstLibEntry<CpuOp>;
    let entries = vec![
        E::nop("nop-A", Nop, 0, "No-operation; modifies other instructions").default_inst(),
        E::nop("nop-B", Nop, 1, "No-operation; modifies other instructions"),
        E::nop("nop-C", Nop, 2, "No-operation; modifies other instructions"),
        E::new("NULL", Nop, "True no-operation"),
        E::new("nop-X", Nop, "True no-operation"),
        E::new("if-equ-0", IfZero(Cmp::Eq), "Execute next if ?BX? == 0"),
        E::new("if-not-0", IfZero(Cmp::Ne), "Execute next if ?BX? != 0"),
        E::new("if-n-equ", IfCmp(Cmp::Ne), "Execute next if ?BX? != ?CX?"),
        E::new("if-equ", IfCmp(Cmp::Eq), "Execute next if ?BX? == ?CX?"),
        E::new("if-grt-0", IfZero(Cmp::Gt), "Execute next if ?BX? > 0"),
        E::new("if-grt", IfCmp(Cmp::Gt), "Execute next if ?BX? > ?CX?"),
        E::new("if->=-0", IfZero(Cmp::Ge), "Execute next if ?BX? >= 0"),
        E::new("if->=", IfCmp(Cmp::Ge), "Execute next if ?BX? >= ?CX?"),
        E::new("if-les-0", IfZero(Cmp::Lt), "Execute next if ?BX? < 0"),
        E::new("if-less", IfCmp(Cmp::Lt), "Execute next if ?BX? < ?CX?"),
        E::new("if-<=-0", IfZero(Cmp::Le), "Execute next if ?BX? <= 0"),
        E::new("if-<=", IfCmp(Cmp::Le), "Execute next if ?BX? <= ?CX?"),
        E::new("if-A!=B", IfRegsNe(REG_AX, REG_BX), "Execute next if AX != BX"),
        E::new("if-B!=C", IfRegsNe(REG_BX, REG_CX), "Execute next if BX != CX"),
        E::new("if-A!=C", IfRegsNe(REG_AX, REG_CX), "Execute next if AX != CX"),
        E::new("if-bit-1", IfBit1, "Execute next if the low bit of ?BX? is set"),
        E::new("jump-f", JumpF, "Move the active head forward to the complement label"),
        E::new("jump-b", JumpB, "Move the active head back to the complement label"),
        E::new("call", Call, "Push the IP and jump to the complement label"),
        E::new("return", Return, "Pop the IP from the stack"),
        E::new("throw", Throw, "Jump to the catch marked with the label"),
        E::new("throwif=0", ThrowIf(true), "throw if BX == 0"),
        E::new("throwif!=0", ThrowIf(false), "throw if BX != 0"),
        E::new("catch", Nop, "Marker for throw"),
        E::new("goto", Goto, "Jump to the label marker spelling exactly the label"),
        E::new("goto-if=0", GotoIf(true), "goto if BX == 0"),
        E::new("goto-if!=0", GotoIf(false), "goto if BX != 0"),
        E::new("label", Nop, "Marker for goto"),
        E::new("pop", Pop, "Pop the stack into ?BX?"),
        E::new("push", Push, "Push ?BX? onto the stack"),
        E::new("swap-stk", SwapStk, "Toggle the active stack"),
        E::new("flip-stk", FlipStk, "Reverse the active stack"),
        E::new("swap", Swap, "Swap ?BX? and the register after it"),
        E::new("swap-AB", SwapRegs(REG_AX, REG_BX), "Swap AX and BX"),
        E::new("swap-BC", SwapRegs(REG_BX, REG_CX), "Swap BX and CX"),
        E::new("swap-AC", SwapRegs(REG_AX, REG_CX), "Swap AX and CX"),
        E::new("copy-reg", CopyReg, "Copy ?BX? into the register after it"),
        E::new("set_A=B", SetReg(REG_AX, REG_BX), "AX = BX"),
        E::new("set_A=C", SetReg(REG_AX, REG_CX), "AX = CX"),
        E::new("set_B=A", SetReg(REG_BX, REG_AX), "BX = AX"),
        E::new("set_B=C", SetReg(REG_BX, REG_CX), "BX = CX"),
        E::new("set_C=A", SetReg(REG_CX, REG_AX), "CX = AX"),
        E::new("set_C=B", SetReg(REG_CX, REG_BX), "CX = BX"),
        E::new("reset", Reset, "Zero all registers and clear the stack"),
        E::new("pop-A", PopReg(REG_AX), "Pop into AX"),
        E::new("pop-B", PopReg(REG_BX), "Pop into BX"),
        E::new("pop-C", PopReg(REG_CX), "Pop into CX"),
        E::new("push-A", PushReg(REG_AX), "Push AX"),
        E::new("push-B", PushReg(REG_BX), "Push BX"),
        E::new("push-C", PushReg(REG_CX), "Push CX"),
        E::new("shift-r", ShiftR, "Shift ?BX? right by one"),
        E::new("shift-l", ShiftL, "Shift ?BX? left by one"),
        E::new("bit-1", Bit1, "Set the low bit of ?BX?"),
        E::new("set-num", SetNum, "BX = following label read as a number"),
        E::new("inc", Inc, "Increment ?BX?"),
        E::new("dec", Dec, "Decrement ?BX?"),
        E::new("zero", Zero, "?BX? = 0"),
        E::new("neg", Neg, "?BX? = -?BX?"),
        E::new("square", Square, "?BX? = ?BX? squared"),
        E::new("sqrt", Sqrt, "?BX? = integer square root of ?BX?"),
        E::new("not", Not, "?BX? = bitwise not of ?BX?"),
        E::new("add", Add, "?BX? = BX + CX"),
        E::new("sub", Sub, "?BX? = BX - CX"),
        E::new("mult", Mult, "?BX? = BX * CX"),
        E::new("div", Div, "?BX? = BX / CX"),
        E::new("mod", Mod, "?BX? = BX % CX"),
        E::new("nand", Nand, "?BX? = BX nand CX"),
        E::new("nor", Nor, "?BX? = BX nor CX"),
        E::new("and", And, "?BX? = BX and CX"),
        E::new("order", Order, "Sort BX and CX"),
        E::new("xor", Xor, "?BX? = BX xor CX"),
        E::new("copy", Copy, "Copy line BX to line AX + BX"),
        E::new("read", Read, "?CX? = opcode at line BX"),
        E::new("write", Write, "Write opcode ?CX? to line AX + BX"),
        E::new("stk-read", StkRead, "Push the opcode at line ?CX?"),
        E::new("stk-writ", StkWrite, "Write the popped opcode to line AX + ?BX?"),
        E::new("compare", Compare, "?CX? = opcode at BX minus opcode at AX + BX"),
        E::new("if-n-cpy", IfNCpy, "Execute next if lines BX and AX + BX differ"),
        E::new("allocate", Allocate, "Allocate BX lines; AX = old size"),
        E::new("divide", Divide, "Divide at AX"),
        E::new("divideRS", DivideRs, "Divide at AX, resample reverted offspring"),
        E::new("c-alloc", CAlloc, "Allocate as much as the current size"),
        E::new("c-divide", CDivide, "Divide in half"),
        E::new("inject", Inject, "Inject the code between read and write heads into the neighbour"),
        E::new("inject-r", InjectRand, "Inject into a random neighbour"),
        E::new("transposon", Transposon, "Transposable element marker"),
        E::new("search-f", SearchF, "Find the complement label forward; BX = distance"),
        E::new("search-b", SearchB, "Find the complement label backward; BX = distance"),
        E::new("mem-size", MemSize, "?BX? = memory size"),
        E::new("get", Get, "?CX? = next input"),
        E::new("stk-get", StkGet, "Push the next input"),
        E::new("stk-load", StkLoad, "Push the next three inputs"),
        E::new("put", Put, "Output ?BX? and zero it"),
        E::new("put-reset", PutReset, "put, then reset the inputs"),
        E::new("IO", Io, "Output ?BX?, then read the next input into it"),
        E::new("send", Send, "Send ?BX? to the faced neighbour"),
        E::new("receive", Receive, "?BX? = received value"),
        E::new("sell", Sell, "Offer BX on the market"),
        E::new("buy", Buy, "BX = value bought from the market"),
        E::new("rotate-l", RotateL, "Turn left, toward a neighbour carrying the label"),
        E::new("rotate-r", RotateR, "Turn right, toward a neighbour carrying the label"),
        E::new("set-cmut", SetCmut, "Copy mutation rate = ?BX? / 10000"),
        E::new("mod-cmut", ModCmut, "Copy mutation rate += ?BX? / 10000"),
        E::new("fork-th", ForkTh, "Fork a new thread"),
        E::new("forkl", ForkL, "Fork a thread at the complement label"),
        E::new("forkl=0", ForkLIf(true), "forkl if BX == 0"),
        E::new("forkl!=0", ForkLIf(false), "forkl if BX != 0"),
        E::new("kill-th", KillTh, "Kill the current thread"),
        E::new("id-th", IdTh, "?BX? = thread id"),
        E::new("h-alloc", HAlloc, "Allocate maximal memory; AX = old size"),
        E::new("h-alloc-mw", HAllocMw, "h-alloc and move the write head to the new space"),
        E::new("h-divide", HDivide(1), "Divide between the read and write heads"),
        E::new("h-divideRS", HDivideRs(Resample::Full), "h-divide, resample reverted offspring"),
        E::new("h-divide1RS", HDivideRs(Resample::Exact(1)), "h-divide, one mutation, resample"),
        E::new("h-divide2RS", HDivideRs(Resample::Exact(2)), "h-divide, two mutations, resample"),
        E::new("h-divide1", HDivide(1), "h-divide with mutation multiplier 1"),
        E::new("h-divide2", HDivide(2), "h-divide with mutation multiplier 2"),
        E::new("h-divide3", HDivide(3), "h-divide with mutation multiplier 3"),
        E::new("h-read", HRead, "BX = opcode under ?read? head"),
        E::new("h-write", HWrite, "Write opcode BX under ?write? head"),
        E::new("h-copy", HCopy, "Copy from read head to write head"),
        E::new("h-copy2", HCopyEc(2), "h-copy with half the copy mutation rate"),
        E::new("h-copy3", HCopyEc(3), "h-copy with a third of the copy mutation rate"),
        E::new("h-search", HSearch, "Find the complement label from the start; flow head after it"),
        E::new("h-push", HPush, "Push ?IP? position"),
        E::new("h-pop", HPop, "Pop into ?IP? position"),
        E::new("set-head", SetHead, "Make ?IP? the active head"),
        E::new("adv-head", AdvHead, "Advance ?write? head"),
        E::new("mov-head", MovHead, "Move ?IP? to the flow head"),
        E::new("jmp-head", JmpHead, "Move ?IP? by CX"),
        E::new("get-head", GetHead, "CX = ?IP? position"),
        E::new("if-label", IfLabel, "Execute next if the complement label was just copied"),
        E::new("if-label2", IfLabel2, "if-label, skipping a following nop as well"),
        E::new("set-flow", SetFlow, "Flow head = ?CX?"),
        E::new("repro", Repro, "Reproduce without copying"),
        E::new("sterilize", Sterilize, "Make future offspring sterile"),
        E::new("kazi", Kazi, "Explode with probability ?AX? % 100"),
        E::new("die", Die, "Die"),
        E::new("skip", Skip, "Skip the next instruction"),
    ];
    InstLib::new(entries, DEFAULT_SET.to_vec())
}

impl Variant for Cpu {
    type Op = CpuOp;

    const KIND: VariantKind = VariantKind::Cpu;
    const NUM_NOPS: usize = 3;
    const NUM_REGISTERS: usize = 3;
    const NUM_LOCAL_STACKS: usize = 1;
    const COMPLEMENT_SHIFT: u8 = 1;
    const FAIL_BEFORE_DISPATCH: bool = false;
    const CHARGE_ADDL_TIME_AFTER: bool = false;

    fn build_lib() -> InstLib<CpuOp> {
        cpu_lib()
    }

    fn new_state() -> Self {
        Cpu
    }

    fn execute(hw: &mut Hardware<Self>, ctx: &mut Context, org: &mut dyn Organism, op: CpuOp) -> bool {
        hw.dispatch(ctx, org, op)
    }

    fn after_step(hw: &mut Hardware<Self>, ctx: &mut Context, org: &mut dyn Organism, wrapped: bool) {
        hw.check_implicit_repro(ctx, org, wrapped);
    }
}

impl Hardware<Cpu> {
    fn dispatch(&mut self, ctx: &mut Context, org: &mut dyn Organism, op: CpuOp) -> bool {
        use CpuOp::*;
        match op {
            Nop => true,
            IfZero(cmp) => {
                let r = self.find_modified_register(REG_BX);
                if !cmp.holds(self.reg(r), 0) {
                    self.skip_next();
                }
                true
            }
            IfCmp(cmp) => {
                let op1 = self.find_modified_register(REG_BX);
                let op2 = Self::next_register(op1);
                if !cmp.holds(self.reg(op1), self.reg(op2)) {
                    self.skip_next();
                }
                true
            }
            IfRegsNe(a, b) => {
                if self.reg(a) == self.reg(b) {
                    self.skip_next();
                }
                true
            }
            IfBit1 => {
                let r = self.find_modified_register(REG_BX);
                if self.reg(r) & 1 == 0 {
                    self.skip_next();
                }
                true
            }
            JumpF => self.jump(1),
            JumpB => self.jump(-1),
            Call => {
                let location = self.ip().pos;
                self.stack_push(location);
                self.read_label();
                self.complement_next_label();
                if self.cur().next_label.is_empty() {
                    let bx = self.reg(REG_BX);
                    self.jump_head(HeadId::Ip, bx);
                } else {
                    let found = self.find_label(1);
                    self.set_head_to(HeadId::Ip, found);
                }
                true
            }
            Return => {
                let pos = self.stack_pop();
                self.set_head_pos(HeadId::Ip, pos);
                true
            }
            Throw => self.throw(),
            ThrowIf(zero) => (self.reg(REG_BX) == 0) == zero && self.throw(),
            Goto => self.goto(),
            GotoIf(zero) => (self.reg(REG_BX) == 0) == zero && self.goto(),
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
            PopReg(r) => {
                let v = self.stack_pop();
                self.set_reg(r, v);
                true
            }
            PushReg(r) => {
                self.stack_push(self.reg(r));
                true
            }
            SwapStk => {
                self.switch_stack();
                true
            }
            FlipStk => {
                self.stack_flip();
                true
            }
            Swap => {
                let op1 = self.find_modified_register(REG_BX);
                let op2 = Self::next_register(op1);
                self.cur_mut().regs.swap(op1, op2);
                true
            }
            SwapRegs(a, b) => {
                self.cur_mut().regs.swap(a, b);
                true
            }
            CopyReg => {
                let src = self.find_modified_register(REG_BX);
                let dst = Self::next_register(src);
                self.set_reg(dst, self.reg(src));
                true
            }
            SetReg(dst, src) => {
                self.set_reg(dst, self.reg(src));
                true
            }
            Reset => {
                for r in [REG_AX, REG_BX, REG_CX] {
                    self.set_reg(r, 0);
                }
                self.stack_clear();
                true
            }
            ShiftR => self.unary(|v| v >> 1),
            ShiftL => self.unary(|v| v << 1),
            Bit1 => self.unary(|v| v | 1),
            SetNum => {
                self.read_label();
                let value = self.cur().next_label.as_int(Cpu::NUM_NOPS);
                self.set_reg(REG_BX, value);
                true
            }
            Inc => self.unary(|v| v.wrapping_add(1)),
            Dec => self.unary(|v| v.wrapping_sub(1)),
            Zero => self.unary(|_| 0),
            Neg => self.unary(i32::wrapping_neg),
            Square => self.unary(|v| v.wrapping_mul(v)),
            Not => self.unary(|v| !v),
            Sqrt => {
                let r = self.find_modified_register(REG_BX);
                let v = self.reg(r);
                if v < 0 {
                    self.fault(org, FaultLocation::Math, "sqrt: value is negative");
                    return false;
                }
                if v > 1 {
                    self.set_reg(r, (v as f64).sqrt() as i32);
                }
                true
            }
            Add => self.binary(i32::wrapping_add),
            Sub => self.binary(i32::wrapping_sub),
            Mult => self.binary(i32::wrapping_mul),
            Nand => self.binary(|a, b| !(a & b)),
            Nor => self.binary(|a, b| !(a | b)),
            And => self.binary(|a, b| a & b),
            Xor => self.binary(|a, b| a ^ b),
            Div => {
                let dst = self.find_modified_register(REG_BX);
                self.op_div(org, dst, REG_BX, REG_CX)
            }
            Mod => {
                let dst = self.find_modified_register(REG_BX);
                self.op_mod(org, dst, REG_BX, REG_CX)
            }
            Order => {
                if self.reg(REG_BX) > self.reg(REG_CX) {
                    self.cur_mut().regs.swap(REG_BX, REG_CX);
                }
                true
            }
            Copy => {
                let from = self.mem_head(self.reg(REG_BX));
                let to = self.mem_head(self.reg(REG_AX).wrapping_add(self.reg(REG_BX)));
                let mutated = self.test_copy_mut(ctx);
                let inst = if mutated {
                    self.inst_set.random_inst(ctx)
                } else {
                    self.inst_at(from)
                };
                self.write_copied(to, inst, mutated, true);
                true
            }
            Read => {
                let dst = self.find_modified_register(REG_CX);
                let from = self.mem_head(self.reg(REG_BX));
                self.set_reg(dst, self.inst_at(from).op() as i32);
                true
            }
            Write => {
                let src = self.find_modified_register(REG_CX);
                let to = self.mem_head(self.reg(REG_AX).wrapping_add(self.reg(REG_BX)));
                let value = self.reg(src).rem_euclid(self.inst_set.len() as i32);
                self.write_mutable(ctx, to, Instruction(value as u8));
                true
            }
            StkRead => {
                let r = self.find_modified_register(REG_CX);
                let from = self.mem_head(self.reg(r));
                self.stack_push(self.inst_at(from).op() as i32);
                true
            }
            StkWrite => {
                let dst = self.find_modified_register(REG_BX);
                let to = self.mem_head(self.reg(REG_AX).wrapping_add(self.reg(dst)));
                let value = self.stack_pop().rem_euclid(self.inst_set.len() as i32);
                self.write_mutable(ctx, to, Instruction(value as u8));
                true
            }
            Compare => {
                let dst = self.find_modified_register(REG_CX);
                let from = self.mem_head(self.reg(REG_BX));
                let to = self.mem_head(self.reg(REG_AX).wrapping_add(self.reg(REG_BX)));
                if self.test_copy_mut(ctx) {
                    let inst = self.inst_set.random_inst(ctx);
                    if let Some(idx) = self.write_at(to, inst) {
                        self.memory_mut().set_flag(idx, InstFlags::MUTATED | InstFlags::COPY_MUT);
                    }
                }
                let diff = self.inst_at(from).op() as i32 - self.inst_at(to).op() as i32;
                self.set_reg(dst, diff);
                true
            }
            IfNCpy => {
                let from = self.mem_head(self.reg(REG_BX));
                let to = self.mem_head(self.reg(REG_AX).wrapping_add(self.reg(REG_BX)));
                let same = self.inst_at(from) == self.inst_at(to);
                if same != self.test_copy_mut(ctx) {
                    self.skip_next();
                }
                true
            }
            Allocate => {
                let size = self.memory().len() as i32;
                if !self.allocate_main(ctx, org, self.reg(REG_BX)) {
                    return false;
                }
                self.set_reg(REG_AX, size);
                true
            }
            Divide => {
                let point = self.reg(REG_AX).max(0) as usize;
                self.divide_main(ctx, org, point, 0, 1.0)
            }
            DivideRs => {
                let point = self.reg(REG_AX).max(0) as usize;
                self.divide_rs(ctx, org, point, 0, 1.0, Resample::Full)
            }
            CAlloc => {
                let size = self.memory().len() as i32;
                self.allocate_main(ctx, org, size)
            }
            CDivide => {
                let point = self.memory().len() / 2;
                self.divide_main(ctx, org, point, 0, 1.0)
            }
            Inject => self.inject(ctx, org),
            InjectRand => {
                let n = org.neighborhood_size();
                if n > 0 {
                    org.rotate(ctx.uint(n) as i32);
                }
                self.inject(ctx, org);
                true
            }
            Transposon => {
                self.read_label();
                true
            }
            SearchF => {
                self.read_label();
                self.complement_next_label();
                let found = self.find_label(1);
                let distance = found.pos - self.ip().pos;
                self.set_reg(REG_BX, distance);
                self.set_reg(REG_CX, self.cur().next_label.len() as i32);
                true
            }
            SearchB => {
                self.read_label();
                self.complement_next_label();
                let found = self.find_label(-1);
                let distance = self.ip().pos - found.pos;
                self.set_reg(REG_BX, distance);
                self.set_reg(REG_CX, self.cur().next_label.len() as i32);
                true
            }
            MemSize => {
                let r = self.find_modified_register(REG_BX);
                self.set_reg(r, self.memory().len() as i32);
                true
            }
            Get => {
                let r = self.find_modified_register(REG_CX);
                let value = org.next_input();
                self.set_reg(r, value);
                org.do_input(value);
                true
            }
            StkGet => {
                let value = org.next_input();
                self.stack_push(value);
                org.do_input(value);
                true
            }
            StkLoad => {
                for _ in 0..3 {
                    let value = org.next_input();
                    self.stack_push(value);
                }
                true
            }
            Put => {
                self.put(ctx, org);
                true
            }
            PutReset => {
                self.put(ctx, org);
                org.reset_inputs(ctx);
                true
            }
            Io => {
                let r = self.find_modified_register(REG_BX);
                self.op_io(ctx, org, r);
                true
            }
            Send => {
                let r = self.find_modified_register(REG_BX);
                org.send_value(self.reg(r));
                self.set_reg(r, 0);
                true
            }
            Receive => {
                let r = self.find_modified_register(REG_BX);
                let value = org.receive_value().unwrap_or(0);
                self.set_reg(r, value);
                true
            }
            Sell => {
                let label = self.cur().next_label.as_int(3) % MARKET_SIZE;
                org.sell_value(self.reg(REG_BX), label, self.config.sell_price);
                true
            }
            Buy => {
                let label = self.cur().next_label.as_int(3) % MARKET_SIZE;
                let value = org.buy_value(label, self.config.buy_price).unwrap_or(0);
                self.set_reg(REG_BX, value);
                true
            }
            RotateL => self.rotate_to_label(org, -1),
            RotateR => self.rotate_to_label(org, 1),
            SetCmut => {
                let r = self.find_modified_register(REG_BX);
                let rate = self.reg(r).max(1);
                self.rates.copy_mut_prob = rate as f64 / 10000.0;
                true
            }
            ModCmut => {
                let r = self.find_modified_register(REG_BX);
                let rate = self.rates.copy_mut_prob + self.reg(r) as f64 / 10000.0;
                if rate > 0.0 {
                    self.rates.copy_mut_prob = rate;
                }
                true
            }
            ForkTh => {
                self.advance_head(HeadId::Ip);
                self.fork_or_fault(org);
                true
            }
            ForkL => self.fork_label(org),
            ForkLIf(zero) => {
                if (self.reg(REG_BX) == 0) != zero {
                    self.read_label();
                    return false;
                }
                self.fork_label(org)
            }
            KillTh => {
                if self.kill_thread() {
                    self.advance_ip = false;
                } else {
                    self.fault(org, FaultLocation::ThreadKill, "kill-th: cannot kill last thread");
                }
                true
            }
            IdTh => {
                let r = self.find_modified_register(REG_BX);
                self.set_reg(r, self.cur().id as i32);
                true
            }
            HAlloc => self.op_max_alloc(ctx, org, REG_AX),
            HAllocMw => {
                let cur_size = self.memory().len() as i32;
                if !self.op_max_alloc(ctx, org, REG_AX) {
                    return false;
                }
                self.set_head_pos(HeadId::Write, cur_size);
                true
            }
            HDivide(mult) => self.op_head_divide(ctx, org, mult as f64),
            HDivideRs(mode) => self.op_head_divide_rs(ctx, org, mode),
            HRead => {
                let head = self.find_modified_head(HeadId::Read);
                self.op_head_read(ctx, REG_BX, head);
                true
            }
            HWrite => {
                let head = self.find_modified_head(HeadId::Write);
                self.op_head_write(REG_BX, head);
                true
            }
            HCopy => {
                self.op_head_copy(ctx, 1.0, true);
                true
            }
            HCopyEc(reduction) => {
                self.op_head_copy(ctx, reduction as f64, false);
                true
            }
            HSearch => {
                self.op_head_search();
                true
            }
            HPush => {
                let head = self.find_modified_head(HeadId::Ip);
                self.stack_push(self.head(head).pos);
                if head == HeadId::Ip {
                    let flow = self.head(HeadId::Flow);
                    self.set_head_to(HeadId::Ip, flow);
                    self.advance_ip = false;
                }
                true
            }
            HPop => {
                let head = self.find_modified_head(HeadId::Ip);
                let pos = self.stack_pop();
                self.set_head_pos(head, pos);
                true
            }
            SetHead => {
                let head = self.find_modified_head(HeadId::Ip);
                self.cur_mut().cur_head = head;
                true
            }
            AdvHead => {
                let head = self.find_modified_head(HeadId::Write);
                self.advance_head(head);
                true
            }
            MovHead => {
                let head = self.find_modified_head(HeadId::Ip);
                self.op_move_head(head, HeadId::Flow);
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
            IfLabel2 => {
                self.read_label();
                self.complement_next_label();
                if self.cur().next_label != self.cur().read_label {
                    if self.inst_set.is_nop(self.next_inst(HeadId::Ip)) {
                        self.skip_next();
                    }
                    self.skip_next();
                }
                true
            }
            SetFlow => {
                let r = self.find_modified_register(REG_CX);
                self.op_set_flow(r);
                true
            }
            Repro => self.repro(ctx, org),
            Sterilize => {
                org.phenotype_mut().child_fertile = false;
                true
            }
            Kazi => {
                let r = self.find_modified_register(REG_AX);
                let prob = (self.reg(r) % 100) as f64 / 100.0;
                if ctx.p(prob) {
                    org.kaboom(0);
                }
                true
            }
            Die => {
                org.die();
                true
            }
            Skip => {
                self.skip_next();
                true
            }
        }
    }

    /// Apply `f` to the modified register (BX by default).
    fn unary(&mut self, f: impl FnOnce(i32) -> i32) -> bool {
        let r = self.find_modified_register(REG_BX);
        self.set_reg(r, f(self.reg(r)));
        true
    }

    /// `?BX? = f(BX, CX)`.
    fn binary(&mut self, f: impl FnOnce(i32, i32) -> i32) -> bool {
        let dst = self.find_modified_register(REG_BX);
        self.set_reg(dst, f(self.reg(REG_BX), self.reg(REG_CX)));
        true
    }

    /// Write subject to copy mutation, replacing stale mutation flags.
    fn write_mutable(&mut self, ctx: &mut Context, to: crate::head::Head, inst: Instruction) {
        let mutated = self.test_copy_mut(ctx);
        let inst = if mutated { self.inst_set.random_inst(ctx) } else { inst };
        self.write_copied(to, inst, mutated, true);
    }

    /// Move the active head to the complement label, or by BX without one.
    fn jump(&mut self, direction: i32) -> bool {
        self.read_label();
        self.complement_next_label();
        let active = self.cur().cur_head;
        if self.cur().next_label.is_empty() {
            let bx = self.reg(REG_BX);
            self.jump_head(active, bx);
            return true;
        }
        let found = self.find_label(direction);
        self.set_head_to(active, found);
        true
    }

    fn throw(&mut self) -> bool {
        self.read_label();
        match self.walk_to_marker("catch", false) {
            Some(pos) => {
                self.set_head_pos(HeadId::Ip, pos as i32);
                self.advance_ip = false;
                true
            }
            None => false,
        }
    }

    fn goto(&mut self) -> bool {
        self.read_label();
        match self.walk_to_marker("label", true) {
            Some(pos) => {
                self.set_head_pos(HeadId::Ip, pos as i32);
                self.advance_ip = false;
                true
            }
            None => false,
        }
    }

    fn put(&mut self, ctx: &mut Context, org: &mut dyn Organism) {
        let r = self.find_modified_register(REG_BX);
        org.do_output(ctx, self.reg(r));
        self.set_reg(r, 0);
    }

    /// Move the code between the read and write heads into the faced
    /// neighbour after the complement of the following label.
    fn inject(&mut self, ctx: &mut Context, org: &mut dyn Organism) -> bool {
        self.adjust_heads();
        let start = self.head(HeadId::Read).pos;
        let end = self.head(HeadId::Write).pos;
        if end - start <= 0 {
            self.fault(org, FaultLocation::Inject, "inject: no code to inject");
            return false;
        }
        if (start as usize) < self.config.min_creature_size {
            self.fault(org, FaultLocation::Inject, "inject: new size too small");
            return false;
        }

        let (start, end) = (start as usize, end as usize);
        let code = self.memory().crop(start, end).to_sequence();
        self.memory_mut().remove(start, end - start);
        self.adjust_heads();

        if !org.has_neighbor() {
            return false;
        }
        self.read_label();
        if self.cur().next_label.is_empty() {
            self.fault(org, FaultLocation::Inject, "inject: label required");
            return false;
        }
        self.complement_next_label();
        let label = self.cur().next_label.clone();
        if !org.inject_host(ctx, &label, &code) {
            self.warn(org, FaultLocation::Inject, "inject: host too large.");
            return false;
        }
        log::debug!("organism {} injected {} lines at {}", org.id(), code.len(), label);
        true
    }

    /// Turn until facing a neighbour whose genome holds the complement of
    /// the following label, giving up after a full circle.
    fn rotate_to_label(&mut self, org: &mut dyn Organism, direction: i32) -> bool {
        let num_neighbors = org.neighborhood_size();
        if num_neighbors == 0 {
            return false;
        }
        self.read_label();
        org.rotate(direction);
        if self.cur().next_label.is_empty() {
            return true;
        }
        self.complement_next_label();
        for _ in 1..num_neighbors {
            if org.neighbor_has_label(&self.cur().next_label) {
                return true;
            }
            org.rotate(direction);
        }
        true
    }

    fn fork_or_fault(&mut self, org: &mut dyn Organism) {
        if !self.fork_thread() {
            self.fault(org, FaultLocation::ThreadFork, "fork-th: thread limit reached");
        }
    }

    /// Fork a thread starting just past the complement label. Without a
    /// label this is `fork-th`.
    fn fork_label(&mut self, org: &mut dyn Organism) -> bool {
        self.read_label();
        self.complement_next_label();
        if self.cur().next_label.is_empty() {
            self.advance_head(HeadId::Ip);
            self.fork_or_fault(org);
            return true;
        }
        let found = self.find_label(1);
        let ip = self.ip();
        if found.pos != ip.pos {
            self.set_head_pos(HeadId::Ip, found.pos + 1);
            self.fork_or_fault(org);
            self.set_head_to(HeadId::Ip, ip);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HardwareConfig, InstEntryConfig};
    use crate::hardware::test_util::{factory, genome, run};
    use crate::mutation::MutationRates;
    use crate::organism::BasicOrganism;

    fn quiet() -> HardwareConfig {
        HardwareConfig {
            mutations: MutationRates::none(),
            ..HardwareConfig::default()
        }
    }

    fn with_full_set(config: HardwareConfig) -> HardwareConfig {
        let lib = cpu_lib();
        let mut names: Vec<&str> = vec!["nop-A", "nop-B", "nop-C"];
        names.extend(lib.entries().iter().filter(|e| e.nop_mod.is_none()).map(|e| e.name));
        HardwareConfig {
            inst_set: names.into_iter().map(InstEntryConfig::named).collect(),
            ..config
        }
    }

    #[test]
    fn test_default_set() {
        let f = factory::<Cpu>(quiet());
        assert_eq!(f.inst_set().len(), 26);
        assert_eq!(f.inst_set().num_nops(), 3);
        assert_eq!(f.inst_set().name(f.inst_set().default_inst()), "nop-A");
        assert_eq!(genome(&f, ANCESTOR).len(), 20);
    }

    #[test]
    fn test_ancestor_replicates() {
        let f = factory::<Cpu>(quiet());
        let g = genome(&f, ANCESTOR);
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        let mut steps = 0;
        while org.offspring.is_empty() && steps < 1000 {
            hw.single_process(&mut ctx, &mut org);
            steps += 1;
        }
        assert_eq!(org.offspring.len(), 1);
        let child = &org.offspring[0];
        assert_eq!(child.genome, g);
        assert!(child.copy_true);
        assert!(child.fertile);
        assert_eq!(org.phenotype.copied_size, 20);
        assert_eq!(org.phenotype.executed_size, 17);
        assert!(org.faults.is_empty());
        assert_eq!(hw.memory().len(), 20);
        assert_eq!(hw.ip().pos, 0);
    }

    #[test]
    fn test_h_alloc_then_h_divide_is_too_long() {
        let f = factory::<Cpu>(quiet());
        let g = genome(&f, "h-alloc h-divide nop-A nop-A nop-A nop-A nop-A nop-A nop-A nop-A");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 2);
        assert_eq!(hw.memory().len(), 30);
        assert_eq!(hw.reg(REG_AX), 10);
        assert_eq!(org.faults.len(), 1);
        assert_eq!(org.faults[0].location, FaultLocation::Divide);
        assert_eq!(org.faults[0].message, "Invalid offspring length (30)");
        assert!(org.offspring.is_empty());
    }

    #[test]
    fn test_failed_condition_skips_one() {
        let f = factory::<Cpu>(quiet());
        let g = genome(&f, "if-n-equ inc dec inc swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 2);
        assert_eq!(hw.reg(REG_BX), -1);
        assert!(!hw.memory().has_flag(1, InstFlags::EXECUTED));
        assert_eq!(hw.ip().pos, 3);
    }

    #[test]
    fn test_conditional_family() {
        let f = factory::<Cpu>(with_full_set(quiet()));
        let g = genome(&f, &["swap-stk"; 10].join(" "));
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        let cases = [
            ("if-equ-0", 0, 0, false),
            ("if-equ-0", 3, 0, true),
            ("if-not-0", 0, 0, true),
            ("if-grt-0", 1, 0, false),
            ("if->=-0", -1, 0, true),
            ("if-les-0", -1, 0, false),
            ("if-<=-0", 1, 0, true),
            ("if-grt", 2, 1, false),
            ("if->=", 1, 2, true),
            ("if-<=", 1, 1, false),
            ("if-bit-1", 4, 0, true),
            ("if-B!=C", 4, 4, true),
        ];
        for (name, bx, cx, skips) in cases {
            let mut hw = f.create(&g);
            hw.set_reg(REG_BX, bx);
            hw.set_reg(REG_CX, cx);
            let inst = f.inst_set().inst(name).unwrap();
            hw.process_bonus_inst(&mut ctx, &mut org, inst);
            assert_eq!(hw.ip().pos, skips as i32, "{}", name);
        }
    }

    #[test]
    fn test_jump_to_complement_label() {
        let f = factory::<Cpu>(with_full_set(quiet()));
        let g = genome(&f, "jump-f nop-A inc inc nop-B dec swap-stk swap-stk swap-stk swap-stk");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 2);
        assert_eq!(hw.reg(REG_BX), -1);
        assert!(!hw.memory().has_flag(2, InstFlags::EXECUTED));
        assert!(org.faults.is_empty());
    }

    #[test]
    fn test_throw_accepts_shorter_catch_label() {
        let f = factory::<Cpu>(with_full_set(quiet()));
        let g = genome(&f, "throw nop-B nop-C inc catch nop-B dec swap-stk swap-stk swap-stk");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(hw.ip().pos, 4);
        run(&mut hw, &mut ctx, &mut org, 3);
        assert_eq!(hw.reg(REG_BX), -1);
        assert!(!hw.memory().has_flag(3, InstFlags::EXECUTED));
    }

    #[test]
    fn test_goto_skips_partial_label() {
        let f = factory::<Cpu>(with_full_set(quiet()));
        let g = genome(
            &f,
            "goto nop-B nop-C inc label nop-B dec label nop-B nop-C inc swap-stk",
        );
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(hw.ip().pos, 7);
        run(&mut hw, &mut ctx, &mut org, 4);
        assert_eq!(hw.reg(REG_BX), 1);
        assert!(!hw.memory().has_flag(6, InstFlags::EXECUTED));
    }

    #[test]
    fn test_set_num_reads_label() {
        let f = factory::<Cpu>(with_full_set(quiet()));
        let g = genome(&f, "set-num nop-B nop-C swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(hw.reg(REG_BX), 5);
        assert_eq!(hw.ip().pos, 3);
    }

    #[test]
    fn test_math_faults() {
        let f = factory::<Cpu>(with_full_set(quiet()));
        let g = genome(&f, "div sqrt swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        hw.set_reg(REG_BX, -4);
        run(&mut hw, &mut ctx, &mut org, 2);
        assert_eq!(org.faults.len(), 2);
        assert_eq!(org.faults[0].message, "div: dividing by 0");
        assert_eq!(org.faults[1].message, "sqrt: value is negative");
        assert!(org.faults.iter().all(|f| f.location == FaultLocation::Math));
    }

    #[test]
    fn test_cost_delays_execution() {
        let mut config = quiet();
        let mut set = cpu_lib().default_set_config();
        for line in set.iter_mut().filter(|l| l.name == "inc") {
            line.cost = 2;
            line.initial_cost = 1;
        }
        config.inst_set = set;
        let f = factory::<Cpu>(config);
        let g = genome(&f, &["inc"; 10].join(" "));
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 5);
        // first-time cost, then every other step
        assert_eq!(hw.reg(REG_BX), 2);
        assert_eq!(org.phenotype.time_used, 5);
    }

    #[test]
    fn test_failure_retries_same_instruction() {
        let mut set = cpu_lib().default_set_config();
        for line in set.iter_mut().filter(|l| l.name == "inc") {
            line.prob_fail = 1.0;
        }
        let f = factory::<Cpu>(HardwareConfig { inst_set: set, ..quiet() });
        let g = genome(&f, "inc inc dec nop-A nop-A nop-A nop-A nop-A nop-A nop-A");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 3);
        assert_eq!(hw.ip().pos, 0);
        assert_eq!(hw.reg(REG_BX), 0);
        assert!(!hw.memory().has_flag(0, InstFlags::EXECUTED));
        assert_eq!(org.phenotype.time_used, 3);
    }

    #[test]
    fn test_fork_and_kill_reuse_ids() {
        let config = HardwareConfig {
            max_cpu_threads: 4,
            ..with_full_set(quiet())
        };
        let f = factory::<Cpu>(config);
        let g = genome(&f, "fork-th inc kill-th swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();

        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(hw.num_threads(), 2);
        assert_eq!(hw.threads()[1].id, 1);

        run(&mut hw, &mut ctx, &mut org, 2);
        assert_eq!(hw.num_threads(), 1);
        assert_eq!(hw.threads()[0].id, 1);
        assert_eq!(hw.threads()[0].regs[REG_BX], 1);
        assert!(!hw.thread_id_chart().contains(0));

        assert!(hw.fork_thread());
        assert_eq!(hw.threads()[1].id, 0);
    }

    #[test]
    fn test_fork_limit_faults() {
        let f = factory::<Cpu>(with_full_set(quiet()));
        let g = genome(&f, &["fork-th"; 10].join(" "));
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(hw.num_threads(), 1);
        assert_eq!(org.faults[0].location, FaultLocation::ThreadFork);
    }

    #[test]
    fn test_implicit_repro_on_wrap() {
        let mut config = with_full_set(quiet());
        config.implicit_repro.end = true;
        let f = factory::<Cpu>(config);
        let g = genome(&f, &["swap-stk"; 10].join(" "));
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 9);
        assert!(org.offspring.is_empty());
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(org.offspring.len(), 1);
        assert_eq!(org.offspring[0].genome, g);
    }

    #[test]
    fn test_rotate_finds_labelled_neighbor() {
        let f = factory::<Cpu>(with_full_set(quiet()));
        let g = genome(&f, "rotate-r nop-A swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk swap-stk");
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        org.neighbor = true;
        org.labeled_neighbor = Some(3);
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(org.facing, 3);
    }

    #[test]
    fn test_inject_moves_code_to_neighbor() {
        let f = factory::<Cpu>(with_full_set(quiet()));
        let text = format!("inject nop-A {}", ["inc"; 18].join(" "));
        let g = genome(&f, &text);
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        org.neighbor = true;
        hw.set_head_pos(HeadId::Read, 12);
        hw.set_head_pos(HeadId::Write, 16);
        run(&mut hw, &mut ctx, &mut org, 1);
        assert!(org.faults.is_empty());
        assert_eq!(hw.memory().len(), 16);
        assert_eq!(org.injected.len(), 1);
        assert_eq!(org.injected[0].0.to_string(), "B");
        assert_eq!(org.injected[0].1.len(), 4);
    }

    #[test]
    fn test_inject_without_code_faults() {
        let f = factory::<Cpu>(with_full_set(quiet()));
        let g = genome(&f, &["inject"; 10].join(" "));
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(org.faults[0].message, "inject: no code to inject");
        assert_eq!(hw.memory().len(), 10);
    }

    #[test]
    fn test_copy_clears_stale_mutation_flags() {
        let f = factory::<Cpu>(with_full_set(quiet()));
        let g = genome(&f, &["copy"; 10].join(" "));
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        hw.memory_mut().set_flag(5, InstFlags::MUTATED);
        hw.set_reg(REG_AX, 5);
        run(&mut hw, &mut ctx, &mut org, 1);
        assert!(hw.memory().has_flag(5, InstFlags::COPIED));
        assert!(!hw.memory().has_flag(5, InstFlags::MUTATED));
    }
}
