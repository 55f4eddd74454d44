//! The SMT CPU
//!
//! Registers are stacks: AX, BX and CX are local to each thread, DX is shared.
//! Memory is a set of spaces keyed by nop labels. Space 0 holds the genome;
//! the others are created on demand and serve as offspring buffers, call
//! targets and parasite code. Threads are created and killed by label, and
//! code written into a space can be injected into a neighbour, where it runs
//! on a thread of its own.

use super::{Hardware, Variant, VariantKind, REG_AX, REG_BX, REG_CX};
use crate::context::Context;
use crate::fault::FaultLocation;
use crate::head::{Head, HeadId};
use crate::inst::{InstFlags, Instruction};
use crate::inst_lib::{InstLib, InstLibEntry};
use crate::label::CodeLabel;
use crate::memory::GenomeBuffer;
use crate::organism::{DivideType, Organism};
use crate::thread::Thread;
use std::collections::HashMap;

/// Longest label read by `Mem-Set`, `Mem-Mark`, `Call` and `Inject`.
pub const MAX_MEMSPACE_LABEL: usize = 3;
/// Longest label read by `Thread-Set` and `Thread-Get`.
pub const MAX_THREAD_LABEL: usize = 3;

/// Copies main memory into space `B` one instruction at a time and divides
/// once the read head wraps.
pub const ANCESTOR: &str = "Mem-Set Nop-B Head-Move Nop-C Nop-D Head-Move Nop-D Nop-A \
     Inst-Read Head-Push Nop-B Nop-C If-Equal Nop-C Divide Val-Delete Nop-C Inst-Write Head-Move";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtOp {
    Nop,
    ValShift,
    ValNand,
    ValAdd,
    ValSub,
    ValNegate,
    ValMult,
    ValDiv,
    ValMod,
    ValInc,
    ValDec,
    ValCopy,
    ValDelete,
    StackDelete,
    PushNext,
    PushPrev,
    PushComp,
    MemSet,
    MemMark,
    Divide,
    Inject,
    InstRead,
    InstWrite,
    IfEqual,
    IfNotEqual,
    IfLess,
    IfGreater,
    HeadPush,
    HeadPop,
    HeadMove,
    Call,
    Return,
    Search,
    Io,
    ThreadSet,
    ThreadGet,
    Apoptosis,
}

/// Per-organism SMT state: memory space and thread label tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smt {
    mem_labels: HashMap<i32, usize>,
    marks: Vec<bool>,
    thread_labels: HashMap<i32, usize>,
    /// Space the pending offspring is built in
    cur_child: usize,
}

impl Smt {
    pub fn is_marked(&self, space: usize) -> bool {
        self.marks.get(space).copied().unwrap_or(false)
    }

    /// Space registered under `label`, if any.
    pub fn space_for(&self, label: &CodeLabel) -> Option<usize> {
        self.mem_labels.get(&label.as_int(Smt::NUM_NOPS)).copied()
    }

    /// Thread index registered under `label`, if any.
    pub fn thread_for(&self, label: &CodeLabel) -> Option<usize> {
        self.thread_labels.get(&label.as_int(Smt::NUM_NOPS)).copied()
    }
}

const DEFAULT_SET: [&str; 40] = [
    "Nop-A", "Nop-B", "Nop-C", "Nop-D", "Val-Shift", "Val-Nand", "Val-Add", "Val-Sub", "Val-Negate",
    "Val-Mult", "Val-Div", "Val-Mod", "Val-Inc", "Val-Dec", "Val-Copy", "Val-Delete", "Stack-Delete",
    "Push-Next", "Push-Prev", "Push-Comp", "Mem-Set", "Mem-Mark", "Divide", "Inject", "Inst-Read",
    "Inst-Write", "If-Equal", "If-Not-Equal", "If-Less", "If-Greater", "Head-Push", "Head-Pop",
    "Head-Move", "Call", "Return", "Search", "IO", "Thread-Set", "Thread-Get", "Apoptosis",
];

fn smt_lib() -> InstLib<SmtOp> {
    use SmtOp::*;
    type E = InstLibEntry<SmtOp>;
    let nop_desc = "No-operation; selects a stack or head for other instructions";
    let todo = "Reserved; does nothing";
    InstLib::new(
        vec![
            E::nop("Nop-A", Nop, 0, nop_desc).default_inst(),
            E::nop("Nop-B", Nop, 1, nop_desc),
            E::nop("Nop-C", Nop, 2, nop_desc),
            E::nop("Nop-D", Nop, 3, nop_desc),
            E::new("Alt", Nop, todo),
            E::new("Val-Shift", ValShift, "Push ?BX? shifted right by ?next? (left when negative)"),
            E::new("Val-Nand", ValNand, "Push ?BX? nand ?next?"),
            E::new("Val-Add", ValAdd, "Push ?BX? + ?next?"),
            E::new("Val-Sub", ValSub, "Push ?BX? - ?next?"),
            E::new("Val-Negate", ValNegate, "Push -?BX?"),
            E::new("Val-Mult", ValMult, "Push ?BX? * ?next?"),
            E::new("Val-Div", ValDiv, "Push ?BX? / ?next?"),
            E::new("Val-Mod", ValMod, "Push ?BX? % ?next?"),
            E::new("Val-Inc", ValInc, "Push ?BX? + 1"),
            E::new("Val-Dec", ValDec, "Push ?BX? - 1"),
            E::new("Val-Copy", ValCopy, "Push a copy of the top of ?BX?"),
            E::new("Val-Delete", ValDelete, "Pop ?BX?"),
            E::new("Stack-Delete", StackDelete, "Clear ?BX?"),
            E::new("Push-Next", PushNext, "Move the top of ?AX? onto the next stack"),
            E::new("Push-Prev", PushPrev, "Move the top of ?BX? onto the previous stack"),
            E::new("Push-Comp", PushComp, "Move the top of ?BX? onto its complement stack"),
            E::new("Mem-Set", MemSet, "Flow head to the start of the labelled memory space"),
            E::new("Mem-Mark", MemMark, "Toggle the mark on the labelled memory space"),
            E::new("Mem-Split", Nop, todo),
            E::new("Mem-Merge", Nop, todo),
            E::new("Divide", Divide, "Divide off the write head's memory space"),
            E::new("Inject", Inject, "Inject the write head's memory space into a neighbour"),
            E::new("Inst-Read", InstRead, "Push the opcode under ?read? head onto ?AX?"),
            E::new("Inst-Write", InstWrite, "Pop ?AX? and write it under ?write? head"),
            E::new("Block-Read", Nop, todo),
            E::new("Block-Write", Nop, todo),
            E::new("If-Equal", IfEqual, "Execute next if ?AX? == ?next?"),
            E::new("If-Not-Equal", IfNotEqual, "Execute next if ?AX? != ?next?"),
            E::new("If-Less", IfLess, "Execute next if ?AX? < ?next?"),
            E::new("If-Greater", IfGreater, "Execute next if ?AX? > ?next?"),
            E::new("Head-Push", HeadPush, "Push the location of ?IP? onto ?BX?"),
            E::new("Head-Pop", HeadPop, "Pop ?BX? into the location of ?IP?"),
            E::new("Head-Move", HeadMove, "Move ?IP? to ?flow?"),
            E::new("Head-Set", Nop, todo),
            E::new("Call", Call, "Push the IP onto ?AX? and jump to the labelled space or the flow head"),
            E::new("Return", Return, "Pop ?AX? into the IP"),
            E::new("Search", Search, "Find the complement label; flow head on it"),
            E::new("Search-Mem", Nop, todo),
            E::new("IO", Io, "Output the top of ?BX?, push the next input"),
            E::new("Thread-Set", ThreadSet, "Create or kill a thread"),
            E::new("Thread-Get", ThreadGet, "Push a thread's state and id"),
            E::new("Apoptosis", Apoptosis, "Kill the organism"),
            E::new("NULL", Nop, "True no-operation"),
        ],
        DEFAULT_SET.to_vec(),
    )
}

impl Variant for Smt {
    type Op = SmtOp;

    const KIND: VariantKind = VariantKind::Smt;
    const NUM_NOPS: usize = 4;
    const NUM_REGISTERS: usize = 4;
    const NUM_LOCAL_STACKS: usize = 3;
    const COMPLEMENT_SHIFT: u8 = 2;
    const FAIL_BEFORE_DISPATCH: bool = true;
    const CHARGE_ADDL_TIME_AFTER: bool = true;

    fn build_lib() -> InstLib<SmtOp> {
        smt_lib()
    }

    fn new_state() -> Self {
        Smt {
            mem_labels: HashMap::new(),
            marks: vec![false],
            thread_labels: HashMap::new(),
            cur_child: 0,
        }
    }

    fn execute(hw: &mut Hardware<Self>, ctx: &mut Context, org: &mut dyn Organism, op: SmtOp) -> bool {
        hw.dispatch(ctx, org, op)
    }

    /// Main memory carries one trailing default instruction past the genome.
    fn on_reset(hw: &mut Hardware<Self>) {
        let fill = hw.inst_set.default_inst();
        let len = hw.memory().len();
        hw.memory_mut().resize(len + 1, fill);
    }

    /// Extra threads are given up first; the last one restarts in main
    /// memory with empty local stacks.
    fn birth_reset(hw: &mut Hardware<Self>) {
        if hw.num_threads() > 1 {
            let id = hw.cur_thread + 1;
            hw.thread_kill(id);
        } else {
            hw.cur_mut().reset_heads_and_stacks(0);
        }
    }

    fn before_step(hw: &mut Hardware<Self>, ctx: &mut Context, org: &mut dyn Organism) {
        hw.trigger_update_mutations(ctx, org);
    }

    fn after_step(hw: &mut Hardware<Self>, ctx: &mut Context, org: &mut dyn Organism, wrapped: bool) {
        hw.check_implicit_repro(ctx, org, wrapped);
    }

    fn thread_runnable(hw: &Hardware<Self>) -> bool {
        hw.cur().running
    }

    /// The whole offspring space counts, not a region of main memory.
    fn copied_size(hw: &Hardware<Self>, _parent_size: usize, _child_size: usize) -> usize {
        let space = hw.state.cur_child;
        let len = hw.space_len(space);
        hw.spaces
            .get(space)
            .map_or(0, |mem| mem.count_flagged(0..len, InstFlags::COPIED))
    }
}

impl Hardware<Smt> {
    fn dispatch(&mut self, ctx: &mut Context, org: &mut dyn Organism, op: SmtOp) -> bool {
        use SmtOp::*;
        match op {
            Nop => true,
            ValShift => {
                let dst = self.find_modified_register(REG_BX);
                let op1 = self.find_modified_register(dst);
                let op2 = self.find_modified_next_register(op1);
                let (value, shift) = (self.top(op1), self.top(op2));
                let shifted = match shift {
                    0..=31 => value >> shift,
                    -31..=-1 => value.wrapping_shl((-shift) as u32),
                    _ => 0,
                };
                self.push_to(dst, shifted);
                true
            }
            ValNand => self.val_binary(|a, b| !(a & b)),
            ValAdd => self.val_binary(i32::wrapping_add),
            ValSub => self.val_binary(i32::wrapping_sub),
            ValMult => self.val_binary(i32::wrapping_mul),
            ValNegate => {
                let dst = self.find_modified_register(REG_BX);
                let src = self.find_modified_register(REG_BX);
                let v = self.top(src).wrapping_neg();
                self.push_to(dst, v);
                true
            }
            ValDiv => {
                let dst = self.find_modified_register(REG_BX);
                let op1 = self.find_modified_register(REG_BX);
                let op2 = self.find_modified_next_register(op1);
                let (a, b) = (self.top(op1), self.top(op2));
                if b == 0 {
                    self.fault(org, FaultLocation::Math, "div: dividing by 0");
                    return false;
                }
                if a == i32::MIN && b == -1 {
                    self.fault(org, FaultLocation::Math, "div: overflow exception");
                    return false;
                }
                self.push_to(dst, a / b);
                true
            }
            ValMod => {
                let dst = self.find_modified_register(REG_BX);
                let op1 = self.find_modified_register(REG_BX);
                let op2 = self.find_modified_next_register(op1);
                let (a, b) = (self.top(op1), self.top(op2));
                if b == 0 {
                    self.fault(org, FaultLocation::Math, "mod: modding by 0");
                    return false;
                }
                self.push_to(dst, a.wrapping_rem(b));
                true
            }
            ValInc => self.val_unary(|v| v.wrapping_add(1)),
            ValDec => self.val_unary(|v| v.wrapping_sub(1)),
            ValCopy => self.val_unary(|v| v),
            ValDelete => {
                let s = self.find_modified_register(REG_BX);
                self.stack_mut(s).pop();
                true
            }
            StackDelete => {
                let s = self.find_modified_register(REG_BX);
                self.stack_mut(s).clear();
                true
            }
            PushNext => {
                let src = self.find_modified_register(REG_AX);
                let dst = self.find_modified_next_register(src);
                self.move_top(src, dst);
                true
            }
            PushPrev => {
                let src = self.find_modified_register(REG_BX);
                let dst = self.find_modified_previous_register(src);
                self.move_top(src, dst);
                true
            }
            PushComp => {
                // An unmodified complement lands on the previous stack.
                let src = self.find_modified_register(REG_BX);
                let dst = self.find_modified_previous_register(src);
                self.move_top(src, dst);
                true
            }
            MemSet => {
                self.read_label_max(MAX_MEMSPACE_LABEL);
                let label = self.cur().next_label.clone();
                let space = self.find_memory_space_label(&label);
                self.set_head_to(HeadId::Flow, Head::new(0, space));
                true
            }
            MemMark => {
                self.read_label_max(MAX_MEMSPACE_LABEL);
                let label = self.cur().next_label.clone();
                let space = self.find_memory_space_label(&label);
                if let Some(mark) = self.state.marks.get_mut(space) {
                    *mark = !*mark;
                }
                true
            }
            Divide => self.divide_space(ctx, org, 1.0),
            Inject => {
                self.read_label_max(MAX_MEMSPACE_LABEL);
                self.inject_parasite(ctx, org, 1.0)
            }
            InstRead => {
                let head = self.find_modified_head(HeadId::Read);
                let dst = self.find_modified_register(REG_AX);
                self.adjust_head(head);
                let inst = if self.test_copy_mut(ctx) {
                    self.inst_set.random_inst(ctx)
                } else {
                    self.head_inst(head)
                };
                self.push_to(dst, inst.op() as i32);
                self.read_inst(inst);
                self.advance_head(head);
                true
            }
            InstWrite => {
                let head = self.find_modified_head(HeadId::Write);
                let src = self.find_modified_register(REG_AX);
                self.inst_write(head, src);
                true
            }
            IfEqual => self.if_cmp(|a, b| a == b),
            IfNotEqual => self.if_cmp(|a, b| a != b),
            IfLess => self.if_cmp(|a, b| a < b),
            IfGreater => self.if_cmp(|a, b| a > b),
            HeadPush => {
                let head = self.find_modified_head(HeadId::Ip);
                let dst = self.find_modified_register(REG_BX);
                let loc = self.head(head).full_location();
                self.push_to(dst, loc);
                true
            }
            HeadPop => {
                let head = self.find_modified_head(HeadId::Ip);
                let src = self.find_modified_register(REG_BX);
                let loc = self.stack_mut(src).pop();
                self.set_head_location(head, loc);
                true
            }
            HeadMove => {
                let head = self.find_modified_head(HeadId::Ip);
                let target = self.find_modified_head(HeadId::Flow);
                if head != target {
                    self.op_move_head(head, target);
                } else {
                    self.advance_head(head);
                }
                true
            }
            Call => {
                let dst = self.find_modified_register(REG_AX);
                let loc = self.ip().full_location();
                self.push_to(dst, loc);
                self.read_label_max(MAX_MEMSPACE_LABEL);
                let label = self.cur().next_label.clone();
                let target = if label.is_empty() {
                    self.head(HeadId::Flow)
                } else {
                    Head::new(0, self.find_memory_space_label(&label))
                };
                self.set_head_to(HeadId::Ip, target);
                true
            }
            Return => {
                let src = self.find_modified_register(REG_AX);
                let loc = self.stack_mut(src).pop();
                self.set_head_location(HeadId::Ip, loc);
                true
            }
            Search => {
                self.search();
                true
            }
            Io => {
                let dst = self.find_modified_register(REG_BX);
                let src = self.find_modified_register(dst);
                org.do_output(ctx, self.top(src));
                let value = org.next_input();
                self.push_to(dst, value);
                org.do_input(value);
                true
            }
            ThreadSet => self.thread_set(org),
            ThreadGet => {
                self.thread_get();
                true
            }
            Apoptosis => {
                org.die();
                true
            }
        }
    }

    #[inline]
    fn top(&self, stack: usize) -> i32 {
        self.stack(stack).top()
    }

    #[inline]
    fn push_to(&mut self, stack: usize, value: i32) {
        self.stack_mut(stack).push(value);
    }

    fn move_top(&mut self, src: usize, dst: usize) {
        let v = self.stack_mut(src).pop();
        self.push_to(dst, v);
    }

    fn val_binary(&mut self, f: impl Fn(i32, i32) -> i32) -> bool {
        let dst = self.find_modified_register(REG_BX);
        let op1 = self.find_modified_register(REG_BX);
        let op2 = self.find_modified_next_register(op1);
        let v = f(self.top(op1), self.top(op2));
        self.push_to(dst, v);
        true
    }

    fn val_unary(&mut self, f: impl Fn(i32) -> i32) -> bool {
        let dst = self.find_modified_register(REG_BX);
        let src = self.find_modified_register(dst);
        let v = f(self.top(src));
        self.push_to(dst, v);
        true
    }

    fn if_cmp(&mut self, holds: impl Fn(i32, i32) -> bool) -> bool {
        let op1 = self.find_modified_register(REG_AX);
        let op2 = self.find_modified_next_register(op1);
        if !holds(self.top(op1), self.top(op2)) {
            self.skip_next();
        }
        true
    }

    /// Space indices wrap around the number of spaces.
    fn normalize_space(&self, space: usize) -> usize {
        space % self.spaces.len().max(1)
    }

    fn set_head_location(&mut self, id: HeadId, loc: i32) {
        let mut target = Head::from_full_location(loc);
        target.space = self.normalize_space(target.space);
        self.set_head_to(id, target);
    }

    fn fresh_space(&self) -> GenomeBuffer {
        GenomeBuffer::filled(1, self.inst_set.default_inst())
    }

    /// Space registered under `label`, created empty on first use. The
    /// empty label names main memory.
    pub fn find_memory_space_label(&mut self, label: &CodeLabel) -> usize {
        if label.is_empty() {
            return 0;
        }
        let key = label.as_int(Smt::NUM_NOPS);
        if let Some(&space) = self.state.mem_labels.get(&key) {
            return space;
        }
        let space = self.spaces.len();
        let fresh = self.fresh_space();
        self.spaces.push(fresh);
        self.state.marks.push(false);
        self.state.mem_labels.insert(key, space);
        log::trace!("memory space {} created for label {}", space, label);
        space
    }

    pub fn memory_space_exists(&self, label: &CodeLabel) -> bool {
        self.state.space_for(label).is_some()
    }

    /// Pop `src` and write it under `head`, growing the space by one slot
    /// when the head sits on its last line.
    fn inst_write(&mut self, head: HeadId, src: usize) {
        let h = self.head(head);
        let space = self.normalize_space(h.space);
        let len = self.space_len(space);
        let fill = self.inst_set.default_inst();
        if len == 0 {
            self.spaces[space].resize(1, fill);
        } else if h.pos >= len as i32 - 1 {
            let mem = &mut self.spaces[space];
            mem.resize(len + 1, fill);
            mem.copy_slot(len, len - 1);
        }
        self.head_mut(head).space = space;
        self.adjust_head(head);

        let mut value = self.stack_mut(src).pop();
        if value < 0 || value as usize >= self.inst_set.len() {
            value = 0;
        }
        if let Some(idx) = self.write_at(self.head(head), Instruction(value as u8)) {
            self.spaces[space].set_flag(idx, InstFlags::COPIED);
        }
        self.advance_head(head);
    }

    /// Complement search from the start of the IP's space. A hit pushes
    /// the distance past the label onto BX and the label size onto AX and
    /// puts the flow head on the match; a miss pushes 0 onto BX and puts
    /// the flow head after the IP.
    fn search(&mut self) {
        self.read_label();
        self.complement_next_label();
        let found = self.find_label(0);
        let ip = self.ip();
        if found.pos == ip.pos {
            self.set_head_to(HeadId::Flow, Head::new(ip.pos + 1, ip.space));
            self.push_to(REG_BX, 0);
        } else {
            let size = self.cur().next_label.len() as i32;
            self.push_to(REG_BX, found.pos - ip.pos + size + 1);
            self.push_to(REG_AX, size);
            self.set_head_to(HeadId::Flow, found);
        }
    }

    /// Divide off the write head's space, up to the write head.
    fn divide_space(&mut self, ctx: &mut Context, org: &mut dyn Organism, mut_multiplier: f64) -> bool {
        let write = self.head(HeadId::Write);
        if write.space >= self.spaces.len() {
            return false;
        }
        let space = write.space;
        self.state.cur_child = space;
        let parent_size = self.memory().len();
        let child_size = write.index().min(self.space_len(space));
        if !self.divide_check_viable(org, parent_size, child_size, false) {
            return false;
        }

        let mut child = self.spaces[space].crop(0, child_size);
        let muts = self.do_mutations(ctx, org, &mut child, mut_multiplier, usize::MAX);
        let mut genome = child.to_sequence();
        self.test_fitness_measures(ctx, org, &mut genome);
        let offspring = self.make_offspring(org, genome, muts, DivideType::Normal);

        self.spaces[space] = self.fresh_space();
        self.finish_divide(ctx, org, offspring)
    }

    /// Carve the code before the write head out of its space and hand it
    /// to the organism for injection into a neighbour.
    pub fn inject_parasite(&mut self, ctx: &mut Context, org: &mut dyn Organism, mut_multiplier: f64) -> bool {
        let write = self.head(HeadId::Write);
        let space = self.normalize_space(write.space);
        let end = write.pos;
        if end <= 0 {
            self.fault(org, FaultLocation::Inject, "inject: no code to inject");
            return false;
        }
        if (end as usize) < self.config.min_inject_size {
            self.spaces[space] = self.fresh_space();
            self.fault(org, FaultLocation::Inject, "inject: new size too small");
            return false;
        }

        let end = (end as usize).min(self.space_len(space));
        let mut code = self.spaces[space].crop(0, end);
        let mutations = self.do_inject_mutations(ctx, &mut code, mut_multiplier);

        let label = self.cur().next_label.clone();
        let signal = !code.is_empty() && org.inject_parasite(ctx, &label, code.sequence());
        log::debug!(
            "organism {} injects {} lines at {} ({} mutations): {}",
            org.id(),
            code.len(),
            label,
            mutations,
            signal
        );

        self.spaces[space] = self.fresh_space();
        let ip_space = self.ip().space;
        self.cur_mut().reset_heads_and_stacks(ip_space);
        self.advance_ip = false;
        signal
    }

    /// Per-site point, insert and delete mutations on injected code, plus
    /// the parent mutations on main memory.
    fn do_inject_mutations(&mut self, ctx: &mut Context, code: &mut GenomeBuffer, mut_multiplier: f64) -> usize {
        let rates = self.rates.clone();
        let mut total = 0;

        if rates.inject_mut_prob > 0.0 {
            let num_mut = ctx.binomial(code.len(), rates.inject_mut_prob / mut_multiplier);
            for _ in 0..num_mut {
                let site = ctx.uint(code.len());
                code.set(site, self.inst_set.random_inst(ctx));
            }
            total += num_mut;
        }

        if rates.inject_ins_prob > 0.0 {
            let num_mut = ctx
                .binomial(code.len(), rates.inject_ins_prob)
                .min(self.config.max_creature_size.saturating_sub(code.len()));
            let mut sites: Vec<usize> = (0..num_mut).map(|_| ctx.uint(code.len() + 1)).collect();
            sites.sort_unstable();
            for &site in sites.iter().rev() {
                code.insert(site, self.inst_set.random_inst(ctx));
            }
            total += num_mut;
        }

        if rates.inject_del_prob > 0.0 {
            let num_mut = ctx
                .binomial(code.len(), rates.inject_del_prob)
                .min(code.len().saturating_sub(self.config.min_inject_size));
            for _ in 0..num_mut {
                let site = ctx.uint(code.len());
                code.remove(site, 1);
            }
            total += num_mut;
        }

        if rates.parent_mut_prob > 0.0 {
            for i in 0..self.memory().len() {
                if ctx.p(rates.parent_mut_prob) {
                    let inst = self.inst_set.random_inst(ctx);
                    self.memory_mut().set(i, inst);
                    self.memory_mut().set_flag(i, InstFlags::MUTATED);
                    total += 1;
                }
            }
        }
        total
    }

    /// Host side of an injection: place `code` in a new space named by
    /// `label` and start a thread on it owned by `owner`. Refuses an empty
    /// label, a label whose space already exists, a running thread under
    /// the same label and a full thread table.
    pub fn parasite_infect_host(&mut self, label: &CodeLabel, code: &[Instruction], owner: u64) -> bool {
        if label.is_empty() || self.memory_space_exists(label) {
            return false;
        }

        let thread = match self.state.thread_for(label) {
            Some(idx) if self.threads[idx].running => return false,
            Some(idx) => idx,
            None => {
                if self.threads.len() >= self.config.max_cpu_threads {
                    return false;
                }
                let Some(idx) = self.add_thread() else {
                    return false;
                };
                self.state.thread_labels.insert(label.as_int(Smt::NUM_NOPS), idx);
                idx
            }
        };

        let space = self.find_memory_space_label(label);
        self.spaces[space] = GenomeBuffer::from_sequence(code);
        let t = &mut self.threads[thread];
        t.reset(space);
        t.owner = Some(owner);
        log::debug!("parasite {} infects space {} on thread {}", owner, space, thread);
        true
    }

    /// Append a fresh thread with the lowest free id.
    fn add_thread(&mut self) -> Option<usize> {
        let id = self.id_chart.claim()?;
        self.threads.push(Thread::new(id, Smt::NUM_LOCAL_STACKS));
        Some(self.threads.len() - 1)
    }

    /// Start the thread named by `label` in `space`. Returns its 1-based
    /// id, or 0 when the table is full, the label is empty or the thread
    /// is already running.
    pub(crate) fn thread_create(&mut self, label: &CodeLabel, space: usize) -> usize {
        if self.threads.len() >= self.config.max_cpu_threads || label.is_empty() {
            return 0;
        }

        if let Some(idx) = self.state.thread_for(label) {
            if self.threads[idx].running {
                return 0;
            }
            let t = &mut self.threads[idx];
            t.reset(space);
            t.owner = None;
            return idx + 1;
        }

        let Some(idx) = self.add_thread() else {
            return 0;
        };
        self.state.thread_labels.insert(label.as_int(Smt::NUM_NOPS), idx);
        let owner = self.cur().owner;
        let t = &mut self.threads[idx];
        t.reset(space);
        t.owner = owner;
        log::debug!("thread {} created for label {} in space {}", idx + 1, label, space);
        idx + 1
    }

    /// Stop the thread with 1-based `id`. It keeps its slot.
    pub(crate) fn thread_kill(&mut self, id: usize) -> bool {
        if id < 1 || id > self.threads.len() {
            return false;
        }
        let idx = id - 1;
        if self.cur_thread == idx {
            self.thread_next();
        }
        self.threads[idx].running = false;
        true
    }

    fn thread_kill_label(&mut self, label: &CodeLabel) -> bool {
        match self.state.thread_for(label) {
            Some(idx) => self.thread_kill(idx + 1),
            None => false,
        }
    }

    /// With a label: a nonzero BX creates the thread and pushes its id onto
    /// CX, zero kills it. Without one: zero in BX kills the thread whose id
    /// is in CX, or the current thread when CX is 0.
    fn thread_set(&mut self, org: &mut dyn Organism) -> bool {
        self.read_label_max(MAX_THREAD_LABEL);
        let label = self.cur().next_label.clone();
        let priority = self.top(REG_BX);

        if !label.is_empty() {
            if priority != 0 {
                let space = self.head(HeadId::Flow).space;
                let id = self.thread_create(&label, space);
                self.push_to(REG_CX, id as i32);
                if id == 0 {
                    self.fault(org, FaultLocation::ThreadFork, "thread-set: cannot create thread");
                }
                return false;
            }
            let ok = self.thread_kill_label(&label);
            if !ok {
                self.fault(org, FaultLocation::ThreadKill, "thread-set: no thread to kill");
            }
            return ok;
        }

        if priority != 0 {
            return false;
        }
        let id = match self.top(REG_CX) {
            0 => self.cur_thread + 1,
            id if id < 0 => 0,
            id => id as usize,
        };
        let ok = self.thread_kill(id);
        if !ok {
            self.fault(org, FaultLocation::ThreadKill, "thread-set: no thread to kill");
        }
        ok
    }

    /// Push a thread's running state onto BX and its id onto CX, or 0 and
    /// 0 when there is no such thread. The thread is named by the following
    /// label, or by the id in CX (0 meaning the current thread).
    fn thread_get(&mut self) {
        self.read_label_max(MAX_THREAD_LABEL);
        let label = self.cur().next_label.clone();

        let (running, id) = if !label.is_empty() {
            match self.state.thread_for(&label) {
                Some(idx) => (self.threads[idx].running as i32, idx as i32 + 1),
                None => (0, 0),
            }
        } else {
            match self.top(REG_CX) {
                0 => (1, self.cur_thread as i32 + 1),
                id if id < 1 || id as usize > self.threads.len() => (0, 0),
                id => (self.threads[id as usize - 1].running as i32, id),
            }
        };
        self.push_to(REG_BX, running);
        self.push_to(REG_CX, id);
    }
}
