//! The virtual CPU
//!
//! `Hardware<V>` holds everything one organism needs to run: memory, the
//! thread array, cost counters and the variant's own state. The fetch and
//! execute cycle, cost gating, threading and the register/head helpers are
//! shared; instruction tables and the few behaviours that differ live behind
//! the `Variant` trait.
//!
//! Submodules:
//! - `search`: label reading and complement search
//! - `alloc`: memory allocation before a divide
//! - `divide`: viability, mutations, fitness test and offspring hand-off
//! - `triggers`: the generic mutation rule table
//! - `ops`: instruction bodies shared by the variants
//! - `cpu`, `experimental`, `smt`: the three variants

pub mod alloc;
pub mod cpu;
pub mod divide;
pub mod experimental;
pub mod ops;
pub mod search;
pub mod smt;
pub mod triggers;

use crate::config::{HardwareConfig, ThreadSlicing};
use crate::context::Context;
use crate::error::InstSetError;
use crate::fault::{Fault, FaultLocation};
use crate::head::{Head, HeadId};
use crate::inst::{InstFlags, Instruction};
use crate::inst_lib::{InstLib, InstSet};
use crate::memory::GenomeBuffer;
use crate::mutation::MutationRates;
use crate::organism::Organism;
use crate::stack::CpuStack;
use crate::test_cpu::TestCpu;
use crate::thread::{Thread, ThreadIdChart};
use std::fmt::Debug;
use std::sync::Arc;

pub const REG_AX: usize = 0;
pub const REG_BX: usize = 1;
pub const REG_CX: usize = 2;
pub const REG_DX: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Cpu,
    Experimental,
    Smt,
}

/// The hooks in which hardware variants differ.
pub trait Variant: Sized + Clone + Debug + Send + Sync + 'static {
    /// Opcode enum dispatched by `execute`
    type Op: Copy + Debug + PartialEq + Send + Sync + 'static;

    const KIND: VariantKind;
    const NUM_NOPS: usize;
    const NUM_REGISTERS: usize;
    const NUM_LOCAL_STACKS: usize;
    /// Rotation that turns a label into its complement
    const COMPLEMENT_SHIFT: u8;
    /// Draw the failure probability after the cost gates; IP advances on
    /// failure. Otherwise the draw is a gate and a failure retries.
    const FAIL_BEFORE_DISPATCH: bool;
    /// Charge additional time only after a successful execution instead of
    /// whenever the instruction is dispatched.
    const CHARGE_ADDL_TIME_AFTER: bool;

    fn build_lib() -> InstLib<Self::Op>;

    fn new_state() -> Self;

    fn execute(hw: &mut Hardware<Self>, ctx: &mut Context, org: &mut dyn Organism, op: Self::Op) -> bool;

    fn on_reset(_hw: &mut Hardware<Self>) {}

    /// Parent reset under the birth divide method.
    fn birth_reset(hw: &mut Hardware<Self>) {
        let space = hw.cur().ip().space;
        hw.cur_mut().reset_heads_and_stacks(space);
    }

    fn before_step(_hw: &mut Hardware<Self>, _ctx: &mut Context, _org: &mut dyn Organism) {}

    /// Runs once after the instruction loop. `wrapped` is true when the
    /// IP ended up before where it started.
    fn after_step(_hw: &mut Hardware<Self>, _ctx: &mut Context, _org: &mut dyn Organism, _wrapped: bool) {}

    fn thread_runnable(_hw: &Hardware<Self>) -> bool {
        true
    }

    /// Copied lines of the offspring region, for the viability check.
    fn copied_size(hw: &Hardware<Self>, parent_size: usize, child_size: usize) -> usize {
        hw.memory()
            .count_flagged(parent_size..parent_size + child_size, InstFlags::COPIED)
    }
}

/// Builds the instruction library and set once and stamps out engines.
#[derive(Debug, Clone)]
pub struct HardwareFactory<V: Variant> {
    lib: Arc<InstLib<V::Op>>,
    inst_set: Arc<InstSet>,
    config: Arc<HardwareConfig>,
    test_config: Arc<HardwareConfig>,
}

impl<V: Variant> HardwareFactory<V> {
    pub fn new(config: HardwareConfig) -> Result<Self, InstSetError> {
        let lib = V::build_lib();
        let lines = if config.inst_set.is_empty() {
            lib.default_set_config()
        } else {
            config.inst_set.clone()
        };
        let inst_set = InstSet::build(&lib, &lines)?;
        let test_config = config.for_test_cpu();
        log::debug!(
            "{:?} hardware: {} of {} library instructions in set",
            V::KIND,
            inst_set.len(),
            lib.len()
        );
        Ok(Self {
            lib: Arc::new(lib),
            inst_set: Arc::new(inst_set),
            config: Arc::new(config),
            test_config: Arc::new(test_config),
        })
    }

    pub fn inst_set(&self) -> &InstSet {
        &self.inst_set
    }

    pub fn lib(&self) -> &InstLib<V::Op> {
        &self.lib
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }

    pub fn create(&self, genome: &[Instruction]) -> Hardware<V> {
        Hardware::new(
            self.lib.clone(),
            self.inst_set.clone(),
            self.config.clone(),
            self.test_config.clone(),
            genome,
        )
    }

    pub fn test_cpu(&self) -> TestCpu<V> {
        TestCpu::new(self.lib.clone(), self.inst_set.clone(), self.test_config.clone())
    }

    /// Parse a genome written as instruction names.
    pub fn parse_genome(&self, text: &str) -> Result<Vec<Instruction>, InstSetError> {
        self.inst_set.parse_genome(text)
    }
}

#[derive(Debug, Clone)]
pub struct Hardware<V: Variant> {
    pub(crate) lib: Arc<InstLib<V::Op>>,
    pub(crate) inst_set: Arc<InstSet>,
    pub(crate) config: Arc<HardwareConfig>,
    /// Config handed to test CPUs spawned by the fitness test
    pub(crate) test_config: Arc<HardwareConfig>,
    /// The organism's genome; memory is rebuilt from it on reset
    pub(crate) genome: Vec<Instruction>,
    pub(crate) spaces: Vec<GenomeBuffer>,
    pub(crate) threads: Vec<Thread>,
    pub(crate) cur_thread: usize,
    pub(crate) id_chart: ThreadIdChart,
    pub(crate) global_stack: CpuStack,
    /// Allocate done, divide pending
    pub(crate) mal_active: bool,
    pub(crate) advance_ip: bool,
    pub(crate) inst_cost: Vec<u32>,
    pub(crate) inst_ft_cost: Vec<u32>,
    /// Per-organism rates; copy mutation can be changed by instructions
    pub(crate) rates: MutationRates,
    pub(crate) state: V,
}

impl<V: Variant> Hardware<V> {
    pub fn new(
        lib: Arc<InstLib<V::Op>>,
        inst_set: Arc<InstSet>,
        config: Arc<HardwareConfig>,
        test_config: Arc<HardwareConfig>,
        genome: &[Instruction],
    ) -> Self {
        let rates = config.mutations.clone();
        let mut hw = Self {
            lib,
            inst_set,
            config,
            test_config,
            genome: genome.to_vec(),
            spaces: Vec::new(),
            threads: Vec::new(),
            cur_thread: 0,
            id_chart: ThreadIdChart::new(),
            global_stack: CpuStack::new(),
            mal_active: false,
            advance_ip: true,
            inst_cost: Vec::new(),
            inst_ft_cost: Vec::new(),
            rates,
            state: V::new_state(),
        };
        hw.reset();
        hw
    }

    /// Rebuild memory from the genome and start over with a single thread.
    /// Leaves `advance_ip` alone so a reset during an instruction sticks.
    pub fn reset(&mut self) {
        self.spaces = vec![GenomeBuffer::from_sequence(&self.genome)];
        self.threads.clear();
        self.id_chart.clear();
        let id = self.id_chart.claim().unwrap_or(0);
        self.threads.push(Thread::new(id, V::NUM_LOCAL_STACKS));
        self.cur_thread = 0;
        self.global_stack.clear();
        self.mal_active = false;
        self.inst_cost = self.inst_set.entries().iter().map(|e| e.cost).collect();
        self.reset_ft_costs();
        self.state = V::new_state();
        V::on_reset(self);
    }

    pub(crate) fn reset_ft_costs(&mut self) {
        self.inst_ft_cost = self
            .inst_set
            .entries()
            .iter()
            .map(|e| e.initial_cost)
            .collect();
    }

    // ---------------------------------------------------------------
    // Fetch and execute
    // ---------------------------------------------------------------

    /// Run one time step: one instruction, or one per thread when slicing.
    pub fn single_process(&mut self, ctx: &mut Context, org: &mut dyn Organism) {
        {
            let ph = org.phenotype_mut();
            ph.running = true;
            ph.cpu_cycles_used += 1;
            ph.time_used += 1;
        }
        let start_ip = self.ip().pos;

        V::before_step(self, ctx, org);

        let num_inst_exec = match self.config.thread_slicing {
            ThreadSlicing::OneInstruction => 1,
            ThreadSlicing::OnePerThread => self.threads.len(),
        };

        for _ in 0..num_inst_exec {
            self.thread_next();
            if !V::thread_runnable(self) {
                continue;
            }

            self.advance_ip = true;
            self.adjust_head(HeadId::Ip);
            let cur_inst = self.ip_inst();

            if !self.pay_costs(ctx, cur_inst) {
                continue;
            }

            let time_cost = self.inst_set.addl_time_cost(cur_inst) as u64;
            if !V::CHARGE_ADDL_TIME_AFTER {
                org.phenotype_mut().time_used += time_cost;
            }

            let mut exec = true;
            if V::FAIL_BEFORE_DISPATCH {
                let prob_fail = self.inst_set.prob_fail(cur_inst);
                if prob_fail > 0.0 {
                    exec = !ctx.p(prob_fail);
                }
            }

            let success = exec && self.execute_inst(ctx, org, cur_inst);

            if self.advance_ip {
                self.advance_head(HeadId::Ip);
            }
            if V::CHARGE_ADDL_TIME_AFTER && success {
                org.phenotype_mut().time_used += time_cost;
            }

            if org.is_dead() {
                break;
            }
        }

        let max_executed = self.config.max_executed;
        let ph = org.phenotype();
        if (max_executed > 0 && ph.time_used >= max_executed) || ph.to_die {
            log::debug!("organism {} out of time", org.id());
            org.die();
        }

        org.phenotype_mut().running = false;
        let wrapped = start_ip > self.ip().pos;
        if !org.is_dead() {
            V::after_step(self, ctx, org, wrapped);
        }
    }

    /// Cost gates in order: first-time cost, per-use cost, then (unless
    /// the variant defers it) the failure probability.
    pub fn pay_costs(&mut self, ctx: &mut Context, inst: Instruction) -> bool {
        let op = inst.index();
        if let Some(ft) = self.inst_ft_cost.get_mut(op) {
            if *ft > 0 {
                *ft -= 1;
                return false;
            }
        }

        let cost = self.inst_set.cost(inst);
        if cost > 1 {
            if let Some(counter) = self.inst_cost.get_mut(op) {
                if *counter > 1 {
                    *counter -= 1;
                    return false;
                }
                *counter = cost;
            }
        }

        if !V::FAIL_BEFORE_DISPATCH {
            let prob_fail = self.inst_set.prob_fail(inst);
            if prob_fail > 0.0 && ctx.p(prob_fail) {
                return false;
            }
        }
        true
    }

    /// Mark the IP slot executed and dispatch.
    pub fn execute_inst(&mut self, ctx: &mut Context, org: &mut dyn Organism, inst: Instruction) -> bool {
        self.set_head_flag(HeadId::Ip, InstFlags::EXECUTED);

        let lib_index = match self.inst_set.get(inst) {
            Some(entry) => entry.lib_index,
            None => {
                org.fault(Fault::error(
                    FaultLocation::Instruction,
                    format!("unknown opcode {}", inst),
                ));
                return false;
            }
        };
        let op = self.lib.entry(lib_index).op;
        log::trace!(
            "thread {} ip {} exec {}",
            self.cur().id,
            self.ip().pos,
            self.lib.entry(lib_index).name
        );
        V::execute(self, ctx, org, op)
    }

    /// Execute one instruction outside the normal cycle.
    pub fn process_bonus_inst(&mut self, ctx: &mut Context, org: &mut dyn Organism, inst: Instruction) -> bool {
        let prev_running = org.phenotype().running;
        org.phenotype_mut().running = true;
        let result = self.execute_inst(ctx, org, inst);
        org.phenotype_mut().running = prev_running;
        result
    }

    // ---------------------------------------------------------------
    // Threads
    // ---------------------------------------------------------------

    #[inline]
    pub fn thread_next(&mut self) {
        self.cur_thread += 1;
        if self.cur_thread >= self.threads.len() {
            self.cur_thread = 0;
        }
    }

    #[inline]
    pub fn thread_prev(&mut self) {
        if self.cur_thread == 0 {
            self.cur_thread = self.threads.len().saturating_sub(1);
        } else {
            self.cur_thread -= 1;
        }
    }

    /// Copy the current thread into a new slot with the lowest free id.
    pub fn fork_thread(&mut self) -> bool {
        if self.threads.len() >= self.config.max_cpu_threads {
            return false;
        }
        let Some(id) = self.id_chart.claim() else {
            return false;
        };
        let mut thread = self.threads[self.cur_thread].clone();
        thread.id = id;
        self.threads.push(thread);
        log::debug!("fork thread {} -> {}", self.cur().id, id);
        true
    }

    /// Remove the current thread. Never removes the last one.
    pub fn kill_thread(&mut self) -> bool {
        if self.threads.len() <= 1 {
            return false;
        }
        let kill = self.cur_thread;
        self.thread_prev();
        self.id_chart.release(self.threads[kill].id);
        log::debug!("kill thread {}", self.threads[kill].id);

        self.threads.swap_remove(kill);
        if self.cur_thread > kill {
            self.cur_thread -= 1;
        }
        if self.cur_thread >= self.threads.len() {
            self.cur_thread = self.threads.len() - 1;
        }
        true
    }

    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn cur_thread_index(&self) -> usize {
        self.cur_thread
    }

    pub fn thread_id_chart(&self) -> ThreadIdChart {
        self.id_chart
    }

    #[inline]
    pub fn cur(&self) -> &Thread {
        &self.threads[self.cur_thread]
    }

    #[inline]
    pub fn cur_mut(&mut self) -> &mut Thread {
        &mut self.threads[self.cur_thread]
    }

    // ---------------------------------------------------------------
    // Memory
    // ---------------------------------------------------------------

    pub fn genome(&self) -> &[Instruction] {
        &self.genome
    }

    /// Main memory (space 0).
    pub fn memory(&self) -> &GenomeBuffer {
        &self.spaces[0]
    }

    pub fn memory_mut(&mut self) -> &mut GenomeBuffer {
        &mut self.spaces[0]
    }

    pub fn spaces(&self) -> &[GenomeBuffer] {
        &self.spaces
    }

    #[inline]
    pub fn space_len(&self, space: usize) -> usize {
        self.spaces.get(space).map_or(0, GenomeBuffer::len)
    }

    pub fn inst_set(&self) -> &InstSet {
        &self.inst_set
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }

    pub fn rates(&self) -> &MutationRates {
        &self.rates
    }

    pub fn rates_mut(&mut self) -> &mut MutationRates {
        &mut self.rates
    }

    pub fn mal_active(&self) -> bool {
        self.mal_active
    }

    pub fn state(&self) -> &V {
        &self.state
    }

    /// Re-adjust every head of every thread after memory changed size.
    pub fn adjust_heads(&mut self) {
        let lens: Vec<usize> = self.spaces.iter().map(GenomeBuffer::len).collect();
        for thread in &mut self.threads {
            for head in &mut thread.heads {
                if head.space >= lens.len() {
                    head.space = 0;
                }
                head.adjust(lens[head.space]);
            }
        }
    }

    // ---------------------------------------------------------------
    // Heads of the current thread
    // ---------------------------------------------------------------

    #[inline]
    pub fn head(&self, id: HeadId) -> Head {
        *self.cur().head(id)
    }

    #[inline]
    pub fn ip(&self) -> Head {
        self.head(HeadId::Ip)
    }

    #[inline]
    pub fn head_mut(&mut self, id: HeadId) -> &mut Head {
        self.cur_mut().head_mut(id)
    }

    #[inline]
    pub fn adjust_head(&mut self, id: HeadId) {
        let len = self.space_len(self.head(id).space);
        self.head_mut(id).adjust(len);
    }

    #[inline]
    pub fn advance_head(&mut self, id: HeadId) {
        let len = self.space_len(self.head(id).space);
        self.head_mut(id).advance(len);
    }

    #[inline]
    pub fn retreat_head(&mut self, id: HeadId) {
        let len = self.space_len(self.head(id).space);
        self.head_mut(id).retreat(len);
    }

    #[inline]
    pub fn jump_head(&mut self, id: HeadId, delta: i32) {
        let len = self.space_len(self.head(id).space);
        self.head_mut(id).jump(delta, len);
    }

    /// Move within the head's own space.
    #[inline]
    pub fn set_head_pos(&mut self, id: HeadId, pos: i32) {
        let len = self.space_len(self.head(id).space);
        self.head_mut(id).set(pos, len);
    }

    /// Move to another head's location, space included.
    pub fn set_head_to(&mut self, id: HeadId, target: Head) {
        let len = self.space_len(target.space);
        let head = self.head_mut(id);
        head.space = target.space;
        head.set(target.pos, len);
    }

    /// Instruction under a head, after adjusting a copy of it.
    pub fn inst_at(&self, head: Head) -> Instruction {
        let mut h = head;
        let len = self.space_len(h.space);
        if len == 0 {
            return Instruction::ERROR;
        }
        h.adjust(len);
        self.spaces[h.space].get(h.index())
    }

    #[inline]
    pub fn head_inst(&self, id: HeadId) -> Instruction {
        self.inst_at(self.head(id))
    }

    #[inline]
    pub fn ip_inst(&self) -> Instruction {
        self.head_inst(HeadId::Ip)
    }

    /// Instruction after the head; the error instruction at the end.
    pub fn next_inst(&self, id: HeadId) -> Instruction {
        let head = self.head(id);
        let len = self.space_len(head.space);
        if head.at_end(len) || head.pos < -1 {
            return Instruction::ERROR;
        }
        self.spaces[head.space].get((head.pos + 1) as usize)
    }

    /// Write at an arbitrary location (adjusted), returning the slot index.
    pub fn write_at(&mut self, head: Head, inst: Instruction) -> Option<usize> {
        let len = self.space_len(head.space);
        if len == 0 {
            return None;
        }
        let mut h = head;
        h.adjust(len);
        self.spaces[h.space].set(h.index(), inst);
        Some(h.index())
    }

    pub fn set_flag_at(&mut self, head: Head, flag: InstFlags) {
        let len = self.space_len(head.space);
        if len == 0 {
            return;
        }
        let mut h = head;
        h.adjust(len);
        self.spaces[h.space].set_flag(h.index(), flag);
    }

    pub fn clear_flag_at(&mut self, head: Head, flag: InstFlags) {
        let len = self.space_len(head.space);
        if len == 0 {
            return;
        }
        let mut h = head;
        h.adjust(len);
        self.spaces[h.space].clear_flag(h.index(), flag);
    }

    #[inline]
    pub fn set_head_flag(&mut self, id: HeadId, flag: InstFlags) {
        self.set_flag_at(self.head(id), flag);
    }

    /// Head in main memory at `pos`, adjusted.
    pub fn mem_head(&self, pos: i32) -> Head {
        let mut h = Head::new(pos, 0);
        h.adjust(self.space_len(0));
        h
    }

    // ---------------------------------------------------------------
    // Modifiers
    // ---------------------------------------------------------------

    /// If the next instruction is a nop, consume it and return its value.
    pub fn consume_nop_mod(&mut self) -> Option<usize> {
        let next = self.next_inst(HeadId::Ip);
        let nop_mod = self.inst_set.nop_mod(next)?;
        self.advance_head(HeadId::Ip);
        self.set_head_flag(HeadId::Ip, InstFlags::EXECUTED);
        Some(nop_mod as usize)
    }

    pub fn find_modified_register(&mut self, default: usize) -> usize {
        match self.consume_nop_mod() {
            Some(m) => m % V::NUM_REGISTERS,
            None => default,
        }
    }

    pub fn find_modified_next_register(&mut self, default: usize) -> usize {
        match self.consume_nop_mod() {
            Some(m) => m % V::NUM_REGISTERS,
            None => (default + 1) % V::NUM_REGISTERS,
        }
    }

    pub fn find_modified_previous_register(&mut self, default: usize) -> usize {
        match self.consume_nop_mod() {
            Some(m) => m % V::NUM_REGISTERS,
            None => (default + V::NUM_REGISTERS - 1) % V::NUM_REGISTERS,
        }
    }

    pub fn find_modified_head(&mut self, default: HeadId) -> HeadId {
        self.consume_nop_mod()
            .and_then(HeadId::from_index)
            .unwrap_or(default)
    }

    #[inline]
    pub fn next_register(reg: usize) -> usize {
        (reg + 1) % V::NUM_REGISTERS
    }

    // ---------------------------------------------------------------
    // Registers and stacks
    // ---------------------------------------------------------------

    #[inline]
    pub fn reg(&self, r: usize) -> i32 {
        self.cur().regs[r]
    }

    #[inline]
    pub fn reg_mut(&mut self, r: usize) -> &mut i32 {
        &mut self.cur_mut().regs[r]
    }

    #[inline]
    pub fn set_reg(&mut self, r: usize, value: i32) {
        self.cur_mut().regs[r] = value;
    }

    /// Stack by id: local stacks first, then the global stack.
    pub fn stack(&self, id: usize) -> &CpuStack {
        if id < V::NUM_LOCAL_STACKS {
            &self.cur().local_stacks[id]
        } else {
            &self.global_stack
        }
    }

    pub fn stack_mut(&mut self, id: usize) -> &mut CpuStack {
        if id < V::NUM_LOCAL_STACKS {
            &mut self.threads[self.cur_thread].local_stacks[id]
        } else {
            &mut self.global_stack
        }
    }

    pub fn stack_push(&mut self, value: i32) {
        let id = self.cur().cur_stack;
        self.stack_mut(id).push(value);
    }

    pub fn stack_pop(&mut self) -> i32 {
        let id = self.cur().cur_stack;
        self.stack_mut(id).pop()
    }

    pub fn stack_flip(&mut self) {
        let id = self.cur().cur_stack;
        self.stack_mut(id).flip();
    }

    pub fn stack_clear(&mut self) {
        let id = self.cur().cur_stack;
        self.stack_mut(id).clear();
    }

    pub fn switch_stack(&mut self) {
        let t = self.cur_mut();
        t.cur_stack = (t.cur_stack + 1) % (V::NUM_LOCAL_STACKS + 1);
    }

    pub fn global_stack(&self) -> &CpuStack {
        &self.global_stack
    }

    /// Copy mutation draw using this organism's current rate.
    #[inline]
    pub fn test_copy_mut(&self, ctx: &mut Context) -> bool {
        ctx.p(self.rates.copy_mut_prob)
    }

    #[inline]
    pub fn test_copy_slip(&self, ctx: &mut Context) -> bool {
        ctx.p(self.rates.copy_slip_prob)
    }

    /// Record an instruction passing through a copy for `if-label`.
    pub fn read_inst(&mut self, inst: Instruction) {
        match self.inst_set.nop_mod(inst) {
            Some(m) => self.cur_mut().read_label.add_nop(m),
            None => self.cur_mut().read_label.clear(),
        }
    }

    pub(crate) fn fault(&self, org: &mut dyn Organism, location: FaultLocation, message: impl Into<String>) {
        let fault = Fault::error(location, message);
        log::debug!("organism {} fault: {}", org.id(), fault);
        org.fault(fault);
    }

    pub(crate) fn warn(&self, org: &mut dyn Organism, location: FaultLocation, message: impl Into<String>) {
        let fault = Fault::warning(location, message);
        log::debug!("organism {} fault: {}", org.id(), fault);
        org.fault(fault);
    }

    pub(crate) fn test_cpu(&self) -> TestCpu<V> {
        TestCpu::new(self.lib.clone(), self.inst_set.clone(), self.test_config.clone())
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::{factory, genome, run};
    use super::*;
    use crate::hardware::cpu::Cpu;
    use crate::organism::BasicOrganism;

    fn quiet() -> HardwareConfig {
        HardwareConfig {
            mutations: MutationRates::none(),
            ..HardwareConfig::default()
        }
    }

    #[test]
    fn test_one_per_thread_runs_every_thread() {
        let config = HardwareConfig {
            max_cpu_threads: 2,
            thread_slicing: ThreadSlicing::OnePerThread,
            ..quiet()
        };
        let f = factory::<Cpu>(config);
        let mut hw = f.create(&genome(&f, &["inc"; 10].join(" ")));
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        assert!(hw.fork_thread());

        run(&mut hw, &mut ctx, &mut org, 1);
        for thread in hw.threads() {
            assert_eq!(thread.ip().pos, 1);
            assert_eq!(thread.regs[REG_BX], 1);
        }
        assert_eq!(org.phenotype.time_used, 1);
    }

    #[test]
    fn test_one_instruction_runs_a_single_thread() {
        let config = HardwareConfig {
            max_cpu_threads: 2,
            ..quiet()
        };
        let f = factory::<Cpu>(config);
        let mut hw = f.create(&genome(&f, &["inc"; 10].join(" ")));
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        assert!(hw.fork_thread());

        run(&mut hw, &mut ctx, &mut org, 1);
        let advanced: Vec<i32> = hw.threads().iter().map(|t| t.ip().pos).collect();
        assert_eq!(advanced, vec![0, 1]);
    }

    #[test]
    fn test_initial_cost_fails_exactly_n_times() {
        let mut set = cpu_default_set();
        for line in set.iter_mut().filter(|l| l.name == "inc") {
            line.initial_cost = 3;
        }
        let f = factory::<Cpu>(HardwareConfig { inst_set: set, ..quiet() });
        let mut hw = f.create(&genome(&f, &["inc"; 10].join(" ")));
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();

        for step in 1..=3 {
            run(&mut hw, &mut ctx, &mut org, 1);
            assert_eq!(hw.ip().pos, 0, "step {}", step);
            assert_eq!(hw.reg(REG_BX), 0, "step {}", step);
            assert!(!hw.memory().has_flag(0, InstFlags::EXECUTED));
        }
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(hw.ip().pos, 1);
        assert_eq!(hw.reg(REG_BX), 1);

        // The first-time cost is paid once per opcode.
        run(&mut hw, &mut ctx, &mut org, 1);
        assert_eq!(hw.reg(REG_BX), 2);
        assert_eq!(org.phenotype.time_used, 5);
    }

    fn cpu_default_set() -> Vec<crate::config::InstEntryConfig> {
        factory::<Cpu>(quiet()).lib().default_set_config()
    }
}
