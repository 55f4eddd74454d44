//! The organism seen from inside its CPU
//!
//! The engine never owns population state. Everything outside one
//! organism's memory and threads (inputs, neighbours, offspring placement,
//! death) goes through the `Organism` trait. `BasicOrganism` is a
//! self-contained implementation used by test CPUs and for driving an
//! engine in isolation.

use crate::context::Context;
use crate::fault::Fault;
use crate::inst::Instruction;
use crate::label::CodeLabel;
use std::collections::VecDeque;

/// How a divide was performed, for bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DivideType {
    #[default]
    Normal,
    /// Divide with resampling of mutations
    Resampled,
    /// `repro`: copy of the whole genome without copying instructions
    Repro,
}

/// Per-organism counters the engine reads and writes.
#[derive(Debug, Clone, PartialEq)]
pub struct Phenotype {
    pub time_used: u64,
    pub cpu_cycles_used: u64,
    /// Set externally; the organism dies at the end of its next step
    pub to_die: bool,
    pub running: bool,
    pub num_divides: u32,
    pub copy_true: bool,
    pub child_fertile: bool,
    pub div_type: DivideType,
    pub resamplings: u32,
    pub failed_resamplings: u32,
    /// Fitness evaluations run on this organism's offspring
    pub fitness_tests: u32,
    pub merit: f64,
    pub gestation_start: u64,
    pub gestation_time: u64,
    pub fitness: f64,
    /// Cached fitness of this organism's own genome in a test CPU
    pub test_fitness: Option<f64>,
    pub copied_size: usize,
    pub executed_size: usize,
    /// Any instruction wrote to memory outside a normal copy
    pub is_modified: bool,
    pub bonus: f64,
}

impl Phenotype {
    pub fn new() -> Self {
        Self {
            time_used: 0,
            cpu_cycles_used: 0,
            to_die: false,
            running: false,
            num_divides: 0,
            copy_true: false,
            child_fertile: true,
            div_type: DivideType::Normal,
            resamplings: 0,
            failed_resamplings: 0,
            fitness_tests: 0,
            merit: 0.0,
            gestation_start: 0,
            gestation_time: 0,
            fitness: 0.0,
            test_fitness: None,
            copied_size: 0,
            executed_size: 0,
            is_modified: false,
            bonus: 1.0,
        }
    }

    /// Close a gestation: compute merit and fitness from the sizes recorded
    /// by the viability check and restart the clock.
    pub fn divide_reset(&mut self) {
        self.gestation_time = self.time_used.saturating_sub(self.gestation_start);
        self.merit = self.copied_size.min(self.executed_size) as f64 * self.bonus;
        self.fitness = if self.gestation_time > 0 {
            self.merit / self.gestation_time as f64
        } else {
            0.0
        };
        self.gestation_start = self.time_used;
        self.num_divides += 1;
    }
}

impl Default for Phenotype {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything handed over when an organism divides.
#[derive(Debug, Clone, PartialEq)]
pub struct Offspring {
    pub genome: Vec<Instruction>,
    pub fertile: bool,
    /// Child is an exact copy of the parent's genome
    pub copy_true: bool,
    pub mutations: usize,
    pub div_type: DivideType,
}

/// Calls the engine makes outward. Only the state accessors, faults,
/// divide and death are required; interaction with the world defaults to
/// "nothing there".
pub trait Organism {
    fn id(&self) -> u64 {
        0
    }

    fn fault(&mut self, fault: Fault);

    fn phenotype(&self) -> &Phenotype;

    fn phenotype_mut(&mut self) -> &mut Phenotype;

    /// Place the offspring. Returns true when the parent survives.
    fn activate_divide(&mut self, ctx: &mut Context, offspring: Offspring) -> bool;

    fn die(&mut self);

    fn is_dead(&self) -> bool {
        false
    }

    /// Organism-level veto on a divide (e.g. task requirements).
    fn divide_check_viable(&self) -> bool {
        true
    }

    /// Next value on the input tape.
    fn next_input(&mut self) -> i32 {
        0
    }

    /// Record that `value` was consumed from the input tape.
    fn do_input(&mut self, _value: i32) {}

    fn do_output(&mut self, _ctx: &mut Context, _value: i32) {}

    /// Draw fresh inputs and forget what was read so far.
    fn reset_inputs(&mut self, _ctx: &mut Context) {}

    /// Send a value to the faced neighbour. Returns false without one.
    fn send_value(&mut self, _value: i32) -> bool {
        false
    }

    fn receive_value(&mut self) -> Option<i32> {
        None
    }

    fn sell_value(&mut self, _data: i32, _label: i32, _price: i32) {}

    fn buy_value(&mut self, _label: i32, _price: i32) -> Option<i32> {
        None
    }

    fn update_merit(&mut self, _merit: f64) {}

    /// Explode, killing neighbours within `distance`. Kills self.
    fn kaboom(&mut self, _distance: i32) {
        self.die();
    }

    fn has_neighbor(&self) -> bool {
        false
    }

    fn rotate(&mut self, _direction: i32) {}

    /// Number of cells around this one; zero when not placed in a world.
    fn neighborhood_size(&self) -> usize {
        0
    }

    /// The faced neighbour's genome contains `label`.
    fn neighbor_has_label(&self, _label: &CodeLabel) -> bool {
        false
    }

    /// Single-memory injection into the faced neighbour.
    fn inject_host(&mut self, _ctx: &mut Context, _label: &CodeLabel, _code: &[Instruction]) -> bool {
        false
    }

    /// Parasite injection into the faced neighbour's memory spaces.
    fn inject_parasite(&mut self, _ctx: &mut Context, _label: &CodeLabel, _code: &[Instruction]) -> bool {
        false
    }
}

/// Stand-alone organism with a fixed input tape and local records of
/// everything the engine reports.
#[derive(Debug, Clone)]
pub struct BasicOrganism {
    pub id: u64,
    pub phenotype: Phenotype,
    pub inputs: Vec<i32>,
    pub input_pointer: usize,
    pub consumed_inputs: Vec<i32>,
    pub outputs: Vec<i32>,
    pub faults: Vec<Fault>,
    pub offspring: Vec<Offspring>,
    pub dead: bool,
    /// Value returned from `activate_divide`
    pub parent_survives: bool,
    pub inbox: VecDeque<i32>,
    pub sent: Vec<i32>,
    pub merit_updates: Vec<f64>,
    /// Neighbour present for send/inject
    pub neighbor: bool,
    pub facing: i32,
    /// Facing index of the neighbour that carries the wanted label, if any
    pub labeled_neighbor: Option<i32>,
    pub injected: Vec<(CodeLabel, Vec<Instruction>)>,
}

impl BasicOrganism {
    pub fn new(inputs: Vec<i32>) -> Self {
        Self {
            id: 0,
            phenotype: Phenotype::new(),
            inputs,
            input_pointer: 0,
            consumed_inputs: Vec::new(),
            outputs: Vec::new(),
            faults: Vec::new(),
            offspring: Vec::new(),
            dead: false,
            parent_survives: true,
            inbox: VecDeque::new(),
            sent: Vec::new(),
            merit_updates: Vec::new(),
            neighbor: false,
            facing: 0,
            labeled_neighbor: None,
            injected: Vec::new(),
        }
    }

    pub fn last_offspring(&self) -> Option<&Offspring> {
        self.offspring.last()
    }
}

impl Default for BasicOrganism {
    fn default() -> Self {
        Self::new(vec![0])
    }
}

impl Organism for BasicOrganism {
    fn id(&self) -> u64 {
        self.id
    }

    fn fault(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    fn phenotype(&self) -> &Phenotype {
        &self.phenotype
    }

    fn phenotype_mut(&mut self) -> &mut Phenotype {
        &mut self.phenotype
    }

    fn activate_divide(&mut self, _ctx: &mut Context, offspring: Offspring) -> bool {
        self.phenotype.divide_reset();
        self.offspring.push(offspring);
        self.parent_survives
    }

    fn die(&mut self) {
        self.dead = true;
    }

    fn is_dead(&self) -> bool {
        self.dead
    }

    fn next_input(&mut self) -> i32 {
        if self.inputs.is_empty() {
            return 0;
        }
        let value = self.inputs[self.input_pointer % self.inputs.len()];
        self.input_pointer = (self.input_pointer + 1) % self.inputs.len();
        value
    }

    fn do_input(&mut self, value: i32) {
        self.consumed_inputs.push(value);
    }

    fn do_output(&mut self, _ctx: &mut Context, value: i32) {
        self.outputs.push(value);
    }

    fn reset_inputs(&mut self, _ctx: &mut Context) {
        self.input_pointer = 0;
        self.consumed_inputs.clear();
    }

    fn send_value(&mut self, value: i32) -> bool {
        if !self.neighbor {
            return false;
        }
        self.sent.push(value);
        true
    }

    fn receive_value(&mut self) -> Option<i32> {
        self.inbox.pop_front()
    }

    fn update_merit(&mut self, merit: f64) {
        self.merit_updates.push(merit);
        self.phenotype.merit = merit;
    }

    fn has_neighbor(&self) -> bool {
        self.neighbor
    }

    fn rotate(&mut self, direction: i32) {
        self.facing = (self.facing + direction).rem_euclid(8);
    }

    fn neighborhood_size(&self) -> usize {
        if self.neighbor {
            8
        } else {
            0
        }
    }

    fn neighbor_has_label(&self, _label: &CodeLabel) -> bool {
        self.labeled_neighbor == Some(self.facing)
    }

    fn inject_host(&mut self, _ctx: &mut Context, label: &CodeLabel, code: &[Instruction]) -> bool {
        if !self.neighbor {
            return false;
        }
        self.injected.push((label.clone(), code.to_vec()));
        true
    }

    fn inject_parasite(&mut self, ctx: &mut Context, label: &CodeLabel, code: &[Instruction]) -> bool {
        self.inject_host(ctx, label, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divide_reset_fitness() {
        let mut p = Phenotype::new();
        p.time_used = 200;
        p.copied_size = 40;
        p.executed_size = 30;
        p.divide_reset();
        assert_eq!(p.gestation_time, 200);
        assert_eq!(p.merit, 30.0);
        assert!((p.fitness - 0.15).abs() < 1e-12);
        assert_eq!(p.gestation_start, 200);
        assert_eq!(p.num_divides, 1);
    }

    #[test]
    fn test_default_phenotype_is_fertile_with_unit_bonus() {
        let p = Phenotype::default();
        assert!(p.child_fertile);
        assert_eq!(p.bonus, 1.0);
        assert_eq!(p, Phenotype::new());
    }

    #[test]
    fn test_input_tape_cycles() {
        let mut org = BasicOrganism::new(vec![1, 2, 3]);
        let got: Vec<i32> = (0..5).map(|_| org.next_input()).collect();
        assert_eq!(got, vec![1, 2, 3, 1, 2]);
    }

    #[test]
    fn test_no_neighbor_refuses_send() {
        let mut org = BasicOrganism::default();
        assert!(!org.send_value(3));
        org.neighbor = true;
        assert!(org.send_value(3));
        assert_eq!(org.sent, vec![3]);
    }
}
