//! Divide pipeline: viability, extraction, mutation, fitness test and
//! the hand-off of the offspring.

use super::{Hardware, Variant};
use crate::config::DivideMethod;
use crate::context::Context;
use crate::fault::FaultLocation;
use crate::inst::{InstFlags, Instruction};
use crate::label::CodeLabel;
use crate::memory::GenomeBuffer;
use crate::organism::{DivideType, Offspring, Organism};
use crate::test_cpu::TestInfo;

/// Fitness evaluations allowed per resampled divide.
pub const MAX_RESAMPLES: usize = 100;

/// How resampled divides redraw mutations after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resample {
    /// Full mutation pass every time
    Full,
    /// First attempt allows at most `n` mutations, later ones apply exactly `n`
    Exact(usize),
}

/// Result of one mutation pass over an offspring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DivideMutations {
    pub count: usize,
    /// A divide kill rule fired; the offspring is born sterile
    pub child_killed: bool,
}

impl<V: Variant> Hardware<V> {
    /// Lines of `[0, parent_size)` flagged executed.
    pub fn executed_size(&self, parent_size: usize) -> usize {
        self.memory().count_flagged(0..parent_size, InstFlags::EXECUTED)
    }

    /// Check that a divide into a parent of `parent_size` and a child of
    /// `child_size` may go ahead. Records executed and copied sizes on the
    /// phenotype when it does.
    pub fn divide_check_viable(
        &mut self,
        org: &mut dyn Organism,
        parent_size: usize,
        child_size: usize,
        using_repro: bool,
    ) -> bool {
        if !org.divide_check_viable() {
            return false;
        }

        let genome_size = self.genome.len() as f64;
        let range = self.config.child_size_range;
        let min_size = self.config.min_creature_size.max((genome_size / range) as usize);
        let max_size = self.config.max_creature_size.min((genome_size * range) as usize);

        if child_size < min_size || child_size > max_size {
            self.fault(org, FaultLocation::Divide, format!("Invalid offspring length ({})", child_size));
            return false;
        }
        if parent_size < min_size || parent_size > max_size {
            self.fault(org, FaultLocation::Divide, format!("Invalid post-divide length ({})", parent_size));
            return false;
        }

        let min_genome = self.config.min_genome_size;
        let max_genome = self.config.max_genome_size;
        let outside = |size: usize| (min_genome > 0 && size < min_genome) || (max_genome > 0 && size > max_genome);
        if outside(child_size) {
            self.fault(
                org,
                FaultLocation::Divide,
                format!("Invalid absolute offspring length ({})", child_size),
            );
            return false;
        }
        if outside(parent_size) {
            self.fault(
                org,
                FaultLocation::Divide,
                format!("Invalid absolute post-divide length ({})", parent_size),
            );
            return false;
        }

        let executed_size = self.executed_size(parent_size);
        let min_exe_lines = (parent_size as f64 * self.config.min_exe_lines) as usize;
        if executed_size < min_exe_lines {
            self.fault(
                org,
                FaultLocation::Divide,
                format!("Too few executed lines ({} < {})", executed_size, min_exe_lines),
            );
            return false;
        }

        let mut copied_size = parent_size;
        if !using_repro {
            copied_size = V::copied_size(self, parent_size, child_size);
            let min_copied = (child_size as f64 * self.config.min_copied_lines) as usize;
            if copied_size < min_copied {
                self.fault(
                    org,
                    FaultLocation::Divide,
                    format!("Too few copied commands ({} < {})", copied_size, min_copied),
                );
                return false;
            }
        }

        let ph = org.phenotype_mut();
        ph.executed_size = executed_size;
        ph.copied_size = copied_size;
        true
    }

    /// Split main memory at `div_point`, keeping `extra_lines` off the end
    /// of the child, mutate and test the child and hand it over.
    pub fn divide_main(
        &mut self,
        ctx: &mut Context,
        org: &mut dyn Organism,
        div_point: usize,
        extra_lines: usize,
        mut_multiplier: f64,
    ) -> bool {
        let Some(mut child) = self.extract_child(org, div_point, extra_lines) else {
            return false;
        };

        self.do_transposons(ctx, &mut child);
        let muts = self.do_mutations(ctx, org, &mut child, mut_multiplier, usize::MAX);
        let mut genome = child.to_sequence();
        self.test_fitness_measures(ctx, org, &mut genome);

        let offspring = self.make_offspring(org, genome, muts, DivideType::Normal);
        self.finish_divide(ctx, org, offspring)
    }

    /// Divide that redraws mutations while the fitness test reverts the
    /// child, up to `MAX_RESAMPLES` evaluations. A child still reverted at
    /// the cap is born sterile.
    pub fn divide_rs(
        &mut self,
        ctx: &mut Context,
        org: &mut dyn Organism,
        div_point: usize,
        extra_lines: usize,
        mut_multiplier: f64,
        mode: Resample,
    ) -> bool {
        let Some(pristine) = self.extract_child(org, div_point, extra_lines) else {
            return false;
        };

        let mut first_count = 0;
        let mut reverted = false;
        let mut result = (Vec::new(), DivideMutations::default());
        for attempt in 0..MAX_RESAMPLES {
            let mut child = pristine.clone();
            let muts = match (attempt, mode) {
                (0, Resample::Full) => self.do_mutations(ctx, org, &mut child, mut_multiplier, usize::MAX),
                (0, Resample::Exact(n)) => self.do_mutations(ctx, org, &mut child, mut_multiplier, n),
                (_, Resample::Full) => self.do_mutations(ctx, org, &mut child, mut_multiplier, usize::MAX),
                (_, Resample::Exact(n)) => self.do_exact_mutations(ctx, &mut child, n),
            };
            if attempt == 0 {
                first_count = muts.count;
            } else {
                org.phenotype_mut().resamplings += 1;
            }

            let mut genome = child.to_sequence();
            reverted = self.test_fitness_measures(ctx, org, &mut genome);
            result = (genome, muts);
            if !reverted && muts.count >= first_count {
                break;
            }
        }

        if reverted {
            log::warn!("organism {} exhausted {} resamples", org.id(), MAX_RESAMPLES);
            let ph = org.phenotype_mut();
            ph.child_fertile = false;
            ph.failed_resamplings += 1;
        }

        let (genome, muts) = result;
        let offspring = self.make_offspring(org, genome, muts, DivideType::Resampled);
        self.finish_divide(ctx, org, offspring)
    }

    /// Check viability and cut the child out of main memory, truncating
    /// the parent to `div_point`.
    fn extract_child(&mut self, org: &mut dyn Organism, div_point: usize, extra_lines: usize) -> Option<GenomeBuffer> {
        let len = self.memory().len();
        let child_size = len.saturating_sub(div_point + extra_lines);
        if !self.divide_check_viable(org, div_point, child_size, false) {
            return None;
        }
        let child = self.memory().crop(div_point, div_point + child_size);
        let fill = self.inst_set.default_inst();
        self.memory_mut().resize(div_point, fill);
        log::debug!(
            "organism {} divide at {}: child {} lines",
            org.id(),
            div_point,
            child_size
        );
        Some(child)
    }

    pub(crate) fn make_offspring(
        &self,
        org: &mut dyn Organism,
        genome: Vec<Instruction>,
        muts: DivideMutations,
        div_type: DivideType,
    ) -> Offspring {
        let ph = org.phenotype_mut();
        ph.div_type = div_type;
        if muts.child_killed {
            ph.child_fertile = false;
        }
        Offspring {
            genome,
            fertile: ph.child_fertile,
            copy_true: ph.copy_true,
            mutations: muts.count,
            div_type,
        }
    }

    /// Reset costs, clear the pending allocation, hand the offspring over
    /// and reset the parent as the divide method asks.
    pub(crate) fn finish_divide(&mut self, ctx: &mut Context, org: &mut dyn Organism, offspring: Offspring) -> bool {
        self.reset_ft_costs();
        self.mal_active = false;
        let method = self.config.divide_method;
        if method != DivideMethod::Offspring {
            self.advance_ip = false;
        }

        let parent_alive = org.activate_divide(ctx, offspring);
        if parent_alive {
            match method {
                DivideMethod::Split => self.reset(),
                DivideMethod::Birth => V::birth_reset(self),
                DivideMethod::Offspring => {}
            }
        }
        self.adjust_heads();
        true
    }

    /// Apply the divide mutation rates to `child`, stopping once
    /// `max_mut` mutations have been counted. Slips, single or per site,
    /// are not counted.
    pub fn do_mutations(
        &mut self,
        ctx: &mut Context,
        org: &mut dyn Organism,
        child: &mut GenomeBuffer,
        mut_multiplier: f64,
        max_mut: usize,
    ) -> DivideMutations {
        let rates = self.rates.clone();
        let min = self.config.min_creature_size;
        let max = self.config.max_creature_size;
        let mut total = 0usize;

        if ctx.p(rates.divide_slip_prob) {
            self.do_slip_mutation(ctx, child);
        }

        if ctx.p(rates.divide_mut_prob) && total < max_mut && !child.is_empty() {
            let line = ctx.uint(child.len());
            child.set(line, self.inst_set.random_inst(ctx));
            total += 1;
        }
        if ctx.p(rates.divide_ins_prob) && child.len() < max && total < max_mut {
            let line = ctx.uint(child.len() + 1);
            child.insert(line, self.inst_set.random_inst(ctx));
            total += 1;
        }
        if ctx.p(rates.divide_del_prob) && child.len() > min && total < max_mut {
            let line = ctx.uint(child.len());
            child.remove(line, 1);
            total += 1;
        }
        if ctx.p(rates.divide_uniform_prob) && total < max_mut && self.do_uniform_mutation(ctx, child) {
            total += 1;
        }

        if rates.div_mut_prob > 0.0 && total < max_mut {
            let num_mut = ctx.binomial(child.len(), rates.div_mut_prob / mut_multiplier);
            for _ in 0..num_mut {
                if total >= max_mut {
                    break;
                }
                let site = ctx.uint(child.len());
                child.set(site, self.inst_set.random_inst(ctx));
                total += 1;
            }
        }

        if rates.div_ins_prob > 0.0 && total < max_mut {
            let mut num_mut = ctx.binomial(child.len(), rates.div_ins_prob);
            num_mut = num_mut.min(max.saturating_sub(child.len()));
            if num_mut > 0 {
                let mut sites: Vec<usize> = (0..num_mut).map(|_| ctx.uint(child.len() + 1)).collect();
                sites.sort_unstable();
                for &site in sites.iter().rev() {
                    child.insert(site, self.inst_set.random_inst(ctx));
                }
                total += num_mut;
            }
        }

        if rates.div_del_prob > 0.0 && total < max_mut {
            let mut num_mut = ctx.binomial(child.len(), rates.div_del_prob);
            num_mut = num_mut.min(child.len().saturating_sub(min));
            for _ in 0..num_mut {
                let site = ctx.uint(child.len());
                child.remove(site, 1);
            }
            total += num_mut;
        }

        if rates.div_uniform_prob > 0.0 && total < max_mut {
            let num_mut = ctx.binomial(child.len(), rates.div_uniform_prob / mut_multiplier);
            for _ in 0..num_mut {
                if total >= max_mut {
                    break;
                }
                if self.do_uniform_mutation(ctx, child) {
                    total += 1;
                }
            }
        }

        if rates.div_slip_prob > 0.0 {
            let num_mut = ctx.binomial(child.len(), rates.div_slip_prob / mut_multiplier);
            for _ in 0..num_mut {
                self.do_slip_mutation(ctx, child);
            }
        }

        let divide_rules = self.trigger_divide_mutations(ctx, child);
        total += divide_rules.mutations;

        if rates.parent_mut_prob > 0.0 && total < max_mut {
            for i in 0..self.genome.len() {
                if ctx.p(rates.parent_mut_prob) {
                    let inst = self.inst_set.random_inst(ctx);
                    self.genome[i] = inst;
                    if i < self.memory().len() {
                        self.memory_mut().set(i, inst);
                        self.memory_mut().set_flag(i, InstFlags::MUTATED);
                    }
                    total += 1;
                }
            }
        }

        let parent_rules = self.trigger_parent_mutations(ctx);
        total += parent_rules.mutations;
        if parent_rules.kill {
            org.die();
        }

        DivideMutations {
            count: total,
            child_killed: divide_rules.kill,
        }
    }

    /// Exactly `point_mut` point mutations at random sites.
    pub fn do_exact_mutations(&mut self, ctx: &mut Context, child: &mut GenomeBuffer, point_mut: usize) -> DivideMutations {
        let mut count = 0;
        let wanted = if self.rates.div_mut_prob > 0.0 {
            point_mut
        } else {
            point_mut.min(1)
        };
        while count < wanted && !child.is_empty() {
            let site = ctx.uint(child.len());
            child.set(site, self.inst_set.random_inst(ctx));
            count += 1;
        }
        DivideMutations {
            count,
            child_killed: false,
        }
    }

    /// One of `2N + 1` outcomes: a point mutation to any of the `N`
    /// opcodes, a deletion, or an insertion of any opcode.
    pub fn do_uniform_mutation(&self, ctx: &mut Context, genome: &mut GenomeBuffer) -> bool {
        let n = self.inst_set.len();
        let mut_id = ctx.uint(2 * n + 1);
        if mut_id < n {
            if genome.is_empty() {
                return false;
            }
            let site = ctx.uint(genome.len());
            genome.set(site, Instruction(mut_id as u8));
        } else if mut_id == n {
            if genome.len() <= self.config.min_creature_size {
                return false;
            }
            let site = ctx.uint(genome.len());
            genome.remove(site, 1);
        } else {
            if genome.len() >= self.config.max_creature_size {
                return false;
            }
            let site = ctx.uint(genome.len() + 1);
            genome.insert(site, Instruction((mut_id - n - 1) as u8));
        }
        true
    }

    /// As if the read head jumped between two random points: `[to, from)`
    /// is duplicated when `from > to`, `[from, to)` dropped otherwise.
    pub fn do_slip_mutation(&self, ctx: &mut Context, genome: &mut GenomeBuffer) {
        let len = genome.len();
        let from = ctx.uint(len + 1);
        let to = if from == 0 { ctx.uint(len) } else { ctx.uint(len + 1) };
        let new_len = (len + from) as i64 - to as i64;
        if new_len < self.config.min_creature_size as i64 || new_len > self.config.max_creature_size as i64 {
            return;
        }
        let seq = genome.sequence();
        let mut slipped = seq[..from].to_vec();
        slipped.extend_from_slice(&seq[to..]);
        *genome = GenomeBuffer::from_sequence(&slipped);
    }

    /// Executed transposons in the child may copy themselves to a random
    /// position.
    pub fn do_transposons(&self, ctx: &mut Context, child: &mut GenomeBuffer) {
        let Some(transposon) = self.inst_set.inst("transposon") else {
            return;
        };
        let count = (0..child.len())
            .filter(|&i| child.get(i) == transposon && child.has_flag(i, InstFlags::EXECUTED))
            .count();
        for _ in 0..count {
            if child.len() < self.config.max_creature_size && ctx.p(self.config.transposon_insert_prob) {
                let line = ctx.uint(child.len() + 1);
                child.insert(line, transposon);
            }
        }
    }

    /// Compare the child against the parent in a test CPU and apply the
    /// configured reversion and sterilization draws. Returns true when the
    /// child was reverted and not sterilized.
    pub fn test_fitness_measures(&mut self, ctx: &mut Context, org: &mut dyn Organism, child: &mut Vec<Instruction>) -> bool {
        let copy_true = child.as_slice() == self.genome.as_slice();
        {
            let ph = org.phenotype_mut();
            ph.copy_true = copy_true;
            ph.child_fertile = true;
        }

        let test = self.config.fitness_test.clone();
        if !test.is_active() || copy_true {
            return false;
        }

        let parent_fitness = match org.phenotype().test_fitness {
            Some(f) => f,
            None => {
                let mut info = TestInfo::random_inputs(self.config.test_cpu_generations);
                self.test_cpu().test_genome(ctx, &mut info, &self.genome);
                let f = info.genotype_fitness();
                org.phenotype_mut().test_fitness = Some(f);
                f
            }
        };
        let neut_min = parent_fitness * (1.0 - test.neutral_min);
        let neut_max = parent_fitness * (1.0 + test.neutral_max);

        let mut info = TestInfo::random_inputs(self.config.test_cpu_generations);
        self.test_cpu().test_genome(ctx, &mut info, child);
        org.phenotype_mut().fitness_tests += 1;
        let child_fitness = info.genotype_fitness();

        let mut sterilize = test.fail_implicit && info.max_depth > 0;
        let (p_revert, p_sterilize) = if child_fitness == 0.0 {
            (test.revert.fatal, test.sterilize.fatal)
        } else if child_fitness < neut_min {
            (test.revert.neg, test.sterilize.neg)
        } else if child_fitness <= neut_max {
            (test.revert.neut, test.sterilize.neut)
        } else {
            (test.revert.pos, test.sterilize.pos)
        };
        let revert = ctx.p(p_revert);
        let band_sterilize = ctx.p(p_sterilize);
        if band_sterilize && !revert {
            sterilize = true;
        }

        if revert {
            child.clone_from(&self.genome);
        }
        if sterilize {
            org.phenotype_mut().child_fertile = false;
        }
        log::debug!(
            "organism {} child fitness {:.4} vs {:.4}: revert={} sterilize={}",
            org.id(),
            child_fitness,
            parent_fitness,
            revert,
            sterilize
        );
        revert && !sterilize
    }

    /// Offspring from the whole of main memory without copying it first.
    pub fn repro(&mut self, ctx: &mut Context, org: &mut dyn Organism) -> bool {
        let mut child = self.memory().clone();
        let len = child.len();
        {
            let executed = self.executed_size(len);
            let ph = org.phenotype_mut();
            ph.copied_size = len;
            ph.executed_size = executed;
        }

        self.do_transposons(ctx, &mut child);
        if self.rates.copy_mut_prob > 0.0 {
            for i in 0..len.min(child.len()) {
                if self.test_copy_mut(ctx) {
                    child.set(i, self.inst_set.random_inst(ctx));
                    child.set_flag(i, InstFlags::MUTATED | InstFlags::COPY_MUT);
                }
            }
        }
        let muts = self.do_mutations(ctx, org, &mut child, 1.0, usize::MAX);
        let mut genome = child.to_sequence();
        self.test_fitness_measures(ctx, org, &mut genome);

        let offspring = self.make_offspring(org, genome, muts, DivideType::Repro);
        self.finish_divide(ctx, org, offspring)
    }

    /// Host side of an injection into main memory: insert `code` after the
    /// first nop run spelling `label`. Heads past the insertion point move
    /// with the code they pointed at.
    pub fn inject_host(&mut self, org: &mut dyn Organism, label: &CodeLabel, code: &[Instruction]) -> bool {
        if self.memory().len() + code.len() > self.config.max_creature_size {
            return false;
        }
        let line = super::search::find_label_full(label, &self.nop_mods(0));
        if line < 0 {
            return false;
        }

        let at = ((line + 1) as usize).min(self.memory().len());
        self.memory_mut().insert_slice(at, code);
        for i in at..at + code.len() {
            self.memory_mut().set_flag(i, InstFlags::INJECTED);
        }
        org.phenotype_mut().is_modified = true;

        let shift = code.len() as i32;
        let at_pos = at as i32;
        for thread in &mut self.threads {
            for head in thread.heads.iter_mut().filter(|h| h.space == 0 && h.pos > at_pos) {
                head.abs_jump(shift);
            }
        }
        self.adjust_heads();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BandRates, FitnessTestConfig, HardwareConfig};
    use crate::hardware::cpu::{Cpu, ANCESTOR};
    use crate::hardware::test_util::{factory, genome};
    use crate::mutation::MutationRates;
    use crate::organism::BasicOrganism;

    fn quiet() -> HardwareConfig {
        HardwareConfig {
            mutations: MutationRates::none(),
            ..HardwareConfig::default()
        }
    }

    fn executed_all<V: Variant>(hw: &mut Hardware<V>) {
        let len = hw.memory().len();
        for i in 0..len {
            hw.memory_mut().set_flag(i, InstFlags::EXECUTED);
        }
    }

    fn copied_from<V: Variant>(hw: &mut Hardware<V>, start: usize) {
        let len = hw.memory().len();
        for i in start..len {
            hw.memory_mut().set_flag(i, InstFlags::COPIED);
        }
    }

    #[test]
    fn test_divide_size_conservation() {
        let config = HardwareConfig {
            divide_method: DivideMethod::Offspring,
            ..quiet()
        };
        let f = factory::<Cpu>(config);
        let g = genome(&f, &["nop-C"; 12].join(" "));
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();

        assert!(hw.allocate_main(&mut ctx, &mut org, 14));
        executed_all(&mut hw);
        copied_from(&mut hw, 12);
        assert_eq!(hw.memory().len(), 26);

        assert!(hw.divide_main(&mut ctx, &mut org, 12, 2, 1.0));
        assert_eq!(hw.memory().len(), 12);
        assert_eq!(org.offspring[0].genome.len(), 26 - 12 - 2);
        assert!(!hw.mal_active());
        assert_eq!(org.phenotype.executed_size, 12);
        assert_eq!(org.phenotype.copied_size, 12);
    }

    #[test]
    fn test_viability_faults() {
        let f = factory::<Cpu>(quiet());
        let g = genome(&f, &["nop-C"; 10].join(" "));
        let mut hw = f.create(&g);
        let mut org = BasicOrganism::default();

        assert!(!hw.divide_check_viable(&mut org, 10, 30, false));
        assert_eq!(org.faults[0].message, "Invalid offspring length (30)");

        assert!(!hw.divide_check_viable(&mut org, 10, 10, false));
        assert_eq!(org.faults[1].message, "Too few executed lines (0 < 5)");

        executed_all(&mut hw);
        assert!(!hw.divide_check_viable(&mut org, 10, 10, false));
        assert_eq!(org.faults[2].message, "Too few copied commands (0 < 5)");

        assert!(hw.divide_check_viable(&mut org, 10, 10, true));
        assert_eq!(org.phenotype.copied_size, 10);
        assert!(org.faults.iter().all(|f| f.location == FaultLocation::Divide));
    }

    #[test]
    fn test_failed_divide_leaves_memory() {
        let f = factory::<Cpu>(quiet());
        let g = genome(&f, &["nop-C"; 10].join(" "));
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        assert!(hw.allocate_main(&mut ctx, &mut org, 10));
        assert!(!hw.divide_main(&mut ctx, &mut org, 10, 0, 1.0));
        assert_eq!(hw.memory().len(), 20);
        assert!(hw.mal_active());
        assert!(org.offspring.is_empty());
    }

    #[test]
    fn test_split_resets_parent() {
        let f = factory::<Cpu>(quiet());
        let g = genome(&f, &["nop-C"; 10].join(" "));
        let mut hw = f.create(&g);
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        assert!(hw.allocate_main(&mut ctx, &mut org, 10));
        executed_all(&mut hw);
        copied_from(&mut hw, 10);
        for i in 10..20 {
            let inst = hw.memory().get(i - 10);
            hw.memory_mut().set(i, inst);
        }
        assert!(hw.divide_main(&mut ctx, &mut org, 10, 0, 1.0));
        assert!(hw.memory().same_sequence(&g));
        assert_eq!(hw.executed_size(10), 0);
        assert!(org.offspring[0].copy_true);
        assert!(org.offspring[0].fertile);
        assert!(!hw.advance_ip);
    }

    #[test]
    fn test_slip_mutation_respects_size_bounds() {
        let g_text = "nop-A nop-B nop-C inc dec add sub nand shift-r shift-l";
        let pinned = HardwareConfig {
            min_creature_size: 10,
            max_creature_size: 10,
            ..quiet()
        };
        let f = factory::<Cpu>(pinned);
        let g = genome(&f, g_text);
        let hw = f.create(&g);
        for seed in 0..20 {
            let mut ctx = Context::new(seed);
            let mut buf = GenomeBuffer::from_sequence(&g);
            hw.do_slip_mutation(&mut ctx, &mut buf);
            assert!(buf.same_sequence(&g));
        }

        let loose = HardwareConfig {
            min_creature_size: 1,
            ..quiet()
        };
        let f = factory::<Cpu>(loose);
        let hw = f.create(&g);
        let lengths: Vec<usize> = (0..20)
            .map(|seed| {
                let mut ctx = Context::new(seed);
                let mut buf = GenomeBuffer::from_sequence(&g);
                hw.do_slip_mutation(&mut ctx, &mut buf);
                buf.len()
            })
            .collect();
        assert!(lengths.iter().any(|&l| l != 10));
    }

    #[test]
    fn test_div_slip_changes_every_offspring() {
        let config = HardwareConfig {
            divide_method: DivideMethod::Offspring,
            min_creature_size: 1,
            max_creature_size: 1000,
            mutations: MutationRates {
                div_slip_prob: 1.0,
                ..MutationRates::none()
            },
            ..HardwareConfig::default()
        };
        let f = factory::<Cpu>(config);
        let g = genome(
            &f,
            "if-n-equ if-less pop push swap-stk swap shift-r shift-l inc dec \
             add sub nand IO h-alloc h-divide h-copy h-search mov-head jmp-head",
        );
        for seed in 0..10 {
            let mut hw = f.create(&g);
            let mut ctx = Context::new(seed);
            let mut org = BasicOrganism::default();
            assert!(hw.allocate_main(&mut ctx, &mut org, 20));
            for i in 0..20 {
                let inst = hw.memory().get(i);
                hw.memory_mut().set(i + 20, inst);
            }
            executed_all(&mut hw);
            copied_from(&mut hw, 20);
            assert!(hw.divide_main(&mut ctx, &mut org, 20, 0, 1.0));
            let child = &org.offspring[0];
            assert_ne!(child.genome, g, "seed {}", seed);
            assert!(!child.copy_true);
            assert_eq!(child.mutations, 0);
        }
    }

    #[test]
    fn test_fail_implicit_sterilizes_offspring() {
        let config = |ins_prob: f64| HardwareConfig {
            mutations: MutationRates {
                divide_ins_prob: ins_prob,
                ..MutationRates::none()
            },
            fitness_test: FitnessTestConfig {
                fail_implicit: true,
                ..FitnessTestConfig::default()
            },
            ..HardwareConfig::default()
        };

        // Breeds true in the test CPU: the test stops at depth 0.
        let f = factory::<Cpu>(config(0.0));
        let mut hw = f.create(&genome(&f, &["nop-C"; 20].join(" ")));
        let mut ctx = Context::new(3);
        let mut org = BasicOrganism::default();
        org.phenotype.test_fitness = Some(1.0);
        let mut child = genome(&f, ANCESTOR);
        assert!(!hw.test_fitness_measures(&mut ctx, &mut org, &mut child));
        assert_eq!(org.phenotype.fitness_tests, 1);
        assert!(org.phenotype.child_fertile);

        // Every test divide inserts a line, so the child never breeds true
        // and the test follows its offspring.
        let f = factory::<Cpu>(config(1.0));
        let mut hw = f.create(&genome(&f, &["nop-C"; 20].join(" ")));
        let mut org = BasicOrganism::default();
        org.phenotype.test_fitness = Some(1.0);
        let mut child = genome(&f, ANCESTOR);
        assert!(!hw.test_fitness_measures(&mut ctx, &mut org, &mut child));
        assert_eq!(org.phenotype.fitness_tests, 1);
        assert!(!org.phenotype.child_fertile);
        assert_eq!(child, genome(&f, ANCESTOR));
    }

    #[test]
    fn test_revert_blocks_band_sterilize() {
        let config = HardwareConfig {
            mutations: MutationRates::none(),
            fitness_test: FitnessTestConfig {
                revert: BandRates::uniform(1.0),
                sterilize: BandRates::uniform(1.0),
                ..FitnessTestConfig::default()
            },
            ..HardwareConfig::default()
        };
        let f = factory::<Cpu>(config);
        let parent = genome(&f, &["nop-C"; 20].join(" "));
        let mut hw = f.create(&parent);
        let mut ctx = Context::new(4);
        let mut org = BasicOrganism::default();
        org.phenotype.test_fitness = Some(1.0);
        let mut child = genome(&f, ANCESTOR);
        assert!(hw.test_fitness_measures(&mut ctx, &mut org, &mut child));
        assert_eq!(child, parent);
        assert!(org.phenotype.child_fertile);
    }

    #[test]
    fn test_resample_cap() {
        let config = HardwareConfig {
            divide_method: DivideMethod::Offspring,
            mutations: MutationRates {
                div_mut_prob: 1.0,
                ..MutationRates::none()
            },
            fitness_test: FitnessTestConfig {
                revert: BandRates::uniform(1.0),
                ..FitnessTestConfig::default()
            },
            ..HardwareConfig::default()
        };
        let f = factory::<Cpu>(config);
        let g = genome(&f, &["nop-C"; 10].join(" "));
        let mut hw = f.create(&g);
        let mut ctx = Context::new(9);
        let mut org = BasicOrganism::default();
        org.phenotype.test_fitness = Some(0.0);

        assert!(hw.allocate_main(&mut ctx, &mut org, 10));
        executed_all(&mut hw);
        copied_from(&mut hw, 10);
        assert!(hw.divide_rs(&mut ctx, &mut org, 10, 0, 1.0, Resample::Full));

        assert_eq!(org.phenotype.fitness_tests, MAX_RESAMPLES as u32);
        assert_eq!(org.phenotype.resamplings, MAX_RESAMPLES as u32 - 1);
        assert_eq!(org.phenotype.failed_resamplings, 1);
        let child = org.last_offspring().unwrap();
        assert!(!child.fertile);
        assert_eq!(child.genome, g);
        assert_eq!(child.div_type, DivideType::Resampled);
    }

    #[test]
    fn test_inject_host_shifts_heads() {
        let f = factory::<Cpu>(quiet());
        let g = genome(&f, "inc nop-A nop-B dec inc dec inc dec inc dec");
        let mut hw = f.create(&g);
        let mut org = BasicOrganism::default();
        hw.set_head_pos(crate::head::HeadId::Write, 5);
        let code = genome(&f, "add sub");
        let label: CodeLabel = "AB".parse().unwrap();

        assert!(hw.inject_host(&mut org, &label, &code));
        assert_eq!(hw.memory().len(), 12);
        assert_eq!(hw.memory().get(4), code[0]);
        assert!(hw.memory().has_flag(5, InstFlags::INJECTED));
        assert_eq!(hw.head(crate::head::HeadId::Write).pos, 7);
        assert_eq!(hw.ip().pos, 0);
        assert!(org.phenotype.is_modified);

        let missing: CodeLabel = "CC".parse().unwrap();
        assert!(!hw.inject_host(&mut org, &missing, &code));
    }
}
