//! Test CPU: run a genome in isolation to see whether it reproduces
//!
//! A genome is run for a bounded time in a private engine with a
//! stand-alone organism. When it divides, the child is compared against
//! the genome and its ancestors in the same test, and tested in turn up to
//! the configured number of generations.

use crate::config::HardwareConfig;
use crate::context::{split_mix_64, Context};
use crate::hardware::{Hardware, Variant};
use crate::inst::Instruction;
use crate::inst_lib::{InstLib, InstSet};
use crate::organism::{BasicOrganism, Phenotype};
use rayon::prelude::*;
use std::sync::Arc;

/// Fixed inputs used when random inputs are turned off.
pub const FIXED_INPUTS: [i32; 3] = [0x0f13149f, 0x3308e53e, 0x556241eb];
pub const FIXED_RECEIVE: [i32; 3] = [0x0f139f14, 0x33083ee5, 0x5562eb41];

/// Top bytes of the three tagged input words: 00001111, 00110011, 01010101.
const INPUT_TAGS: [i32; 3] = [15, 51, 85];

/// Three input words with tagged top bytes and random low 24 bits.
pub fn random_tagged_words(ctx: &mut Context) -> [i32; 3] {
    INPUT_TAGS.map(|tag| (tag << 24) + ctx.uint(1 << 24) as i32)
}

/// What one generation of a test run did.
#[derive(Debug, Clone)]
pub struct TestGeneration {
    pub genome: Vec<Instruction>,
    pub phenotype: Phenotype,
    pub child: Option<Vec<Instruction>>,
    pub faults: usize,
}

impl TestGeneration {
    pub fn divided(&self) -> bool {
        self.child.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct TestInfo {
    /// Generations to follow before giving up
    pub generation_tests: usize,
    pub use_random_inputs: bool,
    pub is_viable: bool,
    pub max_depth: usize,
    /// Generation at which a true copy (or an ancestor) was produced
    pub depth_found: Option<usize>,
    pub max_cycle: usize,
    /// Ancestor generation a cycle returned to
    pub cycle_to: Option<usize>,
    /// Inputs used by the first generation
    pub used_inputs: Vec<i32>,
    pub generations: Vec<TestGeneration>,
}

impl TestInfo {
    pub fn new(generation_tests: usize) -> Self {
        Self {
            generation_tests,
            use_random_inputs: false,
            is_viable: false,
            max_depth: 0,
            depth_found: None,
            max_cycle: 0,
            cycle_to: None,
            used_inputs: Vec::new(),
            generations: Vec::new(),
        }
    }

    pub fn random_inputs(generation_tests: usize) -> Self {
        Self {
            use_random_inputs: true,
            ..Self::new(generation_tests)
        }
    }

    pub fn clear(&mut self) {
        self.is_viable = false;
        self.max_depth = 0;
        self.depth_found = None;
        self.max_cycle = 0;
        self.cycle_to = None;
        self.used_inputs.clear();
        self.generations.clear();
    }

    /// Fitness of the tested genome itself; zero when it never divided.
    pub fn genotype_fitness(&self) -> f64 {
        match self.generations.first() {
            Some(g) if g.divided() => g.phenotype.fitness,
            _ => 0.0,
        }
    }

    /// Reproduction class:
    /// 0 = parent never divides, 2 = only the parent divides,
    /// 3 = several generations divide but none breeds true,
    /// 4 = parent breeds true, 5 = child breeds true, 6 = a later one does.
    pub fn repro_class(&self) -> u8 {
        let depth = self.max_depth.min(2) as u8;
        if !self.is_viable && depth == 0 {
            return 0;
        }
        self.is_viable as u8 * 3 + 1 + depth
    }
}

/// Engine factory for isolated test runs.
#[derive(Debug, Clone)]
pub struct TestCpu<V: Variant> {
    lib: Arc<InstLib<V::Op>>,
    inst_set: Arc<InstSet>,
    config: Arc<HardwareConfig>,
}

impl<V: Variant> TestCpu<V> {
    pub fn new(lib: Arc<InstLib<V::Op>>, inst_set: Arc<InstSet>, config: Arc<HardwareConfig>) -> Self {
        Self { lib, inst_set, config }
    }

    /// Test a genome from scratch. Returns whether it is viable.
    pub fn test_genome(&self, ctx: &mut Context, info: &mut TestInfo, genome: &[Instruction]) -> bool {
        info.clear();
        if info.generation_tests > 0 {
            self.test_body(ctx, info, genome, 0);
        }
        info.is_viable
    }

    fn test_body(&self, ctx: &mut Context, info: &mut TestInfo, genome: &[Instruction], depth: usize) -> bool {
        let (inputs, receive) = if info.use_random_inputs {
            (random_tagged_words(ctx), random_tagged_words(ctx))
        } else {
            (FIXED_INPUTS, FIXED_RECEIVE)
        };
        if depth == 0 {
            info.used_inputs = inputs.to_vec();
        }
        info.max_depth = info.max_depth.max(depth);

        let generation = self.run_gestation(ctx, genome, &inputs, &receive);
        let child = generation.child.clone();
        info.generations.truncate(depth);
        info.generations.push(generation);

        let Some(child) = child else {
            return false;
        };

        if child.as_slice() == genome {
            info.depth_found = Some(depth);
            info.is_viable = true;
            return true;
        }

        let mut is_ancestor = false;
        for anc_depth in 0..depth {
            if info.generations[anc_depth].genome == child {
                is_ancestor = true;
                info.max_cycle = info.max_cycle.max(depth - anc_depth);
                info.cycle_to = Some(anc_depth);
            }
        }
        if is_ancestor {
            info.depth_found = Some(depth);
            info.is_viable = true;
            return true;
        }

        if depth + 1 < info.generation_tests {
            return self.test_body(ctx, info, &child, depth + 1);
        }
        false
    }

    /// Run one organism until its first divide, death or the time limit.
    fn run_gestation(
        &self,
        ctx: &mut Context,
        genome: &[Instruction],
        inputs: &[i32],
        receive: &[i32],
    ) -> TestGeneration {
        let mut org = BasicOrganism::new(inputs.to_vec());
        org.inbox.extend(receive.iter().copied());
        let mut hw: Hardware<V> = Hardware::new(
            self.lib.clone(),
            self.inst_set.clone(),
            self.config.clone(),
            self.config.clone(),
            genome,
        );

        let time_allocated = self.config.test_cpu_time_mod * genome.len() as u64;
        while org.phenotype.time_used < time_allocated
            && !hw.memory().is_empty()
            && org.phenotype.num_divides == 0
            && !org.dead
        {
            hw.single_process(ctx, &mut org);
        }

        log::trace!(
            "test cpu: {} lines ran {} steps, {} divides",
            genome.len(),
            org.phenotype.time_used,
            org.phenotype.num_divides
        );

        TestGeneration {
            genome: genome.to_vec(),
            child: org.offspring.first().map(|o| o.genome.clone()),
            faults: org.faults.len(),
            phenotype: org.phenotype,
        }
    }

    /// Test many genomes in parallel. Genome `i` draws from a context
    /// seeded with `split_mix_64(seed + i)`, so results do not depend on
    /// the number of worker threads.
    pub fn test_batch(&self, seed: u64, genomes: &[Vec<Instruction>], random_inputs: bool) -> Vec<TestInfo> {
        let generations = self.config.test_cpu_generations;
        genomes
            .par_iter()
            .enumerate()
            .map(|(i, genome)| {
                let mut ctx = Context::new(split_mix_64(seed.wrapping_add(i as u64)));
                let mut info = if random_inputs {
                    TestInfo::random_inputs(generations)
                } else {
                    TestInfo::new(generations)
                };
                self.test_genome(&mut ctx, &mut info, genome);
                info
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::cpu::{Cpu, ANCESTOR};
    use crate::hardware::test_util::{factory, genome};
    use crate::mutation::MutationRates;

    fn quiet() -> HardwareConfig {
        HardwareConfig {
            mutations: MutationRates::none(),
            ..HardwareConfig::default()
        }
    }

    #[test]
    fn test_ancestor_breeds_true() {
        let f = factory::<Cpu>(quiet());
        let g = genome(&f, ANCESTOR);
        let mut ctx = Context::new(1);
        let mut info = TestInfo::new(3);
        assert!(f.test_cpu().test_genome(&mut ctx, &mut info, &g));
        assert_eq!(info.depth_found, Some(0));
        assert_eq!(info.max_depth, 0);
        assert_eq!(info.repro_class(), 4);
        assert!(info.genotype_fitness() > 0.0);
        assert_eq!(info.used_inputs, FIXED_INPUTS.to_vec());
    }

    #[test]
    fn test_non_replicator_is_not_viable() {
        let f = factory::<Cpu>(quiet());
        let g = genome(&f, &["nop-C"; 12].join(" "));
        let mut ctx = Context::new(1);
        let mut info = TestInfo::new(3);
        assert!(!f.test_cpu().test_genome(&mut ctx, &mut info, &g));
        assert_eq!(info.genotype_fitness(), 0.0);
        assert_eq!(info.repro_class(), 0);
        assert_eq!(info.generations.len(), 1);
        assert_eq!(info.generations[0].phenotype.time_used, 20 * 12);
    }

    #[test]
    fn test_random_inputs_are_tagged() {
        let mut ctx = Context::new(4);
        let words = random_tagged_words(&mut ctx);
        assert_eq!(words[0] >> 24, 15);
        assert_eq!(words[1] >> 24, 51);
        assert_eq!(words[2] >> 24, 85);
    }

    #[test]
    fn test_batch_is_deterministic() {
        let f = factory::<Cpu>(quiet());
        let genomes = vec![genome(&f, ANCESTOR), genome(&f, &["nop-A"; 10].join(" "))];
        let a = f.test_cpu().test_batch(7, &genomes, true);
        let b = f.test_cpu().test_batch(7, &genomes, true);
        assert_eq!(a.len(), 2);
        assert!(a[0].is_viable);
        assert!(!a[1].is_viable);
        assert_eq!(a[0].used_inputs, b[0].used_inputs);
        assert_eq!(a[0].genotype_fitness(), b[0].genotype_fitness());
    }
}
