//! Hardware configuration (can be loaded from YAML)
//!
//! One `HardwareConfig` is shared read-only by every engine built from the
//! same factory. Every struct uses `#[serde(default)]`, so a YAML file only
//! needs the keys it changes.

use crate::error::ConfigError;
use crate::mutation::{MutationRates, MutationRule, MutationTrigger};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Highest thread count representable in the id bitmask.
pub const MAX_THREAD_IDS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadSlicing {
    /// One instruction per `single_process` call
    #[default]
    OneInstruction,
    /// One instruction per live thread per call
    OnePerThread,
}

/// What happens to the parent after a successful divide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivideMethod {
    /// Parent keeps running untouched
    Offspring,
    /// Parent is fully reset, as if born again
    #[default]
    Split,
    /// Only the dividing thread is reset
    Birth,
}

/// How memory gained by an allocate is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocMethod {
    /// Reuse what was freed by the last shrink, then random
    Necro,
    Random,
    /// The instruction set's default (first nop)
    #[default]
    Default,
}

/// One line of a configured instruction set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstEntryConfig {
    pub name: String,
    /// Relative weight when drawing random instructions
    pub redundancy: u32,
    /// Attempts needed per execution (0 or 1 = free)
    pub cost: u32,
    /// Attempts that must fail before the first execution ever succeeds
    pub initial_cost: u32,
    /// Chance an attempt fails outright
    pub prob_fail: f64,
    /// Extra time charged after a successful execution
    pub addl_time_cost: u32,
}

impl Default for InstEntryConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            redundancy: 1,
            cost: 0,
            initial_cost: 0,
            prob_fail: 0.0,
            addl_time_cost: 0,
        }
    }
}

impl InstEntryConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Per-band probabilities for the divide fitness test.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BandRates {
    pub fatal: f64,
    pub neg: f64,
    pub neut: f64,
    pub pos: f64,
}

impl BandRates {
    pub fn any(&self) -> bool {
        self.fatal > 0.0 || self.neg > 0.0 || self.neut > 0.0 || self.pos > 0.0
    }

    pub fn uniform(p: f64) -> Self {
        Self {
            fatal: p,
            neg: p,
            neut: p,
            pos: p,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessTestConfig {
    /// Force the test on every non-identical divide even with zero rates
    pub test_on_divide: bool,
    /// Sterilize offspring whose test run never divided cleanly
    pub fail_implicit: bool,
    /// Neutral band is `[pf * (1 - neutral_min), pf * (1 + neutral_max)]`
    pub neutral_min: f64,
    pub neutral_max: f64,
    pub revert: BandRates,
    pub sterilize: BandRates,
}

impl FitnessTestConfig {
    /// True when divides must run the fitness test.
    pub fn is_active(&self) -> bool {
        self.test_on_divide || self.fail_implicit || self.revert.any() || self.sterilize.any()
    }
}

/// Reproduce without a divide instruction once a threshold is hit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplicitReproConfig {
    /// Time used (0 = off)
    pub time: u64,
    /// CPU cycles used (0 = off)
    pub cpu_cycles: u64,
    /// Reproduce when the IP wraps past the last line
    pub end: bool,
}

impl ImplicitReproConfig {
    pub fn is_active(&self) -> bool {
        self.time > 0 || self.cpu_cycles > 0 || self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub max_cpu_threads: usize,
    pub thread_slicing: ThreadSlicing,
    /// Maximum child/parent size ratio in either direction
    pub child_size_range: f64,
    /// Fraction of the parent that must have executed before a divide
    pub min_exe_lines: f64,
    /// Fraction of the child that must have been copied
    pub min_copied_lines: f64,
    pub min_creature_size: usize,
    pub max_creature_size: usize,
    /// Absolute genome limits (0 = off)
    pub min_genome_size: usize,
    pub max_genome_size: usize,
    pub divide_method: DivideMethod,
    pub alloc_method: AllocMethod,
    /// Allocate must come before every divide, and only once
    pub require_allocate: bool,
    /// Labels up to this length get the executed flag when read
    pub max_label_exe_size: usize,
    /// Instructions executed before the organism dies (0 = unlimited)
    pub max_executed: u64,
    pub test_cpu_time_mod: u64,
    pub test_cpu_generations: usize,
    pub min_inject_size: usize,
    pub transposon_insert_prob: f64,
    /// Market prices for `sell` and `buy`
    pub sell_price: i32,
    pub buy_price: i32,
    pub implicit_repro: ImplicitReproConfig,
    pub mutations: MutationRates,
    pub fitness_test: FitnessTestConfig,
    /// Empty = the variant's default instruction set
    pub inst_set: Vec<InstEntryConfig>,
    pub mutation_rules: Vec<MutationRule>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            max_cpu_threads: 1,
            thread_slicing: ThreadSlicing::OneInstruction,
            child_size_range: 2.0,
            min_exe_lines: 0.5,
            min_copied_lines: 0.5,
            min_creature_size: 8,
            max_creature_size: 2048,
            min_genome_size: 0,
            max_genome_size: 0,
            divide_method: DivideMethod::Split,
            alloc_method: AllocMethod::Default,
            require_allocate: true,
            max_label_exe_size: 1,
            max_executed: 0,
            test_cpu_time_mod: 20,
            test_cpu_generations: 3,
            min_inject_size: 8,
            transposon_insert_prob: 0.01,
            sell_price: 0,
            buy_price: 0,
            implicit_repro: ImplicitReproConfig::default(),
            mutations: MutationRates::default(),
            fitness_test: FitnessTestConfig::default(),
            inst_set: Vec::new(),
            mutation_rules: Vec::new(),
        }
    }
}

impl HardwareConfig {
    /// Load config from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: HardwareConfig = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Save config to a YAML file
    pub fn to_yaml(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_yaml_string()?)?;
        Ok(())
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Copy used by test CPUs: no fitness test on divide, no implicit
    /// reproduction, no update-time mutation rules.
    pub fn for_test_cpu(&self) -> Self {
        let mut cfg = self.clone();
        cfg.fitness_test = FitnessTestConfig::default();
        cfg.implicit_repro = ImplicitReproConfig::default();
        cfg.mutation_rules
            .retain(|r| r.trigger != MutationTrigger::Update);
        cfg
    }

    pub fn rules(&self, trigger: MutationTrigger) -> impl Iterator<Item = &MutationRule> {
        self.mutation_rules.iter().filter(move |r| r.trigger == trigger)
    }

    /// Validate configuration and return warnings.
    /// Returns Err if there are fatal configuration errors
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        let mut warnings = Vec::new();

        if self.max_cpu_threads == 0 || self.max_cpu_threads > MAX_THREAD_IDS {
            return Err(ConfigError::Invalid(format!(
                "max_cpu_threads must be in 1..={}, got {}",
                MAX_THREAD_IDS, self.max_cpu_threads
            )));
        }
        if self.child_size_range < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "child_size_range must be >= 1.0, got {}",
                self.child_size_range
            )));
        }
        if self.min_creature_size == 0 || self.min_creature_size > self.max_creature_size {
            return Err(ConfigError::Invalid(format!(
                "creature size bounds [{}, {}] are empty",
                self.min_creature_size, self.max_creature_size
            )));
        }
        if self.max_genome_size > 0 && self.min_genome_size > self.max_genome_size {
            return Err(ConfigError::Invalid(format!(
                "min_genome_size {} exceeds max_genome_size {}",
                self.min_genome_size, self.max_genome_size
            )));
        }
        for (name, p) in [
            ("min_exe_lines", self.min_exe_lines),
            ("min_copied_lines", self.min_copied_lines),
            ("transposon_insert_prob", self.transposon_insert_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!("{} must be in [0, 1], got {}", name, p)));
            }
        }
        self.mutations.validate().map_err(ConfigError::Invalid)?;

        for rule in &self.mutation_rules {
            if !(0.0..=1.0).contains(&rule.rate) {
                return Err(ConfigError::Invalid(format!(
                    "mutation rule rate must be in [0, 1], got {}",
                    rule.rate
                )));
            }
        }

        for entry in &self.inst_set {
            if entry.name.is_empty() {
                return Err(ConfigError::Invalid("inst_set entry with empty name".to_string()));
            }
            if !(0.0..=1.0).contains(&entry.prob_fail) {
                return Err(ConfigError::Invalid(format!(
                    "{}: prob_fail must be in [0, 1], got {}",
                    entry.name, entry.prob_fail
                )));
            }
            if entry.redundancy == 0 {
                warnings.push(format!(
                    "{} has redundancy 0 and will never be drawn by random mutations",
                    entry.name
                ));
            }
        }

        if self.thread_slicing == ThreadSlicing::OnePerThread && self.max_cpu_threads == 1 {
            warnings.push("thread_slicing one_per_thread has no effect with a single thread".to_string());
        }
        if self.fitness_test.is_active() && self.test_cpu_generations == 0 {
            warnings.push(
                "fitness test enabled with test_cpu_generations = 0; every offspring counts as fatal"
                    .to_string(),
            );
        }
        if !self.require_allocate && self.alloc_method == AllocMethod::Necro {
            warnings.push("necro allocation without require_allocate may reuse stale memory".to_string());
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{MutationKind, MutationScope};

    #[test]
    fn test_defaults() {
        let cfg = HardwareConfig::default();
        assert_eq!(cfg.max_cpu_threads, 1);
        assert_eq!(cfg.child_size_range, 2.0);
        assert_eq!(cfg.divide_method, DivideMethod::Split);
        assert_eq!(cfg.alloc_method, AllocMethod::Default);
        assert!(cfg.require_allocate);
        assert_eq!(cfg.max_label_exe_size, 1);
        assert!(cfg.validate().unwrap().is_empty());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "max_cpu_threads: 4\ndivide_method: birth\nfitness_test:\n  revert:\n    neg: 0.5\n";
        let cfg = HardwareConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.max_cpu_threads, 4);
        assert_eq!(cfg.divide_method, DivideMethod::Birth);
        assert_eq!(cfg.fitness_test.revert.neg, 0.5);
        assert_eq!(cfg.fitness_test.revert.pos, 0.0);
        assert!(cfg.fitness_test.is_active());
        assert_eq!(cfg.min_creature_size, 8);
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut cfg = HardwareConfig::default();
        cfg.inst_set.push(InstEntryConfig::named("nop-A"));
        cfg.mutation_rules.push(MutationRule::new(
            MutationTrigger::Update,
            MutationScope::Genome,
            MutationKind::Point,
            0.1,
        ));
        let text = cfg.to_yaml_string().unwrap();
        let back = HardwareConfig::from_yaml_str(&text).unwrap();
        assert_eq!(back.inst_set, cfg.inst_set);
        assert_eq!(back.mutation_rules, cfg.mutation_rules);
    }

    #[test]
    fn test_validate_errors() {
        let cfg = HardwareConfig {
            max_cpu_threads: 0,
            ..HardwareConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = HardwareConfig {
            child_size_range: 0.5,
            ..HardwareConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = HardwareConfig {
            min_creature_size: 100,
            max_creature_size: 10,
            ..HardwareConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let cfg = HardwareConfig {
            thread_slicing: ThreadSlicing::OnePerThread,
            ..HardwareConfig::default()
        };
        let warnings = cfg.validate().unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_for_test_cpu_disables_fitness_test() {
        let mut cfg = HardwareConfig::default();
        cfg.fitness_test.revert = BandRates::uniform(1.0);
        cfg.implicit_repro.end = true;
        cfg.mutation_rules.push(MutationRule::new(
            MutationTrigger::Update,
            MutationScope::Global,
            MutationKind::Point,
            0.5,
        ));
        let test_cfg = cfg.for_test_cpu();
        assert!(!test_cfg.fitness_test.is_active());
        assert!(!test_cfg.implicit_repro.is_active());
        assert_eq!(test_cfg.rules(MutationTrigger::Update).count(), 0);
    }
}
