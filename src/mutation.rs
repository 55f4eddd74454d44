//! Mutation rates and the trigger/scope rule table
//!
//! Rates are plain probabilities. `MutationRates` covers the fixed copy and
//! divide mutations every variant applies; `MutationRule` is the generic
//! table form (when, where, what, how often).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationRates {
    /// Per copied instruction: write a random instruction instead
    pub copy_mut_prob: f64,
    /// Per copy: move the read head to a random position
    pub copy_slip_prob: f64,

    /// Single-event divide mutations, one draw each
    pub divide_mut_prob: f64,
    pub divide_ins_prob: f64,
    pub divide_del_prob: f64,
    pub divide_uniform_prob: f64,
    pub divide_slip_prob: f64,

    /// Per-site divide mutations over the offspring
    pub div_mut_prob: f64,
    pub div_ins_prob: f64,
    pub div_del_prob: f64,
    pub div_uniform_prob: f64,
    /// Per-site slips; not counted as mutations
    pub div_slip_prob: f64,

    /// Per-site mutations applied to the parent on divide
    pub parent_mut_prob: f64,

    /// Per-site mutations applied to injected code
    pub inject_mut_prob: f64,
    pub inject_ins_prob: f64,
    pub inject_del_prob: f64,
}

impl Default for MutationRates {
    fn default() -> Self {
        Self {
            copy_mut_prob: 0.0075,
            copy_slip_prob: 0.0,
            divide_mut_prob: 0.0,
            divide_ins_prob: 0.05,
            divide_del_prob: 0.05,
            divide_uniform_prob: 0.0,
            divide_slip_prob: 0.0,
            div_mut_prob: 0.0,
            div_ins_prob: 0.0,
            div_del_prob: 0.0,
            div_uniform_prob: 0.0,
            div_slip_prob: 0.0,
            parent_mut_prob: 0.0,
            inject_mut_prob: 0.0,
            inject_ins_prob: 0.0,
            inject_del_prob: 0.0,
        }
    }
}

impl MutationRates {
    /// All rates zero: perfect copying and no divide mutations.
    pub fn none() -> Self {
        Self {
            copy_mut_prob: 0.0,
            divide_ins_prob: 0.0,
            divide_del_prob: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let all = [
            ("copy_mut_prob", self.copy_mut_prob),
            ("copy_slip_prob", self.copy_slip_prob),
            ("divide_mut_prob", self.divide_mut_prob),
            ("divide_ins_prob", self.divide_ins_prob),
            ("divide_del_prob", self.divide_del_prob),
            ("divide_uniform_prob", self.divide_uniform_prob),
            ("divide_slip_prob", self.divide_slip_prob),
            ("div_mut_prob", self.div_mut_prob),
            ("div_ins_prob", self.div_ins_prob),
            ("div_del_prob", self.div_del_prob),
            ("div_uniform_prob", self.div_uniform_prob),
            ("div_slip_prob", self.div_slip_prob),
            ("parent_mut_prob", self.parent_mut_prob),
            ("inject_mut_prob", self.inject_mut_prob),
            ("inject_ins_prob", self.inject_ins_prob),
            ("inject_del_prob", self.inject_del_prob),
        ];
        for (name, p) in all {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("mutations.{} must be in [0, 1], got {}", name, p));
            }
        }
        Ok(())
    }
}

/// When a rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationTrigger {
    /// Every `single_process` call
    Update,
    /// On the offspring, during divide
    Divide,
    /// On the parent's memory, during divide
    Parent,
}

/// How a rule picks sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationScope {
    /// One draw, one random site
    Genome,
    /// One draw, at the instruction pointer
    Local,
    /// Binomial draw over every site
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Point,
    Insert,
    Delete,
    /// Kill the organism outright
    Kill,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRule {
    pub trigger: MutationTrigger,
    pub scope: MutationScope,
    pub kind: MutationKind,
    pub rate: f64,
}

impl MutationRule {
    pub fn new(trigger: MutationTrigger, scope: MutationScope, kind: MutationKind, rate: f64) -> Self {
        Self {
            trigger,
            scope,
            kind,
            rate,
        }
    }
}
