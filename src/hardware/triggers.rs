//! Rule-driven mutations
//!
//! Each `MutationRule` names when it fires, how its rate is read and what
//! it does to the target memory. Update rules act on the IP's memory space,
//! Divide rules on the offspring and Parent rules on main memory.

use super::{Hardware, Variant};
use crate::context::Context;
use crate::inst::InstFlags;
use crate::inst_lib::InstSet;
use crate::memory::GenomeBuffer;
use crate::mutation::{MutationKind, MutationRule, MutationScope, MutationTrigger};
use crate::organism::Organism;

/// What a batch of rules did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerOutcome {
    pub mutations: usize,
    /// A kill rule fired
    pub kill: bool,
}

/// Size bounds respected by insert and delete rules.
#[derive(Debug, Clone, Copy)]
pub struct SizeBounds {
    pub min: usize,
    pub max: usize,
}

fn apply_kind(
    ctx: &mut Context,
    inst_set: &InstSet,
    kind: MutationKind,
    target: &mut GenomeBuffer,
    pos: usize,
    bounds: SizeBounds,
    outcome: &mut TriggerOutcome,
) {
    match kind {
        MutationKind::Point => {
            if pos < target.len() {
                target.set(pos, inst_set.random_inst(ctx));
                target.set_flag(pos, InstFlags::MUTATED | InstFlags::POINT_MUT);
                outcome.mutations += 1;
            }
        }
        MutationKind::Insert => {
            if target.len() < bounds.max {
                let pos = pos.min(target.len());
                target.insert(pos, inst_set.random_inst(ctx));
                target.set_flag(pos, InstFlags::MUTATED);
                outcome.mutations += 1;
            }
        }
        MutationKind::Delete => {
            if target.len() > bounds.min && pos < target.len() {
                target.remove(pos, 1);
                outcome.mutations += 1;
            }
        }
        MutationKind::Kill => outcome.kill = true,
    }
}

/// Run every rule against `target`. `local` is the position used by
/// local-scope rules.
pub fn apply_rules<'a>(
    ctx: &mut Context,
    inst_set: &InstSet,
    rules: impl IntoIterator<Item = &'a MutationRule>,
    target: &mut GenomeBuffer,
    local: usize,
    bounds: SizeBounds,
) -> TriggerOutcome {
    let mut outcome = TriggerOutcome::default();
    for rule in rules {
        if target.is_empty() {
            break;
        }
        match rule.scope {
            MutationScope::Genome => {
                if ctx.p(rule.rate) {
                    let pos = ctx.uint(target.len());
                    apply_kind(ctx, inst_set, rule.kind, target, pos, bounds, &mut outcome);
                }
            }
            MutationScope::Local => {
                if ctx.p(rule.rate) {
                    apply_kind(ctx, inst_set, rule.kind, target, local, bounds, &mut outcome);
                }
            }
            MutationScope::Global => {
                let count = ctx.binomial(target.len(), rule.rate);
                for _ in 0..count {
                    if target.is_empty() {
                        break;
                    }
                    let pos = ctx.uint(target.len());
                    apply_kind(ctx, inst_set, rule.kind, target, pos, bounds, &mut outcome);
                }
            }
        }
    }
    outcome
}

impl<V: Variant> Hardware<V> {
    pub(crate) fn size_bounds(&self) -> SizeBounds {
        SizeBounds {
            min: self.config.min_creature_size,
            max: self.config.max_creature_size,
        }
    }

    /// Fire update rules on the memory space under the IP.
    pub fn trigger_update_mutations(&mut self, ctx: &mut Context, org: &mut dyn Organism) -> bool {
        let config = self.config.clone();
        let mut rules = config.rules(MutationTrigger::Update).peekable();
        if rules.peek().is_none() {
            return false;
        }
        let ip = self.ip();
        let bounds = self.size_bounds();
        let Some(target) = self.spaces.get_mut(ip.space) else {
            return false;
        };
        let outcome = apply_rules(ctx, &self.inst_set, rules, target, ip.index(), bounds);
        self.adjust_heads();
        if outcome.kill {
            org.die();
        }
        outcome.mutations > 0 || outcome.kill
    }

    /// Fire divide rules on the offspring buffer.
    pub(crate) fn trigger_divide_mutations(&self, ctx: &mut Context, child: &mut GenomeBuffer) -> TriggerOutcome {
        let local = self.ip().index().min(child.len().saturating_sub(1));
        apply_rules(
            ctx,
            &self.inst_set,
            self.config.rules(MutationTrigger::Divide),
            child,
            local,
            self.size_bounds(),
        )
    }

    /// Fire parent rules on main memory.
    pub(crate) fn trigger_parent_mutations(&mut self, ctx: &mut Context) -> TriggerOutcome {
        let config = self.config.clone();
        let local = self.ip().index();
        let bounds = self.size_bounds();
        let outcome = apply_rules(
            ctx,
            &self.inst_set,
            config.rules(MutationTrigger::Parent),
            &mut self.spaces[0],
            local,
            bounds,
        );
        self.adjust_heads();
        outcome
    }
}
