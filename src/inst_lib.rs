//! Instruction library and configured instruction sets
//!
//! An `InstLib` is the full table of instructions a hardware variant knows,
//! built once by the factory and shared read-only. An `InstSet` picks entries
//! from the library in a configured order: the position of an entry in the
//! set is its opcode byte, and it carries the per-opcode costs.

use crate::config::InstEntryConfig;
use crate::context::Context;
use crate::error::InstSetError;
use crate::inst::Instruction;
use std::collections::HashMap;

/// One library entry. `O` is the variant's opcode enum.
#[derive(Debug, Clone)]
pub struct InstLibEntry<O> {
    pub name: &'static str,
    pub op: O,
    /// Modifier value for label nops, `None` for everything else
    pub nop_mod: Option<u8>,
    /// Filler used by default allocation and empty memory spaces
    pub is_default: bool,
    pub desc: &'static str,
}

impl<O> InstLibEntry<O> {
    pub fn new(name: &'static str, op: O, desc: &'static str) -> Self {
        Self {
            name,
            op,
            nop_mod: None,
            is_default: false,
            desc,
        }
    }

    pub fn nop(name: &'static str, op: O, nop_mod: u8, desc: &'static str) -> Self {
        Self {
            name,
            op,
            nop_mod: Some(nop_mod),
            is_default: false,
            desc,
        }
    }

    pub fn default_inst(mut self) -> Self {
        self.is_default = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct InstLib<O> {
    entries: Vec<InstLibEntry<O>>,
    by_name: HashMap<&'static str, usize>,
    /// Names making up the set used when none is configured
    default_set: Vec<&'static str>,
}

impl<O: Copy> InstLib<O> {
    pub fn new(entries: Vec<InstLibEntry<O>>, default_set: Vec<&'static str>) -> Self {
        let by_name = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name, i))
            .collect();
        Self {
            entries,
            by_name,
            default_set,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn entry(&self, idx: usize) -> &InstLibEntry<O> {
        &self.entries[idx]
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn entries(&self) -> &[InstLibEntry<O>] {
        &self.entries
    }

    pub fn default_set(&self) -> &[&'static str] {
        &self.default_set
    }

    /// Config lines for the default set, all with default costs.
    pub fn default_set_config(&self) -> Vec<InstEntryConfig> {
        self.default_set.iter().map(|n| InstEntryConfig::named(n)).collect()
    }
}

/// One opcode of a configured set.
#[derive(Debug, Clone, PartialEq)]
pub struct InstSetEntry {
    pub lib_index: usize,
    pub name: String,
    pub nop_mod: Option<u8>,
    pub redundancy: u32,
    pub cost: u32,
    pub initial_cost: u32,
    pub prob_fail: f64,
    pub addl_time_cost: u32,
}

#[derive(Debug, Clone)]
pub struct InstSet {
    entries: Vec<InstSetEntry>,
    by_name: HashMap<String, Instruction>,
    /// Every opcode repeated `redundancy` times, for weighted draws
    mutation_chart: Vec<Instruction>,
    default_inst: Instruction,
    num_nops: usize,
}

impl InstSet {
    /// Resolve config lines against a library. Nops must come first so that
    /// opcode order and modifier order agree.
    pub fn build<O: Copy>(lib: &InstLib<O>, config: &[InstEntryConfig]) -> Result<Self, InstSetError> {
        if config.is_empty() {
            return Err(InstSetError::Empty);
        }
        if config.len() > Instruction::ERROR.index() {
            return Err(InstSetError::TooLarge(config.len()));
        }

        let mut entries = Vec::with_capacity(config.len());
        let mut by_name = HashMap::new();
        let mut mutation_chart = Vec::new();
        let mut default_inst = None;
        let mut num_nops = 0;
        let mut seen_non_nop = false;

        for (op, line) in config.iter().enumerate() {
            let lib_index = lib
                .find(&line.name)
                .ok_or_else(|| InstSetError::UnknownInstruction(line.name.clone()))?;
            let lib_entry = lib.entry(lib_index);
            let inst = Instruction(op as u8);

            match lib_entry.nop_mod {
                Some(_) if seen_non_nop => return Err(InstSetError::NopsNotFirst(line.name.clone())),
                Some(_) => num_nops += 1,
                None => seen_non_nop = true,
            }
            if lib_entry.is_default && default_inst.is_none() {
                default_inst = Some(inst);
            }

            mutation_chart.extend(std::iter::repeat(inst).take(line.redundancy as usize));
            by_name.entry(line.name.clone()).or_insert(inst);
            entries.push(InstSetEntry {
                lib_index,
                name: line.name.clone(),
                nop_mod: lib_entry.nop_mod,
                redundancy: line.redundancy,
                cost: line.cost,
                initial_cost: line.initial_cost,
                prob_fail: line.prob_fail,
                addl_time_cost: line.addl_time_cost,
            });
        }

        Ok(Self {
            entries,
            by_name,
            mutation_chart,
            default_inst: default_inst.unwrap_or(Instruction(0)),
            num_nops,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, inst: Instruction) -> Option<&InstSetEntry> {
        self.entries.get(inst.index())
    }

    pub fn entries(&self) -> &[InstSetEntry] {
        &self.entries
    }

    #[inline]
    pub fn is_nop(&self, inst: Instruction) -> bool {
        self.nop_mod(inst).is_some()
    }

    #[inline]
    pub fn nop_mod(&self, inst: Instruction) -> Option<u8> {
        self.get(inst).and_then(|e| e.nop_mod)
    }

    pub fn num_nops(&self) -> usize {
        self.num_nops
    }

    pub fn name(&self, inst: Instruction) -> &str {
        self.get(inst).map(|e| e.name.as_str()).unwrap_or("(error)")
    }

    pub fn inst(&self, name: &str) -> Option<Instruction> {
        self.by_name.get(name).copied()
    }

    pub fn default_inst(&self) -> Instruction {
        self.default_inst
    }

    /// Instruction for a nop modifier; modifiers are the first opcodes.
    pub fn nop_inst(&self, nop_mod: u8) -> Option<Instruction> {
        self.entries
            .iter()
            .position(|e| e.nop_mod == Some(nop_mod))
            .map(|i| Instruction(i as u8))
    }

    #[inline]
    pub fn cost(&self, inst: Instruction) -> u32 {
        self.get(inst).map_or(0, |e| e.cost)
    }

    #[inline]
    pub fn initial_cost(&self, inst: Instruction) -> u32 {
        self.get(inst).map_or(0, |e| e.initial_cost)
    }

    #[inline]
    pub fn prob_fail(&self, inst: Instruction) -> f64 {
        self.get(inst).map_or(0.0, |e| e.prob_fail)
    }

    #[inline]
    pub fn addl_time_cost(&self, inst: Instruction) -> u32 {
        self.get(inst).map_or(0, |e| e.addl_time_cost)
    }

    pub fn has_costs(&self) -> bool {
        self.entries.iter().any(|e| e.cost > 1)
    }

    pub fn has_ft_costs(&self) -> bool {
        self.entries.iter().any(|e| e.initial_cost > 0)
    }

    /// Random instruction weighted by redundancy.
    pub fn random_inst(&self, ctx: &mut Context) -> Instruction {
        if self.mutation_chart.is_empty() {
            return Instruction(ctx.uint(self.entries.len()) as u8);
        }
        self.mutation_chart[ctx.uint(self.mutation_chart.len())]
    }

    /// Parse whitespace or comma separated instruction names.
    pub fn parse_genome(&self, text: &str) -> Result<Vec<Instruction>, InstSetError> {
        text.split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(|name| {
                self.inst(name)
                    .ok_or_else(|| InstSetError::UnknownInstruction(name.to_string()))
            })
            .collect()
    }

    pub fn genome_to_string(&self, genome: &[Instruction]) -> String {
        genome
            .iter()
            .map(|&i| self.name(i))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum TestOp {
        Nop,
        Inc,
        Dec,
    }

    fn lib() -> InstLib<TestOp> {
        InstLib::new(
            vec![
                InstLibEntry::nop("nop-A", TestOp::Nop, 0, "").default_inst(),
                InstLibEntry::nop("nop-B", TestOp::Nop, 1, ""),
                InstLibEntry::new("inc", TestOp::Inc, ""),
                InstLibEntry::new("dec", TestOp::Dec, ""),
            ],
            vec!["nop-A", "nop-B", "inc", "dec"],
        )
    }

    #[test]
    fn test_build_default_set() {
        let lib = lib();
        let set = InstSet::build(&lib, &lib.default_set_config()).unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.num_nops(), 2);
        assert!(set.is_nop(Instruction(1)));
        assert!(!set.is_nop(Instruction(2)));
        assert!(!set.is_nop(Instruction::ERROR));
        assert_eq!(set.default_inst(), Instruction(0));
        assert_eq!(lib.entry(set.get(Instruction(3)).unwrap().lib_index).op, TestOp::Dec);
    }

    #[test]
    fn test_build_errors() {
        let lib = lib();
        assert_eq!(InstSet::build(&lib, &[]).unwrap_err(), InstSetError::Empty);

        let bad = vec![InstEntryConfig::named("nop-A"), InstEntryConfig::named("jump")];
        assert_eq!(
            InstSet::build(&lib, &bad).unwrap_err(),
            InstSetError::UnknownInstruction("jump".to_string())
        );

        let order = vec![InstEntryConfig::named("inc"), InstEntryConfig::named("nop-A")];
        assert_eq!(
            InstSet::build(&lib, &order).unwrap_err(),
            InstSetError::NopsNotFirst("nop-A".to_string())
        );
    }

    #[test]
    fn test_parse_and_print_genome() {
        let lib = lib();
        let set = InstSet::build(&lib, &lib.default_set_config()).unwrap();
        let genome = set.parse_genome("inc nop-B,\ndec").unwrap();
        assert_eq!(genome, vec![Instruction(2), Instruction(1), Instruction(3)]);
        assert_eq!(set.genome_to_string(&genome), "inc nop-B dec");
        assert!(set.parse_genome("inc bogus").is_err());
    }

    #[test]
    fn test_random_inst_respects_redundancy() {
        let lib = lib();
        let mut config = lib.default_set_config();
        config[0].redundancy = 0;
        config[1].redundancy = 0;
        config[3].redundancy = 0;
        let set = InstSet::build(&lib, &config).unwrap();
        let mut ctx = Context::new(11);
        for _ in 0..50 {
            assert_eq!(set.random_inst(&mut ctx), Instruction(2));
        }
    }
}
