//! Growing main memory ahead of a divide

use super::{Hardware, Variant};
use crate::config::AllocMethod;
use crate::context::Context;
use crate::fault::FaultLocation;
use crate::organism::Organism;

impl<V: Variant> Hardware<V> {
    /// Extend main memory by `allocated_size` slots and mark the allocation
    /// pending until the next divide.
    pub fn allocate_main(&mut self, ctx: &mut Context, org: &mut dyn Organism, allocated_size: i32) -> bool {
        if self.config.require_allocate && self.mal_active {
            self.fault(org, FaultLocation::Alloc, "Allocate already active");
            return false;
        }
        if allocated_size < 1 {
            self.fault(org, FaultLocation::Alloc, format!("Allocate of {} too small", allocated_size));
            return false;
        }

        let old_size = self.memory().len() as i64;
        let new_size = old_size + allocated_size as i64;
        if new_size > self.config.max_creature_size as i64 || new_size < self.config.min_creature_size as i64 {
            self.fault(org, FaultLocation::Alloc, format!("Invalid post-allocate size ({})", new_size));
            return false;
        }

        let range = self.config.child_size_range;
        let max_alloc_size = (old_size as f64 * range) as i64;
        if allocated_size as i64 > max_alloc_size {
            self.fault(
                org,
                FaultLocation::Alloc,
                format!("Allocate too large ({} > {})", allocated_size, max_alloc_size),
            );
            return false;
        }
        let max_old_size = (allocated_size as f64 * range) as i64;
        if old_size > max_old_size {
            self.fault(
                org,
                FaultLocation::Alloc,
                format!("Allocate too small ({} > {})", old_size, max_old_size),
            );
            return false;
        }

        let old_size = old_size as usize;
        let new_size = new_size as usize;
        let fill = self.inst_set.default_inst();
        match self.config.alloc_method {
            AllocMethod::Necro => {
                let recovered = self.memory_mut().resize_old(new_size, fill);
                self.randomize_range(ctx, old_size + recovered, new_size);
            }
            AllocMethod::Random => {
                self.memory_mut().resize(new_size, fill);
                self.randomize_range(ctx, old_size, new_size);
            }
            AllocMethod::Default => self.memory_mut().resize(new_size, fill),
        }

        log::debug!("organism {} allocated {} -> {}", org.id(), old_size, new_size);
        self.mal_active = true;
        true
    }

    fn randomize_range(&mut self, ctx: &mut Context, start: usize, end: usize) {
        for i in start..end {
            let inst = self.inst_set.random_inst(ctx);
            self.memory_mut().set(i, inst);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{AllocMethod, HardwareConfig};
    use crate::context::Context;
    use crate::fault::FaultLocation;
    use crate::hardware::cpu::Cpu;
    use crate::hardware::test_util::{factory, genome};
    use crate::organism::BasicOrganism;

    const TEN_NOPS: &str = "nop-A nop-A nop-A nop-A nop-A nop-A nop-A nop-A nop-A nop-A";

    #[test]
    fn test_allocate_grows_with_default_inst() {
        let f = factory::<Cpu>(HardwareConfig::default());
        let mut hw = f.create(&genome(&f, TEN_NOPS));
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        assert!(hw.allocate_main(&mut ctx, &mut org, 10));
        assert_eq!(hw.memory().len(), 20);
        assert!(hw.mal_active());
        assert!(hw.memory().iter().all(|i| i == f.inst_set().default_inst()));
        assert!(org.faults.is_empty());
    }

    #[test]
    fn test_allocate_rejects_second_and_bad_sizes() {
        let f = factory::<Cpu>(HardwareConfig::default());
        let mut hw = f.create(&genome(&f, TEN_NOPS));
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();

        assert!(!hw.allocate_main(&mut ctx, &mut org, 0));
        assert_eq!(org.faults[0].message, "Allocate of 0 too small");

        assert!(!hw.allocate_main(&mut ctx, &mut org, 21));
        assert_eq!(org.faults[1].message, "Allocate too large (21 > 20)");

        assert!(!hw.allocate_main(&mut ctx, &mut org, 4));
        assert_eq!(org.faults[2].message, "Allocate too small (10 > 8)");

        assert!(hw.allocate_main(&mut ctx, &mut org, 5));
        assert!(!hw.allocate_main(&mut ctx, &mut org, 5));
        assert_eq!(org.faults[3].message, "Allocate already active");
        assert!(org.faults.iter().all(|f| f.location == FaultLocation::Alloc));
        assert_eq!(hw.memory().len(), 15);
    }

    #[test]
    fn test_allocate_respects_creature_bounds() {
        let config = HardwareConfig {
            max_creature_size: 15,
            ..HardwareConfig::default()
        };
        let f = factory::<Cpu>(config);
        let mut hw = f.create(&genome(&f, TEN_NOPS));
        let mut ctx = Context::new(1);
        let mut org = BasicOrganism::default();
        assert!(!hw.allocate_main(&mut ctx, &mut org, 6));
        assert_eq!(org.faults[0].message, "Invalid post-allocate size (16)");
        assert!(hw.allocate_main(&mut ctx, &mut org, 5));
        assert!(hw.memory().len() <= 15);
    }

    #[test]
    fn test_random_allocation_is_seeded() {
        let config = HardwareConfig {
            alloc_method: AllocMethod::Random,
            ..HardwareConfig::default()
        };
        let f = factory::<Cpu>(config);
        let g = genome(&f, TEN_NOPS);
        let run = |seed| {
            let mut hw = f.create(&g);
            let mut ctx = Context::new(seed);
            let mut org = BasicOrganism::default();
            assert!(hw.allocate_main(&mut ctx, &mut org, 10));
            hw.memory().to_sequence()
        };
        assert_eq!(run(5), run(5));
        assert_eq!(run(5).len(), 20);
    }
}
