//! Virtual CPU for self-replicating digital organisms
//!
//! Each organism runs its genome as machine code on a private `Hardware`
//! engine: heads instead of addresses, nop labels for jumps and searches,
//! cooperative threads, cost-gated execution, and an allocate/copy/divide
//! cycle that mutates the offspring on the way out. Three instruction set
//! variants share the engine:
//!
//! - [`Cpu`]: the classic single-memory CPU with the full instruction library
//! - [`Experimental`]: four registers, `goto`/`label` markers, transposons
//! - [`Smt`]: stack registers, labelled memory spaces, parasite injection
//!
//! ```no_run
//! use organism_cpu::{BasicOrganism, Context, Cpu, HardwareConfig, HardwareFactory};
//!
//! let factory = HardwareFactory::<Cpu>::new(HardwareConfig::default()).unwrap();
//! let genome = factory.parse_genome(organism_cpu::hardware::cpu::ANCESTOR).unwrap();
//! let mut hw = factory.create(&genome);
//! let mut ctx = Context::new(42);
//! let mut org = BasicOrganism::default();
//! while org.offspring.is_empty() {
//!     hw.single_process(&mut ctx, &mut org);
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod fault;
pub mod hardware;
pub mod head;
pub mod inst;
pub mod inst_lib;
pub mod label;
pub mod memory;
pub mod mutation;
pub mod organism;
pub mod stack;
pub mod test_cpu;
pub mod thread;

pub use config::{DivideMethod, HardwareConfig, ThreadSlicing};
pub use context::Context;
pub use error::{ConfigError, InstSetError};
pub use fault::{Fault, FaultLocation};
pub use hardware::cpu::Cpu;
pub use hardware::experimental::Experimental;
pub use hardware::smt::Smt;
pub use hardware::{Hardware, HardwareFactory, Variant, VariantKind};
pub use head::{Head, HeadId};
pub use inst::{InstFlags, Instruction};
pub use inst_lib::{InstLib, InstSet};
pub use label::CodeLabel;
pub use memory::GenomeBuffer;
pub use mutation::{MutationRates, MutationRule};
pub use organism::{BasicOrganism, Offspring, Organism, Phenotype};
pub use test_cpu::{TestCpu, TestInfo};
