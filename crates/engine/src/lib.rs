//! WorldLoom simulation engine.
//!
//! The world-generation core: a typed entity-relationship graph mutated over
//! discrete ticks by growth templates and simulation systems, kept
//! statistically stable by pressures, eras, budgets, cooldowns, and
//! distribution-target feedback. One `WorldEngine` owns one run; independent
//! runs are independent engine instances.

pub mod baseline;
pub mod control;
pub mod engine;
pub mod error;
pub mod graph;
pub mod ports;
pub mod stats;
pub mod systems;
pub mod templates;

pub use engine::{AbortHandle, RunReport, SystemRegistry, TemplateRegistry, WorldEngine};
pub use error::EngineError;
pub use graph::{RelationshipCriteria, WorldGraph};
pub use ports::{
    EnrichError, EnrichmentPatch, EnrichmentPort, NameGenError, NameGeneratorPort, NameRequest,
    NullEnrichment, SyllableNameGenerator,
};
pub use templates::{
    CustomRegistry, Expansion, GrowthTemplate, TemplateContext, TemplateOutcome,
};
