//! Simulation systems: the emergent-behavior half of the engine.
//!
//! A system scans the whole graph and mutates it in place, with no target
//! selection step. Systems run every simulation phase in configured order;
//! the era intensity arrives as a probability modifier.

pub mod decay;
pub mod formation;
pub mod mortality;
pub mod prominence;

pub use decay::RelationshipDecaySystem;
pub use formation::RelationshipFormationSystem;
pub use mortality::MortalitySystem;
pub use prominence::ProminenceDriftSystem;

use std::collections::BTreeMap;

use rand::rngs::StdRng;

use crate::error::EngineError;
use crate::graph::WorldGraph;

/// What a system run changed. The description is always present, even for
/// idle runs, so history records stay self-explanatory. Pressure deltas are
/// reported here rather than written directly; the engine applies them after
/// the system returns.
#[derive(Debug, Clone)]
pub struct SystemOutcome {
    pub relationships_added: u32,
    pub entities_modified: u32,
    pub pressure_changes: BTreeMap<String, f64>,
    pub description: String,
}

impl SystemOutcome {
    pub fn idle(description: impl Into<String>) -> Self {
        Self {
            relationships_added: 0,
            entities_modified: 0,
            pressure_changes: BTreeMap::new(),
            description: description.into(),
        }
    }
}

/// An emergent-behavior rule applied across the whole graph each tick.
pub trait SimulationSystem: Send + Sync {
    fn id(&self) -> &str;

    /// Run once over the graph. `modifier` is the current era's intensity,
    /// applied to the system's stochastic rates.
    fn apply(
        &self,
        graph: &mut WorldGraph,
        modifier: f64,
        rng: &mut StdRng,
    ) -> Result<SystemOutcome, EngineError>;
}
