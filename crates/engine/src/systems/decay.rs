//! Gradual weakening of social bonds, with culling of dead ones.
//!
//! Only social-category edges decay; structural edges (residency,
//! membership, leadership) persist until archived by templates or
//! retirement. A culled pair is blocked from re-forming the same kind for
//! the kind's cooldown window.

use rand::rngs::StdRng;

use worldloom_domain::RelationshipId;

use crate::error::EngineError;
use crate::graph::WorldGraph;
use crate::systems::{SimulationSystem, SystemOutcome};

pub struct RelationshipDecaySystem {
    /// Strength lost per tick at modifier 1.0.
    decay_rate: f64,
    /// Below this, the edge is archived.
    cull_threshold: f64,
}

impl RelationshipDecaySystem {
    pub const ID: &'static str = "relationship_decay";

    pub fn new() -> Self {
        Self {
            decay_rate: 0.02,
            cull_threshold: 0.1,
        }
    }
}

impl Default for RelationshipDecaySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationSystem for RelationshipDecaySystem {
    fn id(&self) -> &str {
        Self::ID
    }

    fn apply(
        &self,
        graph: &mut WorldGraph,
        modifier: f64,
        _rng: &mut StdRng,
    ) -> Result<SystemOutcome, EngineError> {
        let social: Vec<RelationshipId> = graph
            .relationships()
            .filter(|r| r.is_active() && r.category.as_deref() == Some("social"))
            .map(|r| r.id)
            .collect();

        let delta = -(self.decay_rate * modifier);
        let mut culled = 0u32;
        for id in social {
            let Some(strength) = graph.adjust_strength(id, delta) else {
                continue;
            };
            if strength >= self.cull_threshold {
                continue;
            }
            let Some(rel) = graph.relationship(id) else {
                continue;
            };
            let (a, b, kind) = (rel.src, rel.dst, rel.kind.clone());
            let until = graph.tick() + graph.vocabulary().cooldown_ticks(&kind);
            graph.archive_relationship(id);
            graph.cooldowns_mut().block_pair(a, b, &kind, until);
            culled += 1;
        }

        Ok(SystemOutcome::idle(format!(
            "social bonds decayed, {culled} culled"
        )))
    }
}
