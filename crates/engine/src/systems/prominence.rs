//! Prominence drift: social gravity pulls the connected up and the isolated
//! down, one step at a time.

use rand::rngs::StdRng;
use rand::Rng;

use worldloom_domain::{EntityId, EntityKind, EntityPatch, Prominence};

use crate::error::EngineError;
use crate::graph::WorldGraph;
use crate::systems::{SimulationSystem, SystemOutcome};

pub struct ProminenceDriftSystem {
    npc: EntityKind,
    /// Per-tick chance for a well-connected character to rise.
    rise_chance: f64,
    /// Per-tick chance for an isolated character to fade.
    fade_chance: f64,
    /// Live connections at or above this count qualify as well-connected.
    hub_degree: usize,
}

impl ProminenceDriftSystem {
    pub const ID: &'static str = "prominence_drift";

    pub fn new() -> Self {
        Self {
            npc: EntityKind::new("npc").unwrap_or_else(|_| unreachable!()),
            rise_chance: 0.08,
            fade_chance: 0.05,
            hub_degree: 3,
        }
    }
}

impl Default for ProminenceDriftSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationSystem for ProminenceDriftSystem {
    fn id(&self) -> &str {
        Self::ID
    }

    fn apply(
        &self,
        graph: &mut WorldGraph,
        modifier: f64,
        rng: &mut StdRng,
    ) -> Result<SystemOutcome, EngineError> {
        // Decide first, mutate second, so drift within a tick reads a
        // consistent snapshot.
        let mut moves: Vec<(EntityId, Prominence)> = Vec::new();
        for entity in graph.entities_by_kind(&self.npc) {
            if graph
                .vocabulary()
                .is_terminal_status(&entity.kind, &entity.status)
            {
                continue;
            }
            let degree = graph.connection_count(entity.id);
            if degree >= self.hub_degree {
                if rng.gen::<f64>() < (self.rise_chance * modifier).min(1.0)
                    && entity.prominence != Prominence::Mythic
                {
                    moves.push((entity.id, entity.prominence.raised()));
                }
            } else if degree == 0
                && rng.gen::<f64>() < (self.fade_chance * modifier).min(1.0)
                && entity.prominence != Prominence::Forgotten
            {
                moves.push((entity.id, entity.prominence.lowered()));
            }
        }

        let moved = moves.len() as u32;
        for (id, prominence) in moves {
            graph.update_entity(id, EntityPatch::prominence(prominence));
        }

        Ok(SystemOutcome {
            entities_modified: moved,
            ..SystemOutcome::idle(format!("prominence drifted for {moved} characters"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;

    use worldloom_domain::{PartialEntity, RelationshipKind, Subtype};

    use crate::baseline;
    use crate::graph::NewRelationship;

    fn forced() -> ProminenceDriftSystem {
        ProminenceDriftSystem {
            rise_chance: 1.0,
            fade_chance: 1.0,
            ..ProminenceDriftSystem::new()
        }
    }

    #[test]
    fn hubs_rise_and_isolates_fade_one_step() {
        let config = baseline::baseline_config("testworld", 6, 40);
        let mut graph = baseline::empty_graph(&config).unwrap();
        let npc = EntityKind::new("npc").unwrap();
        let hero = Subtype::new("hero").unwrap();

        let hub = graph.create_entity(PartialEntity::new(npc.clone(), hero.clone(), "asha"));
        let loner = graph.create_entity(PartialEntity::new(npc.clone(), hero.clone(), "brin"));
        for name in ["cora", "dane", "edda"] {
            let other = graph.create_entity(PartialEntity::new(npc.clone(), hero.clone(), name));
            graph
                .insert_relationship(NewRelationship::new(
                    RelationshipKind::new("follower_of").unwrap(),
                    other,
                    hub,
                ))
                .unwrap();
        }

        forced()
            .apply(&mut graph, 1.0, &mut StdRng::seed_from_u64(1))
            .unwrap();

        assert_eq!(graph.entity(hub).unwrap().prominence, Prominence::Recognized);
        assert_eq!(graph.entity(loner).unwrap().prominence, Prominence::Forgotten);
    }

    #[test]
    fn moderately_connected_characters_hold_steady() {
        let config = baseline::baseline_config("testworld", 6, 40);
        let mut graph = baseline::empty_graph(&config).unwrap();
        let npc = EntityKind::new("npc").unwrap();
        let hero = Subtype::new("hero").unwrap();
        let a = graph.create_entity(PartialEntity::new(npc.clone(), hero.clone(), "asha"));
        let b = graph.create_entity(PartialEntity::new(npc, hero, "brin"));
        graph
            .insert_relationship(NewRelationship::new(
                RelationshipKind::new("follower_of").unwrap(),
                a,
                b,
            ))
            .unwrap();

        let outcome = forced()
            .apply(&mut graph, 1.0, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(outcome.entities_modified, 0);
        assert_eq!(graph.entity(a).unwrap().prominence, Prominence::Marginal);
    }
}
