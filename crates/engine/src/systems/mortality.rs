//! Mortality: characters age and die, with strife making everything worse.
//!
//! Death is a retirement, not a deletion: the character keeps its node and
//! history while every live edge is archived, leaving structures like
//! leaderless settlements behind for the succession template to find.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::Rng;

use worldloom_domain::{EntityId, EntityKind, StatusLabel};

use crate::error::EngineError;
use crate::graph::WorldGraph;
use crate::systems::{SimulationSystem, SystemOutcome};

pub struct MortalitySystem {
    npc: EntityKind,
    dead: StatusLabel,
    /// Chance of death at age zero.
    base_chance: f64,
    /// Additional chance per tick of age.
    age_factor: f64,
    /// Name of the pressure that amplifies mortality.
    strife_pressure: String,
}

impl MortalitySystem {
    pub const ID: &'static str = "mortality";

    pub fn new() -> Self {
        Self {
            npc: EntityKind::new("npc").unwrap_or_else(|_| unreachable!()),
            dead: StatusLabel::new("dead").unwrap_or_else(|_| unreachable!()),
            base_chance: 0.004,
            age_factor: 0.0008,
            strife_pressure: "strife".into(),
        }
    }

    fn death_chance(&self, age: u64, strife: f64, modifier: f64) -> f64 {
        let base = self.base_chance + age as f64 * self.age_factor;
        // Strife at 100 doubles the rate.
        (base * (1.0 + strife / 100.0) * modifier).min(1.0)
    }
}

impl Default for MortalitySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationSystem for MortalitySystem {
    fn id(&self) -> &str {
        Self::ID
    }

    fn apply(
        &self,
        graph: &mut WorldGraph,
        modifier: f64,
        rng: &mut StdRng,
    ) -> Result<SystemOutcome, EngineError> {
        let now = graph.tick();
        let strife = graph.pressures().get(&self.strife_pressure);

        let mut deaths: Vec<EntityId> = Vec::new();
        for entity in graph.entities_by_kind(&self.npc) {
            if graph
                .vocabulary()
                .is_terminal_status(&entity.kind, &entity.status)
            {
                continue;
            }
            let age = now.saturating_sub(entity.created_at);
            if rng.gen::<f64>() < self.death_chance(age, strife, modifier) {
                deaths.push(entity.id);
            }
        }

        for id in &deaths {
            graph.retire_entity(*id, self.dead.clone());
        }
        let died = deaths.len() as u32;
        let mut pressure_changes = BTreeMap::new();
        if died > 0 {
            // Each death unsettles the world a little.
            pressure_changes.insert(self.strife_pressure.clone(), died as f64 * 0.5);
        }
        Ok(SystemOutcome {
            relationships_added: 0,
            entities_modified: died,
            pressure_changes,
            description: format!("{died} characters died"),
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

    #[test]
    fn death_chance_grows_with_age_and_strife() {
        let system = MortalitySystem::new();
        let young = system.death_chance(0, 0.0, 1.0);
        let old = system.death_chance(100, 0.0, 1.0);
        let old_in_wartime = system.death_chance(100, 100.0, 1.0);
        assert!(young < old);
        assert!((old_in_wartime - old * 2.0).abs() < 1e-9);
    }

    #[test]
    fn death_retires_and_archives_connections() {
        let config = baseline::baseline_config("testworld", 2, 40);
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

        let certain_death = MortalitySystem {
            base_chance: 1.0,
            ..MortalitySystem::new()
        };
        let outcome = certain_death
            .apply(&mut graph, 1.0, &mut StdRng::seed_from_u64(1))
            .unwrap();

        assert_eq!(outcome.entities_modified, 2);
        assert_eq!(outcome.pressure_changes.get("strife"), Some(&1.0));
        assert!(graph.entity(a).unwrap().has_status("dead"));
        assert_eq!(graph.relationship_count(), 0);
        // Nodes survive their deaths.
        assert_eq!(graph.entity_total(), 2);
    }

    #[test]
    fn the_dead_stay_dead() {
        let config = baseline::baseline_config("testworld", 2, 40);
        let mut graph = baseline::empty_graph(&config).unwrap();
        let npc = EntityKind::new("npc").unwrap();
        let a = graph.create_entity(PartialEntity::new(
            npc,
            Subtype::new("hero").unwrap(),
            "asha",
        ));
        graph.retire_entity(a, StatusLabel::new("dead").unwrap());

        let certain_death = MortalitySystem {
            base_chance: 1.0,
            ..MortalitySystem::new()
        };
        let outcome = certain_death
            .apply(&mut graph, 1.0, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(outcome.entities_modified, 0);
        assert!(outcome.pressure_changes.is_empty());
    }
}
