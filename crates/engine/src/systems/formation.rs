//! Organic relationship formation between co-located characters.
//!
//! Residents of each settlement are paired off and rolled against per-kind
//! base chances, scaled by the pair's faction relation and damped by how
//! connected they already are. Every accepted edge still passes the shared
//! commit gates, so duplicates, contradictions, cooldowns, and budgets hold
//! here exactly as they do for templates.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::Rng;

use worldloom_domain::{
    EntityId, EntityKind, FormationConfig, RelationshipKind, SimPhase,
};

use crate::error::EngineError;
use crate::graph::{NewRelationship, WorldGraph};
use crate::systems::{SimulationSystem, SystemOutcome};
use crate::templates::commit::{try_commit_relationship, RelationshipAttempt};

fn entity_kind(label: &str) -> EntityKind {
    EntityKind::new(label).unwrap_or_else(|_| unreachable!())
}

fn rel_kind(label: &str) -> RelationshipKind {
    RelationshipKind::new(label).unwrap_or_else(|_| unreachable!())
}

/// How two characters' faction memberships relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FactionRelation {
    Shared,
    Allied,
    Opposed,
    Unrelated,
}

pub struct RelationshipFormationSystem {
    config: FormationConfig,
    npc: EntityKind,
    faction: EntityKind,
    resident_of: RelationshipKind,
    member_of: RelationshipKind,
    ally_of: RelationshipKind,
    enemy_of: RelationshipKind,
    follower_of: RelationshipKind,
    rival_of: RelationshipKind,
    romance_with: RelationshipKind,
}

impl RelationshipFormationSystem {
    pub const ID: &'static str = "relationship_formation";

    pub fn new(config: FormationConfig) -> Self {
        Self {
            config,
            npc: entity_kind("npc"),
            faction: entity_kind("faction"),
            resident_of: rel_kind("resident_of"),
            member_of: rel_kind("member_of"),
            ally_of: rel_kind("ally_of"),
            enemy_of: rel_kind("enemy_of"),
            follower_of: rel_kind("follower_of"),
            rival_of: rel_kind("rival_of"),
            romance_with: rel_kind("romance_with"),
        }
    }

    /// Living characters grouped by the settlement they reside in, in
    /// deterministic order.
    fn residents_by_location(&self, graph: &WorldGraph) -> BTreeMap<EntityId, Vec<EntityId>> {
        let mut groups: BTreeMap<EntityId, Vec<EntityId>> = BTreeMap::new();
        for entity in graph.entities_by_kind(&self.npc) {
            if graph
                .vocabulary()
                .is_terminal_status(&entity.kind, &entity.status)
            {
                continue;
            }
            for location in graph.connected_entities(entity.id, Some(&self.resident_of)) {
                groups.entry(location).or_default().push(entity.id);
            }
        }
        groups
    }

    fn factions_of(&self, graph: &WorldGraph, id: EntityId) -> Vec<EntityId> {
        graph
            .connected_entities(id, Some(&self.member_of))
            .into_iter()
            .filter(|f| {
                graph
                    .entity(*f)
                    .is_some_and(|e| e.kind == self.faction)
            })
            .collect()
    }

    fn faction_relation(&self, graph: &WorldGraph, a: EntityId, b: EntityId) -> FactionRelation {
        let ours = self.factions_of(graph, a);
        let theirs = self.factions_of(graph, b);
        if ours.is_empty() || theirs.is_empty() {
            return FactionRelation::Unrelated;
        }
        if ours.iter().any(|f| theirs.contains(f)) {
            return FactionRelation::Shared;
        }
        let linked = |kind: &RelationshipKind| {
            ours.iter()
                .any(|f| theirs.iter().any(|g| graph.pair_has_kind(*f, *g, kind)))
        };
        if linked(&self.enemy_of) {
            FactionRelation::Opposed
        } else if linked(&self.ally_of) {
            FactionRelation::Allied
        } else {
            FactionRelation::Unrelated
        }
    }

    fn relation_multiplier(&self, relation: FactionRelation) -> f64 {
        match relation {
            FactionRelation::Shared => self.config.same_faction_multiplier,
            FactionRelation::Allied => self.config.allied_faction_multiplier,
            FactionRelation::Opposed => self.config.enemy_faction_multiplier,
            FactionRelation::Unrelated => 1.0,
        }
    }

    /// `1 / (1 + connections * damping)`: well-connected pairs form fewer
    /// new bonds, suppressing hub concentration.
    fn damping(&self, graph: &WorldGraph, a: EntityId, b: EntityId) -> f64 {
        let average =
            (graph.connection_count(a) + graph.connection_count(b)) as f64 / 2.0;
        1.0 / (1.0 + average * self.config.connection_damping)
    }

    /// Candidate kinds for a pair, with their base chances, in fixed order.
    /// Open conflict only forms across opposed factions.
    fn candidates(&self, relation: FactionRelation) -> Vec<(&RelationshipKind, f64)> {
        let mut kinds = vec![
            (&self.follower_of, self.config.friendship_chance),
            (&self.rival_of, self.config.rivalry_chance),
        ];
        if relation == FactionRelation::Opposed {
            kinds.push((&self.enemy_of, self.config.conflict_chance));
        }
        kinds.push((&self.romance_with, self.config.romance_chance));
        kinds
    }
}

impl SimulationSystem for RelationshipFormationSystem {
    fn id(&self) -> &str {
        Self::ID
    }

    fn apply(
        &self,
        graph: &mut WorldGraph,
        modifier: f64,
        rng: &mut StdRng,
    ) -> Result<SystemOutcome, EngineError> {
        let throttle = (self.config.system_chance * modifier).min(1.0);
        if rng.gen::<f64>() >= throttle {
            return Ok(SystemOutcome::idle("formation throttled this tick"));
        }

        let groups = self.residents_by_location(graph);
        let mut formed = 0u32;
        for (_, residents) in groups {
            for i in 0..residents.len() {
                for j in (i + 1)..residents.len() {
                    let (a, b) = (residents[i], residents[j]);
                    let relation = self.faction_relation(graph, a, b);
                    let scale = self.relation_multiplier(relation) * self.damping(graph, a, b);
                    for (kind, base) in self.candidates(relation) {
                        let chance = (base * scale * modifier).min(1.0);
                        if rng.gen::<f64>() >= chance {
                            continue;
                        }
                        let new = NewRelationship {
                            strength: Some(0.4 + rng.gen::<f64>() * 0.3),
                            ..NewRelationship::new(kind.clone(), a, b)
                        };
                        if let RelationshipAttempt::Committed(_) =
                            try_commit_relationship(graph, new, SimPhase::Simulation)
                        {
                            formed += 1;
                            // One new bond per pair per tick.
                            break;
                        }
                    }
                }
            }
        }

        Ok(SystemOutcome {
            relationships_added: formed,
            ..SystemOutcome::idle(format!("{formed} relationships formed among residents"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;

    use worldloom_domain::{PartialEntity, Subtype};

    use crate::baseline;

    fn subtype(s: &str) -> Subtype {
        Subtype::new(s).unwrap()
    }

    struct Fixture {
        graph: WorldGraph,
        colony: EntityId,
    }

    impl Fixture {
        fn new() -> Self {
            let config = baseline::baseline_config("testworld", 8, 40);
            let mut graph = baseline::empty_graph(&config).unwrap();
            let colony = graph.create_entity(PartialEntity::new(
                entity_kind("location"),
                subtype("colony"),
                "haven",
            ));
            Self { graph, colony }
        }

        fn resident(&mut self, name: &str) -> EntityId {
            let id = self.graph.create_entity(PartialEntity::new(
                entity_kind("npc"),
                subtype("hero"),
                name,
            ));
            self.graph
                .insert_relationship(NewRelationship::new(
                    rel_kind("resident_of"),
                    id,
                    self.colony,
                ))
                .unwrap();
            id
        }
    }

    fn always_friends() -> RelationshipFormationSystem {
        RelationshipFormationSystem::new(FormationConfig {
            system_chance: 1.0,
            friendship_chance: 1.0,
            rivalry_chance: 0.0,
            conflict_chance: 0.0,
            romance_chance: 0.0,
            connection_damping: 0.0,
            ..FormationConfig::default()
        })
    }

    #[test]
    fn co_located_pairs_form_bonds() {
        let mut fixture = Fixture::new();
        let a = fixture.resident("asha");
        let b = fixture.resident("brin");

        let system = always_friends();
        let outcome = system
            .apply(&mut fixture.graph, 1.0, &mut StdRng::seed_from_u64(1))
            .unwrap();

        assert_eq!(outcome.relationships_added, 1);
        assert!(fixture
            .graph
            .pair_has_kind(a, b, &rel_kind("follower_of")));
    }

    #[test]
    fn strangers_in_different_settlements_never_pair() {
        let mut fixture = Fixture::new();
        fixture.resident("asha");
        let elsewhere = fixture.graph.create_entity(PartialEntity::new(
            entity_kind("location"),
            subtype("colony"),
            "crag",
        ));
        let b = fixture.graph.create_entity(PartialEntity::new(
            entity_kind("npc"),
            subtype("hero"),
            "brin",
        ));
        fixture
            .graph
            .insert_relationship(NewRelationship::new(rel_kind("resident_of"), b, elsewhere))
            .unwrap();

        let outcome = always_friends()
            .apply(&mut fixture.graph, 1.0, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(outcome.relationships_added, 0);
    }

    #[test]
    fn an_empty_world_yields_a_quiet_outcome() {
        let config = baseline::baseline_config("testworld", 8, 40);
        let mut graph = baseline::empty_graph(&config).unwrap();

        let outcome = always_friends()
            .apply(&mut graph, 1.0, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(outcome.relationships_added, 0);
        assert_eq!(outcome.entities_modified, 0);
        assert!(outcome.pressure_changes.is_empty());
        assert!(!outcome.description.is_empty());
    }

    #[test]
    fn conflict_requires_opposed_factions() {
        let mut fixture = Fixture::new();
        let a = fixture.resident("asha");
        let b = fixture.resident("brin");

        let conflict_only = RelationshipFormationSystem::new(FormationConfig {
            system_chance: 1.0,
            friendship_chance: 0.0,
            rivalry_chance: 0.0,
            conflict_chance: 1.0,
            romance_chance: 0.0,
            connection_damping: 0.0,
            ..FormationConfig::default()
        });

        // No factions: conflict is not even a candidate.
        conflict_only
            .apply(&mut fixture.graph, 1.0, &mut StdRng::seed_from_u64(2))
            .unwrap();
        assert!(!fixture.graph.pair_has_kind(a, b, &rel_kind("enemy_of")));

        // Opposed factions: conflict forms.
        let guild = fixture.graph.create_entity(PartialEntity::new(
            entity_kind("faction"),
            subtype("guild"),
            "miners",
        ));
        let clan = fixture.graph.create_entity(PartialEntity::new(
            entity_kind("faction"),
            subtype("clan"),
            "ashfolk",
        ));
        fixture
            .graph
            .insert_relationship(NewRelationship::new(rel_kind("member_of"), a, guild))
            .unwrap();
        fixture
            .graph
            .insert_relationship(NewRelationship::new(rel_kind("member_of"), b, clan))
            .unwrap();
        fixture
            .graph
            .insert_relationship(NewRelationship::new(rel_kind("enemy_of"), guild, clan))
            .unwrap();

        conflict_only
            .apply(&mut fixture.graph, 1.0, &mut StdRng::seed_from_u64(2))
            .unwrap();
        assert!(fixture.graph.pair_has_kind(a, b, &rel_kind("enemy_of")));
    }

    #[test]
    fn repeated_runs_never_duplicate_a_bond() {
        let mut fixture = Fixture::new();
        let a = fixture.resident("asha");
        let b = fixture.resident("brin");

        let system = always_friends();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..5 {
            fixture.graph.advance_tick();
            system.apply(&mut fixture.graph, 1.0, &mut rng).unwrap();
        }

        let edges = fixture
            .graph
            .find_relationships(&crate::graph::RelationshipCriteria::of_kind(rel_kind(
                "follower_of",
            )));
        assert_eq!(edges.len(), 1);
        assert!(fixture.graph.pair_has_kind(a, b, &rel_kind("follower_of")));
        assert!(fixture.graph.validation().blocked_as_duplicate > 0);
    }

    #[test]
    fn damping_reduces_chance_for_connected_pairs() {
        let system = RelationshipFormationSystem::new(FormationConfig {
            connection_damping: 0.5,
            ..FormationConfig::default()
        });
        let mut fixture = Fixture::new();
        let a = fixture.resident("asha");
        let b = fixture.resident("brin");
        // Each already holds one edge (residency).
        let damped = system.damping(&fixture.graph, a, b);
        assert!((damped - 1.0 / 1.5).abs() < 1e-9);
    }
}
