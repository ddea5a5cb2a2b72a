//! The baseline colony-world domain: a complete, runnable configuration
//! wired to the built-in templates and systems.
//!
//! This is both the default domain for the runner and the fixture the test
//! suites build worlds from. Everything here is plain configuration data;
//! nothing in the engine is specific to it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use worldloom_domain::{
    BudgetConfig, ConfigError, CreationRule, DeclarativeTemplateSpec, DiscoveryConfig,
    DistributionTargets, EndpointRef, EntityFilter, EntityKind, EntityKindDef, Era, EraTransition,
    GrowthConfig, NameSource, PickStrategy, Predicate, PressureDef, PressureGate, ProducesSpec,
    RelationshipKind, RelationshipKindDef, RelationshipRule, SelectionSpec, StatusLabel, Subtype,
    TargetSpec, WorldConfig,
};

use crate::engine::{SystemRegistry, TemplateRegistry};
use crate::graph::WorldGraph;
use crate::systems::{
    MortalitySystem, ProminenceDriftSystem, RelationshipDecaySystem, RelationshipFormationSystem,
};
use crate::templates::builtin::{
    EmergentDiscoveryTemplate, FactionEmergenceTemplate, SettlementFoundingTemplate,
    SuccessionTemplate,
};

fn kind(label: &str) -> EntityKind {
    EntityKind::new(label).unwrap_or_else(|_| unreachable!())
}

fn subtype(label: &str) -> Subtype {
    Subtype::new(label).unwrap_or_else(|_| unreachable!())
}

fn rel(label: &str) -> RelationshipKind {
    RelationshipKind::new(label).unwrap_or_else(|_| unreachable!())
}

fn status(label: &str) -> StatusLabel {
    StatusLabel::new(label).unwrap_or_else(|_| unreachable!())
}

fn entity_kinds() -> Vec<EntityKindDef> {
    vec![
        EntityKindDef {
            kind: kind("npc"),
            subtypes: vec![
                subtype("hero"),
                subtype("mayor"),
                subtype("elder"),
                subtype("wanderer"),
            ],
            terminal_statuses: vec![status("dead")],
        },
        EntityKindDef {
            kind: kind("faction"),
            subtypes: vec![subtype("guild"), subtype("clan")],
            terminal_statuses: vec![status("dissolved")],
        },
        EntityKindDef {
            kind: kind("location"),
            subtypes: vec![subtype("colony"), subtype("ruin")],
            terminal_statuses: vec![status("abandoned")],
        },
        EntityKindDef {
            kind: kind("abilities"),
            subtypes: vec![subtype("technique")],
            terminal_statuses: vec![],
        },
    ]
}

fn relationship_kinds() -> Vec<RelationshipKindDef> {
    let social = Some("social".to_string());
    let political = Some("political".to_string());
    let spatial = Some("spatial".to_string());
    vec![
        RelationshipKindDef {
            kind: rel("follower_of"),
            src_kinds: vec![kind("npc")],
            dst_kinds: vec![kind("npc")],
            bidirectional: false,
            category: social.clone(),
            cooldown_ticks: 5,
            incompatible_with: vec![rel("enemy_of"), rel("rival_of")],
        },
        RelationshipKindDef {
            kind: rel("rival_of"),
            src_kinds: vec![kind("npc")],
            dst_kinds: vec![kind("npc")],
            bidirectional: true,
            category: social.clone(),
            cooldown_ticks: 5,
            incompatible_with: vec![],
        },
        RelationshipKindDef {
            kind: rel("enemy_of"),
            src_kinds: vec![kind("npc"), kind("faction")],
            dst_kinds: vec![kind("npc"), kind("faction")],
            bidirectional: true,
            category: social.clone(),
            cooldown_ticks: 6,
            incompatible_with: vec![],
        },
        RelationshipKindDef {
            kind: rel("romance_with"),
            src_kinds: vec![kind("npc")],
            dst_kinds: vec![kind("npc")],
            bidirectional: true,
            category: social,
            cooldown_ticks: 8,
            incompatible_with: vec![rel("enemy_of")],
        },
        RelationshipKindDef {
            kind: rel("ally_of"),
            src_kinds: vec![kind("faction")],
            dst_kinds: vec![kind("faction")],
            bidirectional: true,
            category: political.clone(),
            cooldown_ticks: 10,
            incompatible_with: vec![rel("enemy_of")],
        },
        RelationshipKindDef {
            kind: rel("member_of"),
            src_kinds: vec![kind("npc")],
            dst_kinds: vec![kind("faction")],
            bidirectional: false,
            category: political.clone(),
            cooldown_ticks: 4,
            incompatible_with: vec![],
        },
        RelationshipKindDef {
            kind: rel("leader_of"),
            src_kinds: vec![kind("npc")],
            dst_kinds: vec![kind("location"), kind("faction")],
            bidirectional: false,
            category: political,
            cooldown_ticks: 0,
            incompatible_with: vec![],
        },
        RelationshipKindDef {
            kind: rel("resident_of"),
            src_kinds: vec![kind("npc")],
            dst_kinds: vec![kind("location")],
            bidirectional: false,
            category: spatial,
            cooldown_ticks: 0,
            incompatible_with: vec![],
        },
        RelationshipKindDef {
            kind: rel("discovered_by"),
            src_kinds: vec![kind("abilities")],
            dst_kinds: vec![kind("npc")],
            bidirectional: false,
            category: Some("lore".to_string()),
            cooldown_ticks: 0,
            incompatible_with: vec![],
        },
    ]
}

fn eras(max_ticks: u64) -> Vec<Era> {
    let founding_ends = (max_ticks / 2).max(1);
    vec![
        Era {
            name: "age-of-founding".into(),
            ordinal: 0,
            intensity: 1.0,
            template_weights: [
                ("settlement_founding".to_string(), 2.0),
                ("faction_emergence".to_string(), 0.5),
            ]
            .into(),
            disabled_templates: BTreeSet::new(),
            enabled_systems: None,
            transitions: vec![
                EraTransition::TickReached {
                    tick: founding_ends,
                },
                EraTransition::PressureAbove {
                    pressure: "strife".into(),
                    value: 70.0,
                },
            ],
        },
        Era {
            name: "age-of-strife".into(),
            ordinal: 1,
            intensity: 1.3,
            template_weights: [
                ("settlement_founding".to_string(), 0.5),
                ("succession".to_string(), 1.5),
                ("faction_emergence".to_string(), 1.5),
            ]
            .into(),
            disabled_templates: BTreeSet::new(),
            enabled_systems: None,
            transitions: vec![],
        },
    ]
}

fn distribution_targets() -> DistributionTargets {
    let spec = |target| TargetSpec {
        target,
        tolerance: 0.2,
    };
    let mut targets: BTreeMap<EntityKind, BTreeMap<Subtype, TargetSpec>> = BTreeMap::new();
    targets.insert(
        kind("npc"),
        [(subtype("hero"), spec(8)), (subtype("mayor"), spec(4))].into(),
    );
    targets.insert(kind("location"), [(subtype("colony"), spec(5))].into());
    targets.insert(kind("faction"), [(subtype("guild"), spec(3))].into());
    targets.insert(kind("abilities"), [(subtype("technique"), spec(4))].into());
    DistributionTargets {
        overshoot_factor: 1.5,
        targets,
    }
}

fn wanderer_arrival() -> DeclarativeTemplateSpec {
    DeclarativeTemplateSpec {
        id: "wanderer_arrival".into(),
        produces: Some(ProducesSpec {
            kind: kind("npc"),
            subtype: subtype("wanderer"),
        }),
        applicability: Predicate::All {
            predicates: vec![
                Predicate::Pressure {
                    gate: PressureGate::new("wanderlust", 15.0, 90.0, 0.2),
                },
                Predicate::MinEntities {
                    kind: kind("location"),
                    subtype: Some(subtype("colony")),
                    count: 1,
                },
                Predicate::NotSaturated {
                    kind: kind("npc"),
                    subtype: subtype("wanderer"),
                },
            ],
        },
        selection: Some(SelectionSpec {
            filter: EntityFilter {
                kind: Some(kind("location")),
                subtype: Some(subtype("colony")),
                ..EntityFilter::default()
            },
            strategy: PickStrategy::LeastConnected,
        }),
        require_target: true,
        creations: vec![CreationRule {
            kind: kind("npc"),
            subtype: subtype("wanderer"),
            status: None,
            culture: None,
            name: NameSource::Generated,
            tags: vec!["newcomer".into()],
        }],
        relationships: vec![RelationshipRule {
            kind: rel("resident_of"),
            src: EndpointRef::New { index: 0 },
            dst: EndpointRef::Target,
            strength: None,
            condition: None,
        }],
        description: "a wanderer arrives and settles in".into(),
        pressure_deltas: [("wanderlust".to_string(), -5.0)].into(),
    }
}

/// The complete baseline configuration.
pub fn baseline_config(name: &str, seed: u64, max_ticks: u64) -> WorldConfig {
    WorldConfig {
        name: name.into(),
        seed,
        max_ticks,
        epoch_length: 10,
        scale_factor: 1.0,
        entity_kinds: entity_kinds(),
        relationship_kinds: relationship_kinds(),
        pressures: vec![
            PressureDef {
                name: "strife".into(),
                initial: 20.0,
            },
            PressureDef {
                name: "prosperity".into(),
                initial: 30.0,
            },
            PressureDef {
                name: "wanderlust".into(),
                initial: 25.0,
            },
        ],
        eras: eras(max_ticks),
        distribution_targets: distribution_targets(),
        budgets: BudgetConfig::default(),
        growth: GrowthConfig::default(),
        discovery: Some(DiscoveryConfig {
            min_ticks_between: 8,
            max_per_epoch: 2,
        }),
        systems: vec![
            MortalitySystem::ID.into(),
            RelationshipFormationSystem::ID.into(),
            RelationshipDecaySystem::ID.into(),
            ProminenceDriftSystem::ID.into(),
        ],
        templates: vec![
            SettlementFoundingTemplate::ID.into(),
            SuccessionTemplate::ID.into(),
            FactionEmergenceTemplate::ID.into(),
            EmergentDiscoveryTemplate::ID.into(),
        ],
        declarative_templates: vec![wanderer_arrival()],
    }
}

/// The built-in template and system registries, tuned from the
/// configuration.
pub fn registries(config: &WorldConfig) -> (TemplateRegistry, SystemRegistry) {
    let mut templates = TemplateRegistry::new();
    templates.register(Arc::new(SettlementFoundingTemplate::new()));
    templates.register(Arc::new(SuccessionTemplate::new()));
    templates.register(Arc::new(FactionEmergenceTemplate::new()));
    templates.register(Arc::new(EmergentDiscoveryTemplate::new()));

    let mut systems = SystemRegistry::new();
    systems.register(Arc::new(MortalitySystem::new()));
    systems.register(Arc::new(RelationshipFormationSystem::new(
        config.growth.formation.clone(),
    )));
    systems.register(Arc::new(RelationshipDecaySystem::new()));
    systems.register(Arc::new(ProminenceDriftSystem::new()));
    (templates, systems)
}

/// An empty graph carrying the configuration's vocabulary, pressures, and
/// scaled budgets. Test fixtures build on this.
pub fn empty_graph(config: &WorldConfig) -> Result<WorldGraph, ConfigError> {
    let vocabulary = Arc::new(config.vocabulary()?);
    let first_era = config
        .era_schedule()
        .first()
        .map(|e| e.name.clone())
        .ok_or_else(|| ConfigError::missing("eras"))?;
    Ok(WorldGraph::new(
        config.seed,
        vocabulary,
        first_era,
        config.initial_pressures(),
        config.budgets.scaled(config.scale_factor),
    ))
}
