//! End-to-end behavioral scenarios over seeded worlds.

use std::sync::Arc;

use worldloom_domain::{
    DistributionTargets, EntityKind, PartialEntity, StatusLabel, Subtype, TargetSpec,
};
use worldloom_engine::baseline;
use worldloom_engine::control::SaturationMonitor;
use worldloom_engine::graph::NewRelationship;
use worldloom_engine::templates::CustomRegistry;
use worldloom_engine::{NullEnrichment, SyllableNameGenerator, WorldEngine};

fn engine(seed: u64, ticks: u64) -> WorldEngine {
    let config = baseline::baseline_config("scenario", seed, ticks);
    let (templates, systems) = baseline::registries(&config);
    WorldEngine::new(
        config,
        &templates,
        &systems,
        Arc::new(CustomRegistry::new()),
        Arc::new(SyllableNameGenerator::new(seed)),
        Arc::new(NullEnrichment),
    )
    .unwrap()
}

fn npc() -> EntityKind {
    EntityKind::new("npc").unwrap()
}

#[tokio::test]
async fn a_dead_leaders_seat_is_eventually_refilled() {
    let mut engine = engine(31, 60);

    let graph = engine.graph_mut();
    let colony = graph.create_entity(PartialEntity::new(
        EntityKind::new("location").unwrap(),
        Subtype::new("colony").unwrap(),
        "first-landing",
    ));
    let mayor = graph.create_entity(PartialEntity::new(
        npc(),
        Subtype::new("mayor").unwrap(),
        "old-garrin",
    ));
    graph
        .insert_relationship(NewRelationship::new(
            worldloom_domain::RelationshipKind::new("leader_of").unwrap(),
            mayor,
            colony,
        ))
        .unwrap();
    graph.retire_entity(mayor, StatusLabel::new("dead").unwrap());

    let report = engine.run().await.unwrap();

    let mut successions: Vec<_> = report
        .export
        .relationships
        .iter()
        .filter(|r| r.kind.as_str() == "leader_of" && r.dst == colony && r.src != mayor)
        .collect();
    successions.sort_by_key(|r| r.created_at);
    let first = successions
        .first()
        .expect("the colony never got a new leader");
    // The first successor is installed in the predecessor's wake.
    assert_eq!(first.catalyzed_by, Some(mayor));
    let successor = report
        .export
        .hard_state
        .iter()
        .find(|e| e.id == first.src)
        .unwrap();
    assert_eq!(successor.subtype.as_str(), "mayor");
}

#[tokio::test]
async fn discoveries_are_paced_by_the_spacing_rules() {
    let config = baseline::baseline_config("scenario", 77, 40);
    let spacing = config.discovery.unwrap();
    let epoch_length = config.epoch_length;

    let report = engine(77, 40).run().await.unwrap();
    let mut ticks: Vec<u64> = report
        .export
        .relationships
        .iter()
        .filter(|r| r.kind.as_str() == "discovered_by")
        .map(|r| r.created_at)
        .collect();
    ticks.sort_unstable();

    for window in ticks.windows(2) {
        assert!(
            window[1] - window[0] >= spacing.min_ticks_between,
            "discoveries at ticks {} and {} are too close",
            window[0],
            window[1]
        );
    }
    let mut per_epoch = std::collections::BTreeMap::new();
    for tick in &ticks {
        *per_epoch.entry((tick - 1) / epoch_length).or_insert(0u32) += 1;
    }
    for (epoch, count) in per_epoch {
        assert!(
            count <= spacing.max_per_epoch,
            "epoch {epoch} saw {count} discoveries"
        );
    }
}

#[tokio::test]
async fn the_founding_era_gives_way_on_schedule() {
    // Era transitions are evaluated at epoch boundaries only.
    let report = engine(5, 30).run().await.unwrap();
    assert_eq!(report.export.metadata.current_era, "age-of-strife");

    let transition = report
        .export
        .history
        .iter()
        .find(|h| h.era_transition.is_some())
        .expect("no era transition recorded");
    assert_eq!(transition.era_transition.as_deref(), Some("age-of-strife"));
    assert_eq!(transition.tick % 10, 0);
}

#[tokio::test]
async fn saturated_populations_stop_growing() {
    let mut engine = engine(13, 20);
    let location = EntityKind::new("location").unwrap();
    let colony = Subtype::new("colony").unwrap();
    // Baseline targets 5 colonies with a 1.5x overshoot cap; 8 is past it.
    for i in 0..8 {
        engine.graph_mut().create_entity(PartialEntity::new(
            location.clone(),
            colony.clone(),
            format!("colony-{i}"),
        ));
    }

    let report = engine.run().await.unwrap();
    let colonies = report
        .export
        .hard_state
        .iter()
        .filter(|e| e.subtype.as_str() == "colony")
        .count();
    assert_eq!(colonies, 8, "founding fired past the saturation cap");
}

#[test]
fn overfull_populations_get_a_dampened_feedback_multiplier() {
    let config = baseline::baseline_config("scenario", 3, 20);
    let mut graph = baseline::empty_graph(&config).unwrap();
    let hero = Subtype::new("hero").unwrap();
    for i in 0..15 {
        graph.create_entity(PartialEntity::new(npc(), hero.clone(), format!("h{i}")));
    }

    let targets = DistributionTargets {
        overshoot_factor: 1.5,
        targets: [(
            npc(),
            [(
                hero.clone(),
                TargetSpec {
                    target: 10,
                    tolerance: 0.2,
                },
            )]
            .into(),
        )]
        .into(),
    };
    let mut saturation = SaturationMonitor::new(targets, 1.0);

    assert!((saturation.saturation_ratio(&graph, &npc(), &hero) - 1.5).abs() < 1e-9);
    assert!(saturation.is_saturated(&graph, &npc(), &hero));

    saturation.recompute_feedback(&graph);
    let multiplier = saturation.multiplier(&npc(), &hero);
    assert!((multiplier - 10.0 / 15.0).abs() < 1e-9);
}
