//! Structural invariants over a full baseline run: whatever the templates
//! and systems did, the exported graph must be internally consistent.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use worldloom_domain::{EntityId, SimPhase};
use worldloom_engine::baseline;
use worldloom_engine::templates::CustomRegistry;
use worldloom_engine::{NullEnrichment, RunReport, SyllableNameGenerator, WorldEngine};

const SEED: u64 = 90210;
const TICKS: u64 = 50;

async fn run() -> RunReport {
    let config = baseline::baseline_config("invariants", SEED, TICKS);
    let (templates, systems) = baseline::registries(&config);
    let engine = WorldEngine::new(
        config,
        &templates,
        &systems,
        Arc::new(CustomRegistry::new()),
        Arc::new(SyllableNameGenerator::new(SEED)),
        Arc::new(NullEnrichment),
    )
    .unwrap();
    engine.run().await.unwrap()
}

fn pair(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[tokio::test]
async fn every_edge_endpoint_exists() {
    let report = run().await;
    let ids: BTreeSet<EntityId> = report.export.hard_state.iter().map(|e| e.id).collect();
    for rel in &report.export.relationships {
        assert!(ids.contains(&rel.src), "{} src missing", rel.kind);
        assert!(ids.contains(&rel.dst), "{} dst missing", rel.kind);
    }
    assert_eq!(report.statistics.fitness_metrics.constraint_violations, 0);
}

#[tokio::test]
async fn no_pair_carries_a_duplicate_or_incompatible_live_edge() {
    let config = baseline::baseline_config("invariants", SEED, TICKS);
    let mut incompatible: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for def in &config.relationship_kinds {
        for other in &def.incompatible_with {
            incompatible
                .entry(def.kind.as_str())
                .or_default()
                .insert(other.as_str());
        }
    }

    let report = run().await;
    let mut live: BTreeMap<(EntityId, EntityId), BTreeSet<String>> = BTreeMap::new();
    for rel in report.export.relationships.iter().filter(|r| r.is_active()) {
        let kinds = live.entry(pair(rel.src, rel.dst)).or_default();
        assert!(
            kinds.insert(rel.kind.to_string()),
            "duplicate live {} edge between one pair",
            rel.kind
        );
    }
    for kinds in live.values() {
        for kind in kinds {
            if let Some(blocked) = incompatible.get(kind.as_str()) {
                for other in blocked {
                    assert!(
                        !kinds.contains(*other),
                        "{kind} coexists with incompatible {other}"
                    );
                }
            }
        }
    }
}

#[tokio::test]
async fn edges_respect_the_vocabulary_endpoint_rules() {
    let config = baseline::baseline_config("invariants", SEED, TICKS);
    let report = run().await;
    let kinds: BTreeMap<EntityId, &str> = report
        .export
        .hard_state
        .iter()
        .map(|e| (e.id, e.kind.as_str()))
        .collect();
    for rel in &report.export.relationships {
        let def = config
            .relationship_kinds
            .iter()
            .find(|d| d.kind == rel.kind)
            .unwrap_or_else(|| panic!("unregistered kind {}", rel.kind));
        let src_ok = def.src_kinds.iter().any(|k| Some(k.as_str()) == kinds.get(&rel.src).copied());
        let dst_ok = def.dst_kinds.iter().any(|k| Some(k.as_str()) == kinds.get(&rel.dst).copied());
        assert!(src_ok, "{} src kind out of vocabulary", rel.kind);
        assert!(dst_ok, "{} dst kind out of vocabulary", rel.kind);
    }
}

#[tokio::test]
async fn the_dead_hold_no_live_edges() {
    let report = run().await;
    let dead: BTreeSet<EntityId> = report
        .export
        .hard_state
        .iter()
        .filter(|e| e.status.as_str() == "dead")
        .map(|e| e.id)
        .collect();
    for rel in report.export.relationships.iter().filter(|r| r.is_active()) {
        assert!(!dead.contains(&rel.src), "dead src on live {}", rel.kind);
        assert!(!dead.contains(&rel.dst), "dead dst on live {}", rel.kind);
    }
}

#[tokio::test]
async fn leadership_is_exclusive() {
    let report = run().await;
    let mut led: BTreeSet<EntityId> = BTreeSet::new();
    for rel in report
        .export
        .relationships
        .iter()
        .filter(|r| r.is_active() && r.kind.as_str() == "leader_of")
    {
        assert!(led.insert(rel.dst), "two live leaders for one entity");
    }
}

#[tokio::test]
async fn pressures_stay_in_range() {
    let report = run().await;
    assert!(!report.export.pressures.is_empty());
    for (name, value) in &report.export.pressures {
        assert!(
            (0.0..=100.0).contains(value),
            "pressure {name} out of range: {value}"
        );
    }
}

#[tokio::test]
async fn history_is_ordered_and_bracketed() {
    let report = run().await;
    let history = &report.export.history;
    assert_eq!(history.first().map(|h| h.phase), Some(SimPhase::Init));
    assert_eq!(history.last().map(|h| h.phase), Some(SimPhase::Finalize));
    for window in history.windows(2) {
        assert!(window[0].tick <= window[1].tick, "history out of order");
    }
}

#[tokio::test]
async fn accounting_matches_the_graph() {
    let report = run().await;
    assert_eq!(
        report.statistics.validation_stats.relationships_committed,
        report.export.relationships.len() as u64
    );
    assert_eq!(
        report.statistics.final_entity_count,
        report.export.hard_state.len()
    );
    assert_eq!(report.statistics.performance_stats.ticks, TICKS);
    assert_eq!(report.statistics.performance_stats.epochs, TICKS / 10);
}
