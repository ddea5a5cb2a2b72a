//! Same seed, same world. The export artifact must be byte-identical across
//! runs of the same configuration.

use std::sync::Arc;

use worldloom_engine::baseline;
use worldloom_engine::templates::CustomRegistry;
use worldloom_engine::{NullEnrichment, RunReport, SyllableNameGenerator, WorldEngine};

async fn run(seed: u64, ticks: u64) -> RunReport {
    let config = baseline::baseline_config("determinism", seed, ticks);
    let (templates, systems) = baseline::registries(&config);
    let engine = WorldEngine::new(
        config,
        &templates,
        &systems,
        Arc::new(CustomRegistry::new()),
        Arc::new(SyllableNameGenerator::new(seed)),
        Arc::new(NullEnrichment),
    )
    .unwrap();
    engine.run().await.unwrap()
}

#[tokio::test]
async fn same_seed_reproduces_the_export_byte_for_byte() {
    let first = run(1234, 40).await;
    let mut second = run(1234, 40).await;
    // The generation timestamp is wall-clock by design; everything else must
    // be a pure function of the seed.
    second.export.metadata.generated_at = first.export.metadata.generated_at;

    assert!(first.export.metadata.entity_count > 0);
    assert_eq!(
        first.export.to_json().unwrap(),
        second.export.to_json().unwrap()
    );
    // Statistics match too, apart from wall-clock time.
    assert_eq!(
        first.statistics.fitness_metrics,
        second.statistics.fitness_metrics
    );
    assert_eq!(
        first.statistics.validation_stats,
        second.statistics.validation_stats
    );
    assert_eq!(
        first.statistics.performance_stats,
        second.statistics.performance_stats
    );
}

#[tokio::test]
async fn different_seeds_diverge() {
    let first = run(1, 40).await;
    let second = run(2, 40).await;

    assert!(first.export.metadata.entity_count > 0);
    // Entity ids derive from the seed, so the worlds cannot coincide.
    assert_ne!(
        first.export.to_json().unwrap(),
        second.export.to_json().unwrap()
    );
}
