//! Collaborator port behavior over full runs: naming and enrichment are
//! best-effort and must never sink a run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use worldloom_domain::{Culture, EntityId, NarrativeEvent};
use worldloom_engine::baseline;
use worldloom_engine::templates::CustomRegistry;
use worldloom_engine::{
    EnrichError, EnrichmentPatch, EnrichmentPort, NameGenError, NameGeneratorPort, NameRequest,
    NullEnrichment, RunReport, SyllableNameGenerator, WorldEngine,
};

struct OfflineNames;

#[async_trait]
impl NameGeneratorPort for OfflineNames {
    async fn generate_one<'a>(
        &self,
        _culture: Option<&'a Culture>,
        _request: &'a NameRequest,
    ) -> Result<String, NameGenError> {
        Err(NameGenError::Unavailable("name service offline".into()))
    }
}

struct FailingEnrichment;

#[async_trait]
impl EnrichmentPort for FailingEnrichment {
    async fn enrich(
        &self,
        _events: &[NarrativeEvent],
    ) -> Result<Vec<EnrichmentPatch>, EnrichError> {
        Err(EnrichError::Failed("model overloaded".into()))
    }
}

/// Records the batches it sees and chronicles the first participant of each
/// event.
#[derive(Default)]
struct ChroniclingEnrichment {
    batches: AtomicU64,
    subjects: Mutex<Vec<EntityId>>,
}

#[async_trait]
impl EnrichmentPort for ChroniclingEnrichment {
    async fn enrich(&self, events: &[NarrativeEvent]) -> Result<Vec<EnrichmentPatch>, EnrichError> {
        self.batches.fetch_add(1, Ordering::Relaxed);
        let mut patches = Vec::new();
        for event in events {
            assert!(!event.era.is_empty());
            assert!(event.tick > 0);
            if let Some(first) = event.participants.first() {
                self.subjects
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(*first);
                patches.push(EnrichmentPatch {
                    entity: *first,
                    description: Some("chronicled".into()),
                    summary: None,
                });
            }
        }
        Ok(patches)
    }
}

async fn run(
    names: Arc<dyn NameGeneratorPort>,
    enrichment: Arc<dyn EnrichmentPort>,
) -> RunReport {
    let config = baseline::baseline_config("ports", 21, 20);
    let (templates, systems) = baseline::registries(&config);
    let engine = WorldEngine::new(
        config,
        &templates,
        &systems,
        Arc::new(CustomRegistry::new()),
        names,
        enrichment,
    )
    .unwrap();
    engine.run().await.unwrap()
}

#[tokio::test]
async fn naming_failures_fall_back_to_deterministic_placeholders() {
    let report = run(Arc::new(OfflineNames), Arc::new(NullEnrichment)).await;

    assert!(report.export.metadata.entity_count > 0);
    for entity in &report.export.hard_state {
        let prefix = format!("{}-{}-", entity.kind, entity.subtype);
        assert!(
            entity.name.starts_with(&prefix),
            "expected a placeholder, got {:?}",
            entity.name
        );
    }
}

#[tokio::test]
async fn enrichment_failures_are_recovered_not_fatal() {
    let report = run(
        Arc::new(SyllableNameGenerator::new(21)),
        Arc::new(FailingEnrichment),
    )
    .await;

    assert!(report.statistics.performance_stats.recovered_faults > 0);
    let fault = report
        .export
        .history
        .iter()
        .find(|h| h.fault && h.component.as_deref() == Some("enrichment"))
        .expect("no enrichment fault recorded");
    assert!(fault.summary.contains("model overloaded"));
}

#[tokio::test]
async fn enrichment_patches_land_on_the_graph() {
    let enrichment = Arc::new(ChroniclingEnrichment::default());
    let report = run(Arc::new(SyllableNameGenerator::new(21)), enrichment.clone()).await;

    assert!(enrichment.batches.load(Ordering::Relaxed) > 0);
    let subjects = enrichment
        .subjects
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    assert!(!subjects.is_empty());
    let chronicled = report
        .export
        .hard_state
        .iter()
        .filter(|e| e.description == "chronicled")
        .count();
    assert!(chronicled > 0, "no patch was applied");
}
