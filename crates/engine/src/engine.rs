//! The run scheduler: one `WorldEngine` owns one run.
//!
//! Each tick is growth phase (weighted template selection under the era and
//! saturation feedback) followed by simulation phase (systems in configured
//! order). Every `epoch_length` ticks the engine closes an epoch: feedback
//! multipliers are recomputed, era transitions are evaluated, and the
//! narrative event batch is flushed to the enrichment collaborator.
//!
//! Component faults are recovered (logged to history, run continues);
//! configuration faults and aborts are fatal.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use worldloom_domain::{
    ConfigError, EntityId, EntityPatch, Era, EraSchedule, HistoryEvent, NarrativeEvent, SimPhase,
    WorldConfig,
};
use worldloom_shared::{ExportMetadata, PerformanceStats, SimulationStatistics, WorldExport};

use crate::control::SaturationMonitor;
use crate::error::EngineError;
use crate::graph::WorldGraph;
use crate::ports::{EnrichmentPort, NameGeneratorPort};
use crate::stats;
use crate::systems::SimulationSystem;
use crate::templates::{
    commit_expansion, CustomRegistry, DeclarativeTemplate, GrowthTemplate, TemplateContext,
    TemplateOutcome,
};

/// Imperative templates available to configurations, by id.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: std::collections::BTreeMap<String, Arc<dyn GrowthTemplate>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template: Arc<dyn GrowthTemplate>) {
        self.templates.insert(template.id().to_string(), template);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn GrowthTemplate>> {
        self.templates.get(id).cloned()
    }
}

/// Simulation systems available to configurations, by id.
#[derive(Default)]
pub struct SystemRegistry {
    systems: std::collections::BTreeMap<String, Arc<dyn SimulationSystem>>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, system: Arc<dyn SimulationSystem>) {
        self.systems.insert(system.id().to_string(), system);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn SimulationSystem>> {
        self.systems.get(id).cloned()
    }
}

/// Cooperative cancellation for a running engine. Cloneable and cheap; the
/// engine checks it at tick boundaries and after every template expansion.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything a finished run hands back.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub export: WorldExport,
    pub statistics: SimulationStatistics,
}

pub struct WorldEngine {
    config: WorldConfig,
    schedule: EraSchedule,
    graph: WorldGraph,
    saturation: SaturationMonitor,
    templates: Vec<Arc<dyn GrowthTemplate>>,
    systems: Vec<Arc<dyn SimulationSystem>>,
    names: Arc<dyn NameGeneratorPort>,
    enrichment: Arc<dyn EnrichmentPort>,
    abort: AbortHandle,
    rng: StdRng,
    pending_events: Vec<NarrativeEvent>,
    counters: PerformanceStats,
}

impl std::fmt::Debug for WorldEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorldEngine {
    /// Validate the configuration, resolve every referenced template and
    /// system, compile declarative templates, and build the empty graph.
    /// Any unresolved reference is fatal here, before the first tick.
    pub fn new(
        config: WorldConfig,
        template_registry: &TemplateRegistry,
        system_registry: &SystemRegistry,
        customs: Arc<CustomRegistry>,
        names: Arc<dyn NameGeneratorPort>,
        enrichment: Arc<dyn EnrichmentPort>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let vocabulary = Arc::new(config.vocabulary()?);

        let mut templates: Vec<Arc<dyn GrowthTemplate>> = Vec::new();
        for (i, id) in config.templates.iter().enumerate() {
            let template = template_registry.get(id).ok_or_else(|| {
                ConfigError::new(format!("templates[{i}]"), format!("unknown template id {id:?}"))
            })?;
            templates.push(template);
        }
        for spec in &config.declarative_templates {
            let compiled = DeclarativeTemplate::compile(spec.clone(), Arc::clone(&customs))?;
            templates.push(Arc::new(compiled));
        }

        let mut systems: Vec<Arc<dyn SimulationSystem>> = Vec::new();
        for (i, id) in config.systems.iter().enumerate() {
            let system = system_registry.get(id).ok_or_else(|| {
                ConfigError::new(format!("systems[{i}]"), format!("unknown system id {id:?}"))
            })?;
            systems.push(system);
        }

        let schedule = config.era_schedule();
        let first_era = schedule
            .first()
            .map(|e| e.name.clone())
            .ok_or_else(|| ConfigError::missing("eras"))?;

        let graph = WorldGraph::new(
            config.seed,
            vocabulary,
            first_era,
            config.initial_pressures(),
            config.budgets.scaled(config.scale_factor),
        );
        let saturation =
            SaturationMonitor::new(config.distribution_targets.clone(), config.scale_factor);
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            config,
            schedule,
            graph,
            saturation,
            templates,
            systems,
            names,
            enrichment,
            abort: AbortHandle::default(),
            rng,
            pending_events: Vec::new(),
            counters: PerformanceStats::default(),
        })
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Pre-run access for seeding an initial population.
    pub fn graph(&self) -> &WorldGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut WorldGraph {
        &mut self.graph
    }

    fn current_era(&self) -> Result<Era, EngineError> {
        self.schedule
            .era(self.graph.current_era())
            .cloned()
            .ok_or_else(|| {
                EngineError::Config(ConfigError::new(
                    "eras",
                    format!("current era {:?} is not in the schedule", self.graph.current_era()),
                ))
            })
    }

    /// Drive the world to `max_ticks` and produce the export artifacts.
    pub async fn run(mut self) -> Result<RunReport, EngineError> {
        let started = Instant::now();
        info!(
            world = %self.config.name,
            seed = self.config.seed,
            max_ticks = self.config.max_ticks,
            "starting run"
        );
        self.graph.push_history(
            HistoryEvent::new(0, SimPhase::Init, "world initialized").with_counts(
                self.graph.entity_total() as u32,
                self.graph.relationship_total() as u32,
                0,
            ),
        );

        for _ in 0..self.config.max_ticks {
            if self.abort.is_aborted() {
                return Err(EngineError::Aborted);
            }
            self.graph.advance_tick();
            let era = self.current_era()?;
            let committed_before = self.graph.validation().relationships_committed;

            self.growth_phase(&era).await?;
            self.simulation_phase(&era)?;

            let committed = self.graph.validation().relationships_committed - committed_before;
            self.graph.growth_mut().record_tick(committed as u32);
            self.counters.ticks += 1;

            if self.graph.tick() % self.config.epoch_length == 0 {
                self.close_epoch().await;
            }
        }

        self.flush_enrichment().await;
        self.graph
            .push_history(HistoryEvent::new(self.graph.tick(), SimPhase::Finalize, "run complete"));

        let statistics = stats::compute(
            &self.graph,
            &self.saturation,
            self.counters,
            started.elapsed().as_millis() as u64,
        );
        info!(
            ticks = self.counters.ticks,
            entities = self.graph.entity_total(),
            relationships = self.graph.relationship_total(),
            "run finished"
        );
        Ok(RunReport {
            export: self.export(),
            statistics,
        })
    }

    /// Up to `templates_per_tick` weighted template firings, each template at
    /// most once per tick.
    async fn growth_phase(&mut self, era: &Era) -> Result<(), EngineError> {
        let mut used: BTreeSet<usize> = BTreeSet::new();
        for _ in 0..self.config.growth.templates_per_tick {
            let ctx = TemplateContext {
                graph: &self.graph,
                saturation: &self.saturation,
                era,
                config: &self.config,
                names: self.names.as_ref(),
            };

            // Era weight times the saturation feedback multiplier for the
            // template's product, filtered by applicability.
            let mut weighted: Vec<(usize, f64)> = Vec::new();
            for (i, template) in self.templates.iter().enumerate() {
                if used.contains(&i) {
                    continue;
                }
                let mut weight = era.template_weight(template.id());
                if weight <= 0.0 {
                    continue;
                }
                if let Some((kind, subtype)) = template.produces() {
                    weight *= self.saturation.multiplier(kind, subtype);
                }
                if weight <= 0.0 || !template.can_apply(&ctx, &mut self.rng) {
                    continue;
                }
                weighted.push((i, weight));
            }
            let Some(index) = weighted_pick(&weighted, &mut self.rng) else {
                break;
            };
            used.insert(index);
            let template = Arc::clone(&self.templates[index]);
            self.counters.templates_attempted += 1;

            let targets = template.find_targets(&ctx);
            let target = pick_uniform(&targets, &mut self.rng);
            let result = template.expand(&ctx, target, &mut self.rng).await;
            drop(ctx);

            if self.abort.is_aborted() {
                // Discard the uncommitted expansion.
                return Err(EngineError::Aborted);
            }

            match result {
                Ok(TemplateOutcome::Expanded(expansion)) => {
                    let description = expansion.description.clone();
                    let outcome = commit_expansion(&mut self.graph, expansion, SimPhase::Growth);
                    self.counters.templates_fired += 1;
                    self.record_growth(template.id(), &description, &outcome, target);
                }
                Ok(TemplateOutcome::Skipped(reason)) => {
                    debug!(template = template.id(), reason, "template skipped");
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!(template = template.id(), %error, "template fault recovered");
                    self.counters.recovered_faults += 1;
                    self.graph.push_history(
                        HistoryEvent::new(self.graph.tick(), SimPhase::Growth, error.to_string())
                            .for_component(template.id())
                            .as_fault(),
                    );
                }
            }
        }
        Ok(())
    }

    fn record_growth(
        &mut self,
        template_id: &str,
        description: &str,
        outcome: &crate::templates::CommitOutcome,
        target: Option<EntityId>,
    ) {
        self.graph.push_history(
            HistoryEvent::new(self.graph.tick(), SimPhase::Growth, description)
                .for_component(template_id)
                .with_counts(
                    outcome.entities.len() as u32,
                    outcome.relationships.len() as u32,
                    outcome.dropped_by_budget,
                ),
        );
        let id = self.graph.next_event_id();
        let mut event = NarrativeEvent::new(
            id,
            self.graph.tick(),
            self.graph.current_era().to_string(),
            template_id.to_string(),
            description.to_string(),
        )
        .with_significance(0.4 + 0.1 * outcome.entities.len() as f64)
        .with_participants(outcome.entities.clone());
        if let Some(target) = target {
            event = event.with_subject(target);
        }
        self.pending_events.push(event);
    }

    /// Systems in configured order, gated by the era's whitelist, scaled by
    /// its intensity. A system fault is recovered; the rest of the phase
    /// still runs.
    fn simulation_phase(&mut self, era: &Era) -> Result<(), EngineError> {
        for system in &self.systems {
            if !era.system_enabled(system.id()) {
                continue;
            }
            self.counters.systems_run += 1;
            match system.apply(&mut self.graph, era.intensity, &mut self.rng) {
                Ok(outcome) => {
                    for (name, delta) in &outcome.pressure_changes {
                        self.graph.pressures_mut().apply_delta(name, *delta);
                    }
                    if outcome.relationships_added > 0 || outcome.entities_modified > 0 {
                        self.graph.push_history(
                            HistoryEvent::new(
                                self.graph.tick(),
                                SimPhase::Simulation,
                                outcome.description,
                            )
                            .for_component(system.id())
                            .with_counts(0, outcome.relationships_added, 0),
                        );
                    }
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!(system = system.id(), %error, "system fault recovered");
                    self.counters.recovered_faults += 1;
                    self.graph.push_history(
                        HistoryEvent::new(
                            self.graph.tick(),
                            SimPhase::Simulation,
                            error.to_string(),
                        )
                        .for_component(system.id())
                        .as_fault(),
                    );
                }
            }
        }
        Ok(())
    }

    /// Epoch boundary: close growth accounting, recompute feedback, pull
    /// overshot pressures back into range, evaluate era transitions, and
    /// flush enrichment.
    async fn close_epoch(&mut self) {
        self.counters.epochs += 1;
        self.graph.growth_mut().close_epoch();
        self.saturation.recompute_feedback(&self.graph);
        self.graph.discovery_mut().reset_epoch();
        self.graph.pressures_mut().clamp_all();

        let next = self
            .schedule
            .next_era(
                self.graph.current_era(),
                self.graph.tick(),
                self.graph.pressures(),
                self.graph.triggers(),
            )
            .map(|e| e.name.clone());
        if let Some(next) = next {
            let previous = self.graph.current_era().to_string();
            info!(from = %previous, to = %next, tick = self.graph.tick(), "era transition");
            self.graph.set_current_era(next.clone());
            self.graph.push_history(
                HistoryEvent::new(
                    self.graph.tick(),
                    SimPhase::Epoch,
                    format!("the {previous} gave way to the {next}"),
                )
                .with_era_transition(next.clone()),
            );
            let id = self.graph.next_event_id();
            self.pending_events.push(
                NarrativeEvent::new(
                    id,
                    self.graph.tick(),
                    next.clone(),
                    "era_transition",
                    format!("A new age begins: {next}"),
                )
                .with_significance(0.9),
            );
        }

        self.flush_enrichment().await;
    }

    /// Hand the pending narrative batch to the enrichment collaborator and
    /// apply any returned prose patches. Failure leaves mechanical text in
    /// place and is recorded as a recovered fault.
    async fn flush_enrichment(&mut self) {
        if self.pending_events.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.pending_events);
        match self.enrichment.enrich(&events).await {
            Ok(patches) => {
                for patch in patches {
                    if let Some(description) = patch.description {
                        self.graph
                            .update_entity(patch.entity, EntityPatch::description(description));
                    }
                }
            }
            Err(error) => {
                warn!(%error, "enrichment fault, mechanical descriptions kept");
                self.counters.recovered_faults += 1;
                self.graph.push_history(
                    HistoryEvent::new(self.graph.tick(), SimPhase::Epoch, error.to_string())
                        .for_component("enrichment")
                        .as_fault(),
                );
            }
        }
    }

    fn export(&self) -> WorldExport {
        WorldExport {
            metadata: ExportMetadata {
                tick: self.graph.tick(),
                epoch: self.graph.tick() / self.config.epoch_length,
                entity_count: self.graph.entity_total(),
                relationship_count: self.graph.relationship_total(),
                current_era: self.graph.current_era().to_string(),
                generated_at: chrono::Utc::now(),
            },
            hard_state: self.graph.entities().cloned().collect(),
            relationships: self.graph.relationships().cloned().collect(),
            pressures: self.graph.pressures().as_map().clone(),
            history: self.graph.history().to_vec(),
        }
    }
}

/// Roulette selection over (index, weight) pairs.
fn weighted_pick(weighted: &[(usize, f64)], rng: &mut StdRng) -> Option<usize> {
    let total: f64 = weighted.iter().map(|(_, w)| w).sum();
    if weighted.is_empty() || total <= 0.0 {
        return None;
    }
    let mut roll = rng.gen::<f64>() * total;
    for (index, weight) in weighted {
        roll -= weight;
        if roll <= 0.0 {
            return Some(*index);
        }
    }
    weighted.last().map(|(index, _)| *index)
}

fn pick_uniform(candidates: &[EntityId], rng: &mut StdRng) -> Option<EntityId> {
    if candidates.is_empty() {
        None
    } else {
        Some(candidates[rng.gen_range(0..candidates.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::baseline;
    use crate::ports::{NullEnrichment, SyllableNameGenerator};

    fn engine(config: WorldConfig) -> Result<WorldEngine, ConfigError> {
        let (templates, systems) = baseline::registries(&config);
        WorldEngine::new(
            config,
            &templates,
            &systems,
            Arc::new(CustomRegistry::new()),
            Arc::new(SyllableNameGenerator::new(1)),
            Arc::new(NullEnrichment),
        )
    }

    #[test]
    fn unknown_system_reference_is_fatal_at_construction() {
        let mut config = baseline::baseline_config("testworld", 1, 10);
        config.systems.push("weather".into());
        let err = engine(config).unwrap_err();
        assert!(err.path.starts_with("systems["));
        assert!(err.message.contains("weather"));
    }

    #[test]
    fn unknown_template_reference_is_fatal_at_construction() {
        let mut config = baseline::baseline_config("testworld", 1, 10);
        config.templates.push("plague_outbreak".into());
        let err = engine(config).unwrap_err();
        assert!(err.path.starts_with("templates["));
    }

    #[tokio::test]
    async fn a_short_run_populates_the_world() {
        let config = baseline::baseline_config("testworld", 7, 30);
        let report = engine(config).unwrap().run().await.unwrap();

        assert_eq!(report.export.metadata.tick, 30);
        assert_eq!(report.statistics.performance_stats.ticks, 30);
        assert_eq!(report.statistics.performance_stats.epochs, 3);
        assert!(report.export.metadata.entity_count > 0);
        assert!(report.statistics.performance_stats.templates_fired > 0);
        // Init and finalize records bracket the history.
        assert_eq!(report.export.history.first().map(|h| h.phase), Some(SimPhase::Init));
        assert_eq!(
            report.export.history.last().map(|h| h.phase),
            Some(SimPhase::Finalize)
        );
    }

    #[tokio::test]
    async fn aborted_runs_produce_no_report() {
        let config = baseline::baseline_config("testworld", 7, 1000);
        let engine = engine(config).unwrap();
        let handle = engine.abort_handle();
        handle.abort();
        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, EngineError::Aborted));
    }

    #[test]
    fn weighted_pick_is_empty_safe_and_respects_zero_total() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(weighted_pick(&[], &mut rng), None);
        assert_eq!(weighted_pick(&[(0, 0.0)], &mut rng), None);
        assert_eq!(weighted_pick(&[(3, 2.0)], &mut rng), Some(3));
    }
}
