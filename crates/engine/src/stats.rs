//! Run statistics: the fitness metrics consumed by parameter optimization.
//!
//! All fitness components are in [0, 1], computed over the final graph.
//! They are descriptive scores, not gates; a run always produces them.

use std::collections::BTreeMap;

use worldloom_domain::Prominence;
use worldloom_shared::{FitnessMetrics, PerformanceStats, SimulationStatistics};

use crate::control::SaturationMonitor;
use crate::graph::WorldGraph;

/// Ideal prominence pyramid: most of the world is marginal, legends are
/// rare.
const PROMINENCE_IDEAL: [(Prominence, f64); 5] = [
    (Prominence::Forgotten, 0.10),
    (Prominence::Marginal, 0.40),
    (Prominence::Recognized, 0.30),
    (Prominence::Renowned, 0.15),
    (Prominence::Mythic, 0.05),
];

pub fn compute(
    graph: &WorldGraph,
    saturation: &SaturationMonitor,
    performance: PerformanceStats,
    generation_time_ms: u64,
) -> SimulationStatistics {
    let fitness = FitnessMetrics {
        entity_distribution_fitness: entity_distribution(graph, saturation),
        prominence_distribution_fitness: prominence_distribution(graph),
        relationship_diversity_fitness: relationship_diversity(graph),
        connectivity_fitness: connectivity(graph),
        overall_fitness: 0.0,
        constraint_violations: dangling_endpoints(graph),
        convergence_rate: convergence(graph),
        stability_score: stability(graph),
    };
    let overall = (fitness.entity_distribution_fitness
        + fitness.prominence_distribution_fitness
        + fitness.relationship_diversity_fitness
        + fitness.connectivity_fitness)
        / 4.0;
    SimulationStatistics {
        fitness_metrics: FitnessMetrics {
            overall_fitness: overall,
            ..fitness
        },
        validation_stats: *graph.validation(),
        performance_stats: performance,
        final_entity_count: graph.entity_total(),
        final_relationship_count: graph.relationship_total(),
        generation_time_ms,
    }
}

/// One minus the mean deviation of each targeted population from its scaled
/// target. Untargeted worlds score 1.
fn entity_distribution(graph: &WorldGraph, saturation: &SaturationMonitor) -> f64 {
    let mut deviations = Vec::new();
    for (kind, subtype, _) in saturation.targets().iter() {
        let ratio = saturation.saturation_ratio(graph, kind, subtype);
        deviations.push((ratio - 1.0).abs().min(1.0));
    }
    if deviations.is_empty() {
        return 1.0;
    }
    1.0 - deviations.iter().sum::<f64>() / deviations.len() as f64
}

/// One minus the total variation distance between the observed prominence
/// distribution and the ideal pyramid.
fn prominence_distribution(graph: &WorldGraph) -> f64 {
    let live: Vec<_> = graph
        .entities()
        .filter(|e| !graph.vocabulary().is_terminal_status(&e.kind, &e.status))
        .collect();
    if live.is_empty() {
        return 0.0;
    }
    let total = live.len() as f64;
    let mut observed: BTreeMap<Prominence, f64> = BTreeMap::new();
    for entity in &live {
        *observed.entry(entity.prominence).or_insert(0.0) += 1.0;
    }
    let tv: f64 = PROMINENCE_IDEAL
        .iter()
        .map(|(p, ideal)| {
            let share = observed.get(p).copied().unwrap_or(0.0) / total;
            (share - ideal).abs()
        })
        .sum::<f64>()
        / 2.0;
    1.0 - tv
}

/// Normalized Shannon entropy over live relationship kinds: 1 when usage is
/// spread evenly across the registered kinds, 0 when a single kind (or
/// nothing) dominates.
fn relationship_diversity(graph: &WorldGraph) -> f64 {
    let mut counts: BTreeMap<&str, f64> = BTreeMap::new();
    for rel in graph.relationships().filter(|r| r.is_active()) {
        *counts.entry(rel.kind.as_str()).or_insert(0.0) += 1.0;
    }
    let total: f64 = counts.values().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let registered = graph.vocabulary().relationship_kinds().count();
    if registered <= 1 {
        return 1.0;
    }
    let entropy: f64 = counts
        .values()
        .map(|c| {
            let p = c / total;
            -p * p.ln()
        })
        .sum();
    (entropy / (registered as f64).ln()).clamp(0.0, 1.0)
}

/// Fraction of living entities holding at least one live edge, discounted by
/// hub concentration (the largest single degree's share of all endpoints).
fn connectivity(graph: &WorldGraph) -> f64 {
    let live: Vec<_> = graph
        .entities()
        .filter(|e| !graph.vocabulary().is_terminal_status(&e.kind, &e.status))
        .map(|e| e.id)
        .collect();
    if live.is_empty() {
        return 0.0;
    }
    let degrees: Vec<usize> = live.iter().map(|id| graph.connection_count(*id)).collect();
    let connected = degrees.iter().filter(|d| **d > 0).count() as f64;
    let fraction = connected / live.len() as f64;

    let endpoints: usize = degrees.iter().sum();
    let concentration = if endpoints == 0 {
        0.0
    } else {
        degrees.iter().copied().max().unwrap_or(0) as f64 / endpoints as f64
    };
    fraction * (1.0 - concentration).max(0.0)
}

/// Referential integrity audit. Expected to be 0: the graph API never
/// removes an entity without its edges.
fn dangling_endpoints(graph: &WorldGraph) -> u32 {
    graph
        .relationships()
        .map(|rel| {
            u32::from(!graph.has_entity(rel.src)) + u32::from(!graph.has_entity(rel.dst))
        })
        .sum()
}

/// How much per-epoch growth slowed from the first epoch to the last: 1
/// when growth fully settled, 0 when it never slowed.
fn convergence(graph: &WorldGraph) -> f64 {
    let totals = graph.growth().epoch_totals();
    let (Some(first), Some(last)) = (totals.first(), totals.last()) else {
        return 0.0;
    };
    if *first == 0 {
        return 0.0;
    }
    ((f64::from(*first) - f64::from(*last)) / f64::from(*first)).clamp(0.0, 1.0)
}

/// Inverse coefficient of variation of per-epoch growth: steady epochs score
/// near 1, erratic ones fall toward 0.
fn stability(graph: &WorldGraph) -> f64 {
    let totals = graph.growth().epoch_totals();
    if totals.len() < 2 {
        return 0.0;
    }
    let n = totals.len() as f64;
    let mean = totals.iter().map(|t| f64::from(*t)).sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = totals
        .iter()
        .map(|t| (f64::from(*t) - mean).powi(2))
        .sum::<f64>()
        / n;
    1.0 / (1.0 + variance.sqrt() / mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    use worldloom_domain::{EntityKind, PartialEntity, RelationshipKind, Subtype};

    use crate::baseline;
    use crate::graph::NewRelationship;

    fn setup() -> (WorldGraph, SaturationMonitor) {
        let config = baseline::baseline_config("testworld", 9, 40);
        let graph = baseline::empty_graph(&config).unwrap();
        let saturation =
            SaturationMonitor::new(config.distribution_targets.clone(), config.scale_factor);
        (graph, saturation)
    }

    #[test]
    fn empty_world_scores_zero_where_it_should() {
        let (graph, saturation) = setup();
        let stats = compute(&graph, &saturation, PerformanceStats::default(), 1);
        assert_eq!(stats.fitness_metrics.prominence_distribution_fitness, 0.0);
        assert_eq!(stats.fitness_metrics.relationship_diversity_fitness, 0.0);
        assert_eq!(stats.fitness_metrics.connectivity_fitness, 0.0);
        assert_eq!(stats.fitness_metrics.constraint_violations, 0);
        assert_eq!(stats.final_entity_count, 0);
    }

    #[test]
    fn single_kind_usage_scores_low_diversity() {
        let (mut graph, _) = setup();
        let npc = EntityKind::new("npc").unwrap();
        let hero = Subtype::new("hero").unwrap();
        let a = graph.create_entity(PartialEntity::new(npc.clone(), hero.clone(), "asha"));
        let b = graph.create_entity(PartialEntity::new(npc.clone(), hero.clone(), "brin"));
        let c = graph.create_entity(PartialEntity::new(npc, hero, "cora"));
        let follower = RelationshipKind::new("follower_of").unwrap();
        graph
            .insert_relationship(NewRelationship::new(follower.clone(), a, b))
            .unwrap();
        graph
            .insert_relationship(NewRelationship::new(follower, b, c))
            .unwrap();

        // One kind in use out of nine registered: zero entropy.
        assert_eq!(relationship_diversity(&graph), 0.0);
    }

    #[test]
    fn connectivity_rewards_spread_and_punishes_hubs() {
        let (mut graph, _) = setup();
        let npc = EntityKind::new("npc").unwrap();
        let hero = Subtype::new("hero").unwrap();
        let hub = graph.create_entity(PartialEntity::new(npc.clone(), hero.clone(), "hub"));
        let follower = RelationshipKind::new("follower_of").unwrap();
        for name in ["a", "b", "c"] {
            let other = graph.create_entity(PartialEntity::new(npc.clone(), hero.clone(), name));
            graph
                .insert_relationship(NewRelationship::new(follower.clone(), other, hub))
                .unwrap();
        }
        let star = connectivity(&graph);

        // A chain with the same edge count concentrates less.
        let (mut chain, _) = setup();
        let mut previous = chain.create_entity(PartialEntity::new(npc.clone(), hero.clone(), "n0"));
        for name in ["n1", "n2", "n3"] {
            let next = chain.create_entity(PartialEntity::new(npc.clone(), hero.clone(), name));
            chain
                .insert_relationship(NewRelationship::new(follower.clone(), previous, next))
                .unwrap();
            previous = next;
        }
        assert!(connectivity(&chain) > star);
    }

    #[test]
    fn convergence_measures_slowing_growth() {
        let (mut graph, _) = setup();
        for total in [10, 6, 2] {
            for _ in 0..total {
                graph.growth_mut().record_tick(1);
            }
            graph.growth_mut().close_epoch();
        }
        assert!((convergence(&graph) - 0.8).abs() < 1e-9);
        assert!(stability(&graph) > 0.0);
    }

    #[test]
    fn perfectly_on_target_distribution_scores_one() {
        let (mut graph, saturation) = setup();
        // The baseline targets 8 heroes at scale 1.
        let npc = EntityKind::new("npc").unwrap();
        let hero = Subtype::new("hero").unwrap();
        for i in 0..8 {
            graph.create_entity(PartialEntity::new(npc.clone(), hero.clone(), format!("h{i}")));
        }
        let fitness = entity_distribution(&graph, &saturation);
        // Other targeted subtypes are empty, so the mean deviation is
        // dominated by them; the hero term itself contributes zero.
        assert!(fitness < 1.0);
        let ratio = saturation.saturation_ratio(&graph, &npc, &hero);
        assert!((ratio - 1.0).abs() < 1e-9);
    }
}
