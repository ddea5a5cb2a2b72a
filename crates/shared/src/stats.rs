//! Statistics export consumed by the optimizer's fitness evaluation.

use serde::{Deserialize, Serialize};

/// Fitness metrics over the final graph, each in [0, 1] except
/// `constraint_violations` (a count, expected 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FitnessMetrics {
    pub entity_distribution_fitness: f64,
    pub prominence_distribution_fitness: f64,
    pub relationship_diversity_fitness: f64,
    pub connectivity_fitness: f64,
    pub overall_fitness: f64,
    pub constraint_violations: u32,
    pub convergence_rate: f64,
    pub stability_score: f64,
}

/// Counters from the mutation validation gates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub relationships_proposed: u64,
    pub relationships_committed: u64,
    pub dropped_by_budget: u64,
    pub blocked_by_cooldown: u64,
    pub blocked_by_compatibility: u64,
    pub blocked_as_duplicate: u64,
}

/// Coarse performance counters for the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub ticks: u64,
    pub epochs: u64,
    pub templates_attempted: u64,
    pub templates_fired: u64,
    pub systems_run: u64,
    pub recovered_faults: u64,
}

/// The complete statistics artifact handed to the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStatistics {
    pub fitness_metrics: FitnessMetrics,
    pub validation_stats: ValidationStats,
    pub performance_stats: PerformanceStats,
    pub final_entity_count: usize,
    pub final_relationship_count: usize,
    pub generation_time_ms: u64,
}
