//! Saturation against distribution targets, and the epoch feedback loop.
//!
//! Saturation is a soft, advisory control: templates producing a
//! (kind, subtype) consult it in `can_apply` to self-limit. The feedback
//! multipliers recomputed at epoch boundaries nudge template selection
//! toward under-populated kinds; they never forcibly correct.

use std::collections::BTreeMap;

use worldloom_domain::{DistributionTargets, EntityKind, Subtype};

use crate::graph::WorldGraph;

#[derive(Debug, Clone)]
pub struct SaturationMonitor {
    targets: DistributionTargets,
    scale: f64,
    multipliers: BTreeMap<(EntityKind, Subtype), f64>,
}

impl SaturationMonitor {
    const MULTIPLIER_FLOOR: f64 = 0.25;
    const MULTIPLIER_CEIL: f64 = 2.0;

    pub fn new(targets: DistributionTargets, scale: f64) -> Self {
        Self {
            targets,
            scale,
            multipliers: BTreeMap::new(),
        }
    }

    pub fn targets(&self) -> &DistributionTargets {
        &self.targets
    }

    /// Current count vs. scaled target, e.g. 15 alive heroes against a
    /// target of 10 is 1.5. Unconstrained (no target) reads 0.
    pub fn saturation_ratio(&self, graph: &WorldGraph, kind: &EntityKind, subtype: &Subtype) -> f64 {
        let Some(target) = self.targets.scaled_target(kind, subtype, self.scale) else {
            return 0.0;
        };
        if target <= 0.0 {
            return 0.0;
        }
        graph.entity_count(Some(kind), Some(subtype)) as f64 / target
    }

    /// Whether the population has reached `target x overshoot`.
    pub fn is_saturated(&self, graph: &WorldGraph, kind: &EntityKind, subtype: &Subtype) -> bool {
        let Some(target) = self.targets.scaled_target(kind, subtype, self.scale) else {
            return false;
        };
        graph.entity_count(Some(kind), Some(subtype)) as f64
            >= target * self.targets.overshoot_factor
    }

    /// Homeostatic feedback: recompute a selection-weight multiplier per
    /// targeted (kind, subtype). Under target -> above 1, over target ->
    /// below 1, clamped to [0.25, 2.0].
    pub fn recompute_feedback(&mut self, graph: &WorldGraph) {
        let mut next = BTreeMap::new();
        for (kind, subtype, spec) in self.targets.iter() {
            let target = (f64::from(spec.target) * self.scale).max(1.0);
            let count = graph.entity_count(Some(kind), Some(subtype)) as f64;
            let multiplier =
                (target / count.max(1.0)).clamp(Self::MULTIPLIER_FLOOR, Self::MULTIPLIER_CEIL);
            next.insert((kind.clone(), subtype.clone()), multiplier);
        }
        self.multipliers = next;
    }

    /// Selection multiplier for a (kind, subtype); 1.0 when untargeted or
    /// before the first epoch boundary.
    pub fn multiplier(&self, kind: &EntityKind, subtype: &Subtype) -> f64 {
        self.multipliers
            .get(&(kind.clone(), subtype.clone()))
            .copied()
            .unwrap_or(1.0)
    }
}
