//! Eras - named phases of the simulation with their own template weighting.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::pressure::PressureMap;

/// A named phase with per-template weight multipliers, outright template
/// disables, an optional system whitelist, and the conditions under which
/// the world leaves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Era {
    pub name: String,
    /// Position in the era sequence; transitions only move forward.
    pub ordinal: u32,
    /// Global probability multiplier applied to systems while this era is
    /// current.
    #[serde(default = "default_intensity")]
    pub intensity: f64,
    /// Template id -> weight multiplier. Unlisted templates weigh 1.0.
    #[serde(default)]
    pub template_weights: BTreeMap<String, f64>,
    /// Templates that may not fire at all during this era.
    #[serde(default)]
    pub disabled_templates: BTreeSet<String>,
    /// When present, only these systems run; when absent, all do.
    #[serde(default)]
    pub enabled_systems: Option<BTreeSet<String>>,
    /// Conditions for leaving this era (any-of). Empty means terminal era.
    #[serde(default)]
    pub transitions: Vec<EraTransition>,
}

fn default_intensity() -> f64 {
    1.0
}

impl Era {
    /// Weight multiplier for a template in this era; 0.0 when disabled.
    pub fn template_weight(&self, template_id: &str) -> f64 {
        if self.disabled_templates.contains(template_id) {
            return 0.0;
        }
        self.template_weights
            .get(template_id)
            .copied()
            .unwrap_or(1.0)
    }

    pub fn system_enabled(&self, system_id: &str) -> bool {
        match &self.enabled_systems {
            Some(set) => set.contains(system_id),
            None => true,
        }
    }
}

/// A condition for leaving an era, evaluated at epoch boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "when")]
pub enum EraTransition {
    /// The world tick has reached a threshold.
    TickReached { tick: u64 },
    /// A pressure has risen to or above a value.
    PressureAbove { pressure: String, value: f64 },
    /// A pressure has fallen to or below a value.
    PressureBelow { pressure: String, value: f64 },
    /// An explicitly raised trigger (e.g. from a template's expansion).
    Explicit { trigger: String },
}

impl EraTransition {
    pub fn is_met(&self, tick: u64, pressures: &PressureMap, triggers: &BTreeSet<String>) -> bool {
        match self {
            Self::TickReached { tick: threshold } => tick >= *threshold,
            Self::PressureAbove { pressure, value } => pressures.get(pressure) >= *value,
            Self::PressureBelow { pressure, value } => pressures.get(pressure) <= *value,
            Self::Explicit { trigger } => triggers.contains(trigger),
        }
    }
}

/// The ordered era sequence for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EraSchedule {
    eras: Vec<Era>,
}

impl EraSchedule {
    /// Eras are sorted by ordinal on construction.
    pub fn new(mut eras: Vec<Era>) -> Self {
        eras.sort_by_key(|e| e.ordinal);
        Self { eras }
    }

    pub fn is_empty(&self) -> bool {
        self.eras.is_empty()
    }

    pub fn first(&self) -> Option<&Era> {
        self.eras.first()
    }

    pub fn era(&self, name: &str) -> Option<&Era> {
        self.eras.iter().find(|e| e.name == name)
    }

    pub fn eras(&self) -> &[Era] {
        &self.eras
    }

    /// The era following `name` in ordinal order.
    pub fn successor(&self, name: &str) -> Option<&Era> {
        let idx = self.eras.iter().position(|e| e.name == name)?;
        self.eras.get(idx + 1)
    }

    /// Evaluate the current era's transition conditions; returns the era to
    /// enter, if any condition is met and a successor exists.
    pub fn next_era(
        &self,
        current: &str,
        tick: u64,
        pressures: &PressureMap,
        triggers: &BTreeSet<String>,
    ) -> Option<&Era> {
        let era = self.era(current)?;
        let met = era
            .transitions
            .iter()
            .any(|t| t.is_met(tick, pressures, triggers));
        if met {
            self.successor(current)
        } else {
            None
        }
    }
}
