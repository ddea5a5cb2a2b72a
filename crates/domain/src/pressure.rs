//! Named scalar pressures and the threshold gate used by templates/systems.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// World-level tensions as named scalars, nominally bounded [0, 100].
///
/// The bound is soft: producers may overshoot and the raw value is kept, but
/// consumers read through `get`, which clamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PressureMap {
    values: BTreeMap<String, f64>,
}

impl PressureMap {
    pub const MAX: f64 = 100.0;

    pub fn new() -> Self {
        Self::default()
    }

    /// Clamped read. Unknown pressures read as 0.
    pub fn get(&self, name: &str) -> f64 {
        self.values
            .get(name)
            .copied()
            .unwrap_or(0.0)
            .clamp(0.0, Self::MAX)
    }

    /// Unclamped read, for history/export.
    pub fn raw(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value.max(0.0));
    }

    /// Add a delta; the floor at 0 is hard, the ceiling is soft.
    pub fn apply_delta(&mut self, name: &str, delta: f64) {
        let entry = self.values.entry(name.to_string()).or_insert(0.0);
        *entry = (*entry + delta).max(0.0);
    }

    /// Pull every overshot value back into [0, 100].
    pub fn clamp_all(&mut self) {
        for value in self.values.values_mut() {
            *value = value.clamp(0.0, Self::MAX);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.values
    }
}

/// The pressure threshold rule:
/// below `min` the gate is closed; within [min, max] it is open; above `max`
/// it stays open only with probability `extreme_chance`, modeling diminished
/// but nonzero activity at extremes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressureGate {
    pub pressure: String,
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
    #[serde(default)]
    pub extreme_chance: f64,
}

fn default_max() -> f64 {
    PressureMap::MAX
}

impl PressureGate {
    pub fn new(pressure: impl Into<String>, min: f64, max: f64, extreme_chance: f64) -> Self {
        Self {
            pressure: pressure.into(),
            min,
            max,
            extreme_chance,
        }
    }

    /// Evaluate against a clamped pressure value and an injected roll in
    /// [0, 1). The roll only matters above `max`.
    pub fn evaluate(&self, value: f64, roll: f64) -> bool {
        if value < self.min {
            false
        } else if value <= self.max {
            true
        } else {
            roll < self.extreme_chance
        }
    }

    /// Evaluate against a pressure map.
    pub fn is_open(&self, pressures: &PressureMap, roll: f64) -> bool {
        self.evaluate(pressures.get(&self.pressure), roll)
    }
}
