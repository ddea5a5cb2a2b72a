//! Budget, saturation & cooldown control.
//!
//! Three independent safety layers compose on every proposed mutation, each
//! operating at a different time scale: hard per-window budgets (tick),
//! per-entity cooldowns (several ticks), and saturation against distribution
//! targets (whole run). Open-ended generative growth diverges without them.

pub mod budget;
pub mod cooldown;
pub mod saturation;

pub use budget::BudgetTracker;
pub use cooldown::CooldownTracker;
pub use saturation::SaturationMonitor;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use worldloom_domain::DiscoveryConfig;

/// Rolling relationship-creation rate, for throttling heuristics and the
/// stability metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthMetrics {
    window: VecDeque<u32>,
    epoch_totals: Vec<u32>,
    current_epoch: u32,
}

impl GrowthMetrics {
    const WINDOW: usize = 20;

    /// Record the relationships committed during one tick.
    pub fn record_tick(&mut self, relationships: u32) {
        if self.window.len() == Self::WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(relationships);
        self.current_epoch += relationships;
    }

    /// Mean relationships per tick over the rolling window.
    pub fn rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let total: u32 = self.window.iter().sum();
        f64::from(total) / self.window.len() as f64
    }

    /// Close out an epoch, pushing its total onto the per-epoch series.
    pub fn close_epoch(&mut self) {
        self.epoch_totals.push(self.current_epoch);
        self.current_epoch = 0;
    }

    pub fn epoch_totals(&self) -> &[u32] {
        &self.epoch_totals
    }
}

/// Cooldown specialization for discovery-style templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryState {
    pub last_discovery_tick: Option<u64>,
    pub discoveries_this_epoch: u32,
}

impl DiscoveryState {
    pub fn can_discover(&self, now: u64, config: &DiscoveryConfig) -> bool {
        if self.discoveries_this_epoch >= config.max_per_epoch {
            return false;
        }
        match self.last_discovery_tick {
            None => true,
            Some(last) => now.saturating_sub(last) >= config.min_ticks_between,
        }
    }

    pub fn record(&mut self, now: u64) {
        self.last_discovery_tick = Some(now);
        self.discoveries_this_epoch += 1;
    }

    pub fn reset_epoch(&mut self) {
        self.discoveries_this_epoch = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_rate_averages_the_window() {
        let mut metrics = GrowthMetrics::default();
        metrics.record_tick(4);
        metrics.record_tick(2);
        assert!((metrics.rate() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn epoch_totals_accumulate_and_reset() {
        let mut metrics = GrowthMetrics::default();
        metrics.record_tick(3);
        metrics.record_tick(1);
        metrics.close_epoch();
        metrics.record_tick(2);
        metrics.close_epoch();
        assert_eq!(metrics.epoch_totals(), &[4, 2]);
    }

    #[test]
    fn discovery_respects_spacing_and_epoch_cap() {
        let config = DiscoveryConfig {
            min_ticks_between: 5,
            max_per_epoch: 2,
        };
        let mut state = DiscoveryState::default();
        assert!(state.can_discover(1, &config));
        state.record(1);
        assert!(!state.can_discover(3, &config));
        assert!(state.can_discover(6, &config));
        state.record(6);
        // Epoch cap reached regardless of spacing.
        assert!(!state.can_discover(50, &config));
        state.reset_epoch();
        assert!(state.can_discover(50, &config));
    }
}
