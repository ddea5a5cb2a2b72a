//! Hard per-window creation budgets.
//!
//! Once a window's ceiling is reached further creations are silently dropped
//! (not queued); drops are counted so history and exports reflect the
//! throttling.

use serde::{Deserialize, Serialize};

use worldloom_domain::{BudgetConfig, SimPhase};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetTracker {
    limits: BudgetConfig,
    sim_tick_relationships: u32,
    growth_relationships: u32,
    growth_entities: u32,
    dropped_this_tick: u32,
    dropped_total: u64,
}

impl BudgetTracker {
    /// `limits` should already be scaled by the global scale factor.
    pub fn new(limits: BudgetConfig) -> Self {
        Self {
            limits,
            sim_tick_relationships: 0,
            growth_relationships: 0,
            growth_entities: 0,
            dropped_this_tick: 0,
            dropped_total: 0,
        }
    }

    pub fn limits(&self) -> &BudgetConfig {
        &self.limits
    }

    /// Charge one relationship against the window for `phase`. Returns false
    /// (and counts the drop) when the ceiling is reached. Phases without a
    /// relationship budget (init seeding, finalization) are unconstrained.
    pub fn try_charge_relationship(&mut self, phase: SimPhase) -> bool {
        let allowed = match phase {
            SimPhase::Simulation => {
                if self.sim_tick_relationships < self.limits.max_relationships_per_simulation_tick {
                    self.sim_tick_relationships += 1;
                    true
                } else {
                    false
                }
            }
            SimPhase::Growth => {
                if self.growth_relationships < self.limits.max_relationships_per_growth_phase {
                    self.growth_relationships += 1;
                    true
                } else {
                    false
                }
            }
            _ => true,
        };
        if !allowed {
            self.note_drop();
        }
        allowed
    }

    /// Charge one entity against the growth-phase entity budget.
    pub fn try_charge_entity(&mut self, phase: SimPhase) -> bool {
        if phase != SimPhase::Growth {
            return true;
        }
        if self.growth_entities < self.limits.max_entities_per_growth_phase {
            self.growth_entities += 1;
            true
        } else {
            self.note_drop();
            false
        }
    }

    fn note_drop(&mut self) {
        self.dropped_this_tick += 1;
        self.dropped_total += 1;
    }

    pub fn dropped_this_tick(&self) -> u32 {
        self.dropped_this_tick
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    pub fn relationships_this_simulation_tick(&self) -> u32 {
        self.sim_tick_relationships
    }

    pub fn relationships_this_growth_phase(&self) -> u32 {
        self.growth_relationships
    }

    /// Reset all per-tick windows. The growth phase budget is per tick as
    /// well: each tick has one growth phase.
    pub fn reset_tick(&mut self) {
        self.sim_tick_relationships = 0;
        self.growth_relationships = 0;
        self.growth_entities = 0;
        self.dropped_this_tick = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> BudgetTracker {
        BudgetTracker::new(BudgetConfig {
            max_relationships_per_simulation_tick: 2,
            max_relationships_per_growth_phase: 1,
            max_entities_per_growth_phase: 1,
        })
    }

    #[test]
    fn simulation_budget_caps_and_counts_drops() {
        let mut budget = tracker();
        assert!(budget.try_charge_relationship(SimPhase::Simulation));
        assert!(budget.try_charge_relationship(SimPhase::Simulation));
        assert!(!budget.try_charge_relationship(SimPhase::Simulation));
        assert_eq!(budget.dropped_this_tick(), 1);
        assert_eq!(budget.dropped_total(), 1);
    }

    #[test]
    fn growth_and_simulation_windows_are_independent() {
        let mut budget = tracker();
        assert!(budget.try_charge_relationship(SimPhase::Growth));
        assert!(!budget.try_charge_relationship(SimPhase::Growth));
        // Simulation window untouched by growth charges.
        assert!(budget.try_charge_relationship(SimPhase::Simulation));
    }

    #[test]
    fn reset_tick_reopens_all_windows() {
        let mut budget = tracker();
        assert!(budget.try_charge_entity(SimPhase::Growth));
        assert!(!budget.try_charge_entity(SimPhase::Growth));
        budget.reset_tick();
        assert!(budget.try_charge_entity(SimPhase::Growth));
        assert_eq!(budget.dropped_this_tick(), 0);
        assert_eq!(budget.dropped_total(), 1);
    }

    #[test]
    fn non_budgeted_phases_are_unconstrained() {
        let mut budget = tracker();
        for _ in 0..10 {
            assert!(budget.try_charge_relationship(SimPhase::Init));
        }
    }
}
