//! Per-entity relationship-formation cooldowns.
//!
//! Formations are recorded immediately on acceptance, not at tick end, so a
//! single tick cannot double-spend a cooldown window across multiple
//! candidate pairs touching the same entity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use worldloom_domain::{EntityId, RelationshipKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownTracker {
    /// (entity, kind) -> tick of the last accepted formation.
    last_formation: BTreeMap<(EntityId, RelationshipKind), u64>,
    /// Ordered pair + kind -> tick until which re-formation is suppressed
    /// (exclusive). Used by culling so archived edges do not instantly
    /// re-form.
    pair_blocks: BTreeMap<(EntityId, EntityId, RelationshipKind), u64>,
}

fn ordered(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `now - last >= cooldown_ticks`, or no formation on record.
    pub fn can_form(
        &self,
        entity: EntityId,
        kind: &RelationshipKind,
        now: u64,
        cooldown_ticks: u64,
    ) -> bool {
        match self.last_formation.get(&(entity, kind.clone())) {
            None => true,
            Some(last) => now.saturating_sub(*last) >= cooldown_ticks,
        }
    }

    pub fn record_formation(&mut self, entity: EntityId, kind: &RelationshipKind, now: u64) {
        self.last_formation.insert((entity, kind.clone()), now);
    }

    pub fn last_formation(&self, entity: EntityId, kind: &RelationshipKind) -> Option<u64> {
        self.last_formation.get(&(entity, kind.clone())).copied()
    }

    /// Suppress re-formation of `kind` between a pair until `until` (exclusive).
    pub fn block_pair(&mut self, a: EntityId, b: EntityId, kind: &RelationshipKind, until: u64) {
        let (lo, hi) = ordered(a, b);
        self.pair_blocks.insert((lo, hi, kind.clone()), until);
    }

    pub fn pair_blocked(
        &self,
        a: EntityId,
        b: EntityId,
        kind: &RelationshipKind,
        now: u64,
    ) -> bool {
        let (lo, hi) = ordered(a, b);
        self.pair_blocks
            .get(&(lo, hi, kind.clone()))
            .is_some_and(|until| now < *until)
    }
}
