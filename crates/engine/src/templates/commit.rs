//! Applying an expansion to the graph under the validation gates.
//!
//! Gate order for every proposed relationship: endpoint existence and
//! vocabulary endpoint rules, duplicate suppression, compatibility matrix,
//! cooldowns, then the hard budget. The budget is charged last so a proposal
//! rejected for semantic reasons never consumes budget. Each gate keeps its
//! own counter in the graph's validation stats.

use worldloom_domain::{EntityId, EntityRef, SimPhase};

use crate::graph::{NewRelationship, WorldGraph};
use crate::templates::Expansion;

/// Result of pushing one relationship through the gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipAttempt {
    Committed(worldloom_domain::RelationshipId),
    DroppedBudget,
    BlockedCooldown,
    BlockedCompatibility,
    Duplicate,
    InvalidEndpoint,
}

/// Gate and insert one fully resolved relationship. The source entity is
/// treated as the initiator: only its cooldown is spent on acceptance, while
/// both endpoints' cooldowns gate the attempt.
pub fn try_commit_relationship(
    graph: &mut WorldGraph,
    new: NewRelationship,
    phase: SimPhase,
) -> RelationshipAttempt {
    graph.validation_mut().relationships_proposed += 1;

    let endpoints = graph.entity(new.src).map(|e| e.kind.clone()).zip(
        graph.entity(new.dst).map(|e| e.kind.clone()),
    );
    let Some((src_kind, dst_kind)) = endpoints else {
        return RelationshipAttempt::InvalidEndpoint;
    };
    if !graph
        .vocabulary()
        .allows_endpoints(&new.kind, &src_kind, &dst_kind)
    {
        return RelationshipAttempt::InvalidEndpoint;
    }

    if graph.pair_has_kind(new.src, new.dst, &new.kind) {
        graph.validation_mut().blocked_as_duplicate += 1;
        return RelationshipAttempt::Duplicate;
    }

    if !graph.compatible_with_existing(new.src, new.dst, &new.kind) {
        graph.validation_mut().blocked_by_compatibility += 1;
        return RelationshipAttempt::BlockedCompatibility;
    }

    let now = graph.tick();
    let cooldown = graph.vocabulary().cooldown_ticks(&new.kind);
    let cooled = graph.cooldowns().can_form(new.src, &new.kind, now, cooldown)
        && graph.cooldowns().can_form(new.dst, &new.kind, now, cooldown)
        && !graph.cooldowns().pair_blocked(new.src, new.dst, &new.kind, now);
    if !cooled {
        graph.validation_mut().blocked_by_cooldown += 1;
        return RelationshipAttempt::BlockedCooldown;
    }

    if !graph.budgets_mut().try_charge_relationship(phase) {
        graph.validation_mut().dropped_by_budget += 1;
        return RelationshipAttempt::DroppedBudget;
    }

    let (initiator, kind) = (new.src, new.kind.clone());
    match graph.insert_relationship(new) {
        Ok(id) => {
            graph.cooldowns_mut().record_formation(initiator, &kind, now);
            graph.validation_mut().relationships_committed += 1;
            RelationshipAttempt::Committed(id)
        }
        Err(_) => RelationshipAttempt::InvalidEndpoint,
    }
}

/// What committing an expansion actually changed.
#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    pub entities: Vec<EntityId>,
    pub relationships: Vec<worldloom_domain::RelationshipId>,
    pub dropped_by_budget: u32,
}

impl CommitOutcome {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Apply an expansion: archive superseded edges, create entities under the
/// entity budget, resolve pending references, then gate each relationship.
///
/// An entity dropped by the budget invalidates every relationship that
/// references it; those proposals count as budget drops, not endpoint
/// faults.
pub fn commit_expansion(
    graph: &mut WorldGraph,
    expansion: Expansion,
    phase: SimPhase,
) -> CommitOutcome {
    let mut outcome = CommitOutcome::default();

    for rel_id in &expansion.archived_relationships {
        graph.archive_relationship(*rel_id);
    }

    let mut pending: Vec<Option<EntityId>> = Vec::with_capacity(expansion.entities.len());
    for partial in expansion.entities {
        if graph.budgets_mut().try_charge_entity(phase) {
            let id = graph.create_entity(partial);
            outcome.entities.push(id);
            pending.push(Some(id));
        } else {
            outcome.dropped_by_budget += 1;
            pending.push(None);
        }
    }

    let resolve = |graph: &WorldGraph, r: EntityRef| -> Option<EntityId> {
        match r {
            EntityRef::Existing(id) => graph.has_entity(id).then_some(id),
            EntityRef::Pending(index) => pending.get(index).copied().flatten(),
        }
    };

    for proposal in expansion.relationships {
        let src = resolve(graph, proposal.src);
        let dst = resolve(graph, proposal.dst);
        let (Some(src), Some(dst)) = (src, dst) else {
            // Unresolvable because the endpoint entity was budget-dropped.
            let pending_drop = matches!(proposal.src, EntityRef::Pending(_))
                || matches!(proposal.dst, EntityRef::Pending(_));
            if pending_drop {
                outcome.dropped_by_budget += 1;
            }
            continue;
        };
        let new = NewRelationship {
            kind: proposal.kind,
            src,
            dst,
            strength: proposal.strength,
            distance: proposal.distance,
            catalyzed_by: proposal.catalyzed_by.and_then(|c| resolve(graph, c)),
            category: proposal.category,
        };
        match try_commit_relationship(graph, new, phase) {
            RelationshipAttempt::Committed(id) => outcome.relationships.push(id),
            RelationshipAttempt::DroppedBudget => outcome.dropped_by_budget += 1,
            _ => {}
        }
    }

    for (pressure, delta) in &expansion.pressure_deltas {
        graph.pressures_mut().apply_delta(pressure, *delta);
    }
    for trigger in expansion.triggers {
        graph.raise_trigger(trigger);
    }
    if expansion.marks_discovery {
        let now = graph.tick();
        graph.discovery_mut().record(now);
    }

    outcome
}
