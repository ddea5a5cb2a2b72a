//! Narrative events (enrichment batch units) and history-log records.

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, EventId};

/// Which part of the run produced a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimPhase {
    Init,
    Growth,
    Simulation,
    Epoch,
    Finalize,
}

/// A world happening exposed to the enrichment collaborator.
///
/// The simulation core produces these; the external enrichment caller
/// consumes a batch per call and applies text patches back by entity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeEvent {
    pub id: EventId,
    pub tick: u64,
    pub era: String,
    pub event_kind: String,
    /// How much this event matters, in [0, 1].
    pub significance: f64,
    #[serde(default)]
    pub subject: Option<EntityId>,
    #[serde(default)]
    pub object: Option<EntityId>,
    pub action: String,
    pub headline: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub state_changes: Vec<String>,
    #[serde(default)]
    pub caused_by: Option<EventId>,
    #[serde(default)]
    pub narrative_tags: Vec<String>,
    #[serde(default)]
    pub participants: Vec<EntityId>,
}

impl NarrativeEvent {
    pub fn new(
        id: EventId,
        tick: u64,
        era: impl Into<String>,
        event_kind: impl Into<String>,
        headline: impl Into<String>,
    ) -> Self {
        Self {
            id,
            tick,
            era: era.into(),
            event_kind: event_kind.into(),
            significance: 0.5,
            subject: None,
            object: None,
            action: String::new(),
            headline: headline.into(),
            description: String::new(),
            state_changes: Vec::new(),
            caused_by: None,
            narrative_tags: Vec::new(),
            participants: Vec::new(),
        }
    }

    pub fn with_significance(mut self, significance: f64) -> Self {
        self.significance = significance.clamp(0.0, 1.0);
        self
    }

    pub fn with_subject(mut self, subject: EntityId) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_object(mut self, object: EntityId) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn with_participants(mut self, participants: Vec<EntityId>) -> Self {
        self.participants = participants;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.narrative_tags.push(tag.into());
        self
    }

    pub fn caused_by(mut self, cause: EventId) -> Self {
        self.caused_by = Some(cause);
        self
    }
}

/// One line of the append-only run history: what a phase of a tick did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub tick: u64,
    pub phase: SimPhase,
    pub summary: String,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub entities_added: u32,
    #[serde(default)]
    pub relationships_added: u32,
    /// Creations silently dropped by the hard budget caps in this record's
    /// window; surfaced here so throttling is visible in exports.
    #[serde(default)]
    pub dropped_by_budget: u32,
    #[serde(default)]
    pub era_transition: Option<String>,
    /// Set when this record logs a recovered component fault.
    #[serde(default)]
    pub fault: bool,
}

impl HistoryEvent {
    pub fn new(tick: u64, phase: SimPhase, summary: impl Into<String>) -> Self {
        Self {
            tick,
            phase,
            summary: summary.into(),
            component: None,
            entities_added: 0,
            relationships_added: 0,
            dropped_by_budget: 0,
            era_transition: None,
            fault: false,
        }
    }

    pub fn for_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_counts(mut self, entities: u32, relationships: u32, dropped: u32) -> Self {
        self.entities_added = entities;
        self.relationships_added = relationships;
        self.dropped_by_budget = dropped;
        self
    }

    pub fn as_fault(mut self) -> Self {
        self.fault = true;
        self
    }

    pub fn with_era_transition(mut self, era: impl Into<String>) -> Self {
        self.era_transition = Some(era.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrative_event_clamps_significance() {
        let ev = NarrativeEvent::new(EventId::from_seed(1, 1), 3, "dawn", "founding", "A colony rises")
            .with_significance(2.0);
        assert_eq!(ev.significance, 1.0);
    }

    #[test]
    fn history_event_serializes_camel_case() {
        let ev = HistoryEvent::new(7, SimPhase::Growth, "settlement_founding fired")
            .for_component("settlement_founding")
            .with_counts(2, 3, 1);
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["entitiesAdded"], 2);
        assert_eq!(json["relationshipsAdded"], 3);
        assert_eq!(json["droppedByBudget"], 1);
        assert_eq!(json["phase"], "growth");
    }
}
