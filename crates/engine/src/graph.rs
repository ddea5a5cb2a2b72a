//! The in-memory world graph: the single mutable state of a run.
//!
//! Entities and relationships live in ordered maps so every iteration order
//! is deterministic for a given seed. Secondary indexes (kind, kind+subtype,
//! live adjacency) are maintained on every mutation; the `links` vector on
//! each entity additionally caches every edge ever attached, archived ones
//! included, for narrative reconstruction.
//!
//! Ids are allocated from the run seed and a serial counter, never from
//! entropy, so two runs with the same seed produce byte-identical graphs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use worldloom_domain::{
    BudgetConfig, DomainError, Entity, EntityFilter, EntityId, EntityKind, EntityPatch, EventId,
    HistoryEvent, PartialEntity, PressureMap, Relationship, RelationshipId, RelationshipKind,
    RelationshipStatus, StatusLabel, Subtype, Vocabulary,
};
use worldloom_shared::ValidationStats;

use crate::control::{BudgetTracker, CooldownTracker, DiscoveryState, GrowthMetrics};

/// Query shape for relationship lookups. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct RelationshipCriteria {
    pub kind: Option<RelationshipKind>,
    pub src: Option<EntityId>,
    pub dst: Option<EntityId>,
    pub include_archived: bool,
}

impl RelationshipCriteria {
    pub fn of_kind(kind: RelationshipKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn from_entity(src: EntityId) -> Self {
        Self {
            src: Some(src),
            ..Self::default()
        }
    }

    fn matches(&self, rel: &Relationship) -> bool {
        if !self.include_archived && !rel.is_active() {
            return false;
        }
        if let Some(kind) = &self.kind {
            if rel.kind != *kind {
                return false;
            }
        }
        if let Some(src) = self.src {
            if rel.src != src {
                return false;
            }
        }
        if let Some(dst) = self.dst {
            if rel.dst != dst {
                return false;
            }
        }
        true
    }
}

/// A fully resolved relationship awaiting insertion: both endpoints are real
/// entity ids.
#[derive(Debug, Clone)]
pub struct NewRelationship {
    pub kind: RelationshipKind,
    pub src: EntityId,
    pub dst: EntityId,
    pub strength: Option<f64>,
    pub distance: Option<f64>,
    pub catalyzed_by: Option<EntityId>,
    pub category: Option<String>,
}

impl NewRelationship {
    pub fn new(kind: RelationshipKind, src: EntityId, dst: EntityId) -> Self {
        Self {
            kind,
            src,
            dst,
            strength: None,
            distance: None,
            catalyzed_by: None,
            category: None,
        }
    }
}

pub struct WorldGraph {
    seed: u64,
    tick: u64,
    current_era: String,
    vocabulary: Arc<Vocabulary>,
    entities: BTreeMap<EntityId, Entity>,
    relationships: BTreeMap<RelationshipId, Relationship>,
    by_kind: BTreeMap<EntityKind, BTreeSet<EntityId>>,
    by_kind_subtype: BTreeMap<(EntityKind, Subtype), BTreeSet<EntityId>>,
    /// Live edges only. Archival removes an edge from here but never from
    /// `relationships` or the entities' `links`.
    adjacency: BTreeMap<EntityId, BTreeSet<RelationshipId>>,
    pressures: PressureMap,
    history: Vec<HistoryEvent>,
    cooldowns: CooldownTracker,
    budgets: BudgetTracker,
    growth: GrowthMetrics,
    discovery: DiscoveryState,
    /// Explicit triggers raised by template expansions, consumed by era
    /// transition evaluation.
    triggers: BTreeSet<String>,
    validation: ValidationStats,
    entity_serial: u64,
    relationship_serial: u64,
    event_serial: u64,
}

impl WorldGraph {
    /// `budgets` should already be scaled by the global scale factor.
    pub fn new(
        seed: u64,
        vocabulary: Arc<Vocabulary>,
        initial_era: String,
        pressures: PressureMap,
        budgets: BudgetConfig,
    ) -> Self {
        Self {
            seed,
            tick: 0,
            current_era: initial_era,
            vocabulary,
            entities: BTreeMap::new(),
            relationships: BTreeMap::new(),
            by_kind: BTreeMap::new(),
            by_kind_subtype: BTreeMap::new(),
            adjacency: BTreeMap::new(),
            pressures,
            history: Vec::new(),
            cooldowns: CooldownTracker::new(),
            budgets: BudgetTracker::new(budgets),
            growth: GrowthMetrics::default(),
            discovery: DiscoveryState::default(),
            triggers: BTreeSet::new(),
            validation: ValidationStats::default(),
            entity_serial: 0,
            relationship_serial: 0,
            event_serial: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Run state
    // -------------------------------------------------------------------------

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance to the next tick, reopening all per-tick budget windows.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
        self.budgets.reset_tick();
    }

    pub fn current_era(&self) -> &str {
        &self.current_era
    }

    pub fn set_current_era(&mut self, era: impl Into<String>) {
        self.current_era = era.into();
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn pressures(&self) -> &PressureMap {
        &self.pressures
    }

    pub fn pressures_mut(&mut self) -> &mut PressureMap {
        &mut self.pressures
    }

    pub fn raise_trigger(&mut self, trigger: impl Into<String>) {
        self.triggers.insert(trigger.into());
    }

    pub fn triggers(&self) -> &BTreeSet<String> {
        &self.triggers
    }

    pub fn push_history(&mut self, event: HistoryEvent) {
        self.history.push(event);
    }

    pub fn history(&self) -> &[HistoryEvent] {
        &self.history
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    pub fn cooldowns_mut(&mut self) -> &mut CooldownTracker {
        &mut self.cooldowns
    }

    pub fn budgets(&self) -> &BudgetTracker {
        &self.budgets
    }

    pub fn budgets_mut(&mut self) -> &mut BudgetTracker {
        &mut self.budgets
    }

    pub fn growth(&self) -> &GrowthMetrics {
        &self.growth
    }

    pub fn growth_mut(&mut self) -> &mut GrowthMetrics {
        &mut self.growth
    }

    pub fn discovery(&self) -> &DiscoveryState {
        &self.discovery
    }

    pub fn discovery_mut(&mut self) -> &mut DiscoveryState {
        &mut self.discovery
    }

    pub fn validation(&self) -> &ValidationStats {
        &self.validation
    }

    pub fn validation_mut(&mut self) -> &mut ValidationStats {
        &mut self.validation
    }

    /// Deterministic event id allocation for narrative events.
    pub fn next_event_id(&mut self) -> EventId {
        self.event_serial += 1;
        EventId::from_seed(self.seed, self.event_serial)
    }

    // -------------------------------------------------------------------------
    // Entities
    // -------------------------------------------------------------------------

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn has_entity(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Total entities in the graph, retired ones included.
    pub fn entity_total(&self) -> usize {
        self.entities.len()
    }

    /// Count of non-retired entities matching the optional kind/subtype
    /// filters. Retired entities (terminal status) do not count toward
    /// population targets.
    pub fn entity_count(&self, kind: Option<&EntityKind>, subtype: Option<&Subtype>) -> usize {
        let live = |id: &EntityId| {
            self.entities.get(id).is_some_and(|e| {
                !self.vocabulary.is_terminal_status(&e.kind, &e.status)
            })
        };
        match (kind, subtype) {
            (Some(k), Some(s)) => self
                .by_kind_subtype
                .get(&(k.clone(), s.clone()))
                .map_or(0, |set| set.iter().filter(|id| live(id)).count()),
            (Some(k), None) => self
                .by_kind
                .get(k)
                .map_or(0, |set| set.iter().filter(|id| live(id)).count()),
            (None, _) => self.entities.keys().filter(|id| live(id)).count(),
        }
    }

    pub fn entities_by_kind(&self, kind: &EntityKind) -> Vec<&Entity> {
        self.by_kind.get(kind).map_or_else(Vec::new, |set| {
            set.iter().filter_map(|id| self.entities.get(id)).collect()
        })
    }

    /// Entities matching a declarative filter, in id order.
    pub fn find_entities(&self, filter: &EntityFilter) -> Vec<&Entity> {
        let candidates: Vec<&Entity> = match &filter.kind {
            Some(kind) => self.entities_by_kind(kind),
            None => self.entities.values().collect(),
        };
        candidates
            .into_iter()
            .filter(|e| {
                filter.subtype.as_ref().is_none_or(|s| e.subtype == *s)
                    && filter.status.as_ref().is_none_or(|s| e.status == *s)
                    && filter.culture.as_ref().is_none_or(|c| e.culture.as_ref() == Some(c))
                    && filter.tags.iter().all(|t| e.is_tagged(t))
            })
            .collect()
    }

    /// Entities joined to `id` by a live edge, optionally restricted to one
    /// relationship kind. Sorted, deduplicated.
    pub fn connected_entities(
        &self,
        id: EntityId,
        kind: Option<&RelationshipKind>,
    ) -> Vec<EntityId> {
        let Some(edges) = self.adjacency.get(&id) else {
            return Vec::new();
        };
        let mut out = BTreeSet::new();
        for rel_id in edges {
            let Some(rel) = self.relationships.get(rel_id) else {
                continue;
            };
            if kind.is_some_and(|k| rel.kind != *k) {
                continue;
            }
            if let Some(other) = rel.other_endpoint(id) {
                out.insert(other);
            }
        }
        out.into_iter().collect()
    }

    /// Live-edge degree of an entity.
    pub fn connection_count(&self, id: EntityId) -> usize {
        self.adjacency.get(&id).map_or(0, BTreeSet::len)
    }

    pub fn create_entity(&mut self, partial: PartialEntity) -> EntityId {
        self.entity_serial += 1;
        let id = EntityId::from_seed(self.seed, self.entity_serial);
        let entity = partial.into_entity(id, self.tick);
        self.by_kind
            .entry(entity.kind.clone())
            .or_default()
            .insert(id);
        self.by_kind_subtype
            .entry((entity.kind.clone(), entity.subtype.clone()))
            .or_default()
            .insert(id);
        self.entities.insert(id, entity);
        id
    }

    /// Merge a patch into an entity. Returns false when the entity is
    /// unknown.
    pub fn update_entity(&mut self, id: EntityId, patch: EntityPatch) -> bool {
        let tick = self.tick;
        match self.entities.get_mut(&id) {
            Some(entity) => {
                patch.apply(entity, tick);
                true
            }
            None => false,
        }
    }

    /// Retire an entity: set a terminal status and archive every live edge
    /// touching it. The entity itself stays in the graph. Returns the ids of
    /// the edges archived.
    pub fn retire_entity(&mut self, id: EntityId, status: StatusLabel) -> Vec<RelationshipId> {
        if !self.update_entity(id, EntityPatch::status(status)) {
            return Vec::new();
        }
        let live: Vec<RelationshipId> = self
            .adjacency
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for rel_id in &live {
            self.archive_relationship(*rel_id);
        }
        live
    }

    /// Hard-delete an entity and every edge touching it. Retirement is the
    /// normal path; this exists for corrections.
    pub fn remove_entity(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.remove(&id) else {
            return false;
        };
        if let Some(set) = self.by_kind.get_mut(&entity.kind) {
            set.remove(&id);
        }
        if let Some(set) = self
            .by_kind_subtype
            .get_mut(&(entity.kind.clone(), entity.subtype.clone()))
        {
            set.remove(&id);
        }
        self.adjacency.remove(&id);
        for rel_id in &entity.links {
            let Some(rel) = self.relationships.remove(rel_id) else {
                continue;
            };
            let other = if rel.src == id { rel.dst } else { rel.src };
            if let Some(set) = self.adjacency.get_mut(&other) {
                set.remove(rel_id);
            }
            if let Some(other_entity) = self.entities.get_mut(&other) {
                other_entity.links.retain(|l| l != rel_id);
            }
        }
        true
    }

    // -------------------------------------------------------------------------
    // Relationships
    // -------------------------------------------------------------------------

    pub fn relationship(&self, id: RelationshipId) -> Option<&Relationship> {
        self.relationships.get(&id)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    /// Total relationships, archived ones included.
    pub fn relationship_total(&self) -> usize {
        self.relationships.len()
    }

    /// Live relationships only.
    pub fn relationship_count(&self) -> usize {
        self.relationships.values().filter(|r| r.is_active()).count()
    }

    pub fn find_relationships(&self, criteria: &RelationshipCriteria) -> Vec<&Relationship> {
        self.relationships
            .values()
            .filter(|r| criteria.matches(r))
            .collect()
    }

    /// Every edge ever attached to an entity, archived ones included.
    pub fn entity_relationships(&self, id: EntityId) -> Vec<&Relationship> {
        self.entities.get(&id).map_or_else(Vec::new, |entity| {
            entity
                .links
                .iter()
                .filter_map(|rel_id| self.relationships.get(rel_id))
                .collect()
        })
    }

    /// Whether a live `kind` edge runs `src -> dst` (or either way for
    /// bidirectional kinds).
    pub fn has_relationship_between(
        &self,
        src: EntityId,
        dst: EntityId,
        kind: &RelationshipKind,
    ) -> bool {
        let bidirectional = self.vocabulary.is_bidirectional(kind);
        self.live_edges_between(src, dst).any(|rel| {
            rel.kind == *kind && (rel.src == src || bidirectional)
        })
    }

    /// Whether a live `kind` edge joins the pair in either direction,
    /// regardless of the kind's declared directionality. Duplicate
    /// suppression uses this.
    pub fn pair_has_kind(&self, a: EntityId, b: EntityId, kind: &RelationshipKind) -> bool {
        self.live_edges_between(a, b).any(|rel| rel.kind == *kind)
    }

    fn live_edges_between(
        &self,
        a: EntityId,
        b: EntityId,
    ) -> impl Iterator<Item = &Relationship> {
        self.adjacency
            .get(&a)
            .into_iter()
            .flatten()
            .filter_map(move |rel_id| self.relationships.get(rel_id))
            .filter(move |rel| rel.touches(b))
    }

    /// Whether a proposed `kind` edge contradicts any live edge already
    /// joining the pair, per the vocabulary's compatibility matrix.
    pub fn compatible_with_existing(
        &self,
        a: EntityId,
        b: EntityId,
        kind: &RelationshipKind,
    ) -> bool {
        self.live_edges_between(a, b)
            .all(|rel| self.vocabulary.are_compatible(&rel.kind, kind))
    }

    /// Insert a fully resolved relationship. Both endpoints must exist; the
    /// category defaults to the kind's registered category.
    pub fn insert_relationship(
        &mut self,
        new: NewRelationship,
    ) -> Result<RelationshipId, DomainError> {
        for endpoint in [new.src, new.dst] {
            if !self.entities.contains_key(&endpoint) {
                return Err(DomainError::not_found("entity", endpoint.to_string()));
            }
        }
        let category = new.category.or_else(|| {
            self.vocabulary
                .relationship_kind(&new.kind)
                .and_then(|d| d.category.clone())
        });
        self.relationship_serial += 1;
        let id = RelationshipId::from_seed(self.seed, self.relationship_serial);
        let rel = Relationship {
            id,
            kind: new.kind,
            src: new.src,
            dst: new.dst,
            strength: new.strength,
            distance: new.distance,
            catalyzed_by: new.catalyzed_by,
            category,
            created_at: self.tick,
            status: RelationshipStatus::Active,
            archived_at: None,
        };
        self.adjacency.entry(rel.src).or_default().insert(id);
        self.adjacency.entry(rel.dst).or_default().insert(id);
        for endpoint in [rel.src, rel.dst] {
            if let Some(entity) = self.entities.get_mut(&endpoint) {
                entity.links.push(id);
            }
        }
        self.relationships.insert(id, rel);
        Ok(id)
    }

    /// Nudge a live edge's strength by `delta`, clamped to [0, 1]. Edges
    /// without a strength start from 0.5. Returns the new strength, or None
    /// for unknown or archived edges.
    pub fn adjust_strength(&mut self, id: RelationshipId, delta: f64) -> Option<f64> {
        let rel = self.relationships.get_mut(&id)?;
        if !rel.is_active() {
            return None;
        }
        let next = (rel.strength.unwrap_or(0.5) + delta).clamp(0.0, 1.0);
        rel.strength = Some(next);
        Some(next)
    }

    /// Archive an edge: mark it historical and drop it from live adjacency.
    /// Returns false when the edge is unknown or already archived.
    pub fn archive_relationship(&mut self, id: RelationshipId) -> bool {
        let tick = self.tick;
        let Some(rel) = self.relationships.get_mut(&id) else {
            return false;
        };
        if !rel.is_active() {
            return false;
        }
        rel.archive(tick);
        let (src, dst) = (rel.src, rel.dst);
        for endpoint in [src, dst] {
            if let Some(set) = self.adjacency.get_mut(&endpoint) {
                set.remove(&id);
            }
        }
        true
    }
}
