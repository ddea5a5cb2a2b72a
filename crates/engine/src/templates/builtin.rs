//! The built-in imperative growth templates.
//!
//! These cover the structural beats the declarative interpreter is awkward
//! at: multi-entity founding, leadership succession with edge archival,
//! faction chartering, and rate-limited discovery.

use async_trait::async_trait;
use rand::rngs::StdRng;

use worldloom_domain::{
    ConfigError, Entity, EntityId, EntityKind, EntityRef, PartialEntity, Prominence,
    ProposedRelationship, RelationshipId, RelationshipKind, Subtype,
};

use crate::error::EngineError;
use crate::ports::{fallback_name, NameRequest};
use crate::templates::{Expansion, GrowthTemplate, TemplateContext, TemplateOutcome};

fn entity_kind(label: &str) -> EntityKind {
    EntityKind::new(label).unwrap_or_else(|_| unreachable!())
}

fn subtype(label: &str) -> Subtype {
    Subtype::new(label).unwrap_or_else(|_| unreachable!())
}

fn rel_kind(label: &str) -> RelationshipKind {
    RelationshipKind::new(label).unwrap_or_else(|_| unreachable!())
}

fn is_live(ctx: &TemplateContext<'_>, entity: &Entity) -> bool {
    !ctx.graph
        .vocabulary()
        .is_terminal_status(&entity.kind, &entity.status)
}

async fn named(
    ctx: &TemplateContext<'_>,
    request: NameRequest,
    serial: u64,
) -> String {
    match ctx.names.generate_one(None, &request).await {
        Ok(name) => name,
        Err(error) => {
            tracing::debug!(%error, kind = %request.kind, "name generation failed, using fallback");
            fallback_name(&request.kind, &request.subtype, serial)
        }
    }
}

// =============================================================================
// Settlement founding
// =============================================================================

/// Founds a new colony together with its founding mayor.
pub struct SettlementFoundingTemplate {
    location: EntityKind,
    colony: Subtype,
    npc: EntityKind,
    mayor: Subtype,
}

impl SettlementFoundingTemplate {
    pub const ID: &'static str = "settlement_founding";

    pub fn new() -> Self {
        Self {
            location: entity_kind("location"),
            colony: subtype("colony"),
            npc: entity_kind("npc"),
            mayor: subtype("mayor"),
        }
    }
}

impl Default for SettlementFoundingTemplate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GrowthTemplate for SettlementFoundingTemplate {
    fn id(&self) -> &str {
        Self::ID
    }

    fn produces(&self) -> Option<(&EntityKind, &Subtype)> {
        Some((&self.location, &self.colony))
    }

    fn can_apply(&self, ctx: &TemplateContext<'_>, _rng: &mut StdRng) -> bool {
        !ctx.saturation
            .is_saturated(ctx.graph, &self.location, &self.colony)
    }

    fn find_targets(&self, _ctx: &TemplateContext<'_>) -> Vec<EntityId> {
        Vec::new()
    }

    async fn expand(
        &self,
        ctx: &TemplateContext<'_>,
        _target: Option<EntityId>,
        _rng: &mut StdRng,
    ) -> Result<TemplateOutcome, EngineError> {
        let serial = ctx.graph.entity_total() as u64;
        let colony_name = named(
            ctx,
            NameRequest::new(self.location.clone(), self.colony.clone()),
            serial + 1,
        )
        .await;
        let mayor_name = named(
            ctx,
            NameRequest::new(self.npc.clone(), self.mayor.clone())
                .with_context(colony_name.clone()),
            serial + 2,
        )
        .await;

        let expansion = Expansion::described(format!(
            "{mayor_name} founded the colony of {colony_name}"
        ))
        .with_entity(
            PartialEntity::new(self.location.clone(), self.colony.clone(), colony_name)
                .with_tag("settlement"),
        )
        .with_entity(
            PartialEntity::new(self.npc.clone(), self.mayor.clone(), mayor_name)
                .with_prominence(Prominence::Recognized)
                .with_tag("founder"),
        )
        .with_relationship(
            ProposedRelationship::new(rel_kind("leader_of"), EntityRef::Pending(1), EntityRef::Pending(0))
                .with_strength(0.8),
        )
        .with_relationship(ProposedRelationship::new(
            rel_kind("resident_of"),
            EntityRef::Pending(1),
            EntityRef::Pending(0),
        ))
        .with_pressure_delta("prosperity", 3.0);

        Ok(TemplateOutcome::Expanded(expansion))
    }
}

// =============================================================================
// Succession
// =============================================================================

/// Installs a new leader over a settlement whose leadership has lapsed,
/// archiving any stale leadership edge.
pub struct SuccessionTemplate {
    location: EntityKind,
    npc: EntityKind,
    mayor: Subtype,
    leader_of: RelationshipKind,
}

impl SuccessionTemplate {
    pub const ID: &'static str = "succession";

    pub fn new() -> Self {
        Self {
            location: entity_kind("location"),
            npc: entity_kind("npc"),
            mayor: subtype("mayor"),
            leader_of: rel_kind("leader_of"),
        }
    }

    /// The most recent leadership edge ever attached to a location, live or
    /// archived, and whether a live one exists.
    fn leadership(
        &self,
        ctx: &TemplateContext<'_>,
        location: EntityId,
    ) -> (Option<RelationshipId>, bool) {
        let mut latest: Option<(u64, RelationshipId)> = None;
        let mut has_live = false;
        for rel in ctx.graph.entity_relationships(location) {
            if rel.kind != self.leader_of || rel.dst != location {
                continue;
            }
            if rel.is_active() {
                has_live = true;
            }
            if latest.is_none_or(|(tick, _)| rel.created_at >= tick) {
                latest = Some((rel.created_at, rel.id));
            }
        }
        (latest.map(|(_, id)| id), has_live)
    }
}

impl Default for SuccessionTemplate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GrowthTemplate for SuccessionTemplate {
    fn id(&self) -> &str {
        Self::ID
    }

    fn can_apply(&self, ctx: &TemplateContext<'_>, _rng: &mut StdRng) -> bool {
        !self.find_targets(ctx).is_empty()
    }

    /// Locations that once had a leader but currently have none.
    fn find_targets(&self, ctx: &TemplateContext<'_>) -> Vec<EntityId> {
        ctx.graph
            .entities_by_kind(&self.location)
            .into_iter()
            .filter(|e| is_live(ctx, e))
            .filter(|e| {
                let (latest, has_live) = self.leadership(ctx, e.id);
                latest.is_some() && !has_live
            })
            .map(|e| e.id)
            .collect()
    }

    async fn expand(
        &self,
        ctx: &TemplateContext<'_>,
        target: Option<EntityId>,
        _rng: &mut StdRng,
    ) -> Result<TemplateOutcome, EngineError> {
        let Some(location_id) = target else {
            return Ok(TemplateOutcome::Skipped("no leaderless settlement".into()));
        };
        let Some(location) = ctx.graph.entity(location_id) else {
            return Ok(TemplateOutcome::Skipped("target vanished".into()));
        };
        let (latest, has_live) = self.leadership(ctx, location_id);
        if has_live {
            return Ok(TemplateOutcome::Skipped("leadership already filled".into()));
        }
        let Some(previous_edge) = latest else {
            return Ok(TemplateOutcome::Skipped("settlement never had a leader".into()));
        };

        // Inherit the predecessor's subtype where known.
        let predecessor = ctx
            .graph
            .relationship(previous_edge)
            .map(|r| r.src)
            .and_then(|id| ctx.graph.entity(id));
        let successor_subtype = predecessor
            .map(|p| p.subtype.clone())
            .unwrap_or_else(|| self.mayor.clone());

        let name = named(
            ctx,
            NameRequest::new(self.npc.clone(), successor_subtype.clone())
                .with_context(location.name.clone()),
            ctx.graph.entity_total() as u64 + 1,
        )
        .await;

        let mut expansion = Expansion::described(format!(
            "{name} rose to lead {location}",
            location = location.name
        ))
        .with_entity(
            PartialEntity::new(self.npc.clone(), successor_subtype, name)
                .with_prominence(Prominence::Recognized),
        )
        .with_relationship(
            {
                let mut rel = ProposedRelationship::new(
                    self.leader_of.clone(),
                    EntityRef::Pending(0),
                    location_id,
                )
                .with_strength(0.7);
                if let Some(p) = predecessor {
                    rel = rel.catalyzed_by(p.id);
                }
                rel
            },
        )
        .with_relationship(ProposedRelationship::new(
            rel_kind("resident_of"),
            EntityRef::Pending(0),
            location_id,
        ))
        .with_pressure_delta("strife", -2.0);

        // Archive any stale (already-archived edges are no-ops) leadership
        // edge so exactly one live edge remains after commit.
        expansion = expansion.archiving(previous_edge);
        Ok(TemplateOutcome::Expanded(expansion))
    }
}

// =============================================================================
// Faction emergence
// =============================================================================

/// A renowned figure charters a new faction around themselves.
pub struct FactionEmergenceTemplate {
    faction: EntityKind,
    guild: Subtype,
    npc: EntityKind,
}

impl FactionEmergenceTemplate {
    pub const ID: &'static str = "faction_emergence";

    pub fn new() -> Self {
        Self {
            faction: entity_kind("faction"),
            guild: subtype("guild"),
            npc: entity_kind("npc"),
        }
    }
}

impl Default for FactionEmergenceTemplate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GrowthTemplate for FactionEmergenceTemplate {
    fn id(&self) -> &str {
        Self::ID
    }

    fn produces(&self) -> Option<(&EntityKind, &Subtype)> {
        Some((&self.faction, &self.guild))
    }

    fn can_apply(&self, ctx: &TemplateContext<'_>, _rng: &mut StdRng) -> bool {
        !ctx.saturation
            .is_saturated(ctx.graph, &self.faction, &self.guild)
            && !self.find_targets(ctx).is_empty()
    }

    fn find_targets(&self, ctx: &TemplateContext<'_>) -> Vec<EntityId> {
        ctx.graph
            .entities_by_kind(&self.npc)
            .into_iter()
            .filter(|e| is_live(ctx, e) && e.prominence >= Prominence::Renowned)
            .map(|e| e.id)
            .collect()
    }

    async fn expand(
        &self,
        ctx: &TemplateContext<'_>,
        target: Option<EntityId>,
        _rng: &mut StdRng,
    ) -> Result<TemplateOutcome, EngineError> {
        let Some(charterer) = target.and_then(|id| ctx.graph.entity(id)) else {
            return Ok(TemplateOutcome::Skipped("no renowned charterer".into()));
        };

        let name = named(
            ctx,
            NameRequest::new(self.faction.clone(), self.guild.clone())
                .with_context(charterer.name.clone()),
            ctx.graph.entity_total() as u64 + 1,
        )
        .await;

        let expansion = Expansion::described(format!(
            "{founder} chartered the {name}",
            founder = charterer.name
        ))
        .with_entity(PartialEntity::new(
            self.faction.clone(),
            self.guild.clone(),
            name,
        ))
        .with_relationship(
            ProposedRelationship::new(rel_kind("leader_of"), charterer.id, EntityRef::Pending(0))
                .with_strength(0.9),
        )
        .with_relationship(ProposedRelationship::new(
            rel_kind("member_of"),
            charterer.id,
            EntityRef::Pending(0),
        ))
        .with_pressure_delta("strife", 1.0);

        Ok(TemplateOutcome::Expanded(expansion))
    }
}

// =============================================================================
// Emergent discovery
// =============================================================================

/// A rate-limited discovery of a new technique by a living figure. Requires
/// the discovery configuration section; its absence is a fatal fault at
/// first use rather than a silently defaulted limit.
pub struct EmergentDiscoveryTemplate {
    abilities: EntityKind,
    technique: Subtype,
    npc: EntityKind,
}

impl EmergentDiscoveryTemplate {
    pub const ID: &'static str = "emergent_discovery";

    pub fn new() -> Self {
        Self {
            abilities: entity_kind("abilities"),
            technique: subtype("technique"),
            npc: entity_kind("npc"),
        }
    }
}

impl Default for EmergentDiscoveryTemplate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GrowthTemplate for EmergentDiscoveryTemplate {
    fn id(&self) -> &str {
        Self::ID
    }

    fn produces(&self) -> Option<(&EntityKind, &Subtype)> {
        Some((&self.abilities, &self.technique))
    }

    fn can_apply(&self, ctx: &TemplateContext<'_>, _rng: &mut StdRng) -> bool {
        let spaced = match &ctx.config.discovery {
            Some(config) => ctx.graph.discovery().can_discover(ctx.graph.tick(), config),
            // Missing config becomes a fatal fault in expand.
            None => true,
        };
        spaced
            && !ctx
                .saturation
                .is_saturated(ctx.graph, &self.abilities, &self.technique)
            && !self.find_targets(ctx).is_empty()
    }

    fn find_targets(&self, ctx: &TemplateContext<'_>) -> Vec<EntityId> {
        ctx.graph
            .entities_by_kind(&self.npc)
            .into_iter()
            .filter(|e| is_live(ctx, e))
            .map(|e| e.id)
            .collect()
    }

    async fn expand(
        &self,
        ctx: &TemplateContext<'_>,
        target: Option<EntityId>,
        _rng: &mut StdRng,
    ) -> Result<TemplateOutcome, EngineError> {
        if ctx.config.discovery.is_none() {
            return Err(EngineError::Config(ConfigError::missing("discovery")));
        }
        let Some(discoverer) = target.and_then(|id| ctx.graph.entity(id)) else {
            return Ok(TemplateOutcome::Skipped("no living discoverer".into()));
        };

        let name = named(
            ctx,
            NameRequest::new(self.abilities.clone(), self.technique.clone())
                .with_context(discoverer.name.clone()),
            ctx.graph.entity_total() as u64 + 1,
        )
        .await;

        let expansion = Expansion::described(format!(
            "{who} discovered the technique of {name}",
            who = discoverer.name
        ))
        .with_entity(PartialEntity::new(
            self.abilities.clone(),
            self.technique.clone(),
            name,
        ))
        .with_relationship(ProposedRelationship::new(
            rel_kind("discovered_by"),
            EntityRef::Pending(0),
            discoverer.id,
        ))
        .with_pressure_delta("wanderlust", -4.0)
        .marking_discovery();

        Ok(TemplateOutcome::Expanded(expansion))
    }
}
