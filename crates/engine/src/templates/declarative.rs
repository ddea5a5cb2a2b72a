//! The rule interpreter: growth templates defined entirely as configuration.
//!
//! A declarative spec compiles against the custom-hook registry once, at
//! engine construction, so an unresolved hook name is a fatal configuration
//! fault before the first tick rather than a surprise mid-run.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::Rng;

use worldloom_domain::{
    ConfigError, DeclarativeTemplateSpec, EndpointRef, EntityId, EntityKind, EntityRef,
    NameSource, PartialEntity, Predicate, PickStrategy, ProposedRelationship, Subtype,
};

use crate::error::EngineError;
use crate::ports::{fallback_name, NameRequest};
use crate::templates::{Expansion, GrowthTemplate, TemplateContext, TemplateOutcome};

type PredicateFn = dyn Fn(&TemplateContext<'_>) -> bool + Send + Sync;
type SelectorFn = dyn Fn(&TemplateContext<'_>, &[EntityId]) -> Option<EntityId> + Send + Sync;

/// Named escape hatches available to declarative specs: predicates for
/// `Custom` applicability leaves and selectors for `Custom` pick strategies.
#[derive(Default, Clone)]
pub struct CustomRegistry {
    predicates: BTreeMap<String, Arc<PredicateFn>>,
    selectors: BTreeMap<String, Arc<SelectorFn>>,
}

impl CustomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_predicate(
        &mut self,
        name: impl Into<String>,
        predicate: impl Fn(&TemplateContext<'_>) -> bool + Send + Sync + 'static,
    ) {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    pub fn register_selector(
        &mut self,
        name: impl Into<String>,
        selector: impl Fn(&TemplateContext<'_>, &[EntityId]) -> Option<EntityId> + Send + Sync + 'static,
    ) {
        self.selectors.insert(name.into(), Arc::new(selector));
    }

    pub fn has_predicate(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    pub fn has_selector(&self, name: &str) -> bool {
        self.selectors.contains_key(name)
    }

    fn predicate(&self, name: &str) -> Option<&Arc<PredicateFn>> {
        self.predicates.get(name)
    }

    fn selector(&self, name: &str) -> Option<&Arc<SelectorFn>> {
        self.selectors.get(name)
    }
}

/// A compiled declarative template.
pub struct DeclarativeTemplate {
    spec: DeclarativeTemplateSpec,
    registry: Arc<CustomRegistry>,
}

impl std::fmt::Debug for DeclarativeTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeclarativeTemplate")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl DeclarativeTemplate {
    /// Resolve every custom hook the spec names. Unresolved names fail with
    /// the offending field path.
    pub fn compile(
        spec: DeclarativeTemplateSpec,
        registry: Arc<CustomRegistry>,
    ) -> Result<Self, ConfigError> {
        for name in spec.applicability.custom_names() {
            if !registry.has_predicate(&name) {
                return Err(ConfigError::new(
                    format!("declarativeTemplates.{}.applicability", spec.id),
                    format!("unresolved custom predicate {name:?}"),
                ));
            }
        }
        for (i, rule) in spec.relationships.iter().enumerate() {
            if let Some(condition) = &rule.condition {
                for name in condition.custom_names() {
                    if !registry.has_predicate(&name) {
                        return Err(ConfigError::new(
                            format!(
                                "declarativeTemplates.{}.relationships[{i}].condition",
                                spec.id
                            ),
                            format!("unresolved custom predicate {name:?}"),
                        ));
                    }
                }
            }
        }
        if let Some(selection) = &spec.selection {
            if let PickStrategy::Custom { name } = &selection.strategy {
                if !registry.has_selector(name) {
                    return Err(ConfigError::new(
                        format!("declarativeTemplates.{}.selection.strategy", spec.id),
                        format!("unresolved custom selector {name:?}"),
                    ));
                }
            }
        }
        Ok(Self { spec, registry })
    }

    fn eval(&self, predicate: &Predicate, ctx: &TemplateContext<'_>, rng: &mut StdRng) -> bool {
        match predicate {
            Predicate::All { predicates } => predicates.iter().all(|p| self.eval(p, ctx, rng)),
            Predicate::Any { predicates } => predicates.iter().any(|p| self.eval(p, ctx, rng)),
            Predicate::Not { predicate } => !self.eval(predicate, ctx, rng),
            Predicate::Pressure { gate } => gate.is_open(ctx.graph.pressures(), rng.gen()),
            Predicate::MinEntities {
                kind,
                subtype,
                count,
            } => ctx.graph.entity_count(Some(kind), subtype.as_ref()) >= *count as usize,
            Predicate::MaxEntities {
                kind,
                subtype,
                count,
            } => ctx.graph.entity_count(Some(kind), subtype.as_ref()) <= *count as usize,
            Predicate::EraIs { era } => ctx.era.name == *era,
            Predicate::NotSaturated { kind, subtype } => {
                !ctx.saturation.is_saturated(ctx.graph, kind, subtype)
            }
            Predicate::Custom { name } => self
                .registry
                .predicate(name)
                .is_some_and(|p| p(ctx)),
        }
    }

    async fn entity_name(
        &self,
        ctx: &TemplateContext<'_>,
        source: &NameSource,
        kind: &EntityKind,
        subtype: &Subtype,
        context: Option<&str>,
        serial: u64,
    ) -> String {
        match source {
            NameSource::Literal { value } => value.clone(),
            NameSource::Generated => {
                let mut request = NameRequest::new(kind.clone(), subtype.clone());
                if let Some(context) = context {
                    request = request.with_context(context);
                }
                match ctx.names.generate_one(None, &request).await {
                    Ok(name) => name,
                    Err(error) => {
                        tracing::debug!(%error, template = %self.spec.id, "name generation failed");
                        fallback_name(kind, subtype, serial)
                    }
                }
            }
        }
    }
}

#[async_trait]
impl GrowthTemplate for DeclarativeTemplate {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn produces(&self) -> Option<(&EntityKind, &Subtype)> {
        self.spec
            .produces
            .as_ref()
            .map(|p| (&p.kind, &p.subtype))
    }

    fn can_apply(&self, ctx: &TemplateContext<'_>, rng: &mut StdRng) -> bool {
        self.eval(&self.spec.applicability, ctx, rng)
    }

    fn find_targets(&self, ctx: &TemplateContext<'_>) -> Vec<EntityId> {
        let Some(selection) = &self.spec.selection else {
            return Vec::new();
        };
        let candidates: Vec<EntityId> = ctx
            .graph
            .find_entities(&selection.filter)
            .into_iter()
            .map(|e| e.id)
            .collect();
        match &selection.strategy {
            // The scheduler picks uniformly from the full candidate list.
            PickStrategy::Random => candidates,
            PickStrategy::MostConnected => candidates
                .iter()
                .copied()
                .max_by_key(|id| (ctx.graph.connection_count(*id), std::cmp::Reverse(*id)))
                .into_iter()
                .collect(),
            PickStrategy::LeastConnected => candidates
                .iter()
                .copied()
                .min_by_key(|id| (ctx.graph.connection_count(*id), *id))
                .into_iter()
                .collect(),
            PickStrategy::Custom { name } => self
                .registry
                .selector(name)
                .and_then(|s| s(ctx, &candidates))
                .into_iter()
                .collect(),
        }
    }

    async fn expand(
        &self,
        ctx: &TemplateContext<'_>,
        target: Option<EntityId>,
        rng: &mut StdRng,
    ) -> Result<TemplateOutcome, EngineError> {
        if self.spec.require_target && target.is_none() {
            return Ok(TemplateOutcome::Skipped("no eligible target".into()));
        }
        let target_name = target
            .and_then(|id| ctx.graph.entity(id))
            .map(|e| e.name.clone());

        let mut expansion = Expansion::described(self.spec.description.clone());
        for (i, rule) in self.spec.creations.iter().enumerate() {
            let name = self
                .entity_name(
                    ctx,
                    &rule.name,
                    &rule.kind,
                    &rule.subtype,
                    target_name.as_deref(),
                    ctx.graph.entity_total() as u64 + i as u64 + 1,
                )
                .await;
            let mut partial = PartialEntity::new(rule.kind.clone(), rule.subtype.clone(), name);
            if let Some(status) = &rule.status {
                partial = partial.with_status(status.clone());
            }
            if let Some(culture) = &rule.culture {
                partial = partial.with_culture(culture.clone());
            }
            for tag in &rule.tags {
                partial = partial.with_tag(tag.clone());
            }
            expansion = expansion.with_entity(partial);
        }

        for rule in &self.spec.relationships {
            if let Some(condition) = &rule.condition {
                if !self.eval(condition, ctx, rng) {
                    continue;
                }
            }
            let resolve = |endpoint: EndpointRef| -> Option<EntityRef> {
                match endpoint {
                    EndpointRef::Target => target.map(EntityRef::Existing),
                    EndpointRef::New { index } => Some(EntityRef::Pending(index)),
                }
            };
            let (Some(src), Some(dst)) = (resolve(rule.src), resolve(rule.dst)) else {
                return Ok(TemplateOutcome::Skipped(
                    "relationship rule references a missing target".into(),
                ));
            };
            let mut proposal = ProposedRelationship::new(rule.kind.clone(), src, dst);
            if let Some(strength) = rule.strength {
                proposal = proposal.with_strength(strength);
            }
            expansion = expansion.with_relationship(proposal);
        }

        for (pressure, delta) in &self.spec.pressure_deltas {
            expansion = expansion.with_pressure_delta(pressure.clone(), *delta);
        }

        if expansion.is_empty() {
            return Ok(TemplateOutcome::Skipped("rules produced nothing".into()));
        }
        Ok(TemplateOutcome::Expanded(expansion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;

    use worldloom_domain::{
        CreationRule, EntityFilter, PressureGate, RelationshipRule, SelectionSpec, SimPhase,
    };

    use crate::baseline;
    use crate::control::SaturationMonitor;
    use crate::templates::commit_expansion;

    fn kind(s: &str) -> EntityKind {
        EntityKind::new(s).unwrap()
    }

    fn subtype(s: &str) -> Subtype {
        Subtype::new(s).unwrap()
    }

    fn spec() -> DeclarativeTemplateSpec {
        DeclarativeTemplateSpec {
            id: "wanderer_arrival".into(),
            produces: Some(worldloom_domain::ProducesSpec {
                kind: kind("npc"),
                subtype: subtype("wanderer"),
            }),
            applicability: Predicate::All {
                predicates: vec![
                    Predicate::Pressure {
                        gate: PressureGate::new("wanderlust", 10.0, 100.0, 0.0),
                    },
                    Predicate::MinEntities {
                        kind: kind("location"),
                        subtype: Some(subtype("colony")),
                        count: 1,
                    },
                ],
            },
            selection: Some(SelectionSpec {
                filter: EntityFilter {
                    kind: Some(kind("location")),
                    subtype: Some(subtype("colony")),
                    ..EntityFilter::default()
                },
                strategy: PickStrategy::LeastConnected,
            }),
            require_target: true,
            creations: vec![CreationRule {
                kind: kind("npc"),
                subtype: subtype("wanderer"),
                status: None,
                culture: None,
                name: NameSource::Generated,
                tags: vec!["newcomer".into()],
            }],
            relationships: vec![RelationshipRule {
                kind: worldloom_domain::RelationshipKind::new("resident_of").unwrap(),
                src: EndpointRef::New { index: 0 },
                dst: EndpointRef::Target,
                strength: None,
                condition: None,
            }],
            description: "a wanderer settles in".into(),
            pressure_deltas: [("wanderlust".to_string(), -5.0)].into(),
        }
    }

    struct Fixture {
        graph: crate::graph::WorldGraph,
        saturation: SaturationMonitor,
        config: worldloom_domain::WorldConfig,
        names: crate::ports::SyllableNameGenerator,
    }

    impl Fixture {
        fn new() -> Self {
            let config = baseline::baseline_config("testworld", 3, 40);
            let graph = baseline::empty_graph(&config).unwrap();
            let saturation =
                SaturationMonitor::new(config.distribution_targets.clone(), config.scale_factor);
            Self {
                graph,
                saturation,
                config,
                names: crate::ports::SyllableNameGenerator::new(3),
            }
        }

        fn ctx(&self) -> TemplateContext<'_> {
            TemplateContext {
                graph: &self.graph,
                saturation: &self.saturation,
                era: &self.config.eras[0],
                config: &self.config,
                names: &self.names,
            }
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(3)
    }

    #[test]
    fn unresolved_custom_predicate_fails_compilation() {
        let mut bad = spec();
        bad.applicability = Predicate::Custom {
            name: "full_moon".into(),
        };
        let err =
            DeclarativeTemplate::compile(bad, Arc::new(CustomRegistry::new())).unwrap_err();
        assert!(err.path.contains("wanderer_arrival"));
        assert!(err.message.contains("full_moon"));
    }

    #[test]
    fn registered_custom_predicate_compiles_and_evaluates() {
        let mut registry = CustomRegistry::new();
        registry.register_predicate("always", |_| true);
        let mut with_custom = spec();
        with_custom.applicability = Predicate::Custom {
            name: "always".into(),
        };
        let template =
            DeclarativeTemplate::compile(with_custom, Arc::new(registry)).unwrap();
        let fixture = Fixture::new();
        assert!(template.can_apply(&fixture.ctx(), &mut rng()));
    }

    #[tokio::test]
    async fn interpreted_template_creates_and_wires_entities() {
        let template = DeclarativeTemplate::compile(spec(), Arc::new(CustomRegistry::new())).unwrap();
        let mut fixture = Fixture::new();

        // Applicability: needs wanderlust >= 10 and a colony.
        assert!(!template.can_apply(&fixture.ctx(), &mut rng()));
        fixture.graph.pressures_mut().set("wanderlust", 40.0);
        let colony = fixture.graph.create_entity(PartialEntity::new(
            kind("location"),
            subtype("colony"),
            "haven",
        ));
        assert!(template.can_apply(&fixture.ctx(), &mut rng()));
        assert_eq!(template.find_targets(&fixture.ctx()), vec![colony]);

        let outcome = template
            .expand(&fixture.ctx(), Some(colony), &mut rng())
            .await
            .unwrap();
        let TemplateOutcome::Expanded(expansion) = outcome else {
            panic!("expected expansion");
        };
        let committed = commit_expansion(&mut fixture.graph, expansion, SimPhase::Growth);

        assert_eq!(committed.entities.len(), 1);
        let wanderer = committed.entities[0];
        assert!(fixture.graph.entity(wanderer).unwrap().is_tagged("newcomer"));
        assert!(fixture.graph.has_relationship_between(
            wanderer,
            colony,
            &worldloom_domain::RelationshipKind::new("resident_of").unwrap()
        ));
        // Pressure delta applied on commit.
        assert_eq!(fixture.graph.pressures().get("wanderlust"), 35.0);
    }

    #[tokio::test]
    async fn require_target_without_candidates_is_a_noop() {
        let template = DeclarativeTemplate::compile(spec(), Arc::new(CustomRegistry::new())).unwrap();
        let fixture = Fixture::new();
        let outcome = template
            .expand(&fixture.ctx(), None, &mut rng())
            .await
            .unwrap();
        assert!(matches!(outcome, TemplateOutcome::Skipped(_)));
    }

    #[test]
    fn most_connected_selection_prefers_the_hub() {
        let mut with_hub = spec();
        with_hub.selection = Some(SelectionSpec {
            filter: EntityFilter {
                kind: Some(kind("npc")),
                ..EntityFilter::default()
            },
            strategy: PickStrategy::MostConnected,
        });
        let template =
            DeclarativeTemplate::compile(with_hub, Arc::new(CustomRegistry::new())).unwrap();

        let mut fixture = Fixture::new();
        let a = fixture.graph.create_entity(PartialEntity::new(
            kind("npc"),
            subtype("hero"),
            "asha",
        ));
        let b = fixture.graph.create_entity(PartialEntity::new(
            kind("npc"),
            subtype("hero"),
            "brin",
        ));
        let c = fixture.graph.create_entity(PartialEntity::new(
            kind("npc"),
            subtype("hero"),
            "cora",
        ));
        for other in [a, c] {
            fixture
                .graph
                .insert_relationship(crate::graph::NewRelationship::new(
                    worldloom_domain::RelationshipKind::new("follower_of").unwrap(),
                    other,
                    b,
                ))
                .unwrap();
        }

        assert_eq!(template.find_targets(&fixture.ctx()), vec![b]);
    }
}
