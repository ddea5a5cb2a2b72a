//! World configuration schema and validation.
//!
//! The domain configuration is data supplied by the caller (JSON): the
//! vocabulary, eras, pressures, distribution targets, budgets, and the
//! declarative template specs. `WorldConfig::validate` checks every
//! cross-reference and fails fast with the offending field path; a run must
//! never start (or write output) from a half-valid configuration.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::era::{Era, EraSchedule, EraTransition};
use crate::error::ConfigError;
use crate::pressure::{PressureGate, PressureMap};
use crate::vocabulary::{
    Culture, EntityKind, EntityKindDef, RelationshipKind, RelationshipKindDef, StatusLabel,
    Subtype, Vocabulary,
};

// =============================================================================
// Pressures
// =============================================================================

/// A registered pressure and its starting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressureDef {
    pub name: String,
    #[serde(default)]
    pub initial: f64,
}

// =============================================================================
// Distribution targets & budgets
// =============================================================================

/// Desired population for one (kind, subtype).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    pub target: u32,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_tolerance() -> f64 {
    0.2
}

/// Per (kind, subtype) population targets plus the saturation overshoot
/// factor. Targets scale with the global scale factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionTargets {
    #[serde(default = "default_overshoot")]
    pub overshoot_factor: f64,
    #[serde(default)]
    pub targets: BTreeMap<EntityKind, BTreeMap<Subtype, TargetSpec>>,
}

impl Default for DistributionTargets {
    fn default() -> Self {
        Self {
            overshoot_factor: default_overshoot(),
            targets: BTreeMap::new(),
        }
    }
}

fn default_overshoot() -> f64 {
    1.5
}

impl DistributionTargets {
    pub fn spec(&self, kind: &EntityKind, subtype: &Subtype) -> Option<&TargetSpec> {
        self.targets.get(kind).and_then(|m| m.get(subtype))
    }

    /// Target count after applying the global scale factor.
    pub fn scaled_target(&self, kind: &EntityKind, subtype: &Subtype, scale: f64) -> Option<f64> {
        self.spec(kind, subtype)
            .map(|s| f64::from(s.target) * scale)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKind, &Subtype, &TargetSpec)> {
        self.targets
            .iter()
            .flat_map(|(k, m)| m.iter().map(move |(s, t)| (k, s, t)))
    }
}

/// Hard per-window creation ceilings. All scale with the scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetConfig {
    #[serde(default = "default_sim_budget")]
    pub max_relationships_per_simulation_tick: u32,
    #[serde(default = "default_growth_budget")]
    pub max_relationships_per_growth_phase: u32,
    #[serde(default = "default_entity_budget")]
    pub max_entities_per_growth_phase: u32,
}

fn default_sim_budget() -> u32 {
    12
}

fn default_growth_budget() -> u32 {
    16
}

fn default_entity_budget() -> u32 {
    8
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_relationships_per_simulation_tick: default_sim_budget(),
            max_relationships_per_growth_phase: default_growth_budget(),
            max_entities_per_growth_phase: default_entity_budget(),
        }
    }
}

impl BudgetConfig {
    /// Ceilings after applying the global scale factor (rounded up, min 1).
    pub fn scaled(&self, scale: f64) -> Self {
        let scale_one = |v: u32| ((f64::from(v) * scale).ceil() as u32).max(1);
        Self {
            max_relationships_per_simulation_tick: scale_one(
                self.max_relationships_per_simulation_tick,
            ),
            max_relationships_per_growth_phase: scale_one(self.max_relationships_per_growth_phase),
            max_entities_per_growth_phase: scale_one(self.max_entities_per_growth_phase),
        }
    }
}

// =============================================================================
// Growth & system tuning
// =============================================================================

/// Tuning for the relationship formation system (spec'd per pair category).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormationConfig {
    /// Global throttle: the whole system runs only on this fraction of ticks.
    #[serde(default = "default_system_chance")]
    pub system_chance: f64,
    #[serde(default = "default_friendship")]
    pub friendship_chance: f64,
    #[serde(default = "default_rivalry")]
    pub rivalry_chance: f64,
    /// Cross-faction conflict.
    #[serde(default = "default_conflict")]
    pub conflict_chance: f64,
    #[serde(default = "default_romance")]
    pub romance_chance: f64,
    /// Multipliers by faction relation between the pair.
    #[serde(default = "default_same_faction")]
    pub same_faction_multiplier: f64,
    #[serde(default = "default_allied_faction")]
    pub allied_faction_multiplier: f64,
    #[serde(default = "default_enemy_faction")]
    pub enemy_faction_multiplier: f64,
    /// Per-existing-connection damping: chance is multiplied by
    /// `1 / (1 + connections * damping)` to suppress hub concentration.
    #[serde(default = "default_damping")]
    pub connection_damping: f64,
}

fn default_system_chance() -> f64 {
    0.3
}
fn default_friendship() -> f64 {
    0.12
}
fn default_rivalry() -> f64 {
    0.08
}
fn default_conflict() -> f64 {
    0.06
}
fn default_romance() -> f64 {
    0.03
}
fn default_same_faction() -> f64 {
    1.5
}
fn default_allied_faction() -> f64 {
    1.2
}
fn default_enemy_faction() -> f64 {
    0.4
}
fn default_damping() -> f64 {
    0.25
}

impl Default for FormationConfig {
    fn default() -> Self {
        Self {
            system_chance: default_system_chance(),
            friendship_chance: default_friendship(),
            rivalry_chance: default_rivalry(),
            conflict_chance: default_conflict(),
            romance_chance: default_romance(),
            same_faction_multiplier: default_same_faction(),
            allied_faction_multiplier: default_allied_faction(),
            enemy_faction_multiplier: default_enemy_faction(),
            connection_damping: default_damping(),
        }
    }
}

/// Growth-phase tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthConfig {
    /// Template attempts per growth phase.
    #[serde(default = "default_templates_per_tick")]
    pub templates_per_tick: u32,
    #[serde(default)]
    pub formation: FormationConfig,
}

fn default_templates_per_tick() -> u32 {
    3
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            templates_per_tick: default_templates_per_tick(),
            formation: FormationConfig::default(),
        }
    }
}

/// Cooldown specialization for discovery-style templates. Templates that
/// need it fail fatally when the section is absent - never defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    pub min_ticks_between: u64,
    pub max_per_epoch: u32,
}

// =============================================================================
// Declarative templates
// =============================================================================

/// Applicability predicate tree for declarative templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Predicate {
    All {
        predicates: Vec<Predicate>,
    },
    Any {
        predicates: Vec<Predicate>,
    },
    Not {
        predicate: Box<Predicate>,
    },
    Pressure {
        #[serde(flatten)]
        gate: PressureGate,
    },
    MinEntities {
        kind: EntityKind,
        #[serde(default)]
        subtype: Option<Subtype>,
        count: u32,
    },
    MaxEntities {
        kind: EntityKind,
        #[serde(default)]
        subtype: Option<Subtype>,
        count: u32,
    },
    EraIs {
        era: String,
    },
    /// Saturation self-limit against the distribution targets.
    NotSaturated {
        kind: EntityKind,
        subtype: Subtype,
    },
    /// Escape hatch: a named predicate supplied by the domain registry.
    Custom {
        name: String,
    },
}

impl Predicate {
    /// Depth-first walk over the tree, leaves included.
    pub fn visit(&self, f: &mut impl FnMut(&Predicate)) {
        f(self);
        match self {
            Self::All { predicates } | Self::Any { predicates } => {
                for p in predicates {
                    p.visit(f);
                }
            }
            Self::Not { predicate } => predicate.visit(f),
            _ => {}
        }
    }

    /// Names of every `Custom` leaf, for fail-fast registry resolution.
    pub fn custom_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.visit(&mut |p| {
            if let Predicate::Custom { name } = p {
                names.push(name.clone());
            }
        });
        names
    }
}

/// Target filter for declarative selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityFilter {
    #[serde(default)]
    pub kind: Option<EntityKind>,
    #[serde(default)]
    pub subtype: Option<Subtype>,
    #[serde(default)]
    pub status: Option<StatusLabel>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub culture: Option<Culture>,
}

/// How to pick one target from the filtered candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "pick")]
pub enum PickStrategy {
    #[default]
    Random,
    MostConnected,
    LeastConnected,
    Custom {
        name: String,
    },
}

/// Declarative target selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSpec {
    pub filter: EntityFilter,
    #[serde(default)]
    pub strategy: PickStrategy,
}

/// Where a created entity's name comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "source")]
pub enum NameSource {
    /// Ask the name-generation collaborator (with deterministic fallback).
    Generated,
    Literal {
        value: String,
    },
}

impl Default for NameSource {
    fn default() -> Self {
        Self::Generated
    }
}

/// One entity created by a declarative template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationRule {
    pub kind: EntityKind,
    pub subtype: Subtype,
    #[serde(default)]
    pub status: Option<StatusLabel>,
    #[serde(default)]
    pub culture: Option<Culture>,
    #[serde(default)]
    pub name: NameSource,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// An endpoint of a declarative relationship rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "ref")]
pub enum EndpointRef {
    /// The selected target entity.
    Target,
    /// The Nth entity created by this template's creation rules.
    New {
        index: usize,
    },
}

/// One relationship created by a declarative template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipRule {
    pub kind: RelationshipKind,
    pub src: EndpointRef,
    pub dst: EndpointRef,
    #[serde(default)]
    pub strength: Option<f64>,
    /// Optional extra gate evaluated at expansion time.
    #[serde(default)]
    pub condition: Option<Predicate>,
}

/// A growth template expressed entirely as configuration data, interpreted
/// by the engine's rule interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarativeTemplateSpec {
    pub id: String,
    /// The (kind, subtype) this template grows, for saturation accounting.
    #[serde(default)]
    pub produces: Option<ProducesSpec>,
    pub applicability: Predicate,
    #[serde(default)]
    pub selection: Option<SelectionSpec>,
    /// When true, an empty candidate set is a no-op instead of targetless
    /// expansion.
    #[serde(default)]
    pub require_target: bool,
    #[serde(default)]
    pub creations: Vec<CreationRule>,
    #[serde(default)]
    pub relationships: Vec<RelationshipRule>,
    pub description: String,
    #[serde(default)]
    pub pressure_deltas: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducesSpec {
    pub kind: EntityKind,
    pub subtype: Subtype,
}

// =============================================================================
// WorldConfig
// =============================================================================

/// The complete domain configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldConfig {
    pub name: String,
    #[serde(default)]
    pub seed: u64,
    pub max_ticks: u64,
    #[serde(default = "default_epoch_length")]
    pub epoch_length: u64,
    /// Single float multiplying all counts and tick budgets proportionally.
    #[serde(default = "default_scale")]
    pub scale_factor: f64,
    pub entity_kinds: Vec<EntityKindDef>,
    pub relationship_kinds: Vec<RelationshipKindDef>,
    #[serde(default)]
    pub pressures: Vec<PressureDef>,
    pub eras: Vec<Era>,
    #[serde(default)]
    pub distribution_targets: DistributionTargets,
    #[serde(default)]
    pub budgets: BudgetConfig,
    #[serde(default)]
    pub growth: GrowthConfig,
    #[serde(default)]
    pub discovery: Option<DiscoveryConfig>,
    /// Registered systems, in declared execution order.
    #[serde(default)]
    pub systems: Vec<String>,
    /// Enabled imperative template ids (resolved against the engine
    /// registry).
    #[serde(default)]
    pub templates: Vec<String>,
    #[serde(default)]
    pub declarative_templates: Vec<DeclarativeTemplateSpec>,
}

fn default_epoch_length() -> u64 {
    10
}

fn default_scale() -> f64 {
    1.0
}

impl WorldConfig {
    /// Build the validated vocabulary registry.
    pub fn vocabulary(&self) -> Result<Vocabulary, ConfigError> {
        Vocabulary::from_defs(self.entity_kinds.clone(), self.relationship_kinds.clone())
    }

    /// The ordered era schedule.
    pub fn era_schedule(&self) -> EraSchedule {
        EraSchedule::new(self.eras.clone())
    }

    /// Pressures at their configured starting values.
    pub fn initial_pressures(&self) -> PressureMap {
        let mut map = PressureMap::new();
        for def in &self.pressures {
            map.set(def.name.clone(), def.initial);
        }
        map
    }

    /// Every template id known to the configuration (imperative and
    /// declarative).
    pub fn template_ids(&self) -> BTreeSet<String> {
        self.templates
            .iter()
            .cloned()
            .chain(self.declarative_templates.iter().map(|t| t.id.clone()))
            .collect()
    }

    /// Full cross-reference validation. Returns the first fault with its
    /// field path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::new("name", "world name cannot be empty"));
        }
        if self.max_ticks == 0 {
            return Err(ConfigError::new("maxTicks", "must be at least 1"));
        }
        if self.epoch_length == 0 {
            return Err(ConfigError::new("epochLength", "must be at least 1"));
        }
        if !(self.scale_factor > 0.0) {
            return Err(ConfigError::new("scaleFactor", "must be positive"));
        }
        if self.entity_kinds.is_empty() {
            return Err(ConfigError::missing("entityKinds"));
        }
        if self.eras.is_empty() {
            return Err(ConfigError::missing("eras"));
        }

        let vocabulary = self.vocabulary()?;
        let pressure_names: BTreeSet<&str> =
            self.pressures.iter().map(|p| p.name.as_str()).collect();
        if pressure_names.len() != self.pressures.len() {
            return Err(ConfigError::new("pressures", "duplicate pressure name"));
        }
        let era_names: BTreeSet<&str> = self.eras.iter().map(|e| e.name.as_str()).collect();
        if era_names.len() != self.eras.len() {
            return Err(ConfigError::new("eras", "duplicate era name"));
        }
        let template_ids = self.template_ids();
        {
            let mut seen = BTreeSet::new();
            for (i, spec) in self.declarative_templates.iter().enumerate() {
                if !seen.insert(spec.id.as_str()) {
                    return Err(ConfigError::new(
                        format!("declarativeTemplates[{i}].id"),
                        "duplicate template id",
                    ));
                }
            }
        }

        self.validate_eras(&pressure_names, &template_ids)?;
        self.validate_targets(&vocabulary)?;
        self.validate_growth()?;
        for (i, spec) in self.declarative_templates.iter().enumerate() {
            self.validate_declarative(i, spec, &vocabulary, &pressure_names, &era_names)?;
        }
        Ok(())
    }

    fn validate_eras(
        &self,
        pressures: &BTreeSet<&str>,
        template_ids: &BTreeSet<String>,
    ) -> Result<(), ConfigError> {
        for (i, era) in self.eras.iter().enumerate() {
            if !(era.intensity > 0.0) {
                return Err(ConfigError::new(
                    format!("eras[{i}].intensity"),
                    "must be positive",
                ));
            }
            for id in era.template_weights.keys() {
                if !template_ids.contains(id) {
                    return Err(ConfigError::new(
                        format!("eras[{i}].templateWeights.{id}"),
                        "unknown template id",
                    ));
                }
            }
            for id in &era.disabled_templates {
                if !template_ids.contains(id) {
                    return Err(ConfigError::new(
                        format!("eras[{i}].disabledTemplates"),
                        format!("unknown template id {id:?}"),
                    ));
                }
            }
            for (j, transition) in era.transitions.iter().enumerate() {
                let pressure = match transition {
                    EraTransition::PressureAbove { pressure, .. }
                    | EraTransition::PressureBelow { pressure, .. } => Some(pressure),
                    _ => None,
                };
                if let Some(p) = pressure {
                    if !pressures.contains(p.as_str()) {
                        return Err(ConfigError::new(
                            format!("eras[{i}].transitions[{j}].pressure"),
                            format!("unknown pressure {p:?}"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_targets(&self, vocabulary: &Vocabulary) -> Result<(), ConfigError> {
        if !(self.distribution_targets.overshoot_factor >= 1.0) {
            return Err(ConfigError::new(
                "distributionTargets.overshootFactor",
                "must be at least 1.0",
            ));
        }
        for (kind, by_subtype) in &self.distribution_targets.targets {
            let Some(def) = vocabulary.entity_kind(kind) else {
                return Err(ConfigError::new(
                    format!("distributionTargets.targets.{kind}"),
                    "unknown entity kind",
                ));
            };
            for subtype in by_subtype.keys() {
                if !def.subtypes.is_empty() && !def.subtypes.contains(subtype) {
                    return Err(ConfigError::new(
                        format!("distributionTargets.targets.{kind}.{subtype}"),
                        "subtype not registered for this kind",
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_growth(&self) -> Result<(), ConfigError> {
        let f = &self.growth.formation;
        let chances = [
            ("growth.formation.systemChance", f.system_chance),
            ("growth.formation.friendshipChance", f.friendship_chance),
            ("growth.formation.rivalryChance", f.rivalry_chance),
            ("growth.formation.conflictChance", f.conflict_chance),
            ("growth.formation.romanceChance", f.romance_chance),
        ];
        for (path, value) in chances {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::new(path, "must be within [0, 1]"));
            }
        }
        if f.connection_damping < 0.0 {
            return Err(ConfigError::new(
                "growth.formation.connectionDamping",
                "must be non-negative",
            ));
        }
        Ok(())
    }

    fn validate_declarative(
        &self,
        i: usize,
        spec: &DeclarativeTemplateSpec,
        vocabulary: &Vocabulary,
        pressures: &BTreeSet<&str>,
        eras: &BTreeSet<&str>,
    ) -> Result<(), ConfigError> {
        let base = format!("declarativeTemplates[{i}]");
        if spec.id.trim().is_empty() {
            return Err(ConfigError::new(format!("{base}.id"), "cannot be empty"));
        }

        let mut fault: Option<ConfigError> = None;
        let mut check_predicate = |path: String, predicate: &Predicate| {
            predicate.visit(&mut |p| {
                if fault.is_some() {
                    return;
                }
                match p {
                    Predicate::Pressure { gate } => {
                        if !pressures.contains(gate.pressure.as_str()) {
                            fault = Some(ConfigError::new(
                                path.clone(),
                                format!("unknown pressure {:?}", gate.pressure),
                            ));
                        }
                    }
                    Predicate::MinEntities { kind, .. }
                    | Predicate::MaxEntities { kind, .. }
                    | Predicate::NotSaturated { kind, .. } => {
                        if !vocabulary.is_entity_kind(kind) {
                            fault = Some(ConfigError::new(
                                path.clone(),
                                format!("unknown entity kind {:?}", kind.as_str()),
                            ));
                        }
                    }
                    Predicate::EraIs { era } => {
                        if !eras.contains(era.as_str()) {
                            fault = Some(ConfigError::new(
                                path.clone(),
                                format!("unknown era {era:?}"),
                            ));
                        }
                    }
                    _ => {}
                }
            });
            fault.take().map_or(Ok(()), Err)
        };

        check_predicate(format!("{base}.applicability"), &spec.applicability)?;
        for (j, rule) in spec.relationships.iter().enumerate() {
            if let Some(condition) = &rule.condition {
                check_predicate(format!("{base}.relationships[{j}].condition"), condition)?;
            }
        }

        if let Some(produces) = &spec.produces {
            if !vocabulary.is_entity_kind(&produces.kind) {
                return Err(ConfigError::new(
                    format!("{base}.produces.kind"),
                    "unknown entity kind",
                ));
            }
        }
        if let Some(selection) = &spec.selection {
            if let Some(kind) = &selection.filter.kind {
                if !vocabulary.is_entity_kind(kind) {
                    return Err(ConfigError::new(
                        format!("{base}.selection.filter.kind"),
                        "unknown entity kind",
                    ));
                }
            }
        }
        for (j, rule) in spec.creations.iter().enumerate() {
            if !vocabulary.is_entity_kind(&rule.kind) {
                return Err(ConfigError::new(
                    format!("{base}.creations[{j}].kind"),
                    "unknown entity kind",
                ));
            }
        }
        for (j, rule) in spec.relationships.iter().enumerate() {
            if vocabulary.relationship_kind(&rule.kind).is_none() {
                return Err(ConfigError::new(
                    format!("{base}.relationships[{j}].kind"),
                    "unknown relationship kind",
                ));
            }
            for (side, endpoint) in [("src", rule.src), ("dst", rule.dst)] {
                match endpoint {
                    EndpointRef::Target => {
                        if spec.selection.is_none() {
                            return Err(ConfigError::new(
                                format!("{base}.relationships[{j}].{side}"),
                                "references the target but the template has no selection",
                            ));
                        }
                    }
                    EndpointRef::New { index } => {
                        if index >= spec.creations.len() {
                            return Err(ConfigError::new(
                                format!("{base}.relationships[{j}].{side}"),
                                format!(
                                    "creation index {index} out of range ({} creations)",
                                    spec.creations.len()
                                ),
                            ));
                        }
                    }
                }
            }
        }
        for (pressure, _) in &spec.pressure_deltas {
            if !pressures.contains(pressure.as_str()) {
                return Err(ConfigError::new(
                    format!("{base}.pressureDeltas.{pressure}"),
                    "unknown pressure",
                ));
            }
        }
        Ok(())
    }
}
