//! WorldLoom domain layer.
//!
//! Pure domain types for the world-generation simulation: entities,
//! relationships, vocabulary, pressures, eras, narrative events, and the
//! world configuration schema with its validation rules. No I/O, no
//! randomness - probability rolls and clocks are injected by the engine.

extern crate self as worldloom_domain;

pub mod config;
pub mod entity;
pub mod era;
pub mod error;
pub mod events;
pub mod ids;
pub mod pressure;
pub mod relationship;
pub mod vocabulary;

pub use config::{
    BudgetConfig, CreationRule, DeclarativeTemplateSpec, DiscoveryConfig, DistributionTargets,
    EndpointRef, EntityFilter, FormationConfig, GrowthConfig, NameSource, PickStrategy, Predicate,
    PressureDef, ProducesSpec, RelationshipRule, SelectionSpec, TargetSpec, WorldConfig,
};
pub use entity::{Catalyst, Coordinates, Entity, EntityPatch, PartialEntity, Prominence, TemporalSpan};
pub use era::{Era, EraSchedule, EraTransition};
pub use error::{ConfigError, DomainError};
pub use events::{HistoryEvent, NarrativeEvent, SimPhase};
pub use ids::{EntityId, EventId, RelationshipId, RunId};
pub use pressure::{PressureGate, PressureMap};
pub use relationship::{EntityRef, ProposedRelationship, Relationship, RelationshipStatus};
pub use vocabulary::{
    Culture, EntityKind, EntityKindDef, RelationshipKind, RelationshipKindDef, StatusLabel,
    Subtype, Vocabulary,
};
