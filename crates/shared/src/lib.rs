//! WorldLoom shared wire contracts.
//!
//! The export format and the optimizer statistics format are consumed by
//! external tools (visualization, lore explorers, the GA parameter
//! optimizer). Field names and nesting are part of the contract and must be
//! preserved exactly; every struct here serializes camelCase.

pub mod export;
pub mod stats;

pub use export::{ExportMetadata, WorldExport};
pub use stats::{FitnessMetrics, PerformanceStats, SimulationStatistics, ValidationStats};
