//! # ctxrs-enrichment
//!
//! Motif enrichment of genomic region sets against a ranking database.
//!
//! Two engines share one result type, [`MotifEnrichment`]:
//!
//! - [`EnrichmentEngine`]: rank recovery. A motif's AUC over the top ranks is
//!   normalized against the AUCs of an explicit background motif universe (NES).
//! - [`DifferentialEnrichmentEngine`]: a direct comparison of a motif's scores
//!   over a foreground and a background region set.
//!
//! Both run in parallel across motifs and always return results in the same
//! order, best first. [`run_batch`] runs many region sets at once and isolates
//! failures per region set.
//!
pub mod batch;
pub mod config;
pub mod differential;
pub mod error;
pub mod recovery;
pub mod result;

// re-exports
pub use batch::{BatchOutcome, run_batch, unique_names};
pub use config::{ConfigError, EnrichmentConfig, RunConfig};
pub use differential::{
    DifferentialEnrichmentEngine, DifferentialParams, TargetCutoff, mann_whitney_greater,
};
pub use error::{EnrichmentError, Result};
pub use recovery::{Background, EnrichmentEngine, LeadingEdge, RecoveryParams};
pub use result::{
    Details, EnrichmentResult, ExcludedMotif, ExclusionReason, Method, MotifEnrichment, Threshold,
    translate_targets,
};
