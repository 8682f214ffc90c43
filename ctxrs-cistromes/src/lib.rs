//! # ctxrs-cistromes
//!
//! Cistromes: for each transcription factor, the regions its enriched motifs
//! point at, with the provenance of every region kept so callers can filter
//! by annotation tier afterwards.
//!
//! ```rust
//! use ctxrs_annotation::{AnnotationEntry, AnnotationResolver, ConfidenceTier};
//! use ctxrs_cistromes::CistromeBuilder;
//! use ctxrs_core::{GenomicRegion, RegionSet};
//! use ctxrs_enrichment::{Details, EnrichmentResult, Method, Threshold};
//!
//! let resolver = AnnotationResolver::from_entries(vec![AnnotationEntry::new(
//!     "m1",
//!     "TF_A",
//!     ConfidenceTier::Direct,
//! )]);
//! let result = EnrichmentResult {
//!     motif: "m1".to_string(),
//!     method: Method::Recovery,
//!     enrichment_score: 3.5,
//!     target_regions: RegionSet::new("peaks", vec![GenomicRegion::new("chr1", 10, 20).unwrap()]),
//!     threshold: Threshold::Rank(1),
//!     details: Details::Recovery { auc: 0.3, rank_ceiling: 5 },
//! };
//!
//! let cistromes = CistromeBuilder::new().build([&result], &resolver);
//! assert_eq!(cistromes["TF_A"].label(), "TF_A_(1r)");
//! ```
pub mod builder;
pub mod cistrome;

pub use builder::{CistromeBuilder, CistromeSplit};
pub use cistrome::{Cistrome, Provenance};
