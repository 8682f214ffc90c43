//! # ctxrs
//!
//! Motif enrichment of genomic region sets against ranking databases, and
//! assembly of per transcription factor cistromes from the enriched motifs.
//!
//! Each component lives in its own crate and is re-exported here behind a
//! cargo feature of the same name.
//!
#[cfg(feature = "core")]
#[doc(inline)]
pub use ctxrs_core as core;

#[cfg(feature = "rankings")]
#[doc(inline)]
pub use ctxrs_rankings as rankings;

#[cfg(feature = "annotation")]
#[doc(inline)]
pub use ctxrs_annotation as annotation;

#[cfg(feature = "enrichment")]
#[doc(inline)]
pub use ctxrs_enrichment as enrichment;

#[cfg(feature = "cistromes")]
#[doc(inline)]
pub use ctxrs_cistromes as cistromes;
