//! # ctxrs-annotation
//!
//! Motif to transcription factor annotations. Each link carries a
//! [`ConfidenceTier`]: the motif is annotated to the TF directly, to an orthologue
//! of it, or only resembles a motif annotated to it.
//!
//! ```rust
//! use ctxrs_annotation::{AnnotationEntry, AnnotationResolver, ConfidenceTier};
//!
//! let resolver = AnnotationResolver::from_entries(vec![
//!     AnnotationEntry::new("m1", "TF_A", ConfidenceTier::Direct),
//!     AnnotationEntry::new("m1", "TF_B", ConfidenceTier::Orthology),
//! ]);
//!
//! assert_eq!(resolver.resolve("m1").len(), 2);
//! assert!(resolver.resolve("unannotated").is_empty());
//! ```
pub mod error;
pub mod models;
pub mod resolver;

pub use error::{AnnotationError, Result};
pub use models::{AnnotationEntry, ConfidenceTier};
pub use resolver::{AnnotationFilter, AnnotationResolver};
