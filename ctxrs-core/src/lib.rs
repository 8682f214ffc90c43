//! # ctxrs-core
//!
//! Value types shared by every ctxrs crate: [`GenomicRegion`], [`RegionSet`] and
//! the [`IntoRegionSet`] capability used to normalize caller input, plus the
//! [`RegionIndex`] that maps arbitrary regions onto a ranking database's region
//! universe and the [`CancelToken`] threaded through long running calls.
//!
//! ## Example
//!
//! ```rust
//! use ctxrs_core::models::{IntoRegionSet, RegionSet};
//!
//! let peaks: &[(&str, u32, u32)] = &[("chr1", 100, 200), ("chr1", 100, 200), ("chr2", 5, 50)];
//! let region_set: RegionSet = peaks.into_region_set("peaks").unwrap();
//!
//! // duplicate coordinates are dropped on ingress
//! assert_eq!(region_set.len(), 2);
//! ```
//!
pub mod cancel;
pub mod errors;
pub mod index;
pub mod models;
pub mod utils;

// re-exports
pub use cancel::CancelToken;
pub use errors::{Cancelled, RegionSetError};
pub use index::{RegionIndex, RegionMapping};
pub use models::{GenomicRegion, IntoRegionSet, RegionSet, Strand};
