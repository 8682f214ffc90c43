//! # ctxrs-rankings
//!
//! On-disk ranking databases: for every motif, the rank of every region of a
//! fixed region universe when regions are ordered by descending motif score.
//!
//! A database is written once with [`RankingDbWriter`] and then opened read-only
//! as a [`RankingStore`]. The store keeps only the motif and region indices in
//! memory; rows ([`RankingStore::get_ranking`]) and column subsets
//! ([`RankingStore::get_rankings`]) are read from disk on demand.
//!
//! ## Example
//!
//! ```rust
//! use ctxrs_core::{CancelToken, GenomicRegion, RegionSet};
//! use ctxrs_rankings::{MissingRegionPolicy, RankingDbWriter, RankingStore};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("tiny.ctxdb");
//! let regions: Vec<GenomicRegion> = (0..4)
//!     .map(|i| GenomicRegion::new("chr1", i * 100, i * 100 + 50).unwrap())
//!     .collect();
//!
//! RankingDbWriter::default()
//!     .write(&path, &["m1".to_string()], &regions, &[vec![0.1, 0.9, 0.5, 0.2]])
//!     .unwrap();
//!
//! let store = RankingStore::open(&path).unwrap();
//! let query = RegionSet::new("query", vec![regions[1].clone()]);
//! let matrix = store
//!     .get_rankings(&query, MissingRegionPolicy::Drop, &CancelToken::new())
//!     .unwrap();
//!
//! assert_eq!(matrix.get("m1").unwrap().ranks, &[1]);
//! ```
//!
pub mod error;
pub mod format;
pub mod models;
pub mod store;
pub mod writer;

// re-exports
pub use error::{RankingStoreError, Result};
pub use format::FILE_EXTENSION;
pub use models::{PartialRanking, RankingMatrix, RankingRow};
pub use store::{CachePolicy, MissingRegionPolicy, RankingStore};
pub use writer::{RankingDbWriter, ScoreTable};
