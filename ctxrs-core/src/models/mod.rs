pub mod region;
pub mod region_set;

// re-export for cleaner imports
pub use self::region::{GenomicRegion, Strand};
pub use self::region_set::{IntoRegionSet, RegionSet};
