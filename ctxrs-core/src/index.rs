//! Interval index over a fixed region universe.
//!
//! Ranking databases score a fixed universe of regions, while callers bring
//! regions from their own peak calls. [`RegionIndex`] finds, for a query region,
//! the universe regions it overlaps using a per-chromosome binary interval
//! search: intervals sorted by start, plus the longest interval length so the
//! search can start at `query.start - max_len`.

use fxhash::FxHashMap;

use crate::models::{GenomicRegion, RegionSet};

#[derive(Debug, Clone)]
struct IndexedInterval {
    start: u32,
    end: u32,
    id: usize,
}

#[derive(Debug, Clone, Default)]
struct ChromIndex {
    intervals: Vec<IndexedInterval>,
    max_len: u32,
}

impl ChromIndex {
    /// First position whose start is not below `start`.
    fn lower_bound(&self, start: u32) -> usize {
        self.intervals.partition_point(|iv| iv.start < start)
    }

    fn find(&self, start: u32, end: u32) -> impl Iterator<Item = &IndexedInterval> + '_ {
        let offset = self.lower_bound(start.saturating_sub(self.max_len));
        self.intervals[offset..]
            .iter()
            .take_while(move |iv| iv.start < end)
            .filter(move |iv| iv.end > start)
    }
}

///
/// Overlap index over an ordered universe of regions. Region ids are positions in
/// the universe.
///
#[derive(Debug, Clone)]
pub struct RegionIndex {
    regions: Vec<GenomicRegion>,
    chroms: FxHashMap<String, ChromIndex>,
}

impl RegionIndex {
    pub fn new(regions: Vec<GenomicRegion>) -> Self {
        let mut chroms: FxHashMap<String, ChromIndex> = FxHashMap::default();

        for (id, region) in regions.iter().enumerate() {
            let chrom = chroms.entry(region.chr().to_string()).or_default();
            chrom.max_len = chrom.max_len.max(region.width());
            chrom.intervals.push(IndexedInterval {
                start: region.start(),
                end: region.end(),
                id,
            });
        }
        for chrom in chroms.values_mut() {
            chrom
                .intervals
                .sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));
        }

        RegionIndex { regions, chroms }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn region(&self, id: usize) -> Option<&GenomicRegion> {
        self.regions.get(id)
    }

    ///
    /// Ids of universe regions overlapping `query` by at least one base, in
    /// ascending id order.
    ///
    pub fn find(&self, query: &GenomicRegion) -> Vec<usize> {
        let mut hits: Vec<usize> = match self.chroms.get(query.chr()) {
            Some(chrom) => chrom
                .find(query.start(), query.end())
                .map(|iv| iv.id)
                .collect(),
            None => Vec::new(),
        };
        hits.sort_unstable();
        hits
    }

    ///
    /// Link every query region to the universe regions it overlaps.
    ///
    /// A pair is kept when the shared bases cover at least `fraction_overlap` of
    /// either the query or the universe region.
    ///
    pub fn map_regions(&self, query: &RegionSet, fraction_overlap: f64) -> RegionMapping {
        let mut links: Vec<(GenomicRegion, GenomicRegion)> = Vec::new();
        let mut unmapped: Vec<GenomicRegion> = Vec::new();

        for region in query {
            let mut linked = false;
            for id in self.find(region) {
                let target = &self.regions[id];
                let shared = region.overlap(target) as f64;
                let query_fraction = shared / region.width() as f64;
                let target_fraction = shared / target.width() as f64;
                if shared > 0.0
                    && (query_fraction >= fraction_overlap || target_fraction >= fraction_overlap)
                {
                    links.push((region.clone(), target.clone()));
                    linked = true;
                }
            }
            if !linked {
                unmapped.push(region.clone());
            }
        }

        let universe_set = RegionSet::new(
            query.name(),
            links.iter().map(|(_, target)| target.clone()),
        );

        RegionMapping {
            links,
            universe_set,
            unmapped,
        }
    }
}

///
/// Result of mapping a caller's region set onto a region universe.
///
#[derive(Debug, Clone)]
pub struct RegionMapping {
    links: Vec<(GenomicRegion, GenomicRegion)>,
    universe_set: RegionSet,
    unmapped: Vec<GenomicRegion>,
}

impl RegionMapping {
    ///
    /// The universe regions hit by the query, named after the query set.
    ///
    pub fn universe_regions(&self) -> &RegionSet {
        &self.universe_set
    }

    ///
    /// Query regions that did not overlap any universe region.
    ///
    pub fn unmapped(&self) -> &[GenomicRegion] {
        &self.unmapped
    }

    ///
    /// `(query, universe)` pairs, in query order.
    ///
    pub fn links(&self) -> &[(GenomicRegion, GenomicRegion)] {
        &self.links
    }

    ///
    /// Translate universe regions back to the query regions linked to them.
    ///
    pub fn to_query(&self, universe_regions: &RegionSet) -> RegionSet {
        RegionSet::new(
            universe_regions.name(),
            self.links
                .iter()
                .filter(|(_, target)| universe_regions.contains(target))
                .map(|(query, _)| query.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;

    fn region(chr: &str, start: u32, end: u32) -> GenomicRegion {
        GenomicRegion::new(chr, start, end).unwrap()
    }

    #[fixture]
    fn universe() -> RegionIndex {
        RegionIndex::new(vec![
            region("chr1", 0, 100),
            region("chr1", 100, 200),
            region("chr1", 150, 1150),
            region("chr2", 0, 100),
        ])
    }

    #[rstest]
    fn test_find(universe: RegionIndex) {
        assert_eq!(universe.find(&region("chr1", 50, 120)), vec![0, 1]);
        assert_eq!(universe.find(&region("chr1", 1000, 1001)), vec![2]);
        assert_eq!(universe.find(&region("chr1", 2000, 2100)), Vec::<usize>::new());
        assert_eq!(universe.find(&region("chr3", 0, 100)), Vec::<usize>::new());
    }

    #[rstest]
    fn test_map_regions_with_fraction(universe: RegionIndex) {
        let query = RegionSet::new(
            "query",
            vec![
                // 90% of the query lies in region 0, 10% in region 1
                region("chr1", 10, 110),
                region("chr2", 90, 95),
                region("chr5", 0, 10),
            ],
        );

        let mapping = universe.map_regions(&query, 0.4);
        let ids: Vec<String> = mapping
            .universe_regions()
            .iter()
            .map(|r| r.region_id())
            .collect();
        assert_eq!(ids, vec!["chr1:0-100", "chr2:0-100"]);
        assert_eq!(mapping.unmapped(), &[region("chr5", 0, 10)]);

        let back = mapping.to_query(&RegionSet::new("hits", vec![region("chr1", 0, 100)]));
        assert_eq!(back.regions(), &[region("chr1", 10, 110)]);
    }

    #[rstest]
    fn test_map_regions_without_fraction(universe: RegionIndex) {
        let query = RegionSet::new("query", vec![region("chr1", 10, 110)]);
        let mapping = universe.map_regions(&query, 0.0);
        assert_eq!(mapping.universe_regions().len(), 2);
    }
}
