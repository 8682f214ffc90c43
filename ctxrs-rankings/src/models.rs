use ctxrs_core::{GenomicRegion, RegionSet};

///
/// Full ranking of one motif over the database region universe.
///
/// `order[i]` is the universe id of the region at rank `i + 1`, i.e. region ids
/// sorted by descending motif score. `ranks` and `scores` are indexed by universe
/// id.
///
#[derive(Debug, Clone, PartialEq)]
pub struct RankingRow {
    motif: String,
    order: Vec<u32>,
    ranks: Vec<u32>,
    scores: Vec<f32>,
}

impl RankingRow {
    pub(crate) fn new(motif: String, order: Vec<u32>, ranks: Vec<u32>, scores: Vec<f32>) -> Self {
        RankingRow {
            motif,
            order,
            ranks,
            scores,
        }
    }

    pub fn motif(&self) -> &str {
        &self.motif
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Universe ids ordered by descending score.
    pub fn ordered_region_ids(&self) -> &[u32] {
        &self.order
    }

    /// 1-based rank of universe region `region_id`.
    pub fn rank(&self, region_id: usize) -> Option<u32> {
        self.ranks.get(region_id).copied()
    }

    pub fn score(&self, region_id: usize) -> Option<f32> {
        self.scores.get(region_id).copied()
    }

    pub fn ranks(&self) -> &[u32] {
        &self.ranks
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }
}

///
/// Ranks and scores of one motif restricted to the regions of a [`RankingMatrix`].
///
#[derive(Debug, Clone, Copy)]
pub struct PartialRanking<'a> {
    pub motif: &'a str,
    pub ranks: &'a [u32],
    pub scores: &'a [f32],
}

///
/// Column subset of a ranking database: every selected motif's ranks and scores
/// for the regions of one region set.
///
/// Regions keep the order of the region set they were requested for, minus any
/// region that was dropped because it is absent from the universe.
///
#[derive(Debug, Clone)]
pub struct RankingMatrix {
    motifs: Vec<String>,
    regions: RegionSet,
    region_ids: Vec<usize>,
    dropped: Vec<GenomicRegion>,
    universe_size: usize,
    ranks: Vec<u32>,
    scores: Vec<f32>,
}

impl RankingMatrix {
    pub(crate) fn new(
        motifs: Vec<String>,
        regions: RegionSet,
        region_ids: Vec<usize>,
        dropped: Vec<GenomicRegion>,
        universe_size: usize,
        ranks: Vec<u32>,
        scores: Vec<f32>,
    ) -> Self {
        RankingMatrix {
            motifs,
            regions,
            region_ids,
            dropped,
            universe_size,
            ranks,
            scores,
        }
    }

    pub fn motifs(&self) -> &[String] {
        &self.motifs
    }

    pub fn n_motifs(&self) -> usize {
        self.motifs.len()
    }

    /// The regions that were found in the universe, in request order.
    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    /// Universe ids of [`RankingMatrix::regions`], position by position.
    pub fn region_ids(&self) -> &[usize] {
        &self.region_ids
    }

    /// Requested regions absent from the universe.
    pub fn dropped(&self) -> &[GenomicRegion] {
        &self.dropped
    }

    /// Number of regions in the whole database universe.
    pub fn universe_size(&self) -> usize {
        self.universe_size
    }

    pub fn row(&self, motif_idx: usize) -> PartialRanking<'_> {
        let width = self.regions.len();
        let span = motif_idx * width..(motif_idx + 1) * width;
        PartialRanking {
            motif: &self.motifs[motif_idx],
            ranks: &self.ranks[span.clone()],
            scores: &self.scores[span],
        }
    }

    pub fn get(&self, motif: &str) -> Option<PartialRanking<'_>> {
        self.motifs
            .iter()
            .position(|m| m == motif)
            .map(|idx| self.row(idx))
    }

    pub fn rows(&self) -> impl Iterator<Item = PartialRanking<'_>> + '_ {
        (0..self.motifs.len()).map(|idx| self.row(idx))
    }
}
