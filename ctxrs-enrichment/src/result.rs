use std::cmp::Ordering;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use ctxrs_core::{RegionMapping, RegionSet};

/// Which engine produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Method {
    /// Rank recovery against a background motif distribution.
    #[serde(rename = "cistarget")]
    Recovery,
    /// Direct foreground versus background score comparison.
    #[serde(rename = "dem")]
    Differential,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Recovery => "cistarget",
            Method::Differential => "dem",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cutoff that selected a result's target regions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Threshold {
    /// Regions ranked at or above this rank.
    Rank(u32),
    /// Regions scoring above this value.
    Score(f32),
}

/// Engine specific statistics of a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method")]
pub enum Details {
    #[serde(rename = "cistarget")]
    Recovery {
        auc: f64,
        /// Rank ceiling the AUC was computed up to.
        rank_ceiling: u32,
    },
    #[serde(rename = "dem")]
    Differential {
        log2fc: f64,
        pvalue: f64,
        adjusted_pvalue: f64,
        mean_foreground: f64,
        mean_background: f64,
    },
}

///
/// One enriched motif.
///
/// `enrichment_score` is the NES for rank recovery and the log2 fold change for
/// the differential engine; scores only compare within one run.
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentResult {
    pub motif: String,
    pub method: Method,
    pub enrichment_score: f64,
    pub target_regions: RegionSet,
    pub threshold: Threshold,
    pub details: Details,
}

impl EnrichmentResult {
    /// Descending score, then motif name.
    pub(crate) fn ranking_order(a: &EnrichmentResult, b: &EnrichmentResult) -> Ordering {
        b.enrichment_score
            .total_cmp(&a.enrichment_score)
            .then_with(|| a.motif.cmp(&b.motif))
    }
}

/// Why a motif took no part in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExclusionReason {
    /// The background AUC distribution has zero variance.
    ZeroVariance,
    /// The motif scores every region identically.
    ConstantScores,
    /// Enriched by NES, but no query region ranks within the rank threshold.
    NoLeadingEdge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedMotif {
    pub motif: String,
    pub reason: ExclusionReason,
}

///
/// Outcome of one engine run over one region set.
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotifEnrichment {
    /// Name of the region set the run was for.
    pub region_set: String,
    pub method: Method,
    /// Regions of the input that were found in the ranking database.
    pub n_regions: usize,
    pub universe_size: usize,
    /// Number of motifs that received a score.
    pub n_tested: usize,
    /// Enriched motifs, best first.
    pub results: Vec<EnrichmentResult>,
    pub excluded: Vec<ExcludedMotif>,
}

impl MotifEnrichment {
    pub fn get(&self, motif: &str) -> Option<&EnrichmentResult> {
        self.results.iter().find(|r| r.motif == motif)
    }

    pub fn motifs(&self) -> impl Iterator<Item = &str> + '_ {
        self.results.iter().map(|r| r.motif.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

///
/// Re-express a result's target regions in the caller's own coordinates.
///
/// Engines report universe regions; `mapping` links them back to the query
/// regions they were mapped from.
///
pub fn translate_targets(result: &EnrichmentResult, mapping: &RegionMapping) -> EnrichmentResult {
    EnrichmentResult {
        target_regions: mapping.to_query(&result.target_regions),
        ..result.clone()
    }
}

impl MotifEnrichment {
    /// Every result with [`translate_targets`] applied.
    pub fn translated(&self, mapping: &RegionMapping) -> MotifEnrichment {
        MotifEnrichment {
            results: self
                .results
                .iter()
                .map(|r| translate_targets(r, mapping))
                .collect(),
            ..self.clone()
        }
    }
}
