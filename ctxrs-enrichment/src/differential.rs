//! Differential motif enrichment: foreground against background motif scores.

use std::cmp::Ordering;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use ctxrs_core::{CancelToken, RegionSet};
use ctxrs_rankings::{MissingRegionPolicy, RankingStore};

use crate::error::{EnrichmentError, Result};
use crate::result::{
    Details, EnrichmentResult, ExcludedMotif, ExclusionReason, Method, MotifEnrichment, Threshold,
};

/// Score cutoff selecting the target regions of an enriched motif.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetCutoff {
    /// Foreground regions scoring above this quantile of the background scores.
    BackgroundPercentile(f64),
    /// Foreground regions scoring at or above the score maximizing Youden's J.
    Youden,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifferentialParams {
    pub adjusted_pvalue_threshold: f64,
    pub log2fc_threshold: f64,
    pub target_cutoff: TargetCutoff,
    /// Fewest foreground and background regions a run needs.
    pub min_regions: usize,
    /// Added to both means before taking the fold change; must be positive.
    pub pseudocount: f64,
}

impl Default for DifferentialParams {
    fn default() -> Self {
        DifferentialParams {
            adjusted_pvalue_threshold: 0.05,
            log2fc_threshold: 1.0,
            target_cutoff: TargetCutoff::BackgroundPercentile(0.95),
            min_regions: 1,
            pseudocount: 1e-3,
        }
    }
}

impl DifferentialParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.adjusted_pvalue_threshold) {
            return Err(EnrichmentError::InvalidParameter(format!(
                "adjusted_pvalue_threshold must be in [0, 1], got {}",
                self.adjusted_pvalue_threshold
            )));
        }
        if !self.log2fc_threshold.is_finite() {
            return Err(EnrichmentError::InvalidParameter(
                "log2fc_threshold must be finite".to_string(),
            ));
        }
        if let TargetCutoff::BackgroundPercentile(p) = self.target_cutoff {
            if !(0.0..=1.0).contains(&p) {
                return Err(EnrichmentError::InvalidParameter(format!(
                    "background percentile must be in [0, 1], got {p}"
                )));
            }
        }
        if !(self.pseudocount > 0.0) {
            return Err(EnrichmentError::InvalidParameter(
                "pseudocount must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

///
/// Differential enrichment engine.
///
/// Compares each motif's scores over foreground regions with its scores over
/// background regions using a one-sided Mann-Whitney U test, corrected for
/// multiple testing with Benjamini-Hochberg across the tested motifs.
///
#[derive(Debug, Clone, Default)]
pub struct DifferentialEnrichmentEngine {
    params: DifferentialParams,
    candidates: Option<Vec<String>>,
    missing_regions: MissingRegionPolicy,
}

/// Per motif test outcome, before multiple testing correction.
struct MotifTest {
    pvalue: f64,
    log2fc: f64,
    mean_foreground: f64,
    mean_background: f64,
}

impl DifferentialEnrichmentEngine {
    pub fn new(params: DifferentialParams) -> Self {
        DifferentialEnrichmentEngine {
            params,
            ..Default::default()
        }
    }

    /// Only test these motifs. Defaults to every motif of the database.
    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = Some(candidates);
        self
    }

    pub fn with_missing_regions(mut self, policy: MissingRegionPolicy) -> Self {
        self.missing_regions = policy;
        self
    }

    pub fn params(&self) -> &DifferentialParams {
        &self.params
    }

    ///
    /// Test every candidate motif for higher scores over `foreground` than over
    /// `background`.
    ///
    /// Regions present in both sets count as foreground only.
    ///
    pub fn run(
        &self,
        store: &RankingStore,
        foreground: &RegionSet,
        background: &RegionSet,
        cancel: &CancelToken,
    ) -> Result<MotifEnrichment> {
        self.params.validate()?;
        if foreground.is_empty() {
            return Err(EnrichmentError::EmptyRegionSet(foreground.name().to_string()));
        }
        let background_only = background.difference(foreground);
        if background_only.is_empty() {
            return Err(EnrichmentError::EmptyRegionSet(background.name().to_string()));
        }
        cancel.check()?;

        let union = RegionSet::new(
            foreground.name(),
            foreground.iter().chain(background_only.iter()).cloned(),
        );
        let motifs = match &self.candidates {
            Some(candidates) => candidates.clone(),
            None => store.motifs().to_vec(),
        };
        let matrix = store.get_rankings_for_motifs(&union, &motifs, self.missing_regions, cancel)?;

        let (fg_cols, bg_cols): (Vec<usize>, Vec<usize>) =
            (0..matrix.regions().len()).partition(|col| foreground.contains(&matrix.regions().regions()[*col]));

        let min_regions = self.params.min_regions.max(1);
        if fg_cols.len() < min_regions {
            return Err(EnrichmentError::EmptyRegionSet(foreground.name().to_string()));
        }
        if bg_cols.len() < min_regions {
            return Err(EnrichmentError::EmptyRegionSet(background.name().to_string()));
        }

        info!(
            "Running differential enrichment of {} ({} regions) against {} ({} regions)",
            foreground.name(),
            fg_cols.len(),
            background.name(),
            bg_cols.len()
        );

        let tests = (0..matrix.n_motifs())
            .into_par_iter()
            .map(|idx| {
                cancel.check()?;
                let row = matrix.row(idx);
                let fg: Vec<f64> = fg_cols.iter().map(|c| row.scores[*c] as f64).collect();
                let bg: Vec<f64> = bg_cols.iter().map(|c| row.scores[*c] as f64).collect();
                Ok(self.test_motif(&fg, &bg))
            })
            .collect::<Result<Vec<Option<MotifTest>>>>()?;

        let mut excluded = Vec::new();
        let mut tested = Vec::new();
        for (idx, test) in tests.into_iter().enumerate() {
            match test {
                Some(test) => tested.push((idx, test)),
                None => excluded.push(ExcludedMotif {
                    motif: matrix.motifs()[idx].clone(),
                    reason: ExclusionReason::ConstantScores,
                }),
            }
        }
        if !excluded.is_empty() {
            warn!(
                "{}: {} motifs score every region identically and were not tested",
                foreground.name(),
                excluded.len()
            );
        }
        excluded.sort_by(|a, b| a.motif.cmp(&b.motif));

        let pvalues: Vec<f64> = tested.iter().map(|(_, t)| t.pvalue).collect();
        let adjusted = if pvalues.is_empty() {
            Vec::new()
        } else {
            adjustp::adjust(&pvalues, adjustp::Procedure::BenjaminiHochberg)
        };

        let mut results = Vec::new();
        for ((idx, test), adjusted_pvalue) in tested.iter().zip(adjusted) {
            let enriched = adjusted_pvalue <= self.params.adjusted_pvalue_threshold
                && test.log2fc.is_finite()
                && test.log2fc >= self.params.log2fc_threshold;
            let row = matrix.row(*idx);
            debug!(
                "{}: log2fc {:.3}, p {:.3e}, adjusted p {:.3e}",
                row.motif, test.log2fc, test.pvalue, adjusted_pvalue
            );
            if !enriched {
                continue;
            }

            let fg_scores: Vec<f32> = fg_cols.iter().map(|c| row.scores[*c]).collect();
            let bg_scores: Vec<f32> = bg_cols.iter().map(|c| row.scores[*c]).collect();
            let (cutoff, targets): (f32, Vec<usize>) = match self.params.target_cutoff {
                TargetCutoff::BackgroundPercentile(p) => {
                    let cutoff = percentile(&bg_scores, p);
                    (cutoff, select(&fg_cols, &fg_scores, |s| s > cutoff))
                }
                TargetCutoff::Youden => {
                    let cutoff = youden_cutoff(&fg_scores, &bg_scores);
                    (cutoff, select(&fg_cols, &fg_scores, |s| s >= cutoff))
                }
            };

            results.push(EnrichmentResult {
                motif: row.motif.to_string(),
                method: Method::Differential,
                enrichment_score: test.log2fc,
                target_regions: RegionSet::new(
                    foreground.name(),
                    targets
                        .into_iter()
                        .map(|col| matrix.regions().regions()[col].clone()),
                ),
                threshold: Threshold::Score(cutoff),
                details: Details::Differential {
                    log2fc: test.log2fc,
                    pvalue: test.pvalue,
                    adjusted_pvalue,
                    mean_foreground: test.mean_foreground,
                    mean_background: test.mean_background,
                },
            });
        }
        results.sort_by(EnrichmentResult::ranking_order);

        info!(
            "{}: {} of {} motifs differentially enriched",
            foreground.name(),
            results.len(),
            tested.len()
        );

        Ok(MotifEnrichment {
            region_set: foreground.name().to_string(),
            method: Method::Differential,
            n_regions: fg_cols.len(),
            universe_size: matrix.universe_size(),
            n_tested: tested.len(),
            results,
            excluded,
        })
    }

    /// `None` when the motif scores every region identically.
    fn test_motif(&self, foreground: &[f64], background: &[f64]) -> Option<MotifTest> {
        let pvalue = mann_whitney_greater(foreground, background)?;
        let mean_foreground = mean(foreground);
        let mean_background = mean(background);
        let log2fc = fold_change(foreground, background, self.params.pseudocount);
        Some(MotifTest {
            pvalue,
            log2fc,
            mean_foreground,
            mean_background,
        })
    }
}

///
/// `log2` ratio of the mean scores plus `pseudocount`.
///
/// Scores below zero, such as log-odds, are first shifted up by the pooled
/// minimum so the ratio compares distances above the lowest score.
///
fn fold_change(foreground: &[f64], background: &[f64], pseudocount: f64) -> f64 {
    let floor = foreground
        .iter()
        .chain(background)
        .copied()
        .fold(0.0f64, f64::min);
    ((mean(foreground) - floor + pseudocount) / (mean(background) - floor + pseudocount)).log2()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn select<F: Fn(f32) -> bool>(cols: &[usize], scores: &[f32], keep: F) -> Vec<usize> {
    cols.iter()
        .zip(scores)
        .filter(|(_, s)| keep(**s))
        .map(|(c, _)| *c)
        .collect()
}

///
/// One-sided Mann-Whitney U test that `group1` tends to be larger than `group2`.
///
/// Uses average ranks for ties, the tie corrected variance and a normal
/// approximation with continuity correction. Returns `None` when every value is
/// tied, i.e. the variance of U is zero.
///
pub fn mann_whitney_greater(group1: &[f64], group2: &[f64]) -> Option<f64> {
    if group1.is_empty() || group2.is_empty() {
        return None;
    }
    let n1 = group1.len() as f64;
    let n2 = group2.len() as f64;
    let n = n1 + n2;

    let mut observations: Vec<(f64, bool)> = group1
        .iter()
        .map(|v| (*v, true))
        .chain(group2.iter().map(|v| (*v, false)))
        .collect();
    observations.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rank_sum = 0.0;
    let mut tie_sum = 0.0;
    let mut start = 0;
    while start < observations.len() {
        let mut end = start + 1;
        while end < observations.len() && observations[end].0 == observations[start].0 {
            end += 1;
        }
        let count = (end - start) as f64;
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        rank_sum += avg_rank * observations[start..end].iter().filter(|o| o.1).count() as f64;
        tie_sum += count * count * count - count;
        start = end;
    }

    let u1 = rank_sum - n1 * (n1 + 1.0) / 2.0;
    let mean_u = n1 * n2 / 2.0;
    let var_u = n1 * n2 / 12.0 * ((n + 1.0) - tie_sum / (n * (n - 1.0)));
    if !(var_u > 0.0) {
        return None;
    }

    let z = (u1 - mean_u - 0.5) / var_u.sqrt();
    // upper tail of the standard normal
    Some((0.5 * erfc(z / std::f64::consts::SQRT_2)).clamp(0.0, 1.0))
}

/// Linearly interpolated quantile `p` of `values`.
fn percentile(values: &[f32], p: f64) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = p * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = (pos - lower as f64) as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

///
/// Score `c` maximizing `TPR - FPR` for the rule `score >= c`, where the
/// foreground are positives. Ties go to the higher score.
///
fn youden_cutoff(foreground: &[f32], background: &[f32]) -> f32 {
    let mut observations: Vec<(f32, bool)> = foreground
        .iter()
        .map(|s| (*s, true))
        .chain(background.iter().map(|s| (*s, false)))
        .collect();
    // descending, so prefix counts are the regions at or above a score
    observations.sort_by(|a, b| b.0.total_cmp(&a.0));

    let n_fg = foreground.len() as f64;
    let n_bg = background.len() as f64;
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut best: Option<(f64, f32)> = None;

    let mut start = 0;
    while start < observations.len() {
        let score = observations[start].0;
        let mut end = start;
        while end < observations.len() && observations[end].0.total_cmp(&score) == Ordering::Equal
        {
            if observations[end].1 {
                tp += 1;
            } else {
                fp += 1;
            }
            end += 1;
        }
        let j = tp as f64 / n_fg - fp as f64 / n_bg;
        if best.is_none_or(|(b, _)| j > b) {
            best = Some((j, score));
        }
        start = end;
    }
    best.map(|(_, c)| c).unwrap_or(f32::INFINITY)
}
