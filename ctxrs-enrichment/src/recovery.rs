//! Rank recovery enrichment.
//!
//! For a motif, the recovery curve at rank `t` is the fraction `hits(t) / t`,
//! where `hits(t)` counts region set members ranked at or above `t`. The AUC is
//! the mean of the curve over `1..=K`. Each motif's AUC is normalized against
//! the AUC distribution of an explicit background motif universe (NES).

use fxhash::FxHashSet;
use log::{debug, info, warn};
use rayon::iter::Either;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use ctxrs_core::{CancelToken, RegionSet};
use ctxrs_rankings::{MissingRegionPolicy, RankingMatrix, RankingStore};

use crate::error::{EnrichmentError, Result};
use crate::result::{
    Details, EnrichmentResult, ExcludedMotif, ExclusionReason, Method, MotifEnrichment, Threshold,
};

/// How the leading edge rank `t*` of an enriched motif is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeadingEdge {
    /// Largest rank at which the recovery curve `hits(t) / t` is maximal.
    #[default]
    CurveMaximum,
    /// Rank maximizing `hits(t) - (mean + 2 sd)` of the background hit counts.
    BackgroundCorrected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryParams {
    /// Fraction of the region universe the AUC is computed over.
    pub auc_threshold: f64,
    /// Explicit rank ceiling `K`; overrides `auc_threshold` when set.
    pub rank_ceiling: Option<u32>,
    /// Deepest rank considered for the leading edge.
    pub rank_threshold: u32,
    pub nes_threshold: f64,
    pub leading_edge: LeadingEdge,
}

impl Default for RecoveryParams {
    fn default() -> Self {
        RecoveryParams {
            auc_threshold: 0.005,
            rank_ceiling: None,
            rank_threshold: 20000,
            nes_threshold: 3.0,
            leading_edge: LeadingEdge::default(),
        }
    }
}

impl RecoveryParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.auc_threshold > 0.0 && self.auc_threshold <= 1.0) {
            return Err(EnrichmentError::InvalidParameter(format!(
                "auc_threshold must be in (0, 1], got {}",
                self.auc_threshold
            )));
        }
        if self.rank_ceiling == Some(0) {
            return Err(EnrichmentError::InvalidParameter(
                "rank_ceiling must be at least 1".to_string(),
            ));
        }
        if self.rank_threshold == 0 {
            return Err(EnrichmentError::InvalidParameter(
                "rank_threshold must be at least 1".to_string(),
            ));
        }
        if !self.nes_threshold.is_finite() {
            return Err(EnrichmentError::InvalidParameter(
                "nes_threshold must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// The rank ceiling `K` for a universe of `universe_size` regions.
    pub fn rank_ceiling_for(&self, universe_size: usize) -> u32 {
        let universe = universe_size.max(1) as u32;
        let k = match self.rank_ceiling {
            Some(k) => k,
            None => (self.auc_threshold * universe_size as f64).round() as u32,
        };
        k.clamp(1, universe)
    }
}

/// Motifs the NES of a run is normalized against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Background {
    /// Every motif of the ranking database.
    #[default]
    AllMotifs,
    /// Only the listed motifs.
    Motifs(Vec<String>),
}

///
/// Rank recovery enrichment engine.
///
/// Holds parameters only; a run reads from the [`RankingStore`] passed to it and
/// can run concurrently with other runs on the same store.
///
#[derive(Debug, Clone, Default)]
pub struct EnrichmentEngine {
    params: RecoveryParams,
    background: Background,
    candidates: Option<Vec<String>>,
    missing_regions: MissingRegionPolicy,
}

impl EnrichmentEngine {
    pub fn new(params: RecoveryParams) -> Self {
        EnrichmentEngine {
            params,
            ..Default::default()
        }
    }

    pub fn with_background(mut self, background: Background) -> Self {
        self.background = background;
        self
    }

    /// Only report these motifs. Defaults to the background motifs.
    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = Some(candidates);
        self
    }

    pub fn with_missing_regions(mut self, policy: MissingRegionPolicy) -> Self {
        self.missing_regions = policy;
        self
    }

    pub fn params(&self) -> &RecoveryParams {
        &self.params
    }

    ///
    /// Score every candidate motif for `region_set`.
    ///
    /// # Arguments
    /// - store: ranking database; regions must use its coordinates
    /// - region_set: query regions
    /// - cancel: checked between motifs
    ///
    pub fn run(
        &self,
        store: &RankingStore,
        region_set: &RegionSet,
        cancel: &CancelToken,
    ) -> Result<MotifEnrichment> {
        self.params.validate()?;
        if region_set.is_empty() {
            return Err(EnrichmentError::EmptyRegionSet(region_set.name().to_string()));
        }
        cancel.check()?;

        let background = match &self.background {
            Background::AllMotifs => store.motifs().to_vec(),
            Background::Motifs(motifs) => unique(motifs),
        };
        if background.is_empty() {
            return Err(EnrichmentError::InvalidParameter(
                "background motif universe is empty".to_string(),
            ));
        }

        // background motifs first, then candidates outside the background
        let mut motifs = background.clone();
        let candidates: Vec<usize> = match &self.candidates {
            None => (0..background.len()).collect(),
            Some(candidates) => {
                let mut idx = Vec::with_capacity(candidates.len());
                for candidate in unique(candidates) {
                    match background.iter().position(|m| *m == candidate) {
                        Some(pos) => idx.push(pos),
                        None => {
                            idx.push(motifs.len());
                            motifs.push(candidate);
                        }
                    }
                }
                idx
            }
        };

        info!(
            "Running cistarget on {} ({} regions, {} background motifs)",
            region_set.name(),
            region_set.len(),
            background.len()
        );

        let matrix =
            store.get_rankings_for_motifs(region_set, &motifs, self.missing_regions, cancel)?;
        if matrix.regions().is_empty() {
            return Err(EnrichmentError::EmptyRegionSet(region_set.name().to_string()));
        }

        self.score(&matrix, background.len(), &candidates, cancel)
    }

    ///
    /// Score a ranking matrix whose first `n_background` motifs form the
    /// background universe.
    ///
    fn score(
        &self,
        matrix: &RankingMatrix,
        n_background: usize,
        candidates: &[usize],
        cancel: &CancelToken,
    ) -> Result<MotifEnrichment> {
        let universe_size = matrix.universe_size();
        let k = self.params.rank_ceiling_for(universe_size);
        let harmonic = harmonic_numbers(k);

        // sorted ranks per motif, and the AUC they give
        let recoveries = (0..matrix.n_motifs())
            .into_par_iter()
            .map(|idx| {
                cancel.check()?;
                let mut ranks = matrix.row(idx).ranks.to_vec();
                ranks.sort_unstable();
                let auc = recovery_auc(&ranks, k, &harmonic);
                Ok((ranks, auc))
            })
            .collect::<Result<Vec<(Vec<u32>, f64)>>>()?;

        let (mean, sd) = mean_sd(recoveries[..n_background].iter().map(|(_, auc)| *auc));

        let mut enrichment = MotifEnrichment {
            region_set: matrix.regions().name().to_string(),
            method: Method::Recovery,
            n_regions: matrix.regions().len(),
            universe_size,
            n_tested: candidates.len(),
            results: Vec::new(),
            excluded: Vec::new(),
        };

        if !(sd > 0.0 && sd.is_finite()) {
            warn!(
                "Background AUC distribution of {} has zero variance; no motif can be scored",
                enrichment.region_set
            );
            enrichment.n_tested = 0;
            enrichment.excluded = candidates
                .iter()
                .map(|idx| ExcludedMotif {
                    motif: matrix.motifs()[*idx].clone(),
                    reason: ExclusionReason::ZeroVariance,
                })
                .collect();
            enrichment.excluded.sort_by(|a, b| a.motif.cmp(&b.motif));
            return Ok(enrichment);
        }

        let depth = self.params.rank_threshold.min(universe_size as u32);
        let envelope = match self.params.leading_edge {
            LeadingEdge::CurveMaximum => None,
            LeadingEdge::BackgroundCorrected => Some(BackgroundEnvelope::new(
                recoveries[..n_background].iter().map(|(ranks, _)| ranks.as_slice()),
                depth,
            )),
        };

        let (mut results, mut excluded): (Vec<EnrichmentResult>, Vec<ExcludedMotif>) = candidates
            .par_iter()
            .filter_map(|idx| {
                let (ranks, auc) = &recoveries[*idx];
                let nes = (auc - mean) / sd;
                if nes < self.params.nes_threshold {
                    return None;
                }

                let rank_at_max = match &envelope {
                    None => curve_maximum(ranks, depth),
                    Some(envelope) => envelope.leading_edge(ranks),
                };
                let row = matrix.row(*idx);
                if rank_at_max == 0 {
                    debug!("{}: NES {nes:.3} but no hit within rank {depth}", row.motif);
                    return Some(Either::Right(ExcludedMotif {
                        motif: row.motif.to_string(),
                        reason: ExclusionReason::NoLeadingEdge,
                    }));
                }
                let targets = matrix
                    .regions()
                    .iter()
                    .zip(row.ranks)
                    .filter(|(_, rank)| **rank <= rank_at_max)
                    .map(|(region, _)| region.clone());

                debug!("{}: AUC {auc:.5}, NES {nes:.3}, rank at max {rank_at_max}", row.motif);
                Some(Either::Left(EnrichmentResult {
                    motif: row.motif.to_string(),
                    method: Method::Recovery,
                    enrichment_score: nes,
                    target_regions: RegionSet::new(matrix.regions().name(), targets),
                    threshold: Threshold::Rank(rank_at_max),
                    details: Details::Recovery {
                        auc: *auc,
                        rank_ceiling: k,
                    },
                }))
            })
            .partition_map(|outcome| outcome);
        results.sort_by(EnrichmentResult::ranking_order);
        excluded.sort_by(|a, b| a.motif.cmp(&b.motif));

        if !excluded.is_empty() {
            warn!(
                "{}: {} motifs pass the NES threshold without a hit within rank {}",
                enrichment.region_set,
                excluded.len(),
                depth
            );
        }
        info!(
            "{}: {} of {} motifs enriched (NES >= {})",
            enrichment.region_set,
            results.len(),
            candidates.len(),
            self.params.nes_threshold
        );
        enrichment.excluded = excluded;
        enrichment.results = results;
        Ok(enrichment)
    }
}

fn unique(motifs: &[String]) -> Vec<String> {
    let mut seen = FxHashSet::default();
    motifs
        .iter()
        .filter(|m| seen.insert(m.as_str()))
        .cloned()
        .collect()
}

/// `h[n]` = 1 + 1/2 + ... + 1/n, with `h[0] = 0`.
fn harmonic_numbers(k: u32) -> Vec<f64> {
    let mut h = Vec::with_capacity(k as usize + 1);
    h.push(0.0);
    let mut acc = 0.0;
    for n in 1..=k {
        acc += 1.0 / n as f64;
        h.push(acc);
    }
    h
}

///
/// Mean of `hits(t) / t` over `t = 1..=k`.
///
/// A hit at rank `r <= k` contributes `1/t` for every `t` in `r..=k`, i.e.
/// `h[k] - h[r - 1]`.
///
pub(crate) fn recovery_auc(sorted_ranks: &[u32], k: u32, harmonic: &[f64]) -> f64 {
    let area: f64 = sorted_ranks
        .iter()
        .take_while(|r| **r <= k)
        .map(|r| harmonic[k as usize] - harmonic[*r as usize - 1])
        .sum();
    area / k as f64
}

/// Population mean and standard deviation.
pub(crate) fn mean_sd<I: Iterator<Item = f64> + Clone>(values: I) -> (f64, f64) {
    let n = values.clone().count();
    if n == 0 {
        return (f64::NAN, f64::NAN);
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}

///
/// Largest rank `t <= depth` at which `hits(t) / t` is maximal, or 0 without hits.
///
/// The curve only rises at hit ranks, so only those are candidates. Fractions
/// are compared exactly by cross multiplication.
///
fn curve_maximum(sorted_ranks: &[u32], depth: u32) -> u32 {
    let mut best: Option<(u64, u64)> = None;
    for (i, rank) in sorted_ranks.iter().take_while(|r| **r <= depth).enumerate() {
        let (hits, t) = (i as u64 + 1, *rank as u64);
        match best {
            Some((best_hits, best_t)) if hits * best_t < best_hits * t => {}
            _ => best = Some((hits, t)),
        }
    }
    best.map(|(_, t)| t as u32).unwrap_or(0)
}

///
/// `mean + 2 sd` of the background hit counts `hits(t)` for every `t <= depth`.
///
struct BackgroundEnvelope {
    envelope: Vec<f64>,
}

impl BackgroundEnvelope {
    fn new<'a, I: Iterator<Item = &'a [u32]>>(background: I, depth: u32) -> Self {
        let depth = depth as usize;
        // per rank increments of sum(hits) and sum(hits^2)
        let mut d1 = vec![0u64; depth + 1];
        let mut d2 = vec![0u64; depth + 1];
        let mut n = 0u64;
        for ranks in background {
            n += 1;
            for (i, rank) in ranks.iter().take_while(|r| **r as usize <= depth).enumerate() {
                d1[*rank as usize] += 1;
                d2[*rank as usize] += 2 * i as u64 + 1;
            }
        }

        let n = n.max(1) as f64;
        let mut envelope = vec![0.0; depth + 1];
        let (mut s1, mut s2) = (0u64, 0u64);
        for t in 1..=depth {
            s1 += d1[t];
            s2 += d2[t];
            let mean = s1 as f64 / n;
            let var = (s2 as f64 / n - mean * mean).max(0.0);
            envelope[t] = mean + 2.0 * var.sqrt();
        }
        BackgroundEnvelope { envelope }
    }

    /// First rank maximizing `hits(t) - envelope(t)`, or 0 without hits.
    fn leading_edge(&self, sorted_ranks: &[u32]) -> u32 {
        let mut hits = 0usize;
        let mut next = sorted_ranks.iter().peekable();
        let mut best: Option<(f64, u32)> = None;
        for t in 1..self.envelope.len() {
            while next.next_if(|r| **r as usize == t).is_some() {
                hits += 1;
            }
            if hits == 0 {
                continue;
            }
            let excess = hits as f64 - self.envelope[t];
            if best.is_none_or(|(b, _)| excess > b) {
                best = Some((excess, t as u32));
            }
        }
        best.map(|(_, t)| t).unwrap_or(0)
    }
}
