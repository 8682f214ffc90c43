use std::collections::BTreeSet;
use std::fmt::{self, Display};

use fxhash::FxHashMap;
use serde::Serialize;

use ctxrs_annotation::ConfidenceTier;
use ctxrs_core::{GenomicRegion, RegionIndex, RegionSet};
use ctxrs_enrichment::Method;

/// One enriched motif supporting a cistrome, and how it links to the TF.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Provenance {
    pub motif: String,
    pub method: Method,
    pub tier: ConfidenceTier,
}

impl Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.motif, self.method, self.tier)
    }
}

///
/// Regions attributed to one transcription factor.
///
/// Every region is supported by at least one [`Provenance`]; `support` maps
/// each region to indices into `provenance`.
///
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cistrome {
    tf: String,
    regions: RegionSet,
    provenance: Vec<Provenance>,
    #[serde(skip)]
    support: FxHashMap<GenomicRegion, Vec<usize>>,
}

impl Cistrome {
    ///
    /// Assemble a cistrome from `(provenance, target regions)` contributions.
    ///
    /// Returns `None` when no contribution has a region. Provenance entries
    /// without regions are dropped.
    ///
    pub(crate) fn from_contributions<'a, I>(tf: &str, contributions: I) -> Option<Cistrome>
    where
        I: IntoIterator<Item = (Provenance, &'a RegionSet)>,
    {
        let mut contributions: Vec<(Provenance, &RegionSet)> = contributions
            .into_iter()
            .filter(|(_, regions)| !regions.is_empty())
            .collect();
        if contributions.is_empty() {
            return None;
        }
        contributions.sort_by(|a, b| a.0.cmp(&b.0));

        let mut support: FxHashMap<GenomicRegion, Vec<usize>> = FxHashMap::default();
        let mut provenance = Vec::with_capacity(contributions.len());
        for (idx, (entry, regions)) in contributions.into_iter().enumerate() {
            for region in regions {
                support.entry(region.clone()).or_default().push(idx);
            }
            provenance.push(entry);
        }

        let regions = RegionSet::new(tf, support.keys().cloned()).sorted();
        Some(Cistrome {
            tf: tf.to_string(),
            regions,
            provenance,
            support,
        })
    }

    pub fn tf(&self) -> &str {
        &self.tf
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    /// Contributing motifs, sorted and unique per (motif, method).
    pub fn provenance(&self) -> &[Provenance] {
        &self.provenance
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Provenance of the motifs that selected `region`.
    pub fn provenance_for(&self, region: &GenomicRegion) -> Vec<&Provenance> {
        self.support
            .get(region)
            .map(|idx| idx.iter().map(|i| &self.provenance[*i]).collect())
            .unwrap_or_default()
    }

    /// Strongest tier supporting `region`.
    pub fn best_confidence(&self, region: &GenomicRegion) -> Option<ConfidenceTier> {
        self.provenance_for(region).iter().map(|p| p.tier).max()
    }

    /// Whether any support comes from an indirect annotation.
    pub fn is_extended(&self) -> bool {
        self.provenance
            .iter()
            .any(|p| p.tier != ConfidenceTier::Direct)
    }

    /// Motif names supporting this cistrome, sorted and unique.
    pub fn motifs(&self) -> Vec<&str> {
        self.provenance
            .iter()
            .map(|p| p.motif.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    ///
    /// Name such as `TF_A_(12r)`, or `TF_A_extended_(12r)` when some support is
    /// not direct.
    ///
    pub fn label(&self) -> String {
        if self.is_extended() {
            format!("{}_extended_({}r)", self.tf, self.len())
        } else {
            format!("{}_({}r)", self.tf, self.len())
        }
    }

    ///
    /// The part of this cistrome supported by the given tiers, or `None` when
    /// nothing remains.
    ///
    pub fn restrict_to_tiers(&self, tiers: &[ConfidenceTier]) -> Option<Cistrome> {
        let per_provenance = self.regions_per_provenance();
        Cistrome::from_contributions(
            &self.tf,
            self.provenance
                .iter()
                .zip(per_provenance.iter())
                .filter(|(p, _)| tiers.contains(&p.tier))
                .map(|(p, regions)| (p.clone(), regions)),
        )
    }

    ///
    /// Merge overlapping and book-ended regions. A merged region is supported
    /// by everything that supported one of its parts.
    ///
    pub fn merge_overlapping(&self) -> Cistrome {
        let merged = self.regions.reduce();
        let index = RegionIndex::new(merged.regions().to_vec());

        let mut support: FxHashMap<GenomicRegion, Vec<usize>> = FxHashMap::default();
        for (region, idx) in &self.support {
            for target in index.find(region) {
                if let Some(target) = index.region(target) {
                    support.entry(target.clone()).or_default().extend(idx);
                }
            }
        }
        for idx in support.values_mut() {
            idx.sort_unstable();
            idx.dedup();
        }

        Cistrome {
            tf: self.tf.clone(),
            regions: merged.renamed(self.tf.clone()),
            provenance: self.provenance.clone(),
            support,
        }
    }

    fn regions_per_provenance(&self) -> Vec<RegionSet> {
        let mut per: Vec<Vec<GenomicRegion>> = vec![Vec::new(); self.provenance.len()];
        for region in &self.regions {
            if let Some(idx) = self.support.get(region) {
                for i in idx {
                    per[*i].push(region.clone());
                }
            }
        }
        per.into_iter()
            .map(|regions| RegionSet::new(self.tf.clone(), regions))
            .collect()
    }
}
