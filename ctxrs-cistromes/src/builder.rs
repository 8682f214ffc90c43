use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use ctxrs_annotation::{AnnotationResolver, ConfidenceTier};
use ctxrs_core::RegionSet;
use ctxrs_enrichment::{EnrichmentResult, Method};

use crate::cistrome::{Cistrome, Provenance};

///
/// Turns enriched motifs into one cistrome per transcription factor.
///
/// Each result's motif is resolved to its TFs, and its target regions are
/// added to the cistrome of each of them. Regions are combined by coordinate
/// identity only; see [`Cistrome::merge_overlapping`] for interval merging.
///
#[derive(Debug, Clone)]
pub struct CistromeBuilder {
    min_tier: ConfidenceTier,
    methods: Option<Vec<Method>>,
}

impl Default for CistromeBuilder {
    fn default() -> Self {
        CistromeBuilder {
            min_tier: ConfidenceTier::MotifSimilarity,
            methods: None,
        }
    }
}

/// Direct only and all tier cistromes of the same results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CistromeSplit {
    pub direct: BTreeMap<String, Cistrome>,
    pub extended: BTreeMap<String, Cistrome>,
}

impl CistromeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore annotations weaker than `tier`.
    pub fn with_min_tier(mut self, tier: ConfidenceTier) -> Self {
        self.min_tier = tier;
        self
    }

    /// Only use results of these methods.
    pub fn with_methods(mut self, methods: Vec<Method>) -> Self {
        self.methods = Some(methods);
        self
    }

    ///
    /// Build the cistromes of every TF implicated by `results`.
    ///
    /// A TF without any contributing region is absent from the output. When a
    /// motif links to the same TF through several tiers, its provenance keeps
    /// the strongest one.
    ///
    pub fn build<'a, I>(&self, results: I, resolver: &AnnotationResolver) -> BTreeMap<String, Cistrome>
    where
        I: IntoIterator<Item = &'a EnrichmentResult>,
    {
        // tf -> (motif, method) -> (tier, targets)
        let mut per_tf: BTreeMap<&str, BTreeMap<(&str, Method), (ConfidenceTier, Vec<&RegionSet>)>> =
            BTreeMap::new();

        let mut n_results = 0usize;
        for result in results {
            if let Some(methods) = &self.methods {
                if !methods.contains(&result.method) {
                    continue;
                }
            }
            n_results += 1;

            let links = resolver.resolve(&result.motif);
            if links.is_empty() {
                debug!("Motif {} has no TF annotation", result.motif);
            }
            for link in links.iter().filter(|l| l.tier >= self.min_tier) {
                let entry = per_tf
                    .entry(link.tf.as_str())
                    .or_default()
                    .entry((result.motif.as_str(), result.method))
                    .or_insert((link.tier, Vec::new()));
                entry.0 = entry.0.max(link.tier);
                entry.1.push(&result.target_regions);
            }
        }

        let mut cistromes = BTreeMap::new();
        for (tf, contributions) in per_tf {
            // a motif seen in several results (e.g. region sets) contributes their union
            let merged: Vec<(Provenance, RegionSet)> = contributions
                .into_iter()
                .map(|((motif, method), (tier, targets))| {
                    let regions = targets
                        .into_iter()
                        .fold(RegionSet::new(tf, Vec::new()), |acc, t| acc.union(t));
                    (
                        Provenance {
                            motif: motif.to_string(),
                            method,
                            tier,
                        },
                        regions,
                    )
                })
                .collect();

            if let Some(cistrome) =
                Cistrome::from_contributions(tf, merged.iter().map(|(p, r)| (p.clone(), r)))
            {
                cistromes.insert(tf.to_string(), cistrome);
            }
        }

        info!(
            "Built {} cistromes from {} enrichment results",
            cistromes.len(),
            n_results
        );
        cistromes
    }

    ///
    /// Build direct only cistromes next to the cistromes of every allowed tier.
    ///
    pub fn build_split<'a, I>(&self, results: I, resolver: &AnnotationResolver) -> CistromeSplit
    where
        I: IntoIterator<Item = &'a EnrichmentResult> + Clone,
    {
        let direct = CistromeBuilder {
            min_tier: ConfidenceTier::Direct,
            methods: self.methods.clone(),
        }
        .build(results.clone(), resolver);
        let extended = self.build(results, resolver);
        CistromeSplit { direct, extended }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ctxrs_annotation::AnnotationEntry;
    use ctxrs_core::GenomicRegion;
    use ctxrs_enrichment::{Details, Threshold};
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn region(start: u32) -> GenomicRegion {
        GenomicRegion::new("chr1", start, start + 100).unwrap()
    }

    fn result(motif: &str, method: Method, targets: Vec<GenomicRegion>) -> EnrichmentResult {
        EnrichmentResult {
            motif: motif.to_string(),
            method,
            enrichment_score: 4.0,
            target_regions: RegionSet::new("query", targets),
            threshold: Threshold::Rank(10),
            details: Details::Recovery {
                auc: 0.2,
                rank_ceiling: 10,
            },
        }
    }

    #[fixture]
    fn resolver() -> AnnotationResolver {
        AnnotationResolver::from_entries(vec![
            AnnotationEntry::new("m1", "TF_A", ConfidenceTier::Direct),
            AnnotationEntry::new("m1", "TF_B", ConfidenceTier::Orthology),
            AnnotationEntry::new("m2", "TF_A", ConfidenceTier::MotifSimilarity),
            AnnotationEntry::new("m2", "TF_A", ConfidenceTier::Orthology),
            AnnotationEntry::new("m9", "TF_Z", ConfidenceTier::Direct),
        ])
    }

    #[rstest]
    fn test_fan_out_to_every_tf(resolver: AnnotationResolver) {
        let results = vec![result("m1", Method::Recovery, vec![region(100), region(300)])];
        let cistromes = CistromeBuilder::new().build(&results, &resolver);

        assert_eq!(cistromes.keys().collect::<Vec<_>>(), vec!["TF_A", "TF_B"]);
        for (tf, tier) in [("TF_A", ConfidenceTier::Direct), ("TF_B", ConfidenceTier::Orthology)] {
            let cistrome = &cistromes[tf];
            assert_eq!(cistrome.regions(), &results[0].target_regions);
            assert_eq!(
                cistrome.provenance(),
                &[Provenance {
                    motif: "m1".to_string(),
                    method: Method::Recovery,
                    tier
                }]
            );
        }
        // m9 was never enriched
        assert!(!cistromes.contains_key("TF_Z"));
    }

    #[rstest]
    fn test_union_and_dedup(resolver: AnnotationResolver) {
        let results = vec![
            result("m1", Method::Recovery, vec![region(100), region(300)]),
            result("m2", Method::Recovery, vec![region(300), region(500)]),
            result("m2", Method::Differential, vec![region(700)]),
            result("m2", Method::Recovery, vec![region(900)]),
            result("unannotated", Method::Recovery, vec![region(1100)]),
        ];
        let cistromes = CistromeBuilder::new().build(&results, &resolver);
        let tf_a = &cistromes["TF_A"];

        let expected = RegionSet::new(
            "TF_A",
            [100, 300, 500, 700, 900].into_iter().map(region),
        );
        assert_eq!(tf_a.regions(), &expected);

        // one entry per (motif, method); m2 keeps its strongest tier
        let provenance: Vec<(&str, Method, ConfidenceTier)> = tf_a
            .provenance()
            .iter()
            .map(|p| (p.motif.as_str(), p.method, p.tier))
            .collect();
        assert_eq!(
            provenance,
            vec![
                ("m1", Method::Recovery, ConfidenceTier::Direct),
                ("m2", Method::Recovery, ConfidenceTier::Orthology),
                ("m2", Method::Differential, ConfidenceTier::Orthology),
            ]
        );
        assert_eq!(tf_a.provenance_for(&region(300)).len(), 2);
    }

    #[rstest]
    fn test_order_does_not_matter(resolver: AnnotationResolver) {
        let mut results = vec![
            result("m1", Method::Recovery, vec![region(100), region(300)]),
            result("m2", Method::Recovery, vec![region(300), region(500)]),
        ];
        let forward = CistromeBuilder::new().build(&results, &resolver);
        results.reverse();
        let backward = CistromeBuilder::new().build(&results, &resolver);
        assert_eq!(forward, backward);
    }

    #[rstest]
    fn test_min_tier_and_methods(resolver: AnnotationResolver) {
        let results = vec![
            result("m1", Method::Differential, vec![region(100)]),
            result("m2", Method::Recovery, vec![region(300)]),
        ];

        let direct = CistromeBuilder::new()
            .with_min_tier(ConfidenceTier::Direct)
            .build(&results, &resolver);
        assert_eq!(direct.keys().collect::<Vec<_>>(), vec!["TF_A"]);
        assert_eq!(direct["TF_A"].len(), 1);

        let recovery_only = CistromeBuilder::new()
            .with_methods(vec![Method::Recovery])
            .build(&results, &resolver);
        assert_eq!(recovery_only.keys().collect::<Vec<_>>(), vec!["TF_A"]);
        assert_eq!(recovery_only["TF_A"].motifs(), vec!["m2"]);
    }

    #[rstest]
    fn test_build_split(resolver: AnnotationResolver) {
        let results = vec![
            result("m1", Method::Recovery, vec![region(100)]),
            result("m2", Method::Recovery, vec![region(300)]),
        ];
        let split = CistromeBuilder::new().build_split(&results, &resolver);

        assert_eq!(split.direct["TF_A"].label(), "TF_A_(1r)");
        assert_eq!(split.extended["TF_A"].label(), "TF_A_extended_(2r)");
        assert!(!split.direct.contains_key("TF_B"));
        assert!(split.extended.contains_key("TF_B"));
    }
}
