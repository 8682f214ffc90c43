use std::collections::BTreeMap;

use fxhash::FxHashSet;
use log::{error, info, warn};
use rayon::prelude::*;

use ctxrs_core::{CancelToken, RegionSet};
use ctxrs_rankings::RankingStore;

use crate::differential::DifferentialEnrichmentEngine;
use crate::error::Result;
use crate::recovery::EnrichmentEngine;
use crate::result::MotifEnrichment;

/// Outcome of every input of a batch, keyed by input name.
pub type BatchOutcome = BTreeMap<String, Result<MotifEnrichment>>;

///
/// Run `run` over every input in parallel and collect each outcome under the
/// input's name.
///
/// A failing input never stops the others. Names are made distinct with
/// [`unique_names`] so every outcome is kept.
///
pub fn run_batch<F>(inputs: &[RegionSet], run: F) -> BatchOutcome
where
    F: Fn(&RegionSet) -> Result<MotifEnrichment> + Sync,
{
    let names: Vec<&str> = inputs.iter().map(RegionSet::name).collect();
    let keys = unique_names(&names);
    let outcomes: Vec<Result<MotifEnrichment>> = inputs.par_iter().map(&run).collect();

    let mut batch = BTreeMap::new();
    for (key, outcome) in keys.into_iter().zip(outcomes) {
        match &outcome {
            Ok(enrichment) => info!("{key}: {} enriched motifs", enrichment.len()),
            Err(e) if e.is_fatal() => error!("{key}: {e}"),
            Err(e) => warn!("{key}: {e}"),
        }
        batch.insert(key, outcome);
    }
    batch
}

///
/// Make every name distinct, in order. A repeated name gets the first free
/// `_2`, `_3`, ... suffix, skipping suffixed names already taken.
///
pub fn unique_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut taken: FxHashSet<String> = FxHashSet::default();
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            let mut unique = name.to_string();
            let mut k = 2;
            while taken.contains(&unique) {
                unique = format!("{name}_{k}");
                k += 1;
            }
            if unique != name {
                warn!("Region set name {name} is used more than once; renamed to {unique}");
            }
            taken.insert(unique.clone());
            unique
        })
        .collect()
}

impl EnrichmentEngine {
    /// Run over several region sets against one database.
    pub fn run_batch(
        &self,
        store: &RankingStore,
        region_sets: &[RegionSet],
        cancel: &CancelToken,
    ) -> BatchOutcome {
        run_batch(region_sets, |region_set| self.run(store, region_set, cancel))
    }
}

impl DifferentialEnrichmentEngine {
    /// Test several foreground region sets against one shared background.
    pub fn run_batch(
        &self,
        store: &RankingStore,
        foregrounds: &[RegionSet],
        background: &RegionSet,
        cancel: &CancelToken,
    ) -> BatchOutcome {
        run_batch(foregrounds, |foreground| {
            self.run(store, foreground, background, cancel)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnrichmentError;
    use crate::recovery::RecoveryParams;

    use ctxrs_core::GenomicRegion;
    use ctxrs_rankings::RankingDbWriter;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn region(i: u32) -> GenomicRegion {
        GenomicRegion::new("chr1", i * 1000, i * 1000 + 500).unwrap()
    }

    #[rstest]
    fn test_empty_input_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let regions: Vec<GenomicRegion> = (0..10).map(region).collect();
        let path = dir.path().join("db.ctxdb");
        RankingDbWriter::new(3)
            .write(
                &path,
                &["m1".to_string(), "m2".to_string(), "m3".to_string()],
                &regions,
                &[
                    vec![9.0, 10.0, 0.0, 11.0, 0.0, 0.0, 0.0, 8.0, 0.0, 0.0],
                    (0..10).map(|i| i as f32).collect(),
                    (0..10).map(|i| (10 - i) as f32 * 0.5).collect(),
                ],
            )
            .unwrap();
        let store = RankingStore::open(&path).unwrap();

        let inputs = vec![
            RegionSet::new("peaks", vec![region(1), region(3)]),
            RegionSet::new("empty", Vec::<GenomicRegion>::new()),
            RegionSet::new("peaks", vec![region(3)]),
        ];
        let engine = EnrichmentEngine::new(RecoveryParams {
            rank_ceiling: Some(5),
            nes_threshold: 1.0,
            ..Default::default()
        });
        let outcome = engine.run_batch(&store, &inputs, &CancelToken::new());

        assert_eq!(
            outcome.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["empty", "peaks", "peaks_2"]
        );
        assert!(matches!(outcome["empty"], Err(EnrichmentError::EmptyRegionSet(_))));
        let peaks = outcome["peaks"].as_ref().unwrap();
        assert_eq!(peaks.motifs().collect::<Vec<_>>(), vec!["m1"]);
        assert!(outcome["peaks_2"].is_ok());
    }

    #[rstest]
    #[case(&["a", "b", "c"], &["a", "b", "c"])]
    #[case(&["a", "a", "a"], &["a", "a_2", "a_3"])]
    #[case(&["a", "a", "a_2"], &["a", "a_2", "a_2_2"])]
    #[case(&["a_2", "a", "a"], &["a_2", "a", "a_3"])]
    fn test_unique_names(#[case] names: &[&str], #[case] expected: &[&str]) {
        assert_eq!(unique_names(names), expected);
    }

    #[rstest]
    fn test_suffixed_name_collision_keeps_every_outcome() {
        let inputs = vec![
            RegionSet::new("a", vec![region(1)]),
            RegionSet::new("a", vec![region(2)]),
            RegionSet::new("a_2", vec![region(3)]),
        ];
        let outcome = run_batch(&inputs, |input| {
            Err(EnrichmentError::EmptyRegionSet(input.name().to_string()))
        });

        assert_eq!(outcome.len(), 3);
        assert_eq!(
            outcome.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["a", "a_2", "a_2_2"]
        );
    }
}
