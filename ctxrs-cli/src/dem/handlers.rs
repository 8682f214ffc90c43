use anyhow::Result;
use clap::ArgMatches;
use log::info;

use ctxrs_core::RegionSet;
use ctxrs_enrichment::{DifferentialEnrichmentEngine, Method};

use crate::run::{RunSetup, load_config, parse_flag};

pub fn run_dem(matches: &ArgMatches) -> Result<()> {
    let foregrounds: Vec<&String> = matches
        .get_many::<String>("foreground")
        .expect("--foreground is required")
        .collect();
    let backgrounds: Vec<&String> = matches
        .get_many::<String>("background")
        .expect("--background is required")
        .collect();

    let mut config = load_config(matches)?;
    if let Some(padj) = parse_flag::<f64>(matches, "adjusted-pvalue")? {
        config.differential.adjusted_pvalue_threshold = padj;
    }
    if let Some(log2fc) = parse_flag::<f64>(matches, "log2fc")? {
        config.differential.log2fc_threshold = log2fc;
    }

    let setup = RunSetup::new(matches, config)?;
    let inputs = setup.read_inputs(&foregrounds)?;

    let background = setup
        .read_inputs(&backgrounds)?
        .iter()
        .fold(RegionSet::new("background", Vec::new()), |acc, b| {
            acc.union(&b.universe_regions())
        });
    info!("Background maps to {} database regions", background.len());

    let engine = DifferentialEnrichmentEngine::new(setup.config.differential.clone())
        .with_missing_regions(setup.missing_regions());

    let foreground_sets: Vec<RegionSet> = inputs.iter().map(|i| i.universe_regions()).collect();
    let outcome = setup.install(|| {
        engine.run_batch(&setup.store, &foreground_sets, &background, &setup.cancel)
    })?;

    setup.report(Method::Differential, &inputs, &outcome)
}
