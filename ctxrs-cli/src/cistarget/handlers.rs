use std::path::Path;

use anyhow::{Context, Result};
use clap::ArgMatches;
use log::info;

use ctxrs_core::RegionSet;
use ctxrs_enrichment::{Background, EnrichmentEngine, Method};

use crate::run::{RunSetup, load_config, parse_flag};

fn read_motif_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read motif list {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

pub fn run_cistarget(matches: &ArgMatches) -> Result<()> {
    let beds: Vec<&String> = matches
        .get_many::<String>("bed")
        .expect("--bed is required")
        .collect();

    let mut config = load_config(matches)?;
    if let Some(nes) = parse_flag::<f64>(matches, "nes-threshold")? {
        config.recovery.nes_threshold = nes;
    }
    if let Some(ceiling) = parse_flag::<u32>(matches, "rank-ceiling")? {
        config.recovery.rank_ceiling = Some(ceiling);
    }
    let background = match matches.get_one::<String>("background-motifs") {
        Some(path) => Background::Motifs(read_motif_list(Path::new(path))?),
        None => Background::AllMotifs,
    };

    let setup = RunSetup::new(matches, config)?;
    let inputs = setup.read_inputs(&beds)?;

    let engine = EnrichmentEngine::new(setup.config.recovery.clone())
        .with_background(background)
        .with_missing_regions(setup.missing_regions());

    let region_sets: Vec<RegionSet> = inputs.iter().map(|i| i.universe_regions()).collect();
    info!(
        "Running rank recovery for {} region sets against {}",
        region_sets.len(),
        setup.store.name()
    );
    let outcome = setup.install(|| engine.run_batch(&setup.store, &region_sets, &setup.cancel))?;

    setup.report(Method::Recovery, &inputs, &outcome)
}
