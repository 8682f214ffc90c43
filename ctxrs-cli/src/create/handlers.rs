use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgMatches;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use ctxrs_rankings::{FILE_EXTENSION, RankingDbWriter, ScoreTable};

pub fn run_create(matches: &ArgMatches) -> Result<()> {
    let scores = matches
        .get_one::<String>("scores")
        .expect("A path to a score table is required.");

    let output = matches
        .get_one::<String>("output")
        .expect("An output path is required.");

    let chunk_size: u32 = matches
        .get_one::<String>("chunk-size")
        .expect("chunk-size has a default")
        .parse()
        .context("--chunk-size must be a positive integer")?;

    let output = PathBuf::from(output);
    if output.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
        warn!(
            "{} does not have the .{} extension",
            output.display(),
            FILE_EXTENSION
        );
    }

    let table = ScoreTable::from_tsv(Path::new(scores))
        .with_context(|| format!("Failed to read score table {}", scores))?;
    info!(
        "Read {} motifs x {} regions from {}",
        table.motifs.len(),
        table.regions.len(),
        scores
    );

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} chunks")?
            .progress_chars("##-"),
    );

    RankingDbWriter::new(chunk_size)
        .with_progress(bar)
        .write_table(&output, &table)
        .with_context(|| format!("Failed to write ranking database {}", output.display()))?;

    Ok(())
}
