use clap::{Arg, Command};

use crate::run::with_common_args;

pub const CISTARGET_CMD: &str = "cistarget";

pub fn create_cistarget_cli() -> Command {
    let cmd = Command::new(CISTARGET_CMD)
        .author("Databio")
        .about("Find motifs whose top ranked regions recover the given region sets, and build cistromes from them.")
        .arg(
            Arg::new("bed")
                .long("bed")
                .required(true)
                .num_args(1..)
                .help("One or more region sets (BED, optionally gzipped)"),
        )
        .arg(
            Arg::new("nes-threshold")
                .long("nes-threshold")
                .required(false)
                .help("Minimum normalized enrichment score (default: 3.0)"),
        )
        .arg(
            Arg::new("rank-ceiling")
                .long("rank-ceiling")
                .required(false)
                .help("Compute the AUC up to this rank instead of auc_threshold x regions"),
        )
        .arg(
            Arg::new("background-motifs")
                .long("background-motifs")
                .required(false)
                .help("File with one motif per line to normalize against (default: every motif)"),
        );
    with_common_args(cmd)
}
