use clap::{Arg, ArgAction, Command};

use crate::run::with_common_args;

pub const DEM_CMD: &str = "dem";

pub fn create_dem_cli() -> Command {
    let cmd = Command::new(DEM_CMD)
        .author("Databio")
        .about("Test motif scores of foreground region sets against a background region set.")
        .arg(
            Arg::new("foreground")
                .long("foreground")
                .required(true)
                .num_args(1..)
                .help("One or more foreground region sets (BED, optionally gzipped)"),
        )
        .arg(
            Arg::new("background")
                .long("background")
                .required(true)
                .action(ArgAction::Append)
                .help("Background region set; repeat to pool several"),
        )
        .arg(
            Arg::new("adjusted-pvalue")
                .long("adjusted-pvalue")
                .required(false)
                .help("Maximum Benjamini-Hochberg adjusted p-value (default: 0.05)"),
        )
        .arg(
            Arg::new("log2fc")
                .long("log2fc")
                .required(false)
                .help("Minimum log2 fold change of mean scores (default: 1.0)"),
        );
    with_common_args(cmd)
}
