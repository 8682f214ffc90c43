use clap::{Arg, Command};

pub const CREATE_CMD: &str = "create";
pub const DEFAULT_CHUNK_SIZE: &str = "4096";

pub fn create_create_cli() -> Command {
    Command::new(CREATE_CMD)
        .author("Databio")
        .about("Build a ranking database from a motif by region score table.")
        .arg(
            Arg::new("scores")
                .long("scores")
                .required(true)
                .help("Tab separated score table: header `motif` + region ids, one row per motif (optionally gzipped)"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .required(true)
                .help("Path of the database to write (.ctxdb)"),
        )
        .arg(
            Arg::new("chunk-size")
                .long("chunk-size")
                .required(false)
                .default_value(DEFAULT_CHUNK_SIZE)
                .help("Regions per on-disk chunk"),
        )
}
