mod cistarget;
mod create;
mod dem;
mod output;
mod run;

use anyhow::Result;
use clap::Command;
use env_logger::Env;

pub mod consts {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const PKG_NAME: &str = "ctxrs";
    pub const BIN_NAME: &str = "ctxrs";
}

fn build_parser() -> Command {
    Command::new(consts::BIN_NAME)
        .bin_name(consts::BIN_NAME)
        .version(consts::VERSION)
        .author("Databio")
        .about("Motif enrichment of genomic region sets against ranking databases, and cistrome assembly from the enriched motifs.")
        .subcommand_required(true)
        .subcommand(create::cli::create_create_cli())
        .subcommand(cistarget::cli::create_cistarget_cli())
        .subcommand(dem::cli::create_dem_cli())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let app = build_parser();
    let matches = app.get_matches();

    match matches.subcommand() {
        //
        // RANKING DATABASE
        //
        Some((create::cli::CREATE_CMD, matches)) => {
            create::handlers::run_create(matches)?;
        }

        //
        // RANK RECOVERY
        //
        Some((cistarget::cli::CISTARGET_CMD, matches)) => {
            cistarget::handlers::run_cistarget(matches)?;
        }

        //
        // DIFFERENTIAL ENRICHMENT
        //
        Some((dem::cli::DEM_CMD, matches)) => {
            dem::handlers::run_dem(matches)?;
        }

        _ => unreachable!("Subcommand not found"),
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    fn test_parser_is_consistent() {
        build_parser().debug_assert();
    }

    #[rstest]
    fn test_cistarget_accepts_many_beds() {
        let matches = build_parser()
            .try_get_matches_from([
                "ctxrs", "cistarget", "--db", "db.ctxdb", "--bed", "a.bed", "b.bed", "--threads", "2",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, cistarget::cli::CISTARGET_CMD);
        assert_eq!(sub.get_many::<String>("bed").unwrap().count(), 2);
    }

    #[rstest]
    fn test_dem_requires_background() {
        let res = build_parser().try_get_matches_from([
            "ctxrs", "dem", "--db", "db.ctxdb", "--foreground", "a.bed",
        ]);
        assert!(res.is_err());
    }
}
