//! Setup and reporting shared by the enrichment subcommands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{info, warn};

use ctxrs_annotation::AnnotationResolver;
use ctxrs_cistromes::CistromeBuilder;
use ctxrs_core::{CancelToken, RegionIndex, RegionMapping, RegionSet};
use ctxrs_enrichment::{BatchOutcome, EnrichmentConfig, Method, unique_names};
use ctxrs_rankings::{MissingRegionPolicy, RankingStore};

use crate::output::{self, InputSummary, RunSummary};

pub const DEFAULT_OUT: &str = "ctxrs_out";

/// Arguments every enrichment subcommand takes.
pub fn with_common_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("db")
            .long("db")
            .required(true)
            .help("Ranking database (.ctxdb)"),
    )
    .arg(
        Arg::new("annotation")
            .long("annotation")
            .required(false)
            .help("Motif to TF annotation table; cistromes are only built when given"),
    )
    .arg(
        Arg::new("config")
            .long("config")
            .required(false)
            .help("TOML configuration file"),
    )
    .arg(
        Arg::new("output")
            .long("output")
            .required(false)
            .help("Output directory (default: ctxrs_out)"),
    )
    .arg(
        Arg::new("threads")
            .long("threads")
            .required(false)
            .help("Worker threads (default: all cores)"),
    )
    .arg(
        Arg::new("timeout")
            .long("timeout")
            .required(false)
            .help("Give up after this many seconds"),
    )
    .arg(
        Arg::new("fraction-overlap")
            .long("fraction-overlap")
            .required(false)
            .help("Minimum overlap fraction to map a region onto the database regions"),
    )
    .arg(
        Arg::new("merge-overlapping")
            .long("merge-overlapping")
            .action(ArgAction::SetTrue)
            .help("Merge overlapping regions of each cistrome before writing it"),
    )
}

/// Parse an optional numeric flag.
pub fn parse_flag<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    matches
        .get_one::<String>(name)
        .map(|v| {
            v.parse::<T>()
                .with_context(|| format!("--{name} got an invalid value: {v}"))
        })
        .transpose()
}

///
/// Load the configuration file, if any, and apply the command line overrides
/// shared by every subcommand.
///
pub fn load_config(matches: &ArgMatches) -> Result<EnrichmentConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => EnrichmentConfig::try_from(Path::new(path))
            .with_context(|| format!("Failed to load config {}", path))?,
        None => EnrichmentConfig::default(),
    };

    if let Some(threads) = parse_flag::<usize>(matches, "threads")? {
        config.run.threads = Some(threads);
    }
    if let Some(timeout) = parse_flag::<u64>(matches, "timeout")? {
        config.run.timeout_secs = Some(timeout);
    }
    if let Some(fraction) = parse_flag::<f64>(matches, "fraction-overlap")? {
        config.run.fraction_overlap = fraction;
    }
    Ok(config)
}

/// A caller's region set and its mapping onto the database regions.
pub struct MappedInput {
    pub name: String,
    pub query: RegionSet,
    pub mapping: RegionMapping,
}

impl MappedInput {
    /// The database side regions, named like the input.
    pub fn universe_regions(&self) -> RegionSet {
        self.mapping.universe_regions().renamed(self.name.clone())
    }
}

/// Everything an enrichment subcommand needs before it runs.
pub struct RunSetup {
    pub config: EnrichmentConfig,
    pub store: RankingStore,
    pub resolver: Option<AnnotationResolver>,
    pub index: RegionIndex,
    pub cancel: CancelToken,
    pub output: PathBuf,
    pub merge_overlapping: bool,
}

impl RunSetup {
    pub fn new(matches: &ArgMatches, config: EnrichmentConfig) -> Result<Self> {
        config.validate()?;

        let db = matches
            .get_one::<String>("db")
            .expect("A path to a ranking database is required.");
        let store = RankingStore::open(db)
            .with_context(|| format!("Failed to open ranking database {}", db))?;
        let index = store.region_index();

        let resolver = match matches.get_one::<String>("annotation") {
            Some(path) => Some(
                AnnotationResolver::from_path(Path::new(path), &config.annotation)
                    .with_context(|| format!("Failed to read annotation table {}", path))?,
            ),
            None => None,
        };

        let cancel = match config.run.timeout_secs {
            Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
            None => CancelToken::new(),
        };

        let output = PathBuf::from(
            matches
                .get_one::<String>("output")
                .map(String::as_str)
                .unwrap_or(DEFAULT_OUT),
        );

        Ok(RunSetup {
            config,
            store,
            resolver,
            index,
            cancel,
            output,
            merge_overlapping: matches.get_flag("merge-overlapping"),
        })
    }

    pub fn missing_regions(&self) -> MissingRegionPolicy {
        if self.config.run.abort_on_missing_region {
            MissingRegionPolicy::Abort
        } else {
            MissingRegionPolicy::Drop
        }
    }

    ///
    /// Read BED files and map them onto the database regions. Names come from
    /// the file stems, made distinct with [`unique_names`].
    ///
    pub fn read_inputs<S: AsRef<str>>(&self, paths: &[S]) -> Result<Vec<MappedInput>> {
        let queries = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                RegionSet::from_bed(Path::new(path))
                    .with_context(|| format!("Failed to read BED file {}", path))
            })
            .collect::<Result<Vec<RegionSet>>>()?;
        let names: Vec<&str> = queries.iter().map(RegionSet::name).collect();
        let names = unique_names(&names);

        let mut inputs = Vec::with_capacity(queries.len());
        for (name, query) in names.into_iter().zip(queries) {
            let mapping = self
                .index
                .map_regions(&query, self.config.run.fraction_overlap);
            if !mapping.unmapped().is_empty() {
                warn!(
                    "{}: {} of {} regions do not overlap the database regions",
                    name,
                    mapping.unmapped().len(),
                    query.len()
                );
            }
            info!(
                "{}: {} regions map to {} database regions",
                name,
                query.len(),
                mapping.universe_regions().len()
            );

            inputs.push(MappedInput {
                name,
                query,
                mapping,
            });
        }
        Ok(inputs)
    }

    /// Run `f` on a pool of `config.run.threads` workers, or on the global pool.
    pub fn install<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        match self.config.run.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .context("Failed to build thread pool")?;
                info!("Thread pool configured with {} threads", threads);
                Ok(pool.install(f))
            }
            None => Ok(f()),
        }
    }

    ///
    /// Write tables, cistromes and the run summary for a batch.
    ///
    /// Fails when the batch hit a fatal error or when every input failed; the
    /// summary is written either way.
    ///
    pub fn report(&self, method: Method, inputs: &[MappedInput], outcome: &BatchOutcome) -> Result<()> {
        std::fs::create_dir_all(&self.output)
            .with_context(|| format!("Failed to create output directory {}", self.output.display()))?;

        let empty = AnnotationResolver::default();
        let resolver = self.resolver.as_ref().unwrap_or(&empty);

        let mut summary = RunSummary::new(&self.store, method);
        let mut fatal = None;

        for input in inputs {
            let Some(result) = outcome.get(&input.name) else {
                continue;
            };
            match result {
                Ok(enrichment) => {
                    let table = self.output.join(format!("{}.enrichment.tsv", input.name));
                    output::write_enrichment_table(&table, enrichment, resolver)
                        .with_context(|| format!("Failed to write {}", table.display()))?;

                    let mut labels = Vec::new();
                    if self.resolver.is_some() {
                        let builder = CistromeBuilder::new();
                        let database = builder.build_split(&enrichment.results, resolver);
                        let translated = enrichment.translated(&input.mapping);
                        let query = builder.build_split(&translated.results, resolver);

                        let dir = self.output.join("cistromes").join(&input.name);
                        labels = output::write_cistromes(&dir, &query, self.merge_overlapping)?;
                        output::write_cistromes(&dir.join("database"), &database, self.merge_overlapping)?;
                    }
                    summary.inputs.push(InputSummary::succeeded(input, enrichment, labels));
                }
                Err(e) => {
                    if e.is_fatal() && fatal.is_none() {
                        fatal = Some(e.to_string());
                    }
                    summary.inputs.push(InputSummary::failed(input, e));
                }
            }
        }

        let summary_path = self.output.join("summary.json");
        output::write_summary(&summary_path, &summary)
            .with_context(|| format!("Failed to write {}", summary_path.display()))?;
        info!("Results written to {}", self.output.display());

        if let Some(e) = fatal {
            anyhow::bail!("Run aborted: {}", e);
        }
        if !summary.inputs.is_empty() && summary.inputs.iter().all(InputSummary::is_failed) {
            anyhow::bail!("Every region set failed; see {}", summary_path.display());
        }
        Ok(())
    }
}
