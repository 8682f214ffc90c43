use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use ctxrs_annotation::{AnnotationResolver, ConfidenceTier};
use ctxrs_cistromes::{Cistrome, CistromeSplit};
use ctxrs_enrichment::{
    Details, EnrichmentError, EnrichmentResult, ExcludedMotif, Method, MotifEnrichment, Threshold,
};
use ctxrs_rankings::RankingStore;

use crate::run::MappedInput;

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub database: String,
    pub method: Method,
    pub n_motifs: usize,
    pub universe_size: usize,
    pub inputs: Vec<InputSummary>,
}

impl RunSummary {
    pub fn new(store: &RankingStore, method: Method) -> Self {
        RunSummary {
            database: store.path().display().to_string(),
            method,
            n_motifs: store.motifs().len(),
            universe_size: store.universe_size(),
            inputs: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InputSummary {
    pub name: String,
    pub n_query_regions: usize,
    pub n_mapped_regions: usize,
    pub n_unmapped_regions: usize,
    #[serde(flatten)]
    pub status: InputStatus,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InputStatus {
    Ok {
        n_tested: usize,
        n_enriched: usize,
        excluded: Vec<ExcludedMotif>,
        cistromes: Vec<String>,
    },
    Failed {
        error: String,
    },
}

impl InputSummary {
    fn base(input: &MappedInput, status: InputStatus) -> Self {
        InputSummary {
            name: input.name.clone(),
            n_query_regions: input.query.len(),
            n_mapped_regions: input.mapping.universe_regions().len(),
            n_unmapped_regions: input.mapping.unmapped().len(),
            status,
        }
    }

    pub fn succeeded(input: &MappedInput, enrichment: &MotifEnrichment, cistromes: Vec<String>) -> Self {
        Self::base(
            input,
            InputStatus::Ok {
                n_tested: enrichment.n_tested,
                n_enriched: enrichment.len(),
                excluded: enrichment.excluded.clone(),
                cistromes,
            },
        )
    }

    pub fn failed(input: &MappedInput, error: &EnrichmentError) -> Self {
        Self::base(
            input,
            InputStatus::Failed {
                error: error.to_string(),
            },
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, InputStatus::Failed { .. })
    }
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}

fn detail_columns(method: Method) -> &'static [&'static str] {
    match method {
        Method::Recovery => &["auc", "rank_ceiling"],
        Method::Differential => &[
            "log2fc",
            "pvalue",
            "adjusted_pvalue",
            "mean_foreground",
            "mean_background",
        ],
    }
}

fn detail_values(details: &Details) -> Vec<String> {
    match details {
        Details::Recovery { auc, rank_ceiling } => vec![auc.to_string(), rank_ceiling.to_string()],
        Details::Differential {
            log2fc,
            pvalue,
            adjusted_pvalue,
            mean_foreground,
            mean_background,
        } => vec![
            log2fc.to_string(),
            pvalue.to_string(),
            adjusted_pvalue.to_string(),
            mean_foreground.to_string(),
            mean_background.to_string(),
        ],
    }
}

fn threshold_value(threshold: &Threshold) -> String {
    match threshold {
        Threshold::Rank(rank) => rank.to_string(),
        Threshold::Score(score) => score.to_string(),
    }
}

fn tier_columns(result: &EnrichmentResult, resolver: &AnnotationResolver) -> Vec<String> {
    let by_tier: BTreeMap<ConfidenceTier, Vec<&str>> = resolver.annotations_by_tier(&result.motif);
    ConfidenceTier::ALL
        .iter()
        .map(|tier| by_tier.get(tier).map(|tfs| tfs.join(",")).unwrap_or_default())
        .collect()
}

///
/// Write an enrichment as a tab separated table, best motif first.
///
/// Columns: `motif`, the enrichment score, the target cutoff, the number of
/// target regions, one TF list per annotation tier, then the engine's own
/// statistics.
///
pub fn write_enrichment_table(
    path: &Path,
    enrichment: &MotifEnrichment,
    resolver: &AnnotationResolver,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    let (score_column, threshold_column) = match enrichment.method {
        Method::Recovery => ("NES", "rank_at_max"),
        Method::Differential => ("log2fc_score", "score_cutoff"),
    };
    let mut header = vec!["motif", score_column, threshold_column, "n_targets"];
    header.extend(ConfidenceTier::ALL.iter().map(|t| t.column_name()));
    header.extend(detail_columns(enrichment.method));
    writeln!(writer, "{}", header.join("\t"))?;

    for result in &enrichment.results {
        let mut row = vec![
            result.motif.clone(),
            result.enrichment_score.to_string(),
            threshold_value(&result.threshold),
            result.target_regions.len().to_string(),
        ];
        row.extend(tier_columns(result, resolver));
        row.extend(detail_values(&result.details));
        writeln!(writer, "{}", row.join("\t"))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_cistrome(path: &Path, cistrome: &Cistrome, merge_overlapping: bool) -> Result<()> {
    let regions = if merge_overlapping {
        cistrome.merge_overlapping().regions().clone()
    } else {
        cistrome.regions().clone()
    };
    regions
        .to_bed(path)
        .with_context(|| format!("Failed to write cistrome {}", path.display()))
}

///
/// File name for a cistrome of `tf`. Path separators become `_` and a stem of
/// only dots is replaced, so the file always lands directly in its directory.
///
fn bed_file_name(tf: &str, suffix: &str) -> String {
    let mut stem: String = tf
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if stem.chars().all(|c| c == '.') {
        stem = "_".repeat(stem.len().max(1));
    }
    format!("{stem}{suffix}.bed")
}

///
/// Write one BED file per cistrome into `dir`: `<TF>.bed` for the direct
/// cistromes and `<TF>_extended.bed` for the cistromes of every tier, with
/// TF names made safe by [`bed_file_name`].
///
/// Returns the labels of the written cistromes.
///
pub fn write_cistromes(dir: &Path, split: &CistromeSplit, merge_overlapping: bool) -> Result<Vec<String>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let mut labels = Vec::new();
    for (tf, cistrome) in &split.direct {
        write_cistrome(&dir.join(bed_file_name(tf, "")), cistrome, merge_overlapping)?;
        labels.push(cistrome.label());
    }
    for (tf, cistrome) in &split.extended {
        // identical to the direct cistrome when every tier is direct
        if !cistrome.is_extended() {
            continue;
        }
        write_cistrome(&dir.join(bed_file_name(tf, "_extended")), cistrome, merge_overlapping)?;
        labels.push(cistrome.label());
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    use ctxrs_annotation::AnnotationEntry;
    use ctxrs_cistromes::CistromeBuilder;
    use ctxrs_core::{GenomicRegion, RegionSet};
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn region(start: u32) -> GenomicRegion {
        GenomicRegion::new("chr1", start, start + 100).unwrap()
    }

    #[fixture]
    fn resolver() -> AnnotationResolver {
        AnnotationResolver::from_entries(vec![
            AnnotationEntry::new("m1", "TF_A", ConfidenceTier::Direct),
            AnnotationEntry::new("m1", "TF_B", ConfidenceTier::Orthology),
            AnnotationEntry::new("m1", "TF_C", ConfidenceTier::Orthology),
        ])
    }

    #[fixture]
    fn enrichment() -> MotifEnrichment {
        MotifEnrichment {
            region_set: "peaks".to_string(),
            method: Method::Recovery,
            n_regions: 3,
            universe_size: 10,
            n_tested: 2,
            results: vec![EnrichmentResult {
                motif: "m1".to_string(),
                method: Method::Recovery,
                enrichment_score: 3.5,
                target_regions: RegionSet::new("peaks", vec![region(100), region(300)]),
                threshold: Threshold::Rank(4),
                details: Details::Recovery {
                    auc: 0.25,
                    rank_ceiling: 5,
                },
            }],
            excluded: vec![],
        }
    }

    #[rstest]
    fn test_enrichment_table(enrichment: MotifEnrichment, resolver: AnnotationResolver) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peaks.enrichment.tsv");
        write_enrichment_table(&path, &enrichment, &resolver).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "motif\tNES\trank_at_max\tn_targets\tDirect_annot\tOrthology_annot\tMotif_similarity_annot\tauc\trank_ceiling"
        );
        assert_eq!(lines[1], "m1\t3.5\t4\t2\tTF_A\tTF_B,TF_C\t\t0.25\t5");
        assert_eq!(lines.len(), 2);
    }

    #[rstest]
    fn test_write_cistromes(enrichment: MotifEnrichment, resolver: AnnotationResolver) {
        let dir = tempfile::tempdir().unwrap();
        let split = CistromeBuilder::new().build_split(&enrichment.results, &resolver);
        let labels = write_cistromes(dir.path(), &split, false).unwrap();

        assert_eq!(
            labels,
            vec!["TF_A_(2r)", "TF_B_extended_(2r)", "TF_C_extended_(2r)"]
        );
        assert!(dir.path().join("TF_A.bed").exists());
        // TF_A has direct support only
        assert!(!dir.path().join("TF_A_extended.bed").exists());

        let bed = std::fs::read_to_string(dir.path().join("TF_B_extended.bed")).unwrap();
        assert_eq!(bed.lines().count(), 2);
        assert!(bed.starts_with("chr1\t100\t200"));
    }

    #[rstest]
    #[case("TF_A", "", "TF_A.bed")]
    #[case("NR2F1/2", "_extended", "NR2F1_2_extended.bed")]
    #[case("TF/../x", "", "TF_.._x.bed")]
    #[case("a\\b", "", "a_b.bed")]
    #[case("..", "", "__.bed")]
    #[case("", "_extended", "__extended.bed")]
    fn test_bed_file_name(#[case] tf: &str, #[case] suffix: &str, #[case] expected: &str) {
        assert_eq!(bed_file_name(tf, suffix), expected);
    }

    #[rstest]
    fn test_cistromes_stay_in_their_directory() {
        let resolver = AnnotationResolver::from_entries(vec![
            AnnotationEntry::new("m1", "../escape", ConfidenceTier::Direct),
            AnnotationEntry::new("m1", "..", ConfidenceTier::Direct),
        ]);
        let enrichment = enrichment();
        let split = CistromeBuilder::new().build_split(&enrichment.results, &resolver);

        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("out");
        write_cistromes(&dir, &split, false).unwrap();

        let mut written: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        written.sort();
        assert_eq!(written, vec![".._escape.bed", "__.bed"]);
        assert!(!root.path().join("escape.bed").exists());
    }
}
