use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use fxhash::FxHashMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use ctxrs_core::utils::get_dynamic_reader;

use crate::error::{AnnotationError, Result};
use crate::models::{AnnotationEntry, ConfidenceTier};

///
/// Row filter applied while loading an annotation table.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationFilter {
    /// Drop rows whose motif similarity q-value is above this.
    pub motif_similarity_fdr: f64,
    /// Drop rows whose orthologous identity is below this.
    pub orthologous_identity_threshold: f64,
    /// Tiers to keep.
    pub tiers: Vec<ConfidenceTier>,
}

impl Default for AnnotationFilter {
    fn default() -> Self {
        AnnotationFilter {
            motif_similarity_fdr: 0.001,
            orthologous_identity_threshold: 0.0,
            tiers: ConfidenceTier::ALL.to_vec(),
        }
    }
}

impl AnnotationFilter {
    /// A filter that keeps every row.
    pub fn keep_all() -> Self {
        AnnotationFilter {
            motif_similarity_fdr: 1.0,
            ..Default::default()
        }
    }

    pub fn accepts(&self, entry: &AnnotationEntry) -> bool {
        if !self.tiers.contains(&entry.tier) {
            return false;
        }
        if let Some(q) = entry.motif_similarity_qvalue {
            if q > self.motif_similarity_fdr {
                return false;
            }
        }
        if let Some(identity) = entry.orthologous_identity {
            if identity < self.orthologous_identity_threshold {
                return false;
            }
        }
        true
    }
}

///
/// Read-only motif to TF lookup.
///
/// A motif absent from the table resolves to no TF; that is not an error.
///
#[derive(Debug, Clone, Default)]
pub struct AnnotationResolver {
    entries: FxHashMap<String, Vec<AnnotationEntry>>,
}

impl AnnotationResolver {
    ///
    /// Build a resolver from entries. Repeated (motif, TF, tier) links are kept
    /// once.
    ///
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = AnnotationEntry>,
    {
        let mut by_motif: FxHashMap<String, Vec<AnnotationEntry>> = FxHashMap::default();
        for entry in entries {
            let links = by_motif.entry(entry.motif.clone()).or_default();
            if !links
                .iter()
                .any(|e| e.tf == entry.tf && e.tier == entry.tier)
            {
                links.push(entry);
            }
        }
        AnnotationResolver { entries: by_motif }
    }

    ///
    /// Load a tab separated annotation table, optionally gzipped.
    ///
    /// The first line is the header; a leading `#` on it is ignored. Required
    /// columns are `motif_id`, `TF_name` (or `gene_name`) and `confidence_tier`
    /// (or `description`).
    ///
    pub fn from_path(path: &Path, filter: &AnnotationFilter) -> Result<Self> {
        let reader =
            get_dynamic_reader(path).map_err(|e| AnnotationError::FileRead(format!("{e:#}")))?;
        let mut lines = reader.lines().enumerate();

        let header = loop {
            match lines.next() {
                Some((_, line)) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => {
                    return Err(AnnotationError::FileRead(format!(
                        "{} is empty",
                        path.display()
                    )));
                }
            }
        };
        let columns = Columns::from_header(&header)?;

        let mut kept = Vec::new();
        let mut rejected = 0usize;
        for (idx, line) in lines {
            let line = line?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = columns.parse_row(&line, idx + 1)?;
            if filter.accepts(&entry) {
                kept.push(entry);
            } else {
                rejected += 1;
            }
        }

        let resolver = Self::from_entries(kept);
        info!(
            "Loaded annotations for {} motifs from {} ({} rows filtered out)",
            resolver.entries.len(),
            path.display(),
            rejected
        );
        if resolver.is_empty() {
            warn!("No annotation survived filtering in {}", path.display());
        }
        Ok(resolver)
    }

    /// Every link of `motif`; empty when the motif is unannotated.
    pub fn resolve(&self, motif: &str) -> &[AnnotationEntry] {
        self.entries.get(motif).map(Vec::as_slice).unwrap_or(&[])
    }

    /// TF names linked to `motif` grouped by tier.
    pub fn annotations_by_tier(&self, motif: &str) -> BTreeMap<ConfidenceTier, Vec<&str>> {
        let mut grouped: BTreeMap<ConfidenceTier, Vec<&str>> = BTreeMap::new();
        for entry in self.resolve(motif) {
            grouped.entry(entry.tier).or_default().push(&entry.tf);
        }
        for tfs in grouped.values_mut() {
            tfs.sort_unstable();
            tfs.dedup();
        }
        grouped
    }

    /// Number of annotated motifs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn motifs(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }
}

/// Column positions of an annotation table.
struct Columns {
    n_columns: usize,
    motif: usize,
    tf: usize,
    tier: usize,
    qvalue: Option<usize>,
    identity: Option<usize>,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self> {
        let names: Vec<String> = header
            .trim_start_matches('#')
            .trim_end()
            .split('\t')
            .map(|c| c.trim().to_lowercase())
            .collect();
        let find = |aliases: &[&str]| names.iter().position(|n| aliases.contains(&n.as_str()));
        let require = |aliases: &[&str]| {
            find(aliases).ok_or_else(|| AnnotationError::MissingColumn(aliases[0].to_string()))
        };

        Ok(Columns {
            n_columns: names.len(),
            motif: require(&["motif_id"])?,
            tf: require(&["tf_name", "gene_name"])?,
            tier: require(&["confidence_tier", "description"])?,
            qvalue: find(&["motif_similarity_qvalue"]),
            identity: find(&["orthologous_identity"]),
        })
    }

    fn parse_row(&self, line: &str, line_no: usize) -> Result<AnnotationEntry> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        if fields.len() < self.n_columns {
            return Err(AnnotationError::Parse {
                line: line_no,
                reason: format!(
                    "expected {} columns, found {}",
                    self.n_columns,
                    fields.len()
                ),
            });
        }

        let tier_field = fields[self.tier];
        let tier = tier_field
            .parse::<ConfidenceTier>()
            .map_err(|_| AnnotationError::InvalidTier {
                line: line_no,
                value: tier_field.to_string(),
            })?;

        let number = |idx: Option<usize>| -> Result<Option<f64>> {
            match idx.map(|i| fields[i].trim()) {
                None | Some("") | Some("None") | Some("NA") => Ok(None),
                Some(value) => value.parse::<f64>().map(Some).map_err(|_| {
                    AnnotationError::Parse {
                        line: line_no,
                        reason: format!("'{value}' is not a number"),
                    }
                }),
            }
        };

        Ok(AnnotationEntry {
            motif: fields[self.motif].to_string(),
            tf: fields[self.tf].to_string(),
            tier,
            motif_similarity_qvalue: number(self.qvalue)?,
            orthologous_identity: number(self.identity)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;

    fn get_test_path(file: &str) -> PathBuf {
        let file_path: PathBuf = std::env::current_dir()
            .unwrap()
            .join("../tests/data/annotations")
            .join(file);
        file_path
    }

    #[rstest]
    fn test_resolve_both_tiers() {
        let resolver = AnnotationResolver::from_entries(vec![
            AnnotationEntry::new("m1", "TF_A", ConfidenceTier::Direct),
            AnnotationEntry::new("m1", "TF_B", ConfidenceTier::Orthology),
        ]);
        let links = resolver.resolve("m1");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].tf, "TF_A");
        assert_eq!(links[1].tier, ConfidenceTier::Orthology);
    }

    #[rstest]
    fn test_unannotated_motif_is_empty() {
        let resolver =
            AnnotationResolver::from_entries(vec![AnnotationEntry::new("m1", "TF_A", ConfidenceTier::Direct)]);
        assert!(resolver.resolve("m404").is_empty());
    }

    #[rstest]
    fn test_load_table_with_default_filter() {
        let resolver =
            AnnotationResolver::from_path(&get_test_path("motifs.tbl"), &AnnotationFilter::default())
                .unwrap();

        assert_eq!(resolver.len(), 3);
        // TF_D's q-value of 0.01 is above the default fdr
        let m2: Vec<&str> = resolver.resolve("m2").iter().map(|e| e.tf.as_str()).collect();
        assert_eq!(m2, vec!["TF_C"]);
        // the duplicate direct row for m3 is kept once
        assert_eq!(resolver.resolve("m3").len(), 2);
        assert_eq!(resolver.resolve("m3")[0].tier, ConfidenceTier::MotifSimilarity);
    }

    #[rstest]
    fn test_tier_filter_and_identity() {
        let filter = AnnotationFilter {
            orthologous_identity_threshold: 0.9,
            tiers: vec![ConfidenceTier::Direct, ConfidenceTier::Orthology],
            ..Default::default()
        };
        let resolver = AnnotationResolver::from_path(&get_test_path("motifs.tbl"), &filter).unwrap();

        let m1: Vec<&str> = resolver.resolve("m1").iter().map(|e| e.tf.as_str()).collect();
        assert_eq!(m1, vec!["TF_A"]);
        assert!(resolver.resolve("m2").is_empty());
    }

    #[rstest]
    fn test_annotations_by_tier() {
        let resolver =
            AnnotationResolver::from_path(&get_test_path("motifs.tbl"), &AnnotationFilter::keep_all())
                .unwrap();
        let grouped = resolver.annotations_by_tier("m1");
        assert_eq!(grouped[&ConfidenceTier::Direct], vec!["TF_A"]);
        assert_eq!(grouped[&ConfidenceTier::Orthology], vec!["TF_B"]);
        assert!(!grouped.contains_key(&ConfidenceTier::MotifSimilarity));
    }

    #[rstest]
    fn test_gzipped_table_with_tier_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annot.tsv.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        encoder
            .write_all(b"motif_id\tTF_name\tconfidence_tier\nmX\tTF_X\tOrthology_annot\n")
            .unwrap();
        encoder.finish().unwrap();

        let resolver = AnnotationResolver::from_path(&path, &AnnotationFilter::default()).unwrap();
        assert_eq!(resolver.resolve("mX")[0].tier, ConfidenceTier::Orthology);
    }

    #[rstest]
    fn test_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annot.tsv");
        std::fs::write(&path, "motif_id\tdescription\nm1\tgene is directly annotated\n").unwrap();

        let err = AnnotationResolver::from_path(&path, &AnnotationFilter::default()).unwrap_err();
        assert!(matches!(err, AnnotationError::MissingColumn(c) if c == "tf_name"));
    }

    #[rstest]
    fn test_invalid_tier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annot.tsv");
        std::fs::write(&path, "motif_id\tTF_name\tconfidence_tier\nm1\tTF_A\tmaybe\n").unwrap();

        let err = AnnotationResolver::from_path(&path, &AnnotationFilter::default()).unwrap_err();
        assert!(matches!(err, AnnotationError::InvalidTier { line: 2, .. }));
    }
}
