use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use fxhash::FxHashSet;
use indicatif::ProgressBar;
use log::info;
use rayon::prelude::*;

use ctxrs_core::GenomicRegion;
use ctxrs_core::utils::read_tsv_rows;

use crate::error::{RankingStoreError, Result};
use crate::format::{CELL_BYTES, DEFAULT_CHUNK_SIZE, StoreHeader};

///
/// Builds `.ctxdb` ranking databases from motif scores.
///
pub struct RankingDbWriter {
    chunk_size: u32,
    progress: Option<ProgressBar>,
}

impl Default for RankingDbWriter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl RankingDbWriter {
    pub fn new(chunk_size: u32) -> Self {
        RankingDbWriter {
            chunk_size: chunk_size.max(1),
            progress: None,
        }
    }

    /// Tick `bar` once per chunk written.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    ///
    /// Write a database from an in-memory score matrix.
    ///
    /// # Arguments
    /// - path: output path
    /// - motifs: motif index, unique names
    /// - regions: region universe, unique coordinates
    /// - scores: one row per motif, one score per region in universe order
    ///
    /// Ranks are assigned by descending score. NaN scores rank last and ties keep
    /// universe order.
    ///
    pub fn write<P: AsRef<Path>>(
        &self,
        path: P,
        motifs: &[String],
        regions: &[GenomicRegion],
        scores: &[Vec<f32>],
    ) -> Result<()> {
        validate_input(motifs, regions, scores)?;

        let ranks: Vec<Vec<u32>> = scores.par_iter().map(|row| rank_scores(row)).collect();

        let n_chunks = StoreHeader::n_chunks(regions.len(), self.chunk_size);
        let mut header = StoreHeader {
            motifs: motifs.to_vec(),
            regions: regions.to_vec(),
            chunk_size: self.chunk_size,
            chunk_offsets: Vec::with_capacity(n_chunks),
        };
        let mut offset = StoreHeader::encoded_len(motifs, regions, self.chunk_size);
        for chunk in 0..n_chunks {
            header.chunk_offsets.push(offset);
            offset += header.chunk_width(chunk) as u64 * motifs.len() as u64 * CELL_BYTES;
        }

        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        header.write_to(&mut writer)?;

        if let Some(bar) = &self.progress {
            bar.set_length(n_chunks as u64);
        }
        let chunk_size = self.chunk_size as usize;
        for chunk in 0..n_chunks {
            let start = chunk * chunk_size;
            let end = start + header.chunk_width(chunk);
            for (motif_ranks, motif_scores) in ranks.iter().zip(scores) {
                for region in start..end {
                    writer.write_u32::<LittleEndian>(motif_ranks[region])?;
                    writer.write_f32::<LittleEndian>(motif_scores[region])?;
                }
            }
            if let Some(bar) = &self.progress {
                bar.inc(1);
            }
        }
        writer.flush()?;

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
        info!(
            "Wrote ranking database {} ({} motifs x {} regions)",
            path.display(),
            motifs.len(),
            regions.len()
        );
        Ok(())
    }

    /// Write a database from a [`ScoreTable`].
    pub fn write_table<P: AsRef<Path>>(&self, path: P, table: &ScoreTable) -> Result<()> {
        self.write(path, &table.motifs, &table.regions, &table.scores)
    }
}

fn validate_input(motifs: &[String], regions: &[GenomicRegion], scores: &[Vec<f32>]) -> Result<()> {
    if motifs.len() != scores.len() {
        return Err(RankingStoreError::InvalidInput(format!(
            "{} motifs but {} score rows",
            motifs.len(),
            scores.len()
        )));
    }
    let mut seen = FxHashSet::default();
    for motif in motifs {
        if motif.is_empty() || !seen.insert(motif.as_str()) {
            return Err(RankingStoreError::InvalidInput(format!(
                "motif names must be unique and non-empty, got '{motif}'"
            )));
        }
    }
    let mut seen = FxHashSet::default();
    for region in regions {
        if !seen.insert(region) {
            return Err(RankingStoreError::InvalidInput(format!(
                "region {region} appears twice in the universe"
            )));
        }
    }
    for (motif, row) in motifs.iter().zip(scores) {
        if row.len() != regions.len() {
            return Err(RankingStoreError::InvalidInput(format!(
                "motif {motif} has {} scores for {} regions",
                row.len(),
                regions.len()
            )));
        }
    }
    Ok(())
}

/// 1-based ranks by descending score, NaN last, ties by position.
fn rank_scores(scores: &[f32]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| descending(scores[*a], scores[*b]));

    let mut ranks = vec![0u32; scores.len()];
    for (rank, region) in order.into_iter().enumerate() {
        ranks[region] = rank as u32 + 1;
    }
    ranks
}

fn descending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

///
/// Motif score matrix parsed from a tab-separated table.
///
/// The header row is `motif` followed by region ids (`chr:start-end`); every
/// following row is a motif name and one score per region.
///
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTable {
    pub motifs: Vec<String>,
    pub regions: Vec<GenomicRegion>,
    pub scores: Vec<Vec<f32>>,
}

impl ScoreTable {
    pub fn from_tsv(path: &Path) -> Result<Self> {
        let invalid = |msg: String| RankingStoreError::InvalidInput(msg);
        let mut rows = read_tsv_rows(path).map_err(|e| invalid(format!("{e:#}")))?;

        let header = rows
            .next()
            .transpose()
            .map_err(|e| invalid(format!("{e:#}")))?
            .ok_or_else(|| invalid(format!("{} is empty", path.display())))?;
        let regions = header
            .iter()
            .skip(1)
            .map(|id| {
                id.parse::<GenomicRegion>()
                    .map_err(|_| invalid(format!("invalid region id '{id}' in header")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut motifs = Vec::new();
        let mut scores = Vec::new();
        for (line, row) in rows.enumerate() {
            let row = row.map_err(|e| invalid(format!("{e:#}")))?;
            let (motif, values) = row
                .split_first()
                .ok_or_else(|| invalid(format!("empty row {}", line + 2)))?;
            let values = values
                .iter()
                .map(|v| {
                    v.parse::<f32>().map_err(|_| {
                        invalid(format!("row {}: '{v}' is not a number", line + 2))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;
            motifs.push(motif.clone());
            scores.push(values);
        }

        Ok(ScoreTable {
            motifs,
            regions,
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RankingStore;

    use ctxrs_core::CancelToken;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    #[case(vec![0.5, 2.0, 1.0], vec![3, 1, 2])]
    #[case(vec![1.0, 1.0, 1.0], vec![1, 2, 3])]
    #[case(vec![f32::NAN, 0.0, -1.0], vec![3, 1, 2])]
    fn test_rank_scores(#[case] scores: Vec<f32>, #[case] expected: Vec<u32>) {
        assert_eq!(rank_scores(&scores), expected);
    }

    #[rstest]
    fn test_rejects_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let regions = vec![GenomicRegion::new("chr1", 0, 10).unwrap()];
        let err = RankingDbWriter::default()
            .write(
                dir.path().join("x.ctxdb"),
                &["m".to_string()],
                &regions,
                &[vec![1.0, 2.0]],
            )
            .unwrap_err();
        assert!(matches!(err, RankingStoreError::InvalidInput(_)));
    }

    #[rstest]
    fn test_rejects_duplicate_motifs() {
        let dir = tempfile::tempdir().unwrap();
        let regions = vec![GenomicRegion::new("chr1", 0, 10).unwrap()];
        let err = RankingDbWriter::default()
            .write(
                dir.path().join("x.ctxdb"),
                &["m".to_string(), "m".to_string()],
                &regions,
                &[vec![1.0], vec![2.0]],
            )
            .unwrap_err();
        assert!(matches!(err, RankingStoreError::InvalidInput(_)));
    }

    #[rstest]
    fn test_score_table_to_store() {
        let dir = tempfile::tempdir().unwrap();
        let tsv = dir.path().join("scores.tsv");
        std::fs::write(
            &tsv,
            "motif\tchr1:0-10\tchr1:20-30\tchr2:5-15\nmA\t0.1\t3.0\t2.0\nmB\t5\t4\t-1\n",
        )
        .unwrap();

        let table = ScoreTable::from_tsv(&tsv).unwrap();
        assert_eq!(table.motifs, vec!["mA", "mB"]);
        assert_eq!(table.regions.len(), 3);

        let db = dir.path().join("scores.ctxdb");
        RankingDbWriter::new(2).write_table(&db, &table).unwrap();

        let store = RankingStore::open(&db).unwrap();
        let row = store.get_ranking("mA", &CancelToken::new()).unwrap();
        assert_eq!(row.ordered_region_ids(), &[1, 2, 0]);
        assert_eq!(row.score(2), Some(2.0));
    }

    #[rstest]
    fn test_score_table_rejects_bad_number() {
        let dir = tempfile::tempdir().unwrap();
        let tsv = dir.path().join("scores.tsv");
        std::fs::write(&tsv, "motif\tchr1:0-10\nmA\thigh\n").unwrap();
        assert!(ScoreTable::from_tsv(&tsv).is_err());
    }
}
