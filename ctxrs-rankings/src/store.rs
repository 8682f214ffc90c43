use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use fxhash::FxHashMap;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use rayon::prelude::*;

use ctxrs_core::{CancelToken, GenomicRegion, RegionIndex, RegionSet};

use crate::error::{RankingStoreError, Result};
use crate::format::{CELL_BYTES, StoreHeader, decode_cells};
use crate::models::{RankingMatrix, RankingRow};

/// How long fetched [`RankingRow`]s are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Keep every fetched row until the store is closed or the cache is cleared.
    #[default]
    Unbounded,
    /// Never keep rows; every call reads from disk.
    Disabled,
}

/// What [`RankingStore::get_rankings`] does with regions missing from the universe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingRegionPolicy {
    /// Leave the region out of the result and report it in [`RankingMatrix::dropped`].
    #[default]
    Drop,
    /// Fail with [`RankingStoreError::MissingRegion`].
    Abort,
}

type RowCell = Arc<OnceCell<Arc<RankingRow>>>;

///
/// Read-only handle on a `.ctxdb` ranking database.
///
/// Only the header (motif and region indices) is held in memory. Rows and column
/// subsets are read from disk on request; full rows are cached per motif, and
/// concurrent requests for the same motif share a single disk read.
///
#[derive(Debug)]
pub struct RankingStore {
    path: PathBuf,
    name: String,
    header: StoreHeader,
    motif_lookup: FxHashMap<String, usize>,
    region_lookup: FxHashMap<GenomicRegion, usize>,
    cache_policy: CachePolicy,
    cache: Mutex<FxHashMap<usize, RowCell>>,
    row_reads: AtomicUsize,
}

impl RankingStore {
    ///
    /// Open a ranking database and validate its structure.
    ///
    /// # Arguments
    /// - path: path to a `.ctxdb` file
    ///
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_policy(path, CachePolicy::default())
    }

    pub fn open_with_policy<P: AsRef<Path>>(path: P, cache_policy: CachePolicy) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let header = StoreHeader::read_from(&mut reader, file_len, path)?;

        let mut motif_lookup = FxHashMap::default();
        for (idx, motif) in header.motifs.iter().enumerate() {
            if motif_lookup.insert(motif.clone(), idx).is_some() {
                return Err(RankingStoreError::corrupt(
                    path,
                    format!("motif {motif} is declared twice"),
                ));
            }
        }

        let mut region_lookup = FxHashMap::default();
        for (idx, region) in header.regions.iter().enumerate() {
            if region_lookup.insert(region.clone(), idx).is_some() {
                return Err(RankingStoreError::corrupt(
                    path,
                    format!("region {region} is declared twice"),
                ));
            }
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        info!(
            "Opened ranking database {} ({} motifs x {} regions, chunks of {})",
            path.display(),
            header.motifs.len(),
            header.regions.len(),
            header.chunk_size
        );

        Ok(RankingStore {
            path: path.to_path_buf(),
            name,
            header,
            motif_lookup,
            region_lookup,
            cache_policy,
            cache: Mutex::new(FxHashMap::default()),
            row_reads: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Database name, the file stem of its path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Motif index in database order.
    pub fn motifs(&self) -> &[String] {
        &self.header.motifs
    }

    /// Region universe in database order.
    pub fn regions(&self) -> &[GenomicRegion] {
        &self.header.regions
    }

    pub fn universe_size(&self) -> usize {
        self.header.regions.len()
    }

    pub fn contains_motif(&self, motif: &str) -> bool {
        self.motif_lookup.contains_key(motif)
    }

    /// Universe id of `region`, if it is part of the database.
    pub fn region_id(&self, region: &GenomicRegion) -> Option<usize> {
        self.region_lookup.get(region).copied()
    }

    /// Interval index over the region universe, for mapping arbitrary peaks onto it.
    pub fn region_index(&self) -> RegionIndex {
        RegionIndex::new(self.header.regions.clone())
    }

    /// Number of full rows read from disk so far.
    pub fn disk_row_reads(&self) -> usize {
        self.row_reads.load(Ordering::Relaxed)
    }

    fn motif_index(&self, motif: &str) -> Result<usize> {
        self.motif_lookup
            .get(motif)
            .copied()
            .ok_or_else(|| RankingStoreError::MissingMotif(motif.to_string()))
    }

    ///
    /// Full ranking of one motif over the region universe.
    ///
    /// Concurrent calls for the same motif block on one shared read instead of
    /// reading the row twice. A failed read leaves nothing behind in the cache.
    ///
    pub fn get_ranking(&self, motif: &str, cancel: &CancelToken) -> Result<Arc<RankingRow>> {
        let idx = self.motif_index(motif)?;

        match self.cache_policy {
            CachePolicy::Disabled => self.read_row(idx, cancel).map(Arc::new),
            CachePolicy::Unbounded => {
                let cell = {
                    let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
                    cache.entry(idx).or_default().clone()
                };
                cell.get_or_try_init(|| self.read_row(idx, cancel).map(Arc::new))
                    .cloned()
            }
        }
    }

    fn cached_row(&self, idx: usize) -> Option<Arc<RankingRow>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(&idx).and_then(|cell| cell.get().cloned())
    }

    /// Drop every cached row.
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Release the store and its cache.
    pub fn close(self) {
        debug!("Closing ranking database {}", self.path.display());
    }

    fn read_row(&self, idx: usize, cancel: &CancelToken) -> Result<RankingRow> {
        let n_regions = self.universe_size();
        let mut ranks = Vec::with_capacity(n_regions);
        let mut scores = Vec::with_capacity(n_regions);

        let mut file = File::open(&self.path)?;
        let mut buf = Vec::new();
        for chunk in 0..self.header.chunk_offsets.len() {
            cancel.check()?;
            let width = self.header.chunk_width(chunk);
            buf.resize(width * CELL_BYTES as usize, 0);
            file.seek(SeekFrom::Start(self.header.slab_offset(chunk, idx)))?;
            file.read_exact(&mut buf)?;
            decode_cells(&buf, &mut ranks, &mut scores);
        }

        // ranks must be a permutation of 1..=n
        let mut order = vec![u32::MAX; n_regions];
        for (region_id, rank) in ranks.iter().enumerate() {
            let slot = (*rank as usize).checked_sub(1).filter(|s| *s < n_regions);
            match slot {
                Some(slot) if order[slot] == u32::MAX => order[slot] = region_id as u32,
                _ => {
                    return Err(RankingStoreError::corrupt(
                        &self.path,
                        format!(
                            "motif {} has invalid or repeated rank {rank}",
                            self.header.motifs[idx]
                        ),
                    ));
                }
            }
        }

        self.row_reads.fetch_add(1, Ordering::Relaxed);
        debug!("Read ranking row for motif {}", self.header.motifs[idx]);

        Ok(RankingRow::new(
            self.header.motifs[idx].clone(),
            order,
            ranks,
            scores,
        ))
    }

    ///
    /// Ranks and scores of every motif, restricted to the regions of `region_set`.
    ///
    pub fn get_rankings(
        &self,
        region_set: &RegionSet,
        missing: MissingRegionPolicy,
        cancel: &CancelToken,
    ) -> Result<RankingMatrix> {
        self.get_rankings_for_motifs(region_set, &self.header.motifs, missing, cancel)
    }

    ///
    /// Ranks and scores of the given motifs, restricted to the regions of
    /// `region_set`.
    ///
    /// Only the chunks holding requested regions are read, and within each chunk
    /// only the span between the first and last requested column. Motifs whose
    /// full row is already cached are served from memory.
    ///
    pub fn get_rankings_for_motifs<S: AsRef<str>>(
        &self,
        region_set: &RegionSet,
        motifs: &[S],
        missing: MissingRegionPolicy,
        cancel: &CancelToken,
    ) -> Result<RankingMatrix> {
        let motif_ids = motifs
            .iter()
            .map(|m| self.motif_index(m.as_ref()))
            .collect::<Result<Vec<usize>>>()?;

        let mut found = Vec::with_capacity(region_set.len());
        let mut region_ids = Vec::with_capacity(region_set.len());
        let mut dropped = Vec::new();
        for region in region_set {
            match self.region_lookup.get(region) {
                Some(id) => {
                    found.push(region.clone());
                    region_ids.push(*id);
                }
                None => match missing {
                    MissingRegionPolicy::Abort => {
                        return Err(RankingStoreError::MissingRegion(region.region_id()));
                    }
                    MissingRegionPolicy::Drop => dropped.push(region.clone()),
                },
            }
        }
        if !dropped.is_empty() {
            warn!(
                "Dropped {} of {} regions of {} absent from ranking database {}",
                dropped.len(),
                region_set.len(),
                region_set.name(),
                self.name
            );
        }

        let width = region_ids.len();
        let mut ranks = vec![0u32; motif_ids.len() * width];
        let mut scores = vec![0f32; motif_ids.len() * width];

        let mut from_disk = Vec::new();
        for (sel, idx) in motif_ids.iter().enumerate() {
            match self.cached_row(*idx) {
                Some(row) => {
                    for (col, region_id) in region_ids.iter().enumerate() {
                        ranks[sel * width + col] = row.ranks()[*region_id];
                        scores[sel * width + col] = row.scores()[*region_id];
                    }
                }
                None => from_disk.push((sel, *idx)),
            }
        }

        if !from_disk.is_empty() && width > 0 {
            // (output column, column within chunk), grouped by chunk
            let chunk_size = self.header.chunk_size as usize;
            let mut by_chunk: FxHashMap<usize, Vec<(usize, usize)>> = FxHashMap::default();
            for (col, region_id) in region_ids.iter().enumerate() {
                by_chunk
                    .entry(region_id / chunk_size)
                    .or_default()
                    .push((col, region_id % chunk_size));
            }
            let mut chunks: Vec<(usize, Vec<(usize, usize)>)> = by_chunk.into_iter().collect();
            chunks.sort_unstable_by_key(|(chunk, _)| *chunk);

            let slabs = chunks
                .par_iter()
                .map(|(chunk, columns)| self.read_columns(*chunk, columns, &from_disk, cancel))
                .collect::<Result<Vec<_>>>()?;

            let n_regions = self.universe_size() as u32;
            for ((_, columns), cells) in chunks.iter().zip(slabs) {
                for ((sel, idx), motif_cells) in from_disk.iter().zip(cells) {
                    for ((col, _), (rank, score)) in columns.iter().zip(motif_cells) {
                        if rank == 0 || rank > n_regions {
                            return Err(RankingStoreError::corrupt(
                                &self.path,
                                format!(
                                    "motif {} has out of range rank {rank}",
                                    self.header.motifs[*idx]
                                ),
                            ));
                        }
                        ranks[sel * width + col] = rank;
                        scores[sel * width + col] = score;
                    }
                }
            }
        }

        Ok(RankingMatrix::new(
            motif_ids
                .iter()
                .map(|idx| self.header.motifs[*idx].clone())
                .collect(),
            RegionSet::new(region_set.name(), found),
            region_ids,
            dropped,
            self.universe_size(),
            ranks,
            scores,
        ))
    }

    /// Read the requested columns of one chunk for each motif in `motifs`.
    fn read_columns(
        &self,
        chunk: usize,
        columns: &[(usize, usize)],
        motifs: &[(usize, usize)],
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<(u32, f32)>>> {
        cancel.check()?;

        let first = columns.iter().map(|(_, local)| *local).min().unwrap_or(0);
        let last = columns.iter().map(|(_, local)| *local).max().unwrap_or(0);
        let span = last - first + 1;

        let mut file = File::open(&self.path)?;
        let mut buf = vec![0u8; span * CELL_BYTES as usize];
        let mut ranks = Vec::with_capacity(span);
        let mut scores = Vec::with_capacity(span);

        let mut out = Vec::with_capacity(motifs.len());
        for (_, idx) in motifs {
            let offset = self.header.slab_offset(chunk, *idx) + first as u64 * CELL_BYTES;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf)?;

            ranks.clear();
            scores.clear();
            decode_cells(&buf, &mut ranks, &mut scores);
            out.push(
                columns
                    .iter()
                    .map(|(_, local)| (ranks[local - first], scores[local - first]))
                    .collect(),
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::RankingDbWriter;

    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn region(i: u32) -> GenomicRegion {
        GenomicRegion::new("chr1", i * 1000, i * 1000 + 500).unwrap()
    }

    /// 3 motifs over 10 regions, chunks of 4. Motif m1 favours r3 then r1.
    #[fixture]
    fn store_dir() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let regions: Vec<GenomicRegion> = (0..10).map(region).collect();
        let motifs = vec!["m1".to_string(), "m2".to_string(), "m3".to_string()];

        let mut m1 = vec![0.0f32; 10];
        m1[3] = 10.0;
        m1[1] = 9.0;
        m1[7] = 8.0;
        let m2: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let m3: Vec<f32> = (0..10).map(|i| ((i * 7) % 10) as f32).collect();

        RankingDbWriter::new(4)
            .write(dir.path().join("db.ctxdb"), &motifs, &regions, &[m1, m2, m3])
            .unwrap();
        dir
    }

    #[rstest]
    fn test_open_reads_indices(store_dir: TempDir) {
        let store = RankingStore::open(store_dir.path().join("db.ctxdb")).unwrap();
        assert_eq!(store.name(), "db");
        assert_eq!(store.motifs(), &["m1", "m2", "m3"]);
        assert_eq!(store.universe_size(), 10);
        assert_eq!(store.region_id(&region(7)), Some(7));
    }

    #[rstest]
    fn test_get_ranking_orders_by_score(store_dir: TempDir) {
        let store = RankingStore::open(store_dir.path().join("db.ctxdb")).unwrap();
        let row = store.get_ranking("m1", &CancelToken::new()).unwrap();

        assert_eq!(&row.ordered_region_ids()[..3], &[3, 1, 7]);
        assert_eq!(row.rank(3), Some(1));
        assert_eq!(row.rank(1), Some(2));
        assert_eq!(row.score(7), Some(8.0));
        // ties keep universe order
        assert_eq!(row.rank(0), Some(4));
        assert_eq!(row.rank(2), Some(5));
    }

    #[rstest]
    fn test_get_ranking_is_cached(store_dir: TempDir) {
        let store = RankingStore::open(store_dir.path().join("db.ctxdb")).unwrap();
        let cancel = CancelToken::new();
        let first = store.get_ranking("m2", &cancel).unwrap();
        let second = store.get_ranking("m2", &cancel).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.disk_row_reads(), 1);

        store.clear_cache();
        store.get_ranking("m2", &cancel).unwrap();
        assert_eq!(store.disk_row_reads(), 2);
    }

    #[rstest]
    fn test_concurrent_requests_share_one_read(store_dir: TempDir) {
        let store = RankingStore::open(store_dir.path().join("db.ctxdb")).unwrap();
        let cancel = CancelToken::new();

        let rows: Vec<Arc<RankingRow>> = (0..16)
            .into_par_iter()
            .map(|_| store.get_ranking("m3", &cancel).unwrap())
            .collect();

        assert!(rows.iter().all(|row| Arc::ptr_eq(row, &rows[0])));
        assert_eq!(store.disk_row_reads(), 1);
    }

    #[rstest]
    fn test_disabled_cache_reads_every_time(store_dir: TempDir) {
        let store =
            RankingStore::open_with_policy(store_dir.path().join("db.ctxdb"), CachePolicy::Disabled)
                .unwrap();
        let cancel = CancelToken::new();
        store.get_ranking("m1", &cancel).unwrap();
        store.get_ranking("m1", &cancel).unwrap();
        assert_eq!(store.disk_row_reads(), 2);
    }

    #[rstest]
    fn test_missing_motif(store_dir: TempDir) {
        let store = RankingStore::open(store_dir.path().join("db.ctxdb")).unwrap();
        let err = store.get_ranking("nope", &CancelToken::new()).unwrap_err();
        assert!(matches!(err, RankingStoreError::MissingMotif(_)));
    }

    #[rstest]
    fn test_get_rankings_matches_full_rows(store_dir: TempDir) {
        let store = RankingStore::open(store_dir.path().join("db.ctxdb")).unwrap();
        let cancel = CancelToken::new();
        let query = RegionSet::new("q", vec![region(9), region(1), region(3)]);

        let matrix = store
            .get_rankings(&query, MissingRegionPolicy::Drop, &cancel)
            .unwrap();
        assert_eq!(matrix.n_motifs(), 3);
        assert_eq!(matrix.region_ids(), &[9, 1, 3]);

        for motif in store.motifs() {
            let row = store.get_ranking(motif, &cancel).unwrap();
            let partial = matrix.get(motif).unwrap();
            let expected: Vec<u32> = [9, 1, 3].iter().map(|i| row.rank(*i).unwrap()).collect();
            assert_eq!(partial.ranks, expected.as_slice());
        }
        assert_eq!(matrix.get("m1").unwrap().ranks, &[10, 2, 1]);
    }

    #[rstest]
    fn test_get_rankings_missing_region_policy(store_dir: TempDir) {
        let store = RankingStore::open(store_dir.path().join("db.ctxdb")).unwrap();
        let cancel = CancelToken::new();
        let outsider = GenomicRegion::new("chr9", 1, 2).unwrap();
        let query = RegionSet::new("q", vec![region(1), outsider.clone()]);

        let matrix = store
            .get_rankings(&query, MissingRegionPolicy::Drop, &cancel)
            .unwrap();
        assert_eq!(matrix.regions().len(), 1);
        assert_eq!(matrix.dropped(), &[outsider]);

        let err = store
            .get_rankings(&query, MissingRegionPolicy::Abort, &cancel)
            .unwrap_err();
        assert!(matches!(err, RankingStoreError::MissingRegion(id) if id == "chr9:1-2"));
    }

    #[rstest]
    fn test_cancelled_read(store_dir: TempDir) {
        let store = RankingStore::open(store_dir.path().join("db.ctxdb")).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = store.get_ranking("m1", &cancel).unwrap_err();
        assert!(matches!(err, RankingStoreError::Cancelled(_)));
        // a failed fetch is not cached
        assert!(store.get_ranking("m1", &CancelToken::new()).is_ok());
    }

    #[rstest]
    fn test_truncated_file_is_corrupt(store_dir: TempDir) {
        let path = store_dir.path().join("db.ctxdb");
        let bytes = std::fs::read(&path).unwrap();
        let truncated = store_dir.path().join("short.ctxdb");
        let mut file = File::create(&truncated).unwrap();
        file.write_all(&bytes[..bytes.len() - 8]).unwrap();

        let err = RankingStore::open(&truncated).unwrap_err();
        assert!(matches!(err, RankingStoreError::CorruptStore { .. }));
    }

    #[rstest]
    fn test_duplicate_rank_is_corrupt(store_dir: TempDir) {
        let path = store_dir.path().join("db.ctxdb");
        let store = RankingStore::open(&path).unwrap();
        // overwrite region 0's rank for m1 with region 3's rank (1)
        let offset = store.header.slab_offset(0, 0) as usize;
        drop(store);

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[offset..offset + 4].copy_from_slice(&1u32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        let store = RankingStore::open(&path).unwrap();
        let err = store.get_ranking("m1", &CancelToken::new()).unwrap_err();
        assert!(matches!(err, RankingStoreError::CorruptStore { .. }));
    }
}
