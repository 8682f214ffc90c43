use std::fmt::{self, Display};
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use fxhash::FxHashSet;
use log::{debug, warn};
#[cfg(feature = "serde")]
use serde::Serialize;

use crate::errors::RegionSetError;
use crate::models::region::{GenomicRegion, Strand};
use crate::utils::get_dynamic_reader;

///
/// A named, ordered collection of unique genomic regions.
///
/// Membership is deduplicated by coordinate identity when the set is built; the
/// first occurrence of a region wins and input order is otherwise kept. A
/// `RegionSet` is never modified after construction, operations that change
/// membership return a new set.
///
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RegionSet {
    name: String,
    regions: Vec<GenomicRegion>,
    #[cfg_attr(feature = "serde", serde(skip))]
    members: FxHashSet<GenomicRegion>,
}

impl RegionSet {
    ///
    /// Build a region set, dropping duplicate coordinates.
    ///
    pub fn new<I>(name: impl Into<String>, regions: I) -> Self
    where
        I: IntoIterator<Item = GenomicRegion>,
    {
        let mut members: FxHashSet<GenomicRegion> = FxHashSet::default();
        let mut unique: Vec<GenomicRegion> = Vec::new();

        for region in regions {
            if members.insert(region.clone()) {
                unique.push(region);
            }
        }

        RegionSet {
            name: name.into(),
            regions: unique,
            members,
        }
    }

    ///
    /// Build a region set from raw `(chr, start, end)` tuples, validating each.
    ///
    pub fn from_tuples<S, I>(name: impl Into<String>, tuples: I) -> Result<Self, RegionSetError>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, u32, u32)>,
    {
        let regions = tuples
            .into_iter()
            .map(|(chr, start, end)| GenomicRegion::new(chr, start, end))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RegionSet::new(name, regions))
    }

    ///
    /// Read a BED(-like) file, optionally gzipped. Track, browser and comment
    /// lines are skipped, as is a column header line. The set is named after the
    /// file stem.
    ///
    pub fn from_bed(path: &Path) -> Result<Self, RegionSetError> {
        let name = bed_stem(path);
        let reader = get_dynamic_reader(path)
            .map_err(|e| RegionSetError::FileReadError(format!("{}: {e}", path.display())))?;

        let mut regions: Vec<GenomicRegion> = Vec::new();
        let mut first_line = true;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty()
                || line.starts_with("browser")
                || line.starts_with("track")
                || line.starts_with('#')
            {
                continue;
            }

            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 3 {
                return Err(RegionSetError::RegionParseError(line));
            }

            // column headers like `chr start end` without a leading #
            if first_line {
                first_line = false;
                if parts[1].parse::<u32>().is_err() {
                    debug!("{}: skipping header line {}", path.display(), line);
                    continue;
                }
            }

            let start = parts[1]
                .parse::<u32>()
                .map_err(|_| RegionSetError::RegionParseError(line.clone()))?;
            let end = parts[2]
                .parse::<u32>()
                .map_err(|_| RegionSetError::RegionParseError(line.clone()))?;

            let mut region = GenomicRegion::new(parts[0], start, end)?;
            if let Some(strand) = parts.get(5).and_then(|s| s.parse::<Strand>().ok()) {
                region = region.with_strand(strand);
            }
            regions.push(region);
        }

        let n_lines = regions.len();
        let region_set = RegionSet::new(name, regions);
        if region_set.len() < n_lines {
            warn!(
                "{}: dropped {} duplicate regions",
                path.display(),
                n_lines - region_set.len()
            );
        }
        debug!("{}: read {} regions", path.display(), region_set.len());
        Ok(region_set)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    ///
    /// Same regions under a different name.
    ///
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        RegionSet {
            name: name.into(),
            regions: self.regions.clone(),
            members: self.members.clone(),
        }
    }

    pub fn regions(&self) -> &[GenomicRegion] {
        &self.regions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GenomicRegion> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn contains(&self, region: &GenomicRegion) -> bool {
        self.members.contains(region)
    }

    pub fn is_subset_of(&self, other: &RegionSet) -> bool {
        self.regions.iter().all(|r| other.contains(r))
    }

    ///
    /// Set union: regions of `self` first, then the new regions of `other`.
    ///
    pub fn union(&self, other: &RegionSet) -> RegionSet {
        RegionSet::new(
            self.name.clone(),
            self.regions.iter().chain(other.regions.iter()).cloned(),
        )
    }

    ///
    /// Regions of `self` that are not in `other`.
    ///
    pub fn difference(&self, other: &RegionSet) -> RegionSet {
        RegionSet::new(
            self.name.clone(),
            self.regions.iter().filter(|r| !other.contains(r)).cloned(),
        )
    }

    ///
    /// Keep only the regions matching `predicate`.
    ///
    pub fn filter<F>(&self, predicate: F) -> RegionSet
    where
        F: Fn(&GenomicRegion) -> bool,
    {
        RegionSet::new(
            self.name.clone(),
            self.regions.iter().filter(|r| predicate(r)).cloned(),
        )
    }

    ///
    /// Regions sorted by chromosome, start and end.
    ///
    pub fn sorted(&self) -> RegionSet {
        let mut regions = self.regions.clone();
        regions.sort();
        RegionSet::new(self.name.clone(), regions)
    }

    ///
    /// Merge overlapping and book-ended regions into a set of disjoint intervals.
    /// Strand information is dropped.
    ///
    pub fn reduce(&self) -> RegionSet {
        let mut sorted: Vec<&GenomicRegion> = self.regions.iter().collect();
        sorted.sort();

        let mut merged: Vec<GenomicRegion> = Vec::new();
        let mut current: Option<GenomicRegion> = None;

        for region in sorted {
            current = match current {
                Some(open) if open.chr() == region.chr() && region.start() <= open.end() => {
                    Some(open.extended_to(region.end()))
                }
                Some(open) => {
                    merged.push(open);
                    Some(region.extended_to(region.end()))
                }
                None => Some(region.extended_to(region.end())),
            };
        }
        merged.extend(current);

        RegionSet::new(self.name.clone(), merged)
    }

    ///
    /// Save the region set to disk as a BED file
    ///
    /// # Arguments
    /// - path: the path to the file to dump to
    pub fn to_bed<T: AsRef<Path>>(&self, path: T) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);
        for region in &self.regions {
            writeln!(writer, "{}", region.as_bed_line())?;
        }
        writer.flush()
    }
}

impl PartialEq for RegionSet {
    /// Two sets are equal when they hold the same regions, regardless of order or name.
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

impl Eq for RegionSet {}

impl<'a> IntoIterator for &'a RegionSet {
    type Item = &'a GenomicRegion;
    type IntoIter = std::slice::Iter<'a, GenomicRegion>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

impl Display for RegionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionSet '{}' with {} regions.", self.name, self.len())
    }
}

fn bed_stem(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_name = file_name.strip_suffix(".gz").unwrap_or(&file_name);
    match file_name.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => file_name.to_string(),
    }
}

///
/// Anything the engines can take as a region set. Conversion validates
/// coordinates and deduplicates membership.
///
pub trait IntoRegionSet {
    fn into_region_set(self, name: &str) -> Result<RegionSet, RegionSetError>;
}

impl IntoRegionSet for RegionSet {
    fn into_region_set(self, name: &str) -> Result<RegionSet, RegionSetError> {
        if self.name == name {
            Ok(self)
        } else {
            Ok(self.renamed(name))
        }
    }
}

impl IntoRegionSet for Vec<GenomicRegion> {
    fn into_region_set(self, name: &str) -> Result<RegionSet, RegionSetError> {
        Ok(RegionSet::new(name, self))
    }
}

impl IntoRegionSet for Vec<(String, u32, u32)> {
    fn into_region_set(self, name: &str) -> Result<RegionSet, RegionSetError> {
        RegionSet::from_tuples(name, self)
    }
}

impl IntoRegionSet for &[(&str, u32, u32)] {
    fn into_region_set(self, name: &str) -> Result<RegionSet, RegionSetError> {
        RegionSet::from_tuples(name, self.iter().copied())
    }
}

impl IntoRegionSet for &Path {
    fn into_region_set(self, name: &str) -> Result<RegionSet, RegionSetError> {
        Ok(RegionSet::from_bed(self)?.renamed(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::path::PathBuf;

    fn get_test_path(file_name: &str) -> PathBuf {
        std::env::current_dir()
            .unwrap()
            .join("../tests/data/regionset")
            .join(file_name)
    }

    fn make_regionset(regions: &[(&str, u32, u32)]) -> RegionSet {
        regions.into_region_set("test").unwrap()
    }

    #[rstest]
    fn test_deduplicates_and_keeps_order() {
        let rs = make_regionset(&[("chr2", 5, 10), ("chr1", 0, 10), ("chr2", 5, 10)]);
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.regions()[0].region_id(), "chr2:5-10");
        assert_eq!(rs.regions()[1].region_id(), "chr1:0-10");
    }

    #[rstest]
    fn test_from_bed_drops_duplicate_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dups.bed");
        std::fs::write(
            &path,
            "chrom\tstart\tend\nchr1\t10\t20\nchr1\t30\t40\nchr1\t10\t20\n",
        )
        .unwrap();

        let rs = RegionSet::from_bed(&path).unwrap();
        assert_eq!(rs.name(), "dups");
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.regions()[1].region_id(), "chr1:30-40");
    }

    #[rstest]
    fn test_invalid_tuple_is_rejected() {
        let tuples: &[(&str, u32, u32)] = &[("chr1", 10, 5)];
        assert!(tuples.into_region_set("bad").is_err());
    }

    #[rstest]
    fn test_union_and_subset() {
        let a = make_regionset(&[("chr1", 0, 10), ("chr1", 20, 30)]);
        let b = make_regionset(&[("chr1", 20, 30), ("chr1", 40, 50)]);
        let union = a.union(&b);
        assert_eq!(union.len(), 3);
        assert!(a.is_subset_of(&union));
        assert!(b.is_subset_of(&union));
        assert!(!union.is_subset_of(&a));
        assert_eq!(union.difference(&b).len(), 1);
    }

    #[rstest]
    fn test_set_equality_ignores_order() {
        let a = make_regionset(&[("chr1", 0, 10), ("chr1", 20, 30)]);
        let b = make_regionset(&[("chr1", 20, 30), ("chr1", 0, 10)]);
        assert_eq!(a, b);
    }

    #[rstest]
    fn test_reduce() {
        let rs = make_regionset(&[
            ("chr1", 20, 30),
            ("chr1", 0, 10),
            ("chr1", 5, 15),
            ("chr1", 15, 18),
            ("chr2", 0, 5),
        ]);
        let reduced = rs.reduce();
        let ids: Vec<String> = reduced.iter().map(|r| r.region_id()).collect();
        assert_eq!(ids, vec!["chr1:0-18", "chr1:20-30", "chr2:0-5"]);
    }

    #[rstest]
    fn test_read_bed() {
        let rs = RegionSet::from_bed(&get_test_path("dummy.bed")).unwrap();
        assert_eq!(rs.name(), "dummy");
        assert_eq!(rs.len(), 4);
    }

    #[rstest]
    fn test_read_bed_with_headers() {
        let rs = RegionSet::from_bed(&get_test_path("dummy_headers.bed")).unwrap();
        assert_eq!(rs.len(), 3);
        assert_eq!(rs.regions()[0].strand(), Some(Strand::Forward));
    }

    #[rstest]
    fn test_save_bed_roundtrip() {
        let rs = make_regionset(&[("chr1", 0, 10), ("chr3", 20, 30)]);
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("out/test.bed");
        rs.to_bed(&path).unwrap();

        let reloaded = RegionSet::from_bed(&path).unwrap();
        assert_eq!(reloaded, rs);
        assert_eq!(reloaded.name(), "test");
    }
}
