use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::errors::RegionSetError;

///
/// Strand of a genomic region. `Unknown` corresponds to `.` in BED files.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Strand {
    Forward,
    Reverse,
    Unknown,
}

impl FromStr for Strand {
    type Err = RegionSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Strand::Forward),
            "-" => Ok(Strand::Reverse),
            "." => Ok(Strand::Unknown),
            _ => Err(RegionSetError::RegionParseError(format!(
                "Invalid strand: {s}"
            ))),
        }
    }
}

impl Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strand::Forward => "+",
            Strand::Reverse => "-",
            Strand::Unknown => ".",
        };
        write!(f, "{s}")
    }
}

///
/// A half-open genomic interval `[start, end)` on one chromosome.
///
/// Equality, hashing and ordering only look at `(chr, start, end)`; the strand is
/// carried along as metadata.
///
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GenomicRegion {
    chr: String,
    start: u32,
    end: u32,
    strand: Option<Strand>,
}

impl GenomicRegion {
    ///
    /// Create a new region, validating its coordinates.
    ///
    /// # Arguments
    /// - chr: chromosome name, must not be empty
    /// - start: 0-based inclusive start
    /// - end: exclusive end, must be greater than `start`
    pub fn new(chr: impl Into<String>, start: u32, end: u32) -> Result<Self, RegionSetError> {
        let chr = chr.into();
        if chr.is_empty() {
            return Err(RegionSetError::EmptyChromosome);
        }
        if start >= end {
            return Err(RegionSetError::InvalidCoordinates { chr, start, end });
        }
        Ok(GenomicRegion {
            chr,
            start,
            end,
            strand: None,
        })
    }

    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = Some(strand);
        self
    }

    pub fn chr(&self) -> &str {
        &self.chr
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn strand(&self) -> Option<Strand> {
        self.strand
    }

    pub fn width(&self) -> u32 {
        self.end - self.start
    }

    ///
    /// Identifier used by ranking databases: `chr:start-end`.
    ///
    pub fn region_id(&self) -> String {
        format!("{}:{}-{}", self.chr, self.start, self.end)
    }

    ///
    /// Number of bases shared with `other`, zero when on different chromosomes.
    ///
    pub fn overlap(&self, other: &GenomicRegion) -> u32 {
        if self.chr != other.chr {
            return 0;
        }
        self.end
            .min(other.end)
            .saturating_sub(self.start.max(other.start))
    }

    ///
    /// Copy of this region reaching at least up to `end`, without strand.
    ///
    pub(crate) fn extended_to(&self, end: u32) -> GenomicRegion {
        GenomicRegion {
            chr: self.chr.clone(),
            start: self.start,
            end: self.end.max(end),
            strand: None,
        }
    }

    ///
    /// BED line for this region (3 or 6 columns depending on strand).
    ///
    pub fn as_bed_line(&self) -> String {
        match self.strand {
            Some(strand) => format!(
                "{}\t{}\t{}\t.\t0\t{}",
                self.chr, self.start, self.end, strand
            ),
            None => format!("{}\t{}\t{}", self.chr, self.start, self.end),
        }
    }
}

impl PartialEq for GenomicRegion {
    fn eq(&self, other: &Self) -> bool {
        self.chr == other.chr && self.start == other.start && self.end == other.end
    }
}

impl Eq for GenomicRegion {}

impl Hash for GenomicRegion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chr.hash(state);
        self.start.hash(state);
        self.end.hash(state);
    }
}

impl Ord for GenomicRegion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.chr
            .cmp(&other.chr)
            .then_with(|| self.start.cmp(&other.start))
            .then_with(|| self.end.cmp(&other.end))
    }
}

impl PartialOrd for GenomicRegion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for GenomicRegion {
    type Err = RegionSetError;

    ///
    /// Parse `chr:start-end`, `chr:start:end` or a tab separated `chr start end`.
    ///
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || RegionSetError::RegionParseError(s.to_string());

        let (chr, start, end) = if s.contains('\t') {
            let mut parts = s.split('\t');
            let chr = parts.next().ok_or_else(parse_err)?;
            let start = parts.next().ok_or_else(parse_err)?;
            let end = parts.next().ok_or_else(parse_err)?;
            (chr, start, end)
        } else {
            let (chr, coords) = s.rsplit_once(':').ok_or_else(parse_err)?;
            match coords.split_once('-') {
                Some((start, end)) => (chr, start, end),
                // chr:start:end
                None => {
                    let (chr, start) = chr.rsplit_once(':').ok_or_else(parse_err)?;
                    (chr, start, coords)
                }
            }
        };

        let start = start.trim().parse::<u32>().map_err(|_| parse_err())?;
        let end = end.trim().parse::<u32>().map_err(|_| parse_err())?;
        GenomicRegion::new(chr.trim(), start, end)
    }
}

impl Display for GenomicRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.region_id())
    }
}
