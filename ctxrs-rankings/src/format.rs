//! Binary layout of a `.ctxdb` ranking database.
//!
//! ```text
//! magic            b"CTXRANK\x01"
//! n_motifs         u32
//! n_regions        u32
//! chunk_size       u32                      regions per chunk
//! motif names      n_motifs  x (u32 len, utf-8)
//! region names     n_regions x (u32 len, utf-8)   chr:start-end
//! chunk offsets    n_chunks  x u64
//! chunks           per chunk of width w, per motif: w x (u32 rank, f32 score)
//! ```
//!
//! All integers are little endian. Ranks are 1-based.

use std::io::{Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use ctxrs_core::GenomicRegion;

use crate::error::{RankingStoreError, Result};

pub const MAGIC: [u8; 8] = *b"CTXRANK\x01";
pub const FILE_EXTENSION: &str = "ctxdb";
pub const DEFAULT_CHUNK_SIZE: u32 = 4096;

/// Bytes per (rank, score) cell.
pub const CELL_BYTES: u64 = 8;

/// Longest motif or region name accepted when decoding.
const MAX_NAME_BYTES: u32 = 1 << 16;

#[derive(Debug, Clone)]
pub struct StoreHeader {
    pub motifs: Vec<String>,
    pub regions: Vec<GenomicRegion>,
    pub chunk_size: u32,
    pub chunk_offsets: Vec<u64>,
}

impl StoreHeader {
    pub fn n_chunks(n_regions: usize, chunk_size: u32) -> usize {
        n_regions.div_ceil(chunk_size.max(1) as usize)
    }

    /// Number of regions stored in chunk `chunk`.
    pub fn chunk_width(&self, chunk: usize) -> usize {
        let chunk_size = self.chunk_size as usize;
        let start = chunk * chunk_size;
        (self.regions.len() - start).min(chunk_size)
    }

    /// Byte size of one chunk: every motif's slab for that chunk.
    pub fn chunk_bytes(&self, chunk: usize) -> u64 {
        self.chunk_width(chunk) as u64 * self.motifs.len() as u64 * CELL_BYTES
    }

    /// File offset of motif `motif`'s slab inside chunk `chunk`.
    pub fn slab_offset(&self, chunk: usize, motif: usize) -> u64 {
        self.chunk_offsets[chunk] + motif as u64 * self.chunk_width(chunk) as u64 * CELL_BYTES
    }

    /// Size in bytes of the header for the given names, i.e. the offset of chunk 0.
    pub fn encoded_len(motifs: &[String], regions: &[GenomicRegion], chunk_size: u32) -> u64 {
        let names: u64 = motifs.iter().map(|m| 4 + m.len() as u64).sum::<u64>()
            + regions
                .iter()
                .map(|r| 4 + r.region_id().len() as u64)
                .sum::<u64>();
        MAGIC.len() as u64 + 12 + names + 8 * Self::n_chunks(regions.len(), chunk_size) as u64
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_u32::<LittleEndian>(self.motifs.len() as u32)?;
        writer.write_u32::<LittleEndian>(self.regions.len() as u32)?;
        writer.write_u32::<LittleEndian>(self.chunk_size)?;
        for motif in &self.motifs {
            write_name(writer, motif)?;
        }
        for region in &self.regions {
            write_name(writer, &region.region_id())?;
        }
        for offset in &self.chunk_offsets {
            writer.write_u64::<LittleEndian>(*offset)?;
        }
        Ok(())
    }

    ///
    /// Decode and validate a header.
    ///
    /// Every structural inconsistency, including a file length that does not
    /// match the declared motif and region counts, is reported as
    /// [`RankingStoreError::CorruptStore`].
    ///
    pub fn read_from<R: Read>(reader: &mut R, file_len: u64, path: &Path) -> Result<Self> {
        let corrupt = |reason: String| RankingStoreError::corrupt(path, reason);
        let truncated = |what: &str| corrupt(format!("file ends inside the {what}"));

        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(|_| truncated("magic number"))?;
        if magic != MAGIC {
            return Err(corrupt("not a ctxrs ranking database (bad magic)".to_string()));
        }

        let n_motifs = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| truncated("header"))?;
        let n_regions = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| truncated("header"))?;
        let chunk_size = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| truncated("header"))?;

        if chunk_size == 0 && n_regions > 0 {
            return Err(corrupt("chunk size is zero".to_string()));
        }
        // every name takes at least 4 bytes, so counts beyond the file length are bogus
        if (n_motifs as u64 + n_regions as u64) * 4 > file_len {
            return Err(corrupt(format!(
                "declares {n_motifs} motifs and {n_regions} regions but holds only {file_len} bytes"
            )));
        }

        let mut header_len = MAGIC.len() as u64 + 12;

        let mut motifs = Vec::with_capacity(n_motifs as usize);
        for _ in 0..n_motifs {
            let name = read_name(reader).map_err(|e| corrupt(format!("motif index: {e}")))?;
            header_len += 4 + name.len() as u64;
            motifs.push(name);
        }

        let mut regions = Vec::with_capacity(n_regions as usize);
        for _ in 0..n_regions {
            let name = read_name(reader).map_err(|e| corrupt(format!("region index: {e}")))?;
            header_len += 4 + name.len() as u64;
            let region = name
                .parse::<GenomicRegion>()
                .map_err(|_| corrupt(format!("region index: invalid region id '{name}'")))?;
            regions.push(region);
        }

        let n_chunks = Self::n_chunks(regions.len(), chunk_size);
        let mut chunk_offsets = Vec::with_capacity(n_chunks);
        for _ in 0..n_chunks {
            chunk_offsets.push(
                reader
                    .read_u64::<LittleEndian>()
                    .map_err(|_| truncated("chunk index"))?,
            );
        }
        header_len += 8 * n_chunks as u64;

        let header = StoreHeader {
            motifs,
            regions,
            chunk_size,
            chunk_offsets,
        };
        header.validate_layout(header_len, file_len, path)?;
        Ok(header)
    }

    fn validate_layout(&self, header_len: u64, file_len: u64, path: &Path) -> Result<()> {
        let mut expected = header_len;

        for (chunk, offset) in self.chunk_offsets.iter().enumerate() {
            if *offset != expected {
                return Err(RankingStoreError::corrupt(
                    path,
                    format!("chunk {chunk} starts at byte {offset}, expected {expected}"),
                ));
            }
            expected += self.chunk_bytes(chunk);
        }

        if expected != file_len {
            return Err(RankingStoreError::corrupt(
                path,
                format!(
                    "declared {} regions x {} motifs need {expected} bytes, file has {file_len}",
                    self.regions.len(),
                    self.motifs.len()
                ),
            ));
        }
        Ok(())
    }
}

fn write_name<W: Write>(writer: &mut W, name: &str) -> std::io::Result<()> {
    writer.write_u32::<LittleEndian>(name.len() as u32)?;
    writer.write_all(name.as_bytes())
}

fn read_name<R: Read>(reader: &mut R) -> std::result::Result<String, String> {
    let len = reader
        .read_u32::<LittleEndian>()
        .map_err(|_| "file ends inside a name".to_string())?;
    if len > MAX_NAME_BYTES {
        return Err(format!("name length {len} exceeds {MAX_NAME_BYTES} bytes"));
    }
    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .map_err(|_| "file ends inside a name".to_string())?;
    String::from_utf8(buf).map_err(|_| "name is not valid UTF-8".to_string())
}

/// Decode a slab of `(rank, score)` cells.
pub fn decode_cells(buf: &[u8], ranks: &mut Vec<u32>, scores: &mut Vec<f32>) {
    for cell in buf.chunks_exact(CELL_BYTES as usize) {
        ranks.push(LittleEndian::read_u32(&cell[..4]));
        scores.push(LittleEndian::read_f32(&cell[4..]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::io::Cursor;

    fn header() -> StoreHeader {
        let regions: Vec<GenomicRegion> = (0..5)
            .map(|i| GenomicRegion::new("chr1", i * 100, i * 100 + 50).unwrap())
            .collect();
        let motifs = vec!["m1".to_string(), "m2".to_string()];
        let start = StoreHeader::encoded_len(&motifs, &regions, 2);
        StoreHeader {
            chunk_offsets: vec![start, start + 2 * 2 * 8, start + 2 * 2 * 8 * 2],
            motifs,
            regions,
            chunk_size: 2,
        }
    }

    #[rstest]
    fn test_header_roundtrip_and_layout() {
        let header = header();
        let mut buf: Vec<u8> = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, header.chunk_offsets[0]);

        // 5 regions over chunks of 2: widths 2, 2, 1
        assert_eq!(header.chunk_width(2), 1);
        let file_len = header.chunk_offsets[2] + header.chunk_bytes(2);

        let decoded =
            StoreHeader::read_from(&mut Cursor::new(&buf), file_len, Path::new("mem")).unwrap();
        assert_eq!(decoded.motifs, header.motifs);
        assert_eq!(decoded.regions, header.regions);
        assert_eq!(decoded.slab_offset(1, 1), header.chunk_offsets[1] + 2 * 8);
    }

    #[rstest]
    fn test_bad_magic_is_corrupt() {
        let buf = b"NOTADB\x00\x00\x00\x00\x00\x00".to_vec();
        let err = StoreHeader::read_from(&mut Cursor::new(&buf), buf.len() as u64, Path::new("x"))
            .unwrap_err();
        assert!(matches!(err, RankingStoreError::CorruptStore { .. }));
    }

    #[rstest]
    fn test_length_mismatch_is_corrupt() {
        let header = header();
        let mut buf: Vec<u8> = Vec::new();
        header.write_to(&mut buf).unwrap();
        let short_len = header.chunk_offsets[2];

        let err = StoreHeader::read_from(&mut Cursor::new(&buf), short_len, Path::new("x"))
            .unwrap_err();
        assert!(matches!(err, RankingStoreError::CorruptStore { .. }));
    }
}
