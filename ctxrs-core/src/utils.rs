use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;

///
/// Get a reader for either a gzip'd or non-gzip'd file.
///
/// # Arguments
///
/// - path: path to the file to read
///
pub fn get_dynamic_reader(path: &Path) -> Result<BufReader<Box<dyn Read>>> {
    let is_gzipped = path.extension() == Some(OsStr::new("gz"));
    let file = File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
    let file: Box<dyn Read> = match is_gzipped {
        true => Box::new(MultiGzDecoder::new(file)),
        false => Box::new(file),
    };

    Ok(BufReader::new(file))
}

///
/// Iterate over the non-empty, non-comment lines of a tab separated file,
/// yielding the split fields.
///
pub fn read_tsv_rows(path: &Path) -> Result<impl Iterator<Item = Result<Vec<String>>> + use<>> {
    let reader = get_dynamic_reader(path)?;
    Ok(reader.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() || line.starts_with('#') => None,
        Ok(line) => Some(Ok(line
            .trim_end_matches(['\r', '\n'])
            .split('\t')
            .map(|s| s.to_string())
            .collect())),
        Err(e) => Some(Err(e.into())),
    }))
}
