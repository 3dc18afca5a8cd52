//! On-disk artifacts of a job: intermediate files produced by Map tasks and
//! output files produced by Reduce tasks.
//!
//! Intermediate files hold one JSON-encoded [`KeyValue`] per line. Both kinds
//! of artifact are staged in a temporary file next to their final location
//! and renamed into place, so a reader sees either the whole file or nothing,
//! no matter how many attempts of the same task race on it.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::{Builder, NamedTempFile};

use super::error::WorkerError;

const STAGING_PREFIX: &str = ".mr-staging-";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Name of the file Map task `map_index` writes for reduce bucket `bucket`.
pub fn intermediate_name(map_index: u32, bucket: u32) -> String {
    format!("mr-{}-{}", map_index, bucket)
}

/// Name of the file Reduce task `bucket` writes.
pub fn output_name(bucket: u32) -> String {
    format!("mr-out-{}", bucket)
}

/// Recovers `(map_index, bucket)` from an intermediate file name. Output
/// files and anything else not matching `mr-<int>-<int>` yield `None`.
pub fn parse_intermediate_name(name: &str) -> Option<(u32, u32)> {
    let rest = name.strip_prefix("mr-")?;
    let (map_index, bucket) = rest.split_once('-')?;
    Some((map_index.parse().ok()?, bucket.parse().ok()?))
}

fn staging_file(dir: &Path) -> std::io::Result<NamedTempFile> {
    Builder::new().prefix(STAGING_PREFIX).tempfile_in(dir)
}

fn commit(writer: BufWriter<NamedTempFile>, target: &Path) -> Result<(), WorkerError> {
    let staged = writer.into_inner().map_err(|e| e.into_error())?;
    staged.as_file().sync_all()?;
    staged.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Accumulates the records one Map task routes to one bucket. Nothing is
/// visible under the final name until [`IntermediateWriter::commit`].
#[derive(Debug)]
pub struct IntermediateWriter {
    target: PathBuf,
    staged: BufWriter<NamedTempFile>,
}

impl IntermediateWriter {
    pub fn create(dir: &Path, map_index: u32, bucket: u32) -> Result<Self, WorkerError> {
        Ok(IntermediateWriter {
            target: dir.join(intermediate_name(map_index, bucket)),
            staged: BufWriter::new(staging_file(dir)?),
        })
    }

    pub fn append(&mut self, kv: &KeyValue) -> Result<(), WorkerError> {
        serde_json::to_writer(&mut self.staged, kv).map_err(std::io::Error::from)?;
        self.staged.write_all(b"\n")?;
        Ok(())
    }

    /// Atomically replaces any previous version of the file.
    pub fn commit(self) -> Result<PathBuf, WorkerError> {
        commit(self.staged, &self.target)?;
        Ok(self.target)
    }
}

/// Decodes every record of an intermediate file, in file order.
pub fn read_intermediate(path: &Path) -> Result<Vec<KeyValue>, WorkerError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = vec![];
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let kv = serde_json::from_str(&line).map_err(|source| WorkerError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        records.push(kv);
    }
    Ok(records)
}

/// Writes `key value` lines for one reduce bucket and renames them into place.
pub fn write_output<'a, I>(dir: &Path, bucket: u32, lines: I) -> Result<PathBuf, WorkerError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let target = dir.join(output_name(bucket));
    let mut staged = BufWriter::new(staging_file(dir)?);
    for (key, value) in lines {
        writeln!(staged, "{} {}", key, value)?;
    }
    commit(staged, &target)?;
    Ok(target)
}
