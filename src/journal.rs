//! Append-only upload and delete journals
//!
//! Both journals are flat files with one comma-delimited row per object:
//! `user,bucket,object_key,checksum`. The upload journal is produced only
//! by the uploader, the delete journal only by the destructive step, and
//! both are consumed by the verification pass. Appends take an exclusive
//! advisory file lock so concurrent writers cannot interleave rows; reads
//! are lock-free and rely on the append-only discipline.
//!
//! A separate sentinel file signals "the uploader has finished enqueueing
//! every planned object": created by the uploader on completion, polled and
//! removed by the destructive step.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use fs4::FileExt;
use log::{info, warn};

use crate::error::EngineError;

/// One row of either journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    pub user: String,
    pub bucket: String,
    pub object_key: String,
    pub checksum: String,
}

impl ObjectRecord {
    pub fn new(user: &str, bucket: &str, object_key: &str, checksum: &str) -> Self {
        Self {
            user: user.to_string(),
            bucket: bucket.to_string(),
            object_key: object_key.to_string(),
            checksum: checksum.to_string(),
        }
    }

    /// The identity triple used for exclusion-set membership. The checksum
    /// is an audit trail, not part of the identity.
    pub fn identity(&self) -> (String, String, String) {
        (
            self.user.clone(),
            self.bucket.clone(),
            self.object_key.clone(),
        )
    }

    fn to_line(&self) -> String {
        format!(
            "{},{},{},{}",
            self.user, self.bucket, self.object_key, self.checksum
        )
    }

    fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 4 {
            return None;
        }
        Some(Self::new(fields[0], fields[1], fields[2], fields[3]))
    }
}

/// Append rows to a journal under an exclusive advisory lock.
///
/// The lock is held only for the duration of the write. Acquisition blocks
/// with no timeout; a lock left behind by a crashed holder has to be
/// cleared by an operator.
pub fn append_records(path: &Path, records: &[ObjectRecord]) -> Result<(), EngineError> {
    if records.is_empty() {
        return Ok(());
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;

    let outcome = write_rows(&mut file, records);
    if let Err(e) = file.unlock() {
        warn!("Failed to release journal lock on {}: {}", path.display(), e);
    }
    outcome?;

    info!("Appended {} rows to {}", records.len(), path.display());
    Ok(())
}

fn write_rows(file: &mut File, records: &[ObjectRecord]) -> Result<(), EngineError> {
    for record in records {
        writeln!(file, "{}", record.to_line())?;
    }
    file.flush()?;
    Ok(())
}

/// Read every well-formed row of a journal. Lock-free: the journal is
/// append-only, so a reader sees a prefix of the eventual file. A missing
/// file reads as empty; malformed rows are logged and skipped.
pub fn read_records(path: &Path) -> Result<Vec<ObjectRecord>, EngineError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match ObjectRecord::parse(&line) {
            Some(record) => records.push(record),
            None => warn!("Skipping malformed journal row: {}", line),
        }
    }
    Ok(records)
}

/// Build the set of `(user, bucket, object_key)` identity triples from a
/// slice of rows. Built once per verification pass so the exclusion set is
/// a stable snapshot for that pass.
pub fn identity_set(records: &[ObjectRecord]) -> HashSet<(String, String, String)> {
    records.iter().map(ObjectRecord::identity).collect()
}

/// Drop the upload-finished sentinel file.
pub fn write_sentinel(path: &Path) -> Result<(), EngineError> {
    File::create(path)?;
    info!("Wrote upload-finished sentinel {}", path.display());
    Ok(())
}

/// Whether the upload-finished sentinel exists.
pub fn sentinel_present(path: &Path) -> bool {
    path.exists()
}

/// Remove the sentinel so the next upload run starts clean.
pub fn clear_sentinel(path: &Path) -> Result<(), EngineError> {
    if path.exists() {
        std::fs::remove_file(path)?;
        info!("Cleared upload-finished sentinel {}", path.display());
    }
    Ok(())
}
