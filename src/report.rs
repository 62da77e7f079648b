//! CSV failure reports for post-run triage
//!
//! Verification failures are working data for operators and CI artifact
//! collection, not input to any other component. Checksum mismatches and
//! server errors go to separate files so "the store returned wrong bytes"
//! stays distinguishable from "the store never returned the object".

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;

use crate::error::EngineError;

/// One failed object from a verification or destructive pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub user: String,
    pub bucket: String,
    pub object_key: String,
    pub expected_checksum: String,
    pub detail: String,
}

impl FailureRecord {
    pub fn new(
        user: &str,
        bucket: &str,
        object_key: &str,
        expected_checksum: &str,
        detail: &str,
    ) -> Self {
        Self {
            user: user.to_string(),
            bucket: bucket.to_string(),
            object_key: object_key.to_string(),
            expected_checksum: expected_checksum.to_string(),
            detail: detail.to_string(),
        }
    }
}

/// Write a timestamped CSV report named `<name>_<stamp>.csv` under `dir`.
/// Returns the report path. The header row matches the record fields.
pub fn write_failure_report(
    dir: &Path,
    name: &str,
    records: &[FailureRecord],
) -> Result<PathBuf, EngineError> {
    fs::create_dir_all(dir)?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{}_{}.csv", name, stamp));
    let mut file = File::create(&path)?;

    writeln!(file, "user,bucket,object_key,expected_checksum,detail")?;
    for record in records {
        // Free-text detail gets its delimiters flattened so rows stay parseable
        writeln!(
            file,
            "{},{},{},{},{}",
            record.user,
            record.bucket,
            record.object_key,
            record.expected_checksum,
            record.detail.replace(',', ";").replace('\n', " ")
        )?;
    }

    info!(
        "Wrote {} failure rows to {}",
        records.len(),
        path.display()
    );
    Ok(path)
}
