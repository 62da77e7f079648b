//! Post-upload data integrity verification
//!
//! Reads the upload journal, subtracts every object the destructive step
//! recorded as intentionally deleted, re-downloads the remainder through a
//! worker pool, recomputes checksums and classifies each object as
//! verified, checksum-mismatched or download-failed. The pass never
//! mutates the journals, so re-running it against unchanged state yields
//! the same summary.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};

use crate::checksum;
use crate::config::DiConfig;
use crate::error::EngineError;
use crate::journal::{self, ObjectRecord};
use crate::report::{self, FailureRecord};
use crate::store::{ObjectStore, StoreFactory, UserAccount, UserId};
use crate::worker::WorkerPool;

/// Counters reported by one verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationSummary {
    /// Journaled upload rows for the verified users
    pub uploaded_files: usize,
    /// Delete-journal rows for the verified users
    pub deleted_files: usize,
    /// uploaded_files - deleted_files
    pub checksum_verified: usize,
    /// Checksum mismatches plus download failures
    pub failed_files: usize,
}

#[derive(Default)]
struct FailureCollections {
    // Wrong bytes came back
    mismatches: Mutex<Vec<FailureRecord>>,
    // No bytes came back at all
    server_errors: Mutex<Vec<FailureRecord>>,
}

pub struct DiChecker {
    config: DiConfig,
    factory: Arc<dyn StoreFactory>,
}

impl DiChecker {
    pub fn new(config: DiConfig, factory: Arc<dyn StoreFactory>) -> Self {
        Self { config, factory }
    }

    /// Verify every journaled object belonging to `users` that the delete
    /// journal does not exclude. Returns the summary; callers treat
    /// `failed_files == 0` as the success criterion.
    pub fn verify_data_integrity(
        &self,
        users: &[UserAccount],
    ) -> Result<VerificationSummary, EngineError> {
        // One session per user, built up front; a missing session is a
        // batch-level failure, not a per-object one.
        let mut sessions: HashMap<UserId, Arc<dyn ObjectStore>> = HashMap::new();
        for user in users {
            let session = self.factory.connect(&user.credentials)?;
            sessions.insert(user.name.clone(), session);
        }

        let upload_log = PathBuf::from(&self.config.paths.upload_log);
        let all_rows = journal::read_records(&upload_log)?;
        let rows: Vec<ObjectRecord> = all_rows
            .into_iter()
            .filter(|row| sessions.contains_key(&row.user))
            .collect();
        if rows.is_empty() {
            warn!("No upload data for the requested users, nothing to verify");
            return Err(EngineError::NoUploadData(upload_log));
        }

        // The exclusion set is a one-shot snapshot: rows appended to the
        // delete journal after this read are not seen by this pass.
        let delete_rows = journal::read_records(Path::new(&self.config.paths.delete_log))?;
        let deleted_for_users = delete_rows
            .iter()
            .filter(|row| sessions.contains_key(&row.user))
            .count();
        let excluded = journal::identity_set(&delete_rows);

        let mut pending = Vec::new();
        let mut skipped = 0;
        for row in rows.iter() {
            if excluded.contains(&row.identity()) {
                debug!(
                    "Skipping intentionally deleted object {}/{}",
                    row.bucket, row.object_key
                );
                skipped += 1;
                continue;
            }
            let session = sessions
                .get(&row.user)
                .cloned()
                .ok_or_else(|| EngineError::MissingSession(row.user.clone()))?;
            pending.push((row.clone(), session));
        }
        info!(
            "Verifying {} objects ({} excluded as deleted)",
            pending.len(),
            skipped
        );

        let download_dir = PathBuf::from(&self.config.paths.download_dir);
        let failures = Arc::new(FailureCollections::default());
        let embed = self.config.upload.embed_checksum_in_key;

        let pool = WorkerPool::start(self.config.workers.pool_size);
        for (row, session) in pending {
            let download_dir = download_dir.clone();
            let failures = Arc::clone(&failures);
            pool.enqueue(move || verify_one(&row, session, &download_dir, embed, &failures));
        }
        pool.shutdown();

        let mismatches = failures.mismatches.lock().unwrap();
        let server_errors = failures.server_errors.lock().unwrap();
        let summary = VerificationSummary {
            uploaded_files: rows.len(),
            deleted_files: deleted_for_users,
            checksum_verified: rows.len() - deleted_for_users,
            failed_files: mismatches.len() + server_errors.len(),
        };

        let report_dir = PathBuf::from(&self.config.paths.report_dir);
        if !mismatches.is_empty() {
            report::write_failure_report(&report_dir, "checksum_failures", &mismatches)?;
        }
        if !server_errors.is_empty() {
            report::write_failure_report(&report_dir, "server_error_failures", &server_errors)?;
        }

        info!(
            "Verification summary: uploaded={} deleted={} verified={} failed={}",
            summary.uploaded_files,
            summary.deleted_files,
            summary.checksum_verified,
            summary.failed_files
        );
        Ok(summary)
    }
}

/// Handler for one download+verify work item. Failures become rows in the
/// shared collections; the local copy is removed on every path so a long
/// pass never accumulates disk.
fn verify_one(
    row: &ObjectRecord,
    session: Arc<dyn ObjectStore>,
    download_dir: &Path,
    embed: bool,
    failures: &FailureCollections,
) {
    // Per-user, per-bucket directory: the same key may exist in several
    // buckets, and concurrent items must never share a local path.
    let scratch_dir = download_dir.join(&row.user).join(&row.bucket);
    let local_path = scratch_dir.join(&row.object_key);

    let downloaded = (|| -> Result<(), EngineError> {
        fs::create_dir_all(&scratch_dir)?;
        session.get_object(&row.bucket, &row.object_key, &local_path)?;
        Ok(())
    })();
    if let Err(e) = downloaded {
        error!(
            "Download failed for {}/{}: {}",
            row.bucket, row.object_key, e
        );
        failures.server_errors.lock().unwrap().push(FailureRecord::new(
            &row.user,
            &row.bucket,
            &row.object_key,
            &row.checksum,
            &e.to_string(),
        ));
        return;
    }

    let verdict = check_content(row, &local_path, embed);
    if let Err(detail) = verdict {
        warn!(
            "Checksum mismatch for {}/{}: {}",
            row.bucket, row.object_key, detail
        );
        failures.mismatches.lock().unwrap().push(FailureRecord::new(
            &row.user,
            &row.bucket,
            &row.object_key,
            &row.checksum,
            &detail,
        ));
    } else {
        debug!("Verified {}/{}", row.bucket, row.object_key);
    }

    if let Err(e) = fs::remove_file(&local_path) {
        warn!(
            "Failed to remove downloaded copy {}: {}",
            local_path.display(),
            e
        );
    }
}

/// Recompute the local copy's digest and compare it to the journaled one,
/// plus the key-embedded token when that mode is on. Exact comparison only.
fn check_content(row: &ObjectRecord, local_path: &Path, embed: bool) -> Result<(), String> {
    let algorithm = checksum::algorithm_for_digest(&row.checksum);
    let digest = checksum::compute_digest(local_path, algorithm)
        .map_err(|e| format!("digest computation failed: {}", e))?;

    let digest_hex = hex::encode(&digest);
    if digest_hex != row.checksum {
        return Err(format!("checksum mismatch: got {}", digest_hex));
    }

    if embed {
        let embedded = checksum::decode_embedded_checksum(&row.object_key)
            .map_err(|e| format!("embedded token unreadable: {}", e))?;
        if embedded != digest {
            return Err("embedded checksum token does not match content".to_string());
        }
    }
    Ok(())
}
