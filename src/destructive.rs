//! Destructive-delete reconciliation step
//!
//! Runs alongside a fault-injection action: samples a percentage of
//! uploaded-but-not-yet-deleted objects, re-downloads and checks each one,
//! deletes it from the store, and records the deletion in the delete
//! journal so a later verification pass treats it as intentionally absent
//! rather than lost.
//!
//! The step is the long-lived companion of the uploader: `run` repeats
//! sample→destroy→record cycles over a configured action list, polling for
//! the upload-finished sentinel between cycles, so both loops cooperate
//! through nothing but the filesystem journal/sentinel protocol.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use rand::seq::SliceRandom;

use crate::checksum;
use crate::config::DiConfig;
use crate::error::EngineError;
use crate::journal::{self, ObjectRecord};
use crate::store::{Credentials, ObjectStore, StoreFactory, UserAccount, UserId};

/// A fault to trigger while the delete workers run: a controller reset, a
/// pulled network link, a power cycle. Real implementations live with the
/// hardware tooling; this crate only needs the seam.
pub trait DisruptiveAction: Send + Sync {
    fn name(&self) -> &str;
    fn trigger(&self) -> Result<(), EngineError>;
}

/// Stand-in action for runs with no fault tooling attached.
pub struct NoopAction;

impl DisruptiveAction for NoopAction {
    fn name(&self) -> &str {
        "noop"
    }

    fn trigger(&self) -> Result<(), EngineError> {
        info!("No disruptive action configured for this cycle");
        Ok(())
    }
}

/// Counters from one destructive cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DestructiveStats {
    /// Rows sampled for deletion this cycle
    pub sampled: usize,
    /// Rows deleted from the store and journaled
    pub deleted: usize,
    /// Pre-delete checksum mismatches (the delete still proceeds)
    pub mismatched: usize,
    /// Rows whose store delete failed
    pub failed: usize,
}

#[derive(Default)]
struct PartitionResult {
    deleted: Vec<ObjectRecord>,
    mismatched: usize,
    failed: usize,
}

pub struct DestructiveStep {
    config: DiConfig,
    factory: Arc<dyn StoreFactory>,
}

impl DestructiveStep {
    pub fn new(config: DiConfig, factory: Arc<dyn StoreFactory>) -> Self {
        Self { config, factory }
    }

    /// Repeat sample→destroy→record cycles over the action list until the
    /// uploader's finished sentinel appears. The sentinel is removed once
    /// seen so the next run starts clean.
    pub fn run(
        &self,
        users: &[UserAccount],
        actions: &[Arc<dyn DisruptiveAction>],
    ) -> Result<Vec<DestructiveStats>, EngineError> {
        let sentinel = PathBuf::from(&self.config.paths.sentinel);
        let mut results = Vec::new();

        for action in actions {
            let stats = self.run_cycle(users, Arc::clone(action))?;
            results.push(stats);

            if journal::sentinel_present(&sentinel) {
                journal::clear_sentinel(&sentinel)?;
                info!("Upload-finished sentinel seen, destructive step exiting");
                break;
            }
            thread::sleep(Duration::from_secs(self.config.destructive.poll_interval_secs));
        }
        Ok(results)
    }

    /// One sample→destroy→record cycle under a single fault action.
    pub fn run_cycle(
        &self,
        users: &[UserAccount],
        action: Arc<dyn DisruptiveAction>,
    ) -> Result<DestructiveStats, EngineError> {
        let user_names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
        let uploaded = journal::read_records(Path::new(&self.config.paths.upload_log))?;
        let delete_log = PathBuf::from(&self.config.paths.delete_log);
        let already_deleted = journal::identity_set(&journal::read_records(&delete_log)?);

        // Candidates: journaled uploads for our users, minus everything a
        // previous cycle already deleted.
        let candidates: Vec<ObjectRecord> = uploaded
            .into_iter()
            .filter(|row| user_names.contains(&row.user.as_str()))
            .filter(|row| !already_deleted.contains(&row.identity()))
            .collect();

        let sample_size =
            candidates.len() * self.config.destructive.delete_percentage / 100;
        if sample_size == 0 {
            info!(
                "Destructive cycle {}: {} candidates, nothing to sample",
                action.name(),
                candidates.len()
            );
            return Ok(DestructiveStats::default());
        }

        let sample: Vec<ObjectRecord> = candidates
            .choose_multiple(&mut rand::thread_rng(), sample_size)
            .cloned()
            .collect();
        info!(
            "Destructive cycle {}: sampled {} of {} candidates",
            action.name(),
            sample.len(),
            candidates.len()
        );

        let credentials: Arc<HashMap<UserId, Credentials>> = Arc::new(
            users
                .iter()
                .map(|u| (u.name.clone(), u.credentials.clone()))
                .collect(),
        );
        let scratch_dir = PathBuf::from(&self.config.paths.work_dir).join("destructive");

        // One dedicated thread triggers the fault while the partition
        // workers grind through their shares.
        let fault_action = Arc::clone(&action);
        let fault_handle = thread::Builder::new()
            .name("di-fault".to_string())
            .spawn(move || {
                info!("Triggering disruptive action {}", fault_action.name());
                if let Err(e) = fault_action.trigger() {
                    error!("Disruptive action {} failed: {}", fault_action.name(), e);
                }
            })?;

        let sampled_count = sample.len();
        let mut worker_handles = Vec::new();
        for (partition_id, rows) in partition_rows(sample, self.config.destructive.partitions)
            .into_iter()
            .enumerate()
        {
            if rows.is_empty() {
                continue;
            }
            let factory = Arc::clone(&self.factory);
            let credentials = Arc::clone(&credentials);
            let scratch_dir = scratch_dir.clone();
            let handle = thread::Builder::new()
                .name(format!("di-destroy-{}", partition_id))
                .spawn(move || {
                    delete_partition(partition_id, rows, factory, credentials, scratch_dir)
                })?;
            worker_handles.push(handle);
        }

        if fault_handle.join().is_err() {
            error!("Disruptive action thread panicked");
        }

        // Merge every partition's local delete list, then journal the lot
        // in one lock-guarded append.
        let mut stats = DestructiveStats {
            sampled: sampled_count,
            ..DestructiveStats::default()
        };
        let mut merged = Vec::new();
        for handle in worker_handles {
            match handle.join() {
                Ok(result) => {
                    stats.mismatched += result.mismatched;
                    stats.failed += result.failed;
                    merged.extend(result.deleted);
                }
                Err(_) => error!("Destructive partition worker panicked"),
            }
        }
        journal::append_records(&delete_log, &merged)?;
        stats.deleted = merged.len();

        info!(
            "Destructive cycle {}: deleted {} ({} mismatched, {} failed)",
            action.name(),
            stats.deleted,
            stats.mismatched,
            stats.failed
        );
        Ok(stats)
    }
}

/// Spread rows round-robin across `partitions` buckets.
fn partition_rows(rows: Vec<ObjectRecord>, partitions: usize) -> Vec<Vec<ObjectRecord>> {
    let count = partitions.max(1);
    let mut out: Vec<Vec<ObjectRecord>> = (0..count).map(|_| Vec::new()).collect();
    for (index, row) in rows.into_iter().enumerate() {
        out[index % count].push(row);
    }
    out
}

/// Work one partition's share: download, check, delete, collect. Only rows
/// whose store delete succeeded make it into the returned delete list.
fn delete_partition(
    partition_id: usize,
    rows: Vec<ObjectRecord>,
    factory: Arc<dyn StoreFactory>,
    credentials: Arc<HashMap<UserId, Credentials>>,
    scratch_dir: PathBuf,
) -> PartitionResult {
    let mut result = PartitionResult::default();

    let dir = scratch_dir.join(format!("partition_{}", partition_id));
    if let Err(e) = fs::create_dir_all(&dir) {
        error!(
            "Partition {} could not create scratch dir {}: {}",
            partition_id,
            dir.display(),
            e
        );
        result.failed = rows.len();
        return result;
    }

    // Sessions are opened lazily, one per user seen in this partition
    let mut sessions: HashMap<UserId, Arc<dyn ObjectStore>> = HashMap::new();
    for row in rows {
        if !sessions.contains_key(&row.user) {
            let connected = credentials
                .get(&row.user)
                .ok_or_else(|| EngineError::MissingSession(row.user.clone()))
                .and_then(|c| factory.connect(c).map_err(EngineError::from));
            match connected {
                Ok(session) => {
                    sessions.insert(row.user.clone(), session);
                }
                Err(e) => {
                    error!("No session for user {}: {}", row.user, e);
                    result.failed += 1;
                    continue;
                }
            }
        }
        let session = Arc::clone(&sessions[&row.user]);

        // Pre-delete content check. A mismatch (or an unreadable object) is
        // logged and counted but never blocks the delete; downstream test
        // expectations depend on the delete proceeding regardless.
        let local_path = dir.join(&row.object_key);
        match session.get_object(&row.bucket, &row.object_key, &local_path) {
            Ok(()) => {
                let algorithm = checksum::algorithm_for_digest(&row.checksum);
                match checksum::compute_digest_hex(&local_path, algorithm) {
                    Ok(found) if found == row.checksum => {}
                    Ok(found) => {
                        warn!(
                            "Pre-delete checksum mismatch for {}/{} (recorded {}, got {}), deleting anyway",
                            row.bucket, row.object_key, row.checksum, found
                        );
                        result.mismatched += 1;
                    }
                    Err(e) => {
                        warn!(
                            "Pre-delete digest of {}/{} failed ({}), deleting anyway",
                            row.bucket, row.object_key, e
                        );
                        result.mismatched += 1;
                    }
                }
                let _ = fs::remove_file(&local_path);
            }
            Err(e) => {
                warn!(
                    "Pre-delete download of {}/{} failed ({}), deleting anyway",
                    row.bucket, row.object_key, e
                );
            }
        }

        match session.delete_object(&row.bucket, &row.object_key) {
            Ok(()) => result.deleted.push(row),
            Err(e) => {
                error!("Delete failed for {}/{}: {}", row.bucket, row.object_key, e);
                result.failed += 1;
            }
        }
    }

    let _ = fs::remove_dir_all(&dir);
    result
}
