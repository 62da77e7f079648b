//! Concurrent multi-user upload driver
//!
//! Drives uploads for a set of user accounts, one thread per user so a
//! failing account cannot disturb another's journal rows or scratch files.
//! Each user thread runs its own worker pool over bucket × file-index work
//! items: synthesize a random file, digest it, upload it through a
//! round-robin session, and append the journal row only after the store
//! accepted the object. A failed upload is logged and dropped, with no
//! retry and no journal row, so absence from the journal is authoritative
//! non-existence.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::Local;
use log::{error, info, warn};
use rand::RngCore;

use crate::checksum::{self, ChecksumAlgorithm};
use crate::config::DiConfig;
use crate::error::EngineError;
use crate::journal::{self, ObjectRecord};
use crate::store::{SessionPool, StoreFactory, UserAccount};
use crate::worker::WorkerPool;

/// Counters from one upload run, owned by the caller.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadStats {
    /// Work items enqueued across all users
    pub planned: usize,
    /// Objects stored and journaled
    pub uploaded: usize,
    /// Objects that failed to upload or journal
    pub failed: usize,
    /// Items never enqueued because the stop signal was set
    pub skipped: usize,
    /// Users whose whole thread failed (no session, panic)
    pub failed_users: usize,
}

#[derive(Default)]
struct UploadOutcome {
    uploaded: AtomicUsize,
    failed: AtomicUsize,
}

pub struct Uploader {
    config: DiConfig,
    factory: Arc<dyn StoreFactory>,
}

impl Uploader {
    pub fn new(config: DiConfig, factory: Arc<dyn StoreFactory>) -> Self {
        Self { config, factory }
    }

    /// Drive uploads for every user, then write the upload-finished
    /// sentinel. Setting `stop` prevents new work items from being
    /// enqueued; items already queued run to completion. The optional
    /// `started` flag is raised once every user thread is running.
    pub fn start(
        &self,
        users: &[UserAccount],
        buckets: &[String],
        files_per_bucket: usize,
        stop: Arc<AtomicBool>,
        started: Option<Arc<AtomicBool>>,
    ) -> Result<UploadStats, EngineError> {
        // One timestamped prefix per run keeps keys unique across runs
        // sharing a journal.
        let run_prefix = format!(
            "{}_{}",
            self.config.upload.key_prefix,
            Local::now().format("%Y%m%d%H%M%S")
        );
        info!(
            "Starting upload run {} for {} users x {} buckets x {} files",
            run_prefix,
            users.len(),
            buckets.len(),
            files_per_bucket
        );

        let mut handles = Vec::new();
        for user in users {
            let user = user.clone();
            let user_name = user.name.clone();
            let buckets = buckets.to_vec();
            let factory = Arc::clone(&self.factory);
            let config = self.config.clone();
            let run_prefix = run_prefix.clone();
            let stop = Arc::clone(&stop);

            let handle = thread::Builder::new()
                .name(format!("upload-{}", user_name))
                .spawn(move || {
                    upload_user(user, buckets, files_per_bucket, config, factory, run_prefix, stop)
                })?;
            handles.push((user_name, handle));
        }

        if let Some(flag) = started {
            flag.store(true, Ordering::SeqCst);
        }

        let mut stats = UploadStats::default();
        for (user_name, handle) in handles {
            match handle.join() {
                Ok(Ok(user_stats)) => {
                    stats.planned += user_stats.planned;
                    stats.uploaded += user_stats.uploaded;
                    stats.failed += user_stats.failed;
                    stats.skipped += user_stats.skipped;
                }
                Ok(Err(e)) => {
                    error!("Upload thread for user {} failed: {}", user_name, e);
                    stats.failed_users += 1;
                }
                Err(_) => {
                    error!("Upload thread for user {} panicked", user_name);
                    stats.failed_users += 1;
                }
            }
        }

        journal::write_sentinel(Path::new(&self.config.paths.sentinel))?;
        info!(
            "Upload run finished: {} uploaded, {} failed, {} skipped",
            stats.uploaded, stats.failed, stats.skipped
        );
        Ok(stats)
    }
}

fn upload_user(
    user: UserAccount,
    buckets: Vec<String>,
    files_per_bucket: usize,
    config: DiConfig,
    factory: Arc<dyn StoreFactory>,
    run_prefix: String,
    stop: Arc<AtomicBool>,
) -> Result<UploadStats, EngineError> {
    let sessions = Arc::new(SessionPool::connect(
        factory.as_ref(),
        &user.credentials,
        config.workers.sessions_per_user,
    )?);

    // Per-user scratch namespace; no sharing across users
    let scratch_dir = PathBuf::from(&config.paths.work_dir).join(&user.name);
    fs::create_dir_all(&scratch_dir)?;

    // Embedded-checksum keys always carry the higher-assurance digest
    let algorithm = if config.upload.embed_checksum_in_key {
        ChecksumAlgorithm::Sha512
    } else {
        config.upload.algorithm
    };
    let user_prefix = format!("{}_{}", run_prefix, user.name);
    let upload_log = PathBuf::from(&config.paths.upload_log);

    let pool = WorkerPool::start(config.workers.pool_size);
    let outcome = Arc::new(UploadOutcome::default());

    let mut planned = 0;
    let mut skipped = 0;
    for bucket in &buckets {
        for index in 0..files_per_bucket {
            // Checked once per enqueue; queued items still run
            if stop.load(Ordering::SeqCst) {
                skipped += 1;
                continue;
            }
            planned += 1;

            let user_name = user.name.clone();
            let bucket = bucket.clone();
            let sessions = Arc::clone(&sessions);
            let outcome = Arc::clone(&outcome);
            let scratch_dir = scratch_dir.clone();
            let user_prefix = user_prefix.clone();
            let upload_log = upload_log.clone();
            let file_size = config.upload.file_size_bytes;
            let embed = config.upload.embed_checksum_in_key;

            pool.enqueue(move || {
                upload_one(
                    &user_name,
                    &bucket,
                    index,
                    &scratch_dir,
                    &user_prefix,
                    file_size,
                    algorithm,
                    embed,
                    sessions,
                    &upload_log,
                    &outcome,
                );
            });
        }
    }
    pool.shutdown();

    if skipped > 0 {
        warn!(
            "Upload for user {} stopped early, {} items never enqueued",
            user.name, skipped
        );
    }
    Ok(UploadStats {
        planned,
        uploaded: outcome.uploaded.load(Ordering::SeqCst),
        failed: outcome.failed.load(Ordering::SeqCst),
        skipped,
        failed_users: 0,
    })
}

/// Handler for one upload work item. Failures are recorded in `outcome`
/// and never propagate; the scratch file is removed on every path.
#[allow(clippy::too_many_arguments)]
fn upload_one(
    user: &str,
    bucket: &str,
    index: usize,
    scratch_dir: &Path,
    user_prefix: &str,
    file_size: usize,
    algorithm: ChecksumAlgorithm,
    embed: bool,
    sessions: Arc<SessionPool>,
    upload_log: &Path,
    outcome: &UploadOutcome,
) {
    let scratch_path = scratch_dir.join(format!("{}_{}", bucket, index));

    let result = (|| -> Result<(), EngineError> {
        synthesize_file(&scratch_path, file_size)?;
        let digest = checksum::compute_digest(&scratch_path, algorithm)?;

        let key = if embed {
            checksum::embedded_checksum_key(user_prefix, &digest, index)
        } else {
            format!("{}_{}", user_prefix, index)
        };

        let session = sessions.checkout();
        session.put_object(bucket, &key, &scratch_path)?;

        // Journal only after the store accepted the object
        let record = ObjectRecord::new(user, bucket, &key, &hex::encode(&digest));
        journal::append_records(upload_log, &[record])?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            outcome.uploaded.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => {
            error!(
                "Upload failed for user {} bucket {} index {}: {}",
                user, bucket, index, e
            );
            outcome.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    if scratch_path.exists() {
        if let Err(e) = fs::remove_file(&scratch_path) {
            warn!(
                "Failed to remove scratch file {}: {}",
                scratch_path.display(),
                e
            );
        }
    }
}

/// Write `size` random bytes to `path` in fixed-size chunks.
fn synthesize_file(path: &Path, size: usize) -> io::Result<()> {
    let mut file = File::create(path)?;
    let mut rng = rand::thread_rng();
    let mut buffer = [0u8; 8192];

    let mut remaining = size;
    while remaining > 0 {
        let chunk = remaining.min(buffer.len());
        rng.fill_bytes(&mut buffer[..chunk]);
        file.write_all(&buffer[..chunk])?;
        remaining -= chunk;
    }
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_synthesize_file_writes_exact_size() {
        let dir = tempdir().unwrap();

        for size in [0usize, 1, 8192, 20000] {
            let path = dir.path().join(format!("f_{}", size));
            synthesize_file(&path, size).unwrap();
            assert_eq!(fs::metadata(&path).unwrap().len() as usize, size);
        }
    }

    #[test]
    fn test_synthesized_files_differ() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");

        synthesize_file(&a, 4096).unwrap();
        synthesize_file(&b, 4096).unwrap();
        assert_ne!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }
}
