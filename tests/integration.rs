//! End-to-end upload/verify cycles over the in-memory mock store.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tempfile::TempDir;

use di_drive::checksum::ChecksumAlgorithm;
use di_drive::config::DiConfig;
use di_drive::downloader::DiChecker;
use di_drive::error::EngineError;
use di_drive::journal;
use di_drive::store::mock_store::{MockObjectStore, MockStoreFactory};
use di_drive::store::{Credentials, UserAccount};
use di_drive::uploader::Uploader;

fn test_config(dir: &TempDir) -> DiConfig {
    let base = dir.path();
    let mut config = DiConfig::default();
    config.workers.pool_size = 4;
    config.workers.sessions_per_user = 4;
    config.paths.upload_log = base.join("upload.log").display().to_string();
    config.paths.delete_log = base.join("delete.log").display().to_string();
    config.paths.sentinel = base.join("upload_done").display().to_string();
    config.paths.work_dir = base.join("work").display().to_string();
    config.paths.download_dir = base.join("downloads").display().to_string();
    config.paths.report_dir = base.join("reports").display().to_string();
    config.upload.files_per_bucket = 5;
    config.upload.file_size_bytes = 2048;
    config
}

fn account(name: &str) -> UserAccount {
    UserAccount {
        name: name.to_string(),
        credentials: Credentials {
            access_key: format!("AK_{}", name),
            secret_key: "SK".to_string(),
            endpoint: "mock".to_string(),
        },
    }
}

fn run_upload(
    config: &DiConfig,
    factory: &Arc<MockStoreFactory>,
    users: &[UserAccount],
    buckets: &[String],
    files_per_bucket: usize,
) -> di_drive::uploader::UploadStats {
    let uploader = Uploader::new(
        config.clone(),
        Arc::clone(factory) as Arc<dyn di_drive::store::StoreFactory>,
    );
    let stop = Arc::new(AtomicBool::new(false));
    uploader
        .start(users, buckets, files_per_bucket, stop, None)
        .unwrap()
}

#[test]
fn test_upload_then_verify_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = MockObjectStore::new();
    let factory = Arc::new(MockStoreFactory::with_store(store.clone()));

    let users = vec![account("u1"), account("u2")];
    let buckets = vec!["b1".to_string(), "b2".to_string()];

    let stats = run_upload(&config, &factory, &users, &buckets, 5);
    assert_eq!(stats.planned, 20);
    assert_eq!(stats.uploaded, 20);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.failed_users, 0);

    // Both users wrote into both buckets and the sentinel dropped
    assert_eq!(store.object_count("b1"), 10);
    assert_eq!(store.object_count("b2"), 10);
    assert!(journal::sentinel_present(Path::new(&config.paths.sentinel)));

    let checker = DiChecker::new(config.clone(), factory);
    let summary = checker.verify_data_integrity(&users).unwrap();
    assert_eq!(summary.uploaded_files, 20);
    assert_eq!(summary.deleted_files, 0);
    assert_eq!(summary.checksum_verified, 20);
    assert_eq!(summary.failed_files, 0);
}

#[test]
fn test_verification_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let factory = Arc::new(MockStoreFactory::new());
    let users = vec![account("u1")];
    let buckets = vec!["b1".to_string()];

    run_upload(&config, &factory, &users, &buckets, 5);

    let checker = DiChecker::new(config.clone(), factory);
    let first = checker.verify_data_integrity(&users).unwrap();
    let second = checker.verify_data_integrity(&users).unwrap();

    // No hidden mutation on the read path
    assert_eq!(first, second);
}

#[test]
fn test_corrupted_object_lands_in_mismatch_report() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = MockObjectStore::new();
    let factory = Arc::new(MockStoreFactory::with_store(store.clone()));
    let users = vec![account("u1")];
    let buckets = vec!["b1".to_string()];

    run_upload(&config, &factory, &users, &buckets, 5);

    // Tamper with one stored object behind the journal's back
    let rows = journal::read_records(Path::new(&config.paths.upload_log)).unwrap();
    store.corrupt_object("b1", &rows[0].object_key, b"silently rewritten");

    let checker = DiChecker::new(config.clone(), factory);
    let summary = checker.verify_data_integrity(&users).unwrap();
    assert_eq!(summary.uploaded_files, 5);
    assert_eq!(summary.failed_files, 1);

    let report_names: Vec<String> = std::fs::read_dir(&config.paths.report_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(report_names.len(), 1);
    assert!(report_names[0].starts_with("checksum_failures_"));
}

#[test]
fn test_download_failure_is_a_server_error() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let store = MockObjectStore::new();
    let factory = Arc::new(MockStoreFactory::with_store(store.clone()));
    let users = vec![account("u1")];
    let buckets = vec!["b1".to_string()];

    run_upload(&config, &factory, &users, &buckets, 5);

    let rows = journal::read_records(Path::new(&config.paths.upload_log)).unwrap();
    store.fail_downloads_for("b1", &rows[0].object_key);

    let checker = DiChecker::new(config.clone(), factory);
    let summary = checker.verify_data_integrity(&users).unwrap();
    assert_eq!(summary.failed_files, 1);

    // "never returned" and "returned wrong bytes" are separate artifacts
    let report_names: Vec<String> = std::fs::read_dir(&config.paths.report_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(report_names.len(), 1);
    assert!(report_names[0].starts_with("server_error_failures_"));
}

#[test]
fn test_empty_upload_log_fails_fast() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let factory = Arc::new(MockStoreFactory::new());

    let checker = DiChecker::new(config, factory);
    let result = checker.verify_data_integrity(&[account("u1")]);
    assert!(matches!(result, Err(EngineError::NoUploadData(_))));
}

#[test]
fn test_stop_signal_prevents_new_enqueues() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let factory = Arc::new(MockStoreFactory::new());
    let users = vec![account("u1")];
    let buckets = vec!["b1".to_string()];

    let uploader = Uploader::new(
        config.clone(),
        factory as Arc<dyn di_drive::store::StoreFactory>,
    );
    let stop = Arc::new(AtomicBool::new(true));
    let stats = uploader.start(&users, &buckets, 5, stop, None).unwrap();

    assert_eq!(stats.planned, 0);
    assert_eq!(stats.uploaded, 0);
    assert_eq!(stats.skipped, 5);
    assert!(journal::read_records(Path::new(&config.paths.upload_log))
        .unwrap()
        .is_empty());
}

#[test]
fn test_embedded_checksum_mode_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.upload.embed_checksum_in_key = true;
    config.upload.algorithm = ChecksumAlgorithm::Md5; // embed mode upgrades this to SHA-512

    let factory = Arc::new(MockStoreFactory::new());
    let users = vec![account("u1")];
    let buckets = vec!["b1".to_string()];

    let stats = run_upload(&config, &factory, &users, &buckets, 3);
    assert_eq!(stats.uploaded, 3);

    // Every journal row carries a SHA-512 digest whose key token decodes
    // back to the same bytes
    let rows = journal::read_records(Path::new(&config.paths.upload_log)).unwrap();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(row.checksum.len(), 128);
        let decoded = di_drive::checksum::decode_embedded_checksum(&row.object_key).unwrap();
        assert_eq!(hex::encode(decoded), row.checksum);
    }

    let checker = DiChecker::new(config.clone(), factory);
    let summary = checker.verify_data_integrity(&users).unwrap();
    assert_eq!(summary.checksum_verified, 3);
    assert_eq!(summary.failed_files, 0);
}
