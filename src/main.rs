use std::env;
use std::path::Path;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{error, info};

use di_drive::config::DiConfig;
use di_drive::destructive::{DestructiveStep, DisruptiveAction, NoopAction};
use di_drive::downloader::DiChecker;
use di_drive::store::config::StoreConfig;
use di_drive::uploader::Uploader;

const CONFIG_FILE: &str = "di_config.yaml";

fn main() {
    let config = match DiConfig::load(CONFIG_FILE) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", CONFIG_FILE, e);
            process::exit(2);
        }
    };

    // Prefer the log4rs file config; fall back to env_logger when absent
    if Path::new(&config.logging.config_file).exists() {
        log4rs::init_file(&config.logging.config_file, Default::default())
            .expect("failed to initialize log4rs");
    } else {
        env_logger::init();
    }

    let mode = env::args().nth(1).unwrap_or_else(|| "verify".to_string());
    let factory = StoreConfig::from_env().create_factory();

    if config.accounts.is_empty() {
        eprintln!("No user accounts configured in {}", CONFIG_FILE);
        process::exit(2);
    }

    match mode.as_str() {
        "upload" => {
            let uploader = Uploader::new(config.clone(), factory);
            let stop = Arc::new(AtomicBool::new(false));
            match uploader.start(
                &config.accounts,
                &config.buckets,
                config.upload.files_per_bucket,
                stop,
                None,
            ) {
                Ok(stats) => {
                    info!(
                        "Upload complete: {} uploaded, {} failed, {} skipped, {} users failed",
                        stats.uploaded, stats.failed, stats.skipped, stats.failed_users
                    );
                    if stats.failed > 0 || stats.failed_users > 0 {
                        process::exit(1);
                    }
                }
                Err(e) => {
                    error!("Upload run failed: {}", e);
                    process::exit(1);
                }
            }
        }
        "verify" => {
            let checker = DiChecker::new(config.clone(), factory);
            match checker.verify_data_integrity(&config.accounts) {
                Ok(summary) => {
                    info!(
                        "Verification: uploaded={} deleted={} verified={} failed={}",
                        summary.uploaded_files,
                        summary.deleted_files,
                        summary.checksum_verified,
                        summary.failed_files
                    );
                    // CI treats any failed object as a run failure
                    if summary.failed_files != 0 {
                        process::exit(1);
                    }
                }
                Err(e) => {
                    error!("Verification failed: {}", e);
                    process::exit(1);
                }
            }
        }
        "destructive" => {
            let step = DestructiveStep::new(config.clone(), factory);
            // Real fault actions attach through external tooling; one noop
            // cycle still exercises the sample/delete/record path.
            let actions: Vec<Arc<dyn DisruptiveAction>> = vec![Arc::new(NoopAction)];
            match step.run(&config.accounts, &actions) {
                Ok(results) => {
                    for stats in results {
                        info!(
                            "Destructive cycle: sampled={} deleted={} mismatched={} failed={}",
                            stats.sampled, stats.deleted, stats.mismatched, stats.failed
                        );
                    }
                }
                Err(e) => {
                    error!("Destructive step failed: {}", e);
                    process::exit(1);
                }
            }
        }
        other => {
            eprintln!("Unknown mode '{}'. Usage: di_drive [upload|verify|destructive]", other);
            process::exit(2);
        }
    }
}
