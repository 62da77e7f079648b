//! Engine Configuration
//!
//! This module provides configuration management for the DI engine,
//! supporting YAML configuration files with sensible defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::checksum::ChecksumAlgorithm;
use crate::error::EngineError;
use crate::store::UserAccount;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiConfig {
    /// Worker pool configuration
    pub workers: WorkerConfig,
    /// Journal, scratch and report locations
    pub paths: PathConfig,
    /// Upload phase configuration
    pub upload: UploadConfig,
    /// Destructive step configuration
    pub destructive: DestructiveConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// User accounts the engine drives traffic for
    pub accounts: Vec<UserAccount>,
    /// Target buckets, shared by every account
    pub buckets: Vec<String>,
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Concurrent workers per pool
    pub pool_size: usize,
    /// Store sessions per user; sized to the pool so concurrent work items
    /// never share a session
    pub sessions_per_user: usize,
}

/// Journal, scratch and report locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Upload journal file
    pub upload_log: String,
    /// Delete journal file
    pub delete_log: String,
    /// Upload-finished sentinel file
    pub sentinel: String,
    /// Scratch directory for files being uploaded
    pub work_dir: String,
    /// Scratch directory for downloaded files under verification
    pub download_dir: String,
    /// Directory for CSV failure reports
    pub report_dir: String,
}

/// Upload phase configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Objects uploaded per bucket per user
    pub files_per_bucket: usize,
    /// Size of each synthesized file in bytes
    pub file_size_bytes: usize,
    /// Object key prefix; a run timestamp is appended for uniqueness
    pub key_prefix: String,
    /// Digest algorithm for the fast path
    pub algorithm: ChecksumAlgorithm,
    /// Embed a base32 SHA-512 token in every object key
    pub embed_checksum_in_key: bool,
}

/// Destructive step configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestructiveConfig {
    /// Percentage of not-yet-deleted objects sampled per cycle
    pub delete_percentage: usize,
    /// Partition worker threads per cycle
    pub partitions: usize,
    /// Sleep between cycles while waiting for the upload sentinel
    pub poll_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: String,
}

impl Default for DiConfig {
    fn default() -> Self {
        Self {
            workers: WorkerConfig {
                pool_size: 10,
                sessions_per_user: 10,
            },
            paths: PathConfig {
                upload_log: "./data/upload.log".to_string(),
                delete_log: "./data/delete.log".to_string(),
                sentinel: "./data/upload_done".to_string(),
                work_dir: "./data/work".to_string(),
                download_dir: "./data/downloads".to_string(),
                report_dir: "./data/reports".to_string(),
            },
            upload: UploadConfig {
                files_per_bucket: 10,
                file_size_bytes: 1048576, // 1 MiB
                key_prefix: "di_obj".to_string(),
                algorithm: ChecksumAlgorithm::Md5,
                embed_checksum_in_key: false,
            },
            destructive: DestructiveConfig {
                delete_percentage: 10,
                partitions: 5,
                poll_interval_secs: 30,
            },
            logging: LoggingConfig {
                config_file: "di_log.yaml".to_string(),
            },
            accounts: Vec::new(),
            buckets: Vec::new(),
        }
    }
}

impl DiConfig {
    /// Load configuration from a YAML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(config_path: &str) -> Result<Self, EngineError> {
        if Path::new(config_path).exists() {
            let content = fs::read_to_string(config_path)?;
            let config: DiConfig = serde_yaml::from_str(&content)
                .map_err(|e| EngineError::Config(format!("{}: {}", config_path, e)))?;
            info!("Loaded configuration from {}", config_path);
            Ok(config)
        } else {
            warn!("Config file {} not found, using defaults", config_path);
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_sensible() {
        let config = DiConfig::default();

        assert!(config.workers.pool_size > 0);
        assert_eq!(config.workers.pool_size, config.workers.sessions_per_user);
        assert!(config.destructive.delete_percentage <= 100);
        assert_eq!(config.upload.algorithm, ChecksumAlgorithm::Md5);
        assert!(config.accounts.is_empty());
    }

    #[test]
    fn test_config_yaml_round_trip() {
        let mut config = DiConfig::default();
        config.buckets = vec!["bucket1".to_string(), "bucket2".to_string()];
        config.upload.algorithm = ChecksumAlgorithm::Sha512;
        config.upload.embed_checksum_in_key = true;

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: DiConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.buckets, config.buckets);
        assert_eq!(parsed.upload.algorithm, ChecksumAlgorithm::Sha512);
        assert!(parsed.upload.embed_checksum_in_key);
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let config = DiConfig::load("/nonexistent/di_config.yaml").unwrap();
        assert_eq!(config.upload.key_prefix, "di_obj");
    }

    #[test]
    fn test_load_reads_yaml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("di_config.yaml");

        let mut config = DiConfig::default();
        config.upload.files_per_bucket = 3;
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(serde_yaml::to_string(&config).unwrap().as_bytes())
            .unwrap();

        let loaded = DiConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.upload.files_per_bucket, 3);
    }

    #[test]
    fn test_load_rejects_malformed_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("di_config.yaml");
        fs::write(&path, "workers: [this is not the right shape").unwrap();

        assert!(DiConfig::load(path.to_str().unwrap()).is_err());
    }
}
