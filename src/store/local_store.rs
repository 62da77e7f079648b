//! Local directory object store backend
//!
//! Objects live under `<base>/<bucket>/<key>` on the local filesystem.
//! This backend lets the whole engine run without a storage cluster, which
//! is how the CLI exercises an end-to-end upload/verify cycle on a
//! developer machine.

use crate::store::{Credentials, ObjectKey, ObjectStore, StoreError, StoreFactory};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

/// Directory-backed object store.
pub struct LocalDirStore {
    base_path: PathBuf,
}

impl LocalDirStore {
    pub fn new(base_path: &Path) -> Result<Self, StoreError> {
        if !base_path.exists() {
            fs::create_dir_all(base_path)?;
            info!("Created local store directory {}", base_path.display());
        }
        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_path(bucket).join(key)
    }
}

impl ObjectStore for LocalDirStore {
    fn put_object(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let bucket_dir = self.bucket_path(bucket);
        if !bucket_dir.exists() {
            fs::create_dir_all(&bucket_dir)?;
        }
        fs::copy(local_path, self.object_path(bucket, key))?;
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let object_path = self.object_path(bucket, key);
        if !object_path.exists() {
            return Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(object_path, local_path)?;
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let object_path = self.object_path(bucket, key);
        if !object_path.exists() {
            return Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        fs::remove_file(object_path)?;
        Ok(())
    }

    fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectKey>, StoreError> {
        let bucket_dir = self.bucket_path(bucket);
        if !bucket_dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(bucket_dir)? {
            let entry = entry?;
            match entry.file_name().into_string() {
                Ok(name) => keys.push(name),
                Err(_) => warn!("Skipping non-UTF-8 object name in bucket {}", bucket),
            }
        }
        Ok(keys)
    }
}

/// Factory for directory-backed sessions. Credentials are accepted for
/// interface parity with remote backends; only the endpoint is logged.
pub struct LocalStoreFactory {
    base_path: PathBuf,
}

impl LocalStoreFactory {
    pub fn new(base_path: &Path) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
        }
    }
}

impl StoreFactory for LocalStoreFactory {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn ObjectStore>, StoreError> {
        info!(
            "Opening local store session for endpoint {}",
            credentials.endpoint
        );
        Ok(Arc::new(LocalDirStore::new(&self.base_path)?))
    }
}
