//! Mock implementation of ObjectStore for testing

use crate::store::{ObjectKey, ObjectStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::info;

/// In-memory object store with fault injection for tests.
///
/// Cloning is cheap and every clone shares the same backing map, which is
/// how the factory models several independent sessions into one cluster.
#[derive(Clone)]
pub struct MockObjectStore {
    // In-memory storage: bucket -> key -> data
    data: Arc<Mutex<HashMap<String, HashMap<String, Vec<u8>>>>>,
    // (bucket, key) pairs whose downloads fail with a connection error
    broken_downloads: Arc<Mutex<HashSet<(String, String)>>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            broken_downloads: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Get the number of objects in a bucket
    pub fn object_count(&self, bucket: &str) -> usize {
        let data = self.data.lock().unwrap();
        data.get(bucket).map(|objects| objects.len()).unwrap_or(0)
    }

    /// Check if an object exists in a bucket
    pub fn object_exists(&self, bucket: &str, key: &str) -> bool {
        let data = self.data.lock().unwrap();
        data.get(bucket)
            .map(|objects| objects.contains_key(key))
            .unwrap_or(false)
    }

    /// Clear all data from the store
    pub fn clear(&self) {
        let mut data = self.data.lock().unwrap();
        data.clear();
    }

    /// Replace an object's stored bytes to simulate silent corruption.
    pub fn corrupt_object(&self, bucket: &str, key: &str, bytes: &[u8]) {
        let mut data = self.data.lock().unwrap();
        if let Some(objects) = data.get_mut(bucket) {
            if let Some(stored) = objects.get_mut(key) {
                *stored = bytes.to_vec();
                info!("Mock: Corrupted object {}/{}", bucket, key);
            }
        }
    }

    /// Make future downloads of `bucket`/`key` fail with a connection error.
    pub fn fail_downloads_for(&self, bucket: &str, key: &str) {
        let mut broken = self.broken_downloads.lock().unwrap();
        broken.insert((bucket.to_string(), key.to_string()));
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MockObjectStore {
    fn put_object(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let bytes = fs::read(local_path)?;
        let mut data = self.data.lock().unwrap();
        let objects = data.entry(bucket.to_string()).or_insert_with(HashMap::new);
        objects.insert(key.to_string(), bytes);

        info!("Mock: Stored object {}/{}", bucket, key);
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        {
            let broken = self.broken_downloads.lock().unwrap();
            if broken.contains(&(bucket.to_string(), key.to_string())) {
                return Err(StoreError::Connection {
                    endpoint: "mock".to_string(),
                    reason: format!("injected download failure for {}/{}", bucket, key),
                });
            }
        }

        let data = self.data.lock().unwrap();
        let bytes = data
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(local_path, bytes)?;

        info!("Mock: Fetched object {}/{}", bucket, key);
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap();
        let removed = data
            .get_mut(bucket)
            .and_then(|objects| objects.remove(key));

        match removed {
            Some(_) => {
                info!("Mock: Deleted object {}/{}", bucket, key);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
        }
    }

    fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectKey>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default())
    }
}

/// Factory handing out sessions that all share one backing store.
pub struct MockStoreFactory {
    store: MockObjectStore,
}

impl MockStoreFactory {
    pub fn new() -> Self {
        Self {
            store: MockObjectStore::new(),
        }
    }

    /// Create a factory over an existing store so tests can keep a handle
    /// for inspection and fault injection.
    pub fn with_store(store: MockObjectStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> MockObjectStore {
        self.store.clone()
    }
}

impl Default for MockStoreFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::store::StoreFactory for MockStoreFactory {
    fn connect(
        &self,
        _credentials: &crate::store::Credentials,
    ) -> Result<Arc<dyn ObjectStore>, StoreError> {
        Ok(Arc::new(self.store.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_local(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    #[test]
    fn test_mock_store_basic_operations() {
        let dir = tempdir().unwrap();
        let store = MockObjectStore::new();
        let test_data = b"Hello, Mock Object Store!";

        // Initially empty
        assert_eq!(store.object_count("bucket1"), 0);
        assert!(!store.object_exists("bucket1", "obj1"));

        // Test put_object
        let local = write_local(dir.path(), "upload_me", test_data);
        store.put_object("bucket1", "obj1", &local).unwrap();
        assert_eq!(store.object_count("bucket1"), 1);
        assert!(store.object_exists("bucket1", "obj1"));

        // Test get_object round trip
        let fetched = dir.path().join("fetched");
        store.get_object("bucket1", "obj1", &fetched).unwrap();
        assert_eq!(fs::read(&fetched).unwrap(), test_data);

        // Test list_objects
        assert_eq!(store.list_objects("bucket1").unwrap(), vec!["obj1"]);

        // Test delete_object
        store.delete_object("bucket1", "obj1").unwrap();
        assert!(!store.object_exists("bucket1", "obj1"));
    }

    #[test]
    fn test_mock_store_error_cases() {
        let dir = tempdir().unwrap();
        let store = MockObjectStore::new();

        // Download of a nonexistent object
        let target = dir.path().join("nothing");
        assert!(store.get_object("bucket1", "missing", &target).is_err());

        // Delete of a nonexistent object
        assert!(store.delete_object("bucket1", "missing").is_err());

        // Upload from a nonexistent local file
        let ghost = dir.path().join("ghost");
        assert!(store.put_object("bucket1", "obj1", &ghost).is_err());
    }

    #[test]
    fn test_mock_store_fault_injection() {
        let dir = tempdir().unwrap();
        let store = MockObjectStore::new();
        let local = write_local(dir.path(), "payload", b"original bytes");
        store.put_object("bucket1", "obj1", &local).unwrap();

        // Corruption replaces the stored bytes but keeps the object
        store.corrupt_object("bucket1", "obj1", b"tampered bytes");
        let fetched = dir.path().join("fetched");
        store.get_object("bucket1", "obj1", &fetched).unwrap();
        assert_eq!(fs::read(&fetched).unwrap(), b"tampered bytes");

        // Injected download failure surfaces as a connection error
        store.fail_downloads_for("bucket1", "obj1");
        let err = store.get_object("bucket1", "obj1", &fetched).unwrap_err();
        assert!(matches!(err, StoreError::Connection { .. }));
    }

    #[test]
    fn test_factory_sessions_share_one_backing_store() {
        use crate::store::{Credentials, StoreFactory};

        let dir = tempdir().unwrap();
        let factory = MockStoreFactory::new();
        let credentials = Credentials {
            access_key: "AK".to_string(),
            secret_key: "SK".to_string(),
            endpoint: "mock".to_string(),
        };

        let session_a = factory.connect(&credentials).unwrap();
        let session_b = factory.connect(&credentials).unwrap();

        let local = write_local(dir.path(), "payload", b"shared");
        session_a.put_object("bucket1", "obj1", &local).unwrap();

        // The second session sees what the first one wrote
        let fetched = dir.path().join("fetched");
        session_b.get_object("bucket1", "obj1", &fetched).unwrap();
        assert_eq!(fs::read(&fetched).unwrap(), b"shared");
    }
}
