//! Object Store Client Abstraction
//!
//! The engine drives traffic against an S3-style object store through the
//! [`ObjectStore`] trait, so test runs can target a live cluster, a local
//! directory, or the in-memory mock without touching the drivers. Sessions
//! are constructed through an injected [`StoreFactory`] rather than a
//! module-level singleton, and each user gets a small pool of independent
//! sessions so concurrent work items never share a connection.

pub mod config;
pub mod local_store;
pub mod mock_store;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Object key type
pub type ObjectKey = String;

/// User identifier type
pub type UserId = String;

/// Failures surfaced by a store backend. Work-item handlers absorb these
/// into failure collections; they never propagate through the worker pool.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("store rejected {bucket}/{key}: {reason}")]
    Rejected {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Credentials and endpoint for one user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub endpoint: String,
}

/// One user account the engine drives traffic for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub name: String,
    pub credentials: Credentials,
}

/// Trait defining the object store client interface
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `local_path` as `bucket`/`key`.
    fn put_object(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError>;

    /// Download `bucket`/`key` into `local_path`.
    fn get_object(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError>;

    /// Remove `bucket`/`key` from the store.
    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// List the keys currently stored in `bucket`.
    fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectKey>, StoreError>;
}

/// Builds store sessions from user credentials.
pub trait StoreFactory: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn ObjectStore>, StoreError>;
}

/// A fixed pool of independent store sessions for one user.
///
/// Parallelism comes from one session per in-flight work item, selected
/// round-robin, never from multiplexing a single session.
pub struct SessionPool {
    sessions: Vec<Arc<dyn ObjectStore>>,
    cursor: AtomicUsize,
}

impl SessionPool {
    /// Open `size` sessions for the given credentials.
    pub fn connect(
        factory: &dyn StoreFactory,
        credentials: &Credentials,
        size: usize,
    ) -> Result<Self, StoreError> {
        let mut sessions = Vec::with_capacity(size);
        for _ in 0..size.max(1) {
            sessions.push(factory.connect(credentials)?);
        }
        Ok(Self {
            sessions,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Hand out the next session round-robin.
    pub fn checkout(&self) -> Arc<dyn ObjectStore> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        Arc::clone(&self.sessions[index])
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
