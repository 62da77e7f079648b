//! Engine-level error types
//!
//! Only batch-level failures surface as errors: missing preconditions
//! (an empty upload log, a user with no store session) or infrastructure
//! problems (I/O on a journal or report file). Per-object failures during
//! a run are not errors; work-item handlers record them into failure
//! collections that the caller inspects after the batch completes.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The upload log carries no rows for the requested users.
    #[error("no upload data found in {0}")]
    NoUploadData(PathBuf),

    /// A work item referenced a user we never built a store session for.
    #[error("no store session available for user {0}")]
    MissingSession(String),

    /// The object key does not carry a decodable base32 checksum token.
    #[error("object key {0} has no decodable checksum token")]
    BadChecksumToken(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
