//! Blob storage for uploaded documents.
//!
//! Keys are relative, `/`-separated paths under the `raw/` prefix
//! (`raw/<uuid>.<ext>`). Clients upload directly to the target returned by
//! [`BlobStore::upload_target`]; the parser later reads the same key back.

pub mod filesystem;

use std::collections::BTreeMap;

use crate::error::StorageError;

pub use filesystem::FsBlobStore;

/// Prefix every uploaded document key must live under.
pub const RAW_PREFIX: &str = "raw/";

/// Where and how a client should upload a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

/// A store of uploaded documents.
pub trait BlobStore: Send + Sync {
    /// Builds a direct-upload target for `key`. Does not reserve anything.
    fn upload_target(&self, key: &str, mime_type: &str) -> Result<UploadTarget, StorageError>;

    /// Writes `bytes` under `key`, replacing any previous content.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Reads the content stored under `key`.
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Rejects keys that are outside `raw/` or could escape the store root.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let Some(rest) = key.strip_prefix(RAW_PREFIX) else {
        return Err(invalid("must start with raw/"));
    };
    if rest.is_empty() {
        return Err(invalid("missing file name"));
    }
    if key.contains('\\') || key.contains('\0') {
        return Err(invalid("contains a forbidden character"));
    }
    if rest
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("contains an empty or relative path segment"));
    }
    Ok(())
}
