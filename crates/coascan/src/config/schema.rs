use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::secrets::SecretRef;

/// Service configuration. Every field has a default, so an empty JSON
/// object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoaConfig {
    #[serde(default = "default_version")]
    pub version: String,
    /// SQLite file. Defaults to `~/.coascan/data/coascan.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    /// Root directory of the filesystem blob store. Defaults to
    /// `~/.coascan/blobs`.
    #[serde(default)]
    pub storage_root: Option<String>,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Base URL clients use to reach this service (upload targets are built
    /// from it).
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,
    /// Lab allow-list. Empty disables the recognized-lab check.
    #[serde(default)]
    pub known_labs: Vec<String>,
    #[serde(default = "default_worker_secret")]
    pub worker_secret: SecretRef,
    #[serde(default = "default_upload_key")]
    pub upload_key: SecretRef,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_bucket() -> String {
    "coa_uploads".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_batch_size() -> u32 {
    3
}

fn default_max_batch_size() -> u32 {
    25
}

fn default_max_attempts() -> u32 {
    5
}

fn default_lease_secs() -> u64 {
    600
}

fn default_budget_secs() -> u64 {
    240
}

fn default_worker_secret() -> SecretRef {
    SecretRef::from_env("COA_WORKER_SECRET")
}

fn default_upload_key() -> SecretRef {
    SecretRef::from_env("COA_UPLOAD_KEY")
}

impl Default for CoaConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            database_path: None,
            storage_root: None,
            bucket: default_bucket(),
            public_base_url: default_public_base_url(),
            bind: default_bind(),
            batch_size: default_batch_size(),
            max_batch_size: default_max_batch_size(),
            max_attempts: default_max_attempts(),
            lease_secs: default_lease_secs(),
            budget_secs: default_budget_secs(),
            known_labs: Vec::new(),
            worker_secret: default_worker_secret(),
            upload_key: default_upload_key(),
        }
    }
}

impl CoaConfig {
    /// Resolved database file, `None` if no path is configured and the home
    /// directory is unknown.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(expand_home(path)),
            None => crate::db::default_database_path(),
        }
    }

    /// Resolved blob store root.
    pub fn storage_root(&self) -> Option<PathBuf> {
        match &self.storage_root {
            Some(path) => Some(expand_home(path)),
            None => dirs::home_dir().map(|h| h.join(".coascan").join("blobs")),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
