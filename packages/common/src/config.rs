use std::path::PathBuf;

use serde::Deserialize;

/// Which blob backend to open.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Filesystem,
    S3,
}

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Deserialize, Clone)]
pub struct S3Config {
    pub bucket: String,
    /// Region name. Default: "us-east-1".
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// Custom endpoint (MinIO, R2, ...). Uses AWS when absent.
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Use path-style addressing. Default: true.
    #[serde(default = "default_path_style")]
    pub path_style: bool,
}

/// Blob storage configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the filesystem backend. Default: "./data/blobs".
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Largest accepted blob in bytes. Default: 64 MiB.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
    pub s3: Option<S3Config>,
}

fn default_s3_region() -> String {
    "us-east-1".into()
}
fn default_path_style() -> bool {
    true
}
fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/blobs")
}
fn default_max_blob_size() -> u64 {
    64 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
            max_blob_size: default_max_blob_size(),
            s3: None,
        }
    }
}
