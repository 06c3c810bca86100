//! Blob storage for stage artifacts.
//!
//! Every stage of a run can persist its output as a blob. The pipeline only
//! needs three capabilities from a store (write a named blob, list blobs under
//! a prefix, read one back as text), captured by [`BlobStore`].
//!
//! # Backends
//!
//! - [`local`]: a directory on disk, keys map to relative paths
//! - [`gcs`]: a Google Cloud Storage bucket through the JSON API
//!
//! # Layout
//!
//! ```text
//! raw/raw_20250506_142501.json
//! filtered/filtered_20250506_142501.json
//! ideas/ideas_20250506_142501.md
//! ```
//!
//! Key construction and the timestamp relationship between stages live in
//! [`stages`].

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod gcs;
pub mod local;
pub mod stages;

/// A listed blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub key: String,
    pub created: DateTime<Utc>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, content: Vec<u8>, content_type: &str) -> Result<()>;

    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>>;

    async fn get_text(&self, key: &str) -> Result<String>;

    /// Human-readable location, for logs (`gs://bucket`, a directory path).
    fn location(&self) -> String;

    /// Most recently created blob under `prefix`. Ties go to the greater key,
    /// which for timestamped names is the later run.
    async fn latest(&self, prefix: &str) -> Result<BlobMeta> {
        self.list(prefix)
            .await?
            .into_iter()
            .max_by(|a, b| a.created.cmp(&b.created).then_with(|| a.key.cmp(&b.key)))
            .ok_or_else(|| {
                PipelineError::Storage(format!(
                    "no blobs under prefix {prefix:?} in {}",
                    self.location()
                ))
            })
    }
}
