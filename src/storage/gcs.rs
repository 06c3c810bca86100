//! Google Cloud Storage blob store.
//!
//! Built on the `google-cloud-storage` client. Credentials resolve through
//! Application Default Credentials: `GOOGLE_APPLICATION_CREDENTIALS`, the
//! gcloud user login, or the metadata server when running on Google Cloud.

use super::{BlobMeta, BlobStore};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use std::fmt;
use tracing::{debug, info, instrument};

fn storage_error(what: &str, e: impl fmt::Display) -> PipelineError {
    PipelineError::Storage(format!("{what}: {e}"))
}

/// Blob store backed by one GCS bucket.
///
/// # Examples
///
/// ```ignore
/// let store = GcsBlobStore::connect("my-bucket").await?;
/// store.put("raw/raw_20250506_142501.json", b"[]".to_vec(), "application/json").await?;
/// ```
#[derive(Clone)]
pub struct GcsBlobStore {
    client: Client,
    bucket: String,
}

impl GcsBlobStore {
    /// Connect to `bucket` with Application Default Credentials.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Storage`] when no credentials can be found.
    pub async fn connect(bucket: impl Into<String>) -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| storage_error("GCS authentication failed", e))?;
        Ok(Self::with_config(bucket, config))
    }

    /// Build a store from an explicit client configuration (custom endpoint,
    /// anonymous access).
    pub fn with_config(bucket: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            client: Client::new(config),
            bucket: bucket.into(),
        }
    }

    fn list_request(&self, prefix: &str, page_token: Option<String>) -> ListObjectsRequest {
        ListObjectsRequest {
            bucket: self.bucket.clone(),
            prefix: Some(prefix.to_string()),
            page_token,
            ..Default::default()
        }
    }
}

impl fmt::Debug for GcsBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsBlobStore")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Upload descriptor for a simple (single request) upload.
fn simple_upload(key: &str, content_type: &str) -> UploadType {
    let mut media = Media::new(key.to_string());
    media.content_type = content_type.to_string().into();
    UploadType::Simple(media)
}

/// Convert an object creation time given as Unix seconds plus nanoseconds.
/// Objects without one sort before everything else.
fn created_at(unix_secs: Option<(i64, u32)>) -> DateTime<Utc> {
    unix_secs
        .and_then(|(secs, nanos)| DateTime::<Utc>::from_timestamp(secs, nanos))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    #[instrument(
        level = "info",
        skip(self, content),
        fields(bucket = %self.bucket, bytes = content.len())
    )]
    async fn put(&self, key: &str, content: Vec<u8>, content_type: &str) -> Result<()> {
        let request = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };
        self.client
            .upload_object(&request, content, &simple_upload(key, content_type))
            .await
            .map_err(|e| storage_error(&format!("upload of {key} failed"), e))?;
        info!("Uploaded blob to gs://{}/{}", self.bucket, key);
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>> {
        let mut found = Vec::new();
        let mut page_token = None;

        loop {
            let page = self
                .client
                .list_objects(&self.list_request(prefix, page_token))
                .await
                .map_err(|e| storage_error(&format!("listing {prefix:?} failed"), e))?;

            for object in page.items.unwrap_or_default() {
                let created = created_at(
                    object
                        .time_created
                        .map(|t| (t.unix_timestamp(), t.nanosecond())),
                );
                found.push(BlobMeta {
                    key: object.name,
                    created,
                });
            }

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(count = found.len(), "Listed blobs");
        Ok(found)
    }

    #[instrument(level = "debug", skip(self), fields(bucket = %self.bucket))]
    async fn get_text(&self, key: &str) -> Result<String> {
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        };
        let bytes = self
            .client
            .download_object(&request, &Range::default())
            .await
            .map_err(|e| storage_error(&format!("download of {key} failed"), e))?;
        String::from_utf8(bytes)
            .map_err(|e| storage_error(&format!("blob {key} is not UTF-8"), e))
    }

    fn location(&self) -> String {
        format!("gs://{}", self.bucket)
    }
}
