//! Archiving of uploaded files to object storage.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::analysis::SourceFile;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("upload of {key} failed: {message}")]
    Upload { key: String, message: String },
}

#[async_trait]
pub trait UploadArchive: Send + Sync {
    /// Stores `file` under `key`.
    async fn put(&self, key: &str, file: &SourceFile) -> Result<(), ArchiveError>;
}

/// Object key for an archived upload. Path separators and control characters
/// in the original name are replaced so the key stays inside its prefix.
pub fn archive_key(session_id: Uuid, file_id: Uuid, name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let safe = match safe.trim_matches('.') {
        "" => "upload".to_string(),
        _ => safe,
    };
    format!("sessions/{session_id}/{file_id}/{safe}")
}

pub struct S3Archive {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Archive {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl UploadArchive for S3Archive {
    async fn put(&self, key: &str, file: &SourceFile) -> Result<(), ArchiveError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(file.content.clone()))
            .content_type(&file.media_type)
            .send()
            .await
            .map_err(|e| ArchiveError::Upload {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        info!("Archived {} ({} bytes) to s3://{}/{}", file.name, file.size(), self.bucket, key);
        Ok(())
    }
}
