use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::models::StoredFile;

pub const UPLOAD_FIELD: &str = "image";

pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif"];

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no file uploaded")]
    Missing,

    #[error("unexpected file field '{0}'")]
    UnexpectedField(String),

    #[error("invalid file type {0:?}, only jpeg, png and gif are allowed")]
    InvalidType(Option<String>),

    #[error("file exceeds the {limit} byte upload limit")]
    TooLarge { limit: u64 },

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// True for errors caused by the request rather than by the server
    pub fn is_client_error(&self) -> bool {
        !matches!(self, UploadError::Io(_))
    }
}

pub fn is_allowed_mime(mime: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime)
}

/// Stream the one `image` file to `uploads_dir`; rejected or abandoned files go with their `StoredFile`
pub async fn receive_image(
    multipart: &mut Multipart,
    uploads_dir: &Path,
) -> Result<StoredFile, UploadError> {
    let mut stored: Option<StoredFile> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        if name != UPLOAD_FIELD || stored.is_some() {
            if field.file_name().is_some() {
                return Err(UploadError::UnexpectedField(name));
            }
            // Plain text fields are tolerated and skipped.
            continue;
        }

        stored = Some(store_field(field, uploads_dir).await?);
    }

    stored.ok_or(UploadError::Missing)
}

async fn store_field(field: Field<'_>, uploads_dir: &Path) -> Result<StoredFile, UploadError> {
    let mime_type = match field.content_type() {
        Some(mime) if is_allowed_mime(mime) => mime.to_string(),
        other => return Err(UploadError::InvalidType(other.map(str::to_string))),
    };

    let original_name = field.file_name().unwrap_or_default().to_string();
    let mut stored = StoredFile::create(uploads_dir, &original_name, &mime_type);
    stored.size = write_limited(field, &stored.path, MAX_UPLOAD_BYTES).await?;

    tracing::info!(
        path = %stored.path.display(),
        original = %stored.original_name,
        mime = %stored.mime_type,
        size = stored.size,
        "Stored upload"
    );
    Ok(stored)
}

async fn write_limited(mut field: Field<'_>, path: &Path, limit: u64) -> Result<u64, UploadError> {
    let mut file = File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.chunk().await? {
        written += chunk.len() as u64;
        if written > limit {
            tracing::warn!(written, limit, "Upload size limit exceeded, aborting");
            return Err(UploadError::TooLarge { limit });
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}
