//! Media relay: hands uploaded images to an external host and gets back a
//! public URL.

mod cloudinary;
mod s3;
mod upload;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{info, warn};

pub use cloudinary::CloudinaryRelay;
pub use s3::S3Relay;
pub use upload::{MultipartForm, TempUpload};

#[async_trait]
pub trait MediaRelay: Send + Sync {
    /// Upload `body` and return the hosted URL.
    async fn upload(&self, file_name: &str, body: Bytes, content_type: &str)
        -> anyhow::Result<String>;
}

/// Relay a spooled upload. Yields the hosted URL, or `None` when there was no
/// file or the relay failed. The temp file is gone by the time this returns.
pub async fn relay_upload(relay: &dyn MediaRelay, upload: Option<TempUpload>) -> Option<String> {
    let upload = upload?;

    let body = match tokio::fs::read(upload.path()).await {
        Ok(b) => Bytes::from(b),
        Err(e) => {
            warn!(error = %e, path = %upload.path().display(), "read temp upload failed");
            return None;
        }
    };

    let url = match relay
        .upload(upload.file_name(), body, upload.content_type())
        .await
    {
        Ok(url) => {
            info!(%url, "file uploaded to media relay");
            Some(url)
        }
        Err(e) => {
            warn!(error = ?e, file = %upload.file_name(), "media relay upload failed");
            None
        }
    };
    drop(upload);
    url
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
