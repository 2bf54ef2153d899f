use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use axum::extract::{multipart::Field, Multipart};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// A multipart file spooled to the upload directory.
///
/// The file on disk lives exactly as long as this value: dropping it removes
/// the file synchronously, whichever path the request took.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    file_name: String,
    content_type: String,
}

impl TempUpload {
    /// Stream a multipart field to `<dir>/<uuid>.<ext>`.
    pub async fn from_field(mut field: Field<'_>, dir: &Path) -> anyhow::Result<Self> {
        let file_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload".into());
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".into());
        let ext = Path::new(&file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin")
            .to_lowercase();

        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create upload dir {}", dir.display()))?;

        let upload = Self {
            path: dir.join(format!("{}.{}", Uuid::new_v4(), ext)),
            file_name,
            content_type,
        };

        let mut file = tokio::fs::File::create(&upload.path)
            .await
            .with_context(|| format!("create temp file {}", upload.path.display()))?;
        while let Some(chunk) = field.chunk().await.context("read multipart chunk")? {
            file.write_all(&chunk).await.context("write temp file")?;
        }
        file.flush().await.context("flush temp file")?;
        debug!(path = %upload.path.display(), "upload spooled to disk");

        Ok(upload)
    }

    /// Wrap a file that is already on disk. Ownership of the file passes to
    /// the returned value.
    #[cfg(test)]
    pub fn from_path(path: PathBuf, file_name: &str, content_type: &str) -> Self {
        Self {
            path,
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

/// Text fields plus spooled files of one multipart request.
#[derive(Debug, Default)]
pub struct MultipartForm {
    text: HashMap<String, String>,
    files: HashMap<String, TempUpload>,
}

impl MultipartForm {
    /// Read every field. Fields named in `file_fields` are spooled to `dir`
    /// (at most one file each); parts without a file name are treated as
    /// absent files. Anything else is kept as text.
    pub async fn read(
        mut mp: Multipart,
        dir: &Path,
        file_fields: &[&str],
    ) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = mp
            .next_field()
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if file_fields.contains(&name.as_str()) {
                if field.file_name().map_or(true, str::is_empty) {
                    debug!(field = %name, "file field without a file");
                    continue;
                }
                if form.files.contains_key(&name) {
                    return Err(ApiError::validation(format!("Only one {name} file is allowed")));
                }
                let upload = TempUpload::from_field(field, dir).await?;
                form.files.insert(name, upload);
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(e.body_text()))?;
                form.text.insert(name, value);
            }
        }
        Ok(form)
    }

    pub fn take_text(&mut self, name: &str) -> Option<String> {
        self.text.remove(name)
    }

    pub fn take_file(&mut self, name: &str) -> Option<TempUpload> {
        self.files.remove(name)
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "temp upload removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = %self.path.display(), "failed to remove temp upload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"png").unwrap();

        let upload = TempUpload::from_path(path.clone(), "a.png", "image/png");
        assert!(path.exists());
        drop(upload);
        assert!(!path.exists());
    }

    #[test]
    fn dropping_tolerates_already_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let upload = TempUpload::from_path(dir.path().join("gone.png"), "gone.png", "image/png");
        drop(upload);
    }
}
