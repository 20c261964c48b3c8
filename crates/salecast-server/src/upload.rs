//! Multipart upload intake and per-request scratch storage.

use crate::error::{AppError, AppResult};
use axum::{body::Bytes, extract::Multipart};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Name of the multipart field carrying the CSV.
pub const FILE_FIELD: &str = "file";

const FALLBACK_NAME: &str = "upload.csv";

#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

/// Pull the `file` part out of the form.
///
/// Other fields are skipped. The part must carry a non-empty filename with a
/// `.csv` extension.
pub async fn read_upload(multipart: &mut Multipart) -> AppResult<UploadedFile> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            debug!(field = ?field.name(), "skipping form field");
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(AppError::NoSelectedFile);
        }
        if !is_csv(&file_name) {
            return Err(AppError::InvalidFileType);
        }

        let data = field.bytes().await?;
        return Ok(UploadedFile { file_name, data });
    }
    Err(AppError::NoFile)
}

/// True when the name ends in `.csv`, any case.
pub fn is_csv(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("csv"))
}

/// Reduce a client-supplied name to a safe single path component.
pub fn secure_filename(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Scratch directory owned by one request, removed on drop.
#[derive(Debug)]
pub struct UploadScratch {
    dir: TempDir,
}

impl UploadScratch {
    /// Create a fresh directory under `parent`, creating `parent` if needed.
    pub fn new_in(parent: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix("salecast-upload-")
            .tempdir_in(parent)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub async fn save(&self, upload: &UploadedFile) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(secure_filename(&upload.file_name));
        tokio::fs::write(&path, &upload.data).await?;
        Ok(path)
    }
}
