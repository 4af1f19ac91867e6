//! File intake for article images and user avatars.
//!
//! Uploads are validated before anything touches storage, written under a
//! content-hash name, and then either kept or reverted once the database write
//! that references them has succeeded or failed.

use axum::{
    body::Bytes,
    extract::{Multipart, multipart::MultipartError},
    http::StatusCode,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::{error::AppError, repository::Repository, storage::StorageService};

pub const MAX_UPLOAD_BYTES: usize = 5_000_000;
pub const MAX_FILENAME_CHARS: usize = 100;
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Where an upload is filed under the storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    ArticleImage,
    Avatar,
}

impl UploadKind {
    fn directory(&self) -> &'static str {
        match self {
            UploadKind::ArticleImage => "images",
            UploadKind::Avatar => "avatars",
        }
    }
}

/// A file part read from a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// MultipartForm
///
/// Text fields and file parts of a `multipart/form-data` body. A part is treated as
/// a file when it carries a filename.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    pub async fn collect(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = MultipartForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error("body", e))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| multipart_error(&name, e))?;
                    form.files.insert(name, UploadedFile { file_name, bytes });
                }
                None => {
                    let value = field.text().await.map_err(|e| multipart_error(&name, e))?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    /// A text field, with blank values treated as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// A text field exactly as submitted, blank or not.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Removes and returns a file part. Empty parts (a form with no file chosen)
    /// count as absent.
    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files
            .remove(name)
            .filter(|f| !f.file_name.is_empty() || !f.bytes.is_empty())
    }
}

fn multipart_error(field: &str, err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::PayloadTooLarge("Request body is too large".to_string());
    }
    AppError::field(field, &format!("Malformed multipart body: {}", err.body_text()))
}

/// An upload that passed every check, with its final relative path computed.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub relative_path: String,
    bytes: Bytes,
}

fn extension_of(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// validate
///
/// Checks extension, size and filename length, then derives the stored name from
/// the SHA-256 of the bytes so identical uploads map to the same path.
pub fn validate(
    field: &str,
    file: UploadedFile,
    kind: UploadKind,
) -> Result<ValidatedUpload, AppError> {
    let ext = extension_of(&file.file_name);
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(AppError::InvalidFile(
            "Invalid image. Only PNG, JPG and JPEG are allowed".to_string(),
        ));
    }
    if file.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::InvalidFile(
            "Image must be less than 5 MB".to_string(),
        ));
    }
    if file.file_name.chars().count() > MAX_FILENAME_CHARS {
        return Err(AppError::field(field, "File name is too long"));
    }

    let digest = hex::encode(Sha256::digest(&file.bytes));
    Ok(ValidatedUpload {
        relative_path: format!("{}/{}.{}", kind.directory(), digest, ext),
        bytes: file.bytes,
    })
}

/// StagedFile
///
/// A file written ahead of the database write that references it. `created` records
/// whether this request brought the file into existence; only then may a failed
/// write remove it again, and even then not while a committed row points at it.
#[derive(Debug)]
#[must_use = "a staged file must be kept or reverted once the write outcome is known"]
pub struct StagedFile {
    relative_path: String,
    created: bool,
}

impl StagedFile {
    pub fn path(&self) -> &str {
        &self.relative_path
    }

    /// The database write succeeded; the file stays.
    pub fn keep(self) -> String {
        self.relative_path
    }

    /// The database write failed; undo the staging. Another request may have staged
    /// the same bytes and committed in the meantime, so the file goes through the
    /// same reference check as `retire_file`. Failures are logged, never raised.
    pub async fn revert(self, storage: &dyn StorageService, repo: &dyn Repository) {
        if !self.created {
            return;
        }
        retire_file(storage, repo, &self.relative_path).await;
    }
}

pub async fn stage(
    storage: &dyn StorageService,
    upload: ValidatedUpload,
) -> Result<StagedFile, AppError> {
    let existed = storage.exists(&upload.relative_path).await?;
    storage.put(&upload.relative_path, &upload.bytes).await?;
    Ok(StagedFile {
        relative_path: upload.relative_path,
        created: !existed,
    })
}

/// Stages an optional upload.
pub async fn stage_optional(
    storage: &dyn StorageService,
    upload: Option<ValidatedUpload>,
) -> Result<Option<StagedFile>, AppError> {
    match upload {
        Some(upload) => Ok(Some(stage(storage, upload).await?)),
        None => Ok(None),
    }
}

/// Reverts an optional staged file.
pub async fn revert_optional(
    storage: &dyn StorageService,
    repo: &dyn Repository,
    staged: Option<StagedFile>,
) {
    if let Some(staged) = staged {
        staged.revert(storage, repo).await;
    }
}

/// retire_file
///
/// Removes a file that a committed write stopped referencing, unless some other row
/// still points at it (identical uploads share one content-hash path). Errors are
/// logged and swallowed: the primary operation has already succeeded.
pub async fn retire_file(storage: &dyn StorageService, repo: &dyn Repository, path: &str) {
    match repo.file_in_use(path).await {
        Ok(true) => {
            tracing::debug!(path = %path, "file still referenced, keeping it");
        }
        Ok(false) => {
            if let Err(e) = storage.remove(path).await {
                tracing::warn!(path = %path, error = %e, "failed to remove superseded file");
            }
        }
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "could not check file references, keeping it");
        }
    }
}

/// Retires `old` after an update, only if it was actually replaced.
pub async fn retire_replaced(
    storage: &dyn StorageService,
    repo: &dyn Repository,
    old: Option<&str>,
    new: Option<&str>,
) {
    if let Some(old) = old {
        if Some(old) != new {
            retire_file(storage, repo, old).await;
        }
    }
}
