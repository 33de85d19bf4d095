//! Upload validation and the on-disk upload directory.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use axum::extract::{multipart::MultipartError, Multipart};
use axum::http::StatusCode;

/// Which files a form accepts.
#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    pub extensions: &'static [&'static str],
    pub mimetypes: &'static [&'static str],
}

pub const TOPIC_ATTACHMENTS: UploadPolicy = UploadPolicy {
    extensions: &["txt", "png", "jpg", "jpeg"],
    mimetypes: &["text/plain", "image/png", "image/jpg", "image/jpeg"],
};

pub const PROFILE_IMAGES: UploadPolicy = UploadPolicy {
    extensions: &["png", "jpg", "jpeg"],
    mimetypes: &["image/png", "image/jpg", "image/jpeg"],
};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];

impl UploadPolicy {
    /// Extension after the last `.` (case-insensitive) and the client MIME
    /// string must both be on the list.
    pub fn is_allowed(&self, file_name: &str, mime: &str) -> bool {
        match extension(file_name) {
            Some(ext) => self.extensions.contains(&ext.as_str()) && self.mimetypes.contains(&mime),
            None => false,
        }
    }
}

/// Lower-cased text after the last `.`, if the name has one.
pub fn extension(file_name: &str) -> Option<String> {
    file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Checks the bytes against the extension the client claimed.
pub fn content_matches(ext: &str, bytes: &[u8]) -> bool {
    match ext {
        "png" => bytes.starts_with(PNG_SIGNATURE),
        "jpg" | "jpeg" => bytes.starts_with(JPEG_SIGNATURE),
        "txt" => !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok(),
        _ => false,
    }
}

/// ASCII-only file name: separators and whitespace become `_`, anything
/// outside `[A-Za-z0-9_.-]` is dropped, leading/trailing `.` and `_` trimmed.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String =
        joined.chars().filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')).collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Display/storage name for an upload. Keeps the extension even when the stem
/// has no ASCII left in it.
pub fn safe_upload_name(file_name: &str) -> String {
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, secure_filename(&ext.to_ascii_lowercase())),
        None => (file_name, String::new()),
    };
    let mut stem = secure_filename(stem);
    if stem.is_empty() {
        stem = "file".to_string();
    }
    if ext.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, ext)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("This file type is not allowed.")]
    NotAllowed,
    #[error("Files may be at most {max_mib} MB.")]
    TooLarge { max_mib: usize },
    #[error("The upload could not be read: {0}")]
    Malformed(String),
}

impl UploadError {
    fn too_large(max_file_size: usize) -> Self {
        UploadError::TooLarge { max_mib: max_file_size / (1024 * 1024) }
    }

    fn from_multipart(err: MultipartError, max_file_size: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::too_large(max_file_size)
        } else {
            UploadError::Malformed(err.body_text())
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn validate(&self, policy: &UploadPolicy) -> Result<(), UploadError> {
        if !policy.is_allowed(&self.file_name, &self.content_type) {
            return Err(UploadError::NotAllowed);
        }
        let ext = extension(&self.file_name).unwrap_or_default();
        if !content_matches(&ext, &self.bytes) {
            tracing::warn!(file = %self.file_name, "upload content does not match its extension");
            return Err(UploadError::NotAllowed);
        }
        Ok(())
    }

    pub fn safe_name(&self) -> String {
        safe_upload_name(&self.file_name)
    }
}

/// A fully read multipart form: text fields plus non-empty file parts.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    /// Text value of `name`, empty when absent.
    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}

/// Reads every part into memory. File parts over `max_file_size` abort the
/// read as soon as the limit is crossed; a part without a file name counts as
/// "no file selected".
pub async fn read_multipart(mut multipart: Multipart, max_file_size: usize) -> Result<MultipartForm, UploadError> {
    let mut form = MultipartForm::default();
    while let Some(mut field) =
        multipart.next_field().await.map_err(|e| UploadError::from_multipart(e, max_file_size))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                if file_name.is_empty() {
                    continue;
                }
                let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                let mut bytes = Vec::new();
                while let Some(chunk) =
                    field.chunk().await.map_err(|e| UploadError::from_multipart(e, max_file_size))?
                {
                    if bytes.len() + chunk.len() > max_file_size {
                        return Err(UploadError::too_large(max_file_size));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                form.files.insert(name, UploadedFile { file_name, content_type, bytes });
            }
            None => {
                let value = field.text().await.map_err(|e| UploadError::from_multipart(e, max_file_size))?;
                form.fields.insert(name, value);
            }
        }
    }
    Ok(form)
}

/// The directory holding attachments and profile images.
#[derive(Clone, Debug)]
pub struct UploadStore {
    dir: PathBuf,
    max_file_size: usize,
}

impl UploadStore {
    pub fn new(dir: PathBuf, max_file_size: usize) -> Self {
        Self { dir, max_file_size }
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    pub fn path_for(&self, stored_name: &str) -> PathBuf {
        self.dir.join(stored_name)
    }

    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Writes `bytes` next to their final place under a temporary name. The
    /// file at `stored_name` is untouched until [`StagedUpload::persist`].
    pub async fn stage(&self, stored_name: &str, bytes: &[u8]) -> io::Result<StagedUpload> {
        self.ensure_dir().await?;
        let temp = self.dir.join(format!(".{}.{}.part", stored_name, uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&temp, bytes).await?;
        Ok(StagedUpload { temp, path: self.path_for(stored_name) })
    }

    pub async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    /// Best-effort delete; a missing file is fine.
    pub async fn remove(&self, path: &Path) {
        remove_quietly(path).await
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "upload removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove upload: {}", e),
    }
}

/// An upload written under a temporary name, waiting for its database row.
#[derive(Debug)]
#[must_use = "a staged upload is either persisted or discarded"]
pub struct StagedUpload {
    temp: PathBuf,
    path: PathBuf,
}

impl StagedUpload {
    /// Where the file lands once persisted.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the file into place, replacing any previous file of that name.
    pub async fn persist(self) -> io::Result<PathBuf> {
        if let Err(e) = tokio::fs::rename(&self.temp, &self.path).await {
            remove_quietly(&self.temp).await;
            return Err(e);
        }
        Ok(self.path)
    }

    pub async fn discard(self) {
        remove_quietly(&self.temp).await
    }
}

pub fn topic_file_name(topic_id: i64, safe_name: &str) -> String {
    format!("topic{}_{}", topic_id, safe_name)
}

/// Keyed by the numeric account id; login ids are not safe to put in a path.
pub fn profile_file_name(account_id: i64, safe_name: &str) -> String {
    format!("profile{}_{}", account_id, safe_name)
}
