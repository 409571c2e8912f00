//! Filesystem store for uploaded contract files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::Config;
use crate::convert::DocumentKind;
use crate::error::{Error, Result};

/// Suffixed names tried before giving up on a taken file name.
const MAX_RENAME_ATTEMPTS: u32 = 1000;

/// A file written to the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Name inside the upload directory.
    pub file_name: String,
    /// Full path on disk.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// BLAKE3 hash of the contents, hex encoded.
    pub content_hash: String,
}

/// Validates, writes and reads uploaded files.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_file_size: usize,
    max_file_name_len: usize,
    allowed_extensions: Vec<String>,
}

impl UploadStore {
    /// Create a store rooted at `dir` with the default limits.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let defaults = crate::config::UploadConfig::default();
        Self {
            dir: dir.into(),
            max_file_size: defaults.max_file_size,
            max_file_name_len: defaults.max_file_name_len,
            allowed_extensions: defaults.allowed_extensions,
        }
    }

    /// Create a store from the upload section of `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            dir: config.upload_dir(),
            max_file_size: config.upload.max_file_size,
            max_file_name_len: config.upload.max_file_name_len,
            allowed_extensions: config
                .upload
                .allowed_extensions
                .iter()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Override the size limit.
    #[must_use]
    pub fn with_max_file_size(mut self, max: usize) -> Self {
        self.max_file_size = max;
        self
    }

    /// The upload directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The size limit in bytes.
    #[must_use]
    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Check an upload before anything is written.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for an empty name.
    /// - [`Error::UnsupportedFileType`] for an extension outside the allow list.
    /// - [`Error::FileNameTooLong`] for a name longer than the limit.
    /// - [`Error::FileTooLarge`] for too many bytes.
    pub fn validate(&self, file_name: &str, len: usize) -> Result<DocumentKind> {
        if file_name.trim().is_empty() {
            return Err(Error::invalid_input("没有文件被上传"));
        }

        let extension = extension_of(file_name);
        if !self.allowed_extensions.contains(&extension) {
            return Err(Error::UnsupportedFileType {
                extension,
                allowed: self.allowed_extensions.join(", "),
            });
        }

        if file_name.len() > self.max_file_name_len {
            return Err(Error::FileNameTooLong {
                len: file_name.len(),
                max: self.max_file_name_len,
            });
        }

        if len > self.max_file_size {
            return Err(Error::FileTooLarge {
                size: len,
                max: self.max_file_size,
            });
        }

        DocumentKind::from_file_name(file_name)
    }

    /// Write `bytes` under a sanitized version of `file_name`.
    ///
    /// An existing file is never overwritten. A taken name gets a
    /// `_<unix-millis>` suffix before the extension, then `_<unix-millis>_<n>`
    /// while that is taken too.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the write
    /// fails. A partially written file is removed.
    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<StoredFile> {
        let safe_name = sanitize_file_name(file_name)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| Error::DirectoryCreate {
                path: self.dir.clone(),
                source,
            })?;

        let (stored_name, mut file) = self.create_unique(&safe_name).await?;

        let path = self.dir.join(&stored_name);
        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;
        if let Err(err) = written {
            drop(file);
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %cleanup, "Failed to remove partial upload");
            }
            return Err(err.into());
        }

        debug!(path = %path.display(), size = bytes.len(), "Saved upload");
        Ok(StoredFile {
            file_name: stored_name,
            path,
            size: bytes.len() as u64,
            content_hash: blake3::hash(bytes).to_hex().to_string(),
        })
    }

    /// Read a stored file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file does not exist.
    pub async fn read(&self, file_name: &str) -> Result<Vec<u8>> {
        let path = self.path_of(file_name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(Error::not_found("contract file", file_name))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove a stored file. A missing file is not an error.
    ///
    /// Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails for another reason.
    pub async fn remove(&self, file_name: &str) -> Result<bool> {
        let path = self.path_of(file_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Create a file under `name` or the first free suffixed variant of it.
    async fn create_unique(&self, name: &str) -> Result<(String, tokio::fs::File)> {
        match self.create_new(name).await {
            Ok(file) => return Ok((name.to_string(), file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err.into()),
        }

        let millis = Utc::now().timestamp_millis();
        for attempt in 0..MAX_RENAME_ATTEMPTS {
            let renamed = timestamped_name(name, millis, attempt);
            match self.create_new(&renamed).await {
                Ok(file) => {
                    debug!(original = %name, renamed = %renamed, "File name taken");
                    return Ok((renamed, file));
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err.into()),
            }
        }

        Err(Error::internal(format!(
            "no free file name for {name} after {MAX_RENAME_ATTEMPTS} attempts"
        )))
    }

    async fn create_new(&self, name: &str) -> std::io::Result<tokio::fs::File> {
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.dir.join(name))
            .await
    }

    fn path_of(&self, file_name: &str) -> Result<PathBuf> {
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name == ".." {
            return Err(Error::invalid_input(format!(
                "invalid stored file name: {file_name}"
            )));
        }
        Ok(self.dir.join(file_name))
    }
}

/// Lowercased extension of `file_name` including the dot, or empty.
///
/// A leading dot alone (`.txt`) is a hidden file, not an extension.
#[must_use]
pub fn extension_of(file_name: &str) -> String {
    let base = base_name(file_name);
    match base.rfind('.') {
        Some(pos) if pos > 0 => base[pos..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// MIME type stored and served for a document kind.
#[must_use]
pub fn mime_for(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Word => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        DocumentKind::Pdf => "application/pdf",
        DocumentKind::Text => "text/plain",
    }
}

fn base_name(file_name: &str) -> &str {
    file_name.rsplit(['/', '\\']).next().unwrap_or(file_name)
}

/// Final path component with whitespace replaced by `_`.
fn sanitize_file_name(file_name: &str) -> Result<String> {
    let name: String = base_name(file_name.trim())
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::invalid_input(format!("invalid file name: {file_name}")));
    }
    Ok(name)
}

/// `<stem>_<millis><ext>` for the first attempt, `<stem>_<millis>_<n><ext>` after.
fn timestamped_name(name: &str, millis: i64, attempt: u32) -> String {
    let extension = match name.rfind('.') {
        Some(pos) if pos > 0 => &name[pos..],
        _ => "",
    };
    let stem = &name[..name.len() - extension.len()];
    if attempt == 0 {
        format!("{stem}_{millis}{extension}")
    } else {
        format!("{stem}_{millis}_{attempt}{extension}")
    }
}
