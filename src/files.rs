//! Attachment storage for clinical records.
//!
//! Files land under `<media_root>/record/` and are encrypted with the field
//! cipher before they touch the disk.

use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::secured::FieldCipher;

pub const RECORD_UPLOAD_DIR: &str = "record";
const MAX_FILENAME_LEN: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("invalid attachment path: {0}")]
    InvalidPath(String),

    #[error("attachment io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("attachment could not be decrypted: {0}")]
    Cipher(#[from] crate::secured::CipherError),
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encrypt and write `bytes`; returns the path relative to the media root.
    pub async fn save_record_file(
        &self,
        cipher: &dyn FieldCipher,
        record_id: Uuid,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, FileError> {
        let relative = format!("{RECORD_UPLOAD_DIR}/{record_id}_{}", sanitize_filename(filename));
        let path = self.resolve(&relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let sealed = cipher.encrypt_bytes(bytes)?;
        tokio::fs::write(&path, sealed).await?;
        tracing::debug!(path = %relative, size = bytes.len(), "attachment stored");
        Ok(relative)
    }

    pub async fn read(&self, cipher: &dyn FieldCipher, relative: &str) -> Result<Vec<u8>, FileError> {
        let sealed = tokio::fs::read(self.resolve(relative)?).await?;
        Ok(cipher.decrypt_bytes(&sealed)?)
    }

    /// Missing files are not an error.
    pub async fn remove(&self, relative: &str) -> Result<(), FileError> {
        match tokio::fs::remove_file(self.resolve(relative)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, FileError> {
        let rel = Path::new(relative);
        let inside_uploads = rel
            .components()
            .next()
            .is_some_and(|c| c == Component::Normal(RECORD_UPLOAD_DIR.as_ref()));
        let only_normal = rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !inside_uploads || !only_normal {
            return Err(FileError::InvalidPath(relative.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

/// Original file name part of a stored attachment path.
pub fn display_name(relative: &str) -> &str {
    let name = relative.rsplit('/').next().unwrap_or(relative);
    // strip the "<uuid>_" prefix
    match name.split_once('_') {
        Some((prefix, rest)) if Uuid::parse_str(prefix).is_ok() => rest,
        _ => name,
    }
}

fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .take(MAX_FILENAME_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}
