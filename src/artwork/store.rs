use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid checksum: {0:?}")]
    InvalidChecksum(String),
}

/// Content address of an image: lowercase hex SHA-256 of its bytes.
pub fn content_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// MIME type of `data` if it is a recognizable image.
pub fn sniff_image_mime(data: &[u8]) -> Option<&'static str> {
    infer::get(data)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
}

/// Blobs keyed by checksum, laid out as `<root>/<first char>/<checksum>`.
#[derive(Debug, Clone)]
pub struct ArtworkStore {
    root: PathBuf,
}

impl ArtworkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate(checksum: &str) -> Result<(), ArtworkError> {
        if checksum.is_empty() || !checksum.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ArtworkError::InvalidChecksum(checksum.to_string()));
        }
        Ok(())
    }

    pub fn image_path(&self, checksum: &str) -> Result<PathBuf, ArtworkError> {
        Self::validate(checksum)?;
        Ok(self.root.join(&checksum[..1]).join(checksum))
    }

    /// Write `data` under `checksum`. Rewriting an existing image is harmless
    /// since the name is derived from the content.
    pub fn write_image(&self, checksum: &str, data: &[u8]) -> Result<PathBuf, ArtworkError> {
        let path = self.image_path(checksum)?;
        if let Some(shard) = path.parent() {
            fs::create_dir_all(shard)?;
        }
        fs::write(&path, data)?;
        debug!("Wrote {} bytes of artwork to {:?}", data.len(), path);
        Ok(path)
    }

    pub fn read_image(&self, checksum: &str) -> Result<Vec<u8>, ArtworkError> {
        Ok(fs::read(self.image_path(checksum)?)?)
    }
}
