//! Local filesystem storage for attachment bytes.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn new_key() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Keys are fanned out into two-character directories.
    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        if key.len() < 3 || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid storage key {key:?}"),
            ));
        }
        Ok(self.root.join(&key[..2]).join(key))
    }

    pub async fn put(&self, key: &str, data: &Bytes) -> io::Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        debug!(key, size = data.len(), "stored attachment");
        Ok(())
    }

    pub async fn read(&self, key: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(key)?).await
    }

    /// Delete stored bytes. A missing file is not an error.
    pub async fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error),
        }
    }
}
