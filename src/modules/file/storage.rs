use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Filesystem blob storage: `<root>/<owner_id>/<file name>`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage-relative path of an owner's file.
    pub fn path_for(owner_id: i64, name: &str) -> String {
        format!("{owner_id}/{name}")
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// Write (or overwrite) a blob, creating the owner directory if needed.
    pub async fn write(&self, path: &str, bytes: &[u8]) -> std::io::Result<()> {
        let full_path = self.full_path(path);

        match Self::write_file(&full_path, bytes).await {
            // a concurrent purge may prune the directory between create_dir_all and create
            Err(e) if e.kind() == ErrorKind::NotFound => Self::write_file(&full_path, bytes).await,
            res => res,
        }?;

        tracing::debug!("Saved blob to {:?}", full_path);
        Ok(())
    }

    async fn write_file(full_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(full_path).await?;
        file.write_all(bytes).await?;
        file.flush().await
    }

    /// Open a blob for streaming, along with its current length.
    pub async fn open(&self, path: &str) -> std::io::Result<(fs::File, u64)> {
        let file = fs::File::open(self.full_path(path)).await?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Remove a blob. Returns `false` when there was nothing to remove.
    pub async fn remove(&self, path: &str) -> std::io::Result<bool> {
        match fs::remove_file(self.full_path(path)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove the directory holding `path` if it is now empty. The root itself is kept.
    pub async fn prune_parent(&self, path: &str) -> std::io::Result<bool> {
        let Some(dir) = self.full_path(path).parent().map(Path::to_path_buf) else {
            return Ok(false);
        };
        if dir == self.root {
            return Ok(false);
        }

        match fs::remove_dir(&dir).await {
            Ok(()) => {
                tracing::debug!("Pruned empty directory {:?}", dir);
                Ok(true)
            }
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::DirectoryNotEmpty) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
