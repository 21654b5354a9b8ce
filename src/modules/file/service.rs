use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::api::error;
use crate::modules::file::{
    code::generate_code,
    model::{
        validate_code, validate_file_name, LifecycleConfig, NewFile, PurgeOutcome, PurgeTarget,
        RefreshFile, RowDeletion,
    },
    repository::FileRepository,
    schema::FileEntity,
    storage::BlobStore,
};
use crate::tasks::TaskRunner;

/// Inserts retried with a fresh code after a `files_code_key` collision.
const CODE_ATTEMPTS: usize = 3;

/// An opened blob ready to be streamed to a client.
#[derive(Debug)]
pub struct Download {
    pub name: String,
    pub len: u64,
    pub file: tokio::fs::File,
}

impl From<&FileEntity> for PurgeTarget {
    fn from(file: &FileEntity) -> Self {
        PurgeTarget { id: file.id, path: file.path.clone(), armed_expiry: file.expiry }
    }
}

/// Lifecycle of ephemeral files: metadata first, then the blob, then a purge
/// job armed on both the expiry timer and the shutdown signal.
#[derive(Clone)]
pub struct FileService<R>
where
    R: FileRepository + Send + Sync + 'static,
{
    file_repo: Arc<R>,
    blobs: BlobStore,
    tasks: TaskRunner,
    config: LifecycleConfig,
}

impl<R> FileService<R>
where
    R: FileRepository + Send + Sync + 'static,
{
    pub fn new(file_repo: Arc<R>, tasks: TaskRunner, config: LifecycleConfig) -> Self {
        tracing::info!("FileService storing blobs under {:?}", config.storage_root);
        let blobs = BlobStore::new(config.storage_root.clone());
        Self { file_repo, blobs, tasks, config }
    }

    /// Store a new file for `owner_id` and arm its purge.
    pub async fn upload_file(
        &self,
        owner_id: i64,
        name: String,
        bytes: Vec<u8>,
    ) -> Result<FileEntity, error::SystemError> {
        let mut new_file = NewFile {
            path: BlobStore::path_for(owner_id, &name),
            name,
            size: bytes.len() as i64,
            code: generate_code(),
            expiry: expiry_after(self.config.upload_lifetime)?,
            owner_id,
        };
        new_file.validate()?;

        let mut attempt = 1;
        let file = loop {
            match self.file_repo.insert(&new_file).await {
                Err(error::SystemError::DuplicateCode) if attempt < CODE_ATTEMPTS => {
                    tracing::warn!(owner_id, "Public code collision, retrying");
                    attempt += 1;
                    new_file.code = generate_code();
                }
                res => break res?,
            }
        };

        if let Err(e) = self.blobs.write(&file.path, &bytes).await {
            tracing::error!(file_id = file.id, "Blob write failed after metadata insert: {}", e);
            self.discard_partial(&file).await;
            // the record stays until its purge so it cannot dangle past expiry
            self.schedule_purge(&file);
            return Err(e.into());
        }

        self.schedule_purge(&file);
        tracing::info!(file_id = file.id, owner_id, size = file.size, "File uploaded");
        Ok(file)
    }

    /// All live files of an owner, in no particular order.
    pub async fn list_files(&self, owner_id: i64) -> Result<Vec<FileEntity>, error::SystemError> {
        self.file_repo.list_owned(owner_id, Utc::now()).await
    }

    pub async fn get_file(&self, owner_id: i64, id: i64) -> Result<FileEntity, error::SystemError> {
        if id < 1 {
            return Err(not_found());
        }
        self.file_repo.find_owned(owner_id, id, Utc::now()).await?.ok_or_else(not_found)
    }

    pub async fn open_file(&self, owner_id: i64, id: i64) -> Result<Download, error::SystemError> {
        let file = self.get_file(owner_id, id).await?;
        self.open_blob(&file).await
    }

    pub async fn open_by_code(&self, code: &str) -> Result<Download, error::SystemError> {
        validate_code(code).map_err(|_| error::SystemError::bad_request("Invalid file code"))?;

        let file = self.file_repo.find_by_code(code, Utc::now()).await?.ok_or_else(not_found)?;
        self.open_blob(&file).await
    }

    async fn open_blob(&self, file: &FileEntity) -> Result<Download, error::SystemError> {
        let (handle, len) = match self.blobs.open(&file.path).await {
            Ok(opened) => opened,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::error!(file_id = file.id, "Live file record has no blob");
                return Err(error::SystemError::inconsistent(format!(
                    "blob missing for file {}",
                    file.id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if len != file.size as u64 {
            tracing::error!(file_id = file.id, recorded = file.size, len, "Blob size differs");
            return Err(error::SystemError::inconsistent(format!(
                "blob for file {} is {} bytes, recorded {}",
                file.id, len, file.size
            )));
        }

        Ok(Download { name: file.name.clone(), len, file: handle })
    }

    /// Overwrite a live file under the same name, with a new code and an
    /// extended expiry. The previous purge job becomes a no-op.
    pub async fn replace_file(
        &self,
        owner_id: i64,
        id: i64,
        name: String,
        bytes: Vec<u8>,
    ) -> Result<FileEntity, error::SystemError> {
        validate_file_name(&name).map_err(|e| error::SystemError::bad_request(e.to_string()))?;
        if id < 1 {
            return Err(not_found());
        }

        let mut update = RefreshFile {
            id,
            owner_id,
            path: BlobStore::path_for(owner_id, &name),
            size: bytes.len() as i64,
            code: generate_code(),
            expiry: expiry_after(self.config.replace_lifetime)?,
        };
        update.validate()?;

        let mut attempt = 1;
        let file = loop {
            match self.file_repo.refresh(&update, Utc::now()).await {
                Err(error::SystemError::DuplicateCode) if attempt < CODE_ATTEMPTS => {
                    tracing::warn!(owner_id, file_id = id, "Public code collision, retrying");
                    attempt += 1;
                    update.code = generate_code();
                }
                res => break res?.ok_or_else(not_found)?,
            }
        };

        if let Err(e) = self.blobs.write(&file.path, &bytes).await {
            tracing::error!(file_id = file.id, "Blob overwrite failed after refresh: {}", e);
            self.discard_partial(&file).await;
            self.schedule_purge(&file);
            return Err(e.into());
        }

        self.schedule_purge(&file);

        tracing::info!(file_id = file.id, owner_id, size = file.size, "File replaced");
        Ok(file)
    }

    /// Explicit delete by the owner. Only live records can be deleted.
    pub async fn delete_file(&self, owner_id: i64, id: i64) -> Result<(), error::SystemError> {
        if id < 1 {
            return Err(not_found());
        }

        let path =
            self.file_repo.delete_owned(owner_id, id, Utc::now()).await?.ok_or_else(not_found)?;

        self.blobs.remove(&path).await?;
        self.blobs.prune_parent(&path).await?;

        tracing::info!(file_id = id, owner_id, "File deleted");
        Ok(())
    }

    /// A failed write may leave a truncated blob behind; drop it so the
    /// record reads as missing its blob rather than as a short file.
    async fn discard_partial(&self, file: &FileEntity) {
        if let Err(e) = self.blobs.remove(&file.path).await {
            tracing::warn!(file_id = file.id, "Could not discard partial blob: {}", e);
        }
    }

    /// Idempotent removal of a record, its blob and its empty directory.
    #[cfg(test)]
    pub async fn purge(&self, target: &PurgeTarget) -> Result<PurgeOutcome, error::SystemError> {
        purge(self.file_repo.as_ref(), &self.blobs, target).await
    }

    /// Arm a purge for every stored record; expired ones fire immediately.
    /// Returns the number of jobs armed.
    pub async fn reconcile(&self) -> Result<usize, error::SystemError> {
        let files = self.file_repo.list_all().await?;
        let now = Utc::now();
        let expired = files.iter().filter(|f| !f.is_live(now)).count();

        for file in &files {
            self.schedule_purge(file);
        }

        tracing::info!("Armed {} purge job(s), {} already expired", files.len(), expired);
        Ok(files.len())
    }

    fn schedule_purge(&self, file: &FileEntity) {
        let target = PurgeTarget::from(file);
        let wait = (target.armed_expiry - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let repo = self.file_repo.clone();
        let blobs = self.blobs.clone();
        let shutdown = self.tasks.shutdown_signal();

        self.tasks.spawn("purge", async move {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    tracing::debug!(file_id = target.id, "Expiry reached");
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!(file_id = target.id, "Shutting down, purging early");
                }
            }

            let outcome = purge(repo.as_ref(), &blobs, &target).await?;
            tracing::info!(file_id = target.id, ?outcome, "Purge finished");
            Ok(())
        });
    }
}

async fn purge<R>(
    repo: &R,
    blobs: &BlobStore,
    target: &PurgeTarget,
) -> Result<PurgeOutcome, error::SystemError>
where
    R: FileRepository + Send + Sync + ?Sized,
{
    let deletion = repo.delete_armed(target.id, target.armed_expiry).await?;
    if deletion == RowDeletion::Superseded {
        return Ok(PurgeOutcome::Superseded);
    }
    // the name was uploaded again under a new record; its blob is not ours
    if deletion == RowDeletion::Missing && repo.path_claimed(&target.path).await? {
        return Ok(PurgeOutcome::AlreadyGone);
    }

    let removed = blobs.remove(&target.path).await?;
    blobs.prune_parent(&target.path).await?;

    if deletion == RowDeletion::Deleted {
        if !removed {
            tracing::warn!(file_id = target.id, "Purged a record whose blob was already gone");
        }
        Ok(PurgeOutcome::Purged)
    } else {
        Ok(PurgeOutcome::AlreadyGone)
    }
}

fn expiry_after(lifetime: Duration) -> Result<DateTime<Utc>, error::SystemError> {
    let lifetime = chrono::Duration::from_std(lifetime)
        .map_err(|e| error::SystemError::InternalError(Box::new(e)))?;
    Ok(Utc::now() + lifetime)
}

fn not_found() -> error::SystemError {
    error::SystemError::not_found("File not found")
}
