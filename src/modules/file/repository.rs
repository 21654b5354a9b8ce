use chrono::{DateTime, Utc};

use crate::{
    api::error,
    modules::file::{
        model::{NewFile, RefreshFile, RowDeletion},
        schema::FileEntity,
    },
};

/// Metadata store for file records.
///
/// Every read and write that acts on behalf of a user is filtered on
/// liveness (`expiry > now`), with `now` supplied by the caller.
#[async_trait::async_trait]
pub trait FileRepository {
    /// Insert a record. Path and code collisions surface as
    /// `DuplicatePath` / `DuplicateCode`.
    async fn insert(&self, file: &NewFile) -> Result<FileEntity, error::SystemError>;

    async fn find_owned(
        &self,
        owner_id: i64,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<FileEntity>, error::SystemError>;

    async fn find_by_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FileEntity>, error::SystemError>;

    async fn list_owned(
        &self,
        owner_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<FileEntity>, error::SystemError>;

    /// Conditional update keyed by path, id, owner and liveness.
    async fn refresh(
        &self,
        update: &RefreshFile,
        now: DateTime<Utc>,
    ) -> Result<Option<FileEntity>, error::SystemError>;

    /// Delete a live record owned by `owner_id`, returning its path.
    async fn delete_owned(
        &self,
        owner_id: i64,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, error::SystemError>;

    /// Delete the record unless it was extended past `armed_expiry`.
    async fn delete_armed(
        &self,
        id: i64,
        armed_expiry: DateTime<Utc>,
    ) -> Result<RowDeletion, error::SystemError>;

    /// Whether any record, live or not, currently owns `path`.
    async fn path_claimed(&self, path: &str) -> Result<bool, error::SystemError>;

    /// Every stored record regardless of liveness.
    async fn list_all(&self) -> Result<Vec<FileEntity>, error::SystemError>;
}
