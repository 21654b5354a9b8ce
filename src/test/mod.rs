use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::api::error;
use crate::modules::file::{
    model::{NewFile, RefreshFile, RowDeletion},
    repository::FileRepository,
    schema::FileEntity,
};

/// In-memory `files` table with the same uniqueness and liveness rules as
/// the postgres schema.
#[derive(Clone, Default)]
pub struct MemoryFileRepository {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    next_id: i64,
    rows: BTreeMap<i64, FileEntity>,
    code_collisions: usize,
}

impl MemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` code writes fail with `DuplicateCode`.
    pub fn collide_codes(&self, n: usize) {
        self.state.lock().unwrap().code_collisions = n;
    }

    /// Move a record's expiry into the past without touching its blob.
    pub fn expire(&self, id: i64) {
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.rows.get_mut(&id) {
            row.expiry = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    pub fn row(&self, id: i64) -> Option<FileEntity> {
        self.state.lock().unwrap().rows.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }
}

impl State {
    fn take_collision(&mut self) -> bool {
        if self.code_collisions == 0 {
            return false;
        }
        self.code_collisions -= 1;
        true
    }

    fn code_taken(&self, code: &str, except: i64) -> bool {
        self.rows.values().any(|row| row.id != except && row.code == code)
    }
}

#[async_trait::async_trait]
impl FileRepository for MemoryFileRepository {
    async fn insert(&self, file: &NewFile) -> Result<FileEntity, error::SystemError> {
        let mut state = self.state.lock().unwrap();
        if state.rows.values().any(|row| row.path == file.path) {
            return Err(error::SystemError::DuplicatePath);
        }
        if state.take_collision() || state.code_taken(&file.code, 0) {
            return Err(error::SystemError::DuplicateCode);
        }

        state.next_id += 1;
        let now = Utc::now();
        let entity = FileEntity {
            id: state.next_id,
            name: file.name.clone(),
            size: file.size,
            path: file.path.clone(),
            code: file.code.clone(),
            expiry: file.expiry,
            created_at: now,
            last_updated: now,
            owner_id: file.owner_id,
        };
        state.rows.insert(entity.id, entity.clone());
        Ok(entity)
    }

    async fn find_owned(
        &self,
        owner_id: i64,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<FileEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state.rows.get(&id).filter(|row| row.owner_id == owner_id && row.is_live(now)).cloned())
    }

    async fn find_by_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FileEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state.rows.values().find(|row| row.code == code && row.is_live(now)).cloned())
    }

    async fn list_owned(
        &self,
        owner_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<FileEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .values()
            .filter(|row| row.owner_id == owner_id && row.is_live(now))
            .cloned()
            .collect())
    }

    async fn refresh(
        &self,
        update: &RefreshFile,
        now: DateTime<Utc>,
    ) -> Result<Option<FileEntity>, error::SystemError> {
        let mut state = self.state.lock().unwrap();
        let matches = state.rows.get(&update.id).is_some_and(|row| {
            row.path == update.path && row.owner_id == update.owner_id && row.is_live(now)
        });
        if !matches {
            return Ok(None);
        }
        if state.take_collision() || state.code_taken(&update.code, update.id) {
            return Err(error::SystemError::DuplicateCode);
        }

        let Some(row) = state.rows.get_mut(&update.id) else {
            return Ok(None);
        };
        row.expiry = update.expiry;
        row.last_updated = now;
        row.code = update.code.clone();
        row.size = update.size;
        Ok(Some(row.clone()))
    }

    async fn delete_owned(
        &self,
        owner_id: i64,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, error::SystemError> {
        let mut state = self.state.lock().unwrap();
        let matches =
            state.rows.get(&id).is_some_and(|row| row.owner_id == owner_id && row.is_live(now));
        if !matches {
            return Ok(None);
        }
        Ok(state.rows.remove(&id).map(|row| row.path))
    }

    async fn delete_armed(
        &self,
        id: i64,
        armed_expiry: DateTime<Utc>,
    ) -> Result<RowDeletion, error::SystemError> {
        let mut state = self.state.lock().unwrap();
        match state.rows.get(&id) {
            None => Ok(RowDeletion::Missing),
            Some(row) if row.expiry > armed_expiry => Ok(RowDeletion::Superseded),
            Some(_) => {
                state.rows.remove(&id);
                Ok(RowDeletion::Deleted)
            }
        }
    }

    async fn path_claimed(&self, path: &str) -> Result<bool, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state.rows.values().any(|row| row.path == path))
    }

    async fn list_all(&self) -> Result<Vec<FileEntity>, error::SystemError> {
        let state = self.state.lock().unwrap();
        Ok(state.rows.values().cloned().collect())
    }
}
