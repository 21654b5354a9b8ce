use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::prelude::FromRow;

/// File metadata row from the `files` table.
///
/// The storage path and owner never leave the server.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileEntity {
    pub id: i64,
    pub name: String,
    pub size: i64,
    #[serde(skip_serializing)]
    pub path: String,
    pub code: String,
    pub expiry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(skip_serializing)]
    #[sqlx(rename = "user_id")]
    pub owner_id: i64,
}

impl FileEntity {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now
    }
}
