use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
    api::error,
    constants::QUERY_TIMEOUT,
    modules::file::{
        model::{NewFile, RefreshFile, RowDeletion},
        repository::FileRepository,
        schema::FileEntity,
    },
};

#[derive(Clone)]
pub struct FilePgRepository {
    pool: sqlx::PgPool,
}

impl FilePgRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

/// Run a store call, failing it once it exceeds `QUERY_TIMEOUT`.
async fn bounded<T, F>(fut: F) -> Result<T, error::SystemError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(res) => Ok(res?),
        Err(_) => Err(error::SystemError::Timeout(QUERY_TIMEOUT)),
    }
}

fn classify_conflict(err: error::SystemError) -> error::SystemError {
    match err.violated_constraint() {
        Some("files_path_key") => error::SystemError::DuplicatePath,
        Some("files_code_key") => error::SystemError::DuplicateCode,
        _ => err,
    }
}

#[async_trait::async_trait]
impl FileRepository for FilePgRepository {
    async fn insert(&self, file: &NewFile) -> Result<FileEntity, error::SystemError> {
        bounded(
            sqlx::query_as::<_, FileEntity>(
                r#"
                INSERT INTO files (name, size, path, code, expiry, user_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(&file.name)
            .bind(file.size)
            .bind(&file.path)
            .bind(&file.code)
            .bind(file.expiry)
            .bind(file.owner_id)
            .fetch_one(&self.pool),
        )
        .await
        .map_err(classify_conflict)
    }

    async fn find_owned(
        &self,
        owner_id: i64,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<FileEntity>, error::SystemError> {
        bounded(
            sqlx::query_as::<_, FileEntity>(
                "SELECT * FROM files WHERE id = $1 AND user_id = $2 AND expiry > $3",
            )
            .bind(id)
            .bind(owner_id)
            .bind(now)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_by_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FileEntity>, error::SystemError> {
        bounded(
            sqlx::query_as::<_, FileEntity>("SELECT * FROM files WHERE code = $1 AND expiry > $2")
                .bind(code)
                .bind(now)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn list_owned(
        &self,
        owner_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<FileEntity>, error::SystemError> {
        bounded(
            sqlx::query_as::<_, FileEntity>(
                "SELECT * FROM files WHERE user_id = $1 AND expiry > $2",
            )
            .bind(owner_id)
            .bind(now)
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn refresh(
        &self,
        update: &RefreshFile,
        now: DateTime<Utc>,
    ) -> Result<Option<FileEntity>, error::SystemError> {
        bounded(
            sqlx::query_as::<_, FileEntity>(
                r#"
                UPDATE files
                SET expiry = $1, last_updated = $2, code = $3, size = $4
                WHERE path = $5 AND id = $6 AND user_id = $7 AND expiry > $2
                RETURNING *
                "#,
            )
            .bind(update.expiry)
            .bind(now)
            .bind(&update.code)
            .bind(update.size)
            .bind(&update.path)
            .bind(update.id)
            .bind(update.owner_id)
            .fetch_optional(&self.pool),
        )
        .await
        .map_err(classify_conflict)
    }

    async fn delete_owned(
        &self,
        owner_id: i64,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, error::SystemError> {
        bounded(
            sqlx::query_scalar::<_, String>(
                r#"
                DELETE FROM files
                WHERE id = $1 AND user_id = $2 AND expiry > $3
                RETURNING path
                "#,
            )
            .bind(id)
            .bind(owner_id)
            .bind(now)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn delete_armed(
        &self,
        id: i64,
        armed_expiry: DateTime<Utc>,
    ) -> Result<RowDeletion, error::SystemError> {
        // the outer SELECT sees the pre-delete snapshot, so `present` covers the deleted row too
        let (deleted, present) = bounded(
            sqlx::query_as::<_, (bool, bool)>(
                r#"
                WITH deleted AS (
                    DELETE FROM files WHERE id = $1 AND expiry <= $2 RETURNING id
                )
                SELECT
                    EXISTS (SELECT 1 FROM deleted),
                    EXISTS (SELECT 1 FROM files WHERE id = $1)
                "#,
            )
            .bind(id)
            .bind(armed_expiry)
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(match (deleted, present) {
            (true, _) => RowDeletion::Deleted,
            (false, true) => RowDeletion::Superseded,
            (false, false) => RowDeletion::Missing,
        })
    }

    async fn path_claimed(&self, path: &str) -> Result<bool, error::SystemError> {
        bounded(
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM files WHERE path = $1)")
                .bind(path)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn list_all(&self) -> Result<Vec<FileEntity>, error::SystemError> {
        bounded(sqlx::query_as::<_, FileEntity>("SELECT * FROM files").fetch_all(&self.pool)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn create_user(pool: &sqlx::PgPool, email: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("INSERT INTO users (email) VALUES ($1) RETURNING id")
            .bind(email)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn new_file(owner_id: i64, name: &str, code: &str, expiry: DateTime<Utc>) -> NewFile {
        NewFile {
            name: name.to_string(),
            size: 5,
            path: format!("{owner_id}/{name}"),
            code: code.to_string(),
            expiry,
            owner_id,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_store_call_times_out() {
        let res = bounded(std::future::pending::<Result<(), sqlx::Error>>()).await;
        assert!(matches!(res, Err(error::SystemError::Timeout(d)) if d == QUERY_TIMEOUT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_store_call_passes_through() {
        let res = bounded(async { Ok::<_, sqlx::Error>(5) }).await;
        assert!(matches!(res, Ok(5)));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires a postgres DATABASE_URL"]
    async fn test_insert_classifies_unique_violations(pool: sqlx::PgPool) {
        let repo = FilePgRepository::new(pool.clone());
        let owner = create_user(&pool, "u@example.com").await;
        let expiry = Utc::now() + Duration::minutes(2);

        repo.insert(&new_file(owner, "a.txt", "AAAAAAAA", expiry)).await.unwrap();

        let dup_path = repo.insert(&new_file(owner, "a.txt", "BBBBBBBB", expiry)).await;
        assert!(matches!(dup_path, Err(error::SystemError::DuplicatePath)));

        let dup_code = repo.insert(&new_file(owner, "b.txt", "AAAAAAAA", expiry)).await;
        assert!(matches!(dup_code, Err(error::SystemError::DuplicateCode)));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires a postgres DATABASE_URL"]
    async fn test_reads_filter_expired(pool: sqlx::PgPool) {
        let repo = FilePgRepository::new(pool.clone());
        let owner = create_user(&pool, "u@example.com").await;
        let past = Utc::now() - Duration::seconds(1);

        let file = repo.insert(&new_file(owner, "old.txt", "CCCCCCCC", past)).await.unwrap();
        let now = Utc::now();

        assert!(repo.find_owned(owner, file.id, now).await.unwrap().is_none());
        assert!(repo.find_by_code("CCCCCCCC", now).await.unwrap().is_none());
        assert!(repo.list_owned(owner, now).await.unwrap().is_empty());
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires a postgres DATABASE_URL"]
    async fn test_delete_armed_outcomes(pool: sqlx::PgPool) {
        let repo = FilePgRepository::new(pool.clone());
        let owner = create_user(&pool, "u@example.com").await;
        let armed = Utc::now() + Duration::minutes(2);
        let file = repo.insert(&new_file(owner, "a.txt", "DDDDDDDD", armed)).await.unwrap();

        let refresh = RefreshFile {
            id: file.id,
            owner_id: owner,
            path: file.path.clone(),
            size: 5,
            code: "EEEEEEEE".into(),
            expiry: armed + Duration::minutes(2),
        };
        assert!(repo.refresh(&refresh, Utc::now()).await.unwrap().is_some());

        assert_eq!(repo.delete_armed(file.id, armed).await.unwrap(), RowDeletion::Superseded);
        assert_eq!(
            repo.delete_armed(file.id, refresh.expiry).await.unwrap(),
            RowDeletion::Deleted
        );
        assert_eq!(repo.delete_armed(file.id, refresh.expiry).await.unwrap(), RowDeletion::Missing);
        assert!(!repo.path_claimed(&file.path).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires a postgres DATABASE_URL"]
    async fn test_owner_scoping(pool: sqlx::PgPool) {
        let repo = FilePgRepository::new(pool.clone());
        let owner = create_user(&pool, "u@example.com").await;
        let other = create_user(&pool, "v@example.com").await;
        let expiry = Utc::now() + Duration::minutes(2);
        let file = repo.insert(&new_file(owner, "a.txt", "FFFFFFFF", expiry)).await.unwrap();

        assert!(repo.find_owned(other, file.id, Utc::now()).await.unwrap().is_none());
        assert!(repo.delete_owned(other, file.id, Utc::now()).await.unwrap().is_none());
        assert_eq!(
            repo.delete_owned(owner, file.id, Utc::now()).await.unwrap().as_deref(),
            Some(file.path.as_str())
        );
    }
}
