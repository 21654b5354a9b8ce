use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{api::error, constants::QUERY_TIMEOUT, ENV};

pub async fn connect_database() -> Result<PgPool, error::SystemError> {
    let database_url = &ENV.database_url;
    let pool = PgPoolOptions::new()
        .max_connections(ENV.db_max_connections)
        .min_connections(1)
        .acquire_timeout(QUERY_TIMEOUT)
        .acquire_slow_threshold(std::time::Duration::from_secs(1))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database connected and migrations applied");
    Ok(pool)
}
