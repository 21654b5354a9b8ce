use actix_web::{
    self, App, HttpServer,
    middleware::{Logger, from_fn},
    web,
};
use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
    time::Duration,
};
use tracing_subscriber::EnvFilter;

use crate::{
    configs::connect_database,
    middlewares::authentication,
    modules::file::{FilePgRepository, FileService, LifecycleConfig},
    tasks::TaskRunner,
};

mod api;
mod configs;
mod constants;
mod middlewares;
mod modules;
mod tasks;
#[cfg(test)]
mod test;
mod utils;

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    tracing::info!("Environment variables loaded from .env file");
    constants::Env::default()
});

#[actix_web::get("/")]
async fn health_check(db_pool: web::Data<sqlx::PgPool>) -> &'static str {
    match sqlx::query("SELECT 1").execute(db_pool.get_ref()).await {
        Ok(_) => "Server is running",
        Err(_) => "Server is running, database unreachable",
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let db_pool =
        connect_database().await.map_err(|_| std::io::Error::other("Database connection error"))?;

    let tasks = TaskRunner::new();
    let config = LifecycleConfig {
        storage_root: PathBuf::from(&ENV.storage_root),
        upload_lifetime: Duration::from_secs(ENV.upload_lifetime),
        replace_lifetime: Duration::from_secs(ENV.replace_lifetime),
    };
    let file_service =
        FileService::new(Arc::new(FilePgRepository::new(db_pool.clone())), tasks.clone(), config);

    match file_service.reconcile().await {
        Ok(armed) => tracing::info!("Armed {armed} purge job(s) for stored files"),
        Err(e) => tracing::error!("Startup reconciliation failed: {e}"),
    }

    let file_service = web::Data::new(file_service);
    let db_data = web::Data::new(db_pool);

    tracing::info!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(file_service.clone())
            .app_data(db_data.clone())
            .service(health_check)
            .service(
                web::scope("/api")
                    .configure(modules::file::route::public_api_configure::<FilePgRepository>)
                    .service(
                        web::scope("")
                            .wrap(from_fn(authentication))
                            .configure(modules::file::route::configure::<FilePgRepository>),
                    ),
            )
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await?;

    let grace = Duration::from_secs(ENV.shutdown_grace);
    tracing::info!("Server stopped, running pending purges ({} in flight)", tasks.in_flight());
    if !tasks.shutdown(grace).await {
        tracing::warn!("Background tasks still running after {grace:?}, exiting anyway");
    }
    Ok(())
}
