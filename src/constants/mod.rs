use std::time::Duration;

/// Longest accepted filename, in bytes.
pub const MAX_NAME_BYTES: usize = 50;
/// Largest accepted upload, in bytes.
pub const MAX_FILE_SIZE: usize = 1_000_000;
/// Length of a public retrieval code.
pub const CODE_LENGTH: usize = 8;
/// Upper bound for a single metadata store call.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

pub struct Env {
    pub jwt_secret: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub storage_root: String,
    pub upload_lifetime: u64,
    pub replace_lifetime: u64,
    pub shutdown_grace: u64,
    pub ip: String,
    pub port: u16,
}

impl Env {
    fn new() -> Self {
        let jwt_secret = std::env::var("SECRET_KEY")
            .expect("SECRET_KEY must be set in .env file or environment variable");

        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set in .env file or environment variable");
        let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .expect("DB_MAX_CONNECTIONS must be a valid u32 integer");

        let storage_root = std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "./cache".to_string());
        let upload_lifetime = std::env::var("UPLOAD_LIFETIME")
            .unwrap_or_else(|_| "120".to_string())
            .parse::<u64>()
            .expect("UPLOAD_LIFETIME must be a valid u64 integer");
        let replace_lifetime = std::env::var("REPLACE_LIFETIME")
            .unwrap_or_else(|_| "120".to_string())
            .parse::<u64>()
            .expect("REPLACE_LIFETIME must be a valid u64 integer");
        let shutdown_grace = std::env::var("SHUTDOWN_GRACE")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .expect("SHUTDOWN_GRACE must be a valid u64 integer");

        let ip = std::env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .expect("PORT must be a valid u16 integer");
        Env {
            jwt_secret,
            database_url,
            db_max_connections,
            storage_root,
            upload_lifetime,
            replace_lifetime,
            shutdown_grace,
            ip,
            port,
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
