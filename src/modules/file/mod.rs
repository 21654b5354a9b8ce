pub mod code;
pub mod handle;
pub mod model;
pub mod repository;
pub mod repository_pg;
pub mod route;
pub mod schema;
pub mod service;
pub mod storage;

pub use model::LifecycleConfig;
pub use repository_pg::FilePgRepository;
pub use service::FileService;
