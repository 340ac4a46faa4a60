mod backend;
mod error;
mod file_store;
mod models;
mod pg_store;
mod service;

pub use backend::{ConfigRepository, Reconcile, RecordChange};
pub use error::{StoreError, StoreResult};
pub use file_store::FileConfigRepository;
pub use models::{
    generate_id, now, ConfigRecord, ExportedConfig, ImportAction, ImportMode, ImportOutcome,
    ImportRequest,
};
pub use pg_store::PgConfigRepository;
pub use service::ConfigStore;

// Re-export for convenience
pub use async_trait::async_trait;
