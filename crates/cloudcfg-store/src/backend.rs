use crate::error::StoreResult;
use crate::models::ConfigRecord;
use async_trait::async_trait;

/// Write decided by a [`Reconcile`] step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange {
    /// Insert a record that did not exist
    Insert(ConfigRecord),
    /// Overwrite the existing record with the same id
    Replace(ConfigRecord),
    /// Leave storage untouched; carries the record as currently stored
    Unchanged(ConfigRecord),
}

impl RecordChange {
    pub fn record(&self) -> &ConfigRecord {
        match self {
            Self::Insert(r) | Self::Replace(r) | Self::Unchanged(r) => r,
        }
    }

    pub fn into_record(self) -> ConfigRecord {
        match self {
            Self::Insert(r) | Self::Replace(r) | Self::Unchanged(r) => r,
        }
    }
}

/// Decides the write for one id given the record currently stored under it.
/// Returning an error aborts the modification without writing anything.
pub type Reconcile<'a> =
    Box<dyn FnOnce(Option<&ConfigRecord>) -> StoreResult<RecordChange> + Send + 'a>;

/// Trait for config record storage backends
///
/// Every method is atomic at the single-record level.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<ConfigRecord>>;

    /// Records owned by `user`, most recently updated first, ties by id.
    async fn find_all_by_user(&self, user: &str) -> StoreResult<Vec<ConfigRecord>>;

    /// Fails with `AlreadyExists` when the id is taken.
    async fn insert(&self, record: &ConfigRecord) -> StoreResult<()>;

    /// Fails with `NotFound` when the id is absent.
    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Read, decide and write one id as a single exclusive step.
    ///
    /// No other `modify`, `insert` or `delete` for the same id may interleave
    /// between the read handed to `reconcile` and the write of its result.
    async fn modify(&self, id: &str, reconcile: Reconcile<'_>) -> StoreResult<RecordChange>;

    async fn count(&self) -> StoreResult<usize>;

    fn backend_name(&self) -> &'static str;
}
