use crate::backend::{ConfigRepository, RecordChange};
use crate::error::{require, StoreError, StoreResult};
use crate::file_store::FileConfigRepository;
use crate::models::{
    generate_id, ConfigRecord, ExportedConfig, ImportAction, ImportMode, ImportOutcome,
    ImportRequest,
};
use crate::pg_store::PgConfigRepository;
use cloudcfg_config::{StorageBackend, StorageConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Fresh ids are retried this many times before a collision is reported
const MAX_ID_ATTEMPTS: usize = 3;

/// Config record service: identity, CRUD, export and import reconciliation
#[derive(Clone)]
pub struct ConfigStore {
    repo: Arc<dyn ConfigRepository>,
}

impl ConfigStore {
    pub fn new(repo: Arc<dyn ConfigRepository>) -> Self {
        Self { repo }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(FileConfigRepository::in_memory()))
    }

    /// Create from `configs.yaml` in `storage_dir`
    pub fn from_files(storage_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(FileConfigRepository::load(storage_dir)?)))
    }

    /// Create from PostgreSQL, creating the table if needed
    pub async fn from_postgres(database_url: &str, query_timeout: Duration) -> anyhow::Result<Self> {
        let repo = PgConfigRepository::new(database_url)
            .await?
            .with_timeout(query_timeout);
        repo.run_migrations().await?;
        Ok(Self::new(Arc::new(repo)))
    }

    /// Open whichever backend the configuration selects
    pub async fn open(config: &StorageConfig) -> anyhow::Result<Self> {
        match config.backend {
            StorageBackend::Memory => Ok(Self::in_memory()),
            StorageBackend::File => Self::from_files(&config.dir),
            StorageBackend::Postgres => {
                Self::from_postgres(
                    &config.database_url,
                    Duration::from_millis(config.query_timeout_ms),
                )
                .await
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.repo.backend_name()
    }

    pub async fn count(&self) -> StoreResult<usize> {
        self.repo.count().await
    }

    // ========== CRUD ==========

    /// All records owned by `user`, most recently updated first
    #[instrument(skip(self))]
    pub async fn list(&self, user: &str) -> StoreResult<Vec<ConfigRecord>> {
        self.repo.find_all_by_user(user).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Option<ConfigRecord>> {
        self.repo.find_by_id(id).await
    }

    #[instrument(skip(self, content))]
    pub async fn create(&self, user: &str, name: &str, content: &str) -> StoreResult<ConfigRecord> {
        require("user", user)?;
        require("name", name)?;
        require("content", content)?;

        let mut attempt = 1;
        loop {
            let record = ConfigRecord::new(
                generate_id(),
                user.to_string(),
                name.to_string(),
                content.to_string(),
            );
            match self.repo.insert(&record).await {
                Ok(()) => {
                    info!(id = %record.id, user = %record.user, "Config created");
                    return Ok(record);
                }
                Err(StoreError::AlreadyExists { id }) if attempt < MAX_ID_ATTEMPTS => {
                    warn!(%id, attempt, "Generated config id collided, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Replace the content of an existing record
    #[instrument(skip(self, content))]
    pub async fn update(&self, id: &str, content: &str) -> StoreResult<ConfigRecord> {
        require("content", content)?;

        let change = self
            .repo
            .modify(
                id,
                Box::new(|existing: Option<&ConfigRecord>| {
                    let mut record = existing.cloned().ok_or_else(|| StoreError::not_found(id))?;
                    record.content = content.to_string();
                    record.touch();
                    Ok(RecordChange::Replace(record))
                }),
            )
            .await?;

        info!(%id, "Config updated");
        Ok(change.into_record())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.repo.delete(id).await?;
        info!(%id, "Config deleted");
        Ok(())
    }

    // ========== Synchronization ==========

    /// Transferable fields of a record, for pushing to another deployment
    #[instrument(skip(self))]
    pub async fn export_single(&self, id: &str) -> StoreResult<Option<ExportedConfig>> {
        Ok(self.repo.find_by_id(id).await?.map(|r| r.export()))
    }

    /// Create, overwrite or skip the record at a caller-chosen id.
    ///
    /// The existence check and the write happen in one `modify` step, so
    /// concurrent imports of the same id never act on a stale lookup.
    #[instrument(skip(self, request), fields(mode = ?request.mode.unwrap_or_default()))]
    pub async fn import_single(&self, id: &str, request: ImportRequest) -> StoreResult<ImportOutcome> {
        require("id", id)?;
        let mode = request.mode.unwrap_or_default();

        let change = self
            .repo
            .modify(
                id,
                Box::new(move |existing: Option<&ConfigRecord>| {
                    reconcile_import(id, existing, request, mode)
                }),
            )
            .await?;

        let action = match &change {
            RecordChange::Insert(_) => ImportAction::Created,
            RecordChange::Replace(_) => ImportAction::Updated,
            RecordChange::Unchanged(_) => ImportAction::Skipped,
        };
        let record = change.into_record();

        match action {
            ImportAction::Skipped => debug!(%id, "Import skipped existing config"),
            _ => info!(%id, user = %record.user, ?action, "Config imported"),
        }

        Ok(ImportOutcome {
            id: record.id,
            user: record.user,
            action,
        })
    }
}

/// Decide the import write for `id` given what is stored there now.
fn reconcile_import(
    id: &str,
    existing: Option<&ConfigRecord>,
    request: ImportRequest,
    mode: ImportMode,
) -> StoreResult<RecordChange> {
    match existing {
        // A skip reports the stored owner and discards the payload entirely
        Some(current) if mode == ImportMode::InsertOnly => {
            Ok(RecordChange::Unchanged(current.clone()))
        }
        Some(current) => {
            require("user", &request.user)?;

            let mut updated = current.clone();
            updated.content = request.content;
            if let Some(name) = request.name.filter(|n| !n.is_empty()) {
                updated.name = name;
            }
            updated.user = request.user;
            updated.touch();
            Ok(RecordChange::Replace(updated))
        }
        None => {
            let name = request
                .name
                .filter(|n| !n.is_empty())
                .ok_or(StoreError::MissingField { field: "name" })?;
            require("user", &request.user)?;

            Ok(RecordChange::Insert(ConfigRecord::new(
                id.to_string(),
                request.user,
                name,
                request.content,
            )))
        }
    }
}
