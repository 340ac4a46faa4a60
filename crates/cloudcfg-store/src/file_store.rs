use crate::backend::{ConfigRepository, Reconcile, RecordChange};
use crate::error::{StoreError, StoreResult};
use crate::models::ConfigRecord;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

const RECORDS_FILE: &str = "configs.yaml";

type Records = HashMap<String, ConfigRecord>;

/// Config records held in memory, optionally mirrored to a YAML file
///
/// Every mutation holds the write lock from the read that decides it until
/// the result is on disk and in memory, so `modify` is exclusive per id.
#[derive(Debug)]
pub struct FileConfigRepository {
    records: Arc<RwLock<Records>>,
    storage_dir: Option<PathBuf>,
}

/// One write to apply to the map once it has been persisted
enum PendingWrite {
    Put(ConfigRecord),
    Remove(String),
}

impl PendingWrite {
    fn apply(self, records: &mut Records) {
        match self {
            Self::Put(record) => {
                records.insert(record.id.clone(), record);
            }
            Self::Remove(id) => {
                records.remove(&id);
            }
        }
    }
}

impl FileConfigRepository {
    /// Create a store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            storage_dir: None,
        }
    }

    /// Create an empty store persisted under `storage_dir`
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            storage_dir: Some(storage_dir.into()),
        }
    }

    /// Load records from `storage_dir/configs.yaml`, starting empty if absent
    pub fn load(storage_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let storage_dir = storage_dir.as_ref();

        let records_path = storage_dir.join(RECORDS_FILE);
        let mut records = HashMap::new();
        if records_path.exists() {
            let content = std::fs::read_to_string(&records_path)
                .with_context(|| format!("Failed to read {}", records_path.display()))?;
            let list: Vec<ConfigRecord> = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", records_path.display()))?;
            for record in list {
                if records.contains_key(&record.id) {
                    return Err(anyhow!(
                        "Duplicate config id '{}' in {}",
                        record.id,
                        records_path.display()
                    ));
                }
                records.insert(record.id.clone(), record);
            }
        }

        Ok(Self {
            records: Arc::new(RwLock::new(records)),
            storage_dir: Some(storage_dir.to_path_buf()),
        })
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    async fn lock(&self) -> OwnedRwLockWriteGuard<Records> {
        Arc::clone(&self.records).write_owned().await
    }

    /// Persist `write`, then apply it to the locked map.
    ///
    /// The work runs on its own task that owns the lock, so a caller that
    /// stops waiting neither leaves memory ahead of `configs.yaml` nor lets
    /// the next writer race it on the temporary file.
    async fn commit(
        &self,
        mut records: OwnedRwLockWriteGuard<Records>,
        write: PendingWrite,
    ) -> StoreResult<()> {
        let Some(storage_dir) = self.storage_dir.clone() else {
            write.apply(&mut records);
            return Ok(());
        };

        let task = tokio::spawn(async move {
            let mut next = Records::clone(&records);
            write.apply(&mut next);
            save(&storage_dir, &next).await?;
            *records = next;
            Ok::<_, anyhow::Error>(())
        });

        task.await.context("Config write task failed")??;
        Ok(())
    }
}

async fn save(storage_dir: &Path, records: &Records) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(storage_dir)
        .await
        .context("Failed to create storage directory")?;

    let mut list: Vec<_> = records.values().collect();
    list.sort_by(|a, b| a.id.cmp(&b.id));
    let yaml = serde_yaml::to_string(&list).context("Failed to serialize configs")?;

    // Write then rename so a crash never leaves a truncated file behind
    let tmp_path = storage_dir.join(format!("{RECORDS_FILE}.tmp"));
    tokio::fs::write(&tmp_path, yaml)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, storage_dir.join(RECORDS_FILE))
        .await
        .with_context(|| format!("Failed to replace {RECORDS_FILE}"))?;

    debug!(records = list.len(), "Saved configs to {}", storage_dir.display());
    Ok(())
}

#[async_trait]
impl ConfigRepository for FileConfigRepository {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<ConfigRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn find_all_by_user(&self, user: &str) -> StoreResult<Vec<ConfigRecord>> {
        let records = self.records.read().await;
        let mut owned: Vec<_> = records
            .values()
            .filter(|r| r.user == user)
            .cloned()
            .collect();
        owned.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(owned)
    }

    async fn insert(&self, record: &ConfigRecord) -> StoreResult<()> {
        let records = self.lock().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::already_exists(&record.id));
        }

        self.commit(records, PendingWrite::Put(record.clone())).await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let records = self.lock().await;
        if !records.contains_key(id) {
            return Err(StoreError::not_found(id));
        }

        self.commit(records, PendingWrite::Remove(id.to_string())).await
    }

    async fn modify(&self, id: &str, reconcile: Reconcile<'_>) -> StoreResult<RecordChange> {
        let records = self.lock().await;
        let change = reconcile(records.get(id))?;

        if change.record().id != id {
            return Err(anyhow!(
                "Reconcile for '{}' produced a record with id '{}'",
                id,
                change.record().id
            )
            .into());
        }

        let write = match &change {
            RecordChange::Unchanged(_) => None,
            RecordChange::Insert(record) => {
                if records.contains_key(id) {
                    return Err(StoreError::already_exists(id));
                }
                Some(PendingWrite::Put(record.clone()))
            }
            RecordChange::Replace(record) => {
                if !records.contains_key(id) {
                    return Err(StoreError::not_found(id));
                }
                Some(PendingWrite::Put(record.clone()))
            }
        };

        if let Some(write) = write {
            self.commit(records, write).await?;
        }
        Ok(change)
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.records.read().await.len())
    }

    fn backend_name(&self) -> &'static str {
        if self.storage_dir.is_some() {
            "file"
        } else {
            "memory"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use futures::FutureExt;

    fn record(id: &str, user: &str) -> ConfigRecord {
        ConfigRecord::new(
            id.to_string(),
            user.to_string(),
            format!("{id}-name"),
            format!("{id}-content"),
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let repo = FileConfigRepository::in_memory();
        repo.insert(&record("a", "alice")).await.unwrap();

        let mut other = record("a", "bob");
        other.content = "clobber".to_string();
        let err = repo.insert(&other).await.unwrap_err();

        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        let stored = repo.find_by_id("a").await.unwrap().unwrap();
        assert_eq!(stored.user, "alice");
        assert_eq!(stored.content, "a-content");
    }

    #[tokio::test]
    async fn test_list_orders_by_updated_at_then_id() {
        let repo = FileConfigRepository::in_memory();
        let base = crate::models::now();

        let mut older = record("z-older", "alice");
        older.updated_at = base - Duration::seconds(10);
        let mut tie_b = record("b-tie", "alice");
        tie_b.updated_at = base;
        let mut tie_a = record("a-tie", "alice");
        tie_a.updated_at = base;
        let foreign = record("foreign", "bob");

        for r in [&older, &tie_b, &tie_a, &foreign] {
            repo.insert(r).await.unwrap();
        }

        let ids: Vec<_> = repo
            .find_all_by_user("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a-tie", "b-tie", "z-older"]);
        assert!(repo.find_all_by_user("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let repo = FileConfigRepository::in_memory();
        let err = repo.delete("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_modify_error_leaves_record_intact() {
        let repo = FileConfigRepository::in_memory();
        let original = record("a", "alice");
        repo.insert(&original).await.unwrap();

        let err = repo
            .modify(
                "a",
                Box::new(|_: Option<&ConfigRecord>| {
                    Err(StoreError::Validation { field: "content" })
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Validation { .. }));
        assert_eq!(repo.find_by_id("a").await.unwrap(), Some(original));
    }

    #[tokio::test]
    async fn test_replace_of_absent_record_is_not_found() {
        let repo = FileConfigRepository::in_memory();
        let err = repo
            .modify(
                "ghost",
                Box::new(|_: Option<&ConfigRecord>| {
                    Ok(RecordChange::Replace(record("ghost", "alice")))
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_records_survive_reload() {
        let dir = tempfile::tempdir().unwrap();

        let repo = FileConfigRepository::new(dir.path());
        let kept = record("kept", "alice");
        repo.insert(&kept).await.unwrap();
        repo.insert(&record("dropped", "alice")).await.unwrap();
        repo.delete("dropped").await.unwrap();

        let reloaded = FileConfigRepository::load(dir.path()).unwrap();
        assert_eq!(reloaded.count().await.unwrap(), 1);
        assert_eq!(reloaded.find_by_id("kept").await.unwrap(), Some(kept));
        assert_eq!(reloaded.backend_name(), "file");
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the storage directory should be makes every save fail
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let repo = FileConfigRepository::new(&blocker);
        let err = repo.insert(&record("a", "alice")).await.unwrap_err();

        assert!(!err.is_client_error());
        assert_eq!(repo.find_by_id("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_abandoned_writes_still_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileConfigRepository::new(dir.path());

        // Poll each write once and drop it, as a disconnected client would
        let _ = repo.insert(&record("a", "alice")).now_or_never();
        let mut renamed = record("a", "alice");
        renamed.name = "renamed".to_string();
        let _ = repo
            .modify(
                "a",
                Box::new(move |_: Option<&ConfigRecord>| Ok(RecordChange::Replace(renamed))),
            )
            .now_or_never();

        let in_memory = repo.find_by_id("a").await.unwrap();
        let on_disk = FileConfigRepository::load(dir.path())
            .unwrap()
            .find_by_id("a")
            .await
            .unwrap();

        assert!(in_memory.is_some());
        assert_eq!(in_memory, on_disk);
    }

    #[test]
    fn test_load_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let list = vec![record("same", "alice"), record("same", "bob")];
        std::fs::write(
            dir.path().join(RECORDS_FILE),
            serde_yaml::to_string(&list).unwrap(),
        )
        .unwrap();

        let err = FileConfigRepository::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate config id 'same'"));
    }

    #[test]
    fn test_load_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileConfigRepository::load(dir.path().join("fresh")).unwrap();
        assert_eq!(repo.records.try_read().unwrap().len(), 0);
    }
}
