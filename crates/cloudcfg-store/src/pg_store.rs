use crate::backend::{ConfigRepository, Reconcile, RecordChange};
use crate::error::{StoreError, StoreResult};
use crate::models::ConfigRecord;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_COLUMNS: &str =
    r#"SELECT id, "user", name, content, "createdAt", "updatedAt" FROM "Config""#;

/// PostgreSQL-backed config records
///
/// Dropping any returned future aborts the in-flight query; an open
/// transaction is rolled back when it is dropped.
pub struct PgConfigRepository {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgConfigRepository {
    /// Create a new PostgreSQL config store
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Bound every backend call by `query_timeout`
    pub fn with_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        debug!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS "Config" (
                id TEXT PRIMARY KEY,
                "user" TEXT NOT NULL,
                name TEXT NOT NULL,
                content TEXT NOT NULL,
                "createdAt" TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                "updatedAt" TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT config_timestamps_ordered CHECK ("createdAt" <= "updatedAt")
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create Config table")?;

        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS config_user_updated_at_idx
               ON "Config" ("user", "updatedAt" DESC, id)"#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create Config user index")?;

        Ok(())
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        future: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.query_timeout, future).await {
            Ok(result) => result,
            Err(_elapsed) => Err(anyhow!(
                "{} timed out after {}ms",
                operation,
                self.query_timeout.as_millis()
            )
            .into()),
        }
    }
}

fn row_to_record(r: &PgRow) -> ConfigRecord {
    ConfigRecord {
        id: r.get("id"),
        user: r.get("user"),
        name: r.get("name"),
        content: r.get("content"),
        created_at: r.get("createdAt"),
        updated_at: r.get("updatedAt"),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl ConfigRepository for PgConfigRepository {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<ConfigRecord>> {
        self.bounded("find_by_id", async {
            let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to get config")?;

            Ok(row.as_ref().map(row_to_record))
        })
        .await
    }

    async fn find_all_by_user(&self, user: &str) -> StoreResult<Vec<ConfigRecord>> {
        self.bounded("find_all_by_user", async {
            let rows = sqlx::query(&format!(
                r#"{SELECT_COLUMNS} WHERE "user" = $1 ORDER BY "updatedAt" DESC, id ASC"#
            ))
            .bind(user)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list configs")?;

            Ok(rows.iter().map(row_to_record).collect())
        })
        .await
    }

    async fn insert(&self, record: &ConfigRecord) -> StoreResult<()> {
        self.bounded("insert", async {
            sqlx::query(
                r#"INSERT INTO "Config" (id, "user", name, content, "createdAt", "updatedAt")
                   VALUES ($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(&record.id)
            .bind(&record.user)
            .bind(&record.name)
            .bind(&record.content)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::already_exists(&record.id)
                } else {
                    anyhow::Error::new(e).context("Failed to insert config").into()
                }
            })?;

            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.bounded("delete", async {
            let result = sqlx::query(r#"DELETE FROM "Config" WHERE id = $1"#)
                .bind(id)
                .execute(&self.pool)
                .await
                .context("Failed to delete config")?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(id));
            }

            Ok(())
        })
        .await
    }

    async fn modify(&self, id: &str, reconcile: Reconcile<'_>) -> StoreResult<RecordChange> {
        self.bounded("modify", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .context("Failed to begin transaction")?;

            // Row locks cannot cover an id that does not exist yet, so
            // serialize on the id itself first.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to lock config id")?;

            let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1 FOR UPDATE"))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to get config")?;
            let existing = row.as_ref().map(row_to_record);

            // An error here drops `tx`, which rolls back
            let change = reconcile(existing.as_ref())?;
            if change.record().id != id {
                return Err(anyhow!(
                    "Reconcile for '{}' produced a record with id '{}'",
                    id,
                    change.record().id
                )
                .into());
            }

            let write = match &change {
                RecordChange::Unchanged(_) => false,
                RecordChange::Insert(record) => {
                    sqlx::query(
                        r#"INSERT INTO "Config" (id, "user", name, content, "createdAt", "updatedAt")
                           VALUES ($1, $2, $3, $4, $5, $6)"#,
                    )
                    .bind(&record.id)
                    .bind(&record.user)
                    .bind(&record.name)
                    .bind(&record.content)
                    .bind(record.created_at)
                    .bind(record.updated_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        if is_unique_violation(&e) {
                            StoreError::already_exists(id)
                        } else {
                            anyhow::Error::new(e).context("Failed to insert config").into()
                        }
                    })?;
                    true
                }
                RecordChange::Replace(record) => {
                    let result = sqlx::query(
                        r#"UPDATE "Config"
                           SET "user" = $2, name = $3, content = $4, "updatedAt" = $5
                           WHERE id = $1"#,
                    )
                    .bind(id)
                    .bind(&record.user)
                    .bind(&record.name)
                    .bind(&record.content)
                    .bind(record.updated_at)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to update config")?;

                    if result.rows_affected() == 0 {
                        return Err(StoreError::not_found(id));
                    }
                    true
                }
            };

            if write {
                tx.commit()
                    .await
                    .context("Failed to commit transaction")?;
            } else {
                tx.rollback()
                    .await
                    .context("Failed to release transaction")?;
            }

            Ok(change)
        })
        .await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.bounded("count", async {
            let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "Config""#)
                .fetch_one(&self.pool)
                .await
                .context("Failed to count configs")?;

            Ok(count as usize)
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out_as_backend_error() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/unused")
            .unwrap();
        let repo = PgConfigRepository::from_pool(pool).with_timeout(Duration::from_millis(10));

        let err = repo
            .bounded("sleep", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(!err.is_client_error());
        assert!(err.to_string().contains("sleep timed out after 10ms"));
    }
}
