use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named text configuration blob owned by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRecord {
    /// Globally unique identifier
    pub id: String,

    /// Owner scope; a user may own many records
    pub user: String,

    /// Human label
    pub name: String,

    /// Opaque payload, never interpreted by the store
    pub content: String,

    /// When this record was inserted
    pub created_at: DateTime<Utc>,

    /// When this record was last mutated
    pub updated_at: DateTime<Utc>,
}

impl ConfigRecord {
    pub fn new(id: String, user: String, name: String, content: String) -> Self {
        let now = now();
        Self {
            id,
            user,
            name,
            content,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh `updated_at`, keeping it strictly increasing even when the
    /// clock has not advanced since the previous mutation.
    pub(crate) fn touch(&mut self) {
        let floor = self.updated_at + Duration::microseconds(1);
        self.updated_at = now().max(floor);
    }

    pub fn export(&self) -> ExportedConfig {
        ExportedConfig {
            id: self.id.clone(),
            user: self.user.clone(),
            name: self.name.clone(),
            content: self.content.clone(),
        }
    }
}

/// Current time at the precision every backend can store.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// 128 random bits, URL-safe base64 without padding (22 characters).
pub fn generate_id() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}

/// Transferable projection of a record, without timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedConfig {
    pub id: String,
    pub user: String,
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportMode {
    /// Create when absent, overwrite when present
    #[default]
    Upsert,
    /// Create when absent, leave an existing record untouched
    InsertOnly,
}

/// Payload of a single-record import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub user: String,

    pub content: String,

    /// Required when the record does not exist yet; renames it otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Defaults to `upsert`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ImportMode>,
}

impl From<ExportedConfig> for ImportRequest {
    fn from(exported: ExportedConfig) -> Self {
        Self {
            user: exported.user,
            content: exported.content,
            name: Some(exported.name),
            mode: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportAction {
    Created,
    Updated,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub id: String,
    pub user: String,
    pub action: ImportAction,
}
