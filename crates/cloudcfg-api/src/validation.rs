//! Request bodies and their shape checks.
//!
//! Everything here runs before the store is called; the store itself only
//! guards the invariants it cannot live without.

use cloudcfg_store::{ImportMode, ImportRequest};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateConfigRequest {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    #[serde(default)]
    pub content: String,
}

/// Import body; `mode` must be `upsert` or `insert-only` to deserialize at all
#[derive(Debug, Deserialize)]
pub struct ImportConfigRequest {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub content: String,
    pub name: Option<String>,
    pub mode: Option<ImportMode>,
}

impl From<ImportConfigRequest> for ImportRequest {
    fn from(body: ImportConfigRequest) -> Self {
        Self {
            user: body.user,
            content: body.content,
            name: body.name,
            mode: body.mode,
        }
    }
}

fn non_empty(field: &str, value: &str, problems: &mut Vec<String>) {
    if value.is_empty() {
        problems.push(format!("{field} is required"));
    }
}

pub fn validate_create(body: &CreateConfigRequest) -> Vec<String> {
    let mut problems = Vec::new();
    non_empty("user", &body.user, &mut problems);
    non_empty("name", &body.name, &mut problems);
    non_empty("content", &body.content, &mut problems);
    problems
}

pub fn validate_update(body: &UpdateConfigRequest) -> Vec<String> {
    let mut problems = Vec::new();
    non_empty("content", &body.content, &mut problems);
    problems
}

pub fn validate_import(body: &ImportConfigRequest) -> Vec<String> {
    let mut problems = Vec::new();
    non_empty("user", &body.user, &mut problems);
    non_empty("content", &body.content, &mut problems);
    if body.name.as_deref() == Some("") {
        problems.push("name must not be empty when provided".to_string());
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_reports_every_missing_field() {
        let body: CreateConfigRequest = serde_json::from_value(json!({"name": "app"})).unwrap();
        assert_eq!(
            validate_create(&body),
            vec!["user is required", "content is required"]
        );
    }

    #[test]
    fn test_import_rejects_empty_name_but_allows_omission() {
        let omitted: ImportConfigRequest =
            serde_json::from_value(json!({"user": "u", "content": "c"})).unwrap();
        assert!(validate_import(&omitted).is_empty());

        let empty: ImportConfigRequest =
            serde_json::from_value(json!({"user": "u", "content": "c", "name": ""})).unwrap();
        assert_eq!(validate_import(&empty).len(), 1);
    }

    #[test]
    fn test_import_mode_must_be_known() {
        let parsed = serde_json::from_value::<ImportConfigRequest>(
            json!({"user": "u", "content": "c", "mode": "overwrite"}),
        );
        assert!(parsed.is_err());
    }
}
