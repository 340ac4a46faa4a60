use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use cloudcfg_store::{ConfigRecord, ExportedConfig, ImportOutcome, StoreError};
use serde::Serialize;
use tracing::error;

use crate::validation::{
    validate_create, validate_import, validate_update, CreateConfigRequest,
    ImportConfigRequest, ListQuery, UpdateConfigRequest,
};
use crate::{handlers::AppState, ApiResponse};

/// Map a store failure onto the response envelope.
///
/// Backend details are logged, never returned to the client.
fn store_failure<T: Serialize>(err: StoreError, action: &str) -> ApiResponse<T> {
    match err {
        StoreError::Validation { field } => {
            ApiResponse::error("BAD_REQUEST", "Invalid request", vec![format!("{field} is required")])
        }
        StoreError::MissingField { .. } => ApiResponse::bad_request(err.to_string()),
        StoreError::NotFound { .. } => ApiResponse::not_found("Config"),
        StoreError::AlreadyExists { .. } => ApiResponse::conflict(err.to_string()),
        StoreError::Backend(e) => {
            error!("Failed to {}: {:#}", action, e);
            ApiResponse::internal_error(format!("Failed to {}", action))
        }
    }
}

fn malformed_body<T: Serialize>(rejection: JsonRejection) -> ApiResponse<T> {
    ApiResponse::error(
        "BAD_REQUEST",
        "Malformed request body",
        vec![rejection.body_text()],
    )
}

pub async fn list_configs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResponse<Vec<ConfigRecord>> {
    let Some(user) = query.user.filter(|u| !u.is_empty()) else {
        return ApiResponse::bad_request("User parameter is required");
    };

    match state.store.list(&user).await {
        Ok(configs) => ApiResponse::success(configs, "Configs retrieved successfully"),
        Err(e) => store_failure(e, "fetch configs"),
    }
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse<ConfigRecord> {
    match state.store.get(&id).await {
        Ok(Some(config)) => ApiResponse::success(config, "Config retrieved successfully"),
        Ok(None) => ApiResponse::not_found("Config"),
        Err(e) => store_failure(e, "fetch config"),
    }
}

pub async fn create_config(
    State(state): State<AppState>,
    payload: Result<Json<CreateConfigRequest>, JsonRejection>,
) -> ApiResponse<ConfigRecord> {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return malformed_body(rejection),
    };

    let problems = validate_create(&body);
    if !problems.is_empty() {
        return ApiResponse::error(
            "BAD_REQUEST",
            "Missing required fields: user, name, content",
            problems,
        );
    }

    match state.store.create(&body.user, &body.name, &body.content).await {
        Ok(config) => ApiResponse::created(config, "Config created successfully"),
        Err(e) => store_failure(e, "create config"),
    }
}

pub async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateConfigRequest>, JsonRejection>,
) -> ApiResponse<ConfigRecord> {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return malformed_body(rejection),
    };

    let problems = validate_update(&body);
    if !problems.is_empty() {
        return ApiResponse::error("BAD_REQUEST", "Content field is required", problems);
    }

    match state.store.update(&id, &body.content).await {
        Ok(config) => ApiResponse::success(config, "Config updated successfully"),
        Err(e) => store_failure(e, "update config"),
    }
}

pub async fn delete_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse<()> {
    match state.store.delete(&id).await {
        Ok(()) => ApiResponse::<()>::success_no_data("Config successfully deleted"),
        Err(e) => store_failure(e, "delete config"),
    }
}

pub async fn export_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse<ExportedConfig> {
    match state.store.export_single(&id).await {
        Ok(Some(exported)) => ApiResponse::success(exported, "Config exported successfully"),
        Ok(None) => ApiResponse::not_found("Config"),
        Err(e) => store_failure(e, "export config"),
    }
}

pub async fn import_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ImportConfigRequest>, JsonRejection>,
) -> ApiResponse<ImportOutcome> {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return malformed_body(rejection),
    };

    let problems = validate_import(&body);
    if !problems.is_empty() {
        return ApiResponse::error("BAD_REQUEST", "Invalid import payload", problems);
    }

    match state.store.import_single(&id, body.into()).await {
        Ok(outcome) => ApiResponse::success(outcome, "Config imported successfully"),
        Err(e) => store_failure(e, "import config"),
    }
}
