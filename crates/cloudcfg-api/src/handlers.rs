use axum::{extract::State, response::IntoResponse};
use cloudcfg_store::ConfigStore;
use serde::Serialize;
use std::time::Instant;

use crate::ApiResponse;

pub mod configs;

#[derive(Clone)]
pub struct AppState {
    pub store: ConfigStore,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store,
            started_at: Instant::now(),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub storage: String,
}

#[derive(Serialize)]
pub struct EndpointsInfo {
    pub configs: String,
}

#[derive(Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub endpoints: EndpointsInfo,
}

pub async fn service_info() -> impl IntoResponse {
    let info = ServiceInfo {
        name: "Cloud Configuration System API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: EndpointsInfo {
            configs: "/api/configs".to_string(),
        },
    };

    ApiResponse::success(info, "Cloud Configuration System API")
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        storage: state.store.backend_name().to_string(),
    };

    ApiResponse::success(response, "System is healthy")
}
