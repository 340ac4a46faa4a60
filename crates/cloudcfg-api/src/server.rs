use crate::handlers::{configs, health_check, service_info, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the full router; shared by the server and in-process tests.
pub fn create_router(state: AppState, cors_enabled: bool) -> Router {
    let mut app = Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        // Config management
        .route(
            "/api/configs",
            get(configs::list_configs).post(configs::create_config),
        )
        .route(
            "/api/configs/{id}",
            get(configs::get_config)
                .put(configs::update_config)
                .delete(configs::delete_config),
        )
        // Synchronization between deployments
        .route("/api/configs/{id}/export", get(configs::export_config))
        .route("/api/configs/{id}/import", post(configs::import_config))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        app = app.layer(cors);
    }

    app
}

pub struct ApiServer {
    host: String,
    port: u16,
    cors_enabled: bool,
    state: AppState,
}

impl ApiServer {
    pub fn new(host: String, port: u16, cors_enabled: bool, state: AppState) -> Self {
        Self {
            host,
            port,
            cors_enabled,
            state,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let app = create_router(self.state, self.cors_enabled);

        let addr = format!("{}:{}", self.host, self.port);
        info!("Starting API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
