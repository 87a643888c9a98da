pub mod admin;
pub mod auth;
pub mod deploy;
pub mod git;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use crate::config::CONFIG;
use crate::schemas::AutoUndeployedResponse;
use crate::services::undeploy::UndeployResult;
use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/system/version", get(get_version))
        .nest("/auth", auth::auth_routes(state.clone()))
        .nest("/admin", admin::admin_routes(state.clone()))
        .nest("/deploy", deploy::deploy_routes(state.clone()))
        .nest("/git", git::git_routes(state))
}

/// 409 sent instead of serving a request whose deployment just expired
pub(crate) fn auto_undeployed(result: UndeployResult) -> Response {
    (StatusCode::CONFLICT, Json(AutoUndeployedResponse::new(result))).into_response()
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Version info endpoint
async fn get_version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": CONFIG.version,
        "commit_hash": CONFIG.commit_hash,
        "build_time": CONFIG.build_time,
    }))
}
