use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::endpoints::auto_undeployed;
use crate::error::{AppError, Result};
use crate::middleware::{JsonBody, UserSession};
use crate::schemas::{LatestRunQuery, LatestRunResponse, MessageResponse, WorkflowDispatchRequest};
use crate::services::ci::{self, WorkflowRun};
use crate::services::deployment;
use crate::services::undeploy::{self, Freshness};
use crate::state::AppState;

pub fn git_routes(state: AppState) -> Router {
    Router::new()
        .route("/latest-user-run", get(latest_user_run))
        .route("/workflow-dispatch", post(workflow_dispatch))
        .route("/runs", get(list_runs))
        .with_state(state)
}

/// Newest run carrying a job for the given logical username
async fn latest_user_run(
    State(state): State<AppState>,
    session: UserSession,
    Query(query): Query<LatestRunQuery>,
) -> Result<Response> {
    let needle = query
        .logical_username
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("logicalUsername is required".to_string()))?;

    let status = match undeploy::check_ttl(&state, &session.user).await? {
        Freshness::Fresh(status) => status,
        Freshness::AutoUndeployed(result) => return Ok(auto_undeployed(result)),
    };

    let found = ci::find_latest_run_for_job(state.ci.as_ref(), needle)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No run found for {}", needle)))?;

    if status.deploy_timestamp.is_some() && status.active_run_id.is_none() && !found.run.is_completed() {
        if deployment::record_run_id(&state.db, session.user_id(), found.run.id).await? {
            tracing::info!(user_id = session.user_id(), run_id = found.run.id, "Attached run to deployment");
        }
    }

    Ok(Json(LatestRunResponse::from(found)).into_response())
}

async fn workflow_dispatch(
    State(state): State<AppState>,
    session: UserSession,
    JsonBody(request): JsonBody<WorkflowDispatchRequest>,
) -> Result<Json<MessageResponse>> {
    let username = request.username.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("username is required".to_string()));
    }

    state
        .ci
        .dispatch(serde_json::json!({ "username": username }))
        .await?;

    tracing::info!(user_id = session.user_id(), target = %username, "Workflow dispatch requested");
    Ok(Json(MessageResponse::new("Workflow dispatched")))
}

async fn list_runs(State(state): State<AppState>, _session: UserSession) -> Result<Json<Vec<WorkflowRun>>> {
    Ok(Json(state.ci.list_runs().await?))
}
