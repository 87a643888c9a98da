use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::endpoints::auto_undeployed;
use crate::error::{AppError, Result};
use crate::middleware::{JsonBody, UserSession};
use crate::schemas::{DeployActionRequest, MAX_FORM_DATA_BYTES};
use crate::services::deployment;
use crate::services::tunnel::TunnelAction;
use crate::services::undeploy::{self, Freshness};
use crate::state::AppState;

pub fn deploy_routes(state: AppState) -> Router {
    Router::new()
        .route("/action", post(deploy_action))
        .route("/status", get(deploy_status))
        .with_state(state)
}

async fn deploy_status(State(state): State<AppState>, session: UserSession) -> Result<Response> {
    Ok(match undeploy::check_ttl(&state, &session.user).await? {
        Freshness::Fresh(status) => Json(status).into_response(),
        Freshness::AutoUndeployed(result) => auto_undeployed(result),
    })
}

/// Forward a start/stop/update to the user's tunnel and track the outcome
async fn deploy_action(
    State(state): State<AppState>,
    session: UserSession,
    JsonBody(request): JsonBody<DeployActionRequest>,
) -> Result<Response> {
    let slot = deployment::validate_form_number(request.form_number)?;

    if let Some(data) = &request.form_data {
        let size = serde_json::to_vec(data)?.len();
        if size > MAX_FORM_DATA_BYTES {
            return Err(AppError::PayloadTooLarge(format!(
                "formData is {} bytes, limit is {}",
                size, MAX_FORM_DATA_BYTES
            )));
        }
    }

    let current = match undeploy::check_ttl(&state, &session.user).await? {
        Freshness::Fresh(status) => status,
        Freshness::AutoUndeployed(result) => return Ok(auto_undeployed(result)),
    };

    let user = &session.user;
    if request.action == TunnelAction::Start {
        if let Some(active) = current.active_form_number.filter(|active| *active != slot) {
            tracing::warn!(
                user_id = user.id,
                active_slot = active,
                new_slot = slot,
                "Start replaces bookkeeping of a still-active slot"
            );
        }
    }

    let empty = serde_json::json!({});
    let payload = match request.action {
        TunnelAction::Stop => None,
        TunnelAction::Start | TunnelAction::Update => {
            Some(request.form_data.as_ref().unwrap_or(&empty))
        }
    };

    let upstream = state
        .tunnel
        .send(&user.username, request.action, slot, payload)
        .await?;

    match request.action {
        TunnelAction::Start => {
            deployment::record_start(&state.db, user.id, slot, state.now()).await?;
            tracing::info!(user_id = user.id, slot, "Deployment started");
        }
        TunnelAction::Stop => {
            if deployment::record_stop(&state.db, user.id, slot, state.now()).await? {
                tracing::info!(user_id = user.id, slot, "Deployment stopped");
            } else {
                tracing::debug!(user_id = user.id, slot, "Stop for a slot that is not active");
            }
        }
        TunnelAction::Update => {}
    }

    Ok(Json(upstream).into_response())
}
