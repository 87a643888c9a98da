//! Undeploy orchestration
//!
//! Stops the tunnel slot and cancels the CI run concurrently, then clears the
//! deployment fields no matter how either remote call went.

use serde::Serialize;

use crate::error::Result;
use crate::models::user;
use crate::services::deployment::{self, DeploymentStatus};
use crate::services::tunnel::TunnelAction;
use crate::state::AppState;

/// Outcome of one best-effort remote step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success(String),
    Failed(String),
    /// Nothing to do for this step
    Skipped(String),
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, StepOutcome::Failed(_))
    }

    fn message(&self) -> &str {
        match self {
            StepOutcome::Success(m) | StepOutcome::Failed(m) | StepOutcome::Skipped(m) => m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndeployResult {
    pub success: bool,
    pub message: String,
}

impl UndeployResult {
    fn from_steps(tunnel: &StepOutcome, ci: &StepOutcome) -> Self {
        Self {
            success: tunnel.succeeded() && ci.succeeded(),
            message: format!("{}; {}", tunnel.message(), ci.message()),
        }
    }

    pub fn nothing_to_undeploy() -> Self {
        Self {
            success: true,
            message: "No active deployment".to_string(),
        }
    }
}

/// Whose deployment to tear down
#[derive(Debug, Clone)]
pub struct UndeployTarget {
    pub user_id: i64,
    pub username: String,
    pub status: DeploymentStatus,
}

impl From<&user::Model> for UndeployTarget {
    fn from(user: &user::Model) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            status: DeploymentStatus::from_user(user),
        }
    }
}

async fn stop_tunnel(state: &AppState, target: &UndeployTarget) -> StepOutcome {
    let Some(slot) = target.status.active_form_number else {
        return StepOutcome::Skipped("No active form".to_string());
    };

    match state
        .tunnel
        .send(&target.username, TunnelAction::Stop, slot, None)
        .await
    {
        Ok(_) => StepOutcome::Success(format!("Stopped form {}", slot)),
        Err(e) => {
            tracing::warn!(user_id = target.user_id, slot, error = %e, "Tunnel stop failed during undeploy");
            StepOutcome::Failed(format!("Failed to stop form {}: {}", slot, e))
        }
    }
}

async fn cancel_run(state: &AppState, target: &UndeployTarget) -> StepOutcome {
    let Some(run_id) = target.status.active_run_id else {
        return StepOutcome::Skipped("No active run".to_string());
    };

    match state.ci.cancel(run_id).await {
        Ok(()) => StepOutcome::Success(format!("Cancelled run {}", run_id)),
        Err(e) => {
            tracing::warn!(user_id = target.user_id, run_id, error = %e, "Run cancel failed during undeploy");
            StepOutcome::Failed(format!("Failed to cancel run {}: {}", run_id, e))
        }
    }
}

/// Tear down a deployment.
///
/// Only a failure to clear the local fields is returned as an error; remote
/// failures are reported through `UndeployResult::success`.
pub async fn undeploy(state: &AppState, target: &UndeployTarget) -> Result<UndeployResult> {
    let (tunnel, ci) = tokio::join!(stop_tunnel(state, target), cancel_run(state, target));

    deployment::clear(&state.db, target.user_id, state.now()).await?;

    let result = UndeployResult::from_steps(&tunnel, &ci);
    if result.success {
        tracing::info!(user_id = target.user_id, message = %result.message, "Undeployed");
    } else {
        tracing::warn!(user_id = target.user_id, message = %result.message, "Undeployed with remote failures");
    }
    Ok(result)
}

/// Deployment state as seen by a request after the TTL check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh(DeploymentStatus),
    /// The deployment outlived its TTL and has just been torn down
    AutoUndeployed(UndeployResult),
}

/// Apply the deployment TTL, undeploying a stale deployment
pub async fn check_ttl(state: &AppState, user: &user::Model) -> Result<Freshness> {
    let status = DeploymentStatus::from_user(user);
    if !status.is_expired(state.now()) {
        return Ok(Freshness::Fresh(status));
    }

    tracing::info!(user_id = user.id, deployed_at = ?status.deploy_timestamp, "Deployment exceeded TTL");
    let result = undeploy(state, &UndeployTarget::from(user)).await?;
    Ok(Freshness::AutoUndeployed(result))
}
