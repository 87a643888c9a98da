use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::deployment::DeploymentStatus;
use crate::services::undeploy::UndeployResult;

#[derive(Debug, Clone, Deserialize)]
pub struct UserSignInRequest {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminSignInRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSignInResponse {
    pub user_id: i64,
    pub username: String,
    pub deployment: DeploymentStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSignInResponse {
    pub admin_id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionValidResponse {
    pub valid: bool,
    pub user_id: i64,
    pub username: String,
    pub deployment: DeploymentStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSessionValidResponse {
    pub valid: bool,
    pub admin_id: i64,
    pub username: String,
}

/// 409 body sent when a stale deployment was torn down instead of serving the request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoUndeployedResponse {
    pub message: String,
    pub auto_undeployed: bool,
    pub undeploy: UndeployResult,
}

impl AutoUndeployedResponse {
    pub fn new(undeploy: UndeployResult) -> Self {
        Self {
            message: "Deployment expired and was undeployed".to_string(),
            auto_undeployed: true,
            undeploy,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SignOutResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undeploy: Option<UndeployResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoResponse {
    pub session_id: String,
    pub user_id: i64,
    pub username: String,
    pub last_login: Option<DateTime<Utc>>,
    pub last_logout: Option<DateTime<Utc>>,
    pub deployment: DeploymentStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUndeployRequest {
    pub user_id: i64,
}
