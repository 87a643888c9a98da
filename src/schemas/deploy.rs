use serde::{Deserialize, Serialize};

use crate::services::ci::RunMatch;
use crate::services::tunnel::TunnelAction;

/// Largest accepted `formData`, measured as serialized JSON
pub const MAX_FORM_DATA_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployActionRequest {
    pub action: TunnelAction,
    pub form_number: i32,
    #[serde(default)]
    pub form_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestRunQuery {
    pub logical_username: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestRunResponse {
    pub run_id: i64,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub html_url: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub job_name: String,
}

impl From<RunMatch> for LatestRunResponse {
    fn from(m: RunMatch) -> Self {
        Self {
            run_id: m.run.id,
            status: m.run.status,
            conclusion: m.run.conclusion,
            html_url: m.run.html_url,
            created_at: m.run.created_at,
            job_name: m.job_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowDispatchRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
