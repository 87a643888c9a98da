use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::token::{TokenDuration, TokenStatus};
use crate::models::{token, user};
use crate::services::deployment::DeploymentStatus;

#[derive(Debug, Clone, Deserialize)]
pub struct IssueTokenRequest {
    pub duration: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewTokenRequest {
    pub user_id: i64,
    pub duration: String,
}

/// `?tokenId=`; kept as a string so a malformed id is a 400 of our own
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenIdQuery {
    pub token_id: Option<String>,
}

impl TokenIdQuery {
    pub fn parse(&self) -> Option<i64> {
        self.token_id.as_deref()?.trim().parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenHistoryQuery {
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub id: i64,
    pub token: String,
    pub status: TokenStatus,
    pub duration: TokenDuration,
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<token::Model> for TokenResponse {
    fn from(t: token::Model) -> Self {
        Self {
            id: t.id,
            token: t.token,
            status: t.status,
            duration: t.duration,
            user_id: t.user_id,
            created_at: t.created_at,
            expires_at: t.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenHistoryEntry {
    #[serde(flatten)]
    pub token: TokenResponse,
    pub username: Option<String>,
    pub expired: bool,
}

impl TokenHistoryEntry {
    pub fn new(token: token::Model, owner: Option<user::Model>, now: DateTime<Utc>) -> Self {
        Self {
            expired: token.is_expired(now),
            username: owner.map(|u| u.username),
            token: token.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenOwnerDetails {
    pub id: i64,
    pub username: String,
    pub token_removed: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub last_logout: Option<DateTime<Utc>>,
    pub deployment: DeploymentStatus,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for TokenOwnerDetails {
    fn from(u: user::Model) -> Self {
        Self {
            deployment: DeploymentStatus::from_user(&u),
            id: u.id,
            username: u.username,
            token_removed: u.token_removed,
            last_login: u.last_login,
            last_logout: u.last_logout,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenUserDetailsResponse {
    pub token: TokenResponse,
    pub user: Option<TokenOwnerDetails>,
}
