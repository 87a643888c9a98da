//! Cookie-session extractors
//!
//! Handlers that take `UserSession` or `AdminSession` only run for requests
//! whose session cookies match the stored pair. Everything else gets 401.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::models::{admin, user};
use crate::services::session::{self, SessionToken, ADMIN_COOKIES, USER_COOKIES};
use crate::state::AppState;

/// A validated user session
#[derive(Debug, Clone)]
pub struct UserSession {
    pub user: user::Model,
    pub creds: SessionToken,
}

impl UserSession {
    pub fn user_id(&self) -> i64 {
        self.user.id
    }
}

/// A validated admin session
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub admin: admin::Model,
    pub creds: SessionToken,
}

fn unauthorized() -> AppError {
    AppError::Unauthorized("Unauthorized".to_string())
}

impl FromRequestParts<AppState> for UserSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let creds = SessionToken::from_headers(&parts.headers, &USER_COOKIES).ok_or_else(unauthorized)?;
        let user = session::validate_user(&state.db, &creds)
            .await
            .ok_or_else(unauthorized)?;
        Ok(UserSession { user, creds })
    }
}

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let creds = SessionToken::from_headers(&parts.headers, &ADMIN_COOKIES).ok_or_else(unauthorized)?;
        let admin = session::validate_admin(&state.db, &creds)
            .await
            .ok_or_else(unauthorized)?;
        Ok(AdminSession { admin, creds })
    }
}
