//! Session lifecycle for users and admins
//!
//! Each principal row holds exactly one `(session_token, session_id)` pair.
//! A session is valid only while both presented values equal the stored
//! ones. Creating a session replaces the pair and invalidating nulls it;
//! either way the pair changes in a single `UPDATE`.
//!
//! Concurrent sign-ins for one principal race on that pair and the last
//! write wins.

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::{admin, user};
use crate::services::security::{generate_session_id, generate_session_token};
use crate::state::DbConn;

/// Cookie names used by one principal kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieNames {
    pub token: &'static str,
    pub session_id: &'static str,
    pub principal_id: &'static str,
    pub username: &'static str,
}

impl CookieNames {
    fn all(&self) -> [&'static str; 4] {
        [self.token, self.session_id, self.principal_id, self.username]
    }
}

pub const USER_COOKIES: CookieNames = CookieNames {
    token: "sessionToken",
    session_id: "sessionId",
    principal_id: "userId",
    username: "username",
};

pub const ADMIN_COOKIES: CookieNames = CookieNames {
    token: "adminSessionToken",
    session_id: "adminSessionId",
    principal_id: "adminId",
    username: "adminUsername",
};

/// Which table a session lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    Admin,
}

impl PrincipalKind {
    pub fn cookie_names(&self) -> &'static CookieNames {
        match self {
            PrincipalKind::User => &USER_COOKIES,
            PrincipalKind::Admin => &ADMIN_COOKIES,
        }
    }
}

/// Session credentials presented by a client, parsed once per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub principal_id: i64,
    pub token: String,
    pub session_id: String,
    pub username: Option<String>,
}

impl SessionToken {
    /// Parse the `Cookie` header. `None` unless id, token and session id are all present.
    pub fn from_headers(headers: &HeaderMap, names: &CookieNames) -> Option<Self> {
        let mut principal_id = None;
        let mut token = None;
        let mut session_id = None;
        let mut username = None;

        for value in headers.get_all(header::COOKIE) {
            let Ok(cookie_str) = value.to_str() else {
                continue;
            };
            for cookie in cookie_str.split(';') {
                let Some((name, value)) = cookie.trim().split_once('=') else {
                    continue;
                };
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                if name == names.principal_id {
                    principal_id = value.parse::<i64>().ok();
                } else if name == names.token {
                    token = Some(value.to_string());
                } else if name == names.session_id {
                    session_id = Some(value.to_string());
                } else if name == names.username {
                    username = urlencoding::decode(value).ok().map(|v| v.into_owned());
                }
            }
        }

        Some(Self {
            principal_id: principal_id?,
            token: token?,
            session_id: session_id?,
            username,
        })
    }

    fn matches(&self, stored_token: Option<&str>, stored_session_id: Option<&str>) -> bool {
        stored_token == Some(self.token.as_str())
            && stored_session_id == Some(self.session_id.as_str())
    }
}

/// Freshly written session credentials, ready to be set as cookies
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub principal_id: i64,
    pub username: String,
    pub token: String,
    pub session_id: String,
}

impl IssuedSession {
    fn generate(principal_id: i64, username: &str) -> Self {
        Self {
            principal_id,
            username: username.to_string(),
            token: generate_session_token(),
            session_id: generate_session_id(),
        }
    }
}

// ============================================================================
// Cookies
// ============================================================================

fn cookie_attributes(secure: bool) -> &'static str {
    if secure {
        "; HttpOnly; SameSite=Lax; Path=/; Secure"
    } else {
        "; HttpOnly; SameSite=Lax; Path=/"
    }
}

fn cookie_header(name: &str, value: &str, suffix: &str) -> HeaderValue {
    let cookie = format!("{}={}{}", name, value, suffix);
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// `Set-Cookie` headers for the four session cookies
pub fn session_cookie_headers(names: &CookieNames, issued: &IssuedSession, secure: bool) -> HeaderMap {
    let attrs = cookie_attributes(secure);
    let username = urlencoding::encode(&issued.username);
    let principal_id = issued.principal_id.to_string();

    let mut headers = HeaderMap::new();
    for (name, value) in [
        (names.token, issued.token.as_str()),
        (names.session_id, issued.session_id.as_str()),
        (names.principal_id, principal_id.as_str()),
        (names.username, &*username),
    ] {
        headers.append(header::SET_COOKIE, cookie_header(name, value, attrs));
    }
    headers
}

/// `Set-Cookie` headers that expire all four session cookies immediately
pub fn clear_cookie_headers(names: &CookieNames, secure: bool) -> HeaderMap {
    let suffix = format!(
        "; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT{}",
        cookie_attributes(secure)
    );

    let mut headers = HeaderMap::new();
    for name in names.all() {
        headers.append(header::SET_COOKIE, cookie_header(name, "", &suffix));
    }
    headers
}

// ============================================================================
// Validation
// ============================================================================

/// Resolve presented credentials to the stored user.
///
/// Store failures are logged and reported as an invalid session.
pub async fn validate_user(db: &DbConn, creds: &SessionToken) -> Option<user::Model> {
    let found = match User::find_by_id(creds.principal_id).one(db).await {
        Ok(found) => found,
        Err(e) => {
            tracing::error!(user_id = creds.principal_id, error = %e, "Session lookup failed");
            return None;
        }
    };

    let found = found?;
    if creds.matches(found.session_token.as_deref(), found.session_id.as_deref()) {
        Some(found)
    } else {
        tracing::debug!(user_id = found.id, "Session credentials do not match");
        None
    }
}

/// Resolve presented credentials to the stored admin
pub async fn validate_admin(db: &DbConn, creds: &SessionToken) -> Option<admin::Model> {
    let found = match Admin::find_by_id(creds.principal_id).one(db).await {
        Ok(found) => found,
        Err(e) => {
            tracing::error!(admin_id = creds.principal_id, error = %e, "Admin session lookup failed");
            return None;
        }
    };

    let found = found?;
    if creds.matches(found.session_token.as_deref(), found.session_id.as_deref()) {
        Some(found)
    } else {
        tracing::debug!(admin_id = found.id, "Admin session credentials do not match");
        None
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Write a new session pair for a principal, replacing any previous one
pub async fn create(
    db: &DbConn,
    kind: PrincipalKind,
    principal_id: i64,
    username: &str,
    now: DateTime<Utc>,
) -> Result<IssuedSession> {
    let issued = IssuedSession::generate(principal_id, username);
    let rows = write_pair(db, kind, principal_id, Some(&issued), now, None).await?;
    if rows == 0 {
        return Err(AppError::NotFound("Account not found".to_string()));
    }

    tracing::info!(principal_id, kind = ?kind, "Session created");
    Ok(issued)
}

/// Replace the session pair of a currently valid session, keeping identity.
///
/// The update is conditional on the presented pair still being the stored one.
pub async fn rotate(
    db: &DbConn,
    kind: PrincipalKind,
    creds: &SessionToken,
    username: &str,
    now: DateTime<Utc>,
) -> Result<IssuedSession> {
    let issued = IssuedSession::generate(creds.principal_id, username);
    let rows = write_pair(db, kind, creds.principal_id, Some(&issued), now, Some(creds)).await?;
    if rows == 0 {
        return Err(AppError::Unauthorized("Invalid session".to_string()));
    }

    tracing::info!(principal_id = creds.principal_id, kind = ?kind, "Session rotated");
    Ok(issued)
}

/// Null the session pair and record the logout time
pub async fn invalidate(
    db: &DbConn,
    kind: PrincipalKind,
    principal_id: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    write_pair(db, kind, principal_id, None, now, None).await?;
    tracing::info!(principal_id, kind = ?kind, "Session invalidated");
    Ok(())
}

/// Single-statement write of the session pair.
///
/// `Some(issued)` stores a new pair and stamps `last_login`; `None` clears the
/// pair and stamps `last_logout`. With `guard`, only rows still holding the
/// guarded pair are touched.
async fn write_pair(
    db: &DbConn,
    kind: PrincipalKind,
    principal_id: i64,
    issued: Option<&IssuedSession>,
    now: DateTime<Utc>,
    guard: Option<&SessionToken>,
) -> Result<u64> {
    let token = issued.map(|s| s.token.clone());
    let session_id = issued.map(|s| s.session_id.clone());

    let rows = match kind {
        PrincipalKind::User => {
            let mut update = User::update_many()
                .col_expr(user::Column::SessionToken, Expr::value(token))
                .col_expr(user::Column::SessionId, Expr::value(session_id))
                .col_expr(user::Column::UpdatedAt, Expr::value(now));
            update = if issued.is_some() {
                update.col_expr(user::Column::LastLogin, Expr::value(now))
            } else {
                update.col_expr(user::Column::LastLogout, Expr::value(now))
            };
            let mut update = update.filter(user::Column::Id.eq(principal_id));
            if let Some(guard) = guard {
                update = update
                    .filter(user::Column::SessionToken.eq(guard.token.as_str()))
                    .filter(user::Column::SessionId.eq(guard.session_id.as_str()));
            }
            update.exec(db).await?.rows_affected
        }
        PrincipalKind::Admin => {
            let mut update = Admin::update_many()
                .col_expr(admin::Column::SessionToken, Expr::value(token))
                .col_expr(admin::Column::SessionId, Expr::value(session_id))
                .col_expr(admin::Column::UpdatedAt, Expr::value(now));
            update = if issued.is_some() {
                update.col_expr(admin::Column::LastLogin, Expr::value(now))
            } else {
                update.col_expr(admin::Column::LastLogout, Expr::value(now))
            };
            let mut update = update.filter(admin::Column::Id.eq(principal_id));
            if let Some(guard) = guard {
                update = update
                    .filter(admin::Column::SessionToken.eq(guard.token.as_str()))
                    .filter(admin::Column::SessionId.eq(guard.session_id.as_str()));
            }
            update.exec(db).await?.rows_affected
        }
    };

    Ok(rows)
}
