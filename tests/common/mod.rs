//! Test helpers and utilities for integration testing.
//!
//! Builds an in-process app over an in-memory SQLite database, a manual
//! clock and recording fakes for the CI and tunnel gateways.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use tower::util::ServiceExt;

use deploygate::bootstrapper::create_app;
use deploygate::clock::ManualClock;
use deploygate::endpoints::create_router;
use deploygate::error::{AppError, Result};
use deploygate::migrations::Migrator;
use deploygate::models::token::{TokenDuration, TokenStatus};
use deploygate::models::{admin, token, user};
use deploygate::services::ci::{CiApi, WorkflowJob, WorkflowRun};
use deploygate::services::security::hash_password;
use deploygate::services::session::{self, CookieNames, PrincipalKind, ADMIN_COOKIES, USER_COOKIES};
use deploygate::services::tunnel::{TunnelAction, TunnelApi};
use deploygate::state::AppState;

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run test migrations");

    db
}

/// Fixed starting instant for the manual clock
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap()
}

// ============================================================================
// Gateway fakes
// ============================================================================

/// How a fake gateway call should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Upstream,
    Unresolvable,
}

impl Failure {
    fn to_error(self, what: &str) -> AppError {
        match self {
            Failure::Upstream => AppError::Upstream {
                message: format!("{} returned 500", what),
                details: Some(serde_json::json!({"reason": "simulated"})),
            },
            Failure::Unresolvable => {
                AppError::ServiceUnavailable(format!("{} host could not be resolved", what))
            }
        }
    }
}

#[derive(Default)]
pub struct FakeCi {
    pub runs: Mutex<Vec<WorkflowRun>>,
    pub jobs: Mutex<HashMap<i64, Vec<WorkflowJob>>>,
    pub cancelled: Mutex<Vec<i64>>,
    pub dispatched: Mutex<Vec<serde_json::Value>>,
    pub fail_cancel: Mutex<Option<Failure>>,
}

impl FakeCi {
    /// Add a run (kept newest first) with one job per name
    pub fn add_run(&self, id: i64, minute: u32, status: &str, job_names: &[&str]) {
        let run = WorkflowRun {
            id,
            name: Some("deploy".to_string()),
            status: Some(status.to_string()),
            conclusion: None,
            html_url: format!("https://github.com/acme/app/actions/runs/{}", id),
            created_at: Utc.with_ymd_and_hms(2024, 1, 31, 0, minute, 0).unwrap(),
        };
        let mut runs = self.runs.lock();
        runs.push(run);
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let jobs = job_names
            .iter()
            .enumerate()
            .map(|(i, name)| WorkflowJob {
                id: id * 100 + i as i64,
                name: name.to_string(),
                status: Some(status.to_string()),
                conclusion: None,
            })
            .collect();
        self.jobs.lock().insert(id, jobs);
    }
}

#[async_trait]
impl CiApi for FakeCi {
    async fn list_runs(&self) -> Result<Vec<WorkflowRun>> {
        Ok(self.runs.lock().clone())
    }

    async fn list_jobs(&self, run_id: i64) -> Result<Vec<WorkflowJob>> {
        Ok(self.jobs.lock().get(&run_id).cloned().unwrap_or_default())
    }

    async fn dispatch(&self, inputs: serde_json::Value) -> Result<()> {
        self.dispatched.lock().push(inputs);
        Ok(())
    }

    async fn cancel(&self, run_id: i64) -> Result<()> {
        if let Some(failure) = *self.fail_cancel.lock() {
            return Err(failure.to_error("GitHub API"));
        }
        self.cancelled.lock().push(run_id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TunnelCall {
    pub username: String,
    pub action: TunnelAction,
    pub slot: i32,
    pub form_data: Option<serde_json::Value>,
}

#[derive(Default)]
pub struct FakeTunnel {
    pub calls: Mutex<Vec<TunnelCall>>,
    pub fail: Mutex<Option<Failure>>,
}

#[async_trait]
impl TunnelApi for FakeTunnel {
    async fn send(
        &self,
        username: &str,
        action: TunnelAction,
        slot: i32,
        form_data: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        self.calls.lock().push(TunnelCall {
            username: username.to_string(),
            action,
            slot,
            form_data: form_data.cloned(),
        });
        if let Some(failure) = *self.fail.lock() {
            return Err(failure.to_error("Tunnel service"));
        }
        Ok(serde_json::json!({ "ok": true, "action": action.as_str(), "slot": slot }))
    }
}

// ============================================================================
// App
// ============================================================================

pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub ci: Arc<FakeCi>,
    pub tunnel: Arc<FakeTunnel>,
}

impl TestApp {
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    /// Issue a request and return (status, headers, json body)
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, HeaderMap, serde_json::Value) {
        self.send_to(self.router(), method, uri, cookie, body).await
    }

    /// Same as `send`, but through the fully layered production app
    pub async fn send_layered(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, HeaderMap, serde_json::Value) {
        let app = create_app(self.state.clone());
        self.send_to(app, method, uri, cookie, body).await
    }

    /// Send a raw, possibly malformed JSON body
    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        raw: &str,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let response = self
            .router()
            .oneshot(builder.body(Body::from(raw.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        });
        (status, json)
    }

    async fn send_to(
        &self,
        router: Router,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, HeaderMap, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = router
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        });
        (status, headers, json)
    }
}

pub async fn build_test_app() -> TestApp {
    let db = create_test_db().await;
    let clock = Arc::new(ManualClock::new(test_epoch()));
    let ci = Arc::new(FakeCi::default());
    let tunnel = Arc::new(FakeTunnel::default());

    let state = AppState::new(db, ci.clone(), tunnel.clone()).with_clock(clock.clone());

    TestApp {
        state,
        clock,
        ci,
        tunnel,
    }
}

// ============================================================================
// Data
// ============================================================================

pub async fn create_test_user(db: &DatabaseConnection, username: &str) -> user::Model {
    let now = test_epoch();
    user::ActiveModel {
        username: Set(username.to_string()),
        token: Set(None),
        token_removed: Set(false),
        session_token: Set(None),
        session_id: Set(None),
        last_login: Set(None),
        last_logout: Set(None),
        deploy_timestamp: Set(None),
        active_form_number: Set(None),
        active_run_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_test_admin(db: &DatabaseConnection, username: &str, password: &str) -> admin::Model {
    let now = test_epoch();
    admin::ActiveModel {
        username: Set(username.to_string()),
        hashed_password: Set(hash_password(password).unwrap()),
        session_token: Set(None),
        session_id: Set(None),
        last_login: Set(None),
        last_logout: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_test_token(
    db: &DatabaseConnection,
    value: &str,
    status: TokenStatus,
    user_id: Option<i64>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> token::Model {
    token::ActiveModel {
        token: Set(value.to_string()),
        status: Set(status),
        duration: Set(TokenDuration::ThreeMonths),
        user_id: Set(user_id),
        created_at: Set(created_at),
        expires_at: Set(expires_at),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

/// Make every later update of `table.column` fail inside the store
pub async fn fail_updates_of(db: &DatabaseConnection, table: &str, column: &str) {
    let sql = format!(
        "CREATE TRIGGER fail_{table}_{column} BEFORE UPDATE OF {column} ON {table} \
         BEGIN SELECT RAISE(ABORT, 'disk I/O error in {table}'); END;"
    );
    db.execute_unprepared(&sql).await.unwrap();
}

// ============================================================================
// Cookies
// ============================================================================

/// Collapse `Set-Cookie` headers into a `Cookie` request header value.
///
/// Cleared (empty) cookies are dropped.
pub fn cookie_header_from(headers: &HeaderMap) -> String {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter(|pair| !pair.ends_with('='))
        .collect::<Vec<_>>()
        .join("; ")
}

/// All `Set-Cookie` header values
pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect()
}

async fn open_session(app: &TestApp, kind: PrincipalKind, id: i64, username: &str, names: &CookieNames) -> String {
    let issued = session::create(app.db(), kind, id, username, app.clock_now())
        .await
        .unwrap();
    let headers = session::session_cookie_headers(names, &issued, false);
    cookie_header_from(&headers)
}

impl TestApp {
    pub fn clock_now(&self) -> DateTime<Utc> {
        self.state.now()
    }
}

/// A user with a live session; returns the user and its `Cookie` header
pub async fn signed_in_user(app: &TestApp, username: &str) -> (user::Model, String) {
    let created = create_test_user(app.db(), username).await;
    let cookie = open_session(app, PrincipalKind::User, created.id, username, &USER_COOKIES).await;
    (created, cookie)
}

/// An admin with a live session; returns the admin and its `Cookie` header
pub async fn signed_in_admin(app: &TestApp, username: &str) -> (admin::Model, String) {
    let created = create_test_admin(app.db(), username, "admin-password").await;
    let cookie = open_session(app, PrincipalKind::Admin, created.id, username, &ADMIN_COOKIES).await;
    (created, cookie)
}
