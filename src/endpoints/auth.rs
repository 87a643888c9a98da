use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use crate::endpoints::auto_undeployed;
use crate::error::{AppError, Result};
use crate::middleware::{AdminSession, JsonBody, UserSession};
use crate::models::prelude::*;
use crate::schemas::{
    AdminUndeployRequest, MessageResponse, SessionInfoResponse, SessionValidResponse,
    SignOutResponse, UserSignInRequest, UserSignInResponse,
};
use crate::services::deployment::DeploymentStatus;
use crate::services::session::{self, PrincipalKind, USER_COOKIES};
use crate::services::tokens;
use crate::services::undeploy::{self, Freshness, UndeployResult, UndeployTarget};
use crate::state::AppState;
use sea_orm::EntityTrait;

/// User session routes, nested under `/auth`
pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/signin", post(sign_in))
        .route("/signout", post(sign_out))
        .route("/validate-session", post(validate_session))
        .route(
            "/sessions",
            axum::routing::get(current_session)
                .delete(force_sign_out)
                .post(rotate_session),
        )
        .route("/admin-undeploy", post(admin_undeploy))
        .with_state(state)
}

/// Sign in with an onboarding token
async fn sign_in(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<UserSignInRequest>,
) -> Result<Response> {
    let username = request.username.trim();
    if username.is_empty() || request.token.trim().is_empty() {
        return Err(AppError::BadRequest(
            "username and token are required".to_string(),
        ));
    }

    let now = state.now();
    let account = tokens::consume_for_sign_in(&state.db, username, request.token.trim(), now).await?;
    let freshness = undeploy::check_ttl(&state, &account).await?;
    let issued = session::create(&state.db, PrincipalKind::User, account.id, &account.username, now).await?;

    tracing::info!(user_id = account.id, "User signed in");

    // The session stands even when a stale deployment was just torn down
    let headers = session::session_cookie_headers(&USER_COOKIES, &issued, state.secure_cookies);
    match freshness {
        Freshness::AutoUndeployed(result) => Ok((headers, auto_undeployed(result)).into_response()),
        Freshness::Fresh(deployment) => {
            let body = UserSignInResponse {
                user_id: account.id,
                username: account.username,
                deployment,
            };
            Ok((headers, Json(body)).into_response())
        }
    }
}

async fn validate_session(State(state): State<AppState>, session: UserSession) -> Result<Response> {
    match undeploy::check_ttl(&state, &session.user).await? {
        Freshness::AutoUndeployed(result) => Ok(auto_undeployed(result)),
        Freshness::Fresh(deployment) => Ok(Json(SessionValidResponse {
            valid: true,
            user_id: session.user.id,
            username: session.user.username,
            deployment,
        })
        .into_response()),
    }
}

/// Undeploy anything active, then forget the session.
///
/// Cookies are cleared whatever happens on the server side.
async fn sign_out(State(state): State<AppState>, session: UserSession) -> Response {
    let clear = session::clear_cookie_headers(&USER_COOKIES, state.secure_cookies);
    let user_id = session.user_id();

    let mut undeploy_result = None;
    let mut failure: Option<AppError> = None;

    if DeploymentStatus::from_user(&session.user).is_active() {
        match undeploy::undeploy(&state, &UndeployTarget::from(&session.user)).await {
            Ok(result) => {
                if !result.success {
                    tracing::warn!(user_id, message = %result.message, "Sign-out undeploy incomplete");
                }
                undeploy_result = Some(result);
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Sign-out undeploy could not clear deployment");
                failure = Some(e);
            }
        }
    }

    if let Err(e) = session::invalidate(&state.db, PrincipalKind::User, user_id, state.now()).await {
        tracing::error!(user_id, error = %e, "Failed to invalidate session on sign-out");
        failure = Some(e);
    }

    match failure {
        Some(e) => (clear, e).into_response(),
        None => {
            tracing::info!(user_id, "User signed out");
            (
                clear,
                Json(SignOutResponse {
                    message: "Signed out".to_string(),
                    undeploy: undeploy_result,
                }),
            )
                .into_response()
        }
    }
}

async fn current_session(State(state): State<AppState>, session: UserSession) -> Result<Response> {
    let deployment = match undeploy::check_ttl(&state, &session.user).await? {
        Freshness::Fresh(status) => status,
        Freshness::AutoUndeployed(result) => return Ok(auto_undeployed(result)),
    };

    Ok(Json(SessionInfoResponse {
        session_id: session.creds.session_id.clone(),
        user_id: session.user.id,
        deployment,
        last_login: session.user.last_login,
        last_logout: session.user.last_logout,
        username: session.user.username,
    })
    .into_response())
}

/// Drop the stored session pair, signing out every client holding it
async fn force_sign_out(State(state): State<AppState>, session: UserSession) -> Response {
    let clear = session::clear_cookie_headers(&USER_COOKIES, state.secure_cookies);
    match session::invalidate(&state.db, PrincipalKind::User, session.user_id(), state.now()).await {
        Ok(()) => (clear, Json(MessageResponse::new("All sessions signed out"))).into_response(),
        Err(e) => (clear, e).into_response(),
    }
}

async fn rotate_session(State(state): State<AppState>, session: UserSession) -> Result<Response> {
    let issued = session::rotate(
        &state.db,
        PrincipalKind::User,
        &session.creds,
        &session.user.username,
        state.now(),
    )
    .await?;

    let headers = session::session_cookie_headers(&USER_COOKIES, &issued, state.secure_cookies);
    Ok((headers, Json(MessageResponse::new("Session rotated"))).into_response())
}

/// Admin-forced undeploy of one user's deployment
async fn admin_undeploy(
    State(state): State<AppState>,
    admin: AdminSession,
    JsonBody(request): JsonBody<AdminUndeployRequest>,
) -> Result<(StatusCode, Json<UndeployResult>)> {
    let target = User::find_by_id(request.user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !DeploymentStatus::from_user(&target).is_active() {
        return Ok((StatusCode::OK, Json(UndeployResult::nothing_to_undeploy())));
    }

    tracing::info!(admin_id = admin.admin.id, user_id = target.id, "Admin-forced undeploy");
    let result = undeploy::undeploy(&state, &UndeployTarget::from(&target)).await?;
    Ok((StatusCode::OK, Json(result)))
}
