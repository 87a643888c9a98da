use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::error::{AppError, Result};
use crate::middleware::{AdminSession, JsonBody};
use crate::models::admin;
use crate::models::prelude::*;
use crate::schemas::{
    AdminSessionValidResponse, AdminSignInRequest, AdminSignInResponse, IssueTokenRequest,
    MessageResponse, RenewTokenRequest, TokenHistoryEntry, TokenHistoryQuery, TokenIdQuery,
    TokenResponse, TokenUserDetailsResponse,
};
use crate::services::security::verify_password;
use crate::services::session::{self, PrincipalKind, ADMIN_COOKIES};
use crate::services::tokens::{self, Renewal};
use crate::state::AppState;

/// Admin routes, nested under `/admin`
pub fn admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/signin", post(sign_in))
        .route("/auth/signout", post(sign_out))
        .route("/auth/validate-session", post(validate_session))
        .route(
            "/tokens",
            get(list_tokens).post(issue_token).delete(revoke_token),
        )
        .route("/renew-token", post(renew_token))
        .route("/token-history", get(token_history))
        .route("/token-user-details", get(token_user_details))
        .with_state(state)
}

// ============================================================================
// Admin session
// ============================================================================

async fn sign_in(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<AdminSignInRequest>,
) -> Result<Response> {
    let found = Admin::find()
        .filter(admin::Column::Username.eq(request.username.trim()))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    if !verify_password(&request.password, &found.hashed_password) {
        tracing::warn!(admin_id = found.id, "Admin sign-in with wrong password");
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    let issued = session::create(&state.db, PrincipalKind::Admin, found.id, &found.username, state.now()).await?;
    tracing::info!(admin_id = found.id, "Admin signed in");

    let headers = session::session_cookie_headers(&ADMIN_COOKIES, &issued, state.secure_cookies);
    Ok((
        headers,
        Json(AdminSignInResponse {
            admin_id: found.id,
            username: found.username,
        }),
    )
        .into_response())
}

async fn sign_out(State(state): State<AppState>, session: AdminSession) -> Response {
    let clear = session::clear_cookie_headers(&ADMIN_COOKIES, state.secure_cookies);
    match session::invalidate(&state.db, PrincipalKind::Admin, session.admin.id, state.now()).await {
        Ok(()) => {
            tracing::info!(admin_id = session.admin.id, "Admin signed out");
            (clear, Json(MessageResponse::new("Signed out"))).into_response()
        }
        Err(e) => (clear, e).into_response(),
    }
}

async fn validate_session(session: AdminSession) -> Json<AdminSessionValidResponse> {
    Json(AdminSessionValidResponse {
        valid: true,
        admin_id: session.admin.id,
        username: session.admin.username,
    })
}

// ============================================================================
// Tokens
// ============================================================================

async fn issue_token(
    State(state): State<AppState>,
    _admin: AdminSession,
    JsonBody(request): JsonBody<IssueTokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>)> {
    let duration = tokens::parse_duration(&request.duration)?;
    let issued = tokens::issue(&state.db, duration, state.now()).await?;
    Ok((StatusCode::CREATED, Json(issued.into())))
}

async fn list_tokens(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> Result<Json<Vec<TokenResponse>>> {
    let all = tokens::list(&state.db).await?;
    Ok(Json(all.into_iter().map(TokenResponse::from).collect()))
}

async fn revoke_token(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(query): Query<TokenIdQuery>,
) -> Result<Json<MessageResponse>> {
    let token_id = query
        .parse()
        .ok_or_else(|| AppError::BadRequest("tokenId must be a number".to_string()))?;

    tokens::revoke(&state.db, token_id).await?;
    Ok(Json(MessageResponse::new("Token deleted")))
}

async fn renew_token(
    State(state): State<AppState>,
    _admin: AdminSession,
    JsonBody(request): JsonBody<RenewTokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>)> {
    let duration = tokens::parse_duration(&request.duration)?;

    match tokens::renew(&state.db, request.user_id, duration, state.now()).await? {
        Renewal::Complete(renewed) => Ok((StatusCode::CREATED, Json(renewed.into()))),
        Renewal::UserNotUpdated(token) => Err(AppError::PartialFailure {
            message: "Token created but user record not updated".to_string(),
            details: "user record update failed".to_string(),
            token: Some(serde_json::to_value(TokenResponse::from(token))?),
        }),
    }
}

async fn token_history(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(query): Query<TokenHistoryQuery>,
) -> Result<Json<Vec<TokenHistoryEntry>>> {
    let now = state.now();
    let rows = tokens::history(&state.db, query.user_id).await?;
    Ok(Json(
        rows.into_iter()
            .map(|(token, owner)| TokenHistoryEntry::new(token, owner, now))
            .collect(),
    ))
}

async fn token_user_details(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(query): Query<TokenIdQuery>,
) -> Result<Json<TokenUserDetailsResponse>> {
    let token_id = query
        .parse()
        .ok_or_else(|| AppError::BadRequest("tokenId must be a number".to_string()))?;

    let (token, owner) = tokens::user_details(&state.db, token_id).await?;
    Ok(Json(TokenUserDetailsResponse {
        token: token.into(),
        user: owner.map(Into::into),
    }))
}
