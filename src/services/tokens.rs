//! Onboarding token issuance and consumption
//!
//! A token is `Active` until a user signs in with it or an admin renews on a
//! user's behalf, then `InUse`. Expiry is derived from `expires_at`. A user
//! holds at most one unexpired `InUse` token.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::token::{self, TokenDuration, TokenStatus};
use crate::models::user;
use crate::services::security::generate_onboarding_token;
use crate::state::DbConn;

/// `created_at` plus the duration in calendar months, day clamped to the month end
pub fn expiry_for(duration: TokenDuration, created_at: DateTime<Utc>) -> Result<DateTime<Utc>> {
    created_at
        .checked_add_months(duration.months())
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))
}

pub fn parse_duration(raw: &str) -> Result<TokenDuration> {
    raw.parse::<TokenDuration>()
        .map_err(|_| AppError::BadRequest("Invalid duration".to_string()))
}

async fn insert_token(
    db: &DbConn,
    duration: TokenDuration,
    status: TokenStatus,
    user_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<token::Model> {
    let model = token::ActiveModel {
        token: Set(generate_onboarding_token()),
        status: Set(status),
        duration: Set(duration),
        user_id: Set(user_id),
        created_at: Set(now),
        expires_at: Set(expiry_for(duration, now)?),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

/// Create an unassigned `Active` token
pub async fn issue(db: &DbConn, duration: TokenDuration, now: DateTime<Utc>) -> Result<token::Model> {
    let created = insert_token(db, duration, TokenStatus::Active, None, now).await?;
    tracing::info!(token_id = created.id, duration = %duration, "Issued onboarding token");
    Ok(created)
}

/// Delete a token. Deleting an unknown id is not an error.
///
/// Returns whether a row was removed.
pub async fn revoke(db: &DbConn, token_id: i64) -> Result<bool> {
    let result = Token::delete_by_id(token_id).exec(db).await?;
    if result.rows_affected > 0 {
        tracing::info!(token_id, "Revoked onboarding token");
    }
    Ok(result.rows_affected > 0)
}

pub async fn list(db: &DbConn) -> Result<Vec<token::Model>> {
    Ok(Token::find()
        .order_by_desc(token::Column::CreatedAt)
        .order_by_desc(token::Column::Id)
        .all(db)
        .await?)
}

/// Tokens joined with their owner, newest first
pub async fn history(
    db: &DbConn,
    user_id: Option<i64>,
) -> Result<Vec<(token::Model, Option<user::Model>)>> {
    let mut query = Token::find().find_also_related(User);
    if let Some(user_id) = user_id {
        query = query.filter(token::Column::UserId.eq(user_id));
    }
    Ok(query
        .order_by_desc(token::Column::CreatedAt)
        .order_by_desc(token::Column::Id)
        .all(db)
        .await?)
}

pub async fn user_details(
    db: &DbConn,
    token_id: i64,
) -> Result<(token::Model, Option<user::Model>)> {
    Token::find_by_id(token_id)
        .find_also_related(User)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Token not found".to_string()))
}

async fn find_in_use(db: &DbConn, user_id: i64) -> Result<Option<token::Model>> {
    Ok(Token::find()
        .filter(token::Column::UserId.eq(user_id))
        .filter(token::Column::Status.eq(TokenStatus::InUse))
        .order_by_desc(token::Column::ExpiresAt)
        .one(db)
        .await?)
}

/// Remove an expired `InUse` token. Failures are logged only.
async fn purge_expired_in_use(db: &DbConn, expired: &token::Model) {
    match Token::delete_by_id(expired.id).exec(db).await {
        Ok(_) => tracing::info!(
            token_id = expired.id,
            user_id = ?expired.user_id,
            "Deleted expired in-use token"
        ),
        Err(e) => tracing::error!(
            token_id = expired.id,
            error = %e,
            "Failed to delete expired in-use token"
        ),
    }
}

async fn point_user_at_token(
    db: &DbConn,
    user_id: i64,
    token_value: &str,
    now: DateTime<Utc>,
) -> std::result::Result<(), sea_orm::DbErr> {
    User::update_many()
        .col_expr(user::Column::Token, Expr::value(token_value))
        .col_expr(user::Column::TokenRemoved, Expr::value(false))
        .col_expr(user::Column::UpdatedAt, Expr::value(now))
        .filter(user::Column::Id.eq(user_id))
        .exec(db)
        .await
        .map(|_| ())
}

/// Result of a renewal that inserted a token
#[derive(Debug)]
pub enum Renewal {
    Complete(token::Model),
    /// The token row exists but the user row still points at the old token.
    /// The store error is logged here and not carried further.
    UserNotUpdated(token::Model),
}

/// Replace a user's token with a fresh `InUse` one
pub async fn renew(
    db: &DbConn,
    user_id: i64,
    duration: TokenDuration,
    now: DateTime<Utc>,
) -> Result<Renewal> {
    if User::find_by_id(user_id).one(db).await?.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    if let Some(current) = find_in_use(db, user_id).await? {
        if !current.is_expired(now) {
            return Err(AppError::Conflict(
                "User already has an active token".to_string(),
            ));
        }
        purge_expired_in_use(db, &current).await;
    }

    let created = insert_token(db, duration, TokenStatus::InUse, Some(user_id), now).await?;

    match point_user_at_token(db, user_id, &created.token, now).await {
        Ok(()) => {
            tracing::info!(user_id, token_id = created.id, "Renewed onboarding token");
            Ok(Renewal::Complete(created))
        }
        Err(e) => {
            tracing::error!(
                user_id,
                token_id = created.id,
                error = %e,
                "Token created but user record not updated"
            );
            Ok(Renewal::UserNotUpdated(created))
        }
    }
}

async fn find_or_create_user(db: &DbConn, username: &str, now: DateTime<Utc>) -> Result<user::Model> {
    if let Some(existing) = User::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?
    {
        return Ok(existing);
    }

    let created = user::ActiveModel {
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
    .await?;

    tracing::info!(user_id = created.id, username = %username, "Created user from onboarding token");
    Ok(created)
}

/// Check an onboarding token presented at sign-in and bind it to `username`.
///
/// Returns the user to open a session for.
pub async fn consume_for_sign_in(
    db: &DbConn,
    username: &str,
    token_value: &str,
    now: DateTime<Utc>,
) -> Result<user::Model> {
    let presented = Token::find()
        .filter(token::Column::Token.eq(token_value))
        .one(db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    if presented.is_expired(now) {
        return Err(AppError::Unauthorized("Token expired".to_string()));
    }

    match presented.status {
        TokenStatus::InUse => {
            let owner = match presented.user_id {
                Some(owner_id) => User::find_by_id(owner_id).one(db).await?,
                None => None,
            };
            owner
                .filter(|u| u.username == username)
                .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))
        }
        TokenStatus::Active => {
            let account = find_or_create_user(db, username, now).await?;

            if let Some(current) = find_in_use(db, account.id).await? {
                if !current.is_expired(now) {
                    return Err(AppError::Conflict(
                        "User already has an active token".to_string(),
                    ));
                }
                purge_expired_in_use(db, &current).await;
            }

            let claimed = Token::update_many()
                .col_expr(token::Column::Status, Expr::value(TokenStatus::InUse))
                .col_expr(token::Column::UserId, Expr::value(account.id))
                .filter(token::Column::Id.eq(presented.id))
                .filter(token::Column::Status.eq(TokenStatus::Active))
                .exec(db)
                .await?;
            if claimed.rows_affected == 0 {
                return Err(AppError::Conflict("Token already in use".to_string()));
            }

            point_user_at_token(db, account.id, &presented.token, now).await?;
            tracing::info!(user_id = account.id, token_id = presented.id, "Onboarding token claimed");

            User::find_by_id(account.id)
                .one(db)
                .await?
                .ok_or_else(|| AppError::Internal("User vanished during sign-in".to_string()))
        }
    }
}
