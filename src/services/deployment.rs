//! Deployment status tracking
//!
//! A user has at most one active deployment, stored as three nullable columns
//! on the user row. Every write below is a single `UPDATE`.

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::prelude::*;
use crate::models::user;
use crate::state::DbConn;

/// A deployment older than this is undeployed on the next status read
pub const DEPLOYMENT_TTL: Duration = Duration::hours(1);

pub const MIN_FORM_NUMBER: i32 = 1;
pub const MAX_FORM_NUMBER: i32 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub deploy_timestamp: Option<DateTime<Utc>>,
    pub active_form_number: Option<i32>,
    pub active_run_id: Option<i64>,
}

impl DeploymentStatus {
    pub fn from_user(user: &user::Model) -> Self {
        Self {
            deploy_timestamp: user.deploy_timestamp,
            active_form_number: user.active_form_number,
            active_run_id: user.active_run_id,
        }
    }

    /// Any bookkeeping left behind counts as active
    pub fn is_active(&self) -> bool {
        self.deploy_timestamp.is_some()
            || self.active_form_number.is_some()
            || self.active_run_id.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deploy_timestamp
            .map(|started| now - started > DEPLOYMENT_TTL)
            .unwrap_or(false)
    }
}

pub fn validate_form_number(form_number: i32) -> Result<i32> {
    if (MIN_FORM_NUMBER..=MAX_FORM_NUMBER).contains(&form_number) {
        Ok(form_number)
    } else {
        Err(AppError::BadRequest(format!(
            "formNumber must be between {} and {}",
            MIN_FORM_NUMBER, MAX_FORM_NUMBER
        )))
    }
}

/// Mark `form_number` as the user's active deployment.
///
/// Overwrites any previous slot and drops the previous run id.
pub async fn record_start(
    db: &DbConn,
    user_id: i64,
    form_number: i32,
    now: DateTime<Utc>,
) -> Result<()> {
    User::update_many()
        .col_expr(user::Column::DeployTimestamp, Expr::value(now))
        .col_expr(user::Column::ActiveFormNumber, Expr::value(form_number))
        .col_expr(user::Column::ActiveRunId, Expr::value(Option::<i64>::None))
        .col_expr(user::Column::UpdatedAt, Expr::value(now))
        .filter(user::Column::Id.eq(user_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Clear the deployment only if `form_number` is the active slot.
///
/// Returns whether anything was cleared.
pub async fn record_stop(
    db: &DbConn,
    user_id: i64,
    form_number: i32,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = cleared_update(now)
        .filter(user::Column::Id.eq(user_id))
        .filter(user::Column::ActiveFormNumber.eq(form_number))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Attach a CI run to the current deployment, leaving timestamp and slot alone.
///
/// Returns `false` when the user has no deployment to attach to.
pub async fn record_run_id(db: &DbConn, user_id: i64, run_id: i64) -> Result<bool> {
    let result = User::update_many()
        .col_expr(user::Column::ActiveRunId, Expr::value(run_id))
        .filter(user::Column::Id.eq(user_id))
        .filter(user::Column::DeployTimestamp.is_not_null())
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Unconditionally null all deployment fields
pub async fn clear(db: &DbConn, user_id: i64, now: DateTime<Utc>) -> Result<()> {
    cleared_update(now)
        .filter(user::Column::Id.eq(user_id))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn load(db: &DbConn, user_id: i64) -> Result<Option<DeploymentStatus>> {
    Ok(User::find_by_id(user_id)
        .one(db)
        .await?
        .map(|u| DeploymentStatus::from_user(&u)))
}

fn cleared_update(now: DateTime<Utc>) -> sea_orm::UpdateMany<User> {
    User::update_many()
        .col_expr(user::Column::DeployTimestamp, Expr::value(Option::<DateTime<Utc>>::None))
        .col_expr(user::Column::ActiveFormNumber, Expr::value(Option::<i32>::None))
        .col_expr(user::Column::ActiveRunId, Expr::value(Option::<i64>::None))
        .col_expr(user::Column::UpdatedAt, Expr::value(now))
}
