use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait, PaginatorTrait, Set};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;

use crate::config::CONFIG;
use crate::error::{AppError, Result};
use crate::migrations::Migrator;
use crate::models::admin;
use crate::models::prelude::*;
use crate::services::security::hash_password;

pub use crate::state::DbConn;

/// Create a new database connection and run migrations using config
pub async fn connect() -> Result<DbConn> {
    connect_with_url(&CONFIG.database.database_url).await
}

/// Create a new database connection with a specific URL and run migrations
pub async fn connect_with_url(database_url: &str) -> Result<DbConn> {
    tracing::info!("Connecting to database...");

    let mut opts = ConnectOptions::new(database_url);
    opts.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);

    let db = Database::connect(opts)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to connect to database: {}", e)))?;

    tracing::info!("Running database migrations...");
    Migrator::up(&db, None)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to run migrations: {}", e)))?;
    tracing::info!("Database migrations completed");

    Ok(db)
}

/// Insert the first admin account when none exists yet.
///
/// Returns `true` when an admin was created.
pub async fn seed_admin(db: &DbConn, username: &str, password: &str) -> Result<bool> {
    if Admin::find().count(db).await? > 0 {
        return Ok(false);
    }

    let now = chrono::Utc::now();
    let new_admin = admin::ActiveModel {
        username: Set(username.to_string()),
        hashed_password: Set(hash_password(password)?),
        session_token: Set(None),
        session_id: Set(None),
        last_login: Set(None),
        last_logout: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    new_admin.insert(db).await?;

    tracing::info!(username = %username, "Seeded initial admin account");
    Ok(true)
}
