//! Test helpers and utilities for unit testing.
//!
//! Provides an in-memory database migrated with the real `Migrator`, plus
//! shortcuts for inserting users, admins and tokens.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;

use crate::migrations::Migrator;
use crate::models::token::{TokenDuration, TokenStatus};
use crate::models::{admin, token, user};
use crate::services::security::hash_password;

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> DatabaseConnection {
    // Use simple in-memory SQLite - each connection gets its own database
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run test migrations");

    db
}

/// Insert a user with no session and no deployment
pub async fn create_test_user(db: &DatabaseConnection, username: &str) -> user::Model {
    let now = Utc::now();
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

/// Insert an admin whose password is `password`
pub async fn create_test_admin(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> admin::Model {
    let now = Utc::now();
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

/// Insert a token row directly, bypassing issuance rules
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
