use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::clock::{SharedClock, SystemClock};
use crate::services::ci::SharedCi;
use crate::services::tunnel::SharedTunnel;

/// Database connection type alias
pub type DbConn = DatabaseConnection;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: DbConn,
    pub ci: SharedCi,
    pub tunnel: SharedTunnel,
    pub clock: SharedClock,
    /// Adds `Secure` to every session cookie
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(db: DbConn, ci: SharedCi, tunnel: SharedTunnel) -> Self {
        Self {
            db,
            ci,
            tunnel,
            clock: Arc::new(SystemClock),
            secure_cookies: false,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}
