use std::env;

use super::non_empty_var;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Runtime environment; `production` enables the `Secure` cookie attribute
    pub environment: String,
    /// Seed credentials for the first admin account
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            environment: env::var("DEPLOYGATE_ENV").unwrap_or_else(|_| "development".to_string()),
            admin_username: non_empty_var("DEPLOYGATE_ADMIN_USERNAME"),
            admin_password: non_empty_var("DEPLOYGATE_ADMIN_PASSWORD"),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
