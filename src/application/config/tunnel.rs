use std::env;

use super::non_empty_var;

/// HTTP tunnel service settings
#[derive(Debug, Clone, Default)]
pub struct TunnelConfig {
    /// Host suffix every per-user tunnel subdomain lives under
    pub host: Option<String>,
    /// Appended to the username to form the tunnel subdomain
    pub subdomain_suffix: String,
    pub scheme: String,
}

impl TunnelConfig {
    pub fn from_env() -> Self {
        Self {
            host: non_empty_var("TUNNEL_HOST"),
            subdomain_suffix: env::var("TUNNEL_SUBDOMAIN_SUFFIX")
                .unwrap_or_else(|_| "-tunnel".to_string()),
            scheme: non_empty_var("TUNNEL_SCHEME").unwrap_or_else(|| "https".to_string()),
        }
    }
}
