//! Per-user HTTP tunnel gateway
//!
//! Every user's slots are reachable at
//! `{scheme}://{username}{suffix}.{host}/{action}/{slot}`.

use std::error::Error as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::tunnel::TunnelConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelAction {
    Start,
    Stop,
    Update,
}

impl TunnelAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelAction::Start => "start",
            TunnelAction::Stop => "stop",
            TunnelAction::Update => "update",
        }
    }
}

impl std::fmt::Display for TunnelAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait TunnelApi: Send + Sync {
    /// POST `action` for `slot` on the user's tunnel.
    ///
    /// Returns the upstream JSON body on 2xx. Non-2xx maps to `Upstream`, an
    /// unresolvable tunnel host to `ServiceUnavailable`.
    async fn send(
        &self,
        username: &str,
        action: TunnelAction,
        slot: i32,
        form_data: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value>;
}

pub type SharedTunnel = Arc<dyn TunnelApi>;

pub fn tunnel_identifier(username: &str, suffix: &str) -> String {
    format!("{}{}", username, suffix)
}

pub fn tunnel_url(
    config: &TunnelConfig,
    username: &str,
    action: TunnelAction,
    slot: i32,
) -> Result<String> {
    let host = config
        .host
        .as_deref()
        .ok_or_else(|| AppError::Configuration("TUNNEL_HOST is not configured".to_string()))?;
    Ok(format!(
        "{}://{}.{}/{}/{}",
        config.scheme,
        tunnel_identifier(username, &config.subdomain_suffix),
        host,
        action,
        slot
    ))
}

/// Whether a transport error came from resolving the host name
fn is_dns_failure(err: &reqwest::Error) -> bool {
    if !err.is_connect() {
        return false;
    }
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("dns")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
            || text.contains("name resolution")
            || text.contains("no such host")
        {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Parse a body as JSON, wrapping anything else as `{"message": text}`
fn body_as_json(text: String) -> serde_json::Value {
    serde_json::from_str(&text).unwrap_or_else(|_| serde_json::json!({ "message": text }))
}

pub struct TunnelClient {
    http: reqwest::Client,
    config: TunnelConfig,
}

impl TunnelClient {
    pub fn new(config: TunnelConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl TunnelApi for TunnelClient {
    async fn send(
        &self,
        username: &str,
        action: TunnelAction,
        slot: i32,
        form_data: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let url = tunnel_url(&self.config, username, action, slot)?;

        let mut request = self.http.post(&url);
        if let Some(data) = form_data {
            request = request.json(data);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if is_dns_failure(&e) => {
                tracing::warn!(url = %url, error = %e, "Tunnel host could not be resolved");
                return Err(AppError::ServiceUnavailable(format!(
                    "Tunnel host for {} could not be resolved",
                    username
                )));
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Tunnel request failed");
                return Err(AppError::HttpClient(e));
            }
        };

        let status = response.status();
        let body = body_as_json(response.text().await.unwrap_or_default());

        if status.is_success() {
            tracing::debug!(url = %url, status = %status, "Tunnel request succeeded");
            Ok(body)
        } else {
            tracing::warn!(url = %url, status = %status, "Tunnel service returned an error");
            Err(AppError::Upstream {
                message: format!("Tunnel service returned {}", status.as_u16()),
                details: Some(body),
            })
        }
    }
}
