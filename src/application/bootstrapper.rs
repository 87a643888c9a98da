//! Application bootstrapper
//!
//! Handles all initialization and setup for the deploygate backend.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, Router};
use http::{header, HeaderValue, Method};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::clock::{SharedClock, SystemClock};
use crate::config::CONFIG;
use crate::db;
use crate::endpoints;
use crate::middleware::security_headers;
use crate::services::{scheduler, GithubClient, TunnelClient};
use crate::state::AppState;

/// Largest request body accepted by any route
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Bootstrap and run the application
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Starting deploygate v{}", env!("CARGO_PKG_VERSION"));

    let state = init_services().await?;
    let app = create_app(state);

    serve(app).await
}

/// Initialize tracing/logging
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("deploygate={},tower_http=info", CONFIG.log_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if CONFIG.log_format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false))
            .init();
    }
}

/// Initialize all application services
async fn init_services() -> anyhow::Result<AppState> {
    let conn = db::connect().await?;
    tracing::info!("Database connection established");

    match (&CONFIG.auth.admin_username, &CONFIG.auth.admin_password) {
        (Some(username), Some(password)) => {
            db::seed_admin(&conn, username, password).await?;
        }
        _ => tracing::debug!("Admin seed credentials not set"),
    }

    let clock: SharedClock = Arc::new(SystemClock);

    let github = Arc::new(GithubClient::new(CONFIG.ci.clone(), clock.clone())?);
    if CONFIG.ci.token.is_none() {
        tracing::warn!("GITHUB_TOKEN is not set; CI endpoints will fail until configured");
    }
    let tunnel = Arc::new(TunnelClient::new(CONFIG.tunnel.clone())?);
    if CONFIG.tunnel.host.is_none() {
        tracing::warn!("TUNNEL_HOST is not set; deploy actions will fail until configured");
    }

    scheduler::start_scheduler(
        github.clone(),
        std::time::Duration::from_secs(CONFIG.ci.cache_ttl_secs),
    );

    Ok(AppState::new(conn, github, tunnel)
        .with_clock(clock)
        .with_secure_cookies(CONFIG.auth.is_production()))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

/// Create the main application router
pub fn create_app(state: AppState) -> Router {
    endpoints::create_router(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum_middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&CONFIG.server.allowed_origins))
}

/// Start the HTTP server
async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", CONFIG.server.host, CONFIG.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
