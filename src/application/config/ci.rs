use std::env;

use super::non_empty_var;

/// CI platform (GitHub Actions) settings
#[derive(Debug, Clone, Default)]
pub struct CiConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub workflow_file: Option<String>,
    pub git_ref: String,
    pub cache_ttl_secs: u64,
}

impl CiConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            token: non_empty_var("GITHUB_TOKEN"),
            owner: non_empty_var("GITHUB_OWNER"),
            repo: non_empty_var("GITHUB_REPO"),
            workflow_file: non_empty_var("GITHUB_WORKFLOW_FILE"),
            git_ref: non_empty_var("GITHUB_REF").unwrap_or_else(|| "main".to_string()),
            cache_ttl_secs: env::var("DEPLOYGATE_CI_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
        }
    }
}
