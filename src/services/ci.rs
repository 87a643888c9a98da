//! GitHub Actions gateway
//!
//! Reads (`list_runs`, `list_jobs`) go through a TTL cache keyed by request
//! path. Writes (`dispatch`, `cancel`) bypass it and never evict.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::config::ci::CiConfig;
use crate::error::{AppError, Result};
use crate::services::cache::TtlCache;

/// Runs fetched by `list_runs`
const RUNS_PER_PAGE: u32 = 30;

/// Runs whose jobs are fetched concurrently in one step of a job-name scan
pub const JOB_SCAN_CHUNK: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowJob {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
}

#[derive(Deserialize)]
struct RunsPage {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Deserialize)]
struct JobsPage {
    jobs: Vec<WorkflowJob>,
}

/// CI platform operations the rest of the crate depends on
#[async_trait]
pub trait CiApi: Send + Sync {
    /// Recent runs of the configured workflow, newest first
    async fn list_runs(&self) -> Result<Vec<WorkflowRun>>;

    async fn list_jobs(&self, run_id: i64) -> Result<Vec<WorkflowJob>>;

    /// Trigger the configured workflow on the configured ref
    async fn dispatch(&self, inputs: serde_json::Value) -> Result<()>;

    async fn cancel(&self, run_id: i64) -> Result<()>;
}

/// A run with the job whose name matched
#[derive(Debug, Clone, PartialEq)]
pub struct RunMatch {
    pub run: WorkflowRun,
    pub job_name: String,
}

/// Find the newest run that has a job whose name contains `needle`.
///
/// Runs are scanned in chunks. The jobs of a chunk are fetched concurrently
/// and a later chunk is only fetched when the earlier ones had no match.
pub async fn find_latest_run_for_job(ci: &dyn CiApi, needle: &str) -> Result<Option<RunMatch>> {
    let runs = ci.list_runs().await?;

    for chunk in runs.chunks(JOB_SCAN_CHUNK) {
        let jobs = join_all(chunk.iter().map(|run| ci.list_jobs(run.id))).await;

        for (run, jobs) in chunk.iter().zip(jobs) {
            if let Some(job) = jobs?.into_iter().find(|j| j.name.contains(needle)) {
                return Ok(Some(RunMatch {
                    run: run.clone(),
                    job_name: job.name,
                }));
            }
        }
    }

    Ok(None)
}

/// Repository coordinates, present only when every required variable is set
struct RepoTarget<'a> {
    token: &'a str,
    owner: &'a str,
    repo: &'a str,
    workflow_file: &'a str,
}

pub struct GithubClient {
    http: reqwest::Client,
    config: CiConfig,
    runs_cache: TtlCache<String, Vec<WorkflowRun>>,
    jobs_cache: TtlCache<String, Vec<WorkflowJob>>,
}

impl GithubClient {
    pub fn new(config: CiConfig, clock: SharedClock) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self::with_http_client(http, config, clock))
    }

    pub fn with_http_client(http: reqwest::Client, config: CiConfig, clock: SharedClock) -> Self {
        let ttl = Duration::seconds(config.cache_ttl_secs as i64);
        Self {
            http,
            runs_cache: TtlCache::new(ttl, clock.clone()),
            jobs_cache: TtlCache::new(ttl, clock),
            config,
        }
    }

    /// Drop expired cache entries, returning how many went
    pub fn purge_cache(&self) -> usize {
        self.runs_cache.purge_expired() + self.jobs_cache.purge_expired()
    }

    fn target(&self) -> Result<RepoTarget<'_>> {
        let missing = |name: &str| AppError::Configuration(format!("{} is not configured", name));
        Ok(RepoTarget {
            token: self.config.token.as_deref().ok_or_else(|| missing("GITHUB_TOKEN"))?,
            owner: self.config.owner.as_deref().ok_or_else(|| missing("GITHUB_OWNER"))?,
            repo: self.config.repo.as_deref().ok_or_else(|| missing("GITHUB_REPO"))?,
            workflow_file: self
                .config
                .workflow_file
                .as_deref()
                .ok_or_else(|| missing("GITHUB_WORKFLOW_FILE"))?,
        })
    }

    fn request(&self, method: reqwest::Method, token: &str, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.config.api_url, path))
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "deploygate")
    }

    async fn get_json<T: DeserializeOwned>(&self, token: &str, path: &str) -> Result<T> {
        let response = self.request(reqwest::Method::GET, token, path).send().await?;
        let response = ensure_success(response, path).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Turn a non-2xx answer into `AppError::Upstream` carrying the remote body
async fn ensure_success(response: reqwest::Response, path: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let details = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
    tracing::warn!(status = %status, path = %path, "GitHub API request failed");
    Err(AppError::Upstream {
        message: format!("GitHub API returned {}", status.as_u16()),
        details: Some(details),
    })
}

#[async_trait]
impl CiApi for GithubClient {
    async fn list_runs(&self) -> Result<Vec<WorkflowRun>> {
        let target = self.target()?;
        let path = format!(
            "/repos/{}/{}/actions/workflows/{}/runs?per_page={}",
            target.owner, target.repo, target.workflow_file, RUNS_PER_PAGE
        );
        if let Some(cached) = self.runs_cache.get(&path) {
            return Ok(cached);
        }

        let page: RunsPage = self.get_json(target.token, &path).await?;
        let mut runs = page.workflow_runs;
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.runs_cache.insert(path, runs.clone());
        Ok(runs)
    }

    async fn list_jobs(&self, run_id: i64) -> Result<Vec<WorkflowJob>> {
        let target = self.target()?;
        let path = format!(
            "/repos/{}/{}/actions/runs/{}/jobs",
            target.owner, target.repo, run_id
        );
        if let Some(cached) = self.jobs_cache.get(&path) {
            return Ok(cached);
        }

        let page: JobsPage = self.get_json(target.token, &path).await?;
        self.jobs_cache.insert(path, page.jobs.clone());
        Ok(page.jobs)
    }

    async fn dispatch(&self, inputs: serde_json::Value) -> Result<()> {
        let target = self.target()?;
        let path = format!(
            "/repos/{}/{}/actions/workflows/{}/dispatches",
            target.owner, target.repo, target.workflow_file
        );
        let body = serde_json::json!({ "ref": self.config.git_ref, "inputs": inputs });

        let response = self
            .request(reqwest::Method::POST, target.token, &path)
            .json(&body)
            .send()
            .await?;
        ensure_success(response, &path).await?;

        tracing::info!(workflow = %target.workflow_file, git_ref = %self.config.git_ref, "Workflow dispatched");
        Ok(())
    }

    async fn cancel(&self, run_id: i64) -> Result<()> {
        let target = self.target()?;
        let path = format!(
            "/repos/{}/{}/actions/runs/{}/cancel",
            target.owner, target.repo, run_id
        );

        let response = self
            .request(reqwest::Method::POST, target.token, &path)
            .send()
            .await?;
        ensure_success(response, &path).await?;

        tracing::info!(run_id, "Workflow run cancelled");
        Ok(())
    }
}

/// Shared gateway handle stored in application state
pub type SharedCi = Arc<dyn CiApi>;
