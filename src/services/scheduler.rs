//! Periodic task scheduler
//!
//! Runs background tasks at fixed intervals. Add new tasks by implementing
//! the `PeriodicTask` trait.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;

use super::ci::GithubClient;

/// Trait for periodic background tasks
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Task name for logging
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    async fn run(&self) -> anyhow::Result<()>;
}

/// Start all periodic tasks
pub fn start_scheduler(github: Arc<GithubClient>, cache_ttl: Duration) -> Vec<JoinHandle<()>> {
    let tasks: Vec<Box<dyn PeriodicTask>> = vec![Box::new(CacheEvictionTask {
        github,
        every: cache_ttl,
    })];

    let handles = tasks
        .into_iter()
        .map(|task| tokio::spawn(run_task(task)))
        .collect();

    tracing::info!("Periodic task scheduler started");
    handles
}

/// Run a single task on its interval
async fn run_task(task: Box<dyn PeriodicTask>) {
    let mut ticker = interval(task.interval());

    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        ticker.tick().await;

        tracing::debug!(task = task.name(), "Running periodic task");

        match task.run().await {
            Ok(()) => {
                tracing::debug!(task = task.name(), "Periodic task completed");
            }
            Err(e) => {
                tracing::error!(task = task.name(), error = %e, "Periodic task failed");
            }
        }
    }
}

// ============================================================================
// CI cache eviction
// ============================================================================

/// Drops expired CI read-cache entries
struct CacheEvictionTask {
    github: Arc<GithubClient>,
    every: Duration,
}

#[async_trait]
impl PeriodicTask for CacheEvictionTask {
    fn name(&self) -> &'static str {
        "ci_cache_eviction"
    }

    fn interval(&self) -> Duration {
        self.every.max(Duration::from_secs(1))
    }

    async fn run(&self) -> anyhow::Result<()> {
        let removed = self.github.purge_cache();
        if removed > 0 {
            tracing::debug!(removed, "Evicted expired CI cache entries");
        }
        Ok(())
    }
}
