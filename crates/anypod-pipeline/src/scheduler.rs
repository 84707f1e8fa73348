//! Cron-driven feed processing
//!
//! One cron job per ready feed, id `feed:<feed_id>`. Missed fires coalesce,
//! a feed never overlaps itself, and all jobs share the global concurrency
//! semaphore with the manual runner.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::FeedConfig;
use crate::coordinator::FeedCoordinator;
use crate::PipelineError;

const STOP_POLL: Duration = Duration::from_millis(200);

/// Tracks feeds with an in-flight scheduled run so a feed never overlaps
/// itself (the cron library fires on schedule regardless).
#[derive(Debug, Default, Clone)]
struct RunGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl RunGuard {
    fn begin(&self, feed_id: &str) -> bool {
        self.in_flight
            .lock()
            .map(|mut set| set.insert(feed_id.to_string()))
            .unwrap_or(false)
    }

    fn end(&self, feed_id: &str) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(feed_id);
        }
    }

    fn is_idle(&self) -> bool {
        self.in_flight.lock().map(|set| set.is_empty()).unwrap_or(true)
    }
}

/// Schedules `FeedCoordinator::process` per feed on its cron expression.
pub struct FeedScheduler {
    scheduler: JobScheduler,
    guard: RunGuard,
}

impl FeedScheduler {
    /// Build the scheduler and register one job per ready feed.
    ///
    /// # Errors
    /// Returns `PipelineError::Scheduler` when job registration fails
    pub async fn new(
        ready_feed_ids: &[String],
        feed_configs: &BTreeMap<String, FeedConfig>,
        coordinator: Arc<FeedCoordinator>,
        semaphore: Arc<Semaphore>,
    ) -> Result<Self, PipelineError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|err| PipelineError::Scheduler(err.to_string()))?;
        let guard = RunGuard::default();

        for feed_id in ready_feed_ids {
            let Some(config) = feed_configs.get(feed_id) else {
                continue;
            };
            // manual-only feeds have no schedule and run via the manual path
            let Some(schedule) = &config.schedule else {
                continue;
            };

            let expr = normalize_cron(schedule);
            let job = Self::build_job(
                &expr,
                feed_id.clone(),
                config.clone(),
                Arc::clone(&coordinator),
                Arc::clone(&semaphore),
                guard.clone(),
            )?;
            scheduler
                .add(job)
                .await
                .map_err(|err| PipelineError::Scheduler(err.to_string()))?;
            tracing::debug!(feed_id, schedule = expr, job_id = job_id(feed_id), "feed job registered");
        }

        Ok(Self { scheduler, guard })
    }

    fn build_job(
        expr: &str,
        feed_id: String,
        config: FeedConfig,
        coordinator: Arc<FeedCoordinator>,
        semaphore: Arc<Semaphore>,
        guard: RunGuard,
    ) -> Result<Job, PipelineError> {
        let job_feed_id = feed_id.clone();
        Job::new_async_tz(expr, chrono::Local, move |_uuid, _lock| {
            let feed_id = job_feed_id.clone();
            let config = config.clone();
            let coordinator = Arc::clone(&coordinator);
            let semaphore = Arc::clone(&semaphore);
            let guard = guard.clone();
            Box::pin(async move {
                // overlapping fires for the same feed collapse into one
                if !guard.begin(&feed_id) {
                    tracing::warn!(feed_id, "previous run still in flight, skipping this fire");
                    return;
                }

                let Ok(_permit) = semaphore.acquire_owned().await else {
                    guard.end(&feed_id);
                    return;
                };

                tracing::info!(feed_id, "starting scheduled feed processing job");
                let results = coordinator.process(&feed_id, &config).await;
                if results.overall_success {
                    tracing::info!(
                        job_id = job_id(&feed_id),
                        feed_id,
                        enqueued = results.total_enqueued(),
                        downloaded = results.total_downloaded(),
                        archived = results.total_archived(),
                        duration_seconds = results.total_duration_seconds,
                        "scheduled feed processing job completed successfully"
                    );
                } else {
                    tracing::error!(
                        job_id = job_id(&feed_id),
                        feed_id,
                        error_count = results.error_count(),
                        fatal_error = results.fatal_error.as_deref().unwrap_or(""),
                        "scheduled feed processing job completed with errors"
                    );
                }
                guard.end(&feed_id);
            })
        })
        .map_err(|err| {
            PipelineError::Scheduler(format!("invalid cron expression '{expr}': {err}"))
        })
    }

    /// Start dispatching jobs.
    ///
    /// # Errors
    /// Returns `PipelineError::Scheduler` when the underlying scheduler
    /// fails to start
    pub async fn start(&self) -> Result<(), PipelineError> {
        self.scheduler
            .start()
            .await
            .map_err(|err| PipelineError::Scheduler(err.to_string()))?;
        tracing::info!("feed scheduler started");
        Ok(())
    }

    /// Stop the scheduler; optionally drain in-flight jobs first.
    ///
    /// # Errors
    /// Returns `PipelineError::Scheduler` when shutdown fails
    pub async fn stop(&mut self, wait_for_jobs: bool) -> Result<(), PipelineError> {
        tracing::info!(wait_for_jobs, "stopping feed scheduler");
        self.scheduler
            .shutdown()
            .await
            .map_err(|err| PipelineError::Scheduler(err.to_string()))?;

        if wait_for_jobs {
            while !self.guard.is_idle() {
                tokio::time::sleep(STOP_POLL).await;
            }
        }
        tracing::info!("feed scheduler stopped");
        Ok(())
    }
}

fn job_id(feed_id: &str) -> String {
    format!("feed:{feed_id}")
}

/// The cron library wants six fields (with seconds); config accepts the
/// crontab-standard five and gets a `0` seconds field prepended.
fn normalize_cron(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("0 3 * * *", "0 0 3 * * *"; "five fields gain seconds")]
    #[test_case("*/30 0 3 * * *", "*/30 0 3 * * *"; "six fields unchanged")]
    fn normalizes_cron_expressions(input: &str, expected: &str) {
        assert_eq!(normalize_cron(input), expected);
    }

    #[test]
    fn job_ids_are_prefixed() {
        assert_eq!(job_id("f1"), "feed:f1");
    }
}
