//! Cron registration for the expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, info, warn};

use crate::application::handlers::billing::{SweepExpiredHandler, SweepReport};
use crate::config::SweeperConfig;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

/// Serializes sweeps within this process; an overlapping tick is skipped.
#[derive(Clone)]
struct SweepRunner {
    handler: Arc<SweepExpiredHandler>,
    running: Arc<Mutex<()>>,
}

impl SweepRunner {
    async fn run(&self, trigger: &'static str) -> Option<SweepReport> {
        let Ok(_guard) = self.running.try_lock() else {
            warn!(trigger, "Previous expiry sweep still running, skipping");
            return None;
        };
        debug!(trigger, "Starting expiry sweep");
        let report = self.handler.sweep().await;
        if !report.is_complete() {
            warn!(trigger, "Expiry sweep finished with failed steps");
        }
        Some(report)
    }
}

/// Handle to the running sweep schedule.
pub struct ExpirySweepScheduler {
    scheduler: JobScheduler,
    startup_run: JoinHandle<()>,
}

impl ExpirySweepScheduler {
    /// Registers the sweep on the configured cron and schedules the startup run.
    pub async fn start(
        handler: Arc<SweepExpiredHandler>,
        config: &SweeperConfig,
    ) -> Result<Self, SchedulerError> {
        let runner = SweepRunner {
            handler,
            running: Arc::new(Mutex::new(())),
        };

        let scheduler = JobScheduler::new().await?;
        let cron_runner = runner.clone();
        scheduler
            .add(Job::new_async(config.cron.as_str(), move |_uuid, _lock| {
                let runner = cron_runner.clone();
                Box::pin(async move {
                    runner.run("cron").await;
                })
            })?)
            .await?;
        scheduler.start().await?;
        info!(cron = %config.cron, "Scheduled expiry sweep");

        let delay = config.startup_delay();
        let startup_run = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            runner.run("startup").await;
        });
        info!(delay_secs = delay.as_secs(), "Startup expiry sweep pending");

        Ok(Self {
            scheduler,
            startup_run,
        })
    }

    /// Stops the schedule. A sweep already in flight runs to completion.
    pub async fn shutdown(mut self) -> Result<(), SchedulerError> {
        self.startup_run.abort();
        self.scheduler.shutdown().await?;
        info!("Expiry sweep scheduler stopped");
        Ok(())
    }
}
