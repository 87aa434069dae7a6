use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{Result, SchedulerError};
use crate::registry::{Firing, JobRegistry};
use crate::types::{Job, Outcome};

/// Performs the outbound call for one firing.
///
/// Implementations never return an error: every failure is folded into
/// [`Outcome::Failure`] so that one job's trouble stays in its own status.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, job: &Job) -> Outcome;
}

/// Issues a single GET to the job URL with a bounded timeout. Any 2xx status
/// is a success; no retries and no body inspection.
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, job: &Job) -> Outcome {
        match self.client.get(&job.url).send().await {
            Ok(resp) if resp.status().is_success() => Outcome::Success,
            Ok(resp) => Outcome::Failure(format!("HTTP Status: {}", resp.status())),
            Err(e) => Outcome::Failure(e.to_string()),
        }
    }
}

/// Run one claimed firing to completion and record its outcome.
pub(crate) async fn run_firing(
    registry: Arc<JobRegistry>,
    executor: Arc<dyn Executor>,
    firing: Firing,
) {
    let outcome = executor.execute(&firing.job).await;
    match &outcome {
        Outcome::Success => {
            info!(tenant = %firing.tenant, job_id = %firing.job.id, fire_at = %firing.fire_at, "job succeeded")
        }
        Outcome::Failure(error) => {
            warn!(tenant = %firing.tenant, job_id = %firing.job.id, fire_at = %firing.fire_at, %error, "job failed")
        }
    }
    if !registry.record_outcome(&firing, &outcome) {
        debug!(tenant = %firing.tenant, job_id = %firing.job.id, "outcome superseded, not recorded");
    }
}
