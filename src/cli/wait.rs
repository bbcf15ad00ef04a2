//! Polling of asynchronous backend jobs for `--wait`.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::api::{ApiClient, ApiRequest};
use crate::error::CommandError;
use crate::request::{render_endpoint, RuntimeContext};

/// Placeholder for the job ID in the jobs endpoint template.
pub const JOB_ID_PLACEHOLDER: &str = "job_id";

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between two status requests.
    pub interval: Duration,
    /// Give up after this long.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Still queued or running.
    Pending,
    /// Finished successfully.
    Succeeded,
    /// Finished unsuccessfully.
    Failed,
}

impl JobState {
    /// Classifies a backend status string.
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "completed" | "succeeded" | "success" | "done" => Self::Succeeded,
            "failed" | "error" | "cancelled" | "canceled" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Extracts the job ID (`job_id` or `jobId`) from a response body.
#[must_use]
pub fn job_id(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let id = value.get("job_id").or_else(|| value.get("jobId"))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Polls the job until it reaches a terminal state, returning its last body.
///
/// # Errors
///
/// - [`CommandError::JobFailed`] if the job fails or does not finish within the timeout.
/// - Any error from rendering the endpoint or from the status requests.
pub async fn wait_for_job(
    client: &dyn ApiClient,
    ctx: &RuntimeContext,
    jobs_endpoint: &str,
    job_id: &str,
    settings: PollSettings,
) -> Result<Value, CommandError> {
    let path = render_endpoint(
        jobs_endpoint,
        ctx,
        HashMap::from([(JOB_ID_PLACEHOLDER, job_id.to_string())]),
    )?;
    let request = ApiRequest::get(ctx.url(&path));
    let deadline = tokio::time::Instant::now() + settings.timeout;

    loop {
        let response = client.send(&request).await?.error_for_status()?;
        let body: Value = serde_json::from_slice(&response.body).map_err(|e| {
            CommandError::Transport(format!("invalid job status response: {e}"))
        })?;
        let status = body.get("status").and_then(Value::as_str).unwrap_or_default();
        tracing::debug!(job_id, status, "Polled job");

        match JobState::from_status(status) {
            JobState::Succeeded => return Ok(body),
            JobState::Failed => {
                return Err(CommandError::JobFailed {
                    job_id: job_id.to_string(),
                    message: format!("finished with status '{status}'"),
                });
            }
            JobState::Pending => {}
        }

        if tokio::time::Instant::now() + settings.interval > deadline {
            return Err(CommandError::JobFailed {
                job_id: job_id.to_string(),
                message: format!("did not finish within {}s", settings.timeout.as_secs()),
            });
        }
        tokio::time::sleep(settings.interval).await;
    }
}
