//! Remote task polling.
//!
//! Save and share requests on the drive backend return a `task_id`; the
//! actual work finishes asynchronously. [`TaskPoller::poll`] queries the task
//! until it leaves the in-progress state.
//!
//! ```text
//!            status == 0            status == 2
//!   Pending ───────────▶ Pending    ───────────▶ Done
//!      │  retry_index += 1            other ───▶ Failed
//!      │
//!      └── non-zero code / transport error: spend one unit of the error
//!          budget, wait, re-query with the same retry_index
//! ```
//!
//! The whole loop is bounded by a wall-clock timeout when one is configured.

use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TaskConfig;
use crate::drive::{response_code, response_message};
use crate::error::DriveError;
use crate::retry::RetryPolicy;
use crate::traits::{ApiRequest, DriveTransport};

const STATUS_IN_PROGRESS: i64 = 0;
const STATUS_DONE: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Done,
    Failed,
}

impl TaskStatus {
    fn from_code(status: Option<i64>) -> Self {
        match status {
            Some(STATUS_IN_PROGRESS) => TaskStatus::Pending,
            Some(STATUS_DONE) => TaskStatus::Done,
            _ => TaskStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTask {
    pub task_id: String,
    pub retry_index: u32,
    pub status: TaskStatus,
}

/// Terminal state of a task plus the backend's `data` object for the caller
/// to inspect.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task: RemoteTask,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct TaskPoller {
    interval: Duration,
    errors: RetryPolicy,
    timeout: Option<Duration>,
}

impl TaskPoller {
    pub fn new(config: &TaskConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            // the first query plus `max_error_retries` re-queries
            errors: RetryPolicy::fixed(
                config.max_error_retries.saturating_add(1),
                Duration::from_millis(config.error_delay_ms),
            ),
            timeout: (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs)),
        }
    }

    /// Poll `task_id` until it reaches a terminal status.
    pub async fn poll(
        &self,
        transport: &dyn DriveTransport,
        base_url: &str,
        task_id: &str,
    ) -> Result<TaskOutcome, DriveError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.poll_loop(transport, base_url, task_id))
                .await
                .map_err(|_| {
                    warn!(task_id, limit_secs = limit.as_secs(), "task polling timed out");
                    DriveError::Task(format!(
                        "task {} still running after {}s",
                        task_id,
                        limit.as_secs()
                    ))
                })?,
            None => self.poll_loop(transport, base_url, task_id).await,
        }
    }

    async fn poll_loop(
        &self,
        transport: &dyn DriveTransport,
        base_url: &str,
        task_id: &str,
    ) -> Result<TaskOutcome, DriveError> {
        let url = format!("{}/1/clouddrive/task", base_url);
        let mut task = RemoteTask {
            task_id: task_id.to_string(),
            retry_index: 0,
            status: TaskStatus::Pending,
        };
        let mut failures: u32 = 0;

        loop {
            let request = ApiRequest::get(&url)
                .param("task_id", task_id)
                .param("retry_index", task.retry_index);

            let body = match transport.send(request).await {
                Ok(body) if response_code(&body) == 0 => body,
                Ok(body) => {
                    let reason = response_message(&body);
                    self.spend_error_budget(&mut failures, task_id, &reason).await?;
                    continue;
                }
                Err(e) => {
                    self.spend_error_budget(&mut failures, task_id, &e.to_string()).await?;
                    continue;
                }
            };

            let payload = body.get("data").cloned().unwrap_or(Value::Null);
            let status = payload.get("status").and_then(Value::as_i64);
            task.status = TaskStatus::from_code(status);

            if task.status == TaskStatus::Pending {
                debug!(task_id, retry_index = task.retry_index, "task in progress");
                task.retry_index += 1;
                tokio::time::sleep(self.interval).await;
                continue;
            }

            debug!(task_id, polls = task.retry_index + 1, status = ?task.status, "task finished");
            return Ok(TaskOutcome { task, payload });
        }
    }

    async fn spend_error_budget(
        &self,
        failures: &mut u32,
        task_id: &str,
        reason: &str,
    ) -> Result<(), DriveError> {
        *failures += 1;
        if *failures >= self.errors.max_attempts {
            warn!(task_id, failures = *failures, reason, "task query failed, giving up");
            return Err(DriveError::Task(format!(
                "task {} query failed {} times: {}",
                task_id, failures, reason
            )));
        }
        warn!(task_id, failures = *failures, reason, "task query failed, retrying");
        tokio::time::sleep(self.errors.delay_for(*failures - 1)).await;
        Ok(())
    }
}
