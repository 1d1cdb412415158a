//! Client-side wait loop for a dispatched generation.

use crate::models::{is_content_policy_error, CanonicalState, TaskStatusResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn status(&self, task_id: &str) -> Result<TaskStatusResponse>;
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            ceiling: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(TaskStatusResponse),
    Failed(String),
    Timeout,
    Cancelled,
}

/// Polls at a fixed interval until the task is terminal, the ceiling passes,
/// or `cancel` fires. The in-flight query is dropped on cancel or timeout.
pub async fn poll_until_terminal<S>(
    source: &S,
    task_id: &str,
    config: &PollerConfig,
    cancel: &CancellationToken,
) -> PollOutcome
where
    S: StatusSource + ?Sized,
{
    let deadline = tokio::time::sleep(config.ceiling);
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Polling for {} cancelled", task_id);
                return PollOutcome::Cancelled;
            }
            _ = &mut deadline => {
                tracing::warn!("Task {} not terminal after {:?}", task_id, config.ceiling);
                return PollOutcome::Timeout;
            }
            outcome = poll_once(source, task_id, &mut ticker) => {
                if let Some(outcome) = outcome {
                    return outcome;
                }
            }
        }
    }
}

async fn poll_once<S>(source: &S, task_id: &str, ticker: &mut Interval) -> Option<PollOutcome>
where
    S: StatusSource + ?Sized,
{
    ticker.tick().await;

    let status = match source.status(task_id).await {
        Ok(status) => status,
        Err(e) => {
            let message = format!("{:#}", e);
            if is_content_policy_error(&message) {
                return Some(PollOutcome::Failed(message));
            }
            tracing::warn!("Status query for {} failed: {}", task_id, message);
            return None;
        }
    };

    match status.state {
        CanonicalState::Completed => Some(PollOutcome::Completed(status)),
        CanonicalState::Failed => Some(PollOutcome::Failed(
            status.error.unwrap_or_else(|| "generation failed".to_string()),
        )),
        _ => match status.error {
            Some(error) if is_content_policy_error(&error) => Some(PollOutcome::Failed(error)),
            _ => {
                tracing::debug!("Task {} still {:?}", task_id, status.state);
                None
            }
        },
    }
}

/// Reads task status from a running gateway.
pub struct HttpStatusSource {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpStatusSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn status(&self, task_id: &str) -> Result<TaskStatusResponse> {
        let url = format!("{}/generate/{}", self.base_url, task_id);
        let response = self
            .client
            .get(&url)
            .query(&[("model", self.model.as_str())])
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("status query returned {}: {}", status, body);
        }

        response.json().await.context("Malformed task status")
    }
}
