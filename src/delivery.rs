//! Webhook delivery of run results.
//!
//! For every target, one `POST` to the configured webhook with body
//!
//! ```json
//! { "target": "group one", "generated_at": "...", "items": [ ... ] }
//! ```
//!
//! The webhook owns the formatting and the actual send to the chat group.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

use crate::models::CollectedItem;
use crate::retry::RetryPolicy;
use crate::traits::Delivery;

pub struct WebhookDelivery {
    client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl WebhookDelivery {
    pub fn new(url: &str, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for delivery")?;
        Ok(Self {
            client,
            url: url.to_string(),
            retry,
        })
    }

    async fn send_one(&self, target: &str, results: &[CollectedItem]) -> Result<(), reqwest::Error> {
        let body = json!({
            "target": target,
            "generated_at": Utc::now().to_rfc3339(),
            "items": results,
        });
        let body = &body;
        self.retry
            .run(
                "webhook delivery",
                |_| async move {
                    self.client
                        .post(&self.url)
                        .json(body)
                        .send()
                        .await?
                        .error_for_status()
                        .map(|_| ())
                },
                |e: &reqwest::Error| !e.is_status() || e.status().is_some_and(|s| s.is_server_error()),
            )
            .await
    }
}

#[async_trait]
impl Delivery for WebhookDelivery {
    async fn deliver(&self, results: &[CollectedItem], targets: &[String]) -> bool {
        let mut all_ok = true;
        for target in targets {
            match self.send_one(target, results).await {
                Ok(()) => info!(target = target.as_str(), items = results.len(), "results delivered"),
                Err(e) => {
                    error!(target = target.as_str(), err = %e, "delivery failed");
                    all_ok = false;
                }
            }
        }
        all_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable() -> WebhookDelivery {
        WebhookDelivery::new("http://127.0.0.1:9/hook", RetryPolicy::exponential(1, Duration::ZERO)).unwrap()
    }

    #[tokio::test]
    async fn no_targets_is_success() {
        assert!(unreachable().deliver(&[], &[]).await);
    }

    #[tokio::test]
    async fn unreachable_webhook_fails() {
        assert!(!unreachable().deliver(&[], &["ops".to_string()]).await);
    }
}
