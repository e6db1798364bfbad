//! Collaborator traits.
//!
//! The acquisition pipeline talks to the outside world through four seams.
//! Each one is a trait so the binary can wire real implementations while
//! tests plug in scripted, in-memory ones.
//!
//! ```text
//!   TrendSource ──▶ Collector ──▶ Delivery
//!                      │
//!                      ▼
//!   MessageSource ──▶ Searcher ──▶ DriveClient ──▶ DriveTransport
//!                      │
//!                      ▼
//!                 SearchCache
//! ```
//!
//! | Trait | Shipped implementation |
//! |---|---|
//! | [`DriveTransport`] | [`HttpTransport`](crate::drive::HttpTransport) |
//! | [`MessageSource`] | [`ExportMessageSource`](crate::export_source::ExportMessageSource) |
//! | [`TrendSource`] | [`JsonTrendSource`](crate::trends::JsonTrendSource) |
//! | [`Delivery`] | [`WebhookDelivery`](crate::delivery::WebhookDelivery) |

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Method;
use serde_json::Value;

use crate::error::{DriveError, SourceError};
use crate::models::{Category, CollectedItem, HotItem, Message};

// ═══════════════════════════════════════════════════════════════════════
// Drive transport
// ═══════════════════════════════════════════════════════════════════════

/// One call to the drive backend, before common parameters and headers are
/// attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Value of a query parameter, if set.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Sends a request to the drive backend and returns the decoded JSON body.
///
/// Implementations own retries for transport-level failures. Backend-level
/// failures (a non-zero `code` in the body) are not errors here; callers
/// inspect the body.
#[async_trait]
pub trait DriveTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Value, DriveError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Message source
// ═══════════════════════════════════════════════════════════════════════

/// Options for [`MessageSource::iter_messages`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterOptions {
    /// Native search filter applied by the source.
    pub search: Option<String>,
    /// Maximum number of messages to yield.
    pub limit: Option<usize>,
    /// Oldest-first instead of the default newest-first.
    pub reverse: bool,
}

/// A lazily read, possibly unbounded stream of chat messages per group.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Resolve a configured group reference to its display title.
    async fn resolve_group(&self, group: &str) -> std::result::Result<String, SourceError>;

    /// Iterate messages of `group`. Newest first unless `opts.reverse`.
    fn iter_messages<'a>(
        &'a self,
        group: &'a str,
        opts: IterOptions,
    ) -> BoxStream<'a, std::result::Result<Message, SourceError>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Trend source
// ═══════════════════════════════════════════════════════════════════════

/// Supplies the trending titles for one category.
#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn fetch(&self, category: Category) -> Result<Vec<HotItem>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Delivery
// ═══════════════════════════════════════════════════════════════════════

/// Hands a finished run to its recipients.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Returns `true` when every target accepted the results.
    async fn deliver(&self, results: &[CollectedItem], targets: &[String]) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_collects_params() {
        let req = ApiRequest::get("https://drive.example/task")
            .param("task_id", "t1")
            .param("retry_index", 3);
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.query_value("task_id"), Some("t1"));
        assert_eq!(req.query_value("retry_index"), Some("3"));
        assert_eq!(req.query_value("missing"), None);
        assert!(req.body.is_none());
    }
}
