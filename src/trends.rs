//! Trending titles.
//!
//! [`get_hot_searches`] asks a [`TrendSource`] for every category at once,
//! merges the lists, and keeps the highest-scoring items.
//!
//! [`JsonTrendSource`] reads one JSON document per category, from a local
//! file or an `http(s)` URL:
//!
//! ```json
//! [ { "title": "Movie X", "hot_score": "4,912,330" }, ... ]
//! ```
//!
//! A category with no configured location contributes nothing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TrendsConfig;
use crate::models::{lenient_score, Category, HotItem};
use crate::retry::RetryPolicy;
use crate::traits::TrendSource;

#[derive(Debug, Deserialize)]
struct TrendEntry {
    title: String,
    #[serde(alias = "score", deserialize_with = "lenient_score")]
    hot_score: u64,
}

pub struct JsonTrendSource {
    config: TrendsConfig,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl JsonTrendSource {
    pub fn new(config: &TrendsConfig, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for trend source")?;
        Ok(Self {
            config: config.clone(),
            client,
            retry,
        })
    }

    fn location(&self, category: Category) -> Option<&str> {
        match category {
            Category::Movie => self.config.movie.as_deref(),
            Category::TvSeries => self.config.tv_series.as_deref(),
            Category::Novel => self.config.novel.as_deref(),
        }
    }

    async fn read(&self, location: &str) -> Result<String> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let body = self
                .retry
                .run(
                    "trend fetch",
                    |_| async move {
                        self.client
                            .get(location)
                            .send()
                            .await?
                            .error_for_status()?
                            .text()
                            .await
                    },
                    |e: &reqwest::Error| !e.is_status() || e.status().is_some_and(|s| s.is_server_error()),
                )
                .await
                .with_context(|| format!("Failed to fetch trends from {}", location))?;
            Ok(body)
        } else {
            tokio::fs::read_to_string(location)
                .await
                .with_context(|| format!("Failed to read trends file: {}", location))
        }
    }
}

#[async_trait]
impl TrendSource for JsonTrendSource {
    async fn fetch(&self, category: Category) -> Result<Vec<HotItem>> {
        let Some(location) = self.location(category) else {
            debug!(%category, "no trend location configured");
            return Ok(Vec::new());
        };

        let raw = self.read(location).await?;
        let entries: Vec<TrendEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed trend document for {}", category))?;

        Ok(entries
            .into_iter()
            .filter(|e| !e.title.trim().is_empty())
            .map(|e| HotItem {
                title: e.title.trim().to_string(),
                hot_score: e.hot_score,
                category,
            })
            .collect())
    }
}

/// Fetch all categories concurrently, merge, sort by score descending, and
/// keep the first `top_n`. A failing category is logged and skipped.
pub async fn get_hot_searches(source: &dyn TrendSource, top_n: usize) -> Vec<HotItem> {
    let fetches = Category::ALL.iter().map(|&category| async move {
        (category, source.fetch(category).await)
    });

    let mut items: Vec<HotItem> = Vec::new();
    for (category, outcome) in join_all(fetches).await {
        match outcome {
            Ok(mut list) => {
                debug!(%category, count = list.len(), "trend category fetched");
                items.append(&mut list);
            }
            Err(e) => warn!(%category, err = %format!("{:#}", e), "trend category failed"),
        }
    }

    items.sort_by(|a, b| b.hot_score.cmp(&a.hot_score));
    items.truncate(top_n);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixed;

    #[async_trait]
    impl TrendSource for Fixed {
        async fn fetch(&self, category: Category) -> Result<Vec<HotItem>> {
            match category {
                Category::Movie => Ok(vec![
                    HotItem { title: "M1".into(), hot_score: 50, category },
                    HotItem { title: "M2".into(), hot_score: 300, category },
                ]),
                Category::TvSeries => Ok(vec![HotItem { title: "T1".into(), hot_score: 200, category }]),
                Category::Novel => anyhow::bail!("ranking unavailable"),
            }
        }
    }

    #[tokio::test]
    async fn merges_sorts_and_truncates() {
        let items = get_hot_searches(&Fixed, 2).await;
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["M2", "T1"]);
    }

    #[tokio::test]
    async fn reads_file_documents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("movie.json");
        std::fs::write(
            &path,
            r#"[{"title": " Movie X ", "hot_score": "4,912,330"}, {"title": "", "score": 1}]"#,
        )
        .unwrap();

        let config = TrendsConfig {
            movie: Some(path.display().to_string()),
            ..Default::default()
        };
        let source = JsonTrendSource::new(&config, RetryPolicy::default()).unwrap();

        let movies = source.fetch(Category::Movie).await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Movie X");
        assert_eq!(movies[0].hot_score, 4_912_330);
        assert!(source.fetch(Category::Novel).await.unwrap().is_empty());
    }
}
