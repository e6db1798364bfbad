//! Pipeline orchestrator.
//!
//! One run of `harvest run`:
//!
//! 1. Verify the drive account (fatal on failure).
//! 2. Fetch the trending titles.
//! 3. Bulk-search each title; titles with results become [`CollectedItem`]s.
//! 4. Persist the run and hand it to delivery.
//!
//! A failure on one title is logged and the run moves on.

use anyhow::Result;
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::SearchCache;
use crate::config::Config;
use crate::delivery::WebhookDelivery;
use crate::drive::DriveClient;
use crate::error::DriveError;
use crate::export_source::ExportMessageSource;
use crate::models::{CollectedItem, HotItem, SearchResult};
use crate::progress;
use crate::results::ResultsStore;
use crate::search::{describe, SearchSettings, Searcher};
use crate::traits::{Delivery, TrendSource};
use crate::trends::{get_hot_searches, JsonTrendSource};

/// Human-readable summary attached to each collected item.
pub fn format_summary(item: &HotItem, results: &[SearchResult], now: DateTime<Local>) -> String {
    let mut lines = vec![
        item.title.clone(),
        format!("hot score: {}", item.hot_score),
        format!("time: {}", now.format("%Y-%m-%d %H:%M")),
    ];
    if let Some(best) = results.first() {
        let description = describe(&best.original_text);
        if !description.is_empty() {
            lines.push(description);
        }
        if let Some(url) = &best.share_url {
            lines.push(url.clone());
        }
    }
    lines.join("\n")
}

pub struct Collector {
    drive: Arc<DriveClient>,
    trends: Arc<dyn TrendSource>,
    searcher: Searcher,
    results: ResultsStore,
    delivery: Option<Box<dyn Delivery>>,
    targets: Vec<String>,
    top_n: usize,
    bulk_limit: usize,
}

impl Collector {
    pub fn new(
        drive: Arc<DriveClient>,
        trends: Arc<dyn TrendSource>,
        searcher: Searcher,
        results: ResultsStore,
    ) -> Self {
        Self {
            drive,
            trends,
            searcher,
            results,
            delivery: None,
            targets: Vec::new(),
            top_n: 10,
            bulk_limit: 60,
        }
    }

    pub fn with_delivery(mut self, delivery: Box<dyn Delivery>, targets: Vec<String>) -> Self {
        self.delivery = Some(delivery);
        self.targets = targets;
        self
    }

    pub fn with_limits(mut self, top_n: usize, bulk_limit: usize) -> Self {
        self.top_n = top_n;
        self.bulk_limit = bulk_limit;
        self
    }

    /// Run the pipeline once. In test mode the run stops after the first
    /// title that produced results.
    pub async fn collect(&self, test_mode: bool) -> Result<Vec<CollectedItem>, DriveError> {
        self.drive.account_info().await?;

        let hot_items = get_hot_searches(self.trends.as_ref(), self.top_n).await;
        if hot_items.is_empty() {
            warn!("no trending titles, nothing to search");
            return Ok(Vec::new());
        }
        info!(count = hot_items.len(), "trending titles fetched");

        let mut collected = Vec::new();
        for item in &hot_items {
            let results = self.searcher.search_and_save(&item.title, self.bulk_limit).await;
            if results.is_empty() {
                info!(title = item.title.as_str(), "nothing found");
                continue;
            }

            collected.push(CollectedItem {
                title: item.title.clone(),
                summary: format_summary(item, &results, Local::now()),
                hot_score: item.hot_score,
                category: item.category,
                search_results: results,
            });

            if test_mode {
                break;
            }
        }

        if collected.is_empty() {
            info!("run finished, nothing found");
            return Ok(collected);
        }

        if let Err(e) = self.results.save(&collected) {
            error!(err = %format!("{:#}", e), "failed to save results");
        }

        match &self.delivery {
            Some(delivery) if !self.targets.is_empty() => {
                if delivery.deliver(&collected, &self.targets).await {
                    info!(targets = self.targets.len(), "results delivered");
                } else {
                    error!("delivery failed for at least one target");
                }
            }
            _ => {}
        }

        info!(items = collected.len(), "run finished");
        Ok(collected)
    }
}

/// `harvest run`: wire the collector from configuration and run it once.
pub async fn run_collect(config: &Config, test_mode: bool, debug: bool) -> Result<()> {
    let drive = Arc::new(DriveClient::new(config)?);
    let cache = Arc::new(SearchCache::load(config.cache.file(), config.cache.expire_days));
    let source = Arc::new(ExportMessageSource::new(&config.messages.export_dir));
    let searcher = Searcher::new(source, drive.clone(), cache, SearchSettings::from(&config.search))
        .with_progress(progress::reporter(debug));

    let trends = Arc::new(JsonTrendSource::new(&config.trends, config.drive.retry_policy())?);
    let mut collector = Collector::new(drive, trends, searcher, ResultsStore::new(&config.results.dir))
        .with_limits(config.trends.top_n, config.search.bulk_limit);

    if config.delivery.enabled {
        if let Some(url) = &config.delivery.webhook_url {
            let delivery = WebhookDelivery::new(url, config.drive.retry_policy())?;
            collector = collector.with_delivery(Box::new(delivery), config.delivery.targets.clone());
        }
    }

    let items = collector.collect(test_mode).await?;
    if items.is_empty() {
        println!("Nothing found.");
    } else {
        println!("Collected {} items.", items.len());
        for item in &items {
            println!("  {}  ({} results)", item.title, item.search_results.len());
        }
    }
    Ok(())
}
