//! Message search engine.
//!
//! Two modes over the configured groups, both fed by a [`MessageSource`]:
//!
//! - **Streaming** ([`Searcher::search_stream`]): reads every group newest
//!   first, keeps messages whose normalized text partially matches the query,
//!   saves each share link found in them, and yields results lazily until
//!   `max_results` is reached. Each link is cached under `query:link`.
//! - **Bulk** ([`Searcher::search_and_save`]): uses the source's own search
//!   filter, stops at the first link that saves *and* re-shares, and caches the
//!   whole (possibly empty) list under `query_limit`.
//!
//! Group failures are logged and the next group is searched. A failing link
//! never aborts a search.

use anyhow::Result;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::{bulk_key, stream_key, CachePayload, SearchCache};
use crate::config::{Config, SearchConfig};
use crate::drive::DriveClient;
use crate::export_source::ExportMessageSource;
use crate::fuzzy;
use crate::links::LinkExtractor;
use crate::models::{Message, SearchResult};
use crate::progress::{self, SearchProgressEvent, SearchProgressReporter, SCAN_REPORT_EVERY};
use crate::traits::{IterOptions, MessageSource};

/// Label lines that carry no description (link, group, and channel markers).
const LABEL_MARKERS: [&str; 3] = ["链接", "群组", "频道"];

/// Message text with empty lines and label lines removed.
pub fn describe(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !LABEL_MARKERS.iter().any(|m| line.contains(m)))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub groups: Vec<String>,
    pub max_results: usize,
    pub read_delay: Duration,
}

impl From<&SearchConfig> for SearchSettings {
    fn from(config: &SearchConfig) -> Self {
        Self {
            groups: config.groups.clone(),
            max_results: config.max_results,
            read_delay: Duration::from_millis(config.read_delay_ms),
        }
    }
}

pub struct Searcher {
    source: Arc<dyn MessageSource>,
    drive: Arc<DriveClient>,
    cache: Arc<SearchCache>,
    links: LinkExtractor,
    settings: SearchSettings,
    progress: Box<dyn SearchProgressReporter>,
}

/// One link from one matching message, waiting to be resolved.
struct Candidate {
    link: String,
    score: u8,
    group_title: String,
    message: Message,
}

struct GroupCursor<'a> {
    group: &'a str,
    title: String,
    messages: BoxStream<'a, std::result::Result<Message, crate::error::SourceError>>,
    scanned: u64,
    matched: u64,
}

struct StreamState<'a> {
    query: String,
    normalized_query: String,
    min_similarity: u8,
    groups: std::slice::Iter<'a, String>,
    current: Option<GroupCursor<'a>>,
    pending: VecDeque<Candidate>,
    found: usize,
}

impl Searcher {
    pub fn new(
        source: Arc<dyn MessageSource>,
        drive: Arc<DriveClient>,
        cache: Arc<SearchCache>,
        settings: SearchSettings,
    ) -> Self {
        let links = LinkExtractor::new(drive.share_host());
        Self {
            source,
            drive,
            cache,
            links,
            settings,
            progress: Box::new(progress::NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn SearchProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Lazily search every group for `query`.
    ///
    /// The stream ends once `max_results` results were yielded or all groups
    /// are exhausted. Dropping it stops reading the current group.
    pub fn search_stream(&self, query: &str, min_similarity: u8) -> BoxStream<'_, SearchResult> {
        let state = StreamState {
            query: query.to_string(),
            normalized_query: fuzzy::normalize(query),
            min_similarity,
            groups: self.settings.groups.iter(),
            current: None,
            pending: VecDeque::new(),
            found: 0,
        };

        stream::unfold(state, move |mut st| async move {
            loop {
                if st.found >= self.settings.max_results {
                    info!(max_results = self.settings.max_results, "result cap reached, search stopped");
                    return None;
                }

                if let Some(candidate) = st.pending.pop_front() {
                    if let Some(result) = self.resolve_candidate(&st.query, candidate).await {
                        st.found += 1;
                        return Some((result, st));
                    }
                    continue;
                }

                if st.current.is_none() {
                    let group = st.groups.next()?;
                    st.current = self.open_group(group).await;
                    continue;
                }
                let Some(cursor) = st.current.as_mut() else {
                    continue;
                };

                match cursor.messages.next().await {
                    None => {
                        self.finish_group(cursor);
                        st.current = None;
                    }
                    Some(Err(e)) => {
                        error!(group = cursor.group, err = %e, "cannot read group, skipping");
                        st.current = None;
                    }
                    Some(Ok(message)) => {
                        cursor.scanned += 1;
                        if cursor.scanned % SCAN_REPORT_EVERY == 0 {
                            self.progress.report(SearchProgressEvent::Scanned {
                                group: cursor.title.clone(),
                                n: cursor.scanned,
                            });
                        }
                        if !self.settings.read_delay.is_zero() {
                            tokio::time::sleep(self.settings.read_delay).await;
                        }

                        let found = self.match_message(&st.normalized_query, st.min_similarity, &message);
                        if let Some((score, links)) = found {
                            cursor.matched += 1;
                            for link in links {
                                st.pending.push_back(Candidate {
                                    link,
                                    score,
                                    group_title: cursor.title.clone(),
                                    message: message.clone(),
                                });
                            }
                        }
                    }
                }
            }
        })
        .boxed()
    }

    /// Bulk search: the first link that saves and re-shares wins.
    ///
    /// A non-empty cached list for the same `query` and `limit` is returned
    /// without touching the source or the drive.
    pub async fn search_and_save(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let key = bulk_key(query, limit);
        if let Some(cached) = self.cache.get_results(&key) {
            if !cached.is_empty() {
                debug!(query, hits = cached.len(), "bulk search served from cache");
                return cached;
            }
        }

        let lowered_query = query.to_lowercase();
        let mut results: Vec<SearchResult> = Vec::new();

        'groups: for group in &self.settings.groups {
            let title = match self.source.resolve_group(group).await {
                Ok(title) => title,
                Err(e) => {
                    warn!(group = group.as_str(), err = %e, "group unavailable, skipping");
                    continue;
                }
            };

            let opts = IterOptions {
                search: Some(query.to_string()),
                limit: Some(limit),
                reverse: false,
            };
            let mut messages = self.source.iter_messages(group, opts);

            while let Some(item) = messages.next().await {
                let message = match item {
                    Ok(message) => message,
                    Err(e) => {
                        error!(group = group.as_str(), err = %e, "cannot read group, skipping");
                        continue 'groups;
                    }
                };

                let links = self.links.extract(&message.text);
                if links.is_empty() {
                    continue;
                }
                let score = fuzzy::ratio(&lowered_query, &message.text.to_lowercase());

                for link in &links {
                    match self.drive.save_and_share(link).await {
                        Ok(republished) => {
                            self.progress.report(SearchProgressEvent::Saved {
                                title: query.to_string(),
                                link: link.clone(),
                            });
                            results.push(SearchResult {
                                title: query.to_string(),
                                similarity_score: score,
                                source_group_title: title.clone(),
                                original_text: describe(&message.text),
                                extracted_link: link.clone(),
                                share_url: Some(republished.share_url),
                                saved_file_id: Some(republished.file_id),
                                message_id: message.id,
                                timestamp: message.timestamp,
                            });
                            break 'groups;
                        }
                        Err(e) if e.is_expired_link() => {
                            debug!(link = link.as_str(), err = %e, "dead link skipped");
                            self.progress.report(SearchProgressEvent::SaveFailed {
                                link: link.clone(),
                                reason: e.to_string(),
                            });
                        }
                        Err(e) => {
                            error!(link = link.as_str(), err = %e, "save and share failed");
                            self.progress.report(SearchProgressEvent::SaveFailed {
                                link: link.clone(),
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        results.sort_by(|a, b| b.similarity_score.cmp(&a.similarity_score));
        self.cache.set(&key, CachePayload::List(results.clone()));
        results
    }

    async fn open_group<'a>(&'a self, group: &'a str) -> Option<GroupCursor<'a>> {
        match self.source.resolve_group(group).await {
            Ok(title) => {
                info!(group, title = title.as_str(), "searching group");
                self.progress.report(SearchProgressEvent::GroupStarted { group: title.clone() });
                Some(GroupCursor {
                    group,
                    title,
                    messages: self.source.iter_messages(group, IterOptions::default()),
                    scanned: 0,
                    matched: 0,
                })
            }
            Err(e) => {
                error!(group, err = %e, "cannot open group, skipping");
                None
            }
        }
    }

    fn finish_group(&self, cursor: &GroupCursor<'_>) {
        info!(
            group = cursor.group,
            scanned = cursor.scanned,
            matched = cursor.matched,
            "group search finished"
        );
        self.progress.report(SearchProgressEvent::GroupFinished {
            group: cursor.title.clone(),
            scanned: cursor.scanned,
            matched: cursor.matched,
        });
    }

    /// Similarity and links of a qualifying message, `None` otherwise.
    fn match_message(
        &self,
        normalized_query: &str,
        min_similarity: u8,
        message: &Message,
    ) -> Option<(u8, Vec<String>)> {
        if message.text.trim().is_empty() {
            return None;
        }
        let score = fuzzy::partial_ratio(normalized_query, &fuzzy::normalize(&message.text));
        if !fuzzy::meets_threshold(score, min_similarity) {
            return None;
        }
        let links = self.links.extract(&message.text);
        if links.is_empty() {
            return None;
        }
        Some((score, links))
    }

    /// Cache lookup, then the save step on a miss.
    async fn resolve_candidate(&self, query: &str, candidate: Candidate) -> Option<SearchResult> {
        let key = stream_key(query, &candidate.link);
        if let Some(hit) = self.cache.get_result(&key) {
            self.progress.report(SearchProgressEvent::CacheHit {
                link: candidate.link.clone(),
            });
            return Some(hit);
        }

        match self.drive.save(&candidate.link).await {
            Ok(saved) => {
                let result = SearchResult {
                    title: query.to_string(),
                    similarity_score: candidate.score,
                    source_group_title: candidate.group_title,
                    original_text: candidate.message.text,
                    extracted_link: candidate.link.clone(),
                    share_url: None,
                    saved_file_id: Some(saved.file_id),
                    message_id: candidate.message.id,
                    timestamp: candidate.message.timestamp,
                };
                self.cache.set(&key, CachePayload::Single(result.clone()));
                self.progress.report(SearchProgressEvent::Saved {
                    title: query.to_string(),
                    link: candidate.link,
                });
                Some(result)
            }
            Err(e) => {
                if e.is_expired_link() {
                    debug!(link = candidate.link.as_str(), err = %e, "dead link skipped");
                } else {
                    warn!(link = candidate.link.as_str(), err = %e, "save failed, skipping link");
                }
                self.progress.report(SearchProgressEvent::SaveFailed {
                    link: candidate.link,
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}

/// Wire a [`Searcher`] from configuration: HTTP drive client, export-file
/// message source, on-disk cache.
pub fn build_searcher(config: &Config, debug: bool) -> Result<Searcher> {
    let drive = DriveClient::new(config)?;
    let cache = SearchCache::load(config.cache.file(), config.cache.expire_days);
    let source = ExportMessageSource::new(&config.messages.export_dir);
    Ok(Searcher::new(
        Arc::new(source),
        Arc::new(drive),
        Arc::new(cache),
        SearchSettings::from(&config.search),
    )
    .with_progress(progress::reporter(debug)))
}

/// `harvest search`: run one query and print the results as JSON lines.
pub async fn run_search(
    config: &Config,
    query: &str,
    min_similarity: Option<u8>,
    bulk: bool,
    limit: Option<usize>,
    debug: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if config.search.groups.is_empty() {
        anyhow::bail!("no groups configured (set search.groups or TARGET_GROUPS)");
    }

    let searcher = build_searcher(config, debug)?;
    let mut printed = 0usize;

    if bulk {
        let limit = limit.unwrap_or(config.search.bulk_limit);
        for result in searcher.search_and_save(query, limit).await {
            println!("{}", serde_json::to_string(&result)?);
            printed += 1;
        }
    } else {
        let min_similarity = min_similarity.unwrap_or(config.search.min_similarity);
        let mut results = searcher.search_stream(query, min_similarity);
        while let Some(result) = results.next().await {
            println!("{}", serde_json::to_string(&result)?);
            printed += 1;
        }
    }

    if printed == 0 {
        println!("No results.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_drops_label_lines() {
        let text = "Movie X (2026)\n\n链接：https://pan.example.cn/s/abc\n主演: A, B\n群组：@films\n频道：@films_ch";
        assert_eq!(describe(text), "Movie X (2026)\n主演: A, B");
    }

    #[test]
    fn describe_of_only_labels_is_empty() {
        assert_eq!(describe("链接：x\n频道：y"), "");
    }

    #[test]
    fn settings_from_config() {
        let cfg = SearchConfig {
            groups: vec!["a".into()],
            max_results: 3,
            min_similarity: 70,
            bulk_limit: 10,
            read_delay_ms: 0,
        };
        let s = SearchSettings::from(&cfg);
        assert_eq!(s.max_results, 3);
        assert!(s.read_delay.is_zero());
    }
}
