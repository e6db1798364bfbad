//! Message source backed by chat-history exports.
//!
//! Each group is one JSON file under the export directory, named after the
//! group reference with any leading `@` removed (`@films` → `films.json`).
//! The layout is the one desktop chat clients write when exporting history:
//!
//! ```json
//! {
//!   "name": "Films 1080p",
//!   "messages": [
//!     { "id": 41, "type": "message", "date": "2026-10-18T21:04:11",
//!       "text": ["Movie X ", { "type": "link", "text": "https://pan.example.cn/s/abc" }] }
//!   ]
//! }
//! ```
//!
//! `text` may be a plain string or an array of plain strings and entity
//! objects; entities contribute their `text`. Service messages (any `type`
//! other than `message`) are skipped. Dates without an offset are read as UTC.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::SourceError;
use crate::models::Message;
use crate::traits::{IterOptions, MessageSource};

#[derive(Debug, Deserialize)]
struct ExportFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    id: i64,
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    date: String,
    #[serde(default)]
    text: ExportText,
}

fn default_kind() -> String {
    "message".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExportText {
    Plain(String),
    Parts(Vec<TextPart>),
}

impl Default for ExportText {
    fn default() -> Self {
        ExportText::Plain(String::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextPart {
    Plain(String),
    Entity { text: String },
}

impl ExportText {
    fn flatten(self) -> String {
        match self {
            ExportText::Plain(s) => s,
            ExportText::Parts(parts) => parts
                .into_iter()
                .map(|p| match p {
                    TextPart::Plain(s) => s,
                    TextPart::Entity { text } => text,
                })
                .collect(),
        }
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Reads groups from `<dir>/<group>.json`.
pub struct ExportMessageSource {
    dir: PathBuf,
}

impl ExportMessageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, group: &str) -> PathBuf {
        self.dir.join(format!("{}.json", group.trim().trim_start_matches('@')))
    }

    async fn read_export(&self, group: &str) -> Result<ExportFile, SourceError> {
        let path = self.path_for(group);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| map_io(e, group, &path))?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn load_messages(
        &self,
        group: &str,
        opts: &IterOptions,
    ) -> Result<Vec<Message>, SourceError> {
        let export = self.read_export(group).await?;
        let needle = opts.search.as_deref().map(str::to_lowercase);

        let mut messages: Vec<Message> = export
            .messages
            .into_iter()
            .filter(|m| m.kind == "message")
            .filter_map(|m| {
                let timestamp = parse_date(&m.date)?;
                Some(Message {
                    id: m.id,
                    text: m.text.flatten(),
                    timestamp,
                    source_group: group.to_string(),
                })
            })
            .filter(|m| match &needle {
                Some(n) => m.text.to_lowercase().contains(n.as_str()),
                None => true,
            })
            .collect();

        // exports are oldest-first
        messages.sort_by_key(|m| (m.timestamp, m.id));
        if !opts.reverse {
            messages.reverse();
        }
        if let Some(limit) = opts.limit {
            messages.truncate(limit);
        }
        Ok(messages)
    }
}

fn map_io(e: std::io::Error, group: &str, path: &Path) -> SourceError {
    match e.kind() {
        ErrorKind::NotFound => SourceError::GroupNotFound(format!("{} ({})", group, path.display())),
        ErrorKind::PermissionDenied => SourceError::PermissionDenied(group.to_string()),
        _ => SourceError::Io(e),
    }
}

#[async_trait]
impl MessageSource for ExportMessageSource {
    async fn resolve_group(&self, group: &str) -> Result<String, SourceError> {
        let export = self.read_export(group).await?;
        Ok(export
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| group.to_string()))
    }

    fn iter_messages<'a>(
        &'a self,
        group: &'a str,
        opts: IterOptions,
    ) -> BoxStream<'a, Result<Message, SourceError>> {
        stream::once(async move { self.load_messages(group, &opts).await })
            .map(|loaded| match loaded {
                Ok(messages) => stream::iter(messages.into_iter().map(Ok)).left_stream(),
                Err(e) => stream::iter(vec![Err(e)]).right_stream(),
            })
            .flatten()
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    const EXPORT: &str = r#"{
        "name": "Films 1080p",
        "messages": [
            {"id": 1, "type": "message", "date": "2026-10-01T10:00:00", "text": "old Movie X https://pan.example.cn/s/a1"},
            {"id": 2, "type": "service", "date": "2026-10-02T10:00:00", "text": ""},
            {"id": 3, "type": "message", "date": "2026-10-03T10:00:00",
             "text": ["Movie Y ", {"type": "link", "text": "https://pan.example.cn/s/b2"}]},
            {"id": 4, "type": "message", "date": "2026-10-04T10:00:00Z", "text": "new movie x remux"}
        ]
    }"#;

    fn source() -> (TempDir, ExportMessageSource) {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("films.json"), EXPORT).unwrap();
        let src = ExportMessageSource::new(tmp.path());
        (tmp, src)
    }

    #[tokio::test]
    async fn resolves_title_and_strips_at() {
        let (_tmp, src) = source();
        assert_eq!(src.resolve_group("@films").await.unwrap(), "Films 1080p");
    }

    #[tokio::test]
    async fn missing_group_is_not_found() {
        let (_tmp, src) = source();
        let err = src.resolve_group("nope").await.unwrap_err();
        assert!(matches!(err, SourceError::GroupNotFound(_)));

        let items: Vec<_> = src.iter_messages("nope", IterOptions::default()).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SourceError::GroupNotFound(_))));
    }

    #[tokio::test]
    async fn newest_first_and_skips_service() {
        let (_tmp, src) = source();
        let msgs: Vec<Message> = src
            .iter_messages("films", IterOptions::default())
            .try_collect()
            .await
            .unwrap();
        let ids: Vec<i64> = msgs.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 3, 1]);
        assert_eq!(msgs[1].text, "Movie Y https://pan.example.cn/s/b2");
    }

    #[tokio::test]
    async fn search_filter_and_limit() {
        let (_tmp, src) = source();
        let opts = IterOptions {
            search: Some("MOVIE X".into()),
            limit: Some(1),
            reverse: false,
        };
        let msgs: Vec<Message> = src.iter_messages("films", opts).try_collect().await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, 4);
    }

    #[tokio::test]
    async fn reverse_is_oldest_first() {
        let (_tmp, src) = source();
        let opts = IterOptions {
            reverse: true,
            ..Default::default()
        };
        let msgs: Vec<Message> = src.iter_messages("films", opts).try_collect().await.unwrap();
        assert_eq!(msgs.first().map(|m| m.id), Some(1));
    }

    #[test]
    fn parses_both_date_forms() {
        assert!(parse_date("2026-10-03T10:00:00").is_some());
        assert!(parse_date("2026-10-03T10:00:00+08:00").is_some());
        assert!(parse_date("yesterday").is_none());
    }
}
