//! Core data models used throughout the harvester.
//!
//! These types represent the trending items, chat messages, and search
//! results that flow through the acquisition pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Trend category a [`HotItem`] was ranked under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Movie,
    TvSeries,
    Novel,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Movie, Category::TvSeries, Category::Novel];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Movie => "movie",
            Category::TvSeries => "tv_series",
            Category::Novel => "novel",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trending title produced by a trend source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotItem {
    pub title: String,
    #[serde(deserialize_with = "lenient_score")]
    pub hot_score: u64,
    pub category: Category,
}

/// Ranking pages publish scores like `"4,912,330"`; accept those as well as
/// plain numbers.
pub(crate) fn lenient_score<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            digits
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid hot score: {:?}", s)))
        }
    }
}

/// A chat message read from a message source.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub source_group: String,
}

/// A message that matched a query and carried a usable share link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub similarity_score: u8,
    pub source_group_title: String,
    pub original_text: String,
    pub extracted_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_file_id: Option<String>,
    #[serde(default)]
    pub message_id: i64,
    pub timestamp: DateTime<Utc>,
}

/// One row of a pipeline run: a trending title and what was found for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedItem {
    pub title: String,
    pub summary: String,
    pub hot_score: u64,
    pub category: Category,
    pub search_results: Vec<SearchResult>,
}
