//! TOML configuration.
//!
//! Every section except `[drive]` is optional and every field has a default.
//! Two environment variables override the file so secrets and group lists can
//! be supplied by the job runner:
//!
//! - `DRIVE_COOKIE` replaces `drive.cookie`
//! - `TARGET_GROUPS` (comma-separated) replaces `search.groups`

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub drive: DriveConfig,
    #[serde(default)]
    pub task: TaskConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub trends: TrendsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub results: ResultsConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriveConfig {
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_account_url")]
    pub account_url: String,
    #[serde(default = "default_share_host")]
    pub share_host: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_base_url() -> String {
    "https://drive-pc.quark.cn".to_string()
}
fn default_account_url() -> String {
    "https://pan.quark.cn/account/info".to_string()
}
fn default_share_host() -> String {
    "pan.quark.cn".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    1000
}
fn default_settle_ms() -> u64 {
    500
}

impl DriveConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_retries, Duration::from_millis(self.retry_base_ms))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaskConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_error_delay_ms")]
    pub error_delay_ms: u64,
    /// Re-queries allowed after failed task queries, across the whole poll.
    #[serde(default = "default_max_error_retries")]
    pub max_error_retries: u32,
    /// Wall-clock bound on one task; `0` disables it.
    #[serde(default = "default_task_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            error_delay_ms: default_error_delay_ms(),
            max_error_retries: default_max_error_retries(),
            timeout_secs: default_task_timeout_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}
fn default_error_delay_ms() -> u64 {
    1000
}
fn default_max_error_retries() -> u32 {
    5
}
fn default_task_timeout_secs() -> u64 {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default, deserialize_with = "comma_list")]
    pub groups: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: u8,
    #[serde(default = "default_bulk_limit")]
    pub bulk_limit: usize,
    #[serde(default = "default_read_delay_ms")]
    pub read_delay_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            max_results: default_max_results(),
            min_similarity: default_min_similarity(),
            bulk_limit: default_bulk_limit(),
            read_delay_ms: default_read_delay_ms(),
        }
    }
}

fn default_max_results() -> usize {
    100
}
fn default_min_similarity() -> u8 {
    60
}
fn default_bulk_limit() -> usize {
    60
}
fn default_read_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct MessagesConfig {
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
        }
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./data/messages")
}

/// Where each trend category is read from: a file path or an `http(s)` URL.
#[derive(Debug, Deserialize, Clone)]
pub struct TrendsConfig {
    #[serde(default)]
    pub movie: Option<String>,
    #[serde(default)]
    pub tv_series: Option<String>,
    #[serde(default)]
    pub novel: Option<String>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for TrendsConfig {
    fn default() -> Self {
        Self {
            movie: None,
            tv_series: None,
            novel: None,
            top_n: default_top_n(),
        }
    }
}

fn default_top_n() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_expire_days")]
    pub expire_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            expire_days: default_expire_days(),
        }
    }
}

impl CacheConfig {
    pub fn file(&self) -> PathBuf {
        self.dir.join("search_cache.json")
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}
fn default_expire_days() -> i64 {
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResultsConfig {
    #[serde(default = "default_results_dir")]
    pub dir: PathBuf,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            dir: default_results_dir(),
        }
    }
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("./results")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, deserialize_with = "comma_list")]
    pub targets: Vec<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Accept either `"a,b,c"` or `["a", "b", "c"]`.
fn comma_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        List(Vec<String>),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => split_list(&s),
        Raw::List(items) => items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    })
}

pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

impl Config {
    /// The configured cookie, or `None` when neither file nor env provides one.
    pub fn cookie(&self) -> Option<&str> {
        self.drive
            .cookie
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_env_overrides(&mut config);
    validate(&config)?;

    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(cookie) = std::env::var("DRIVE_COOKIE") {
        if !cookie.trim().is_empty() {
            config.drive.cookie = Some(cookie);
        }
    }
    if let Ok(groups) = std::env::var("TARGET_GROUPS") {
        let groups = split_list(&groups);
        if !groups.is_empty() {
            config.search.groups = groups;
        }
    }
}

/// A century; longer retention is indistinguishable from "never expire".
const MAX_EXPIRE_DAYS: i64 = 36_500;

pub fn validate(config: &Config) -> Result<()> {
    if config.drive.share_host.trim().is_empty() {
        anyhow::bail!("drive.share_host must not be empty");
    }

    if config.search.max_results < 1 {
        anyhow::bail!("search.max_results must be >= 1");
    }

    if config.search.min_similarity > 100 {
        anyhow::bail!("search.min_similarity must be in [0, 100]");
    }

    if !(1..=MAX_EXPIRE_DAYS).contains(&config.cache.expire_days) {
        anyhow::bail!("cache.expire_days must be in [1, {}]", MAX_EXPIRE_DAYS);
    }

    if config.delivery.enabled && config.delivery.webhook_url.is_none() {
        anyhow::bail!("delivery.webhook_url must be set when delivery is enabled");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Config {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse("[drive]\ncookie = \"__uid=1\"\n");
        assert_eq!(cfg.search.max_results, 100);
        assert_eq!(cfg.search.min_similarity, 60);
        assert_eq!(cfg.cache.expire_days, 7);
        assert_eq!(cfg.task.poll_interval_ms, 500);
        assert_eq!(cfg.trends.top_n, 10);
        assert_eq!(cfg.drive.share_host, "pan.quark.cn");
        assert!(!cfg.delivery.enabled);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn groups_accept_comma_string_and_list() {
        let a = parse("[drive]\n[search]\ngroups = \"alpha, beta,,gamma\"\n");
        assert_eq!(a.search.groups, vec!["alpha", "beta", "gamma"]);

        let b = parse("[drive]\n[search]\ngroups = [\"alpha\", \" beta \"]\n");
        assert_eq!(b.search.groups, vec!["alpha", "beta"]);
    }

    #[test]
    fn blank_cookie_is_none() {
        let cfg = parse("[drive]\ncookie = \"   \"\n");
        assert!(cfg.cookie().is_none());
    }

    #[test]
    fn expire_days_is_bounded() {
        assert!(validate(&parse("[drive]\n[cache]\nexpire_days = 36500\n")).is_ok());
        assert!(validate(&parse("[drive]\n[cache]\nexpire_days = 0\n")).is_err());
        assert!(validate(&parse("[drive]\n[cache]\nexpire_days = 1000000000\n")).is_err());
    }

    #[test]
    fn rejects_bad_similarity() {
        let cfg = parse("[drive]\n[search]\nmin_similarity = 101\n");
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn delivery_requires_webhook() {
        let cfg = parse("[drive]\n[delivery]\nenabled = true\ntargets = \"ops\"\n");
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn cache_file_lives_in_dir() {
        let cfg = parse("[drive]\n[cache]\ndir = \"/tmp/c\"\n");
        assert_eq!(cfg.cache.file(), PathBuf::from("/tmp/c/search_cache.json"));
    }
}
