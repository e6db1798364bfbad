//! Remote drive client.
//!
//! Talks to the cloud-drive backend to copy a public share into the
//! account's own storage and publish it again under a fresh link.
//!
//! # Save
//!
//! 1. `/s/<pwd_id>` is parsed from the share URL.
//! 2. `sharepage/token` exchanges the id for a session `stoken`.
//! 3. `sharepage/detail` lists the shared entries.
//! 4. `sharepage/save` copies the first entry and returns a task id.
//! 5. The task is polled; the saved file id is `save_as.save_as_top_fids[0]`.
//!
//! # Share
//!
//! 1. `share` creates a share for the saved file and returns a task id.
//! 2. The task is polled; its payload carries the new `share_id`.
//! 3. `share/password` returns the public `pwd_id`.
//!
//! The client is stateless between calls. All HTTP goes through a
//! [`DriveTransport`]; [`HttpTransport`] is the reqwest implementation.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{Config, DriveConfig, TaskConfig};
use crate::error::DriveError;
use crate::links;
use crate::retry::RetryPolicy;
use crate::task::{TaskPoller, TaskStatus};
use crate::traits::{ApiRequest, DriveTransport};

const CODE_LOGIN_REQUIRED: i64 = 31001;
const CODE_LINK_EXPIRED: i64 = 41011;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ORIGIN: &str = "https://pan.quark.cn";

/// Backend `code` field; a missing code counts as a failure.
pub(crate) fn response_code(body: &Value) -> i64 {
    body.get("code").and_then(Value::as_i64).unwrap_or(-1)
}

pub(crate) fn response_message(body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string()
}

/// Reject cookies that cannot authenticate before any request is made.
pub fn check_cookie(cookie: Option<&str>) -> Result<&str, DriveError> {
    let cookie = cookie
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| DriveError::Auth("no cookie configured (set drive.cookie or DRIVE_COOKIE)".into()))?;
    if !cookie.contains("__uid") {
        return Err(DriveError::Auth("cookie is missing the __uid field".into()));
    }
    Ok(cookie)
}

// ═══════════════════════════════════════════════════════════════════════
// HTTP transport
// ═══════════════════════════════════════════════════════════════════════

/// reqwest-backed [`DriveTransport`] with browser-like headers, the
/// backend's common query parameters, and retry on transport failures.
pub struct HttpTransport {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(cookie: &str, config: &DriveConfig) -> Result<Self, DriveError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(cookie)
                .map_err(|_| DriveError::Auth("cookie contains invalid header characters".into()))?,
        );
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(header::ORIGIN, HeaderValue::from_static(ORIGIN));
        headers.insert(header::REFERER, HeaderValue::from_static("https://pan.quark.cn/"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DriveError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: config.retry_policy(),
        })
    }
}

/// Parameters every backend call carries.
fn common_params() -> Vec<(String, String)> {
    let now = Utc::now();
    vec![
        ("pr".to_string(), "ucpro".to_string()),
        ("fr".to_string(), "pc".to_string()),
        ("uc_param_str".to_string(), String::new()),
        ("__dt".to_string(), now.timestamp_millis().to_string()),
        ("__t".to_string(), now.timestamp().to_string()),
    ]
}

#[async_trait]
impl DriveTransport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, DriveError> {
        let mut query = request.query.clone();
        for (key, value) in common_params() {
            if !query.iter().any(|(k, _)| *k == key) {
                query.push((key, value));
            }
        }

        debug!(method = %request.method, url = %request.url, "drive request");

        let body: Value = self
            .retry
            .run(
                "drive request",
                |_| {
                    let mut builder = self
                        .client
                        .request(request.method.clone(), &request.url)
                        .query(&query);
                    if let Some(body) = &request.body {
                        builder = builder.json(body);
                    }
                    async move {
                        let response = builder
                            .send()
                            .await
                            .map_err(|e| DriveError::Transport(e.to_string()))?;
                        response
                            .json::<Value>()
                            .await
                            .map_err(|e| DriveError::Transport(format!("undecodable body: {}", e)))
                    }
                },
                |_| true,
            )
            .await?;

        if response_code(&body) == CODE_LOGIN_REQUIRED {
            error!(url = %request.url, "backend requires login, cookie rejected");
        }
        Ok(body)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Drive client
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub nickname: String,
}

/// A file copied into the account's storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub file_id: String,
}

/// A freshly published share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedLink {
    pub share_id: String,
    pub pwd_id: String,
    pub url: String,
}

/// Result of the full save-then-share workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Republished {
    pub file_id: String,
    pub share_url: String,
}

pub struct DriveClient {
    transport: Arc<dyn DriveTransport>,
    base_url: String,
    account_url: String,
    share_host: String,
    poller: TaskPoller,
    settle: Duration,
}

impl DriveClient {
    /// Build a client over HTTP. Fails with [`DriveError::Auth`] when the
    /// configured cookie cannot authenticate.
    pub fn new(config: &Config) -> Result<Self, DriveError> {
        let cookie = check_cookie(config.cookie())?;
        let transport = HttpTransport::new(cookie, &config.drive)?;
        Ok(Self::with_transport(Arc::new(transport), &config.drive, &config.task))
    }

    pub fn with_transport(
        transport: Arc<dyn DriveTransport>,
        drive: &DriveConfig,
        task: &TaskConfig,
    ) -> Self {
        Self {
            transport,
            base_url: drive.base_url.trim_end_matches('/').to_string(),
            account_url: drive.account_url.clone(),
            share_host: drive.share_host.clone(),
            poller: TaskPoller::new(task),
            settle: Duration::from_millis(drive.settle_ms),
        }
    }

    pub fn share_host(&self) -> &str {
        &self.share_host
    }

    /// Fetch the account identity; proves the cookie is live.
    pub async fn account_info(&self) -> Result<AccountInfo, DriveError> {
        let request = ApiRequest::get(&self.account_url)
            .param("fr", "pc")
            .param("platform", "pc");
        let body = self.transport.send(request).await?;

        let nickname = body
            .get("data")
            .and_then(|d| d.get("nickname"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DriveError::Auth(format!("account lookup rejected: {}", response_message(&body)))
            })?;

        info!(nickname, "drive account verified");
        Ok(AccountInfo {
            nickname: nickname.to_string(),
        })
    }

    /// Copy the content behind `share_url` into the account's root folder.
    pub async fn save(&self, share_url: &str) -> Result<SavedFile, DriveError> {
        let pwd_id = links::share_id(share_url)
            .ok_or_else(|| DriveError::InvalidLink(share_url.to_string()))?;

        let stoken = self.share_token(pwd_id).await?;

        let detail = self
            .transport
            .send(
                ApiRequest::get(self.api("/1/clouddrive/share/sharepage/detail"))
                    .param("pwd_id", pwd_id)
                    .param("stoken", &stoken)
                    .param("pdir_fid", "0")
                    .param("force", "0")
                    .param("_page", 1)
                    .param("_size", 50)
                    .param("_fetch_total", 1)
                    .param("_sort", "file_type:asc,updated_at:desc"),
            )
            .await?;
        if response_code(&detail) != 0 {
            return Err(DriveError::List(response_message(&detail)));
        }
        let first = detail
            .pointer("/data/list/0")
            .ok_or_else(|| DriveError::List(format!("share {} has no files", pwd_id)))?;
        let fid = str_field(first, "fid").ok_or_else(|| DriveError::List("entry without fid".into()))?;
        let fid_token = str_field(first, "share_fid_token")
            .ok_or_else(|| DriveError::List("entry without share_fid_token".into()))?;

        let saved = self
            .transport
            .send(ApiRequest::post(
                self.api("/1/clouddrive/share/sharepage/save"),
                json!({
                    "fid_list": [fid],
                    "fid_token_list": [fid_token],
                    "to_pdir_fid": "0",
                    "pwd_id": pwd_id,
                    "stoken": stoken,
                    "pdir_fid": "0",
                    "scene": "link",
                }),
            ))
            .await?;
        if response_code(&saved) != 0 {
            return Err(DriveError::Save(response_message(&saved)));
        }
        let task_id = saved
            .pointer("/data/task_id")
            .and_then(Value::as_str)
            .ok_or_else(|| DriveError::Save("response carried no task_id".into()))?;

        let outcome = self.poller.poll(self.transport.as_ref(), &self.base_url, task_id).await?;
        let file_id = outcome
            .payload
            .pointer("/save_as/save_as_top_fids/0")
            .and_then(Value::as_str)
            .ok_or_else(|| DriveError::Task(format!("save task {} produced no file id", task_id)))?;

        debug!(source_fid = fid, file_id, "share saved");
        Ok(SavedFile {
            file_id: file_id.to_string(),
        })
    }

    /// Publish an owned file under a new public link.
    pub async fn share(&self, file_id: &str) -> Result<SharedLink, DriveError> {
        let created = self
            .transport
            .send(ApiRequest::post(
                self.api("/1/clouddrive/share"),
                json!({
                    "fid_list": [file_id],
                    "expired_type": "1",
                    "share_channel": "web",
                    "share_from": "pc_web",
                    "scene": "link",
                    "title": "",
                    "passcode": "",
                    "url_type": 1,
                }),
            ))
            .await?;
        if response_code(&created) != 0 {
            return Err(DriveError::Share(response_message(&created)));
        }
        let task_id = created
            .pointer("/data/task_id")
            .and_then(Value::as_str)
            .ok_or_else(|| DriveError::Share("response carried no task_id".into()))?;

        let outcome = self.poller.poll(self.transport.as_ref(), &self.base_url, task_id).await?;
        if outcome.task.status != TaskStatus::Done {
            debug!(task_id, status = ?outcome.task.status, "share task ended without success status");
        }
        let share_id = str_field(&outcome.payload, "share_id")
            .ok_or_else(|| DriveError::Task(format!("share task {} produced no share_id", task_id)))?
            .to_string();

        tokio::time::sleep(self.settle * 2).await;

        let password = self
            .transport
            .send(ApiRequest::post(
                self.api("/1/clouddrive/share/password"),
                json!({ "share_id": share_id, "scene": "link" }),
            ))
            .await?;
        if response_code(&password) != 0 {
            return Err(DriveError::Password(response_message(&password)));
        }
        let pwd_id = password
            .pointer("/data/pwd_id")
            .and_then(Value::as_str)
            .ok_or_else(|| DriveError::Password("response carried no pwd_id".into()))?
            .to_string();

        Ok(SharedLink {
            url: format!("https://{}/s/{}", self.share_host, pwd_id),
            share_id,
            pwd_id,
        })
    }

    /// [`save`](Self::save) then [`share`](Self::share). The first failure is
    /// returned unchanged; a file saved but not shared stays in the drive.
    pub async fn save_and_share(&self, share_url: &str) -> Result<Republished, DriveError> {
        let saved = self.save(share_url).await?;

        tokio::time::sleep(self.settle).await;

        let shared = self.share(&saved.file_id).await.map_err(|e| {
            warn!(file_id = %saved.file_id, err = %e, "file saved but not shared, left in drive");
            e
        })?;

        info!(source = share_url, share_url = %shared.url, "link republished");
        Ok(Republished {
            file_id: saved.file_id,
            share_url: shared.url,
        })
    }

    async fn share_token(&self, pwd_id: &str) -> Result<String, DriveError> {
        let body = self
            .transport
            .send(ApiRequest::post(
                self.api("/1/clouddrive/share/sharepage/token"),
                json!({ "pwd_id": pwd_id, "passcode": "" }),
            ))
            .await?;

        let status = body.get("status").and_then(Value::as_i64);
        if response_code(&body) == CODE_LINK_EXPIRED || status == Some(404) {
            return Err(DriveError::Expired(response_message(&body)));
        }
        if status != Some(200) {
            return Err(DriveError::Token(response_message(&body)));
        }
        body.pointer("/data/stoken")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DriveError::Token("response carried no stoken".into()))
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// `harvest account`: verify the cookie and print the account nickname.
pub async fn run_account(config: &Config) -> anyhow::Result<()> {
    let client = DriveClient::new(config)?;
    let account = client.account_info().await?;
    println!("Logged in as {}", account.nickname);
    Ok(())
}

/// `harvest save`: save one share link, optionally publishing a new share.
pub async fn run_save(config: &Config, url: &str, share: bool) -> anyhow::Result<()> {
    let client = DriveClient::new(config)?;
    if share {
        let republished = client.save_and_share(url).await?;
        println!("Saved file {}", republished.file_id);
        println!("Shared at {}", republished.share_url);
    } else {
        let saved = client.save(url).await?;
        println!("Saved file {}", saved.file_id);
    }
    Ok(())
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_checks() {
        assert!(matches!(check_cookie(None), Err(DriveError::Auth(_))));
        assert!(matches!(check_cookie(Some("  ")), Err(DriveError::Auth(_))));
        assert!(matches!(check_cookie(Some("kps=1; sign=2")), Err(DriveError::Auth(_))));
        assert_eq!(check_cookie(Some(" __uid=abc; kps=1 ")).unwrap(), "__uid=abc; kps=1");
    }

    #[test]
    fn response_helpers() {
        assert_eq!(response_code(&json!({"code": 0})), 0);
        assert_eq!(response_code(&json!({"status": 200})), -1);
        assert_eq!(response_message(&json!({"message": "ok"})), "ok");
        assert_eq!(response_message(&json!({})), "no message");
    }

    #[test]
    fn common_params_are_complete() {
        let params = common_params();
        let keys: Vec<&str> = params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["pr", "fr", "uc_param_str", "__dt", "__t"]);
    }

    #[test]
    fn expiry_does_not_depend_on_message_text() {
        assert!(DriveError::Expired("gone".into()).is_expired_link());
        assert!(!DriveError::Token("link expired, said the backend".into()).is_expired_link());
    }
}
