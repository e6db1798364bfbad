use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn harvest_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("harvest");
    path
}

const FILMS_EXPORT: &str = r#"{
  "name": "Films 1080p",
  "messages": [
    { "id": 1, "type": "message", "date": "2026-10-17T10:00:00", "text": "weekly chatter" },
    { "id": 2, "type": "service", "date": "2026-10-17T11:00:00", "text": "" },
    { "id": 3, "type": "message", "date": "2026-10-18T21:04:11",
      "text": ["Movie X 1080p ", { "type": "link", "text": "https://pan.example.cn/s/abc123" }] }
  ]
}"#;

fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let export_dir = root.join("exports");
    fs::create_dir_all(&export_dir).unwrap();
    fs::write(export_dir.join("films.json"), FILMS_EXPORT).unwrap();

    // Any request that escapes the cache hits a closed port.
    let config_content = format!(
        r#"[drive]
cookie = "__uid=test"
base_url = "http://127.0.0.1:9"
account_url = "http://127.0.0.1:9/account/info"
share_host = "pan.example.cn"
max_retries = 0
settle_ms = 0

[search]
groups = ["films"]
read_delay_ms = 0

[messages]
export_dir = "{root}/exports"

[cache]
dir = "{root}/cache"

[results]
dir = "{root}/results"
{extra}"#,
        root = root.display(),
        extra = extra,
    );

    let config_path = config_dir.join("harvest.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_harvest(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = harvest_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("DRIVE_COOKIE")
        .env_remove("TARGET_GROUPS")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run harvest binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn cache_file(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .and_then(Path::parent)
        .unwrap()
        .join("cache")
        .join("search_cache.json")
}

fn seed_cache(config_path: &Path, entries: Value) {
    let path = cache_file(config_path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, serde_json::to_string_pretty(&entries).unwrap()).unwrap();
}

fn cached_result(link: &str) -> Value {
    json!({
        "title": "Movie X",
        "similarity_score": 100,
        "source_group_title": "Films 1080p",
        "original_text": format!("Movie X 1080p {}", link),
        "extracted_link": link,
        "saved_file_id": "fid-cached",
        "message_id": 3,
        "timestamp": "2026-10-18T21:04:11Z"
    })
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_harvest(&tmp.path().join("nope.toml"), &["account"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr={}", stderr);
}

#[test]
fn test_invalid_similarity_rejected() {
    let (_tmp, config_path) = setup_test_env("");
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("read_delay_ms = 0", "read_delay_ms = 0\nmin_similarity = 101");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_harvest(&config_path, &["groups"]);
    assert!(!success);
    assert!(stderr.contains("min_similarity"), "stderr={}", stderr);
}

#[test]
fn test_account_without_cookie_fails() {
    let (_tmp, config_path) = setup_test_env("");
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("cookie = \"__uid=test\"\n", "");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_harvest(&config_path, &["account"]);
    assert!(!success);
    assert!(stderr.contains("no cookie configured"), "stderr={}", stderr);
}

#[test]
fn test_cookie_without_uid_fails() {
    let (_tmp, config_path) = setup_test_env("");
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("__uid=test", "kps=abc");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_harvest(&config_path, &["save", "https://pan.example.cn/s/abc123"]);
    assert!(!success);
    assert!(stderr.contains("__uid"), "stderr={}", stderr);
}

#[test]
fn test_groups_reports_status() {
    let (_tmp, config_path) = setup_test_env("");
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("groups = [\"films\"]", "groups = [\"@films\", \"gone\"]");
    fs::write(&config_path, content).unwrap();

    let (stdout, stderr, success) = run_harvest(&config_path, &["groups"]);
    assert!(success, "groups failed: stderr={}", stderr);

    let films = stdout.lines().find(|l| l.starts_with("@films")).unwrap();
    assert!(films.contains("OK"));
    assert!(films.contains("Films 1080p"));
    let gone = stdout.lines().find(|l| l.starts_with("gone")).unwrap();
    assert!(gone.contains("ERROR"));
    assert!(gone.contains("not found"));
}

#[test]
fn test_search_served_from_cache() {
    let (_tmp, config_path) = setup_test_env("");
    let link = "https://pan.example.cn/s/abc123";
    seed_cache(
        &config_path,
        json!({
            format!("Movie X:{}", link): {
                "timestampCreated": chrono::Utc::now().to_rfc3339(),
                "payload": cached_result(link)
            }
        }),
    );

    let (stdout, stderr, success) = run_harvest(&config_path, &["search", "Movie X"]);
    assert!(success, "search failed: stderr={}", stderr);

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1, "stdout={}", stdout);
    let result: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(result["extracted_link"], link);
    assert_eq!(result["saved_file_id"], "fid-cached");
}

#[test]
fn test_search_without_match() {
    let (_tmp, config_path) = setup_test_env("");
    let (stdout, stderr, success) = run_harvest(&config_path, &["search", "Completely Unrelated Title"]);
    assert!(success, "search failed: stderr={}", stderr);
    assert_eq!(stdout.trim(), "No results.");
}

#[test]
fn test_search_without_groups_fails() {
    let (_tmp, config_path) = setup_test_env("");
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("groups = [\"films\"]", "groups = []");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_harvest(&config_path, &["search", "Movie X"]);
    assert!(!success);
    assert!(stderr.contains("no groups configured"), "stderr={}", stderr);
}

#[test]
fn test_search_rejects_similarity_out_of_range() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, _, success) = run_harvest(&config_path, &["search", "Movie X", "--min-similarity", "150"]);
    assert!(!success);
}

#[test]
fn test_cache_prune_drops_expired() {
    let (_tmp, config_path) = setup_test_env("");
    let fresh = "https://pan.example.cn/s/fresh1";
    let stale = "https://pan.example.cn/s/stale1";
    seed_cache(
        &config_path,
        json!({
            format!("Movie X:{}", fresh): {
                "timestampCreated": chrono::Utc::now().to_rfc3339(),
                "payload": cached_result(fresh)
            },
            format!("Movie X:{}", stale): {
                "timestampCreated": "2020-01-01T00:00:00Z",
                "payload": cached_result(stale)
            }
        }),
    );

    let (stdout, stderr, success) = run_harvest(&config_path, &["cache", "prune"]);
    assert!(success, "prune failed: stderr={}", stderr);
    assert!(stdout.contains("1 live entries"), "stdout={}", stdout);

    let snapshot: Value = serde_json::from_str(&fs::read_to_string(cache_file(&config_path)).unwrap()).unwrap();
    let keys: Vec<&String> = snapshot.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec![&format!("Movie X:{}", fresh)]);
}

#[test]
fn test_corrupt_cache_is_reset() {
    let (_tmp, config_path) = setup_test_env("");
    let path = cache_file(&config_path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{ not json").unwrap();

    let (stdout, stderr, success) = run_harvest(&config_path, &["cache", "prune"]);
    assert!(success, "prune failed: stderr={}", stderr);
    assert!(stdout.contains("0 live entries"));
    assert_eq!(fs::read_to_string(&path).unwrap().trim(), "{}");
}

#[test]
fn test_log_file_receives_output() {
    let (tmp, config_path) = setup_test_env(&format!(
        "\n[logging]\nlevel = \"debug\"\nfile = \"{}/logs/harvest.log\"\n",
        "LOGROOT"
    ));
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("LOGROOT", &tmp.path().display().to_string());
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_harvest(&config_path, &["cache", "prune"]);
    assert!(success, "prune failed: stderr={}", stderr);
    assert!(tmp.path().join("logs").join("harvest.log").exists());
}
