//! Search progress reporting.
//!
//! With `--debug`, the search engine narrates what it is doing: which group
//! is being scanned, how many messages have been read, and what happened to
//! each candidate link. Output goes to **stderr** so stdout stays clean for
//! results.

use std::io::Write;

/// A single progress event from the search engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchProgressEvent {
    GroupStarted { group: String },
    /// Emitted every [`SCAN_REPORT_EVERY`] messages.
    Scanned { group: String, n: u64 },
    GroupFinished { group: String, scanned: u64, matched: u64 },
    CacheHit { link: String },
    Saved { title: String, link: String },
    SaveFailed { link: String, reason: String },
}

pub const SCAN_REPORT_EVERY: u64 = 20;

/// Receives progress events. Implementations must not block for long.
pub trait SearchProgressReporter: Send + Sync {
    fn report(&self, event: SearchProgressEvent);
}

/// Human-friendly progress on stderr: "search films  scanned  1,240 messages".
pub struct StderrProgress;

impl SearchProgressReporter for StderrProgress {
    fn report(&self, event: SearchProgressEvent) {
        let line = match &event {
            SearchProgressEvent::GroupStarted { group } => format!("search {}  reading...\n", group),
            SearchProgressEvent::Scanned { group, n } => {
                format!("search {}  scanned  {} messages\n", group, format_number(*n))
            }
            SearchProgressEvent::GroupFinished {
                group,
                scanned,
                matched,
            } => format!(
                "search {}  done  {} scanned, {} matched\n",
                group,
                format_number(*scanned),
                format_number(*matched)
            ),
            SearchProgressEvent::CacheHit { link } => format!("  cached  {}\n", link),
            SearchProgressEvent::Saved { title, link } => format!("  saved   {}  {}\n", link, title),
            SearchProgressEvent::SaveFailed { link, reason } => {
                format!("  failed  {}  {}\n", link, reason)
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SearchProgressReporter for NoProgress {
    fn report(&self, _event: SearchProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Build the reporter for the `--debug` flag.
pub fn reporter(debug: bool) -> Box<dyn SearchProgressReporter> {
    if debug {
        Box::new(StderrProgress)
    } else {
        Box::new(NoProgress)
    }
}
