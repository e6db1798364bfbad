//! Run result files.
//!
//! Every run that found something writes its items twice under the results
//! directory: a history file `results_<YYYYmmdd_HHMM>.json` and
//! `latest.json`, which is overwritten each time.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::CollectedItem;

pub struct ResultsStore {
    dir: PathBuf,
}

impl ResultsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join("latest.json")
    }

    /// Write the history file and `latest.json`; returns the history path.
    pub fn save(&self, items: &[CollectedItem]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create results dir: {}", self.dir.display()))?;

        let json = serde_json::to_string_pretty(items)?;
        let stamped = self
            .dir
            .join(format!("results_{}.json", Local::now().format("%Y%m%d_%H%M")));

        write(&stamped, &json)?;
        write(&self.latest_path(), &json)?;

        info!(path = %stamped.display(), items = items.len(), "results saved");
        Ok(stamped)
    }

    /// Items of the most recent run, if any run has been saved.
    #[cfg(test)]
    fn load_latest(&self) -> Result<Option<Vec<CollectedItem>>> {
        let path = self.latest_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(serde_json::from_str(&content).with_context(|| {
            format!("Malformed results file: {}", path.display())
        })?))
    }
}

fn write(path: &Path, json: &str) -> Result<()> {
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}
