//! `harvest groups`: show whether each configured group can be read.

use anyhow::Result;

use crate::config::Config;
use crate::export_source::ExportMessageSource;
use crate::traits::MessageSource;

/// One row of the groups table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStatus {
    pub group: String,
    pub ok: bool,
    /// Resolved title, or the failure reason.
    pub detail: String,
}

pub async fn group_statuses(source: &dyn MessageSource, groups: &[String]) -> Vec<GroupStatus> {
    let mut statuses = Vec::with_capacity(groups.len());
    for group in groups {
        let status = match source.resolve_group(group).await {
            Ok(title) => GroupStatus {
                group: group.clone(),
                ok: true,
                detail: title,
            },
            Err(e) => GroupStatus {
                group: group.clone(),
                ok: false,
                detail: e.to_string(),
            },
        };
        statuses.push(status);
    }
    statuses
}

pub async fn list_groups(config: &Config) -> Result<()> {
    if config.search.groups.is_empty() {
        println!("No groups configured (set search.groups or TARGET_GROUPS).");
        return Ok(());
    }

    let source = ExportMessageSource::new(&config.messages.export_dir);
    println!("{:<24} {:<8} TITLE", "GROUP", "STATUS");
    for status in group_statuses(&source, &config.search.groups).await {
        let label = if status.ok { "OK" } else { "ERROR" };
        println!("{:<24} {:<8} {}", status.group, label, status.detail);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reports_each_group() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("films.json"), r#"{"name": "Films", "messages": []}"#).unwrap();
        let source = ExportMessageSource::new(tmp.path());

        let statuses = group_statuses(&source, &["films".to_string(), "gone".to_string()]).await;
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].ok);
        assert_eq!(statuses[0].detail, "Films");
        assert!(!statuses[1].ok);
        assert!(statuses[1].detail.contains("not found"));
    }
}
