//! Append-only run log
//!
//! Every reconciliation action and step outcome is appended as one JSON line
//! to `.sitelock/runs.log`. The provisioner never reads it back; it exists
//! for operator audit.

use crate::error::Result;
use crate::model::ResourceRef;
use crate::outcome::ActionType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const LOG_DIR: &str = ".sitelock";
const LOG_FILE: &str = "runs.log";

/// One line of the run log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    #[serde(flatten)]
    pub event: RunEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted { operation: String },
    StepStarted { step: String },
    StepCompleted { step: String, duration_ms: u64 },
    StepFailed { step: String, error: String },
    Resource { resource: String, action: ActionType },
    ResourceFailed { resource: String, error: String },
    RunCompleted { summary: String },
}

/// Append-only audit log for one run
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
    run_id: Uuid,
}

impl RunLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            run_id: Uuid::new_v4(),
        }
    }

    /// Log at `<root>/.sitelock/runs.log`
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(LOG_DIR).join(LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Append one event
    pub async fn append(&self, event: RunEvent) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).await?;
                tracing::debug!("Created run log directory: {}", dir.display());
            }
        }

        let entry = RunLogEntry {
            timestamp: Utc::now(),
            run_id: self.run_id,
            event,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Append an event; a write failure is reported but does not abort the run
    pub async fn record(&self, event: RunEvent) {
        if let Err(e) = self.append(event).await {
            tracing::warn!("Failed to write run log {}: {}", self.path.display(), e);
        }
    }

    pub async fn record_action(&self, resource: &ResourceRef, action: ActionType) {
        self.record(RunEvent::Resource {
            resource: resource.to_string(),
            action,
        })
        .await;
    }

    pub async fn record_failure(&self, resource: &ResourceRef, error: &crate::CloudError) {
        self.record(RunEvent::ResourceFailed {
            resource: resource.to_string(),
            error: error.to_string(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_creates_directory_and_lines() {
        let temp_dir = tempdir().unwrap();
        let log = RunLog::in_dir(temp_dir.path());

        log.append(RunEvent::StepStarted {
            step: "bucket".to_string(),
        })
        .await
        .unwrap();
        log.record_action(
            &ResourceRef::new(ResourceKind::Bucket, "site-assets"),
            ActionType::Create,
        )
        .await;

        let content = std::fs::read_to_string(log.path()).unwrap();
        let entries: Vec<RunLogEntry> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.run_id == log.run_id()));
        assert_eq!(
            entries[1].event,
            RunEvent::Resource {
                resource: "bucket:site-assets".to_string(),
                action: ActionType::Create,
            }
        );
    }

    #[tokio::test]
    async fn test_append_keeps_previous_runs() {
        let temp_dir = tempdir().unwrap();
        let first = RunLog::in_dir(temp_dir.path());
        let second = RunLog::in_dir(temp_dir.path());

        first
            .append(RunEvent::RunStarted {
                operation: "provision".into(),
            })
            .await
            .unwrap();
        second
            .append(RunEvent::RunStarted {
                operation: "unlock".into(),
            })
            .await
            .unwrap();

        let content = std::fs::read_to_string(first.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"event\":\"run_started\""));
    }
}
