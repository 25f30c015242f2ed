//! Execution history recording
//!
//! Fire-and-forget by contract: a recorder failure is logged and never
//! reaches the command path. Durable querying lives elsewhere; this side
//! just appends what happened.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

/// One completed (or ended) command execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub connection_id: String,
    pub target: String,
    pub command: String,
    pub outcome: String,
    pub recorded_at: String,
}

impl ExecutionRecord {
    pub fn new(
        connection_id: impl Into<String>,
        target: impl Into<String>,
        command: impl Into<String>,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            target: target.into(),
            command: command.into(),
            outcome: outcome.into(),
            recorded_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[async_trait]
pub trait ExecutionRecorder: Send + Sync + 'static {
    /// Persist one record. Must not fail the caller.
    async fn record_execution(&self, record: ExecutionRecord);
}

/// Appends records as JSON lines to a local file
pub struct JsonlRecorder {
    path: PathBuf,
}

impl JsonlRecorder {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ExecutionRecorder for JsonlRecorder {
    async fn record_execution(&self, record: ExecutionRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode execution record");
                return;
            }
        };

        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to append execution record"
            );
        }
    }
}

/// Recorder used when no history path is configured
pub struct NullRecorder;

#[async_trait]
impl ExecutionRecorder for NullRecorder {
    async fn record_execution(&self, _record: ExecutionRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let recorder = JsonlRecorder::new(path.clone());

        recorder
            .record_execution(ExecutionRecord::new("c1", "alpha", "deud all", "completed"))
            .await;
        recorder
            .record_execution(ExecutionRecord::new("c1", "alpha", "deud all", "cancelled"))
            .await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["target"], "alpha");
        assert_eq!(parsed["outcome"], "completed");
    }

    #[tokio::test]
    async fn test_write_failure_does_not_propagate() {
        // Directory path cannot be opened for append; the call must still
        // return normally.
        let dir = tempfile::tempdir().unwrap();
        let recorder = JsonlRecorder::new(dir.path().to_path_buf());
        recorder
            .record_execution(ExecutionRecord::new("c1", "alpha", "deud all", "completed"))
            .await;
    }
}
