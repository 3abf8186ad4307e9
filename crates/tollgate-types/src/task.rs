//! Scheduled task execution records.

use serde::{Deserialize, Serialize};

/// Terminal status of one sweep run.
///
/// A run completes even when individual channels fail; per-channel failures
/// only demote the run to `CompletedWithErrors`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Completed,
    CompletedWithErrors,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::CompletedWithErrors => "completed_with_errors",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(TaskStatus::Completed),
            "completed_with_errors" => Some(TaskStatus::CompletedWithErrors),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

/// Append-only execution record for one sweeper run. Never mutated after
/// completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskLog {
    pub task_name: String,
    pub status: TaskStatus,
    pub started_at: u64,
    pub completed_at: u64,
    pub duration_ms: u64,
    /// Channels examined by this run.
    pub checked_count: u64,
    /// Channels transitioned by this run (settled or expired).
    pub affected_count: u64,
    /// Per-channel outcome detail, JSON.
    pub detail: serde_json::Value,
}
