//! Ingestion task lifecycle
//!
//! A task tracks one uploaded spreadsheet through
//! PENDING → PROCESSING → {COMPLETED, FAILED, CANCELLED}.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Created, pipeline not yet started
    Pending,
    /// Pipeline running
    Processing,
    /// Pipeline finished normally
    Completed,
    /// Unhandled pipeline error or unreadable file
    Failed,
    /// Cancelled by operator request
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TaskStatus::Pending),
            "PROCESSING" => Some(TaskStatus::Processing),
            "COMPLETED" => Some(TaskStatus::Completed),
            "FAILED" => Some(TaskStatus::Failed),
            "CANCELLED" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// One upload = one task. Created at upload time, mutated only by the
/// coordinator, soft-deleted only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionTask {
    pub task_id: Uuid,
    pub file_name: String,
    pub file_size: i64,
    /// SHA-256 of the uploaded bytes, hex encoded
    pub file_hash: String,
    /// Operator identifier carried into order numbering
    pub operator: String,
    /// Order channel (e.g. SPREADSHEET_IMPORT)
    pub channel: String,
    pub status: TaskStatus,
    pub error_message: Option<String>,
    /// Floor below which a row is rejected rather than queued for review
    pub min_confidence: f64,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub success_rows: i64,
    pub failed_rows: i64,
    pub manual_rows: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IngestionTask {
    pub fn new(
        file_name: String,
        file_size: i64,
        file_hash: String,
        operator: String,
        channel: String,
        min_confidence: f64,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            file_name,
            file_size,
            file_hash,
            operator,
            channel,
            status: TaskStatus::Pending,
            error_message: None,
            min_confidence,
            total_rows: 0,
            processed_rows: 0,
            success_rows: 0,
            failed_rows: 0,
            manual_rows: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Progress snapshot returned by the poll endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskProgress {
    pub total: u64,
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
    pub manual: u64,
    /// Percentage complete (0.0 - 100.0)
    pub percentage: f64,
}

impl TaskProgress {
    pub fn percentage_of(processed: u64, total: u64) -> f64 {
        if total > 0 {
            (processed as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_round_trip() {
        for s in [
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(TaskStatus::parse("BOGUS"), None);
    }
}
