//! Batch lifecycle state machine.
//!
//! ```text
//! pending ──start──▶ processing ──▶ completed | failed
//! processing ──pause──▶ paused ──park──▶ resumable
//! paused | resumable ──resume──▶ processing
//! failed ──retry──▶ retrying ──▶ completed | failed
//! pending | processing | paused | resumable ──cancel──▶ cancelled
//! ```
//!
//! Every request is checked against the allowed source states; an invalid
//! request is rejected with that set rather than ignored.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Paused,
    Resumable,
    Completed,
    Failed,
    Retrying,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Paused => "paused",
            BatchStatus::Resumable => "resumable",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Retrying => "retrying",
            BatchStatus::Cancelled => "cancelled",
        }
    }

    /// The row loop keeps running only while the batch is in one of these.
    pub fn is_running(&self) -> bool {
        matches!(self, BatchStatus::Processing | BatchStatus::Retrying)
    }

    /// No further transitions and the uploaded file is no longer needed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Cancelled)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchStatus::Pending),
            "processing" => Ok(BatchStatus::Processing),
            "paused" => Ok(BatchStatus::Paused),
            "resumable" => Ok(BatchStatus::Resumable),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            "retrying" => Ok(BatchStatus::Retrying),
            "cancelled" => Ok(BatchStatus::Cancelled),
            other => Err(format!("unknown batch status '{other}'")),
        }
    }
}

/// A requested lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Start,
    Pause,
    /// Worker acknowledged a pause and flushed its cursor.
    Park,
    Resume,
    Retry,
    Cancel,
    Complete,
    Fail,
}

impl BatchAction {
    pub fn verb(&self) -> &'static str {
        match self {
            BatchAction::Start => "start",
            BatchAction::Pause => "pause",
            BatchAction::Park => "mark resumable",
            BatchAction::Resume => "resume",
            BatchAction::Retry => "retry",
            BatchAction::Cancel => "cancel",
            BatchAction::Complete => "complete",
            BatchAction::Fail => "fail",
        }
    }

    pub fn allowed_from(&self) -> &'static [BatchStatus] {
        use BatchStatus::*;
        match self {
            BatchAction::Start => &[Pending],
            BatchAction::Pause => &[Processing],
            BatchAction::Park => &[Paused],
            BatchAction::Resume => &[Paused, Resumable],
            BatchAction::Retry => &[Failed],
            BatchAction::Cancel => &[Pending, Processing, Paused, Resumable],
            BatchAction::Complete | BatchAction::Fail => &[Processing, Retrying],
        }
    }

    pub fn target(&self) -> BatchStatus {
        match self {
            BatchAction::Start | BatchAction::Resume => BatchStatus::Processing,
            BatchAction::Pause => BatchStatus::Paused,
            BatchAction::Park => BatchStatus::Resumable,
            BatchAction::Retry => BatchStatus::Retrying,
            BatchAction::Cancel => BatchStatus::Cancelled,
            BatchAction::Complete => BatchStatus::Completed,
            BatchAction::Fail => BatchStatus::Failed,
        }
    }
}

/// Validates `action` against `from`, returning the target status.
pub fn transition(from: BatchStatus, action: BatchAction) -> Result<BatchStatus, IngestError> {
    if action.allowed_from().contains(&from) {
        Ok(action.target())
    } else {
        Err(IngestError::InvalidTransition {
            action: action.verb(),
            from,
            allowed: action.allowed_from().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [BatchStatus; 8] = [
        BatchStatus::Pending,
        BatchStatus::Processing,
        BatchStatus::Paused,
        BatchStatus::Resumable,
        BatchStatus::Completed,
        BatchStatus::Failed,
        BatchStatus::Retrying,
        BatchStatus::Cancelled,
    ];

    #[test]
    fn test_pause_only_from_processing() {
        assert_eq!(
            transition(BatchStatus::Processing, BatchAction::Pause).unwrap(),
            BatchStatus::Paused
        );

        let err = transition(BatchStatus::Pending, BatchAction::Pause).unwrap_err();
        match err {
            IngestError::InvalidTransition { from, allowed, .. } => {
                assert_eq!(from, BatchStatus::Pending);
                assert_eq!(allowed, vec![BatchStatus::Processing]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resume_from_paused_or_resumable() {
        for status in ALL {
            let result = transition(status, BatchAction::Resume);
            let expected_ok = matches!(status, BatchStatus::Paused | BatchStatus::Resumable);
            assert_eq!(result.is_ok(), expected_ok, "resume from {status}");
        }
    }

    #[test]
    fn test_retry_only_from_failed() {
        assert_eq!(
            transition(BatchStatus::Failed, BatchAction::Retry).unwrap(),
            BatchStatus::Retrying
        );
        assert!(transition(BatchStatus::Completed, BatchAction::Retry).is_err());
        assert!(transition(BatchStatus::Processing, BatchAction::Retry).is_err());
    }

    #[test]
    fn test_cancel_is_terminal_and_not_repeatable() {
        for status in [
            BatchStatus::Pending,
            BatchStatus::Processing,
            BatchStatus::Paused,
            BatchStatus::Resumable,
        ] {
            assert_eq!(
                transition(status, BatchAction::Cancel).unwrap(),
                BatchStatus::Cancelled
            );
        }
        for status in [
            BatchStatus::Completed,
            BatchStatus::Failed,
            BatchStatus::Retrying,
        ] {
            assert!(transition(status, BatchAction::Cancel).is_err(), "cancel from {status}");
        }
        assert!(BatchStatus::Cancelled.is_terminal());
        assert!(transition(BatchStatus::Cancelled, BatchAction::Cancel).is_err());
        assert!(transition(BatchStatus::Cancelled, BatchAction::Resume).is_err());
    }

    #[test]
    fn test_finishing_requires_running_batch() {
        for status in ALL {
            let ok = transition(status, BatchAction::Complete).is_ok();
            assert_eq!(ok, status.is_running(), "complete from {status}");
            assert_eq!(transition(status, BatchAction::Fail).is_ok(), ok);
        }
    }

    #[test]
    fn test_status_strings_round_trip() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<BatchStatus>().unwrap(), status);
        }
        assert!("stuck".parse::<BatchStatus>().is_err());
    }
}
