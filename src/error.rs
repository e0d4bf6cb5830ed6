//! # Error Handling
//!
//! Unified error handling for the ingestion engine: the typed [`IngestError`]
//! raised internally, the issue taxonomy recorded in the batch error log, and
//! the structured [`OperationResult`] envelope every engine operation returns.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::ingest::state::BatchStatus;
use crate::models::batch_row_error;

/// Category of a logged issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    /// Row failed business rules before any write
    Validation,
    /// Failure during the transactional write of an accepted row
    Processing,
    /// Infrastructure failure, or an operator audit note
    System,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Validation => "validation",
            IssueType::Processing => "processing",
            IssueType::System => "system",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validation" => Ok(IssueType::Validation),
            "processing" => Ok(IssueType::Processing),
            "system" => Ok(IssueType::System),
            other => Err(format!("unknown issue type '{other}'")),
        }
    }
}

/// How much a logged issue matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// A single issue destined for the batch error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    pub row: i32,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub message: String,
    pub field: Option<String>,
}

impl RowIssue {
    pub fn validation_error(row: i32, field: &str, message: impl Into<String>) -> Self {
        Self {
            row,
            issue_type: IssueType::Validation,
            severity: Severity::Error,
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    pub fn validation_warning(row: i32, field: &str, message: impl Into<String>) -> Self {
        Self {
            row,
            issue_type: IssueType::Validation,
            severity: Severity::Warning,
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    pub fn processing(row: i32, message: impl Into<String>) -> Self {
        Self {
            row,
            issue_type: IssueType::Processing,
            severity: Severity::Error,
            message: message.into(),
            field: None,
        }
    }

    pub fn system(row: i32, message: impl Into<String>) -> Self {
        Self {
            row,
            issue_type: IssueType::System,
            severity: Severity::Error,
            message: message.into(),
            field: None,
        }
    }

    /// Batch-level audit note for an operator action or lifecycle transition.
    pub fn audit(message: impl Into<String>) -> Self {
        Self {
            row: 0,
            issue_type: IssueType::System,
            severity: Severity::Info,
            message: message.into(),
            field: None,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Errors raised by engine operations and the row pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("batch {0} not found")]
    BatchNotFound(Uuid),
    #[error(
        "cannot {action} a batch in status '{from}' (allowed from: {})",
        join_statuses(.allowed)
    )]
    InvalidTransition {
        action: &'static str,
        from: BatchStatus,
        allowed: Vec<BatchStatus>,
    },
    #[error("batch {batch_id} has no file attached")]
    FileNotAttached { batch_id: Uuid },
    #[error("stored file '{path}' no longer exists")]
    FileMissing { path: String },
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("{entity} with id {id} does not exist")]
    ReferenceNotFound { entity: &'static str, id: i32 },
    #[error("a product with slug '{slug}' already exists")]
    DuplicateProduct { slug: String },
    #[error("run {run} of batch {batch_id} was taken over by another worker")]
    RunSuperseded { batch_id: Uuid, run: i32 },
}

fn join_statuses(statuses: &[BatchStatus]) -> String {
    statuses
        .iter()
        .map(BatchStatus::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl IngestError {
    /// Machine-readable code (SCREAMING_SNAKE_CASE).
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::BatchNotFound(_) => "BATCH_NOT_FOUND",
            IngestError::InvalidTransition { .. } => "INVALID_TRANSITION",
            IngestError::FileNotAttached { .. } => "FILE_NOT_ATTACHED",
            IngestError::FileMissing { .. } => "FILE_NOT_FOUND",
            IngestError::Storage(_) => "STORAGE_ERROR",
            IngestError::Csv(_) => "CSV_ERROR",
            IngestError::Database(_) => "DATABASE_ERROR",
            IngestError::ReferenceNotFound { .. } => "REFERENCE_NOT_FOUND",
            IngestError::DuplicateProduct { .. } => "DUPLICATE_PRODUCT",
            IngestError::RunSuperseded { .. } => "RUN_SUPERSEDED",
        }
    }

    /// Where the error sits in the issue taxonomy.
    pub fn issue_type(&self) -> IssueType {
        match self {
            IngestError::InvalidTransition { .. } => IssueType::Validation,
            IngestError::ReferenceNotFound { .. } | IngestError::DuplicateProduct { .. } => {
                IssueType::Processing
            }
            _ => IssueType::System,
        }
    }
}

/// Error payload of a failed [`OperationResult`].
#[derive(Debug, Clone, Serialize)]
pub struct OperationError {
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Accumulated per-row errors, for batch-level failures
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub row_errors: Vec<batch_row_error::Model>,
}

impl OperationError {
    pub fn new<S: Into<String>>(code: S, message: S) -> Self {
        Self {
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            row_errors: Vec::new(),
        }
    }

    pub fn with_row_errors(mut self, row_errors: Vec<batch_row_error::Model>) -> Self {
        self.row_errors = row_errors;
        self
    }
}

impl From<&IngestError> for OperationError {
    fn from(error: &IngestError) -> Self {
        Self::new(error.code().to_string(), error.to_string())
    }
}

impl From<IngestError> for OperationError {
    fn from(error: IngestError) -> Self {
        Self::from(&error)
    }
}

/// Structured result returned by every engine operation instead of a bare error.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(error: impl Into<OperationError>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// A failure that still carries a payload, e.g. the final state of a failed batch.
    pub fn fail_with(data: T, error: OperationError) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(error),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_ref())
    }
}

impl<T> From<Result<T, IngestError>> for OperationResult<T> {
    fn from(result: Result<T, IngestError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::fail(error),
        }
    }
}

/// Detects unique-constraint conflicts across the supported backends.
pub fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::{RuntimeErr, SqlErr};

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    if matches!(error.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .is_some_and(|code| code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&&*code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message_lists_allowed_states() {
        let error = IngestError::InvalidTransition {
            action: "pause",
            from: BatchStatus::Pending,
            allowed: vec![BatchStatus::Processing],
        };

        assert_eq!(error.code(), "INVALID_TRANSITION");
        assert_eq!(
            error.to_string(),
            "cannot pause a batch in status 'pending' (allowed from: processing)"
        );
    }

    #[test]
    fn test_error_codes_and_taxonomy() {
        let missing = IngestError::FileMissing {
            path: "uploads/x.csv".to_string(),
        };
        assert_eq!(missing.code(), "FILE_NOT_FOUND");
        assert_eq!(missing.issue_type(), IssueType::System);

        let reference = IngestError::ReferenceNotFound {
            entity: "catalog",
            id: 7,
        };
        assert_eq!(reference.code(), "REFERENCE_NOT_FOUND");
        assert_eq!(reference.issue_type(), IssueType::Processing);
        assert_eq!(reference.to_string(), "catalog with id 7 does not exist");
    }

    #[test]
    fn test_operation_result_from_error() {
        let result: OperationResult<()> = Err(IngestError::BatchNotFound(Uuid::nil())).into();

        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.error_code(), Some("BATCH_NOT_FOUND"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "BATCH_NOT_FOUND");
        assert!(json["error"].get("row_errors").is_none());
    }

    #[test]
    fn test_operation_result_ok() {
        let result = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error_code().is_none());
    }

    #[test]
    fn test_issue_enums_round_trip_through_strings() {
        for ty in [IssueType::Validation, IssueType::Processing, IssueType::System] {
            assert_eq!(ty.as_str().parse::<IssueType>().unwrap(), ty);
        }
        for severity in [Severity::Info, Severity::Warning, Severity::Error] {
            assert_eq!(severity.as_str().parse::<Severity>().unwrap(), severity);
        }
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_record_not_found_is_not_unique_violation() {
        let err = sea_orm::DbErr::RecordNotFound("x".to_string());
        assert!(!is_unique_violation(&err));
    }
}
