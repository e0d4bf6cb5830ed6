//! Counters owned by the batch worker while it walks a file.

use serde::Serialize;

use crate::models::batch_job;

/// Progress of one batch, threaded by value through the row loop.
///
/// `processed` never exceeds `total` and `cursor` only moves forward within
/// an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatchProgress {
    pub total: i32,
    pub processed: i32,
    pub success: i32,
    pub errors: i32,
    /// Index of the last fully processed row
    pub cursor: i32,
}

impl BatchProgress {
    /// Resumes from the counters persisted on the batch record.
    pub fn from_model(batch: &batch_job::Model) -> Self {
        Self {
            total: batch.total_records,
            processed: batch.processed_records,
            success: batch.success_count,
            errors: batch.error_count,
            cursor: batch.last_processed_row,
        }
        .clamped()
    }

    pub fn with_total(self, total: i32) -> Self {
        Self { total, ..self }.clamped()
    }

    /// Accounts for a row that produced a product.
    pub fn row_succeeded(self, row: i32) -> Self {
        Self {
            processed: self.processed + 1,
            success: self.success + 1,
            cursor: self.cursor.max(row),
            ..self
        }
        .clamped()
    }

    /// Accounts for a row that was rejected or failed to write.
    pub fn row_failed(self, row: i32) -> Self {
        Self {
            processed: self.processed + 1,
            errors: self.errors + 1,
            cursor: self.cursor.max(row),
            ..self
        }
        .clamped()
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    // The file can outgrow the count taken at start; total follows.
    fn clamped(self) -> Self {
        Self {
            total: self.total.max(self.processed),
            ..self
        }
    }
}
