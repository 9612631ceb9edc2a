use tasklane_shared::{ColumnId, SubtaskId, TaskId};
use uuid::Uuid;

use crate::remote::Table;

/// Failures reported by a [`crate::remote::RemoteStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("{table} row {id} not found")]
    NotFound { table: Table, id: Uuid },

    #[error("remote store rejected {op}: {reason}")]
    Rejected { op: &'static str, reason: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no authenticated user; sign in before creating tasks")]
    NotAuthenticated,

    #[error("task {0} is not loaded")]
    TaskNotFound(TaskId),

    #[error("subtask {0} does not belong to any loaded task")]
    SubtaskNotFound(SubtaskId),

    #[error("column {0} is not loaded")]
    ColumnNotFound(ColumnId),

    #[error("task {0} can only enter or leave the trash through the trash operations")]
    TrashStateChange(TaskId),

    #[error("invalid recurrence: {0}")]
    InvalidRecurrence(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl StoreError {
    pub fn is_remote(&self) -> bool {
        matches!(self, StoreError::Remote(_))
    }
}
