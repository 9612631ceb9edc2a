//! Contract for the hosted datastore the task store synchronizes with.
//!
//! The store never talks to a database directly: it goes through
//! [`RemoteStore`], which exposes filtered selects with nested subtasks,
//! inserts returning the created row, partial updates and deletes by id or
//! id set, and a realtime change feed per table.

pub mod file;
pub mod memory;
mod realtime;
mod tables;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tasklane_shared::{
    ColumnId, ColumnPatch, KanbanColumn, NewColumn, NewRecurrence, NewSubtask, NewTask, Recurrence,
    RecurrenceId, Subtask, SubtaskId, SubtaskPatch, Task, TaskId, TaskPatch,
};
use tokio::sync::mpsc;
use uuid::Uuid;

pub use crate::error::RemoteError;
pub use realtime::RealtimeHub;
pub use tables::Tables;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Tasks,
    Subtasks,
    Recurrences,
    KanbanColumns,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Tasks => "tasks",
            Table::Subtasks => "subtasks",
            Table::Recurrences => "recurrences",
            Table::KanbanColumns => "kanban_columns",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which slice of the `tasks` table a select returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    /// Every status except `trash`, newest `created_at` first.
    Active,
    /// Only `trash`, newest `trash_date` first.
    Trash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskQuery {
    pub scope: TaskScope,
}

impl TaskQuery {
    pub fn active() -> Self {
        Self {
            scope: TaskScope::Active,
        }
    }

    pub fn trash() -> Self {
        Self {
            scope: TaskScope::Trash,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub id: Uuid,
}

/// Opaque handle for one realtime registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub(crate) u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// Receiving side of a realtime registration. The stream ends once the
/// channel is torn down with [`RemoteStore::unsubscribe`].
#[derive(Debug)]
pub struct ChangeFeed {
    pub channel: ChannelId,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select_tasks(&self, query: TaskQuery) -> Result<Vec<Task>, RemoteError>;

    async fn insert_task(&self, task: NewTask) -> Result<Task, RemoteError>;

    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, RemoteError>;

    async fn update_tasks(&self, ids: Vec<TaskId>, patch: TaskPatch) -> Result<(), RemoteError>;

    /// Removing a task also removes its subtasks.
    async fn delete_task(&self, id: TaskId) -> Result<(), RemoteError>;

    async fn delete_tasks(&self, ids: Vec<TaskId>) -> Result<(), RemoteError>;

    async fn insert_subtasks(&self, subtasks: Vec<NewSubtask>)
    -> Result<Vec<Subtask>, RemoteError>;

    async fn update_subtask(
        &self,
        id: SubtaskId,
        patch: SubtaskPatch,
    ) -> Result<Subtask, RemoteError>;

    async fn delete_subtask(&self, id: SubtaskId) -> Result<(), RemoteError>;

    async fn delete_subtasks_for_task(&self, task_id: TaskId) -> Result<(), RemoteError>;

    async fn insert_recurrence(&self, rule: NewRecurrence) -> Result<Recurrence, RemoteError>;

    async fn get_recurrence(&self, id: RecurrenceId) -> Result<Recurrence, RemoteError>;

    async fn select_columns(&self) -> Result<Vec<KanbanColumn>, RemoteError>;

    async fn insert_column(&self, column: NewColumn) -> Result<KanbanColumn, RemoteError>;

    async fn update_column(
        &self,
        id: ColumnId,
        patch: ColumnPatch,
    ) -> Result<KanbanColumn, RemoteError>;

    async fn delete_column(&self, id: ColumnId) -> Result<(), RemoteError>;

    async fn subscribe(&self, table: Table) -> Result<ChangeFeed, RemoteError>;

    /// Tears down a realtime channel. Unknown channels are ignored.
    fn unsubscribe(&self, channel: ChannelId);
}
