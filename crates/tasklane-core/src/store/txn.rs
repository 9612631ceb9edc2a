use tasklane_shared::{ColumnId, KanbanColumn, Task, TaskId, TaskStatus};
use tracing::debug;

use super::state::StoreState;

/// How the store converges after the remote write behind a transaction
/// fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
    /// Undo the recorded local changes.
    Rollback,
    /// Reload tasks from the remote store.
    Refetch,
    /// Reload tasks and columns.
    RefetchBoard,
}

/// One inverse step of an optimistic change, holding the exact prior value.
#[derive(Debug, Clone)]
pub(crate) enum Undo {
    RemoveActive(TaskId),
    RestoreActive { index: usize, task: Task },
    RemoveTrashed(TaskId),
    RestoreTrashed { index: usize, task: Task },
    SetStatus { id: TaskId, status: TaskStatus },
    RemoveColumn(ColumnId),
    RestoreColumn { index: usize, column: KanbanColumn },
}

/// Record of a speculative local mutation, committed or reverted once the
/// remote write settles.
#[derive(Debug)]
#[must_use = "a transaction must be settled"]
pub(crate) struct Transaction {
    label: &'static str,
    undo: Vec<Undo>,
}

impl Transaction {
    pub(crate) fn begin(label: &'static str) -> Self {
        Self {
            label,
            undo: Vec::new(),
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn record(&mut self, undo: Undo) {
        self.undo.push(undo);
    }

    pub(crate) fn commit(self) {
        debug!(op = self.label, steps = self.undo.len(), "optimistic change committed");
    }

    /// Applies the recorded steps newest-first.
    pub(crate) fn revert(self, state: &mut StoreState) {
        debug!(op = self.label, steps = self.undo.len(), "reverting optimistic change");
        for step in self.undo.into_iter().rev() {
            match step {
                Undo::RemoveActive(id) => state.tasks.retain(|task| task.id != id),
                Undo::RestoreActive { index, task } => match state.active_index(task.id) {
                    Some(existing) => state.tasks[existing] = task,
                    None => {
                        let index = index.min(state.tasks.len());
                        state.tasks.insert(index, task);
                    }
                },
                Undo::RemoveTrashed(id) => state.trash_tasks.retain(|task| task.id != id),
                Undo::RestoreTrashed { index, task } => match state.trash_index(task.id) {
                    Some(existing) => state.trash_tasks[existing] = task,
                    None => {
                        let index = index.min(state.trash_tasks.len());
                        state.trash_tasks.insert(index, task);
                    }
                },
                Undo::SetStatus { id, status } => {
                    if let Some(task) = state.active_mut(id) {
                        task.status = status;
                    }
                }
                Undo::RemoveColumn(id) => state.columns.retain(|column| column.id != id),
                Undo::RestoreColumn { index, column } => match state.column_index(column.id) {
                    Some(existing) => state.columns[existing] = column,
                    None => {
                        let index = index.min(state.columns.len());
                        state.columns.insert(index, column);
                    }
                },
            }
        }
    }

    /// Drops the record without touching state; a refetch takes over.
    pub(crate) fn abandon(self) {
        debug!(op = self.label, "optimistic change abandoned for refetch");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tasklane_shared::TaskPatch;
    use uuid::Uuid;

    use super::*;

    fn task(title: &str) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            status: TaskStatus::Todo,
            sector: vec!["general".to_string()],
            user_id: "u-1".to_string(),
            created_at: Utc::now(),
            trash_date: None,
            due_at: None,
            recurrence_id: None,
            details: None,
            subtasks: vec![],
            column_id: None,
            order: None,
        }
    }

    #[test]
    fn revert_restores_exact_prior_state() {
        let a = task("a");
        let b = task("b");
        let mut state = StoreState {
            tasks: vec![a.clone(), b.clone()],
            ..StoreState::default()
        };
        let before = state.clone();

        let mut txn = Transaction::begin("trash b");
        let original = state.tasks.remove(1);
        let mut trashed = original.clone();
        TaskPatch::trashed(Utc::now()).apply(&mut trashed);
        state.trash_tasks.insert(0, trashed);
        txn.record(Undo::RestoreActive {
            index: 1,
            task: original,
        });
        txn.record(Undo::RemoveTrashed(b.id));

        txn.revert(&mut state);
        assert_eq!(state, before);
    }

    #[test]
    fn status_undo_only_touches_the_status() {
        let mut a = task("a");
        a.details = Some("keep".to_string());
        let mut state = StoreState {
            tasks: vec![a.clone()],
            ..StoreState::default()
        };

        let mut txn = Transaction::begin("toggle");
        txn.record(Undo::SetStatus {
            id: a.id,
            status: TaskStatus::Todo,
        });
        state.tasks[0].status = TaskStatus::Done;

        txn.revert(&mut state);
        assert_eq!(state.tasks[0], a);
    }
}
