use tasklane_shared::{ColumnId, ColumnPatch, KanbanColumn, NewColumn, TaskId, TaskPatch};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::TaskStore;
use super::txn::{Recovery, Transaction, Undo};
use crate::board;
use crate::error::{RemoteError, StoreError};

impl TaskStore {
    /// Replaces the local column list. A read failure keeps the old one.
    #[instrument(skip(self))]
    pub async fn fetch_columns(&self) -> Result<(), StoreError> {
        match self.remote().select_columns().await {
            Ok(columns) => {
                let columns = board::sorted_columns(&columns);
                debug!(count = columns.len(), "columns replaced");
                self.inner.state.lock().columns = columns;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "column fetch failed; keeping previous columns");
                Err(err.into())
            }
        }
    }

    /// Appends a column after the last one.
    #[instrument(skip(self, color, icon))]
    pub async fn add_column(
        &self,
        title: String,
        color: String,
        icon: Option<String>,
    ) -> Result<KanbanColumn, StoreError> {
        let user_id = self
            .inner
            .identity
            .current_user_id()
            .ok_or(StoreError::NotAuthenticated)?;

        let temp_id = Uuid::new_v4();
        let new = {
            let mut state = self.inner.state.lock();
            let order = state.next_column_order();
            state.columns.push(KanbanColumn {
                id: temp_id,
                title: title.clone(),
                color: color.clone(),
                icon: icon.clone(),
                order,
                user_id: user_id.clone(),
                created_at: self.now(),
            });
            NewColumn {
                user_id,
                title,
                color,
                icon,
                order,
            }
        };
        let mut txn = Transaction::begin("add_column");
        txn.record(Undo::RemoveColumn(temp_id));

        let result = self.remote().insert_column(new).await;
        let created = self.settle(txn, result, Recovery::Rollback).await?;

        {
            let mut state = self.inner.state.lock();
            match state.column_index(temp_id) {
                Some(index) => state.columns[index] = created.clone(),
                None => state.columns.push(created.clone()),
            }
        }
        info!(id = %created.id, title = %created.title, "column added");
        Ok(created)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_column(
        &self,
        id: ColumnId,
        patch: ColumnPatch,
    ) -> Result<KanbanColumn, StoreError> {
        let txn = {
            let mut state = self.inner.state.lock();
            let index = state.column_index(id).ok_or(StoreError::ColumnNotFound(id))?;
            let original = state.columns[index].clone();
            patch.apply(&mut state.columns[index]);

            let mut txn = Transaction::begin("update_column");
            txn.record(Undo::RestoreColumn {
                index,
                column: original,
            });
            txn
        };

        let result = self.remote().update_column(id, patch).await;
        self.settle(txn, result, Recovery::Rollback).await
    }

    /// Removes a column. Its cards lose their column reference, which puts
    /// them in the first remaining column.
    #[instrument(skip(self))]
    pub async fn delete_column(&self, id: ColumnId) -> Result<(), StoreError> {
        let orphaned: Vec<TaskId> = {
            let mut state = self.inner.state.lock();
            let index = state.column_index(id).ok_or(StoreError::ColumnNotFound(id))?;
            state.columns.remove(index);
            state
                .tasks
                .iter_mut()
                .filter(|task| task.column_id == Some(id))
                .map(|task| {
                    task.column_id = None;
                    task.id
                })
                .collect()
        };
        debug!(%id, orphaned = orphaned.len(), "column removed locally");

        let result = self.detach_and_delete_column(id, orphaned).await;
        self.settle(
            Transaction::begin("delete_column"),
            result,
            Recovery::RefetchBoard,
        )
        .await
    }

    /// Renumbers columns 0.. in the given sequence. Each column is written
    /// separately; a failure refetches tasks and columns.
    #[instrument(skip(self, ordered))]
    pub async fn reorder_columns(&self, ordered: &[ColumnId]) -> Result<(), StoreError> {
        {
            let mut state = self.inner.state.lock();
            if let Some(missing) = ordered.iter().find(|id| state.column_index(**id).is_none()) {
                return Err(StoreError::ColumnNotFound(*missing));
            }
            for (id, order) in ordered.iter().zip(0..) {
                if let Some(index) = state.column_index(*id) {
                    state.columns[index].order = order;
                }
            }
            state.columns = board::sorted_columns(&state.columns);
        }

        let mut result = Ok(());
        for (id, order) in ordered.iter().copied().zip(0..) {
            let patch = ColumnPatch {
                order: Some(order),
                ..ColumnPatch::default()
            };
            if let Err(err) = self.remote().update_column(id, patch).await {
                result = Err(err);
                break;
            }
        }
        self.settle(
            Transaction::begin("reorder_columns"),
            result,
            Recovery::RefetchBoard,
        )
        .await
    }

    /// Pins `ordered` into `column_id` (when given) and renumbers them 0..
    /// in sequence.
    #[instrument(skip(self, ordered))]
    pub async fn reorder_tasks(
        &self,
        column_id: Option<ColumnId>,
        ordered: &[TaskId],
    ) -> Result<(), StoreError> {
        {
            let mut state = self.inner.state.lock();
            if let Some(column_id) = column_id
                && state.column_index(column_id).is_none()
            {
                return Err(StoreError::ColumnNotFound(column_id));
            }
            if let Some(missing) = ordered.iter().find(|id| state.active_index(**id).is_none()) {
                return Err(StoreError::TaskNotFound(*missing));
            }
            for (id, order) in ordered.iter().zip(0..) {
                if let Some(task) = state.active_mut(*id) {
                    task.order = Some(order);
                    if column_id.is_some() {
                        task.column_id = column_id;
                    }
                }
            }
        }

        let mut result = Ok(());
        for (id, order) in ordered.iter().copied().zip(0..) {
            let patch = TaskPatch {
                column_id: column_id.map(Some),
                order: Some(Some(order)),
                ..TaskPatch::default()
            };
            if let Err(err) = self.remote().update_task(id, patch).await {
                result = Err(err);
                break;
            }
        }
        self.settle(
            Transaction::begin("reorder_tasks"),
            result,
            Recovery::Refetch,
        )
        .await
    }

    /// Moves a card into `column_id` at `index` (the end when `None`) and
    /// renumbers the destination column.
    #[instrument(skip(self))]
    pub async fn move_task_to_column(
        &self,
        task_id: TaskId,
        column_id: ColumnId,
        index: Option<usize>,
    ) -> Result<(), StoreError> {
        let ordered = {
            let state = self.inner.state.lock();
            if state.active_index(task_id).is_none() {
                return Err(StoreError::TaskNotFound(task_id));
            }
            if state.column_index(column_id).is_none() {
                return Err(StoreError::ColumnNotFound(column_id));
            }
            let mut ids = board::column_task_ids(&state.tasks, &state.columns, column_id);
            ids.retain(|id| *id != task_id);
            let at = index.unwrap_or(ids.len()).min(ids.len());
            ids.insert(at, task_id);
            ids
        };
        debug!(%task_id, %column_id, ?index, "moving card");
        self.reorder_tasks(Some(column_id), &ordered).await
    }

    async fn detach_and_delete_column(
        &self,
        id: ColumnId,
        orphaned: Vec<TaskId>,
    ) -> Result<(), RemoteError> {
        if !orphaned.is_empty() {
            let patch = TaskPatch {
                column_id: Some(None),
                ..TaskPatch::default()
            };
            self.remote().update_tasks(orphaned, patch).await?;
        }
        self.remote().delete_column(id).await
    }
}
