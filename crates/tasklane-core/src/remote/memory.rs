//! In-process [`RemoteStore`] with fault injection.
//!
//! Every call is recorded, can be made to fail (once or until healed), and
//! can be held at its entry point until released, which is how tests
//! observe the store between its optimistic update and the remote reply.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tasklane_shared::{
    ColumnId, ColumnPatch, KanbanColumn, NewColumn, NewRecurrence, NewSubtask, NewTask, Recurrence,
    RecurrenceId, Subtask, SubtaskId, SubtaskPatch, Task, TaskId, TaskPatch,
};
use tokio::sync::Semaphore;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
    ChangeEvent, ChangeFeed, ChangeKind, ChannelId, RealtimeHub, RemoteError, RemoteStore, Table,
    Tables, TaskQuery,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    SelectTasks,
    InsertTask,
    UpdateTask,
    UpdateTasks,
    DeleteTask,
    DeleteTasks,
    InsertSubtasks,
    UpdateSubtask,
    DeleteSubtask,
    DeleteSubtasksForTask,
    InsertRecurrence,
    GetRecurrence,
    SelectColumns,
    InsertColumn,
    UpdateColumn,
    DeleteColumn,
    Subscribe,
}

impl RemoteOp {
    pub fn is_write(self) -> bool {
        !matches!(
            self,
            RemoteOp::SelectTasks
                | RemoteOp::GetRecurrence
                | RemoteOp::SelectColumns
                | RemoteOp::Subscribe
        )
    }
}

#[derive(Debug, Default)]
struct Faults {
    once: HashMap<RemoteOp, usize>,
    always: HashSet<RemoteOp>,
}

#[derive(Debug, Default)]
pub struct MemoryRemote {
    tables: Mutex<Tables>,
    hub: RealtimeHub,
    faults: Mutex<Faults>,
    gates: Mutex<HashMap<RemoteOp, Arc<Semaphore>>>,
    calls: Mutex<Vec<RemoteOp>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(tables: Tables) -> Self {
        Self {
            tables: Mutex::new(tables),
            ..Self::default()
        }
    }

    /// Stores a task row as-is; nested subtasks go to their own table.
    pub fn seed_task(&self, mut task: Task) {
        let mut tables = self.tables.lock();
        tables.subtasks.append(&mut task.subtasks);
        tables.tasks.push(task);
    }

    pub fn seed_recurrence(&self, rule: Recurrence) {
        self.tables.lock().recurrences.push(rule);
    }

    pub fn seed_column(&self, column: KanbanColumn) {
        self.tables.lock().columns.push(column);
    }

    pub fn snapshot(&self) -> Tables {
        self.tables.lock().clone()
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.tables.lock().task(id)
    }

    pub fn calls(&self) -> Vec<RemoteOp> {
        self.calls.lock().clone()
    }

    pub fn write_calls(&self) -> Vec<RemoteOp> {
        self.calls
            .lock()
            .iter()
            .copied()
            .filter(|op| op.is_write())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn fail_next(&self, op: RemoteOp) {
        *self.faults.lock().once.entry(op).or_default() += 1;
    }

    pub fn fail_always(&self, op: RemoteOp) {
        self.faults.lock().always.insert(op);
    }

    pub fn heal(&self, op: RemoteOp) {
        let mut faults = self.faults.lock();
        faults.once.remove(&op);
        faults.always.remove(&op);
    }

    /// Parks every call to `op` at its entry point until [`Self::release`].
    pub fn hold(&self, op: RemoteOp) {
        self.gates
            .lock()
            .entry(op)
            .or_insert_with(|| Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, op: RemoteOp) {
        if let Some(gate) = self.gates.lock().remove(&op) {
            gate.close();
        }
    }

    pub fn channel_count(&self) -> usize {
        self.hub.channel_count()
    }

    async fn enter(&self, op: RemoteOp) -> Result<(), RemoteError> {
        self.calls.lock().push(op);

        let gate = self.gates.lock().get(&op).cloned();
        if let Some(gate) = gate {
            debug!(?op, "remote call held");
            // Resolves with an error once the gate is closed.
            let _ = gate.acquire().await;
        }

        let mut faults = self.faults.lock();
        if faults.always.contains(&op) {
            return Err(RemoteError::Unavailable(format!("{op:?} is failing")));
        }
        if let Some(remaining) = faults.once.get_mut(&op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(RemoteError::Unavailable(format!("{op:?} failed once")));
        }
        Ok(())
    }

    fn publish(&self, table: Table, kind: ChangeKind, ids: impl IntoIterator<Item = Uuid>) {
        for id in ids {
            self.hub.publish(ChangeEvent { table, kind, id });
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    #[instrument(skip(self))]
    async fn select_tasks(&self, query: TaskQuery) -> Result<Vec<Task>, RemoteError> {
        self.enter(RemoteOp::SelectTasks).await?;
        Ok(self.tables.lock().select_tasks(query))
    }

    #[instrument(skip(self, task), fields(title = %task.title))]
    async fn insert_task(&self, task: NewTask) -> Result<Task, RemoteError> {
        self.enter(RemoteOp::InsertTask).await?;
        let row = self.tables.lock().insert_task(task, Utc::now());
        self.publish(Table::Tasks, ChangeKind::Insert, [row.id]);
        Ok(row)
    }

    #[instrument(skip(self, patch))]
    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, RemoteError> {
        self.enter(RemoteOp::UpdateTask).await?;
        let row = self.tables.lock().update_task(id, &patch)?;
        self.publish(Table::Tasks, ChangeKind::Update, [id]);
        Ok(row)
    }

    #[instrument(skip(self, ids, patch), fields(count = ids.len()))]
    async fn update_tasks(&self, ids: Vec<TaskId>, patch: TaskPatch) -> Result<(), RemoteError> {
        self.enter(RemoteOp::UpdateTasks).await?;
        let touched = self.tables.lock().update_tasks(&ids, &patch);
        self.publish(Table::Tasks, ChangeKind::Update, touched);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_task(&self, id: TaskId) -> Result<(), RemoteError> {
        self.enter(RemoteOp::DeleteTask).await?;
        let removed = self.tables.lock().delete_tasks(&[id]);
        self.publish(Table::Tasks, ChangeKind::Delete, removed);
        Ok(())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_tasks(&self, ids: Vec<TaskId>) -> Result<(), RemoteError> {
        self.enter(RemoteOp::DeleteTasks).await?;
        let removed = self.tables.lock().delete_tasks(&ids);
        self.publish(Table::Tasks, ChangeKind::Delete, removed);
        Ok(())
    }

    #[instrument(skip(self, subtasks), fields(count = subtasks.len()))]
    async fn insert_subtasks(
        &self,
        subtasks: Vec<NewSubtask>,
    ) -> Result<Vec<Subtask>, RemoteError> {
        self.enter(RemoteOp::InsertSubtasks).await?;
        let rows = self.tables.lock().insert_subtasks(subtasks, Utc::now())?;
        self.publish(Table::Subtasks, ChangeKind::Insert, rows.iter().map(|sub| sub.id));
        Ok(rows)
    }

    #[instrument(skip(self, patch))]
    async fn update_subtask(
        &self,
        id: SubtaskId,
        patch: SubtaskPatch,
    ) -> Result<Subtask, RemoteError> {
        self.enter(RemoteOp::UpdateSubtask).await?;
        let row = self.tables.lock().update_subtask(id, &patch)?;
        self.publish(Table::Subtasks, ChangeKind::Update, [id]);
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn delete_subtask(&self, id: SubtaskId) -> Result<(), RemoteError> {
        self.enter(RemoteOp::DeleteSubtask).await?;
        self.tables.lock().delete_subtask(id)?;
        self.publish(Table::Subtasks, ChangeKind::Delete, [id]);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_subtasks_for_task(&self, task_id: TaskId) -> Result<(), RemoteError> {
        self.enter(RemoteOp::DeleteSubtasksForTask).await?;
        let removed = self.tables.lock().delete_subtasks_for_task(task_id);
        self.publish(Table::Subtasks, ChangeKind::Delete, removed);
        Ok(())
    }

    #[instrument(skip(self, rule))]
    async fn insert_recurrence(&self, rule: NewRecurrence) -> Result<Recurrence, RemoteError> {
        self.enter(RemoteOp::InsertRecurrence).await?;
        let row = self.tables.lock().insert_recurrence(rule, Utc::now());
        self.publish(Table::Recurrences, ChangeKind::Insert, [row.id]);
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn get_recurrence(&self, id: RecurrenceId) -> Result<Recurrence, RemoteError> {
        self.enter(RemoteOp::GetRecurrence).await?;
        self.tables.lock().recurrence(id)
    }

    #[instrument(skip(self))]
    async fn select_columns(&self) -> Result<Vec<KanbanColumn>, RemoteError> {
        self.enter(RemoteOp::SelectColumns).await?;
        Ok(self.tables.lock().select_columns())
    }

    #[instrument(skip(self, column), fields(title = %column.title))]
    async fn insert_column(&self, column: NewColumn) -> Result<KanbanColumn, RemoteError> {
        self.enter(RemoteOp::InsertColumn).await?;
        let row = self.tables.lock().insert_column(column, Utc::now());
        self.publish(Table::KanbanColumns, ChangeKind::Insert, [row.id]);
        Ok(row)
    }

    #[instrument(skip(self, patch))]
    async fn update_column(
        &self,
        id: ColumnId,
        patch: ColumnPatch,
    ) -> Result<KanbanColumn, RemoteError> {
        self.enter(RemoteOp::UpdateColumn).await?;
        let row = self.tables.lock().update_column(id, &patch)?;
        self.publish(Table::KanbanColumns, ChangeKind::Update, [id]);
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn delete_column(&self, id: ColumnId) -> Result<(), RemoteError> {
        self.enter(RemoteOp::DeleteColumn).await?;
        self.tables.lock().delete_column(id)?;
        self.publish(Table::KanbanColumns, ChangeKind::Delete, [id]);
        Ok(())
    }

    async fn subscribe(&self, table: Table) -> Result<ChangeFeed, RemoteError> {
        self.enter(RemoteOp::Subscribe).await?;
        Ok(self.hub.subscribe(table))
    }

    fn unsubscribe(&self, channel: ChannelId) {
        self.hub.unsubscribe(channel);
    }
}
