//! [`RemoteStore`] backed by JSON-lines files in a data directory.
//!
//! Each table lives in its own `<table>.data` file, one row per line, and
//! every write replaces the file atomically. Change events are fanned out
//! in-process, so only stores sharing the same `FileRemote` see each
//! other's writes in realtime.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tasklane_shared::{
    ColumnId, ColumnPatch, KanbanColumn, NewColumn, NewRecurrence, NewSubtask, NewTask, Recurrence,
    RecurrenceId, Subtask, SubtaskId, SubtaskPatch, Task, TaskId, TaskPatch,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    ChangeEvent, ChangeFeed, ChangeKind, ChannelId, RealtimeHub, RemoteError, RemoteStore, Table,
    Tables, TaskQuery,
};

#[derive(Debug)]
pub struct FileRemote {
    pub data_dir: PathBuf,
    tasks_path: PathBuf,
    subtasks_path: PathBuf,
    recurrences_path: PathBuf,
    columns_path: PathBuf,
    io: Mutex<()>,
    hub: RealtimeHub,
}

impl FileRemote {
    #[instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let subtasks_path = data_dir.join("subtasks.data");
        let recurrences_path = data_dir.join("recurrences.data");
        let columns_path = data_dir.join("kanban_columns.data");

        for path in [&tasks_path, &subtasks_path, &recurrences_path, &columns_path] {
            if !path.exists() {
                fs::write(path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        info!(data_dir = %data_dir.display(), "opened file-backed remote");

        Ok(Self {
            data_dir,
            tasks_path,
            subtasks_path,
            recurrences_path,
            columns_path,
            io: Mutex::new(()),
            hub: RealtimeHub::new(),
        })
    }

    /// Loads every table, runs `op`, then persists the tables named in
    /// `dirty`. Failures leave the files untouched.
    fn transact<T>(
        &self,
        dirty: &[Table],
        op: impl FnOnce(&mut Tables) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let _guard = self.io.lock();
        let mut tables = self.load_tables()?;
        let out = op(&mut tables)?;
        for table in dirty {
            self.save_table(&tables, *table)?;
        }
        Ok(out)
    }

    fn read<T>(&self, op: impl FnOnce(&Tables) -> T) -> Result<T, RemoteError> {
        let _guard = self.io.lock();
        let tables = self.load_tables()?;
        Ok(op(&tables))
    }

    fn load_tables(&self) -> anyhow::Result<Tables> {
        Ok(Tables {
            tasks: read_rows(Table::Tasks, &self.tasks_path)?,
            subtasks: read_rows(Table::Subtasks, &self.subtasks_path)?,
            recurrences: read_rows(Table::Recurrences, &self.recurrences_path)?,
            columns: read_rows(Table::KanbanColumns, &self.columns_path)?,
        })
    }

    fn save_table(&self, tables: &Tables, table: Table) -> anyhow::Result<()> {
        match table {
            Table::Tasks => {
                let rows: Vec<Task> = tables
                    .tasks
                    .iter()
                    .cloned()
                    .map(|mut task| {
                        task.subtasks.clear();
                        task
                    })
                    .collect();
                write_rows(table, &self.tasks_path, &rows)
            }
            Table::Subtasks => write_rows(table, &self.subtasks_path, &tables.subtasks),
            Table::Recurrences => write_rows(table, &self.recurrences_path, &tables.recurrences),
            Table::KanbanColumns => write_rows(table, &self.columns_path, &tables.columns),
        }
    }

    fn publish(&self, table: Table, kind: ChangeKind, ids: impl IntoIterator<Item = Uuid>) {
        for id in ids {
            self.hub.publish(ChangeEvent { table, kind, id });
        }
    }
}

#[async_trait]
impl RemoteStore for FileRemote {
    #[instrument(skip(self))]
    async fn select_tasks(&self, query: TaskQuery) -> Result<Vec<Task>, RemoteError> {
        self.read(|tables| tables.select_tasks(query))
    }

    #[instrument(skip(self, task), fields(title = %task.title))]
    async fn insert_task(&self, task: NewTask) -> Result<Task, RemoteError> {
        let row = self.transact(&[Table::Tasks], |tables| {
            Ok(tables.insert_task(task, Utc::now()))
        })?;
        self.publish(Table::Tasks, ChangeKind::Insert, [row.id]);
        Ok(row)
    }

    #[instrument(skip(self, patch))]
    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, RemoteError> {
        let row = self.transact(&[Table::Tasks], |tables| tables.update_task(id, &patch))?;
        self.publish(Table::Tasks, ChangeKind::Update, [id]);
        Ok(row)
    }

    #[instrument(skip(self, ids, patch), fields(count = ids.len()))]
    async fn update_tasks(&self, ids: Vec<TaskId>, patch: TaskPatch) -> Result<(), RemoteError> {
        let touched =
            self.transact(&[Table::Tasks], |tables| Ok(tables.update_tasks(&ids, &patch)))?;
        self.publish(Table::Tasks, ChangeKind::Update, touched);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_task(&self, id: TaskId) -> Result<(), RemoteError> {
        self.delete_tasks(vec![id]).await
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_tasks(&self, ids: Vec<TaskId>) -> Result<(), RemoteError> {
        let removed = self.transact(&[Table::Tasks, Table::Subtasks], |tables| {
            Ok(tables.delete_tasks(&ids))
        })?;
        debug!(removed = removed.len(), "deleted task rows");
        self.publish(Table::Tasks, ChangeKind::Delete, removed);
        Ok(())
    }

    #[instrument(skip(self, subtasks), fields(count = subtasks.len()))]
    async fn insert_subtasks(
        &self,
        subtasks: Vec<NewSubtask>,
    ) -> Result<Vec<Subtask>, RemoteError> {
        let rows = self.transact(&[Table::Subtasks], |tables| {
            tables.insert_subtasks(subtasks, Utc::now())
        })?;
        self.publish(Table::Subtasks, ChangeKind::Insert, rows.iter().map(|sub| sub.id));
        Ok(rows)
    }

    #[instrument(skip(self, patch))]
    async fn update_subtask(
        &self,
        id: SubtaskId,
        patch: SubtaskPatch,
    ) -> Result<Subtask, RemoteError> {
        let row = self.transact(&[Table::Subtasks], |tables| tables.update_subtask(id, &patch))?;
        self.publish(Table::Subtasks, ChangeKind::Update, [id]);
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn delete_subtask(&self, id: SubtaskId) -> Result<(), RemoteError> {
        self.transact(&[Table::Subtasks], |tables| tables.delete_subtask(id))?;
        self.publish(Table::Subtasks, ChangeKind::Delete, [id]);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_subtasks_for_task(&self, task_id: TaskId) -> Result<(), RemoteError> {
        let removed = self.transact(&[Table::Subtasks], |tables| {
            Ok(tables.delete_subtasks_for_task(task_id))
        })?;
        self.publish(Table::Subtasks, ChangeKind::Delete, removed);
        Ok(())
    }

    #[instrument(skip(self, rule))]
    async fn insert_recurrence(&self, rule: NewRecurrence) -> Result<Recurrence, RemoteError> {
        let row = self.transact(&[Table::Recurrences], |tables| {
            Ok(tables.insert_recurrence(rule, Utc::now()))
        })?;
        self.publish(Table::Recurrences, ChangeKind::Insert, [row.id]);
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn get_recurrence(&self, id: RecurrenceId) -> Result<Recurrence, RemoteError> {
        self.read(|tables| tables.recurrence(id))?
    }

    #[instrument(skip(self))]
    async fn select_columns(&self) -> Result<Vec<KanbanColumn>, RemoteError> {
        self.read(Tables::select_columns)
    }

    #[instrument(skip(self, column), fields(title = %column.title))]
    async fn insert_column(&self, column: NewColumn) -> Result<KanbanColumn, RemoteError> {
        let row = self.transact(&[Table::KanbanColumns], |tables| {
            Ok(tables.insert_column(column, Utc::now()))
        })?;
        self.publish(Table::KanbanColumns, ChangeKind::Insert, [row.id]);
        Ok(row)
    }

    #[instrument(skip(self, patch))]
    async fn update_column(
        &self,
        id: ColumnId,
        patch: ColumnPatch,
    ) -> Result<KanbanColumn, RemoteError> {
        let row =
            self.transact(&[Table::KanbanColumns], |tables| tables.update_column(id, &patch))?;
        self.publish(Table::KanbanColumns, ChangeKind::Update, [id]);
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn delete_column(&self, id: ColumnId) -> Result<(), RemoteError> {
        self.transact(&[Table::KanbanColumns], |tables| tables.delete_column(id))?;
        self.publish(Table::KanbanColumns, ChangeKind::Delete, [id]);
        Ok(())
    }

    async fn subscribe(&self, table: Table) -> Result<ChangeFeed, RemoteError> {
        Ok(self.hub.subscribe(table))
    }

    fn unsubscribe(&self, channel: ChannelId) {
        self.hub.unsubscribe(channel);
    }
}

/// Reads one table file. Blank lines are skipped; a bad row names the table
/// and its row number.
fn read_rows<T: DeserializeOwned>(table: Table, path: &Path) -> anyhow::Result<Vec<T>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let rows = reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(
                serde_json::from_str(line.trim())
                    .with_context(|| format!("{table} row {} is not valid JSON", idx + 1)),
            ),
            Err(err) => Some(Err(err.into())),
        })
        .collect::<anyhow::Result<Vec<T>>>()?;
    debug!(%table, rows = rows.len(), "table read");
    Ok(rows)
}

/// Rewrites one table file through a sibling temp file, so readers see
/// either the old rows or the new ones.
fn write_rows<T: Serialize>(table: Table, path: &Path, rows: &[T]) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = NamedTempFile::new_in(dir)?;
    for row in rows {
        serde_json::to_writer(&mut staged, row)?;
        staged.write_all(b"\n")?;
    }
    staged.flush()?;
    staged
        .persist(path)
        .map_err(|err| anyhow!("could not replace the {table} file: {}", err.error))?;
    debug!(%table, rows = rows.len(), "table written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use tasklane_shared::TaskStatus;
    use tempfile::tempdir;

    use super::*;

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            status: TaskStatus::Todo,
            sector: vec!["general".to_string()],
            user_id: "u-1".to_string(),
            due_at: None,
            recurrence_id: None,
            details: Some("notes".to_string()),
            column_id: None,
            order: None,
        }
    }

    #[tokio::test]
    async fn rows_survive_reopening_the_directory() {
        let temp = tempdir().expect("tempdir");
        let remote = FileRemote::open(temp.path()).expect("open remote");

        let task = remote
            .insert_task(new_task("Pay rent"))
            .await
            .expect("insert task");
        remote
            .insert_subtasks(vec![NewSubtask {
                task_id: task.id,
                title: "Transfer".to_string(),
                completed: false,
                order: 0,
            }])
            .await
            .expect("insert subtask");
        drop(remote);

        let reopened = FileRemote::open(temp.path()).expect("reopen remote");
        let active = reopened
            .select_tasks(TaskQuery::active())
            .await
            .expect("select tasks");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "Pay rent");
        assert_eq!(active[0].subtasks.len(), 1);

        let raw = fs::read_to_string(temp.path().join("tasks.data")).expect("read tasks.data");
        assert!(!raw.contains("Transfer"), "subtasks must not be nested in task rows");
    }

    #[tokio::test]
    async fn failed_update_leaves_files_untouched() {
        let temp = tempdir().expect("tempdir");
        let remote = FileRemote::open(temp.path()).expect("open remote");
        remote
            .insert_task(new_task("Keep me"))
            .await
            .expect("insert task");
        let before = fs::read_to_string(temp.path().join("tasks.data")).expect("read tasks.data");

        let err = remote
            .update_task(Uuid::new_v4(), TaskPatch::status(TaskStatus::Done))
            .await
            .expect_err("unknown id should fail");
        assert!(matches!(err, RemoteError::NotFound { table: Table::Tasks, .. }));

        let after = fs::read_to_string(temp.path().join("tasks.data")).expect("read tasks.data");
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn corrupt_row_names_table_and_row() {
        let temp = tempdir().expect("tempdir");
        let remote = FileRemote::open(temp.path()).expect("open remote");
        remote
            .insert_task(new_task("Fine"))
            .await
            .expect("insert task");
        fs::write(temp.path().join("subtasks.data"), "\n{not json\n").expect("corrupt file");

        let err = remote
            .select_tasks(TaskQuery::active())
            .await
            .expect_err("corrupt subtasks should fail");

        assert!(matches!(err, RemoteError::Storage(_)));
        assert_eq!(err.to_string(), "subtasks row 2 is not valid JSON");
    }

    #[tokio::test]
    async fn writes_reach_task_subscribers() {
        let temp = tempdir().expect("tempdir");
        let remote = FileRemote::open(temp.path()).expect("open remote");
        let mut feed = remote.subscribe(Table::Tasks).await.expect("subscribe");

        let task = remote
            .insert_task(new_task("Notify"))
            .await
            .expect("insert task");

        let event = feed.events.recv().await.expect("change event");
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.id, task.id);
    }
}
