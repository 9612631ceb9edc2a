use chrono::{DateTime, Utc};
use tasklane_shared::{Task, TaskId, TaskPatch, TaskStatus};
use tracing::{debug, instrument};

use super::TaskStore;
use super::txn::{Recovery, Transaction, Undo};
use crate::error::StoreError;

pub const TRASH_RETENTION_DAYS: i64 = 30;

const MS_PER_DAY: u64 = 86_400_000;

/// Whole days since `trash_date`, rounded up, in either direction.
pub fn days_in_trash(trash_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (now - trash_date).num_milliseconds().unsigned_abs();
    i64::try_from(ms.div_ceil(MS_PER_DAY)).unwrap_or(i64::MAX)
}

/// A trashed task with no trash date is never considered expired.
pub fn is_expired(task: &Task, now: DateTime<Utc>, retention_days: i64) -> bool {
    task.trash_date
        .is_some_and(|at| days_in_trash(at, now) > retention_days)
}

pub(crate) fn partition_expired(
    trashed: Vec<Task>,
    now: DateTime<Utc>,
    retention_days: i64,
) -> (Vec<Task>, Vec<TaskId>) {
    let mut kept = Vec::with_capacity(trashed.len());
    let mut expired = Vec::new();
    for task in trashed {
        if is_expired(&task, now, retention_days) {
            expired.push(task.id);
        } else {
            kept.push(task);
        }
    }
    (kept, expired)
}

impl TaskStore {
    /// Soft-deletes an active task. On a remote failure both lists are put
    /// back as they were and the error is returned.
    #[instrument(skip(self))]
    pub async fn move_to_trash(&self, id: TaskId) -> Result<(), StoreError> {
        let now = self.now();
        let patch = TaskPatch::trashed(now);

        let txn = {
            let mut state = self.inner.state.lock();
            let index = state.active_index(id).ok_or(StoreError::TaskNotFound(id))?;
            let original = state.tasks.remove(index);
            let mut trashed = original.clone();
            patch.apply(&mut trashed);
            state.trash_tasks.insert(0, trashed);

            let mut txn = Transaction::begin("move_to_trash");
            txn.record(Undo::RestoreActive {
                index,
                task: original,
            });
            txn.record(Undo::RemoveTrashed(id));
            txn
        };

        let result = self.remote().update_task(id, patch).await;
        self.settle(txn, result, Recovery::Rollback).await?;
        debug!(%id, "task moved to trash");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restore_task(&self, id: TaskId) -> Result<(), StoreError> {
        let patch = TaskPatch::restored();

        let txn = {
            let mut state = self.inner.state.lock();
            let index = state.trash_index(id).ok_or(StoreError::TaskNotFound(id))?;
            let original = state.trash_tasks.remove(index);
            let mut restored = original.clone();
            patch.apply(&mut restored);
            state.insert_active_sorted(restored);

            let mut txn = Transaction::begin("restore_task");
            txn.record(Undo::RestoreTrashed {
                index,
                task: original,
            });
            txn.record(Undo::RemoveActive(id));
            txn
        };

        let result = self.remote().update_task(id, patch).await;
        self.settle(txn, result, Recovery::Rollback).await?;
        debug!(%id, "task restored from trash");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn permanently_delete_task(&self, id: TaskId) -> Result<(), StoreError> {
        {
            let mut state = self.inner.state.lock();
            let index = state.trash_index(id).ok_or(StoreError::TaskNotFound(id))?;
            state.trash_tasks.remove(index);
        }

        let result = self.remote().delete_task(id).await;
        self.settle(Transaction::begin("permanently_delete_task"), result, Recovery::Refetch)
            .await
    }

    /// Returns how many tasks were removed.
    #[instrument(skip(self))]
    pub async fn empty_trash(&self) -> Result<usize, StoreError> {
        let ids: Vec<TaskId> = {
            let mut state = self.inner.state.lock();
            state.trash_tasks.drain(..).map(|task| task.id).collect()
        };
        if ids.is_empty() {
            return Ok(0);
        }

        let count = ids.len();
        let result = self.remote().delete_tasks(ids).await;
        self.settle(Transaction::begin("empty_trash"), result, Recovery::Refetch)
            .await?;
        debug!(count, "trash emptied");
        Ok(count)
    }

    /// Trashes every `done` task under one shared timestamp. Returns how
    /// many were moved.
    #[instrument(skip(self))]
    pub async fn clear_done_tasks(&self) -> Result<usize, StoreError> {
        let now = self.now();
        let patch = TaskPatch::trashed(now);

        let ids: Vec<TaskId> = {
            let mut state = self.inner.state.lock();
            let (done, rest): (Vec<Task>, Vec<Task>) = std::mem::take(&mut state.tasks)
                .into_iter()
                .partition(|task| task.status == TaskStatus::Done);
            state.tasks = rest;

            let ids = done.iter().map(|task| task.id).collect();
            let mut trashed: Vec<Task> = done
                .into_iter()
                .map(|mut task| {
                    patch.apply(&mut task);
                    task
                })
                .collect();
            trashed.append(&mut state.trash_tasks);
            state.trash_tasks = trashed;
            ids
        };
        if ids.is_empty() {
            return Ok(0);
        }

        let count = ids.len();
        let result = self.remote().update_tasks(ids, patch).await;
        self.settle(Transaction::begin("clear_done_tasks"), result, Recovery::Refetch)
            .await?;
        debug!(count, "done tasks moved to trash");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
            .single()
            .expect("valid date")
    }

    fn trashed(days_ago: Option<i64>) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: "old".to_string(),
            status: TaskStatus::Trash,
            sector: vec!["general".to_string()],
            user_id: "u-1".to_string(),
            created_at: now() - Duration::days(90),
            trash_date: days_ago.map(|days| now() - Duration::days(days)),
            due_at: None,
            recurrence_id: None,
            details: None,
            subtasks: vec![],
            column_id: None,
            order: None,
        }
    }

    #[test]
    fn partial_days_round_up() {
        assert_eq!(days_in_trash(now(), now()), 0);
        assert_eq!(days_in_trash(now() - Duration::minutes(1), now()), 1);
        assert_eq!(days_in_trash(now() - Duration::days(30), now()), 30);
        assert_eq!(
            days_in_trash(now() - Duration::days(30) - Duration::seconds(1), now()),
            31
        );
    }

    #[test]
    fn future_trash_dates_count_by_distance() {
        assert_eq!(days_in_trash(now() + Duration::days(2), now()), 2);
    }

    #[test]
    fn expiry_boundary_is_thirty_days() {
        assert!(!is_expired(&trashed(Some(30)), now(), TRASH_RETENTION_DAYS));
        assert!(is_expired(&trashed(Some(31)), now(), TRASH_RETENTION_DAYS));
        assert!(!is_expired(&trashed(None), now(), TRASH_RETENTION_DAYS));
    }

    #[test]
    fn partition_keeps_order_of_survivors() {
        let a = trashed(Some(1));
        let b = trashed(Some(45));
        let c = trashed(None);
        let (kept, expired) =
            partition_expired(vec![a.clone(), b.clone(), c.clone()], now(), 30);

        assert_eq!(kept, vec![a, c]);
        assert_eq!(expired, vec![b.id]);
    }
}
