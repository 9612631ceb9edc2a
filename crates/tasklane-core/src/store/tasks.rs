use tasklane_shared::{
    NewRecurrence, NewSubtask, NewTask, RecurrenceId, Sector, SectorId, Subtask, SubtaskDraft,
    Task, TaskCreate, TaskId, TaskPatch, TaskStatus,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::TaskStore;
use super::txn::{Recovery, Transaction, Undo};
use crate::error::{RemoteError, StoreError};
use crate::{recurrence, sectors};

impl TaskStore {
    /// Creates a task for the signed-in user.
    ///
    /// The task shows up at the top of the active list under a temporary id
    /// right away and is swapped for the stored row once the insert
    /// returns. Without an identity nothing is touched, locally or
    /// remotely.
    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn add_task(&self, input: TaskCreate) -> Result<Task, StoreError> {
        let user_id = self
            .inner
            .identity
            .current_user_id()
            .ok_or(StoreError::NotAuthenticated)?;
        if let Some(rule) = &input.recurrence {
            recurrence::validate(rule)?;
        }

        let TaskCreate {
            title,
            sector,
            due_at,
            recurrence,
            details,
            subtasks,
            column_id,
        } = input;

        let sector = if sector.is_empty() {
            vec![self.default_sector()]
        } else {
            sector
        };

        let recurrence_id = match recurrence {
            Some(rule) => {
                let rule = NewRecurrence {
                    user_id: user_id.clone(),
                    frequency: rule.frequency,
                    interval: rule.interval,
                    week_days: rule.week_days,
                    ends_on: rule.ends_on,
                };
                self.create_recurrence(rule).await
            }
            None => None,
        };

        let new = NewTask {
            title,
            status: TaskStatus::Todo,
            sector,
            user_id,
            due_at,
            recurrence_id,
            details,
            column_id,
            order: None,
        };
        self.insert_optimistic(new, subtasks).await
    }

    /// Merges `patch` into the loaded task and writes it through. A remote
    /// failure is only logged; the next fetch converges.
    ///
    /// A patch that would move the task into or out of the trash, or split
    /// its status from its trash date, is refused untouched.
    #[instrument(skip(self, patch))]
    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<(), StoreError> {
        {
            let mut state = self.inner.state.lock();
            let task = if let Some(index) = state.active_index(id) {
                &mut state.tasks[index]
            } else if let Some(index) = state.trash_index(id) {
                &mut state.trash_tasks[index]
            } else {
                return Err(StoreError::TaskNotFound(id));
            };

            let mut patched = task.clone();
            patch.apply(&mut patched);
            let was_trashed = task.status == TaskStatus::Trash;
            let is_trashed = patched.status == TaskStatus::Trash;
            if was_trashed != is_trashed || !patched.trash_state_consistent() {
                return Err(StoreError::TrashStateChange(id));
            }
            *task = patched;
        }
        if patch.is_empty() {
            return Ok(());
        }

        if let Err(err) = self.remote().update_task(id, patch).await {
            warn!(%id, error = %err, "task update not persisted; keeping local change");
        }
        Ok(())
    }

    /// Updates the task, then replaces its whole subtask list remotely and
    /// refetches to pick up the new subtask ids.
    #[instrument(skip(self, patch, subtasks), fields(subtasks = subtasks.len()))]
    pub async fn update_task_with_subtasks(
        &self,
        id: TaskId,
        patch: TaskPatch,
        subtasks: Vec<SubtaskDraft>,
    ) -> Result<(), StoreError> {
        self.update_task(id, patch).await?;

        let replaced = self.replace_subtasks(id, subtasks).await;
        if let Err(err) = &replaced {
            warn!(%id, error = %err, "subtask replacement failed");
        }
        self.refresh().await;
        replaced.map_err(StoreError::from)
    }

    /// Flips `current` between `todo` and `done` (`doing` resolves to
    /// `done`) and returns the new status.
    ///
    /// Completing a recurring task queues its successor; problems there are
    /// logged and never fail the toggle.
    #[instrument(skip(self))]
    pub async fn toggle_task(
        &self,
        id: TaskId,
        current: TaskStatus,
    ) -> Result<TaskStatus, StoreError> {
        let next = current.toggled();

        let (txn, task) = {
            let mut state = self.inner.state.lock();
            let task = state.active_mut(id).ok_or(StoreError::TaskNotFound(id))?;
            let mut txn = Transaction::begin("toggle_task");
            txn.record(Undo::SetStatus {
                id,
                status: task.status,
            });
            task.status = next;
            (txn, task.clone())
        };

        let result = self.remote().update_task(id, TaskPatch::status(next)).await;
        self.settle(txn, result, Recovery::Rollback).await?;

        if next == TaskStatus::Done
            && let Some(rule_id) = task.recurrence_id
            && let Err(err) = self.spawn_successor(&task, rule_id).await
        {
            warn!(%id, %rule_id, error = %err, "could not create next occurrence");
        }
        Ok(next)
    }

    /// Applies the general-sector rules to one task. A remote failure
    /// refetches instead of rolling back.
    #[instrument(skip(self, all_sectors))]
    pub async fn toggle_task_sector(
        &self,
        task_id: TaskId,
        sector_id: &str,
        all_sectors: &[Sector],
    ) -> Result<Vec<SectorId>, StoreError> {
        let next = {
            let mut state = self.inner.state.lock();
            let task = state
                .active_mut(task_id)
                .ok_or(StoreError::TaskNotFound(task_id))?;
            task.sector = sectors::toggle_sector(&task.sector, sector_id, all_sectors);
            task.sector.clone()
        };
        debug!(%task_id, sectors = ?next, "sectors toggled");

        let patch = TaskPatch {
            sector: Some(next.clone()),
            ..TaskPatch::default()
        };
        let result = self.remote().update_task(task_id, patch).await;
        self.settle(
            Transaction::begin("toggle_task_sector"),
            result,
            Recovery::Refetch,
        )
        .await?;
        Ok(next)
    }

    /// Shows `new` under a temporary id, inserts it remotely together with
    /// its subtasks, then swaps in the stored row.
    pub(crate) async fn insert_optimistic(
        &self,
        new: NewTask,
        drafts: Vec<SubtaskDraft>,
    ) -> Result<Task, StoreError> {
        let temp_id = Uuid::new_v4();
        let now = self.now();
        let placeholder = Task {
            id: temp_id,
            title: new.title.clone(),
            status: new.status,
            sector: new.sector.clone(),
            user_id: new.user_id.clone(),
            created_at: now,
            trash_date: None,
            due_at: new.due_at,
            recurrence_id: new.recurrence_id,
            details: new.details.clone(),
            subtasks: drafts
                .iter()
                .zip(0..)
                .map(|(draft, order)| Subtask {
                    id: Uuid::new_v4(),
                    task_id: temp_id,
                    title: draft.title.clone(),
                    completed: draft.completed,
                    order,
                    created_at: now,
                })
                .collect(),
            column_id: new.column_id,
            order: new.order,
        };

        let txn = {
            let mut state = self.inner.state.lock();
            state.tasks.insert(0, placeholder);
            let mut txn = Transaction::begin("insert_task");
            txn.record(Undo::RemoveActive(temp_id));
            txn
        };
        debug!(%temp_id, "task shown under temporary id");

        let result = self.remote().insert_task(new).await;
        let mut created = self.settle(txn, result, Recovery::Rollback).await?;

        if !drafts.is_empty() {
            match self.remote().insert_subtasks(numbered(created.id, drafts)).await {
                Ok(subtasks) => created.subtasks = subtasks,
                Err(err) => warn!(id = %created.id, error = %err, "subtasks not created"),
            }
        }

        self.inner.state.lock().replace_active(temp_id, created.clone());
        info!(id = %created.id, %temp_id, "task created");
        Ok(created)
    }

    fn default_sector(&self) -> SectorId {
        sectors::general_id(&self.inner.settings.sectors).to_string()
    }

    async fn create_recurrence(&self, rule: NewRecurrence) -> Option<RecurrenceId> {
        match self.remote().insert_recurrence(rule).await {
            Ok(created) => {
                debug!(rule_id = %created.id, "recurrence created");
                Some(created.id)
            }
            Err(err) => {
                warn!(error = %err, "recurrence not created; task will not repeat");
                None
            }
        }
    }

    async fn replace_subtasks(
        &self,
        id: TaskId,
        drafts: Vec<SubtaskDraft>,
    ) -> Result<(), RemoteError> {
        self.remote().delete_subtasks_for_task(id).await?;
        if !drafts.is_empty() {
            self.remote().insert_subtasks(numbered(id, drafts)).await?;
        }
        Ok(())
    }

    /// Queues the next occurrence of a just-completed recurring task.
    async fn spawn_successor(&self, done: &Task, rule_id: RecurrenceId) -> Result<(), StoreError> {
        let rule = self.remote().get_recurrence(rule_id).await?;
        let base = done.due_at.unwrap_or_else(|| self.now());
        let occurrence = recurrence::next_for_rule(&rule, base);
        if !occurrence.in_range {
            debug!(%rule_id, next = %occurrence.next, "recurrence ended");
            return Ok(());
        }

        let successor = NewTask {
            title: done.title.clone(),
            status: TaskStatus::Todo,
            sector: done.sector.clone(),
            user_id: done.user_id.clone(),
            due_at: Some(occurrence.next),
            recurrence_id: Some(rule.id),
            details: None,
            column_id: None,
            order: None,
        };
        self.insert_optimistic(successor, vec![]).await?;
        Ok(())
    }
}

/// Insert payloads with sequential `order` starting at zero.
fn numbered(task_id: TaskId, drafts: Vec<SubtaskDraft>) -> Vec<NewSubtask> {
    drafts
        .into_iter()
        .zip(0..)
        .map(|(draft, order)| NewSubtask {
            task_id,
            title: draft.title,
            completed: draft.completed,
            order,
        })
        .collect()
}
