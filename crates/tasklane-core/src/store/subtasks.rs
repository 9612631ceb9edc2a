//! Subtask edits. These write remotely first and patch the owning task's
//! nested list only once the remote side accepted the change.

use tasklane_shared::{NewSubtask, Subtask, SubtaskId, SubtaskPatch, TaskId};
use tracing::{debug, instrument, warn};

use super::TaskStore;
use crate::error::{RemoteError, StoreError};

impl TaskStore {
    #[instrument(skip(self, title))]
    pub async fn add_subtask(
        &self,
        task_id: TaskId,
        title: String,
    ) -> Result<Subtask, StoreError> {
        let order = {
            let state = self.inner.state.lock();
            let task = state
                .tasks
                .iter()
                .find(|task| task.id == task_id)
                .ok_or(StoreError::TaskNotFound(task_id))?;
            task.subtasks
                .iter()
                .map(|sub| sub.order)
                .max()
                .map_or(0, |max| max + 1)
        };

        let row = NewSubtask {
            task_id,
            title,
            completed: false,
            order,
        };
        let created = self
            .remote()
            .insert_subtasks(vec![row])
            .await?
            .into_iter()
            .next()
            .ok_or(RemoteError::Rejected {
                op: "insert_subtasks",
                reason: "no row returned".to_string(),
            })?;

        if let Some(task) = self.inner.state.lock().active_mut(task_id) {
            task.subtasks.push(created.clone());
        }
        debug!(%task_id, id = %created.id, "subtask added");
        Ok(created)
    }

    /// Flips a subtask whose completion flag is currently `completed`.
    #[instrument(skip(self))]
    pub async fn toggle_subtask(
        &self,
        subtask_id: SubtaskId,
        completed: bool,
    ) -> Result<Subtask, StoreError> {
        let patch = SubtaskPatch {
            completed: Some(!completed),
            ..SubtaskPatch::default()
        };
        self.patch_subtask(subtask_id, patch).await
    }

    #[instrument(skip(self, title))]
    pub async fn update_subtask(
        &self,
        subtask_id: SubtaskId,
        title: String,
    ) -> Result<Subtask, StoreError> {
        let patch = SubtaskPatch {
            title: Some(title),
            ..SubtaskPatch::default()
        };
        self.patch_subtask(subtask_id, patch).await
    }

    #[instrument(skip(self))]
    pub async fn delete_subtask(&self, subtask_id: SubtaskId) -> Result<(), StoreError> {
        let owner = self.owner_of(subtask_id)?;
        self.remote().delete_subtask(subtask_id).await?;

        if let Some(task) = self.inner.state.lock().active_mut(owner) {
            task.subtasks.retain(|sub| sub.id != subtask_id);
        }
        debug!(task_id = %owner, %subtask_id, "subtask deleted");
        Ok(())
    }

    /// Renumbers the given subtasks 0.. in sequence, one remote write per
    /// subtask, then refetches. Stops at the first failed write.
    #[instrument(skip(self, ordered))]
    pub async fn update_subtask_order(
        &self,
        task_id: TaskId,
        ordered: &[SubtaskId],
    ) -> Result<(), StoreError> {
        if self.inner.state.lock().active_index(task_id).is_none() {
            return Err(StoreError::TaskNotFound(task_id));
        }

        let mut outcome = Ok(());
        for (id, order) in ordered.iter().copied().zip(0..) {
            let patch = SubtaskPatch {
                order: Some(order),
                ..SubtaskPatch::default()
            };
            if let Err(err) = self.remote().update_subtask(id, patch).await {
                warn!(%task_id, subtask_id = %id, error = %err, "subtask reorder interrupted");
                outcome = Err(err.into());
                break;
            }
        }

        self.refresh().await;
        outcome
    }

    fn owner_of(&self, subtask_id: SubtaskId) -> Result<TaskId, StoreError> {
        self.inner
            .state
            .lock()
            .subtask_owner(subtask_id)
            .ok_or(StoreError::SubtaskNotFound(subtask_id))
    }

    async fn patch_subtask(
        &self,
        subtask_id: SubtaskId,
        patch: SubtaskPatch,
    ) -> Result<Subtask, StoreError> {
        let owner = self.owner_of(subtask_id)?;
        let updated = self.remote().update_subtask(subtask_id, patch).await?;

        let mut state = self.inner.state.lock();
        if let Some(sub) = state
            .active_mut(owner)
            .and_then(|task| task.subtasks.iter_mut().find(|sub| sub.id == subtask_id))
        {
            *sub = updated.clone();
        }
        Ok(updated)
    }
}
