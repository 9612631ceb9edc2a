use tasklane_shared::{ColumnId, KanbanColumn, SectorId, SubtaskId, Task, TaskId};

/// Everything the store keeps in memory. Views read clones of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    /// Non-trash tasks, newest first.
    pub tasks: Vec<Task>,
    /// Trashed tasks, most recently trashed first.
    pub trash_tasks: Vec<Task>,
    pub columns: Vec<KanbanColumn>,
    pub loading: bool,
    pub sector_filter: Option<SectorId>,
}

impl StoreState {
    pub fn active_index(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    pub fn trash_index(&self, id: TaskId) -> Option<usize> {
        self.trash_tasks.iter().position(|task| task.id == id)
    }

    pub fn active_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    pub fn column_index(&self, id: ColumnId) -> Option<usize> {
        self.columns.iter().position(|column| column.id == id)
    }

    /// Active task owning `subtask_id`.
    pub fn subtask_owner(&self, subtask_id: SubtaskId) -> Option<TaskId> {
        self.tasks
            .iter()
            .find(|task| task.subtasks.iter().any(|sub| sub.id == subtask_id))
            .map(|task| task.id)
    }

    /// Inserts into the active list keeping newest-first order.
    pub fn insert_active_sorted(&mut self, task: Task) {
        let idx = self
            .tasks
            .iter()
            .position(|existing| existing.created_at < task.created_at)
            .unwrap_or(self.tasks.len());
        self.tasks.insert(idx, task);
    }

    /// Swaps the temporary entry `id` for the stored row, or prepends the
    /// row when a refetch dropped the temporary entry meanwhile. If that
    /// refetch already brought the row in, the loaded copy is kept and only
    /// gains the subtasks it could not see yet.
    pub fn replace_active(&mut self, id: TaskId, task: Task) {
        let temp = self.active_index(id);
        match self.active_index(task.id) {
            Some(existing) => {
                if self.tasks[existing].subtasks.is_empty() {
                    self.tasks[existing].subtasks = task.subtasks;
                }
                if let Some(idx) = temp {
                    self.tasks.remove(idx);
                }
            }
            None => match temp {
                Some(idx) => self.tasks[idx] = task,
                None => self.tasks.insert(0, task),
            },
        }
    }

    pub fn visible_tasks(&self) -> Vec<Task> {
        match &self.sector_filter {
            Some(sector) => self
                .tasks
                .iter()
                .filter(|task| task.has_sector(sector))
                .cloned()
                .collect(),
            None => self.tasks.clone(),
        }
    }

    pub fn next_column_order(&self) -> i64 {
        self.columns
            .iter()
            .map(|column| column.order)
            .max()
            .map_or(0, |max| max + 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tasklane_shared::{Subtask, TaskStatus};
    use uuid::Uuid;

    use super::*;

    fn task(title: &str) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            status: TaskStatus::Todo,
            sector: vec!["general".to_string()],
            user_id: "u-1".to_string(),
            created_at: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .expect("valid date"),
            trash_date: None,
            due_at: None,
            recurrence_id: None,
            details: None,
            subtasks: vec![],
            column_id: None,
            order: None,
        }
    }

    fn with_subtask(mut task: Task, title: &str) -> Task {
        task.subtasks.push(Subtask {
            id: Uuid::new_v4(),
            task_id: task.id,
            title: title.to_string(),
            completed: false,
            order: 0,
            created_at: task.created_at,
        });
        task
    }

    #[test]
    fn temporary_entry_is_swapped_in_place() {
        let placeholder = task("draft");
        let other = task("other");
        let mut state = StoreState {
            tasks: vec![placeholder.clone(), other.clone()],
            ..StoreState::default()
        };

        let stored = with_subtask(task("draft"), "step");
        state.replace_active(placeholder.id, stored.clone());

        assert_eq!(state.tasks, vec![stored, other]);
    }

    #[test]
    fn refetched_row_keeps_its_place_and_gains_subtasks() {
        let stored = with_subtask(task("draft"), "step");
        let mut refetched = stored.clone();
        refetched.subtasks.clear();
        let mut state = StoreState {
            tasks: vec![refetched],
            ..StoreState::default()
        };

        state.replace_active(Uuid::new_v4(), stored.clone());

        assert_eq!(state.tasks, vec![stored]);
    }

    #[test]
    fn placeholder_and_refetched_row_collapse_to_one() {
        let placeholder = task("draft");
        let stored = with_subtask(task("draft"), "step");
        let mut refetched = stored.clone();
        refetched.subtasks.clear();
        let mut state = StoreState {
            tasks: vec![placeholder.clone(), refetched],
            ..StoreState::default()
        };

        state.replace_active(placeholder.id, stored.clone());

        assert_eq!(state.tasks, vec![stored]);
    }
}
