use std::cmp::Reverse;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tasklane_shared::{
    ColumnId, ColumnPatch, KanbanColumn, NewColumn, NewRecurrence, NewSubtask, NewTask, Recurrence,
    RecurrenceId, Subtask, SubtaskId, SubtaskPatch, Task, TaskId, TaskPatch, TaskStatus,
};
use uuid::Uuid;

use super::{RemoteError, Table, TaskQuery, TaskScope};

/// Row storage with the relational rules the hosted datastore enforces:
/// server-assigned ids and timestamps, subtasks joined onto their task,
/// and cascading subtask deletes.
///
/// Task rows are kept with an empty `subtasks` list; selects join them.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub tasks: Vec<Task>,
    pub subtasks: Vec<Subtask>,
    pub recurrences: Vec<Recurrence>,
    pub columns: Vec<KanbanColumn>,
}

impl Tables {
    pub fn select_tasks(&self, query: TaskQuery) -> Vec<Task> {
        let mut out: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| match query.scope {
                TaskScope::Active => task.status != TaskStatus::Trash,
                TaskScope::Trash => task.status == TaskStatus::Trash,
            })
            .map(|task| self.with_subtasks(task))
            .collect();

        match query.scope {
            TaskScope::Active => out.sort_by_key(|task| Reverse(task.created_at)),
            TaskScope::Trash => out.sort_by_key(|task| Reverse(task.trash_date)),
        }
        out
    }

    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.tasks
            .iter()
            .find(|task| task.id == id)
            .map(|task| self.with_subtasks(task))
    }

    pub fn insert_task(&mut self, new: NewTask, now: DateTime<Utc>) -> Task {
        let task = Task {
            id: Uuid::new_v4(),
            title: new.title,
            status: new.status,
            sector: new.sector,
            user_id: new.user_id,
            created_at: now,
            trash_date: None,
            due_at: new.due_at,
            recurrence_id: new.recurrence_id,
            details: new.details,
            subtasks: vec![],
            column_id: new.column_id,
            order: new.order,
        };
        self.tasks.push(task.clone());
        task
    }

    pub fn update_task(&mut self, id: TaskId, patch: &TaskPatch) -> Result<Task, RemoteError> {
        let row = self
            .tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(RemoteError::NotFound {
                table: Table::Tasks,
                id,
            })?;
        patch.apply(row);
        let row = row.clone();
        Ok(self.with_subtasks(&row))
    }

    /// Rows missing from `ids` are skipped, like an `IN` filter would.
    pub fn update_tasks(&mut self, ids: &[TaskId], patch: &TaskPatch) -> Vec<TaskId> {
        let wanted: HashSet<&TaskId> = ids.iter().collect();
        let mut touched = Vec::new();
        for task in self.tasks.iter_mut().filter(|task| wanted.contains(&task.id)) {
            patch.apply(task);
            touched.push(task.id);
        }
        touched
    }

    pub fn delete_tasks(&mut self, ids: &[TaskId]) -> Vec<TaskId> {
        let wanted: HashSet<&TaskId> = ids.iter().collect();
        let removed: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|task| wanted.contains(&task.id))
            .map(|task| task.id)
            .collect();
        self.tasks.retain(|task| !wanted.contains(&task.id));
        self.subtasks.retain(|sub| !wanted.contains(&sub.task_id));
        removed
    }

    pub fn insert_subtasks(
        &mut self,
        new: Vec<NewSubtask>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Subtask>, RemoteError> {
        if let Some(orphan) = new
            .iter()
            .find(|sub| !self.tasks.iter().any(|task| task.id == sub.task_id))
        {
            return Err(RemoteError::Rejected {
                op: "insert_subtasks",
                reason: format!("task {} does not exist", orphan.task_id),
            });
        }

        let created: Vec<Subtask> = new
            .into_iter()
            .map(|sub| Subtask {
                id: Uuid::new_v4(),
                task_id: sub.task_id,
                title: sub.title,
                completed: sub.completed,
                order: sub.order,
                created_at: now,
            })
            .collect();
        self.subtasks.extend(created.iter().cloned());
        Ok(created)
    }

    pub fn update_subtask(
        &mut self,
        id: SubtaskId,
        patch: &SubtaskPatch,
    ) -> Result<Subtask, RemoteError> {
        let row = self
            .subtasks
            .iter_mut()
            .find(|sub| sub.id == id)
            .ok_or(RemoteError::NotFound {
                table: Table::Subtasks,
                id,
            })?;
        patch.apply(row);
        Ok(row.clone())
    }

    pub fn delete_subtask(&mut self, id: SubtaskId) -> Result<TaskId, RemoteError> {
        let idx = self
            .subtasks
            .iter()
            .position(|sub| sub.id == id)
            .ok_or(RemoteError::NotFound {
                table: Table::Subtasks,
                id,
            })?;
        Ok(self.subtasks.remove(idx).task_id)
    }

    pub fn delete_subtasks_for_task(&mut self, task_id: TaskId) -> Vec<SubtaskId> {
        let removed = self
            .subtasks
            .iter()
            .filter(|sub| sub.task_id == task_id)
            .map(|sub| sub.id)
            .collect();
        self.subtasks.retain(|sub| sub.task_id != task_id);
        removed
    }

    pub fn insert_recurrence(&mut self, new: NewRecurrence, now: DateTime<Utc>) -> Recurrence {
        let rule = Recurrence {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            frequency: new.frequency,
            interval: new.interval,
            week_days: new.week_days,
            ends_on: new.ends_on,
            created_at: now,
        };
        self.recurrences.push(rule.clone());
        rule
    }

    pub fn recurrence(&self, id: RecurrenceId) -> Result<Recurrence, RemoteError> {
        self.recurrences
            .iter()
            .find(|rule| rule.id == id)
            .cloned()
            .ok_or(RemoteError::NotFound {
                table: Table::Recurrences,
                id,
            })
    }

    pub fn select_columns(&self) -> Vec<KanbanColumn> {
        let mut out = self.columns.clone();
        out.sort_by_key(|column| (column.order, column.created_at));
        out
    }

    pub fn insert_column(&mut self, new: NewColumn, now: DateTime<Utc>) -> KanbanColumn {
        let column = KanbanColumn {
            id: Uuid::new_v4(),
            title: new.title,
            color: new.color,
            icon: new.icon,
            order: new.order,
            user_id: new.user_id,
            created_at: now,
        };
        self.columns.push(column.clone());
        column
    }

    pub fn update_column(
        &mut self,
        id: ColumnId,
        patch: &ColumnPatch,
    ) -> Result<KanbanColumn, RemoteError> {
        let row = self
            .columns
            .iter_mut()
            .find(|column| column.id == id)
            .ok_or(RemoteError::NotFound {
                table: Table::KanbanColumns,
                id,
            })?;
        patch.apply(row);
        Ok(row.clone())
    }

    pub fn delete_column(&mut self, id: ColumnId) -> Result<(), RemoteError> {
        let before = self.columns.len();
        self.columns.retain(|column| column.id != id);
        if self.columns.len() == before {
            return Err(RemoteError::NotFound {
                table: Table::KanbanColumns,
                id,
            });
        }
        Ok(())
    }

    fn with_subtasks(&self, task: &Task) -> Task {
        let mut joined = task.clone();
        joined.subtasks = self
            .subtasks
            .iter()
            .filter(|sub| sub.task_id == task.id)
            .cloned()
            .collect();
        joined.subtasks.sort_by_key(|sub| (sub.order, sub.created_at));
        joined
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0)
            .single()
            .expect("valid date")
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            status: TaskStatus::Todo,
            sector: vec!["general".to_string()],
            user_id: "u-1".to_string(),
            due_at: None,
            recurrence_id: None,
            details: None,
            column_id: None,
            order: None,
        }
    }

    #[test]
    fn active_select_orders_newest_first_and_joins_subtasks() {
        let mut tables = Tables::default();
        let older = tables.insert_task(new_task("older"), at(1));
        let newer = tables.insert_task(new_task("newer"), at(2));
        tables
            .insert_subtasks(
                vec![
                    NewSubtask {
                        task_id: older.id,
                        title: "second".to_string(),
                        completed: false,
                        order: 1,
                    },
                    NewSubtask {
                        task_id: older.id,
                        title: "first".to_string(),
                        completed: false,
                        order: 0,
                    },
                ],
                at(1),
            )
            .expect("insert subtasks");

        let active = tables.select_tasks(TaskQuery::active());
        assert_eq!(active[0].id, newer.id);
        assert_eq!(active[1].subtasks[0].title, "first");
        assert_eq!(active[1].subtasks[1].title, "second");
    }

    #[test]
    fn trash_select_orders_by_trash_date() {
        let mut tables = Tables::default();
        let a = tables.insert_task(new_task("a"), at(1));
        let b = tables.insert_task(new_task("b"), at(1));
        tables
            .update_task(a.id, &TaskPatch::trashed(at(5)))
            .expect("trash a");
        tables
            .update_task(b.id, &TaskPatch::trashed(at(5) + Duration::hours(1)))
            .expect("trash b");

        let trash = tables.select_tasks(TaskQuery::trash());
        let ids: Vec<TaskId> = trash.iter().map(|task| task.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
        assert!(tables.select_tasks(TaskQuery::active()).is_empty());
    }

    #[test]
    fn deleting_a_task_cascades_to_subtasks() {
        let mut tables = Tables::default();
        let task = tables.insert_task(new_task("parent"), at(1));
        tables
            .insert_subtasks(
                vec![NewSubtask {
                    task_id: task.id,
                    title: "child".to_string(),
                    completed: false,
                    order: 0,
                }],
                at(1),
            )
            .expect("insert subtask");

        let removed = tables.delete_tasks(&[task.id]);
        assert_eq!(removed, vec![task.id]);
        assert!(tables.subtasks.is_empty());
    }

    #[test]
    fn subtasks_require_an_existing_task() {
        let mut tables = Tables::default();
        let err = tables
            .insert_subtasks(
                vec![NewSubtask {
                    task_id: Uuid::new_v4(),
                    title: "orphan".to_string(),
                    completed: false,
                    order: 0,
                }],
                at(1),
            )
            .expect_err("orphan subtask should be rejected");
        assert!(matches!(err, RemoteError::Rejected { .. }));
    }
}
