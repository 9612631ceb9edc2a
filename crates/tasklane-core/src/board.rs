use std::cmp::{Ordering, Reverse};

use tasklane_shared::{ColumnId, KanbanColumn, Task, TaskId};

#[derive(Debug, Clone, PartialEq)]
pub struct BoardColumn {
    pub column: KanbanColumn,
    pub tasks: Vec<Task>,
}

pub fn sorted_columns(columns: &[KanbanColumn]) -> Vec<KanbanColumn> {
    let mut out = columns.to_vec();
    out.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.title.cmp(&b.title)));
    out
}

/// Column a task is shown in: its own, or the first column by declared
/// order when it has none or points at a column that no longer exists.
pub fn effective_column_id(task: &Task, columns: &[KanbanColumn]) -> Option<ColumnId> {
    if let Some(id) = task.column_id
        && columns.iter().any(|column| column.id == id)
    {
        return Some(id);
    }
    columns
        .iter()
        .min_by(|a, b| a.order.cmp(&b.order).then_with(|| a.title.cmp(&b.title)))
        .map(|column| column.id)
}

/// Card order inside a column: explicit `order` first, unordered cards
/// after them, newest first.
pub fn card_order(a: &Task, b: &Task) -> Ordering {
    match (a.order, b.order) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Reverse(a.created_at).cmp(&Reverse(b.created_at)),
    }
}

pub fn group_by_column(tasks: &[Task], columns: &[KanbanColumn]) -> Vec<BoardColumn> {
    let mut board: Vec<BoardColumn> = sorted_columns(columns)
        .into_iter()
        .map(|column| BoardColumn {
            column,
            tasks: vec![],
        })
        .collect();

    for task in tasks {
        let Some(target) = effective_column_id(task, columns) else {
            continue;
        };
        if let Some(slot) = board.iter_mut().find(|slot| slot.column.id == target) {
            slot.tasks.push(task.clone());
        }
    }

    for slot in &mut board {
        slot.tasks.sort_by(card_order);
    }
    board
}

/// Ids of the cards shown in `column_id`, in display order.
pub fn column_task_ids(
    tasks: &[Task],
    columns: &[KanbanColumn],
    column_id: ColumnId,
) -> Vec<TaskId> {
    let mut cards: Vec<&Task> = tasks
        .iter()
        .filter(|task| effective_column_id(task, columns) == Some(column_id))
        .collect();
    cards.sort_by(|a, b| card_order(a, b));
    cards.into_iter().map(|task| task.id).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use tasklane_shared::TaskStatus;
    use uuid::Uuid;

    use super::*;

    fn column(title: &str, order: i64) -> KanbanColumn {
        KanbanColumn {
            id: Uuid::new_v4(),
            title: title.to_string(),
            color: "#888888".to_string(),
            icon: None,
            order,
            user_id: "u-1".to_string(),
            created_at: Utc::now(),
        }
    }

    fn task(title: &str, column_id: Option<ColumnId>, order: Option<i64>, age_h: i64) -> Task {
        let base = Utc
            .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .single()
            .expect("valid date");
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            status: TaskStatus::Todo,
            sector: vec!["general".to_string()],
            user_id: "u-1".to_string(),
            created_at: base - Duration::hours(age_h),
            trash_date: None,
            due_at: None,
            recurrence_id: None,
            details: None,
            subtasks: vec![],
            column_id,
            order,
        }
    }

    #[test]
    fn unassigned_tasks_land_in_first_column() {
        let doing = column("Doing", 1);
        let todo = column("Todo", 0);
        let columns = vec![doing.clone(), todo.clone()];
        let tasks = vec![
            task("loose", None, None, 0),
            task("placed", Some(doing.id), None, 0),
            task("stale ref", Some(Uuid::new_v4()), None, 1),
        ];

        let board = group_by_column(&tasks, &columns);

        assert_eq!(board[0].column.id, todo.id);
        let first: Vec<&str> = board[0].tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(first, vec!["loose", "stale ref"]);
        assert_eq!(board[1].tasks[0].title, "placed");
    }

    #[test]
    fn ordered_cards_come_before_unordered_ones() {
        let todo = column("Todo", 0);
        let columns = vec![todo.clone()];
        let tasks = vec![
            task("old loose", None, None, 5),
            task("second", Some(todo.id), Some(1), 0),
            task("new loose", None, None, 1),
            task("first", Some(todo.id), Some(0), 0),
        ];

        let titles: Vec<String> = group_by_column(&tasks, &columns)[0]
            .tasks
            .iter()
            .map(|t| t.title.clone())
            .collect();
        assert_eq!(titles, vec!["first", "second", "new loose", "old loose"]);
    }

    #[test]
    fn no_columns_means_empty_board() {
        let tasks = vec![task("loose", None, None, 0)];
        assert!(group_by_column(&tasks, &[]).is_empty());
    }
}
