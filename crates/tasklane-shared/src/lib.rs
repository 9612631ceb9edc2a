//! Entity shapes shared by the task store and
//! any view sitting on top of it.
//!
//! These mirror the persisted tables
//! (`tasks`, `subtasks`, `recurrences`,
//! `kanban_columns`) plus the insert and
//! patch payloads the store sends to the
//! remote side.

use chrono::{
  DateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};
use uuid::Uuid;

pub type TaskId = Uuid;
pub type SubtaskId = Uuid;
pub type RecurrenceId = Uuid;
pub type ColumnId = Uuid;
pub type SectorId = String;
pub type UserId = String;

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
  Todo,
  Doing,
  Done,
  Trash
}

impl TaskStatus {
  /// `done` flips back to `todo`;
  /// everything else, `doing`
  /// included, resolves to `done`.
  #[must_use]
  pub fn toggled(self) -> Self {
    match self {
      | TaskStatus::Done => {
        TaskStatus::Todo
      }
      | _ => TaskStatus::Done
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      | TaskStatus::Todo => "todo",
      | TaskStatus::Doing => "doing",
      | TaskStatus::Done => "done",
      | TaskStatus::Trash => "trash"
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
  Daily,
  Weekly,
  Monthly,
  Yearly
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct Subtask {
  pub id:         SubtaskId,
  pub task_id:    TaskId,
  pub title:      String,
  #[serde(default)]
  pub completed:  bool,
  #[serde(default)]
  pub order:      i64,
  pub created_at: DateTime<Utc>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct Task {
  pub id:            TaskId,
  pub title:         String,
  pub status:        TaskStatus,
  #[serde(default)]
  pub sector:        Vec<SectorId>,
  pub user_id:       UserId,
  pub created_at:    DateTime<Utc>,
  #[serde(default)]
  pub trash_date:    Option<DateTime<Utc>>,
  #[serde(default)]
  pub due_at:        Option<DateTime<Utc>>,
  #[serde(default)]
  pub recurrence_id: Option<RecurrenceId>,
  #[serde(default)]
  pub details:       Option<String>,
  #[serde(default)]
  pub subtasks:      Vec<Subtask>,
  #[serde(default)]
  pub column_id:     Option<ColumnId>,
  #[serde(default)]
  pub order:         Option<i64>
}

impl Task {
  /// Status is `trash` exactly when a
  /// trash timestamp is present.
  pub fn trash_state_consistent(
    &self
  ) -> bool {
    (self.status == TaskStatus::Trash)
      == self.trash_date.is_some()
  }

  pub fn has_sector(
    &self,
    sector: &str
  ) -> bool {
    self.sector.iter().any(|s| s == sector)
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct Recurrence {
  pub id:         RecurrenceId,
  pub user_id:    UserId,
  pub frequency:  Frequency,
  pub interval:   u32,
  /// 0 = Sunday .. 6 = Saturday.
  #[serde(default)]
  pub week_days:  Option<Vec<u8>>,
  #[serde(default)]
  pub ends_on:    Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct KanbanColumn {
  pub id:         ColumnId,
  pub title:      String,
  pub color:      String,
  #[serde(default)]
  pub icon:       Option<String>,
  #[serde(default)]
  pub order:      i64,
  #[serde(default)]
  pub user_id:    UserId,
  pub created_at: DateTime<Utc>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct Sector {
  pub id:    SectorId,
  pub label: String,
  #[serde(default)]
  pub color: Option<String>
}

impl Sector {
  pub fn new(
    id: impl Into<SectorId>,
    label: impl Into<String>
  ) -> Self {
    Self {
      id:    id.into(),
      label: label.into(),
      color: None
    }
  }

  /// The catch-all sector is recognised
  /// by its label, in either spelling.
  pub fn is_general(&self) -> bool {
    let label =
      self.label.trim().to_lowercase();
    label == "geral" || label == "general"
  }
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct RecurrenceInput {
  pub frequency: Frequency,
  pub interval:  u32,
  #[serde(default)]
  pub week_days: Option<Vec<u8>>,
  #[serde(default)]
  pub ends_on:   Option<DateTime<Utc>>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct SubtaskDraft {
  pub title:     String,
  #[serde(default)]
  pub completed: bool
}

impl SubtaskDraft {
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title:     title.into(),
      completed: false
    }
  }
}

/// What a caller supplies to create a task.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct TaskCreate {
  pub title:      String,
  #[serde(default)]
  pub sector:     Vec<SectorId>,
  pub due_at:     Option<DateTime<Utc>>,
  pub recurrence: Option<RecurrenceInput>,
  pub details:    Option<String>,
  #[serde(default)]
  pub subtasks:   Vec<SubtaskDraft>,
  pub column_id:  Option<ColumnId>
}

/// Row payload for `tasks` inserts; the
/// remote side assigns `id` and
/// `created_at`.
#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct NewTask {
  pub title:         String,
  pub status:        TaskStatus,
  pub sector:        Vec<SectorId>,
  pub user_id:       UserId,
  pub due_at:        Option<DateTime<Utc>>,
  pub recurrence_id: Option<RecurrenceId>,
  pub details:       Option<String>,
  pub column_id:     Option<ColumnId>,
  pub order:         Option<i64>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct NewSubtask {
  pub task_id:   TaskId,
  pub title:     String,
  pub completed: bool,
  pub order:     i64
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct NewRecurrence {
  pub user_id:   UserId,
  pub frequency: Frequency,
  pub interval:  u32,
  pub week_days: Option<Vec<u8>>,
  pub ends_on:   Option<DateTime<Utc>>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct NewColumn {
  pub user_id: UserId,
  pub title:   String,
  pub color:   String,
  pub icon:    Option<String>,
  pub order:   i64
}

/// Partial update for a task row. The
/// outer `Option` says whether the field
/// is touched, the inner one whether it is
/// cleared.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
pub struct TaskPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title:         Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status:        Option<TaskStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sector:        Option<Vec<SectorId>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub trash_date:
    Option<Option<DateTime<Utc>>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_at:
    Option<Option<DateTime<Utc>>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub recurrence_id:
    Option<Option<RecurrenceId>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details:       Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub column_id:
    Option<Option<ColumnId>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub order:         Option<Option<i64>>
}

impl TaskPatch {
  pub fn status(status: TaskStatus) -> Self {
    Self {
      status: Some(status),
      ..Self::default()
    }
  }

  pub fn trashed(at: DateTime<Utc>) -> Self {
    Self {
      status: Some(TaskStatus::Trash),
      trash_date: Some(Some(at)),
      ..Self::default()
    }
  }

  pub fn restored() -> Self {
    Self {
      status: Some(TaskStatus::Todo),
      trash_date: Some(None),
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }

  pub fn apply(&self, task: &mut Task) {
    if let Some(title) = &self.title {
      task.title = title.clone();
    }
    if let Some(status) = self.status {
      task.status = status;
    }
    if let Some(sector) = &self.sector {
      task.sector = sector.clone();
    }
    if let Some(trash_date) = self.trash_date {
      task.trash_date = trash_date;
    }
    if let Some(due_at) = self.due_at {
      task.due_at = due_at;
    }
    if let Some(recurrence_id) =
      self.recurrence_id
    {
      task.recurrence_id = recurrence_id;
    }
    if let Some(details) = &self.details {
      task.details = details.clone();
    }
    if let Some(column_id) = self.column_id
    {
      task.column_id = column_id;
    }
    if let Some(order) = self.order {
      task.order = order;
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
pub struct SubtaskPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title:     Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub completed: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub order:     Option<i64>
}

impl SubtaskPatch {
  pub fn apply(&self, subtask: &mut Subtask) {
    if let Some(title) = &self.title {
      subtask.title = title.clone();
    }
    if let Some(completed) = self.completed {
      subtask.completed = completed;
    }
    if let Some(order) = self.order {
      subtask.order = order;
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
pub struct ColumnPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon:  Option<Option<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub order: Option<i64>
}

impl ColumnPatch {
  pub fn apply(
    &self,
    column: &mut KanbanColumn
  ) {
    if let Some(title) = &self.title {
      column.title = title.clone();
    }
    if let Some(color) = &self.color {
      column.color = color.clone();
    }
    if let Some(icon) = &self.icon {
      column.icon = icon.clone();
    }
    if let Some(order) = self.order {
      column.order = order;
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn sample_task() -> Task {
    Task {
      id:            Uuid::new_v4(),
      title:         "Water plants".to_string(),
      status:        TaskStatus::Todo,
      sector:        vec!["home".to_string()],
      user_id:       "u-1".to_string(),
      created_at:    Utc
        .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
        .single()
        .expect("valid date"),
      trash_date:    None,
      due_at:        None,
      recurrence_id: None,
      details:       None,
      subtasks:      vec![],
      column_id:     None,
      order:         None
    }
  }

  #[test]
  fn toggle_cycle_skips_doing() {
    assert_eq!(
      TaskStatus::Todo.toggled(),
      TaskStatus::Done
    );
    assert_eq!(
      TaskStatus::Doing.toggled(),
      TaskStatus::Done
    );
    assert_eq!(
      TaskStatus::Done.toggled(),
      TaskStatus::Todo
    );
  }

  #[test]
  fn patch_clears_nullable_fields() {
    let mut task = sample_task();
    task.details = Some("old".to_string());

    let patch = TaskPatch {
      details: Some(None),
      title: Some("Water garden".to_string()),
      ..TaskPatch::default()
    };
    patch.apply(&mut task);

    assert_eq!(task.details, None);
    assert_eq!(task.title, "Water garden");
    assert_eq!(task.sector, vec!["home".to_string()]);
  }

  #[test]
  fn trash_patches_keep_invariant() {
    let mut task = sample_task();
    let at = task.created_at;

    TaskPatch::trashed(at).apply(&mut task);
    assert!(task.trash_state_consistent());
    assert_eq!(task.status, TaskStatus::Trash);

    TaskPatch::restored().apply(&mut task);
    assert!(task.trash_state_consistent());
    assert_eq!(task.trash_date, None);
  }

  #[test]
  fn patch_serializes_only_touched_fields() {
    let patch = TaskPatch {
      column_id: Some(None),
      ..TaskPatch::default()
    };
    let json = serde_json::to_value(&patch)
      .expect("serialize patch");
    assert_eq!(
      json,
      serde_json::json!({ "column_id": null })
    );
  }

  #[test]
  fn general_sector_matches_both_labels() {
    assert!(Sector::new("g", "Geral").is_general());
    assert!(Sector::new("g", " GENERAL ").is_general());
    assert!(!Sector::new("w", "Work").is_general());
  }

  #[test]
  fn status_uses_lowercase_wire_names() {
    let json = serde_json::to_string(
      &TaskStatus::Trash
    )
    .expect("serialize status");
    assert_eq!(json, "\"trash\"");
  }
}
