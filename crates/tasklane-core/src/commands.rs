use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tasklane_shared::{
    ColumnId, ColumnPatch, KanbanColumn, RecurrenceInput, Sector, SectorId, SubtaskDraft,
    SubtaskId, Task, TaskCreate, TaskId, TaskPatch,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::cli::{AddArgs, ColumnCommand, Command, EditArgs, ListArgs, SubtaskCommand};
use crate::config::Config;
use crate::datetime::parse_date_expr;
use crate::render::{Renderer, short_id};
use crate::store::TaskStore;

/// Resolves `token` to the one id whose hex form starts with it. Full
/// UUIDs are accepted in any notation.
pub fn resolve_id_prefix<I>(token: &str, candidates: I, what: &str) -> anyhow::Result<Uuid>
where
    I: IntoIterator<Item = Uuid>,
{
    if let Ok(id) = Uuid::parse_str(token) {
        return Ok(id);
    }

    let needle = token.trim().replace('-', "").to_ascii_lowercase();
    if needle.is_empty() {
        return Err(anyhow!("empty {what} id"));
    }

    let mut matches = candidates
        .into_iter()
        .filter(|id| id.simple().to_string().starts_with(&needle));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no {what} matches '{token}'"))?;
    if matches.next().is_some() {
        return Err(anyhow!("'{token}' matches more than one {what}; use more characters"));
    }
    Ok(first)
}

/// Finds a configured sector by id or label, case-insensitively. Unknown
/// names pass through as ids.
pub fn resolve_sector(token: &str, sectors: &[Sector]) -> SectorId {
    let wanted = token.trim();
    sectors
        .iter()
        .find(|sector| {
            sector.id.eq_ignore_ascii_case(wanted) || sector.label.eq_ignore_ascii_case(wanted)
        })
        .map(|sector| sector.id.clone())
        .unwrap_or_else(|| wanted.to_string())
}

#[instrument(skip(store, cfg, renderer, command))]
pub async fn dispatch(
    store: &TaskStore,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let now = Utc::now();
    debug!(?command, "dispatching command");

    match command {
        Command::List(args) => cmd_list(store, cfg, renderer, args, now),
        Command::Trash => renderer.print_trash_table(
            &store.trash_tasks(),
            now,
            store.settings().trash_retention_days,
        ),
        Command::Board(args) => {
            apply_sector_filter(store, cfg, &args);
            renderer.print_board(&store.board(), now)
        }
        Command::Info { task } => {
            let id = active_or_trashed(store, &task)?;
            let task = store
                .task(id)
                .ok_or_else(|| anyhow!("task {id} is not loaded"))?;
            renderer.print_task_info(&task)
        }
        Command::Add(args) => cmd_add(store, cfg, renderer, args, now).await,
        Command::Done { task } => {
            let id = active_task(store, &task)?;
            let current = store
                .task(id)
                .map(|task| task.status)
                .ok_or_else(|| anyhow!("task {id} is not loaded"))?;
            let next = store.toggle_task(id, current).await?;
            println!("{} is now {}", short_id(id), next.as_str());
            Ok(())
        }
        Command::Edit(args) => cmd_edit(store, renderer, args, now).await,
        Command::Rm { task } => {
            let id = active_task(store, &task)?;
            store.move_to_trash(id).await?;
            println!("Moved {} to the trash.", short_id(id));
            Ok(())
        }
        Command::Restore { task } => {
            let id = trashed_task(store, &task)?;
            store.restore_task(id).await?;
            println!("Restored {}.", short_id(id));
            Ok(())
        }
        Command::Purge { task } => {
            let id = trashed_task(store, &task)?;
            store.permanently_delete_task(id).await?;
            println!("Deleted {} permanently.", short_id(id));
            Ok(())
        }
        Command::EmptyTrash => {
            let count = store.empty_trash().await?;
            println!("Deleted {count} task(s) from the trash.");
            Ok(())
        }
        Command::ClearDone => {
            let count = store.clear_done_tasks().await?;
            println!("Moved {count} done task(s) to the trash.");
            Ok(())
        }
        Command::Sector { task, sector } => {
            let id = active_task(store, &task)?;
            let sectors = &store.settings().sectors;
            let sector_id = resolve_sector(&sector, sectors);
            let next = store.toggle_task_sector(id, &sector_id, sectors).await?;
            println!("{} sectors: {}", short_id(id), next.join(", "));
            Ok(())
        }
        Command::Subtask(sub) => cmd_subtask(store, sub).await,
        Command::Column(col) => cmd_column(store, renderer, col).await,
        Command::Move { task, column, at } => {
            let task_id = active_task(store, &task)?;
            let column_id = column_ref(store, &column)?;
            store.move_task_to_column(task_id, column_id, at).await?;
            println!("Moved {} to {}.", short_id(task_id), short_id(column_id));
            Ok(())
        }
    }
}

fn cmd_list(
    store: &TaskStore,
    cfg: &Config,
    renderer: &Renderer,
    args: ListArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    apply_sector_filter(store, cfg, &args);
    renderer.print_task_table(&store.visible_tasks(), now)
}

fn apply_sector_filter(store: &TaskStore, cfg: &Config, args: &ListArgs) {
    let filter = args
        .sector
        .as_deref()
        .map(|sector| resolve_sector(sector, &cfg.sectors()));
    store.set_sector_filter(filter);
}

#[instrument(skip(store, cfg, renderer, args, now))]
async fn cmd_add(
    store: &TaskStore,
    cfg: &Config,
    renderer: &Renderer,
    args: AddArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let tz = renderer.timezone();
    let title = args.title.join(" ");
    if title.trim().is_empty() {
        return Err(anyhow!("task title cannot be empty"));
    }

    let due_at = args
        .due
        .as_deref()
        .map(|raw| parse_date_expr(raw, now, tz))
        .transpose()
        .context("invalid --due")?;

    let recurrence = match args.repeat.frequency {
        Some(frequency) => Some(RecurrenceInput {
            frequency: frequency.into(),
            interval: args.repeat.interval,
            week_days: (!args.repeat.week_days.is_empty()).then_some(args.repeat.week_days),
            ends_on: args
                .repeat
                .until
                .as_deref()
                .map(|raw| parse_date_expr(raw, now, tz))
                .transpose()
                .context("invalid --until")?,
        }),
        None => None,
    };

    let column_id = args
        .column
        .as_deref()
        .map(|raw| column_ref(store, raw))
        .transpose()?;

    let input = TaskCreate {
        title,
        sector: args
            .sectors
            .iter()
            .map(|raw| resolve_sector(raw, &cfg.sectors()))
            .collect(),
        due_at,
        recurrence,
        details: args.details,
        subtasks: args.subtasks.into_iter().map(SubtaskDraft::new).collect(),
        column_id,
    };

    let task = store.add_task(input).await?;
    info!(id = %task.id, "task added");
    println!("Created task {}.", short_id(task.id));
    Ok(())
}

#[instrument(skip(store, renderer, args, now))]
async fn cmd_edit(
    store: &TaskStore,
    renderer: &Renderer,
    args: EditArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let tz = renderer.timezone();
    // Status edits apply to active tasks only; `rm` and `restore` handle the trash.
    let id = if args.status.is_some() {
        active_task(store, &args.task)?
    } else {
        active_or_trashed(store, &args.task)?
    };

    let due_at = match (args.due.as_deref(), args.no_due) {
        (Some(raw), _) => Some(Some(
            parse_date_expr(raw, now, tz).context("invalid --due")?,
        )),
        (None, true) => Some(None),
        (None, false) => None,
    };
    let details = match (args.details, args.no_details) {
        (Some(text), _) => Some(Some(text)),
        (None, true) => Some(None),
        (None, false) => None,
    };

    let patch = TaskPatch {
        title: args.title,
        status: args.status.map(Into::into),
        due_at,
        details,
        ..TaskPatch::default()
    };

    if args.subtasks.is_empty() {
        store.update_task(id, patch).await?;
    } else {
        let drafts = args.subtasks.into_iter().map(SubtaskDraft::new).collect();
        store.update_task_with_subtasks(id, patch, drafts).await?;
    }
    println!("Updated {}.", short_id(id));
    Ok(())
}

async fn cmd_subtask(store: &TaskStore, command: SubtaskCommand) -> anyhow::Result<()> {
    match command {
        SubtaskCommand::Add { task, title } => {
            let task_id = active_task(store, &task)?;
            let sub = store.add_subtask(task_id, non_empty_title(title)?).await?;
            println!("Added subtask {}.", short_id(sub.id));
        }
        SubtaskCommand::Toggle { subtask } => {
            let (id, completed) = subtask_ref(store, &subtask)?;
            let sub = store.toggle_subtask(id, completed).await?;
            let state = if sub.completed { "done" } else { "open" };
            println!("Subtask {} is {state}.", short_id(id));
        }
        SubtaskCommand::Rm { subtask } => {
            let (id, _) = subtask_ref(store, &subtask)?;
            store.delete_subtask(id).await?;
            println!("Deleted subtask {}.", short_id(id));
        }
        SubtaskCommand::Rename { subtask, title } => {
            let (id, _) = subtask_ref(store, &subtask)?;
            store.update_subtask(id, non_empty_title(title)?).await?;
            println!("Renamed subtask {}.", short_id(id));
        }
        SubtaskCommand::Reorder { task, subtasks } => {
            let task_id = active_task(store, &task)?;
            let owned: Vec<SubtaskId> = store
                .task(task_id)
                .map(|task| task.subtasks.iter().map(|sub| sub.id).collect())
                .unwrap_or_default();
            let ordered = subtasks
                .iter()
                .map(|token| resolve_id_prefix(token, owned.iter().copied(), "subtask"))
                .collect::<anyhow::Result<Vec<_>>>()?;
            store.update_subtask_order(task_id, &ordered).await?;
            println!("Reordered {} subtask(s).", ordered.len());
        }
    }
    Ok(())
}

async fn cmd_column(
    store: &TaskStore,
    renderer: &Renderer,
    command: ColumnCommand,
) -> anyhow::Result<()> {
    match command {
        ColumnCommand::List => renderer.print_columns(&store.columns())?,
        ColumnCommand::Add { title, color, icon } => {
            let column = store
                .add_column(non_empty_title(title)?, color, icon)
                .await?;
            println!("Added column {}.", short_id(column.id));
        }
        ColumnCommand::Rm { column } => {
            let id = column_ref(store, &column)?;
            store.delete_column(id).await?;
            println!("Deleted column {}.", short_id(id));
        }
        ColumnCommand::Rename {
            column,
            title,
            color,
        } => {
            let id = column_ref(store, &column)?;
            let patch = ColumnPatch {
                title: Some(non_empty_title(title)?),
                color,
                ..ColumnPatch::default()
            };
            store.update_column(id, patch).await?;
            println!("Updated column {}.", short_id(id));
        }
        ColumnCommand::Move { column, position } => {
            let id = column_ref(store, &column)?;
            let mut ordered: Vec<ColumnId> =
                store.columns().iter().map(|column| column.id).collect();
            ordered.retain(|existing| *existing != id);
            ordered.insert(position.min(ordered.len()), id);
            store.reorder_columns(&ordered).await?;
            println!("Moved column {} to position {position}.", short_id(id));
        }
        ColumnCommand::Sort { column, tasks } => {
            let column_id = column_ref(store, &column)?;
            let active: Vec<TaskId> = store.tasks().iter().map(|task| task.id).collect();
            let ordered = tasks
                .iter()
                .map(|token| resolve_id_prefix(token, active.iter().copied(), "task"))
                .collect::<anyhow::Result<Vec<_>>>()?;
            store.reorder_tasks(Some(column_id), &ordered).await?;
            println!("Sorted {} card(s).", ordered.len());
        }
    }
    Ok(())
}

fn non_empty_title(words: Vec<String>) -> anyhow::Result<String> {
    let title = words.join(" ");
    if title.trim().is_empty() {
        return Err(anyhow!("title cannot be empty"));
    }
    Ok(title)
}

fn ids(tasks: &[Task]) -> impl Iterator<Item = TaskId> + '_ {
    tasks.iter().map(|task| task.id)
}

fn active_task(store: &TaskStore, token: &str) -> anyhow::Result<TaskId> {
    resolve_id_prefix(token, ids(&store.tasks()).collect::<Vec<_>>(), "active task")
}

fn trashed_task(store: &TaskStore, token: &str) -> anyhow::Result<TaskId> {
    resolve_id_prefix(token, ids(&store.trash_tasks()).collect::<Vec<_>>(), "trashed task")
}

fn active_or_trashed(store: &TaskStore, token: &str) -> anyhow::Result<TaskId> {
    let state = store.snapshot();
    let all: Vec<TaskId> = ids(&state.tasks).chain(ids(&state.trash_tasks)).collect();
    resolve_id_prefix(token, all, "task")
}

/// Columns match by id prefix or, failing that, by exact title.
fn column_ref(store: &TaskStore, token: &str) -> anyhow::Result<ColumnId> {
    let columns: Vec<KanbanColumn> = store.columns();
    if let Some(column) = columns
        .iter()
        .find(|column| column.title.eq_ignore_ascii_case(token.trim()))
    {
        return Ok(column.id);
    }
    resolve_id_prefix(token, columns.iter().map(|column| column.id), "column")
}

/// The subtask id plus its current completion flag.
fn subtask_ref(store: &TaskStore, token: &str) -> anyhow::Result<(SubtaskId, bool)> {
    let subtasks: Vec<(SubtaskId, bool)> = store
        .tasks()
        .iter()
        .flat_map(|task| task.subtasks.iter().map(|sub| (sub.id, sub.completed)))
        .collect();
    let id = resolve_id_prefix(token, subtasks.iter().map(|(id, _)| *id), "subtask")?;
    subtasks
        .iter()
        .find(|(candidate, _)| *candidate == id)
        .copied()
        .ok_or_else(|| anyhow!("subtask {id} is not loaded"))
}
