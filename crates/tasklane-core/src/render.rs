use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tasklane_shared::{KanbanColumn, Task, TaskStatus};
use unicode_width::UnicodeWidthStr;
use uuid::Uuid;

use crate::board::BoardColumn;
use crate::config::Config;
use crate::datetime::{format_date, format_datetime};
use crate::store::days_in_trash;

/// Length of the id prefix shown in tables and accepted on the command
/// line.
pub const SHORT_ID_LEN: usize = 8;

pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..SHORT_ID_LEN].to_string()
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
            tz: cfg.timezone()?,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table(&self, tasks: &[Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }
        let rows = tasks.iter().map(|task| self.task_row(task, now)).collect();
        write_table(&mut out, task_headers(), rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_trash_table(
        &self,
        tasks: &[Task],
        now: DateTime<Utc>,
        retention_days: i64,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tasks.is_empty() {
            writeln!(out, "Trash is empty.")?;
            return Ok(());
        }

        let headers = ["ID", "Trashed", "Left", "Title"]
            .map(String::from)
            .to_vec();
        let rows = tasks
            .iter()
            .map(|task| {
                let (trashed, left) = match task.trash_date {
                    Some(at) => {
                        let left = retention_days - days_in_trash(at, now);
                        (format_date(at, self.tz), format!("{}d", left.max(0)))
                    }
                    None => (String::new(), "-".to_string()),
                };
                let left = if left == "0d" {
                    self.paint(&left, "31")
                } else {
                    left
                };
                vec![
                    self.paint(&short_id(task.id), "33"),
                    trashed,
                    left,
                    task.title.clone(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, board, now))]
    pub fn print_board(&self, board: &[BoardColumn], now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if board.is_empty() {
            writeln!(out, "No columns. Add one with `tasklane column add <title>`.")?;
            return Ok(());
        }

        for (idx, slot) in board.iter().enumerate() {
            if idx > 0 {
                writeln!(out)?;
            }
            let icon = slot.column.icon.as_deref().unwrap_or("");
            writeln!(
                out,
                "{} {} ({})",
                icon,
                self.paint(&slot.column.title, "1"),
                slot.tasks.len()
            )?;
            if slot.tasks.is_empty() {
                continue;
            }
            let rows = slot
                .tasks
                .iter()
                .map(|task| self.task_row(task, now))
                .collect();
            write_table(&mut out, task_headers(), rows)?;
        }
        Ok(())
    }

    pub fn print_columns(&self, columns: &[KanbanColumn]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = ["ID", "Order", "Title", "Color"].map(String::from).to_vec();
        let rows = columns
            .iter()
            .map(|column| {
                vec![
                    self.paint(&short_id(column.id), "33"),
                    column.order.to_string(),
                    column.title.clone(),
                    column.color.clone(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "status    {}", task.status.as_str())?;
        writeln!(out, "sectors   {}", task.sector.join(", "))?;
        writeln!(out, "owner     {}", task.user_id)?;
        writeln!(out, "created   {}", format_datetime(task.created_at, self.tz))?;
        if let Some(due) = task.due_at {
            writeln!(out, "due       {}", format_datetime(due, self.tz))?;
        }
        if let Some(trashed) = task.trash_date {
            writeln!(out, "trashed   {}", format_datetime(trashed, self.tz))?;
        }
        if let Some(rule) = task.recurrence_id {
            writeln!(out, "repeats   {rule}")?;
        }
        if let Some(column) = task.column_id {
            writeln!(out, "column    {column}")?;
        }
        if let Some(details) = &task.details {
            writeln!(out, "details   {details}")?;
        }
        for sub in &task.subtasks {
            let mark = if sub.completed { "x" } else { " " };
            writeln!(out, "  [{mark}] {} {}", short_id(sub.id), sub.title)?;
        }

        Ok(())
    }

    fn task_row(&self, task: &Task, now: DateTime<Utc>) -> Vec<String> {
        let due = match task.due_at {
            Some(at) if at < now && task.status != TaskStatus::Done => {
                self.paint(&format_date(at, self.tz), "31")
            }
            Some(at) => format_date(at, self.tz),
            None => String::new(),
        };
        let status = match task.status {
            TaskStatus::Done => self.paint("done", "32"),
            TaskStatus::Doing => self.paint("doing", "36"),
            other => other.as_str().to_string(),
        };
        let subtasks = if task.subtasks.is_empty() {
            String::new()
        } else {
            let done = task.subtasks.iter().filter(|sub| sub.completed).count();
            format!("{done}/{}", task.subtasks.len())
        };
        let title = if task.recurrence_id.is_some() {
            format!("{} ↻", task.title)
        } else {
            task.title.clone()
        };

        vec![
            self.paint(&short_id(task.id), "33"),
            status,
            due,
            task.sector.join(","),
            title,
            subtasks,
        ]
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn task_headers() -> Vec<String> {
    ["ID", "Status", "Due", "Sectors", "Title", "Sub"]
        .map(String::from)
        .to_vec()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(visible_width(cell));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let padding = width.saturating_sub(visible_width(cell));
            write!(writer, "{cell}{} ", " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn visible_width(cell: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(cell).as_str())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        match (escaped, ch) {
            (true, 'm') => escaped = false,
            (true, _) => {}
            (false, '\x1b') => escaped = true,
            (false, _) => out.push(ch),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        let headers = vec!["A".to_string(), "B".to_string()];
        let rows = vec![vec!["\x1b[33mab\x1b[0m".to_string(), "日本".to_string()]];

        write_table(&mut buf, headers, rows).expect("write table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "A  B    ");
        assert_eq!(lines[1], "-- ---- ");
        assert_eq!(strip_ansi(lines[2]), "ab 日本 ");
    }

    #[test]
    fn short_ids_are_hex_prefixes() {
        let id = Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").expect("uuid");
        assert_eq!(short_id(id), "0f8fad5b");
    }
}
