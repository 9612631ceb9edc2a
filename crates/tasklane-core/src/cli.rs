use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tasklane_shared::{Frequency, TaskStatus};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        let key = k.trim();
        if key.is_empty() {
            return Err(anyhow!("empty key in override: {s}"));
        }
        Ok(Self {
            key: key.to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tasklane",
    version,
    about = "Tasks, trash and a kanban board from the terminal",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Override a config key for this run.
    #[arg(
        long = "rc",
        value_name = "KEY=VALUE",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file", global = true)]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Active tasks, newest first.
    List(ListArgs),
    /// Trashed tasks with days left before purge.
    Trash,
    /// Tasks grouped by kanban column.
    Board(ListArgs),
    /// Every field of one task.
    Info { task: String },
    Add(AddArgs),
    /// Toggle between todo and done.
    Done { task: String },
    Edit(EditArgs),
    /// Move a task to the trash.
    Rm { task: String },
    Restore { task: String },
    /// Delete a trashed task for good.
    Purge { task: String },
    EmptyTrash,
    /// Move every done task to the trash.
    ClearDone,
    /// Toggle a sector on a task.
    Sector { task: String, sector: String },
    #[command(subcommand)]
    Subtask(SubtaskCommand),
    #[command(subcommand)]
    Column(ColumnCommand),
    /// Move a task into a column.
    Move {
        task: String,
        column: String,
        /// Zero-based position inside the column; the end when omitted.
        #[arg(long = "at")]
        at: Option<usize>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only tasks tagged with this sector.
    #[arg(long)]
    pub sector: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(short = 's', long = "sector", action = ArgAction::Append)]
    pub sectors: Vec<String>,

    #[arg(long)]
    pub due: Option<String>,

    #[arg(long)]
    pub details: Option<String>,

    #[arg(long = "subtask", action = ArgAction::Append)]
    pub subtasks: Vec<String>,

    #[arg(long)]
    pub column: Option<String>,

    #[command(flatten)]
    pub repeat: RepeatArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RepeatArgs {
    #[arg(long = "repeat", value_enum)]
    pub frequency: Option<FrequencyArg>,

    #[arg(long = "every", default_value_t = 1, requires = "frequency")]
    pub interval: u32,

    /// Weekday numbers, 0 = Sunday.
    #[arg(long = "on", value_delimiter = ',', requires = "frequency")]
    pub week_days: Vec<u8>,

    #[arg(long = "until", requires = "frequency")]
    pub until: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyArg {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl From<FrequencyArg> for Frequency {
    fn from(arg: FrequencyArg) -> Self {
        match arg {
            FrequencyArg::Daily => Frequency::Daily,
            FrequencyArg::Weekly => Frequency::Weekly,
            FrequencyArg::Monthly => Frequency::Monthly,
            FrequencyArg::Yearly => Frequency::Yearly,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub task: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, conflicts_with = "no_due")]
    pub due: Option<String>,

    #[arg(long)]
    pub no_due: bool,

    #[arg(long, conflicts_with = "no_details")]
    pub details: Option<String>,

    #[arg(long)]
    pub no_details: bool,

    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    /// Replace the whole subtask list.
    #[arg(long = "subtask", action = ArgAction::Append)]
    pub subtasks: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusArg {
    Todo,
    Doing,
    Done,
}

impl From<StatusArg> for TaskStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Todo => TaskStatus::Todo,
            StatusArg::Doing => TaskStatus::Doing,
            StatusArg::Done => TaskStatus::Done,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubtaskCommand {
    Add { task: String, title: Vec<String> },
    Toggle { subtask: String },
    Rm { subtask: String },
    Rename { subtask: String, title: Vec<String> },
    /// Put a task's subtasks in the given order.
    Reorder {
        task: String,
        #[arg(required = true, num_args = 1..)]
        subtasks: Vec<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ColumnCommand {
    List,
    Add {
        title: Vec<String>,
        #[arg(long, default_value = "#6b7280")]
        color: String,
        #[arg(long)]
        icon: Option<String>,
    },
    Rm { column: String },
    Rename {
        column: String,
        title: Vec<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Move a column to a zero-based position.
    Move { column: String, position: usize },
    /// Renumber a column's cards in the given order.
    Sort {
        column: String,
        #[arg(required = true, num_args = 1..)]
        tasks: Vec<String>,
    },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = match (quiet, verbose) {
        (q, _) if q >= 2 => "error",
        (1, _) => "warn",
        (_, v) if v >= 3 => "trace",
        (_, 2) => "debug",
        (_, 1) => "info",
        _ => "warn",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
