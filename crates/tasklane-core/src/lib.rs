pub mod board;
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod identity;
pub mod recurrence;
pub mod remote;
pub mod render;
pub mod sectors;
pub mod store;

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use error::{
  RemoteError,
  StoreError
};
pub use store::{
  StoreSettings,
  SubscriptionGuard,
  TaskStore
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tasklane"
  );

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );
  debug!(
    files = ?cfg.loaded_files,
    "configuration ready"
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;
  let renderer =
    render::Renderer::new(&cfg)?;
  let command =
    cli.command.unwrap_or_else(|| {
      cli::Command::List(
        cli::ListArgs::default()
      )
    });

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async \
         runtime"
      )?;
  runtime.block_on(execute(
    cfg, data_dir, renderer, command
  ))?;

  info!("done");
  Ok(())
}

async fn execute(
  cfg: config::Config,
  data_dir: PathBuf,
  renderer: render::Renderer,
  command: cli::Command
) -> anyhow::Result<()> {
  let remote = remote::file::FileRemote::open(
    &data_dir
  )
  .with_context(|| {
    format!(
      "failed to open task data at {}",
      data_dir.display()
    )
  })?;
  let identity = match cfg.user_id() {
    | Some(user_id) => {
      identity::StaticIdentity::new(user_id)
    }
    | None => {
      identity::StaticIdentity::anonymous()
    }
  };

  let store = TaskStore::new(
    Arc::new(remote),
    Arc::new(identity),
    cfg.store_settings()?
  );
  store
    .fetch_tasks()
    .await
    .context("failed to load tasks")?;
  store
    .fetch_columns()
    .await
    .context("failed to load columns")?;

  let result = commands::dispatch(
    &store, &cfg, &renderer, command
  )
  .await;

  store.shutdown().await;
  result
}
