//! Client-side task and column state, synchronized optimistically with a
//! [`RemoteStore`].
//!
//! Every mutation changes local state first, so readers see it before the
//! remote round-trip completes, then settles against the remote result:
//! reversible changes are rolled back to the captured prior value, batch
//! and multi-step ones fall back to a full refetch. A realtime
//! subscription refetches on any change to the `tasks` table and is the
//! only convergence mechanism beyond that.

mod columns;
mod state;
mod subtasks;
mod tasks;
mod trash;
mod txn;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tasklane_shared::{KanbanColumn, Sector, SectorId, Task, TaskId};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub use state::StoreState;
pub use trash::{TRASH_RETENTION_DAYS, days_in_trash, is_expired};

use self::txn::{Recovery, Transaction};
use crate::board::{self, BoardColumn};
use crate::clock::{Clock, SystemClock};
use crate::error::{RemoteError, StoreError};
use crate::identity::IdentityProvider;
use crate::remote::{ChannelId, RemoteStore, Table, TaskQuery};

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub trash_retention_days: i64,
    /// Sectors known to the user; the general one is found by label.
    pub sectors: Vec<Sector>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            trash_retention_days: TRASH_RETENTION_DAYS,
            sectors: vec![],
        }
    }
}

/// Cheaply cloneable handle on the shared store state.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<Inner>,
}

struct Inner {
    remote: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    settings: StoreSettings,
    state: Mutex<StoreState>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskStore {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        settings: StoreSettings,
    ) -> Self {
        Self::with_clock(remote, identity, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        settings: StoreSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug!(
            retention_days = settings.trash_retention_days,
            sectors = settings.sectors.len(),
            "task store created"
        );
        Self {
            inner: Arc::new(Inner {
                remote,
                identity,
                clock,
                settings,
                state: Mutex::new(StoreState::default()),
                background: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.inner.settings
    }

    pub fn snapshot(&self) -> StoreState {
        self.inner.state.lock().clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.inner.state.lock().tasks.clone()
    }

    pub fn trash_tasks(&self) -> Vec<Task> {
        self.inner.state.lock().trash_tasks.clone()
    }

    pub fn columns(&self) -> Vec<KanbanColumn> {
        self.inner.state.lock().columns.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    /// Looks a task up in the active list, then in the trash.
    pub fn task(&self, id: TaskId) -> Option<Task> {
        let state = self.inner.state.lock();
        state
            .tasks
            .iter()
            .chain(state.trash_tasks.iter())
            .find(|task| task.id == id)
            .cloned()
    }

    pub fn sector_filter(&self) -> Option<SectorId> {
        self.inner.state.lock().sector_filter.clone()
    }

    pub fn set_sector_filter(&self, sector: Option<SectorId>) {
        debug!(?sector, "sector filter changed");
        self.inner.state.lock().sector_filter = sector;
    }

    /// Active tasks that pass the sector filter.
    pub fn visible_tasks(&self) -> Vec<Task> {
        self.inner.state.lock().visible_tasks()
    }

    pub fn board(&self) -> Vec<BoardColumn> {
        let state = self.inner.state.lock();
        board::group_by_column(&state.visible_tasks(), &state.columns)
    }

    /// Loads active and trashed tasks, replacing local state wholesale.
    ///
    /// Trashed tasks past the retention window are dropped from the trash
    /// list and deleted remotely in the background. A read failure keeps
    /// the previous state.
    #[instrument(skip(self))]
    pub async fn fetch_tasks(&self) -> Result<(), StoreError> {
        self.inner.state.lock().loading = true;

        let (active, trashed) = match self.load_task_lists().await {
            Ok(lists) => lists,
            Err(err) => {
                warn!(error = %err, "task fetch failed; keeping previous state");
                self.inner.state.lock().loading = false;
                return Err(err.into());
            }
        };

        let (kept, expired) =
            trash::partition_expired(trashed, self.now(), self.inner.settings.trash_retention_days);

        {
            let mut state = self.inner.state.lock();
            state.tasks = active;
            state.trash_tasks = kept;
            state.loading = false;
            debug!(
                active = state.tasks.len(),
                trash = state.trash_tasks.len(),
                "task lists replaced"
            );
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "purging tasks past trash retention");
            let remote = Arc::clone(&self.inner.remote);
            self.spawn_background("purge_expired_trash", async move {
                remote.delete_tasks(expired).await
            });
        }

        Ok(())
    }

    /// Full task refetch used as the fallback after unrecoverable writes.
    pub async fn refresh(&self) {
        // fetch_tasks already logged the failure.
        let _ = self.fetch_tasks().await;
    }

    pub async fn refresh_board(&self) {
        self.refresh().await;
        let _ = self.fetch_columns().await;
    }

    /// Refetches on every change to the `tasks` table, from any client.
    /// Dropping or disposing the guard unregisters the listener.
    #[instrument(skip(self))]
    pub async fn subscribe_to_tasks(&self) -> Result<SubscriptionGuard, StoreError> {
        let mut feed = self.inner.remote.subscribe(Table::Tasks).await?;
        let channel = feed.channel;
        let store = self.clone();

        let listener = tokio::spawn(async move {
            while let Some(event) = feed.events.recv().await {
                // Coalesce a burst of events into one refetch.
                let mut burst = 1usize;
                while feed.events.try_recv().is_ok() {
                    burst += 1;
                }
                debug!(kind = ?event.kind, id = %event.id, burst, "task change received");
                store.refresh().await;
            }
            debug!(%channel, "task change feed closed");
        });

        info!(%channel, "subscribed to task changes");
        Ok(SubscriptionGuard {
            channel,
            remote: Arc::clone(&self.inner.remote),
            listener: Some(listener),
        })
    }

    /// Waits for background jobs (trash purges) started so far.
    pub async fn shutdown(&self) {
        let jobs: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.background.lock());
        debug!(count = jobs.len(), "draining background jobs");
        for job in jobs {
            if let Err(err) = job.await {
                warn!(error = %err, "background job panicked or was cancelled");
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    fn remote(&self) -> &dyn RemoteStore {
        self.inner.remote.as_ref()
    }

    async fn load_task_lists(&self) -> Result<(Vec<Task>, Vec<Task>), RemoteError> {
        let active = self.remote().select_tasks(TaskQuery::active()).await?;
        let trashed = self.remote().select_tasks(TaskQuery::trash()).await?;
        Ok((active, trashed))
    }

    /// Commits `txn` on success; otherwise recovers as requested and hands
    /// the remote error back.
    async fn settle<T>(
        &self,
        txn: Transaction,
        result: Result<T, RemoteError>,
        recovery: Recovery,
    ) -> Result<T, StoreError> {
        match result {
            Ok(value) => {
                txn.commit();
                Ok(value)
            }
            Err(err) => {
                warn!(op = txn.label(), error = %err, ?recovery, "remote write failed");
                match recovery {
                    Recovery::Rollback => {
                        let mut state = self.inner.state.lock();
                        txn.revert(&mut state);
                    }
                    Recovery::Refetch => {
                        txn.abandon();
                        self.refresh().await;
                    }
                    Recovery::RefetchBoard => {
                        txn.abandon();
                        self.refresh_board().await;
                    }
                }
                Err(err.into())
            }
        }
    }

    fn spawn_background<F>(&self, job: &'static str, fut: F)
    where
        F: Future<Output = Result<(), RemoteError>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            match fut.await {
                Ok(()) => debug!(job, "background job finished"),
                Err(err) => warn!(job, error = %err, "background job failed"),
            }
        });
        let mut jobs = self.inner.background.lock();
        jobs.retain(|running| !running.is_finished());
        jobs.push(handle);
    }
}

/// Keeps a realtime listener alive; tears it down on drop.
pub struct SubscriptionGuard {
    channel: ChannelId,
    remote: Arc<dyn RemoteStore>,
    listener: Option<JoinHandle<()>>,
}

impl SubscriptionGuard {
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn dispose(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.remote.unsubscribe(self.channel);
            listener.abort();
            info!(channel = %self.channel, "unsubscribed from task changes");
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}
