use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{ChangeEvent, ChangeFeed, ChannelId, Table};

/// In-process fan-out of change events to per-table channels.
#[derive(Debug, Default)]
pub struct RealtimeHub {
    next_channel: AtomicU64,
    channels: Mutex<HashMap<ChannelId, (Table, mpsc::UnboundedSender<ChangeEvent>)>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, table: Table) -> ChangeFeed {
        let channel = ChannelId(self.next_channel.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.lock().insert(channel, (table, tx));
        debug!(%channel, %table, "realtime channel opened");
        ChangeFeed {
            channel,
            events: rx,
        }
    }

    pub fn unsubscribe(&self, channel: ChannelId) {
        if self.channels.lock().remove(&channel).is_some() {
            debug!(%channel, "realtime channel closed");
        }
    }

    pub fn publish(&self, event: ChangeEvent) {
        let mut channels = self.channels.lock();
        channels.retain(|channel, (table, tx)| {
            if *table != event.table {
                return true;
            }
            trace!(%channel, table = %event.table, kind = ?event.kind, id = %event.id, "publishing change");
            tx.send(event.clone()).is_ok()
        });
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }
}
