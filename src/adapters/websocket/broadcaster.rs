//! LiveBroadcaster - fan-out of progress snapshots to websocket observers.
//!
//! Backed by a `tokio::sync::broadcast` channel. Publishing never waits: when
//! an observer falls more than `capacity` updates behind, its oldest pending
//! updates are overwritten and it resumes from the newest ones.

use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::revenue::DailyRevenueSnapshot;
use crate::ports::ProgressBroadcaster;

pub const DEFAULT_CAPACITY: usize = 64;

pub struct LiveBroadcaster {
    sender: broadcast::Sender<DailyRevenueSnapshot>,
}

impl LiveBroadcaster {
    /// `capacity` is the per-observer backlog before drop-oldest kicks in.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DailyRevenueSnapshot> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LiveBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressBroadcaster for LiveBroadcaster {
    fn publish(&self, snapshot: &DailyRevenueSnapshot) {
        // Err only means nobody is listening.
        if self.sender.send(snapshot.clone()).is_err() {
            trace!(business_date = %snapshot.business_date(), "No live observers");
        }
    }
}
