//! Live progress fan-out port.

use crate::domain::revenue::DailyRevenueSnapshot;

/// Publishes progress changes to live observers.
///
/// `publish` is synchronous and must return immediately whatever the state of
/// the observers: it runs on the ingestion path.
pub trait ProgressBroadcaster: Send + Sync {
    fn publish(&self, snapshot: &DailyRevenueSnapshot);
}

/// Broadcaster that drops everything; for wiring without live observers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

impl ProgressBroadcaster for NoopBroadcaster {
    fn publish(&self, _snapshot: &DailyRevenueSnapshot) {}
}
