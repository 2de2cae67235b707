//! In-memory event log and idempotency store.
//!
//! Not durable: for tests and local development only. Production wiring
//! uses the PostgreSQL adapter.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode, EventId, Timestamp};
use crate::domain::revenue::{ApplyOutcome, EventLogEntry, ProcessingStatus, RevenueEvent};
use crate::ports::{ClaimResult, IdempotencyStore, RevenueEventLog};

use super::keyed::KeyedCells;

pub struct InMemoryEventLog {
    entries: KeyedCells<EventId, EventLogEntry>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self {
            entries: KeyedCells::new(),
        }
    }

    /// Number of logged events.
    pub async fn len(&self) -> usize {
        self.entries.cells().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(event_id: &EventId) -> DomainError {
    DomainError::new(ErrorCode::EventNotFound, "Event not in log")
        .with_detail("event_id", event_id.as_str())
}

#[async_trait]
impl IdempotencyStore for InMemoryEventLog {
    async fn try_claim(&self, event: &RevenueEvent) -> Result<ClaimResult, DomainError> {
        let (_, inserted) = self
            .entries
            .get_or_insert_with(event.event_id.clone(), || EventLogEntry::claimed(event.clone()))
            .await;

        Ok(if inserted {
            ClaimResult::Claimed
        } else {
            ClaimResult::AlreadyProcessed
        })
    }
}

#[async_trait]
impl RevenueEventLog for InMemoryEventLog {
    async fn find(&self, event_id: &EventId) -> Result<Option<EventLogEntry>, DomainError> {
        match self.entries.get(event_id).await {
            Some(cell) => Ok(Some(cell.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn record_outcome(
        &self,
        event_id: &EventId,
        outcome: &ApplyOutcome,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        let cell = self.entries.get(event_id).await.ok_or_else(|| not_found(event_id))?;
        let mut entry = cell.lock().await;
        entry.status = outcome.status();
        entry.outcome_detail = Some(outcome.detail().to_string());
        entry.apply_attempts += 1;
        entry.processed_at = Some(at);
        Ok(())
    }

    async fn record_failure(&self, event_id: &EventId, error: &str) -> Result<(), DomainError> {
        let cell = self.entries.get(event_id).await.ok_or_else(|| not_found(event_id))?;
        let mut entry = cell.lock().await;
        entry.apply_attempts += 1;
        entry.last_error = Some(error.to_string());
        Ok(())
    }

    async fn find_unapplied(
        &self,
        claimed_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<EventLogEntry>, DomainError> {
        let mut pending = Vec::new();
        for (_, cell) in self.entries.cells().await {
            let entry = cell.lock().await;
            if entry.status == ProcessingStatus::Claimed
                && entry.event.received_at.is_before(&claimed_before)
            {
                pending.push(entry.clone());
            }
        }
        pending.sort_by_key(|e| e.event.received_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn purge_settled_before(&self, before: Timestamp) -> Result<u64, DomainError> {
        let mut expired = Vec::new();
        for (key, cell) in self.entries.cells().await {
            let entry = cell.lock().await;
            if entry.status.is_settled() && entry.event.received_at.is_before(&before) {
                expired.push(key);
            }
        }
        Ok(self.entries.remove(&expired).await as u64)
    }
}
