//! In-memory notification records, deduplicated by key.

use async_trait::async_trait;
use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, NotificationId, Timestamp};
use crate::domain::notification::NotificationRecord;
use crate::ports::{InsertOutcome, NotificationRepository};

use super::keyed::KeyedCells;

pub struct InMemoryNotificationRepository {
    /// Keyed by dedupe key.
    records: KeyedCells<String, NotificationRecord>,
    ids: RwLock<HashMap<NotificationId, String>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self {
            records: KeyedCells::new(),
            ids: RwLock::new(HashMap::new()),
        }
    }

    /// Every record, oldest first.
    pub async fn all(&self) -> Vec<NotificationRecord> {
        let mut all = Vec::new();
        for (_, cell) in self.records.cells().await {
            all.push(cell.lock().await.clone());
        }
        all.sort_by_key(|r| r.created_at);
        all
    }

    async fn key_for(&self, id: NotificationId) -> Result<String, DomainError> {
        self.ids.read().await.get(&id).cloned().ok_or_else(|| {
            DomainError::new(ErrorCode::NotificationNotFound, "Notification not found")
                .with_detail("notification_id", id.to_string())
        })
    }
}

impl Default for InMemoryNotificationRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert_if_absent(
        &self,
        record: &NotificationRecord,
    ) -> Result<InsertOutcome, DomainError> {
        let (cell, inserted) = self
            .records
            .get_or_insert_with(record.dedupe_key.clone(), || record.clone())
            .await;

        if inserted {
            self.ids
                .write()
                .await
                .insert(record.notification_id, record.dedupe_key.clone());
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::Existing(cell.lock().await.clone()))
        }
    }

    async fn find(&self, id: NotificationId) -> Result<Option<NotificationRecord>, DomainError> {
        let key = match self.ids.read().await.get(&id).cloned() {
            Some(key) => key,
            None => return Ok(None),
        };
        match self.records.get(&key).await {
            Some(cell) => Ok(Some(cell.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn record_attempt(
        &self,
        id: NotificationId,
        result: &Result<(), String>,
        at: Timestamp,
    ) -> Result<NotificationRecord, DomainError> {
        let key = self.key_for(id).await?;
        let cell = self.records.get(&key).await.ok_or_else(|| {
            DomainError::new(ErrorCode::NotificationNotFound, "Notification not found")
        })?;
        let mut record = cell.lock().await;
        record.record_attempt(result, at);
        Ok(record.clone())
    }

    async fn mark_failed(&self, id: NotificationId, at: Timestamp) -> Result<(), DomainError> {
        let key = self.key_for(id).await?;
        if let Some(cell) = self.records.get(&key).await {
            cell.lock().await.mark_failed(at);
        }
        Ok(())
    }

    async fn find_pending(&self, limit: u32) -> Result<Vec<NotificationRecord>, DomainError> {
        let mut pending: Vec<_> = self
            .all()
            .await
            .into_iter()
            .filter(NotificationRecord::is_pending)
            .collect();
        pending.truncate(limit as usize);
        Ok(pending)
    }
}
