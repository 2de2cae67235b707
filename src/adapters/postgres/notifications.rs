//! PostgreSQL implementation of NotificationRepository.
//!
//! `dedupe_key` is UNIQUE; every attempt also lands in `notification_attempts`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, NotificationId, Timestamp};
use crate::domain::notification::{DeliveryStatus, NotificationKind, NotificationRecord};
use crate::ports::{InsertOutcome, NotificationRepository};

use super::{corrupt, db_error, to_u32};

pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_key(&self, dedupe_key: &str) -> Result<Option<NotificationRecord>, DomainError> {
        let row: Option<NotificationRow> =
            sqlx::query_as(&format!("{} WHERE dedupe_key = $1", SELECT_NOTIFICATION))
                .bind(dedupe_key)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to load notification"))?;

        row.map(NotificationRecord::try_from).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    notification_id: Uuid,
    kind: String,
    dedupe_key: String,
    payload: serde_json::Value,
    delivery_attempts: i64,
    status: String,
    delivered_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for NotificationRecord {
    type Error = DomainError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(NotificationRecord {
            notification_id: NotificationId::from_uuid(row.notification_id),
            kind: row.kind.parse::<NotificationKind>().map_err(|e| corrupt("kind", e))?,
            dedupe_key: row.dedupe_key,
            payload: row.payload,
            delivery_attempts: to_u32("delivery_attempts", row.delivery_attempts)?,
            status: row.status.parse::<DeliveryStatus>().map_err(|e| corrupt("status", e))?,
            delivered_at: row.delivered_at.map(Timestamp::from_datetime),
            last_error: row.last_error,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const SELECT_NOTIFICATION: &str = r#"
    SELECT notification_id, kind, dedupe_key, payload, delivery_attempts, status,
           delivered_at, last_error, created_at, updated_at
    FROM notifications
"#;

fn not_found(id: NotificationId) -> DomainError {
    DomainError::new(ErrorCode::NotificationNotFound, "Notification not found")
        .with_detail("notification_id", id.to_string())
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn insert_if_absent(
        &self,
        record: &NotificationRecord,
    ) -> Result<InsertOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (
                notification_id, kind, dedupe_key, payload, delivery_attempts, status,
                delivered_at, last_error, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (dedupe_key) DO NOTHING
            "#,
        )
        .bind(record.notification_id.as_uuid())
        .bind(record.kind.as_str())
        .bind(&record.dedupe_key)
        .bind(&record.payload)
        .bind(i64::from(record.delivery_attempts))
        .bind(record.status.as_str())
        .bind(record.delivered_at.map(|t| *t.as_datetime()))
        .bind(&record.last_error)
        .bind(record.created_at.as_datetime())
        .bind(record.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to insert notification"))?;

        if result.rows_affected() == 1 {
            return Ok(InsertOutcome::Inserted);
        }

        let existing = self.find_by_key(&record.dedupe_key).await?.ok_or_else(|| {
            DomainError::database("Notification conflicted but could not be loaded")
                .with_detail("dedupe_key", record.dedupe_key.clone())
        })?;
        Ok(InsertOutcome::Existing(existing))
    }

    async fn find(&self, id: NotificationId) -> Result<Option<NotificationRecord>, DomainError> {
        let row: Option<NotificationRow> =
            sqlx::query_as(&format!("{} WHERE notification_id = $1", SELECT_NOTIFICATION))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to load notification"))?;

        row.map(NotificationRecord::try_from).transpose()
    }

    async fn record_attempt(
        &self,
        id: NotificationId,
        result: &Result<(), String>,
        at: Timestamp,
    ) -> Result<NotificationRecord, DomainError> {
        let succeeded = result.is_ok();
        let error = result.as_ref().err().map(String::as_str);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let row: Option<NotificationRow> = sqlx::query_as(
            r#"
            UPDATE notifications SET
                delivery_attempts = delivery_attempts + 1,
                status = CASE WHEN $2 THEN 'delivered' ELSE status END,
                delivered_at = CASE WHEN $2 THEN $3 ELSE delivered_at END,
                last_error = CASE WHEN $2 THEN NULL ELSE $4 END,
                updated_at = $3
            WHERE notification_id = $1
            RETURNING notification_id, kind, dedupe_key, payload, delivery_attempts, status,
                      delivered_at, last_error, created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(succeeded)
        .bind(at.as_datetime())
        .bind(error)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to record delivery attempt"))?;

        let row = row.ok_or_else(|| not_found(id))?;

        sqlx::query(
            r#"
            INSERT INTO notification_attempts (notification_id, attempted_at, succeeded, error)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id.as_uuid())
        .bind(at.as_datetime())
        .bind(succeeded)
        .bind(error)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to append delivery attempt"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        row.try_into()
    }

    async fn mark_failed(&self, id: NotificationId, at: Timestamp) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE notifications SET status = 'failed', updated_at = $2 WHERE notification_id = $1",
        )
        .bind(id.as_uuid())
        .bind(at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to mark notification failed"))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn find_pending(&self, limit: u32) -> Result<Vec<NotificationRecord>, DomainError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "{} WHERE status = 'pending' ORDER BY created_at LIMIT $1",
            SELECT_NOTIFICATION
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load pending notifications"))?;

        rows.into_iter().map(NotificationRecord::try_from).collect()
    }
}
