//! PostgreSQL implementation of IdempotencyStore and RevenueEventLog.
//!
//! The `revenue_events` primary key is the claim: `ON CONFLICT DO NOTHING`
//! lets exactly one concurrent delivery insert the row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{CustomerId, DomainError, EventId, Timestamp};
use crate::domain::revenue::{
    ApplyOutcome, EventLogEntry, ProcessingStatus, RevenueEvent,
};
use crate::ports::{ClaimResult, IdempotencyStore, RevenueEventLog};

use super::{cents, corrupt, db_error, to_u32};

pub struct PostgresEventLog {
    pool: PgPool,
}

impl PostgresEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_id: String,
    event_type: String,
    customer_id: Option<String>,
    amount_cents: i64,
    occurred_at: DateTime<Utc>,
    raw_payload: serde_json::Value,
    received_at: DateTime<Utc>,
    status: String,
    outcome_detail: Option<String>,
    apply_attempts: i64,
    last_error: Option<String>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<EventRow> for EventLogEntry {
    type Error = DomainError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let event = RevenueEvent {
            event_id: EventId::new(row.event_id).map_err(|e| corrupt("event_id", e))?,
            event_type: row.event_type,
            customer_id: row
                .customer_id
                .map(CustomerId::new)
                .transpose()
                .map_err(|e| corrupt("customer_id", e))?,
            amount: cents("amount_cents", row.amount_cents)?,
            occurred_at: Timestamp::from_datetime(row.occurred_at),
            raw_payload: row.raw_payload,
            received_at: Timestamp::from_datetime(row.received_at),
        };

        Ok(EventLogEntry {
            event,
            status: row
                .status
                .parse::<ProcessingStatus>()
                .map_err(|e| corrupt("status", e))?,
            outcome_detail: row.outcome_detail,
            apply_attempts: to_u32("apply_attempts", row.apply_attempts)?,
            last_error: row.last_error,
            processed_at: row.processed_at.map(Timestamp::from_datetime),
        })
    }
}

const SELECT_EVENT: &str = r#"
    SELECT event_id, event_type, customer_id, amount_cents, occurred_at, raw_payload,
           received_at, status, outcome_detail, apply_attempts, last_error, processed_at
    FROM revenue_events
"#;

#[async_trait]
impl IdempotencyStore for PostgresEventLog {
    async fn try_claim(&self, event: &RevenueEvent) -> Result<ClaimResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO revenue_events (
                event_id, event_type, customer_id, amount_cents, occurred_at,
                raw_payload, received_at, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'claimed')
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event.event_id.as_str())
        .bind(&event.event_type)
        .bind(event.customer_id.as_ref().map(|c| c.as_str()))
        .bind(event.amount.value())
        .bind(event.occurred_at.as_datetime())
        .bind(&event.raw_payload)
        .bind(event.received_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to claim event"))?;

        Ok(if result.rows_affected() == 1 {
            ClaimResult::Claimed
        } else {
            ClaimResult::AlreadyProcessed
        })
    }
}

#[async_trait]
impl RevenueEventLog for PostgresEventLog {
    async fn find(&self, event_id: &EventId) -> Result<Option<EventLogEntry>, DomainError> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("{} WHERE event_id = $1", SELECT_EVENT))
                .bind(event_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to load event"))?;

        row.map(EventLogEntry::try_from).transpose()
    }

    async fn record_outcome(
        &self,
        event_id: &EventId,
        outcome: &ApplyOutcome,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE revenue_events SET
                status = $2,
                outcome_detail = $3,
                apply_attempts = apply_attempts + 1,
                processed_at = $4
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_str())
        .bind(outcome.status().as_str())
        .bind(outcome.detail())
        .bind(at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to record event outcome"))?;

        Ok(())
    }

    async fn record_failure(&self, event_id: &EventId, error: &str) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE revenue_events SET
                apply_attempts = apply_attempts + 1,
                last_error = $2
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to record event failure"))?;

        Ok(())
    }

    async fn find_unapplied(
        &self,
        claimed_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<EventLogEntry>, DomainError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "{} WHERE status = 'claimed' AND received_at < $1 ORDER BY received_at LIMIT $2",
            SELECT_EVENT
        ))
        .bind(claimed_before.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load unapplied events"))?;

        rows.into_iter().map(EventLogEntry::try_from).collect()
    }

    async fn purge_settled_before(&self, before: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM revenue_events WHERE status <> 'claimed' AND received_at < $1",
        )
        .bind(before.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to purge event log"))?;

        Ok(result.rows_affected())
    }
}
