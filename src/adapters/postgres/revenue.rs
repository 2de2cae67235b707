//! PostgreSQL implementation of DailyRevenueRepository.
//!
//! A contribution is recorded and the bucket incremented in one transaction.
//! The contribution insert is the dedupe gate; the bucket upsert is a single
//! `total_cents = total_cents + $n` statement, so there is no read-modify-write
//! window and only rows for the same business date contend.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::revenue::{DailyRevenueSnapshot, RevenueContribution};
use crate::ports::{ContributionOutcome, DailyRevenueRepository};

use super::{cents, corrupt, db_error};

pub struct PostgresDailyRevenueRepository {
    pool: PgPool,
}

impl PostgresDailyRevenueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BucketRow {
    business_date: NaiveDate,
    total_cents: i64,
    target_cents: i64,
    payment_count: i64,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<BucketRow> for DailyRevenueSnapshot {
    type Error = DomainError;

    fn try_from(row: BucketRow) -> Result<Self, Self::Error> {
        Ok(DailyRevenueSnapshot::compute(
            row.business_date,
            cents("total_cents", row.total_cents)?,
            cents("target_cents", row.target_cents)?,
            u64::try_from(row.payment_count).map_err(|e| corrupt("payment_count", e))?,
            row.updated_at.map(Timestamp::from_datetime),
        ))
    }
}

const SELECT_BUCKET: &str = r#"
    SELECT business_date, total_cents, target_cents, payment_count, updated_at
    FROM daily_revenue
"#;

#[async_trait]
impl DailyRevenueRepository for PostgresDailyRevenueRepository {
    async fn add_contribution(
        &self,
        contribution: &RevenueContribution,
    ) -> Result<ContributionOutcome, DomainError> {
        let now = Timestamp::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let counted = sqlx::query(
            r#"
            INSERT INTO revenue_contributions (event_id, business_date, amount_cents, counted_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(contribution.event_id.as_str())
        .bind(contribution.business_date)
        .bind(contribution.amount.value())
        .bind(now.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to record contribution"))?;

        if counted.rows_affected() == 0 {
            let row: BucketRow =
                sqlx::query_as(&format!("{} WHERE business_date = $1", SELECT_BUCKET))
                    .bind(contribution.business_date)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(db_error("Failed to load revenue bucket"))?;
            tx.commit()
                .await
                .map_err(db_error("Failed to commit transaction"))?;
            return Ok(ContributionOutcome::AlreadyCounted(row.try_into()?));
        }

        let row: BucketRow = sqlx::query_as(
            r#"
            INSERT INTO daily_revenue (business_date, total_cents, target_cents, payment_count, updated_at)
            VALUES ($1, $2, $3, 1, $4)
            ON CONFLICT (business_date) DO UPDATE SET
                total_cents = daily_revenue.total_cents + EXCLUDED.total_cents,
                payment_count = daily_revenue.payment_count + 1,
                updated_at = EXCLUDED.updated_at
            RETURNING business_date, total_cents, target_cents, payment_count, updated_at
            "#,
        )
        .bind(contribution.business_date)
        .bind(contribution.amount.value())
        .bind(contribution.target.value())
        .bind(now.as_datetime())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to increment revenue bucket"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        Ok(ContributionOutcome::Applied(row.try_into()?))
    }

    async fn find_by_date(
        &self,
        business_date: NaiveDate,
    ) -> Result<Option<DailyRevenueSnapshot>, DomainError> {
        let row: Option<BucketRow> =
            sqlx::query_as(&format!("{} WHERE business_date = $1", SELECT_BUCKET))
                .bind(business_date)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to load revenue bucket"))?;

        row.map(DailyRevenueSnapshot::try_from).transpose()
    }

    async fn find_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyRevenueSnapshot>, DomainError> {
        let rows: Vec<BucketRow> = sqlx::query_as(&format!(
            "{} WHERE business_date BETWEEN $1 AND $2 ORDER BY business_date",
            SELECT_BUCKET
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load revenue range"))?;

        rows.into_iter().map(DailyRevenueSnapshot::try_from).collect()
    }
}
