//! PostgreSQL implementations of TrialRepository and CustomerRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::BTreeSet;

use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, EventId, SubscriptionId, Timestamp,
};
use crate::domain::trial::{Customer, TrialState, TrialSubscription};
use crate::ports::{CustomerRepository, SaveOutcome, TrialRepository};

use super::{cents, corrupt, db_error, to_u32};

pub struct PostgresTrialRepository {
    pool: PgPool,
}

impl PostgresTrialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a trial subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    subscription_id: String,
    customer_id: String,
    state: String,
    trial_start: Option<DateTime<Utc>>,
    trial_end: Option<DateTime<Utc>>,
    plan_amount_cents: i64,
    version: i64,
    last_event_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for TrialSubscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(TrialSubscription {
            subscription_id: SubscriptionId::new(row.subscription_id)
                .map_err(|e| corrupt("subscription_id", e))?,
            customer_id: CustomerId::new(row.customer_id).map_err(|e| corrupt("customer_id", e))?,
            state: row.state.parse::<TrialState>().map_err(|e| corrupt("state", e))?,
            trial_start: row.trial_start.map(Timestamp::from_datetime),
            trial_end: row.trial_end.map(Timestamp::from_datetime),
            plan_amount: cents("plan_amount_cents", row.plan_amount_cents)?,
            version: to_u32("version", row.version)?,
            last_event_id: row
                .last_event_id
                .map(EventId::new)
                .transpose()
                .map_err(|e| corrupt("last_event_id", e))?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const SELECT_SUBSCRIPTION: &str = r#"
    SELECT subscription_id, customer_id, state, trial_start, trial_end, plan_amount_cents,
           version, last_event_id, created_at, updated_at
    FROM trial_subscriptions
"#;

#[async_trait]
impl TrialRepository for PostgresTrialRepository {
    async fn find(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<TrialSubscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE subscription_id = $1", SELECT_SUBSCRIPTION))
                .bind(subscription_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to load subscription"))?;

        row.map(TrialSubscription::try_from).transpose()
    }

    async fn insert(&self, subscription: &TrialSubscription) -> Result<SaveOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO trial_subscriptions (
                subscription_id, customer_id, state, trial_start, trial_end,
                plan_amount_cents, version, last_event_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (subscription_id) DO NOTHING
            "#,
        )
        .bind(subscription.subscription_id.as_str())
        .bind(subscription.customer_id.as_str())
        .bind(subscription.state.as_str())
        .bind(subscription.trial_start.map(|t| *t.as_datetime()))
        .bind(subscription.trial_end.map(|t| *t.as_datetime()))
        .bind(subscription.plan_amount.value())
        .bind(i64::from(subscription.version))
        .bind(subscription.last_event_id.as_ref().map(|id| id.as_str()))
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to insert subscription"))?;

        Ok(if result.rows_affected() == 1 {
            SaveOutcome::Saved
        } else {
            SaveOutcome::Conflict
        })
    }

    async fn update(
        &self,
        subscription: &TrialSubscription,
        expected_version: u32,
    ) -> Result<SaveOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE trial_subscriptions SET
                state = $2,
                trial_start = $3,
                trial_end = $4,
                plan_amount_cents = $5,
                version = $6,
                last_event_id = $7,
                updated_at = $8
            WHERE subscription_id = $1 AND version = $9
            "#,
        )
        .bind(subscription.subscription_id.as_str())
        .bind(subscription.state.as_str())
        .bind(subscription.trial_start.map(|t| *t.as_datetime()))
        .bind(subscription.trial_end.map(|t| *t.as_datetime()))
        .bind(subscription.plan_amount.value())
        .bind(i64::from(subscription.version))
        .bind(subscription.last_event_id.as_ref().map(|id| id.as_str()))
        .bind(subscription.updated_at.as_datetime())
        .bind(i64::from(expected_version))
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update subscription"))?;

        if result.rows_affected() == 1 {
            return Ok(SaveOutcome::Saved);
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM trial_subscriptions WHERE subscription_id = $1)",
        )
        .bind(subscription.subscription_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to check subscription"))?;

        if exists {
            Ok(SaveOutcome::Conflict)
        } else {
            Err(
                DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
                    .with_detail("subscription_id", subscription.subscription_id.as_str()),
            )
        }
    }

    async fn find_lapsed(
        &self,
        ended_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<TrialSubscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE state = 'ending_soon' AND trial_end < $1 ORDER BY trial_end LIMIT $2",
            SELECT_SUBSCRIPTION
        ))
        .bind(ended_before.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load lapsed subscriptions"))?;

        rows.into_iter().map(TrialSubscription::try_from).collect()
    }
}

pub struct PostgresCustomerRepository {
    pool: PgPool,
}

impl PostgresCustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    customer_id: String,
    email: Option<String>,
    acquisition_tags: Vec<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = DomainError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(Customer::new(
            CustomerId::new(row.customer_id).map_err(|e| corrupt("customer_id", e))?,
            row.email,
            row.acquisition_tags.into_iter().collect(),
            Timestamp::from_datetime(row.created_at),
        ))
    }
}

#[async_trait]
impl CustomerRepository for PostgresCustomerRepository {
    async fn find(&self, customer_id: &CustomerId) -> Result<Option<Customer>, DomainError> {
        let row: Option<CustomerRow> = sqlx::query_as(
            r#"
            SELECT customer_id, email, acquisition_tags, created_at
            FROM customers
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load customer"))?;

        row.map(Customer::try_from).transpose()
    }

    async fn register(&self, customer: &Customer) -> Result<bool, DomainError> {
        let tags: Vec<&str> = customer.acquisition_tags.iter().map(String::as_str).collect();
        let result = sqlx::query(
            r#"
            INSERT INTO customers (customer_id, email, acquisition_tags, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (customer_id) DO NOTHING
            "#,
        )
        .bind(customer.customer_id.as_str())
        .bind(&customer.email)
        .bind(&tags)
        .bind(customer.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to register customer"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn annotate(
        &self,
        customer_id: &CustomerId,
        tags: &BTreeSet<String>,
    ) -> Result<(), DomainError> {
        if tags.is_empty() {
            return Ok(());
        }
        let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
        // Union in SQL so concurrent annotations do not lose tags.
        sqlx::query(
            r#"
            UPDATE customers SET acquisition_tags = ARRAY(
                SELECT DISTINCT unnest(acquisition_tags || $2::text[]) ORDER BY 1
            )
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id.as_str())
        .bind(&tags)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to annotate customer"))?;

        Ok(())
    }
}
