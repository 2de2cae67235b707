//! Trial and customer persistence ports.

use async_trait::async_trait;

use crate::domain::foundation::{CustomerId, DomainError, SubscriptionId, Timestamp};
use crate::domain::trial::{Customer, TrialSubscription};

/// Result of a versioned write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Another writer got there first; reload and retry.
    Conflict,
}

/// Durable trial state keyed by subscription id.
///
/// Writes are compare-and-swap on `version` so concurrent events for the same
/// subscription never overwrite each other. Different subscriptions never
/// contend.
#[async_trait]
pub trait TrialRepository: Send + Sync {
    async fn find(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<TrialSubscription>, DomainError>;

    /// Inserts a new subscription; `Conflict` if the id already exists.
    async fn insert(&self, subscription: &TrialSubscription) -> Result<SaveOutcome, DomainError>;

    /// Replaces the stored subscription if its version still equals
    /// `expected_version`.
    async fn update(
        &self,
        subscription: &TrialSubscription,
        expected_version: u32,
    ) -> Result<SaveOutcome, DomainError>;

    /// `ENDING_SOON` subscriptions whose trial ended before `ended_before`.
    async fn find_lapsed(
        &self,
        ended_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<TrialSubscription>, DomainError>;
}

/// Customer registry. Customers are created once and never deleted.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find(&self, customer_id: &CustomerId) -> Result<Option<Customer>, DomainError>;

    /// Inserts the customer unless it exists; returns true when inserted.
    async fn register(&self, customer: &Customer) -> Result<bool, DomainError>;

    /// Adds acquisition tags to an existing customer.
    async fn annotate(
        &self,
        customer_id: &CustomerId,
        tags: &std::collections::BTreeSet<String>,
    ) -> Result<(), DomainError>;
}
