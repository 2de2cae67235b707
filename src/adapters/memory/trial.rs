//! In-memory trial and customer repositories.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, SubscriptionId, Timestamp,
};
use crate::domain::trial::{Customer, TrialState, TrialSubscription};
use crate::ports::{CustomerRepository, SaveOutcome, TrialRepository};

use super::keyed::KeyedCells;

pub struct InMemoryTrialRepository {
    subscriptions: KeyedCells<SubscriptionId, TrialSubscription>,
}

impl InMemoryTrialRepository {
    pub fn new() -> Self {
        Self {
            subscriptions: KeyedCells::new(),
        }
    }
}

impl Default for InMemoryTrialRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrialRepository for InMemoryTrialRepository {
    async fn find(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<TrialSubscription>, DomainError> {
        match self.subscriptions.get(subscription_id).await {
            Some(cell) => Ok(Some(cell.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn insert(&self, subscription: &TrialSubscription) -> Result<SaveOutcome, DomainError> {
        let (_, inserted) = self
            .subscriptions
            .get_or_insert_with(subscription.subscription_id.clone(), || subscription.clone())
            .await;
        Ok(if inserted {
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
        let cell = self
            .subscriptions
            .get(&subscription.subscription_id)
            .await
            .ok_or_else(|| {
                DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
                    .with_detail("subscription_id", subscription.subscription_id.as_str())
            })?;

        let mut stored = cell.lock().await;
        if stored.version != expected_version {
            return Ok(SaveOutcome::Conflict);
        }
        *stored = subscription.clone();
        Ok(SaveOutcome::Saved)
    }

    async fn find_lapsed(
        &self,
        ended_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<TrialSubscription>, DomainError> {
        let mut lapsed = Vec::new();
        for (_, cell) in self.subscriptions.cells().await {
            let sub = cell.lock().await;
            let ended = sub.trial_end.map(|end| end.is_before(&ended_before));
            if sub.state == TrialState::EndingSoon && ended == Some(true) {
                lapsed.push(sub.clone());
            }
        }
        lapsed.sort_by_key(|s| s.trial_end);
        lapsed.truncate(limit as usize);
        Ok(lapsed)
    }
}

pub struct InMemoryCustomerRepository {
    customers: KeyedCells<CustomerId, Customer>,
}

impl InMemoryCustomerRepository {
    pub fn new() -> Self {
        Self {
            customers: KeyedCells::new(),
        }
    }
}

impl Default for InMemoryCustomerRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn find(&self, customer_id: &CustomerId) -> Result<Option<Customer>, DomainError> {
        match self.customers.get(customer_id).await {
            Some(cell) => Ok(Some(cell.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn register(&self, customer: &Customer) -> Result<bool, DomainError> {
        let (_, inserted) = self
            .customers
            .get_or_insert_with(customer.customer_id.clone(), || customer.clone())
            .await;
        Ok(inserted)
    }

    async fn annotate(
        &self,
        customer_id: &CustomerId,
        tags: &BTreeSet<String>,
    ) -> Result<(), DomainError> {
        if let Some(cell) = self.customers.get(customer_id).await {
            cell.lock().await.annotate(tags);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Cents, EventId};

    fn subscription(id: &str) -> TrialSubscription {
        TrialSubscription {
            subscription_id: SubscriptionId::new(id).unwrap(),
            customer_id: CustomerId::new("cus_1").unwrap(),
            state: TrialState::Active,
            trial_start: None,
            trial_end: Some(Timestamp::now().minus_secs(60)),
            plan_amount: Cents::new(7900).unwrap(),
            version: 1,
            last_event_id: Some(EventId::new("evt_1").unwrap()),
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn insert_conflicts_on_existing_id() {
        let repo = InMemoryTrialRepository::new();
        assert_eq!(repo.insert(&subscription("sub_1")).await.unwrap(), SaveOutcome::Saved);
        assert_eq!(repo.insert(&subscription("sub_1")).await.unwrap(), SaveOutcome::Conflict);
    }

    #[tokio::test]
    async fn update_is_compare_and_swap_on_version() {
        let repo = InMemoryTrialRepository::new();
        let mut sub = subscription("sub_1");
        repo.insert(&sub).await.unwrap();

        sub.state = TrialState::EndingSoon;
        sub.version = 2;
        assert_eq!(repo.update(&sub, 1).await.unwrap(), SaveOutcome::Saved);
        // Stale writer still believes version 1.
        assert_eq!(repo.update(&sub, 1).await.unwrap(), SaveOutcome::Conflict);

        let stored = repo.find(&sub.subscription_id).await.unwrap().unwrap();
        assert_eq!(stored.state, TrialState::EndingSoon);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn update_of_unknown_subscription_fails() {
        let repo = InMemoryTrialRepository::new();
        let err = repo.update(&subscription("sub_x"), 0).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SubscriptionNotFound);
    }

    #[tokio::test]
    async fn find_lapsed_returns_only_ending_soon_past_end() {
        let repo = InMemoryTrialRepository::new();
        let mut ending = subscription("sub_ending");
        ending.state = TrialState::EndingSoon;
        repo.insert(&ending).await.unwrap();
        repo.insert(&subscription("sub_active")).await.unwrap();

        let lapsed = repo.find_lapsed(Timestamp::now(), 10).await.unwrap();
        assert_eq!(lapsed.len(), 1);
        assert_eq!(lapsed[0].subscription_id.as_str(), "sub_ending");
    }

    #[tokio::test]
    async fn customer_registered_once_then_annotated() {
        let repo = InMemoryCustomerRepository::new();
        let id = CustomerId::new("cus_1").unwrap();
        let customer = Customer::new(id.clone(), None, BTreeSet::new(), Timestamp::now());

        assert!(repo.register(&customer).await.unwrap());
        assert!(!repo.register(&customer).await.unwrap());

        repo.annotate(&id, &BTreeSet::from(["podcast".to_string()]))
            .await
            .unwrap();
        let stored = repo.find(&id).await.unwrap().unwrap();
        assert!(stored.acquisition_tags.contains("podcast"));
    }
}
