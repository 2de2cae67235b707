//! Gateway webhook envelope and the closed set of typed events derived from it.
//!
//! The envelope is `{id, type, created, data: {object}}`. The object schema
//! depends on `type`; only the fields the pipeline needs are read, anything
//! else is ignored. Types this service does not handle map to
//! [`PaymentEvent::Unknown`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::domain::foundation::{Cents, CustomerId, EventId, SubscriptionId, Timestamp};

use super::errors::IngestError;

/// Raw webhook envelope as posted by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEnvelope {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix seconds at which the gateway recorded the event.
    pub created: i64,

    pub data: GatewayEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEventData {
    pub object: serde_json::Value,
}

impl GatewayEnvelope {
    /// Parses the raw request body.
    pub fn parse(payload: &[u8]) -> Result<Self, IngestError> {
        serde_json::from_slice(payload).map_err(|e| IngestError::UnparseableEvent(e.to_string()))
    }

    /// Parses an envelope previously stored in the event log.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, IngestError> {
        serde_json::from_value(value.clone())
            .map_err(|e| IngestError::UnparseableEvent(e.to_string()))
    }

    pub fn event_id(&self) -> Result<EventId, IngestError> {
        EventId::new(self.id.clone()).map_err(|e| IngestError::UnparseableEvent(e.to_string()))
    }

    pub fn occurred_at(&self) -> Result<Timestamp, IngestError> {
        Timestamp::from_unix_secs(self.created).ok_or_else(|| {
            IngestError::UnparseableEvent(format!("created out of range: {}", self.created))
        })
    }

    /// Maps the envelope onto a typed event.
    pub fn to_event(&self) -> Result<PaymentEvent, IngestError> {
        let object = &self.data.object;
        match self.event_type.as_str() {
            "customer.subscription.created" => {
                let sub: SubscriptionObject = decode(object)?;
                Ok(PaymentEvent::SubscriptionCreated(sub.into_created()?))
            }
            "invoice.payment_succeeded" => {
                let invoice: InvoiceObject = decode(object)?;
                Ok(PaymentEvent::PaymentSucceeded(invoice.into_payment()?))
            }
            "customer.subscription.trial_will_end" => {
                let sub: SubscriptionObject = decode(object)?;
                Ok(PaymentEvent::TrialEnding(TrialEnding {
                    subscription_id: sub.subscription_id()?,
                    customer_id: sub.customer_id()?,
                    trial_end: optional_timestamp(sub.trial_end)?,
                }))
            }
            "customer.subscription.updated" => {
                let sub: SubscriptionObject = decode(object)?;
                Ok(PaymentEvent::SubscriptionUpdated(sub.into_updated(None)?))
            }
            "customer.subscription.deleted" => {
                let sub: SubscriptionObject = decode(object)?;
                Ok(PaymentEvent::SubscriptionUpdated(
                    sub.into_updated(Some(SubscriptionStatus::Canceled))?,
                ))
            }
            other => Ok(PaymentEvent::Unknown {
                event_type: other.to_string(),
            }),
        }
    }
}

/// Closed set of events the pipeline understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    SubscriptionCreated(SubscriptionCreated),
    PaymentSucceeded(PaymentSucceeded),
    TrialEnding(TrialEnding),
    SubscriptionUpdated(SubscriptionUpdated),
    Unknown { event_type: String },
}

impl PaymentEvent {
    pub fn customer_id(&self) -> Option<&CustomerId> {
        match self {
            PaymentEvent::SubscriptionCreated(e) => Some(&e.customer_id),
            PaymentEvent::PaymentSucceeded(e) => Some(&e.customer_id),
            PaymentEvent::TrialEnding(e) => Some(&e.customer_id),
            PaymentEvent::SubscriptionUpdated(e) => Some(&e.customer_id),
            PaymentEvent::Unknown { .. } => None,
        }
    }

    pub fn subscription_id(&self) -> Option<&SubscriptionId> {
        match self {
            PaymentEvent::SubscriptionCreated(e) => Some(&e.subscription_id),
            PaymentEvent::PaymentSucceeded(e) => e.subscription_id.as_ref(),
            PaymentEvent::TrialEnding(e) => Some(&e.subscription_id),
            PaymentEvent::SubscriptionUpdated(e) => Some(&e.subscription_id),
            PaymentEvent::Unknown { .. } => None,
        }
    }

    /// Amount carried by the event; only payments carry money.
    pub fn amount(&self) -> Cents {
        match self {
            PaymentEvent::PaymentSucceeded(e) => e.amount,
            _ => Cents::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionCreated {
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
    pub customer_email: Option<String>,
    pub status: SubscriptionStatus,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub plan_amount: Cents,
    pub acquisition_tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSucceeded {
    pub invoice_id: Option<String>,
    pub customer_id: CustomerId,
    pub subscription_id: Option<SubscriptionId>,
    pub amount: Cents,
    pub billing_reason: Option<String>,
}

impl PaymentSucceeded {
    /// True for the invoice a subscription's billing cycle produces, which is
    /// the first post-trial charge when the subscription is ending its trial.
    ///
    /// Manual invoices, prorations and setup charges are revenue only.
    pub fn is_cycle_invoice(&self) -> bool {
        self.billing_reason.as_deref() == Some(CYCLE_BILLING_REASON)
    }
}

/// `billing_reason` of invoices raised by the subscription's renewal cycle.
pub const CYCLE_BILLING_REASON: &str = "subscription_cycle";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialEnding {
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
    pub trial_end: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpdated {
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
    pub status: SubscriptionStatus,
    pub trial_end: Option<Timestamp>,
}

/// Gateway-side subscription status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    Canceled,
    /// `incomplete_expired` or `unpaid`: the window closed without payment.
    Lapsed,
    Other(String),
}

impl SubscriptionStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "canceled" => SubscriptionStatus::Canceled,
            "incomplete_expired" | "unpaid" => SubscriptionStatus::Lapsed,
            other => SubscriptionStatus::Other(other.to_string()),
        }
    }

    /// True when the gateway confirms the trial period has begun.
    pub fn confirms_trial(&self) -> bool {
        matches!(self, SubscriptionStatus::Trialing | SubscriptionStatus::Active)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Object schemas
// ════════════════════════════════════════════════════════════════════════════

fn decode<T: serde::de::DeserializeOwned>(object: &serde_json::Value) -> Result<T, IngestError> {
    serde_json::from_value(object.clone())
        .map_err(|e| IngestError::UnparseableEvent(format!("data.object: {}", e)))
}

fn optional_timestamp(secs: Option<i64>) -> Result<Option<Timestamp>, IngestError> {
    secs.map(|s| {
        Timestamp::from_unix_secs(s)
            .ok_or_else(|| IngestError::UnparseableEvent(format!("timestamp out of range: {}", s)))
    })
    .transpose()
}

fn invalid(e: impl std::fmt::Display) -> IngestError {
    IngestError::UnparseableEvent(e.to_string())
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    trial_start: Option<i64>,
    #[serde(default)]
    trial_end: Option<i64>,
    #[serde(default)]
    plan: Option<PlanObject>,
    #[serde(default)]
    items: Option<ItemList>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PlanObject {
    #[serde(default)]
    amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ItemList {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionItem {
    #[serde(default)]
    price: Option<PriceObject>,
}

#[derive(Debug, Deserialize)]
struct PriceObject {
    #[serde(default)]
    unit_amount: Option<i64>,
}

impl SubscriptionObject {
    fn subscription_id(&self) -> Result<SubscriptionId, IngestError> {
        SubscriptionId::new(self.id.clone()).map_err(invalid)
    }

    fn customer_id(&self) -> Result<CustomerId, IngestError> {
        CustomerId::new(self.customer.clone()).map_err(invalid)
    }

    fn status(&self) -> SubscriptionStatus {
        self.status
            .as_deref()
            .map(SubscriptionStatus::parse)
            .unwrap_or_else(|| SubscriptionStatus::Other(String::new()))
    }

    fn plan_amount(&self) -> Result<Cents, IngestError> {
        let from_plan = self.plan.as_ref().and_then(|p| p.amount);
        let from_items = self
            .items
            .as_ref()
            .and_then(|items| items.data.first())
            .and_then(|item| item.price.as_ref())
            .and_then(|price| price.unit_amount);
        Cents::new(from_plan.or(from_items).unwrap_or(0)).map_err(invalid)
    }

    /// Tags from `metadata.acquisition_tags` (comma separated) and `utm_*` keys.
    fn acquisition_tags(&self) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        if let Some(list) = self.metadata.get("acquisition_tags") {
            tags.extend(
                list.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            );
        }
        for (key, value) in &self.metadata {
            if key.starts_with("utm_") && !value.trim().is_empty() {
                tags.insert(format!("{}={}", key, value.trim()));
            }
        }
        tags
    }

    fn into_created(self) -> Result<SubscriptionCreated, IngestError> {
        Ok(SubscriptionCreated {
            subscription_id: self.subscription_id()?,
            customer_id: self.customer_id()?,
            customer_email: self.metadata.get("email").cloned(),
            status: self.status(),
            trial_start: optional_timestamp(self.trial_start)?,
            trial_end: optional_timestamp(self.trial_end)?,
            plan_amount: self.plan_amount()?,
            acquisition_tags: self.acquisition_tags(),
        })
    }

    fn into_updated(
        self,
        forced: Option<SubscriptionStatus>,
    ) -> Result<SubscriptionUpdated, IngestError> {
        Ok(SubscriptionUpdated {
            subscription_id: self.subscription_id()?,
            customer_id: self.customer_id()?,
            status: forced.unwrap_or_else(|| self.status()),
            trial_end: optional_timestamp(self.trial_end)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    #[serde(default)]
    id: Option<String>,
    customer: String,
    #[serde(default)]
    subscription: Option<String>,
    amount_paid: i64,
    #[serde(default)]
    billing_reason: Option<String>,
}

impl InvoiceObject {
    fn into_payment(self) -> Result<PaymentSucceeded, IngestError> {
        let subscription_id = match self.subscription {
            Some(s) if !s.trim().is_empty() => Some(SubscriptionId::new(s).map_err(invalid)?),
            _ => None,
        };
        Ok(PaymentSucceeded {
            invoice_id: self.id,
            customer_id: CustomerId::new(self.customer).map_err(invalid)?,
            subscription_id,
            amount: Cents::new(self.amount_paid).map_err(invalid)?,
            billing_reason: self.billing_reason,
        })
    }
}

/// Builds gateway envelopes for tests.
#[cfg(test)]
pub mod test_support {
    use serde_json::json;

    pub fn envelope(id: &str, event_type: &str, created: i64, object: serde_json::Value) -> String {
        json!({
            "id": id,
            "type": event_type,
            "created": created,
            "data": { "object": object }
        })
        .to_string()
    }

    pub fn payment(id: &str, created: i64, amount: i64, subscription: Option<&str>) -> String {
        envelope(
            id,
            "invoice.payment_succeeded",
            created,
            json!({
                "id": format!("in_{}", id),
                "customer": "cus_1",
                "subscription": subscription,
                "amount_paid": amount,
                "billing_reason": "subscription_cycle"
            }),
        )
    }

    /// A `customer.subscription.*` event for `cus_1` with a 7900 plan.
    pub fn subscription(
        id: &str,
        event_type: &str,
        created: i64,
        subscription: &str,
        status: &str,
        trial_end: i64,
    ) -> String {
        envelope(
            id,
            event_type,
            created,
            json!({
                "id": subscription,
                "customer": "cus_1",
                "status": status,
                "trial_start": created,
                "trial_end": trial_end,
                "plan": { "amount": 7900 },
                "metadata": { "email": "ada@example.com" }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;

    fn parse(body: &str) -> PaymentEvent {
        GatewayEnvelope::parse(body.as_bytes())
            .unwrap()
            .to_event()
            .unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Envelope Parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn envelope_rejects_non_json() {
        let result = GatewayEnvelope::parse(b"not json");
        assert!(matches!(result, Err(IngestError::UnparseableEvent(_))));
    }

    #[test]
    fn envelope_rejects_missing_id() {
        let body = json!({"type": "x", "created": 1, "data": {"object": {}}}).to_string();
        let result = GatewayEnvelope::parse(body.as_bytes());
        assert!(matches!(result, Err(IngestError::UnparseableEvent(_))));
    }

    #[test]
    fn envelope_exposes_id_and_time() {
        let body = payment("evt_1", 1_710_000_000, 7900, None);
        let envelope = GatewayEnvelope::parse(body.as_bytes()).unwrap();

        assert_eq!(envelope.event_id().unwrap().as_str(), "evt_1");
        assert_eq!(envelope.occurred_at().unwrap().as_unix_secs(), 1_710_000_000);
    }

    #[test]
    fn blank_event_id_is_unparseable() {
        let body = payment("", 1, 100, None);
        let envelope = GatewayEnvelope::parse(body.as_bytes()).unwrap();
        assert!(envelope.event_id().is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // Typed Event Mapping
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn maps_payment_succeeded() {
        match parse(&payment("evt_1", 1, 7900, Some("sub_1"))) {
            PaymentEvent::PaymentSucceeded(p) => {
                assert_eq!(p.amount.value(), 7900);
                assert_eq!(p.subscription_id.unwrap().as_str(), "sub_1");
                assert_eq!(p.customer_id.as_str(), "cus_1");
                assert_eq!(p.invoice_id.as_deref(), Some("in_evt_1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn negative_payment_amount_is_unparseable() {
        let body = payment("evt_neg", 1, -10, None);
        let result = GatewayEnvelope::parse(body.as_bytes()).unwrap().to_event();
        assert!(matches!(result, Err(IngestError::UnparseableEvent(_))));
    }

    #[test]
    fn maps_subscription_created_with_tags() {
        let body = envelope(
            "evt_c",
            "customer.subscription.created",
            1,
            json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "trialing",
                "trial_start": 1_700_000_000,
                "trial_end": 1_701_209_600,
                "items": {"data": [{"price": {"unit_amount": 7900}}]},
                "metadata": {
                    "email": "ada@example.com",
                    "acquisition_tags": "podcast, spring-promo",
                    "utm_source": "newsletter"
                }
            }),
        );

        match parse(&body) {
            PaymentEvent::SubscriptionCreated(c) => {
                assert_eq!(c.subscription_id.as_str(), "sub_1");
                assert_eq!(c.status, SubscriptionStatus::Trialing);
                assert_eq!(c.plan_amount.value(), 7900);
                assert_eq!(c.customer_email.as_deref(), Some("ada@example.com"));
                assert!(c.trial_end.is_some());
                let tags: Vec<_> = c.acquisition_tags.iter().cloned().collect();
                assert_eq!(tags, vec!["podcast", "spring-promo", "utm_source=newsletter"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn plan_amount_prefers_legacy_plan() {
        let body = envelope(
            "evt_c",
            "customer.subscription.created",
            1,
            json!({"id": "sub_1", "customer": "cus_1", "plan": {"amount": 4900}}),
        );
        match parse(&body) {
            PaymentEvent::SubscriptionCreated(c) => assert_eq!(c.plan_amount.value(), 4900),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn maps_trial_will_end() {
        let body = envelope(
            "evt_t",
            "customer.subscription.trial_will_end",
            1,
            json!({"id": "sub_1", "customer": "cus_1", "trial_end": 1_701_209_600}),
        );
        assert!(matches!(parse(&body), PaymentEvent::TrialEnding(_)));
    }

    #[test]
    fn maps_deleted_to_canceled_update() {
        let body = envelope(
            "evt_d",
            "customer.subscription.deleted",
            1,
            json!({"id": "sub_1", "customer": "cus_1", "status": "active"}),
        );
        match parse(&body) {
            PaymentEvent::SubscriptionUpdated(u) => {
                assert_eq!(u.status, SubscriptionStatus::Canceled)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn maps_lapsed_statuses() {
        assert_eq!(
            SubscriptionStatus::parse("incomplete_expired"),
            SubscriptionStatus::Lapsed
        );
        assert_eq!(SubscriptionStatus::parse("unpaid"), SubscriptionStatus::Lapsed);
        assert!(SubscriptionStatus::parse("trialing").confirms_trial());
        assert!(!SubscriptionStatus::parse("past_due").confirms_trial());
    }

    #[test]
    fn unknown_type_is_accepted() {
        let body = envelope("evt_u", "charge.dispute.created", 1, json!({"anything": true}));
        assert_eq!(
            parse(&body),
            PaymentEvent::Unknown {
                event_type: "charge.dispute.created".to_string()
            }
        );
    }

    #[test]
    fn known_type_with_missing_fields_is_unparseable() {
        let body = envelope("evt_x", "invoice.payment_succeeded", 1, json!({"customer": "cus_1"}));
        let result = GatewayEnvelope::parse(body.as_bytes()).unwrap().to_event();
        assert!(matches!(result, Err(IngestError::UnparseableEvent(_))));
    }
}
