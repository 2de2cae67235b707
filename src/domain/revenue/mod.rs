//! Revenue module - webhook intake, event records and daily progress.
//!
//! # Key Types
//!
//! - `EventValidator` - authenticates and parses gateway webhooks
//! - `PaymentEvent` - closed set of typed gateway events
//! - `RevenueEvent` - immutable record appended to the event log
//! - `BusinessCalendar` - buckets instants by business date in a fixed zone
//! - `DailyRevenueSnapshot` - running total against the daily target

mod daily;
mod errors;
mod event;
mod gateway_event;
mod webhook_verifier;

pub use daily::{BusinessCalendar, DailyRevenueSnapshot, RevenueContribution, WeeklyProgress};
pub use errors::IngestError;
pub use event::{
    ApplyOutcome, EventLogEntry, EventValidator, ProcessingStatus, RevenueEvent, ValidatedEvent,
};
pub use gateway_event::{
    GatewayEnvelope, GatewayEventData, PaymentEvent, PaymentSucceeded, SubscriptionCreated,
    SubscriptionStatus, SubscriptionUpdated, TrialEnding, CYCLE_BILLING_REASON,
};
pub use webhook_verifier::{sign_payload, SignatureHeader, WebhookVerifier, DEFAULT_TOLERANCE_SECS};

#[cfg(test)]
pub(crate) use gateway_event::test_support;
