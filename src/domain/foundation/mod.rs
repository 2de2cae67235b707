//! Foundation module - Shared domain primitives.
//!
//! Value objects, identifiers and error types that form the vocabulary of
//! revenue tracking.

mod errors;
mod ids;
mod money;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{CustomerId, EventId, NotificationId, SubscriptionId};
pub use money::Cents;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
