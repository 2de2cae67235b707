//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (identifiers, money, timestamps, errors)
//! - `revenue` - Webhook intake, the event record and daily progress
//! - `trial` - Trial subscription lifecycle and customers
//! - `notification` - Outbound notification records

pub mod foundation;
pub mod notification;
pub mod revenue;
pub mod trial;
