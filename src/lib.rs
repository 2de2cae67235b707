//! Revenue Pulse - live revenue event processing and trial-conversion tracking
//!
//! Payment gateway webhooks are verified, claimed exactly once and applied to
//! two pieces of state: the daily revenue total measured against a fixed
//! target, and each subscription's trial lifecycle. Changes fan out to
//! downstream collaborators through durable, retried notifications and to
//! dashboards through a live WebSocket channel.

pub mod adapters;
pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
