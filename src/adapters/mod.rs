//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `http` - Webhook intake and read endpoints (Axum)
//! - `websocket` - Live progress fan-out
//! - `notifications` - Background delivery and the outbound HTTP sink
//! - `postgres` - Durable stores
//! - `memory` - Process-local stores for tests and development

pub mod http;
pub mod memory;
pub mod notifications;
pub mod postgres;
pub mod websocket;
