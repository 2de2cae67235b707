//! HTTP adapters - REST API implementations.

pub mod error;
pub mod revenue;

pub use error::{ApiError, ErrorResponse};
pub use revenue::{revenue_router, RevenueAppState};
