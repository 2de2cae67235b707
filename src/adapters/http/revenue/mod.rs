//! Revenue HTTP adapter.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::{ProgressResponse, TrialResponse, WebhookAck, WeeklyProgressResponse};
pub use handlers::{RevenueAppState, SIGNATURE_HEADER};
pub use routes::revenue_router;
