//! Notification adapters - background delivery and the HTTP sink.

mod dispatcher;
mod http_sink;

pub use dispatcher::{DeliveryPolicy, DeliveryWorker, NotificationDispatcher};
pub use http_sink::{HttpNotificationSink, IDEMPOTENCY_HEADER};
