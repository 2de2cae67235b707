//! WebSocket adapters for live revenue progress.
//!
//! ```text
//! EventApplier ──publish──▶ LiveBroadcaster (broadcast channel, drop-oldest)
//!                                  │
//!                     ┌────────────┼────────────┐
//!                     ▼            ▼            ▼
//!                 observer     observer     observer
//! ```
//!
//! - [`broadcaster`] - bounded fan-out implementing `ProgressBroadcaster`
//! - [`messages`] - wire protocol
//! - [`handler`] - Axum WebSocket upgrade handler

pub mod broadcaster;
pub mod handler;
pub mod messages;

pub use broadcaster::{LiveBroadcaster, DEFAULT_CAPACITY};
pub use handler::{live_progress_ws, LiveState};
pub use messages::LiveMessage;
