//! Trial module - per-subscription lifecycle and the customer registry.

mod customer;
mod state;
mod subscription;

pub use customer::Customer;
pub use state::TrialState;
pub use subscription::TrialSubscription;
