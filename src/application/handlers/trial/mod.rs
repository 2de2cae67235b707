//! Trial handlers - lifecycle transitions and the expiry sweep.

mod expire_lapsed_trials;
mod lifecycle_engine;

pub use expire_lapsed_trials::{ExpirySweepConfig, TrialExpirySweeper};
pub use lifecycle_engine::{LifecycleOutcome, TrialLifecycleEngine, DEFAULT_CONFLICT_RETRIES};
