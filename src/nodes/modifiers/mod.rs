//! Stream shaping: gating, smoothing, deduplication, throttling

pub mod average;
pub mod pass_on_change;
pub mod rate_limiter;
pub mod threshold_gate;

pub use average::AverageNode;
pub use pass_on_change::PassOnChangeNode;
pub use rate_limiter::RateLimiterNode;
pub use threshold_gate::ThresholdGateNode;
