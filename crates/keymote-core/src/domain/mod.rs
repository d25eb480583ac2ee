//! Domain types with no I/O: the remote's reconnect schedule and latency window.

pub mod backoff;
pub mod latency;

pub use backoff::{BackoffPolicy, ReconnectBackoff};
pub use latency::LatencyWindow;
