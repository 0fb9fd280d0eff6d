//! Per-caller request rate limiting
//!
//! In-memory only; counts reset when the process restarts.

mod sliding_window;

pub use sliding_window::{RateLimitConfig, RateLimitDecision, RateLimiter};
