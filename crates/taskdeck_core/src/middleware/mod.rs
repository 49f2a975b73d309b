//! Error/retry middleware wrapped around asynchronous store operations.
//!
//! # Responsibility
//! - Retry transient backend failures with bounded exponential backoff.
//! - Capture a structured [`ErrorRecord`] once the retry budget is spent.
//!
//! # Invariants
//! - Attempts for one call run strictly one after another.
//! - Local errors (`InvalidInput`, `NotFound`) are returned on first sight.
//! - The error surfaced after exhaustion is the last attempt's error.
//!
//! [`ErrorRecord`]: crate::error::ErrorRecord

mod retry;

pub use retry::{ErrorCallback, RetryMiddleware, RetryPolicy};
