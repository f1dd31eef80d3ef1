//! Common utilities for the WebUSB host workspace
//!
//! This crate provides the ambient pieces shared by the session layer and
//! the host binary: error handling, logging setup, the per-subscriber event
//! bus and the bounded retry helper used around flaky device operations.

pub mod channel;
pub mod error;
pub mod logging;
pub mod retry;

pub use channel::{DEFAULT_QUEUE_CAPACITY, EventBus, Subscription};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use retry::{RetryPolicy, retry};
