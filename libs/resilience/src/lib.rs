//! Retry helpers shared by the overlay integrations.
//!
//! Every upstream the service talks to (chat lookup endpoints, the sharded
//! chat sockets, the music token endpoint) is retried with bounded, jittered
//! exponential backoff. Connection loops that must interleave cancellation
//! with their backoff use [`RetryConfig::backoff_for`] directly; one-shot
//! calls go through [`with_retry`].

pub mod retry;

pub use retry::{with_retry, RetryConfig, RetryError};
