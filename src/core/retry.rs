//! Decides which failed attempts are worth repeating, and when.

use std::time::Duration;

use crate::core::request::TransportErrorKind;

/// The retry-relevant projection of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryableError {
    /// The server answered with this HTTP status.
    Status(u16),
    /// The transport failed before a complete response arrived.
    Transport(TransportErrorKind),
}

/// Decides whether an attempt is repeated and how long to back off first.
///
/// `attempt` counts from zero; `delay(n)` is the pause taken before attempt
/// `n + 1`. Implementations must produce a non-decreasing delay sequence.
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, error: &RetryableError, attempt: u32) -> bool;
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff without jitter: `(1 << attempt) * scale`, up to
/// `max_retries` retries. Server errors (5xx) and transient transport
/// failures are retryable; everything else surfaces immediately.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_retries: u32,
    scale: Duration,
}

impl ExponentialBackoff {
    pub fn new(max_retries: u32, scale: Duration) -> ExponentialBackoff {
        ExponentialBackoff { max_retries, scale }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        ExponentialBackoff::new(3, Duration::from_millis(300))
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn should_retry(&self, error: &RetryableError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match error {
            RetryableError::Status(code) => (500..599).contains(code),
            RetryableError::Transport(kind) => matches!(
                kind,
                TransportErrorKind::ConnectFailed
                    | TransportErrorKind::PartialFile
                    | TransportErrorKind::WriteError
                    | TransportErrorKind::TimedOut
                    | TransportErrorKind::GotNothing
                    | TransportErrorKind::SendError
                    | TransportErrorKind::RecvError
            ),
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.scale * (1u32 << attempt.min(31))
    }
}
