//! Retry policy shared by connection attempts and in-flight commands.

use std::time::Duration;

/// How transient transport failures are retried.
///
/// One policy instance is shared across all commands in a session. Connect
/// attempts and command attempts both use the same attempt budget, per-attempt
/// timeout, and backoff delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
    /// Timeout applied to each individual attempt.
    pub attempt_timeout: Duration,
    /// Delay inserted between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy with explicit values.
    pub fn new(max_attempts: u32, attempt_timeout: Duration, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            backoff,
        }
    }

    /// A policy that tries exactly once with the given timeout.
    pub fn single_attempt(attempt_timeout: Duration) -> Self {
        Self::new(1, attempt_timeout, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            backoff: Duration::from_secs(1),
        }
    }
}
