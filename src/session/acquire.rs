//! Session acquisition with bounded retry
//!
//! Session creation against a grid is flaky in a specific way: the
//! endpoint may be momentarily unreachable or out of capacity, and those
//! failures deserve another try. Bad capabilities or rejected credentials
//! do not: retrying them only hides the configuration error behind slow
//! repeated failures. The split lives in [`classify`], an explicit
//! predicate rather than an implicit set of caught exception types, so it
//! can be tested on its own.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::capabilities::CapabilitySet;
use crate::error::{EndpointError, SessionError};
use crate::provider::Provider;
use crate::session::endpoint::RemoteEndpoint;
use crate::session::Session;

/// Whether a failed creation attempt is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A retry may succeed (network blip, 5xx, endpoint warming up)
    Transient,
    /// A retry cannot help (bad capabilities, rejected credentials)
    Fatal,
}

/// Classify an endpoint failure for the retry loop
pub fn classify(err: &EndpointError) -> ErrorClass {
    match err {
        EndpointError::Network(_) | EndpointError::NotReady(_) | EndpointError::Timeout(_) => {
            ErrorClass::Transient
        }
        EndpointError::Http { status, .. } if *status >= 500 => ErrorClass::Transient,
        // 4xx covers malformed capabilities and rejected authentication
        EndpointError::Http { .. } => ErrorClass::Fatal,
        EndpointError::Protocol(_) | EndpointError::Observer(_) => ErrorClass::Fatal,
    }
}

/// Retry bounds for session acquisition
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total creation attempts, including the first (minimum 1)
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each subsequent retry
    pub base_delay: Duration,
    /// Add a small random component to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (1-based)
    fn delay_for(&self, attempt: u32) -> Duration {
        let doubled = self
            .base_delay
            .saturating_mul(1u32 << (attempt - 1).min(16));
        if self.jitter {
            let spread = (self.base_delay.as_millis() as u64 / 2).max(1);
            doubled + Duration::from_millis(rand::random::<u64>() % spread)
        } else {
            doubled
        }
    }
}

/// Opens sessions against an endpoint under a retry policy
pub struct SessionAcquirer {
    policy: RetryPolicy,
}

impl SessionAcquirer {
    /// Create an acquirer with the given retry policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy this acquirer runs under
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Acquire a session for `provider` with `capabilities`.
    ///
    /// Transient failures are retried with exponential backoff up to the
    /// policy's attempt bound; fatal failures abort immediately. Either
    /// way the last underlying error is carried verbatim in the returned
    /// [`SessionError`]. On success exactly one live session exists; on
    /// failure, none.
    #[instrument(skip_all, fields(provider = provider.name()))]
    pub async fn acquire(
        &self,
        endpoint: &dyn RemoteEndpoint,
        provider: Arc<Provider>,
        capabilities: CapabilitySet,
    ) -> Result<Session, SessionError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error: Option<EndpointError> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.policy.delay_for(attempt - 1);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying session creation"
                );
                tokio::time::sleep(delay).await;
            }

            match endpoint.create(&capabilities).await {
                Ok(id) => {
                    info!(session = %id, attempt, "session acquired");
                    return Ok(Session::new(id, capabilities, provider));
                }
                Err(err) => match classify(&err) {
                    ErrorClass::Fatal => {
                        warn!(attempt, error = %err, "fatal session creation failure");
                        return Err(SessionError::AcquisitionFailed {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    ErrorClass::Transient => {
                        warn!(attempt, error = %err, "transient session creation failure");
                        last_error = Some(err);
                    }
                },
            }
        }

        Err(SessionError::AcquisitionFailed {
            attempts: max_attempts,
            source: last_error.unwrap_or_else(|| {
                EndpointError::Network("session creation never attempted".to_string())
            }),
        })
    }
}

impl Default for SessionAcquirer {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transient() {
        assert_eq!(
            classify(&EndpointError::Network("reset".to_string())),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&EndpointError::NotReady("booting".to_string())),
            ErrorClass::Transient
        );
        assert_eq!(classify(&EndpointError::Timeout(5000)), ErrorClass::Transient);
        assert_eq!(
            classify(&EndpointError::Http {
                status: 503,
                message: "grid full".to_string()
            }),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_classify_fatal() {
        for status in [400, 401, 403, 404] {
            assert_eq!(
                classify(&EndpointError::Http {
                    status,
                    message: "rejected".to_string()
                }),
                ErrorClass::Fatal,
                "status {status} must be fatal"
            );
        }
        assert_eq!(
            classify(&EndpointError::Protocol("garbage".to_string())),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_delay_doubles_without_jitter() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            jitter: false,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_stays_bounded() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(100),
            jitter: true,
        };
        for _ in 0..32 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay < Duration::from_millis(150));
        }
    }
}
