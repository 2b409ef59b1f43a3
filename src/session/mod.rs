//! Session lifecycle
//!
//! A session is a live handle to a remote or local automation endpoint.
//! Exactly one session exists per test invocation: created by the
//! acquirer at setup, read-only while the test runs, destroyed
//! best-effort at teardown.

pub mod acquire;
pub mod endpoint;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::capabilities::CapabilitySet;
use crate::provider::Provider;
use endpoint::RemoteEndpoint;

pub use acquire::{classify, ErrorClass, RetryPolicy, SessionAcquirer};
pub use endpoint::{HttpEndpoint, LogEntry, LoggingObserver, ObservedEndpoint, SessionObserver};

/// A live automation session
#[derive(Debug)]
pub struct Session {
    id: String,
    capabilities: CapabilitySet,
    provider: Arc<Provider>,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Wrap a freshly created session id
    pub fn new(id: String, capabilities: CapabilitySet, provider: Arc<Provider>) -> Self {
        Self {
            id,
            capabilities,
            provider,
            created_at: Utc::now(),
        }
    }

    /// The opaque session identifier assigned by the endpoint
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The capability set this session was created with
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// The provider this session runs on
    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    /// When the session was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Destroy the remote session, swallowing any failure.
    ///
    /// Teardown must never fail the test or block run shutdown; a destroy
    /// error is logged and dropped.
    pub async fn dispose(&self, endpoint: &dyn RemoteEndpoint) {
        if let Err(err) = endpoint.destroy(&self.id).await {
            debug!(session = %self.id, error = %err, "session destroy failed, ignoring");
        }
    }
}
