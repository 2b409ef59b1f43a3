//! Remote automation endpoint client
//!
//! The automation endpoint is an opaque collaborator: it creates
//! sessions from a capability set, serves the diagnostic artifacts, and
//! destroys sessions. [`RemoteEndpoint`] is that contract; the core never
//! assumes anything about the protocol behind it beyond this surface.
//!
//! [`HttpEndpoint`] is the production implementation, speaking the JSON
//! wire dialect of WebDriver-style executors. [`ObservedEndpoint`]
//! decorates any endpoint with command event callbacks for test
//! instrumentation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, trace};

use crate::capabilities::CapabilitySet;
use crate::error::EndpointError;

/// One browser log entry as retrieved from the endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    /// Milliseconds since the epoch
    pub timestamp: i64,
    /// Log level as reported by the browser (e.g. `INFO`, `SEVERE`)
    pub level: String,
    /// Log message text
    pub message: String,
}

/// The narrow contract the core holds against the automation endpoint
#[async_trait::async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Create a session from a capability set, returning its opaque id
    async fn create(&self, capabilities: &CapabilitySet) -> Result<String, EndpointError>;

    /// The URL the session's browser is currently on
    async fn current_url(&self, session: &str) -> Result<String, EndpointError>;

    /// A screenshot of the current page, decoded to raw image bytes
    async fn screenshot(&self, session: &str) -> Result<Vec<u8>, EndpointError>;

    /// The current page's markup
    async fn page_source(&self, session: &str) -> Result<String, EndpointError>;

    /// Browser log entries, in the order the endpoint returns them
    async fn logs(&self, session: &str) -> Result<Vec<LogEntry>, EndpointError>;

    /// Tear the session down
    async fn destroy(&self, session: &str) -> Result<(), EndpointError>;
}

/// HTTP implementation of [`RemoteEndpoint`]
pub struct HttpEndpoint {
    base: String,
    client: reqwest::Client,
}

impl HttpEndpoint {
    /// Connect to an executor URL with a per-call timeout
    pub fn new(executor_url: &str, timeout: Duration) -> Result<Self, EndpointError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EndpointError::Network(e.to_string()))?;
        Ok(Self {
            base: executor_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// The executor base URL this endpoint talks to
    pub fn base_url(&self) -> &str {
        &self.base
    }

    async fn read_value(response: reqwest::Response) -> Result<Value, EndpointError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let mut message = body;
            message.truncate(512);
            return Err(EndpointError::Http {
                status: status.as_u16(),
                message,
            });
        }
        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| EndpointError::Protocol(format!("unparseable response: {e}")))?;
        Ok(parsed)
    }

    fn value_field(payload: &Value) -> Result<&Value, EndpointError> {
        payload
            .get("value")
            .ok_or_else(|| EndpointError::Protocol("response missing \"value\" field".to_string()))
    }
}

#[async_trait::async_trait]
impl RemoteEndpoint for HttpEndpoint {
    #[instrument(skip(self, capabilities))]
    async fn create(&self, capabilities: &CapabilitySet) -> Result<String, EndpointError> {
        let body = json!({ "capabilities": { "alwaysMatch": capabilities.to_value() } });
        let response = self
            .client
            .post(format!("{}/session", self.base))
            .json(&body)
            .send()
            .await?;
        let payload = Self::read_value(response).await?;
        let session_id = Self::value_field(&payload)?
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EndpointError::Protocol("session creation response carried no sessionId".to_string())
            })?;
        debug!(session = session_id, "session created");
        Ok(session_id.to_string())
    }

    async fn current_url(&self, session: &str) -> Result<String, EndpointError> {
        let response = self
            .client
            .get(format!("{}/session/{}/url", self.base, session))
            .send()
            .await?;
        let payload = Self::read_value(response).await?;
        Self::value_field(&payload)?
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| EndpointError::Protocol("url response was not a string".to_string()))
    }

    async fn screenshot(&self, session: &str) -> Result<Vec<u8>, EndpointError> {
        let response = self
            .client
            .get(format!("{}/session/{}/screenshot", self.base, session))
            .send()
            .await?;
        let payload = Self::read_value(response).await?;
        let encoded = Self::value_field(&payload)?.as_str().ok_or_else(|| {
            EndpointError::Protocol("screenshot response was not a string".to_string())
        })?;
        BASE64
            .decode(encoded)
            .map_err(|e| EndpointError::Protocol(format!("screenshot was not base64: {e}")))
    }

    async fn page_source(&self, session: &str) -> Result<String, EndpointError> {
        let response = self
            .client
            .get(format!("{}/session/{}/source", self.base, session))
            .send()
            .await?;
        let payload = Self::read_value(response).await?;
        Self::value_field(&payload)?
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| EndpointError::Protocol("source response was not a string".to_string()))
    }

    async fn logs(&self, session: &str) -> Result<Vec<LogEntry>, EndpointError> {
        let response = self
            .client
            .post(format!("{}/session/{}/log", self.base, session))
            .json(&json!({ "type": "browser" }))
            .send()
            .await?;
        let payload = Self::read_value(response).await?;
        let entries = Self::value_field(&payload)?.clone();
        serde_json::from_value(entries)
            .map_err(|e| EndpointError::Protocol(format!("unparseable log entries: {e}")))
    }

    async fn destroy(&self, session: &str) -> Result<(), EndpointError> {
        let response = self
            .client
            .delete(format!("{}/session/{}", self.base, session))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            message.truncate(512);
            return Err(EndpointError::Http {
                status: status.as_u16(),
                message,
            });
        }
        trace!(session, "session destroyed");
        Ok(())
    }
}

/// Callbacks fired around every endpoint command.
///
/// Callback failures propagate to the caller as ordinary endpoint
/// errors; they are test-instrumentation failures, not acquisition
/// failures, and are never retried.
#[async_trait::async_trait]
pub trait SessionObserver: Send + Sync {
    /// Fired before a command is sent
    async fn on_command(&self, command: &str) -> anyhow::Result<()> {
        let _ = command;
        Ok(())
    }

    /// Fired after a command completes, with its success flag
    async fn on_command_finished(&self, command: &str, succeeded: bool) -> anyhow::Result<()> {
        let _ = (command, succeeded);
        Ok(())
    }
}

/// Observer that logs every command through `tracing`
#[derive(Clone)]
pub struct LoggingObserver;

#[async_trait::async_trait]
impl SessionObserver for LoggingObserver {
    async fn on_command(&self, command: &str) -> anyhow::Result<()> {
        debug!(command, "endpoint command");
        Ok(())
    }

    async fn on_command_finished(&self, command: &str, succeeded: bool) -> anyhow::Result<()> {
        debug!(command, succeeded, "endpoint command finished");
        Ok(())
    }
}

/// Transparent observer decorator over any [`RemoteEndpoint`]
pub struct ObservedEndpoint {
    inner: Arc<dyn RemoteEndpoint>,
    observer: Arc<dyn SessionObserver>,
}

impl ObservedEndpoint {
    /// Wrap `inner` so `observer` sees every command
    pub fn new(inner: Arc<dyn RemoteEndpoint>, observer: Arc<dyn SessionObserver>) -> Self {
        Self { inner, observer }
    }

    async fn observed<T, F>(&self, command: &str, call: F) -> Result<T, EndpointError>
    where
        F: Future<Output = Result<T, EndpointError>>,
    {
        self.observer
            .on_command(command)
            .await
            .map_err(|e| EndpointError::Observer(e.to_string()))?;
        let result = call.await;
        self.observer
            .on_command_finished(command, result.is_ok())
            .await
            .map_err(|e| EndpointError::Observer(e.to_string()))?;
        result
    }
}

#[async_trait::async_trait]
impl RemoteEndpoint for ObservedEndpoint {
    async fn create(&self, capabilities: &CapabilitySet) -> Result<String, EndpointError> {
        self.observed("create", self.inner.create(capabilities)).await
    }

    async fn current_url(&self, session: &str) -> Result<String, EndpointError> {
        self.observed("current_url", self.inner.current_url(session))
            .await
    }

    async fn screenshot(&self, session: &str) -> Result<Vec<u8>, EndpointError> {
        self.observed("screenshot", self.inner.screenshot(session))
            .await
    }

    async fn page_source(&self, session: &str) -> Result<String, EndpointError> {
        self.observed("page_source", self.inner.page_source(session))
            .await
    }

    async fn logs(&self, session: &str) -> Result<Vec<LogEntry>, EndpointError> {
        self.observed("logs", self.inner.logs(session)).await
    }

    async fn destroy(&self, session: &str) -> Result<(), EndpointError> {
        self.observed("destroy", self.inner.destroy(session)).await
    }
}
