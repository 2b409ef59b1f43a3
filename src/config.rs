//! Resolved run configuration
//!
//! The core never parses argv or environment directly; the binary (or a
//! host test runner) resolves everything into one [`RunConfig`] value and
//! the core consumes that.

use std::path::PathBuf;
use std::time::Duration;

use crate::capabilities::CapabilitySet;
use crate::debug::{ArtifactKind, CapturePolicy, DebugOptions};
use crate::report::JobAuthMode;
use crate::session::RetryPolicy;

/// Everything the core needs to know for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Driver selector (browser name, "remote", or a cloud vendor)
    pub driver: String,
    /// Explicit executor URL; overrides host/port
    pub executor_url: Option<String>,
    /// Executor host used when no explicit URL is given
    pub host: String,
    /// Executor port used when no explicit URL is given
    pub port: u16,
    /// Session-scoped capability overrides
    pub capabilities: CapabilitySet,
    /// Explicit credential file, replacing the per-provider search
    pub credential_file: Option<PathBuf>,
    /// When to capture debug artifacts
    pub capture: CapturePolicy,
    /// Artifact kinds to skip entirely
    pub exclude_artifacts: Vec<ArtifactKind>,
    /// Job viewing URL authorization mode
    pub job_auth: JobAuthMode,
    /// Session creation attempts, including the first
    pub max_attempts: u32,
    /// Backoff base delay between creation attempts
    pub base_delay: Duration,
    /// Deadline for each artifact and vendor API call
    pub call_timeout: Duration,
    /// Where to write the rendered report
    pub report_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            driver: "chrome".to_string(),
            executor_url: None,
            host: "localhost".to_string(),
            port: 4444,
            capabilities: CapabilitySet::new(),
            credential_file: None,
            capture: CapturePolicy::OnFailure,
            exclude_artifacts: Vec::new(),
            job_auth: JobAuthMode::None,
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            call_timeout: Duration::from_secs(10),
            report_path: None,
        }
    }
}

impl RunConfig {
    /// Create a config builder
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// The executor URL used when the provider does not dictate one
    pub fn executor_fallback(&self) -> String {
        self.executor_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}/wd/hub", self.host, self.port))
    }

    /// The acquisition retry policy this config describes
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            jitter: true,
        }
    }

    /// The debug collector options this config describes
    pub fn debug_options(&self) -> DebugOptions {
        DebugOptions {
            exclude: self.exclude_artifacts.clone(),
            artifact_timeout: self.call_timeout,
        }
    }
}

/// Builder for [`RunConfig`]
#[derive(Default)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    /// Set the driver selector
    pub fn driver<S: Into<String>>(mut self, driver: S) -> Self {
        self.config.driver = driver.into();
        self
    }

    /// Set an explicit executor URL
    pub fn executor_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.executor_url = Some(url.into());
        self
    }

    /// Set the executor host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the executor port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Add one session-scoped capability override
    pub fn capability<K: Into<String>, V: Into<serde_json::Value>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.config.capabilities.insert(key, value);
        self
    }

    /// Merge a set of session-scoped capability overrides
    pub fn capabilities(mut self, caps: &CapabilitySet) -> Self {
        self.config.capabilities.merge_from(caps);
        self
    }

    /// Set an explicit credential file
    pub fn credential_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.credential_file = Some(path.into());
        self
    }

    /// Set the capture policy
    pub fn capture(mut self, policy: CapturePolicy) -> Self {
        self.config.capture = policy;
        self
    }

    /// Exclude an artifact kind from capture
    pub fn exclude_artifact(mut self, kind: ArtifactKind) -> Self {
        self.config.exclude_artifacts.push(kind);
        self
    }

    /// Set the job URL authorization mode
    pub fn job_auth(mut self, mode: JobAuthMode) -> Self {
        self.config.job_auth = mode;
        self
    }

    /// Set the acquisition attempt bound
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Set the backoff base delay in milliseconds
    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.config.base_delay = Duration::from_millis(ms);
        self
    }

    /// Set the per-call deadline in seconds
    pub fn call_timeout_secs(mut self, secs: u64) -> Self {
        self.config.call_timeout = Duration::from_secs(secs);
        self
    }

    /// Set the report output path
    pub fn report_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.report_path = Some(path.into());
        self
    }

    /// Build the config
    pub fn build(self) -> RunConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.driver, "chrome");
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.capture, CapturePolicy::OnFailure);
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert_eq!(config.executor_fallback(), "http://localhost:4444/wd/hub");
    }

    #[test]
    fn test_explicit_executor_wins_over_host_port() {
        let config = RunConfig::builder()
            .executor_url("http://grid.internal:5555/wd/hub")
            .host("ignored")
            .port(1)
            .build();
        assert_eq!(config.executor_fallback(), "http://grid.internal:5555/wd/hub");
    }

    #[test]
    fn test_builder_round_trip() {
        let config = RunConfig::builder()
            .driver("saucelabs")
            .capability("browserName", "firefox")
            .capture(CapturePolicy::Always)
            .exclude_artifact(ArtifactKind::Logs)
            .job_auth(JobAuthMode::Hour)
            .max_attempts(5)
            .base_delay_ms(100)
            .build();
        assert_eq!(config.driver, "saucelabs");
        assert_eq!(config.capabilities.get_str("browserName"), Some("firefox"));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.retry_policy().base_delay, Duration::from_millis(100));
        assert_eq!(config.debug_options().exclude, vec![ArtifactKind::Logs]);
    }
}
