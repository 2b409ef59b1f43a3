//! Failure diagnostics capture
//!
//! When a test ends in a capture-triggering state, the collector pulls a
//! fixed set of artifacts from the live session: the current URL, a
//! screenshot, the page markup, and the browser log. Artifact kinds are
//! independent: one kind failing records a warning and never blocks the
//! others, and a kind known to be unsupported on the current provider can
//! be excluded outright.

use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::ConfigError;
use crate::session::endpoint::{LogEntry, RemoteEndpoint};

/// When debug artifacts are captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapturePolicy {
    /// Never capture
    Never,
    /// Capture when the test fails (default)
    #[default]
    OnFailure,
    /// Capture for every test
    Always,
}

impl CapturePolicy {
    /// Whether this policy triggers capture for an outcome
    pub fn triggers(&self, failed: bool) -> bool {
        match self {
            CapturePolicy::Never => false,
            CapturePolicy::OnFailure => failed,
            CapturePolicy::Always => true,
        }
    }
}

impl FromStr for CapturePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(CapturePolicy::Never),
            "on-failure" | "failure" => Ok(CapturePolicy::OnFailure),
            "always" => Ok(CapturePolicy::Always),
            other => Err(ConfigError::InvalidConfiguration(format!(
                "unknown capture policy: {other}"
            ))),
        }
    }
}

/// The artifact kinds the collector knows how to gather
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Current page URL
    Url,
    /// Screenshot of the current page
    Screenshot,
    /// Page markup
    Markup,
    /// Browser log entries
    Logs,
}

impl ArtifactKind {
    /// All artifact kinds, in collection order
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Url,
        ArtifactKind::Screenshot,
        ArtifactKind::Markup,
        ArtifactKind::Logs,
    ];

    /// Stable lowercase name, used in warnings and the exclusion list
    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKind::Url => "url",
            ArtifactKind::Screenshot => "screenshot",
            ArtifactKind::Markup => "markup",
            ArtifactKind::Logs => "logs",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArtifactKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "url" => Ok(ArtifactKind::Url),
            "screenshot" => Ok(ArtifactKind::Screenshot),
            "markup" | "html" => Ok(ArtifactKind::Markup),
            "logs" => Ok(ArtifactKind::Logs),
            other => Err(ConfigError::InvalidConfiguration(format!(
                "unknown artifact kind: {other}"
            ))),
        }
    }
}

/// Collector knobs
#[derive(Debug, Clone)]
pub struct DebugOptions {
    /// Artifact kinds to skip entirely
    pub exclude: Vec<ArtifactKind>,
    /// Per-artifact retrieval deadline
    pub artifact_timeout: Duration,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            artifact_timeout: Duration::from_secs(10),
        }
    }
}

/// The diagnostics captured for one test
///
/// Every field is independently optional: a missing artifact never
/// invalidates the others. Immutable once assembled.
#[derive(Debug, Default, Clone)]
pub struct DebugBundle {
    /// URL the browser was on when the test concluded
    pub url: Option<String>,
    /// Screenshot image bytes
    pub screenshot: Option<Vec<u8>>,
    /// Page markup, base64-encoded for transport into the report
    pub markup: Option<String>,
    /// Browser log rendered as `timestamp level - message` lines
    pub log_text: Option<String>,
    /// Per-artifact warnings accumulated during collection
    pub warnings: Vec<String>,
}

impl DebugBundle {
    /// True when no artifact was captured and no warning recorded
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.screenshot.is_none()
            && self.markup.is_none()
            && self.log_text.is_none()
            && self.warnings.is_empty()
    }

    /// Number of artifacts present
    pub fn artifact_count(&self) -> usize {
        [
            self.url.is_some(),
            self.screenshot.is_some(),
            self.markup.is_some(),
            self.log_text.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// Render log entries in retrieval order, one `timestamp level - message`
/// line per entry. The order the endpoint returned is preserved; entries
/// are not re-sorted by timestamp.
pub fn render_log_entries(entries: &[LogEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            let stamp = chrono::Utc
                .timestamp_millis_opt(entry.timestamp)
                .single()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
                .unwrap_or_else(|| entry.timestamp.to_string());
            format!("{} {} - {}", stamp, entry.level, entry.message)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Gathers debug artifacts from a live session
pub struct DebugCollector {
    options: DebugOptions,
}

impl DebugCollector {
    /// Create a collector with the given options
    pub fn new(options: DebugOptions) -> Self {
        Self { options }
    }

    /// Collect all non-excluded artifact kinds from `session`.
    ///
    /// Never fails: each kind is attempted under its own deadline, and a
    /// failure becomes a warning in the returned bundle.
    #[instrument(skip_all, fields(session = %session))]
    pub async fn collect(&self, endpoint: &dyn RemoteEndpoint, session: &str) -> DebugBundle {
        let mut bundle = DebugBundle::default();

        for kind in ArtifactKind::ALL {
            if self.options.exclude.contains(&kind) {
                debug!(artifact = %kind, "artifact excluded");
                continue;
            }
            self.collect_kind(endpoint, session, kind, &mut bundle).await;
        }

        debug!(
            artifacts = bundle.artifact_count(),
            warnings = bundle.warnings.len(),
            "debug collection finished"
        );
        bundle
    }

    async fn collect_kind(
        &self,
        endpoint: &dyn RemoteEndpoint,
        session: &str,
        kind: ArtifactKind,
        bundle: &mut DebugBundle,
    ) {
        let deadline = self.options.artifact_timeout;
        let outcome = tokio::time::timeout(deadline, async {
            match kind {
                ArtifactKind::Url => {
                    bundle.url = Some(endpoint.current_url(session).await?);
                }
                ArtifactKind::Screenshot => {
                    // At most one screenshot per test; the most recent wins
                    bundle.screenshot = Some(endpoint.screenshot(session).await?);
                }
                ArtifactKind::Markup => {
                    let source = endpoint.page_source(session).await?;
                    bundle.markup = Some(BASE64.encode(source.as_bytes()));
                }
                ArtifactKind::Logs => {
                    let entries = endpoint.logs(session).await?;
                    bundle.log_text = Some(render_log_entries(&entries));
                }
            }
            Ok::<(), crate::error::EndpointError>(())
        })
        .await;

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("timed out after {}ms", deadline.as_millis()),
        };
        warn!(artifact = %kind, error = %failure, "artifact capture failed");
        bundle
            .warnings
            .push(format!("Failed to gather {kind}: {failure}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CapabilitySet;
    use crate::error::EndpointError;

    struct PartialEndpoint;

    #[async_trait::async_trait]
    impl RemoteEndpoint for PartialEndpoint {
        async fn create(&self, _capabilities: &CapabilitySet) -> Result<String, EndpointError> {
            Ok("s1".to_string())
        }
        async fn current_url(&self, _session: &str) -> Result<String, EndpointError> {
            Ok("https://example.com/login".to_string())
        }
        async fn screenshot(&self, _session: &str) -> Result<Vec<u8>, EndpointError> {
            Err(EndpointError::Http {
                status: 500,
                message: "renderer crashed".to_string(),
            })
        }
        async fn page_source(&self, _session: &str) -> Result<String, EndpointError> {
            Ok("<html><body>login</body></html>".to_string())
        }
        async fn logs(&self, _session: &str) -> Result<Vec<LogEntry>, EndpointError> {
            Ok(vec![
                LogEntry {
                    timestamp: 1_700_000_000_500,
                    level: "INFO".to_string(),
                    message: "second-by-timestamp but first-by-order".to_string(),
                },
                LogEntry {
                    timestamp: 1_700_000_000_000,
                    level: "SEVERE".to_string(),
                    message: "boom".to_string(),
                },
            ])
        }
        async fn destroy(&self, _session: &str) -> Result<(), EndpointError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_artifact_isolated() {
        let collector = DebugCollector::new(DebugOptions::default());
        let bundle = collector.collect(&PartialEndpoint, "s1").await;

        assert_eq!(bundle.artifact_count(), 3);
        assert_eq!(bundle.url.as_deref(), Some("https://example.com/login"));
        assert!(bundle.markup.is_some());
        assert!(bundle.log_text.is_some());
        assert!(bundle.screenshot.is_none());

        assert_eq!(bundle.warnings.len(), 1);
        assert!(bundle.warnings[0].contains("screenshot"));
        assert!(bundle.warnings[0].contains("renderer crashed"));
    }

    #[tokio::test]
    async fn test_exclusion_skips_kind_silently() {
        let collector = DebugCollector::new(DebugOptions {
            exclude: vec![ArtifactKind::Screenshot, ArtifactKind::Logs],
            ..Default::default()
        });
        let bundle = collector.collect(&PartialEndpoint, "s1").await;

        assert!(bundle.screenshot.is_none());
        assert!(bundle.log_text.is_none());
        // The excluded failing artifact produced no warning
        assert!(bundle.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_markup_is_base64_encoded() {
        let collector = DebugCollector::new(DebugOptions::default());
        let bundle = collector.collect(&PartialEndpoint, "s1").await;
        let encoded = bundle.markup.unwrap();
        let decoded = BASE64.decode(encoded).unwrap();
        assert_eq!(decoded, b"<html><body>login</body></html>");
    }

    #[test]
    fn test_log_rendering_preserves_retrieval_order() {
        let entries = vec![
            LogEntry {
                timestamp: 2_000,
                level: "INFO".to_string(),
                message: "later stamp, first row".to_string(),
            },
            LogEntry {
                timestamp: 1_000,
                level: "SEVERE".to_string(),
                message: "earlier stamp, second row".to_string(),
            },
        ];
        let text = render_log_entries(&entries);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO - later stamp, first row"));
        assert!(lines[1].contains("SEVERE - earlier stamp, second row"));
    }

    #[test]
    fn test_capture_policy_parse_and_trigger() {
        assert_eq!("never".parse::<CapturePolicy>().unwrap(), CapturePolicy::Never);
        assert_eq!(
            "on-failure".parse::<CapturePolicy>().unwrap(),
            CapturePolicy::OnFailure
        );
        assert_eq!("ALWAYS".parse::<CapturePolicy>().unwrap(), CapturePolicy::Always);
        assert!("sometimes".parse::<CapturePolicy>().is_err());

        assert!(!CapturePolicy::Never.triggers(true));
        assert!(CapturePolicy::OnFailure.triggers(true));
        assert!(!CapturePolicy::OnFailure.triggers(false));
        assert!(CapturePolicy::Always.triggers(false));
    }

    #[test]
    fn test_artifact_kind_parse() {
        assert_eq!("html".parse::<ArtifactKind>().unwrap(), ArtifactKind::Markup);
        assert_eq!("URL".parse::<ArtifactKind>().unwrap(), ArtifactKind::Url);
        assert!("video".parse::<ArtifactKind>().is_err());
    }
}
