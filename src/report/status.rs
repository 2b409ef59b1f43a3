//! Cloud job status reporting
//!
//! After a test concludes on a cloud grid, the reporter pushes the
//! pass/fail verdict to the vendor API and fetches the job reference
//! (viewing URL, video asset) for the report. All of this is best-effort
//! bookkeeping: any failure here is downgraded to a warning on the test's
//! diagnostic summary and never fails the test itself.

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::error::{ConfigError, Error, Result};
use crate::provider::vendors::{fill_template, VendorProfile};
use crate::provider::{ApiAuth, StatusPayload};
use crate::session::Session;

/// How job viewing URLs are authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobAuthMode {
    /// Plain URL, no token
    #[default]
    None,
    /// Signed token valid indefinitely
    Token,
    /// Signed token valid for the current hour
    Hour,
    /// Signed token valid for the current day
    Day,
}

impl FromStr for JobAuthMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(JobAuthMode::None),
            "token" => Ok(JobAuthMode::Token),
            "hour" => Ok(JobAuthMode::Hour),
            "day" => Ok(JobAuthMode::Day),
            other => Err(ConfigError::InvalidConfiguration(format!(
                "unknown job auth mode: {other}"
            ))),
        }
    }
}

/// A provider-side reference to the recorded job
#[derive(Debug, Clone, PartialEq)]
pub struct JobReference {
    /// URL a human can open to view the job
    pub url: String,
    /// Video asset URL, when the vendor exposes one
    pub video_url: Option<String>,
}

/// What reporting produced for one test
#[derive(Debug, Default)]
pub struct JobOutcome {
    /// Job reference for report enrichment, if it could be fetched
    pub job: Option<JobReference>,
    /// Warnings accumulated from failed reporting calls
    pub warnings: Vec<String>,
}

/// Pushes job status to cloud vendors and resolves job references
pub struct CloudStatusReporter {
    client: reqwest::Client,
    auth_mode: JobAuthMode,
    api_origin: Option<String>,
}

impl CloudStatusReporter {
    /// Create a reporter with the given job-URL auth mode and per-call
    /// timeout
    pub fn new(auth_mode: JobAuthMode, call_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|e| Error::generic(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            auth_mode,
            api_origin: None,
        })
    }

    /// Route all vendor API calls through a different origin.
    ///
    /// Meant for proxies and test doubles; path and query are preserved.
    pub fn with_api_origin<S: Into<String>>(mut self, origin: S) -> Self {
        self.api_origin = Some(origin.into().trim_end_matches('/').to_string());
        self
    }

    /// Report `passed` for the session's job and fetch its job reference.
    ///
    /// No-op for the local provider. Never fails: every vendor-side error
    /// is collected as a warning on the returned outcome.
    #[instrument(skip_all, fields(session = %session.id(), passed))]
    pub async fn report(&self, session: &Session, passed: bool) -> JobOutcome {
        let provider = session.provider();
        let Some(profile) = provider.profile() else {
            return JobOutcome::default();
        };

        let mut outcome = JobOutcome::default();
        let (username, key) = match (provider.username(), provider.access_key()) {
            (Ok(u), Ok(k)) => (u, k),
            (Err(e), _) | (_, Err(e)) => {
                outcome.warnings.push(format!(
                    "Failed to report status to {}: {e}",
                    profile.display
                ));
                return outcome;
            }
        };

        self.update_status(profile, &username, &key, session.id(), passed, &mut outcome)
            .await;

        let video_url = self
            .fetch_job_info(profile, &username, &key, session.id(), &mut outcome)
            .await
            .and_then(|info| extract_video_url(&info));

        let url = self.job_url(profile, &username, &key, session.id());
        outcome.job = Some(JobReference { url, video_url });
        outcome
    }

    /// The (possibly token-signed) job viewing URL for a session
    pub fn job_url(
        &self,
        profile: &VendorProfile,
        username: &str,
        key: &str,
        session_id: &str,
    ) -> String {
        let url = fill_template(profile.job_url_tpl, username, key, session_id);
        match self.auth_token(username, key, session_id) {
            Some(token) => {
                let separator = if url.contains('?') { '&' } else { '?' };
                format!("{url}{separator}auth={token}")
            }
            None => url,
        }
    }

    async fn update_status(
        &self,
        profile: &VendorProfile,
        username: &str,
        key: &str,
        session_id: &str,
        passed: bool,
        outcome: &mut JobOutcome,
    ) {
        // A passed verdict must not overwrite a job the vendor already
        // recorded as failed (a teardown-phase call racing an earlier
        // setup-phase failure). Failures always overwrite.
        if passed {
            let mut probe = JobOutcome::default();
            if let Some(info) = self
                .fetch_job_info(profile, username, key, session_id, &mut probe)
                .await
            {
                if job_already_failed(&info) {
                    debug!("job already marked failed, keeping failed status");
                    return;
                }
            }
            // A failed read-back is inconclusive; proceed with the write
        }

        let url = self.rebase(&fill_template(
            profile.status_url_tpl,
            username,
            key,
            session_id,
        ));
        let mut request = self.client.put(&url);
        if profile.api_auth == ApiAuth::Basic {
            request = request.basic_auth(username, Some(key));
        }
        request = match profile.payload {
            StatusPayload::PassedBool => request.json(&json!({ "passed": passed })),
            StatusPayload::StatusString => {
                request.json(&json!({ "status": if passed { "passed" } else { "failed" } }))
            }
            StatusPayload::SuccessFlag => {
                request.form(&[("test[success]", if passed { "1" } else { "0" })])
            }
            StatusPayload::Score => request.form(&[
                ("action", "set_score"),
                ("score", if passed { "pass" } else { "fail" }),
            ]),
        };

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(vendor = profile.display, "job status updated");
            }
            Ok(response) => {
                let status = response.status().as_u16();
                warn!(vendor = profile.display, status, "status update rejected");
                outcome.warnings.push(format!(
                    "Failed to update job status on {}: HTTP {status}",
                    profile.display
                ));
            }
            Err(err) => {
                warn!(vendor = profile.display, error = %err, "status update failed");
                outcome.warnings.push(format!(
                    "Failed to update job status on {}: {err}",
                    profile.display
                ));
            }
        }
    }

    async fn fetch_job_info(
        &self,
        profile: &VendorProfile,
        username: &str,
        key: &str,
        session_id: &str,
        outcome: &mut JobOutcome,
    ) -> Option<Value> {
        let url = self.rebase(&fill_template(
            profile.job_info_url_tpl,
            username,
            key,
            session_id,
        ));
        let mut request = self.client.get(&url);
        if profile.api_auth == ApiAuth::Basic {
            request = request.basic_auth(username, Some(key));
        }

        let failure = match request.send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<Value>().await {
                    Ok(info) => return Some(info),
                    Err(err) => format!("unparseable job info: {err}"),
                }
            }
            Ok(response) => format!("HTTP {}", response.status().as_u16()),
            Err(err) => err.to_string(),
        };
        warn!(vendor = profile.display, error = %failure, "job info fetch failed");
        outcome.warnings.push(format!(
            "Failed to fetch job info from {}: {failure}",
            profile.display
        ));
        None
    }

    fn auth_token(&self, username: &str, key: &str, session_id: &str) -> Option<String> {
        let bucket = match self.auth_mode {
            JobAuthMode::None => return None,
            JobAuthMode::Token => None,
            JobAuthMode::Hour => Some(Utc::now().format("%Y-%m-%d-%H").to_string()),
            JobAuthMode::Day => Some(Utc::now().format("%Y-%m-%d").to_string()),
        };
        let secret = match bucket {
            Some(bucket) => format!("{username}:{key}:{bucket}"),
            None => format!("{username}:{key}"),
        };
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.update(b":");
        hasher.update(session_id.as_bytes());
        Some(hex::encode(hasher.finalize()))
    }

    fn rebase(&self, original: &str) -> String {
        let Some(origin) = &self.api_origin else {
            return original.to_string();
        };
        match url::Url::parse(original) {
            Ok(parsed) => {
                let mut rebased = format!("{origin}{}", parsed.path());
                if let Some(query) = parsed.query() {
                    rebased.push('?');
                    rebased.push_str(query);
                }
                rebased
            }
            Err(_) => original.to_string(),
        }
    }
}

/// True when the vendor's job info says the job is already failed
fn job_already_failed(info: &Value) -> bool {
    if info.get("passed") == Some(&Value::Bool(false)) {
        return true;
    }
    matches!(
        info.get("status").and_then(Value::as_str),
        Some("failed") | Some("error")
    )
}

/// Pull a video asset URL out of a vendor job info payload
fn extract_video_url(info: &Value) -> Option<String> {
    for path in [
        &["video_url"][..],
        &["videoUrl"][..],
        &["assets", "video"][..],
    ] {
        let mut cursor = info;
        let mut found = true;
        for segment in path {
            match cursor.get(*segment) {
                Some(next) => cursor = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Some(url) = cursor.as_str() {
                return Some(url.to_string());
            }
        }
    }
    None
}
