//! Cloud status reporter integration tests
//!
//! Vendor HTTP APIs are mocked with `httpmock`; the reporter's calls are
//! routed at the mock server through its API origin override.

use std::path::PathBuf;
use std::time::Duration;

use gridcap::capabilities::CapabilitySet;
use gridcap::provider::ProviderRegistry;
use gridcap::report::{CloudStatusReporter, JobAuthMode};
use gridcap::session::Session;
use httpmock::prelude::*;
use serde_json::json;

fn credential_file(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join(".saucelabs");
    std::fs::write(&path, "[saucelabs]\nusername = \"alice\"\nkey = \"s3cret\"\n").unwrap();
    path
}

fn sauce_session(dir: &tempfile::TempDir, session_id: &str) -> Session {
    let registry = ProviderRegistry::new(Some(credential_file(dir)));
    let provider = registry.resolve("saucelabs").unwrap();
    Session::new(session_id.to_string(), CapabilitySet::new(), provider)
}

fn reporter(server: &MockServer, mode: JobAuthMode) -> CloudStatusReporter {
    CloudStatusReporter::new(mode, Duration::from_secs(10))
        .unwrap()
        .with_api_origin(server.base_url())
}

#[tokio::test]
async fn failed_outcome_posts_passed_false() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();
    let session = sauce_session(&dir, "job-1");

    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/rest/v1/alice/jobs/job-1")
                .json_body(json!({ "passed": false }));
            then.status(200).json_body(json!({}));
        })
        .await;
    let get = server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/alice/jobs/job-1");
            then.status(200)
                .json_body(json!({ "passed": false, "video_url": "https://v/job-1.mp4" }));
        })
        .await;

    let outcome = reporter(&server, JobAuthMode::None)
        .report(&session, false)
        .await;

    // A failure writes unconditionally: no read-back happened first
    put.assert_async().await;
    assert_eq!(get.hits_async().await, 1);
    assert!(outcome.warnings.is_empty());
    let job = outcome.job.unwrap();
    assert_eq!(job.url, "https://saucelabs.com/jobs/job-1");
    assert_eq!(job.video_url.as_deref(), Some("https://v/job-1.mp4"));
}

#[tokio::test]
async fn passed_does_not_overwrite_recorded_failure() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();
    let session = sauce_session(&dir, "job-2");

    let put = server
        .mock_async(|when, then| {
            when.method(PUT).path("/rest/v1/alice/jobs/job-2");
            then.status(200).json_body(json!({}));
        })
        .await;
    let _get = server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/alice/jobs/job-2");
            then.status(200).json_body(json!({ "passed": false }));
        })
        .await;

    let outcome = reporter(&server, JobAuthMode::None)
        .report(&session, true)
        .await;

    // The job already reads as failed, so the passed write is skipped
    assert_eq!(put.hits_async().await, 0);
    assert!(outcome.job.is_some());
}

#[tokio::test]
async fn failed_outcome_overwrites_previously_passed_job() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();
    let session = sauce_session(&dir, "job-3");

    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/rest/v1/alice/jobs/job-3")
                .json_body(json!({ "passed": false }));
            then.status(200).json_body(json!({}));
        })
        .await;
    let _get = server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/alice/jobs/job-3");
            then.status(200).json_body(json!({ "passed": true }));
        })
        .await;

    reporter(&server, JobAuthMode::None)
        .report(&session, false)
        .await;

    put.assert_async().await;
}

#[tokio::test]
async fn vendor_errors_become_warnings_not_failures() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();
    let session = sauce_session(&dir, "job-4");

    let _put = server
        .mock_async(|when, then| {
            when.method(PUT).path("/rest/v1/alice/jobs/job-4");
            then.status(503).body("maintenance");
        })
        .await;
    let _get = server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/alice/jobs/job-4");
            then.status(500).body("oops");
        })
        .await;

    let outcome = reporter(&server, JobAuthMode::None)
        .report(&session, false)
        .await;

    assert_eq!(outcome.warnings.len(), 2);
    assert!(outcome.warnings[0].contains("Sauce Labs"));
    assert!(outcome.warnings[0].contains("503"));
    assert!(outcome.warnings[1].contains("500"));
    // Even with both calls failing the job URL is still produced
    assert_eq!(
        outcome.job.unwrap().url,
        "https://saucelabs.com/jobs/job-4"
    );
}

#[tokio::test]
async fn token_auth_mode_signs_job_url() {
    let server = MockServer::start_async().await;
    let dir = tempfile::tempdir().unwrap();
    let session = sauce_session(&dir, "job-5");

    let _put = server
        .mock_async(|when, then| {
            when.method(PUT).path("/rest/v1/alice/jobs/job-5");
            then.status(200).json_body(json!({}));
        })
        .await;
    let _get = server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/alice/jobs/job-5");
            then.status(200).json_body(json!({}));
        })
        .await;

    let outcome = reporter(&server, JobAuthMode::Token)
        .report(&session, false)
        .await;

    let url = outcome.job.unwrap().url;
    let (base, token) = url.split_once("?auth=").unwrap();
    assert_eq!(base, "https://saucelabs.com/jobs/job-5");
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn local_provider_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ProviderRegistry::new(Some(credential_file(&dir)));
    let provider = registry.resolve("chrome").unwrap();
    let session = Session::new("local-1".to_string(), CapabilitySet::new(), provider);

    // No server is running; a vendor call would error loudly
    let outcome = CloudStatusReporter::new(JobAuthMode::None, Duration::from_secs(1))
        .unwrap()
        .report(&session, true)
        .await;

    assert!(outcome.job.is_none());
    assert!(outcome.warnings.is_empty());
}
