//! Per-test orchestration
//!
//! The harness ties the pipeline together for a host test runner: setup
//! acquires a session and hands back an explicit [`TestContext`];
//! conclude runs capture, cloud reporting, teardown, and the single
//! report append for that test. The context is a plain value passed
//! between phases, so nothing leaks across tests even when phases of
//! different tests interleave.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::capabilities::{CapabilityBuilder, CapabilitySet};
use crate::config::RunConfig;
use crate::debug::DebugCollector;
use crate::error::Result;
use crate::provider::{Provider, ProviderRegistry};
use crate::report::{
    CloudStatusReporter, OutcomeKind, ReportSink, TestOutcomeRecord,
};
use crate::session::endpoint::{ObservedEndpoint, RemoteEndpoint, SessionObserver};
use crate::session::{HttpEndpoint, Session, SessionAcquirer};

/// Everything one test's phases need, passed explicitly between them
pub struct TestContext {
    test_name: String,
    session: Session,
    started: Instant,
}

impl TestContext {
    /// The test this context belongs to
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// The session acquired for this test
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Time elapsed since setup completed
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Drives the session/capture/report pipeline for one worker
pub struct TestHarness {
    run_id: Uuid,
    config: RunConfig,
    provider: Arc<Provider>,
    endpoint: Arc<dyn RemoteEndpoint>,
    acquirer: SessionAcquirer,
    collector: DebugCollector,
    reporter: CloudStatusReporter,
    sink: ReportSink,
}

impl std::fmt::Debug for TestHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHarness")
            .field("run_id", &self.run_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TestHarness {
    /// Build a harness talking HTTP to the configured executor.
    ///
    /// Provider resolution and credential resolution happen here, before
    /// any network call, so configuration errors surface immediately.
    pub fn new(config: RunConfig) -> Result<Self> {
        let provider = Self::resolve_provider(&config)?;
        let executor = provider.executor_url(&config.executor_fallback())?;
        let endpoint = Arc::new(HttpEndpoint::new(&executor, config.call_timeout)?);
        Self::assemble(config, provider, endpoint)
    }

    /// Build a harness over an externally supplied endpoint.
    ///
    /// Credentials are still resolved eagerly for cloud providers.
    pub fn with_endpoint(config: RunConfig, endpoint: Arc<dyn RemoteEndpoint>) -> Result<Self> {
        let provider = Self::resolve_provider(&config)?;
        Self::assemble(config, provider, endpoint)
    }

    /// Decorate the endpoint with a session observer
    pub fn with_observer(self, observer: Arc<dyn SessionObserver>) -> Self {
        let Self {
            run_id,
            config,
            provider,
            endpoint,
            acquirer,
            collector,
            reporter,
            sink,
        } = self;
        Self {
            run_id,
            config,
            provider,
            endpoint: Arc::new(ObservedEndpoint::new(endpoint, observer)),
            acquirer,
            collector,
            reporter,
            sink,
        }
    }

    /// Route vendor API calls through a different origin (proxies, test
    /// doubles)
    pub fn with_api_origin<S: Into<String>>(self, origin: S) -> Self {
        let Self {
            run_id,
            config,
            provider,
            endpoint,
            acquirer,
            collector,
            reporter,
            sink,
        } = self;
        Self {
            run_id,
            config,
            provider,
            endpoint,
            acquirer,
            collector,
            reporter: reporter.with_api_origin(origin),
            sink,
        }
    }

    fn resolve_provider(config: &RunConfig) -> Result<Arc<Provider>> {
        let registry = ProviderRegistry::new(config.credential_file.clone());
        let provider = registry.resolve(&config.driver)?;
        if provider.is_cloud() {
            // Credentials must resolve before any endpoint or vendor call
            provider.username()?;
            provider.access_key()?;
            provider.job_visibility()?;
        }
        Ok(provider)
    }

    fn assemble(
        config: RunConfig,
        provider: Arc<Provider>,
        endpoint: Arc<dyn RemoteEndpoint>,
    ) -> Result<Self> {
        let acquirer = SessionAcquirer::new(config.retry_policy());
        let collector = DebugCollector::new(config.debug_options());
        let reporter = CloudStatusReporter::new(config.job_auth, config.call_timeout)?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            config,
            provider,
            endpoint,
            acquirer,
            collector,
            reporter,
            sink: ReportSink::new(),
        })
    }

    /// Identifier for this harness's run, carried through the logs
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The provider this harness resolved at startup
    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    /// Records appended so far
    pub fn record_count(&self) -> usize {
        self.sink.len()
    }

    /// Test setup phase: build capabilities and acquire the session.
    ///
    /// Acquisition and configuration failures propagate and fail the
    /// individual test, not the run.
    #[instrument(skip_all, fields(test = test_name))]
    pub async fn setup(&self, test_name: &str, markers: &CapabilitySet) -> Result<TestContext> {
        let capabilities =
            CapabilityBuilder::build(&self.config.driver, &self.config.capabilities, markers);
        debug!(capabilities = capabilities.len(), "capabilities merged");
        let session = self
            .acquirer
            .acquire(self.endpoint.as_ref(), self.provider.clone(), capabilities)
            .await?;
        Ok(TestContext {
            test_name: test_name.to_string(),
            session,
            started: Instant::now(),
        })
    }

    /// Test conclusion phase: capture, report, tear down, append.
    ///
    /// Never fails. Capture and reporting failures become warnings on
    /// the record, teardown errors are swallowed, and the record is
    /// appended exactly once no matter what happened above.
    #[instrument(skip_all, fields(test = ctx.test_name.as_str(), outcome = %outcome))]
    pub async fn conclude(&self, ctx: TestContext, outcome: OutcomeKind, duration: Duration) {
        let failed = outcome.is_failure();

        let bundle = if self.config.capture.triggers(failed) {
            Some(
                self.collector
                    .collect(self.endpoint.as_ref(), ctx.session.id())
                    .await,
            )
        } else {
            None
        };

        let (job, warnings) = if self.provider.is_cloud() {
            let job_outcome = self.reporter.report(&ctx.session, !failed).await;
            (job_outcome.job, job_outcome.warnings)
        } else {
            (None, Vec::new())
        };

        ctx.session.dispose(self.endpoint.as_ref()).await;

        self.sink.append(TestOutcomeRecord {
            test_name: ctx.test_name,
            outcome,
            duration,
            session_id: Some(ctx.session.id().to_string()),
            bundle,
            job,
            warnings,
        });
        info!("test recorded");
    }

    /// Record a test that never got as far as a session (setup failed or
    /// the test was skipped before acquisition).
    pub fn record_without_session(
        &self,
        test_name: &str,
        outcome: OutcomeKind,
        duration: Duration,
        warnings: Vec<String>,
    ) {
        self.sink.append(TestOutcomeRecord {
            test_name: test_name.to_string(),
            outcome,
            duration,
            session_id: None,
            bundle: None,
            job: None,
            warnings,
        });
    }

    /// End of run: render the report, writing it to `path` when given.
    pub fn finish(self, path: Option<&Path>) -> Result<String> {
        info!(run_id = %self.run_id, records = self.sink.len(), "run finished");
        self.sink.finalize(path)
    }
}
