//! Gridcap - Browser Test-Grid Sessions, Failure Diagnostics & Result Reporting
//!
//! This crate provisions browser automation sessions against a local
//! executor or a cloud test grid, captures diagnostic artifacts when a
//! test fails, and reports results to a local HTML report and to the
//! grid vendor's API.
//!
//! # Features
//!
//! - **Session Acquisition**: bounded exponential-backoff retry with an
//!   explicit transient/fatal failure split
//! - **Debug Capture**: URL, screenshot, page markup, and browser log,
//!   each isolated so one failure never costs the others
//! - **Cloud Reporting**: best-effort pass/fail updates and job/video
//!   references for five grid vendors behind one provider contract
//! - **Run Report**: ordered outcome accumulation rendered to HTML
//!
//! # Architecture
//!
//! ```text
//! Host Runner ──▶ TestHarness ──▶ Session Acquirer ──▶ Remote Endpoint
//!                      │                                    │
//!                      ▼                                    ▼
//!               ┌──────────────┐                    ┌──────────────┐
//!               │ Debug        │                    │ Cloud Status │
//!               │ Collector    │                    │ Reporter     │
//!               └──────┬───────┘                    └──────┬───────┘
//!                      │                                   │
//!                      ▼                                   ▼
//!                Debug Bundle                     Job URL + Video
//!                      └────────────┬──────────────────────┘
//!                                   ▼
//!                              Report Sink
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gridcap::config::RunConfig;
//! use gridcap::harness::TestHarness;
//! use gridcap::capabilities::CapabilitySet;
//! use gridcap::report::OutcomeKind;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig::builder().driver("chrome").build();
//!     let harness = TestHarness::new(config)?;
//!
//!     let ctx = harness.setup("test_login", &CapabilitySet::new()).await?;
//!     // ... drive the browser through the session ...
//!     let duration = ctx.elapsed();
//!     harness.conclude(ctx, OutcomeKind::Passed, duration).await;
//!
//!     let html = harness.finish(None)?;
//!     println!("{html}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod capabilities;
pub mod config;
pub mod debug;
pub mod error;
pub mod harness;
pub mod provider;
pub mod report;
pub mod session;

// Re-exports for convenience
pub use capabilities::{CapabilityBuilder, CapabilitySet};
pub use config::RunConfig;
pub use debug::{ArtifactKind, CapturePolicy, DebugBundle, DebugCollector};
pub use error::{Error, Result};
pub use harness::{TestContext, TestHarness};
pub use provider::{Provider, ProviderKind, ProviderRegistry};
pub use report::{CloudStatusReporter, JobAuthMode, OutcomeKind, ReportSink};
pub use session::{RetryPolicy, Session, SessionAcquirer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
