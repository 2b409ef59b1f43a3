//! Gridcap CLI
//!
//! Resolves a run configuration from the command line and either
//! dry-runs provider/credential/capability resolution (`check`) or
//! pushes one synthetic test through the whole pipeline (`smoke`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use gridcap::capabilities::{self, CapabilitySet};
use gridcap::config::RunConfig;
use gridcap::debug::{ArtifactKind, CapturePolicy};
use gridcap::harness::TestHarness;
use gridcap::report::{JobAuthMode, OutcomeKind};

/// Browser test-grid session provisioning and failure diagnostics
#[derive(Parser, Debug)]
#[command(name = "gridcap")]
#[command(version)]
#[command(about = "Provision browser test-grid sessions, capture failure diagnostics")]
struct Args {
    /// Driver to run against (browser name, "remote", or a cloud vendor)
    #[arg(short, long, default_value = "chrome")]
    driver: String,

    /// Explicit executor URL (overrides host/port)
    #[arg(long)]
    executor_url: Option<String>,

    /// Executor host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Executor port
    #[arg(long, default_value = "4444")]
    port: u16,

    /// Session capability override, key=value (repeatable)
    #[arg(long = "capability", value_name = "KEY=VALUE")]
    capabilities: Vec<String>,

    /// JSON file of session capability overrides
    #[arg(long, value_name = "FILE")]
    capabilities_file: Option<PathBuf>,

    /// Explicit credential file (replaces the per-provider search)
    #[arg(long, value_name = "FILE")]
    credentials: Option<PathBuf>,

    /// When to capture debug artifacts
    #[arg(long, default_value = "on-failure")]
    capture: String,

    /// Artifact kind to skip (repeatable)
    #[arg(long = "exclude-artifact", value_name = "KIND")]
    exclude_artifacts: Vec<String>,

    /// Job URL authorization mode (none, token, hour, day)
    #[arg(long, default_value = "none")]
    job_auth: String,

    /// Session creation attempts, including the first
    #[arg(long, default_value = "3")]
    max_attempts: u32,

    /// Backoff base delay in milliseconds
    #[arg(long, default_value = "500")]
    base_delay_ms: u64,

    /// Per-call deadline in seconds for artifact and vendor API calls
    #[arg(long, default_value = "10")]
    call_timeout: u64,

    /// Where to write the rendered HTML report
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the provider, credentials, and merged capabilities
    /// without opening a session
    Check,
    /// Run one synthetic test through acquire, capture, report
    Smoke,
}

fn resolve_config(args: &Args) -> anyhow::Result<RunConfig> {
    let mut builder = RunConfig::builder()
        .driver(&args.driver)
        .host(&args.host)
        .port(args.port)
        .capture(args.capture.parse::<CapturePolicy>()?)
        .job_auth(args.job_auth.parse::<JobAuthMode>()?)
        .max_attempts(args.max_attempts)
        .base_delay_ms(args.base_delay_ms)
        .call_timeout_secs(args.call_timeout);

    if let Some(url) = &args.executor_url {
        builder = builder.executor_url(url);
    }
    if let Some(path) = &args.credentials {
        builder = builder.credential_file(path);
    }
    if let Some(path) = &args.report {
        builder = builder.report_path(path);
    }
    if let Some(path) = &args.capabilities_file {
        builder = builder.capabilities(&capabilities::load_capabilities_file(path)?);
    }
    for pair in &args.capabilities {
        let (key, value) = capabilities::parse_capability_pair(pair)?;
        builder = builder.capability(key, value);
    }
    for kind in &args.exclude_artifacts {
        builder = builder.exclude_artifact(kind.parse::<ArtifactKind>()?);
    }

    Ok(builder.build())
}

async fn run_check(config: RunConfig) -> anyhow::Result<()> {
    let driver = config.driver.clone();
    let session_caps = config.capabilities.clone();
    let fallback = config.executor_fallback();

    let harness = TestHarness::new(config)?;
    let provider = harness.provider();

    println!("driver:     {driver}");
    println!("provider:   {}", provider.name());
    println!("cloud:      {}", provider.is_cloud());
    if !provider.is_cloud() {
        println!("executor:   {fallback}");
    }

    let merged =
        gridcap::CapabilityBuilder::build(&driver, &session_caps, &CapabilitySet::new());
    println!("capabilities:");
    for (key, value) in merged.iter() {
        println!("  {key} = {value}");
    }
    println!("ok");
    Ok(())
}

async fn run_smoke(config: RunConfig) -> anyhow::Result<()> {
    let report_path = config.report_path.clone();
    let harness = TestHarness::new(config)?;

    let ctx = harness.setup("gridcap_smoke", &CapabilitySet::new()).await?;
    let session_id = ctx.session().id().to_string();
    tracing::info!(session = %session_id, "smoke session acquired");
    let duration = ctx.elapsed();
    harness.conclude(ctx, OutcomeKind::Passed, duration).await;

    let html = harness.finish(report_path.as_deref())?;
    match report_path {
        Some(path) => println!("report written to {}", path.display()),
        None => println!("{html}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = resolve_config(&args)?;
    match args.command {
        Command::Check => run_check(config).await,
        Command::Smoke => run_smoke(config).await,
    }
}
