//! Pushprobe CLI
//!
//! Pushes a synthetic metric fixture to an ingestion endpoint and reports
//! how the delivery went.
//!
//! # Usage
//!
//! ```bash
//! pushprobe --help
//! pushprobe --health-check --url https://proxy.example.com:8080
//! pushprobe --compress --tls --cert client.crt --key client.key --ca ca.crt
//! pushprobe --dry-run --json
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::builder::BoolishValueParser;
use clap::Parser;
use client::compression::encode_body;
use client::{probe, push, serialize, Codec, CompressionStatus, ProbeOutcome, PushReport};
use config::Settings;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use validator::Validate;

/// Exit status for an invalid configuration.
const EXIT_INVALID_CONFIG: u8 = 2;

/// Pushprobe - metric delivery tester for push-based ingestion endpoints
#[derive(Parser, Debug)]
#[command(name = "pushprobe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the ingestion endpoint
    #[arg(long, env = "PUSHPROBE_URL", default_value = "https://localhost:8080")]
    url: String,

    /// Snappy-compress the payload
    #[arg(long, env = "PUSHPROBE_COMPRESS", value_parser = BoolishValueParser::new())]
    compress: bool,

    /// Validate the server certificate
    #[arg(long, env = "PUSHPROBE_TLS", value_parser = BoolishValueParser::new())]
    tls: bool,

    /// Client certificate (PEM), used with --tls
    #[arg(long, env = "PUSHPROBE_CERT")]
    cert: Option<PathBuf>,

    /// Client private key (PEM), used with --tls
    #[arg(long, env = "PUSHPROBE_KEY")]
    key: Option<PathBuf>,

    /// CA bundle (PEM) replacing the system roots, used with --tls
    #[arg(long, env = "PUSHPROBE_CA")]
    ca: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, env = "PUSHPROBE_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Only check that the endpoint answers
    #[arg(long, conflicts_with = "dry_run")]
    health_check: bool,

    /// Build, serialize and compress the payload without sending it
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            url: self.url.clone(),
            compress: self.compress,
            tls: self.tls,
            cert: self.cert.clone(),
            key: self.key.clone(),
            ca: self.ca.clone(),
            timeout_secs: self.timeout,
        }
    }

    fn mode(&self) -> Mode {
        if self.health_check {
            Mode::HealthCheck
        } else if self.dry_run {
            Mode::DryRun
        } else {
            Mode::Push
        }
    }
}

/// What a run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Mode {
    HealthCheck,
    DryRun,
    Push,
}

/// Payload summary produced without touching the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PayloadSummary {
    families: usize,
    series: usize,
    payload_bytes: usize,
    body_bytes: usize,
    compression: CompressionStatus,
    /// Family names as read back from the serialized payload.
    decoded: Vec<String>,
}

/// Everything a run observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct RunReport {
    mode: Mode,
    url: String,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    probe: Option<ProbeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<PayloadSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    push: Option<PushReport>,
}

impl RunReport {
    fn new(mode: Mode, url: &str) -> Self {
        Self {
            mode,
            url: url.to_string(),
            started_at: Utc::now(),
            probe: None,
            payload: None,
            push: None,
        }
    }

    fn succeeded(&self) -> bool {
        match self.mode {
            Mode::HealthCheck => self.probe.as_ref().is_some_and(ProbeOutcome::is_reachable),
            Mode::DryRun => self.payload.is_some(),
            Mode::Push => self
                .push
                .as_ref()
                .is_some_and(|report| report.outcome.is_delivered()),
        }
    }

    fn exit_status(&self) -> u8 {
        u8::from(!self.succeeded())
    }

    fn print_human(&self) {
        if let Some(probe) = &self.probe {
            println!("Health check {}: {probe}", self.url);
        }
        if let Some(payload) = &self.payload {
            println!(
                "Payload: {} families, {} series, {} bytes ({} on the wire)",
                payload.families, payload.series, payload.payload_bytes, payload.body_bytes
            );
            if payload.compression.is_degraded() {
                println!("Compression unavailable, payload left uncompressed");
            }
            for name in &payload.decoded {
                println!("  {name}");
            }
        }
        if let Some(push) = &self.push {
            println!("Push to {}: {}", push.endpoint, push.outcome);
            if let Some(body) = push.outcome.body().filter(|body| !body.is_empty()) {
                println!("Response: {body}");
            }
        }
    }
}

/// Builds and serializes the fixture, then reads it back as a sanity check.
fn summarize_payload(settings: &Settings) -> Result<PayloadSummary> {
    let collection = shared::fixture::build().context("Failed to build metric fixture")?;
    let payload = serialize(&collection);
    let decoded = shared::exposition::decode(&payload)
        .context("Serialized payload does not decode")?
        .into_iter()
        .map(|family| family.name().to_string())
        .collect();
    let payload_bytes = payload.len();
    let body = encode_body(payload, settings.compress);

    Ok(PayloadSummary {
        families: collection.len(),
        series: collection.series_count(),
        payload_bytes,
        body_bytes: body.bytes.len(),
        compression: body.status,
        decoded,
    })
}

/// Runs one mode to completion.
///
/// A push only happens after the probe reports the endpoint reachable.
async fn run(settings: &Settings, mode: Mode) -> Result<RunReport> {
    let mut report = RunReport::new(mode, &settings.url);

    if mode == Mode::DryRun {
        report.payload = Some(summarize_payload(settings)?);
        return Ok(report);
    }

    let probed = probe(&settings.url, settings.timeout()).await;
    let reachable = probed.is_reachable();
    report.probe = Some(probed);
    if mode == Mode::HealthCheck {
        return Ok(report);
    }
    if !reachable {
        tracing::error!(url = %settings.url, "Endpoint unreachable, skipping push");
        return Ok(report);
    }

    let collection = shared::fixture::build().context("Failed to build metric fixture")?;
    tracing::info!(
        families = collection.len(),
        series = collection.series_count(),
        "Built metric fixture"
    );
    let payload = serialize(&collection);
    tracing::debug!(payload_bytes = payload.len(), "Serialized payload");

    report.push = Some(push(&settings.url, payload, &settings.push_options()).await);
    Ok(report)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = cli.settings();
    if let Err(errors) = settings.validate() {
        tracing::error!(%errors, "Invalid configuration");
        eprintln!("Invalid configuration:\n{errors}");
        return ExitCode::from(EXIT_INVALID_CONFIG);
    }

    tracing::info!(
        url = %settings.url,
        tls = settings.identity().describe(),
        compress = settings.compress,
        snappy_available = Codec::Snappy.is_available(),
        timeout_secs = settings.timeout_secs,
        "Starting pushprobe"
    );

    let report = match run(&settings, cli.mode()).await {
        Ok(report) => report,
        Err(err) => {
            tracing::error!(error = format!("{err:#}"), "Run aborted");
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                tracing::error!(error = %err, "Failed to encode run report");
                return ExitCode::FAILURE;
            }
        }
    } else {
        report.print_human();
    }

    ExitCode::from(report.exit_status())
}
