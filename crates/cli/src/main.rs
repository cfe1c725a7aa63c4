//! Puma plugin for mackerel-agent
//!
//! Polls a Puma control server once, prints the normalized metrics and
//! exits. With `MACKEREL_AGENT_PLUGIN_META=1` it prints the graph
//! definition instead.

mod config;
mod output;
mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use puma_stats::{GraphDefinition, Poller};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use output::OutputFormat;

/// Puma metrics plugin for mackerel-agent
#[derive(Parser)]
#[command(name = "mackerel-plugin-puma")]
#[command(author, version, about = "Puma metrics plugin for mackerel-agent", long_about = None)]
pub struct Cli {
    /// Metric key prefix
    #[arg(long, env = "PUMA_METRIC_KEY_PREFIX", default_value = "puma")]
    pub metric_key_prefix: String,

    /// Host of the Puma control server
    #[arg(long, env = "PUMA_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port of the Puma control server
    #[arg(long, env = "PUMA_PORT", default_value_t = 9293)]
    pub port: u16,

    /// Unix socket of the Puma control server (takes precedence over host/port)
    #[arg(long, env = "PUMA_SOCK")]
    pub sock: Option<PathBuf>,

    /// Auth token of the Puma control server
    #[arg(long, env = "PUMA_TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,

    /// Also report GC stats (Puma 3.10.0 or later)
    #[arg(long)]
    pub with_gc: bool,

    /// Puma runs in single mode rather than clustered mode
    #[arg(long)]
    pub single: bool,

    /// State file for rate-of-change metrics
    #[arg(long)]
    pub tempfile: Option<PathBuf>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "mackerel")]
    pub format: OutputFormat,

    /// Request timeout in seconds, 0 disables it
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Enable verbose logging
    #[arg(long, short)]
    pub verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr, stdout carries the metrics
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::print_error(&format!("{:#}", err));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let plugin_config = config::plugin_config(&cli)?;
    let prefix = plugin_config.metric_key_prefix().to_string();
    let definition = GraphDefinition::for_config(plugin_config.with_gc, plugin_config.mode);

    if report::meta_requested() {
        debug!(graphs = definition.len(), "Printing graph definition");
        return report::print_meta(&prefix, &definition);
    }

    let poller = Poller::from_config(&plugin_config)?;
    let metrics = poller
        .poll()
        .await
        .with_context(|| format!("Failed to poll {}", plugin_config.endpoint))?;

    match cli.format {
        OutputFormat::Mackerel => {
            let state_path = config::tempfile_path(cli.tempfile.as_deref(), &prefix);
            let now = chrono::Utc::now().timestamp();
            let reporter = report::Reporter::new(&prefix, &definition);
            reporter.print(&metrics, &state_path, now);
        }
        OutputFormat::Json => output::print_json(&metrics)?,
        OutputFormat::Table => output::print_table(&metrics),
    }

    Ok(())
}
