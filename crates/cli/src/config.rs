//! Plugin configuration from flags and environment

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use puma_stats::{Mode, PluginConfig};

use crate::Cli;

/// Directory mackerel-agent hands to plugins for their state files
const WORKDIR_ENV: &str = "MACKEREL_PLUGIN_WORKDIR";

/// Build the immutable per-invocation configuration
pub fn plugin_config(cli: &Cli) -> Result<PluginConfig> {
    let mode = if cli.single {
        Mode::Single
    } else {
        Mode::Clustered
    };
    let timeout = match cli.timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    PluginConfig::builder()
        .prefix(cli.metric_key_prefix.clone())
        .host(cli.host.clone())
        .port(cli.port)
        .sock(cli.sock.clone())
        .token(cli.token.clone())
        .with_gc(cli.with_gc)
        .mode(mode)
        .timeout(timeout)
        .build()
        .context("Invalid plugin configuration")
}

/// State file path: the explicit `--tempfile`, otherwise
/// `mackerel-plugin-{prefix}` in the plugin workdir or the system temp dir
pub fn tempfile_path(explicit: Option<&Path>, prefix: &str) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    let dir = std::env::var_os(WORKDIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    dir.join(format!("mackerel-plugin-{}", prefix))
}
