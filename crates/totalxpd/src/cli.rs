//! Command-line flags

use clap::Parser;
use std::path::PathBuf;

/// TotalXP host adapter
///
/// Reads newline-delimited JSON host events on stdin and writes reward
/// commands, broadcasts and progress-bar updates as JSON lines on stdout.
#[derive(Parser, Debug)]
#[command(name = "totalxpd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long, default_value = totalxp_core::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Database path (overrides `storage.database` from the config)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Skip upgrading an older config file in place
    #[arg(long)]
    pub no_migrate: bool,
}
