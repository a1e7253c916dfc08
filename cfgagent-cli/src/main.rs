//! config-agent: keeps configuration files in sync with the authority.
//!
//! # Usage
//!
//! ```text
//! config-agent [-f FILE] [-s] [-t SECONDS]
//! ```
//!
//! Without `-s` the agent polls until `SIGINT`/`SIGTERM`; `SIGUSR1` forces an
//! immediate pass.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use cfgagent_core::config::DEFAULT_CONFIG_PATH;
use cfgagent_daemon::{start_blocking, RunOptions};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "config-agent",
    version,
    about = "Render configuration manifests from the authority onto local files",
    long_about = None,
)]
struct Cli {
    /// Configuration file.
    #[arg(short = 'f', long = "file", default_value = DEFAULT_CONFIG_PATH)]
    file: PathBuf,

    /// Run a single reconciliation pass and exit.
    #[arg(short = 's', long)]
    synchronous: bool,

    /// Give up on a synchronous pass after this many seconds.
    #[arg(short = 't', long, value_name = "SECONDS")]
    timeout: Option<u64>,
}

impl Cli {
    fn options(&self) -> RunOptions {
        RunOptions {
            config_path: self.file.clone(),
            synchronous: self.synchronous,
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.timeout.is_some() && !cli.synchronous {
        eprintln!("warning: --timeout only applies with --synchronous");
    }
    start_blocking(&cli.options())
        .with_context(|| format!("config-agent failed (config: {})", cli.file.display()))
}
