//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::settings::Settings;

/// Open SSH port-forwarding tunnels listed in a YAML file.
#[derive(Debug, Parser)]
#[command(name = "tunnelmgr", version)]
pub struct Cli {
    /// Connection file (overrides TUNNELMGR_CONFIG)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Seconds to wait for each prompt (overrides TUNNELMGR_PROMPT_TIMEOUT)
    #[arg(long, global = true, value_parser = parse_timeout)]
    pub timeout: Option<u64>,

    /// SSH client program (overrides TUNNELMGR_SSH)
    #[arg(long, global = true)]
    pub ssh: Option<String>,

    /// Log command lines, matched output and state changes
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Establish every configured connection
    ConnectAll,
    /// Establish only the named connections
    Connect {
        /// Comma separated connection names
        #[arg(value_delimiter = ',', required = true)]
        names: Vec<String>,
    },
    /// Print the configured connection names
    ListConnections,
}

impl Cli {
    /// Overlays the flags that were given on `settings`.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(path) = &self.config {
            settings.config_path = path.clone();
        }
        if let Some(secs) = self.timeout {
            settings.prompt_timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(program) = &self.ssh {
            settings.ssh_program = program.clone();
        }
    }
}

impl Command {
    /// Requested names for `connect`, trimmed, blanks dropped.
    pub fn requested_names(&self) -> Vec<String> {
        match self {
            Command::Connect { names } => names
                .iter()
                .map(|n| n.trim())
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn parse_timeout(raw: &str) -> Result<u64, String> {
    crate::settings::parse_timeout_secs(raw)
        .map(|d| d.as_secs())
        .ok_or_else(|| format!("expected a whole number of seconds >= 1, got '{}'", raw))
}
