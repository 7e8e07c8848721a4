//! SSH Tunnel Manager
//!
//! Opens the port forwards described in a YAML connection file by driving
//! the system `ssh` client, then holds them open until interrupted.
//!
//! ## Usage
//! ```bash
//! tunnelmgr -c config.yaml connect-all
//! tunnelmgr connect jump,db
//! tunnelmgr list-connections
//! ```

use anyhow::Context;
use clap::Parser;
use log::info;

use tunnelmgr::cli::{Cli, Command};
use tunnelmgr::report;
use tunnelmgr::{ConnectionSupervisor, CredentialSource, LoadedConfig, SessionDriver, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut settings = Settings::from_env();
    cli.apply(&mut settings);

    let loaded = LoadedConfig::from_file(&settings.config_path).with_context(|| {
        format!(
            "Failed to load connections from {}",
            settings.config_path.display()
        )
    })?;
    info!(
        "✓ {} connection(s) loaded from {}",
        loaded.connections.len(),
        settings.config_path.display()
    );

    let mut supervisor = ConnectionSupervisor::new(
        loaded.connections,
        SessionDriver::new(&settings),
        CredentialSource::detect(),
    );

    let outcomes = match &cli.command {
        Command::ListConnections => {
            println!("{}", report::listing(&supervisor.list_names()));
            return Ok(());
        }
        Command::ConnectAll => supervisor
            .connect_all()
            .await
            .context("Cannot establish connections")?,
        command @ Command::Connect { .. } => {
            let result = supervisor
                .connect_subset(&command.requested_names())
                .await
                .context("Cannot establish connections")?;
            if !result.unknown.is_empty() {
                println!("{}", report::unknown_names_warning(&result.unknown));
            }
            result.outcomes
        }
    };

    println!("{}", report::summary_line(&outcomes));
    println!("{}", report::holding_line(supervisor.live_names().len()));

    supervisor.hold_until_interrupt().await;
    info!("All tunnels closed");

    Ok(())
}
