//! Loading of the connection file.
//!
//! The file is YAML with a top level `connections` list:
//!
//! ```yaml
//! connections:
//!   - name: jump
//!     server: bastion.example.com
//!     port: 22
//!     user: ops
//!     public_key: ~/.ssh/id_ed25519
//!     tunnels:
//!       - L,2222,10.0.0.5,22
//!       - D,1080
//! ```
//!
//! Records with problems are rejected one by one and reported as
//! [`ConfigIssue`]s; only an unreadable or unparsable file fails the load.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Deserialize;

use crate::connection::{default_name, ConnectionSpec, TunnelSpec};
use crate::error::{ConfigIssue, TunnelError};

/// Connection record as written in the file.
#[derive(Debug, Deserialize)]
struct RawConnection {
    server: String,
    port: u16,
    user: String,
    name: Option<String>,
    public_key: Option<String>,
    tunnels: Option<Vec<String>>,
}

/// Records are kept untyped here so each one is checked on its own.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    connections: Vec<serde_yaml::Value>,
}

/// Result of loading a connection file.
#[derive(Debug, Default)]
pub struct LoadedConfig {
    /// Valid connections, in file order.
    pub connections: Vec<ConnectionSpec>,
    /// One entry per rejected record.
    pub issues: Vec<ConfigIssue>,
}

impl LoadedConfig {
    /// Reads and parses the file at `path`.
    pub fn from_file(path: &Path) -> Result<Self, TunnelError> {
        if !path.exists() {
            return Err(TunnelError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| TunnelError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config file {}", path.display());
        Self::from_yaml_str(&content)
    }

    /// Parses connection records from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, TunnelError> {
        let raw: RawConfig = serde_yaml::from_str(content)?;

        let mut loaded = Self::default();
        let mut seen = HashSet::new();

        for (index, value) in raw.connections.into_iter().enumerate() {
            let built = serde_yaml::from_value::<RawConnection>(value.clone())
                .map_err(|e| ConfigIssue::InvalidConnection {
                    name: record_label(&value, index),
                    reason: format!("is malformed: {}", e),
                })
                .and_then(build_connection);
            match built {
                Ok(conn) => {
                    if seen.insert(conn.name().to_string()) {
                        loaded.connections.push(conn);
                    } else {
                        loaded
                            .issues
                            .push(ConfigIssue::DuplicateName(conn.name().to_string()));
                    }
                }
                Err(issue) => loaded.issues.push(issue),
            }
        }

        for issue in &loaded.issues {
            warn!("{}", issue);
        }

        Ok(loaded)
    }
}

fn build_connection(raw: RawConnection) -> Result<ConnectionSpec, ConfigIssue> {
    let label = raw
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| default_name(&raw.server, raw.port));

    let rules = raw.tunnels.unwrap_or_default();
    let tunnels = rules
        .iter()
        .map(|rule| {
            rule.parse::<TunnelSpec>()
                .map_err(|reason| ConfigIssue::InvalidTunnel {
                    name: label.clone(),
                    rule: rule.clone(),
                    reason,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    ConnectionSpec::new(
        raw.name,
        raw.server,
        raw.port,
        raw.user,
        raw.public_key.as_deref().map(expand_home),
        tunnels,
    )
}

/// Best available name for a record that failed to deserialize.
fn record_label(value: &serde_yaml::Value, index: usize) -> String {
    if let Some(name) = value
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|n| !n.trim().is_empty())
    {
        return name.to_string();
    }
    match (
        value.get("server").and_then(|v| v.as_str()),
        value.get("port").and_then(|v| v.as_u64()),
    ) {
        (Some(server), Some(port)) => format!("{}:{}", server, port),
        (Some(server), None) => server.to_string(),
        _ => format!("connections[{}]", index),
    }
}

/// Expands a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
