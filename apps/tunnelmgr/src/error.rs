//! Error types for the tunnel manager.

use std::path::PathBuf;

/// Errors that abort the whole run.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("Config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Failed to read config file {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Cyclic dependency between connections: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("Failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A configuration problem attributed to a single connection record.
///
/// The affected record is skipped; the rest of the run proceeds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigIssue {
    #[error("Configuration error: connection '{0}' has no tunnels")]
    MissingTunnels(String),

    #[error("Configuration error: connection '{name}' has invalid tunnel '{rule}': {reason}")]
    InvalidTunnel {
        name: String,
        rule: String,
        reason: String,
    },

    #[error("Configuration error: connection '{0}' is defined more than once")]
    DuplicateName(String),

    #[error("Configuration error: connection '{name}' {reason}")]
    InvalidConnection { name: String, reason: String },
}

impl ConfigIssue {
    /// Name of the connection the issue belongs to.
    pub fn connection(&self) -> &str {
        match self {
            Self::MissingTunnels(name) | Self::DuplicateName(name) => name,
            Self::InvalidTunnel { name, .. } | Self::InvalidConnection { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_error_display() {
        let err = TunnelError::ConfigNotFound(PathBuf::from("missing.yaml"));
        assert_eq!(format!("{}", err), "Config file not found: missing.yaml");

        let err = TunnelError::CyclicDependency(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            format!("{}", err),
            "Cyclic dependency between connections: a, b"
        );
    }

    #[test]
    fn test_config_issue_names_connection() {
        let issue = ConfigIssue::MissingTunnels("web".to_string());
        assert_eq!(issue.connection(), "web");
        assert_eq!(
            format!("{}", issue),
            "Configuration error: connection 'web' has no tunnels"
        );

        let issue = ConfigIssue::InvalidTunnel {
            name: "db".to_string(),
            rule: "X,1".to_string(),
            reason: "unknown tunnel type 'X'".to_string(),
        };
        assert_eq!(issue.connection(), "db");
        assert!(format!("{}", issue).contains("X,1"));
    }
}
