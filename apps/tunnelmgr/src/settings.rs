//! Runtime settings taken from the environment.
//!
//! Every value has a default, and command line flags override what is read
//! here. A `.env` file in the working directory is honoured.

use std::path::PathBuf;
use std::time::Duration;

use log::warn;

// ============================================================================
// Environment variable names
// ============================================================================

mod env {
    pub const CONFIG: &str = "TUNNELMGR_CONFIG";
    pub const SSH: &str = "TUNNELMGR_SSH";
    pub const PROMPT_TIMEOUT: &str = "TUNNELMGR_PROMPT_TIMEOUT";
}

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_SSH_PROGRAM: &str = "ssh";

/// Default bound on each wait for subordinate output
const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Path of the connection file
    pub config_path: PathBuf,
    /// SSH client program to drive
    pub ssh_program: String,
    /// Bound on each wait for a recognizable prompt
    pub prompt_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            ssh_program: DEFAULT_SSH_PROGRAM.to_string(),
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
        }
    }
}

impl Settings {
    /// Loads settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(path) = lookup(env::CONFIG).filter(|v| !v.trim().is_empty()) {
            settings.config_path = PathBuf::from(path);
        }
        if let Some(program) = lookup(env::SSH).filter(|v| !v.trim().is_empty()) {
            settings.ssh_program = program;
        }
        if let Some(raw) = lookup(env::PROMPT_TIMEOUT) {
            match parse_timeout_secs(&raw) {
                Some(timeout) => settings.prompt_timeout = timeout,
                None => warn!(
                    "Ignoring {}={:?}, expected a whole number of seconds >= 1",
                    env::PROMPT_TIMEOUT,
                    raw
                ),
            }
        }

        settings
    }
}

/// Parses a timeout in whole seconds; zero is rejected.
pub fn parse_timeout_secs(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs >= 1 => Some(Duration::from_secs(secs)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = Settings::from_lookup(lookup_from(&[]));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.config_path, PathBuf::from("config.yaml"));
        assert_eq!(settings.prompt_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("TUNNELMGR_CONFIG", "/etc/tunnels.yaml"),
            ("TUNNELMGR_SSH", "/usr/local/bin/ssh"),
            ("TUNNELMGR_PROMPT_TIMEOUT", "12"),
        ]));
        assert_eq!(settings.config_path, PathBuf::from("/etc/tunnels.yaml"));
        assert_eq!(settings.ssh_program, "/usr/local/bin/ssh");
        assert_eq!(settings.prompt_timeout, Duration::from_secs(12));
    }

    #[test]
    fn test_invalid_timeout_falls_back_to_default() {
        let settings = Settings::from_lookup(lookup_from(&[("TUNNELMGR_PROMPT_TIMEOUT", "0")]));
        assert_eq!(settings.prompt_timeout, DEFAULT_PROMPT_TIMEOUT);

        let settings = Settings::from_lookup(lookup_from(&[("TUNNELMGR_PROMPT_TIMEOUT", "soon")]));
        assert_eq!(settings.prompt_timeout, DEFAULT_PROMPT_TIMEOUT);
    }
}
