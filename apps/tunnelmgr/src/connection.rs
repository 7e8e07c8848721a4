//! Connection and tunnel definitions.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigIssue;

/// Forwarding direction of a tunnel, mapped to the ssh `-L`/`-R`/`-D` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelKind {
    Local,
    Remote,
    Dynamic,
}

impl TunnelKind {
    /// The ssh command line flag for this kind.
    pub fn flag(self) -> &'static str {
        match self {
            Self::Local => "-L",
            Self::Remote => "-R",
            Self::Dynamic => "-D",
        }
    }
}

impl FromStr for TunnelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "local" => Ok(Self::Local),
            "r" | "remote" => Ok(Self::Remote),
            "d" | "dynamic" => Ok(Self::Dynamic),
            other => Err(format!("unknown tunnel type '{}'", other)),
        }
    }
}

/// A single forwarding rule.
///
/// Dynamic rules never carry a bind address or destination port; local and
/// remote rules always carry both. The constructors are the only way to build
/// one, so the invariant holds for every value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TunnelSpec {
    kind: TunnelKind,
    source_port: u16,
    destination: Option<(String, u16)>,
}

impl TunnelSpec {
    pub fn local(source_port: u16, bind_address: impl Into<String>, destination_port: u16) -> Self {
        Self {
            kind: TunnelKind::Local,
            source_port,
            destination: Some((bind_address.into(), destination_port)),
        }
    }

    pub fn remote(source_port: u16, bind_address: impl Into<String>, destination_port: u16) -> Self {
        Self {
            kind: TunnelKind::Remote,
            source_port,
            destination: Some((bind_address.into(), destination_port)),
        }
    }

    pub fn dynamic(source_port: u16) -> Self {
        Self {
            kind: TunnelKind::Dynamic,
            source_port,
            destination: None,
        }
    }

    pub fn kind(&self) -> TunnelKind {
        self.kind
    }

    pub fn source_port(&self) -> u16 {
        self.source_port
    }

    pub fn bind_address(&self) -> Option<&str> {
        self.destination.as_ref().map(|(address, _)| address.as_str())
    }

    pub fn destination_port(&self) -> Option<u16> {
        self.destination.as_ref().map(|(_, port)| *port)
    }
}

impl fmt::Display for TunnelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.destination {
            Some((address, port)) => write!(f, "{}:{}:{}", self.source_port, address, port),
            None => write!(f, "{}", self.source_port),
        }
    }
}

fn parse_port(field: &str) -> Result<u16, String> {
    match field.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port '{}'", field.trim())),
        Ok(port) => Ok(port),
    }
}

/// Parses a rule of the form `type,source_port,bind_address,destination_port`.
///
/// Dynamic rules are written `D,source_port`.
impl FromStr for TunnelSpec {
    type Err = String;

    fn from_str(rule: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = rule.split(',').map(str::trim).collect();
        let kind: TunnelKind = fields[0].parse()?;

        match (kind, fields.as_slice()) {
            (TunnelKind::Dynamic, [_, source]) => Ok(Self::dynamic(parse_port(source)?)),
            (TunnelKind::Dynamic, _) => {
                Err("dynamic tunnels take exactly one port: D,source_port".to_string())
            }
            (_, [_, _, address, _]) if address.is_empty() => {
                Err("bind address must not be empty".to_string())
            }
            (TunnelKind::Local, [_, source, address, destination]) => Ok(Self::local(
                parse_port(source)?,
                *address,
                parse_port(destination)?,
            )),
            (TunnelKind::Remote, [_, source, address, destination]) => Ok(Self::remote(
                parse_port(source)?,
                *address,
                parse_port(destination)?,
            )),
            _ => Err("expected type,source_port,bind_address,destination_port".to_string()),
        }
    }
}

/// One logical SSH target and the tunnels it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    name: String,
    server: String,
    port: u16,
    user: String,
    key_file: Option<PathBuf>,
    tunnels: Vec<TunnelSpec>,
}

impl ConnectionSpec {
    /// Builds a validated connection.
    ///
    /// `name` defaults to `server:port`. A connection without tunnels is
    /// rejected.
    pub fn new(
        name: Option<String>,
        server: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        key_file: Option<PathBuf>,
        tunnels: Vec<TunnelSpec>,
    ) -> Result<Self, ConfigIssue> {
        let server = server.into();
        let user = user.into();
        let name = match name.map(|n| n.trim().to_string()) {
            Some(n) if !n.is_empty() => n,
            _ => default_name(&server, port),
        };

        let invalid = |reason: &str| ConfigIssue::InvalidConnection {
            name: name.clone(),
            reason: reason.to_string(),
        };
        if server.trim().is_empty() {
            return Err(invalid("has an empty server"));
        }
        if user.trim().is_empty() {
            return Err(invalid("has an empty user"));
        }
        if port == 0 {
            return Err(invalid("has port 0"));
        }
        if tunnels.is_empty() {
            return Err(ConfigIssue::MissingTunnels(name));
        }

        Ok(Self {
            name,
            server,
            port,
            user,
            key_file,
            tunnels,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn key_file(&self) -> Option<&PathBuf> {
        self.key_file.as_ref()
    }

    pub fn tunnels(&self) -> &[TunnelSpec] {
        &self.tunnels
    }

    /// Source ports of every local forward, derived from `tunnels`.
    pub fn local_source_ports(&self) -> BTreeSet<u16> {
        self.tunnels
            .iter()
            .filter(|t| t.kind() == TunnelKind::Local)
            .map(TunnelSpec::source_port)
            .collect()
    }
}

/// Name used for a connection that has none configured.
pub fn default_name(server: &str, port: u16) -> String {
    format!("{}:{}", server, port)
}
