//! SSH tunnel manager library.
//!
//! Reads connection records from YAML, orders them so that tunnels providing
//! a port come up before the connections that use it, and drives the system
//! SSH client through its login prompts.

pub mod cli;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod report;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod supervisor;

pub use command::CommandBuilder;
pub use config::LoadedConfig;
pub use connection::{ConnectionSpec, TunnelKind, TunnelSpec};
pub use error::{ConfigIssue, TunnelError};
pub use resolver::DependencyResolver;
pub use session::{CredentialSource, Establish, SessionDriver, SessionOutcome, SessionState};
pub use settings::Settings;
pub use supervisor::{ConnectionSupervisor, SubsetOutcome};
