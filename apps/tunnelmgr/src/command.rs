//! Rendering of a connection into the ssh client invocation.

use crate::connection::ConnectionSpec;

/// Builds the argument vector for the external ssh client.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
}

impl CommandBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Returns the full argument vector, program first.
    ///
    /// `IdentitiesOnly=yes` is always passed so agent-held keys cannot change
    /// the prompt sequence; with a key file, `-i` pins the identity to it.
    pub fn build(&self, connection: &ConnectionSpec) -> Vec<String> {
        let mut argv = vec![
            self.program.clone(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
        ];

        for tunnel in connection.tunnels() {
            argv.push(tunnel.kind().flag().to_string());
            argv.push(tunnel.to_string());
        }

        argv.push(format!("{}@{}", connection.user(), connection.server()));
        argv.push("-p".to_string());
        argv.push(connection.port().to_string());

        if let Some(key) = connection.key_file() {
            argv.push("-i".to_string());
            argv.push(key.display().to_string());
        }

        argv
    }
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new("ssh")
    }
}

/// Joins an argument vector for display.
pub fn display_command(argv: &[String]) -> String {
    argv.join(" ")
}
