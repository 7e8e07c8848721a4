//! Where passwords come from.

use std::fmt;
use std::io::IsTerminal;

use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

type PipedLines = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;

/// Source of credentials for password prompts.
///
/// Chosen once at startup: with a terminal on stdin the operator is asked
/// with a masked prompt, otherwise one line is consumed per prompt.
pub enum CredentialSource {
    Interactive,
    Piped(PipedLines),
}

impl CredentialSource {
    /// Picks the source from whether stdin is a terminal.
    pub fn detect() -> Self {
        if std::io::stdin().is_terminal() {
            debug!("Credentials will be read interactively");
            Self::Interactive
        } else {
            debug!("Credentials will be read from standard input");
            Self::piped(tokio::io::stdin())
        }
    }

    pub fn piped(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self::Piped(BufReader::new(reader).lines())
    }

    /// Obtains the password for the connection `name`.
    ///
    /// Returns `None` when piped input is exhausted or the terminal could not
    /// be read.
    pub async fn credential_for(&mut self, name: &str) -> Option<String> {
        match self {
            Self::Interactive => {
                let prompt = format!("Password for {}: ", name);
                let result = tokio::task::spawn_blocking(move || {
                    let term = console::Term::stderr();
                    term.write_str(&prompt)?;
                    term.read_secure_line()
                })
                .await;

                match result {
                    Ok(Ok(password)) => Some(password),
                    Ok(Err(e)) => {
                        warn!("Failed to read password for {}: {}", name, e);
                        None
                    }
                    Err(e) => {
                        warn!("Password prompt for {} was aborted: {}", name, e);
                        None
                    }
                }
            }
            Self::Piped(lines) => match lines.next_line().await {
                Ok(Some(line)) => Some(line.trim_end_matches('\r').to_string()),
                Ok(None) => {
                    warn!("No password left on standard input for {}", name);
                    None
                }
                Err(e) => {
                    warn!("Failed to read password for {}: {}", name, e);
                    None
                }
            },
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactive => write!(f, "Interactive"),
            Self::Piped(_) => write!(f, "Piped"),
        }
    }
}
