//! Drives one ssh client from spawn to a settled login state.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};

use super::credentials::CredentialSource;
use super::expect::Expecter;
use super::process::Subordinate;
use super::state::{Event, FailureReason, Reply, SessionState, Step};
use crate::command::{display_command, CommandBuilder};
use crate::connection::ConnectionSpec;
use crate::settings::Settings;

/// Final state reached by one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub name: String,
    pub state: SessionState,
}

impl SessionOutcome {
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }
}

/// A connected client kept running as the tunnel.
#[derive(Debug)]
pub struct LiveTunnel {
    pub name: String,
    pub process: Subordinate,
}

/// Result of [`Establish::establish`]: the outcome, plus the live process
/// when the login succeeded.
#[derive(Debug)]
pub struct Established {
    pub outcome: SessionOutcome,
    pub tunnel: Option<LiveTunnel>,
}

/// Brings a connection to a settled state.
#[async_trait]
pub trait Establish: Send + Sync {
    async fn establish(
        &self,
        connection: &ConnectionSpec,
        credentials: &mut CredentialSource,
    ) -> Established;
}

/// One login in progress.
pub struct Session<'c> {
    connection: &'c ConnectionSpec,
    process: Subordinate,
    io: Expecter,
    state: SessionState,
}

impl<'c> Session<'c> {
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Runs the login state machine until it settles.
    pub async fn authenticate(&mut self, credentials: &mut CredentialSource, limit: Duration) {
        self.state = drive(&mut self.io, self.connection.name(), credentials, limit).await;
    }

    /// Settles the session: a connected client is handed over as a
    /// [`LiveTunnel`], any other is killed.
    pub fn finish(mut self) -> Established {
        let name = self.connection.name().to_string();
        let outcome = SessionOutcome {
            name: name.clone(),
            state: self.state.clone(),
        };

        if outcome.is_connected() {
            self.process.keep_input(self.io.into_input());
            return Established {
                outcome,
                tunnel: Some(LiveTunnel {
                    name,
                    process: self.process,
                }),
            };
        }

        if let Err(e) = self.process.terminate() {
            warn!("Failed to stop ssh for {}: {}", name, e);
        }
        Established {
            outcome,
            tunnel: None,
        }
    }
}

/// Spawns the ssh client and runs the login for each connection.
#[derive(Debug, Clone)]
pub struct SessionDriver {
    commands: CommandBuilder,
    prompt_timeout: Duration,
}

impl SessionDriver {
    pub fn new(settings: &Settings) -> Self {
        Self {
            commands: CommandBuilder::new(settings.ssh_program.clone()),
            prompt_timeout: settings.prompt_timeout,
        }
    }

    /// Spawns the client for `connection` without driving it.
    pub fn spawn<'c>(&self, connection: &'c ConnectionSpec) -> Result<Session<'c>, FailureReason> {
        let argv = self.commands.build(connection);
        debug!("[{}] {}", connection.name(), display_command(&argv));

        let (process, io) = Subordinate::spawn(connection.name(), &argv)
            .map_err(|e| FailureReason::Spawn(e.to_string()))?;

        Ok(Session {
            connection,
            process,
            io,
            state: SessionState::Spawned,
        })
    }
}

#[async_trait]
impl Establish for SessionDriver {
    async fn establish(
        &self,
        connection: &ConnectionSpec,
        credentials: &mut CredentialSource,
    ) -> Established {
        info!("Connecting {}...", connection.name());

        let mut session = match self.spawn(connection) {
            Ok(session) => session,
            Err(reason) => {
                return Established {
                    outcome: SessionOutcome {
                        name: connection.name().to_string(),
                        state: SessionState::Failed(reason),
                    },
                    tunnel: None,
                }
            }
        };

        session.authenticate(credentials, self.prompt_timeout).await;
        info!("{}: {}", connection.name(), session.state());
        session.finish()
    }
}

/// Runs the state machine over `io` from [`SessionState::Spawned`].
pub async fn drive(
    io: &mut Expecter,
    name: &str,
    credentials: &mut CredentialSource,
    limit: Duration,
) -> SessionState {
    let mut state = SessionState::Spawned;

    loop {
        let event = match state.step() {
            Step::Done => return state,
            Step::Expect(prompts) => io.expect(prompts, limit).await,
            Step::ReplyThenExpect(reply, prompts) => {
                match send_reply(io, name, reply, credentials).await {
                    Event::Replied => io.expect(prompts, limit).await,
                    other => other,
                }
            }
            Step::Reply(reply) => send_reply(io, name, reply, credentials).await,
        };

        let next = state.clone().on(event.clone());
        debug!("[{}] {} --{:?}--> {}", name, state, event, next);
        state = next;
    }
}

async fn send_reply(
    io: &mut Expecter,
    name: &str,
    reply: Reply,
    credentials: &mut CredentialSource,
) -> Event {
    let written = match reply {
        Reply::AcceptHostKey => {
            info!("Accepting host key for {}", name);
            io.send_line("yes")
        }
        Reply::Credential => match credentials.credential_for(name).await {
            Some(password) => io.send_line(&password),
            None => return Event::NoCredential,
        },
    };

    match written {
        Ok(()) => Event::Replied,
        Err(e) => Event::Eof(format!("write to ssh failed: {}", e)),
    }
}
