//! Login state machine.
//!
//! States, the prompts each state waits for, and the transition table.
//! The driver performs the I/O; everything here is pure.

use std::fmt;

/// A recognizable piece of ssh client output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prompt {
    /// Unknown host key confirmation
    HostKey,
    /// Password or key passphrase request
    Password,
    /// Shell prompt, the login is complete
    Shell,
    /// Authentication rejected
    PermissionDenied,
}

impl Prompt {
    /// Substrings identifying the prompt in raw output.
    pub fn patterns(self) -> &'static [&'static str] {
        match self {
            Self::HostKey => &["(yes/no"],
            Self::Password => &["assword:", "passphrase for key"],
            Self::Shell => &["$ ", "# ", "> ", "% "],
            Self::PermissionDenied => &["Permission denied"],
        }
    }

    /// Whether the prompt only counts as the last text received. Shell
    /// markers also occur in login banners.
    pub fn must_end_output(self) -> bool {
        matches!(self, Self::Shell)
    }
}

/// What a bounded wait, or a reply, produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Matched(Prompt),
    Timeout,
    /// Subordinate output ended; carries the last non-empty line seen
    Eof(String),
    /// The pending reply was written
    Replied,
    /// No credential could be obtained
    NoCredential,
}

/// A reply the driver writes to the subordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    AcceptHostKey,
    Credential,
}

/// What the driver does in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Wait for the first of these prompts
    Expect(&'static [Prompt]),
    /// Write a reply, then wait for the first of these prompts
    ReplyThenExpect(Reply, &'static [Prompt]),
    /// Write a reply; the outcome is [`Event::Replied`] or
    /// [`Event::NoCredential`]
    Reply(Reply),
    /// Terminal state
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    AuthDenied,
    ConnectionError(String),
    NoCredential,
    UnexpectedOutput(Prompt),
    Spawn(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthDenied => write!(f, "permission denied"),
            Self::ConnectionError(detail) if detail.is_empty() => write!(f, "connection closed"),
            Self::ConnectionError(detail) => write!(f, "connection closed: {}", detail),
            Self::NoCredential => write!(f, "no password available"),
            Self::UnexpectedOutput(prompt) => write!(f, "unexpected {:?} prompt", prompt),
            Self::Spawn(detail) => write!(f, "could not start ssh: {}", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Spawned,
    AwaitingHostKeyDecision,
    AwaitingPassword,
    AwaitingPermissionResult,
    Connected,
    Failed(FailureReason),
    TimedOut,
}

const FROM_SPAWNED: &[Prompt] = &[
    Prompt::HostKey,
    Prompt::Password,
    Prompt::Shell,
    Prompt::PermissionDenied,
];
const AFTER_HOST_KEY: &[Prompt] = &[Prompt::Password, Prompt::Shell, Prompt::PermissionDenied];
const AFTER_CREDENTIAL: &[Prompt] = &[Prompt::PermissionDenied, Prompt::Password, Prompt::Shell];

impl SessionState {
    pub fn step(&self) -> Step {
        match self {
            Self::Spawned => Step::Expect(FROM_SPAWNED),
            Self::AwaitingHostKeyDecision => {
                Step::ReplyThenExpect(Reply::AcceptHostKey, AFTER_HOST_KEY)
            }
            Self::AwaitingPassword => Step::Reply(Reply::Credential),
            Self::AwaitingPermissionResult => Step::Expect(AFTER_CREDENTIAL),
            Self::Connected | Self::Failed(_) | Self::TimedOut => Step::Done,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.step(), Step::Done)
    }

    /// Transition table.
    pub fn on(self, event: Event) -> SessionState {
        use Event::*;
        use Prompt::*;
        use SessionState::*;

        match (self, event) {
            (state @ (Connected | Failed(_) | TimedOut), _) => state,

            (_, Timeout) => TimedOut,
            (_, Eof(last_line)) => Failed(FailureReason::ConnectionError(last_line)),
            (_, NoCredential) => Failed(FailureReason::NoCredential),

            (Spawned, Matched(HostKey)) => AwaitingHostKeyDecision,
            (Spawned | AwaitingHostKeyDecision, Matched(Password)) => AwaitingPassword,
            (AwaitingPassword, Replied) => AwaitingPermissionResult,
            (_, Matched(Shell)) => Connected,
            (_, Matched(PermissionDenied)) => Failed(FailureReason::AuthDenied),
            // Asked again after a submitted credential: it was rejected.
            (AwaitingPermissionResult, Matched(Password)) => Failed(FailureReason::AuthDenied),

            (_, Matched(prompt)) => Failed(FailureReason::UnexpectedOutput(prompt)),
            (state, Replied) => state,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawned => write!(f, "spawned"),
            Self::AwaitingHostKeyDecision => write!(f, "awaiting host key decision"),
            Self::AwaitingPassword => write!(f, "awaiting password"),
            Self::AwaitingPermissionResult => write!(f, "awaiting permission result"),
            Self::Connected => write!(f, "connected"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}
