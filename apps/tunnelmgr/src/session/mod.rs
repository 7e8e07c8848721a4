//! Interactive ssh login automation.

mod credentials;
mod driver;
mod expect;
mod process;
mod state;

pub use credentials::CredentialSource;
pub use driver::{drive, Establish, Established, LiveTunnel, Session, SessionDriver, SessionOutcome};
pub use expect::Expecter;
pub use process::Subordinate;
pub use state::{Event, FailureReason, Prompt, Reply, SessionState, Step};
