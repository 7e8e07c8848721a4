//! The ssh client running under a pseudo-terminal.
//!
//! ssh reads passwords and host key answers from its controlling terminal,
//! so the client is spawned on a PTY. A reader thread drains the master side
//! for the whole life of the process and forwards chunks to the session's
//! [`Expecter`]; once nobody listens, chunks are discarded so the client never
//! blocks on a full terminal buffer.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::thread;

use log::{debug, warn};
use portable_pty::{
    native_pty_system, Child, ChildKiller, CommandBuilder as PtyCommand, MasterPty, PtySize,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use super::expect::Expecter;
use crate::error::TunnelError;

const READ_CHUNK: usize = 4096;

/// Owns a spawned ssh client and its terminal.
pub struct Subordinate {
    pid: Option<u32>,
    child: Box<dyn Child + Send + Sync>,
    // Held after promotion; dropping it would send EOF to the client.
    input: Option<Box<dyn Write + Send>>,
    // Dropping the master hangs up the client's terminal.
    _master: Box<dyn MasterPty + Send>,
}

impl Subordinate {
    /// Spawns `argv` on a fresh PTY.
    pub fn spawn(label: &str, argv: &[String]) -> Result<(Self, Expecter), TunnelError> {
        let (program, args) = argv.split_first().ok_or_else(|| TunnelError::SpawnFailed {
            program: String::new(),
            reason: "empty command line".to_string(),
        })?;
        let spawn_failed = |reason: String| TunnelError::SpawnFailed {
            program: program.clone(),
            reason,
        };

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| spawn_failed(format!("failed to open PTY: {}", e)))?;

        let mut cmd = PtyCommand::new(program);
        cmd.args(args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| spawn_failed(e.to_string()))?;
        // Only the child keeps the slave side open, so EOF follows its exit.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| spawn_failed(format!("failed to clone PTY reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| spawn_failed(format!("failed to take PTY writer: {}", e)))?;

        let pid = child.process_id();
        debug!("[{}] spawned pid {:?}", label, pid);

        let mut subordinate = Self {
            pid,
            child,
            input: None,
            _master: pair.master,
        };

        let (tx, rx) = unbounded_channel();
        let thread_label = label.to_string();
        let pump = thread::Builder::new()
            .name(format!("pty-{}", label))
            .spawn(move || pump_output(thread_label, reader, tx));
        if let Err(e) = pump {
            if let Err(kill_err) = subordinate.terminate() {
                warn!("[{}] failed to stop pid {:?}: {}", label, pid, kill_err);
            }
            return Err(e.into());
        }

        Ok((subordinate, Expecter::new(label, rx, writer)))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Keeps the terminal writer open for the rest of the process's life.
    pub fn keep_input(&mut self, input: Box<dyn Write + Send>) {
        self.input = Some(input);
    }

    /// Whether the process has exited. Reaps it if so.
    pub fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to check process {:?}: {}", self.pid, e);
                true
            }
        }
    }

    /// Kills the process if still running and reaps it.
    pub fn terminate(&mut self) -> std::io::Result<()> {
        if !self.has_exited() {
            self.child.kill()?;
            self.child.wait()?;
        }
        self.input = None;
        Ok(())
    }
}

impl fmt::Debug for Subordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // MasterPty is `!Debug`.
        f.debug_struct("Subordinate").field("pid", &self.pid).finish()
    }
}

fn pump_output(label: String, mut reader: Box<dyn Read + Send>, tx: UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                // A closed receiver means the session was promoted; keep draining.
                let _ = tx.send(buf[..n].to_vec());
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // Linux reports EIO on the master once the child has gone.
            Err(_) => break,
        }
    }
    debug!("[{}] output reader finished", label);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::session::state::{Event, Prompt};
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_echo_and_read_output() {
        let argv = vec!["sh".to_string(), "-c".to_string(), "printf 'ready$ '".to_string()];
        let (mut process, mut expecter) = Subordinate::spawn("echo", &argv).unwrap();

        let event = expecter.expect(&[Prompt::Shell], Duration::from_secs(5)).await;
        assert_eq!(event, Event::Matched(Prompt::Shell));
        assert!(process.terminate().is_ok());
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let argv = vec!["/nonexistent/tunnelmgr-ssh".to_string()];
        let result = Subordinate::spawn("missing", &argv);
        assert!(matches!(result, Err(TunnelError::SpawnFailed { .. })));
    }
}
