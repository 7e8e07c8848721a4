//! Prompt matching over subordinate output.
//!
//! Output arrives as raw chunks on a channel fed by the PTY reader thread.
//! Each wait races a small set of prompts against the accumulated text and
//! returns whichever occurs earliest, or a timeout, or end of output.

use std::io::{self, Write};
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{timeout_at, Instant};

use super::state::{Event, Prompt};

/// Upper bound on unmatched output kept in memory
const MAX_BUFFER: usize = 64 * 1024;

pub struct Expecter {
    label: String,
    output: UnboundedReceiver<Vec<u8>>,
    input: Box<dyn Write + Send>,
    buffer: String,
    closed: bool,
}

impl Expecter {
    pub fn new(
        label: impl Into<String>,
        output: UnboundedReceiver<Vec<u8>>,
        input: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            label: label.into(),
            output,
            input,
            buffer: String::new(),
            closed: false,
        }
    }

    /// Waits up to `limit` for the first of `prompts`.
    ///
    /// On a match the buffer is consumed through the end of the matched text.
    pub async fn expect(&mut self, prompts: &[Prompt], limit: Duration) -> Event {
        let deadline = Instant::now() + limit;

        loop {
            if let Some((prompt, start, end)) = self.find(prompts) {
                debug!(
                    "[{}] matched {:?} at {:?} after {:?}",
                    self.label,
                    prompt,
                    &self.buffer[start..end],
                    &self.buffer[..start]
                );
                self.buffer.drain(..end);
                return Event::Matched(prompt);
            }

            if self.closed {
                debug!("[{}] output closed, unmatched: {:?}", self.label, self.buffer);
                return Event::Eof(self.last_line());
            }

            match timeout_at(deadline, self.output.recv()).await {
                Err(_) => {
                    debug!("[{}] no prompt within {:?}, unmatched: {:?}", self.label, limit, self.buffer);
                    return Event::Timeout;
                }
                Ok(None) => self.closed = true,
                Ok(Some(chunk)) => self.push(&chunk),
            }
        }
    }

    /// Writes `line` followed by a newline.
    pub fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.input.write_all(line.as_bytes())?;
        self.input.write_all(b"\n")?;
        self.input.flush()
    }

    /// Gives up the output side and returns the writer to the subordinate.
    ///
    /// Dropping a PTY writer sends end-of-file to the client, so a promoted
    /// tunnel keeps it for as long as the process lives.
    pub fn into_input(self) -> Box<dyn Write + Send> {
        self.input
    }

    /// Earliest occurrence of any pattern of any prompt, as
    /// `(prompt, start, end)`. Ties go to the prompt listed first.
    /// Prompts that must end the output only match at the buffer's end.
    fn find(&self, prompts: &[Prompt]) -> Option<(Prompt, usize, usize)> {
        prompts
            .iter()
            .flat_map(|&prompt| {
                prompt.patterns().iter().filter_map(move |pattern| {
                    let start = if prompt.must_end_output() {
                        self.buffer
                            .ends_with(pattern)
                            .then(|| self.buffer.len() - pattern.len())
                    } else {
                        self.buffer.find(pattern)
                    };
                    start.map(|start| (prompt, start, start + pattern.len()))
                })
            })
            .min_by_key(|&(_, start, _)| start)
    }

    fn push(&mut self, chunk: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        if self.buffer.len() > MAX_BUFFER {
            let mut cut = self.buffer.len() - MAX_BUFFER;
            while !self.buffer.is_char_boundary(cut) {
                cut += 1;
            }
            self.buffer.drain(..cut);
        }
    }

    fn last_line(&self) -> String {
        self.buffer
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .unwrap_or_default()
            .to_string()
    }
}
