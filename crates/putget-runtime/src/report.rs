//! Status reporting on standard output.
//!
//! [`ErrorChain`] flattens an error and all of its causes, outermost first.
//! [`StatusReporter`] writes the per-cycle report: the sent payload, the
//! received payload or its absence, and the final `SUCCESS` or `FAILURE` line
//! preceded by the rendered error chain.

use std::error::Error as StdError;
use std::fmt;
use std::io::{self, Write};

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;

/// Prefix written in front of every cause after the first line
pub const CAUSE_PREFIX: &str = "Caused by: ";

/// Most lines rendered for one chain
pub const MAX_CHAIN_DEPTH: usize = 64;

/// An error and its causes, rendered outermost first.
///
/// An error with no cause yields exactly one line; each further cause adds
/// one line. Walking stops at the first cause that repeats an earlier one, or
/// after [`MAX_CHAIN_DEPTH`] lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorChain {
    lines: Vec<String>,
}

impl ErrorChain {
    /// Walk `error` and every source below it
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut lines = vec![error.to_string()];
        // Wide pointers: a wrapper and the cause stored at its start share an
        // address but not a vtable
        let mut visited: Vec<&(dyn StdError + 'static)> = vec![error];

        let mut current = error.source();
        while let Some(cause) = current {
            if lines.len() >= MAX_CHAIN_DEPTH
                || visited.iter().any(|seen| std::ptr::eq(*seen, cause))
            {
                break;
            }
            visited.push(cause);
            lines.push(cause.to_string());
            current = cause.source();
        }

        Self { lines }
    }

    /// All rendered lines, the error itself first
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Rendered causes only
    pub fn causes(&self) -> &[String] {
        &self.lines[1..]
    }

    /// Number of rendered lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Always false; a chain holds at least the error itself
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

impl fmt::Display for ErrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, line) in self.lines.iter().enumerate() {
            if index == 0 {
                f.write_str(line)?;
            } else {
                write!(f, "\n{}{}", CAUSE_PREFIX, line)?;
            }
        }
        Ok(())
    }
}

/// Writes the per-cycle status report
#[derive(Debug)]
pub struct StatusReporter<W> {
    out: W,
}

impl StatusReporter<io::Stdout> {
    /// Reporter writing to standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> StatusReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Report the payload that was just sent
    pub fn sent(&mut self, payload: &str) -> io::Result<()> {
        writeln!(self.out, "--> Sent message was:\n{}", payload)?;
        self.out.flush()
    }

    /// Report the received payload, or that none arrived in time
    pub fn received(&mut self, body: Option<&str>) -> io::Result<()> {
        match body {
            Some(body) => writeln!(self.out, "\n--> Received message was:\n{}", body)?,
            None => writeln!(self.out, "\n--> No message received before the timeout")?,
        }
        self.out.flush()
    }

    pub fn success(&mut self) -> io::Result<()> {
        writeln!(self.out, "SUCCESS")?;
        self.out.flush()
    }

    /// Report the rendered error chain followed by `FAILURE`
    pub fn failure(&mut self, chain: &ErrorChain) -> io::Result<()> {
        writeln!(self.out, "{}", chain)?;
        writeln!(self.out, "FAILURE")?;
        self.out.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
