//! Where echoed channel output goes.

use std::io::{self, Write};

/// Receives the remote shell's output while the escalation core runs.
///
/// Main-stream data goes to [`stdout`](Self::stdout), extended data to
/// [`stderr`](Self::stderr). Both receive bytes verbatim.
pub trait OutputSink: Send {
    fn stdout(&mut self, data: &[u8]) -> io::Result<()>;

    fn stderr(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Forwards output to this process's stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdStreams;

impl OutputSink for StdStreams {
    fn stdout(&mut self, data: &[u8]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(data)?;
        out.flush()
    }

    fn stderr(&mut self, data: &[u8]) -> io::Result<()> {
        let mut err = io::stderr().lock();
        err.write_all(data)?;
        err.flush()
    }
}

/// Keeps output in memory.
#[derive(Debug, Default, Clone)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured stdout as a string (lossy UTF-8).
    pub fn stdout_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Captured stderr as a string (lossy UTF-8).
    pub fn stderr_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

impl OutputSink for CapturedOutput {
    fn stdout(&mut self, data: &[u8]) -> io::Result<()> {
        self.stdout.extend_from_slice(data);
        Ok(())
    }

    fn stderr(&mut self, data: &[u8]) -> io::Result<()> {
        self.stderr.extend_from_slice(data);
        Ok(())
    }
}
