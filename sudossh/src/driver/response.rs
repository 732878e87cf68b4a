//! Response type for plain command execution.

use std::time::Duration;

/// Result of [`Session::run`](super::Session::run).
#[derive(Debug, Clone)]
pub struct Response {
    /// The command that was executed.
    pub command: String,

    /// Combined stdout and stderr (lossy UTF-8).
    pub output: String,

    /// Exit status, if the server reported one.
    pub exit_status: Option<u32>,

    /// Time taken to execute the command.
    pub elapsed: Duration,
}

impl Response {
    pub fn new(
        command: impl Into<String>,
        output: impl Into<String>,
        exit_status: Option<u32>,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
            exit_status,
            elapsed,
        }
    }

    /// Check if the command exited with status 0.
    pub fn is_success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Get the output lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }

    /// Check if the output contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.output.contains(pattern)
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_requires_zero_status() {
        let ok = Response::new("pwd", "/root\n", Some(0), Duration::from_millis(5));
        assert!(ok.is_success());
        assert!(ok.contains("/root"));
        assert_eq!(ok.to_string(), "/root\n");

        let failed = Response::new("false", "", Some(1), Duration::ZERO);
        assert!(!failed.is_success());

        let unknown = Response::new("kill -9 $$", "", None, Duration::ZERO);
        assert!(!unknown.is_success());
    }
}
