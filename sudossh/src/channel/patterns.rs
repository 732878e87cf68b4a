//! Prompt recognition: synthetic markers and the caller's prompt table.

use std::ops::Range;
use std::sync::LazyLock;

use indexmap::IndexMap;
use memchr::memmem;
use regex::bytes::{Regex, RegexBuilder};

/// Printed by sudo in place of its password prompt (`sudo -p`).
pub const PASSWORD_PROMPT_MARKER: &str = "remote-session-sudo-prompt";

/// Assigned to `PS1` in the root shell once escalation succeeds.
pub const COMMAND_PROMPT_MARKER: &str = "remote-session-prompt#";

/// The command prompt only counts at the end of a line, so the echo of
/// `export PS1='remote-session-prompt#'` does not match.
static COMMAND_PROMPT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?m){}\r?$", regex::escape(COMMAND_PROMPT_MARKER)))
        .expect("command prompt pattern is a valid regex")
});

/// Trait for prompt matching - regex by default, extensible for custom parsers.
pub trait PromptMatcher: Send + Sync {
    /// Returns the byte range of the first match, or None if no match.
    fn find_match(&self, data: &[u8]) -> Option<Range<usize>>;

    /// Check if the data matches the pattern.
    fn is_match(&self, data: &[u8]) -> bool {
        self.find_match(data).is_some()
    }
}

/// Regex-based prompt matcher (the default implementation).
impl PromptMatcher for Regex {
    fn find_match(&self, data: &[u8]) -> Option<Range<usize>> {
        self.find(data).map(|m| m.range())
    }
}

/// Matches the sudo password marker anywhere in a chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordPrompt;

impl PromptMatcher for PasswordPrompt {
    fn find_match(&self, data: &[u8]) -> Option<Range<usize>> {
        let marker = PASSWORD_PROMPT_MARKER.as_bytes();
        memmem::find(data, marker).map(|start| start..start + marker.len())
    }
}

/// Matches the synthetic root command prompt at a line end.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandPrompt;

impl PromptMatcher for CommandPrompt {
    fn find_match(&self, data: &[u8]) -> Option<Range<usize>> {
        COMMAND_PROMPT_PATTERN.find_match(data)
    }
}

/// One anticipated prompt and the line to answer it with.
#[derive(Debug, Clone)]
struct PromptResponse {
    pattern: Regex,
    response: String,
}

/// Ordered table of operator prompts the caller expects.
///
/// Entries are tested in insertion order and the first match wins.
/// Re-inserting an existing pattern replaces its response but keeps its
/// position.
///
/// # Example
///
/// ```rust
/// use sudossh::channel::PromptTable;
///
/// let mut prompts = PromptTable::new();
/// prompts.insert(r"Do you want to continue\? \[Y/n\]", "Y").unwrap();
/// assert_eq!(prompts.find(b"Do you want to continue? [Y/n] "), Some("Y"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PromptTable {
    entries: IndexMap<String, PromptResponse>,
}

impl PromptTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the response for `pattern`.
    ///
    /// Patterns are compiled in multi-line mode, so `^` and `$` anchor to
    /// each line of a chunk rather than to the whole chunk.
    pub fn insert(
        &mut self,
        pattern: &str,
        response: impl Into<String>,
    ) -> Result<(), regex::Error> {
        let entry = PromptResponse {
            pattern: RegexBuilder::new(pattern).multi_line(true).build()?,
            response: response.into(),
        };
        self.entries.insert(pattern.to_string(), entry);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, pattern: &str, response: impl Into<String>) -> Result<Self, regex::Error> {
        self.insert(pattern, response)?;
        Ok(self)
    }

    /// Remove the entry for `pattern`, keeping the order of the rest.
    pub fn remove(&mut self, pattern: &str) -> bool {
        self.entries.shift_remove(pattern).is_some()
    }

    /// Response of the first entry whose pattern matches `data`.
    pub fn find(&self, data: &[u8]) -> Option<&str> {
        self.entries
            .values()
            .find(|entry| entry.pattern.is_match(data))
            .map(|entry| entry.response.as_str())
    }

    /// Patterns and responses in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(pattern, entry)| (pattern.as_str(), entry.response.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
