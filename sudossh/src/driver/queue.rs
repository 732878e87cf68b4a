//! Directives and the queue the escalation core drains.

use std::collections::VecDeque;
use std::path::PathBuf;

use bytes::Bytes;

use super::transfer::TransferTask;

/// One unit of work for the root shell.
#[derive(Debug)]
pub enum Directive {
    /// A literal shell command line.
    Command(String),
    /// A payload delivered chunk by chunk.
    Transfer(TransferTask),
}

impl Directive {
    /// Transfer a local file to `remote_path`.
    pub fn file(local_path: impl Into<PathBuf>, remote_path: impl Into<String>) -> Self {
        Directive::Transfer(TransferTask::from_file(local_path, remote_path))
    }

    /// Transfer in-memory content to `remote_path`.
    pub fn string(content: impl Into<Bytes>, remote_path: impl Into<String>) -> Self {
        Directive::Transfer(TransferTask::from_bytes(content, remote_path))
    }
}

impl From<&str> for Directive {
    fn from(command: &str) -> Self {
        Directive::Command(command.to_string())
    }
}

impl From<String> for Directive {
    fn from(command: String) -> Self {
        Directive::Command(command)
    }
}

impl From<TransferTask> for Directive {
    fn from(task: TransferTask) -> Self {
        Directive::Transfer(task)
    }
}

/// Ordered directives, consumed front to back.
///
/// An unfinished transfer goes back to the front so it continues before
/// anything queued after it.
#[derive(Debug, Default)]
pub struct CommandQueue {
    directives: VecDeque<Directive>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a directive.
    pub fn push(&mut self, directive: impl Into<Directive>) {
        self.directives.push_back(directive.into());
    }

    /// Put a directive back at the front.
    pub fn push_front(&mut self, directive: Directive) {
        self.directives.push_front(directive);
    }

    pub fn pop_front(&mut self) -> Option<Directive> {
        self.directives.pop_front()
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter()
    }
}

impl<D: Into<Directive>> FromIterator<D> for CommandQueue {
    fn from_iter<I: IntoIterator<Item = D>>(iter: I) -> Self {
        Self {
            directives: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<D: Into<Directive>> Extend<D> for CommandQueue {
    fn extend<I: IntoIterator<Item = D>>(&mut self, iter: I) {
        self.directives.extend(iter.into_iter().map(Into::into));
    }
}
