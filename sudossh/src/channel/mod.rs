//! Channel layer: the seam between the escalation core and the transport.
//!
//! The core never touches russh directly. It sees a [`ShellChannel`] that
//! yields [`ChannelEvent`]s and accepts requests and raw input, which keeps
//! the state machine testable against a scripted channel.

mod output;
mod patterns;
mod pty;

use std::future::Future;

use bytes::Bytes;

use crate::error::Result;

pub use output::{CapturedOutput, OutputSink, StdStreams};
pub use patterns::{
    COMMAND_PROMPT_MARKER, CommandPrompt, PASSWORD_PROMPT_MARKER, PasswordPrompt, PromptMatcher,
    PromptTable,
};
pub use pty::SshChannel;

/// Something the remote end did on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The last request that asked for a reply succeeded.
    Success,
    /// The last request that asked for a reply was refused.
    Failure,
    /// Output on the channel's main stream.
    Data(Bytes),
    /// Output on an extended stream (stderr is `ext == 1`).
    ExtendedData { ext: u32, data: Bytes },
    /// The remote command exited.
    ExitStatus(u32),
    /// The remote end will send no more data.
    Eof,
    /// The channel is closed.
    Close,
}

/// An interactive exec channel the escalation core can drive.
pub trait ShellChannel: Send {
    /// Ask for a pseudo-terminal. The reply arrives as a
    /// [`ChannelEvent::Success`] or [`ChannelEvent::Failure`].
    fn request_pty(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Start `command` on the channel. The reply arrives as an event.
    fn exec(&mut self, command: &str) -> impl Future<Output = Result<()>> + Send;

    /// Write raw bytes to the channel's input.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next event. `None` once the channel is gone.
    fn next_event(&mut self) -> impl Future<Output = Result<Option<ChannelEvent>>> + Send;
}
