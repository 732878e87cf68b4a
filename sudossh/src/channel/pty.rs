//! russh-backed channel for the escalation shell.

use bytes::Bytes;
use log::trace;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use super::{ChannelEvent, ShellChannel};
use crate::error::{ChannelError, Result};

/// A russh session channel that is turned into an interactive pty shell.
pub struct SshChannel {
    channel: Channel<Msg>,

    /// Terminal width requested for the pty.
    terminal_width: u32,

    /// Terminal height requested for the pty.
    terminal_height: u32,
}

impl SshChannel {
    /// Wrap an open session channel.
    pub fn new(channel: Channel<Msg>, terminal_width: u32, terminal_height: u32) -> Self {
        Self {
            channel,
            terminal_width,
            terminal_height,
        }
    }
}

impl ShellChannel for SshChannel {
    async fn request_pty(&mut self) -> Result<()> {
        self.channel
            .request_pty(
                true,
                "xterm",
                self.terminal_width,
                self.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(ChannelError::Ssh)?;
        Ok(())
    }

    async fn exec(&mut self, command: &str) -> Result<()> {
        self.channel
            .exec(true, command)
            .await
            .map_err(ChannelError::Ssh)?;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.channel.data(data).await.map_err(ChannelError::Ssh)?;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ChannelEvent>> {
        loop {
            let Some(msg) = self.channel.wait().await else {
                return Ok(None);
            };

            let event = match msg {
                ChannelMsg::Success => ChannelEvent::Success,
                ChannelMsg::Failure => ChannelEvent::Failure,
                ChannelMsg::Data { data } => ChannelEvent::Data(Bytes::copy_from_slice(&data)),
                ChannelMsg::ExtendedData { data, ext } => ChannelEvent::ExtendedData {
                    ext,
                    data: Bytes::copy_from_slice(&data),
                },
                ChannelMsg::ExitStatus { exit_status } => ChannelEvent::ExitStatus(exit_status),
                ChannelMsg::Eof => ChannelEvent::Eof,
                ChannelMsg::Close => ChannelEvent::Close,
                other => {
                    trace!("pty: ignoring {:?}", other);
                    continue;
                }
            };

            return Ok(Some(event));
        }
    }
}
