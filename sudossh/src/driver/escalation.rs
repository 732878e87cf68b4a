//! Escalation state machine.
//!
//! Drives one channel from a bare session to a root shell and then feeds it
//! the command queue, one directive per prompt:
//!
//! ```text
//! AwaitingPty -> AwaitingEscalationAck -> AwaitingPasswordPrompt
//!     -> EstablishingPrompt -> Dispatching -> Terminated
//! ```
//!
//! 1. Request a pty. A refusal is fatal.
//! 2. Exec `sudo -k -p '<password marker>' su -`. A refusal is fatal.
//! 3. Echo output until the password marker shows up, then send the
//!    escalation password.
//! 4. Send `export PS1='<command marker>'` once, echo output until the
//!    command marker shows up at a line end.
//! 5. On every command marker, run one dispatch cycle: the next command, the
//!    next chunk of a transfer, or `exit` when the queue is empty. Output
//!    matching the caller's prompt table is answered instead.
//!
//! [`Escalation::handle`] is synchronous and does no I/O: it maps one
//! [`ChannelEvent`] to the [`Action`]s the caller must perform. The async
//! loop in [`Escalation::run`] performs them against a [`ShellChannel`].

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, trace};
use secrecy::{ExposeSecret, SecretString};

use super::queue::{CommandQueue, Directive};
use crate::channel::{
    COMMAND_PROMPT_MARKER, ChannelEvent, CommandPrompt, OutputSink, PASSWORD_PROMPT_MARKER,
    PasswordPrompt, PromptMatcher, PromptTable, ShellChannel,
};
use crate::error::{ChannelError, Error, Result};

/// Command that starts the root shell with the password marker as sudo's prompt.
pub fn escalation_command() -> String {
    format!("sudo -k -p '{PASSWORD_PROMPT_MARKER}' su -")
}

/// Line that switches the root shell's prompt to the command marker.
pub fn prompt_command() -> String {
    format!("export PS1='{COMMAND_PROMPT_MARKER}'\n")
}

/// Where the state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    /// Pty requested, waiting for the server's reply.
    AwaitingPty,
    /// Escalation command sent, waiting for the server's reply.
    AwaitingEscalationAck,
    /// Waiting for sudo's password marker.
    AwaitingPasswordPrompt,
    /// Password sent, waiting for the command marker. `prompt_sent`
    /// latches once the `PS1` assignment has gone out.
    EstablishingPrompt { prompt_sent: bool },
    /// One directive per command marker.
    Dispatching,
    /// The channel is gone.
    Terminated,
}

/// Something the driving loop must do on the state machine's behalf.
#[derive(Clone, PartialEq, Eq)]
pub enum Action {
    /// Request a pseudo-terminal.
    RequestPty,
    /// Exec a command on the channel.
    Exec(String),
    /// Write bytes to the channel. Hidden data is never logged.
    Send { data: Vec<u8>, hidden: bool },
    /// Echo bytes to the caller's stdout.
    Stdout(Bytes),
    /// Forward bytes to the caller's stderr.
    Stderr(Bytes),
}

impl Action {
    fn line(text: &str) -> Self {
        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(b'\n');
        Action::Send {
            data,
            hidden: false,
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::RequestPty => f.write_str("RequestPty"),
            Action::Exec(command) => f.debug_tuple("Exec").field(command).finish(),
            Action::Send { hidden: true, .. } => f.write_str("Send(<hidden>)"),
            Action::Send { data, .. } => f
                .debug_tuple("Send")
                .field(&String::from_utf8_lossy(data))
                .finish(),
            Action::Stdout(data) => f.debug_tuple("Stdout").field(data).finish(),
            Action::Stderr(data) => f.debug_tuple("Stderr").field(data).finish(),
        }
    }
}

/// One escalation over one channel.
///
/// Owns the command queue for the duration of the run.
pub struct Escalation<'a> {
    /// Host name, for log lines.
    host: &'a str,

    state: EscalationState,

    queue: CommandQueue,

    prompts: &'a PromptTable,

    password: Option<&'a SecretString>,

    /// Whether `exit` has been sent to the root shell.
    exit_sent: bool,

    exit_status: Option<u32>,
}

impl<'a> Escalation<'a> {
    /// Create a state machine that will drain `queue` on `host`.
    pub fn new(
        host: &'a str,
        queue: CommandQueue,
        prompts: &'a PromptTable,
        password: Option<&'a SecretString>,
    ) -> Self {
        Self {
            host,
            state: EscalationState::AwaitingPty,
            queue,
            prompts,
            password,
            exit_sent: false,
            exit_status: None,
        }
    }

    /// Start from `state` instead of the beginning.
    pub fn with_state(mut self, state: EscalationState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> EscalationState {
        self.state
    }

    /// Directives not yet dispatched.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether `exit` has been sent.
    pub fn exit_sent(&self) -> bool {
        self.exit_sent
    }

    /// Exit status reported for the root shell, if any.
    pub fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    /// Actions that begin the run.
    pub fn start(&mut self) -> Vec<Action> {
        debug!(
            "@{}: escalating with {} directive(s) queued",
            self.host,
            self.queue.len()
        );
        match self.state {
            EscalationState::AwaitingPty => vec![Action::RequestPty],
            _ => Vec::new(),
        }
    }

    /// Feed one channel event through the state machine.
    pub fn handle(&mut self, event: ChannelEvent) -> Result<Vec<Action>> {
        let mut actions = Vec::new();

        match event {
            ChannelEvent::Success => self.on_reply(true, &mut actions)?,
            ChannelEvent::Failure => self.on_reply(false, &mut actions)?,
            ChannelEvent::Data(data) => self.on_data(data, &mut actions)?,
            ChannelEvent::ExtendedData { data, .. } => actions.push(Action::Stderr(data)),
            ChannelEvent::ExitStatus(code) => {
                debug!("@{}: root shell exited with {}", self.host, code);
                self.exit_status = Some(code);
            }
            ChannelEvent::Eof => trace!("@{}: eof", self.host),
            ChannelEvent::Close => self.transition(EscalationState::Terminated),
        }

        Ok(actions)
    }

    /// Run the state machine to completion on `channel`.
    ///
    /// Returns once the channel closes. Succeeds with the root shell's exit
    /// status if the queue was drained and `exit` was sent. With a
    /// `prompt_timeout`, waiting longer than that for any channel event fails
    /// with [`ChannelError::PromptTimeout`].
    pub async fn run<C: ShellChannel>(
        mut self,
        channel: &mut C,
        output: &mut dyn OutputSink,
        prompt_timeout: Option<Duration>,
    ) -> Result<Option<u32>> {
        let actions = self.start();
        apply(channel, output, actions).await?;

        while self.state != EscalationState::Terminated {
            let next = match prompt_timeout {
                Some(limit) => tokio::time::timeout(limit, channel.next_event())
                    .await
                    .map_err(|_| ChannelError::PromptTimeout(limit))?,
                None => channel.next_event().await,
            };

            let Some(event) = next? else {
                self.transition(EscalationState::Terminated);
                break;
            };

            let actions = self.handle(event)?;
            apply(channel, output, actions).await?;
        }

        if self.exit_sent {
            Ok(self.exit_status)
        } else {
            Err(ChannelError::Closed {
                pending: self.queue.len(),
            }
            .into())
        }
    }

    fn transition(&mut self, next: EscalationState) {
        debug!("@{}: {:?} -> {:?}", self.host, self.state, next);
        self.state = next;
    }

    fn on_reply(&mut self, success: bool, actions: &mut Vec<Action>) -> Result<()> {
        match (self.state, success) {
            (EscalationState::AwaitingPty, true) => {
                self.transition(EscalationState::AwaitingEscalationAck);
                actions.push(Action::Exec(escalation_command()));
            }
            (EscalationState::AwaitingPty, false) => {
                return Err(ChannelError::PtyUnavailable.into());
            }
            (EscalationState::AwaitingEscalationAck, true) => {
                self.transition(EscalationState::AwaitingPasswordPrompt);
            }
            (EscalationState::AwaitingEscalationAck, false) => {
                return Err(ChannelError::EscalationExecFailed.into());
            }
            (state, success) => trace!("ignoring request reply {} in {:?}", success, state),
        }
        Ok(())
    }

    fn on_data(&mut self, data: Bytes, actions: &mut Vec<Action>) -> Result<()> {
        trace!("@{}: {} byte(s) in {:?}", self.host, data.len(), self.state);

        match self.state {
            EscalationState::AwaitingPty | EscalationState::Terminated => {
                actions.push(Action::Stdout(data));
            }
            EscalationState::AwaitingEscalationAck => {
                // Output means sudo is running even if the reply is still in flight.
                self.transition(EscalationState::AwaitingPasswordPrompt);
                self.await_password(data, actions);
            }
            EscalationState::AwaitingPasswordPrompt => self.await_password(data, actions),
            EscalationState::EstablishingPrompt { prompt_sent } => {
                self.establish_prompt(data, prompt_sent, actions)?;
            }
            EscalationState::Dispatching => self.dispatch(data, actions)?,
        }
        Ok(())
    }

    fn await_password(&mut self, data: Bytes, actions: &mut Vec<Action>) {
        let prompted = PasswordPrompt.is_match(&data);
        actions.push(Action::Stdout(data));

        if prompted {
            let mut line = self
                .password
                .map(|password| password.expose_secret().as_bytes().to_vec())
                .unwrap_or_default();
            line.push(b'\n');
            actions.push(Action::Send {
                data: line,
                hidden: true,
            });
            self.transition(EscalationState::EstablishingPrompt { prompt_sent: false });
        }
    }

    fn establish_prompt(
        &mut self,
        data: Bytes,
        prompt_sent: bool,
        actions: &mut Vec<Action>,
    ) -> Result<()> {
        if PasswordPrompt.is_match(&data) {
            // sudo asks again only when the password was wrong
            actions.push(Action::Stdout(data));
            return Err(ChannelError::PasswordRejected.into());
        }

        let at_prompt = CommandPrompt.is_match(&data);
        actions.push(Action::Stdout(data));

        if at_prompt {
            self.transition(EscalationState::Dispatching);
            return self.dispatch_cycle(actions);
        }

        if !prompt_sent {
            actions.push(Action::Send {
                data: prompt_command().into_bytes(),
                hidden: false,
            });
            self.state = EscalationState::EstablishingPrompt { prompt_sent: true };
        }
        Ok(())
    }

    fn dispatch(&mut self, data: Bytes, actions: &mut Vec<Action>) -> Result<()> {
        if let Some(response) = self.prompts.find(&data) {
            debug!("@{}: answering prompt", self.host);
            actions.push(Action::line(response));
            return Ok(());
        }

        match CommandPrompt.find_match(&data) {
            None => {
                actions.push(Action::Stdout(data));
                Ok(())
            }
            Some(prompt) => {
                if prompt.start > 0 {
                    actions.push(Action::Stdout(data.slice(..prompt.start)));
                }
                self.dispatch_cycle(actions)
            }
        }
    }

    /// Send exactly one directive's worth of input.
    fn dispatch_cycle(&mut self, actions: &mut Vec<Action>) -> Result<()> {
        match self.queue.pop_front() {
            None => {
                info!("@{}: sudo exit", self.host);
                self.exit_sent = true;
                actions.push(Action::line("exit"));
            }
            Some(Directive::Command(command)) => {
                info!("@{}: sudo {}", self.host, command);
                actions.push(Action::line(&command));
            }
            Some(Directive::Transfer(mut task)) => {
                let (line, done) = task.next_line()?;
                actions.push(Action::Send {
                    data: line.into_bytes(),
                    hidden: false,
                });

                if done {
                    info!("@{}: sudo transfer to {} complete", self.host, task.remote_path());
                } else {
                    debug!("@{}: sudo transfer to {} continues", self.host, task.remote_path());
                    self.queue.push_front(Directive::Transfer(task));
                }
            }
        }
        Ok(())
    }
}

/// Perform actions in order.
async fn apply<C: ShellChannel>(
    channel: &mut C,
    output: &mut dyn OutputSink,
    actions: Vec<Action>,
) -> Result<()> {
    for action in actions {
        trace!("apply {:?}", action);
        match action {
            Action::RequestPty => channel.request_pty().await?,
            Action::Exec(command) => channel.exec(&command).await?,
            Action::Send { data, .. } => channel.send(&data).await?,
            Action::Stdout(data) => output.stdout(&data).map_err(Error::Output)?,
            Action::Stderr(data) => output.stderr(&data).map_err(Error::Output)?,
        }
    }
    Ok(())
}
