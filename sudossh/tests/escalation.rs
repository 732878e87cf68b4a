//! End-to-end runs of the escalation loop against a scripted channel.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use secrecy::SecretString;

use sudossh::channel::{CapturedOutput, ChannelEvent, PromptTable, ShellChannel};
use sudossh::driver::{CommandQueue, Directive, Escalation, TransferTask};
use sudossh::error::{ChannelError, Error, Result, TransferError};

const PASSWORD_MARKER: &str = "remote-session-sudo-prompt";
const PROMPT_MARKER: &str = "remote-session-prompt#";

/// Plays back a fixed list of events and records what was asked of it.
#[derive(Default)]
struct ScriptedChannel {
    script: VecDeque<ChannelEvent>,
    pty_requests: usize,
    execs: Vec<String>,
    sent: Vec<String>,
}

impl ScriptedChannel {
    fn new(script: impl IntoIterator<Item = ChannelEvent>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl ShellChannel for ScriptedChannel {
    async fn request_pty(&mut self) -> Result<()> {
        self.pty_requests += 1;
        Ok(())
    }

    async fn exec(&mut self, command: &str) -> Result<()> {
        self.execs.push(command.to_string());
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.sent.push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ChannelEvent>> {
        Ok(self.script.pop_front())
    }
}

/// Never produces an event.
struct SilentChannel;

impl ShellChannel for SilentChannel {
    async fn request_pty(&mut self) -> Result<()> {
        Ok(())
    }

    async fn exec(&mut self, _command: &str) -> Result<()> {
        Ok(())
    }

    async fn send(&mut self, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ChannelEvent>> {
        std::future::pending().await
    }
}

fn data(text: &str) -> ChannelEvent {
    ChannelEvent::Data(Bytes::copy_from_slice(text.as_bytes()))
}

/// Pty and exec granted, password asked and accepted, prompt installed.
fn escalated() -> Vec<ChannelEvent> {
    vec![
        ChannelEvent::Success,
        ChannelEvent::Success,
        data(PASSWORD_MARKER),
        data("\r\nroot@host:~# "),
        data(PROMPT_MARKER),
    ]
}

/// The root shell exits cleanly.
fn exited(status: u32) -> Vec<ChannelEvent> {
    vec![
        ChannelEvent::ExitStatus(status),
        ChannelEvent::Eof,
        ChannelEvent::Close,
    ]
}

async fn run(
    channel: &mut ScriptedChannel,
    queue: CommandQueue,
    prompts: &PromptTable,
    output: &mut CapturedOutput,
) -> Result<Option<u32>> {
    let password = SecretString::from("pw".to_string());
    Escalation::new("host", queue, prompts, Some(&password))
        .run(channel, output, None)
        .await
}

#[tokio::test]
async fn test_empty_queue_exits_immediately() {
    let mut script = escalated();
    script.extend(exited(0));
    let mut channel = ScriptedChannel::new(script);
    let mut output = CapturedOutput::new();

    let status = run(&mut channel, CommandQueue::new(), &PromptTable::new(), &mut output)
        .await
        .unwrap();

    assert_eq!(status, Some(0));
    assert_eq!(channel.pty_requests, 1);
    assert_eq!(channel.execs, vec!["sudo -k -p 'remote-session-sudo-prompt' su -"]);
    assert_eq!(
        channel.sent,
        vec!["pw\n", "export PS1='remote-session-prompt#'\n", "exit\n"]
    );
}

#[tokio::test]
async fn test_commands_one_per_prompt() {
    let mut script = escalated();
    script.extend([
        data("pwd\r\n/root\r\nremote-session-prompt#"),
        data("cd /etc\r\n"),
        data(PROMPT_MARKER),
        data("ls\r\npasswd  shadow\r\nremote-session-prompt#"),
    ]);
    script.extend(exited(0));
    let mut channel = ScriptedChannel::new(script);
    let mut output = CapturedOutput::new();

    let queue: CommandQueue = ["pwd", "cd /etc", "ls"].into_iter().collect();
    run(&mut channel, queue, &PromptTable::new(), &mut output)
        .await
        .unwrap();

    assert_eq!(&channel.sent[2..], &["pwd\n", "cd /etc\n", "ls\n", "exit\n"]);

    let echoed = output.stdout_lossy();
    assert!(echoed.contains("/root\r\n"));
    assert!(echoed.contains("cd /etc\r\n"));
    assert!(!echoed.contains("pw\n"));
}

#[tokio::test]
async fn test_operator_prompt_answered() {
    let mut script = escalated();
    script.extend([
        data("Do you want to continue? [Y/n] "),
        data("Setting up nginx\r\nremote-session-prompt#"),
    ]);
    script.extend(exited(0));
    let mut channel = ScriptedChannel::new(script);
    let mut output = CapturedOutput::new();

    let prompts = PromptTable::new()
        .with(r"Do you want to continue\? \[Y/n\]", "Y")
        .unwrap();
    let queue: CommandQueue = ["apt-get install nginx"].into_iter().collect();
    run(&mut channel, queue, &prompts, &mut output)
        .await
        .unwrap();

    assert_eq!(
        &channel.sent[2..],
        &["apt-get install nginx\n", "Y\n", "exit\n"]
    );
    assert!(!output.stdout_lossy().contains("Do you want to continue"));
    assert!(output.stdout_lossy().contains("Setting up nginx"));
}

#[tokio::test]
async fn test_transfer_one_chunk_per_prompt() {
    let mut script = escalated();
    script.extend([data(PROMPT_MARKER), data(PROMPT_MARKER)]);
    script.extend(exited(0));
    let mut channel = ScriptedChannel::new(script);
    let mut output = CapturedOutput::new();

    let queue: CommandQueue = [
        Directive::from(TransferTask::from_bytes("first_chunk", "/etc/motd").with_chunk_size(6)),
        Directive::from("cat /etc/motd"),
    ]
    .into_iter()
    .collect();
    run(&mut channel, queue, &PromptTable::new(), &mut output)
        .await
        .unwrap();

    assert_eq!(
        &channel.sent[2..],
        &[
            "echo -n 'Zmlyc3Rf' | base64 -d > /etc/motd\n",
            "echo -n 'Y2h1bms=' | base64 -d >> /etc/motd\n",
            "cat /etc/motd\n",
            "exit\n",
        ]
    );
}

#[tokio::test]
async fn test_exit_status_returned() {
    let mut script = escalated();
    script.extend(exited(3));
    let mut channel = ScriptedChannel::new(script);
    let mut output = CapturedOutput::new();

    let status = run(&mut channel, CommandQueue::new(), &PromptTable::new(), &mut output)
        .await
        .unwrap();
    assert_eq!(status, Some(3));
}

#[tokio::test]
async fn test_stderr_forwarded() {
    let mut script = escalated();
    script.insert(
        2,
        ChannelEvent::ExtendedData {
            ext: 1,
            data: Bytes::from_static(b"sudo: warning\n"),
        },
    );
    script.extend(exited(0));
    let mut channel = ScriptedChannel::new(script);
    let mut output = CapturedOutput::new();

    run(&mut channel, CommandQueue::new(), &PromptTable::new(), &mut output)
        .await
        .unwrap();
    assert_eq!(output.stderr_lossy(), "sudo: warning\n");
}

#[tokio::test]
async fn test_pty_refused() {
    let mut channel = ScriptedChannel::new([ChannelEvent::Failure]);
    let mut output = CapturedOutput::new();

    let err = run(&mut channel, CommandQueue::new(), &PromptTable::new(), &mut output)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Channel(ChannelError::PtyUnavailable)));
    assert!(channel.execs.is_empty());
    assert_eq!(err.to_string(), "Channel error: Could not obtain pty");
}

#[tokio::test]
async fn test_escalation_exec_refused() {
    let mut channel = ScriptedChannel::new([ChannelEvent::Success, ChannelEvent::Failure]);
    let mut output = CapturedOutput::new();

    let err = run(&mut channel, CommandQueue::new(), &PromptTable::new(), &mut output)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Channel(ChannelError::EscalationExecFailed)));
    assert!(channel.sent.is_empty());
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let mut channel = ScriptedChannel::new([
        ChannelEvent::Success,
        ChannelEvent::Success,
        data(PASSWORD_MARKER),
        data("\r\nSorry, try again.\r\n"),
        data(PASSWORD_MARKER),
    ]);
    let mut output = CapturedOutput::new();

    let err = run(&mut channel, CommandQueue::new(), &PromptTable::new(), &mut output)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Channel(ChannelError::PasswordRejected)));
    assert_eq!(channel.sent.iter().filter(|s| *s == "pw\n").count(), 1);
}

#[tokio::test]
async fn test_closed_before_exit() {
    let mut script = escalated();
    script.truncate(3);
    let mut channel = ScriptedChannel::new(script);
    let mut output = CapturedOutput::new();

    let queue: CommandQueue = ["pwd"].into_iter().collect();
    let err = run(&mut channel, queue, &PromptTable::new(), &mut output)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Channel(ChannelError::Closed { pending: 1 })
    ));
}

#[tokio::test]
async fn test_silent_channel_times_out() {
    let prompts = PromptTable::new();
    let mut output = CapturedOutput::new();
    let limit = Duration::from_millis(50);

    let err = Escalation::new("host", CommandQueue::new(), &prompts, None)
        .run(&mut SilentChannel, &mut output, Some(limit))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Channel(ChannelError::PromptTimeout(d)) if d == limit
    ));
}

#[tokio::test]
async fn test_unreadable_transfer_aborts_after_earlier_commands() {
    let mut script = escalated();
    script.extend([data("pwd\r\n/root\r\nremote-session-prompt#")]);
    script.extend(exited(0));
    let mut channel = ScriptedChannel::new(script);
    let mut output = CapturedOutput::new();

    let queue: CommandQueue = [
        Directive::from("pwd"),
        Directive::file("/nonexistent/sudossh/payload", "/r"),
        Directive::from("ls"),
    ]
    .into_iter()
    .collect();
    let err = run(&mut channel, queue, &PromptTable::new(), &mut output)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Transfer(TransferError::SourceUnreadable { .. })
    ));
    assert_eq!(&channel.sent[2..], &["pwd\n"]);
}
