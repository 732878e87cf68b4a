//! Error types for sudossh.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for sudossh operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session-level errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Payload transfer errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Writing echoed output to the caller's sink failed
    #[error("Output error: {0}")]
    Output(#[source] io::Error),
}

/// Transport layer errors (SSH connection, authentication, SFTP).
#[derive(Error, Debug)]
pub enum TransportError {
    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host is not in known_hosts and verification is strict
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key does not match the known_hosts entry
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// SFTP subsystem error
    #[error("SFTP error: {0}")]
    Sftp(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (pty, escalation, prompt detection).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The server refused the pseudo-terminal request
    #[error("Could not obtain pty")]
    PtyUnavailable,

    /// The server refused to start the escalation command
    #[error("Could not execute sudo su command")]
    EscalationExecFailed,

    /// sudo asked for the password a second time
    #[error("Escalation password rejected")]
    PasswordRejected,

    /// No channel activity within the prompt timeout
    #[error("No prompt within {0:?}")]
    PromptTimeout(Duration),

    /// Channel ended before the root shell was told to exit
    #[error("Channel closed before the root shell exited ({pending} directive(s) pending)")]
    Closed { pending: usize },

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Session layer errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Operation attempted after the transport was torn down
    #[error("Session is closed")]
    SessionClosed,

    /// Session already connected
    #[error("Session already connected")]
    AlreadyConnected,

    /// A setup command run on the caller's behalf failed
    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    /// Invalid configuration in the session builder
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Transfer task errors.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The local byte source could not be opened or read
    #[error("Cannot read transfer source '{}': {source}", .path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type alias using sudossh's Error.
pub type Result<T> = std::result::Result<T, Error>;
