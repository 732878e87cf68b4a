//! SSH connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys.
    Strict,

    /// Accept and learn unknown keys, reject changed keys.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For testing and lab use only.
    Disabled,
}

/// SSH connection configuration.
#[derive(Debug)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Login credentials.
    pub credentials: Credentials,

    /// Connection timeout.
    pub timeout: Duration,

    /// Terminal width for the escalation pty.
    pub terminal_width: u32,

    /// Terminal height for the escalation pty.
    pub terminal_height: u32,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Login credentials.
///
/// Password and key are not mutually exclusive: when both are present the
/// key is offered first and the password is tried if the key is refused.
/// With neither, `none` authentication is attempted.
#[derive(Debug, Default)]
pub struct Credentials {
    /// Password authentication.
    pub password: Option<SecretString>,

    /// Private key authentication.
    pub private_key: Option<PrivateKey>,
}

/// Location of a private key on disk.
#[derive(Debug)]
pub struct PrivateKey {
    /// Path to the private key file.
    pub path: PathBuf,
    /// Optional passphrase for encrypted keys.
    pub passphrase: Option<SecretString>,
}
