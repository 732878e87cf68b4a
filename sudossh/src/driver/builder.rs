//! Builder for creating sessions.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::session::Session;
use crate::channel::{OutputSink, PromptTable, StdStreams};
use crate::error::{ChannelError, Result, SessionError};
use crate::transport::{Credentials, HostKeyVerification, PrivateKey, SshConfig};

/// Builder for constructing sessions.
///
/// # Example
///
/// ```rust,no_run
/// use sudossh::SessionBuilder;
///
/// # async fn example() -> Result<(), sudossh::Error> {
/// let mut session = SessionBuilder::new("192.168.1.10")
///     .username("deploy")
///     .private_key("/home/deploy/.ssh/id_ed25519")
///     .sudo_password("secret")
///     .prompt(r"Do you want to continue\? \[Y/n\]", "Y")
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    host: String,
    port: u16,
    username: Option<String>,
    credentials: Credentials,
    sudo_password: Option<SecretString>,
    prompts: Vec<(String, String)>,
    timeout: Duration,
    prompt_timeout: Option<Duration>,
    terminal_width: u32,
    terminal_height: u32,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    output: Box<dyn OutputSink>,
}

impl SessionBuilder {
    /// Create a new session builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: None,
            credentials: Credentials::default(),
            sudo_password: None,
            prompts: Vec::new(),
            timeout: Duration::from_secs(30),
            prompt_timeout: None,
            terminal_width: 511,
            terminal_height: 24,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            output: Box::new(StdStreams),
        }
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the login user. Defaults to `$USER`.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.credentials.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.credentials.private_key = Some(PrivateKey {
            path: key_path.into(),
            passphrase: None,
        });
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.credentials.private_key = Some(PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        });
        self
    }

    /// Set the password sent when sudo asks for one.
    pub fn sudo_password(mut self, password: impl Into<String>) -> Self {
        self.sudo_password = Some(SecretString::from(password.into()));
        self
    }

    /// Answer output matching the regex `pattern` with `response` while a
    /// root shell runs. Patterns are tried in the order they were added.
    pub fn prompt(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.prompts.push((pattern.into(), response.into()));
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fail a root shell that stays silent for longer than `timeout`.
    pub fn prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = Some(timeout);
        self
    }

    /// Set terminal dimensions of the root shell's pty.
    pub fn terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Set the host key verification mode (default: accept new).
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Use a known_hosts file other than `~/.ssh/known_hosts`.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Accept any host key. For lab use only.
    pub fn danger_disable_host_key_verification(mut self) -> Self {
        self.host_key_verification = HostKeyVerification::Disabled;
        self
    }

    /// Send the root shell's output somewhere other than this process's
    /// stdout and stderr.
    pub fn output(mut self, output: impl OutputSink + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Build the session.
    ///
    /// This creates the session but does not connect. Call `open()` on the
    /// returned session to establish the connection.
    pub fn build(self) -> Result<Session> {
        let username = match self.username {
            Some(username) => username,
            None => std::env::var("USER").map_err(|_| SessionError::InvalidConfig {
                message: "Username is required and $USER is not set".to_string(),
            })?,
        };

        if username.is_empty() {
            return Err(SessionError::InvalidConfig {
                message: "Username must not be empty".to_string(),
            }
            .into());
        }

        let mut prompts = PromptTable::new();
        for (pattern, response) in &self.prompts {
            prompts
                .insert(pattern, response.as_str())
                .map_err(ChannelError::InvalidPattern)?;
        }

        let config = SshConfig {
            host: self.host,
            port: self.port,
            username,
            credentials: self.credentials,
            timeout: self.timeout,
            terminal_width: self.terminal_width,
            terminal_height: self.terminal_height,
            host_key_verification: self.host_key_verification,
            known_hosts_path: self.known_hosts_path,
        };

        Ok(Session::new(
            config,
            self.sudo_password,
            prompts,
            self.prompt_timeout,
            self.output,
        ))
    }

    /// Build the session and connect it.
    pub async fn connect(self) -> Result<Session> {
        let mut session = self.build()?;
        session.open().await?;
        Ok(session)
    }

    /// Connect, run `f`, and close the session afterwards.
    ///
    /// See [`Session::scope`].
    pub async fn connect_scoped<T, F>(self, f: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut Session) -> Result<T>,
    {
        self.connect().await?.scope(f).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_defaults() {
        let session = SessionBuilder::new("host.example.com")
            .username("the_user")
            .build()
            .unwrap();
        let config = session.config();

        assert_eq!(config.port, 22);
        assert_eq!(config.username, "the_user");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!((config.terminal_width, config.terminal_height), (511, 24));
        assert!(matches!(
            config.host_key_verification,
            HostKeyVerification::AcceptNew
        ));
        assert!(config.credentials.password.is_none());
        assert!(session.prompts().is_empty());
    }

    #[test]
    fn test_options_carry_into_config() {
        let session = SessionBuilder::new("10.0.0.1")
            .port(2222)
            .username("deploy")
            .password("pw")
            .private_key_with_passphrase("/keys/id", "phrase")
            .terminal_size(200, 50)
            .known_hosts_path("/tmp/known_hosts")
            .danger_disable_host_key_verification()
            .build()
            .unwrap();
        let config = session.config();

        assert_eq!(config.socket_addr(), "10.0.0.1:2222");
        assert!(config.credentials.password.is_some());
        let key = config.credentials.private_key.as_ref().unwrap();
        assert_eq!(key.path, PathBuf::from("/keys/id"));
        assert!(key.passphrase.is_some());
        assert_eq!((config.terminal_width, config.terminal_height), (200, 50));
        assert_eq!(config.known_hosts_path, Some(PathBuf::from("/tmp/known_hosts")));
        assert!(matches!(
            config.host_key_verification,
            HostKeyVerification::Disabled
        ));
    }

    #[test]
    fn test_prompts_keep_order() {
        let session = SessionBuilder::new("host")
            .username("u")
            .prompt("continue", "Y")
            .prompt("overwrite", "n")
            .build()
            .unwrap();

        let entries: Vec<_> = session.prompts().iter().collect();
        assert_eq!(entries, vec![("continue", "Y"), ("overwrite", "n")]);
    }

    #[test]
    fn test_invalid_prompt_pattern() {
        let result = SessionBuilder::new("host")
            .username("u")
            .prompt("(unclosed", "x")
            .build();
        assert!(matches!(
            result,
            Err(Error::Channel(ChannelError::InvalidPattern(_)))
        ));
    }

    #[test]
    fn test_empty_username_rejected() {
        let result = SessionBuilder::new("host").username("").build();
        assert!(matches!(
            result,
            Err(Error::Session(SessionError::InvalidConfig { .. }))
        ));
    }
}
