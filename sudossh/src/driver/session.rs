//! Caller-facing session: one SSH connection to one host.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{info, warn};
use secrecy::SecretString;

use super::escalation::Escalation;
use super::queue::{CommandQueue, Directive};
use super::response::Response;
use crate::channel::{OutputSink, PromptTable};
use crate::error::{Result, SessionError};
use crate::transport::{SshConfig, SshTransport};

/// A connection to one remote host.
///
/// Besides plain commands ([`run`](Self::run)) and SFTP writes
/// ([`put`](Self::put)), a session can open a sudo root shell and drive a
/// queue of directives through it ([`sudo`](Self::sudo)). Only one root
/// shell runs at a time; `sudo` borrows the session mutably until the
/// shell exits.
///
/// After [`close`](Self::close) every operation fails with
/// [`SessionError::SessionClosed`]. Dropping an open session tears the
/// connection down without a clean disconnect; call `close()`, or let
/// [`scope`](Self::scope) do it.
pub struct Session {
    config: SshConfig,

    /// Password sent to sudo's prompt.
    escalation_password: Option<SecretString>,

    prompts: PromptTable,

    /// Longest wait for channel activity while a root shell runs.
    prompt_timeout: Option<Duration>,

    /// Receives the root shell's echoed output.
    output: Box<dyn OutputSink>,

    /// SSH transport (None when disconnected).
    transport: Option<SshTransport>,
}

impl Session {
    /// Create a disconnected session. Call [`open`](Self::open) to connect.
    pub fn new(
        config: SshConfig,
        escalation_password: Option<SecretString>,
        prompts: PromptTable,
        prompt_timeout: Option<Duration>,
        output: Box<dyn OutputSink>,
    ) -> Self {
        Self {
            config,
            escalation_password,
            prompts,
            prompt_timeout,
            output,
            transport: None,
        }
    }

    /// Connect and authenticate.
    pub async fn open(&mut self) -> Result<()> {
        if self.transport.is_some() {
            return Err(SessionError::AlreadyConnected.into());
        }
        self.transport = Some(SshTransport::connect(&self.config).await?);
        info!("@{}: connected as {}", self.config.host, self.config.username);
        Ok(())
    }

    /// Tear down the connection. Closing a closed session does nothing.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(transport) = self.transport.take() {
            transport.close().await?;
            info!("@{}: closed", self.config.host);
        }
        Ok(())
    }

    /// Run `f` with this session, then close it whether `f` succeeded or not.
    ///
    /// An error from `f` takes precedence over an error from closing.
    ///
    /// ```rust,no_run
    /// use sudossh::{Session, SessionBuilder};
    ///
    /// # async fn example() -> Result<(), sudossh::Error> {
    /// let session = SessionBuilder::new("192.168.1.10").connect().await?;
    /// session
    ///     .scope(async |s: &mut Session| s.sudo(["apt-get update"]).await)
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scope<T, F>(mut self, f: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut Session) -> Result<T>,
    {
        let result = f(&mut self).await;
        let closed = self.close().await;
        let value = result?;
        closed?;
        Ok(value)
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Prompts answered automatically while a root shell runs.
    pub fn prompts(&self) -> &PromptTable {
        &self.prompts
    }

    pub fn prompts_mut(&mut self) -> &mut PromptTable {
        &mut self.prompts
    }

    /// Replace the sink that receives the root shell's output.
    pub fn set_output(&mut self, output: impl OutputSink + 'static) {
        self.output = Box::new(output);
    }

    fn transport(&self) -> Result<&SshTransport> {
        Ok(self
            .transport
            .as_ref()
            .ok_or(SessionError::SessionClosed)?)
    }

    /// Run one command without escalation and capture its output.
    pub async fn run(&mut self, command: &str) -> Result<Response> {
        let transport = self.transport()?;
        info!("@{}: {}", self.config.host, command);

        let start = Instant::now();
        let (output, exit_status) = transport.exec(command).await?;

        Ok(Response::new(
            command,
            String::from_utf8_lossy(&output),
            exit_status,
            start.elapsed(),
        ))
    }

    /// Open a root shell with sudo and drain `directives` through it.
    ///
    /// Returns when the root shell has exited, with its exit status if the
    /// server reported one. Output is echoed to the session's output sink.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use sudossh::{Directive, SessionBuilder};
    ///
    /// # async fn example() -> Result<(), sudossh::Error> {
    /// let mut session = SessionBuilder::new("192.168.1.10")
    ///     .username("deploy")
    ///     .password("secret")
    ///     .sudo_password("secret")
    ///     .connect()
    ///     .await?;
    ///
    /// session
    ///     .sudo(vec![
    ///         Directive::from("apt-get update"),
    ///         Directive::string("nameserver 1.1.1.1\n", "/etc/resolv.conf"),
    ///     ])
    ///     .await?;
    ///
    /// session.close().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn sudo<I, D>(&mut self, directives: I) -> Result<Option<u32>>
    where
        I: IntoIterator<Item = D>,
        D: Into<Directive>,
    {
        let transport = self.transport()?;
        let queue: CommandQueue = directives.into_iter().collect();

        let mut channel = transport.open_shell_channel().await?;

        Escalation::new(
            &self.config.host,
            queue,
            &self.prompts,
            self.escalation_password.as_ref(),
        )
        .run(&mut channel, &mut *self.output, self.prompt_timeout)
        .await
    }

    /// Write `content` to `remote_path` over SFTP, without escalation.
    pub async fn put(&mut self, remote_path: &str, content: impl AsRef<[u8]>) -> Result<()> {
        let transport = self.transport()?;
        info!("@{}: put {}", self.config.host, remote_path);
        transport.write_file(remote_path, content.as_ref()).await
    }

    /// Write `content` to a path only root can write.
    ///
    /// The content is staged in a fresh `0700` directory under `/tmp` with
    /// [`put`](Self::put), then a root shell copies it into place and
    /// removes the staging directory.
    pub async fn sudo_put(
        &mut self,
        remote_path: &str,
        content: impl AsRef<[u8]>,
    ) -> Result<Option<u32>> {
        self.transport()?;

        let staging = staging_dir();
        let staged = format!("{staging}/payload");

        for command in [format!("mkdir {staging}"), format!("chmod 0700 {staging}")] {
            let response = self.run(&command).await?;
            if let Some(status) = response.exit_status.filter(|status| *status != 0) {
                return Err(SessionError::CommandFailed {
                    message: format!("'{command}' exited with {status}: {}", response.output.trim()),
                }
                .into());
            }
        }

        self.put(&staged, content).await?;
        self.sudo(staged_copy(&staged, &staging, remote_path)).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.transport.is_some() {
            warn!(
                "Session for {} dropped without close(); connection torn down abruptly",
                self.config.host
            );
        }
    }
}

/// Unique staging directory for [`Session::sudo_put`].
fn staging_dir() -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!(
        "/tmp/remote-session.{}.{:06}",
        stamp.as_secs(),
        stamp.subsec_micros()
    )
}

/// Root-shell directives that move a staged file into place and clean up.
fn staged_copy(staged: &str, staging: &str, remote_path: &str) -> Vec<Directive> {
    vec![
        Directive::Command(format!("cp {staged} {remote_path}")),
        Directive::Command(format!("rm -rf {staging}")),
    ]
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::*;
    use crate::driver::SessionBuilder;
    use crate::error::Error;

    fn closed_session() -> Session {
        SessionBuilder::new("host.example.com")
            .username("the_user")
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_session_is_closed() {
        let session = closed_session();
        assert!(!session.is_open());
        assert_eq!(session.host(), "host.example.com");
    }

    #[tokio::test]
    async fn test_operations_fail_when_closed() {
        let mut session = closed_session();

        let err = session.run("pwd").await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::SessionClosed)));

        let err = session.sudo(["pwd"]).await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::SessionClosed)));

        let err = session.put("/path", "content").await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::SessionClosed)));

        let err = session.sudo_put("/path", "content").await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::SessionClosed)));
    }

    #[test]
    fn test_close_when_closed_is_noop() {
        let mut session = closed_session();
        tokio_test::block_on(session.close()).unwrap();
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_scope_passes_result_through() {
        let host = closed_session()
            .scope(async |s: &mut Session| Ok(s.host().to_string()))
            .await
            .unwrap();
        assert_eq!(host, "host.example.com");

        let err = closed_session()
            .scope(async |s: &mut Session| s.run("pwd").await)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::SessionClosed)));
    }

    #[test]
    fn test_prompts_mutable_after_build() {
        let mut session = closed_session();
        session
            .prompts_mut()
            .insert("my prompt", "this data")
            .unwrap();
        assert_eq!(session.prompts().find(b"Here is my prompt:"), Some("this data"));
    }

    #[test]
    fn test_staging_dir_shape() {
        let pattern = Regex::new(r"^/tmp/remote-session\.[\d\.]+$").unwrap();
        assert!(pattern.is_match(&staging_dir()));
    }

    #[test]
    fn test_staged_copy_then_cleanup() {
        let directives = staged_copy(
            "/tmp/remote-session.1.000001/payload",
            "/tmp/remote-session.1.000001",
            "/etc/motd",
        );
        let commands: Vec<_> = directives
            .iter()
            .map(|d| match d {
                Directive::Command(c) => c.as_str(),
                Directive::Transfer(_) => panic!("unexpected transfer"),
            })
            .collect();
        assert_eq!(
            commands,
            vec![
                "cp /tmp/remote-session.1.000001/payload /etc/motd",
                "rm -rf /tmp/remote-session.1.000001",
            ]
        );
    }
}
