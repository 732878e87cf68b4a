//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, trace, warn};
use russh::client::{self, Handle};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use secrecy::ExposeSecret;
use tokio::io::AsyncWriteExt;

use super::config::{HostKeyVerification, SshConfig};
use crate::channel::SshChannel;
use crate::error::{Result, TransportError};

/// SSH transport wrapping a russh client connection.
///
/// One connection multiplexes every channel a session opens: plain exec
/// channels for `run`, SFTP channels for `put`, and the escalation channel.
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<SshHandler>,

    terminal_width: u32,
    terminal_height: u32,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    pub async fn connect(config: &SshConfig) -> Result<Self> {
        let ssh_config = Arc::new(client::Config::default());

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("connecting to {}", config.socket_addr());

        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| {
            // Prefer the detailed host key error over russh's generic UnknownKey.
            let stored = host_key_error.lock().ok().and_then(|mut slot| slot.take());
            stored.unwrap_or(TransportError::Ssh(e))
        })?;

        Self::authenticate(&mut session, config).await?;

        Ok(Self {
            session,
            terminal_width: config.terminal_width,
            terminal_height: config.terminal_height,
        })
    }

    /// Open a bare session channel for the escalation state machine.
    ///
    /// No pty or exec request is made here; the state machine issues both so
    /// that it can observe the server's replies.
    pub async fn open_shell_channel(&self) -> Result<SshChannel> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        Ok(SshChannel::new(
            channel,
            self.terminal_width,
            self.terminal_height,
        ))
    }

    /// Run one command on a plain exec channel (no pty, no escalation).
    ///
    /// Returns the combined stdout/stderr output and the exit status, if the
    /// server reported one.
    pub async fn exec(&self, command: &str) -> Result<(Vec<u8>, Option<u32>)> {
        let mut channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .exec(true, command)
            .await
            .map_err(TransportError::Ssh)?;

        let mut output = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, .. } => output.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                ChannelMsg::Close => break,
                other => trace!("exec: ignoring {:?}", other),
            }
        }

        Ok((output, exit_status))
    }

    /// Write `content` to `remote_path` over SFTP in one shot.
    pub async fn write_file(&self, remote_path: &str, content: &[u8]) -> Result<()> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(TransportError::Ssh)?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| TransportError::Sftp(e.to_string()))?;

        let mut file = sftp
            .create(remote_path)
            .await
            .map_err(|e| TransportError::Sftp(e.to_string()))?;
        file.write_all(content).await.map_err(TransportError::Io)?;
        file.shutdown().await.map_err(TransportError::Io)?;

        sftp.close()
            .await
            .map_err(|e| TransportError::Sftp(e.to_string()))?;

        debug!("wrote {} bytes to {} over sftp", content.len(), remote_path);
        Ok(())
    }

    /// Authenticate with the server.
    async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
        let credentials = &config.credentials;

        if let Some(key) = &credentials.private_key {
            let passphrase = key.passphrase.as_ref().map(|p| p.expose_secret());
            let secret = load_secret_key(&key.path, passphrase)
                .map_err(|e| TransportError::Key(e.to_string()))?;

            // Get the best RSA hash algorithm supported by the server
            let hash_alg = session
                .best_supported_rsa_hash()
                .await
                .map_err(TransportError::Ssh)?
                .flatten();

            let accepted = session
                .authenticate_publickey(
                    &config.username,
                    PrivateKeyWithHashAlg::new(Arc::new(secret), hash_alg),
                )
                .await
                .map_err(TransportError::Ssh)?
                .success();

            if accepted {
                return Ok(());
            }
            debug!("key {} refused for {}", key.path.display(), config.username);
        }

        let accepted = match &credentials.password {
            Some(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            None if credentials.private_key.is_none() => session
                .authenticate_none(&config.username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            None => false,
        };

        if !accepted {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Detailed host key error for connect() to surface.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// `Ok(false)` means the host is not listed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = match &self.known_hosts_path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, pubkey),
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = match &self.known_hosts_path {
            Some(path) => {
                russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
            }
            None => russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey),
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let strict = match self.host_key_verification {
            HostKeyVerification::Disabled => return Ok(true),
            HostKeyVerification::AcceptNew => false,
            HostKeyVerification::Strict => true,
        };

        match self.check_known_hosts(server_public_key) {
            Ok(true) => Ok(true),
            Ok(false) if strict => Ok(self.reject(TransportError::HostKeyUnknown {
                host: self.host.clone(),
                port: self.port,
            })),
            Ok(false) => {
                if let Err(e) = self.learn_host_key(server_public_key) {
                    warn!("Failed to save host key: {}", e);
                }
                Ok(true)
            }
            Err(e) => Ok(self.reject(e)),
        }
    }
}
