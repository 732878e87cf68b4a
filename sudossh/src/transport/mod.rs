//! SSH transport layer wrapping russh.
//!
//! Connection setup, authentication, host key checks, and the plain exec
//! and SFTP channels behind `Session::run` and `Session::put`.

pub mod config;
mod ssh;

pub use config::{Credentials, HostKeyVerification, PrivateKey, SshConfig};
pub use ssh::SshTransport;
