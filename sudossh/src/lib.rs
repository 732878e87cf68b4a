//! # sudossh
//!
//! Async SSH sessions that run work as root through `sudo su -`.
//!
//! A [`Session`] connects to one host and can open an escalated root shell
//! on a pty, answer sudo's password prompt, install a recognisable shell
//! prompt, and then feed it a queue of [`Directive`]s: plain commands, or
//! file payloads streamed through base64 so no writable staging area is
//! needed.
//!
//! ## Features
//!
//! - Async SSH connections via russh
//! - Root shell escalation with sudo password handling
//! - Operator prompt auto-answers (`[Y/n]` and friends)
//! - Chunked file transfer through the root shell
//! - Unprivileged command execution and SFTP upload
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sudossh::{Directive, SessionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sudossh::Error> {
//!     let mut session = SessionBuilder::new("192.168.1.10")
//!         .username("deploy")
//!         .password("secret")
//!         .sudo_password("secret")
//!         .prompt(r"Do you want to continue\? \[Y/n\]", "Y")
//!         .connect()
//!         .await?;
//!
//!     let response = session.run("uname -a").await?;
//!     println!("{}", response);
//!
//!     session
//!         .sudo(vec![
//!             Directive::from("apt-get install nginx"),
//!             Directive::file("nginx.conf", "/etc/nginx/nginx.conf"),
//!             Directive::from("systemctl reload nginx"),
//!         ])
//!         .await?;
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod error;
pub mod transport;

// Re-export main types for convenience
pub use channel::{CapturedOutput, OutputSink, PromptTable, StdStreams};
pub use driver::{CommandQueue, Directive, Response, Session, SessionBuilder, TransferTask};
pub use error::Error;
pub use transport::{HostKeyVerification, SshConfig};
