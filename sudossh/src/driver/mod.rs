//! Session layer: the caller-facing API and the escalation core behind it.
//!
//! [`Session`] owns the connection. [`Session::sudo`] opens a pty shell,
//! escalates it with `sudo su -` and hands the channel to [`Escalation`],
//! which drains a [`CommandQueue`] of [`Directive`]s through the root shell.

mod builder;
pub mod escalation;
mod queue;
mod response;
mod session;
pub mod transfer;

pub use builder::SessionBuilder;
pub use escalation::{Action, Escalation, EscalationState};
pub use queue::{CommandQueue, Directive};
pub use response::Response;
pub use session::Session;
pub use transfer::TransferTask;
