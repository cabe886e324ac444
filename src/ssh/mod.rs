// ABOUTME: SSH sessions used to reach a container runtime on another host.
// ABOUTME: Agent or key-file auth, known_hosts checks, Unix socket forwarding.

mod auth;
mod config;
mod error;
mod forward;
mod session;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use forward::Forwarder;
pub use session::{CommandOutput, Session};
