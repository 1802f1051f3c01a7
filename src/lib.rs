//! Ferry: a remote file browser and interactive shell over SSH
//!
//! The library drives one active session at a time: connection setup
//! through an optional jump host, file operations over SFTP, buffered
//! remote commands and a pty relay that pushes output to one client.

pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod sftp;
pub mod ssh;
pub mod terminal;

pub(crate) mod security_log;

pub use error::{ConnectError, RemoteError};
pub use session::{ConnectionInfo, SessionManager};
