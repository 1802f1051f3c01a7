//! SSH transport: connection setup, authentication and remote commands

pub mod auth;
pub mod client;
pub mod exec;
pub mod handler;
pub mod target;

pub use client::{SshConnector, SshTransport};
pub use exec::{CommandOutput, CommandRunner, RemoteCommand, shell_quote};
pub use target::{ConnectRequest, ConnectTarget, JumpSpec, resolve_connect_target};
