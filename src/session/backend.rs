//! Transport seams the session manager is generic over

use std::future::Future;

use crate::error::{ConnectError, SshError};
use crate::sftp::RemoteFs;
use crate::ssh::exec::CommandRunner;
use crate::ssh::target::ConnectTarget;
use crate::terminal::PtyChannel;

/// An authenticated transport to the destination host
pub trait RemoteTransport: CommandRunner + 'static {
    type Pty: PtyChannel;

    /// Open an interactive shell on a pty of the given size
    fn open_pty(
        &self,
        cols: u32,
        rows: u32,
    ) -> impl Future<Output = Result<Self::Pty, SshError>> + Send;

    /// Close the transport and any jump transport underneath it
    fn close(&self) -> impl Future<Output = Result<(), SshError>> + Send;
}

/// Everything a successful connect hands over to the session
#[derive(Debug)]
pub struct Established<T, F> {
    pub transport: T,
    pub fs: F,
    pub home_dir: String,
}

/// Builds sessions from resolved targets.
///
/// On error nothing opened during the attempt may still be alive.
pub trait Connector: Send + Sync + 'static {
    type Transport: RemoteTransport;
    type Fs: RemoteFs + 'static;

    fn connect(
        &self,
        target: &ConnectTarget,
    ) -> impl Future<Output = Result<Established<Self::Transport, Self::Fs>, ConnectError>> + Send;
}
