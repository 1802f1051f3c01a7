//! The single active remote session and the operations on it
//!
//! [`SessionManager`] owns one session slot shared by every caller. Connect
//! and disconnect are serialized by a lifecycle lock; everything else takes
//! a clone of the current [`Session`] and never waits on that lock.

pub mod backend;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::paths;
use crate::config::ssh_config::{self, HostProfile, NewHost, SshConfigFile};
use crate::config::Settings;
use crate::error::RemoteError;
use crate::security_log;
use crate::sftp::{FileOps, Listing, Preview, RemoteFs};
use crate::ssh::exec::{CommandOutput, CommandRunner, RemoteCommand};
use crate::ssh::{ConnectRequest, SshConnector, resolve_connect_target};
use crate::terminal::{ClientId, NOT_CONNECTED_MESSAGE, PushHub, TerminalRelay};

use backend::{Connector, Established, RemoteTransport};

/// Summary of the active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Config alias when one was used, else the hostname
    pub host_label: String,
    pub username: String,
    pub home_dir: String,
}

/// One live connection: transport, file subsystem and at most one terminal
pub struct Session<C: Connector> {
    transport: C::Transport,
    fs: C::Fs,
    terminal: Mutex<Option<TerminalRelay>>,
    info: ConnectionInfo,
}

impl<C: Connector> Session<C> {
    fn files<'a>(&'a self, settings: &'a Settings) -> FileOps<'a, C::Fs, C::Transport> {
        FileOps::new(&self.fs, &self.transport, &self.info.home_dir, &settings.files)
    }

    /// Release the terminal, the file subsystem and the transport.
    ///
    /// Each step runs even when an earlier one fails.
    async fn teardown(&self, settings: &Settings) {
        if let Some(relay) = self.terminal.lock().await.take() {
            relay.stop(settings.terminal.shutdown_grace()).await;
        }

        if let Err(e) = self.fs.close().await {
            tracing::warn!(host = %self.info.host_label, "Failed to close file subsystem: {}", e);
        }

        if let Err(e) = self.transport.close().await {
            tracing::warn!(host = %self.info.host_label, "Failed to close transport: {}", e);
        }

        security_log::log_session_closed(&self.info.host_label);
    }
}

/// Owner of the process-wide session slot
pub struct SessionManager<C: Connector = SshConnector> {
    connector: C,
    settings: Settings,
    ssh_config_path: PathBuf,
    hub: Arc<PushHub>,
    lifecycle: Mutex<()>,
    current: RwLock<Option<Arc<Session<C>>>>,
}

impl SessionManager<SshConnector> {
    /// Manager over real SSH using `~/.ssh/config`
    pub fn with_settings(settings: Settings) -> Result<Self, RemoteError> {
        let ssh_config_path = paths::ssh_config_file().ok_or_else(|| {
            RemoteError::Io("Could not determine the SSH config location".to_string())
        })?;
        let connector = SshConnector::new(&settings.ssh);
        Ok(Self::new(connector, settings, ssh_config_path))
    }
}

impl<C: Connector> SessionManager<C> {
    pub fn new(connector: C, settings: Settings, ssh_config_path: PathBuf) -> Self {
        Self {
            connector,
            settings,
            ssh_config_path,
            hub: Arc::new(PushHub::new()),
            lifecycle: Mutex::new(()),
            current: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Hub through which terminal output reaches clients
    pub fn hub(&self) -> Arc<PushHub> {
        self.hub.clone()
    }

    /// The current session, if any
    fn session(&self) -> Option<Arc<Session<C>>> {
        self.current.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.session().map(|s| s.info.clone())
    }

    fn require_session(&self) -> Result<Arc<Session<C>>, RemoteError> {
        self.session().ok_or(RemoteError::NotConnected)
    }

    /// Connect and make the result the active session.
    ///
    /// Any previous session is fully torn down first, even if the new
    /// connection then fails.
    pub async fn connect(&self, request: ConnectRequest) -> Result<ConnectionInfo, RemoteError> {
        let config = if request.config_host.trim().is_empty() {
            SshConfigFile::default()
        } else {
            SshConfigFile::load(&self.ssh_config_path)?
        };
        let target = resolve_connect_target(request, &config)?;

        let _lifecycle = self.lifecycle.lock().await;

        let previous = self.current.write().take();
        if let Some(previous) = previous {
            previous.teardown(&self.settings).await;
        }

        tracing::info!(
            "Connecting to {} ({}@{}:{})",
            target.host_label,
            target.username,
            target.hostname,
            target.port
        );
        let Established {
            transport,
            fs,
            home_dir,
        } = self.connector.connect(&target).await?;

        let via_jump = target.jump.is_some();
        let info = ConnectionInfo {
            host_label: target.host_label,
            username: target.username,
            home_dir,
        };
        security_log::log_session_installed(&info.host_label, &info.username, via_jump);

        let session = Arc::new(Session {
            transport,
            fs,
            terminal: Mutex::new(None),
            info: info.clone(),
        });
        *self.current.write() = Some(session);

        Ok(info)
    }

    /// Tear down the active session. Does nothing when not connected.
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        let previous = self.current.write().take();
        if let Some(session) = previous {
            session.teardown(&self.settings).await;
        }
    }

    /// Run a raw command string on the remote shell.
    ///
    /// The command is passed through as is. Callers interpolating paths or
    /// names must quote them first, see [`crate::ssh::shell_quote`].
    pub async fn exec(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let session = self.require_session()?;
        Ok(session.transport.run(command).await?)
    }

    /// Run a command whose arguments are quoted individually
    pub async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput, RemoteError> {
        self.exec(&command.to_string()).await
    }

    pub async fn list(&self, path: Option<&str>) -> Result<Listing, RemoteError> {
        let session = self.require_session()?;
        session.files(&self.settings).list(path).await
    }

    pub async fn rename(&self, src: &str, dest: &str) -> Result<(), RemoteError> {
        let session = self.require_session()?;
        session.files(&self.settings).rename(src, dest).await
    }

    pub async fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        let session = self.require_session()?;
        session.files(&self.settings).mkdir(path).await
    }

    pub async fn chmod(&self, path: &str, mode: u32) -> Result<String, RemoteError> {
        let session = self.require_session()?;
        session.files(&self.settings).chmod(path, mode).await
    }

    pub async fn remove(&self, path: &str, is_dir: bool) -> Result<(), RemoteError> {
        let session = self.require_session()?;
        session.files(&self.settings).remove(path, is_dir).await
    }

    pub async fn preview(&self, path: &str) -> Result<Preview, RemoteError> {
        let session = self.require_session()?;
        session.files(&self.settings).preview(path).await
    }

    pub async fn dir_sizes(
        &self,
        base: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, u64>, RemoteError> {
        let session = self.require_session()?;
        Ok(session.files(&self.settings).dir_sizes(base, names).await)
    }

    /// Open an interactive shell for `client`, replacing any running one.
    ///
    /// Failures are also written into the client's terminal stream.
    pub async fn start_terminal(
        &self,
        client: ClientId,
        cols: u32,
        rows: u32,
    ) -> Result<(), RemoteError> {
        let Some(session) = self.session() else {
            self.hub.deliver(client, NOT_CONNECTED_MESSAGE);
            return Err(RemoteError::NotConnected);
        };

        let cols = if cols == 0 { self.settings.terminal.default_cols } else { cols };
        let rows = if rows == 0 { self.settings.terminal.default_rows } else { rows };

        let mut terminal = session.terminal.lock().await;
        if let Some(previous) = terminal.take() {
            previous.stop(self.settings.terminal.shutdown_grace()).await;
        }

        let channel = match session.transport.open_pty(cols, rows).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!("Failed to start terminal: {}", e);
                self.hub
                    .deliver(client, format!("\r\nFailed to start terminal: {}\r\n", e));
                return Err(e.into());
            }
        };

        tracing::info!(client = %client, "Terminal started ({}x{})", cols, rows);
        *terminal = Some(TerminalRelay::spawn(
            channel,
            client,
            self.hub.clone(),
            self.settings.terminal.read_chunk_bytes,
        ));
        Ok(())
    }

    /// Send keystrokes to the running terminal. A no-op without one.
    pub async fn terminal_send(&self, data: &[u8]) {
        let Some(session) = self.session() else {
            return;
        };
        let input = session.terminal.lock().await.as_ref().map(TerminalRelay::input);
        if let Some(input) = input {
            input.send(data).await;
        }
    }

    /// Resize the running terminal. A no-op without one.
    pub async fn terminal_resize(&self, cols: u32, rows: u32) {
        let Some(session) = self.session() else {
            return;
        };
        let input = session.terminal.lock().await.as_ref().map(TerminalRelay::input);
        if let Some(input) = input {
            input.resize(cols, rows).await;
        }
    }

    /// Stop the running terminal, if any
    pub async fn stop_terminal(&self) {
        let Some(session) = self.session() else {
            return;
        };
        let relay = session.terminal.lock().await.take();
        if let Some(relay) = relay {
            relay.stop(self.settings.terminal.shutdown_grace()).await;
        }
    }

    /// Host profiles from the SSH config and the default user name
    pub fn list_profiles(&self) -> Result<(Vec<HostProfile>, String), RemoteError> {
        Ok(ssh_config::list_profiles(&self.ssh_config_path)?)
    }

    /// Append a host block to the SSH config
    pub fn save_host(&self, host: &NewHost) -> Result<(), RemoteError> {
        ssh_config::save_host(&self.ssh_config_path, host)?;
        tracing::info!("Saved host '{}' to {}", host.alias, self.ssh_config_path.display());
        Ok(())
    }
}
