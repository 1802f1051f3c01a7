use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, Disconnect};
use russh_sftp::client::SftpSession as RusshSftpSession;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::SshSettings;
use crate::error::{ConnectError, ConnectStage, SshError};
use crate::security_log;
use crate::session::backend::{Connector, Established, RemoteTransport};
use crate::sftp::{RemoteFs, SftpFs};

use super::auth::{self, destination_plan, existing_key, jump_plan};
use super::exec::{CommandOutput, CommandRunner, exec_on_handle};
use super::handler::ClientHandler;
use super::target::{ConnectTarget, JumpSpec};

/// Opens authenticated sessions, optionally through one jump host
pub struct SshConnector {
    config: Arc<Config>,
    connect_timeout: Duration,
    terminal_type: String,
}

impl SshConnector {
    pub fn new(settings: &SshSettings) -> Self {
        let config = Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            keepalive_interval: settings.keepalive_interval(),
            keepalive_max: 3,
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
            connect_timeout: settings.connect_timeout(),
            terminal_type: settings.terminal_type.clone(),
        }
    }

    async fn open_tcp(&self, host: &str, port: u16) -> Result<TcpStream, SshError> {
        let addr = format!("{}:{}", host, port);
        timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| SshError::Timeout(addr.clone()))?
            .map_err(|e| SshError::ConnectionFailed {
                host: host.to_string(),
                port,
                reason: e.to_string(),
            })
    }

    /// Run the SSH handshake over an already connected byte stream
    async fn handshake<S>(
        &self,
        stream: S,
        host: &str,
        port: u16,
    ) -> Result<Handle<ClientHandler>, SshError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let handler = ClientHandler::new(host, port);
        timeout(
            self.connect_timeout,
            client::connect_stream(self.config.clone(), stream, handler),
        )
        .await
        .map_err(|_| SshError::Timeout(format!("{}:{}", host, port)))?
        .map_err(|e| SshError::ConnectionFailed {
            host: host.to_string(),
            port,
            reason: e.to_string(),
        })
    }

    async fn open_jump(&self, spec: &JumpSpec) -> Result<Handle<ClientHandler>, SshError> {
        let stream = self.open_tcp(&spec.hostname, spec.port).await?;
        let mut handle = self.handshake(stream, &spec.hostname, spec.port).await?;

        let plan = jump_plan(existing_key(spec.identity_file.clone()));
        let authenticated = timeout(
            self.connect_timeout,
            auth::authenticate(&mut handle, &spec.hostname, spec.port, &spec.user, plan),
        )
        .await
        .map_err(|_| SshError::Timeout(format!("{}:{}", spec.hostname, spec.port)))
        .and_then(|result| result);

        if let Err(e) = authenticated {
            disconnect(&handle, "jump host").await;
            return Err(e);
        }

        tracing::info!("Jump host {}:{} ready", spec.hostname, spec.port);
        Ok(handle)
    }

    /// Handshake with the destination, directly or through the jump host
    async fn open_primary(
        &self,
        target: &ConnectTarget,
        jump: Option<&Handle<ClientHandler>>,
    ) -> Result<Handle<ClientHandler>, ConnectError> {
        match jump {
            Some(jump) => {
                let channel = jump
                    .channel_open_direct_tcpip(
                        target.hostname.clone(),
                        u32::from(target.port),
                        "127.0.0.1",
                        0,
                    )
                    .await
                    .map_err(|e| {
                        ConnectError::new(
                            ConnectStage::Tunnel,
                            SshError::Channel(format!(
                                "Failed to open tunnel to {}:{}: {}",
                                target.hostname, target.port, e
                            )),
                        )
                    })?;

                self.handshake(channel.into_stream(), &target.hostname, target.port)
                    .await
                    .map_err(|e| ConnectError::new(ConnectStage::Transport, e))
            }
            None => {
                let stream = self
                    .open_tcp(&target.hostname, target.port)
                    .await
                    .map_err(|e| ConnectError::new(ConnectStage::Transport, e))?;

                self.handshake(stream, &target.hostname, target.port)
                    .await
                    .map_err(|e| ConnectError::new(ConnectStage::Transport, e))
            }
        }
    }

    /// Authenticate, open the file subsystem and find the home directory.
    ///
    /// The caller disconnects `handle` when this fails.
    async fn establish(
        &self,
        handle: &mut Handle<ClientHandler>,
        target: &ConnectTarget,
    ) -> Result<(SftpFs, String), ConnectError> {
        let plan = destination_plan(target.password.as_ref(), existing_key(target.key_file.clone()));
        timeout(
            self.connect_timeout,
            auth::authenticate(handle, &target.hostname, target.port, &target.username, plan),
        )
        .await
        .map_err(|_| SshError::Timeout(format!("{}:{}", target.hostname, target.port)))
        .and_then(|result| result)
        .map_err(|e| ConnectError::new(ConnectStage::Authentication, e))?;

        let fs = open_sftp(handle)
            .await
            .map_err(|e| ConnectError::new(ConnectStage::FileSubsystem, e))?;
        security_log::log_sftp_connect(&target.hostname, target.port, &target.username);

        match home_dir(handle, &fs).await {
            Ok(home) => Ok((fs, home)),
            Err(e) => {
                if let Err(close_err) = fs.close().await {
                    tracing::debug!("Failed to close SFTP session: {}", close_err);
                }
                Err(ConnectError::new(ConnectStage::HomeDirectory, e))
            }
        }
    }
}

impl Connector for SshConnector {
    type Transport = SshTransport;
    type Fs = SftpFs;

    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Established<SshTransport, SftpFs>, ConnectError> {
        let jump = match &target.jump {
            Some(spec) => Some(
                self.open_jump(spec)
                    .await
                    .map_err(|e| ConnectError::new(ConnectStage::JumpHost, e))?,
            ),
            None => None,
        };

        let mut handle = match self.open_primary(target, jump.as_ref()).await {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(jump) = &jump {
                    disconnect(jump, "jump host").await;
                }
                return Err(e);
            }
        };

        match self.establish(&mut handle, target).await {
            Ok((fs, home_dir)) => Ok(Established {
                transport: SshTransport {
                    handle,
                    jump,
                    terminal_type: self.terminal_type.clone(),
                },
                fs,
                home_dir,
            }),
            Err(e) => {
                tracing::warn!("Connection to {} failed: {}", target.host_label, e);
                disconnect(&handle, "destination").await;
                if let Some(jump) = &jump {
                    disconnect(jump, "jump host").await;
                }
                Err(e)
            }
        }
    }
}

async fn open_sftp(handle: &Handle<ClientHandler>) -> Result<SftpFs, SshError> {
    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| SshError::Channel(format!("Failed to open channel: {}", e)))?;

    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| SshError::Channel(format!("Failed to request SFTP subsystem: {}", e)))?;

    let sftp = RusshSftpSession::new(channel.into_stream())
        .await
        .map_err(|e| SshError::Channel(format!("Failed to initialize SFTP session: {}", e)))?;

    Ok(SftpFs::new(sftp))
}

/// `$HOME` of the remote user, else the canonical `.`, else `/`
async fn home_dir(handle: &Handle<ClientHandler>, fs: &SftpFs) -> Result<String, SshError> {
    let output = exec_on_handle(handle, "echo $HOME").await?;
    if !output.stdout.is_empty() {
        return Ok(output.stdout);
    }

    match fs.canonicalize(".").await {
        Ok(path) if !path.is_empty() => Ok(path),
        Ok(_) => Ok("/".to_string()),
        Err(e) => {
            tracing::debug!("Could not resolve home directory: {}", e);
            Ok("/".to_string())
        }
    }
}

async fn disconnect(handle: &Handle<ClientHandler>, what: &str) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "", "en")
        .await
    {
        tracing::debug!("Failed to disconnect {}: {}", what, e);
    }
}

/// Authenticated connection to the destination host
pub struct SshTransport {
    handle: Handle<ClientHandler>,
    jump: Option<Handle<ClientHandler>>,
    terminal_type: String,
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("handle", &"<handle>")
            .field("via_jump", &self.jump.is_some())
            .field("terminal_type", &self.terminal_type)
            .finish()
    }
}

impl CommandRunner for SshTransport {
    async fn run(&self, command: &str) -> Result<CommandOutput, SshError> {
        exec_on_handle(&self.handle, command).await
    }
}

impl RemoteTransport for SshTransport {
    type Pty = Channel<Msg>;

    async fn open_pty(&self, cols: u32, rows: u32) -> Result<Channel<Msg>, SshError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(format!("Failed to open channel: {}", e)))?;

        channel
            .request_pty(false, &self.terminal_type, cols, rows, 0, 0, &[])
            .await
            .map_err(|e| SshError::Channel(format!("PTY request failed: {}", e)))?;

        channel
            .request_shell(false)
            .await
            .map_err(|e| SshError::Channel(format!("Shell request failed: {}", e)))?;

        Ok(channel)
    }

    async fn close(&self) -> Result<(), SshError> {
        let primary = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;

        if let Some(jump) = &self.jump {
            disconnect(jump, "jump host").await;
        }

        primary.map_err(SshError::from)
    }
}
