//! Background relay between a remote pseudo-terminal and one push client

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::error::SshError;

use super::decoder::Utf8Decoder;
use super::push::{ClientId, PushHub};

/// Something read from a pseudo-terminal channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyEvent {
    Output(Vec<u8>),
    /// The remote side closed the channel
    Closed,
}

/// An interactive shell channel backed by a remote pty
pub trait PtyChannel: Send + 'static {
    /// Wait for the next output chunk or for the channel to close.
    ///
    /// Must be cancel-safe: the relay drops this future whenever client
    /// input arrives first.
    fn next_event(&mut self) -> impl Future<Output = Result<PtyEvent, SshError>> + Send;

    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<(), SshError>> + Send;

    fn resize(&mut self, cols: u32, rows: u32) -> impl Future<Output = Result<(), SshError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), SshError>> + Send;
}

impl PtyChannel for Channel<Msg> {
    async fn next_event(&mut self) -> Result<PtyEvent, SshError> {
        loop {
            match self.wait().await {
                Some(ChannelMsg::Data { data }) => return Ok(PtyEvent::Output(data.to_vec())),
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    return Ok(PtyEvent::Output(data.to_vec()));
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    tracing::debug!("Shell exit status: {}", exit_status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Ok(PtyEvent::Closed);
                }
                Some(_) => {}
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SshError> {
        self.data(data)
            .await
            .map_err(|e| SshError::Channel(format!("Failed to send data: {}", e)))
    }

    async fn resize(&mut self, cols: u32, rows: u32) -> Result<(), SshError> {
        self.window_change(cols, rows, 0, 0)
            .await
            .map_err(|e| SshError::Channel(format!("Failed to send window change: {}", e)))
    }

    async fn close(&mut self) -> Result<(), SshError> {
        Channel::close(self)
            .await
            .map_err(|e| SshError::Channel(format!("Failed to close channel: {}", e)))
    }
}

/// Commands that can be sent to the relay task
#[derive(Debug)]
enum RelayCommand {
    Input(Vec<u8>),
    Resize { cols: u32, rows: u32 },
}

/// Sending half of a relay. Cheap to clone, so callers can forward input
/// without holding whatever lock guards the relay itself.
#[derive(Debug, Clone)]
pub struct RelayInput {
    command_tx: mpsc::Sender<RelayCommand>,
    closed: Arc<AtomicBool>,
}

impl RelayInput {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Forward keystrokes verbatim. A no-op once the relay has ended.
    pub async fn send(&self, data: &[u8]) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.command_tx.send(RelayCommand::Input(data.to_vec())).await {
            tracing::debug!("Terminal input dropped: {}", e);
        }
    }

    /// Forward a window size change. A no-op once the relay has ended.
    pub async fn resize(&self, cols: u32, rows: u32) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self
            .command_tx
            .send(RelayCommand::Resize { cols, rows })
            .await
        {
            tracing::debug!("Terminal resize dropped: {}", e);
        }
    }
}

/// A running relay. The task owns the channel exclusively.
pub struct TerminalRelay {
    client: ClientId,
    input: RelayInput,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for TerminalRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalRelay")
            .field("client", &self.client)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl TerminalRelay {
    /// Spawn the relay task for `channel`, pushing output to `client`
    pub fn spawn<P: PtyChannel>(
        channel: P,
        client: ClientId,
        hub: Arc<PushHub>,
        chunk_size: usize,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(256);
        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let task = tokio::spawn(run_relay(
            channel,
            command_rx,
            closed.clone(),
            shutdown.clone(),
            client,
            hub,
            chunk_size.max(1),
        ));

        Self {
            client,
            input: RelayInput { command_tx, closed },
            shutdown,
            task,
        }
    }

    fn is_closed(&self) -> bool {
        self.input.is_closed()
    }

    pub fn input(&self) -> RelayInput {
        self.input.clone()
    }

    /// Stop the relay and wait for it to release the channel.
    ///
    /// Outstanding [`RelayInput`] clones do not keep the relay alive. A relay
    /// that has not finished within `grace` is aborted.
    pub async fn stop(self, grace: Duration) {
        self.input.closed.store(true, Ordering::Release);
        self.shutdown.notify_one();
        drop(self.input);

        let mut task = self.task;
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            tracing::warn!(client = %self.client, "Terminal relay did not stop in time, aborting");
            task.abort();
        }
    }
}

async fn run_relay<P: PtyChannel>(
    mut channel: P,
    mut command_rx: mpsc::Receiver<RelayCommand>,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    client: ClientId,
    hub: Arc<PushHub>,
    chunk_size: usize,
) {
    let mut decoder = Utf8Decoder::new();

    loop {
        if closed.load(Ordering::Acquire) {
            break;
        }

        tokio::select! {
            _ = shutdown.notified() => break,
            event = channel.next_event() => {
                match event {
                    Ok(PtyEvent::Output(bytes)) => {
                        for chunk in bytes.chunks(chunk_size) {
                            let text = decoder.decode(chunk);
                            if !text.is_empty() {
                                hub.deliver(client, text);
                            }
                        }
                    }
                    Ok(PtyEvent::Closed) => break,
                    Err(e) => {
                        tracing::warn!(client = %client, "Terminal channel failed: {}", e);
                        hub.deliver(client, format!("\r\nConnection lost: {}\r\n", e));
                        break;
                    }
                }
            }
            command = command_rx.recv() => {
                match command {
                    // A peer that stops reading must not block a stop
                    Some(RelayCommand::Input(data)) => {
                        tokio::select! {
                            _ = shutdown.notified() => break,
                            written = channel.write(&data) => {
                                if let Err(e) = written {
                                    tracing::debug!("Failed to write terminal input: {}", e);
                                }
                            }
                        }
                    }
                    Some(RelayCommand::Resize { cols, rows }) => {
                        if let Err(e) = channel.resize(cols, rows).await {
                            tracing::debug!("Failed to resize terminal: {}", e);
                        }
                    }
                    // Every sender dropped
                    None => break,
                }
            }
        }
    }

    closed.store(true, Ordering::Release);

    let tail = decoder.finish();
    if !tail.is_empty() {
        hub.deliver(client, tail);
    }

    if let Err(e) = channel.close().await {
        tracing::debug!("Terminal channel close failed: {}", e);
    }
    tracing::debug!(client = %client, "Terminal relay finished");
}
