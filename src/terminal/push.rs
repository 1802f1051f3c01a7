//! Delivery of terminal output to the client that owns the terminal

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identity of a connected push client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One chunk of terminal output addressed to a single client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalOutput {
    pub client: ClientId,
    pub data: String,
}

/// Routes terminal output to registered clients.
///
/// Output is only ever delivered to the client it is addressed to. Output
/// for a client that is not registered is dropped.
#[derive(Default)]
pub struct PushHub {
    clients: Mutex<HashMap<ClientId, mpsc::UnboundedSender<TerminalOutput>>>,
}

impl PushHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client and return its id and output stream
    pub fn register(&self) -> (ClientId, mpsc::UnboundedReceiver<TerminalOutput>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.lock().insert(id, tx);
        tracing::debug!(client = %id, "Push client registered");
        (id, rx)
    }

    pub fn unregister(&self, client: ClientId) {
        if self.clients.lock().remove(&client).is_some() {
            tracing::debug!(client = %client, "Push client unregistered");
        }
    }

    pub fn is_registered(&self, client: ClientId) -> bool {
        self.clients.lock().contains_key(&client)
    }

    /// Send `data` to `client`. Returns false if it could not be delivered.
    pub fn deliver(&self, client: ClientId, data: impl Into<String>) -> bool {
        let mut clients = self.clients.lock();
        let Some(tx) = clients.get(&client) else {
            return false;
        };

        let output = TerminalOutput {
            client,
            data: data.into(),
        };
        if tx.send(output).is_ok() {
            return true;
        }

        // Receiver is gone; forget the client
        clients.remove(&client);
        false
    }
}
