//! Interactive terminal relay

pub mod decoder;
pub mod push;
pub mod relay;

pub use decoder::Utf8Decoder;
pub use push::{ClientId, PushHub, TerminalOutput};
pub use relay::{PtyChannel, PtyEvent, RelayInput, TerminalRelay};

/// Pushed when a terminal is requested without a session
pub const NOT_CONNECTED_MESSAGE: &str = "\r\nNot connected to SSH server.\r\n";
