use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Host '{0}' already exists")]
    DuplicateAlias(String),

    #[error("Invalid host entry: {0}")]
    InvalidHost(String),

    #[error("Failed to create config directory: {0}")]
    CreateDir(std::io::Error),
}

/// SSH transport errors
#[derive(Error, Debug)]
pub enum SshError {
    #[error("Connection failed to {host}:{port}: {reason}")]
    ConnectionFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Key file error: {0}")]
    KeyFile(String),

    #[error("Key file {0} is encrypted and needs a passphrase")]
    KeyFilePassphraseRequired(PathBuf),

    #[error("Wrong passphrase for key file {0}")]
    KeyFilePassphraseInvalid(PathBuf),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Timeout connecting to {0}")]
    Timeout(String),

    #[error("SSH agent error: {0}")]
    Agent(String),

    #[error("russh error: {0}")]
    Russh(String),
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::Russh(err.to_string())
    }
}

/// Setup step of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    JumpHost,
    Tunnel,
    Transport,
    Authentication,
    FileSubsystem,
    HomeDirectory,
}

impl fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectStage::JumpHost => "jump host",
            ConnectStage::Tunnel => "tunnel through jump host",
            ConnectStage::Transport => "transport",
            ConnectStage::Authentication => "authentication",
            ConnectStage::FileSubsystem => "file subsystem",
            ConnectStage::HomeDirectory => "home directory lookup",
        };
        f.write_str(name)
    }
}

/// A failed connection attempt, tagged with the step that failed.
///
/// Every resource opened before the failing step has already been released
/// by the time this error is returned.
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct ConnectError {
    pub stage: ConnectStage,
    pub source: SshError,
}

impl ConnectError {
    pub fn new(stage: ConnectStage, source: SshError) -> Self {
        Self { stage, source }
    }
}

/// Errors reported by session operations
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Host '{0}' already exists")]
    DuplicateAlias(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl RemoteError {
    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::NotConnected => "not_connected",
            RemoteError::Connect(_) => "connect_error",
            RemoteError::PermissionDenied(_) => "permission_denied",
            RemoteError::NotFound(_) => "not_found",
            RemoteError::DuplicateAlias(_) => "duplicate_alias",
            RemoteError::Timeout(_) => "timeout",
            RemoteError::InvalidArgument(_) => "invalid_argument",
            RemoteError::Io(_) => "io_error",
        }
    }
}

impl From<ConfigError> for RemoteError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::DuplicateAlias(alias) => RemoteError::DuplicateAlias(alias),
            ConfigError::InvalidHost(reason) => RemoteError::InvalidArgument(reason),
            other => RemoteError::Io(other.to_string()),
        }
    }
}

impl From<SshError> for RemoteError {
    fn from(err: SshError) -> Self {
        match err {
            SshError::Timeout(what) => RemoteError::Timeout(what),
            other => RemoteError::Io(other.to_string()),
        }
    }
}
