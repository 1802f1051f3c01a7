//! Resolution of connect requests into concrete targets

use std::fmt;
use std::path::PathBuf;

use secrecy::SecretString;

use crate::config::SshConfigFile;
use crate::config::paths::{current_user, expand_tilde};
use crate::config::ssh_config::DEFAULT_SSH_PORT;
use crate::error::RemoteError;

/// Parameters of a connect call.
///
/// Empty strings and `None` mean "not given". When `config_host` names an
/// SSH config alias, its options fill in everything not given explicitly.
#[derive(Default)]
pub struct ConnectRequest {
    pub hostname: String,
    pub username: String,
    pub password: Option<SecretString>,
    pub port: Option<u16>,
    pub key_file: String,
    pub config_host: String,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("port", &self.port)
            .field("key_file", &self.key_file)
            .field("config_host", &self.config_host)
            .finish()
    }
}

impl ConnectRequest {
    /// Connect through an SSH config alias
    pub fn alias(alias: impl Into<String>) -> Self {
        Self {
            config_host: alias.into(),
            ..Self::default()
        }
    }

    /// Connect to an explicit host
    pub fn direct(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_key_file(mut self, key_file: impl Into<String>) -> Self {
        self.key_file = key_file.into();
        self
    }
}

/// Jump host to tunnel through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpSpec {
    pub hostname: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
}

/// Fully resolved destination of a connect call
pub struct ConnectTarget {
    /// Alias when connecting through the SSH config, else the hostname
    pub host_label: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: Option<SecretString>,
    pub key_file: Option<PathBuf>,
    pub jump: Option<JumpSpec>,
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("host_label", &self.host_label)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("key_file", &self.key_file)
            .field("jump", &self.jump)
            .finish()
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Merge a request with the SSH config.
///
/// Explicit user, port and key file always win over the alias's options.
pub fn resolve_connect_target(
    request: ConnectRequest,
    config: &SshConfigFile,
) -> Result<ConnectTarget, RemoteError> {
    let explicit_key = non_empty(&request.key_file).map(|k| expand_tilde(&k));

    let Some(alias) = non_empty(&request.config_host) else {
        let hostname = non_empty(&request.hostname)
            .ok_or_else(|| RemoteError::InvalidArgument("hostname is required".to_string()))?;
        return Ok(ConnectTarget {
            host_label: hostname.clone(),
            hostname,
            port: request.port.unwrap_or(DEFAULT_SSH_PORT),
            username: non_empty(&request.username).unwrap_or_else(current_user),
            password: request.password,
            key_file: explicit_key,
            jump: None,
        });
    };

    let opts = config.lookup(&alias);
    let jump = opts
        .proxy_jump
        .as_deref()
        .and_then(first_hop)
        .map(|hop| resolve_jump(&hop, config));

    Ok(ConnectTarget {
        // The alias decides where to connect; a request hostname only fills
        // in for an alias without HostName.
        hostname: opts
            .hostname
            .or_else(|| non_empty(&request.hostname))
            .unwrap_or_else(|| alias.clone()),
        port: request.port.or(opts.port).unwrap_or(DEFAULT_SSH_PORT),
        username: non_empty(&request.username)
            .or(opts.user)
            .unwrap_or_else(current_user),
        password: request.password,
        key_file: explicit_key.or_else(|| opts.identity_files.into_iter().next()),
        jump,
        host_label: alias,
    })
}

/// A single `[user@]host[:port]` hop
#[derive(Debug, Clone, PartialEq, Eq)]
struct Hop {
    user: Option<String>,
    host: String,
    port: Option<u16>,
}

/// First entry of a `ProxyJump` chain
fn first_hop(proxy_jump: &str) -> Option<Hop> {
    let raw = proxy_jump.split(',').next()?.trim();
    let raw = raw.strip_prefix("ssh://").unwrap_or(raw);
    if raw.is_empty() {
        return None;
    }

    let (user, rest) = match raw.rsplit_once('@') {
        Some((user, rest)) => (non_empty(user), rest),
        None => (None, raw),
    };

    let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
        match bracketed.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':').and_then(|p| p.parse().ok())),
            None => (rest, None),
        }
    } else {
        match rest.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => match port.parse::<u16>() {
                Ok(port) => (host, Some(port)),
                Err(_) => (rest, None),
            },
            _ => (rest, None),
        }
    };

    Some(Hop {
        user,
        host: non_empty(host)?,
        port,
    })
}

fn resolve_jump(hop: &Hop, config: &SshConfigFile) -> JumpSpec {
    let opts = config.lookup(&hop.host);
    JumpSpec {
        hostname: opts.hostname.unwrap_or_else(|| hop.host.clone()),
        port: hop.port.or(opts.port).unwrap_or(DEFAULT_SSH_PORT),
        user: hop.user.clone().or(opts.user).unwrap_or_else(current_user),
        identity_file: opts.identity_files.into_iter().next(),
    }
}
