use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::client::Handle;
use russh::keys::{HashAlg, PrivateKeyWithHashAlg};
use secrecy::{ExposeSecret, SecretString};

use crate::config::paths;
use crate::error::SshError;
use crate::security_log;

use super::handler::ClientHandler;

/// One authentication attempt in an ordered plan
pub enum AuthStep {
    /// Private key from disk, optionally decrypted with a passphrase
    KeyFile {
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
    Password(SecretString),
    /// Identities held by the running ssh-agent
    Agent,
    /// Default identity files found under `~/.ssh`
    DefaultKeys,
}

impl fmt::Debug for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStep::KeyFile { path, passphrase } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "[REDACTED]"))
                .finish(),
            AuthStep::Password(_) => f.debug_tuple("Password").field(&"[REDACTED]").finish(),
            AuthStep::Agent => f.write_str("Agent"),
            AuthStep::DefaultKeys => f.write_str("DefaultKeys"),
        }
    }
}

impl AuthStep {
    pub fn method_name(&self) -> &'static str {
        match self {
            AuthStep::KeyFile { .. } => "publickey",
            AuthStep::Password(_) => "password",
            AuthStep::Agent => "agent",
            AuthStep::DefaultKeys => "default-keys",
        }
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

/// Authentication order for the destination host.
///
/// `key_file` must already be known to exist on disk. A password given
/// alongside a key is first tried as that key's passphrase, then as a login
/// password. The agent and default identity files always come last.
pub fn destination_plan(password: Option<&SecretString>, key_file: Option<PathBuf>) -> Vec<AuthStep> {
    let mut plan = Vec::new();

    match (password, key_file) {
        (Some(password), Some(path)) => {
            plan.push(AuthStep::KeyFile {
                path,
                passphrase: Some(copy_secret(password)),
            });
            plan.push(AuthStep::Password(copy_secret(password)));
        }
        (Some(password), None) => plan.push(AuthStep::Password(copy_secret(password))),
        (None, Some(path)) => plan.push(AuthStep::KeyFile {
            path,
            passphrase: None,
        }),
        (None, None) => {}
    }

    plan.push(AuthStep::Agent);
    plan.push(AuthStep::DefaultKeys);
    plan
}

/// Authentication order for a jump host: its identity file, then the agent,
/// then default identity files.
pub fn jump_plan(identity_file: Option<PathBuf>) -> Vec<AuthStep> {
    let mut plan = Vec::new();
    if let Some(path) = identity_file {
        plan.push(AuthStep::KeyFile {
            path,
            passphrase: None,
        });
    }
    plan.push(AuthStep::Agent);
    plan.push(AuthStep::DefaultKeys);
    plan
}

/// Keep `path` only if it names an existing file
pub fn existing_key(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| p.is_file())
}

/// Work through `plan` until one step is accepted.
///
/// When every step fails the last failure is returned.
pub(crate) async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    host: &str,
    port: u16,
    username: &str,
    plan: Vec<AuthStep>,
) -> Result<(), SshError> {
    let mut last_error =
        SshError::AuthenticationFailed("No authentication methods available".to_string());

    for step in plan {
        let method = step.method_name();
        security_log::log_auth_attempt(host, port, username, method);

        match try_step(handle, username, &step).await {
            Ok(true) => {
                security_log::log_auth_success(host, port, username, method);
                return Ok(());
            }
            Ok(false) => {
                let reason = "Authentication rejected by server";
                security_log::log_auth_failure(host, port, username, method, reason);
                last_error = SshError::AuthenticationFailed(reason.to_string());
            }
            Err(e) => {
                security_log::log_auth_failure(host, port, username, method, &e.to_string());
                last_error = e;
            }
        }
    }

    Err(last_error)
}

async fn try_step(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    step: &AuthStep,
) -> Result<bool, SshError> {
    match step {
        AuthStep::KeyFile { path, passphrase } => {
            let passphrase = passphrase.as_ref().map(|p| p.expose_secret());
            let key = load_key_file(path, passphrase).await?;
            Ok(handle.authenticate_publickey(username, key).await?.success())
        }
        // Use expose_secret() only at the point of authentication
        AuthStep::Password(password) => Ok(handle
            .authenticate_password(username, password.expose_secret())
            .await?
            .success()),
        AuthStep::Agent => authenticate_with_agent(handle, username).await,
        AuthStep::DefaultKeys => authenticate_with_default_keys(handle, username).await,
    }
}

async fn authenticate_with_default_keys(
    handle: &mut Handle<ClientHandler>,
    username: &str,
) -> Result<bool, SshError> {
    let candidates: Vec<PathBuf> = paths::default_identity_files()
        .into_iter()
        .filter(|path| path.is_file())
        .collect();

    if candidates.is_empty() {
        return Err(SshError::KeyFile("No default SSH key found".to_string()));
    }

    for path in candidates {
        let key = match load_key_file(&path, None).await {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!(path = %path.display(), "Skipping default key: {}", e);
                continue;
            }
        };

        match handle.authenticate_publickey(username, key).await {
            Ok(result) if result.success() => return Ok(true),
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(path = %path.display(), "Default key failed: {}", e);
                continue;
            }
        }
    }

    Ok(false)
}

#[cfg(unix)]
async fn authenticate_with_agent(
    handle: &mut Handle<ClientHandler>,
    username: &str,
) -> Result<bool, SshError> {
    let agent_path = std::env::var("SSH_AUTH_SOCK").map_err(|_| {
        SshError::Agent("SSH_AUTH_SOCK not set - is ssh-agent running?".to_string())
    })?;

    let stream = tokio::net::UnixStream::connect(&agent_path)
        .await
        .map_err(|e| SshError::Agent(format!("Failed to connect to SSH agent: {}", e)))?;

    let mut agent = russh::keys::agent::client::AgentClient::connect(stream);

    let identities = agent
        .request_identities()
        .await
        .map_err(|e| SshError::Agent(format!("Failed to get identities: {}", e)))?;

    if identities.is_empty() {
        return Err(SshError::Agent(
            "No identities found in SSH agent".to_string(),
        ));
    }

    // Try each identity with SHA-512 for RSA keys
    for identity in identities {
        let hash_alg = if identity.algorithm().is_rsa() {
            Some(HashAlg::Sha512)
        } else {
            None
        };

        match handle
            .authenticate_publickey_with(username, identity, hash_alg, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(true),
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("Agent key failed: {}", e);
                continue;
            }
        }
    }

    Ok(false)
}

#[cfg(not(unix))]
async fn authenticate_with_agent(
    _handle: &mut Handle<ClientHandler>,
    _username: &str,
) -> Result<bool, SshError> {
    Err(SshError::Agent(
        "SSH agent is not supported on this platform".to_string(),
    ))
}

/// Load an SSH private key from file
pub(crate) async fn load_key_file(
    path: &Path,
    passphrase: Option<&str>,
) -> Result<PrivateKeyWithHashAlg, SshError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        SshError::KeyFile(format!("Cannot read key file {}: {}", path.display(), e))
    })?;

    // Check if this is actually a public key (common mistake)
    let first_line = content.lines().next().unwrap_or("");
    if first_line.starts_with("ssh-") || first_line.starts_with("ecdsa-") {
        return Err(SshError::KeyFile(format!(
            "File {} contains a PUBLIC key, not a private key",
            path.display()
        )));
    }

    if !first_line.starts_with("-----BEGIN") {
        return Err(SshError::KeyFile(format!(
            "File {} does not appear to be a valid SSH private key",
            path.display()
        )));
    }

    let key = russh::keys::decode_secret_key(&content, passphrase).map_err(|e| {
        let normalized = e.to_string().to_lowercase();
        let is_passphrase_error = normalized.contains("encrypted")
            || normalized.contains("passphrase")
            || normalized.contains("cryptographic");
        if is_passphrase_error {
            if passphrase.is_some() {
                SshError::KeyFilePassphraseInvalid(path.to_path_buf())
            } else {
                SshError::KeyFilePassphraseRequired(path.to_path_buf())
            }
        } else {
            SshError::KeyFile(format!("Failed to load key {}: {}", path.display(), e))
        }
    })?;

    // RSA keys sign with SHA-512; other key types use their native algorithm
    let hash_alg = if key.algorithm().is_rsa() {
        Some(HashAlg::Sha512)
    } else {
        None
    };

    Ok(PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
}
