//! Security event logging for audit trails.
//!
//! Structured logging functions for security-relevant events such as
//! authentication attempts, host keys trusted without verification, and
//! session setup and teardown.
//!
//! All security events are logged with `target: "security"` to allow filtering
//! in production environments.
//!
//! # Example
//!
//! Filter security events only:
//! ```bash
//! RUST_LOG=security=info ferry
//! ```

use tracing::{info, warn};

/// Log an SSH authentication attempt.
///
/// Called before attempting to authenticate with a remote host.
pub fn log_auth_attempt(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_attempt",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication attempt"
    );
}

/// Log a successful SSH authentication.
pub fn log_auth_success(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_success",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication succeeded"
    );
}

/// Log a failed SSH authentication attempt.
pub fn log_auth_failure(host: &str, port: u16, username: &str, method: &str, reason: &str) {
    warn!(
        target: "security",
        event = "auth_failure",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        reason = %reason,
        "SSH authentication failed"
    );
}

/// Log a server host key that was trusted without verification.
///
/// Unknown host keys are always accepted, so every acceptance is a warning.
pub fn log_host_key_auto_accepted(host: &str, port: u16, fingerprint: &str, key_type: &str) {
    warn!(
        target: "security",
        event = "host_key_auto_accepted",
        host = %host,
        port = port,
        fingerprint = %fingerprint,
        key_type = %key_type,
        "Host key accepted without verification"
    );
}

/// Log an SFTP subsystem establishment.
pub fn log_sftp_connect(host: &str, port: u16, username: &str) {
    info!(
        target: "security",
        event = "sftp_connect",
        host = %host,
        port = port,
        username = %username,
        "SFTP subsystem established"
    );
}

/// Log a session becoming the active session.
pub fn log_session_installed(host_label: &str, username: &str, via_jump: bool) {
    info!(
        target: "security",
        event = "session_installed",
        host = %host_label,
        username = %username,
        via_jump = via_jump,
        "Remote session established"
    );
}

/// Log a session being torn down.
pub fn log_session_closed(host_label: &str) {
    info!(
        target: "security",
        event = "session_closed",
        host = %host_label,
        "Remote session closed"
    );
}
