use std::future::Future;

use russh::ChannelId;
use russh::client::{Handler, Session};
use russh::keys::{HashAlg, PublicKey};

use crate::error::SshError;
use crate::security_log;

/// SSH client handler.
///
/// Unknown and changed host keys are accepted without verification. Every
/// acceptance is written to the security log with the key fingerprint.
pub struct ClientHandler {
    host: String,
    port: u16,
}

impl ClientHandler {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// SHA-256 fingerprint in OpenSSH notation
pub fn fingerprint(key: &PublicKey) -> String {
    key.fingerprint(HashAlg::Sha256).to_string()
}

impl Handler for ClientHandler {
    type Error = SshError;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let fingerprint = fingerprint(server_public_key);
        let key_type = server_public_key.algorithm().as_str().to_string();
        security_log::log_host_key_auto_accepted(&self.host, self.port, &fingerprint, &key_type);

        async { Ok(true) }
    }

    async fn channel_eof(
        &mut self,
        _channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn channel_close(
        &mut self,
        _channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}
