//! SFTP session backing [`RemoteFs`]

use russh_sftp::client::SftpSession as RusshSftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::{FileAttributes, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::RemoteError;

use super::{FileStat, RemoteDirEntry, RemoteFs};

/// SFTP session wrapper for file operations
pub struct SftpFs {
    sftp: RusshSftpSession,
}

impl std::fmt::Debug for SftpFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpFs").finish_non_exhaustive()
    }
}

impl SftpFs {
    pub fn new(sftp: RusshSftpSession) -> Self {
        Self { sftp }
    }
}

fn to_stat(attrs: &FileAttributes) -> FileStat {
    FileStat {
        size: attrs.size,
        permissions: attrs.permissions,
        mtime: attrs.mtime,
    }
}

/// Map an SFTP failure on `path` onto the operation error taxonomy
fn map_err(path: &str, err: SftpError) -> RemoteError {
    match err {
        SftpError::Status(status) => match status.status_code {
            StatusCode::PermissionDenied => {
                RemoteError::PermissionDenied(path.to_string())
            }
            StatusCode::NoSuchFile => RemoteError::NotFound(path.to_string()),
            _ => RemoteError::Io(format!("{}: {}", path, status.error_message)),
        },
        other => RemoteError::Io(format!("{}: {}", path, other)),
    }
}

impl RemoteFs for SftpFs {
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, RemoteError> {
        let read_dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| map_err(path, e))?;

        Ok(read_dir
            .map(|entry| RemoteDirEntry {
                name: entry.file_name(),
                stat: to_stat(&entry.metadata()),
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<FileStat, RemoteError> {
        let attrs = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| map_err(path, e))?;
        Ok(to_stat(&attrs))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), RemoteError> {
        self.sftp
            .rename(from, to)
            .await
            .map_err(|e| map_err(from, e))
    }

    async fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| map_err(path, e))
    }

    async fn set_permissions(&self, path: &str, mode: u32) -> Result<(), RemoteError> {
        // Only the permissions attribute is sent
        let attrs = FileAttributes {
            permissions: Some(mode),
            ..Default::default()
        };

        self.sftp
            .set_metadata(path, attrs)
            .await
            .map_err(|e| map_err(path, e))
    }

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| map_err(path, e))
    }

    async fn read_prefix(&self, path: &str, max: u64) -> Result<Vec<u8>, RemoteError> {
        let mut file = self.sftp.open(path).await.map_err(|e| map_err(path, e))?;

        let mut buf = Vec::new();
        let read = (&mut file).take(max).read_to_end(&mut buf).await;
        if let Err(e) = file.shutdown().await {
            tracing::debug!(path = %path, "Failed to close remote file: {}", e);
        }
        read.map_err(|e| RemoteError::Io(format!("{}: {}", path, e)))?;

        Ok(buf)
    }

    async fn canonicalize(&self, path: &str) -> Result<String, RemoteError> {
        self.sftp
            .canonicalize(path)
            .await
            .map_err(|e| map_err(path, e))
    }

    async fn close(&self) -> Result<(), RemoteError> {
        self.sftp
            .close()
            .await
            .map_err(|e| RemoteError::Io(format!("Failed to close SFTP session: {}", e)))
    }
}
