//! Remote file operations over the SFTP subsystem

pub mod disk_usage;
pub mod ops;
pub mod preview;
pub mod session;
pub mod types;

use std::future::Future;

use crate::error::RemoteError;

pub use ops::FileOps;
pub use preview::{Preview, PreviewKind};
pub use session::SftpFs;
pub use types::{FileEntry, Listing};

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

/// Attributes reported by the file subsystem. Any field may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStat {
    pub size: Option<u64>,
    /// Full `st_mode`, file type bits included
    pub permissions: Option<u32>,
    pub mtime: Option<u32>,
}

impl FileStat {
    pub fn is_dir(&self) -> bool {
        self.permissions
            .is_some_and(|mode| mode & S_IFMT == S_IFDIR)
    }

    pub fn is_symlink(&self) -> bool {
        self.permissions
            .is_some_and(|mode| mode & S_IFMT == S_IFLNK)
    }
}

/// One entry of a directory listing, attributes as returned by the server
/// (symlinks are not followed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDirEntry {
    pub name: String,
    pub stat: FileStat,
}

/// File-subsystem operations used by the façade.
///
/// Implementations map their own failures onto [`RemoteError`]:
/// permission problems to `PermissionDenied`, missing paths to `NotFound`,
/// anything else to `Io`.
pub trait RemoteFs: Send + Sync {
    fn read_dir(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Vec<RemoteDirEntry>, RemoteError>> + Send;

    /// Attributes of `path`, following symlinks
    fn stat(&self, path: &str) -> impl Future<Output = Result<FileStat, RemoteError>> + Send;

    fn rename(&self, from: &str, to: &str)
    -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn mkdir(&self, path: &str) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn set_permissions(
        &self,
        path: &str,
        mode: u32,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Remove a single non-directory entry
    fn remove_file(&self, path: &str) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Read at most `max` bytes from the start of a file
    fn read_prefix(
        &self,
        path: &str,
        max: u64,
    ) -> impl Future<Output = Result<Vec<u8>, RemoteError>> + Send;

    fn canonicalize(&self, path: &str) -> impl Future<Output = Result<String, RemoteError>> + Send;

    /// End the subsystem session
    fn close(&self) -> impl Future<Output = Result<(), RemoteError>> + Send;
}
