//! File operations over an established session

use std::collections::BTreeMap;

use futures::future::join_all;

use crate::config::FileSettings;
use crate::error::RemoteError;
use crate::ssh::exec::{CommandRunner, RemoteCommand};

use super::preview::{Preview, PreviewPlan};
use super::types::{
    FileEntry, Listing, UNKNOWN_MODE, extension_of, format_mode, normalize_remote_path,
    sort_entries,
};
use super::{RemoteFs, disk_usage};

fn require_path<'p>(path: &'p str, what: &str) -> Result<&'p str, RemoteError> {
    if path.trim().is_empty() {
        Err(RemoteError::InvalidArgument(format!("{what} is required")))
    } else {
        Ok(path)
    }
}

/// File operations bound to one session's file subsystem and command runner
pub struct FileOps<'a, F, R> {
    fs: &'a F,
    runner: &'a R,
    home_dir: &'a str,
    limits: &'a FileSettings,
}

impl<'a, F: RemoteFs, R: CommandRunner> FileOps<'a, F, R> {
    pub fn new(fs: &'a F, runner: &'a R, home_dir: &'a str, limits: &'a FileSettings) -> Self {
        Self {
            fs,
            runner,
            home_dir,
            limits,
        }
    }

    /// List a directory, or the home directory when `path` is `None` or empty.
    ///
    /// Symlinks are classified by their target; a dangling link keeps its own
    /// mode.
    pub async fn list(&self, path: Option<&str>) -> Result<Listing, RemoteError> {
        let requested = path
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(self.home_dir);
        let dir = normalize_remote_path(requested);

        let raw = self.fs.read_dir(&dir).await?;

        let resolved = raw
            .into_iter()
            .filter(|entry| entry.name != "." && entry.name != "..")
            .map(|entry| {
                let dir = dir.as_str();
                async move {
                    let mut file = FileEntry::from_stat(dir, entry.name, &entry.stat);
                    if file.is_symlink {
                        match self.fs.stat(&file.path).await {
                            Ok(target) if target.permissions.is_some() => {
                                file.is_dir = target.is_dir();
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::debug!(path = %file.path, "Symlink target not readable: {}", e);
                            }
                        }
                    }
                    file
                }
            });

        let mut entries = join_all(resolved).await;
        sort_entries(&mut entries);

        Ok(Listing { path: dir, entries })
    }

    pub async fn rename(&self, src: &str, dest: &str) -> Result<(), RemoteError> {
        let src = require_path(src, "src")?;
        let dest = require_path(dest, "dest")?;
        self.fs.rename(src, dest).await
    }

    pub async fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        let path = require_path(path, "path")?;
        self.fs.mkdir(path).await
    }

    /// Apply `mode` (masked to permission bits) and return the resulting
    /// ls-style mode string.
    pub async fn chmod(&self, path: &str, mode: u32) -> Result<String, RemoteError> {
        let path = require_path(path, "path")?;
        self.fs.set_permissions(path, mode & 0o7777).await?;

        let stat = self.fs.stat(path).await?;
        Ok(stat
            .permissions
            .map(format_mode)
            .unwrap_or_else(|| UNKNOWN_MODE.to_string()))
    }

    /// Remove a file, or a directory tree when `is_dir` is set.
    ///
    /// The file subsystem only removes single entries, so directories are
    /// removed with `rm -rf` on the remote shell.
    pub async fn remove(&self, path: &str, is_dir: bool) -> Result<(), RemoteError> {
        let path = require_path(path, "path")?;
        if !is_dir {
            return self.fs.remove_file(path).await;
        }

        let command = RemoteCommand::new("rm").args(["-rf", "--", path]);
        let output = self.runner.run(&command.to_string()).await?;
        if !output.stderr.is_empty() {
            return Err(RemoteError::Io(output.stderr));
        }
        match output.exit_code {
            Some(0) | None => Ok(()),
            Some(code) => Err(RemoteError::Io(format!(
                "rm exited with status {code} for {path}"
            ))),
        }
    }

    pub async fn preview(&self, path: &str) -> Result<Preview, RemoteError> {
        let path = require_path(path, "path")?;
        let size = self.fs.stat(path).await?.size.unwrap_or(0);

        let ext = extension_of(path);
        let plan = PreviewPlan::for_extension(ext.as_deref());
        if let Some(refused) = plan.refuse_oversized(size, self.limits) {
            return Ok(refused);
        }

        let raw = self
            .fs
            .read_prefix(path, plan.read_limit(self.limits))
            .await?;
        Ok(plan.build(raw, size, self.limits))
    }

    /// Sizes in bytes of the named entries under `base`
    pub async fn dir_sizes(&self, base: &str, names: &[String]) -> BTreeMap<String, u64> {
        if base.trim().is_empty() || names.is_empty() {
            return BTreeMap::new();
        }
        let base = normalize_remote_path(base);
        disk_usage::dir_sizes(
            self.runner,
            &base,
            names,
            self.limits.du_timeout(),
            self.limits.du_concurrency(),
        )
        .await
    }
}
