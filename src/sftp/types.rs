//! Listing types and remote path helpers

use std::cmp::Ordering;

use serde::Serialize;

use super::FileStat;

/// Mode string reported when the server sends no permissions
pub const UNKNOWN_MODE: &str = "?---------";

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    /// True for directories and for symlinks whose target is a directory
    pub is_dir: bool,
    pub is_symlink: bool,
    pub size: u64,
    /// ls-style mode string, e.g. `drwxr-xr-x`
    pub mode: String,
    /// Seconds since the epoch, 0 when unknown
    pub mtime: u64,
}

impl FileEntry {
    pub(crate) fn from_stat(dir: &str, name: String, stat: &FileStat) -> Self {
        Self {
            path: join_remote(dir, &name),
            name,
            is_dir: stat.is_dir(),
            is_symlink: stat.is_symlink(),
            size: stat.size.unwrap_or(0),
            mode: stat
                .permissions
                .map(format_mode)
                .unwrap_or_else(|| UNKNOWN_MODE.to_string()),
            mtime: stat.mtime.map(u64::from).unwrap_or(0),
        }
    }
}

/// A listed directory and its entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    /// The normalized path that was listed
    pub path: String,
    pub entries: Vec<FileEntry>,
}

/// Directories first, then case-insensitive name order.
pub fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| {
        if a.is_dir != b.is_dir {
            return if a.is_dir {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Render a `st_mode` value the way `ls -l` does
pub fn format_mode(mode: u32) -> String {
    let kind = match mode & 0o170000 {
        0o040000 => 'd',
        0o120000 => 'l',
        0o140000 => 's',
        0o060000 => 'b',
        0o020000 => 'c',
        0o010000 => 'p',
        _ => '-',
    };

    let bit = |mask: u32, ch: char| if mode & mask != 0 { ch } else { '-' };
    let special = |exec_mask: u32, special_mask: u32, set: char, unset: char| {
        match (mode & exec_mask != 0, mode & special_mask != 0) {
            (true, true) => set,
            (false, true) => unset,
            (true, false) => 'x',
            (false, false) => '-',
        }
    };

    [
        kind,
        bit(0o400, 'r'),
        bit(0o200, 'w'),
        special(0o100, 0o4000, 's', 'S'),
        bit(0o040, 'r'),
        bit(0o020, 'w'),
        special(0o010, 0o2000, 's', 'S'),
        bit(0o004, 'r'),
        bit(0o002, 'w'),
        special(0o001, 0o1000, 't', 'T'),
    ]
    .iter()
    .collect()
}

/// Lexically normalize a POSIX path: collapse repeated slashes and resolve
/// `.` and `..` without touching the remote side.
pub fn normalize_remote_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Join a remote directory and an entry name
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Lower-cased extension of the last path component, without the dot.
///
/// Dotfiles such as `.bashrc` have no extension.
pub fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let trimmed = name.trim_start_matches('.');
    let (_, ext) = trimmed.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}
