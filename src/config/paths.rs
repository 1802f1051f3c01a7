use directories::ProjectDirs;
use std::path::PathBuf;

/// Environment variable overriding the log directory
pub const LOG_DIR_ENV: &str = "FERRY_LOG_DIR";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "ferry", "ferry").map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
}

/// Get the path to the settings file
pub fn settings_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("settings.toml"))
}

/// Ensure the config directory exists with proper permissions
pub fn ensure_config_dir() -> std::io::Result<PathBuf> {
    let dir = config_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine config directory",
        )
    })?;

    create_private_dir(&dir)?;
    Ok(dir)
}

/// Create a directory (and parents) readable only by the owner.
///
/// An existing directory is left untouched.
pub fn create_private_dir(dir: &std::path::Path) -> std::io::Result<()> {
    if dir.exists() {
        return Ok(());
    }

    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Expand tilde in path (e.g., ~/.ssh/id_rsa -> /home/user/.ssh/id_rsa)
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs_home() {
            return home;
        }
    }
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Get the user's home directory
fn dirs_home() -> Option<PathBuf> {
    // Try directories crate first, fall back to HOME env var
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
}

/// Get the default SSH directory
pub fn ssh_dir() -> Option<PathBuf> {
    dirs_home().map(|home| home.join(".ssh"))
}

/// Get the path to the user's SSH client config file
pub fn ssh_config_file() -> Option<PathBuf> {
    ssh_dir().map(|dir| dir.join("config"))
}

/// Get the default SSH identity files to try
pub fn default_identity_files() -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Some(ssh_dir) = ssh_dir() {
        files.push(ssh_dir.join("id_ed25519"));
        files.push(ssh_dir.join("id_rsa"));
        files.push(ssh_dir.join("id_ecdsa"));
    }
    files
}

/// Name of the local OS user, used when no SSH user is configured
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

/// Get the log directory path
pub fn log_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(LOG_DIR_ENV) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        return Some(PathBuf::from(trimmed));
    }

    config_dir().map(|d| d.join("logs"))
}

/// Ensure the log directory exists with proper permissions
pub fn ensure_log_dir() -> std::io::Result<PathBuf> {
    if std::env::var_os(LOG_DIR_ENV).is_none() {
        // First ensure parent config dir exists
        ensure_config_dir()?;
    }

    let dir = log_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine log directory",
        )
    })?;

    create_private_dir(&dir)?;
    Ok(dir)
}
