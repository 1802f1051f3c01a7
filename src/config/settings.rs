use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Application-wide settings stored in settings.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub ssh: SshSettings,
    #[serde(default)]
    pub files: FileSettings,
    #[serde(default)]
    pub terminal: TerminalSettings,
}

impl Settings {
    /// Load from the default settings file, falling back to defaults if it is missing
    pub fn load() -> Result<Self, ConfigError> {
        match super::paths::settings_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from a specific file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Save to a specific file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            super::paths::create_private_dir(parent).map_err(ConfigError::CreateDir)?;
        }

        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content).map_err(|e| ConfigError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_keepalive() -> u64 {
    60
}

fn default_terminal_type() -> String {
    "xterm-256color".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SshSettings {
    #[serde(default = "default_timeout")]
    pub connect_timeout_secs: u64,
    /// Zero disables keepalives
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_terminal_type")]
    pub terminal_type: String,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_timeout(),
            keepalive_interval_secs: default_keepalive(),
            terminal_type: default_terminal_type(),
        }
    }
}

impl SshSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        // Treat 0 as "no keepalive" to avoid immediate timeout
        if self.keepalive_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.keepalive_interval_secs))
        }
    }
}

fn default_du_timeout() -> u64 {
    5
}

fn default_du_concurrency() -> usize {
    4
}

fn default_text_max() -> u64 {
    64 * 1024
}

fn default_image_max() -> u64 {
    5 * 1024 * 1024
}

fn default_pdf_max() -> u64 {
    10 * 1024 * 1024
}

fn default_sniff() -> usize {
    8 * 1024
}

/// Limits applied by the remote file operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSettings {
    /// Per-entry budget for one `du` run
    #[serde(default = "default_du_timeout")]
    pub du_timeout_secs: u64,
    /// `du` runs allowed in flight at once, each holding an exec channel
    #[serde(default = "default_du_concurrency")]
    pub du_concurrency: usize,
    #[serde(default = "default_text_max")]
    pub text_preview_max_bytes: u64,
    #[serde(default = "default_image_max")]
    pub image_preview_max_bytes: u64,
    #[serde(default = "default_pdf_max")]
    pub pdf_preview_max_bytes: u64,
    /// Leading bytes of a text preview scanned for NUL
    #[serde(default = "default_sniff")]
    pub binary_sniff_bytes: usize,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            du_timeout_secs: default_du_timeout(),
            du_concurrency: default_du_concurrency(),
            text_preview_max_bytes: default_text_max(),
            image_preview_max_bytes: default_image_max(),
            pdf_preview_max_bytes: default_pdf_max(),
            binary_sniff_bytes: default_sniff(),
        }
    }
}

impl FileSettings {
    pub fn du_timeout(&self) -> Duration {
        Duration::from_secs(self.du_timeout_secs)
    }

    /// Clamped to 1..=4 so the shell and file channels stay under MaxSessions
    pub fn du_concurrency(&self) -> usize {
        self.du_concurrency.clamp(1, 4)
    }
}

fn default_cols() -> u32 {
    80
}

fn default_rows() -> u32 {
    24
}

fn default_chunk() -> usize {
    4096
}

fn default_grace() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalSettings {
    #[serde(default = "default_cols")]
    pub default_cols: u32,
    #[serde(default = "default_rows")]
    pub default_rows: u32,
    #[serde(default = "default_chunk")]
    pub read_chunk_bytes: usize,
    /// How long a stopping relay may take to wind down before it is aborted
    #[serde(default = "default_grace")]
    pub shutdown_grace_millis: u64,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            default_cols: default_cols(),
            default_rows: default_rows(),
            read_chunk_bytes: default_chunk(),
            shutdown_grace_millis: default_grace(),
        }
    }
}

impl TerminalSettings {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_millis)
    }
}
