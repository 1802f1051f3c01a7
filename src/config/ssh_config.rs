//! Reader and writer for the OpenSSH client config (`~/.ssh/config`)

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::host_patterns::{host_matches, is_wildcard};
use super::paths::{create_private_dir, current_user, expand_tilde, ssh_dir};
use crate::error::ConfigError;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// A concrete host entry from the SSH client config.
///
/// Two profiles are equal when their aliases are equal.
#[derive(Debug, Clone, Serialize)]
pub struct HostProfile {
    pub alias: String,
    pub hostname: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<PathBuf>,
    pub proxy_jump: Option<String>,
}

impl PartialEq for HostProfile {
    fn eq(&self, other: &Self) -> bool {
        self.alias == other.alias
    }
}

impl Eq for HostProfile {}

impl Hash for HostProfile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.alias.hash(state);
    }
}

/// Options collected for one alias, before defaults are applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostOptions {
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_files: Vec<PathBuf>,
    pub proxy_jump: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct HostBlock {
    patterns: Vec<String>,
    options: Vec<(String, String)>,
}

/// Parsed SSH client config
#[derive(Debug, Clone, Default)]
pub struct SshConfigFile {
    blocks: Vec<HostBlock>,
}

impl SshConfigFile {
    /// Load a config file. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut blocks = Vec::new();
        let mut current: Option<HostBlock> = None;

        for raw_line in content.lines() {
            let line = strip_comments(raw_line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let tokens = split_tokens(line);
            let Some((keyword, args)) = tokens.split_first() else {
                continue;
            };

            let key = keyword.to_ascii_lowercase();
            match key.as_str() {
                "host" => {
                    blocks.extend(current.take());
                    current = Some(HostBlock {
                        patterns: args.to_vec(),
                        options: Vec::new(),
                    });
                }
                // Match blocks are not evaluated; their options are dropped.
                "match" => {
                    blocks.extend(current.take());
                }
                _ => {
                    if let (Some(block), Some(value)) = (current.as_mut(), args.first()) {
                        block.options.push((key, value.clone()));
                    }
                }
            }
        }

        blocks.extend(current);
        Self { blocks }
    }

    /// Every non-wildcard alias named by a `Host` line, in file order
    pub fn aliases(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.blocks
            .iter()
            .flat_map(|block| block.patterns.iter())
            .filter(|pattern| !is_wildcard(pattern))
            .filter(|pattern| seen.insert(pattern.as_str()))
            .cloned()
            .collect()
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.blocks
            .iter()
            .any(|block| block.patterns.iter().any(|p| p == alias))
    }

    /// Collect the options that apply to `alias`.
    ///
    /// Blocks are visited in file order and the first value seen for a key
    /// wins, so a trailing `Host *` block only fills in gaps.
    pub fn lookup(&self, alias: &str) -> HostOptions {
        let mut opts = HostOptions::default();

        for block in &self.blocks {
            if !host_matches(&block.patterns, alias) {
                continue;
            }

            for (key, value) in &block.options {
                match key.as_str() {
                    "hostname" => {
                        if opts.hostname.is_none() {
                            opts.hostname = Some(value.replace("%h", alias));
                        }
                    }
                    "user" => {
                        if opts.user.is_none() {
                            opts.user = Some(value.clone());
                        }
                    }
                    "port" => {
                        if opts.port.is_none() {
                            opts.port = value.parse::<u16>().ok();
                        }
                    }
                    "identityfile" => {
                        opts.identity_files.push(expand_identity_path(value));
                    }
                    "proxyjump" => {
                        if opts.proxy_jump.is_none() && !value.eq_ignore_ascii_case("none") {
                            opts.proxy_jump = Some(value.clone());
                        }
                    }
                    _ => {}
                }
            }
        }

        opts
    }

    /// Resolve `alias` into a profile with defaults applied
    pub fn profile(&self, alias: &str) -> HostProfile {
        let opts = self.lookup(alias);
        HostProfile {
            alias: alias.to_string(),
            hostname: opts.hostname.unwrap_or_else(|| alias.to_string()),
            user: opts.user.unwrap_or_else(current_user),
            port: opts.port.unwrap_or(DEFAULT_SSH_PORT),
            identity_file: opts.identity_files.into_iter().next(),
            proxy_jump: opts.proxy_jump,
        }
    }

    /// All concrete profiles, sorted by alias
    pub fn profiles(&self) -> Vec<HostProfile> {
        let mut profiles: Vec<HostProfile> = self
            .aliases()
            .iter()
            .map(|alias| self.profile(alias))
            .collect();
        profiles.sort_by(|a, b| a.alias.cmp(&b.alias));
        profiles
    }
}

/// Parse the config at `path` into sorted host profiles.
pub fn parse_config(path: &Path) -> Result<Vec<HostProfile>, ConfigError> {
    Ok(SshConfigFile::load(path)?.profiles())
}

/// Host profiles plus the user name applied when a profile sets none
pub fn list_profiles(path: &Path) -> Result<(Vec<HostProfile>, String), ConfigError> {
    Ok((parse_config(path)?, current_user()))
}

/// A host block to append to the SSH client config
#[derive(Debug, Clone, Default)]
pub struct NewHost {
    pub alias: String,
    pub hostname: String,
    pub user: String,
    pub port: u16,
    pub identity_file: String,
}

impl NewHost {
    fn validate(&self) -> Result<(), ConfigError> {
        let alias = self.alias.trim();
        let hostname = self.hostname.trim();

        if alias.is_empty() || hostname.is_empty() {
            return Err(ConfigError::InvalidHost(
                "Name and hostname are required".to_string(),
            ));
        }
        if alias.chars().any(char::is_whitespace) || is_wildcard(alias) {
            return Err(ConfigError::InvalidHost(format!(
                "'{alias}' is not a valid host name"
            )));
        }
        if hostname.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidHost(format!(
                "'{hostname}' is not a valid hostname"
            )));
        }
        Ok(())
    }

    fn render(&self) -> String {
        let mut block = format!(
            "\nHost {}\n    HostName {}\n",
            self.alias.trim(),
            self.hostname.trim()
        );

        let user = self.user.trim();
        if !user.is_empty() {
            block.push_str(&format!("    User {user}\n"));
        }
        if self.port != DEFAULT_SSH_PORT && self.port != 0 {
            block.push_str(&format!("    Port {}\n", self.port));
        }
        let identity = self.identity_file.trim();
        if !identity.is_empty() {
            block.push_str(&format!("    IdentityFile {identity}\n"));
        }
        block
    }
}

/// Append a host block to the config at `path`.
///
/// Existing content is never rewritten. The parent directory is created
/// owner-only if missing.
pub fn save_host(path: &Path, host: &NewHost) -> Result<(), ConfigError> {
    host.validate()?;

    if let Some(parent) = path.parent() {
        create_private_dir(parent).map_err(ConfigError::CreateDir)?;
    }

    let existing = SshConfigFile::load(path)?;
    if existing.contains_alias(host.alias.trim()) {
        return Err(ConfigError::DuplicateAlias(host.alias.trim().to_string()));
    }

    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let write_err = |e| ConfigError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = options.open(path).map_err(write_err)?;
    file.write_all(host.render().as_bytes()).map_err(write_err)?;

    tracing::info!(alias = %host.alias.trim(), path = %path.display(), "Saved host to SSH config");
    Ok(())
}

fn expand_identity_path(raw: &str) -> PathBuf {
    let cleaned = raw.trim_matches('"');
    let expanded = expand_tilde(cleaned);
    if expanded.is_absolute() {
        return expanded;
    }

    if let Some(dir) = ssh_dir() {
        return dir.join(expanded);
    }

    expanded
}

fn strip_comments(line: &str) -> String {
    let mut result = String::new();
    let mut in_quotes = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                result.push(ch);
            }
            '#' if !in_quotes => break,
            _ => result.push(ch),
        }
    }
    result
}

/// Split a config line into keyword and arguments. `Key=Value` is accepted.
fn split_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    let mut in_quotes = false;
    let mut seen_equals = false;

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '=' if !in_quotes
                && !seen_equals
                && tokens.len() + usize::from(!current.is_empty()) == 1 =>
            {
                seen_equals = true;
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
