mod host_patterns;
pub mod paths;
pub mod settings;
pub mod ssh_config;

pub use settings::{FileSettings, Settings, SshSettings, TerminalSettings};
pub use ssh_config::{HostOptions, HostProfile, NewHost, SshConfigFile};
