//! One-shot remote command execution

use std::fmt;
use std::future::Future;

use russh::ChannelMsg;
use russh::client::Handle;

use crate::error::SshError;

use super::handler::ClientHandler;

/// Buffered result of a remote command.
///
/// Both streams are decoded as UTF-8 with replacement and have trailing
/// whitespace removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the server closed the channel without reporting a status
    pub exit_code: Option<u32>,
}

impl CommandOutput {
    pub fn from_raw(stdout: &[u8], stderr: &[u8], exit_code: Option<u32>) -> Self {
        Self {
            stdout: String::from_utf8_lossy(stdout).trim_end().to_string(),
            stderr: String::from_utf8_lossy(stderr).trim_end().to_string(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs shell command lines on the remote host.
///
/// The command line is passed to the remote shell exactly as given. No
/// escaping is applied, so any path or name interpolated into it must be
/// quoted first with [`shell_quote`] or built with [`RemoteCommand`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str) -> impl Future<Output = Result<CommandOutput, SshError>> + Send;
}

/// Quote one argument for a POSIX shell
pub fn shell_quote(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('\'');
    for ch in arg.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// A remote command built from a program name and discrete arguments.
///
/// The program is emitted verbatim and must be a trusted literal. Every
/// argument is single-quoted when rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    program: String,
    args: Vec<String>,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run under the remote `timeout` utility so the process dies server-side
    /// after `secs` seconds.
    pub fn with_remote_timeout(self, secs: u64) -> Self {
        let mut wrapped = RemoteCommand::new("timeout").arg(secs.to_string());
        wrapped.args.push(self.program);
        wrapped.args.extend(self.args);
        wrapped
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Execute `command` on a fresh session channel and buffer its output.
pub(crate) async fn exec_on_handle(
    handle: &Handle<ClientHandler>,
    command: &str,
) -> Result<CommandOutput, SshError> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| SshError::Channel(format!("Failed to open channel: {}", e)))?;

    channel
        .exec(true, command)
        .await
        .map_err(|e| SshError::Channel(format!("Failed to exec command: {}", e)))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = None;

    // The exit status may arrive after EOF, so read until the channel closes.
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext == 1 {
                    stderr.extend_from_slice(&data);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                exit_code = Some(exit_status);
            }
            Some(ChannelMsg::Close) | None => break,
            Some(_) => {}
        }
    }

    let output = CommandOutput::from_raw(&stdout, &stderr, exit_code);
    if !output.success() {
        tracing::debug!(exit_code = ?output.exit_code, "Remote command finished with failure");
    }
    Ok(output)
}
