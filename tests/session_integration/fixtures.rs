//! In-memory stand-ins for the remote side of a session

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;

use ferry::config::Settings;
use ferry::error::{ConnectError, ConnectStage, RemoteError, SshError};
use ferry::session::SessionManager;
use ferry::session::backend::{Connector, Established, RemoteTransport};
use ferry::sftp::{FileStat, RemoteDirEntry, RemoteFs};
use ferry::ssh::{CommandOutput, CommandRunner, ConnectRequest, ConnectTarget};
use ferry::terminal::{PtyChannel, PtyEvent, TerminalOutput};

pub const HOME: &str = "/home/tester";

const DIR: u32 = 0o040000;
const FILE: u32 = 0o100000;
const LINK: u32 = 0o120000;

#[derive(Debug, Clone)]
struct Node {
    mode: u32,
    data: Vec<u8>,
    link: Option<String>,
}

#[derive(Default)]
struct FsState {
    nodes: Mutex<BTreeMap<String, Node>>,
    denied: Mutex<Vec<String>>,
    reads: AtomicUsize,
    closes: AtomicUsize,
}

fn parent_of(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((parent, _)) => parent,
        None => ".",
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Remote file tree kept in memory. Clones share the same tree.
#[derive(Clone, Default)]
pub struct FakeFs {
    state: Arc<FsState>,
}

impl FakeFs {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.add_dir("/");
        fs.add_dir("/home");
        fs.add_dir(HOME);
        fs
    }

    fn insert(&self, path: &str, node: Node) {
        self.state.nodes.lock().insert(path.to_string(), node);
    }

    pub fn add_dir(&self, path: &str) {
        self.insert(
            path,
            Node {
                mode: DIR | 0o755,
                data: Vec::new(),
                link: None,
            },
        );
    }

    pub fn add_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.insert(
            path,
            Node {
                mode: FILE | 0o644,
                data: data.into(),
                link: None,
            },
        );
    }

    pub fn add_symlink(&self, path: &str, target: &str) {
        self.insert(
            path,
            Node {
                mode: LINK | 0o777,
                data: Vec::new(),
                link: Some(target.to_string()),
            },
        );
    }

    /// Make every operation on `path` fail with permission denied
    pub fn deny(&self, path: &str) {
        self.state.denied.lock().push(path.to_string());
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.nodes.lock().contains_key(path)
    }

    pub fn mode_of(&self, path: &str) -> Option<u32> {
        self.state.nodes.lock().get(path).map(|n| n.mode)
    }

    pub fn reads(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    fn check(&self, path: &str) -> Result<(), RemoteError> {
        if self.state.denied.lock().iter().any(|d| d == path) {
            return Err(RemoteError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    fn node(&self, path: &str) -> Result<Node, RemoteError> {
        self.check(path)?;
        self.state
            .nodes
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    fn stat_of(node: &Node) -> FileStat {
        FileStat {
            size: Some(node.data.len() as u64),
            permissions: Some(node.mode),
            mtime: Some(1_700_000_000),
        }
    }
}

impl RemoteFs for FakeFs {
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, RemoteError> {
        let dir = self.node(path)?;
        if dir.mode & 0o170000 != DIR {
            return Err(RemoteError::Io(format!("{}: not a directory", path)));
        }

        let dot = Self::stat_of(&dir);
        let mut entries = vec![
            RemoteDirEntry {
                name: ".".to_string(),
                stat: dot,
            },
            RemoteDirEntry {
                name: "..".to_string(),
                stat: dot,
            },
        ];
        let nodes = self.state.nodes.lock();
        for (child, node) in nodes.iter() {
            if child != path && parent_of(child) == path {
                entries.push(RemoteDirEntry {
                    name: name_of(child).to_string(),
                    stat: Self::stat_of(node),
                });
            }
        }
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<FileStat, RemoteError> {
        let mut node = self.node(path)?;
        while let Some(target) = node.link.clone() {
            node = self.node(&target)?;
        }
        Ok(Self::stat_of(&node))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), RemoteError> {
        self.check(from)?;
        let mut nodes = self.state.nodes.lock();
        let node = nodes
            .remove(from)
            .ok_or_else(|| RemoteError::NotFound(from.to_string()))?;
        nodes.insert(to.to_string(), node);
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        self.check(parent_of(path))?;
        if self.exists(path) {
            return Err(RemoteError::Io(format!("{}: already exists", path)));
        }
        self.add_dir(path);
        Ok(())
    }

    async fn set_permissions(&self, path: &str, mode: u32) -> Result<(), RemoteError> {
        self.check(path)?;
        let mut nodes = self.state.nodes.lock();
        let node = nodes
            .get_mut(path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        node.mode = (node.mode & 0o170000) | (mode & 0o7777);
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        self.check(path)?;
        self.state
            .nodes
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    async fn read_prefix(&self, path: &str, max: u64) -> Result<Vec<u8>, RemoteError> {
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        let node = self.node(path)?;
        let end = node.data.len().min(max as usize);
        Ok(node.data[..end].to_vec())
    }

    async fn canonicalize(&self, path: &str) -> Result<String, RemoteError> {
        Ok(if path == "." { HOME.to_string() } else { path.to_string() })
    }

    async fn close(&self) -> Result<(), RemoteError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone)]
struct Rule {
    pattern: String,
    output: CommandOutput,
    delay: Duration,
}

/// Command runner answering from canned rules; unmatched commands succeed
/// with no output.
#[derive(Clone, Default)]
pub struct FakeRunner {
    rules: Arc<Mutex<Vec<Rule>>>,
    log: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeRunner {
    /// Answer commands containing `pattern`
    pub fn on(&self, pattern: &str, stdout: &str, stderr: &str, exit_code: u32) {
        self.on_delayed(pattern, stdout, stderr, exit_code, Duration::ZERO);
    }

    pub fn on_delayed(
        &self,
        pattern: &str,
        stdout: &str,
        stderr: &str,
        exit_code: u32,
        delay: Duration,
    ) {
        self.rules.lock().push(Rule {
            pattern: pattern.to_string(),
            output: CommandOutput::from_raw(stdout.as_bytes(), stderr.as_bytes(), Some(exit_code)),
            delay,
        });
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Most commands that were ever running at the same time
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Counts one running command for as long as it lives
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CommandRunner for FakeRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput, SshError> {
        self.log.lock().push(command.to_string());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(self.in_flight.clone());

        let rule = self
            .rules
            .lock()
            .iter()
            .find(|rule| command.contains(&rule.pattern))
            .cloned();

        match rule {
            Some(rule) => {
                if !rule.delay.is_zero() {
                    tokio::time::sleep(rule.delay).await;
                }
                Ok(rule.output)
            }
            None => Ok(CommandOutput {
                exit_code: Some(0),
                ..Default::default()
            }),
        }
    }
}

/// Test side of a fake pty: feeds output and observes what the relay did
#[derive(Clone)]
pub struct PtyControl {
    events: mpsc::UnboundedSender<Result<PtyEvent, String>>,
    pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
    pub resizes: Arc<Mutex<Vec<(u32, u32)>>>,
    closed: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
}

impl PtyControl {
    pub fn output(&self, bytes: &[u8]) {
        let _ = self.events.send(Ok(PtyEvent::Output(bytes.to_vec())));
    }

    pub fn fail(&self, reason: &str) {
        let _ = self.events.send(Err(reason.to_string()));
    }

    pub fn hang_up(&self) {
        let _ = self.events.send(Ok(PtyEvent::Closed));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make every later write block forever, like a peer that stopped reading
    pub fn stall_writes(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Wait until the relay has closed this channel
    pub async fn wait_closed(&self) -> bool {
        for _ in 0..100 {
            if self.is_closed() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

pub struct FakePty {
    events: mpsc::UnboundedReceiver<Result<PtyEvent, String>>,
    control: PtyControl,
}

impl PtyChannel for FakePty {
    async fn next_event(&mut self) -> Result<PtyEvent, SshError> {
        match self.events.recv().await {
            Some(Ok(event)) => Ok(event),
            Some(Err(reason)) => Err(SshError::Channel(reason)),
            None => Ok(PtyEvent::Closed),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SshError> {
        if self.control.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.control.writes.lock().push(data.to_vec());
        Ok(())
    }

    async fn resize(&mut self, cols: u32, rows: u32) -> Result<(), SshError> {
        self.control.resizes.lock().push((cols, rows));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SshError> {
        self.control.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Transport handed out by [`FakeConnector`]
pub struct FakeTransport {
    runner: FakeRunner,
    ptys: Arc<Mutex<Vec<(PtyControl, u32, u32)>>>,
    pty_fails: bool,
    live: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl CommandRunner for FakeTransport {
    async fn run(&self, command: &str) -> Result<CommandOutput, SshError> {
        self.runner.run(command).await
    }
}

impl RemoteTransport for FakeTransport {
    type Pty = FakePty;

    async fn open_pty(&self, cols: u32, rows: u32) -> Result<FakePty, SshError> {
        if self.pty_fails {
            return Err(SshError::Channel("PTY request failed: refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let control = PtyControl {
            events: tx,
            writes: Arc::default(),
            resizes: Arc::default(),
            closed: Arc::default(),
            stalled: Arc::default(),
        };
        self.ptys.lock().push((control.clone(), cols, rows));
        Ok(FakePty {
            events: rx,
            control,
        })
    }

    async fn close(&self) -> Result<(), SshError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Where a connect attempt was headed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenTarget {
    pub host_label: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub jump: Option<(String, u16, String)>,
}

impl From<&ConnectTarget> for SeenTarget {
    fn from(target: &ConnectTarget) -> Self {
        Self {
            host_label: target.host_label.clone(),
            hostname: target.hostname.clone(),
            port: target.port,
            username: target.username.clone(),
            jump: target
                .jump
                .as_ref()
                .map(|j| (j.hostname.clone(), j.port, j.user.clone())),
        }
    }
}

/// Connector that builds sessions over the fakes above
#[derive(Clone, Default)]
pub struct FakeConnector {
    pub fs: FakeFs,
    pub runner: FakeRunner,
    pub ptys: Arc<Mutex<Vec<(PtyControl, u32, u32)>>>,
    pub targets: Arc<Mutex<Vec<SeenTarget>>>,
    pub live: Arc<AtomicUsize>,
    pub max_live: Arc<AtomicUsize>,
    pub delay: Duration,
    pub failure: Arc<Mutex<Option<ConnectStage>>>,
    pub pty_fails: bool,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            fs: FakeFs::new(),
            ..Default::default()
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Make every later connect fail at `stage`
    pub fn fail_at(&self, stage: ConnectStage) {
        *self.failure.lock() = Some(stage);
    }

    /// Control of the `n`th pty opened, with the size it was opened at
    pub fn pty(&self, n: usize) -> Option<(PtyControl, u32, u32)> {
        self.ptys.lock().get(n).cloned()
    }
}

impl Connector for FakeConnector {
    type Transport = FakeTransport;
    type Fs = FakeFs;

    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Established<FakeTransport, FakeFs>, ConnectError> {
        self.targets.lock().push(SeenTarget::from(target));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failure = *self.failure.lock();
        if let Some(stage) = failure {
            return Err(ConnectError::new(
                stage,
                SshError::ConnectionFailed {
                    host: target.hostname.clone(),
                    port: target.port,
                    reason: "refused".to_string(),
                },
            ));
        }

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Established {
            transport: FakeTransport {
                runner: self.runner.clone(),
                ptys: self.ptys.clone(),
                pty_fails: self.pty_fails,
                live: self.live.clone(),
                closed: AtomicBool::new(false),
            },
            fs: self.fs.clone(),
            home_dir: HOME.to_string(),
        })
    }
}

/// A manager over a [`FakeConnector`] with its SSH config in a temp dir
pub struct TestEnv {
    pub connector: FakeConnector,
    pub manager: SessionManager<FakeConnector>,
    pub ssh_config: PathBuf,
    _dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with(FakeConnector::new(), Settings::default())
    }

    pub fn with(connector: FakeConnector, settings: Settings) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let ssh_config = dir.path().join(".ssh").join("config");
        let manager = SessionManager::new(connector.clone(), settings, ssh_config.clone());
        Self {
            connector,
            manager,
            ssh_config,
            _dir: dir,
        }
    }

    /// A connected environment
    pub async fn connected() -> Self {
        let env = Self::new();
        env.connect().await;
        env
    }

    pub async fn connect(&self) {
        self.manager
            .connect(ConnectRequest::direct("files.example", "tester"))
            .await
            .expect("connect should succeed");
    }
}

/// Collect pushed output until it contains `expected` or a second passes
pub async fn read_until(
    rx: &mut mpsc::UnboundedReceiver<TerminalOutput>,
    expected: &str,
) -> String {
    let mut seen = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !seen.contains(expected) {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(out)) => seen.push_str(&out.data),
            Ok(None) | Err(_) => break,
        }
    }
    seen
}
