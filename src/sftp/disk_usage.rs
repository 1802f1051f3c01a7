//! Per-directory disk usage via remote `du`

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::timeout;

use crate::error::RemoteError;
use crate::ssh::exec::{CommandRunner, RemoteCommand};

use super::types::join_remote;

/// Names that cannot be measured as a direct child of the base directory
fn is_measurable(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

/// Leading integer of `du` output
fn parse_du(stdout: &str) -> Option<u64> {
    stdout.split_whitespace().next()?.parse().ok()
}

/// Size in bytes of one path: byte-accurate `du -sb` first, then the
/// block-based `du -sk` where `-b` is unsupported.
async fn measure<R: CommandRunner>(
    runner: &R,
    path: &str,
    remote_secs: u64,
) -> Result<u64, RemoteError> {
    let bytes = RemoteCommand::new("du")
        .args(["-sb", "--", path])
        .with_remote_timeout(remote_secs);
    // du exits non-zero when part of the tree is unreadable but still
    // prints the total for what it could read
    let output = runner.run(&bytes.to_string()).await?;
    if let Some(size) = parse_du(&output.stdout) {
        return Ok(size);
    }

    let blocks = RemoteCommand::new("du")
        .args(["-sk", "--", path])
        .with_remote_timeout(remote_secs);
    let output = runner.run(&blocks.to_string()).await?;
    if let Some(kib) = parse_du(&output.stdout) {
        return Ok(kib.saturating_mul(1024));
    }

    Ok(0)
}

/// Measure every name under `base`, at most `concurrency` at a time.
///
/// Each name gets its own `budget`, so one slow or unreadable subtree
/// cannot hold up the others. Timed-out, failed and zero results are left
/// out of the map.
pub async fn dir_sizes<R: CommandRunner>(
    runner: &R,
    base: &str,
    names: &[String],
    budget: Duration,
    concurrency: usize,
) -> BTreeMap<String, u64> {
    let mut seen = HashSet::new();
    let targets: Vec<&String> = names
        .iter()
        .filter(|name| is_measurable(name))
        .filter(|name| seen.insert(name.as_str()))
        .collect();

    let remote_secs = budget.as_secs().max(1);

    let runs = targets.into_iter().map(|name| {
        let path = join_remote(base, name);
        async move {
            let result = match timeout(budget, measure(runner, &path, remote_secs)).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::Timeout(path.clone())),
            };
            (name, result)
        }
    });

    let mut sizes = BTreeMap::new();
    let results: Vec<_> = stream::iter(runs)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    for (name, result) in results {
        match result {
            Ok(size) if size > 0 => {
                sizes.insert(name.clone(), size);
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(name = %name, "Disk usage skipped: {}", e),
        }
    }
    sizes
}
