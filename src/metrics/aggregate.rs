use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use super::MetricsError;
use super::sample::{Merged, Snapshot};

const WORKER_FILE_PREFIX: &str = "worker-";
const WORKER_FILE_SUFFIX: &str = ".json";

/// Combines this process's samples with those of its sibling workers.
pub trait Aggregator: Send + Sync {
    /// Makes the local samples visible to other workers.
    fn publish(&self, local: &Snapshot) -> Result<(), MetricsError>;

    /// Aggregate view for a scrape. Must always include `local`.
    fn collect(&self, local: Snapshot) -> Merged;

    /// Whether `publish` reaches other processes and should run periodically.
    fn is_shared(&self) -> bool {
        false
    }
}

/// Single-process deployments: report what this process recorded.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalOnly;

impl Aggregator for LocalOnly {
    fn publish(&self, _local: &Snapshot) -> Result<(), MetricsError> {
        Ok(())
    }

    fn collect(&self, local: Snapshot) -> Merged {
        Merged::from(local)
    }
}

/// Workers sharing a directory: each owns `worker-<instance>.json` and a
/// scrape merges every worker file found there.
///
/// Files are replaced atomically (write to a dot-file, then rename), so
/// readers never see a partial snapshot and writers never lock.
#[derive(Debug, Clone)]
pub struct SharedDirectory {
    dir: PathBuf,
    own_file: PathBuf,
    tmp_file: PathBuf,
}

impl SharedDirectory {
    /// `instance` must be unique among every process that ever writes to
    /// `dir`, past ones included; a reused name replaces the older file.
    pub fn new(dir: impl Into<PathBuf>, instance: impl Display) -> Self {
        let dir = dir.into();
        let own_file = dir.join(format!("{WORKER_FILE_PREFIX}{instance}{WORKER_FILE_SUFFIX}"));
        let tmp_file = dir.join(format!(".{WORKER_FILE_PREFIX}{instance}.tmp"));
        Self {
            dir,
            own_file,
            tmp_file,
        }
    }

    /// Directory slot for the running process: pid, start time and a random
    /// tag, so restarted or containerized workers (often all pid 1) never
    /// overwrite a predecessor's counts.
    pub fn for_this_process(dir: impl Into<PathBuf>) -> Self {
        let started_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis());
        let tag: u32 = rand::random();
        Self::new(dir, format!("{}-{started_ms}-{tag:08x}", std::process::id()))
    }

    pub fn own_file(&self) -> &Path {
        &self.own_file
    }

    fn worker_files(&self) -> Result<Vec<PathBuf>, MetricsError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_worker_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| {
                    n.starts_with(WORKER_FILE_PREFIX) && n.ends_with(WORKER_FILE_SUFFIX)
                });
            if is_worker_file {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn read_snapshot(path: &Path) -> Result<Snapshot, MetricsError> {
    let bytes = fs::read(path)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    snapshot.check()?;
    Ok(snapshot)
}

impl Aggregator for SharedDirectory {
    fn publish(&self, local: &Snapshot) -> Result<(), MetricsError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(&self.tmp_file, serde_json::to_vec(local)?)?;
        fs::rename(&self.tmp_file, &self.own_file)?;
        Ok(())
    }

    fn collect(&self, local: Snapshot) -> Merged {
        // Our own file may be stale if publishing fails; fall back to memory.
        let published = match self.publish(&local) {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, dir = %self.dir.display(), "failed to publish metrics before scrape");
                false
            }
        };

        let files = match self.worker_files() {
            Ok(files) => files,
            Err(error) => {
                warn!(%error, dir = %self.dir.display(), "cannot list worker metric files; reporting local samples only");
                return Merged::from(local);
            }
        };

        let mut merged = Merged::default();
        let mut included_local = false;
        for path in files {
            if path == self.own_file {
                if !published {
                    continue;
                }
                included_local = true;
            }
            match read_snapshot(&path) {
                Ok(snapshot) => merged.absorb(snapshot),
                Err(error) => {
                    if path == self.own_file {
                        included_local = false;
                    }
                    warn!(%error, file = %path.display(), "skipping unreadable worker metric file");
                }
            }
        }
        if !included_local {
            merged.absorb(local);
        }
        merged
    }

    fn is_shared(&self) -> bool {
        true
    }
}
