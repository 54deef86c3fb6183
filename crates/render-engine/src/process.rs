//! Active process table.
//!
//! Each render job owns at most one external process at a time (the raster
//! worker, then the encoder). The table maps job id to that process so a
//! cancel request can reach it. Entries are registered right after spawn and
//! removed by [`ProcessGuard`] on drop, whatever path the owner exits by.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use deckreel_common::error::{DeckreelError, DeckreelResult};
use deckreel_deck_model::job::RenderId;
use tokio_util::sync::CancellationToken;

/// Whether `binary` can be found on `PATH` (or is an existing path).
pub fn command_exists(binary: impl AsRef<std::path::Path>) -> bool {
    let binary = binary.as_ref();
    if binary.components().count() > 1 {
        return binary.is_file();
    }
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {} >/dev/null 2>&1", binary.display()))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Snapshot of a registered process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveProcessInfo {
    pub label: &'static str,
    pub pid: Option<u32>,
}

#[derive(Debug)]
struct ActiveProcess {
    seq: u64,
    label: &'static str,
    pid: Option<u32>,
    kill: CancellationToken,
}

/// Job id → currently active external process.
#[derive(Debug, Default)]
pub struct ProcessTable {
    entries: Mutex<HashMap<RenderId, ActiveProcess>>,
    next_seq: AtomicU64,
}

impl ProcessTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<RenderId, ActiveProcess>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Signal the job's active process to die. Returns whether one was registered.
    pub fn terminate(&self, job_id: RenderId) -> bool {
        match self.entries().get(&job_id) {
            Some(active) => {
                tracing::info!(
                    job_id = %job_id,
                    process = active.label,
                    pid = ?active.pid,
                    "Terminating active process"
                );
                active.kill.cancel();
                true
            }
            None => false,
        }
    }

    /// The job's active process, if any.
    pub fn active(&self, job_id: RenderId) -> Option<ActiveProcessInfo> {
        self.entries().get(&job_id).map(|p| ActiveProcessInfo {
            label: p.label,
            pid: p.pid,
        })
    }

    /// Number of jobs that currently own a process.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A job's handle on the process table, passed to the components that spawn
/// processes on the job's behalf.
#[derive(Debug, Clone)]
pub struct ProcessScope {
    table: Arc<ProcessTable>,
    job_id: RenderId,
    cancel: CancellationToken,
}

impl ProcessScope {
    pub fn new(table: Arc<ProcessTable>, job_id: RenderId, cancel: CancellationToken) -> Self {
        Self {
            table,
            job_id,
            cancel,
        }
    }

    /// A scope with its own table and token, for one-off runs outside a coordinator.
    pub fn detached() -> Self {
        Self::new(ProcessTable::new(), uuid::Uuid::new_v4(), CancellationToken::new())
    }

    pub fn job_id(&self) -> RenderId {
        self.job_id
    }

    /// Job-level cancellation token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast with [`DeckreelError::Canceled`] once the job is canceled.
    pub fn check_canceled(&self) -> DeckreelResult<()> {
        if self.is_canceled() {
            Err(DeckreelError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Register a freshly spawned process as the job's active one.
    ///
    /// The returned guard's kill token is a child of the job token, so a
    /// cancel that raced ahead of the spawn still kills the process.
    pub fn register(&self, label: &'static str, pid: Option<u32>) -> DeckreelResult<ProcessGuard> {
        let kill = self.cancel.child_token();
        let seq = self.table.next_seq.fetch_add(1, Ordering::Relaxed);
        {
            let mut entries = self.table.entries();
            if let Some(existing) = entries.get(&self.job_id) {
                return Err(DeckreelError::unsupported(format!(
                    "Job {} already owns an active {} process",
                    self.job_id, existing.label
                )));
            }
            entries.insert(
                self.job_id,
                ActiveProcess {
                    seq,
                    label,
                    pid,
                    kill: kill.clone(),
                },
            );
        }
        tracing::debug!(job_id = %self.job_id, process = label, pid = ?pid, "Registered active process");
        Ok(ProcessGuard {
            table: Arc::clone(&self.table),
            job_id: self.job_id,
            seq,
            label,
            kill,
        })
    }
}

/// Registration of one process; deregisters on drop.
#[derive(Debug)]
pub struct ProcessGuard {
    table: Arc<ProcessTable>,
    job_id: RenderId,
    seq: u64,
    label: &'static str,
    kill: CancellationToken,
}

impl ProcessGuard {
    /// Resolves once the process should be killed.
    pub async fn killed(&self) {
        self.kill.cancelled().await
    }

    pub fn is_killed(&self) -> bool {
        self.kill.is_cancelled()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        let mut entries = self.table.entries();
        if entries.get(&self.job_id).map(|p| p.seq) == Some(self.seq) {
            entries.remove(&self.job_id);
            tracing::debug!(job_id = %self.job_id, process = self.label, "Deregistered active process");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_drop_deregisters() {
        let scope = ProcessScope::detached();
        let table = Arc::clone(&scope.table);
        {
            let _guard = scope.register("ffmpeg", Some(42)).unwrap();
            assert_eq!(
                table.active(scope.job_id()),
                Some(ActiveProcessInfo {
                    label: "ffmpeg",
                    pid: Some(42)
                })
            );
        }
        assert!(table.active(scope.job_id()).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_only_one_active_process_per_job() {
        let scope = ProcessScope::detached();
        let _first = scope.register("raster-worker", None).unwrap();
        assert!(scope.register("ffmpeg", None).is_err());
    }

    #[test]
    fn test_terminate_signals_guard() {
        let scope = ProcessScope::detached();
        let guard = scope.register("ffmpeg", None).unwrap();
        assert!(scope.table.terminate(scope.job_id()));
        assert!(guard.is_killed());
        // Job token itself is untouched by a process-level kill.
        assert!(!scope.is_canceled());
    }

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("deckreel-definitely-missing-binary"));
        assert!(!command_exists("/nonexistent/dir/ffmpeg"));
    }

    #[test]
    fn test_terminate_without_process() {
        let table = ProcessTable::new();
        assert!(!table.terminate(uuid::Uuid::new_v4()));
    }

    #[test]
    fn test_job_cancel_before_spawn_kills_new_process() {
        let scope = ProcessScope::detached();
        scope.cancel_token().cancel();
        let guard = scope.register("ffmpeg", None).unwrap();
        assert!(guard.is_killed());
        assert!(scope.check_canceled().is_err());
    }

    #[tokio::test]
    async fn test_killed_future_resolves() {
        let scope = ProcessScope::detached();
        let guard = scope.register("ffmpeg", None).unwrap();
        let table = Arc::clone(&scope.table);
        let job_id = scope.job_id();
        tokio::spawn(async move {
            table.terminate(job_id);
        });
        tokio::time::timeout(std::time::Duration::from_secs(1), guard.killed())
            .await
            .unwrap();
    }
}
