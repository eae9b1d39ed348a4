//! Completion handles for background backup runs.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use emberdb_storage::journal::TxId;

use super::error::{BackupError, BackupResult};
use super::manifest::{CaptureKind, TxRange};

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Backup location.
    pub location: PathBuf,
    /// Directory the capture was written to.
    pub capture_dir: PathBuf,
    /// Capture kind.
    pub kind: CaptureKind,
    /// Chain position of the capture.
    pub ordinal: u64,
    /// Transactions covered by the capture.
    pub covers: TxRange,
    /// Journal segments copied.
    pub segments_copied: usize,
    /// Bytes written, data file included.
    pub bytes_copied: u64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl BackupReport {
    /// Last transaction the capture includes.
    pub const fn last_txid(&self) -> TxId {
        self.covers.end
    }
}

/// Result of waiting on a [`BackupHandle`].
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// The run finished and its capture is committed.
    Completed(BackupReport),
    /// The run had not finished when the wait gave up.
    TimedOut,
    /// The run failed.
    Failed(Arc<BackupError>),
}

impl WaitOutcome {
    /// The report, if the run completed.
    pub fn completed(self) -> Option<BackupReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }

    /// Whether the run completed.
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[derive(Debug)]
enum RunStatus {
    Running,
    Completed(BackupReport),
    Failed(Arc<BackupError>),
}

#[derive(Debug)]
struct HandleState {
    status: Mutex<RunStatus>,
    done: Condvar,
}

/// A cloneable handle on one backup run.
#[derive(Debug, Clone)]
pub struct BackupHandle {
    state: Arc<HandleState>,
}

impl BackupHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(HandleState {
                status: Mutex::new(RunStatus::Running),
                done: Condvar::new(),
            }),
        }
    }

    /// Record the run's result and wake all waiters. Only the first call counts.
    pub(crate) fn resolve(&self, result: BackupResult<BackupReport>) {
        let mut status = self.state.status.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*status, RunStatus::Running) {
            *status = match result {
                Ok(report) => RunStatus::Completed(report),
                Err(e) => RunStatus::Failed(Arc::new(e)),
            };
        }
        drop(status);
        self.state.done.notify_all();
    }

    fn outcome(status: &RunStatus) -> Option<WaitOutcome> {
        match status {
            RunStatus::Running => None,
            RunStatus::Completed(report) => Some(WaitOutcome::Completed(report.clone())),
            RunStatus::Failed(e) => Some(WaitOutcome::Failed(Arc::clone(e))),
        }
    }

    /// Whether the run has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        let status = self.state.status.lock().unwrap_or_else(PoisonError::into_inner);
        !matches!(*status, RunStatus::Running)
    }

    /// Wait for the run to finish. `None` waits indefinitely.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut status = self.state.status.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = Self::outcome(&status) {
                return outcome;
            }
            match deadline {
                None => {
                    status = self.state.done.wait(status).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    status = self
                        .state
                        .done
                        .wait_timeout(status, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|p| p.into_inner().0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn report() -> BackupReport {
        BackupReport {
            location: PathBuf::from("/backups/a"),
            capture_dir: PathBuf::from("/backups/a"),
            kind: CaptureKind::Full,
            ordinal: 0,
            covers: TxRange::new(0, 3),
            segments_copied: 1,
            bytes_copied: 10,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_unresolved_times_out() {
        let handle = BackupHandle::new();
        assert!(matches!(handle.wait(Some(Duration::from_millis(10))), WaitOutcome::TimedOut));
        assert!(!handle.is_finished());
    }

    #[test]
    fn test_resolve_wakes_waiter() {
        let handle = BackupHandle::new();
        let resolver = handle.clone();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(Ok(report()));
        });
        let outcome = handle.wait(None);
        worker.join().expect("join");
        assert_eq!(outcome.completed().map(|r| r.last_txid()), Some(3));
    }

    #[test]
    fn test_first_resolution_wins() {
        let handle = BackupHandle::new();
        handle.resolve(Err(BackupError::Internal("boom".into())));
        handle.resolve(Ok(report()));
        assert!(matches!(handle.wait(Some(Duration::ZERO)), WaitOutcome::Failed(_)));
    }
}
