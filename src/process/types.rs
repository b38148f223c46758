use crate::tenant::Tenant;
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// How a backend process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitDiagnosis {
    /// Exited with status 0
    pub success: bool,
    pub description: String,
}

impl ExitDiagnosis {
    pub fn from_status(status: ExitStatus) -> Self {
        Self {
            success: status.success(),
            description: status.to_string(),
        }
    }

    /// The exit status could not be collected
    pub fn from_wait_error(err: &std::io::Error) -> Self {
        Self {
            success: false,
            description: format!("wait failed: {}", err),
        }
    }
}

impl std::fmt::Display for ExitDiagnosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}

/// Registry entry for a tenant's running backend.
///
/// The `Child` itself is owned by the crash monitor task; the registry only
/// keeps what other operations need to find and stop it.
#[derive(Debug)]
pub struct ManagedProcess {
    /// Tenant snapshot taken when the process was started
    pub tenant: Tenant,
    pub pid: u32,
    /// Distinguishes successive processes of the same tenant
    pub generation: u64,
    pub started_at: Instant,
    /// Cancelled exactly when the supervisor stops this process on purpose
    pub cancel: CancellationToken,
    /// Becomes `Some` once the monitor has observed the exit and updated the record
    pub exited: watch::Receiver<Option<ExitDiagnosis>>,
}

impl ManagedProcess {
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Cloneable view used to stop the process without holding the registry lock
    pub fn handle(&self) -> ProcessHandle {
        ProcessHandle {
            pid: self.pid,
            generation: self.generation,
            cancel: self.cancel.clone(),
            exited: self.exited.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: u32,
    pub generation: u64,
    pub cancel: CancellationToken,
    pub exited: watch::Receiver<Option<ExitDiagnosis>>,
}

impl ProcessHandle {
    /// Wait until the monitor reports the exit, or `timeout` elapses.
    ///
    /// Returns `None` on timeout.
    pub async fn wait_exit(&mut self, timeout: Duration) -> Option<ExitDiagnosis> {
        let waited = tokio::time::timeout(timeout, self.exited.wait_for(|d| d.is_some())).await;
        match waited {
            Ok(Ok(diagnosis)) => diagnosis.clone(),
            // Monitor went away without reporting; nothing left to wait for
            Ok(Err(_)) => Some(ExitDiagnosis {
                success: false,
                description: "monitor ended".to_string(),
            }),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_diagnosis_from_status() {
        let status = tokio::process::Command::new("/bin/sh")
            .args(["-c", "exit 3"])
            .status()
            .await
            .unwrap();

        let diagnosis = ExitDiagnosis::from_status(status);
        assert!(!diagnosis.success);
        assert_eq!(diagnosis.to_string(), "exit status: 3");
    }

    #[tokio::test]
    async fn test_handle_wait_exit() {
        let (tx, rx) = watch::channel(None);
        let mut handle = ProcessHandle {
            pid: 1,
            generation: 1,
            cancel: CancellationToken::new(),
            exited: rx,
        };

        assert!(handle.wait_exit(Duration::from_millis(20)).await.is_none());

        tx.send(Some(ExitDiagnosis {
            success: true,
            description: "exit status: 0".to_string(),
        }))
        .unwrap();
        let diagnosis = handle.wait_exit(Duration::from_millis(20)).await.unwrap();
        assert!(diagnosis.success);
    }
}
