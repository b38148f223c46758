// PID file management for the daemon process

use crate::error::{FleetError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default PID file location
pub const DEFAULT_PID_FILE: &str = "/tmp/fleetd.pid";

/// Manages the daemon PID file
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create a new PID file manager with default path
    pub fn new() -> Self {
        Self::with_path(DEFAULT_PID_FILE)
    }

    /// Create a new PID file manager with custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Record this process as the daemon.
    ///
    /// Fails with `DaemonAlreadyRunning` when the file names a live process;
    /// a stale file left by a dead daemon is overwritten.
    pub fn acquire(&self) -> Result<()> {
        if let Some(pid) = self.running_pid() {
            if pid != std::process::id() {
                return Err(FleetError::DaemonAlreadyRunning(pid));
            }
        }
        self.write()
    }

    /// Write the current process PID to the file
    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, std::process::id().to_string())
            .map_err(|e| FleetError::Other(format!("Failed to write PID file: {}", e)))
    }

    /// Read the PID from the file
    pub fn read(&self) -> Result<u32> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| FleetError::Other(format!("Failed to read PID file: {}", e)))?;

        content
            .trim()
            .parse::<u32>()
            .map_err(|e| FleetError::Other(format!("Invalid PID in file: {}", e)))
    }

    /// Check if the PID file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the PID file
    pub fn remove(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| FleetError::Other(format!("Failed to remove PID file: {}", e)))?;
        }
        Ok(())
    }

    /// PID recorded in the file, if that process is still alive
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.read().ok()?;
        is_process_alive(pid).then_some(pid)
    }

    /// Get the path to the PID file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for PidFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe with signal 0
fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists, owned by someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
