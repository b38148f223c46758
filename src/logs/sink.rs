use crate::error::{FleetError, Result};
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Prefix of lines written by the supervisor itself
pub const MARKER_PREFIX: &str = "[fleetd]";

/// Path of a tenant's log file inside `log_dir`
pub fn log_path(log_dir: &Path, id: &str) -> PathBuf {
    log_dir.join(format!("{}.log", id))
}

/// Log file receiving one start attempt's combined stdout/stderr.
///
/// Every start truncates the previous run's output, so what is in the file
/// always belongs to the current process.
pub struct TenantLogSink {
    path: PathBuf,
    file: File,
}

impl TenantLogSink {
    /// Truncate (or create) the tenant's log and write the startup marker
    pub fn create(log_dir: &Path, id: &str, binary: &Path, args: &[String]) -> Result<Self> {
        std::fs::create_dir_all(log_dir)
            .map_err(|e| FleetError::LogError(format!("Failed to create log directory: {}", e)))?;

        let path = log_path(log_dir, id);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| FleetError::LogError(format!("Failed to open {}: {}", path.display(), e)))?;

        let mut sink = Self { path, file };
        sink.marker(&format!(
            "Starting tenant {} at {}",
            id,
            Utc::now().to_rfc3339()
        ))?;
        sink.marker(&format!("Command: {} {}", binary.display(), args.join(" ")))?;

        Ok(sink)
    }

    /// Handles for the child's stdout and stderr, both sharing this file
    pub fn stdio(&self) -> Result<(Stdio, Stdio)> {
        let stdout = self.clone_handle()?;
        let stderr = self.clone_handle()?;
        Ok((Stdio::from(stdout), Stdio::from(stderr)))
    }

    /// Append a supervisor line
    pub fn marker(&mut self, message: &str) -> Result<()> {
        writeln!(self.file, "{} {}", MARKER_PREFIX, message)
            .map_err(|e| FleetError::LogError(format!("Failed to write log marker: {}", e)))
    }

    /// Flush buffered output to disk and release the supervisor's handle
    pub fn close(mut self) -> Result<()> {
        self.file
            .flush()
            .and_then(|_| self.file.sync_data())
            .map_err(|e| FleetError::LogError(format!("Failed to flush log: {}", e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn clone_handle(&self) -> Result<File> {
        self.file
            .try_clone()
            .map_err(|e| FleetError::LogError(format!("Failed to share log handle: {}", e)))
    }
}
