use crate::error::{FleetError, Result, StartFailureKind};
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Placeholder replaced with the tenant's data directory
pub const DATA_DIR_PLACEHOLDER: &str = "{data_dir}";
/// Placeholder replaced with the tenant's loopback listen address
pub const ADDR_PLACEHOLDER: &str = "{addr}";

/// Metadata returned when spawning a backend
#[derive(Debug)]
pub struct SpawnedProcess {
    /// The child process handle
    pub child: Child,

    /// Process ID assigned by the OS
    pub pid: u32,
}

/// Substitute the per-tenant placeholders in the argument template
pub fn render_args(template: &[String], data_dir: &Path, addr: &str) -> Vec<String> {
    let data_dir = data_dir.to_string_lossy();
    template
        .iter()
        .map(|arg| {
            arg.replace(DATA_DIR_PLACEHOLDER, &data_dir)
                .replace(ADDR_PLACEHOLDER, addr)
        })
        .collect()
}

/// Spawn one tenant's backend.
///
/// stdout and stderr go to the handles supplied by the log sink; stdin is
/// closed. The child is killed if its handle is dropped without being reaped.
pub fn spawn_backend(
    id: &str,
    binary: &Path,
    args: &[String],
    stdout: Stdio,
    stderr: Stdio,
) -> Result<SpawnedProcess> {
    let mut command = Command::new(binary);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| FleetError::start_failure(id, StartFailureKind::Spawn(e.to_string())))?;

    let pid = child.id().ok_or_else(|| {
        FleetError::start_failure(
            id,
            StartFailureKind::Spawn("spawned process has no PID".to_string()),
        )
    })?;

    Ok(SpawnedProcess { child, pid })
}
