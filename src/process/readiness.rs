use crate::config::Timings;
use crate::error::{FleetError, Result, StartFailureKind};
use crate::process::ExitDiagnosis;
use tokio::net::TcpStream;
use tokio::process::Child;
use tokio::time::{sleep, timeout};
use tracing::debug;

/// Non-destructive liveness probe on an owned child.
///
/// Returns the exit diagnosis if the process is already gone.
pub fn check_exited(child: &mut Child) -> Option<ExitDiagnosis> {
    match child.try_wait() {
        Ok(None) => None,
        Ok(Some(status)) => Some(ExitDiagnosis::from_status(status)),
        Err(e) => Some(ExitDiagnosis::from_wait_error(&e)),
    }
}

/// One TCP connect attempt against the tenant's loopback port
pub async fn probe_port(port: u16, connect_timeout: std::time::Duration) -> bool {
    matches!(
        timeout(connect_timeout, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

/// Confirm a freshly spawned backend is alive and accepting connections.
///
/// Waits the settle delay, checks the process survived, then polls the port
/// until it accepts a connection. Liveness is re-checked before every probe.
///
/// Each attempt probes first and sleeps the interval only after a miss, so
/// the total wait stays within `readiness_attempts * readiness_interval`.
pub async fn confirm_started(id: &str, child: &mut Child, port: u16, timings: &Timings) -> Result<()> {
    sleep(timings.settle_delay()).await;

    if let Some(exit) = check_exited(child) {
        return Err(FleetError::start_failure(
            id,
            StartFailureKind::ExitedImmediately(exit.description),
        ));
    }

    for attempt in 1..=timings.readiness_attempts {
        if let Some(exit) = check_exited(child) {
            return Err(FleetError::start_failure(
                id,
                StartFailureKind::DiedDuringStartup(exit.description),
            ));
        }

        if probe_port(port, timings.connect_timeout()).await {
            debug!(tenant = %id, port, attempt, "Backend accepting connections");
            return Ok(());
        }

        sleep(timings.readiness_interval()).await;
    }

    Err(FleetError::start_failure(
        id,
        StartFailureKind::ReadinessTimeout {
            port,
            waited: timings.readiness_interval() * timings.readiness_attempts,
        },
    ))
}
