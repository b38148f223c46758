use crate::error::FleetError;
use crate::logs;
use crate::process::supervisor::TenantSupervisor;
use crate::process::ExitDiagnosis;
use tokio::process::Child;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

impl TenantSupervisor {
    /// Watch a registered backend until it exits
    pub(super) fn spawn_monitor(
        &self,
        id: String,
        generation: u64,
        pid: u32,
        child: Child,
        cancel: CancellationToken,
        exited: watch::Sender<Option<ExitDiagnosis>>,
    ) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor
                .monitor(id, generation, pid, child, cancel, exited)
                .await;
        });
    }

    async fn monitor(
        self,
        id: String,
        generation: u64,
        pid: u32,
        mut child: Child,
        cancel: CancellationToken,
        exited: watch::Sender<Option<ExitDiagnosis>>,
    ) {
        let diagnosis = match child.wait().await {
            Ok(status) => ExitDiagnosis::from_status(status),
            Err(e) => ExitDiagnosis::from_wait_error(&e),
        };

        let deliberate = cancel.is_cancelled();
        let crashed = !deliberate && !diagnosis.success;

        // The restart must be cancellable before the process leaves the registry
        let restart = crashed.then(|| self.register_pending_restart(&id));

        self.unregister(&id, generation);

        // A newer process may already own the record
        let updated = self.inner.store.modify_tenant(&id, &mut |tenant| {
            if tenant.pid != Some(pid) {
                return false;
            }
            if crashed {
                tenant.mark_errored();
            } else {
                tenant.mark_stopped();
            }
            true
        });
        match updated {
            Ok(_) => {}
            Err(FleetError::NotFound(_)) => debug!(tenant = %id, "Record gone before exit was recorded"),
            Err(e) => warn!(tenant = %id, error = %e, "Failed to record backend exit"),
        }

        if deliberate {
            debug!(tenant = %id, pid, exit = %diagnosis, "Backend exited after stop request");
        } else if crashed {
            let tail = logs::tail_text(
                &self.log_path(&id),
                self.inner.config.timings.log_tail_lines,
            )
            .await;
            error!(
                tenant = %id,
                pid,
                exit = %diagnosis,
                log_tail = tail.as_deref().unwrap_or(""),
                "Backend crashed"
            );
        } else {
            warn!(tenant = %id, pid, "Backend exited cleanly without a stop request, not restarting");
        }

        exited.send_replace(Some(diagnosis));

        if let Some((ticket, token)) = restart {
            self.restart_after_crash(id, ticket, token).await;
        }
    }

    fn register_pending_restart(&self, id: &str) -> (u64, CancellationToken) {
        let ticket = self.next_sequence();
        let token = CancellationToken::new();
        if let Some((_, stale)) = self
            .inner
            .pending_restarts
            .insert(id.to_string(), (ticket, token.clone()))
        {
            stale.cancel();
        }
        (ticket, token)
    }

    /// Bring a crashed tenant back, retrying after each failed attempt.
    ///
    /// The loop ends on success, on a non-retryable error, when the restart
    /// ceiling is reached, or when a stop/delete cancels it.
    async fn restart_after_crash(&self, id: String, ticket: u64, token: CancellationToken) {
        let policy = &self.inner.restart_policy;

        loop {
            let delay = {
                let mut tracker = self.inner.restart_history.entry(id.clone()).or_default();
                tracker.prune_old_restarts(policy.time_window_secs);
                if policy.should_restart(&tracker) {
                    let delay = policy.calculate_delay(&tracker);
                    tracker.record_restart();
                    Some(delay)
                } else {
                    None
                }
            };

            let Some(delay) = delay else {
                warn!(
                    tenant = %id,
                    window_secs = policy.time_window_secs,
                    "Crash restart limit reached, leaving tenant in error"
                );
                break;
            };

            info!(tenant = %id, delay_ms = delay.as_millis() as u64, "Restarting after crash");

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let guard = self.inner.locks.acquire(&id).await;
            // A stop or delete may have landed while this attempt waited
            if token.is_cancelled() {
                break;
            }
            let result = self.start_unlocked(&id).await;
            drop(guard);

            match result {
                Ok(()) => {
                    info!(tenant = %id, "Tenant recovered after crash");
                    break;
                }
                Err(e) if !e.is_retryable() => {
                    error!(tenant = %id, error = %e, "Giving up on crash restart");
                    break;
                }
                Err(e) => {
                    warn!(tenant = %id, error = %e, "Crash restart attempt failed");
                }
            }
        }

        self.inner
            .pending_restarts
            .remove_if(&id, |_, (owner, _)| *owner == ticket);
    }
}
