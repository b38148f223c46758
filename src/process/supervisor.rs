use crate::config::DaemonConfig;
use crate::error::{FleetError, Result, StartFailureKind};
use crate::logs::{self, TenantLogSink};
use crate::process::locks::OperationLocks;
use crate::process::readiness;
use crate::process::restart::{RestartPolicy, RestartTracker};
use crate::process::spawner::{render_args, spawn_backend, SpawnedProcess};
use crate::process::stats::ResourceSampler;
use crate::process::ManagedProcess;
use crate::reload::ReloadSignal;
use crate::state::TenantStore;
use crate::tenant::{
    sanitize_id, CreateTenantRequest, CreateTenantResponse, Tenant, TenantStatus,
    TenantStatusReport,
};
use dashmap::DashMap;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on waiting for a process to disappear after SIGKILL
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Supervises one backend process per tenant.
///
/// Cheap to clone; every clone drives the same registry. Lifecycle operations
/// on one tenant are serialized, different tenants proceed in parallel.
#[derive(Clone)]
pub struct TenantSupervisor {
    pub(super) inner: Arc<SupervisorInner>,
}

pub(super) struct SupervisorInner {
    pub(super) config: DaemonConfig,
    pub(super) store: Arc<dyn TenantStore>,
    /// Tenant ID -> running backend. Never held across an await.
    pub(super) registry: RwLock<HashMap<String, ManagedProcess>>,
    pub(super) locks: OperationLocks,
    /// Crash restarts waiting for their backoff, keyed by tenant ID
    pub(super) pending_restarts: DashMap<String, (u64, CancellationToken)>,
    pub(super) restart_history: DashMap<String, RestartTracker>,
    pub(super) restart_policy: RestartPolicy,
    sequence: AtomicU64,
    reload: ReloadSignal,
    sampler: ResourceSampler,
    stop_signal: Signal,
}

impl TenantSupervisor {
    pub fn new(config: DaemonConfig, store: Arc<dyn TenantStore>, reload: ReloadSignal) -> Result<Self> {
        let stop_signal = parse_signal(&config.backend.stop_signal)?;
        let restart_policy = RestartPolicy::from_config(&config.restart);

        Ok(Self {
            inner: Arc::new(SupervisorInner {
                config,
                store,
                registry: RwLock::new(HashMap::new()),
                locks: OperationLocks::new(),
                pending_restarts: DashMap::new(),
                restart_history: DashMap::new(),
                restart_policy,
                sequence: AtomicU64::new(1),
                reload,
                sampler: ResourceSampler::new(),
                stop_signal,
            }),
        })
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.inner.store
    }

    /// Whether a backend is currently registered for `id`
    pub fn is_running(&self, id: &str) -> bool {
        self.inner.registry.read().contains_key(id)
    }

    pub fn running_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    /// PID of the registered backend, if any
    pub fn pid_of(&self, id: &str) -> Option<u32> {
        self.inner.registry.read().get(id).map(|p| p.pid)
    }

    /// Whether a crash restart is waiting for `id`
    pub fn restart_pending(&self, id: &str) -> bool {
        self.inner.pending_restarts.contains_key(id)
    }

    pub fn log_path(&self, id: &str) -> PathBuf {
        logs::log_path(&self.inner.config.log_dir(), id)
    }

    /// Ask the proxy consumer to regenerate its routing
    pub fn notify_reload(&self) -> bool {
        self.inner.reload.notify()
    }

    /// Start a tenant's backend; a no-op if it is already running
    pub async fn start_tenant(&self, id: &str) -> Result<()> {
        let _guard = self.inner.locks.acquire(id).await;
        self.start_unlocked(id).await
    }

    /// Stop a tenant's backend; a no-op if it is not running.
    ///
    /// Any pending crash restart is cancelled and the record ends `stopped`.
    pub async fn stop_tenant(&self, id: &str) -> Result<()> {
        let _guard = self.inner.locks.acquire(id).await;
        self.stop_unlocked(id).await
    }

    pub async fn restart_tenant(&self, id: &str) -> Result<()> {
        let _guard = self.inner.locks.acquire(id).await;
        self.inner.store.get_tenant(id)?;

        self.stop_unlocked(id).await?;
        tokio::time::sleep(self.inner.config.timings.restart_pause()).await;
        self.start_unlocked(id).await
    }

    /// Register a new tenant and bring its backend up.
    ///
    /// If the start fails the record is kept (status `stopped`) and the
    /// start error is returned.
    pub async fn create_tenant(&self, request: CreateTenantRequest) -> Result<CreateTenantResponse> {
        let id = sanitize_id(&request.subdomain);
        if id.is_empty() {
            return Err(FleetError::InvalidSubdomain(request.subdomain));
        }

        let guard = self.inner.locks.acquire(&id).await;
        let config = &self.inner.config;

        if self.inner.store.get_tenant(&id).is_ok() {
            return Err(FleetError::Conflict(request.subdomain));
        }

        let port = self.inner.store.allocate_port(config.backend.base_port)?;
        let data_dir = config.tenant_dir(&id);
        tokio::fs::create_dir_all(&data_dir).await.map_err(|e| {
            FleetError::start_failure(&id, StartFailureKind::DataDir(e.to_string()))
        })?;

        let tenant = Tenant::new(id.clone(), request.display_name(), id.clone(), port, data_dir);
        self.inner.store.add_tenant(tenant)?;
        info!(tenant = %id, port, "Tenant created");

        self.start_unlocked(&id).await?;
        drop(guard);

        self.notify_reload();

        // Best effort: the backend prints its first-run link shortly after binding
        tokio::time::sleep(config.timings.setup_link_delay()).await;
        let setup_url = logs::find_setup_url(&self.log_path(&id), &id, &config.proxy.domain_name).await;

        Ok(CreateTenantResponse {
            tenant: self.inner.store.get_tenant(&id)?,
            setup_url,
        })
    }

    /// Stop and forget a tenant, optionally removing its data
    pub async fn delete_tenant(&self, id: &str, delete_data: bool) -> Result<()> {
        let guard = self.inner.locks.acquire(id).await;

        let tenant = self.inner.store.get_tenant(id)?;
        self.stop_unlocked(id).await?;
        self.inner.store.remove_tenant(id)?;
        self.inner.restart_history.remove(id);

        if delete_data {
            if let Err(e) = tokio::fs::remove_dir_all(&tenant.data_dir).await {
                warn!(tenant = %id, path = %tenant.data_dir.display(), error = %e, "Failed to remove tenant data");
            }
            if let Err(e) = tokio::fs::remove_file(self.log_path(id)).await {
                debug!(tenant = %id, error = %e, "No log file removed");
            }
        }

        drop(guard);
        self.inner.locks.forget(id);

        info!(tenant = %id, delete_data, "Tenant deleted");
        self.notify_reload();
        Ok(())
    }

    /// Start every stored tenant; returns how many came up.
    ///
    /// PIDs left over from a previous daemon are cleared first. Failures are
    /// logged per tenant.
    pub async fn start_all(&self) -> usize {
        let tenants = self.inner.store.tenants();

        for tenant in &tenants {
            if tenant.pid.is_some() && !self.is_running(&tenant.id) {
                let cleared = self.inner.store.modify_tenant(&tenant.id, &mut |t| {
                    t.mark_stopped();
                    true
                });
                if let Err(e) = cleared {
                    warn!(tenant = %tenant.id, error = %e, "Failed to clear stale pid");
                }
            }
        }

        let mut tasks = JoinSet::new();
        for tenant in tenants {
            let supervisor = self.clone();
            tasks.spawn(async move {
                let result = supervisor.start_tenant(&tenant.id).await;
                (tenant.id, result)
            });
        }

        let mut started = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => started += 1,
                Ok((id, Err(e))) => error!(tenant = %id, error = %e, "Failed to start tenant at boot"),
                Err(e) => error!(error = %e, "Boot start task failed"),
            }
        }

        info!(started, "Boot start complete");
        started
    }

    /// Stop every running tenant concurrently
    pub async fn stop_all(&self) {
        let pending: Vec<String> = self
            .inner
            .pending_restarts
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in pending {
            self.cancel_pending_restart(&id);
        }

        let ids: Vec<String> = self.inner.registry.read().keys().cloned().collect();
        info!(count = ids.len(), "Stopping all tenants");

        let mut tasks = JoinSet::new();
        for id in ids {
            let supervisor = self.clone();
            tasks.spawn(async move {
                let result = supervisor.stop_tenant(&id).await;
                (id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((id, Err(e))) => error!(tenant = %id, error = %e, "Failed to stop tenant"),
                Err(e) => error!(error = %e, "Stop task failed"),
            }
        }
    }

    pub fn tenant_status(&self, id: &str) -> Result<TenantStatusReport> {
        let tenant = self.inner.store.get_tenant(id)?;
        Ok(self.report(tenant))
    }

    pub fn all_statuses(&self) -> Vec<TenantStatusReport> {
        self.inner
            .store
            .tenants()
            .into_iter()
            .map(|tenant| self.report(tenant))
            .collect()
    }

    /// Last `lines` lines of the tenant's current log
    pub async fn tenant_logs(&self, id: &str, lines: usize) -> Result<Vec<String>> {
        self.inner.store.get_tenant(id)?;
        logs::read_last_lines(&self.log_path(id), lines).await
    }

    fn report(&self, tenant: Tenant) -> TenantStatusReport {
        let live = self
            .inner
            .registry
            .read()
            .get(&tenant.id)
            .map(|p| (p.pid, p.uptime().as_secs()));

        let usage = live.and_then(|(pid, _)| self.inner.sampler.sample(pid));
        let proxy = &self.inner.config.proxy;
        let scheme = if proxy.enable_https { "https" } else { "http" };
        let host = format!("{}.{}", tenant.subdomain, proxy.domain_name);

        TenantStatusReport {
            admin_url: format!("{}://{}/_/", scheme, host),
            public_url: format!("{}://{}/", scheme, host),
            pid: live.map(|(pid, _)| pid).or(tenant.pid),
            uptime_secs: live.map(|(_, uptime)| uptime),
            memory_bytes: usage.map(|u| u.memory_bytes),
            cpu_percent: usage.map(|u| u.cpu_percent),
            id: tenant.id,
            subdomain: tenant.subdomain,
            status: tenant.status,
            port: tenant.port,
        }
    }

    /// Start protocol; the caller holds the tenant's operation lock
    pub(super) async fn start_unlocked(&self, id: &str) -> Result<()> {
        let tenant = self.inner.store.get_tenant(id)?;
        if self.is_running(id) {
            debug!(tenant = %id, "Already running");
            return Ok(());
        }

        let config = &self.inner.config;
        let binary = &config.backend.binary;

        tokio::fs::create_dir_all(&tenant.data_dir).await.map_err(|e| {
            FleetError::start_failure(id, StartFailureKind::DataDir(e.to_string()))
        })?;

        if !binary.exists() {
            return Err(FleetError::start_failure(
                id,
                StartFailureKind::BinaryMissing(binary.clone()),
            ));
        }

        let args = render_args(&config.backend.args, &tenant.data_dir, &tenant.listen_addr());
        let sink = TenantLogSink::create(&config.log_dir(), id, binary, &args)
            .map_err(|e| FleetError::start_failure(id, StartFailureKind::LogSink(e.to_string())))?;
        let (stdout, stderr) = match sink.stdio() {
            Ok(stdio) => stdio,
            Err(e) => {
                let _ = sink.close();
                return Err(FleetError::start_failure(id, StartFailureKind::LogSink(e.to_string())));
            }
        };

        info!(tenant = %id, port = tenant.port, "Starting tenant");

        let SpawnedProcess { mut child, pid } = match spawn_backend(id, binary, &args, stdout, stderr) {
            Ok(spawned) => spawned,
            Err(e) => {
                let _ = sink.close();
                return Err(self.with_log_tail(e).await);
            }
        };

        if let Err(e) = readiness::confirm_started(id, &mut child, tenant.port, &config.timings).await {
            let mut sink = sink;
            let _ = sink.marker(&format!("Startup failed: {}", e));
            let _ = sink.close();
            reap(&mut child).await;
            return Err(self.with_log_tail(e).await);
        }

        if let Err(e) = sink.close() {
            debug!(tenant = %id, error = %e, "Failed to flush startup markers");
        }

        let generation = self.next_sequence();
        let cancel = CancellationToken::new();
        let (exit_tx, exit_rx) = watch::channel(None);

        self.inner.registry.write().insert(
            id.to_string(),
            ManagedProcess {
                tenant: tenant.clone(),
                pid,
                generation,
                started_at: Instant::now(),
                cancel: cancel.clone(),
                exited: exit_rx,
            },
        );

        let persisted = self.inner.store.modify_tenant(id, &mut |t| {
            t.mark_running(pid);
            true
        });
        if let Err(e) = persisted {
            self.unregister(id, generation);
            cancel.cancel();
            reap(&mut child).await;
            return Err(e);
        }

        self.spawn_monitor(id.to_string(), generation, pid, child, cancel, exit_tx);

        info!(tenant = %id, port = tenant.port, pid, "Tenant started");
        Ok(())
    }

    /// Stop protocol; the caller holds the tenant's operation lock
    pub(super) async fn stop_unlocked(&self, id: &str) -> Result<()> {
        self.cancel_pending_restart(id);

        let handle = self.inner.registry.read().get(id).map(ManagedProcess::handle);
        let Some(mut handle) = handle else {
            // Also settles a tenant left in error by a crash
            return self.persist_stopped(id);
        };

        // Marks the exit as deliberate for the monitor
        handle.cancel.cancel();

        let grace = self.inner.config.timings.stop_grace();
        info!(tenant = %id, pid = handle.pid, signal = ?self.inner.stop_signal, "Stopping tenant");

        let exited = match send_signal(handle.pid, self.inner.stop_signal) {
            Ok(()) => handle.wait_exit(grace).await,
            Err(e) => {
                warn!(tenant = %id, pid = handle.pid, error = %e, "Failed to deliver stop signal");
                None
            }
        };

        if exited.is_none() {
            warn!(
                tenant = %id,
                pid = handle.pid,
                grace_ms = grace.as_millis() as u64,
                "Backend did not exit in time, sending SIGKILL"
            );
            send_signal(handle.pid, Signal::SIGKILL).map_err(|e| {
                FleetError::StopFailure(id.to_string(), format!("Failed to send SIGKILL: {}", e))
            })?;
            if handle.wait_exit(KILL_WAIT).await.is_none() {
                return Err(FleetError::StopFailure(
                    id.to_string(),
                    "process still present after SIGKILL".to_string(),
                ));
            }
        }

        self.unregister(id, handle.generation);
        // The backend may have crashed on its own while the signal was in flight
        self.cancel_pending_restart(id);
        self.persist_stopped(id)?;

        info!(tenant = %id, "Tenant stopped");
        Ok(())
    }

    /// Remove the registry entry if it still belongs to `generation`
    pub(super) fn unregister(&self, id: &str, generation: u64) -> bool {
        let mut registry = self.inner.registry.write();
        match registry.get(id) {
            Some(process) if process.generation == generation => {
                registry.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Cancel a crash restart waiting for `id`; true if one was pending
    pub(super) fn cancel_pending_restart(&self, id: &str) -> bool {
        match self.inner.pending_restarts.remove(id) {
            Some((_, (_, token))) => {
                token.cancel();
                info!(tenant = %id, "Cancelled pending crash restart");
                true
            }
            None => false,
        }
    }

    pub(super) fn next_sequence(&self) -> u64 {
        self.inner.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn persist_stopped(&self, id: &str) -> Result<()> {
        self.inner
            .store
            .modify_tenant(id, &mut |t| {
                if t.status == TenantStatus::Stopped && t.pid.is_none() {
                    return false;
                }
                t.mark_stopped();
                true
            })
            .map(|_| ())
    }

    /// Attach the tail of the tenant's log to a start failure
    async fn with_log_tail(&self, err: FleetError) -> FleetError {
        match err {
            FleetError::StartFailure { id, kind, .. } => {
                let log_tail =
                    logs::tail_text(&self.log_path(&id), self.inner.config.timings.log_tail_lines).await;
                FleetError::StartFailure { id, kind, log_tail }
            }
            other => other,
        }
    }
}

/// Kill and reap a child that never made it into the registry
async fn reap(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Kill of failed backend returned an error");
    }
    if let Err(e) = child.wait().await {
        debug!(error = %e, "Reaping failed backend returned an error");
    }
}

/// Deliver `signal` to `pid`; a process that is already gone counts as success
fn send_signal(pid: u32, signal: Signal) -> std::result::Result<(), Errno> {
    match signal::kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e),
    }
}

fn parse_signal(signal_name: &str) -> Result<Signal> {
    match signal_name {
        "SIGTERM" => Ok(Signal::SIGTERM),
        "SIGINT" => Ok(Signal::SIGINT),
        "SIGQUIT" => Ok(Signal::SIGQUIT),
        "SIGKILL" => Ok(Signal::SIGKILL),
        "SIGHUP" => Ok(Signal::SIGHUP),
        "SIGUSR1" => Ok(Signal::SIGUSR1),
        "SIGUSR2" => Ok(Signal::SIGUSR2),
        _ => Err(FleetError::SignalError(format!(
            "Invalid signal name: {}",
            signal_name
        ))),
    }
}

impl std::fmt::Debug for TenantSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantSupervisor")
            .field("running", &self.running_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signal() {
        assert_eq!(parse_signal("SIGTERM").unwrap(), Signal::SIGTERM);
        assert_eq!(parse_signal("SIGINT").unwrap(), Signal::SIGINT);
        assert!(matches!(
            parse_signal("SIGBOGUS"),
            Err(FleetError::SignalError(_))
        ));
    }

    #[test]
    fn test_send_signal_to_missing_process() {
        // Not a live pid on Linux; ESRCH is treated as delivered
        assert!(send_signal(i32::MAX as u32, Signal::SIGTERM).is_ok());
    }
}
