// Daemon runtime - Wires the store, supervisor, reload consumer and IPC server

use crate::config::DaemonConfig;
use crate::daemon::{handler, PidFile};
use crate::error::Result;
use crate::ipc::server::IpcServer;
use crate::process::TenantSupervisor;
use crate::reload::{self, CaddyController, LogOnlyController, ProxyController, ReloadReceiver};
use crate::state::{JsonTenantStore, TenantStore};
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main daemon struct that coordinates all components
pub struct Daemon {
    supervisor: TenantSupervisor,
    reload_receiver: ReloadReceiver,
    controller: Arc<dyn ProxyController>,
    caddy: Option<CaddyController>,
    ipc_server: IpcServer,
    pid_file: PidFile,
    start_time: Instant,
}

impl Daemon {
    /// Claim the PID file, open the tenant store and bind the socket
    pub fn new(config: DaemonConfig) -> Result<Self> {
        let pid_file = PidFile::with_path(&config.pid_file);
        pid_file.acquire()?;

        match Self::build(config, pid_file.clone()) {
            Ok(daemon) => Ok(daemon),
            Err(e) => {
                let _ = pid_file.remove();
                Err(e)
            }
        }
    }

    fn build(config: DaemonConfig, pid_file: PidFile) -> Result<Self> {
        let store: Arc<dyn TenantStore> = Arc::new(JsonTenantStore::open(config.store_path())?);
        let (reload_signal, reload_receiver) = reload::channel();

        let (controller, caddy): (Arc<dyn ProxyController>, Option<CaddyController>) =
            if config.proxy.enabled {
                let caddy = CaddyController::new(config.proxy.clone());
                (Arc::new(caddy.clone()), Some(caddy))
            } else {
                (Arc::new(LogOnlyController), None)
            };

        let ipc_server = IpcServer::bind(&config.socket_path)?;
        let supervisor = TenantSupervisor::new(config, store, reload_signal)?;

        Ok(Self {
            supervisor,
            reload_receiver,
            controller,
            caddy,
            ipc_server,
            pid_file,
            start_time: Instant::now(),
        })
    }

    /// Supervisor handle, for callers embedding the daemon
    pub fn supervisor(&self) -> &TenantSupervisor {
        &self.supervisor
    }

    /// Run until `shutdown` fires, then stop every tenant and clean up
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Daemon {
            supervisor,
            reload_receiver,
            controller,
            caddy,
            ipc_server,
            pid_file,
            start_time,
        } = self;

        info!(
            socket = %ipc_server.socket_path().display(),
            data_dir = %supervisor.config().data_dir.display(),
            "Starting fleetd daemon"
        );

        let mut caddy_process = match &caddy {
            Some(caddy) => Self::launch_proxy(caddy, &supervisor).await,
            None => None,
        };

        let consumer_shutdown = CancellationToken::new();
        let consumer: JoinHandle<()> = tokio::spawn(reload::run_reload_consumer(
            reload_receiver,
            Arc::clone(supervisor.store()),
            controller,
            consumer_shutdown.clone(),
        ));

        let started = supervisor.start_all().await;
        info!(started, total = supervisor.store().tenants().len(), "Tenants restored");
        supervisor.notify_reload();

        let handler_supervisor = supervisor.clone();
        let server_result = ipc_server
            .run(
                move |command| {
                    let supervisor = handler_supervisor.clone();
                    async move { handler::handle_command(&supervisor, start_time, command).await }
                },
                shutdown,
            )
            .await;
        if let Err(e) = &server_result {
            error!(error = %e, "IPC server error");
        }

        info!("Shutting down daemon gracefully...");
        supervisor.stop_all().await;

        consumer_shutdown.cancel();
        if let Err(e) = consumer.await {
            warn!(error = %e, "Reload consumer task failed");
        }

        if let Some(child) = caddy_process.as_mut() {
            let _ = child.start_kill();
            let _ = child.wait().await;
            info!("Caddy stopped");
        }

        if let Err(e) = pid_file.remove() {
            warn!(error = %e, "Failed to remove PID file");
        }

        info!("Daemon shutdown complete");
        server_result
    }

    /// Write the initial Caddyfile and, when managed, start Caddy on it.
    ///
    /// The daemon keeps running without the proxy if either step fails.
    async fn launch_proxy(caddy: &CaddyController, supervisor: &TenantSupervisor) -> Option<Child> {
        let tenants = supervisor.store().tenants();
        if let Err(e) = caddy.write_config(&tenants).await {
            error!(error = %e, "Failed to write initial Caddyfile");
            return None;
        }

        if !supervisor.config().proxy.manage_process {
            return None;
        }

        match caddy.spawn_server() {
            Ok(child) => Some(child),
            Err(e) => {
                error!(error = %e, "Failed to start Caddy");
                None
            }
        }
    }
}
