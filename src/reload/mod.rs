// Reload module - Coalescing topology-change signal and its proxy consumer

mod caddy;

pub use caddy::{render_caddyfile, CaddyController};

use crate::error::Result;
use crate::state::TenantStore;
use crate::tenant::Tenant;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Create a connected reload signal pair.
///
/// The channel holds a single pending notification; emitting while one is
/// pending is a no-op.
pub fn channel() -> (ReloadSignal, ReloadReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ReloadSignal { tx }, ReloadReceiver { rx })
}

/// Producer side, held by the supervisor
#[derive(Debug, Clone)]
pub struct ReloadSignal {
    tx: mpsc::Sender<()>,
}

impl ReloadSignal {
    /// Request a proxy reload without blocking.
    ///
    /// Returns false when the signal was coalesced into one already pending
    /// (or no consumer is listening).
    pub fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Reload already pending, coalescing");
                false
            }
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// Consumer side of the reload signal
#[derive(Debug)]
pub struct ReloadReceiver {
    rx: mpsc::Receiver<()>,
}

impl ReloadReceiver {
    /// Wait for the next signal; `None` once every producer is gone
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Take a pending signal if there is one
    pub fn try_recv(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

/// Something that can route traffic to the current set of tenants
#[async_trait]
pub trait ProxyController: Send + Sync {
    /// Regenerate routing for the full tenant set and apply it
    async fn reload(&self, tenants: &[Tenant]) -> Result<()>;
}

/// Controller used when no reverse proxy is configured
#[derive(Debug, Default)]
pub struct LogOnlyController;

#[async_trait]
impl ProxyController for LogOnlyController {
    async fn reload(&self, tenants: &[Tenant]) -> Result<()> {
        info!(tenants = tenants.len(), "Tenant topology changed (proxy disabled)");
        Ok(())
    }
}

/// Drain reload signals until shutdown, regenerating from the store each time.
///
/// Controller failures are logged and the loop keeps going.
pub async fn run_reload_consumer(
    mut receiver: ReloadReceiver,
    store: Arc<dyn TenantStore>,
    controller: Arc<dyn ProxyController>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            signal = receiver.recv() => {
                if signal.is_none() {
                    break;
                }
            }
        }

        let tenants = store.tenants();
        if let Err(e) = controller.reload(&tenants).await {
            error!(error = %e, "Proxy reload failed");
        }
    }

    debug!("Reload consumer stopped");
}
