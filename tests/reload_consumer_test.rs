// Integration tests for the reload consumer fed by a live supervisor

mod common;

use async_trait::async_trait;
use common::{harness, wait_for, SLEEPER};
use fleetd::error::Result;
use fleetd::reload::{render_caddyfile, run_reload_consumer, ProxyController};
use fleetd::tenant::{CreateTenantRequest, Tenant};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Records the tenant IDs seen by each reload
#[derive(Default)]
struct RecordingController {
    reloads: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl ProxyController for RecordingController {
    async fn reload(&self, tenants: &[Tenant]) -> Result<()> {
        self.reloads
            .lock()
            .push(tenants.iter().map(|t| t.id.clone()).collect());
        Ok(())
    }
}

#[tokio::test]
async fn test_consumer_sees_current_topology() {
    let h = harness(2, SLEEPER);
    let controller = Arc::new(RecordingController::default());
    let shutdown = CancellationToken::new();

    let common::Harness {
        dir: _dir,
        supervisor,
        reloads,
        listeners: _listeners,
        ..
    } = h;

    let consumer = tokio::spawn(run_reload_consumer(
        reloads,
        Arc::clone(supervisor.store()),
        controller.clone(),
        shutdown.clone(),
    ));

    supervisor
        .create_tenant(CreateTenantRequest::new("alpha"))
        .await
        .unwrap();
    supervisor
        .create_tenant(CreateTenantRequest::new("bravo"))
        .await
        .unwrap();
    supervisor.delete_tenant("alpha", true).await.unwrap();

    // The last reload always reflects the final tenant set
    let probe = controller.clone();
    assert!(
        wait_for(Duration::from_secs(2), || {
            probe
                .reloads
                .lock()
                .last()
                .is_some_and(|ids| ids == &vec!["bravo".to_string()])
        })
        .await
    );
    assert!(controller.reloads.lock().len() <= 3);

    shutdown.cancel();
    consumer.await.unwrap();
    supervisor.stop_all().await;
}

#[tokio::test]
async fn test_rendered_caddyfile_routes_created_tenant() {
    let h = harness(1, SLEEPER);
    let created = h
        .supervisor
        .create_tenant(CreateTenantRequest::new("acme"))
        .await
        .unwrap();

    let caddyfile = render_caddyfile(&h.supervisor.config().proxy, &h.store().tenants());
    assert!(caddyfile.contains("http://acme.localhost.direct"));
    assert!(caddyfile.contains(&format!("reverse_proxy localhost:{}", created.tenant.port)));
}
