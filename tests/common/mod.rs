// Shared fixtures for supervisor integration tests
#![allow(dead_code)]

use fleetd::config::DaemonConfig;
use fleetd::process::TenantSupervisor;
use fleetd::reload::{self, ReloadReceiver};
use fleetd::state::{JsonTenantStore, TenantStore};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Backend that stays up until signalled
pub const SLEEPER: &str = "echo listening on {addr}; exec sleep 600";

/// Backend that ignores SIGTERM
pub const STUBBORN: &str = "trap '' TERM; echo listening on {addr}; while true; do sleep 1; done";

/// Backend that dies before it is probed
pub const FAILING: &str = "echo boom on {addr} >&2; exit 3";

pub struct Harness {
    pub dir: TempDir,
    pub supervisor: TenantSupervisor,
    pub reloads: ReloadReceiver,
    /// First port the allocator will hand out
    pub first_port: u16,
    /// Stand-ins for the backends' listening sockets
    pub listeners: Vec<TcpListener>,
}

impl Harness {
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        self.supervisor.store()
    }

    /// Number of reload signals pending right now (0 or 1)
    pub fn drain_reloads(&mut self) -> usize {
        let mut count = 0;
        while self.reloads.try_recv() {
            count += 1;
        }
        count
    }
}

/// Bind `count` consecutive loopback ports
pub fn reserve_ports(count: usize) -> (u16, Vec<TcpListener>) {
    for _ in 0..50 {
        let first = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = first.local_addr().unwrap().port();
        if base < 16 || usize::from(base) + count > usize::from(u16::MAX) {
            continue;
        }

        let mut listeners = vec![first];
        for offset in 1..count {
            match TcpListener::bind(("127.0.0.1", base + offset as u16)) {
                Ok(listener) => listeners.push(listener),
                Err(_) => break,
            }
        }
        if listeners.len() == count {
            return (base, listeners);
        }
    }
    panic!("could not reserve {} consecutive ports", count);
}

/// Config with short timings, running `script` under /bin/sh
pub fn test_config(data_dir: PathBuf, base_port: u16, script: &str) -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.data_dir = data_dir.clone();
    config.socket_path = data_dir.join("fleetd.sock");
    config.pid_file = data_dir.join("fleetd.pid");
    config.backend.binary = PathBuf::from("/bin/sh");
    config.backend.args = vec!["-c".to_string(), script.to_string()];
    config.backend.base_port = base_port;
    config.timings.settle_delay_ms = 100;
    config.timings.readiness_interval_ms = 50;
    config.timings.readiness_attempts = 20;
    config.timings.connect_timeout_ms = 100;
    config.timings.stop_grace_ms = 2000;
    config.timings.restart_pause_ms = 50;
    config.timings.setup_link_delay_ms = 50;
    config.restart.backoff_ms = 200;
    config
}

/// Supervisor whose allocator starts at a port the test is listening on
pub fn harness(ports: usize, script: &str) -> Harness {
    harness_with(ports, script, |_| {})
}

pub fn harness_with(ports: usize, script: &str, tweak: impl FnOnce(&mut DaemonConfig)) -> Harness {
    let dir = TempDir::new().unwrap();
    let (first_port, listeners) = reserve_ports(ports);
    let mut config = test_config(dir.path().to_path_buf(), first_port - 1, script);
    tweak(&mut config);

    let store = Arc::new(JsonTenantStore::open(config.store_path()).unwrap());
    let (signal, reloads) = reload::channel();
    let supervisor = TenantSupervisor::new(config, store, signal).unwrap();

    Harness {
        dir,
        supervisor,
        reloads,
        first_port,
        listeners,
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}
