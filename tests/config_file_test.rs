// Integration test for configuration file support

use fleetd::config::{BackoffKind, DaemonConfig};
use fleetd::error::FleetError;
use fleetd::process::{BackoffStrategy, RestartPolicy};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_full_toml_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("fleetd.toml");

    let toml_content = r#"
        data_dir = "/srv/fleet"
        socket_path = "/run/fleetd.sock"
        pid_file = "/run/fleetd.pid"

        [backend]
        binary = "/usr/local/bin/pocketbase"
        args = ["serve", "--dir={data_dir}", "--http={addr}", "--dev"]
        base_port = 9100
        stop_signal = "SIGINT"

        [timings]
        settle_delay_ms = 250
        readiness_interval_ms = 100
        readiness_attempts = 50
        stop_grace_ms = 10000

        [restart]
        backoff_ms = 1000
        strategy = "exponential"
        max_backoff_ms = 30000
        max_crash_restarts = 10
        window_secs = 300

        [proxy]
        enabled = true
        manage_process = false
        caddyfile = "/etc/caddy/Caddyfile"
        domain_name = "tenants.example.com"
        enable_https = true
        acme_email = "ops@example.com"
        api_port = 8090
    "#;

    fs::write(&config_path, toml_content).unwrap();

    let config = DaemonConfig::from_file(&config_path).unwrap();
    assert_eq!(config.data_dir, PathBuf::from("/srv/fleet"));
    assert_eq!(config.socket_path, PathBuf::from("/run/fleetd.sock"));
    assert_eq!(config.backend.args.len(), 4);
    assert_eq!(config.backend.stop_signal, "SIGINT");
    assert_eq!(config.timings.settle_delay(), Duration::from_millis(250));
    assert_eq!(config.timings.stop_grace(), Duration::from_secs(10));
    // Unset timings keep their defaults
    assert_eq!(config.timings.log_tail_lines, 25);
    assert_eq!(config.restart.strategy, BackoffKind::Exponential);
    assert!(!config.proxy.manage_process);
    assert!(config.proxy.enable_https);
    assert_eq!(config.proxy.api_port, 8090);

    let policy = RestartPolicy::from_config(&config.restart);
    assert_eq!(policy.max_restarts, Some(10));
    assert_eq!(policy.time_window_secs, 300);
    assert_eq!(policy.initial_delay, Duration::from_secs(1));
    assert_eq!(
        policy.backoff_strategy,
        BackoffStrategy::Exponential {
            max_delay: Duration::from_secs(30)
        }
    );
}

#[test]
fn test_empty_file_is_all_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("fleetd.toml");
    fs::write(&config_path, "").unwrap();

    let config = DaemonConfig::from_file(&config_path).unwrap();
    assert_eq!(config.backend.base_port, 8080);
    assert_eq!(config.proxy.domain_name, "localhost.direct");
    assert_eq!(config.store_path(), PathBuf::from("/mnt/data/.fleetd/tenants.json"));
}

#[test]
fn test_invalid_files_are_rejected() {
    let temp_dir = TempDir::new().unwrap();

    let bad_toml = temp_dir.path().join("bad.toml");
    fs::write(&bad_toml, "data_dir = [").unwrap();
    assert!(matches!(
        DaemonConfig::from_file(&bad_toml),
        Err(FleetError::InvalidConfig(_))
    ));

    let bad_signal = temp_dir.path().join("signal.json");
    fs::write(&bad_signal, r#"{ "backend": { "stop_signal": "SIGFOO" } }"#).unwrap();
    assert!(matches!(
        DaemonConfig::from_file(&bad_signal),
        Err(FleetError::ConfigValidationError(_))
    ));

    let no_addr = temp_dir.path().join("args.toml");
    fs::write(&no_addr, "[backend]\nargs = [\"serve\"]\n").unwrap();
    assert!(matches!(
        DaemonConfig::from_file(&no_addr),
        Err(FleetError::ConfigValidationError(_))
    ));

    assert!(matches!(
        DaemonConfig::from_file(&temp_dir.path().join("missing.toml")),
        Err(FleetError::ConfigError(_))
    ));
}
