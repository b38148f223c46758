use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory (under the data dir) holding supervisor-owned files
pub const STATE_DIR_NAME: &str = ".fleetd";

/// Top-level daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Root directory; each tenant gets `<data_dir>/<id>`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Unix socket the daemon listens on
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// PID file guarding against a second daemon
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub timings: Timings,

    #[serde(default)]
    pub restart: RestartConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// How to launch one tenant's backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Path to the backend executable
    #[serde(default = "default_backend_binary")]
    pub binary: PathBuf,

    /// Argument template; `{data_dir}` and `{addr}` are substituted per tenant
    #[serde(default = "default_backend_args")]
    pub args: Vec<String>,

    /// Ports are allocated strictly above this value
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// Signal sent on a graceful stop
    #[serde(default = "default_stop_signal")]
    pub stop_signal: String,
}

/// Fixed delays and bounds of the lifecycle protocol (milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timings {
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_readiness_interval")]
    pub readiness_interval_ms: u64,
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,
    #[serde(default = "default_restart_pause")]
    pub restart_pause_ms: u64,
    #[serde(default = "default_setup_link_delay")]
    pub setup_link_delay_ms: u64,
    /// Lines of log attached to start failures and crash reports
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,
}

/// Crash auto-restart behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Delay before the first restart attempt after a crash
    #[serde(default = "default_crash_backoff")]
    pub backoff_ms: u64,

    #[serde(default)]
    pub strategy: BackoffKind,

    /// Upper bound for exponential backoff
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Ceiling on crash restarts within `window_secs`; unset means unlimited
    #[serde(default)]
    pub max_crash_restarts: Option<usize>,

    #[serde(default = "default_restart_window")]
    pub window_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Reverse proxy (Caddy) integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// When false, reload signals are only logged
    #[serde(default)]
    pub enabled: bool,

    /// Launch `caddy run` at boot and kill it on shutdown
    #[serde(default = "default_true")]
    pub manage_process: bool,

    #[serde(default = "default_caddy_binary")]
    pub caddy_binary: PathBuf,

    #[serde(default = "default_caddyfile")]
    pub caddyfile: PathBuf,

    #[serde(default = "default_domain_name")]
    pub domain_name: String,

    #[serde(default)]
    pub enable_https: bool,

    #[serde(default = "default_acme_email")]
    pub acme_email: String,

    /// Port of the management API the dashboard site proxies to
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

// Default value functions for serde
fn default_data_dir() -> PathBuf {
    PathBuf::from("/mnt/data")
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/fleetd.sock")
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/tmp/fleetd.pid")
}

fn default_backend_binary() -> PathBuf {
    PathBuf::from("/usr/local/bin/pocketbase")
}

fn default_backend_args() -> Vec<String> {
    vec![
        "serve".to_string(),
        "--dir={data_dir}".to_string(),
        "--http={addr}".to_string(),
    ]
}

fn default_base_port() -> u16 {
    8080
}

fn default_stop_signal() -> String {
    "SIGTERM".to_string()
}

fn default_settle_delay() -> u64 {
    500
}

fn default_readiness_interval() -> u64 {
    200
}

fn default_readiness_attempts() -> u32 {
    30
}

fn default_connect_timeout() -> u64 {
    100
}

fn default_stop_grace() -> u64 {
    5000
}

fn default_restart_pause() -> u64 {
    500
}

fn default_setup_link_delay() -> u64 {
    500
}

fn default_log_tail_lines() -> usize {
    25
}

fn default_crash_backoff() -> u64 {
    2000
}

fn default_max_backoff() -> u64 {
    60_000
}

fn default_restart_window() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_caddy_binary() -> PathBuf {
    PathBuf::from("caddy")
}

fn default_caddyfile() -> PathBuf {
    PathBuf::from("/etc/Caddyfile")
}

fn default_domain_name() -> String {
    "localhost.direct".to_string()
}

fn default_acme_email() -> String {
    "admin@example.com".to_string()
}

fn default_api_port() -> u16 {
    8080
}

const VALID_STOP_SIGNALS: [&str; 7] = [
    "SIGTERM", "SIGINT", "SIGQUIT", "SIGKILL", "SIGHUP", "SIGUSR1", "SIGUSR2",
];

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            socket_path: default_socket_path(),
            pid_file: default_pid_file(),
            backend: BackendConfig::default(),
            timings: Timings::default(),
            restart: RestartConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            binary: default_backend_binary(),
            args: default_backend_args(),
            base_port: default_base_port(),
            stop_signal: default_stop_signal(),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            readiness_interval_ms: default_readiness_interval(),
            readiness_attempts: default_readiness_attempts(),
            connect_timeout_ms: default_connect_timeout(),
            stop_grace_ms: default_stop_grace(),
            restart_pause_ms: default_restart_pause(),
            setup_link_delay_ms: default_setup_link_delay(),
            log_tail_lines: default_log_tail_lines(),
        }
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            backoff_ms: default_crash_backoff(),
            strategy: BackoffKind::Fixed,
            max_backoff_ms: default_max_backoff(),
            max_crash_restarts: None,
            window_secs: default_restart_window(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            manage_process: true,
            caddy_binary: default_caddy_binary(),
            caddyfile: default_caddyfile(),
            domain_name: default_domain_name(),
            enable_https: false,
            acme_email: default_acme_email(),
            api_port: default_api_port(),
        }
    }
}

impl DaemonConfig {
    /// Load the daemon configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FleetError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config: DaemonConfig = match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| FleetError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| FleetError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?,
            _ => {
                return Err(FleetError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise start from defaults; then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override selected fields from `FLEETD_*` environment variables.
    ///
    /// `lookup` is injected so tests do not have to mutate the process
    /// environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("FLEETD_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("FLEETD_SOCKET") {
            self.socket_path = PathBuf::from(v);
        }
        if let Some(v) = get("FLEETD_BACKEND_BINARY") {
            self.backend.binary = PathBuf::from(v);
        }
        if let Some(v) = get("FLEETD_DOMAIN_NAME") {
            self.proxy.domain_name = v;
        }
        if let Some(v) = get("FLEETD_API_PORT") {
            self.proxy.api_port = v.parse().map_err(|_| {
                FleetError::ConfigValidationError(format!("FLEETD_API_PORT is not a port: {}", v))
            })?;
        }
        if let Some(v) = get("FLEETD_ENABLE_HTTPS") {
            self.proxy.enable_https = v == "true";
        }
        if let Some(v) = get("FLEETD_ACME_EMAIL") {
            self.proxy.acme_email = v;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(FleetError::MissingConfigField("data_dir".to_string()));
        }

        if self.backend.binary.as_os_str().is_empty() {
            return Err(FleetError::MissingConfigField("backend.binary".to_string()));
        }

        if !self.backend.args.iter().any(|a| a.contains("{addr}")) {
            return Err(FleetError::ConfigValidationError(
                "backend.args must bind the backend with an {addr} placeholder".to_string(),
            ));
        }

        if !VALID_STOP_SIGNALS.contains(&self.backend.stop_signal.as_str()) {
            return Err(FleetError::ConfigValidationError(format!(
                "Invalid stop_signal: {}. Must be one of: {}",
                self.backend.stop_signal,
                VALID_STOP_SIGNALS.join(", ")
            )));
        }

        if self.timings.readiness_attempts == 0 {
            return Err(FleetError::ConfigValidationError(
                "timings.readiness_attempts must be at least 1".to_string(),
            ));
        }

        if let Some(0) = self.restart.max_crash_restarts {
            return Err(FleetError::ConfigValidationError(
                "restart.max_crash_restarts must be at least 1 when set".to_string(),
            ));
        }

        if self.proxy.domain_name.is_empty() {
            return Err(FleetError::MissingConfigField("proxy.domain_name".to_string()));
        }

        Ok(())
    }

    /// Directory holding the record store and tenant logs
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join(STATE_DIR_NAME)
    }

    pub fn store_path(&self) -> PathBuf {
        self.state_dir().join("tenants.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    /// Private data directory of one tenant
    pub fn tenant_dir(&self, id: &str) -> PathBuf {
        self.data_dir.join(id)
    }

    /// Expand environment variables in path fields
    fn expand_env_vars(&mut self) {
        self.data_dir = expand_env_in_path(&self.data_dir);
        self.socket_path = expand_env_in_path(&self.socket_path);
        self.pid_file = expand_env_in_path(&self.pid_file);
        self.backend.binary = expand_env_in_path(&self.backend.binary);
        self.proxy.caddyfile = expand_env_in_path(&self.proxy.caddyfile);
    }
}

impl Timings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn restart_pause(&self) -> Duration {
        Duration::from_millis(self.restart_pause_ms)
    }

    pub fn setup_link_delay(&self) -> Duration {
        Duration::from_millis(self.setup_link_delay_ms)
    }
}

/// Expand `$VAR` and `${VAR}` references in a string
fn expand_env_in_string(s: &str) -> String {
    let mut result = s.to_string();

    for (key, value) in std::env::vars() {
        result = result.replace(&format!("${{{}}}", key), &value);
        result = result.replace(&format!("${}", key), &value);
    }

    result
}

fn expand_env_in_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(expand_env_in_string(&path_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();

        assert_eq!(config.data_dir, PathBuf::from("/mnt/data"));
        assert_eq!(config.backend.base_port, 8080);
        assert_eq!(config.backend.stop_signal, "SIGTERM");
        assert_eq!(config.timings.readiness_attempts, 30);
        assert_eq!(config.timings.readiness_interval(), Duration::from_millis(200));
        assert_eq!(config.timings.stop_grace(), Duration::from_secs(5));
        assert_eq!(config.restart.backoff_ms, 2000);
        assert_eq!(config.restart.strategy, BackoffKind::Fixed);
        assert!(config.restart.max_crash_restarts.is_none());
        assert!(!config.proxy.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_paths() {
        let config = DaemonConfig {
            data_dir: PathBuf::from("/srv/fleet"),
            ..DaemonConfig::default()
        };

        assert_eq!(config.store_path(), PathBuf::from("/srv/fleet/.fleetd/tenants.json"));
        assert_eq!(config.log_dir(), PathBuf::from("/srv/fleet/.fleetd/logs"));
        assert_eq!(config.tenant_dir("acme"), PathBuf::from("/srv/fleet/acme"));
    }

    #[test]
    fn test_validate_invalid_signal() {
        let mut config = DaemonConfig::default();
        config.backend.stop_signal = "INVALID".to_string();

        assert!(matches!(
            config.validate(),
            Err(FleetError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_validate_requires_addr_placeholder() {
        let mut config = DaemonConfig::default();
        config.backend.args = vec!["serve".to_string()];

        assert!(matches!(
            config.validate(),
            Err(FleetError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_validate_zero_restart_ceiling() {
        let mut config = DaemonConfig::default();
        config.restart.max_crash_restarts = Some(0);

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FLEETD_DATA_DIR", "/var/lib/fleet"),
            ("FLEETD_DOMAIN_NAME", "example.org"),
            ("FLEETD_API_PORT", "9000"),
            ("FLEETD_ENABLE_HTTPS", "true"),
            ("FLEETD_ACME_EMAIL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = DaemonConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/fleet"));
        assert_eq!(config.proxy.domain_name, "example.org");
        assert_eq!(config.proxy.api_port, 9000);
        assert!(config.proxy.enable_https);
        // Empty values are ignored
        assert_eq!(config.proxy.acme_email, "admin@example.com");
    }

    #[test]
    fn test_env_override_bad_port() {
        let mut config = DaemonConfig::default();
        let result = config.apply_env_overrides(|k| {
            (k == "FLEETD_API_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(FleetError::ConfigValidationError(_))));
    }

    #[test]
    fn test_from_file_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("fleetd.toml");

        let toml_content = r#"
            data_dir = "/srv/tenants"

            [backend]
            binary = "/opt/pb/pocketbase"
            base_port = 9000

            [timings]
            readiness_attempts = 10

            [restart]
            strategy = "exponential"
            max_crash_restarts = 5

            [proxy]
            enabled = true
            domain_name = "example.com"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = DaemonConfig::from_file(&config_path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/tenants"));
        assert_eq!(config.backend.binary, PathBuf::from("/opt/pb/pocketbase"));
        assert_eq!(config.backend.base_port, 9000);
        assert_eq!(config.backend.args, default_backend_args());
        assert_eq!(config.timings.readiness_attempts, 10);
        assert_eq!(config.timings.settle_delay_ms, 500);
        assert_eq!(config.restart.strategy, BackoffKind::Exponential);
        assert_eq!(config.restart.max_crash_restarts, Some(5));
        assert!(config.proxy.enabled);
        assert_eq!(config.proxy.domain_name, "example.com");
    }

    #[test]
    fn test_from_file_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("fleetd.json");

        fs::write(
            &config_path,
            r#"{ "data_dir": "/srv/json", "backend": { "base_port": 7000 } }"#,
        )
        .unwrap();

        let config = DaemonConfig::from_file(&config_path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/json"));
        assert_eq!(config.backend.base_port, 7000);
    }

    #[test]
    fn test_from_file_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("fleetd.yaml");

        fs::write(&config_path, "data_dir: /tmp").unwrap();

        let result = DaemonConfig::from_file(&config_path);
        assert!(matches!(result, Err(FleetError::InvalidConfig(_))));
    }

    #[test]
    fn test_expand_env_vars_in_paths() {
        std::env::set_var("FLEETD_TEST_ROOT", "/tmp/fleet-root");

        let mut config = DaemonConfig {
            data_dir: PathBuf::from("${FLEETD_TEST_ROOT}/data"),
            ..DaemonConfig::default()
        };
        config.expand_env_vars();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/fleet-root/data"));
    }
}
