use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the fleet supervisor
#[derive(Debug, Error)]
pub enum FleetError {
    // Tenant lifecycle errors
    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Tenant with subdomain '{0}' already exists")]
    Conflict(String),

    #[error("Invalid subdomain: '{0}'")]
    InvalidSubdomain(String),

    #[error("Failed to start tenant {id}: {kind}{}", format_log_tail(.log_tail))]
    StartFailure {
        id: String,
        kind: StartFailureKind,
        log_tail: Option<String>,
    },

    #[error("Failed to stop tenant {0}: {1}")]
    StopFailure(String, String),

    #[error("Failed to persist tenant records: {0}")]
    PersistenceFailure(String),

    // Record store errors
    #[error("Failed to load tenant records: {0}")]
    StateLoadError(String),

    #[error("Tenant record corruption detected: {0}")]
    StateCorruption(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Log errors
    #[error("Log error: {0}")]
    LogError(String),

    // Reverse proxy errors
    #[error("Proxy error: {0}")]
    Proxy(String),

    // IPC errors
    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Failed to connect to daemon: {0}")]
    ConnectionError(String),

    #[error("IPC protocol error: {0}")]
    ProtocolError(String),

    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Daemon already running (PID: {0})")]
    DaemonAlreadyRunning(u32),

    #[error("Signal error: {0}")]
    SignalError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("{0}")]
    Other(String),
}

/// Why a start attempt was abandoned
#[derive(Debug, Clone, Error)]
pub enum StartFailureKind {
    #[error("backend binary not found at {}", .0.display())]
    BinaryMissing(PathBuf),

    #[error("failed to prepare data directory: {0}")]
    DataDir(String),

    #[error("failed to prepare log file: {0}")]
    LogSink(String),

    #[error("failed to spawn backend: {0}")]
    Spawn(String),

    #[error("backend exited immediately ({0})")]
    ExitedImmediately(String),

    #[error("backend died during startup ({0})")]
    DiedDuringStartup(String),

    #[error("backend started but port {port} is not listening after {}ms", .waited.as_millis())]
    ReadinessTimeout { port: u16, waited: Duration },
}

fn format_log_tail(tail: &Option<String>) -> String {
    match tail {
        Some(tail) if !tail.is_empty() => format!("\nLast log:\n{}", tail),
        _ => String::new(),
    }
}

impl FleetError {
    /// Whether retrying the same operation later could succeed.
    ///
    /// Used by the crash monitor to decide whether to keep trying to bring a
    /// tenant back up.
    pub fn is_retryable(&self) -> bool {
        match self {
            FleetError::NotFound(_) => false,
            FleetError::StartFailure { kind, .. } => {
                !matches!(kind, StartFailureKind::BinaryMissing(_))
            }
            _ => true,
        }
    }

    pub(crate) fn start_failure(id: &str, kind: StartFailureKind) -> Self {
        FleetError::StartFailure {
            id: id.to_string(),
            kind,
            log_tail: None,
        }
    }
}

/// Result type alias for fleet operations
pub type Result<T> = std::result::Result<T, FleetError>;
