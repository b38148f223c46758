// IPC Protocol definitions for client-daemon communication

use crate::tenant::{CreateTenantRequest, CreateTenantResponse, TenantStatusReport};
use serde::{Deserialize, Serialize};

/// Default number of log lines returned by `Logs`
pub const DEFAULT_LOG_LINES: usize = 100;

/// Options for deleting a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteOptions {
    pub id: String,
    /// Also remove the tenant's data directory and log
    #[serde(default)]
    pub delete_data: bool,
}

/// Options for viewing logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogOptions {
    pub id: String,
    pub lines: Option<usize>,
}

/// All available commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    Create(CreateTenantRequest),
    Start { id: String },
    Stop { id: String },
    Restart { id: String },
    Delete(DeleteOptions),
    Status { id: String },
    List,
    Logs(LogOptions),
    Ping,
}

impl Command {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Create(_) => "create",
            Command::Start { .. } => "start",
            Command::Stop { .. } => "stop",
            Command::Restart { .. } => "restart",
            Command::Delete(_) => "delete",
            Command::Status { .. } => "status",
            Command::List => "list",
            Command::Logs(_) => "logs",
            Command::Ping => "ping",
        }
    }
}

/// Response data variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseData {
    Created(CreateTenantResponse),
    Started { id: String },
    Stopped { id: String },
    Restarted { id: String },
    Deleted { id: String },
    Status(TenantStatusReport),
    TenantList(Vec<TenantStatusReport>),
    Logs(Vec<String>),
    Pong {
        version: String,
        uptime_secs: u64,
        running: usize,
    },
}

/// Request message from client to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub command: Command,
}

/// Response message from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ResponseData, String>,
}

impl Request {
    pub fn new(id: u64, command: Command) -> Self {
        Self { id, command }
    }
}

impl Response {
    pub fn success(id: u64, data: ResponseData) -> Self {
        Self {
            id,
            result: Ok(data),
        }
    }

    pub fn error(id: u64, error: String) -> Self {
        Self {
            id,
            result: Err(error),
        }
    }
}
