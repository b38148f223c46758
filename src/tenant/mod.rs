// Tenant module - Durable tenant records and their read models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted lifecycle status of a tenant.
///
/// `starting` only exists while the start protocol runs and is never written
/// to the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Stopped,
    Running,
    Error,
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantStatus::Stopped => write!(f, "stopped"),
            TenantStatus::Running => write!(f, "running"),
            TenantStatus::Error => write!(f, "error"),
        }
    }
}

/// One managed backend instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub subdomain: String,
    pub port: u16,
    pub status: TenantStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data_dir: PathBuf,
}

impl Tenant {
    pub fn new(id: String, name: String, subdomain: String, port: u16, data_dir: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            subdomain,
            port,
            status: TenantStatus::Stopped,
            pid: None,
            created_at: now,
            updated_at: now,
            data_dir,
        }
    }

    pub fn mark_running(&mut self, pid: u32) {
        self.status = TenantStatus::Running;
        self.pid = Some(pid);
        self.updated_at = Utc::now();
    }

    pub fn mark_stopped(&mut self) {
        self.status = TenantStatus::Stopped;
        self.pid = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_errored(&mut self) {
        self.status = TenantStatus::Error;
        self.pid = None;
        self.updated_at = Utc::now();
    }

    /// Loopback address the backend binds to
    pub fn listen_addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

/// Request to create a new tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantRequest {
    pub subdomain: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl CreateTenantRequest {
    pub fn new(subdomain: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Display name, falling back to the subdomain
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.subdomain.clone(),
        }
    }
}

/// Result of a successful create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantResponse {
    pub tenant: Tenant,
    /// First-run setup link emitted by the backend, rewritten to the public host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_url: Option<String>,
}

/// Point-in-time health view of a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantStatusReport {
    pub id: String,
    pub subdomain: String,
    pub status: TenantStatus,
    pub port: u16,
    pub pid: Option<u32>,
    pub uptime_secs: Option<u64>,
    pub admin_url: String,
    pub public_url: String,
    pub memory_bytes: Option<u64>,
    pub cpu_percent: Option<f32>,
}

/// Normalize a requested subdomain into a tenant ID.
///
/// ASCII uppercase is lowercased, `_` and spaces become `-`, and everything
/// else outside `[a-z0-9-]` is dropped.
pub fn sanitize_id(subdomain: &str) -> String {
    subdomain
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => Some(c),
            'A'..='Z' => Some(c.to_ascii_lowercase()),
            '_' | ' ' => Some('-'),
            _ => None,
        })
        .collect()
}
