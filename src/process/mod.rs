// Process module - Per-tenant backend lifecycle supervision

mod locks;
mod monitor;
pub mod readiness;
pub mod restart;
pub mod spawner;
pub mod stats;
mod supervisor;
mod types;

pub use restart::{BackoffStrategy, RestartPolicy, RestartTracker};
pub use stats::{ResourceSampler, ResourceUsage};
pub use supervisor::TenantSupervisor;
pub use types::{ExitDiagnosis, ManagedProcess, ProcessHandle};
