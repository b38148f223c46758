// Command handler - Maps IPC commands onto supervisor operations

use crate::error::Result;
use crate::ipc::protocol::{Command, ResponseData, DEFAULT_LOG_LINES};
use crate::process::TenantSupervisor;
use std::time::Instant;

/// Handle a command from a client
pub async fn handle_command(
    supervisor: &TenantSupervisor,
    started_at: Instant,
    command: Command,
) -> Result<ResponseData> {
    match command {
        Command::Create(request) => {
            let response = supervisor.create_tenant(request).await?;
            Ok(ResponseData::Created(response))
        }

        Command::Start { id } => {
            supervisor.start_tenant(&id).await?;
            Ok(ResponseData::Started { id })
        }

        Command::Stop { id } => {
            supervisor.stop_tenant(&id).await?;
            Ok(ResponseData::Stopped { id })
        }

        Command::Restart { id } => {
            supervisor.restart_tenant(&id).await?;
            Ok(ResponseData::Restarted { id })
        }

        Command::Delete(options) => {
            supervisor
                .delete_tenant(&options.id, options.delete_data)
                .await?;
            Ok(ResponseData::Deleted { id: options.id })
        }

        Command::Status { id } => Ok(ResponseData::Status(supervisor.tenant_status(&id)?)),

        Command::List => Ok(ResponseData::TenantList(supervisor.all_statuses())),

        Command::Logs(options) => {
            let lines = options.lines.unwrap_or(DEFAULT_LOG_LINES);
            let lines = supervisor.tenant_logs(&options.id, lines).await?;
            Ok(ResponseData::Logs(lines))
        }

        Command::Ping => Ok(ResponseData::Pong {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: started_at.elapsed().as_secs(),
            running: supervisor.running_count(),
        }),
    }
}
