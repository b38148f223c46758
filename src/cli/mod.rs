// CLI module - User-facing command-line interface

mod output;

pub use output::print_error;

use crate::error::{FleetError, Result};
use crate::ipc::client::{IpcClient, DEFAULT_SOCKET_PATH};
use crate::ipc::protocol::{Command, DeleteOptions, LogOptions};
use crate::tenant::CreateTenantRequest;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fleetd - Supervise per-tenant backends behind a reverse proxy
#[derive(Parser)]
#[command(name = "fleetd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Daemon socket
    #[arg(long, global = true, env = "FLEETD_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a tenant and start its backend
    Create {
        /// Requested subdomain; normalized into the tenant ID
        subdomain: String,

        /// Display name (defaults to the subdomain)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List all tenants
    List,

    /// Show one tenant's status
    Status {
        id: String,
    },

    /// Start a tenant's backend
    Start {
        id: String,
    },

    /// Stop a tenant's backend
    Stop {
        id: String,
    },

    /// Stop then start a tenant's backend
    Restart {
        id: String,
    },

    /// Delete a tenant
    Delete {
        id: String,

        /// Also remove the tenant's data directory and log
        #[arg(long)]
        delete_data: bool,
    },

    /// View a tenant's backend log
    Logs {
        id: String,

        /// Number of lines to display
        #[arg(short, long)]
        lines: Option<usize>,
    },

    /// Check that the daemon is reachable
    Ping,
}

impl Cli {
    /// Run the CLI application
    pub fn run() -> Result<()> {
        let cli = Cli::parse();
        cli.execute()
    }

    /// Execute the parsed command
    fn execute(&self) -> Result<()> {
        let command = self.build_command();
        let client = IpcClient::with_socket_path(&self.socket);

        let response = match self.progress_message() {
            Some(message) => {
                let spinner = output::create_progress_bar(&message);
                let response = client.send_command(command);
                spinner.finish_and_clear();
                response?
            }
            None => client.send_command(command)?,
        };

        match response.result {
            Ok(data) => {
                output::print_success(&data);
                Ok(())
            }
            Err(error_msg) => Err(FleetError::Other(error_msg)),
        }
    }

    /// Build an IPC command from the CLI arguments
    fn build_command(&self) -> Command {
        match &self.command {
            Commands::Create { subdomain, name } => Command::Create(CreateTenantRequest {
                subdomain: subdomain.clone(),
                name: name.clone(),
            }),
            Commands::List => Command::List,
            Commands::Status { id } => Command::Status { id: id.clone() },
            Commands::Start { id } => Command::Start { id: id.clone() },
            Commands::Stop { id } => Command::Stop { id: id.clone() },
            Commands::Restart { id } => Command::Restart { id: id.clone() },
            Commands::Delete { id, delete_data } => Command::Delete(DeleteOptions {
                id: id.clone(),
                delete_data: *delete_data,
            }),
            Commands::Logs { id, lines } => Command::Logs(LogOptions {
                id: id.clone(),
                lines: *lines,
            }),
            Commands::Ping => Command::Ping,
        }
    }

    /// Spinner text for commands that wait on a backend
    fn progress_message(&self) -> Option<String> {
        match &self.command {
            Commands::Create { subdomain, .. } => Some(format!("Creating {}...", subdomain)),
            Commands::Start { id } => Some(format!("Starting {}...", id)),
            Commands::Stop { id } => Some(format!("Stopping {}...", id)),
            Commands::Restart { id } => Some(format!("Restarting {}...", id)),
            Commands::Delete { id, .. } => Some(format!("Deleting {}...", id)),
            _ => None,
        }
    }
}
