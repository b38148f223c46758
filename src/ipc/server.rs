// IPC Server - Listens for client connections and handles requests

use crate::error::{FleetError, Result};
use crate::ipc::{Command, Request, Response, ResponseData};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// IPC server for handling client connections
pub struct IpcServer {
    socket_path: PathBuf,
    listener: UnixListener,
}

impl IpcServer {
    /// Bind the Unix socket, replacing a stale socket file
    pub fn bind<P: AsRef<Path>>(path: P) -> Result<Self> {
        let socket_path = path.as_ref().to_path_buf();

        if socket_path.exists() {
            std::fs::remove_file(&socket_path).map_err(|e| {
                FleetError::IpcError(format!("Failed to remove existing socket: {}", e))
            })?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FleetError::IpcError(format!("Failed to create socket directory: {}", e))
            })?;
        }

        let listener = UnixListener::bind(&socket_path)
            .map_err(|e| FleetError::IpcError(format!("Failed to bind to socket: {}", e)))?;

        // Owner-only access (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&socket_path, permissions).map_err(|e| {
                FleetError::IpcError(format!("Failed to set socket permissions: {}", e))
            })?;
        }

        Ok(Self {
            socket_path,
            listener,
        })
    }

    /// Run the accept loop until `shutdown` fires.
    ///
    /// Each connection carries one request and gets one response; handler
    /// errors are returned to the client as error responses.
    pub async fn run<F, Fut>(self, handler: F, shutdown: CancellationToken) -> Result<()>
    where
        F: Fn(Command) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponseData>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let stream = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => stream,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = Self::serve_connection(stream, handler.as_ref()).await {
                    warn!(error = %e, "IPC connection failed");
                }
            });
        }

        debug!("IPC server stopped accepting connections");
        Ok(())
    }

    async fn serve_connection<F, Fut>(stream: UnixStream, handler: &F) -> Result<()>
    where
        F: Fn(Command) -> Fut,
        Fut: Future<Output = Result<ResponseData>>,
    {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut request_line = String::new();
        reader
            .read_line(&mut request_line)
            .await
            .map_err(|e| FleetError::IpcError(format!("Failed to read request: {}", e)))?;

        let request: Request = serde_json::from_str(&request_line).map_err(|e| {
            FleetError::DeserializationError(format!("Failed to deserialize request: {}", e))
        })?;

        debug!(request_id = request.id, command = request.command.name(), "IPC request");

        let response = match handler(request.command).await {
            Ok(data) => Response::success(request.id, data),
            Err(e) => Response::error(request.id, e.to_string()),
        };

        let mut response_json = serde_json::to_string(&response).map_err(|e| {
            FleetError::SerializationError(format!("Failed to serialize response: {}", e))
        })?;
        response_json.push('\n');

        write_half
            .write_all(response_json.as_bytes())
            .await
            .map_err(|e| FleetError::IpcError(format!("Failed to write response: {}", e)))?;
        write_half
            .flush()
            .await
            .map_err(|e| FleetError::IpcError(format!("Failed to flush stream: {}", e)))?;

        Ok(())
    }

    /// Get the socket path being used
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}
