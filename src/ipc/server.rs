//! Async Unix socket IPC server for controlling a running companion.

use crate::error::{AuraError, Result};
use crate::ipc::protocol::{Command, Response};
use crate::pipeline::types::PipelineEvent;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

/// How often blocking loops re-check the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Handler trait for processing IPC commands.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a command and return a response.
    async fn handle(&self, command: Command) -> Response;

    /// Event stream for `follow` clients. `None` if this handler has none.
    fn subscribe(&self) -> Option<broadcast::Receiver<PipelineEvent>> {
        None
    }
}

/// State for managing server shutdown.
#[derive(Debug, Clone)]
struct ServerState {
    shutdown: Arc<Mutex<bool>>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            shutdown: Arc::new(Mutex::new(false)),
        }
    }

    async fn is_shutdown(&self) -> bool {
        *self.shutdown.lock().await
    }

    async fn set_shutdown(&self) {
        *self.shutdown.lock().await = true;
    }
}

/// IPC server for handling control commands via Unix socket.
pub struct IpcServer {
    socket_path: PathBuf,
    state: ServerState,
}

impl IpcServer {
    /// Create a new IPC server bound to the specified socket path.
    pub fn new(socket_path: PathBuf) -> Result<Self> {
        Ok(Self {
            socket_path,
            state: ServerState::new(),
        })
    }

    /// Get the socket path this server is using.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// `$XDG_RUNTIME_DIR/aura.sock`, or `/tmp/aura-<uid>.sock`.
    pub fn default_socket_path() -> PathBuf {
        if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
            PathBuf::from(xdg_runtime).join(crate::defaults::SOCKET_NAME)
        } else {
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/aura-{}.sock", uid))
        }
    }

    /// Start the IPC server and handle incoming connections until `stop`.
    pub async fn start<H>(&self, handler: Arc<H>) -> Result<()>
    where
        H: CommandHandler + 'static,
    {
        // Clean up any existing socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| AuraError::IpcSocket {
                message: format!("Failed to remove existing socket: {}", e),
            })?;
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| AuraError::IpcSocket {
                message: format!("Failed to bind to socket: {}", e),
            })?;
        debug!(path = %self.socket_path.display(), "control socket listening");

        loop {
            if self.state.is_shutdown().await {
                break;
            }

            // Accept with a timeout so the shutdown flag is re-checked
            match tokio::time::timeout(SHUTDOWN_POLL, listener.accept()).await {
                Ok(Ok((stream, _))) => {
                    let handler = Arc::clone(&handler);
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, handler, state).await {
                            warn!("Error handling client: {}", e);
                        }
                    });
                }
                Ok(Err(e)) => {
                    return Err(AuraError::IpcConnection {
                        message: format!("Failed to accept connection: {}", e),
                    });
                }
                Err(_) => continue,
            }
        }

        Ok(())
    }

    /// Stop the IPC server and clean up the socket file.
    pub async fn stop(&self) -> Result<()> {
        self.state.set_shutdown().await;

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| AuraError::IpcSocket {
                message: format!("Failed to remove socket file: {}", e),
            })?;
        }

        Ok(())
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let json = response.to_json().map_err(|e| AuraError::IpcProtocol {
        message: format!("Failed to serialize response: {}", e),
    })?;

    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| AuraError::IpcConnection {
            message: format!("Failed to write to client: {}", e),
        })?;

    writer
        .write_all(b"\n")
        .await
        .map_err(|e| AuraError::IpcConnection {
            message: format!("Failed to write newline to client: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| AuraError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })
}

/// Handle a single client connection.
async fn handle_client<H>(stream: UnixStream, handler: Arc<H>, state: ServerState) -> Result<()>
where
    H: CommandHandler,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    // Read command (one line JSON)
    reader
        .read_line(&mut line)
        .await
        .map_err(|e| AuraError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?;

    let command = match Command::from_json(line.trim()) {
        Ok(command) => command,
        Err(e) => {
            let message = format!("Failed to parse command: {}", e);
            write_response(&mut writer, &Response::error(message.clone())).await?;
            return Err(AuraError::IpcProtocol { message });
        }
    };

    if command == Command::Follow {
        return follow_events(reader, writer, handler.subscribe(), state).await;
    }

    let response = handler.handle(command).await;
    write_response(&mut writer, &response).await
}

/// Stream events to a `follow` client until it disconnects or the server stops.
async fn follow_events<R>(
    mut reader: BufReader<R>,
    mut writer: OwnedWriteHalf,
    events: Option<broadcast::Receiver<PipelineEvent>>,
    state: ServerState,
) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut events) = events else {
        return write_response(&mut writer, &Response::error("event stream unavailable")).await;
    };
    write_response(&mut writer, &Response::ok("following")).await?;

    let mut discard = String::new();
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => write_response(&mut writer, &Response::Event { event }).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "follow client lagging; events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            read = reader.read_line(&mut discard) => match read {
                // EOF or error: client went away
                Ok(0) | Err(_) => break,
                Ok(_) => discard.clear(),
            },
            _ = tokio::time::sleep(SHUTDOWN_POLL) => {
                if state.is_shutdown().await {
                    break;
                }
            }
        }
    }
    Ok(())
}
