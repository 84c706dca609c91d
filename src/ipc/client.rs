//! IPC client for talking to a running companion.

use crate::error::{AuraError, Result};
use crate::ipc::protocol::{Command, Response};
use crate::pipeline::types::PipelineEvent;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

/// An open request. The write half stays open for as long as replies are
/// read; dropping it tells a `follow` stream that the client left.
struct Connection {
    _writer: OwnedWriteHalf,
    lines: Lines<BufReader<OwnedReadHalf>>,
}

/// Connect and send one command line.
async fn open(socket_path: &Path, command: &Command) -> Result<Connection> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| AuraError::IpcConnection {
            message: format!("Failed to connect to daemon: {}", e),
        })?;

    let (reader, mut writer) = stream.into_split();

    let command_json = command.to_json().map_err(|e| AuraError::IpcProtocol {
        message: format!("Failed to serialize command: {}", e),
    })?;

    writer
        .write_all(format!("{command_json}\n").as_bytes())
        .await
        .map_err(|e| AuraError::IpcConnection {
            message: format!("Failed to write command: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| AuraError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    Ok(Connection {
        _writer: writer,
        lines: BufReader::new(reader).lines(),
    })
}

async fn read_response(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Result<Option<Response>> {
    let line = lines
        .next_line()
        .await
        .map_err(|e| AuraError::IpcConnection {
            message: format!("Failed to read response: {}", e),
        })?;
    line.map(|line| {
        Response::from_json(line.trim()).map_err(|e| AuraError::IpcProtocol {
            message: format!("Failed to deserialize response: {}", e),
        })
    })
    .transpose()
}

/// Send a command to the daemon via Unix socket.
///
/// # Errors
/// Returns `AuraError::IpcConnection` if connection fails
/// Returns `AuraError::IpcProtocol` if serialization/deserialization fails
pub async fn send_command(socket_path: &Path, command: Command) -> Result<Response> {
    let mut conn = open(socket_path, &command).await?;
    read_response(&mut conn.lines)
        .await?
        .ok_or_else(|| AuraError::IpcConnection {
            message: "Daemon closed the connection without a response".to_string(),
        })
}

/// Stream pipeline events, calling `on_event` for each, until the daemon
/// closes the connection.
pub async fn follow<F>(socket_path: &Path, mut on_event: F) -> Result<()>
where
    F: FnMut(PipelineEvent),
{
    let mut conn = open(socket_path, &Command::Follow).await?;

    match read_response(&mut conn.lines).await? {
        Some(Response::Ok { .. }) => {}
        Some(Response::Error { message }) => return Err(AuraError::Other(message)),
        Some(other) => {
            return Err(AuraError::IpcProtocol {
                message: format!("Unexpected response to follow: {other:?}"),
            });
        }
        None => return Ok(()),
    }

    while let Some(response) = read_response(&mut conn.lines).await? {
        if let Response::Event { event } = response {
            on_event(event);
        }
    }
    Ok(())
}
