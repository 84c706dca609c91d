//! Daemon mode: a companion plus the IPC control socket.

pub mod handler;

use crate::app::{Companion, CompanionOptions, wait_for_signal};
use crate::config::Config;
use crate::error::Result;
use crate::ipc::server::IpcServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Run the companion with a control socket until a signal or a `shutdown`
/// command arrives.
pub async fn run_daemon(
    config: Config,
    socket_path: Option<PathBuf>,
    options: CompanionOptions,
) -> Result<()> {
    let quiet = !options.render;
    let companion = Companion::start(config, options)?;
    let control = companion.control();

    let socket_path = socket_path.unwrap_or_else(IpcServer::default_socket_path);
    let server = Arc::new(IpcServer::new(socket_path)?);

    if !quiet {
        eprintln!(
            "IPC server listening at: {}",
            server.socket_path().display()
        );
        eprintln!("Daemon ready.");
    }
    info!(socket = %server.socket_path().display(), "daemon ready");

    let handler = Arc::new(handler::DaemonCommandHandler::new(control.clone()));
    let server_clone = Arc::clone(&server);
    let server_handle = tokio::spawn(async move { server_clone.start(handler).await });

    tokio::select! {
        _ = wait_for_signal() => {}
        _ = control.wait_shutdown() => info!("shutdown requested over IPC"),
    }

    if !quiet {
        eprintln!("\nShutting down...");
    }

    server.stop().await?;
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("IPC server failed: {e}"),
        Err(e) => error!("daemon server task failed: {e}"),
    }

    companion.shutdown().await;

    if !quiet {
        eprintln!("Daemon stopped.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ChatSource;
    use crate::ipc::client::send_command;
    use crate::ipc::protocol::{Command, Response};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_daemon_answers_and_shuts_down_over_ipc() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("aura.sock");

        let daemon = tokio::spawn(run_daemon(
            Config::default(),
            Some(socket_path.clone()),
            CompanionOptions {
                source: ChatSource::Detached,
                no_audio: true,
                render: false,
            },
        ));

        while !socket_path.exists() {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let response = send_command(&socket_path, Command::Status).await.unwrap();
        assert!(matches!(response, Response::Status { .. }));

        let response = send_command(&socket_path, Command::Shutdown).await.unwrap();
        assert_eq!(response, Response::ok("Shutting down"));

        tokio::time::timeout(std::time::Duration::from_secs(10), daemon)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!socket_path.exists());
    }
}
