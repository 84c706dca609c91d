use anyhow::Result;
use aura::app::{ChatSource, CompanionOptions, run_foreground};
use aura::cli::{Cli, Commands, ConfigAction};
use aura::config::Config;
use aura::daemon::run_daemon;
use aura::ipc::client::send_command;
use aura::ipc::protocol::{Command, Response};
use aura::ipc::server::IpcServer;
use aura::output;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    #[cfg(feature = "cpal-audio")]
    aura::audio::cpal_output::suppress_audio_warnings();

    let options = |config: &Config| CompanionOptions {
        source: ChatSource::resolve(config, cli.channel.clone(), cli.stdin),
        no_audio: cli.no_audio,
        render: !cli.quiet,
    };

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            let options = options(&config);
            if let Err(e) = run_foreground(config, options).await {
                eprintln!("{}", format!("Error: {}", e).red());
                std::process::exit(1);
            }
        }
        Some(Commands::Daemon { socket }) => {
            let config = load_config(cli.config.as_deref())?;
            let options = options(&config);
            if let Err(e) = run_daemon(config, socket, options).await {
                eprintln!("{}", format!("Error: {}", e).red());
                std::process::exit(1);
            }
        }
        Some(Commands::Status { socket }) => {
            handle_ipc_command(socket, Command::Status).await?;
        }
        Some(Commands::Responses { socket }) => {
            handle_ipc_command(socket, Command::Responses).await?;
        }
        Some(Commands::Chat { limit, socket }) => {
            handle_ipc_command(socket, Command::Chat { limit }).await?;
        }
        Some(Commands::PauseFeed { socket }) => {
            handle_ipc_command(socket, Command::PauseFeed).await?;
        }
        Some(Commands::ResumeFeed { socket }) => {
            handle_ipc_command(socket, Command::ResumeFeed).await?;
        }
        Some(Commands::PauseAi { socket }) => {
            handle_ipc_command(socket, Command::PauseAi).await?;
        }
        Some(Commands::ResumeAi { socket }) => {
            handle_ipc_command(socket, Command::ResumeAi).await?;
        }
        Some(Commands::AutoReply { state, socket }) => {
            let command = Command::SetAutoReply {
                enabled: state.enabled(),
            };
            handle_ipc_command(socket, command).await?;
        }
        Some(Commands::Ignore { user, socket }) => {
            handle_ipc_command(socket, Command::Ignore { user }).await?;
        }
        Some(Commands::Unignore { user, socket }) => {
            handle_ipc_command(socket, Command::Unignore { user }).await?;
        }
        Some(Commands::Cooldown { secs, socket }) => {
            handle_ipc_command(socket, Command::SetCooldown { secs }).await?;
        }
        Some(Commands::Voice { name, socket }) => {
            handle_ipc_command(socket, Command::SetVoice { voice: name }).await?;
        }
        Some(Commands::Personality { text, socket }) => {
            let command = Command::SetPersonality {
                text: text.join(" "),
            };
            handle_ipc_command(socket, command).await?;
        }
        Some(Commands::Prefer { provider, socket }) => {
            handle_ipc_command(socket, Command::SetPreferred { provider }).await?;
        }
        Some(Commands::Follow { socket }) => {
            handle_follow(socket).await?;
        }
        Some(Commands::Shutdown { socket }) => {
            handle_ipc_command(socket, Command::Shutdown).await?;
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "aura", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the verbosity flags.
fn init_tracing(quiet: bool, verbose: u8) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "aura=warn",
            1 => "aura=info",
            _ => "aura=debug",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/aura/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides())
}

/// List available audio output devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = aura::audio::cpal_output::list_output_devices()?;

    if devices.is_empty() {
        eprintln!("No audio output devices found");
        std::process::exit(1);
    }

    println!("Available audio output devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    eprintln!("Built without audio output support (feature `cpal-audio`)");
    std::process::exit(1);
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Get { key } => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            match config.get_value_by_path(&key) {
                Ok(value) => println!("{}", value),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Set { key, value } => {
            Config::set_value_by_path(&config_path, &key, &value)?;
            println!("Set {} = {}", key, value);
        }
        ConfigAction::List { key } => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            let rendered = match key.as_deref() {
                Some(section) => config.get_value_by_path(section),
                None => config.to_display_toml(),
            };
            match rendered {
                Ok(toml) => println!("{}", toml.trim_end()),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
    Ok(())
}

/// Send IPC command to daemon and handle response.
async fn handle_ipc_command(socket: Option<PathBuf>, command: Command) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);

    match send_command(&socket_path, command).await {
        Ok(response) => match response {
            Response::Ok { message } => {
                println!("{}", message.green());
            }
            Response::Status { report } => {
                println!("{}", output::format_status(&report));
                if report.daemon_version != aura::version_string() {
                    println!(
                        "{}",
                        format!("Client is {} (version mismatch!)", aura::version_string())
                            .yellow()
                    );
                }
            }
            Response::Responses { records } => {
                if records.is_empty() {
                    println!("{}", "No replies yet".dimmed());
                }
                for record in &records {
                    println!("{}", output::format_record(record));
                }
            }
            Response::Chat { messages } => {
                if messages.is_empty() {
                    println!("{}", "No chat yet".dimmed());
                }
                for event in &messages {
                    println!("{}", output::format_chat_line(event));
                }
            }
            Response::Event { event } => {
                output::render_event(&event);
            }
            Response::Error { message } => {
                eprintln!("{}", format!("Error: {}", message).red());
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!(
                "{}",
                format!("Failed to communicate with daemon: {}", e).red()
            );
            eprintln!("Is the daemon running? Start it with: aura daemon");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Follow daemon events and render live output.
async fn handle_follow(socket: Option<PathBuf>) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);

    println!("Following daemon events... (Ctrl+C to stop)");

    match aura::ipc::client::follow(&socket_path, |event| {
        output::render_event(&event);
    })
    .await
    {
        Ok(()) => {
            output::clear_line();
            println!("Daemon connection closed");
        }
        Err(e) => {
            eprintln!("Failed to follow daemon: {}", e);
            eprintln!("Is the daemon running? Start it with: aura daemon");
            std::process::exit(1);
        }
    }

    Ok(())
}
