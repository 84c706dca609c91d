//! Command-line interface for aura
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Stream chat companion that answers viewers out loud
#[derive(Parser, Debug)]
#[command(
    name = "aura",
    version,
    about = "Stream chat companion that answers viewers out loud"
)]
pub struct Cli {
    /// Subcommand to execute (default: run in the foreground)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Twitch channel to read (overrides chat.channel)
    #[arg(long, global = true, value_name = "NAME")]
    pub channel: Option<String>,

    /// Read chat as `user: message` lines from stdin
    #[arg(long, global = true)]
    pub stdin: bool,

    /// Do not play any audio
    #[arg(long, global = true)]
    pub no_audio: bool,
}

/// Parse a cooldown duration into whole seconds.
///
/// Accepts bare numbers (seconds) and anything `humantime` understands
/// (`15s`, `1m`, `1m30s`).
fn parse_duration_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs())
        .map_err(|e| e.to_string())
}

/// `on`/`off` switch argument.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn enabled(self) -> bool {
        self == Switch::On
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the companion with a control socket (foreground process for systemd)
    Daemon {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Show pipeline status
    Status {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Show recent replies
    Responses {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Show recently seen chat lines
    Chat {
        /// Only the newest N lines
        #[arg(short = 'n', long, value_name = "N")]
        limit: Option<usize>,
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Stop reading chat and replying
    PauseFeed {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Resume reading chat
    ResumeFeed {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Keep reading chat but start no new replies
    PauseAi {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Resume replying
    ResumeAi {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Turn automatic replies on or off
    AutoReply {
        state: Switch,
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Never reply to a user
    Ignore {
        user: String,
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Remove a user from the ignore list
    Unignore {
        user: String,
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Minimum gap between replies. Examples: 15, 15s, 1m
    Cooldown {
        #[arg(value_name = "DURATION", value_parser = parse_duration_secs)]
        secs: u64,
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Voice for spoken replies (e.g. Puck, Kore, alloy)
    Voice {
        name: String,
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Replace the companion's personality
    Personality {
        /// Personality text; several words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Start text generation at this provider
    Prefer {
        provider: String,
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Follow live events (chat, replies, lockouts, playback)
    Follow {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Stop a running daemon
    Shutdown {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/aura.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// List available audio output devices
    Devices,

    /// View and modify configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Get a configuration value by key (e.g., timing.cooldown_secs)
    Get {
        /// Dotted key path (e.g., voice.provider, providers.gemini.text_model)
        key: String,
    },
    /// Set a configuration value by key
    Set {
        /// Dotted key path (e.g., voice.provider, timing.cooldown_secs)
        key: String,
        /// Value to set
        value: String,
    },
    /// List current configuration values (optionally one section)
    List {
        /// Config section to show (e.g., chat, text, providers)
        key: Option<String>,
    },
}
