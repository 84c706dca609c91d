//! Local speech capability: speaks delegate items through a command-line
//! synthesizer (`espeak-ng`, `say`, …).
//!
//! The `CommandExecutor` trait keeps the player testable without the tool installed.

use crate::error::{AuraError, Result};
use std::process::Command;

/// Trait for executing system commands.
///
/// Object-safe, Send + Sync for use in concurrent contexts.
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with arguments and wait for it to exit.
    ///
    /// Returns the stdout of the command on success.
    fn execute(&self, command: &str, args: &[&str]) -> Result<String>;
}

/// Production command executor using std::process::Command.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor;

impl SystemCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        let output = Command::new(command).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AuraError::SpeechToolNotFound {
                    tool: command.to_string(),
                }
            } else {
                AuraError::SpeechFailed {
                    message: format!("Failed to execute {command}: {e}"),
                }
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuraError::SpeechFailed {
                message: format!("{command} failed with status {:?}: {stderr}", output.status),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Speaks text with a local command. Blocks until speech ends.
pub struct LocalSpeaker<E: CommandExecutor> {
    executor: E,
    command: String,
}

impl<E: CommandExecutor> LocalSpeaker<E> {
    pub fn new(executor: E, command: impl Into<String>) -> Self {
        Self {
            executor,
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments for the configured tool. `say` takes `-v` like espeak.
    fn args<'a>(&self, text: &'a str, voice: Option<&'a str>) -> Vec<&'a str> {
        let mut args = Vec::with_capacity(3);
        if let Some(voice) = voice.filter(|v| !v.is_empty()) {
            args.push("-v");
            args.push(voice);
        }
        args.push(text);
        args
    }

    pub fn speak(&self, text: &str, voice: Option<&str>) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let args = self.args(text, voice);
        self.executor
            .execute(&self.command, &args)
            .map_err(|e| match e {
                AuraError::SpeechToolNotFound { tool } => AuraError::SpeechFailed {
                    message: format!(
                        "{tool} not found. Install it (e.g. sudo apt install espeak-ng) \
                         or set audio.speech_command"
                    ),
                },
                other => other,
            })?;
        Ok(())
    }
}

impl LocalSpeaker<SystemCommandExecutor> {
    pub fn system(command: impl Into<String>) -> Self {
        Self::new(SystemCommandExecutor::new(), command)
    }
}

/// Anything able to speak a delegate item. Implemented by [`LocalSpeaker`].
pub trait Speaker: Send {
    fn speak(&self, text: &str, voice: Option<&str>) -> Result<()>;
}

impl<E: CommandExecutor> Speaker for LocalSpeaker<E> {
    fn speak(&self, text: &str, voice: Option<&str>) -> Result<()> {
        LocalSpeaker::speak(self, text, voice)
    }
}
