//! Command handler for the daemon's control socket.

use crate::app::CompanionControl;
use crate::ipc::protocol::{Command, Response};
use crate::ipc::server::CommandHandler;
use crate::pipeline::types::PipelineEvent;
use tokio::sync::broadcast;

/// Maps IPC commands onto a running companion.
pub struct DaemonCommandHandler {
    control: CompanionControl,
}

impl DaemonCommandHandler {
    pub fn new(control: CompanionControl) -> Self {
        Self { control }
    }

    fn ignore(&self, user: &str) -> Response {
        if user.trim().is_empty() {
            return Response::error("User name is empty");
        }
        if self.control.ignore(user.trim()) {
            Response::ok(format!("Ignoring {user}"))
        } else {
            Response::ok(format!("{user} was already ignored"))
        }
    }

    fn unignore(&self, user: &str) -> Response {
        if self.control.unignore(user.trim()) {
            Response::ok(format!("No longer ignoring {user}"))
        } else {
            Response::error(format!("{user} is not ignored"))
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Status => Response::Status {
                report: self.control.status(),
            },
            Command::Responses => Response::Responses {
                records: self.control.responses(),
            },
            Command::Chat { limit } => Response::Chat {
                messages: self.control.recent_chat(limit),
            },
            Command::PauseFeed => {
                self.control.set_feed_paused(true);
                Response::ok("Chat feed paused")
            }
            Command::ResumeFeed => {
                self.control.set_feed_paused(false);
                Response::ok("Chat feed resumed")
            }
            Command::PauseAi => {
                self.control.set_ai_paused(true);
                Response::ok("Replies paused")
            }
            Command::ResumeAi => {
                self.control.set_ai_paused(false);
                Response::ok("Replies resumed")
            }
            Command::SetAutoReply { enabled } => {
                self.control.set_auto_reply(enabled);
                Response::ok(format!("Auto-reply {}", if enabled { "on" } else { "off" }))
            }
            Command::Ignore { user } => self.ignore(&user),
            Command::Unignore { user } => self.unignore(&user),
            Command::SetCooldown { secs } => match self.control.set_cooldown(secs) {
                Ok(()) => Response::ok(format!("Cooldown set to {secs}s")),
                Err(e) => Response::error(e.to_string()),
            },
            Command::SetVoice { voice } => match self.control.set_voice(&voice) {
                Ok(()) => Response::ok(format!("Voice set to {}", voice.trim())),
                Err(e) => Response::error(e.to_string()),
            },
            Command::SetPersonality { text } => match self.control.set_personality(&text) {
                Ok(()) => Response::ok("Personality updated"),
                Err(e) => Response::error(e.to_string()),
            },
            Command::SetPreferred { provider } => match self.control.set_preferred(&provider) {
                Ok(()) => Response::ok(format!("Text rotation starts at {provider}")),
                Err(e) => Response::error(e.to_string()),
            },
            // The server streams follow itself; reaching here means no stream
            Command::Follow => Response::error("follow must be sent on its own connection"),
            Command::Shutdown => {
                self.control.request_shutdown();
                Response::ok("Shutting down")
            }
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<PipelineEvent>> {
        Some(self.control.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{ChatSource, Companion, CompanionOptions};
    use crate::config::Config;

    fn start() -> Companion {
        Companion::start(
            Config::default(),
            CompanionOptions {
                source: ChatSource::Detached,
                no_audio: true,
                render: false,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_handler_status() {
        let companion = start();
        let handler = DaemonCommandHandler::new(companion.control());

        match handler.handle(Command::Status).await {
            Response::Status { report } => {
                assert_eq!(report.queue_len, 0);
                assert!(!report.locked);
                assert!(report.auto_reply);
                assert_eq!(report.preferred_text, "gemini");
            }
            other => panic!("Expected Status response, got {other:?}"),
        }
        companion.shutdown().await;
    }

    #[tokio::test]
    async fn test_pause_commands_toggle_flags() {
        let companion = start();
        let control = companion.control();
        let handler = DaemonCommandHandler::new(control.clone());

        assert_eq!(
            handler.handle(Command::PauseFeed).await,
            Response::ok("Chat feed paused")
        );
        handler.handle(Command::PauseAi).await;
        let status = control.status();
        assert!(status.feed_paused && status.ai_paused);

        handler.handle(Command::ResumeFeed).await;
        handler.handle(Command::ResumeAi).await;
        let status = control.status();
        assert!(!status.feed_paused && !status.ai_paused);
        companion.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_values_are_errors() {
        let companion = start();
        let handler = DaemonCommandHandler::new(companion.control());

        let response = handler.handle(Command::SetCooldown { secs: 0 }).await;
        assert!(matches!(response, Response::Error { .. }));
        let response = handler
            .handle(Command::SetPreferred {
                provider: "nope".to_string(),
            })
            .await;
        assert!(matches!(response, Response::Error { .. }));
        let response = handler
            .handle(Command::Unignore {
                user: "nobody".to_string(),
            })
            .await;
        assert!(matches!(response, Response::Error { .. }));
        companion.shutdown().await;
    }

    #[tokio::test]
    async fn test_ignore_then_unignore() {
        let companion = start();
        let control = companion.control();
        let handler = DaemonCommandHandler::new(control.clone());

        let response = handler
            .handle(Command::Ignore {
                user: "Spammer".to_string(),
            })
            .await;
        assert_eq!(response, Response::ok("Ignoring Spammer"));
        assert!(control.status().ignored_users.contains(&"Spammer".to_string()));

        let response = handler
            .handle(Command::Unignore {
                user: "spammer".to_string(),
            })
            .await;
        assert!(matches!(response, Response::Ok { .. }));
        companion.shutdown().await;
    }

    #[tokio::test]
    async fn test_chat_returns_display_log() {
        let companion = start();
        let control = companion.control();
        let handler = DaemonCommandHandler::new(control.clone());
        control.set_ai_paused(true);
        control.deliver(crate::chat::ChatEvent::new("nightbot", "!uptime"));
        control.deliver(crate::chat::ChatEvent::new("viewer", "hello"));

        match handler.handle(Command::Chat { limit: Some(1) }).await {
            Response::Chat { messages } => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].message, "hello");
            }
            other => panic!("Expected Chat response, got {other:?}"),
        }
        match handler.handle(Command::Chat { limit: None }).await {
            Response::Chat { messages } => assert_eq!(messages.len(), 2),
            other => panic!("Expected Chat response, got {other:?}"),
        }
        companion.shutdown().await;
    }

    #[tokio::test]
    async fn test_voice_and_personality_are_live() {
        let companion = start();
        let control = companion.control();
        let handler = DaemonCommandHandler::new(control.clone());

        let response = handler
            .handle(Command::SetVoice {
                voice: "Charon".to_string(),
            })
            .await;
        assert_eq!(response, Response::ok("Voice set to Charon"));
        let response = handler
            .handle(Command::SetPersonality {
                text: "Dry British wit.".to_string(),
            })
            .await;
        assert_eq!(response, Response::ok("Personality updated"));

        let status = control.status();
        assert_eq!(status.voice, "Charon");
        assert_eq!(status.personality, "Dry British wit.");

        let response = handler
            .handle(Command::SetPersonality {
                text: "   ".to_string(),
            })
            .await;
        assert!(matches!(response, Response::Error { .. }));
        companion.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_signals_control() {
        let companion = start();
        let control = companion.control();
        let handler = DaemonCommandHandler::new(control.clone());

        assert_eq!(
            handler.handle(Command::Shutdown).await,
            Response::ok("Shutting down")
        );
        tokio::time::timeout(std::time::Duration::from_secs(1), control.wait_shutdown())
            .await
            .unwrap();
        companion.shutdown().await;
    }
}
