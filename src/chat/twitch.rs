//! Anonymous read-only Twitch chat over IRC-on-WebSocket.

use crate::chat::admission::ChatIntake;
use crate::chat::event::{ChatEvent, ConnectionStatus};
use crate::defaults;
use crate::error::{AuraError, Result};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// One parsed IRC line, reduced to what the companion cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum IrcLine {
    Ping(String),
    Privmsg(ChatEvent),
    Other,
}

/// Parse a single IRC line (without trailing CRLF).
pub fn parse_irc_line(line: &str) -> IrcLine {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(payload) = line.strip_prefix("PING") {
        return IrcLine::Ping(payload.trim().to_string());
    }

    let (tags, rest) = match line.strip_prefix('@') {
        Some(tagged) => match tagged.split_once(' ') {
            Some((tags, rest)) => (parse_tags(tags), rest),
            None => return IrcLine::Other,
        },
        None => (HashMap::new(), line),
    };

    let (login, rest) = match rest.strip_prefix(':') {
        Some(prefixed) => match prefixed.split_once(' ') {
            Some((prefix, rest)) => (prefix.split('!').next().unwrap_or(prefix), rest),
            None => return IrcLine::Other,
        },
        None => ("", rest),
    };

    let Some(("PRIVMSG", params)) = rest.split_once(' ') else {
        return IrcLine::Other;
    };
    let Some((_channel, message)) = params.split_once(" :") else {
        return IrcLine::Other;
    };
    let message = message.trim();
    if login.is_empty() || message.is_empty() {
        return IrcLine::Other;
    }

    let mut event = ChatEvent::new(login.to_lowercase(), message);
    if let Some(id) = tags.get("id").filter(|v| !v.is_empty()) {
        event = event.with_id(id.clone());
    }
    if let Some(name) = tags.get("display-name").filter(|v| !v.is_empty()) {
        event = event.with_display_name(name.clone());
    } else {
        event = event.with_display_name(login);
    }
    if let Some(color) = tags.get("color").filter(|v| !v.is_empty()) {
        event = event.with_color(color.clone());
    }
    IrcLine::Privmsg(event)
}

fn parse_tags(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (!key.is_empty()).then(|| (key.to_string(), unescape_tag(value)))
        })
        .collect()
}

/// IRCv3 tag value unescaping.
fn unescape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Anonymous `justinfanNNNNNN` login.
fn anonymous_nick() -> String {
    let n = uuid::Uuid::new_v4().as_u128() % 900_000 + 100_000;
    format!("justinfan{n}")
}

/// Lines sent right after the socket opens.
pub fn handshake(channel: &str, nick: &str) -> Vec<String> {
    vec![
        "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string(),
        "PASS SCHMOOPIIE".to_string(),
        format!("NICK {nick}"),
        format!("JOIN #{}", channel.trim_start_matches('#').to_lowercase()),
    ]
}

/// Twitch chat source with automatic reconnect.
pub struct TwitchChat {
    channel: String,
    url: String,
    reconnect_delay: Duration,
}

impl TwitchChat {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            url: defaults::TWITCH_IRC_URL.to_string(),
            reconnect_delay: Duration::from_secs(defaults::CHAT_RECONNECT_SECS),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Stream chat into `intake` until `shutdown` flips to true.
    pub async fn run(&self, intake: ChatIntake, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            if *shutdown.borrow() {
                break;
            }
            intake.set_status(ConnectionStatus::Connecting);
            match self.connect_once(&intake, &mut shutdown).await {
                Ok(()) => intake.set_status(ConnectionStatus::Disconnected),
                Err(e) => {
                    warn!(channel = %self.channel, "chat connection failed: {e}");
                    intake.set_status(ConnectionStatus::Error);
                }
            }
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.changed() => {}
            }
        }
        intake.set_status(ConnectionStatus::Disconnected);
        Ok(())
    }

    async fn connect_once(
        &self,
        intake: &ChatIntake,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| AuraError::ChatConnection {
                message: format!("connect: {e}"),
            })?;
        let (mut write, mut read) = ws.split();

        for line in handshake(&self.channel, &anonymous_nick()) {
            write
                .send(Message::Text(line))
                .await
                .map_err(|e| AuraError::ChatConnection {
                    message: format!("handshake: {e}"),
                })?;
        }
        intake.set_status(ConnectionStatus::Connected);
        info!(channel = %self.channel, "joined chat");

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        for line in text.lines() {
                            match parse_irc_line(line) {
                                IrcLine::Ping(payload) => {
                                    let pong = if payload.is_empty() {
                                        "PONG :tmi.twitch.tv".to_string()
                                    } else {
                                        format!("PONG {payload}")
                                    };
                                    write.send(Message::Text(pong)).await.map_err(|e| {
                                        AuraError::ChatConnection { message: format!("pong: {e}") }
                                    })?;
                                }
                                IrcLine::Privmsg(event) => {
                                    intake.deliver(event);
                                }
                                IrcLine::Other => debug!(line, "irc"),
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => {
                        return Err(AuraError::ChatConnection { message: format!("read: {e}") });
                    }
                    Some(Ok(_)) => {}
                },
                _ = shutdown.changed() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!("close frame not sent: {e}");
                    }
                    return Ok(());
                }
            }
        }
    }
}
