use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One parsed chat message. Immutable once produced by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub id: String,
    /// Login name as sent by the transport; used for ignore-list matching.
    pub username: String,
    pub display_name: String,
    pub message: String,
    pub received_at: DateTime<Utc>,
    /// Hex color chosen by the chatter, if the transport reports one.
    pub color: Option<String>,
}

impl ChatEvent {
    /// Builds an event stamped now with a fresh id.
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: username.clone(),
            username,
            message: message.into(),
            received_at: Utc::now(),
            color: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Connection state reported by a chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_defaults_display_name_to_username() {
        let event = ChatEvent::new("viewer42", "hello");
        assert_eq!(event.display_name, "viewer42");
        assert_eq!(event.color, None);
        assert!(!event.id.is_empty());
    }

    #[test]
    fn builders_override_fields() {
        let event = ChatEvent::new("viewer42", "hello")
            .with_id("abc")
            .with_display_name("Viewer42")
            .with_color("#FF0000");
        assert_eq!(event.id, "abc");
        assert_eq!(event.display_name, "Viewer42");
        assert_eq!(event.color.as_deref(), Some("#FF0000"));
    }

    #[test]
    fn connection_status_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionStatus::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
    }
}
