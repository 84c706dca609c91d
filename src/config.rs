use crate::defaults;
use crate::error::{AuraError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub chat: ChatConfig,
    pub persona: PersonaConfig,
    pub text: TextConfig,
    pub voice: VoiceConfig,
    pub timing: TimingConfig,
    pub audio: AudioConfig,
    pub history: HistoryConfig,
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// Chat ingestion and admission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    /// Twitch channel to join (without `#`)
    pub channel: String,
    pub ignored_users: Vec<String>,
    pub auto_reply: bool,
    pub display_log_size: usize,
}

/// Personality handed to the prompt builder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersonaConfig {
    pub personality: String,
    pub max_words: u32,
}

/// Text provider ring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextConfig {
    /// Provider ids in rotation order
    pub ring: Vec<String>,
    /// Rotation start point; must be a member of `ring`
    pub preferred: String,
    pub timeout_secs: u64,
}

/// Speech target. A single provider, never rotated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    /// Provider id, `local` for the local speech command, or `none`
    pub provider: String,
    pub voice: String,
    pub timeout_secs: u64,
}

/// Cooldown, lockout and polling timings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub cooldown_secs: u64,
    pub lockout_secs: u64,
    pub poll_interval_ms: u64,
    pub next_check_delay_ms: u64,
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub output_device: Option<String>,
    pub speech_command: String,
}

/// Observable history sizes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub responses: usize,
}

/// Wire protocol spoken by a provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Gemini,
    OpenaiCompatible,
}

/// One `[providers.<id>]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Environment variable holding the credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Inline credential; takes precedence over `api_key_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_model: Option<String>,
    /// Voice used when `voice.voice` is not one this provider offers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_voice: Option<String>,
}

impl ProviderConfig {
    /// Resolves the credential. Empty values count as missing.
    pub fn api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        self.api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chat: ChatConfig::default(),
            persona: PersonaConfig::default(),
            text: TextConfig::default(),
            voice: VoiceConfig::default(),
            timing: TimingConfig::default(),
            audio: AudioConfig::default(),
            history: HistoryConfig::default(),
            providers: default_providers(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            ignored_users: defaults::DEFAULT_IGNORED_USERS
                .iter()
                .map(|u| u.to_string())
                .collect(),
            auto_reply: true,
            display_log_size: defaults::CHAT_LOG_SIZE,
        }
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            personality: defaults::DEFAULT_PERSONALITY.to_string(),
            max_words: defaults::MAX_REPLY_WORDS,
        }
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            ring: vec![
                "gemini".to_string(),
                "openai".to_string(),
                "groq".to_string(),
            ],
            preferred: "gemini".to_string(),
            timeout_secs: defaults::PROVIDER_TIMEOUT_SECS,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            voice: defaults::DEFAULT_VOICE.to_string(),
            timeout_secs: defaults::PROVIDER_TIMEOUT_SECS,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: defaults::COOLDOWN_SECS,
            lockout_secs: defaults::LOCKOUT_SECS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            next_check_delay_ms: defaults::NEXT_CHECK_DELAY_MS,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_device: None,
            speech_command: defaults::SPEECH_COMMAND.to_string(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            responses: defaults::RESPONSE_HISTORY,
        }
    }
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    let mut providers = BTreeMap::new();
    providers.insert(
        "gemini".to_string(),
        ProviderConfig {
            kind: ProviderKind::Gemini,
            api_key_env: Some("GEMINI_API_KEY".to_string()),
            api_key: None,
            base_url: None,
            text_model: Some("gemini-2.0-flash".to_string()),
            speech_model: Some("gemini-2.5-flash-preview-tts".to_string()),
            default_voice: None,
        },
    );
    providers.insert(
        "openai".to_string(),
        ProviderConfig {
            kind: ProviderKind::OpenaiCompatible,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            api_key: None,
            base_url: Some("https://api.openai.com/v1".to_string()),
            text_model: Some("gpt-4o-mini".to_string()),
            speech_model: Some("tts-1".to_string()),
            default_voice: None,
        },
    );
    providers.insert(
        "groq".to_string(),
        ProviderConfig {
            kind: ProviderKind::OpenaiCompatible,
            api_key_env: Some("GROQ_API_KEY".to_string()),
            api_key: None,
            base_url: Some("https://api.groq.com/openai/v1".to_string()),
            text_model: Some("llama-3.1-8b-instant".to_string()),
            speech_model: None,
            default_voice: None,
        },
    );
    providers
}

/// Voice target that plays through the local speech command.
pub const LOCAL_VOICE: &str = "local";
/// Voice target that disables speech.
pub const NO_VOICE: &str = "none";

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AuraError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                AuraError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(AuraError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - AURA_CHANNEL → chat.channel
    /// - AURA_TEXT_PROVIDER → text.preferred
    /// - AURA_VOICE_PROVIDER → voice.provider
    /// - AURA_VOICE → voice.voice
    /// - AURA_COOLDOWN_SECS → timing.cooldown_secs
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(channel) = std::env::var("AURA_CHANNEL")
            && !channel.is_empty()
        {
            self.chat.channel = channel;
        }

        if let Ok(provider) = std::env::var("AURA_TEXT_PROVIDER")
            && !provider.is_empty()
        {
            self.text.preferred = provider;
        }

        if let Ok(provider) = std::env::var("AURA_VOICE_PROVIDER")
            && !provider.is_empty()
        {
            self.voice.provider = provider;
        }

        if let Ok(voice) = std::env::var("AURA_VOICE")
            && !voice.is_empty()
        {
            self.voice.voice = voice;
        }

        if let Ok(secs) = std::env::var("AURA_COOLDOWN_SECS")
            && !secs.is_empty()
        {
            match secs.parse::<u64>() {
                Ok(secs) => self.timing.cooldown_secs = secs,
                Err(e) => tracing::warn!(value = %secs, "ignoring AURA_COOLDOWN_SECS: {e}"),
            }
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/aura/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aura")
            .join("config.toml")
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.text.ring.is_empty() {
            return Err(invalid("text.ring", "must name at least one provider"));
        }
        for id in &self.text.ring {
            if !self.providers.contains_key(id) {
                return Err(invalid(
                    "text.ring",
                    &format!("'{id}' has no [providers.{id}] section"),
                ));
            }
        }
        if !self.text.ring.contains(&self.text.preferred) {
            return Err(invalid(
                "text.preferred",
                &format!("'{}' is not in text.ring", self.text.preferred),
            ));
        }
        let voice = self.voice.provider.as_str();
        if voice != LOCAL_VOICE && voice != NO_VOICE && !self.providers.contains_key(voice) {
            return Err(invalid(
                "voice.provider",
                &format!("'{voice}' is not local, none, or a configured provider"),
            ));
        }
        if self.text.timeout_secs == 0 {
            return Err(invalid("text.timeout_secs", "must be positive"));
        }
        if self.voice.timeout_secs == 0 {
            return Err(invalid("voice.timeout_secs", "must be positive"));
        }
        if self.timing.lockout_secs == 0 {
            return Err(invalid("timing.lockout_secs", "must be positive"));
        }
        if self.timing.poll_interval_ms == 0 {
            return Err(invalid("timing.poll_interval_ms", "must be positive"));
        }
        if self.history.responses == 0 {
            return Err(invalid("history.responses", "must be positive"));
        }
        Ok(())
    }

    /// Read a value by dotted key (e.g. `timing.cooldown_secs`).
    pub fn get_value_by_path(&self, key: &str) -> Result<String> {
        let root = toml::Value::try_from(self).map_err(|e| AuraError::ConfigParse {
            message: e.to_string(),
        })?;
        let mut current = &root;
        for part in key.split('.') {
            current = current.get(part).ok_or_else(|| AuraError::ConfigInvalidValue {
                key: key.to_string(),
                message: "unknown key".to_string(),
            })?;
        }
        Ok(match current {
            toml::Value::String(s) => s.clone(),
            toml::Value::Table(_) => {
                toml::to_string_pretty(current).map_err(|e| AuraError::ConfigParse {
                    message: e.to_string(),
                })?
            }
            other => other.to_string(),
        })
    }

    /// Write a value by dotted key into the file at `path`, creating it if needed.
    ///
    /// The result must still deserialize as a `Config`; otherwise the file is left untouched.
    pub fn set_value_by_path(path: &Path, key: &str, value: &str) -> Result<()> {
        let mut root = match fs::read_to_string(path) {
            Ok(contents) => toml::from_str::<toml::Table>(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
            Err(e) => return Err(AuraError::Io(e)),
        };

        let parts: Vec<&str> = key.split('.').collect();
        let Some((leaf, parents)) = parts.split_last() else {
            return Err(invalid(key, "empty key"));
        };
        let mut table = &mut root;
        for part in parents {
            let entry = table
                .entry(part.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            table = match entry {
                toml::Value::Table(t) => t,
                _ => return Err(invalid(key, &format!("'{part}' is not a section"))),
            };
        }
        table.insert(leaf.to_string(), parse_scalar(value));

        let text = toml::to_string_pretty(&root).map_err(|e| AuraError::ConfigParse {
            message: e.to_string(),
        })?;
        let parsed: Config = toml::from_str(&text).map_err(|e| AuraError::ConfigInvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        parsed.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        Ok(())
    }

    /// Full configuration rendered as TOML.
    pub fn to_display_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AuraError::ConfigParse {
            message: e.to_string(),
        })
    }
}

fn invalid(key: &str, message: &str) -> AuraError {
    AuraError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Interpret a CLI value as TOML (bool, number, array) and fall back to a plain string.
fn parse_scalar(value: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("v = {value}"))
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| toml::Value::String(value.to_string()))
}

/// Settings that may change while the companion runs.
///
/// Read once per attempt by the pipeline and once per event by admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Channel owner; their messages are tagged in prompts.
    pub channel: String,
    pub personality: String,
    pub max_words: u32,
    pub preferred_text: String,
    pub voice: String,
    pub cooldown_secs: u64,
    pub ignored_users: Vec<String>,
    pub auto_reply: bool,
}

impl RuntimeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            channel: config.chat.channel.trim().trim_start_matches('#').to_string(),
            personality: config.persona.personality.clone(),
            max_words: config.persona.max_words,
            preferred_text: config.text.preferred.clone(),
            voice: config.voice.voice.clone(),
            cooldown_secs: config.timing.cooldown_secs,
            ignored_users: config.chat.ignored_users.clone(),
            auto_reply: config.chat.auto_reply,
        }
    }

    /// True if `username` owns the joined channel.
    pub fn is_streamer(&self, username: &str) -> bool {
        !self.channel.is_empty() && self.channel.eq_ignore_ascii_case(username)
    }

    /// Case-insensitive ignore-list lookup.
    pub fn is_ignored(&self, username: &str) -> bool {
        self.ignored_users
            .iter()
            .any(|u| u.eq_ignore_ascii_case(username))
    }

    /// Adds a user unless already present. Returns true if the list changed.
    pub fn ignore(&mut self, username: &str) -> bool {
        if self.is_ignored(username) {
            return false;
        }
        self.ignored_users.push(username.to_string());
        true
    }

    /// Removes a user (case-insensitive). Returns true if the list changed.
    pub fn unignore(&mut self, username: &str) -> bool {
        let before = self.ignored_users.len();
        self.ignored_users
            .retain(|u| !u.eq_ignore_ascii_case(username));
        self.ignored_users.len() != before
    }
}

/// Shared handle to [`RuntimeSettings`].
pub type LiveSettings = Arc<RwLock<RuntimeSettings>>;

pub fn live_settings(config: &Config) -> LiveSettings {
    Arc::new(RwLock::new(RuntimeSettings::from_config(config)))
}

/// Clone the current settings, recovering from a poisoned lock.
pub fn read_settings(settings: &LiveSettings) -> RuntimeSettings {
    match settings.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Mutate the settings in place, recovering from a poisoned lock.
pub fn update_settings<R>(settings: &LiveSettings, f: impl FnOnce(&mut RuntimeSettings) -> R) -> R {
    match settings.write() {
        Ok(mut guard) => f(&mut guard),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    }
}
