//! Error types for aura.

use crate::provider::error::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuraError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // Audio errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio output failed: {message}")]
    AudioOutput { message: String },

    #[error("Audio decode failed: {message}")]
    AudioDecode { message: String },

    // Local speech errors
    #[error("Speech tool not found: {tool}")]
    SpeechToolNotFound { tool: String },

    #[error("Local speech failed: {message}")]
    SpeechFailed { message: String },

    // Chat transport errors
    #[error("Chat connection failed: {message}")]
    ChatConnection { message: String },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AuraError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::error::ProviderErrorKind;
    use std::io;

    #[test]
    fn test_config_invalid_value_display() {
        let error = AuraError::ConfigInvalidValue {
            key: "timing.lockout_secs".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for timing.lockout_secs: must be positive"
        );
    }

    #[test]
    fn test_audio_decode_display() {
        let error = AuraError::AudioDecode {
            message: "odd byte count".to_string(),
        };
        assert_eq!(error.to_string(), "Audio decode failed: odd byte count");
    }

    #[test]
    fn test_speech_tool_not_found_display() {
        let error = AuraError::SpeechToolNotFound {
            tool: "espeak-ng".to_string(),
        };
        assert_eq!(error.to_string(), "Speech tool not found: espeak-ng");
    }

    #[test]
    fn test_provider_error_converts() {
        let provider = ProviderError::new(ProviderErrorKind::Throttled, "gemini", "429");
        let error: AuraError = provider.into();
        assert!(error.to_string().starts_with("Provider error:"));
        assert!(error.to_string().contains("gemini"));
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "socket missing");
        let error: AuraError = io_error.into();
        assert!(error.to_string().contains("socket missing"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("a = = b").unwrap_err();
        let error: AuraError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<AuraError>();
        assert_sync::<AuraError>();
    }
}
