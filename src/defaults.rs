//! Default configuration constants for aura.
//!
//! Shared by the config layer, the pipeline and the providers so the same
//! numbers never drift apart.

/// Minimum seconds between the end of one successful reply and the next attempt.
pub const COOLDOWN_SECS: u64 = 15;

/// Lower bound accepted for the standard cooldown.
pub const MIN_COOLDOWN_SECS: u64 = 5;

/// Upper bound accepted for the standard cooldown.
pub const MAX_COOLDOWN_SECS: u64 = 120;

/// Punitive lockout after a provider reports quota exhaustion.
///
/// The pending queue is cleared and nothing is dequeued until it expires.
pub const LOCKOUT_SECS: u64 = 90;

/// How often the worker re-checks a refused dequeue (cooldown, lockout, pause).
pub const POLL_INTERVAL_MS: u64 = 1000;

/// Delay before the next dequeue check after every attempt, success or failure.
pub const NEXT_CHECK_DELAY_MS: u64 = 1500;

/// Per-attempt timeout for text and speech providers.
///
/// Expiry is reported as a transport failure so the ring keeps rotating.
pub const PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Number of `ResponseRecord`s kept for observers (newest first).
pub const RESPONSE_HISTORY: usize = 50;

/// Number of chat lines kept in the "recently seen" display log.
pub const CHAT_LOG_SIZE: usize = 100;

/// Capacity of the pipeline → sequencer audio channel.
pub const AUDIO_QUEUE_CAPACITY: usize = 32;

/// Capacity of the pipeline event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Sample rate of raw PCM returned by Gemini speech models.
pub const PCM_SAMPLE_RATE: u32 = 24000;

/// Reply used when a provider answers with whitespace only after trimming quotes.
pub const FALLBACK_REPLY: &str = "Yo!";

/// Default prebuilt voice.
pub const DEFAULT_VOICE: &str = "Puck";

/// Prebuilt voices offered by Gemini speech models.
pub const GEMINI_VOICES: &[&str] = &["Kore", "Puck", "Charon", "Fenrir", "Zephyr"];

/// Voices accepted by the OpenAI speech endpoint.
pub const OPENAI_VOICES: &[&str] = &[
    "alloy", "ash", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer",
];

/// OpenAI voice used when the configured one is not in [`OPENAI_VOICES`].
pub const OPENAI_DEFAULT_VOICE: &str = "alloy";

/// Companion name used in prompts.
pub const COMPANION_NAME: &str = "Aura";

/// Default personality handed to the prompt builder.
pub const DEFAULT_PERSONALITY: &str = "You are a witty, youthful, and high-energy stream companion named Aura. \
Keep your responses short (under 15 words), trendy, and interactive. \
Use a youthful tone and react with excitement to the chat messages.";

/// Maximum words the prompt asks for.
pub const MAX_REPLY_WORDS: u32 = 10;

/// Chat bots ignored out of the box.
pub const DEFAULT_IGNORED_USERS: &[&str] = &["Nightbot", "StreamElements"];

/// Anonymous Twitch chat endpoint.
pub const TWITCH_IRC_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Delay before reconnecting a dropped chat connection.
pub const CHAT_RECONNECT_SECS: u64 = 5;

/// Local speech command (text on argv, plays through the system mixer).
pub const SPEECH_COMMAND: &str = "espeak-ng";

/// Socket file name inside `$XDG_RUNTIME_DIR`.
pub const SOCKET_NAME: &str = "aura.sock";
