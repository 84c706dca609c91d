//! Shared terminal rendering for the foreground run, `aura follow`,
//! `aura status` and `aura responses`.

use crate::chat::event::ChatEvent;
use crate::ipc::protocol::StatusReport;
use crate::pipeline::types::{PipelineEvent, ResponseRecord, TextStatus, VoiceStatus};
use std::io::{self, Write};

const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Clear the current terminal line.
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

/// Truecolor escape for a `#RRGGBB` chat color.
fn hex_color(hex: &str) -> Option<String> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some(format!(
        "\x1b[38;2;{};{};{}m",
        channel(0)?,
        channel(2)?,
        channel(4)?
    ))
}

fn short_id(id: &Option<String>) -> String {
    match id {
        Some(id) => id.chars().take(8).collect(),
        None => "-".to_string(),
    }
}

/// One status line for a response record.
pub fn format_record(record: &ResponseRecord) -> String {
    let text = match record.text_status {
        TextStatus::Pending => format!("{DIM}pending{RESET}"),
        TextStatus::Processing => match &record.text_provider {
            Some(p) => format!("{YELLOW}thinking via {p}{RESET}"),
            None => format!("{YELLOW}thinking{RESET}"),
        },
        TextStatus::Done => format!(
            "{GREEN}{}{RESET}",
            record.text_provider.as_deref().unwrap_or("?")
        ),
        TextStatus::Error => format!("{RED}failed{RESET}"),
    };
    let voice = match record.voice_status {
        None => String::new(),
        Some(VoiceStatus::Pending) => format!(" {DIM}voicing…{RESET}"),
        Some(VoiceStatus::Done) => format!(
            " {DIM}voice {}{RESET}",
            record.voice_provider.as_deref().unwrap_or("?")
        ),
        Some(VoiceStatus::Error) => format!(
            " {RED}voice failed{}{RESET}",
            record
                .error
                .as_deref()
                .map(|e| format!(": {e}"))
                .unwrap_or_default()
        ),
    };
    let reply = if record.reply.is_empty() {
        String::new()
    } else {
        format!("\n    {BOLD}{}{RESET}", record.reply)
    };
    format!(
        "{CYAN}{}{RESET}: {} [{text}{voice}]{reply}",
        record.user, record.message
    )
}

/// Sender in their chat color, then the message.
fn chat_text(event: &ChatEvent) -> String {
    let color = event
        .color
        .as_deref()
        .and_then(hex_color)
        .unwrap_or_else(|| CYAN.to_string());
    format!("{color}{}{RESET}: {}", event.display_name, event.message)
}

/// One display-log line for `aura chat`, stamped with local receive time.
pub fn format_chat_line(event: &ChatEvent) -> String {
    let time = event.received_at.with_timezone(&chrono::Local).format("%H:%M:%S");
    format!("{DIM}{time}{RESET} {}", chat_text(event))
}

/// Render an event as one or more lines, or `None` if it is not worth showing.
pub fn format_event(event: &PipelineEvent) -> Option<String> {
    let line = match event {
        PipelineEvent::Chat { event, queued } => {
            let marker = if *queued { "»" } else { " " };
            format!("{DIM}{marker}{RESET} {}", chat_text(event))
        }
        PipelineEvent::Connection { status } => format!("{DIM}chat {status}{RESET}"),
        PipelineEvent::QueueDropped { dropped, reason } => {
            format!("{DIM}dropped {dropped} queued message(s) ({reason}){RESET}")
        }
        // Only terminal states; intermediate updates would flood the terminal
        PipelineEvent::Response { record } => match (record.text_status, record.voice_status) {
            (TextStatus::Done, Some(VoiceStatus::Pending)) => return None,
            (TextStatus::Done, _) | (TextStatus::Error, _) => format_record(record),
            _ => return None,
        },
        PipelineEvent::LockoutStarted { secs } => {
            format!("{RED}Quota exhausted. Cooling down for {secs}s…{RESET}")
        }
        PipelineEvent::LockoutCleared => format!("{GREEN}Lockout over, replies resume{RESET}"),
        PipelineEvent::AudioStarted { response_id } => {
            format!("{DIM}♪ playing {}{RESET}", short_id(response_id))
        }
        PipelineEvent::AudioFinished { .. } => return None,
        PipelineEvent::AudioSkipped {
            response_id,
            reason,
        } => format!(
            "{YELLOW}audio skipped for {}: {reason}{RESET}",
            short_id(response_id)
        ),
        PipelineEvent::Notice { message } => format!("{DIM}[aura] {message}{RESET}"),
    };
    Some(line)
}

/// Render a pipeline event to stderr.
pub fn render_event(event: &PipelineEvent) {
    if let Some(line) = format_event(event) {
        clear_line();
        eprintln!("{line}");
        io::stderr().flush().ok();
    }
}

/// Multi-line summary for `aura status`.
pub fn format_status(report: &StatusReport) -> String {
    let lockout = if report.locked {
        format!(
            "{RED}locked out ({}s left){RESET}",
            report.lockout_remaining_secs
        )
    } else if report.cooldown_remaining_secs > 0 {
        format!(
            "{YELLOW}cooling down ({}s left){RESET}",
            report.cooldown_remaining_secs
        )
    } else {
        format!("{GREEN}ready{RESET}")
    };
    let flag = |on: bool| if on { "on" } else { "off" };
    let ignored = if report.ignored_users.is_empty() {
        "-".to_string()
    } else {
        report.ignored_users.join(", ")
    };
    [
        format!("Chat:        {}", report.connection),
        format!("Pipeline:    {lockout}"),
        format!("Queue:       {}", report.queue_len),
        format!("In flight:   {}", if report.in_flight { "yes" } else { "no" }),
        format!("Cooldown:    {}s", report.cooldown_secs),
        format!("Auto-reply:  {}", flag(report.auto_reply)),
        format!("Feed paused: {}", flag(report.feed_paused)),
        format!("AI paused:   {}", flag(report.ai_paused)),
        format!("Text from:   {}", report.preferred_text),
        match report.voice_provider.as_deref() {
            Some(provider) => format!("Voice:       {provider} ({})", report.voice),
            None => "Voice:       off".to_string(),
        },
        format!("Personality: {}", report.personality),
        format!("Ignored:     {ignored}"),
        format!("Version:     {}", report.daemon_version),
    ]
    .join("\n")
}
