//! Line-based local chat source.
//!
//! Each line is `user: message`, or just `message` for the `local` user.

use crate::chat::admission::ChatIntake;
use crate::chat::event::{ChatEvent, ConnectionStatus};
use crate::error::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

const LOCAL_USER: &str = "local";

/// Parse one input line. Blank lines yield nothing.
pub fn parse_line(line: &str) -> Option<ChatEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (user, message) = match line.split_once(':') {
        Some((user, message))
            if !user.trim().is_empty()
                && !user.trim().contains(char::is_whitespace)
                && !message.trim().is_empty() =>
        {
            (user.trim(), message.trim())
        }
        _ => (LOCAL_USER, line),
    };
    Some(ChatEvent::new(user.to_lowercase(), message).with_display_name(user))
}

/// Feed lines from `reader` into `intake` until EOF.
pub async fn run_reader<R>(reader: R, intake: &ChatIntake) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    intake.set_status(ConnectionStatus::Connected);
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(event) = parse_line(&line) {
            intake.deliver(event);
        }
    }
    intake.set_status(ConnectionStatus::Disconnected);
    Ok(())
}

/// Feed stdin into `intake` until EOF.
pub async fn run_stdin(intake: ChatIntake) -> Result<()> {
    run_reader(BufReader::new(tokio::io::stdin()), &intake).await
}
