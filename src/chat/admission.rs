//! Admission filter between chat transports and the pending queue.
//!
//! Every delivered event lands in the display log. Only events from
//! non-ignored users while auto-reply is on reach the queue.

use crate::chat::event::{ChatEvent, ConnectionStatus};
use crate::chat::queue::SharedQueue;
use crate::config::{LiveSettings, RuntimeSettings, read_settings};
use crate::pipeline::types::{EventSink, PipelineControls, PipelineEvent};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Outcome of delivering one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Appended to the queue; `collapsed` older events were discarded.
    Queued { collapsed: usize },
    Ignored,
    AutoReplyOff,
    /// Feed paused: dropped before the display log.
    FeedPaused,
}

/// Reply gate applied after the display log. Ignore list and auto-reply are
/// independent; the ignore list is checked first.
pub fn reply_gate(event: &ChatEvent, settings: &RuntimeSettings) -> Option<Admission> {
    if settings.is_ignored(&event.username) {
        Some(Admission::Ignored)
    } else if !settings.auto_reply {
        Some(Admission::AutoReplyOff)
    } else {
        None
    }
}

/// Most-recent-N chat lines, oldest evicted first.
#[derive(Debug, Clone)]
pub struct ChatLog {
    capacity: usize,
    entries: VecDeque<ChatEvent>,
}

impl ChatLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, event: ChatEvent) {
        self.entries.push_back(event);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest to newest.
    pub fn to_vec(&self) -> Vec<ChatEvent> {
        self.entries.iter().cloned().collect()
    }
}

/// Entry point for chat transports.
#[derive(Clone)]
pub struct ChatIntake {
    queue: SharedQueue,
    log: Arc<Mutex<ChatLog>>,
    status: Arc<Mutex<ConnectionStatus>>,
    settings: LiveSettings,
    controls: PipelineControls,
    events: EventSink,
}

impl ChatIntake {
    pub fn new(
        queue: SharedQueue,
        settings: LiveSettings,
        controls: PipelineControls,
        log_size: usize,
        events: EventSink,
    ) -> Self {
        Self {
            queue,
            log: Arc::new(Mutex::new(ChatLog::new(log_size))),
            status: Arc::new(Mutex::new(ConnectionStatus::default())),
            settings,
            controls,
            events,
        }
    }

    fn log(&self) -> MutexGuard<'_, ChatLog> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Deliver one parsed event.
    pub fn deliver(&self, event: ChatEvent) -> Admission {
        if self.controls.feed_paused() {
            debug!(user = %event.username, "feed paused, dropping chat event");
            return Admission::FeedPaused;
        }

        self.log().push(event.clone());

        let settings = read_settings(&self.settings);
        let outcome = match reply_gate(&event, &settings) {
            Some(rejected) => rejected,
            None => Admission::Queued {
                collapsed: self.queue.push(event.clone()),
            },
        };

        debug!(user = %event.username, ?outcome, "chat event admitted");
        if let Admission::Queued { collapsed } = outcome
            && collapsed > 0
        {
            self.events.emit(PipelineEvent::QueueDropped {
                dropped: collapsed,
                reason: "newer message".to_string(),
            });
        }
        self.events.emit(PipelineEvent::Chat {
            queued: matches!(outcome, Admission::Queued { .. }),
            event,
        });
        outcome
    }

    /// Record a transport status transition.
    pub fn set_status(&self, status: ConnectionStatus) {
        let changed = match self.status.lock() {
            Ok(mut current) => std::mem::replace(&mut *current, status) != status,
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), status) != status,
        };
        if changed {
            debug!(%status, "chat connection status");
            self.events.emit(PipelineEvent::Connection { status });
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.status.lock() {
            Ok(status) => *status,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Display log, oldest first.
    pub fn recent(&self) -> Vec<ChatEvent> {
        self.log().to_vec()
    }

    pub fn queue(&self) -> &SharedQueue {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, live_settings, update_settings};

    fn intake(log_size: usize) -> (ChatIntake, SharedQueue, LiveSettings, PipelineControls) {
        let queue = SharedQueue::new();
        let settings = live_settings(&Config::default());
        let controls = PipelineControls::new();
        let intake = ChatIntake::new(
            queue.clone(),
            settings.clone(),
            controls.clone(),
            log_size,
            EventSink::none(),
        );
        (intake, queue, settings, controls)
    }

    #[test]
    fn normal_event_is_queued_and_logged() {
        let (intake, queue, _, _) = intake(100);
        let outcome = intake.deliver(ChatEvent::new("viewer", "hello"));
        assert_eq!(outcome, Admission::Queued { collapsed: 0 });
        assert_eq!(queue.len(), 1);
        assert_eq!(intake.recent().len(), 1);
    }

    #[test]
    fn ignored_user_reaches_log_but_not_queue() {
        let (intake, queue, _, _) = intake(100);
        let outcome = intake.deliver(ChatEvent::new("nightbot", "!commands"));
        assert_eq!(outcome, Admission::Ignored);
        assert!(queue.is_empty());
        assert_eq!(intake.recent().len(), 1);
    }

    #[test]
    fn auto_reply_off_reaches_log_but_not_queue() {
        let (intake, queue, settings, _) = intake(100);
        update_settings(&settings, |s| s.auto_reply = false);

        let outcome = intake.deliver(ChatEvent::new("viewer", "hello"));
        assert_eq!(outcome, Admission::AutoReplyOff);
        assert!(queue.is_empty());
        assert_eq!(intake.recent().len(), 1);
    }

    #[test]
    fn feed_pause_drops_before_log() {
        let (intake, queue, _, controls) = intake(100);
        controls.set_feed_paused(true);

        let outcome = intake.deliver(ChatEvent::new("viewer", "hello"));
        assert_eq!(outcome, Admission::FeedPaused);
        assert!(queue.is_empty());
        assert!(intake.recent().is_empty());
    }

    #[test]
    fn burst_collapses_queue() {
        let (intake, queue, _, _) = intake(100);
        intake.deliver(ChatEvent::new("a", "one"));
        intake.deliver(ChatEvent::new("b", "two"));
        let outcome = intake.deliver(ChatEvent::new("c", "three"));

        assert_eq!(outcome, Admission::Queued { collapsed: 1 });
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().map(|e| e.message), Some("three".to_string()));
        assert_eq!(intake.recent().len(), 3);
    }

    #[test]
    fn display_log_is_bounded() {
        let (intake, _, _, _) = intake(3);
        for i in 0..5 {
            intake.deliver(ChatEvent::new("nightbot", format!("m{i}")));
        }
        let messages: Vec<String> = intake.recent().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn status_change_emits_once() {
        let (tx, rx) = crossbeam_channel::bounded(8);
        let intake = ChatIntake::new(
            SharedQueue::new(),
            live_settings(&Config::default()),
            PipelineControls::new(),
            10,
            EventSink::new(tx),
        );
        intake.set_status(ConnectionStatus::Connecting);
        intake.set_status(ConnectionStatus::Connecting);
        intake.set_status(ConnectionStatus::Connected);

        let events: Vec<PipelineEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(intake.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn reply_gate_checks_ignore_before_auto_reply() {
        let mut settings = RuntimeSettings::from_config(&Config::default());
        settings.auto_reply = false;
        let event = ChatEvent::new("StreamElements", "hi");
        assert_eq!(reply_gate(&event, &settings), Some(Admission::Ignored));
    }
}
