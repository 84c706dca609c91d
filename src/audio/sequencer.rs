//! Strictly ordered playback of [`AudioItem`]s.
//!
//! Runs on its own thread, fed by a bounded crossbeam channel. Raw PCM is
//! pre-scheduled back-to-back on the output clock; compressed and delegate
//! items start only once everything before them has finished.

use crate::audio::decode::decode_item;
use crate::audio::item::{AudioEncoding, AudioItem};
use crate::audio::output::AudioOutput;
use crate::audio::speech::Speaker;
use crate::pipeline::types::{EventSink, PipelineEvent};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest the worker sleeps in `recv` while clips are scheduled, so start
/// and finish events stay close to the audio.
const MARKER_POLL: Duration = Duration::from_millis(20);

/// Start/finish notifications for a scheduled clip.
struct Marker {
    response_id: Option<String>,
    start: Duration,
    end: Duration,
    started: bool,
}

/// Owns the output and plays items in arrival order.
pub struct AudioSequencer<O: AudioOutput> {
    output: O,
    speaker: Option<Box<dyn Speaker>>,
    events: EventSink,
    active: Arc<AtomicBool>,
    /// End of the last scheduled item on the output clock.
    next_end: Duration,
    markers: VecDeque<Marker>,
}

impl<O: AudioOutput + 'static> AudioSequencer<O> {
    pub fn new(output: O, events: EventSink) -> Self {
        Self {
            output,
            speaker: None,
            events,
            active: Arc::new(AtomicBool::new(false)),
            next_end: Duration::ZERO,
            markers: VecDeque::new(),
        }
    }

    /// Capability for delegate items. Without one they are skipped.
    pub fn with_speaker(mut self, speaker: Box<dyn Speaker>) -> Self {
        self.speaker = Some(speaker);
        self
    }

    /// True while an item is playing or scheduled to play.
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    /// Start the worker. It exits after the channel closes and queued audio has played.
    pub fn spawn(self, rx: Receiver<AudioItem>) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("aura-audio".to_string())
            .spawn(move || self.run(rx))
    }

    /// Worker loop; also callable directly on the current thread.
    pub fn run(mut self, rx: Receiver<AudioItem>) {
        loop {
            self.flush_markers();
            let wait = self.next_marker_wait();
            let received = match wait {
                Some(wait) => rx.recv_timeout(wait),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(item) => self.play(item),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.drain();
        debug!("audio sequencer stopped");
    }

    fn next_marker_wait(&self) -> Option<Duration> {
        let now = self.output.now();
        self.markers.front().map(|m| {
            let due = if m.started { m.end } else { m.start };
            due.saturating_sub(now).min(MARKER_POLL)
        })
    }

    /// Emit start/finish for clips the clock has reached.
    fn flush_markers(&mut self) {
        let now = self.output.now();
        while let Some(marker) = self.markers.front_mut() {
            if !marker.started && now >= marker.start {
                marker.started = true;
                self.events.emit(PipelineEvent::AudioStarted {
                    response_id: marker.response_id.clone(),
                });
            }
            if marker.started && now >= marker.end {
                self.events.emit(PipelineEvent::AudioFinished {
                    response_id: marker.response_id.clone(),
                });
                self.markers.pop_front();
                continue;
            }
            break;
        }
        self.active
            .store(!self.markers.is_empty(), Ordering::SeqCst);
    }

    /// Wait for everything scheduled to finish.
    fn drain(&mut self) {
        self.output.wait_until(self.next_end);
        self.flush_markers();
    }

    fn skip(&self, item: &AudioItem, reason: String) {
        warn!(response = ?item.response_id, "skipping audio item: {reason}");
        self.events.emit(PipelineEvent::AudioSkipped {
            response_id: item.response_id.clone(),
            reason,
        });
    }

    fn play(&mut self, item: AudioItem) {
        self.active.store(true, Ordering::SeqCst);
        match item.encoding {
            AudioEncoding::Pcm { .. } => self.schedule_pcm(item),
            AudioEncoding::Compressed { .. } => self.play_after_previous(item),
            AudioEncoding::Delegate => self.speak_after_previous(item),
        }
        self.flush_markers();
    }

    /// Start at the later of now and the previous item's end.
    fn schedule_pcm(&mut self, item: AudioItem) {
        let clip = match decode_item(&item) {
            Ok(clip) => clip.conform(self.output.sample_rate(), self.output.channels()),
            Err(e) => return self.skip(&item, e.to_string()),
        };
        let start = self.output.now().max(self.next_end);
        match self.output.schedule(clip, start) {
            Ok(end) => {
                debug!(start = ?start, end = ?end, "scheduled PCM clip");
                self.next_end = end;
                self.markers.push_back(Marker {
                    response_id: item.response_id,
                    start,
                    end,
                    started: false,
                });
            }
            Err(e) => self.skip(&item, e.to_string()),
        }
    }

    fn wait_for_previous(&mut self) {
        self.output.wait_until(self.next_end);
        self.flush_markers();
    }

    fn play_after_previous(&mut self, item: AudioItem) {
        let clip = match decode_item(&item) {
            Ok(clip) => clip.conform(self.output.sample_rate(), self.output.channels()),
            Err(e) => return self.skip(&item, e.to_string()),
        };
        self.wait_for_previous();

        let start = self.output.now();
        match self.output.schedule(clip, start) {
            Ok(end) => {
                self.events.emit(PipelineEvent::AudioStarted {
                    response_id: item.response_id.clone(),
                });
                self.output.wait_until(end);
                self.next_end = end;
                self.events.emit(PipelineEvent::AudioFinished {
                    response_id: item.response_id,
                });
            }
            Err(e) => self.skip(&item, e.to_string()),
        }
    }

    fn speak_after_previous(&mut self, item: AudioItem) {
        let Some(text) = item.text.as_deref() else {
            return self.skip(&item, "delegate item without text".to_string());
        };
        if self.speaker.is_none() {
            return self.skip(&item, "no local speech capability".to_string());
        }
        self.wait_for_previous();

        self.events.emit(PipelineEvent::AudioStarted {
            response_id: item.response_id.clone(),
        });
        let spoken = match &self.speaker {
            Some(speaker) => speaker.speak(text, item.voice.as_deref()),
            None => Ok(()),
        };
        match spoken {
            Ok(()) => self.events.emit(PipelineEvent::AudioFinished {
                response_id: item.response_id.clone(),
            }),
            Err(e) => self.skip(&item, e.to_string()),
        }
        self.next_end = self.next_end.max(self.output.now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::VirtualOutput;
    use crate::error::{AuraError, Result};
    use std::sync::Mutex;

    fn pcm(id: &str, ms: u64) -> AudioItem {
        let frames = (ms * 24) as usize;
        AudioItem::pcm(vec![0u8; frames * 2], 24_000, 1).with_response_id(id)
    }

    fn events() -> (EventSink, crossbeam_channel::Receiver<PipelineEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (EventSink::new(tx), rx)
    }

    #[derive(Clone, Default)]
    struct RecordingSpeaker {
        spoken: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Speaker for RecordingSpeaker {
        fn speak(&self, text: &str, _voice: Option<&str>) -> Result<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(AuraError::SpeechFailed {
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn pcm_items_are_back_to_back() {
        let output = VirtualOutput::new(24_000, 1);
        let observer = output.clone();
        let (sink, _rx) = events();
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(pcm("a", 250)).unwrap();
        tx.send(pcm("b", 500)).unwrap();
        tx.send(pcm("c", 250)).unwrap();
        drop(tx);

        AudioSequencer::new(output, sink).run(rx);

        let clips = observer.scheduled();
        assert_eq!(clips.len(), 3);
        assert_eq!(clips[0].start, Duration::ZERO);
        for pair in clips.windows(2) {
            assert!(pair[1].start >= pair[0].end, "overlap: {pair:?}");
            assert_eq!(pair[1].start, pair[0].end, "gap: {pair:?}");
        }
        assert_eq!(clips[2].end, Duration::from_secs(1));
    }

    #[test]
    fn late_item_starts_at_current_clock() {
        let output = VirtualOutput::new(24_000, 1);
        let observer = output.clone();
        let (sink, _rx) = events();
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = AudioSequencer::new(output, sink).spawn(rx).unwrap();

        tx.send(pcm("a", 100)).unwrap();
        // wait for the first clip to be scheduled, then move past its end
        while observer.scheduled().is_empty() {
            std::thread::sleep(Duration::from_millis(1));
        }
        observer.advance(Duration::from_secs(2));
        tx.send(pcm("b", 100)).unwrap();
        drop(tx);
        handle.join().unwrap();

        let clips = observer.scheduled();
        assert_eq!(clips.len(), 2);
        assert!(clips[1].start >= Duration::from_secs(2));
    }

    #[test]
    fn undecodable_item_is_skipped_and_queue_continues() {
        let output = VirtualOutput::new(24_000, 1);
        let observer = output.clone();
        let (sink, events) = events();
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(pcm("a", 100)).unwrap();
        tx.send(AudioItem::compressed(vec![9u8; 16], Some("mp3")).with_response_id("bad"))
            .unwrap();
        tx.send(pcm("c", 100)).unwrap();
        drop(tx);

        AudioSequencer::new(output, sink).run(rx);

        assert_eq!(observer.scheduled().len(), 2);
        let events: Vec<PipelineEvent> = events.try_iter().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::AudioSkipped { response_id: Some(id), .. } if id == "bad"
        )));
        let finished: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::AudioFinished { response_id } => response_id.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec!["a", "c"]);
    }

    #[test]
    fn delegate_waits_for_previous_pcm() {
        let output = VirtualOutput::new(24_000, 1);
        let observer = output.clone();
        let (sink, events) = events();
        let speaker = RecordingSpeaker::default();
        let spoken = Arc::clone(&speaker.spoken);
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(pcm("a", 500)).unwrap();
        tx.send(AudioItem::delegate("hello").with_response_id("b"))
            .unwrap();
        drop(tx);

        AudioSequencer::new(output, sink)
            .with_speaker(Box::new(speaker))
            .run(rx);

        assert_eq!(*spoken.lock().unwrap(), vec!["hello"]);
        assert!(observer.now() >= Duration::from_millis(500));

        let order: Vec<String> = events
            .try_iter()
            .filter_map(|e| match e {
                PipelineEvent::AudioStarted { response_id } => {
                    response_id.map(|id| format!("start {id}"))
                }
                PipelineEvent::AudioFinished { response_id } => {
                    response_id.map(|id| format!("end {id}"))
                }
                _ => None,
            })
            .collect();
        assert_eq!(order, vec!["start a", "end a", "start b", "end b"]);
    }

    #[test]
    fn delegate_failure_is_skipped() {
        let output = VirtualOutput::new(24_000, 1);
        let (sink, events) = events();
        let speaker = RecordingSpeaker {
            fail: true,
            ..Default::default()
        };
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(AudioItem::delegate("hi").with_response_id("x"))
            .unwrap();
        drop(tx);

        AudioSequencer::new(output, sink)
            .with_speaker(Box::new(speaker))
            .run(rx);

        assert!(
            events
                .try_iter()
                .any(|e| matches!(e, PipelineEvent::AudioSkipped { .. }))
        );
    }

    #[test]
    fn delegate_without_speaker_is_skipped() {
        let output = VirtualOutput::new(24_000, 1);
        let (sink, events) = events();
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(AudioItem::delegate("hi")).unwrap();
        drop(tx);

        AudioSequencer::new(output, sink).run(rx);
        assert!(
            events
                .try_iter()
                .any(|e| matches!(e, PipelineEvent::AudioSkipped { .. }))
        );
    }

    #[test]
    fn active_flag_clears_when_idle() {
        let output = VirtualOutput::new(24_000, 1);
        let (sink, _rx) = events();
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(pcm("a", 100)).unwrap();
        drop(tx);

        let sequencer = AudioSequencer::new(output, sink);
        let active = sequencer.active_flag();
        sequencer.run(rx);
        assert!(!active.load(Ordering::SeqCst));
    }
}
