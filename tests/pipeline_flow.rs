//! End-to-end behaviour of the response worker: admission, failover order,
//! lockout, cooldown and voice isolation, driven on paused tokio time.

use aura::chat::{Admission, ChatEvent, ChatIntake, SharedQueue};
use aura::config::{Config, LiveSettings, live_settings, update_settings};
use aura::pipeline::{
    EventSink, PipelineConfig, PipelineControls, PipelineEvent, PipelineHandle, ResponsePipeline,
    TextStatus, VoiceStatus,
};
use aura::prompt::Prompt;
use aura::provider::{
    MockSynthesizer, MockTextGenerator, ProviderErrorKind, ProviderRing, TextFailover,
    VoiceDispatch,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        lockout: Duration::from_secs(90),
        poll_interval: Duration::from_millis(100),
        next_check_delay: Duration::from_millis(100),
        history: 10,
    }
}

fn settings(cooldown_secs: u64) -> LiveSettings {
    let mut config = Config::default();
    config.timing.cooldown_secs = cooldown_secs;
    config.text.ring = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    config.text.preferred = "b".to_string();
    live_settings(&config)
}

fn ring(a: MockTextGenerator, b: MockTextGenerator, c: MockTextGenerator) -> TextFailover {
    let ring = ProviderRing::new(["a", "b", "c"]).unwrap();
    TextFailover::new(ring, Duration::from_secs(30))
        .with_generator(Arc::new(a))
        .with_generator(Arc::new(b))
        .with_generator(Arc::new(c))
}

fn healthy_ring() -> TextFailover {
    ring(
        MockTextGenerator::new("a"),
        MockTextGenerator::new("b"),
        MockTextGenerator::new("c"),
    )
}

async fn advance(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

fn drain(rx: &crossbeam_channel::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    rx.try_iter().collect()
}

fn stopped(handle: &PipelineHandle) -> bool {
    !handle.snapshot().in_flight
}

#[tokio::test(start_paused = true)]
async fn failover_walks_the_ring_from_the_preferred_provider() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let queue = SharedQueue::new();
    let handle = ResponsePipeline::new(
        pipeline_config(),
        ring(
            MockTextGenerator::new("a")
                .with_reply("hello chat")
                .with_call_log(Arc::clone(&calls)),
            MockTextGenerator::new("b")
                .with_failure(ProviderErrorKind::Transport)
                .with_call_log(Arc::clone(&calls)),
            MockTextGenerator::new("c")
                .with_failure(ProviderErrorKind::EmptyResult)
                .with_call_log(Arc::clone(&calls)),
        ),
        VoiceDispatch::disabled(),
        queue.clone(),
        settings(0),
    )
    .spawn();

    queue.push(ChatEvent::new("viewer", "hi"));
    advance(1.0).await;

    assert_eq!(*calls.lock().unwrap(), vec!["b", "c", "a"]);
    let record = &handle.snapshot().responses[0];
    assert_eq!(record.text_status, TextStatus::Done);
    assert_eq!(record.text_provider.as_deref(), Some("a"));
    assert_eq!(record.attempted, vec!["b", "c", "a"]);
    assert_eq!(record.reply, "hello chat");
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn throttling_locks_out_and_clears_the_backlog() {
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let queue = SharedQueue::new();
    let other = MockTextGenerator::new("c");
    let other_calls = other.call_counter();
    let handle = ResponsePipeline::new(
        pipeline_config(),
        ring(
            MockTextGenerator::new("a"),
            MockTextGenerator::new("b")
                .with_script(vec![Err(ProviderErrorKind::Throttled)])
                .with_delay(Duration::from_secs(1)),
            other,
        ),
        VoiceDispatch::disabled(),
        queue.clone(),
        settings(0),
    )
    .with_events(EventSink::new(events_tx))
    .spawn();

    queue.push(ChatEvent::new("first", "hi"));
    advance(0.5).await;
    queue.push(ChatEvent::new("second", "waiting"));
    advance(1.5).await;

    let events = drain(&events_rx);
    assert!(events.contains(&PipelineEvent::LockoutStarted { secs: 90 }));
    assert!(events.contains(&PipelineEvent::QueueDropped {
        dropped: 1,
        reason: "lockout".to_string(),
    }));
    assert!(queue.is_empty());
    assert_eq!(other_calls.load(std::sync::atomic::Ordering::SeqCst), 0);

    let snapshot = handle.snapshot();
    assert!(snapshot.cooldown.locked);
    let record = &snapshot.responses[0];
    assert_eq!(record.text_status, TextStatus::Error);
    assert!(record.reply.starts_with("Quota exhausted. Cooling down for 90s"));
    assert_eq!(record.attempted, vec!["b"]);

    // nothing is dequeued during the lockout
    queue.push(ChatEvent::new("third", "still there?"));
    advance(58.0).await;
    assert_eq!(handle.snapshot().responses.len(), 1);
    assert_eq!(queue.len(), 1);

    advance(35.0).await;
    let snapshot = handle.snapshot();
    assert!(!snapshot.cooldown.locked);
    assert_eq!(snapshot.responses.len(), 2);
    assert_eq!(snapshot.responses[0].message, "still there?");
    assert_eq!(snapshot.responses[0].text_status, TextStatus::Done);
    assert!(drain(&events_rx).contains(&PipelineEvent::LockoutCleared));
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn only_the_newest_waiting_message_is_answered() {
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let queue = SharedQueue::new();
    let controls = PipelineControls::new();
    let live = settings(0);
    let intake = ChatIntake::new(
        queue.clone(),
        live.clone(),
        controls.clone(),
        100,
        EventSink::new(events_tx.clone()),
    );
    controls.set_ai_paused(true);
    let handle = ResponsePipeline::new(
        pipeline_config(),
        healthy_ring(),
        VoiceDispatch::disabled(),
        queue.clone(),
        live,
    )
    .with_controls(controls.clone())
    .with_events(EventSink::new(events_tx))
    .spawn();

    assert_eq!(
        intake.deliver(ChatEvent::new("one", "first")),
        Admission::Queued { collapsed: 0 }
    );
    intake.deliver(ChatEvent::new("two", "second"));
    assert_eq!(
        intake.deliver(ChatEvent::new("three", "third")),
        Admission::Queued { collapsed: 1 }
    );
    assert_eq!(intake.recent().len(), 3);

    controls.set_ai_paused(false);
    advance(2.0).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.responses.len(), 1);
    assert_eq!(snapshot.responses[0].message, "third");
    let dropped = drain(&events_rx)
        .into_iter()
        .filter(|e| matches!(e, PipelineEvent::QueueDropped { reason, .. } if reason == "newer message"))
        .count();
    assert_eq!(dropped, 2);
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn paused_feed_drops_chat_before_the_queue() {
    let queue = SharedQueue::new();
    let controls = PipelineControls::new();
    let intake = ChatIntake::new(
        queue.clone(),
        settings(0),
        controls.clone(),
        100,
        EventSink::none(),
    );

    controls.set_feed_paused(true);
    assert_eq!(
        intake.deliver(ChatEvent::new("viewer", "hello?")),
        Admission::FeedPaused
    );
    assert!(queue.is_empty());
    assert!(intake.recent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn voice_failure_keeps_the_text_reply() {
    let (audio_tx, audio_rx) = crossbeam_channel::unbounded();
    let queue = SharedQueue::new();
    let voice = VoiceDispatch::new(
        Arc::new(MockSynthesizer::new("tts").with_failure(ProviderErrorKind::Other)),
        Duration::from_secs(5),
    );
    let handle = ResponsePipeline::new(
        pipeline_config(),
        healthy_ring(),
        voice,
        queue.clone(),
        settings(0),
    )
    .with_audio(audio_tx)
    .spawn();

    queue.push(ChatEvent::new("viewer", "hi"));
    advance(1.0).await;

    let snapshot = handle.snapshot();
    let record = &snapshot.responses[0];
    assert_eq!(record.text_status, TextStatus::Done);
    assert_eq!(record.reply, "reply from b");
    assert_eq!(record.voice_status, Some(VoiceStatus::Error));
    assert_eq!(record.voice_provider.as_deref(), Some("tts"));
    assert!(!snapshot.cooldown.locked);
    assert!(audio_rx.try_recv().is_err());
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn throttled_voice_locks_out_but_keeps_the_text() {
    let queue = SharedQueue::new();
    let voice = VoiceDispatch::new(
        Arc::new(MockSynthesizer::new("tts").with_failure(ProviderErrorKind::Throttled)),
        Duration::from_secs(5),
    );
    let handle = ResponsePipeline::new(
        pipeline_config(),
        healthy_ring(),
        voice,
        queue.clone(),
        settings(0),
    )
    .spawn();

    queue.push(ChatEvent::new("viewer", "hi"));
    advance(1.0).await;

    let snapshot = handle.snapshot();
    assert!(snapshot.cooldown.locked);
    assert_eq!(snapshot.responses[0].text_status, TextStatus::Done);
    assert_eq!(snapshot.responses[0].voice_status, Some(VoiceStatus::Error));
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn cooldown_spaces_out_replies() {
    let queue = SharedQueue::new();
    let handle = ResponsePipeline::new(
        pipeline_config(),
        healthy_ring(),
        VoiceDispatch::disabled(),
        queue.clone(),
        settings(15),
    )
    .spawn();

    queue.push(ChatEvent::new("viewer", "first"));
    advance(1.0).await;
    assert_eq!(handle.snapshot().responses.len(), 1);
    assert!(stopped(&handle));

    queue.push(ChatEvent::new("viewer", "second"));
    advance(9.0).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.responses.len(), 1);
    assert!(snapshot.cooldown.cooldown_remaining_secs > 0);
    assert_eq!(queue.len(), 1);

    advance(6.0).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.responses.len(), 2);
    assert_eq!(snapshot.responses[0].message, "second");
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn at_most_one_reply_is_ever_processing() {
    let queue = SharedQueue::new();
    let slow = || MockTextGenerator::new("b").with_delay(Duration::from_secs(2));
    let handle = ResponsePipeline::new(
        pipeline_config(),
        ring(MockTextGenerator::new("a"), slow(), MockTextGenerator::new("c")),
        VoiceDispatch::disabled(),
        queue.clone(),
        settings(0),
    )
    .spawn();

    let mut busiest = 0;
    for tick in 0..200 {
        if tick % 3 == 0 {
            queue.push(ChatEvent::new(format!("viewer{tick}"), "spam"));
        }
        advance(0.1).await;
        let processing = handle.snapshot().processing_count();
        assert!(processing <= 1, "tick {tick}: {processing} replies processing");
        busiest = busiest.max(processing);
    }

    assert_eq!(busiest, 1);
    assert!(handle.snapshot().responses.len() > 5);
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn snapshot_names_the_provider_being_tried() {
    let queue = SharedQueue::new();
    let handle = ResponsePipeline::new(
        pipeline_config(),
        ring(
            MockTextGenerator::new("a").with_delay(Duration::from_secs(1)),
            MockTextGenerator::new("b")
                .with_failure(ProviderErrorKind::Transport)
                .with_delay(Duration::from_secs(1)),
            MockTextGenerator::new("c")
                .with_failure(ProviderErrorKind::Other)
                .with_delay(Duration::from_secs(1)),
        ),
        VoiceDispatch::disabled(),
        queue.clone(),
        settings(0),
    )
    .spawn();

    queue.push(ChatEvent::new("viewer", "hi"));
    for expected in ["b", "c", "a"] {
        advance(0.5).await;
        let snapshot = handle.snapshot();
        let record = &snapshot.responses[0];
        assert_eq!(record.text_status, TextStatus::Processing);
        assert_eq!(record.text_provider.as_deref(), Some(expected));
        assert!(snapshot.in_flight);
        advance(0.5).await;
    }

    advance(0.5).await;
    let record = &handle.snapshot().responses[0];
    assert_eq!(record.text_status, TextStatus::Done);
    assert_eq!(record.text_provider.as_deref(), Some("a"));
    handle.stop().await;
}

fn prompt_ring(prompts: &Arc<Mutex<Vec<Prompt>>>) -> TextFailover {
    ring(
        MockTextGenerator::new("a"),
        MockTextGenerator::new("b").with_prompt_log(Arc::clone(prompts)),
        MockTextGenerator::new("c"),
    )
}

#[tokio::test(start_paused = true)]
async fn personality_edits_reach_the_next_prompt() {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let queue = SharedQueue::new();
    let live = settings(0);
    let handle = ResponsePipeline::new(
        pipeline_config(),
        prompt_ring(&prompts),
        VoiceDispatch::disabled(),
        queue.clone(),
        live.clone(),
    )
    .spawn();

    queue.push(ChatEvent::new("viewer", "first"));
    advance(1.0).await;
    update_settings(&live, |s| s.personality = "You are a sleepy cat.".to_string());
    queue.push(ChatEvent::new("viewer", "second"));
    advance(1.0).await;

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].system.contains("sleepy cat"));
    assert!(prompts[1].system.contains("sleepy cat"));
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn newcomers_are_greeted_once_and_the_streamer_is_tagged() {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let queue = SharedQueue::new();
    let live = settings(0);
    update_settings(&live, |s| s.channel = "kevzo".to_string());
    let handle = ResponsePipeline::new(
        pipeline_config(),
        prompt_ring(&prompts),
        VoiceDispatch::disabled(),
        queue.clone(),
        live,
    )
    .spawn();

    for (user, display, message) in [
        ("night_owl", "Night_Owl", "hello"),
        ("night_owl", "Night_Owl", "me again"),
        ("kevzo", "Kevzo", "welcome in"),
    ] {
        queue.push(ChatEvent::new(user, message).with_display_name(display));
        advance(1.0).await;
    }

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].user.contains("from Night Owl:"));
    assert!(prompts[0].user.contains("greet them"));
    assert!(!prompts[1].user.contains("greet them"));
    assert!(prompts[2].user.contains("from Kevzo (BOSS):"));
    handle.stop().await;
}
