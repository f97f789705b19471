//! Full speak → animate → idle scenario on the default rig.

use crate::helpers::{
    HEAD, TEETH, avatar_with, drain_events, head, render_until, scripted_avatar, utterance,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use talking_head::Result;
use talking_head::audio::SimulatedOutput;
use talking_head::tts::{ScriptedResponse, SynthesisOutput, SynthesisRequest, Synthesizer};
use talking_head::{AvatarEvent, SpeechState};

const STEP: Duration = Duration::from_millis(10);

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

#[tokio::test]
async fn hello_drives_the_mouth_then_relaxes() {
    let (mut avatar, output, synth) = scripted_avatar(vec![ScriptedResponse::ok(utterance(
        &[(0.0, 1), (300.0, 2)],
        600,
    ))]);
    let mut events = avatar.subscribe();
    let clock = output.clock().clone();

    avatar.speak("hello").unwrap();
    assert_eq!(avatar.status_text(), "Synthesizing...");
    assert_eq!(avatar.settle().await, SpeechState::Speaking);

    render_until(&mut avatar, &clock, ms(150), STEP);
    assert!(head(&avatar, "viseme_PP") > 0.6, "PP should be near its peak");
    assert!(head(&avatar, "viseme_aa") < 0.05);

    render_until(&mut avatar, &clock, ms(450), STEP);
    assert!(head(&avatar, "viseme_aa") > 0.6, "aa should be near its peak");
    assert!(head(&avatar, "viseme_PP") < 0.05);
    assert!(avatar.scene().influence(TEETH, "viseme_aa").unwrap() > 0.6);

    render_until(&mut avatar, &clock, ms(650), STEP);
    assert_eq!(avatar.state(), SpeechState::Idle);
    assert_eq!(avatar.status_text(), "Idle");
    for (name, value) in avatar.scene().channels(HEAD) {
        if name.starts_with("viseme_") {
            assert!(value < 0.02, "{name} still at {value}");
        }
    }

    assert_eq!(synth.texts(), vec!["hello"]);
    assert_eq!(output.live(), 0);

    let visemes: Vec<Option<u32>> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            AvatarEvent::VisemeChanged { phoneme_class_id } => Some(phoneme_class_id),
            _ => None,
        })
        .collect();
    assert_eq!(visemes, vec![Some(1), Some(2), None]);
}

#[tokio::test]
async fn lookup_switches_exactly_at_event_boundaries() {
    let (mut avatar, output, _) = scripted_avatar(vec![ScriptedResponse::ok(utterance(
        &[(0.0, 1), (100.0, 2), (200.0, 3)],
        1000,
    ))]);
    let clock = output.clock().clone();
    avatar.speak("abc").unwrap();
    avatar.settle().await;

    for (t, expected) in [(0, 1), (99, 1), (100, 2), (199, 2), (200, 3), (250, 3), (900, 3)] {
        clock.set(ms(t));
        assert_eq!(avatar.frame(ms(t), STEP), Some(expected), "at {t} ms");
    }
}

#[tokio::test]
async fn empty_timeline_speaks_with_a_silent_face() {
    let (mut avatar, output, _) =
        scripted_avatar(vec![ScriptedResponse::ok(utterance(&[], 200))]);
    let clock = output.clock().clone();
    avatar.speak("...").unwrap();
    assert_eq!(avatar.settle().await, SpeechState::Speaking);

    let applied = render_until(&mut avatar, &clock, ms(100), STEP);
    assert!(applied.iter().all(Option::is_none));
    assert_eq!(avatar.state(), SpeechState::Speaking);

    render_until(&mut avatar, &clock, ms(210), STEP);
    assert_eq!(avatar.state(), SpeechState::Idle);
}

#[tokio::test]
async fn synthesis_failure_applies_nothing() {
    let (mut avatar, output, _) =
        scripted_avatar(vec![ScriptedResponse::failure("voice not found")]);
    let mut events = avatar.subscribe();
    let clock = output.clock().clone();

    avatar.speak("hello").unwrap();
    assert_eq!(avatar.settle().await, SpeechState::Idle);
    let applied = render_until(&mut avatar, &clock, ms(100), STEP);
    assert!(applied.iter().all(Option::is_none));
    assert_eq!(output.started(), 0);

    let failures: Vec<String> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            AvatarEvent::SpeechFailed { reason } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("voice not found"));
}

#[tokio::test]
async fn speaking_again_after_completion_works() {
    let (mut avatar, output, synth) = scripted_avatar(vec![ScriptedResponse::ok(utterance(
        &[(0.0, 2)],
        100,
    ))]);
    let clock = output.clock().clone();

    for round in 0..2u64 {
        avatar.speak(format!("round {round}")).unwrap();
        assert_eq!(avatar.settle().await, SpeechState::Speaking);
        let end = clock.now() + ms(120);
        render_until(&mut avatar, &clock, end, STEP);
        assert_eq!(avatar.state(), SpeechState::Idle);
    }
    assert_eq!(synth.calls(), 2);
    assert_eq!(output.started(), 2);
}

/// A backend with a bug: every request panics inside the synthesis task.
struct PanickingSynthesizer;

#[async_trait]
impl Synthesizer for PanickingSynthesizer {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn check_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn synthesize(&self, _request: SynthesisRequest) -> Result<SynthesisOutput> {
        panic!("backend bug");
    }
}

#[tokio::test]
async fn panicking_synthesizer_returns_the_avatar_to_idle() {
    let output = SimulatedOutput::default();
    let mut avatar = avatar_with(Arc::new(PanickingSynthesizer), output.clone());
    let mut events = avatar.subscribe();

    avatar.speak("hi").unwrap();
    assert!(!avatar.can_speak());

    // Frames alone must notice the dead task; no settle().
    let mut now = Duration::ZERO;
    for _ in 0..200 {
        tokio::time::sleep(ms(5)).await;
        avatar.frame(now, STEP);
        if avatar.state() == SpeechState::Idle {
            break;
        }
        now += STEP;
    }
    assert_eq!(avatar.state(), SpeechState::Idle);
    assert!(avatar.can_speak());
    assert_eq!(avatar.status_text(), "Idle");
    assert_eq!(output.started(), 0);
    assert_eq!(head(&avatar, "viseme_sil"), 0.0);

    let failures = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, AvatarEvent::SpeechFailed { .. }))
        .count();
    assert_eq!(failures, 1);

    // settle() on a second crashing request returns instead of hanging.
    avatar.speak("again").unwrap();
    let state = tokio::time::timeout(Duration::from_secs(2), avatar.settle())
        .await
        .expect("settle returns once the task is gone");
    assert_eq!(state, SpeechState::Idle);
    assert!(avatar.session().last_error().unwrap().contains("panicked"));
}
