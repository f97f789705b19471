//! Blink and gaze layered over speech on the full avatar.

use crate::helpers::{HEAD, default_scene, head, render_until, utterance};
use std::sync::Arc;
use std::time::Duration;
use talking_head::audio::{SimClock, SimulatedOutput};
use talking_head::config::AvatarConfig;
use talking_head::idle::{IdleBehavior, IdleRunner};
use talking_head::tts::ScriptedSynthesizer;
use talking_head::{Avatar, IdleFeed};
use tokio_util::sync::CancellationToken;

const STEP: Duration = Duration::from_millis(10);

#[tokio::test]
async fn blink_is_exactly_on_or_off_while_speaking() {
    let config = AvatarConfig::default();
    let output = SimulatedOutput::new(SimClock::new());
    let clock = output.clock().clone();
    let mut avatar = Avatar::new(
        default_scene(),
        &config,
        Arc::new(ScriptedSynthesizer::babble(Duration::from_millis(80))),
        Arc::new(output.clone()),
    )
    .unwrap()
    .with_idle(IdleFeed::Inline(IdleBehavior::with_seed(&config.idle, 42)));
    // Same seed, advanced in lockstep, tells us when the blink window is open.
    let mut reference = IdleBehavior::with_seed(&config.idle, 42);

    avatar
        .speak("una frase abbastanza lunga da durare qualche secondo")
        .unwrap();
    avatar.settle().await;

    let mut blink_frames = 0;
    let mut now = Duration::ZERO;
    while now <= Duration::from_secs(8) {
        clock.set(now);
        avatar.frame(now, STEP);
        let expected = if reference.advance(now).blink_active(now) {
            1.0
        } else {
            0.0
        };
        for channel in ["eyeBlinkLeft", "eyeBlinkRight"] {
            assert_eq!(head(&avatar, channel), expected, "{channel} at {now:?}");
            assert_eq!(
                avatar.scene().influence("Eyelash_Mesh001", channel),
                Some(expected)
            );
        }
        if expected == 1.0 {
            blink_frames += 1;
        }

        let gaze = avatar.scene().bone("LeftEye").unwrap();
        assert!((-0.1..=0.4).contains(&gaze.y), "yaw {} out of range", gaze.y);
        assert!((-0.05..=0.05).contains(&gaze.x), "pitch {} out of range", gaze.x);
        now += STEP;
    }
    // At least two blinks (first at t=0, next within 6 s), 15 frames each.
    assert!(blink_frames >= 30, "only {blink_frames} blink frames");
}

#[tokio::test]
async fn speech_channels_stay_in_unit_range_under_idle_overlay() {
    let config = AvatarConfig::default();
    let output = SimulatedOutput::new(SimClock::new());
    let clock = output.clock().clone();
    let mut avatar = Avatar::new(
        default_scene(),
        &config,
        Arc::new(ScriptedSynthesizer::new(utterance(
            &[(0.0, 19), (40.0, 2), (90.0, 6), (130.0, 15), (200.0, 21)],
            400,
        ))),
        Arc::new(output),
    )
    .unwrap()
    .with_idle(IdleFeed::Inline(IdleBehavior::with_seed(&config.idle, 3)));

    avatar.speak("ciao").unwrap();
    avatar.settle().await;
    render_until(&mut avatar, &clock, Duration::from_millis(600), STEP);

    for mesh in avatar.scene().mesh_names() {
        for (name, value) in avatar.scene().channels(mesh) {
            assert!((0.0..=1.0).contains(&value), "{mesh}/{name} = {value}");
        }
    }
    assert!(avatar.scene().channels(HEAD).iter().all(|(_, v)| v.is_finite()));
}

#[tokio::test]
async fn runner_publishes_snapshots_on_its_own_timers() {
    let mut config = AvatarConfig::default();
    config.idle.blink.min_interval_ms = 20;
    config.idle.blink.max_interval_ms = 40;
    config.idle.blink.duration_ms = 10;
    config.idle.gaze.interval_ms = 30;

    let epoch = tokio::time::Instant::now();
    let cancel = CancellationToken::new();
    let (runner, mut rx) = IdleRunner::new(
        IdleBehavior::with_seed(&config.idle, 9),
        epoch,
        cancel.child_token(),
    );
    let task = tokio::spawn(runner.run());

    let mut updates = 0;
    while updates < 4 {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("runner should publish within its intervals")
            .unwrap();
        updates += 1;
    }

    let mut avatar = Avatar::new(
        default_scene(),
        &config,
        Arc::new(ScriptedSynthesizer::babble(Duration::from_millis(50))),
        Arc::new(SimulatedOutput::default()),
    )
    .unwrap()
    .with_idle(IdleFeed::Shared(rx.clone()));
    let target = rx.borrow().gaze_target;
    for _ in 0..5 {
        avatar.frame(epoch.elapsed(), STEP);
    }
    let eye = avatar.scene().bone("RightEye").unwrap();
    if target.x != 0.0 {
        assert_ne!(eye.y, 0.0);
    }

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("runner stops on cancel")
        .unwrap();
}
