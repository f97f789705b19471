//! A new speak() replaces whatever is loading or playing.

use crate::helpers::{render_until, scripted_avatar, utterance};
use std::time::Duration;
use talking_head::SpeechState;
use talking_head::tts::ScriptedResponse;

const STEP: Duration = Duration::from_millis(10);

#[tokio::test]
async fn speaking_mid_utterance_switches_to_the_new_timeline() {
    let (mut avatar, output, _) = scripted_avatar(vec![
        ScriptedResponse::ok(utterance(&[(0.0, 1)], 1000)),
        ScriptedResponse::ok(utterance(&[(0.0, 2), (50.0, 3)], 400)),
    ]);
    let clock = output.clock().clone();

    avatar.speak("first").unwrap();
    avatar.settle().await;
    let applied = render_until(&mut avatar, &clock, Duration::from_millis(200), STEP);
    assert!(applied.iter().all(|id| *id == Some(1)));
    assert_eq!(output.live(), 1);

    avatar.speak("second").unwrap();
    assert_eq!(avatar.state(), SpeechState::Loading);
    assert_eq!(output.live(), 0, "superseded playback must be released");

    avatar.settle().await;
    let applied = render_until(&mut avatar, &clock, Duration::from_millis(700), STEP);
    assert!(
        applied.iter().flatten().all(|id| *id == 2 || *id == 3),
        "old timeline leaked: {applied:?}"
    );
    assert!(applied.contains(&Some(3)));
    assert_eq!(avatar.state(), SpeechState::Idle);
    assert_eq!(output.started(), 2);
    assert_eq!(output.live(), 0);
}

#[tokio::test]
async fn late_result_of_a_superseded_request_is_discarded() {
    let (mut avatar, output, synth) = scripted_avatar(vec![
        ScriptedResponse::ok(utterance(&[(0.0, 1)], 1000)).after(Duration::from_millis(60)),
        ScriptedResponse::ok(utterance(&[(0.0, 2)], 1000)),
    ]);
    let clock = output.clock().clone();

    avatar.speak("slow").unwrap();
    while synth.calls() == 0 {
        tokio::task::yield_now().await;
    }
    assert!(!avatar.can_speak());
    avatar.speak("fast").unwrap();
    assert_eq!(avatar.settle().await, SpeechState::Speaking);

    // Give the first request ample time to have finished had it not been aborted.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let applied = render_until(&mut avatar, &clock, Duration::from_millis(300), STEP);
    assert!(applied.iter().all(|id| *id == Some(2)), "{applied:?}");
    assert_eq!(output.started(), 1);
    assert_eq!(synth.texts(), vec!["slow", "fast"]);
}

#[tokio::test]
async fn stop_silences_the_face() {
    let (mut avatar, output, _) =
        scripted_avatar(vec![ScriptedResponse::ok(utterance(&[(0.0, 1)], 1000))]);
    let clock = output.clock().clone();

    avatar.speak("hello").unwrap();
    avatar.settle().await;
    render_until(&mut avatar, &clock, Duration::from_millis(50), STEP);

    avatar.stop();
    assert_eq!(avatar.state(), SpeechState::Idle);
    assert_eq!(output.live(), 0);
    let applied = render_until(&mut avatar, &clock, Duration::from_millis(200), STEP);
    assert!(applied.iter().all(Option::is_none));
}
