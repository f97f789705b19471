//! speak() without credentials fails fast and never touches the network.

use crate::helpers::{avatar_with, drain_events, head};
use std::sync::Arc;
use std::time::Duration;
use talking_head::audio::SimulatedOutput;
use talking_head::config::{SPEECH_KEY_ENV, SPEECH_REGION_ENV, SpeechConfig};
use talking_head::tts::AzureSynthesizer;
use talking_head::{AvatarError, AvatarEvent, SpeechState};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn no_request_is_issued_and_the_avatar_stays_idle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("token"))
        .expect(0)
        .mount(&server)
        .await;

    let config = SpeechConfig {
        token_url: Some(format!("{}/sts/v1.0/issueToken", server.uri())),
        ..SpeechConfig::default()
    };
    let synth = Arc::new(AzureSynthesizer::with_credentials(&config, None));
    let output = SimulatedOutput::default();
    let mut avatar = avatar_with(synth, output.clone());
    let mut events = avatar.subscribe();

    let err = avatar.speak("hello").unwrap_err();
    assert!(matches!(err, AvatarError::Config(_)));
    let message = err.to_string();
    assert!(message.contains(SPEECH_KEY_ENV) && message.contains(SPEECH_REGION_ENV));

    assert_eq!(avatar.state(), SpeechState::Idle);
    assert!(avatar.can_speak());
    for i in 0..10u32 {
        assert_eq!(avatar.frame(Duration::from_millis(16) * i, Duration::from_millis(16)), None);
    }
    assert_eq!(head(&avatar, "viseme_sil"), 0.0);
    assert_eq!(output.started(), 0);

    let events = drain_events(&mut events);
    assert!(matches!(events.as_slice(), [AvatarEvent::SpeechFailed { .. }]));
    // Dropping the server verifies the zero-request expectation.
}

#[test]
fn blank_environment_values_count_as_missing() {
    let config = SpeechConfig::default();
    let env = |name: &str| match name {
        SPEECH_KEY_ENV => Some("   ".to_owned()),
        SPEECH_REGION_ENV => Some("westeurope".to_owned()),
        _ => None,
    };
    assert!(config.credentials_with(env).is_none());
}
