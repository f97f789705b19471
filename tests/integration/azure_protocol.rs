//! Azure synthesizer against a local token endpoint and websocket server.

use crate::helpers::silent_wav;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use talking_head::AvatarError;
use talking_head::audio::AudioFormat;
use talking_head::config::{SpeechConfig, SpeechCredentials};
use talking_head::tts::azure::protocol;
use talking_head::tts::{AzureSynthesizer, SynthesisRequest, Synthesizer};
use talking_head::viseme::VisemeEvent;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/sts/v1.0/issueToken";

/// What the fake service saw from the client.
#[derive(Debug, Default)]
struct Observed {
    authorization: Option<String>,
    query: Option<String>,
    paths: Vec<String>,
    ssml: String,
}

/// How the fake service ends the turn.
#[derive(Clone, Copy)]
enum Ending {
    TurnEnd,
    CloseEarly,
}

fn credentials() -> Option<SpeechCredentials> {
    Some(SpeechCredentials {
        key: "secret-key".into(),
        region: "local".into(),
    })
}

async fn token_server(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("Ocp-Apim-Subscription-Key", "secret-key"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn text_frame(path: &str, body: &str) -> Message {
    Message::Text(format!(
        "X-RequestId:TEST\r\nContent-Type:application/json\r\nPath:{path}\r\n\r\n{body}"
    ))
}

/// Accept one connection, read the three client messages, then answer with
/// `audio` and two visemes.
async fn speech_server(
    audio: Vec<u8>,
    ending: Ending,
) -> (String, JoinHandle<Observed>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/cognitiveservices/websocket/v1", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut observed = Observed::default();
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            observed.authorization = req
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            observed.query = req.uri().query().map(str::to_owned);
            Ok::<_, ErrorResponse>(resp)
        })
        .await
        .unwrap();

        while observed.paths.len() < 3 {
            let Some(Ok(Message::Text(text))) = ws.next().await else {
                panic!("client hung up before sending its request");
            };
            let (headers, body) = text.split_once("\r\n\r\n").unwrap();
            let path = headers
                .lines()
                .find_map(|l| l.strip_prefix("Path:"))
                .unwrap()
                .to_owned();
            if path == protocol::PATH_SSML {
                observed.ssml = body.to_owned();
            }
            observed.paths.push(path);
        }

        ws.send(text_frame(protocol::PATH_TURN_START, "{}")).await.unwrap();
        ws.send(text_frame(
            protocol::PATH_METADATA,
            r#"{"Metadata":[{"Type":"Viseme","Data":{"Offset":0,"VisemeId":1}},{"Type":"Viseme","Data":{"Offset":3000000,"VisemeId":2}}]}"#,
        ))
        .await
        .unwrap();
        let (first, second) = audio.split_at(audio.len() / 2);
        for chunk in [first, second] {
            ws.send(Message::Binary(protocol::binary_message(
                protocol::PATH_AUDIO,
                "TEST",
                chunk,
            )))
            .await
            .unwrap();
        }

        match ending {
            Ending::TurnEnd => {
                ws.send(text_frame(protocol::PATH_TURN_END, "{}")).await.unwrap();
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_close() {
                        break;
                    }
                }
            }
            Ending::CloseEarly => {
                let _ = ws.close(None).await;
            }
        }
        observed
    });
    (url, handle)
}

fn config(token_server: &MockServer, websocket_url: String) -> SpeechConfig {
    SpeechConfig {
        token_url: Some(format!("{}{TOKEN_PATH}", token_server.uri())),
        websocket_url: Some(websocket_url),
        output_format: "riff-16khz-16bit-mono-pcm".into(),
        request_timeout_secs: 5,
        ..SpeechConfig::default()
    }
}

#[tokio::test]
async fn synthesizes_audio_and_visemes() {
    let tokens = token_server(200, "tok123").await;
    let wav = silent_wav(16_000, 8_000);
    let (url, server) = speech_server(wav.to_vec(), Ending::TurnEnd).await;
    let synth = AzureSynthesizer::with_credentials(&config(&tokens, url), credentials());

    let output = synth
        .synthesize(SynthesisRequest::new("Ciao & benvenuti").with_voice("it-IT-IsabellaNeural"))
        .await
        .unwrap();

    assert_eq!(
        output.visemes,
        vec![VisemeEvent::new(0.0, 1), VisemeEvent::new(300.0, 2)]
    );
    assert_eq!(output.clip.format, AudioFormat::Wav);
    assert_eq!(output.clip.data, wav);
    assert_eq!(output.clip.duration, Duration::from_millis(500));

    let observed = server.await.unwrap();
    assert_eq!(observed.authorization.as_deref(), Some("Bearer tok123"));
    assert!(observed.query.unwrap().starts_with("X-ConnectionId="));
    assert_eq!(
        observed.paths,
        vec![
            protocol::PATH_SPEECH_CONFIG,
            protocol::PATH_SYNTHESIS_CONTEXT,
            protocol::PATH_SSML
        ]
    );
    assert!(observed.ssml.contains("Ciao &amp; benvenuti"));
    assert!(observed.ssml.contains("it-IT-IsabellaNeural"));
}

#[tokio::test]
async fn close_before_turn_end_is_a_failure() {
    let tokens = token_server(200, "tok123").await;
    let (url, server) = speech_server(silent_wav(16_000, 1_600).to_vec(), Ending::CloseEarly).await;
    let synth = AzureSynthesizer::with_credentials(&config(&tokens, url), credentials());

    let err = synth
        .synthesize(SynthesisRequest::new("ciao"))
        .await
        .unwrap_err();
    assert!(matches!(err, AvatarError::Synthesis(_)), "{err}");
    assert!(err.to_string().contains("turn.end"));
    server.await.unwrap();
}

#[tokio::test]
async fn rejected_key_is_a_failure() {
    let tokens = token_server(401, "bad key").await;
    // Nothing listens here; the client must not get that far.
    let synth = AzureSynthesizer::with_credentials(
        &config(&tokens, "ws://127.0.0.1:9/unused".into()),
        credentials(),
    );

    let err = synth
        .synthesize(SynthesisRequest::new("ciao"))
        .await
        .unwrap_err();
    assert!(matches!(err, AvatarError::Synthesis(_)));
    assert!(err.to_string().contains("401"));
}
