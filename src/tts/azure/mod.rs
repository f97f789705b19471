//! Azure Speech text-to-speech with viseme events.
//!
//! One synthesis is one websocket turn: exchange the subscription key for a
//! token, connect, send `speech.config`, `synthesis.context` and `ssml`, then
//! collect audio chunks and viseme metadata until `turn.end`.

pub mod protocol;
pub mod token;

use super::{SynthesisOutput, SynthesisRequest, Synthesizer};
use crate::audio::{AudioClip, AudioFormat, estimate_duration};
use crate::config::{SpeechConfig, SpeechCredentials};
use crate::error::{AvatarError, Result};
use crate::viseme::VisemeEvent;
use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use protocol::ServerMessage;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info, warn};

/// Synthesizer backed by the Azure Speech websocket service.
pub struct AzureSynthesizer {
    config: SpeechConfig,
    credentials: Option<SpeechCredentials>,
    client: reqwest::Client,
}

impl std::fmt::Debug for AzureSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureSynthesizer")
            .field("voice", &self.config.voice)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl AzureSynthesizer {
    /// Credentials come from the config, falling back to the environment.
    pub fn new(config: &SpeechConfig) -> Self {
        Self::with_credentials(config, config.credentials())
    }

    /// Use explicit credentials (or none) instead of the environment.
    pub fn with_credentials(config: &SpeechConfig, credentials: Option<SpeechCredentials>) -> Self {
        Self {
            config: config.clone(),
            credentials,
            client: reqwest::Client::new(),
        }
    }

    fn credentials(&self) -> Result<&SpeechCredentials> {
        self.credentials.as_ref().ok_or_else(|| {
            AvatarError::Config(format!(
                "speech credentials missing: set speech.subscription_key/speech.region or {}/{}",
                crate::config::SPEECH_KEY_ENV,
                crate::config::SPEECH_REGION_ENV
            ))
        })
    }

    fn token_url(&self, region: &str) -> String {
        self.config
            .token_url
            .clone()
            .unwrap_or_else(|| token::default_token_url(region))
    }

    fn websocket_url(&self, region: &str, connection_id: &str) -> Result<url::Url> {
        let base = self.config.websocket_url.clone().unwrap_or_else(|| {
            format!("wss://{region}.tts.speech.microsoft.com/cognitiveservices/websocket/v1")
        });
        let mut url = url::Url::parse(&base)
            .map_err(|e| AvatarError::Config(format!("invalid websocket url {base}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("X-ConnectionId", connection_id);
        Ok(url)
    }

    async fn run(&self, request: SynthesisRequest) -> Result<SynthesisOutput> {
        let credentials = self.credentials()?;
        let format = AudioFormat::from_output_format(&self.config.output_format).ok_or_else(|| {
            AvatarError::Config(format!(
                "unsupported output format {}",
                self.config.output_format
            ))
        })?;

        let token = token::issue_token(
            &self.client,
            &self.token_url(&credentials.region),
            &credentials.key,
        )
        .await?;

        let connection_id = protocol::new_id();
        let url = self.websocket_url(&credentials.region, &connection_id)?;
        let mut ws_request = url
            .as_str()
            .into_client_request()
            .map_err(|e| AvatarError::Synthesis(format!("bad websocket request: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| AvatarError::Synthesis(format!("bad token header: {e}")))?;
        ws_request.headers_mut().insert("Authorization", bearer);

        let (stream, _) = tokio_tungstenite::connect_async(ws_request)
            .await
            .map_err(|e| AvatarError::Synthesis(format!("websocket connect failed: {e}")))?;
        let (mut write, mut read) = stream.split();
        debug!(connection = %connection_id, "synthesis websocket connected");

        let request_id = protocol::new_id();
        let voice = request.voice.as_deref().unwrap_or(&self.config.voice);
        let outgoing = [
            (
                protocol::PATH_SPEECH_CONFIG,
                "application/json",
                protocol::speech_config_body(),
            ),
            (
                protocol::PATH_SYNTHESIS_CONTEXT,
                "application/json",
                protocol::synthesis_context_body(&self.config.output_format),
            ),
            (
                protocol::PATH_SSML,
                "application/ssml+xml",
                protocol::ssml(&request.text, voice, &self.config.language),
            ),
        ];
        for (path, content_type, body) in outgoing {
            let message = protocol::text_message(
                path,
                &request_id,
                content_type,
                &protocol::timestamp(),
                &body,
            );
            write
                .send(Message::Text(message))
                .await
                .map_err(|e| AvatarError::Synthesis(format!("websocket send failed: {e}")))?;
        }

        let mut audio = BytesMut::new();
        let mut visemes = Vec::new();
        loop {
            let frame = match read.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    return Err(AvatarError::Synthesis(format!("websocket error: {e}")));
                }
                None => {
                    return Err(AvatarError::Synthesis(
                        "connection closed before turn.end".into(),
                    ));
                }
            };
            let message = match frame {
                Message::Text(text) => protocol::parse_text(&text)?,
                Message::Binary(data) => protocol::parse_binary(&data)?,
                Message::Close(reason) => {
                    return Err(AvatarError::Synthesis(format!(
                        "connection closed before turn.end: {reason:?}"
                    )));
                }
                _ => continue,
            };
            match message {
                ServerMessage::Audio(chunk) => audio.extend_from_slice(&chunk),
                ServerMessage::Visemes(entries) => {
                    visemes.extend(entries.into_iter().map(|(ticks, id)| {
                        VisemeEvent::from_ticks(ticks, id, self.config.ticks_per_ms)
                    }));
                }
                ServerMessage::TurnEnd => break,
                ServerMessage::TurnStart | ServerMessage::Other(_) => {}
            }
        }

        if let Err(e) = write.send(Message::Close(None)).await {
            warn!("websocket close failed: {e}");
        }

        let data = audio.freeze();
        if data.is_empty() {
            return Err(AvatarError::Synthesis("service returned no audio".into()));
        }
        let duration = estimate_duration(&data, format, &self.config.output_format);
        info!(
            bytes = data.len(),
            visemes = visemes.len(),
            duration_ms = duration.as_millis() as u64,
            "synthesis complete"
        );
        Ok(SynthesisOutput {
            clip: AudioClip::new(data, format, duration),
            visemes,
        })
    }
}

#[async_trait]
impl Synthesizer for AzureSynthesizer {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn check_ready(&self) -> Result<()> {
        self.credentials().map(|_| ())
    }

    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisOutput> {
        let limit = Duration::from_secs(self.config.request_timeout_secs);
        tokio::time::timeout(limit, self.run(request))
            .await
            .map_err(|_| {
                AvatarError::Synthesis(format!(
                    "synthesis timed out after {}s",
                    limit.as_secs()
                ))
            })?
    }
}
