//! Speech synthesis with viseme timing.
//!
//! A [`Synthesizer`] turns text into an [`AudioClip`] plus the timestamped
//! viseme events that drive lip-sync. [`AzureSynthesizer`] talks to the Azure
//! Speech websocket service; [`ScriptedSynthesizer`] returns canned results
//! for tests and offline demos.

pub mod azure;
mod scripted;

pub use azure::AzureSynthesizer;
pub use scripted::{ScriptedResponse, ScriptedSynthesizer};

use crate::audio::AudioClip;
use crate::error::Result;
use crate::viseme::VisemeEvent;
use async_trait::async_trait;

/// One text-to-speech request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    /// Voice override; `None` uses the synthesizer's configured voice.
    pub voice: Option<String>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }
}

/// Successful synthesis: audio plus viseme events in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutput {
    pub clip: AudioClip,
    pub visemes: Vec<VisemeEvent>,
}

/// Text-to-speech capability that reports viseme timing.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Synchronous readiness check run before any request is issued.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::AvatarError::Config`] when credentials or other
    /// required settings are missing.
    fn check_ready(&self) -> Result<()>;

    /// Synthesize `request`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::AvatarError::Synthesis`] when the service fails
    /// or returns unusable data.
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisOutput>;
}
