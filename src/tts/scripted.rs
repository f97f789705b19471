//! Deterministic synthesizer for tests and credential-less demos.

use super::{SynthesisOutput, SynthesisRequest, Synthesizer};
use crate::audio::AudioClip;
use crate::error::{AvatarError, Result};
use crate::viseme::VisemeEvent;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// One canned answer.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub result: std::result::Result<SynthesisOutput, String>,
    /// Simulated service latency.
    pub delay: Duration,
}

impl ScriptedResponse {
    pub fn ok(output: SynthesisOutput) -> Self {
        Self {
            result: Ok(output),
            delay: Duration::ZERO,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            result: Err(reason.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug)]
enum Script {
    /// Answer call `n` with response `n`; the last one repeats.
    Responses(Vec<ScriptedResponse>),
    /// Invent a timeline cycling through a fixed mouth-shape pattern, one
    /// event per character.
    Babble { step: Duration },
}

/// Pattern used by [`ScriptedSynthesizer::babble`].
const BABBLE_PATTERN: [u32; 8] = [1, 2, 4, 19, 6, 15, 8, 21];

/// Synthesizer returning scripted results and recording what it was asked.
#[derive(Debug)]
pub struct ScriptedSynthesizer {
    script: Script,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

impl ScriptedSynthesizer {
    /// Always answer with `output`.
    pub fn new(output: SynthesisOutput) -> Self {
        Self::sequence(vec![ScriptedResponse::ok(output)])
    }

    /// Answer successive calls with successive responses.
    pub fn sequence(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            script: Script::Responses(responses),
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    /// Mouth-moving nonsense paced at `step` per character.
    pub fn babble(step: Duration) -> Self {
        Self {
            script: Script::Babble { step },
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    /// Number of `synthesize` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    /// Texts received, in call order.
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

fn babble(text: &str, step: Duration) -> SynthesisOutput {
    let step_ms = step.as_micros() as f64 / 1000.0;
    let visemes: Vec<VisemeEvent> = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .zip(BABBLE_PATTERN.iter().cycle())
        .enumerate()
        .map(|(idx, (_, id))| VisemeEvent::new(idx as f64 * step_ms, *id))
        .collect();
    // Trailing silence so the last shape is visible before completion.
    let events = u32::try_from(visemes.len()).unwrap_or(u32::MAX);
    let duration = step * events.saturating_add(2);
    SynthesisOutput {
        clip: AudioClip::silent(duration),
        visemes,
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn check_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisOutput> {
        let call = self.calls.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(request.text.clone());
        }
        debug!(call, text = %request.text, "scripted synthesis");

        let response = match &self.script {
            Script::Babble { step } => return Ok(babble(&request.text, *step)),
            Script::Responses(responses) => responses
                .get(call)
                .or_else(|| responses.last())
                .cloned()
                .ok_or_else(|| AvatarError::Synthesis("no scripted response".into()))?,
        };

        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }
        response.result.map_err(AvatarError::Synthesis)
    }
}
