//! Speech session: one utterance at a time, from text to playing audio.
//!
//! ```text
//! Idle ──speak──▶ Loading ──synthesis ok──▶ Speaking ──playback done──▶ Idle
//!                    │                          │
//!                    └──synthesis failed──▶ Idle└──speak──▶ Loading
//! ```
//!
//! Synthesis runs on a spawned tokio task and reports back through a channel
//! tagged with a generation number. Every `speak` bumps the generation, aborts
//! the in-flight task and stops the current playback, so a late result from a
//! superseded request is recognised and dropped in [`SpeechSession::poll`].

use crate::audio::{AudioOutput, PlaybackHandle};
use crate::error::{AvatarError, Result};
use crate::mixer::SpeechFrame;
use crate::runtime::AvatarEvent;
use crate::tts::{SynthesisOutput, SynthesisRequest, Synthesizer};
use crate::viseme::VisemeTimeline;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Speech session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeechState {
    Idle,
    /// Waiting for the synthesizer.
    Loading,
    /// Audio is playing and the timeline drives the mouth.
    Speaking,
}

impl SpeechState {
    /// Status line for the control surface.
    pub fn status_text(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Loading => "Synthesizing...",
            Self::Speaking => "Speaking...",
        }
    }
}

impl std::fmt::Display for SpeechState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.status_text())
    }
}

enum Settled {
    Completion(Option<Completion>),
    TaskEnded(std::result::Result<(), tokio::task::JoinError>),
}

struct Completion {
    generation: u64,
    result: Result<SynthesisOutput>,
}

/// The utterance currently playing.
struct Utterance {
    timeline: VisemeTimeline,
    playback: Box<dyn PlaybackHandle>,
}

/// Owns the active viseme timeline and its playback clock.
pub struct SpeechSession {
    synthesizer: Arc<dyn Synthesizer>,
    output: Arc<dyn AudioOutput>,
    state: SpeechState,
    generation: u64,
    pending: Option<JoinHandle<()>>,
    current: Option<Utterance>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    events_tx: Option<broadcast::Sender<AvatarEvent>>,
    last_error: Option<String>,
}

impl std::fmt::Debug for SpeechSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSession")
            .field("synthesizer", &self.synthesizer.name())
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl SpeechSession {
    pub fn new(synthesizer: Arc<dyn Synthesizer>, output: Arc<dyn AudioOutput>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            synthesizer,
            output,
            state: SpeechState::Idle,
            generation: 0,
            pending: None,
            current: None,
            completions_tx,
            completions_rx,
            events_tx: None,
            last_error: None,
        }
    }

    /// Broadcast state transitions and failures on `tx`.
    pub fn with_events(mut self, tx: broadcast::Sender<AvatarEvent>) -> Self {
        self.events_tx = Some(tx);
        self
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    /// Error text of the most recent failed request, cleared by the next `speak`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Start speaking `request`, superseding whatever is loading or playing.
    ///
    /// Must be called from within a tokio runtime. Returns the generation
    /// number identifying this request.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Config`] when the synthesizer is not ready
    /// (missing credentials), the text is blank or no tokio runtime is
    /// available. No request is
    /// issued and the current utterance, if any, keeps playing.
    pub fn speak(&mut self, request: SynthesisRequest) -> Result<u64> {
        if let Err(e) = self.synthesizer.check_ready() {
            error!(synthesizer = self.synthesizer.name(), "cannot speak: {e}");
            self.fail(e.to_string());
            return Err(e);
        }
        if request.text.trim().is_empty() {
            let err = AvatarError::Config("nothing to speak: text is empty".into());
            self.fail(err.to_string());
            return Err(err);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            let err = AvatarError::Config(format!("speak requires a tokio runtime: {e}"));
            self.fail(err.to_string());
            err
        })?;

        self.cancel_current("superseded");
        self.generation += 1;
        self.last_error = None;
        let generation = self.generation;

        let synthesizer = Arc::clone(&self.synthesizer);
        let tx = self.completions_tx.clone();
        info!(
            generation,
            synthesizer = synthesizer.name(),
            chars = request.text.chars().count(),
            "speech requested"
        );
        self.pending = Some(runtime.spawn(async move {
            let result = synthesizer.synthesize(request).await;
            // The session may be gone; nothing to report then.
            let _ = tx.send(Completion { generation, result });
        }));
        self.transition(SpeechState::Loading);
        Ok(generation)
    }

    /// Stop loading or playing and return to idle.
    pub fn stop(&mut self) {
        if self.state != SpeechState::Idle {
            self.cancel_current("stopped");
            self.generation += 1;
            self.transition(SpeechState::Idle);
        }
    }

    /// Process finished syntheses and playback completion. Call once per frame.
    pub fn poll(&mut self) -> SpeechState {
        // Sampled before draining: a task that has finished has already sent
        // whatever it was going to send.
        let task_ended = self.state == SpeechState::Loading
            && self.pending.as_ref().is_some_and(JoinHandle::is_finished);
        self.drain_completions();
        if task_ended && self.state == SpeechState::Loading {
            self.abandon("synthesis task ended without a result".into());
        }
        self.check_playback();
        self.state
    }

    /// Wait until the current request leaves `Loading`, then poll.
    pub async fn settle(&mut self) -> SpeechState {
        while self.state == SpeechState::Loading {
            let Some(task) = self.pending.as_mut() else {
                break;
            };
            let settled = tokio::select! {
                biased;
                completion = self.completions_rx.recv() => Settled::Completion(completion),
                joined = task => Settled::TaskEnded(joined),
            };
            match settled {
                Settled::Completion(Some(completion)) => self.complete(completion),
                Settled::Completion(None) => break,
                Settled::TaskEnded(joined) => {
                    self.pending = None;
                    self.drain_completions();
                    if self.state == SpeechState::Loading {
                        let reason = match joined {
                            Err(e) if e.is_panic() => "synthesis task panicked",
                            Err(_) => "synthesis task was cancelled",
                            Ok(()) => "synthesis task ended without a result",
                        };
                        self.abandon(reason.into());
                    }
                }
            }
        }
        self.poll()
    }

    /// Playback position of the current utterance in milliseconds.
    pub fn current_time_ms(&self) -> Option<f64> {
        self.current
            .as_ref()
            .map(|u| u.playback.position().as_secs_f64() * 1000.0)
    }

    /// Timeline of the current utterance.
    pub fn timeline(&self) -> Option<&VisemeTimeline> {
        self.current.as_ref().map(|u| &u.timeline)
    }

    /// Mixer input for this frame; `None` unless speaking.
    pub fn speech_frame(&self) -> Option<SpeechFrame<'_>> {
        if self.state != SpeechState::Speaking {
            return None;
        }
        self.current.as_ref().map(|u| SpeechFrame {
            timeline: &u.timeline,
            time_ms: u.playback.position().as_secs_f64() * 1000.0,
        })
    }

    fn complete(&mut self, completion: Completion) {
        if completion.generation != self.generation || self.state != SpeechState::Loading {
            debug!(
                generation = completion.generation,
                current = self.generation,
                "discarding stale synthesis result"
            );
            return;
        }
        self.pending = None;

        let started = completion.result.and_then(|output| {
            let timeline = VisemeTimeline::new(output.visemes)?;
            let playback = self.output.start(&output.clip)?;
            info!(
                generation = completion.generation,
                visemes = timeline.len(),
                duration_ms = output.clip.duration.as_millis() as u64,
                "speaking"
            );
            Ok(Utterance { timeline, playback })
        });

        match started {
            Ok(utterance) => {
                self.current = Some(utterance);
                self.transition(SpeechState::Speaking);
            }
            Err(e) => {
                error!(generation = completion.generation, "speech failed: {e}");
                self.fail(e.to_string());
                self.transition(SpeechState::Idle);
            }
        }
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.complete(completion);
        }
    }

    /// The synthesis task is gone without reporting back.
    fn abandon(&mut self, reason: String) {
        self.pending = None;
        error!(generation = self.generation, "speech failed: {reason}");
        self.fail(reason);
        self.transition(SpeechState::Idle);
    }

    fn check_playback(&mut self) {
        if self.state != SpeechState::Speaking {
            return;
        }
        let finished = self
            .current
            .as_ref()
            .is_none_or(|u| u.playback.is_finished());
        if finished {
            if let Some(mut utterance) = self.current.take() {
                utterance.playback.stop();
            }
            debug!(generation = self.generation, "playback finished");
            self.transition(SpeechState::Idle);
        }
    }

    /// Abort the in-flight request and release the current playback.
    fn cancel_current(&mut self, reason: &str) {
        if let Some(task) = self.pending.take() {
            task.abort();
            debug!(generation = self.generation, reason, "synthesis aborted");
        }
        if let Some(mut utterance) = self.current.take() {
            utterance.playback.stop();
            debug!(generation = self.generation, reason, "playback released");
        }
    }

    fn fail(&mut self, reason: String) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(AvatarEvent::SpeechFailed {
                reason: reason.clone(),
            });
        }
        self.last_error = Some(reason);
    }

    fn transition(&mut self, to: SpeechState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(?from, ?to, "speech state");
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(AvatarEvent::StateChanged { from, to });
        }
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}
