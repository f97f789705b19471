//! The avatar facade: scene, rig, mixer, speech session and idle feed.
//!
//! One call to [`Avatar::frame`] is one rendered frame: poll the speech
//! session, take the idle snapshot, run the mixer. The control surface
//! (`speak`, `status_text`, `can_speak`) lives here too.

use crate::audio::AudioOutput;
use crate::config::AvatarConfig;
use crate::error::Result;
use crate::idle::{IdleBehavior, IdleState};
use crate::mixer::{FaceMixer, FrameInput};
use crate::rig::FaceRig;
use crate::runtime::{AvatarEvent, event_channel};
use crate::scene::SceneHost;
use crate::speech::{SpeechSession, SpeechState};
use crate::tts::{SynthesisRequest, Synthesizer};
use crate::viseme::PhonemeClassMapping;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::info;

/// Where the per-frame idle snapshot comes from.
#[derive(Debug)]
pub enum IdleFeed {
    /// Advanced by the render loop itself on the frame clock.
    Inline(IdleBehavior),
    /// Published by an [`crate::idle::IdleRunner`] on its own timers.
    Shared(watch::Receiver<IdleState>),
}

impl IdleFeed {
    fn snapshot(&mut self, now: Duration) -> IdleState {
        match self {
            Self::Inline(behavior) => behavior.advance(now),
            Self::Shared(rx) => *rx.borrow(),
        }
    }
}

/// A talking head bound to a scene host.
pub struct Avatar<S: SceneHost> {
    scene: S,
    rig: FaceRig,
    mixer: FaceMixer,
    session: SpeechSession,
    idle: IdleFeed,
    last_viseme: Option<u32>,
    events_tx: broadcast::Sender<AvatarEvent>,
}

impl<S: SceneHost> Avatar<S> {
    /// Bind `scene` using `config` and its configured mapping table.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::AvatarError::Config`] for invalid settings and
    /// a mapping error if the configured table cannot be loaded.
    pub fn new(
        scene: S,
        config: &AvatarConfig,
        synthesizer: Arc<dyn Synthesizer>,
        output: Arc<dyn AudioOutput>,
    ) -> Result<Self> {
        config.validate()?;
        let mapping = config.mapping.load()?;
        Ok(Self::with_mapping(
            scene,
            config,
            &mapping,
            synthesizer,
            output,
        ))
    }

    /// Bind `scene` with an explicit mapping table.
    pub fn with_mapping(
        scene: S,
        config: &AvatarConfig,
        mapping: &PhonemeClassMapping,
        synthesizer: Arc<dyn Synthesizer>,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        let rig = FaceRig::bind(
            &scene,
            &config.rig,
            mapping,
            &config.mixer.secondary_categories,
            &config.idle.blink,
        );
        let (events_tx, _) = event_channel();
        let session = SpeechSession::new(synthesizer, output).with_events(events_tx.clone());
        info!(
            meshes = rig.reports().iter().filter(|r| r.found).count(),
            mapping = mapping.len(),
            "avatar ready"
        );
        Self {
            scene,
            rig,
            mixer: FaceMixer::new(&config.mixer),
            session,
            idle: IdleFeed::Inline(IdleBehavior::new(&config.idle)),
            last_viseme: None,
            events_tx,
        }
    }

    /// Replace the idle feed (seeded behavior, or a shared runner snapshot).
    pub fn with_idle(mut self, idle: IdleFeed) -> Self {
        self.idle = idle;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AvatarEvent> {
        self.events_tx.subscribe()
    }

    /// Speak `text` with the configured voice.
    ///
    /// # Errors
    ///
    /// See [`SpeechSession::speak`]. Errors are returned as values; the
    /// avatar keeps animating.
    pub fn speak(&mut self, text: impl Into<String>) -> Result<u64> {
        self.session.speak(SynthesisRequest::new(text))
    }

    /// Speak a full request (voice override).
    ///
    /// # Errors
    ///
    /// See [`SpeechSession::speak`].
    pub fn speak_request(&mut self, request: SynthesisRequest) -> Result<u64> {
        self.session.speak(request)
    }

    pub fn stop(&mut self) {
        self.session.stop();
    }

    /// Render one frame at `now` on the idle clock, `dt` after the previous one.
    ///
    /// Returns the phoneme class applied this frame, if any.
    pub fn frame(&mut self, now: Duration, dt: Duration) -> Option<u32> {
        self.session.poll();
        let input = FrameInput {
            speech: self.session.speech_frame(),
            idle: self.idle.snapshot(now),
            now,
            dt,
        };
        let applied = self.mixer.apply(&self.rig, &mut self.scene, &input);
        if applied != self.last_viseme {
            self.last_viseme = applied;
            let _ = self.events_tx.send(AvatarEvent::VisemeChanged {
                phoneme_class_id: applied,
            });
        }
        applied
    }

    /// Wait for the pending synthesis (if any) to resolve.
    pub async fn settle(&mut self) -> SpeechState {
        self.session.settle().await
    }

    pub fn state(&self) -> SpeechState {
        self.session.state()
    }

    /// Status line for the control surface.
    pub fn status_text(&self) -> &'static str {
        self.session.state().status_text()
    }

    /// Whether the speak trigger should be enabled (not while synthesizing).
    pub fn can_speak(&self) -> bool {
        self.session.state() != SpeechState::Loading
    }

    /// Hold `channel` at `value` on every lip-sync mesh until cleared.
    pub fn set_manual_pose(&mut self, channel: &str, value: f32) {
        self.mixer.set_manual(channel, value);
    }

    pub fn clear_manual_pose(&mut self) {
        self.mixer.clear_manual();
    }

    pub fn session(&self) -> &SpeechSession {
        &self.session
    }

    pub fn rig(&self) -> &FaceRig {
        &self.rig
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn into_scene(self) -> S {
        self.scene
    }
}
