//! Shared helpers for integration tests.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use talking_head::audio::{AudioClip, SimClock, SimulatedOutput};
use talking_head::config::AvatarConfig;
use talking_head::scene::{InMemoryScene, SceneManifest};
use talking_head::tts::{ScriptedResponse, ScriptedSynthesizer, SynthesisOutput, Synthesizer};
use talking_head::{Avatar, AvatarEvent, VisemeEvent};
use tokio::sync::broadcast;

pub(crate) const HEAD: &str = "Head_Mesh001";
pub(crate) const TEETH: &str = "Teeth_Mesh001";

/// Default config with blink and gaze switched off, so only speech moves
/// the face.
pub(crate) fn quiet_config() -> AvatarConfig {
    let mut config = AvatarConfig::default();
    config.idle.blink.enabled = false;
    config.idle.gaze.enabled = false;
    config
}

pub(crate) fn default_scene() -> InMemoryScene {
    InMemoryScene::from_manifest(&SceneManifest::default_avatar())
}

/// Synthesis result with a silent clip of `duration_ms` and `(offset, id)` events.
pub(crate) fn utterance(events: &[(f64, u32)], duration_ms: u64) -> SynthesisOutput {
    SynthesisOutput {
        clip: AudioClip::silent(Duration::from_millis(duration_ms)),
        visemes: events
            .iter()
            .map(|&(t, id)| VisemeEvent::new(t, id))
            .collect(),
    }
}

/// Avatar over the default scene, playing on a simulated clock.
pub(crate) fn scripted_avatar(
    responses: Vec<ScriptedResponse>,
) -> (Avatar<InMemoryScene>, SimulatedOutput, Arc<ScriptedSynthesizer>) {
    let synth = Arc::new(ScriptedSynthesizer::sequence(responses));
    let output = SimulatedOutput::new(SimClock::new());
    let avatar = avatar_with(synth.clone(), output.clone());
    (avatar, output, synth)
}

pub(crate) fn avatar_with(
    synthesizer: Arc<dyn Synthesizer>,
    output: SimulatedOutput,
) -> Avatar<InMemoryScene> {
    Avatar::new(default_scene(), &quiet_config(), synthesizer, Arc::new(output))
        .expect("default config is valid")
}

/// Render frames every `step` from the clock's current time up to and
/// including `until`, keeping the playback clock and frame clock in step.
/// Returns the phoneme classes applied, one entry per frame.
pub(crate) fn render_until(
    avatar: &mut Avatar<InMemoryScene>,
    clock: &SimClock,
    until: Duration,
    step: Duration,
) -> Vec<Option<u32>> {
    let mut applied = Vec::new();
    let mut now = clock.now();
    while now <= until {
        clock.set(now);
        applied.push(avatar.frame(now, step));
        now += step;
    }
    applied
}

pub(crate) fn head(avatar: &Avatar<InMemoryScene>, channel: &str) -> f32 {
    avatar
        .scene()
        .influence(HEAD, channel)
        .unwrap_or_else(|| panic!("{HEAD} has no channel {channel}"))
}

/// Drain all pending events from the broadcast receiver into a Vec.
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<AvatarEvent>) -> Vec<AvatarEvent> {
    let mut events = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        events.push(evt);
    }
    events
}

/// 16-bit mono PCM WAV of `frames` silent samples.
pub(crate) fn silent_wav(sample_rate: u32, frames: usize) -> Bytes {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        for _ in 0..frames {
            writer.write_sample(0i16).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }
    Bytes::from(cursor.into_inner())
}
