//! Per-frame facial animation mixer.
//!
//! Every rendered frame the mixer runs one fixed sequence over the bound
//! [`FaceRig`]:
//!
//! 1. relax every non-blink channel on decaying meshes toward 0,
//! 2. look up the viseme active at the current playback time,
//! 3. pull its mouth-shape channels toward 1,
//! 4. pull its secondary expression channels toward their intensities,
//! 5. write manual pose overrides,
//! 6. write blink channels directly from the idle snapshot,
//! 7. rotate the eye bones toward the gaze target.
//!
//! The mixer is the only writer of influences and eye-bone rotations. It
//! never suspends and never fails: absent channels were dropped at bind time.

use crate::config::{MixerConfig, SmoothingMode};
use crate::idle::IdleState;
use crate::rig::{ChannelSlot, FaceRig};
use crate::scene::SceneHost;
use crate::viseme::VisemeTimeline;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

/// Speech input for one frame.
#[derive(Debug, Clone, Copy)]
pub struct SpeechFrame<'a> {
    pub timeline: &'a VisemeTimeline,
    /// Current playback position in milliseconds.
    pub time_ms: f64,
}

/// Everything the mixer reads for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    /// `Some` only while the speech session is speaking.
    pub speech: Option<SpeechFrame<'a>>,
    /// Idle snapshot taken once for this frame.
    pub idle: IdleState,
    /// Frame time on the idle clock.
    pub now: Duration,
    /// Time since the previous frame (used in time-constant mode).
    pub dt: Duration,
}

/// Linear interpolation from `from` toward `to` by fraction `t`.
pub fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

/// The per-frame blending algorithm plus its manual pose overrides.
///
/// Decay runs before the pull, so a channel held by one viseme converges to
/// `1 / (2 - α)` of its target rather than to the target itself: about 2/3
/// with the default α = 0.5, and exactly the target only at α = 1.
#[derive(Debug, Clone)]
pub struct FaceMixer {
    smoothing: f32,
    gaze_smoothing: f32,
    mode: SmoothingMode,
    reference_fps: f32,
    manual: BTreeMap<String, f32>,
}

impl Default for FaceMixer {
    fn default() -> Self {
        Self::new(&MixerConfig::default())
    }
}

impl FaceMixer {
    pub fn new(config: &MixerConfig) -> Self {
        Self {
            smoothing: config.smoothing.clamp(0.0, 1.0),
            gaze_smoothing: config.gaze_smoothing.clamp(0.0, 1.0),
            mode: config.smoothing_mode,
            reference_fps: config.reference_fps,
            manual: BTreeMap::new(),
        }
    }

    /// Effective interpolation fraction for a frame of length `dt`.
    pub fn alpha(&self, dt: Duration) -> f32 {
        self.effective(self.smoothing, dt)
    }

    /// Effective gaze interpolation fraction for a frame of length `dt`.
    pub fn gaze_alpha(&self, dt: Duration) -> f32 {
        self.effective(self.gaze_smoothing, dt)
    }

    fn effective(&self, fraction: f32, dt: Duration) -> f32 {
        match self.mode {
            SmoothingMode::PerFrame => fraction,
            SmoothingMode::TimeConstant => {
                let frames = dt.as_secs_f32() * self.reference_fps;
                (1.0 - (1.0 - fraction).powf(frames)).clamp(0.0, 1.0)
            }
        }
    }

    /// Hold a lip-sync channel at `value` until cleared.
    pub fn set_manual(&mut self, channel: &str, value: f32) {
        self.manual
            .insert(channel.to_owned(), value.clamp(0.0, 1.0));
    }

    /// Release one manual override; the channel decays from its last value.
    pub fn remove_manual(&mut self, channel: &str) -> Option<f32> {
        self.manual.remove(channel)
    }

    pub fn clear_manual(&mut self) {
        self.manual.clear();
    }

    pub fn manual_pose(&self) -> &BTreeMap<String, f32> {
        &self.manual
    }

    /// Run one frame. Returns the phoneme class applied this frame, if any.
    pub fn apply<S: SceneHost + ?Sized>(
        &self,
        rig: &FaceRig,
        scene: &mut S,
        input: &FrameInput<'_>,
    ) -> Option<u32> {
        let alpha = self.alpha(input.dt);

        for &slot in rig.decay_slots() {
            update(scene, slot, |v| lerp(v, 0.0, alpha));
        }

        let active = input
            .speech
            .and_then(|speech| speech.timeline.active_at(speech.time_ms))
            .map(|event| event.phoneme_class_id);

        if let Some(id) = active {
            let bound = rig.viseme(id);
            for &slot in &bound.primary {
                update(scene, slot, |v| lerp(v, 1.0, alpha));
            }
            for &(slot, intensity) in &bound.secondary {
                update(scene, slot, |v| lerp(v, intensity, alpha));
            }
        }

        for (channel, &value) in &self.manual {
            for &slot in rig.lip_sync_slots(channel) {
                update(scene, slot, |_| value);
            }
        }

        let blink = if input.idle.blink_active(input.now) {
            1.0
        } else {
            0.0
        };
        for &slot in rig.blink_slots() {
            update(scene, slot, |_| blink);
        }

        let gaze_alpha = self.gaze_alpha(input.dt);
        let target = input.idle.gaze_target;
        for &bone in rig.eye_bones() {
            if let Some(mut rotation) = scene.bone_rotation(bone) {
                rotation.y = lerp(rotation.y, target.x, gaze_alpha);
                rotation.x = lerp(rotation.x, target.y, gaze_alpha);
                scene.set_bone_rotation(bone, rotation);
            }
        }

        trace!(viseme = ?active, blink, "mixer frame");
        active
    }
}

fn update<S, F>(scene: &mut S, slot: ChannelSlot, f: F)
where
    S: SceneHost + ?Sized,
    F: FnOnce(f32) -> f32,
{
    if let Some(value) = scene
        .influences_mut(slot.mesh)
        .and_then(|influences| influences.get_mut(slot.index))
    {
        *value = f(*value).clamp(0.0, 1.0);
    }
}
