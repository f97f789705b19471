//! Synthesized audio clips and the playback boundary.
//!
//! The speech session only needs a playback position and a completion flag,
//! so playback hides behind [`AudioOutput`]/[`PlaybackHandle`]. The simulated
//! backend follows an externally driven clock (tests, headless demo); the cpal
//! backend (feature `cpal-output`) plays to the system speakers.

pub mod decode;
#[cfg(feature = "cpal-output")]
pub mod playback;
pub mod simulated;

pub use decode::{DecodedAudio, decode_clip, estimate_duration};
#[cfg(feature = "cpal-output")]
pub use playback::CpalOutput;
pub use simulated::{SimClock, SimulatedOutput};

use crate::error::Result;
use bytes::Bytes;
use std::time::Duration;

/// Container/codec of an [`AudioClip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    /// Infer the format from a synthesis output-format name such as
    /// `audio-16khz-32kbitrate-mono-mp3` or `riff-24khz-16bit-mono-pcm`.
    pub fn from_output_format(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.contains("mp3") {
            Some(Self::Mp3)
        } else if name.starts_with("riff") || name.contains("wav") {
            Some(Self::Wav)
        } else {
            None
        }
    }

    /// File-extension hint for the decoder probe.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }
}

/// Encoded audio for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub data: Bytes,
    pub format: AudioFormat,
    /// Playback length; completion fires once the position reaches it.
    pub duration: Duration,
}

impl AudioClip {
    pub fn new(data: impl Into<Bytes>, format: AudioFormat, duration: Duration) -> Self {
        Self {
            data: data.into(),
            format,
            duration,
        }
    }

    /// A clip with no audio payload, used where only timing matters.
    pub fn silent(duration: Duration) -> Self {
        Self::new(Bytes::new(), AudioFormat::Wav, duration)
    }
}

/// A running playback.
///
/// Dropping the handle releases its resources, like calling [`Self::stop`].
pub trait PlaybackHandle: Send {
    /// Current playback position, clamped to the clip duration.
    fn position(&self) -> Duration;

    /// Completion notification, polled once per frame.
    fn is_finished(&self) -> bool;

    /// Stop playback and release the underlying resources. Idempotent.
    fn stop(&mut self);
}

/// Something that can play [`AudioClip`]s.
pub trait AudioOutput: Send + Sync {
    /// Start playing `clip` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::AvatarError::Audio`] if playback cannot start.
    fn start(&self, clip: &AudioClip) -> Result<Box<dyn PlaybackHandle>>;
}
