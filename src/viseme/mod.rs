//! Timed viseme events for lip-sync animation.
//!
//! A viseme is the visual mouth shape that corresponds to a phoneme. The
//! synthesis service reports one [`VisemeEvent`] per mouth-shape change,
//! stamped with its offset into the synthesized audio. A [`VisemeTimeline`]
//! holds one utterance worth of events and answers "which viseme is active
//! at time `t`".

pub mod mapping;

pub use mapping::{
    ExpressionCategory, MappingPreset, PhonemeClassMapping, ResolvedViseme, SecondaryExpression,
};

use crate::error::{AvatarError, Result};
use serde::{Deserialize, Serialize};

/// Source-clock ticks per millisecond in the observed synthesis protocol
/// (100 ns ticks).
pub const DEFAULT_TICKS_PER_MS: f64 = 10_000.0;

/// A single timestamped phoneme-class event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisemeEvent {
    /// Offset from the start of the audio in milliseconds.
    pub time_offset_ms: f64,
    /// Phoneme class identifier (0–21 in the observed protocol).
    pub phoneme_class_id: u32,
}

impl VisemeEvent {
    pub fn new(time_offset_ms: f64, phoneme_class_id: u32) -> Self {
        Self {
            time_offset_ms,
            phoneme_class_id,
        }
    }

    /// Build an event from a source-clock tick offset.
    pub fn from_ticks(ticks: u64, phoneme_class_id: u32, ticks_per_ms: f64) -> Self {
        Self::new(ticks_to_ms(ticks, ticks_per_ms), phoneme_class_id)
    }
}

/// Convert a source-clock tick count to milliseconds.
pub fn ticks_to_ms(ticks: u64, ticks_per_ms: f64) -> f64 {
    if ticks_per_ms <= 0.0 {
        return 0.0;
    }
    ticks as f64 / ticks_per_ms
}

/// Ordered viseme events for one utterance.
///
/// Offsets are non-decreasing; construction rejects anything else so that
/// lookups can rely on the ordering. Never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisemeTimeline {
    events: Vec<VisemeEvent>,
}

impl VisemeTimeline {
    /// Build a timeline from events in timestamp order.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Synthesis`] if an offset is negative, not finite,
    /// or smaller than its predecessor.
    pub fn new(events: Vec<VisemeEvent>) -> Result<Self> {
        let mut previous = 0.0_f64;
        for (idx, event) in events.iter().enumerate() {
            if !event.time_offset_ms.is_finite() || event.time_offset_ms < 0.0 {
                return Err(AvatarError::Synthesis(format!(
                    "viseme {idx} has invalid offset {}",
                    event.time_offset_ms
                )));
            }
            if event.time_offset_ms < previous {
                return Err(AvatarError::Synthesis(format!(
                    "viseme {idx} at {}ms precedes the previous event at {previous}ms",
                    event.time_offset_ms
                )));
            }
            previous = event.time_offset_ms;
        }
        Ok(Self { events })
    }

    /// An empty timeline (silence pose for the whole utterance).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[VisemeEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Offset of the last event, if any.
    pub fn last_offset_ms(&self) -> Option<f64> {
        self.events.last().map(|e| e.time_offset_ms)
    }

    /// Find the event active at `time_ms`.
    ///
    /// The active event `v` satisfies `v.offset <= time_ms < next.offset`,
    /// with `next.offset = +inf` for the last event. Returns `None` before the
    /// first event or for an empty timeline.
    pub fn active_at(&self, time_ms: f64) -> Option<&VisemeEvent> {
        if !time_ms.is_finite() {
            return None;
        }
        let upper = self
            .events
            .partition_point(|e| e.time_offset_ms <= time_ms);
        upper.checked_sub(1).and_then(|idx| self.events.get(idx))
    }
}
