//! Clock-driven playback without an audio device.

use super::{AudioClip, AudioOutput, PlaybackHandle};
use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Shared, manually advanced clock (microsecond resolution).
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    micros: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::Acquire))
    }

    pub fn set(&self, now: Duration) {
        self.micros
            .store(duration_micros(now), Ordering::Release);
    }

    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(duration_micros(by), Ordering::AcqRel);
    }
}

fn duration_micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Output whose playbacks progress with a [`SimClock`].
///
/// Counts started and still-held playbacks so callers can check that
/// superseded audio was released.
#[derive(Debug, Clone, Default)]
pub struct SimulatedOutput {
    clock: SimClock,
    started: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl SimulatedOutput {
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            ..Self::default()
        }
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Number of playbacks started so far.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::Acquire)
    }

    /// Number of playbacks not yet stopped or dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl AudioOutput for SimulatedOutput {
    fn start(&self, clip: &AudioClip) -> Result<Box<dyn PlaybackHandle>> {
        self.started.fetch_add(1, Ordering::AcqRel);
        self.live.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(SimulatedPlayback {
            clock: self.clock.clone(),
            started_at: self.clock.now(),
            duration: clip.duration,
            stopped_at: None,
            live: Arc::clone(&self.live),
        }))
    }
}

struct SimulatedPlayback {
    clock: SimClock,
    started_at: Duration,
    duration: Duration,
    stopped_at: Option<Duration>,
    live: Arc<AtomicUsize>,
}

impl PlaybackHandle for SimulatedPlayback {
    fn position(&self) -> Duration {
        let end = self.stopped_at.unwrap_or_else(|| self.clock.now());
        end.saturating_sub(self.started_at).min(self.duration)
    }

    fn is_finished(&self) -> bool {
        self.stopped_at.is_some() || self.position() >= self.duration
    }

    fn stop(&mut self) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(self.clock.now());
            self.live.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for SimulatedPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
