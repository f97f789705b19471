//! Idle behavior: periodic blinks and gaze drift.
//!
//! [`IdleBehavior`] is a pure scheduler: given the current time it fires any
//! due blink/gaze events and returns an [`IdleState`] snapshot. It never
//! touches the scene. The mixer reads the snapshot once per frame and is the
//! only writer of blink influences and eye-bone rotations.
//!
//! The behavior can be advanced inline from the render loop, or run on its
//! own timers by [`IdleRunner`], which publishes snapshots over a
//! `tokio::sync::watch` channel.

mod runner;

pub use runner::IdleRunner;

use crate::config::{BlinkConfig, GazeConfig, IdleConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::trace;

/// Where the eyes should be looking, in radians-equivalent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GazeTarget {
    /// Horizontal (eye-bone yaw).
    pub x: f32,
    /// Vertical (eye-bone pitch).
    pub y: f32,
}

/// Snapshot of the idle generators' output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IdleState {
    /// End of the current blink window, on the idle clock.
    pub blink_active_until: Option<Duration>,
    pub gaze_target: GazeTarget,
}

impl IdleState {
    /// Whether blink channels should be closed at `now`.
    pub fn blink_active(&self, now: Duration) -> bool {
        self.blink_active_until.is_some_and(|until| now < until)
    }
}

/// Blink and gaze schedulers sharing one random source.
#[derive(Debug, Clone)]
pub struct IdleBehavior {
    blink: BlinkConfig,
    gaze: GazeConfig,
    rng: StdRng,
    next_blink: Option<Duration>,
    next_gaze: Option<Duration>,
    state: IdleState,
}

impl IdleBehavior {
    /// Behavior seeded from OS entropy.
    pub fn new(config: &IdleConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic behavior for tests and reproducible demos.
    pub fn with_seed(config: &IdleConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &IdleConfig, rng: StdRng) -> Self {
        let blink = config.blink.clone();
        let gaze = config.gaze.clone();
        // The first blink fires right away; the first gaze shift waits one
        // interval.
        let next_blink = blink.enabled.then_some(Duration::ZERO);
        let next_gaze = gaze
            .enabled
            .then(|| Duration::from_millis(gaze.interval_ms));
        Self {
            blink,
            gaze,
            rng,
            next_blink,
            next_gaze,
            state: IdleState::default(),
        }
    }

    /// Fire every event due at or before `now` and return the new snapshot.
    ///
    /// Time must not go backwards between calls; a stale `now` is a no-op.
    pub fn advance(&mut self, now: Duration) -> IdleState {
        while let Some(at) = self.next_blink.filter(|at| *at <= now) {
            let until = at + Duration::from_millis(self.blink.duration_ms);
            self.state.blink_active_until = Some(until);
            let (lo, hi) = (self.blink.min_interval_ms, self.blink.max_interval_ms);
            let interval = if lo < hi { self.rng.gen_range(lo..hi) } else { lo };
            self.next_blink = Some(at + Duration::from_millis(interval.max(1)));
            trace!(at_ms = at.as_millis() as u64, "blink");
        }

        while let Some(at) = self.next_gaze.filter(|at| *at <= now) {
            self.state.gaze_target = GazeTarget {
                x: sample(&mut self.rng, self.gaze.horizontal_range),
                y: sample(&mut self.rng, self.gaze.vertical_range),
            };
            self.next_gaze = Some(at + Duration::from_millis(self.gaze.interval_ms.max(1)));
            trace!(gaze = ?self.state.gaze_target, "gaze shift");
        }

        self.state
    }

    /// Current snapshot without advancing.
    pub fn state(&self) -> IdleState {
        self.state
    }

    /// Time of the next scheduled event, `None` when both generators are off.
    pub fn next_deadline(&self) -> Option<Duration> {
        match (self.next_blink, self.next_gaze) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

fn sample(rng: &mut StdRng, [lo, hi]: [f32; 2]) -> f32 {
    if lo < hi { rng.gen_range(lo..hi) } else { lo }
}
