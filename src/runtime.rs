//! Runtime events emitted by the avatar for UI and observability.
//!
//! Events are small and cloneable so the render loop can emit them without
//! blocking; slow observers simply lag on the broadcast channel.

use crate::speech::SpeechState;

/// Capacity of the broadcast channel created by [`event_channel`].
pub const EVENT_CAPACITY: usize = 64;

/// Events that describe what the avatar is doing "right now".
#[derive(Debug, Clone, PartialEq)]
pub enum AvatarEvent {
    /// The speech session moved between states.
    StateChanged { from: SpeechState, to: SpeechState },
    /// A speak request failed (configuration or synthesis). The session is idle.
    SpeechFailed { reason: String },
    /// The viseme applied by the mixer changed (`None` = no active viseme).
    VisemeChanged { phoneme_class_id: Option<u32> },
}

/// Create a sender/receiver pair with the default capacity.
pub fn event_channel() -> (
    tokio::sync::broadcast::Sender<AvatarEvent>,
    tokio::sync::broadcast::Receiver<AvatarEvent>,
) {
    tokio::sync::broadcast::channel(EVENT_CAPACITY)
}
