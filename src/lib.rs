//! Talking head: viseme-driven facial animation for a 3D avatar.
//!
//! Text goes to a speech synthesizer that returns audio plus timestamped
//! visemes; every rendered frame the mixer maps the active viseme onto the
//! head's morph targets, blended with idle blinking and gaze drift.
//!
//! # Architecture
//!
//! - **Mapping**: phoneme class id → mouth-shape channel plus optional
//!   secondary expression ([`viseme::PhonemeClassMapping`])
//! - **Rig**: channel names resolved once into typed slots ([`rig::FaceRig`])
//! - **Speech session**: `Idle → Loading → Speaking → Idle`, owning the
//!   timeline and playback clock ([`speech::SpeechSession`])
//! - **Idle behavior**: blink and gaze schedulers ([`idle::IdleBehavior`])
//! - **Mixer**: the per-frame decay/apply/overlay pass ([`mixer::FaceMixer`])
//! - **Avatar**: the facade tying them to a scene host ([`avatar::Avatar`])

pub mod audio;
pub mod avatar;
pub mod config;
pub mod error;
pub mod idle;
pub mod mixer;
pub mod rig;
pub mod runtime;
pub mod scene;
pub mod speech;
pub mod tts;
pub mod viseme;

pub use avatar::{Avatar, IdleFeed};
pub use config::AvatarConfig;
pub use error::{AvatarError, Result};
pub use mixer::FaceMixer;
pub use rig::FaceRig;
pub use runtime::AvatarEvent;
pub use scene::SceneHost;
pub use speech::{SpeechSession, SpeechState};
pub use viseme::{PhonemeClassMapping, VisemeEvent, VisemeTimeline};
