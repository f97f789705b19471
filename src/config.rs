//! Configuration types for the avatar animation core.

use crate::error::{AvatarError, Result};
use crate::viseme::{ExpressionCategory, MappingPreset, PhonemeClassMapping};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the synthesis subscription key.
pub const SPEECH_KEY_ENV: &str = "AZURE_SPEECH_KEY";
/// Environment variable holding the synthesis service region.
pub const SPEECH_REGION_ENV: &str = "AZURE_SPEECH_REGION";

/// Top-level configuration for one avatar instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Speech synthesis service settings.
    pub speech: SpeechConfig,
    /// Per-frame blending settings.
    pub mixer: MixerConfig,
    /// Blink and gaze generators.
    pub idle: IdleConfig,
    /// Which scene meshes and bones the mixer drives.
    pub rig: RigConfig,
    /// Phoneme-class mapping table selection.
    pub mapping: MappingConfig,
}

/// Speech synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Service region, e.g. `westeurope`. Falls back to `AZURE_SPEECH_REGION`.
    pub region: Option<String>,
    /// Subscription key. Falls back to `AZURE_SPEECH_KEY`.
    pub subscription_key: Option<String>,
    /// Neural voice name.
    pub voice: String,
    /// SSML `xml:lang` value.
    pub language: String,
    /// Requested audio output format.
    pub output_format: String,
    /// Source-clock ticks per millisecond for viseme offsets.
    pub ticks_per_ms: f64,
    /// Override for the token endpoint (defaults to the regional endpoint).
    pub token_url: Option<String>,
    /// Override for the synthesis websocket endpoint.
    pub websocket_url: Option<String>,
    /// Upper bound on one synthesis round trip.
    pub request_timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            region: None,
            subscription_key: None,
            voice: "it-IT-BenignoNeural".to_owned(),
            language: "it-IT".to_owned(),
            output_format: "audio-16khz-32kbitrate-mono-mp3".to_owned(),
            ticks_per_ms: crate::viseme::DEFAULT_TICKS_PER_MS,
            token_url: None,
            websocket_url: None,
            request_timeout_secs: 30,
        }
    }
}

/// Resolved synthesis credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct SpeechCredentials {
    pub key: String,
    pub region: String,
}

impl std::fmt::Debug for SpeechCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechCredentials")
            .field("key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

impl SpeechConfig {
    /// Credentials from the config file, falling back to the process
    /// environment. `None` when either part is missing or blank.
    pub fn credentials(&self) -> Option<SpeechCredentials> {
        self.credentials_with(|name| std::env::var(name).ok())
    }

    /// Like [`Self::credentials`] with an explicit environment lookup.
    pub fn credentials_with<F>(&self, env: F) -> Option<SpeechCredentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |configured: &Option<String>, var: &str| {
            configured
                .clone()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| env(var).filter(|v| !v.trim().is_empty()))
        };
        Some(SpeechCredentials {
            key: pick(&self.subscription_key, SPEECH_KEY_ENV)?,
            region: pick(&self.region, SPEECH_REGION_ENV)?,
        })
    }
}

/// How the smoothing factor relates to elapsed time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMode {
    /// Fixed fraction per rendered frame, regardless of frame time.
    #[default]
    PerFrame,
    /// Fraction scaled by elapsed time so convergence speed does not depend
    /// on the frame rate. `smoothing` is the fraction at `reference_fps`.
    TimeConstant,
}

/// Facial animation mixer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Interpolation fraction toward the target each frame.
    pub smoothing: f32,
    /// Interpolation fraction for eye-bone rotation toward the gaze target.
    pub gaze_smoothing: f32,
    pub smoothing_mode: SmoothingMode,
    /// Frame rate at which `smoothing` is defined in time-constant mode.
    pub reference_fps: f32,
    /// Secondary expression families the mixer applies.
    pub secondary_categories: Vec<ExpressionCategory>,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.5,
            gaze_smoothing: 0.05,
            smoothing_mode: SmoothingMode::PerFrame,
            reference_fps: 60.0,
            secondary_categories: ExpressionCategory::ALL.to_vec(),
        }
    }
}

/// Idle behavior generators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    pub blink: BlinkConfig,
    pub gaze: GazeConfig,
}

/// Blink generator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    pub enabled: bool,
    /// Lower bound (inclusive) of the randomized interval between blinks.
    pub min_interval_ms: u64,
    /// Upper bound (exclusive).
    pub max_interval_ms: u64,
    /// How long the eyes stay closed.
    pub duration_ms: u64,
    pub left_channel: String,
    pub right_channel: String,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_ms: 2000,
            max_interval_ms: 6000,
            duration_ms: 150,
            left_channel: "eyeBlinkLeft".to_owned(),
            right_channel: "eyeBlinkRight".to_owned(),
        }
    }
}

impl BlinkConfig {
    /// Both blink channel names.
    pub fn channels(&self) -> [&str; 2] {
        [&self.left_channel, &self.right_channel]
    }
}

/// Gaze generator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    pub enabled: bool,
    /// Fixed interval between new gaze targets.
    pub interval_ms: u64,
    /// `[min, max)` of the horizontal target (eye-bone yaw, radians).
    pub horizontal_range: [f32; 2],
    /// `[min, max)` of the vertical target (eye-bone pitch, radians).
    pub vertical_range: [f32; 2],
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 3000,
            horizontal_range: [-0.1, 0.4],
            vertical_range: [-0.05, 0.05],
        }
    }
}

/// One scene mesh the mixer drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshBinding {
    /// Mesh node name in the scene host.
    pub name: String,
    /// Receives mouth shapes (and manual pose overrides).
    #[serde(default)]
    pub lip_sync: bool,
    /// Receives blink pulses.
    #[serde(default)]
    pub blink: bool,
    /// Secondary expression families applied on this mesh.
    #[serde(default)]
    pub expressions: Vec<ExpressionCategory>,
}

impl MeshBinding {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            lip_sync: false,
            blink: false,
            expressions: Vec::new(),
        }
    }

    pub fn lip_sync(mut self) -> Self {
        self.lip_sync = true;
        self
    }

    pub fn blink(mut self) -> Self {
        self.blink = true;
        self
    }

    pub fn expressions(mut self, categories: &[ExpressionCategory]) -> Self {
        self.expressions = categories.to_vec();
        self
    }

    /// Whether the decay pass relaxes this mesh's channels toward neutral.
    /// True for every mesh the mixer writes speech-driven values to.
    pub fn decays(&self) -> bool {
        self.lip_sync || !self.expressions.is_empty()
    }
}

/// Scene binding: meshes and eye bones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub meshes: Vec<MeshBinding>,
    pub eye_bones: Vec<String>,
}

impl Default for RigConfig {
    fn default() -> Self {
        use ExpressionCategory::{Brow, Cheek, Eye};
        Self {
            meshes: vec![
                MeshBinding::new("Head_Mesh001")
                    .lip_sync()
                    .blink()
                    .expressions(&[Eye, Brow]),
                MeshBinding::new("Teeth_Mesh001").lip_sync(),
                MeshBinding::new("Tongue_Mesh001").lip_sync(),
                MeshBinding::new("EyeAO_Mesh001")
                    .blink()
                    .expressions(&[Eye, Brow, Cheek]),
                MeshBinding::new("Eyelash_Mesh001").blink(),
            ],
            eye_bones: vec!["LeftEye".to_owned(), "RightEye".to_owned()],
        }
    }
}

/// Mapping table selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Built-in table used when `path` is unset.
    pub preset: MappingPreset,
    /// TOML mapping table overriding the preset.
    pub path: Option<PathBuf>,
}

impl MappingConfig {
    /// Load the configured table.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is set and cannot be read or parsed.
    pub fn load(&self) -> Result<PhonemeClassMapping> {
        match &self.path {
            Some(path) => PhonemeClassMapping::from_file(path),
            None => Ok(PhonemeClassMapping::preset(self.preset)),
        }
    }
}

impl AvatarConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| AvatarError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AvatarError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("talking-head")
            .join("config.toml")
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| {
            if v > 0.0 && v <= 1.0 {
                Ok(())
            } else {
                Err(AvatarError::Config(format!(
                    "{name} must be in (0, 1], got {v}"
                )))
            }
        };
        unit("mixer.smoothing", self.mixer.smoothing)?;
        unit("mixer.gaze_smoothing", self.mixer.gaze_smoothing)?;
        if !(self.mixer.reference_fps > 0.0) {
            return Err(AvatarError::Config(
                "mixer.reference_fps must be positive".into(),
            ));
        }

        let blink = &self.idle.blink;
        if blink.min_interval_ms >= blink.max_interval_ms {
            return Err(AvatarError::Config(format!(
                "idle.blink interval [{}, {}) is empty",
                blink.min_interval_ms, blink.max_interval_ms
            )));
        }
        if blink.duration_ms == 0 {
            return Err(AvatarError::Config(
                "idle.blink.duration_ms must be positive".into(),
            ));
        }

        let gaze = &self.idle.gaze;
        if gaze.interval_ms == 0 {
            return Err(AvatarError::Config(
                "idle.gaze.interval_ms must be positive".into(),
            ));
        }
        for (name, [lo, hi]) in [
            ("horizontal_range", gaze.horizontal_range),
            ("vertical_range", gaze.vertical_range),
        ] {
            if !(lo < hi) {
                return Err(AvatarError::Config(format!(
                    "idle.gaze.{name} [{lo}, {hi}) is empty"
                )));
            }
        }

        if !(self.speech.ticks_per_ms > 0.0) {
            return Err(AvatarError::Config(
                "speech.ticks_per_ms must be positive".into(),
            ));
        }
        if self.speech.request_timeout_secs == 0 {
            return Err(AvatarError::Config(
                "speech.request_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
