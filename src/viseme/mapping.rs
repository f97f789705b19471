//! Phoneme-class → facial-channel lookup tables.
//!
//! The table is data: each avatar/voice combination can ship its own TOML
//! file, and three built-in presets cover the rigs observed in practice.
//! Unknown phoneme classes always resolve to the silence channel.

use crate::error::{AvatarError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default neutral mouth channel.
pub const SILENCE_CHANNEL: &str = "viseme_sil";

/// Family of secondary (non-mouth) expression channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionCategory {
    /// Eye shape (wide, squint).
    Eye,
    /// Eyebrows (inner up, down).
    Brow,
    /// Cheeks (squint, puff).
    Cheek,
}

impl ExpressionCategory {
    pub const ALL: [ExpressionCategory; 3] = [
        ExpressionCategory::Eye,
        ExpressionCategory::Brow,
        ExpressionCategory::Cheek,
    ];
}

/// A secondary expression driven alongside a mouth shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryExpression {
    pub category: ExpressionCategory,
    /// Channel base name. Paired expressions expand to `{channel}Left` and
    /// `{channel}Right`.
    pub channel: String,
    /// Blend target in `[0, 1]`.
    pub intensity: f32,
    #[serde(default = "default_paired")]
    pub paired: bool,
}

fn default_paired() -> bool {
    true
}

impl SecondaryExpression {
    /// Left/right channel pair.
    pub fn paired(category: ExpressionCategory, channel: &str, intensity: f32) -> Self {
        Self {
            category,
            channel: channel.to_owned(),
            intensity: intensity.clamp(0.0, 1.0),
            paired: true,
        }
    }

    /// A single, unsided channel (e.g. `cheekPuff`).
    pub fn single(category: ExpressionCategory, channel: &str, intensity: f32) -> Self {
        Self {
            paired: false,
            ..Self::paired(category, channel, intensity)
        }
    }

    /// Concrete channel names this expression drives.
    pub fn channel_names(&self) -> Vec<String> {
        if self.paired {
            vec![
                format!("{}Left", self.channel),
                format!("{}Right", self.channel),
            ]
        } else {
            vec![self.channel.clone()]
        }
    }
}

/// Result of resolving a phoneme class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedViseme<'a> {
    /// Mouth-shape channel.
    pub primary: &'a str,
    /// Secondary expressions (empty when none).
    pub secondaries: &'a [SecondaryExpression],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct VisemeEntry {
    channel: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    expressions: Vec<SecondaryExpression>,
}

/// Static lookup from phoneme class id to facial channels.
#[derive(Debug, Clone, PartialEq)]
pub struct PhonemeClassMapping {
    silence: String,
    entries: BTreeMap<u32, VisemeEntry>,
}

/// Built-in mapping tables.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingPreset {
    /// Mouth shapes plus eye, brow and cheek expressions.
    #[default]
    Expressive,
    /// Mouth shapes plus eye and brow expressions.
    EyesAndBrows,
    /// Mouth shapes only, with the older upper-case channel naming.
    Classic,
}

impl PhonemeClassMapping {
    pub fn builder() -> MappingBuilder {
        MappingBuilder::default()
    }

    /// Build one of the built-in tables.
    pub fn preset(preset: MappingPreset) -> Self {
        match preset {
            MappingPreset::Expressive => expressive_table(true),
            MappingPreset::EyesAndBrows => expressive_table(false),
            MappingPreset::Classic => classic_table(),
        }
    }

    /// Resolve a phoneme class. Total: unknown ids map to silence.
    pub fn resolve(&self, phoneme_class_id: u32) -> ResolvedViseme<'_> {
        match self.entries.get(&phoneme_class_id) {
            Some(entry) => ResolvedViseme {
                primary: &entry.channel,
                secondaries: &entry.expressions,
            },
            None => ResolvedViseme {
                primary: &self.silence,
                secondaries: &[],
            },
        }
    }

    pub fn silence_channel(&self) -> &str {
        &self.silence
    }

    /// Phoneme class ids with an explicit entry, ascending.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a mapping table from TOML.
    ///
    /// ```toml
    /// silence = "viseme_sil"
    ///
    /// [[viseme]]
    /// id = 2
    /// channel = "viseme_aa"
    /// expressions = [{ category = "eye", channel = "eyeWide", intensity = 0.6 }]
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Mapping`] on malformed TOML, duplicate ids or
    /// intensities outside `[0, 1]`.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: MappingFile =
            toml::from_str(source).map_err(|e| AvatarError::Mapping(e.to_string()))?;
        file.try_into()
    }

    /// Load a mapping table from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize the table to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Mapping`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        let file = MappingFile::from(self);
        toml::to_string_pretty(&file).map_err(|e| AvatarError::Mapping(e.to_string()))
    }
}

impl Default for PhonemeClassMapping {
    fn default() -> Self {
        Self::preset(MappingPreset::default())
    }
}

/// Incremental constructor for [`PhonemeClassMapping`].
#[derive(Debug, Default)]
pub struct MappingBuilder {
    silence: Option<String>,
    entries: BTreeMap<u32, VisemeEntry>,
}

impl MappingBuilder {
    pub fn silence(mut self, channel: &str) -> Self {
        self.silence = Some(channel.to_owned());
        self
    }

    /// Map a phoneme class to a mouth channel (replaces any previous entry).
    pub fn viseme(mut self, id: u32, channel: &str) -> Self {
        self.entries.insert(
            id,
            VisemeEntry {
                channel: channel.to_owned(),
                expressions: Vec::new(),
            },
        );
        self
    }

    /// Attach a secondary expression to an already mapped phoneme class.
    /// Ignored for unmapped ids.
    pub fn expression(mut self, id: u32, expression: SecondaryExpression) -> Self {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.expressions.push(expression);
        }
        self
    }

    pub fn build(self) -> PhonemeClassMapping {
        PhonemeClassMapping {
            silence: self.silence.unwrap_or_else(|| SILENCE_CHANNEL.to_owned()),
            entries: self.entries,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingFile {
    #[serde(default = "default_silence")]
    silence: String,
    #[serde(default, rename = "viseme")]
    visemes: Vec<MappingFileEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingFileEntry {
    id: u32,
    channel: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    expressions: Vec<SecondaryExpression>,
}

fn default_silence() -> String {
    SILENCE_CHANNEL.to_owned()
}

impl TryFrom<MappingFile> for PhonemeClassMapping {
    type Error = AvatarError;

    fn try_from(file: MappingFile) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for item in file.visemes {
            if let Some(bad) = item
                .expressions
                .iter()
                .find(|e| !(0.0..=1.0).contains(&e.intensity))
            {
                return Err(AvatarError::Mapping(format!(
                    "viseme {} expression {} has intensity {} outside [0, 1]",
                    item.id, bad.channel, bad.intensity
                )));
            }
            let entry = VisemeEntry {
                channel: item.channel,
                expressions: item.expressions,
            };
            if entries.insert(item.id, entry).is_some() {
                return Err(AvatarError::Mapping(format!(
                    "viseme {} is mapped more than once",
                    item.id
                )));
            }
        }
        Ok(Self {
            silence: file.silence,
            entries,
        })
    }
}

impl From<&PhonemeClassMapping> for MappingFile {
    fn from(mapping: &PhonemeClassMapping) -> Self {
        Self {
            silence: mapping.silence.clone(),
            visemes: mapping
                .entries
                .iter()
                .map(|(id, entry)| MappingFileEntry {
                    id: *id,
                    channel: entry.channel.clone(),
                    expressions: entry.expressions.clone(),
                })
                .collect(),
        }
    }
}

/// Mouth shapes shared by the expressive presets (lower-case `aa`, `nn`).
const EXPRESSIVE_VISEMES: [(u32, &str); 22] = [
    (0, "viseme_sil"),
    (1, "viseme_PP"),
    (2, "viseme_aa"),
    (3, "viseme_O"),
    (4, "viseme_E"),
    (5, "viseme_RR"),
    (6, "viseme_I"),
    (7, "viseme_U"),
    (8, "viseme_O"),
    (9, "viseme_O"),
    (10, "viseme_O"),
    (11, "viseme_I"),
    (12, "viseme_sil"),
    (13, "viseme_RR"),
    (14, "viseme_nn"),
    (15, "viseme_SS"),
    (16, "viseme_CH"),
    (17, "viseme_TH"),
    (18, "viseme_FF"),
    (19, "viseme_DD"),
    (20, "viseme_kk"),
    (21, "viseme_CH"),
];

const CLASSIC_VISEMES: [(u32, &str); 22] = [
    (0, "viseme_sil"),
    (1, "viseme_PP"),
    (2, "viseme_AA"),
    (3, "viseme_O"),
    (4, "viseme_E"),
    (5, "viseme_E"),
    (6, "viseme_I"),
    (7, "viseme_U"),
    (8, "viseme_O"),
    (9, "viseme_O"),
    (10, "viseme_O"),
    (11, "viseme_I"),
    (12, "viseme_TH"),
    (13, "viseme_RR"),
    (14, "viseme_l"),
    (15, "viseme_SS"),
    (16, "viseme_CH"),
    (17, "viseme_TH"),
    (18, "viseme_FF"),
    (19, "viseme_DD"),
    (20, "viseme_kk"),
    (21, "viseme_PP"),
];

fn expressive_table(with_cheeks: bool) -> PhonemeClassMapping {
    use ExpressionCategory::{Brow, Cheek, Eye};
    use SecondaryExpression as S;

    let mut builder = EXPRESSIVE_VISEMES
        .iter()
        .fold(PhonemeClassMapping::builder(), |b, (id, ch)| b.viseme(*id, ch));

    // Open vowels widen the eyes and lift the inner brows.
    builder = builder
        .expression(2, S::paired(Eye, "eyeWide", 0.6))
        .expression(2, S::paired(Brow, "browInnerUp", 0.8))
        .expression(3, S::paired(Eye, "eyeWide", 0.4))
        .expression(3, S::paired(Brow, "browInnerUp", 0.5));

    // Hard consonants squint the eyes and lower the brows.
    for (id, eye, brow) in [(15, 0.6, 0.7), (16, 0.7, 0.8), (17, 0.5, 0.6), (20, 0.8, 0.9)] {
        builder = builder
            .expression(id, S::paired(Eye, "eyeSquint", eye))
            .expression(id, S::paired(Brow, "browDown", brow));
    }

    if with_cheeks {
        builder = builder
            .expression(4, S::paired(Cheek, "cheekSquint", 0.8))
            .expression(6, S::paired(Cheek, "cheekSquint", 1.0))
            .expression(1, S::single(Cheek, "cheekPuff", 0.7))
            .expression(18, S::single(Cheek, "cheekPuff", 0.5))
            .expression(15, S::paired(Cheek, "cheekSquint", 0.5))
            .expression(16, S::paired(Cheek, "cheekSquint", 0.6))
            .expression(20, S::paired(Cheek, "cheekSquint", 0.4));
    }

    builder.build()
}

fn classic_table() -> PhonemeClassMapping {
    CLASSIC_VISEMES
        .iter()
        .fold(PhonemeClassMapping::builder(), |b, (id, ch)| b.viseme(*id, ch))
        .build()
}
