//! Headless [`SceneHost`] backed by plain vectors.
//!
//! Used by the demo binary and by tests. A [`SceneManifest`] (JSON) lists the
//! meshes, their morph targets and the bones; [`SceneManifest::default_avatar`]
//! describes the reference head rig.

use super::{BoneId, BoneRotation, MeshId, SceneHost};
use crate::error::{AvatarError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One mesh entry of a [`SceneManifest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshManifest {
    pub name: String,
    #[serde(default)]
    pub morph_targets: Vec<String>,
}

/// Description of an avatar scene: meshes with morph targets and bones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneManifest {
    #[serde(default)]
    pub meshes: Vec<MeshManifest>,
    #[serde(default)]
    pub bones: Vec<String>,
}

const MOUTH_SHAPES: [&str; 17] = [
    "viseme_sil",
    "viseme_PP",
    "viseme_FF",
    "viseme_TH",
    "viseme_DD",
    "viseme_kk",
    "viseme_CH",
    "viseme_SS",
    "viseme_nn",
    "viseme_RR",
    "viseme_aa",
    "viseme_E",
    "viseme_I",
    "viseme_O",
    "viseme_U",
    "viseme_AA",
    "viseme_l",
];

const FACE_SHAPES: [&str; 12] = [
    "eyeWideLeft",
    "eyeWideRight",
    "eyeSquintLeft",
    "eyeSquintRight",
    "browInnerUpLeft",
    "browInnerUpRight",
    "browDownLeft",
    "browDownRight",
    "cheekSquintLeft",
    "cheekSquintRight",
    "cheekPuff",
    "mouthSmileLeft",
];

const BLINK_SHAPES: [&str; 2] = ["eyeBlinkLeft", "eyeBlinkRight"];

impl SceneManifest {
    /// The reference head rig: head, teeth, tongue, eye ambient occlusion and
    /// eyelashes, plus left/right eye bones.
    pub fn default_avatar() -> Self {
        let owned = |names: &[&str]| names.iter().map(|n| (*n).to_owned()).collect::<Vec<_>>();

        let mut head = owned(&MOUTH_SHAPES);
        head.extend(owned(&FACE_SHAPES[..8]));
        head.extend(owned(&BLINK_SHAPES));

        let mut eye_ao = owned(&FACE_SHAPES);
        eye_ao.extend(owned(&BLINK_SHAPES));

        Self {
            meshes: vec![
                MeshManifest {
                    name: "Head_Mesh001".to_owned(),
                    morph_targets: head,
                },
                MeshManifest {
                    name: "Teeth_Mesh001".to_owned(),
                    morph_targets: owned(&MOUTH_SHAPES),
                },
                MeshManifest {
                    name: "Tongue_Mesh001".to_owned(),
                    morph_targets: owned(&MOUTH_SHAPES[..10]),
                },
                MeshManifest {
                    name: "EyeAO_Mesh001".to_owned(),
                    morph_targets: eye_ao,
                },
                MeshManifest {
                    name: "Eyelash_Mesh001".to_owned(),
                    morph_targets: owned(&BLINK_SHAPES),
                },
            ],
            bones: vec!["LeftEye".to_owned(), "RightEye".to_owned()],
        }
    }

    /// Parse a manifest from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Scene`] on malformed JSON.
    pub fn from_json(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|e| AvatarError::Scene(format!("bad manifest: {e}")))
    }

    /// Load a manifest from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

#[derive(Debug, Clone)]
struct MemoryMesh {
    name: String,
    dictionary: HashMap<String, usize>,
    influences: Vec<f32>,
}

#[derive(Debug, Clone)]
struct MemoryBone {
    name: String,
    rotation: BoneRotation,
}

/// In-memory scene host.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScene {
    meshes: Vec<MemoryMesh>,
    bones: Vec<MemoryBone>,
}

impl InMemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scene from a manifest. Duplicate morph target names keep the
    /// first index.
    pub fn from_manifest(manifest: &SceneManifest) -> Self {
        let mut scene = Self::new();
        for mesh in &manifest.meshes {
            let names: Vec<&str> = mesh.morph_targets.iter().map(String::as_str).collect();
            scene.add_mesh(&mesh.name, &names);
        }
        for bone in &manifest.bones {
            scene.add_bone(bone);
        }
        scene
    }

    /// Add a mesh with the given morph targets, all at zero influence.
    pub fn add_mesh(&mut self, name: &str, morph_targets: &[&str]) -> MeshId {
        let mut dictionary = HashMap::with_capacity(morph_targets.len());
        for (idx, target) in morph_targets.iter().enumerate() {
            dictionary.entry((*target).to_owned()).or_insert(idx);
        }
        self.meshes.push(MemoryMesh {
            name: name.to_owned(),
            dictionary,
            influences: vec![0.0; morph_targets.len()],
        });
        MeshId(self.meshes.len() - 1)
    }

    pub fn add_bone(&mut self, name: &str) -> BoneId {
        self.bones.push(MemoryBone {
            name: name.to_owned(),
            rotation: BoneRotation::default(),
        });
        BoneId(self.bones.len() - 1)
    }

    /// Current influence of `channel` on the named mesh.
    pub fn influence(&self, mesh: &str, channel: &str) -> Option<f32> {
        let mesh = self.meshes.iter().find(|m| m.name == mesh)?;
        let idx = *mesh.dictionary.get(channel)?;
        mesh.influences.get(idx).copied()
    }

    /// Overwrite an influence directly (simulates another writer or a
    /// renderer-side reset).
    pub fn set_influence(&mut self, mesh: &str, channel: &str, value: f32) -> bool {
        let Some(mesh) = self.meshes.iter_mut().find(|m| m.name == mesh) else {
            return false;
        };
        match mesh.dictionary.get(channel).copied() {
            Some(idx) => {
                mesh.influences[idx] = value;
                true
            }
            None => false,
        }
    }

    /// Rotation of the named bone.
    pub fn bone(&self, name: &str) -> Option<BoneRotation> {
        self.bones.iter().find(|b| b.name == name).map(|b| b.rotation)
    }

    /// Mesh names in insertion order.
    pub fn mesh_names(&self) -> Vec<&str> {
        self.meshes.iter().map(|m| m.name.as_str()).collect()
    }

    /// `(channel, influence)` pairs of a mesh sorted by influence index.
    pub fn channels(&self, mesh: &str) -> Vec<(String, f32)> {
        let Some(mesh) = self.meshes.iter().find(|m| m.name == mesh) else {
            return Vec::new();
        };
        let mut pairs: Vec<(usize, &String)> =
            mesh.dictionary.iter().map(|(name, idx)| (*idx, name)).collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(idx, name)| (name.clone(), mesh.influences[idx]))
            .collect()
    }
}

impl SceneHost for InMemoryScene {
    fn find_mesh(&self, name: &str) -> Option<MeshId> {
        self.meshes.iter().position(|m| m.name == name).map(MeshId)
    }

    fn morph_dictionary(&self, mesh: MeshId) -> Vec<(String, usize)> {
        self.meshes
            .get(mesh.0)
            .map(|m| {
                m.dictionary
                    .iter()
                    .map(|(name, idx)| (name.clone(), *idx))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn influences_mut(&mut self, mesh: MeshId) -> Option<&mut [f32]> {
        self.meshes
            .get_mut(mesh.0)
            .map(|m| m.influences.as_mut_slice())
    }

    fn find_bone(&self, name: &str) -> Option<BoneId> {
        self.bones.iter().position(|b| b.name == name).map(BoneId)
    }

    fn bone_rotation(&self, bone: BoneId) -> Option<BoneRotation> {
        self.bones.get(bone.0).map(|b| b.rotation)
    }

    fn set_bone_rotation(&mut self, bone: BoneId, rotation: BoneRotation) {
        if let Some(b) = self.bones.get_mut(bone.0) {
            b.rotation = rotation;
        }
    }
}
