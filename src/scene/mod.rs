//! Scene host abstraction.
//!
//! The renderer owns the meshes and bones; the animation core only needs
//! named morph-channel dictionaries, mutable influence arrays and eye-bone
//! rotations. Names are resolved once into [`MeshId`]/[`BoneId`] handles by
//! [`crate::rig::FaceRig::bind`]; per-frame access goes through the handles.

pub mod memory;

pub use memory::{InMemoryScene, MeshManifest, SceneManifest};

/// Opaque handle to a mesh exposed by a [`SceneHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub usize);

/// Opaque handle to a bone exposed by a [`SceneHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoneId(pub usize);

/// Euler rotation in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoneRotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// The rendering engine as seen by the animation core.
pub trait SceneHost {
    /// Look up a mesh by node name.
    fn find_mesh(&self, name: &str) -> Option<MeshId>;

    /// The mesh's morph dictionary as `(channel name, influence index)` pairs.
    /// Empty for unknown handles or meshes without morph targets.
    fn morph_dictionary(&self, mesh: MeshId) -> Vec<(String, usize)>;

    /// Mutable influence array of a mesh, indexed by the dictionary.
    fn influences_mut(&mut self, mesh: MeshId) -> Option<&mut [f32]>;

    /// Look up a bone by name.
    fn find_bone(&self, name: &str) -> Option<BoneId>;

    fn bone_rotation(&self, bone: BoneId) -> Option<BoneRotation>;

    fn set_bone_rotation(&mut self, bone: BoneId, rotation: BoneRotation);
}
