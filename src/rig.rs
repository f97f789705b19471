//! Typed channel handles resolved once from scene names.
//!
//! [`FaceRig::bind`] walks the configured meshes, looks up every channel the
//! mapping table, blink generator and eye-bone gaze can touch, and stores the
//! hits as [`ChannelSlot`]s. The mixer then works purely on slots; names that a
//! mesh does not expose are simply absent from the rig.

use crate::config::{BlinkConfig, RigConfig};
use crate::scene::{BoneId, MeshId, SceneHost};
use crate::viseme::{ExpressionCategory, PhonemeClassMapping, ResolvedViseme};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// One morph channel on one mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelSlot {
    pub mesh: MeshId,
    pub index: usize,
}

/// Slots driven by one phoneme class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundViseme {
    /// Mouth-shape slots, driven toward 1.
    pub primary: Vec<ChannelSlot>,
    /// Secondary expression slots with their blend targets.
    pub secondary: Vec<(ChannelSlot, f32)>,
}

/// Per-mesh binding summary for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshReport {
    pub name: String,
    /// Whether the scene exposes the mesh at all.
    pub found: bool,
    /// Size of the mesh's morph dictionary.
    pub channels: usize,
    /// Channels relaxed by the decay pass.
    pub decayed: usize,
    /// Blink channels found on the mesh.
    pub blink: usize,
}

/// Resolved handle set for one avatar in one scene.
#[derive(Debug, Clone, Default)]
pub struct FaceRig {
    decay: Vec<ChannelSlot>,
    visemes: BTreeMap<u32, BoundViseme>,
    silence: BoundViseme,
    blink: Vec<ChannelSlot>,
    eye_bones: Vec<BoneId>,
    lip_sync: HashMap<String, Vec<ChannelSlot>>,
    reports: Vec<MeshReport>,
}

struct BoundMesh<'a> {
    id: MeshId,
    lip_sync: bool,
    blink: bool,
    expressions: &'a [ExpressionCategory],
    dictionary: HashMap<String, usize>,
}

impl BoundMesh<'_> {
    fn slot(&self, channel: &str) -> Option<ChannelSlot> {
        self.dictionary.get(channel).map(|&index| ChannelSlot {
            mesh: self.id,
            index,
        })
    }
}

impl FaceRig {
    /// Resolve every channel the mixer may drive.
    ///
    /// Missing meshes and bones are logged and skipped; missing channels are
    /// skipped silently (summarised once at `debug`).
    pub fn bind<S: SceneHost + ?Sized>(
        scene: &S,
        rig: &RigConfig,
        mapping: &PhonemeClassMapping,
        secondary_categories: &[ExpressionCategory],
        blink: &BlinkConfig,
    ) -> Self {
        let blink_names = blink.channels();
        let mut reports = Vec::with_capacity(rig.meshes.len());
        let mut meshes = Vec::with_capacity(rig.meshes.len());

        for binding in &rig.meshes {
            let Some(id) = scene.find_mesh(&binding.name) else {
                warn!(mesh = %binding.name, "mesh not found in scene, skipping");
                reports.push(MeshReport {
                    name: binding.name.clone(),
                    found: false,
                    channels: 0,
                    decayed: 0,
                    blink: 0,
                });
                continue;
            };
            let dictionary: HashMap<String, usize> =
                scene.morph_dictionary(id).into_iter().collect();
            reports.push(MeshReport {
                name: binding.name.clone(),
                found: true,
                channels: dictionary.len(),
                decayed: 0,
                blink: 0,
            });
            meshes.push((
                reports.len() - 1,
                binding,
                BoundMesh {
                    id,
                    lip_sync: binding.lip_sync,
                    blink: binding.blink,
                    expressions: &binding.expressions,
                    dictionary,
                },
            ));
        }

        let mut decay = Vec::new();
        let mut blink_slots = Vec::new();
        let mut lip_sync: HashMap<String, Vec<ChannelSlot>> = HashMap::new();

        for (report, binding, mesh) in &meshes {
            if binding.decays() {
                let mut slots: Vec<ChannelSlot> = mesh
                    .dictionary
                    .iter()
                    .filter(|(name, _)| !blink_names.contains(&name.as_str()))
                    .map(|(_, &index)| ChannelSlot {
                        mesh: mesh.id,
                        index,
                    })
                    .collect();
                slots.sort();
                reports[*report].decayed = slots.len();
                decay.extend(slots);
            }

            if mesh.blink {
                for name in blink_names {
                    if let Some(slot) = mesh.slot(name) {
                        blink_slots.push(slot);
                        reports[*report].blink += 1;
                    }
                }
            }

            if mesh.lip_sync {
                for (name, &index) in &mesh.dictionary {
                    if blink_names.contains(&name.as_str()) {
                        continue;
                    }
                    lip_sync.entry(name.clone()).or_default().push(ChannelSlot {
                        mesh: mesh.id,
                        index,
                    });
                }
            }
        }
        for slots in lip_sync.values_mut() {
            slots.sort();
        }

        let bound: Vec<&BoundMesh<'_>> = meshes.iter().map(|(_, _, m)| m).collect();
        let mut missing = BTreeSet::new();
        let mut visemes = BTreeMap::new();
        for id in mapping.ids() {
            let resolved = mapping.resolve(id);
            visemes.insert(
                id,
                bind_viseme(&bound, resolved, secondary_categories, &mut missing),
            );
        }
        let silence = bind_viseme(
            &bound,
            ResolvedViseme {
                primary: mapping.silence_channel(),
                secondaries: &[],
            },
            secondary_categories,
            &mut missing,
        );

        let mut eye_bones = Vec::with_capacity(rig.eye_bones.len());
        for name in &rig.eye_bones {
            match scene.find_bone(name) {
                Some(bone) => eye_bones.push(bone),
                None => warn!(bone = %name, "eye bone not found in scene, skipping"),
            }
        }

        if !missing.is_empty() {
            debug!(
                channels = ?missing,
                "mapped channels absent from every bound mesh"
            );
        }
        for report in &reports {
            debug!(
                mesh = %report.name,
                found = report.found,
                channels = report.channels,
                decayed = report.decayed,
                blink = report.blink,
                "bound mesh"
            );
        }
        info!(
            meshes = meshes.len(),
            visemes = visemes.len(),
            blink_slots = blink_slots.len(),
            eye_bones = eye_bones.len(),
            "face rig bound"
        );

        Self {
            decay,
            visemes,
            silence,
            blink: blink_slots,
            eye_bones,
            lip_sync,
            reports,
        }
    }

    /// Slots relaxed toward 0 every frame (blink channels excluded).
    pub fn decay_slots(&self) -> &[ChannelSlot] {
        &self.decay
    }

    /// Slots for a phoneme class; unmapped ids get the silence binding.
    pub fn viseme(&self, phoneme_class_id: u32) -> &BoundViseme {
        self.visemes
            .get(&phoneme_class_id)
            .unwrap_or(&self.silence)
    }

    pub fn blink_slots(&self) -> &[ChannelSlot] {
        &self.blink
    }

    pub fn eye_bones(&self) -> &[BoneId] {
        &self.eye_bones
    }

    /// Slots of a named channel on every lip-sync mesh that exposes it.
    pub fn lip_sync_slots(&self, channel: &str) -> &[ChannelSlot] {
        self.lip_sync
            .get(channel)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn reports(&self) -> &[MeshReport] {
        &self.reports
    }
}

fn bind_viseme(
    meshes: &[&BoundMesh<'_>],
    resolved: ResolvedViseme<'_>,
    categories: &[ExpressionCategory],
    missing: &mut BTreeSet<String>,
) -> BoundViseme {
    let primary: Vec<ChannelSlot> = meshes
        .iter()
        .filter(|m| m.lip_sync)
        .filter_map(|m| m.slot(resolved.primary))
        .collect();
    if primary.is_empty() {
        missing.insert(resolved.primary.to_owned());
    }

    let mut secondary = Vec::new();
    for expression in resolved
        .secondaries
        .iter()
        .filter(|e| categories.contains(&e.category))
    {
        for name in expression.channel_names() {
            let before = secondary.len();
            for mesh in meshes
                .iter()
                .filter(|m| m.expressions.contains(&expression.category))
            {
                if let Some(slot) = mesh.slot(&name) {
                    secondary.push((slot, expression.intensity));
                }
            }
            if secondary.len() == before {
                missing.insert(name);
            }
        }
    }

    BoundViseme { primary, secondary }
}
