//! Configuration, mapping tables and scene manifests on disk.

use crate::helpers::{default_scene, head, quiet_config, utterance};
use std::sync::Arc;
use std::time::Duration;
use talking_head::audio::{SimClock, SimulatedOutput};
use talking_head::config::{AvatarConfig, MeshBinding, SmoothingMode};
use talking_head::scene::{InMemoryScene, SceneManifest};
use talking_head::tts::ScriptedSynthesizer;
use talking_head::viseme::{ExpressionCategory, MappingPreset, SecondaryExpression};
use talking_head::{Avatar, AvatarError, PhonemeClassMapping};
use tempfile::TempDir;

#[test]
fn saved_config_loads_back_identically() {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("nested").join("config.toml");

    let mut config = AvatarConfig::default();
    config.speech.voice = "it-IT-IsabellaNeural".into();
    config.mixer.smoothing = 0.3;
    config.mixer.smoothing_mode = SmoothingMode::TimeConstant;
    config.mixer.secondary_categories = vec![ExpressionCategory::Brow];
    config.idle.blink.duration_ms = 120;
    config.mapping.preset = MappingPreset::Classic;
    config
        .rig
        .meshes
        .push(MeshBinding::new("Beard_Mesh001").lip_sync());

    config.save_to_file(&path).unwrap();
    let loaded = AvatarConfig::from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn partial_file_fills_in_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[speech]\nregion = \"westeurope\"\n\n[idle.gaze]\ninterval_ms = 1500\n",
    )
    .unwrap();

    let config = AvatarConfig::from_file(&path).unwrap();
    assert_eq!(config.speech.region.as_deref(), Some("westeurope"));
    assert_eq!(config.speech.voice, "it-IT-BenignoNeural");
    assert_eq!(config.idle.gaze.interval_ms, 1500);
    assert_eq!(config.idle.blink.min_interval_ms, 2000);
    assert_eq!(config.mixer.smoothing, 0.5);
}

#[test]
fn invalid_values_are_config_errors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[idle.blink]\nmin_interval_ms = 6000\nmax_interval_ms = 2000\n").unwrap();
    assert!(matches!(
        AvatarConfig::from_file(&path),
        Err(AvatarError::Config(_))
    ));

    std::fs::write(&path, "[mixer\nsmoothing = ").unwrap();
    assert!(matches!(
        AvatarConfig::from_file(&path),
        Err(AvatarError::Config(_))
    ));
}

#[tokio::test]
async fn custom_mapping_file_drives_the_mouth() {
    let dir = TempDir::new().unwrap();
    let mapping_path = dir.path().join("mapping.toml");
    let mapping = PhonemeClassMapping::builder()
        .viseme(7, "viseme_O")
        .expression(
            7,
            SecondaryExpression::paired(ExpressionCategory::Brow, "browInnerUp", 0.4),
        )
        .build();
    std::fs::write(&mapping_path, mapping.to_toml_string().unwrap()).unwrap();

    let mut config = quiet_config();
    config.mapping.path = Some(mapping_path);
    let output = SimulatedOutput::new(SimClock::new());
    let mut avatar = Avatar::new(
        default_scene(),
        &config,
        Arc::new(ScriptedSynthesizer::new(utterance(&[(0.0, 7)], 500))),
        Arc::new(output.clone()),
    )
    .unwrap();

    avatar.speak("oh").unwrap();
    avatar.settle().await;
    for i in 0..10u32 {
        avatar.frame(Duration::from_millis(10) * i, Duration::from_millis(10));
    }
    assert!(head(&avatar, "viseme_O") > 0.6);
    assert!(head(&avatar, "viseme_sil") < 0.01);
}

#[test]
fn unreadable_mapping_path_fails_avatar_construction() {
    let mut config = quiet_config();
    config.mapping.path = Some("/nonexistent/mapping.toml".into());
    let result = Avatar::new(
        default_scene(),
        &config,
        Arc::new(ScriptedSynthesizer::babble(Duration::from_millis(50))),
        Arc::new(SimulatedOutput::default()),
    );
    assert!(result.is_err());
}

#[test]
fn scene_manifest_round_trips_through_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scene.json");
    let manifest = SceneManifest::default_avatar();
    std::fs::write(&path, serde_json::to_string_pretty(&manifest).unwrap()).unwrap();

    let loaded = SceneManifest::from_file(&path).unwrap();
    assert_eq!(loaded, manifest);

    let scene = InMemoryScene::from_manifest(&loaded);
    assert_eq!(scene.mesh_names().len(), 5);
    assert!(scene.bone("LeftEye").is_some());
}
