//! Headless demo for the talking-head animation core.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use talking_head::audio::{AudioOutput, SimClock, SimulatedOutput};
use talking_head::config::AvatarConfig;
use talking_head::rig::FaceRig;
use talking_head::scene::{InMemoryScene, SceneHost, SceneManifest};
use talking_head::tts::{AzureSynthesizer, ScriptedSynthesizer, Synthesizer};
use talking_head::{Avatar, AvatarEvent, SpeechState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Drive a talking head from text without a renderer.
#[derive(Parser)]
#[command(name = "avatar-demo", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON scene manifest (meshes with morph targets, eye bones).
    #[arg(short, long)]
    scene: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize text and animate the face until playback ends.
    Speak {
        text: String,

        /// Frames per second of the simulated render loop.
        #[arg(long, default_value_t = 60)]
        fps: u32,

        /// Pace frames in real time instead of rendering as fast as possible.
        #[arg(long)]
        realtime: bool,

        /// Play through the speakers (implies --realtime).
        #[cfg(feature = "cpal-output")]
        #[arg(long)]
        speakers: bool,

        /// Use the offline babbling synthesizer even if credentials are set.
        #[arg(long)]
        offline: bool,
    },

    /// Show how the configured rig binds to the scene.
    Inspect,

    /// Write the default configuration file.
    InitConfig {
        /// Destination (defaults to the platform config directory).
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// List audio output devices.
    #[cfg(feature = "cpal-output")]
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("talking_head=info,avatar_demo=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let scene = load_scene(cli.scene.as_deref())?;

    match cli.command {
        #[cfg(feature = "cpal-output")]
        Command::Speak {
            text,
            fps,
            realtime,
            speakers,
            offline,
        } => run_speak(config, scene, &text, fps, realtime || speakers, speakers, offline).await,
        #[cfg(not(feature = "cpal-output"))]
        Command::Speak {
            text,
            fps,
            realtime,
            offline,
        } => run_speak(config, scene, &text, fps, realtime, false, offline).await,
        Command::Inspect => {
            inspect(&config, &scene);
            Ok(())
        }
        Command::InitConfig { path, force } => init_config(path, force),
        #[cfg(feature = "cpal-output")]
        Command::Devices => {
            for name in talking_head::audio::CpalOutput::list_output_devices()? {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AvatarConfig> {
    if let Some(path) = path {
        return Ok(AvatarConfig::from_file(path)?);
    }
    let default_path = AvatarConfig::default_config_path();
    if default_path.exists() {
        info!("using config {}", default_path.display());
        Ok(AvatarConfig::from_file(&default_path)?)
    } else {
        Ok(AvatarConfig::default())
    }
}

fn load_scene(path: Option<&Path>) -> anyhow::Result<InMemoryScene> {
    let manifest = match path {
        Some(path) => SceneManifest::from_file(path)?,
        None => SceneManifest::default_avatar(),
    };
    Ok(InMemoryScene::from_manifest(&manifest))
}

fn synthesizer(config: &AvatarConfig, offline: bool) -> Arc<dyn Synthesizer> {
    let azure = AzureSynthesizer::new(&config.speech);
    if !offline && azure.check_ready().is_ok() {
        return Arc::new(azure);
    }
    if !offline {
        warn!("no speech credentials configured, using the offline babbling synthesizer");
    }
    Arc::new(ScriptedSynthesizer::babble(Duration::from_millis(90)))
}

async fn run_speak(
    config: AvatarConfig,
    scene: InMemoryScene,
    text: &str,
    fps: u32,
    realtime: bool,
    speakers: bool,
    offline: bool,
) -> anyhow::Result<()> {
    let clock = SimClock::new();
    let output: Arc<dyn AudioOutput> = if speakers {
        speaker_output()?
    } else {
        Arc::new(SimulatedOutput::new(clock.clone()))
    };

    let mut avatar = Avatar::new(scene, &config, synthesizer(&config, offline), output)?;
    let mut events = avatar.subscribe();

    avatar.speak(text)?;
    println!("{}", avatar.status_text());
    if avatar.settle().await != SpeechState::Speaking {
        let reason = avatar.session().last_error().unwrap_or("unknown error");
        anyhow::bail!("speech failed: {reason}");
    }
    println!("{}", avatar.status_text());

    let dt = Duration::from_secs(1) / fps.max(1);
    let mut ticker = tokio::time::interval(dt);
    let epoch = tokio::time::Instant::now();
    let mut now = Duration::ZERO;
    let mut frames = 0u64;

    while avatar.state() == SpeechState::Speaking {
        if realtime {
            ticker.tick().await;
            now = epoch.elapsed();
            clock.set(now);
        } else {
            now += dt;
            clock.advance(dt);
        }
        avatar.frame(now, dt);
        frames += 1;

        while let Ok(event) = events.try_recv() {
            if let AvatarEvent::VisemeChanged {
                phoneme_class_id: Some(id),
            } = event
            {
                let time_ms = avatar.session().current_time_ms().unwrap_or_default();
                println!("{time_ms:>8.1} ms  viseme {id:>2}  {}", top_channels(&avatar));
            }
        }
    }

    // Let the face relax back to neutral.
    for _ in 0..fps / 4 {
        now += dt;
        avatar.frame(now, dt);
    }
    println!("{} ({frames} frames)", avatar.status_text());
    Ok(())
}

#[cfg(feature = "cpal-output")]
fn speaker_output() -> anyhow::Result<Arc<dyn AudioOutput>> {
    Ok(Arc::new(talking_head::audio::CpalOutput::new(None)?))
}

#[cfg(not(feature = "cpal-output"))]
fn speaker_output() -> anyhow::Result<Arc<dyn AudioOutput>> {
    anyhow::bail!("built without the cpal-output feature")
}

/// The three strongest head channels, for a compact per-viseme readout.
fn top_channels(avatar: &Avatar<InMemoryScene>) -> String {
    let Some(head) = avatar
        .rig()
        .reports()
        .iter()
        .find(|r| r.found)
        .map(|r| r.name.clone())
    else {
        return String::new();
    };
    let mut channels = avatar.scene().channels(&head);
    channels.sort_by(|a, b| b.1.total_cmp(&a.1));
    channels
        .iter()
        .take(3)
        .filter(|(_, v)| *v > 0.01)
        .map(|(name, v)| format!("{name}={v:.2}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn inspect(config: &AvatarConfig, scene: &InMemoryScene) {
    for mesh_name in scene.mesh_names() {
        let Some(mesh) = scene.find_mesh(mesh_name) else {
            continue;
        };
        let dictionary = scene.morph_dictionary(mesh);
        println!("{mesh_name} ({} morph targets)", dictionary.len());
        for (name, index) in dictionary {
            println!("  [{index:>2}] {name}");
        }
    }

    let mapping = match config.mapping.load() {
        Ok(mapping) => mapping,
        Err(e) => {
            warn!("falling back to the default mapping: {e}");
            Default::default()
        }
    };
    let rig = FaceRig::bind(
        scene,
        &config.rig,
        &mapping,
        &config.mixer.secondary_categories,
        &config.idle.blink,
    );
    println!();
    println!("{:<20} {:>6} {:>8} {:>8} {:>6}", "mesh", "found", "channels", "decayed", "blink");
    for report in rig.reports() {
        println!(
            "{:<20} {:>6} {:>8} {:>8} {:>6}",
            report.name, report.found, report.channels, report.decayed, report.blink
        );
    }
    println!("eye bones bound: {}", rig.eye_bones().len());
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(AvatarConfig::default_config_path);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    AvatarConfig::default().save_to_file(&path)?;
    println!("wrote {}", path.display());
    Ok(())
}
