//! Audio playback to system speakers via cpal.

use super::{AudioClip, AudioFormat, AudioOutput, PlaybackHandle, decode_clip};
use crate::error::{AvatarError, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Plays clips on a cpal output device.
///
/// Each playback owns its stream on a dedicated thread (cpal streams are not
/// `Send` on every platform); the returned handle only shares the sample
/// cursor.
pub struct CpalOutput {
    device_name: Option<String>,
}

impl CpalOutput {
    /// Use the named output device, or the system default.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is not available.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = find_device(device_name)?;
        let name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {name}");
        Ok(Self {
            device_name: device_name.map(str::to_owned),
        })
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| AvatarError::Audio(format!("cannot enumerate devices: {e}")))?;
        Ok(devices
            .filter_map(|d| d.description().ok().map(|desc| desc.name().to_owned()))
            .collect())
    }
}

fn find_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| AvatarError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| AvatarError::Audio(format!("output device '{name}' not found"))),
        None => host
            .default_output_device()
            .ok_or_else(|| AvatarError::Audio("no default output device".into())),
    }
}

/// Sample cursor shared with the audio callback.
///
/// Empty until the playback thread has decoded the clip.
#[derive(Default)]
struct PlaybackBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    position: usize,
    finished: bool,
}

impl PlaybackBuffer {
    fn position(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.position as u64 * 1_000_000_000 / u64::from(self.sample_rate))
    }
}

impl AudioOutput for CpalOutput {
    /// Hands the clip to a playback thread and returns at once.
    ///
    /// Decoding and opening the stream happen on that thread. A clip that
    /// fails there is logged and its handle reports finished.
    fn start(&self, clip: &AudioClip) -> Result<Box<dyn PlaybackHandle>> {
        let buffer = Arc::new(Mutex::new(PlaybackBuffer::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_buffer = Arc::clone(&buffer);
        let thread_stop = Arc::clone(&stop);
        let device_name = self.device_name.clone();
        let data = clip.data.clone();
        let format = clip.format;

        let thread = std::thread::Builder::new()
            .name("avatar-playback".into())
            .spawn(move || {
                let prepared = prepare(
                    device_name.as_deref(),
                    &data,
                    format,
                    &thread_buffer,
                    &thread_stop,
                );
                let stream = match prepared {
                    Ok(Some(stream)) => stream,
                    Ok(None) => return,
                    Err(e) => {
                        error!("playback failed: {e}");
                        if let Ok(mut buf) = thread_buffer.lock() {
                            buf.finished = true;
                        }
                        return;
                    }
                };
                while !thread_stop.load(Ordering::Acquire) {
                    let done = thread_buffer.lock().map(|b| b.finished).unwrap_or(true);
                    if done {
                        break;
                    }
                    std::thread::park_timeout(Duration::from_millis(10));
                }
                drop(stream);
                debug!("playback stream closed");
            })
            .map_err(|e| AvatarError::Audio(format!("cannot spawn playback thread: {e}")))?;

        Ok(Box::new(CpalPlayback {
            buffer,
            stop,
            thread: Some(thread),
        }))
    }
}

/// Decode the clip into `buffer` and open its stream. `None` when stopped
/// before the stream was needed.
fn prepare(
    device_name: Option<&str>,
    data: &Bytes,
    format: AudioFormat,
    buffer: &Arc<Mutex<PlaybackBuffer>>,
    stop: &AtomicBool,
) -> Result<Option<cpal::Stream>> {
    let decoded = decode_clip(data, format)?;
    let sample_rate = decoded.sample_rate;
    {
        let mut buf = buffer
            .lock()
            .map_err(|_| AvatarError::Audio("playback buffer poisoned".into()))?;
        buf.finished = decoded.samples.is_empty();
        buf.samples = decoded.samples;
        buf.sample_rate = sample_rate;
        if buf.finished {
            return Ok(None);
        }
    }
    if stop.load(Ordering::Acquire) {
        return Ok(None);
    }
    open_stream(device_name, sample_rate, Arc::clone(buffer)).map(Some)
}

fn open_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    buffer: Arc<Mutex<PlaybackBuffer>>,
) -> Result<cpal::Stream> {
    let device = find_device(device_name)?;
    let stream_config = StreamConfig {
        channels: 1,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let Ok(mut buf) = buffer.lock() else {
                    return;
                };
                for sample in data.iter_mut() {
                    if buf.position < buf.samples.len() {
                        *sample = buf.samples[buf.position];
                        buf.position += 1;
                    } else {
                        *sample = 0.0;
                        buf.finished = true;
                    }
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| AvatarError::Audio(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| AvatarError::Audio(format!("failed to start output stream: {e}")))?;
    Ok(stream)
}

struct CpalPlayback {
    buffer: Arc<Mutex<PlaybackBuffer>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackHandle for CpalPlayback {
    fn position(&self) -> Duration {
        self.buffer.lock().map(|b| b.position()).unwrap_or_default()
    }

    fn is_finished(&self) -> bool {
        self.stop.load(Ordering::Acquire)
            || self.buffer.lock().map(|b| b.finished).unwrap_or(true)
    }

    /// Signals the playback thread and returns; the thread closes the stream
    /// on its own.
    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
        }
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
