//! In-memory decoding of synthesized clips via symphonia.

use super::AudioFormat;
use crate::error::{AvatarError, Result};
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

/// Mono PCM decoded from a clip.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.samples.len() as u64 * 1_000_000_000 / u64::from(self.sample_rate);
        Duration::from_nanos(nanos)
    }
}

/// Decode an encoded clip to mono f32 samples (channels are averaged).
///
/// # Errors
///
/// Returns [`AvatarError::Audio`] if the data cannot be probed or decoded.
pub fn decode_clip(data: &Bytes, format: AudioFormat) -> Result<DecodedAudio> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let source = std::io::Cursor::new(data.clone());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AvatarError::Audio(format!("failed to probe audio: {e}")))?;

    let mut reader = probed.format;
    let track = reader
        .default_track()
        .ok_or_else(|| AvatarError::Audio("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| AvatarError::Audio("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AvatarError::Audio(format!("failed to create decoder: {e}")))?;

    let mut samples = Vec::new();
    let mut buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(AvatarError::Audio(format!("audio read error: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(AvatarError::Audio(format!("audio decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let frames = decoded.frames() as u64;
        let required = usize::try_from(frames)
            .unwrap_or(usize::MAX)
            .saturating_mul(channels);

        if buffer.as_ref().is_none_or(|b| b.capacity() < required) {
            buffer = Some(SampleBuffer::<f32>::new(frames, spec));
        }
        let Some(buf) = buffer.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        if channels == 1 {
            samples.extend_from_slice(buf.samples());
        } else {
            samples.extend(
                buf.samples()
                    .chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Playback length of a clip.
///
/// Decodes when possible; otherwise falls back to the nominal bitrate in the
/// output-format name (e.g. `32kbitrate`), and finally to zero.
pub fn estimate_duration(data: &Bytes, format: AudioFormat, output_format: &str) -> Duration {
    match decode_clip(data, format) {
        Ok(decoded) if !decoded.samples.is_empty() => return decoded.duration(),
        Ok(_) => debug!("decoded clip is empty, estimating from bitrate"),
        Err(e) => debug!(error = %e, "could not decode clip, estimating from bitrate"),
    }
    match nominal_bitrate(output_format) {
        Some(bits_per_sec) => {
            Duration::from_nanos(data.len() as u64 * 8 * 1_000_000_000 / u64::from(bits_per_sec))
        }
        None => Duration::ZERO,
    }
}

/// Bits per second encoded in names like `audio-16khz-32kbitrate-mono-mp3`.
fn nominal_bitrate(output_format: &str) -> Option<u32> {
    output_format
        .split('-')
        .find_map(|part| part.strip_suffix("kbitrate"))
        .and_then(|kbits| kbits.parse::<u32>().ok())
        .filter(|kbits| *kbits > 0)
        .map(|kbits| kbits * 1000)
}
