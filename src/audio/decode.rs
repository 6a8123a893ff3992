use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::buffer::AudioBuffer;

/// Decode a recorded take into a mono [`AudioBuffer`], keeping at most
/// `max_seconds` of audio.
pub fn decode_take(path: &Path, max_seconds: f32) -> Result<AudioBuffer> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open recording: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;
    let max_samples = (max_seconds * sample_rate as f32) as usize;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut mono: Vec<f32> = Vec::new();
    let mut truncated = false;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        // Downmix to mono
        if channels == 1 {
            mono.extend_from_slice(sample_buf.samples());
        } else {
            for frame_samples in sample_buf.samples().chunks(channels) {
                mono.push(frame_samples.iter().sum::<f32>() / channels as f32);
            }
        }

        if mono.len() >= max_samples {
            truncated = mono.len() > max_samples;
            mono.truncate(max_samples);
            break;
        }
    }

    if truncated {
        log::warn!(
            "Recording {} is longer than {:.1}s, keeping the first {:.1}s",
            path.display(),
            max_seconds,
            max_seconds
        );
    }

    let buffer = AudioBuffer::from_f32(&mono, sample_rate);
    log::info!(
        "Decoded take {}: {} samples, {}Hz, {:.2}s",
        path.display(),
        buffer.len(),
        sample_rate,
        buffer.duration_seconds()
    );
    Ok(buffer)
}
