// Decoding of inbound response audio
//
// The remote endpoint answers with a complete audio file (usually WAV, but
// any container symphonia probes is accepted). The whole clip is decoded into
// interleaved 16-bit PCM before it is handed to the playback device.

use anyhow::{anyhow, Context, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::device::{AudioClip, AudioFormat};

/// Container hint for an inbound clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipContainer {
    Wav,
    /// Let the prober figure it out
    Unknown,
}

impl ClipContainer {
    /// Sniff the container from the leading bytes
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            ClipContainer::Wav
        } else {
            ClipContainer::Unknown
        }
    }
}

/// Decode a complete audio file held in memory
pub fn decode_clip(bytes: &[u8], container: ClipContainer) -> Result<AudioClip> {
    let mut hint = Hint::new();
    if container == ClipContainer::Wav {
        hint.with_extension("wav");
    }

    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let probed = symphonia::default::get_probe()
        .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
        .context("Unrecognized audio container")?;

    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("No decodable audio track"))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported audio codec")?;

    let mut samples: Vec<i16> = Vec::new();

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Failed to read audio packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count() as u16);

                let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(e).context("Failed to decode audio packet"),
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| anyhow!("Clip has no sample rate"))?;
    let channels = channels.ok_or_else(|| anyhow!("Clip has no channel layout"))?;

    debug!(
        "Decoded clip: {} samples, {}Hz, {} channels",
        samples.len(),
        sample_rate,
        channels
    );

    Ok(AudioClip {
        samples,
        format: AudioFormat::pcm16(sample_rate, channels),
    })
}
