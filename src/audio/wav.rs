use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use super::device::AudioFormat;

fn wav_spec(format: &AudioFormat) -> hound::WavSpec {
    hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_samples<W: Write + Seek>(writer: W, format: &AudioFormat, samples: &[i16]) -> Result<()> {
    let mut wav = hound::WavWriter::new(writer, wav_spec(format))
        .context("Failed to start WAV stream")?;

    for &sample in samples {
        wav.write_sample(sample)
            .context("Failed to write sample to WAV")?;
    }

    wav.finalize().context("Failed to finalize WAV stream")?;
    Ok(())
}

/// Encode samples as an in-memory WAV container (the wire payload format)
pub fn encode_wav(format: &AudioFormat, samples: &[i16]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    write_samples(&mut cursor, format, samples)?;
    Ok(cursor.into_inner())
}

/// Write samples to a WAV file on disk
pub fn write_wav_file(path: &Path, format: &AudioFormat, samples: &[i16]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
    write_samples(BufWriter::new(file), format, samples)
}
