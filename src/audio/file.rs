use anyhow::{bail, Context, Result};
use chrono::Utc;
use hound::WavReader;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::device::{AudioCaptureDevice, AudioFormat, AudioMode, AudioSegment, Permission};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            bail!(
                "Expected 16-bit integer PCM, got {}-bit {:?}",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat::pcm16(self.sample_rate, self.channels)
    }
}

/// Microphone stand-in that replays a WAV file in real time
///
/// Segments are cut from the file in order and wrap around at the end, so a
/// short recording can feed an arbitrarily long call.
pub struct FileCaptureDevice {
    source: AudioFile,
    position: usize,
    configured: bool,
}

impl FileCaptureDevice {
    pub fn new(source: AudioFile) -> Result<Self> {
        if source.samples.is_empty() {
            bail!("Audio file {} contains no samples", source.path);
        }

        Ok(Self {
            source,
            position: 0,
            configured: false,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(AudioFile::open(path)?)
    }

    pub fn format(&self) -> AudioFormat {
        self.source.format()
    }

    fn next_samples(&mut self, count: usize) -> Vec<i16> {
        let total = self.source.samples.len();
        let mut out = Vec::with_capacity(count);

        while out.len() < count {
            let take = (count - out.len()).min(total - self.position);
            out.extend_from_slice(&self.source.samples[self.position..self.position + take]);
            self.position = (self.position + take) % total;
        }

        out
    }
}

#[async_trait::async_trait]
impl AudioCaptureDevice for FileCaptureDevice {
    async fn request_permission(&mut self) -> Result<Permission> {
        Ok(Permission::Granted)
    }

    async fn configure(&mut self, format: &AudioFormat, mode: &AudioMode) -> Result<()> {
        let source_format = self.source.format();
        if format.sample_rate != source_format.sample_rate || format.channels != source_format.channels {
            bail!(
                "Resampling not supported. Requested {}Hz {}ch, file is {}Hz {}ch",
                format.sample_rate,
                format.channels,
                source_format.sample_rate,
                source_format.channels
            );
        }

        info!(
            "File capture configured: {} ({}Hz, {} channels, recording={})",
            self.source.path, format.sample_rate, format.channels, mode.allows_recording
        );

        self.configured = true;
        Ok(())
    }

    async fn capture_segment(&mut self, duration: Duration) -> Result<AudioSegment> {
        if !self.configured {
            bail!("Capture device not configured");
        }

        let format = self.source.format();
        let samples = self.next_samples(format.samples_for(duration));

        // Pace like a real microphone
        tokio::time::sleep(duration).await;

        Ok(AudioSegment {
            samples,
            format,
            captured_at: Utc::now(),
        })
    }

    async fn release(&mut self) -> Result<()> {
        if self.configured {
            info!("File capture released: {}", self.source.path);
        }
        self.configured = false;
        Ok(())
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}
