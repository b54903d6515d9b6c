use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Upper bound for input gain and playback amplification
pub const MAX_AMPLIFICATION: f32 = 20.0;

/// User-adjustable volume settings, read when a segment or clip is processed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Multiplier applied to captured samples
    pub input_gain: f32,
    /// Multiplier applied to played-back samples
    pub amplification: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            input_gain: 1.0,
            amplification: 1.0,
        }
    }
}

impl AudioSettings {
    /// Clamp both multipliers to `[0, MAX_AMPLIFICATION]`
    pub fn clamped(self) -> Self {
        Self {
            input_gain: clamp_gain(self.input_gain),
            amplification: clamp_gain(self.amplification),
        }
    }
}

fn clamp_gain(value: f32) -> f32 {
    if value.is_nan() {
        return 1.0;
    }
    value.clamp(0.0, MAX_AMPLIFICATION)
}

/// Shared, read-at-use settings provider
#[derive(Clone)]
pub struct AudioSettingsHandle {
    tx: Arc<watch::Sender<AudioSettings>>,
}

impl AudioSettingsHandle {
    pub fn new(settings: AudioSettings) -> Self {
        let (tx, _rx) = watch::channel(settings.clamped());
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> AudioSettings {
        *self.tx.borrow()
    }

    pub fn set(&self, settings: AudioSettings) -> AudioSettings {
        let settings = settings.clamped();
        self.tx.send_replace(settings);
        settings
    }

    pub fn set_input_gain(&self, gain: f32) {
        self.tx.send_modify(|s| s.input_gain = clamp_gain(gain));
    }

    pub fn set_amplification(&self, amplification: f32) {
        self.tx.send_modify(|s| s.amplification = clamp_gain(amplification));
    }
}

impl Default for AudioSettingsHandle {
    fn default() -> Self {
        Self::new(AudioSettings::default())
    }
}

/// Scale samples in place, saturating at the i16 range
pub fn apply_gain(samples: &mut [i16], gain: f32) {
    if (gain - 1.0).abs() < f32::EPSILON {
        return;
    }

    for sample in samples.iter_mut() {
        let scaled = (*sample as f32 * gain).round();
        *sample = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    }
}
