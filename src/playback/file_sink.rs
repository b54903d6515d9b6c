use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::{write_wav_file, AudioClip, AudioPlaybackDevice, PlaybackHandle};

struct ActiveClip {
    path: PathBuf,
    timer: JoinHandle<()>,
}

/// Speaker stand-in that renders each clip to a temporary WAV file
///
/// The file exists while the clip "plays" (for the clip's duration) and is
/// removed as soon as the clip finishes or is stopped.
pub struct FilePlaybackDevice {
    output_dir: PathBuf,
    next_id: u64,
    active: HashMap<u64, ActiveClip>,
}

impl FilePlaybackDevice {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)
            .context("Failed to create playback directory")?;

        info!("File playback initialized: {}", output_dir.display());

        Ok(Self {
            output_dir,
            next_id: 0,
            active: HashMap::new(),
        })
    }

    /// Clips currently on disk
    pub fn active_clips(&self) -> usize {
        self.active.len()
    }

    fn discard(&mut self, id: u64) -> Result<()> {
        if let Some(clip) = self.active.remove(&id) {
            clip.timer.abort();
            if clip.path.exists() {
                fs::remove_file(&clip.path)
                    .with_context(|| format!("Failed to remove clip file: {:?}", clip.path))?;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AudioPlaybackDevice for FilePlaybackDevice {
    async fn play(&mut self, clip: AudioClip) -> Result<PlaybackHandle> {
        let id = self.next_id;
        self.next_id += 1;

        let path = self.output_dir.join(format!("clip-{:05}.wav", id));
        write_wav_file(&path, &clip.format, &clip.samples)?;

        let duration = clip.duration();
        let (done_tx, done_rx) = oneshot::channel();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = done_tx.send(());
        });

        debug!("Clip {} written to {} ({:?})", id, path.display(), duration);
        self.active.insert(id, ActiveClip { path, timer });

        Ok(PlaybackHandle::new(id, done_rx))
    }

    async fn stop(&mut self, handle: PlaybackHandle) -> Result<()> {
        debug!("Clip {} stopped", handle.id());
        self.discard(handle.id())
    }

    async fn release(&mut self, handle: PlaybackHandle) -> Result<()> {
        self.discard(handle.id())
    }

    fn name(&self) -> &str {
        "WAV file sink"
    }
}

impl Drop for FilePlaybackDevice {
    fn drop(&mut self) {
        let ids: Vec<u64> = self.active.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.discard(id) {
                warn!("Failed to clean up clip on drop: {}", e);
            }
        }
    }
}
