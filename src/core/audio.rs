use log::{debug, info};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/* ============================== Public API ============================== */

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandle(u32);

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio file '{}' not found", .0.display())]
    NotFound(PathBuf),
    #[error("unknown audio channel {0:?}")]
    UnknownChannel(ChannelHandle),
}

/// Playback control the game core needs from an audio backend. Positions are
/// milliseconds into the file.
pub trait AudioEngine {
    fn play(&mut self, path: &Path, looping: bool, preload: bool) -> Result<ChannelHandle, AudioError>;
    fn set_position(&mut self, channel: ChannelHandle, ms: f64) -> Result<(), AudioError>;
    fn position(&self, channel: ChannelHandle) -> Result<f64, AudioError>;
    fn set_volume(&mut self, channel: ChannelHandle, volume: f32) -> Result<(), AudioError>;
    fn stop(&mut self, channel: ChannelHandle) -> Result<(), AudioError>;
}

/// A playback position published by the audio thread and read by the game
/// tick. Stored as `f64` bits.
#[derive(Clone, Debug, Default)]
pub struct SharedPosition(Arc<AtomicU64>);

impl SharedPosition {
    pub fn new(ms: f64) -> Self {
        Self(Arc::new(AtomicU64::new(ms.to_bits())))
    }

    #[inline(always)]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub fn store(&self, ms: f64) {
        self.0.store(ms.to_bits(), Ordering::Release);
    }
}

/* ============================ Silent backend ============================ */

#[derive(Debug)]
struct Channel {
    path: PathBuf,
    position: SharedPosition,
    volume: f32,
    looping: bool,
}

/// Clock-only backend: channels advance when the caller ticks them and make
/// no sound. Files are only checked for existence.
#[derive(Debug, Default)]
pub struct SilentAudio {
    channels: FxHashMap<ChannelHandle, Channel>,
    next_id: u32,
}

impl SilentAudio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves every playing channel forward by `delta_ms`.
    pub fn advance(&mut self, delta_ms: f64) {
        if !delta_ms.is_finite() || delta_ms <= 0.0 {
            return;
        }
        for channel in self.channels.values() {
            channel.position.store(channel.position.load() + delta_ms);
        }
    }

    /// Handle for reading a channel's position from another thread.
    pub fn position_handle(&self, channel: ChannelHandle) -> Option<SharedPosition> {
        self.channels.get(&channel).map(|c| c.position.clone())
    }

    pub fn volume(&self, channel: ChannelHandle) -> Option<f32> {
        self.channels.get(&channel).map(|c| c.volume)
    }

    pub fn is_playing(&self, channel: ChannelHandle) -> bool {
        self.channels.contains_key(&channel)
    }

    fn channel_mut(&mut self, channel: ChannelHandle) -> Result<&mut Channel, AudioError> {
        self.channels.get_mut(&channel).ok_or(AudioError::UnknownChannel(channel))
    }
}

impl AudioEngine for SilentAudio {
    fn play(&mut self, path: &Path, looping: bool, preload: bool) -> Result<ChannelHandle, AudioError> {
        if !path.is_file() {
            return Err(AudioError::NotFound(path.to_path_buf()));
        }
        let handle = ChannelHandle(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        info!("Playing {:?} (looping: {looping}, preload: {preload}) silently.", path.file_name().unwrap_or_default());
        self.channels.insert(
            handle,
            Channel { path: path.to_path_buf(), position: SharedPosition::new(0.0), volume: 1.0, looping },
        );
        Ok(handle)
    }

    fn set_position(&mut self, channel: ChannelHandle, ms: f64) -> Result<(), AudioError> {
        let channel = self.channel_mut(channel)?;
        channel.position.store(ms.max(0.0));
        Ok(())
    }

    fn position(&self, channel: ChannelHandle) -> Result<f64, AudioError> {
        self.channels
            .get(&channel)
            .map(|c| c.position.load())
            .ok_or(AudioError::UnknownChannel(channel))
    }

    fn set_volume(&mut self, channel: ChannelHandle, volume: f32) -> Result<(), AudioError> {
        let channel = self.channel_mut(channel)?;
        channel.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 1.0 };
        Ok(())
    }

    fn stop(&mut self, channel: ChannelHandle) -> Result<(), AudioError> {
        let removed = self.channels.remove(&channel).ok_or(AudioError::UnknownChannel(channel))?;
        debug!("Stopped {:?} (looping: {}).", removed.path, removed.looping);
        Ok(())
    }
}
