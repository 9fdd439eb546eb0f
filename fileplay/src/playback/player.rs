//! Player instance control surface
//!
//! [`Player`] is what the registry hands out for a handle. Control calls
//! come from any non-real-time thread; the audio thread talks to the same
//! instance through the [`Renderer`] obtained from [`Player::renderer`].
//!
//! Getters never fail: on a player without an open file they return a zero
//! value (empty string, 0, `Stopped`). Setters return an error and leave
//! state unchanged when the file is not open or the argument is invalid.

use crate::audio::{clamp_track, FileFormat, SrcQuality};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::host;
use crate::playback::events::{EventKind, NotificationTarget, Notifier};
use crate::playback::render::Renderer;
use crate::playback::state::{lock, FileLifecycle, PlayerShared, TransportState};
use crate::playback::streaming;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// One audio-file player
pub struct Player {
    shared: Arc<PlayerShared>,
    config: EngineConfig,
    /// Streaming task of the open file. The lock also serialises load/unload.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    pub fn new(handle: usize, config: &EngineConfig) -> Self {
        Self {
            shared: Arc::new(PlayerShared::new(
                handle,
                config.buffer_size,
                config.buffer_count,
                config.src_quality,
                Notifier::new(config),
            )),
            config: config.clone(),
            task: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> usize {
        self.shared.handle
    }

    pub fn lifecycle(&self) -> FileLifecycle {
        self.shared.lifecycle.load()
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Open `path` and start streaming it.
    ///
    /// Any file already loaded is unloaded first. Blocks until the streaming
    /// task reports the file open or failed. On success `target` receives
    /// change notifications until the file is unloaded.
    ///
    /// # Errors
    /// - `TaskCreation` if the streaming thread cannot be spawned
    /// - `FileOpen` if the file cannot be opened or decoded
    pub fn load(&self, path: impl AsRef<Path>, target: Option<Arc<dyn NotificationTarget>>) -> Result<()> {
        let path = path.as_ref();
        let mut task = lock(&self.task);
        self.unload_locked(&mut task);

        debug!("Player {}: loading {}", self.handle(), path.display());
        self.shared.reset_for_load();
        self.shared.lifecycle.store(FileLifecycle::Opening);

        let handle = match streaming::spawn(Arc::clone(&self.shared), path.to_path_buf(), self.config.poll_interval()) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Player {}: {}", self.handle(), e);
                self.shared.lifecycle.store(FileLifecycle::Closed);
                return Err(e);
            }
        };

        while self.shared.lifecycle.load() == FileLifecycle::Opening && !handle.is_finished() {
            thread::sleep(self.config.poll_interval());
        }

        if self.shared.is_open() {
            self.shared.notifier.set_target(target);
            *task = Some(handle);
            return Ok(());
        }

        if handle.join().is_err() {
            error!("Player {}: streaming task panicked while opening", self.handle());
        }
        self.shared.lifecycle.store(FileLifecycle::Failed);
        let reason = lock(&self.shared.last_error)
            .take()
            .unwrap_or_else(|| "streaming task ended before the file opened".to_string());
        Err(Error::FileOpen(reason))
    }

    /// Close the file and stop the streaming task. Safe in any state.
    pub fn unload(&self) {
        let mut task = lock(&self.task);
        self.unload_locked(&mut task);
    }

    fn unload_locked(&self, task: &mut Option<JoinHandle<()>>) {
        let was_open = self.shared.is_open();
        self.shared.stop();
        self.shared.lifecycle.store(FileLifecycle::Closed);

        if let Some(handle) = task.take() {
            if handle.join().is_err() {
                error!("Player {}: streaming task panicked", self.handle());
            }
        }

        *lock(&self.shared.reader) = None;
        self.shared.clear_file();
        self.shared.notifier.set_target(None);
        self.shared.transport.store(TransportState::Stopped);

        if was_open {
            info!("Player {}: unloaded", self.handle());
        }
    }

    /// Claim the render endpoint. `None` while another renderer is alive.
    pub fn renderer(&self) -> Option<Renderer> {
        self.shared
            .renderer_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| {
                Renderer::new(
                    Arc::clone(&self.shared),
                    self.config.reference_note,
                    self.config.cc_mapping,
                )
            })
    }

    /// Re-cue at the current position so the next block uses the current
    /// host sample rate
    pub(crate) fn rebase_sample_rate(&self) {
        if self.shared.is_open() {
            self.shared.request_seek(self.shared.position_seconds());
        }
    }

    fn require_open(&self) -> Result<()> {
        if self.shared.is_open() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("Player {} has no open file", self.handle())))
        }
    }

    fn require_closed(&self) -> Result<()> {
        match self.shared.lifecycle.load() {
            FileLifecycle::Closed | FileLifecycle::Failed => Ok(()),
            state => Err(Error::InvalidState(format!(
                "Player {} buffers cannot change while the file is {}",
                self.handle(),
                state
            ))),
        }
    }

    // ========================================
    // Getters
    // ========================================

    /// Path of the open file, empty when none
    pub fn filename(&self) -> String {
        if !self.shared.is_open() {
            return String::new();
        }
        lock(&self.shared.file)
            .as_ref()
            .map(|file| file.path.display().to_string())
            .unwrap_or_default()
    }

    /// Duration of the open file in seconds
    pub fn duration(&self) -> f32 {
        if self.shared.is_open() {
            self.shared.duration()
        } else {
            0.0
        }
    }

    /// Play position in seconds
    pub fn position(&self) -> f32 {
        if self.shared.is_open() {
            self.shared.position_seconds()
        } else {
            0.0
        }
    }

    pub fn is_loop(&self) -> bool {
        self.shared.is_open() && self.shared.loop_enabled.load(Ordering::Acquire)
    }

    pub fn play_state(&self) -> TransportState {
        if self.shared.is_open() {
            self.shared.transport.load()
        } else {
            TransportState::Stopped
        }
    }

    /// Native rate of the open file, or the host rate when none is open
    pub fn sample_rate(&self) -> u32 {
        if self.shared.is_open() {
            self.shared.file_sample_rate.load(Ordering::Acquire)
        } else {
            host::sample_rate()
        }
    }

    pub fn channels(&self) -> usize {
        if self.shared.is_open() {
            self.shared.file_channels.load(Ordering::Acquire)
        } else {
            0
        }
    }

    /// Frames in the open file at its native rate
    pub fn frame_count(&self) -> u64 {
        if self.shared.is_open() {
            self.shared.file_frames.load(Ordering::Acquire)
        } else {
            0
        }
    }

    pub fn format(&self) -> Option<FileFormat> {
        if !self.shared.is_open() {
            return None;
        }
        lock(&self.shared.file).as_ref().map(|file| file.format.clone())
    }

    pub fn gain(&self) -> f32 {
        if self.shared.is_open() {
            self.shared.gain.load()
        } else {
            0.0
        }
    }

    pub fn track_a(&self) -> i32 {
        if self.shared.is_open() {
            self.shared.track_a.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    pub fn track_b(&self) -> i32 {
        if self.shared.is_open() {
            self.shared.track_b.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    pub fn src_quality(&self) -> SrcQuality {
        self.shared.quality()
    }

    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size.load(Ordering::Acquire)
    }

    pub fn buffer_count(&self) -> usize {
        self.shared.buffer_count.load(Ordering::Acquire)
    }

    /// Semitones applied by the last note trigger
    pub fn pitch_shift(&self) -> i32 {
        if self.shared.is_open() {
            self.shared.pitch_shift.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    /// Last pitch-bend value received (8192 is centre)
    pub fn pitch_bend(&self) -> u16 {
        if self.shared.is_open() {
            self.shared.pitch_bend.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    /// Effective resample ratio (output rate / file rate, pitch included)
    pub fn resample_ratio(&self) -> f64 {
        if self.shared.is_open() {
            self.shared.ratio.load()
        } else {
            0.0
        }
    }

    // ========================================
    // Setters
    // ========================================

    /// Seek to `seconds`, clamped to the file
    pub fn set_position(&self, seconds: f32) -> Result<()> {
        self.require_open()?;
        self.shared.request_seek(seconds);
        self.shared.notify(Some(EventKind::Position));
        Ok(())
    }

    pub fn enable_loop(&self, enable: bool) -> Result<()> {
        self.require_open()?;
        self.shared.set_loop(enable);
        self.shared.notify(Some(EventKind::Loop));
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        self.require_open()?;
        self.shared.start();
        self.shared.notify(Some(EventKind::Transport));
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.require_open()?;
        self.shared.stop();
        self.shared.notify(Some(EventKind::Transport));
        Ok(())
    }

    /// Set the output gain, 0.0..=2.0
    pub fn set_gain(&self, gain: f32) -> Result<()> {
        self.require_open()?;
        if !(0.0..=2.0).contains(&gain) {
            return Err(Error::InvalidParameter(format!("Gain {} outside 0..=2", gain)));
        }
        self.shared.gain.store(gain);
        self.shared.notify(Some(EventKind::Gain));
        Ok(())
    }

    /// Select the source channel for output A (-1 downmixes even channels)
    pub fn set_track_a(&self, track: i32) -> Result<()> {
        self.require_open()?;
        let track = clamp_track(track, self.shared.file_channels.load(Ordering::Acquire));
        self.shared.track_a.store(track, Ordering::Relaxed);
        self.requeue();
        self.shared.notify(Some(EventKind::TrackA));
        Ok(())
    }

    /// Select the source channel for output B (-1 downmixes odd channels)
    pub fn set_track_b(&self, track: i32) -> Result<()> {
        self.require_open()?;
        let track = clamp_track(track, self.shared.file_channels.load(Ordering::Acquire));
        self.shared.track_b.store(track, Ordering::Relaxed);
        self.requeue();
        self.shared.notify(Some(EventKind::TrackB));
        Ok(())
    }

    /// Select the conversion quality tier (0 = best .. 4 = linear).
    ///
    /// Takes effect from the next seek or loop.
    pub fn set_src_quality(&self, tier: u32) -> Result<()> {
        self.require_open()?;
        let quality = SrcQuality::try_from(tier)?;
        self.shared.quality.store(quality.tier(), Ordering::Relaxed);
        self.shared.notify(Some(EventKind::Quality));
        Ok(())
    }

    /// Samples per streaming block (only while no file is open)
    pub fn set_buffer_size(&self, size: usize) -> Result<()> {
        self.require_closed()?;
        if size == 0 {
            return Err(Error::InvalidParameter("Buffer size must be at least 1".to_string()));
        }
        self.shared.buffer_size.store(size, Ordering::Release);
        Ok(())
    }

    /// Ring capacity in blocks, greater than 1 (only while no file is open)
    pub fn set_buffer_count(&self, count: usize) -> Result<()> {
        self.require_closed()?;
        if count < 2 {
            return Err(Error::InvalidParameter(format!(
                "Buffer count {} must be greater than 1",
                count
            )));
        }
        self.shared.buffer_count.store(count, Ordering::Release);
        Ok(())
    }

    /// Discard queued audio mixed with the old track selection
    fn requeue(&self) {
        self.shared.request_seek(self.shared.position_seconds());
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let mut task = self
            .task
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.unload_locked(&mut task);
    }
}
