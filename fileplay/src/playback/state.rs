//! Per-instance player state shared between control, streaming and render
//!
//! Every field is an atomic with a designated writer; readers tolerate a
//! value that is one update stale. The only bulk data path is the ring
//! channel pair, whose reader half sits behind a mutex that the render
//! callback only ever `try_lock`s.
//!
//! | Field                       | Written by                                   |
//! |-----------------------------|----------------------------------------------|
//! | `lifecycle`                 | control (Opening, Closed), streaming (Open, Failed) |
//! | `transport`                 | control and trigger events (start/stop), render (Playing, Stopped) |
//! | `stream`                    | seek requesters (Seeking), streaming (Loading/Looping/Idle), render at end of file |
//! | `position`                  | render (advance), seek requesters            |
//! | `ratio`, `total_frames`     | seek requesters                              |
//! | `gain`, `loop_enabled`, tracks, quality | control (and CC triggers)        |
//! | `pitch_shift`, `pitch_bend`, `last_note` | render (trigger events)         |
//! | file description fields     | streaming task while opening                 |

use crate::audio::{clamp_track, FileFormat, FileInfo, SrcQuality, DOWNMIX};
use crate::host;
use crate::playback::events::{EventKind, Notifier, Observable};
use crate::playback::ring_channel::RingReader;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Pitch-bend centre value (no bend)
pub const PITCH_BEND_CENTRE: u16 = 0x2000;

/// `last_note` value when no note is holding playback
pub(crate) const NO_NOTE: u8 = 0xFF;

/// File lifecycle of one player instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLifecycle {
    Closed,
    Opening,
    Open,
    Failed,
}

/// Transport (play) state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Starting,
    Playing,
    Stopping,
}

/// Streaming task read state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Idle,
    Seeking,
    Loading,
    Looping,
}

impl std::fmt::Display for FileLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileLifecycle::Closed => write!(f, "closed"),
            FileLifecycle::Opening => write!(f, "opening"),
            FileLifecycle::Open => write!(f, "open"),
            FileLifecycle::Failed => write!(f, "failed"),
        }
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "stopped"),
            TransportState::Starting => write!(f, "starting"),
            TransportState::Playing => write!(f, "playing"),
            TransportState::Stopping => write!(f, "stopping"),
        }
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamStatus::Idle => write!(f, "idle"),
            StreamStatus::Seeking => write!(f, "seeking"),
            StreamStatus::Loading => write!(f, "loading"),
            StreamStatus::Looping => write!(f, "looping"),
        }
    }
}

/// Mapping between a state enum and its atomic byte representation
pub(crate) trait AtomicRepr: Copy {
    fn to_u8(self) -> u8;
    fn from_u8(value: u8) -> Self;
}

impl AtomicRepr for FileLifecycle {
    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => FileLifecycle::Opening,
            2 => FileLifecycle::Open,
            3 => FileLifecycle::Failed,
            _ => FileLifecycle::Closed,
        }
    }
}

impl AtomicRepr for TransportState {
    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => TransportState::Starting,
            2 => TransportState::Playing,
            3 => TransportState::Stopping,
            _ => TransportState::Stopped,
        }
    }
}

impl AtomicRepr for StreamStatus {
    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => StreamStatus::Seeking,
            2 => StreamStatus::Loading,
            3 => StreamStatus::Looping,
            _ => StreamStatus::Idle,
        }
    }
}

/// Lock-free cell holding a small state enum
pub(crate) struct AtomicState<T> {
    value: AtomicU8,
    _marker: PhantomData<T>,
}

impl<T: AtomicRepr> AtomicState<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: AtomicU8::new(initial.to_u8()),
            _marker: PhantomData,
        }
    }

    pub fn load(&self) -> T {
        T::from_u8(self.value.load(Ordering::Acquire))
    }

    pub fn store(&self, state: T) {
        self.value.store(state.to_u8(), Ordering::Release);
    }

    /// Transition `current -> new` only if nobody changed the state meanwhile
    pub fn transition(&self, current: T, new: T) -> bool {
        self.value
            .compare_exchange(current.to_u8(), new.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// f32 stored as bits in an AtomicU32
pub(crate) struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// f64 stored as bits in an AtomicU64
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Description of the open file, read only off the real-time path
#[derive(Debug, Clone)]
pub(crate) struct OpenFile {
    pub path: PathBuf,
    pub format: FileFormat,
}

/// State of one player instance, shared by the control surface, its
/// streaming task and its renderer.
pub(crate) struct PlayerShared {
    pub handle: usize,

    pub lifecycle: AtomicState<FileLifecycle>,
    pub transport: AtomicState<TransportState>,
    pub stream: AtomicState<StreamStatus>,

    pub loop_enabled: AtomicBool,
    pub gain: AtomicF32,
    pub track_a: AtomicI32,
    pub track_b: AtomicI32,
    pub quality: AtomicU8,
    pub buffer_size: AtomicUsize,
    pub buffer_count: AtomicUsize,

    /// Play position in converted (output-rate) frames
    pub position: AtomicU64,
    /// File length in converted frames at the current ratio
    pub total_frames: AtomicU64,
    /// Effective resample ratio (host rate / file rate, pitch-shifted)
    pub ratio: AtomicF64,

    pub pitch_shift: AtomicI32,
    pub pitch_bend: AtomicU16,
    pub last_note: AtomicU8,

    pub file_sample_rate: AtomicU32,
    pub file_channels: AtomicUsize,
    pub file_frames: AtomicU64,
    pub file: Mutex<Option<OpenFile>>,
    pub last_error: Mutex<Option<String>>,

    /// Consumer half of the ring channel pair; present iff the file is open
    pub reader: Mutex<Option<RingReader>>,
    pub notifier: Notifier,
    pub renderer_claimed: AtomicBool,
}

/// Lock a non-real-time mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PlayerShared {
    pub fn new(
        handle: usize,
        buffer_size: usize,
        buffer_count: usize,
        quality: SrcQuality,
        notifier: Notifier,
    ) -> Self {
        Self {
            handle,
            lifecycle: AtomicState::new(FileLifecycle::Closed),
            transport: AtomicState::new(TransportState::Stopped),
            stream: AtomicState::new(StreamStatus::Idle),
            loop_enabled: AtomicBool::new(false),
            gain: AtomicF32::new(1.0),
            track_a: AtomicI32::new(DOWNMIX),
            track_b: AtomicI32::new(DOWNMIX),
            quality: AtomicU8::new(quality.tier()),
            buffer_size: AtomicUsize::new(buffer_size),
            buffer_count: AtomicUsize::new(buffer_count),
            position: AtomicU64::new(0),
            total_frames: AtomicU64::new(0),
            ratio: AtomicF64::new(1.0),
            pitch_shift: AtomicI32::new(0),
            pitch_bend: AtomicU16::new(PITCH_BEND_CENTRE),
            last_note: AtomicU8::new(NO_NOTE),
            file_sample_rate: AtomicU32::new(0),
            file_channels: AtomicUsize::new(0),
            file_frames: AtomicU64::new(0),
            file: Mutex::new(None),
            last_error: Mutex::new(None),
            reader: Mutex::new(None),
            notifier,
            renderer_claimed: AtomicBool::new(false),
        }
    }

    pub fn is_open(&self) -> bool {
        self.lifecycle.load() == FileLifecycle::Open
    }

    pub fn quality(&self) -> SrcQuality {
        SrcQuality::try_from(self.quality.load(Ordering::Relaxed) as u32).unwrap_or_default()
    }

    /// Clear per-file fields ahead of a new load
    pub fn reset_for_load(&self) {
        self.transport.store(TransportState::Stopped);
        self.stream.store(StreamStatus::Idle);
        self.track_a.store(DOWNMIX, Ordering::Relaxed);
        self.track_b.store(DOWNMIX, Ordering::Relaxed);
        self.position.store(0, Ordering::Release);
        self.total_frames.store(0, Ordering::Release);
        self.ratio.store(1.0);
        self.pitch_shift.store(0, Ordering::Relaxed);
        self.pitch_bend.store(PITCH_BEND_CENTRE, Ordering::Relaxed);
        self.last_note.store(NO_NOTE, Ordering::Relaxed);
        *lock(&self.last_error) = None;
    }

    /// Publish the description of a freshly opened file.
    ///
    /// Track selectors are clamped to the channel count (mono forces 0).
    /// Leaves the stream in `Seeking` so the task's first pass cues frame 0.
    pub fn install_file(&self, path: PathBuf, info: &FileInfo) {
        self.file_sample_rate.store(info.sample_rate, Ordering::Release);
        self.file_channels.store(info.channels, Ordering::Release);
        self.file_frames.store(info.frames, Ordering::Release);
        for track in [&self.track_a, &self.track_b] {
            let clamped = clamp_track(track.load(Ordering::Relaxed), info.channels);
            track.store(clamped, Ordering::Relaxed);
        }
        *lock(&self.file) = Some(OpenFile {
            path,
            format: info.format.clone(),
        });
        self.request_seek(0.0);
    }

    /// Forget the file description when the streaming task exits
    pub fn clear_file(&self) {
        *lock(&self.file) = None;
        self.file_sample_rate.store(0, Ordering::Release);
        self.file_channels.store(0, Ordering::Release);
        self.file_frames.store(0, Ordering::Release);
        self.position.store(0, Ordering::Release);
        self.total_frames.store(0, Ordering::Release);
    }

    /// File duration in seconds at its native rate
    pub fn duration(&self) -> f32 {
        let rate = self.file_sample_rate.load(Ordering::Acquire);
        if rate == 0 {
            return 0.0;
        }
        (self.file_frames.load(Ordering::Acquire) as f64 / rate as f64) as f32
    }

    /// Ratio the next seek will use: current host rate over file rate,
    /// scaled by the pitch shift.
    pub fn target_ratio(&self) -> f64 {
        let file_rate = self.file_sample_rate.load(Ordering::Acquire);
        if file_rate == 0 {
            return 1.0;
        }
        let base = host::sample_rate() as f64 / file_rate as f64;
        let shift = self.pitch_shift.load(Ordering::Relaxed);
        if shift == 0 {
            base
        } else {
            base * 2f64.powf(shift as f64 / 12.0)
        }
    }

    /// Play position in seconds of the file
    pub fn position_seconds(&self) -> f32 {
        let rate = self.file_sample_rate.load(Ordering::Acquire);
        let ratio = self.ratio.load();
        if rate == 0 || ratio <= 0.0 {
            return 0.0;
        }
        (self.position.load(Ordering::Acquire) as f64 / ratio / rate as f64) as f32
    }

    /// Ask the streaming task to re-cue at `seconds`.
    ///
    /// Recomputes the effective ratio and converted length first, then
    /// publishes the clamped target position and finally raises `Seeking`.
    /// Real-time safe: no locks, no allocation.
    pub fn request_seek(&self, seconds: f32) {
        let rate = self.file_sample_rate.load(Ordering::Acquire);
        let ratio = self.target_ratio();
        let total = (self.file_frames.load(Ordering::Acquire) as f64 * ratio) as u64;

        let duration = self.duration();
        let seconds = if seconds.is_finite() { seconds.clamp(0.0, duration) } else { 0.0 };
        let mut frames = (ratio * seconds as f64 * rate as f64) as u64;
        if total > 0 && frames >= total {
            frames = total - 1;
        }

        self.ratio.store(ratio);
        self.total_frames.store(total, Ordering::Release);
        self.position.store(frames, Ordering::Release);
        self.stream.store(StreamStatus::Seeking);
    }

    /// Begin playback (fades in once the stream has settled)
    pub fn start(&self) {
        if self.transport.load() != TransportState::Playing {
            self.transport.store(TransportState::Starting);
        }
    }

    /// Request a stop; the renderer fades out over its next block
    pub fn stop(&self) {
        if self.transport.load() != TransportState::Stopped {
            self.transport.store(TransportState::Stopping);
        }
    }

    /// Change loop mode, re-arming an idle stream so it reads from the start
    pub fn set_loop(&self, enable: bool) {
        self.loop_enabled.store(enable, Ordering::Release);
        if enable && self.is_open() {
            self.stream.transition(StreamStatus::Idle, StreamStatus::Looping);
        }
    }

    /// Run a notification pass (all fields, or just `only`) while open
    pub fn notify(&self, only: Option<EventKind>) {
        if self.is_open() {
            self.notifier.dispatch(self.handle, &self.observable(), only);
        }
    }

    /// Snapshot of the externally observable fields for notification
    pub fn observable(&self) -> Observable {
        Observable {
            transport: self.transport.load(),
            position: self.position_seconds(),
            gain: self.gain.load(),
            loop_enabled: self.loop_enabled.load(Ordering::Relaxed),
            track_a: self.track_a.load(Ordering::Relaxed),
            track_b: self.track_b.load(Ordering::Relaxed),
            quality: self.quality(),
            debug: host::is_debug(),
        }
    }
}
