//! File streaming task
//!
//! One background thread per loaded player. It opens the file, publishes
//! its description, then runs the seek/load/loop state machine until the
//! control surface sets the lifecycle away from `Open`:
//!
//! - `Seeking`: clear the ring channels, seek the file to the requested
//!   position (converted frames / effective ratio), re-prime the converter.
//! - `Looping`: seek the file to frame 0, re-prime the converter.
//! - `Loading`: read one block, convert, downmix to A/B and push into the
//!   ring channels, sleeping while they are full.
//! - `Idle`: nothing to read.
//!
//! Every wait re-checks the lifecycle, so `unload` never has to wait more
//! than one poll interval for the task to exit.

use crate::audio::{downmix, Converter, FileReader};
use crate::error::{Error, Result};
use crate::host;
use crate::playback::ring_channel::{ring_channel, RingWriter};
use crate::playback::state::{lock, FileLifecycle, PlayerShared, StreamStatus, TransportState};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

static ACTIVE_TASKS: AtomicUsize = AtomicUsize::new(0);

/// Number of streaming tasks currently alive in this process
pub fn active_streaming_tasks() -> usize {
    ACTIVE_TASKS.load(Ordering::Acquire)
}

/// Counts a task from spawn until its thread finishes
struct TaskGuard;

impl TaskGuard {
    fn new() -> Self {
        ACTIVE_TASKS.fetch_add(1, Ordering::AcqRel);
        Self
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        ACTIVE_TASKS.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Start the streaming task for `path`. The player must be `Opening`.
pub(crate) fn spawn(shared: Arc<PlayerShared>, path: PathBuf, poll: Duration) -> Result<JoinHandle<()>> {
    let guard = TaskGuard::new();
    thread::Builder::new()
        .name(format!("fileplay-stream-{}", shared.handle))
        .spawn(move || {
            let _guard = guard;
            run(&shared, &path, poll);
        })
        .map_err(|e| Error::TaskCreation(format!("Failed to spawn streaming task: {}", e)))
}

fn run(shared: &PlayerShared, path: &Path, poll: Duration) {
    let file = match FileReader::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!("Player {}: failed to open {}: {}", shared.handle, path.display(), e);
            *lock(&shared.last_error) = Some(e.to_string());
            shared.lifecycle.transition(FileLifecycle::Opening, FileLifecycle::Failed);
            return;
        }
    };

    let info = file.info().clone();
    let buffer_size = shared.buffer_size.load(Ordering::Acquire);
    let buffer_count = shared.buffer_count.load(Ordering::Acquire);
    let (writer, reader) = ring_channel(buffer_size * buffer_count);

    shared.install_file(path.to_path_buf(), &info);
    shared.transport.store(TransportState::Stopped);
    *lock(&shared.reader) = Some(reader);

    if shared.lifecycle.transition(FileLifecycle::Opening, FileLifecycle::Open) {
        info!(
            "Player {}: opened {} ({} Hz, {} channels, {:.3}s, ratio {:.6})",
            shared.handle,
            path.display(),
            info.sample_rate,
            info.channels,
            info.duration(),
            shared.ratio.load()
        );
        let mut streamer = Streamer::new(shared, file, writer, buffer_size, poll);
        streamer.run();
    } else {
        debug!("Player {}: unloaded while opening", shared.handle);
    }

    shared.transport.store(TransportState::Stopped);
    *lock(&shared.reader) = None;
    shared.clear_file();
    shared.notifier.set_target(None);
    debug!("Player {}: streaming task ended", shared.handle);
}

/// Working state of an open streaming task
struct Streamer<'a> {
    shared: &'a PlayerShared,
    file: FileReader,
    writer: RingWriter,
    converter: Option<Converter>,
    channels: usize,
    /// Input frames read per block
    block_frames: usize,
    poll: Duration,
    input: Vec<f32>,
    converted: Vec<f32>,
    out_a: Vec<f32>,
    out_b: Vec<f32>,
}

impl<'a> Streamer<'a> {
    fn new(shared: &'a PlayerShared, file: FileReader, writer: RingWriter, buffer_size: usize, poll: Duration) -> Self {
        let channels = file.info().channels;
        let block_frames = (buffer_size / channels).max(1);
        Self {
            shared,
            file,
            writer,
            converter: None,
            channels,
            block_frames,
            poll,
            input: Vec::with_capacity(block_frames * channels),
            converted: Vec::new(),
            out_a: Vec::new(),
            out_b: Vec::new(),
        }
    }

    fn run(&mut self) {
        while self.shared.is_open() {
            match self.shared.stream.load() {
                StreamStatus::Seeking => self.seek(),
                StreamStatus::Looping => self.rewind(),
                StreamStatus::Loading | StreamStatus::Idle => {}
            }

            if self.shared.stream.load() == StreamStatus::Loading {
                self.load_block();
            }

            thread::sleep(self.poll);
            self.shared.notify(None);
        }
    }

    /// Honour a seek request
    fn seek(&mut self) {
        {
            // Holding the reader lock keeps the renderer off the ring while
            // it is cleared
            let mut reader = lock(&self.shared.reader);
            if !self.shared.stream.transition(StreamStatus::Seeking, StreamStatus::Loading) {
                return;
            }
            if let Some(reader) = reader.as_mut() {
                reader.clear();
            }
        }

        let ratio = self.shared.ratio.load();
        let position = self.shared.position.load(Ordering::Acquire);
        let frame = (position as f64 / ratio) as u64;
        if host::is_debug() {
            debug!(
                "Player {}: seeking to frame {} ({:.3}s), ratio {:.6}",
                self.shared.handle,
                frame,
                self.shared.position_seconds(),
                ratio
            );
        }
        if let Err(e) = self.file.seek(frame) {
            warn!("Player {}: seek to frame {} failed: {}", self.shared.handle, frame, e);
        }
        self.prepare_converter(ratio);
    }

    /// Restart reading from the top of the file
    fn rewind(&mut self) {
        if !self.shared.stream.transition(StreamStatus::Looping, StreamStatus::Loading) {
            return;
        }
        if host::is_debug() {
            debug!("Player {}: looping to start of file", self.shared.handle);
        }
        if let Err(e) = self.file.seek(0) {
            warn!("Player {}: rewind failed: {}", self.shared.handle, e);
        }
        self.prepare_converter(self.shared.ratio.load());
    }

    /// Reuse the converter when it still fits, otherwise build a new one.
    ///
    /// Without a converter the stream goes idle; the renderer then plays
    /// silence instead of audio at the wrong rate.
    fn prepare_converter(&mut self, ratio: f64) {
        let quality = self.shared.quality();
        match self.converter.as_mut() {
            Some(converter) if converter.matches(quality, ratio, self.channels) => converter.reset(),
            _ => {
                self.converter = match Converter::new(quality, ratio, self.channels) {
                    Ok(converter) => Some(converter),
                    Err(e) => {
                        error!("Player {}: cannot create converter: {}", self.shared.handle, e);
                        self.shared.stream.transition(StreamStatus::Loading, StreamStatus::Idle);
                        None
                    }
                };
            }
        }
    }

    fn load_block(&mut self) {
        let Some(converter) = self.converter.as_mut() else {
            return;
        };

        self.input.clear();
        let read = self.file.read_frames(&mut self.input, self.block_frames);
        let end_of_input = read < self.block_frames;
        if host::is_debug() {
            trace!("Player {}: read {} frames", self.shared.handle, read);
        }

        self.converted.clear();
        if let Err(e) = converter.process(&self.input, end_of_input, &mut self.converted) {
            warn!("Player {}: conversion failed: {}", self.shared.handle, e);
            self.converted.clear();
        }

        self.out_a.clear();
        self.out_b.clear();
        downmix(
            &self.converted,
            self.channels,
            self.shared.track_a.load(Ordering::Relaxed),
            self.shared.track_b.load(Ordering::Relaxed),
            &mut self.out_a,
            &mut self.out_b,
        );

        self.write_out();

        // Only leave Loading once the last block is queued, so the renderer
        // cannot mistake a not-yet-written tail for the end of the file
        if end_of_input {
            let next = if self.shared.loop_enabled.load(Ordering::Acquire) {
                StreamStatus::Looping
            } else {
                StreamStatus::Idle
            };
            if self.shared.stream.transition(StreamStatus::Loading, next) && host::is_debug() {
                debug!("Player {}: end of input, stream {}", self.shared.handle, next);
            }
        }
    }

    /// Push the A/B block into the ring channels, waiting for space.
    ///
    /// Gives up if the file is closed or a new seek supersedes the block.
    fn write_out(&mut self) {
        let total = self.out_a.len();
        let mut offset = 0;
        while offset < total {
            if !self.shared.is_open() || self.shared.stream.load() == StreamStatus::Seeking {
                return;
            }
            offset += self.writer.write(&self.out_a[offset..], &self.out_b[offset..]);
            if offset < total {
                self.shared.notify(None);
                thread::sleep(self.poll);
            }
        }
    }
}
