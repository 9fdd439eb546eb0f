//! Real-time render callback
//!
//! A [`Renderer`] is the host-facing half of a player: the audio thread
//! calls [`Renderer::process`] once per block. It never blocks, sleeps,
//! allocates or performs I/O. The ring channel reader is only reached with
//! `try_lock`; if the streaming task happens to hold it (installing it, or
//! clearing it at a seek) the block renders as silence.

use crate::host;
use crate::playback::state::{PlayerShared, StreamStatus, TransportState};
use crate::playback::trigger::{self, TriggerEvent};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::trace;

/// Render endpoint for one player. At most one exists per player.
pub struct Renderer {
    shared: Arc<PlayerShared>,
    reference_note: u8,
    cc_mapping: bool,
}

impl Renderer {
    pub(crate) fn new(shared: Arc<PlayerShared>, reference_note: u8, cc_mapping: bool) -> Self {
        Self {
            shared,
            reference_note,
            cc_mapping,
        }
    }

    /// Handle of the player this renderer drives
    pub fn handle(&self) -> usize {
        self.shared.handle
    }

    /// Produce one block into `out_a` / `out_b`, then apply `events`.
    ///
    /// Both outputs are fully written: drained audio first, silence after.
    /// The block size is the shorter of the two slices.
    pub fn process(&mut self, out_a: &mut [f32], out_b: &mut [f32], events: &[TriggerEvent]) {
        let shared = &*self.shared;
        if !shared.is_open() {
            out_a.fill(0.0);
            out_b.fill(0.0);
            return;
        }

        let frames = out_a.len().min(out_b.len());
        let stream = shared.stream.load();

        if stream != StreamStatus::Seeking {
            shared
                .transport
                .transition(TransportState::Starting, TransportState::Playing);
        }

        let transport = shared.transport.load();
        let mut count = 0;
        let mut eof = false;

        if matches!(transport, TransportState::Playing | TransportState::Stopping)
            && stream != StreamStatus::Seeking
        {
            if let Ok(mut guard) = shared.reader.try_lock() {
                if let Some(reader) = guard.as_mut() {
                    count = reader.read(&mut out_a[..frames], &mut out_b[..frames]);
                    eof = shared.stream.load() == StreamStatus::Idle && reader.is_empty();
                }
            }
        }

        let gain = shared.gain.load();
        for (a, b) in out_a[..count].iter_mut().zip(out_b[..count].iter_mut()) {
            *a *= gain;
            *b *= gain;
        }

        if count > 0 {
            let total = shared.total_frames.load(Ordering::Acquire);
            let _ = shared
                .position
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |position| {
                    let next = position + count as u64;
                    Some(if total == 0 { 0 } else { next % total })
                });
        }

        if transport == TransportState::Stopping || (transport == TransportState::Playing && eof) {
            // Fade whatever was drained so the stop does not click
            let step = 1.0 / count.max(1) as f32;
            for (i, (a, b)) in out_a[..count].iter_mut().zip(out_b[..count].iter_mut()).enumerate() {
                let fade = 1.0 - i as f32 * step;
                *a *= fade;
                *b *= fade;
            }
            shared.transport.transition(transport, TransportState::Stopped);
            if eof {
                shared.position.store(0, Ordering::Release);
                shared.stream.transition(StreamStatus::Idle, StreamStatus::Seeking);
            }
            if host::is_debug() {
                trace!(
                    handle = shared.handle,
                    eof,
                    "Stopped: faded {} of {} frames, silencing the rest",
                    count,
                    frames
                );
            }
        }

        out_a[count..].fill(0.0);
        out_b[count..].fill(0.0);

        for &event in events {
            trigger::apply(shared, event, self.reference_note, self.cc_mapping);
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shared.renderer_claimed.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SrcQuality;
    use crate::config::EngineConfig;
    use crate::playback::events::Notifier;
    use crate::playback::ring_channel::{ring_channel, RingWriter};
    use crate::playback::state::{FileLifecycle, NO_NOTE};

    /// A player that looks open to the renderer, fed directly by the test
    fn open_player(frames: u64) -> (Arc<PlayerShared>, RingWriter, Renderer) {
        let config = EngineConfig::default();
        let shared = Arc::new(PlayerShared::new(
            0,
            256,
            4,
            SrcQuality::default(),
            Notifier::new(&config),
        ));
        let (writer, reader) = ring_channel(1024);
        *shared.reader.lock().unwrap() = Some(reader);
        shared.file_sample_rate.store(host::sample_rate(), Ordering::Release);
        shared.file_channels.store(2, Ordering::Release);
        shared.file_frames.store(frames, Ordering::Release);
        shared.total_frames.store(frames, Ordering::Release);
        shared.stream.store(StreamStatus::Loading);
        shared.lifecycle.store(FileLifecycle::Open);

        let renderer = Renderer::new(Arc::clone(&shared), 60, true);
        (shared, writer, renderer)
    }

    #[test]
    fn test_closed_player_renders_silence() {
        let (shared, mut writer, mut renderer) = open_player(1000);
        writer.write(&[0.5; 8], &[0.5; 8]);
        shared.transport.store(TransportState::Playing);
        shared.lifecycle.store(FileLifecycle::Closed);

        let mut a = [9.0; 8];
        let mut b = [9.0; 8];
        renderer.process(&mut a, &mut b, &[]);
        assert_eq!(a, [0.0; 8]);
        assert_eq!(b, [0.0; 8]);
    }

    #[test]
    fn test_stopped_player_leaves_ring_untouched() {
        let (_shared, mut writer, mut renderer) = open_player(1000);
        writer.write(&[0.5; 8], &[0.5; 8]);

        let mut a = [9.0; 8];
        let mut b = [9.0; 8];
        renderer.process(&mut a, &mut b, &[]);
        assert_eq!(a, [0.0; 8]);
        assert_eq!(writer.vacant(), 1024 - 8);
    }

    #[test]
    fn test_start_waits_for_seek_to_settle() {
        let (shared, mut writer, mut renderer) = open_player(1000);
        writer.write(&[0.5; 8], &[0.5; 8]);
        shared.stream.store(StreamStatus::Seeking);
        shared.start();

        let mut a = [0.0; 4];
        let mut b = [0.0; 4];
        renderer.process(&mut a, &mut b, &[]);
        assert_eq!(shared.transport.load(), TransportState::Starting);
        assert_eq!(a, [0.0; 4]);

        shared.stream.store(StreamStatus::Loading);
        renderer.process(&mut a, &mut b, &[]);
        assert_eq!(shared.transport.load(), TransportState::Playing);
        assert_eq!(a, [0.5; 4]);
    }

    #[test]
    fn test_gain_and_position_advance() {
        let (shared, mut writer, mut renderer) = open_player(10);
        writer.write(&[0.5; 16], &[-0.25; 16]);
        shared.gain.store(2.0);
        shared.transport.store(TransportState::Playing);

        let mut a = [0.0; 6];
        let mut b = [0.0; 6];
        renderer.process(&mut a, &mut b, &[]);
        assert_eq!(a, [1.0; 6]);
        assert_eq!(b, [-0.5; 6]);
        assert_eq!(shared.position.load(Ordering::Acquire), 6);

        renderer.process(&mut a, &mut b, &[]);
        assert_eq!(shared.position.load(Ordering::Acquire), 2);
    }

    #[test]
    fn test_underrun_zero_fills_shortfall() {
        let (shared, mut writer, mut renderer) = open_player(1000);
        writer.write(&[0.5; 3], &[0.5; 3]);
        shared.transport.store(TransportState::Playing);

        let mut a = [9.0; 8];
        let mut b = [9.0; 8];
        renderer.process(&mut a, &mut b, &[]);
        assert_eq!(a, [0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(shared.transport.load(), TransportState::Playing);
    }

    #[test]
    fn test_stop_fades_block_then_stops() {
        let (shared, mut writer, mut renderer) = open_player(1000);
        writer.write(&[1.0; 4], &[1.0; 4]);
        shared.transport.store(TransportState::Playing);
        shared.stop();

        let mut a = [0.0; 4];
        let mut b = [0.0; 4];
        renderer.process(&mut a, &mut b, &[]);
        assert_eq!(a, [1.0, 0.75, 0.5, 0.25]);
        assert_eq!(shared.transport.load(), TransportState::Stopped);
    }

    #[test]
    fn test_end_of_file_stops_and_recues() {
        let (shared, mut writer, mut renderer) = open_player(1000);
        writer.write(&[1.0; 2], &[1.0; 2]);
        shared.position.store(500, Ordering::Release);
        shared.stream.store(StreamStatus::Idle);
        shared.transport.store(TransportState::Playing);

        let mut a = [0.0; 4];
        let mut b = [0.0; 4];
        renderer.process(&mut a, &mut b, &[]);
        assert_eq!(a, [1.0, 0.5, 0.0, 0.0]);
        assert_eq!(shared.transport.load(), TransportState::Stopped);
        assert_eq!(shared.position.load(Ordering::Acquire), 0);
        assert_eq!(shared.stream.load(), StreamStatus::Seeking);
    }

    #[test]
    fn test_contended_reader_renders_silence() {
        let (shared, mut writer, mut renderer) = open_player(1000);
        writer.write(&[0.5; 8], &[0.5; 8]);
        shared.transport.store(TransportState::Playing);

        let guard = shared.reader.lock().unwrap();
        let mut a = [9.0; 4];
        let mut b = [9.0; 4];
        renderer.process(&mut a, &mut b, &[]);
        drop(guard);
        assert_eq!(a, [0.0; 4]);
        assert_eq!(writer.vacant(), 1024 - 8);
    }

    #[test]
    #[serial_test::serial]
    fn test_note_on_retriggers_with_pitch_shift() {
        host::set_sample_rate(44100);
        let (shared, _writer, mut renderer) = open_player(1000);
        shared.position.store(400, Ordering::Release);

        let mut a = [0.0; 4];
        let mut b = [0.0; 4];
        let note_on = TriggerEvent::NoteOn {
            channel: 0,
            note: 48,
            velocity: 100,
        };
        renderer.process(&mut a, &mut b, &[note_on]);

        assert_eq!(shared.pitch_shift.load(Ordering::Relaxed), 12);
        assert_eq!(shared.last_note.load(Ordering::Relaxed), 48);
        assert_eq!(shared.position.load(Ordering::Acquire), 0);
        assert_eq!(shared.stream.load(), StreamStatus::Seeking);
        assert_eq!(shared.transport.load(), TransportState::Starting);
        assert!((shared.ratio.load() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_note_off_only_for_triggering_note() {
        let (shared, _writer, mut renderer) = open_player(1000);
        let mut a = [0.0; 4];
        let mut b = [0.0; 4];
        let on = |note| TriggerEvent::NoteOn {
            channel: 0,
            note,
            velocity: 90,
        };
        renderer.process(&mut a, &mut b, &[on(64)]);

        renderer.process(
            &mut a,
            &mut b,
            &[TriggerEvent::NoteOff {
                channel: 0,
                note: 65,
                velocity: 0,
            }],
        );
        assert_eq!(shared.last_note.load(Ordering::Relaxed), 64);
        assert_ne!(shared.transport.load(), TransportState::Stopped);

        // Note-on with velocity 0 counts as note-off
        renderer.process(
            &mut a,
            &mut b,
            &[TriggerEvent::NoteOn {
                channel: 0,
                note: 64,
                velocity: 0,
            }],
        );
        assert_eq!(shared.last_note.load(Ordering::Relaxed), NO_NOTE);
        assert_eq!(shared.pitch_shift.load(Ordering::Relaxed), 0);
        assert_ne!(shared.transport.load(), TransportState::Playing);
    }

    #[test]
    fn test_pitch_bend_is_recorded() {
        let (shared, _writer, mut renderer) = open_player(1000);
        let mut a = [0.0; 2];
        let mut b = [0.0; 2];
        renderer.process(&mut a, &mut b, &[TriggerEvent::PitchBend { channel: 0, value: 100 }]);
        assert_eq!(shared.pitch_bend.load(Ordering::Relaxed), 100);
        assert_eq!(shared.pitch_shift.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_control_change_mapping() {
        let (shared, _writer, mut renderer) = open_player(1000);
        let mut a = [0.0; 2];
        let mut b = [0.0; 2];
        let cc = |controller, value| TriggerEvent::Control {
            channel: 0,
            controller,
            value,
        };

        renderer.process(&mut a, &mut b, &[cc(7, 50)]);
        assert_eq!(shared.gain.load(), 0.5);

        shared.stream.store(StreamStatus::Idle);
        renderer.process(&mut a, &mut b, &[cc(69, 100)]);
        assert!(shared.loop_enabled.load(Ordering::Relaxed));
        assert_eq!(shared.stream.load(), StreamStatus::Looping);

        renderer.process(&mut a, &mut b, &[cc(68, 127)]);
        assert_eq!(shared.transport.load(), TransportState::Starting);

        renderer.process(&mut a, &mut b, &[cc(68, 0)]);
        assert_eq!(shared.transport.load(), TransportState::Stopping);
    }

    #[test]
    fn test_control_change_ignored_without_mapping() {
        let (shared, _writer, renderer) = open_player(1000);
        drop(renderer);
        let mut renderer = Renderer::new(Arc::clone(&shared), 60, false);

        let mut a = [0.0; 2];
        let mut b = [0.0; 2];
        renderer.process(
            &mut a,
            &mut b,
            &[TriggerEvent::Control {
                channel: 0,
                controller: 7,
                value: 10,
            }],
        );
        assert_eq!(shared.gain.load(), 1.0);
    }
}
