//! MIDI-style trigger events handled by the render callback
//!
//! Note-on retriggers the file from the start, pitch-shifted by the
//! distance from the reference note. Note-off of the note that triggered
//! playback stops it. Pitch bend is recorded only. Continuous controllers
//! 1, 7, 68 and 69 optionally map to position, gain, transport and loop.
//!
//! Everything here runs on the real-time thread: atomics only.

use crate::playback::state::{PlayerShared, NO_NOTE};
use std::sync::atomic::Ordering;

/// CC number mapped to play position (value scales over the file duration)
pub const CC_POSITION: u8 = 1;
/// CC number mapped to gain (value / 100)
pub const CC_GAIN: u8 = 7;
/// CC number mapped to transport (> 63 starts, otherwise stops)
pub const CC_TRANSPORT: u8 = 68;
/// CC number mapped to loop mode (> 63 enables)
pub const CC_LOOP: u8 = 69;

/// One decoded trigger event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// 14-bit bend value, centre 8192
    PitchBend { channel: u8, value: u16 },
    Control { channel: u8, controller: u8, value: u8 },
}

impl TriggerEvent {
    /// Decode a raw MIDI channel message. Other messages yield `None`.
    pub fn from_midi(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        let channel = status & 0x0F;
        let data1 = *data.first()? & 0x7F;
        let data2 = data.get(1).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(TriggerEvent::NoteOff {
                channel,
                note: data1,
                velocity: data2?,
            }),
            0x90 => Some(TriggerEvent::NoteOn {
                channel,
                note: data1,
                velocity: data2?,
            }),
            0xB0 => Some(TriggerEvent::Control {
                channel,
                controller: data1,
                value: data2?,
            }),
            0xE0 => Some(TriggerEvent::PitchBend {
                channel,
                value: data1 as u16 | (data2? as u16) << 7,
            }),
            _ => None,
        }
    }
}

/// Apply one trigger event to a player
pub(crate) fn apply(shared: &PlayerShared, event: TriggerEvent, reference_note: u8, cc_mapping: bool) {
    match event {
        TriggerEvent::NoteOff { note, .. } | TriggerEvent::NoteOn { note, velocity: 0, .. } => {
            if shared.last_note.load(Ordering::Relaxed) == note {
                shared.stop();
                shared.pitch_shift.store(0, Ordering::Relaxed);
                shared.last_note.store(NO_NOTE, Ordering::Relaxed);
            }
        }
        TriggerEvent::NoteOn { note, .. } => {
            shared.stop();
            shared
                .pitch_shift
                .store(reference_note as i32 - note as i32, Ordering::Relaxed);
            shared.request_seek(0.0);
            shared.start();
            shared.last_note.store(note, Ordering::Relaxed);
        }
        TriggerEvent::PitchBend { value, .. } => {
            shared.pitch_bend.store(value, Ordering::Relaxed);
        }
        TriggerEvent::Control { controller, value, .. } if cc_mapping => match controller {
            CC_POSITION => shared.request_seek(value as f32 * shared.duration() / 127.0),
            CC_GAIN => shared.gain.store(value as f32 / 100.0),
            CC_TRANSPORT => {
                if value > 63 {
                    shared.start();
                } else {
                    shared.stop();
                }
            }
            CC_LOOP => shared.set_loop(value > 63),
            _ => {}
        },
        TriggerEvent::Control { .. } => {}
    }
}
