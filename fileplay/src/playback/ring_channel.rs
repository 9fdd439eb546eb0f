//! Ring channel pair: lock-free SPSC handoff from streaming task to render
//!
//! Two fixed-capacity ringbuf queues carry the converted A and B sample
//! streams. The streaming task owns the [`RingWriter`]; the render callback
//! drains the [`RingReader`]. Both sides are wait-free: the writer reports
//! how much it could write instead of blocking, and the reader returns how
//! much was available so the caller can zero-fill the rest.
//!
//! The writer always pushes equal amounts into A and B, so the two queues
//! stay frame-aligned and the reader takes the same count from each.

use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use tracing::debug;

/// Create a ring channel pair holding `capacity` samples per channel
pub fn ring_channel(capacity: usize) -> (RingWriter, RingReader) {
    let capacity = capacity.max(1);
    debug!("Creating ring channel pair: capacity={} samples per channel", capacity);

    let (prod_a, cons_a) = HeapRb::<f32>::new(capacity).split();
    let (prod_b, cons_b) = HeapRb::<f32>::new(capacity).split();

    (
        RingWriter {
            a: prod_a,
            b: prod_b,
            capacity,
        },
        RingReader {
            a: cons_a,
            b: cons_b,
            capacity,
        },
    )
}

/// Producer half (streaming task)
pub struct RingWriter {
    a: HeapProd<f32>,
    b: HeapProd<f32>,
    capacity: usize,
}

impl RingWriter {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames that can be written to both channels right now
    pub fn vacant(&self) -> usize {
        self.a.vacant_len().min(self.b.vacant_len())
    }

    /// Write as many frames of the A/B pair as currently fit.
    ///
    /// Returns the number of frames written to each channel.
    pub fn write(&mut self, a: &[f32], b: &[f32]) -> usize {
        let frames = a.len().min(b.len()).min(self.vacant());
        if frames == 0 {
            return 0;
        }
        let written_a = self.a.push_slice(&a[..frames]);
        let written_b = self.b.push_slice(&b[..written_a]);
        debug_assert_eq!(written_a, written_b);
        written_b
    }
}

/// Consumer half (render callback)
pub struct RingReader {
    a: HeapCons<f32>,
    b: HeapCons<f32>,
    capacity: usize,
}

impl RingReader {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames available in both channels
    pub fn available(&self) -> usize {
        self.a.occupied_len().min(self.b.occupied_len())
    }

    /// True when channel A holds no samples
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// Drain up to `min(out_a.len(), out_b.len())` frames into the outputs.
    ///
    /// Never blocks. Returns the frame count read; the remainder of the
    /// output slices is left untouched.
    pub fn read(&mut self, out_a: &mut [f32], out_b: &mut [f32]) -> usize {
        let frames = out_a.len().min(out_b.len()).min(self.available());
        if frames == 0 {
            return 0;
        }
        let read = self.a.pop_slice(&mut out_a[..frames]);
        self.b.pop_slice(&mut out_b[..read])
    }

    /// Discard everything queued in both channels.
    ///
    /// Only the streaming task calls this, at a seek, while holding the
    /// reader lock so no render is draining concurrently.
    pub fn clear(&mut self) {
        self.a.clear();
        self.b.clear();
    }
}
