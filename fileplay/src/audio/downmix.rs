//! Multi-channel to A/B downmix
//!
//! A negative track selector averages a parity group of source channels:
//! A takes the even-indexed channels (0, 2, 4, ...), B the odd-indexed ones
//! (1, 3, 5, ...). A non-negative selector copies that single channel. Mono
//! sources feed half the sample to both outputs.

/// Track selector value meaning "average the parity group"
pub const DOWNMIX: i32 = -1;

/// Split interleaved `samples` into the A and B output streams, appending
/// one sample per frame to each.
pub fn downmix(
    samples: &[f32],
    channels: usize,
    track_a: i32,
    track_b: i32,
    out_a: &mut Vec<f32>,
    out_b: &mut Vec<f32>,
) {
    if channels == 0 {
        return;
    }
    let frames = samples.len() / channels;
    out_a.reserve(frames);
    out_b.reserve(frames);

    if channels == 1 {
        for sample in samples {
            out_a.push(sample * 0.5);
            out_b.push(sample * 0.5);
        }
        return;
    }

    for frame in samples.chunks_exact(channels) {
        out_a.push(select(frame, track_a, 0));
        out_b.push(select(frame, track_b, 1));
    }
}

/// Clamp a requested track index to what a file with `channels` channels
/// offers. Mono files always select track 0.
pub fn clamp_track(track: i32, channels: usize) -> i32 {
    if channels <= 1 {
        return 0;
    }
    if track < 0 {
        return DOWNMIX;
    }
    track.min(channels as i32 - 1)
}

fn select(frame: &[f32], track: i32, parity: usize) -> f32 {
    if track >= 0 {
        let index = (track as usize).min(frame.len() - 1);
        return frame[index];
    }

    let mut sum = 0.0;
    let mut count = 0;
    for sample in frame.iter().skip(parity).step_by(2) {
        sum += sample;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}
