//! Test helpers for fileplay integration tests
//!
//! - audio_generator: deterministic WAV fixtures
//! - render driving and polling utilities

#![allow(dead_code)]

pub mod audio_generator;

pub use audio_generator::{generate_constant_wav, generate_sine_wav};

use fileplay::{EngineConfig, Renderer};
use std::time::{Duration, Instant};

/// Host rate every integration test runs at
pub const HOST_RATE: u32 = 44100;

/// Engine settings with small buffers so tests move quickly
pub fn test_config() -> EngineConfig {
    EngineConfig {
        buffer_size: 4096,
        buffer_count: 4,
        ..EngineConfig::default()
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Render one block of `frames` frames
pub fn render_block(renderer: &mut Renderer, frames: usize) -> (Vec<f32>, Vec<f32>) {
    let mut a = vec![0.0; frames];
    let mut b = vec![0.0; frames];
    renderer.process(&mut a, &mut b, &[]);
    (a, b)
}

/// Render blocks until one starts with audible samples on output A.
///
/// Returns that block, or `None` on timeout.
pub fn render_until_audible(
    renderer: &mut Renderer,
    frames: usize,
    timeout: Duration,
) -> Option<(Vec<f32>, Vec<f32>)> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let (a, b) = render_block(renderer, frames);
        if a[0] != 0.0 {
            return Some((a, b));
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    None
}

/// Render until `done` holds, collecting every audible A sample
pub fn render_collect(
    renderer: &mut Renderer,
    frames: usize,
    timeout: Duration,
    mut done: impl FnMut() -> bool,
) -> Vec<f32> {
    let deadline = Instant::now() + timeout;
    let mut collected = Vec::new();
    while Instant::now() < deadline && !done() {
        let (a, _) = render_block(renderer, frames);
        collected.extend(a.into_iter().filter(|s| *s != 0.0));
        std::thread::sleep(Duration::from_millis(1));
    }
    collected
}
