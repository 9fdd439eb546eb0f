//! Process-wide host state
//!
//! The host sample rate and the debug flag are the only state shared by all
//! players. Both are best-effort: readers may observe a change a block late,
//! and nothing correctness-critical depends on seeing it immediately.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::info;

/// Host rate assumed until the host reports one
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

static SAMPLE_RATE: AtomicU32 = AtomicU32::new(DEFAULT_SAMPLE_RATE);
static DEBUG: AtomicBool = AtomicBool::new(false);

/// Current host sample rate in Hz
pub fn sample_rate() -> u32 {
    SAMPLE_RATE.load(Ordering::Relaxed)
}

/// Record a new host sample rate. Zero is ignored.
///
/// Open players only pick the new rate up at their next seek; use
/// `PlayerRegistry::set_host_sample_rate` to re-cue them immediately.
pub fn set_sample_rate(rate: u32) {
    if rate == 0 {
        return;
    }
    let previous = SAMPLE_RATE.swap(rate, Ordering::Relaxed);
    if previous != rate {
        info!("Host sample rate changed: {} Hz -> {} Hz", previous, rate);
    }
}

/// Enable or disable verbose streaming/render diagnostics
pub fn enable_debug(enable: bool) {
    info!("Setting debug mode {}", if enable { "on" } else { "off" });
    DEBUG.store(enable, Ordering::Relaxed);
}

pub fn is_debug() -> bool {
    DEBUG.load(Ordering::Relaxed)
}
