//! Change notification
//!
//! Each player keeps a shadow copy of every externally observable field.
//! A dispatch pass compares the live values against the shadows and reports
//! the fields that moved far enough to matter (position and gain have
//! thresholds, everything else reports on any change). The target is any
//! [`NotificationTarget`]; the crate knows nothing about the transport that
//! relays notifications outward.

use crate::audio::SrcQuality;
use crate::config::EngineConfig;
use crate::playback::state::{lock, TransportState};
use std::sync::{Arc, Mutex};

/// Kind of field a notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Transport,
    Position,
    Gain,
    Loop,
    TrackA,
    TrackB,
    Quality,
    Debug,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Transport => write!(f, "transport"),
            EventKind::Position => write!(f, "position"),
            EventKind::Gain => write!(f, "gain"),
            EventKind::Loop => write!(f, "loop"),
            EventKind::TrackA => write!(f, "track_a"),
            EventKind::TrackB => write!(f, "track_b"),
            EventKind::Quality => write!(f, "quality"),
            EventKind::Debug => write!(f, "debug"),
        }
    }
}

/// Receiver of change notifications.
///
/// Called from the control thread and from the streaming task, never from
/// the render callback. `handle` identifies the reporting player.
pub trait NotificationTarget: Send + Sync {
    fn notify(&self, handle: usize, kind: EventKind, value: f32);
}

impl<F> NotificationTarget for F
where
    F: Fn(usize, EventKind, f32) + Send + Sync,
{
    fn notify(&self, handle: usize, kind: EventKind, value: f32) {
        self(handle, kind, value)
    }
}

/// Externally observable fields of one player at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observable {
    pub transport: TransportState,
    pub position: f32,
    pub gain: f32,
    pub loop_enabled: bool,
    pub track_a: i32,
    pub track_b: i32,
    pub quality: SrcQuality,
    pub debug: bool,
}

/// Last values reported; `None` means "never reported since load"
#[derive(Debug, Default)]
struct Shadow {
    transport: Option<TransportState>,
    position: Option<f32>,
    gain: Option<f32>,
    loop_enabled: Option<bool>,
    track_a: Option<i32>,
    track_b: Option<i32>,
    quality: Option<SrcQuality>,
    debug: Option<bool>,
}

struct Inner {
    target: Option<Arc<dyn NotificationTarget>>,
    shadow: Shadow,
}

/// Threshold-based change detector for one player
pub struct Notifier {
    inner: Mutex<Inner>,
    position_threshold: f32,
    gain_threshold: f32,
}

impl Notifier {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                target: None,
                shadow: Shadow::default(),
            }),
            position_threshold: config.position_threshold,
            gain_threshold: config.gain_threshold,
        }
    }

    /// Install (or clear) the target and forget everything reported so far
    pub fn set_target(&self, target: Option<Arc<dyn NotificationTarget>>) {
        let mut inner = lock(&self.inner);
        inner.target = target;
        inner.shadow = Shadow::default();
    }

    pub fn has_target(&self) -> bool {
        lock(&self.inner).target.is_some()
    }

    /// Report every field of `current` that differs from its shadow.
    ///
    /// `only` restricts the pass to one field. The target is invoked after
    /// the internal lock is released, so it may call back into the player.
    pub fn dispatch(&self, handle: usize, current: &Observable, only: Option<EventKind>) {
        let mut changes: [(EventKind, f32); 8] = [(EventKind::Debug, 0.0); 8];
        let mut count = 0;

        let target = {
            let mut inner = lock(&self.inner);
            let Some(target) = inner.target.clone() else {
                return;
            };
            let wanted = |kind: EventKind| only.map_or(true, |o| o == kind);
            let shadow = &mut inner.shadow;
            let mut push = |kind: EventKind, value: f32| {
                changes[count] = (kind, value);
                count += 1;
            };

            if wanted(EventKind::Transport) && shadow.transport != Some(current.transport) {
                shadow.transport = Some(current.transport);
                push(EventKind::Transport, current.transport as u8 as f32);
            }
            if wanted(EventKind::Position)
                && exceeds(shadow.position, current.position, self.position_threshold)
            {
                shadow.position = Some(current.position);
                push(EventKind::Position, current.position);
            }
            if wanted(EventKind::Gain) && exceeds(shadow.gain, current.gain, self.gain_threshold) {
                shadow.gain = Some(current.gain);
                push(EventKind::Gain, current.gain);
            }
            if wanted(EventKind::Loop) && shadow.loop_enabled != Some(current.loop_enabled) {
                shadow.loop_enabled = Some(current.loop_enabled);
                push(EventKind::Loop, flag(current.loop_enabled));
            }
            if wanted(EventKind::TrackA) && shadow.track_a != Some(current.track_a) {
                shadow.track_a = Some(current.track_a);
                push(EventKind::TrackA, current.track_a as f32);
            }
            if wanted(EventKind::TrackB) && shadow.track_b != Some(current.track_b) {
                shadow.track_b = Some(current.track_b);
                push(EventKind::TrackB, current.track_b as f32);
            }
            if wanted(EventKind::Quality) && shadow.quality != Some(current.quality) {
                shadow.quality = Some(current.quality);
                push(EventKind::Quality, current.quality.tier() as f32);
            }
            if wanted(EventKind::Debug) && shadow.debug != Some(current.debug) {
                shadow.debug = Some(current.debug);
                push(EventKind::Debug, flag(current.debug));
            }
            target
        };

        for &(kind, value) in &changes[..count] {
            target.notify(handle, kind, value);
        }
    }
}

fn exceeds(previous: Option<f32>, current: f32, threshold: f32) -> bool {
    match previous {
        None => true,
        Some(previous) => (current - previous).abs() >= threshold,
    }
}

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Arc<Mutex<Vec<(usize, EventKind, f32)>>>;

    fn recorder() -> (Log, Arc<dyn NotificationTarget>) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let target: Arc<dyn NotificationTarget> = Arc::new(move |handle: usize, kind: EventKind, value: f32| {
            sink.lock().unwrap().push((handle, kind, value));
        });
        (log, target)
    }

    fn observable() -> Observable {
        Observable {
            transport: TransportState::Stopped,
            position: 0.0,
            gain: 1.0,
            loop_enabled: false,
            track_a: -1,
            track_b: -1,
            quality: SrcQuality::SincFastest,
            debug: false,
        }
    }

    #[test]
    fn test_no_target_is_silent() {
        let notifier = Notifier::new(&EngineConfig::default());
        notifier.dispatch(0, &observable(), None);
        assert!(!notifier.has_target());
    }

    #[test]
    fn test_first_pass_reports_every_field() {
        let notifier = Notifier::new(&EngineConfig::default());
        let (log, target) = recorder();
        notifier.set_target(Some(target));

        notifier.dispatch(3, &observable(), None);
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 8);
        assert!(log.iter().all(|(handle, _, _)| *handle == 3));
        assert!(log.contains(&(3, EventKind::Gain, 1.0)));
        assert!(log.contains(&(3, EventKind::TrackA, -1.0)));
    }

    #[test]
    fn test_thresholds_suppress_small_changes() {
        let notifier = Notifier::new(&EngineConfig::default());
        let (log, target) = recorder();
        notifier.set_target(Some(target));

        let mut current = observable();
        notifier.dispatch(0, &current, None);
        log.lock().unwrap().clear();

        current.position = 0.05;
        current.gain = 1.005;
        notifier.dispatch(0, &current, None);
        assert!(log.lock().unwrap().is_empty());

        current.position = 0.25;
        current.gain = 1.5;
        notifier.dispatch(0, &current, None);
        let log = log.lock().unwrap();
        assert_eq!(*log, vec![(0, EventKind::Position, 0.25), (0, EventKind::Gain, 1.5)]);
    }

    #[test]
    fn test_filtered_pass_only_touches_one_field() {
        let notifier = Notifier::new(&EngineConfig::default());
        let (log, target) = recorder();
        notifier.set_target(Some(target));

        let mut current = observable();
        current.loop_enabled = true;
        notifier.dispatch(0, &current, Some(EventKind::Loop));
        assert_eq!(*log.lock().unwrap(), vec![(0, EventKind::Loop, 1.0)]);

        // Unfiltered pass still reports the fields the filtered one skipped
        notifier.dispatch(0, &current, None);
        assert_eq!(log.lock().unwrap().len(), 8);
    }

    #[test]
    fn test_set_target_resets_shadows() {
        let notifier = Notifier::new(&EngineConfig::default());
        let (log, target) = recorder();
        notifier.set_target(Some(Arc::clone(&target)));
        notifier.dispatch(0, &observable(), None);

        notifier.set_target(Some(target));
        notifier.dispatch(0, &observable(), None);
        assert_eq!(log.lock().unwrap().len(), 16);

        notifier.set_target(None);
        notifier.dispatch(0, &observable(), None);
        assert_eq!(log.lock().unwrap().len(), 16);
    }
}
