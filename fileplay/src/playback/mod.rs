//! Player instances and their real-time streaming pipeline

pub mod events;
pub mod player;
pub mod render;
pub mod ring_channel;
pub mod state;
pub mod streaming;
pub mod trigger;

pub use events::{EventKind, NotificationTarget};
pub use player::Player;
pub use render::Renderer;
pub use state::{FileLifecycle, StreamStatus, TransportState, PITCH_BEND_CENTRE};
pub use streaming::active_streaming_tasks;
pub use trigger::TriggerEvent;
