//! mimic-recorder - capture, store and replay mouse and keyboard input
//!
//! A [`RecordingSession`] runs a [`MouseRecorder`] and a [`KeyboardRecorder`]
//! side by side and merges their captures into one [`EventSequence`].
//! [`JsonFileStore`] persists it and a [`Player`] replays it with the
//! recorded pacing.
//!
//! ## Stop gestures
//!
//! - **Mouse**: press a second button while the first is still down
//! - **Keyboard**: hold `q` and `esc` together

pub mod events;
pub mod recorder;
pub mod replay;
pub mod session;
pub mod storage;

pub use events::{wait_interval, Event, EventKind, EventSequence};
pub use recorder::{Flow, KeyboardRecorder, MouseRecorder, PressedKeys, RecorderConfig};
pub use replay::{Pacer, PlayReport, Player, PlayerConfig, PlayerState, SkippedEvent, ThreadPacer};
pub use session::RecordingSession;
pub use storage::{EventStore, JsonFileStore, Schema};

pub mod prelude {
    pub use crate::events::{Event, EventKind, EventSequence};
    pub use crate::recorder::{KeyboardRecorder, MouseRecorder, RecorderConfig};
    pub use crate::replay::{PlayReport, Player, PlayerConfig, PlayerState};
    pub use crate::session::RecordingSession;
    pub use crate::storage::{EventStore, JsonFileStore, Schema};
}
