//! mimic-core - input primitives for recording and replay
//!
//! Identifiers, clocks and the two seams everything else is built on:
//! [`InputSource`] (capture hooks) and [`InputSink`] (input synthesis).
//!
//! ## Platform Support
//!
//! - **macOS / Windows / Linux (X11)**: via rdev, see [`platform::native`]

pub mod clock;
pub mod error;
pub mod input;
pub mod keys;
pub mod platform;
pub mod signal;

pub use clock::Clock;
pub use error::{Device, Error, ErrorCode, IdentifierKind, Result};
pub use input::{move_delta, InputSink, InputSource, RawInput, Stamped, Subscription};
pub use keys::{Button, ButtonId, Key, KeyId};
pub use platform::{NativeSink, NativeSource};
pub use signal::StopSignal;

pub mod prelude {
    pub use crate::clock::Clock;
    pub use crate::error::{Device, Error, ErrorCode, Result};
    pub use crate::input::{InputSink, InputSource, RawInput, Stamped, Subscription};
    pub use crate::keys::{Button, ButtonId, Key, KeyId};
    pub use crate::platform::{NativeSink, NativeSource};
    pub use crate::signal::StopSignal;
}
