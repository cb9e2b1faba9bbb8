//! Input capture and synthesis seams
//!
//! Recorders read [`Stamped`] raw input from an [`InputSource`]; the player
//! drives an [`InputSink`]. [`crate::platform::native`] implements both on
//! top of the OS hook, tests use scripted ones.

use crate::error::{Device, Result};
use crate::keys::{Button, Key};
use crossbeam_channel::Receiver;
use std::time::Instant;

/// Raw input as delivered by a hook
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawInput {
    Move { x: i32, y: i32 },
    Button { x: i32, y: i32, button: Button, pressed: bool },
    Wheel { x: i32, y: i32, dx: i32, dy: i32 },
    Key { key: Key, pressed: bool },
}

impl RawInput {
    pub fn device(&self) -> Device {
        match self {
            RawInput::Key { .. } => Device::Keyboard,
            _ => Device::Mouse,
        }
    }
}

/// Raw input plus the instant the hook saw it
#[derive(Debug, Clone, Copy)]
pub struct Stamped {
    pub at: Instant,
    pub input: RawInput,
}

impl Stamped {
    pub fn now(input: RawInput) -> Self {
        Self {
            at: Instant::now(),
            input,
        }
    }
}

/// A live hook bound to one device. Dropping it detaches the hook.
pub struct Subscription {
    rx: Receiver<Stamped>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(rx: Receiver<Stamped>) -> Self {
        Self { rx, on_drop: None }
    }

    /// Run `detach` when the subscription is dropped
    pub fn with_detach(rx: Receiver<Stamped>, detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            on_drop: Some(Box::new(detach)),
        }
    }

    pub fn receiver(&self) -> &Receiver<Stamped> {
        &self.rx
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.on_drop.take() {
            detach();
        }
    }
}

/// Installs capture hooks
pub trait InputSource: Send + Sync {
    /// Start delivering `device` input. Fails with
    /// [`crate::Error::HookInstall`] before any input is delivered if the
    /// hook cannot be installed.
    fn subscribe(&self, device: Device) -> Result<Subscription>;
}

/// Synthesizes OS input
pub trait InputSink {
    /// Whether [`InputSink::move_to`] is available. When it is not, moves
    /// are replayed as a relative offset from [`InputSink::pointer`].
    fn supports_absolute_move(&self) -> bool {
        true
    }

    fn pointer(&mut self) -> Result<(i32, i32)>;

    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;

    fn move_by(&mut self, dx: i32, dy: i32) -> Result<()>;

    fn button(&mut self, button: Button, pressed: bool) -> Result<()>;

    fn scroll(&mut self, dx: i32, dy: i32) -> Result<()>;

    fn key(&mut self, key: Key, pressed: bool) -> Result<()>;
}

/// Offset that takes the pointer from `current` to `target`
pub fn move_delta(current: (i32, i32), target: (i32, i32)) -> (i32, i32) {
    (
        target.0.saturating_sub(current.0),
        target.1.saturating_sub(current.1),
    )
}
