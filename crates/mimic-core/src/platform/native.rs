//! Native capture and synthesis via rdev
//!
//! rdev exposes a single, never-returning global listener. One hook thread
//! owns it and fans stamped input out to per-device subscribers, so each
//! recorder holds its own [`Subscription`] and detaches by dropping it.

use super::permission_hint;
use crate::error::{Device, Error, Result};
use crate::input::{InputSink, InputSource, RawInput, Stamped, Subscription};
use crate::keys::{Button, Key};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How long a fresh hook gets to report an installation error
const INSTALL_GRACE: Duration = Duration::from_millis(250);

/// Default per-subscriber buffer, in events
pub const DEFAULT_CAPACITY: usize = 10_000;

static HOOK: OnceLock<Hook> = OnceLock::new();

/// Why the hook is not running. Kept outside [`Hook`] so the hook thread can
/// record a failure that happens before the hook is published.
static FAILURE: Mutex<Option<String>> = parking_lot::const_mutex(None);

struct Subscriber {
    id: u64,
    device: Device,
    tx: Sender<Stamped>,
}

struct Hook {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl Hook {
    fn get() -> &'static Hook {
        HOOK.get_or_init(Hook::install)
    }

    fn install() -> Hook {
        let (ready_tx, ready_rx) = bounded::<()>(1);

        let spawned = thread::Builder::new()
            .name("input-hook".into())
            .spawn(move || {
                let mut pointer = (0, 0);
                let result = rdev::listen(move |event| {
                    let input = translate(&event.event_type, &mut pointer);
                    // Input arriving while the hook is still being published is dropped
                    if let Some(hook) = HOOK.get() {
                        hook.dispatch(Stamped::now(input));
                    }
                });

                let reason = match result {
                    Ok(()) => "listener returned".to_string(),
                    Err(e) => format!("{:?}", e),
                };
                error!(%reason, "input hook stopped");
                record_failure(&FAILURE, reason);
                if let Some(hook) = HOOK.get() {
                    hook.subscribers.lock().clear();
                }
                let _ = ready_tx.send(());
            });

        match spawned {
            Err(e) => record_failure(&FAILURE, e.to_string()),
            Ok(_) => {
                if let Err(RecvTimeoutError::Disconnected) = ready_rx.recv_timeout(INSTALL_GRACE) {
                    record_failure(&FAILURE, "hook thread exited".to_string());
                }
            }
        }

        Hook {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn dispatch(&self, stamped: Stamped) {
        let device = stamped.input.device();
        self.subscribers.lock().retain(|s| {
            if s.device != device {
                return true;
            }
            match s.tx.try_send(stamped) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(%device, "capture buffer full, input dropped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }
}

// The first reason wins; later ones are consequences of it.
fn record_failure(failure: &Mutex<Option<String>>, reason: String) {
    let mut failure = failure.lock();
    if failure.is_none() {
        *failure = Some(reason);
    }
}

fn check_failure(failure: &Mutex<Option<String>>, device: Device) -> Result<()> {
    match failure.lock().as_ref() {
        None => Ok(()),
        Some(reason) => {
            let reason = match permission_hint() {
                Some(hint) => format!("{} ({})", reason, hint),
                None => reason.clone(),
            };
            Err(Error::hook_install(device, reason))
        }
    }
}

/// Capture through the process-wide rdev hook
#[derive(Debug, Clone)]
pub struct NativeSource {
    capacity: usize,
}

impl NativeSource {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }
}

impl Default for NativeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for NativeSource {
    fn subscribe(&self, device: Device) -> Result<Subscription> {
        let hook = Hook::get();
        let (tx, rx) = bounded(self.capacity);
        let id = hook.next_id.fetch_add(1, Ordering::Relaxed);
        {
            // Checked under the subscriber lock: a hook that dies afterwards
            // clears this subscriber and closes its channel.
            let mut subscribers = hook.subscribers.lock();
            check_failure(&FAILURE, device)?;
            subscribers.push(Subscriber { id, device, tx });
        }
        debug!(%device, id, "hook attached");

        Ok(Subscription::with_detach(rx, move || {
            hook.subscribers.lock().retain(|s| s.id != id);
            debug!(%device, id, "hook detached");
        }))
    }
}

/// Synthesis through `rdev::simulate`
#[derive(Debug, Default)]
pub struct NativeSink {
    /// Last position this sink moved the pointer to
    last: Option<(i32, i32)>,
}

impl NativeSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn send(event: &rdev::EventType) -> Result<()> {
        rdev::simulate(event).map_err(|e| Error::Synthesis(format!("{:?}: {:?}", event, e)))
    }
}

impl InputSink for NativeSink {
    fn pointer(&mut self) -> Result<(i32, i32)> {
        self.last.ok_or_else(|| {
            Error::Synthesis("pointer position is unknown until the first absolute move".into())
        })
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        Self::send(&rdev::EventType::MouseMove {
            x: f64::from(x),
            y: f64::from(y),
        })?;
        self.last = Some((x, y));
        Ok(())
    }

    fn move_by(&mut self, dx: i32, dy: i32) -> Result<()> {
        let (x, y) = self.pointer()?;
        self.move_to(x.saturating_add(dx), y.saturating_add(dy))
    }

    fn button(&mut self, button: Button, pressed: bool) -> Result<()> {
        let button = to_rdev_button(button);
        if pressed {
            Self::send(&rdev::EventType::ButtonPress(button))
        } else {
            Self::send(&rdev::EventType::ButtonRelease(button))
        }
    }

    fn scroll(&mut self, dx: i32, dy: i32) -> Result<()> {
        Self::send(&rdev::EventType::Wheel {
            delta_x: i64::from(dx),
            delta_y: i64::from(dy),
        })
    }

    fn key(&mut self, key: Key, pressed: bool) -> Result<()> {
        let native = to_rdev_key(key).ok_or_else(|| Error::unknown_key(&key.name()))?;
        if pressed {
            Self::send(&rdev::EventType::KeyPress(native))
        } else {
            Self::send(&rdev::EventType::KeyRelease(native))
        }
    }
}

// ============================================================================
// rdev <-> domain mapping
// ============================================================================

fn translate(event: &rdev::EventType, pointer: &mut (i32, i32)) -> RawInput {
    let (x, y) = *pointer;
    match *event {
        rdev::EventType::MouseMove { x, y } => {
            *pointer = (x.round() as i32, y.round() as i32);
            RawInput::Move {
                x: pointer.0,
                y: pointer.1,
            }
        }
        rdev::EventType::ButtonPress(b) => RawInput::Button {
            x,
            y,
            button: from_rdev_button(b),
            pressed: true,
        },
        rdev::EventType::ButtonRelease(b) => RawInput::Button {
            x,
            y,
            button: from_rdev_button(b),
            pressed: false,
        },
        rdev::EventType::Wheel { delta_x, delta_y } => RawInput::Wheel {
            x,
            y,
            dx: saturate(delta_x),
            dy: saturate(delta_y),
        },
        rdev::EventType::KeyPress(k) => RawInput::Key {
            key: from_rdev_key(k),
            pressed: true,
        },
        rdev::EventType::KeyRelease(k) => RawInput::Key {
            key: from_rdev_key(k),
            pressed: false,
        },
    }
}

fn saturate(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn from_rdev_button(button: rdev::Button) -> Button {
    match button {
        rdev::Button::Left => Button::Left,
        rdev::Button::Right => Button::Right,
        rdev::Button::Middle => Button::Middle,
        rdev::Button::Unknown(n) => Button::Other(n),
    }
}

fn to_rdev_button(button: Button) -> rdev::Button {
    match button {
        Button::Left => rdev::Button::Left,
        Button::Right => rdev::Button::Right,
        Button::Middle => rdev::Button::Middle,
        Button::Other(n) => rdev::Button::Unknown(n),
    }
}

const KEY_TABLE: &[(Key, rdev::Key)] = &[
    (Key::Alt, rdev::Key::Alt),
    (Key::AltGr, rdev::Key::AltGr),
    (Key::Backspace, rdev::Key::Backspace),
    (Key::CapsLock, rdev::Key::CapsLock),
    (Key::CmdLeft, rdev::Key::MetaLeft),
    (Key::CmdRight, rdev::Key::MetaRight),
    (Key::CtrlLeft, rdev::Key::ControlLeft),
    (Key::CtrlRight, rdev::Key::ControlRight),
    (Key::Delete, rdev::Key::Delete),
    (Key::Down, rdev::Key::DownArrow),
    (Key::End, rdev::Key::End),
    (Key::Enter, rdev::Key::Return),
    (Key::Esc, rdev::Key::Escape),
    (Key::F1, rdev::Key::F1),
    (Key::F2, rdev::Key::F2),
    (Key::F3, rdev::Key::F3),
    (Key::F4, rdev::Key::F4),
    (Key::F5, rdev::Key::F5),
    (Key::F6, rdev::Key::F6),
    (Key::F7, rdev::Key::F7),
    (Key::F8, rdev::Key::F8),
    (Key::F9, rdev::Key::F9),
    (Key::F10, rdev::Key::F10),
    (Key::F11, rdev::Key::F11),
    (Key::F12, rdev::Key::F12),
    (Key::Function, rdev::Key::Function),
    (Key::Home, rdev::Key::Home),
    (Key::Insert, rdev::Key::Insert),
    (Key::IntlBackslash, rdev::Key::IntlBackslash),
    (Key::Left, rdev::Key::LeftArrow),
    (Key::NumLock, rdev::Key::NumLock),
    (Key::PageDown, rdev::Key::PageDown),
    (Key::PageUp, rdev::Key::PageUp),
    (Key::Pause, rdev::Key::Pause),
    (Key::PrintScreen, rdev::Key::PrintScreen),
    (Key::Right, rdev::Key::RightArrow),
    (Key::ScrollLock, rdev::Key::ScrollLock),
    (Key::ShiftLeft, rdev::Key::ShiftLeft),
    (Key::ShiftRight, rdev::Key::ShiftRight),
    (Key::Space, rdev::Key::Space),
    (Key::Tab, rdev::Key::Tab),
    (Key::Up, rdev::Key::UpArrow),
    (Key::KpEnter, rdev::Key::KpReturn),
    (Key::KpMinus, rdev::Key::KpMinus),
    (Key::KpPlus, rdev::Key::KpPlus),
    (Key::KpMultiply, rdev::Key::KpMultiply),
    (Key::KpDivide, rdev::Key::KpDivide),
    (Key::KpDelete, rdev::Key::KpDelete),
    (Key::Kp(0), rdev::Key::Kp0),
    (Key::Kp(1), rdev::Key::Kp1),
    (Key::Kp(2), rdev::Key::Kp2),
    (Key::Kp(3), rdev::Key::Kp3),
    (Key::Kp(4), rdev::Key::Kp4),
    (Key::Kp(5), rdev::Key::Kp5),
    (Key::Kp(6), rdev::Key::Kp6),
    (Key::Kp(7), rdev::Key::Kp7),
    (Key::Kp(8), rdev::Key::Kp8),
    (Key::Kp(9), rdev::Key::Kp9),
    (Key::Char('a'), rdev::Key::KeyA),
    (Key::Char('b'), rdev::Key::KeyB),
    (Key::Char('c'), rdev::Key::KeyC),
    (Key::Char('d'), rdev::Key::KeyD),
    (Key::Char('e'), rdev::Key::KeyE),
    (Key::Char('f'), rdev::Key::KeyF),
    (Key::Char('g'), rdev::Key::KeyG),
    (Key::Char('h'), rdev::Key::KeyH),
    (Key::Char('i'), rdev::Key::KeyI),
    (Key::Char('j'), rdev::Key::KeyJ),
    (Key::Char('k'), rdev::Key::KeyK),
    (Key::Char('l'), rdev::Key::KeyL),
    (Key::Char('m'), rdev::Key::KeyM),
    (Key::Char('n'), rdev::Key::KeyN),
    (Key::Char('o'), rdev::Key::KeyO),
    (Key::Char('p'), rdev::Key::KeyP),
    (Key::Char('q'), rdev::Key::KeyQ),
    (Key::Char('r'), rdev::Key::KeyR),
    (Key::Char('s'), rdev::Key::KeyS),
    (Key::Char('t'), rdev::Key::KeyT),
    (Key::Char('u'), rdev::Key::KeyU),
    (Key::Char('v'), rdev::Key::KeyV),
    (Key::Char('w'), rdev::Key::KeyW),
    (Key::Char('x'), rdev::Key::KeyX),
    (Key::Char('y'), rdev::Key::KeyY),
    (Key::Char('z'), rdev::Key::KeyZ),
    (Key::Char('0'), rdev::Key::Num0),
    (Key::Char('1'), rdev::Key::Num1),
    (Key::Char('2'), rdev::Key::Num2),
    (Key::Char('3'), rdev::Key::Num3),
    (Key::Char('4'), rdev::Key::Num4),
    (Key::Char('5'), rdev::Key::Num5),
    (Key::Char('6'), rdev::Key::Num6),
    (Key::Char('7'), rdev::Key::Num7),
    (Key::Char('8'), rdev::Key::Num8),
    (Key::Char('9'), rdev::Key::Num9),
    (Key::Char('`'), rdev::Key::BackQuote),
    (Key::Char('-'), rdev::Key::Minus),
    (Key::Char('='), rdev::Key::Equal),
    (Key::Char('['), rdev::Key::LeftBracket),
    (Key::Char(']'), rdev::Key::RightBracket),
    (Key::Char('\\'), rdev::Key::BackSlash),
    (Key::Char(';'), rdev::Key::SemiColon),
    (Key::Char('\''), rdev::Key::Quote),
    (Key::Char(','), rdev::Key::Comma),
    (Key::Char('.'), rdev::Key::Dot),
    (Key::Char('/'), rdev::Key::Slash),
];

fn from_rdev_key(key: rdev::Key) -> Key {
    if let rdev::Key::Unknown(code) = key {
        return Key::Raw(code);
    }
    KEY_TABLE
        .iter()
        .find(|(_, native)| *native == key)
        .map(|(k, _)| *k)
        .unwrap_or(Key::Raw(0))
}

fn to_rdev_key(key: Key) -> Option<rdev::Key> {
    if let Key::Raw(code) = key {
        return Some(rdev::Key::Unknown(code));
    }
    KEY_TABLE
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, native)| *native)
}
