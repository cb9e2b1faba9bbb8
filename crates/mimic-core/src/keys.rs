//! Keyboard keys and mouse buttons, with their canonical string names
//!
//! Recordings store identifiers as strings. Every supported key and button
//! has exactly one canonical name; parsing additionally accepts a few aliases
//! and the legacy symbolic forms (`Key.esc`, `'q'`, `Button.left`) written by
//! older recordings.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Printable keys addressed by the character they produce unshifted
const CHAR_KEYS: &str = "abcdefghijklmnopqrstuvwxyz0123456789`-=[]\\;',./";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Alt,
    AltGr,
    Backspace,
    CapsLock,
    CmdLeft,
    CmdRight,
    CtrlLeft,
    CtrlRight,
    Delete,
    Down,
    End,
    Enter,
    Esc,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    Function,
    Home,
    Insert,
    IntlBackslash,
    Left,
    NumLock,
    PageDown,
    PageUp,
    Pause,
    PrintScreen,
    Right,
    ScrollLock,
    ShiftLeft,
    ShiftRight,
    Space,
    Tab,
    Up,
    KpEnter,
    KpMinus,
    KpPlus,
    KpMultiply,
    KpDivide,
    KpDelete,
    /// Keypad digit 0-9
    Kp(u8),
    /// Printable key, always one of [`CHAR_KEYS`]
    Char(char),
    /// Platform scan/virtual code with no symbolic name
    Raw(u32),
}

const NAMED_KEYS: &[(Key, &str)] = &[
    (Key::Alt, "alt"),
    (Key::AltGr, "alt_gr"),
    (Key::Backspace, "backspace"),
    (Key::CapsLock, "caps_lock"),
    (Key::CmdLeft, "cmd"),
    (Key::CmdRight, "cmd_r"),
    (Key::CtrlLeft, "ctrl_l"),
    (Key::CtrlRight, "ctrl_r"),
    (Key::Delete, "delete"),
    (Key::Down, "down"),
    (Key::End, "end"),
    (Key::Enter, "enter"),
    (Key::Esc, "esc"),
    (Key::F1, "f1"),
    (Key::F2, "f2"),
    (Key::F3, "f3"),
    (Key::F4, "f4"),
    (Key::F5, "f5"),
    (Key::F6, "f6"),
    (Key::F7, "f7"),
    (Key::F8, "f8"),
    (Key::F9, "f9"),
    (Key::F10, "f10"),
    (Key::F11, "f11"),
    (Key::F12, "f12"),
    (Key::Function, "fn"),
    (Key::Home, "home"),
    (Key::Insert, "insert"),
    (Key::IntlBackslash, "intl_backslash"),
    (Key::Left, "left"),
    (Key::NumLock, "num_lock"),
    (Key::PageDown, "page_down"),
    (Key::PageUp, "page_up"),
    (Key::Pause, "pause"),
    (Key::PrintScreen, "print_screen"),
    (Key::Right, "right"),
    (Key::ScrollLock, "scroll_lock"),
    (Key::ShiftLeft, "shift"),
    (Key::ShiftRight, "shift_r"),
    (Key::Space, "space"),
    (Key::Tab, "tab"),
    (Key::Up, "up"),
    (Key::KpEnter, "kp_enter"),
    (Key::KpMinus, "kp_minus"),
    (Key::KpPlus, "kp_plus"),
    (Key::KpMultiply, "kp_multiply"),
    (Key::KpDivide, "kp_divide"),
    (Key::KpDelete, "kp_delete"),
];

const KEY_ALIASES: &[(&str, Key)] = &[
    ("alt_l", Key::Alt),
    ("alt_r", Key::AltGr),
    ("cmd_l", Key::CmdLeft),
    ("super", Key::CmdLeft),
    ("ctrl", Key::CtrlLeft),
    ("shift_l", Key::ShiftLeft),
    ("escape", Key::Esc),
    ("return", Key::Enter),
    ("print", Key::PrintScreen),
    ("menu", Key::Function),
];

impl Key {
    /// Canonical name as stored in recordings
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Key::Char(c) => Cow::Owned(c.to_string()),
            Key::Kp(d) => Cow::Owned(format!("kp_{}", d)),
            Key::Raw(code) => Cow::Owned(format!("<{}>", code)),
            named => NAMED_KEYS
                .iter()
                .find(|(k, _)| k == named)
                .map(|(_, n)| Cow::Borrowed(*n))
                .unwrap_or(Cow::Borrowed("?")),
        }
    }

    /// Resolve a stored name, alias or legacy form
    pub fn from_name(name: &str) -> Option<Key> {
        let s = name.trim();
        let s = s.strip_prefix("Key.").unwrap_or(s);

        if let Some(inner) = unquote(s) {
            return char_key(inner);
        }
        if let Some(code) = s.strip_prefix('<').and_then(|r| r.strip_suffix('>')) {
            return code.parse().ok().map(Key::Raw);
        }
        if s.chars().count() == 1 {
            return char_key(s);
        }

        let lower = s.to_ascii_lowercase();
        if let Some(d) = lower.strip_prefix("kp_").and_then(|d| d.parse::<u8>().ok()) {
            return (d <= 9).then_some(Key::Kp(d));
        }
        NAMED_KEYS
            .iter()
            .find(|(_, n)| *n == lower)
            .map(|(k, _)| *k)
            .or_else(|| {
                KEY_ALIASES
                    .iter()
                    .find(|(n, _)| *n == lower)
                    .map(|(_, k)| *k)
            })
    }
}

/// `'q'` or `"'"` -> inner text
fn unquote(s: &str) -> Option<&str> {
    let mut chars = s.chars();
    let first = chars.next()?;
    let last = chars.next_back()?;
    if (first == '\'' || first == '"') && first == last && s.len() > 2 {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}

fn char_key(s: &str) -> Option<Key> {
    let mut chars = s.chars();
    let c = chars.next()?.to_ascii_lowercase();
    if chars.next().is_some() {
        return None;
    }
    if c == ' ' {
        return Some(Key::Space);
    }
    CHAR_KEYS.contains(c).then_some(Key::Char(c))
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Key::from_name(s).ok_or_else(|| Error::unknown_key(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Left,
    Right,
    Middle,
    /// Extra buttons by platform number
    Other(u8),
}

impl Button {
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Button::Left => Cow::Borrowed("left"),
            Button::Right => Cow::Borrowed("right"),
            Button::Middle => Cow::Borrowed("middle"),
            Button::Other(n) => Cow::Owned(format!("button{}", n)),
        }
    }

    pub fn from_name(name: &str) -> Option<Button> {
        let s = name.trim();
        let s = s.strip_prefix("Button.").unwrap_or(s).to_ascii_lowercase();
        match s.as_str() {
            "left" => Some(Button::Left),
            "right" => Some(Button::Right),
            "middle" | "center" => Some(Button::Middle),
            other => other
                .strip_prefix("button")
                .and_then(|n| n.parse().ok())
                .map(Button::Other),
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Button {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Button::from_name(s).ok_or_else(|| Error::unknown_button(s))
    }
}

/// A key as recorded. Kept verbatim so documents naming keys this build
/// does not know still load; resolution happens at playback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resolve(&self) -> Result<Key> {
        self.0.parse()
    }
}

impl From<Key> for KeyId {
    fn from(key: Key) -> Self {
        Self(key.name().into_owned())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A mouse button as recorded, see [`KeyId`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ButtonId(String);

impl ButtonId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resolve(&self) -> Result<Button> {
        self.0.parse()
    }
}

impl From<Button> for ButtonId {
    fn from(button: Button) -> Self {
        Self(button.name().into_owned())
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
