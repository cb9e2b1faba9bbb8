//! Platform layer
//!
//! Capture and synthesis go through rdev on every OS; what differs per
//! platform is what a user has to do when the hook is refused.

pub mod native;

pub use native::{NativeSink, NativeSource};

/// Advice appended to hook installation failures
#[cfg(target_os = "macos")]
pub fn permission_hint() -> Option<&'static str> {
    Some("grant Accessibility and Input Monitoring in System Settings > Privacy & Security")
}

#[cfg(target_os = "linux")]
pub fn permission_hint() -> Option<&'static str> {
    Some("an X11 session with the XRecord and XTest extensions is required (DISPLAY must be set)")
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn permission_hint() -> Option<&'static str> {
    None
}
