//! Infrastructure layer: OS backends, selected at compile time.
//!
//! | Platform        | Keyboard / mouse         | Mute                          |
//! |-----------------|--------------------------|-------------------------------|
//! | Windows         | SendInput                | Core Audio endpoint volume    |
//! | Linux / BSD X11 | `xdotool`                | `pactl`                       |
//! | macOS           | unsupported              | `osascript`                   |
//!
//! Every worker also accepts `--dry-run`, which logs instead of injecting.

pub mod dry_run;
pub mod helper;

#[cfg(target_os = "windows")]
pub mod windows;

use crate::application::backend::{BackendError, KeyboardBackend, MouseBackend, MuteBackend};

#[cfg(target_os = "windows")]
pub fn keyboard_backend() -> Result<Box<dyn KeyboardBackend>, BackendError> {
    Ok(Box::new(windows::SendInputKeyboard))
}

#[cfg(target_os = "windows")]
pub fn mouse_backend() -> Result<Box<dyn MouseBackend>, BackendError> {
    Ok(Box::new(windows::SendInputMouse))
}

#[cfg(target_os = "windows")]
pub fn mute_backend() -> Result<Box<dyn MuteBackend>, BackendError> {
    Ok(Box::new(windows::CoreAudioMute::connect()?))
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn keyboard_backend() -> Result<Box<dyn KeyboardBackend>, BackendError> {
    Ok(Box::new(helper::XdotoolBackend::connect()?))
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn mouse_backend() -> Result<Box<dyn MouseBackend>, BackendError> {
    Ok(Box::new(helper::XdotoolBackend::connect()?))
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn mute_backend() -> Result<Box<dyn MuteBackend>, BackendError> {
    Ok(Box::new(helper::HelperMuteBackend::pactl(
        helper::SystemRunner,
    )))
}

#[cfg(target_os = "macos")]
pub fn keyboard_backend() -> Result<Box<dyn KeyboardBackend>, BackendError> {
    Err(BackendError::Unsupported("keyboard injection"))
}

#[cfg(target_os = "macos")]
pub fn mouse_backend() -> Result<Box<dyn MouseBackend>, BackendError> {
    Err(BackendError::Unsupported("pointer injection"))
}

#[cfg(target_os = "macos")]
pub fn mute_backend() -> Result<Box<dyn MuteBackend>, BackendError> {
    Ok(Box::new(helper::HelperMuteBackend::osascript(
        helper::SystemRunner,
    )))
}

#[cfg(not(any(windows, unix)))]
pub fn keyboard_backend() -> Result<Box<dyn KeyboardBackend>, BackendError> {
    Err(BackendError::Unsupported("keyboard injection"))
}

#[cfg(not(any(windows, unix)))]
pub fn mouse_backend() -> Result<Box<dyn MouseBackend>, BackendError> {
    Err(BackendError::Unsupported("pointer injection"))
}

#[cfg(not(any(windows, unix)))]
pub fn mute_backend() -> Result<Box<dyn MuteBackend>, BackendError> {
    Err(BackendError::Unsupported("mute"))
}
