//! OS actuator traits.
//!
//! Each worker drives one of these.  The platform implementations live in the
//! infrastructure layer; tests use the `mockall`-generated mocks.

use thiserror::Error;

use crate::domain::command::{Modifier, MouseButton};

/// Error type for OS actuation.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("platform error: {0}")]
    Platform(String),

    #[error("virtual-key code {0} has no mapping on this platform")]
    InvalidKeyCode(u8),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("helper program {program} failed: {detail}")]
    Helper { program: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Injects key presses and text.
#[cfg_attr(test, mockall::automock)]
pub trait KeyboardBackend: Send {
    /// Types `text` as if entered on a keyboard.
    fn type_text(&mut self, text: &str) -> Result<(), BackendError>;

    /// Presses `modifiers` in order, taps `vk`, then releases them in reverse.
    fn tap_key(&mut self, vk: u8, modifiers: &[Modifier]) -> Result<(), BackendError>;

    /// Taps the Windows / Super key on its own.
    fn tap_win(&mut self) -> Result<(), BackendError>;
}

/// Moves the pointer, clicks, and scrolls.
#[cfg_attr(test, mockall::automock)]
pub trait MouseBackend: Send {
    fn move_by(&mut self, dx: i32, dy: i32) -> Result<(), BackendError>;

    fn move_to(&mut self, x: i32, y: i32) -> Result<(), BackendError>;

    /// Press and release of one button.
    fn click(&mut self, button: MouseButton) -> Result<(), BackendError>;

    /// Vertical wheel, in Windows delta units (120 per notch).
    fn scroll(&mut self, delta: i32) -> Result<(), BackendError>;
}

/// Sets the default output device's mute flag.
#[cfg_attr(test, mockall::automock)]
pub trait MuteBackend: Send {
    /// Sets the flag explicitly; this is never a toggle.
    fn set_muted(&mut self, muted: bool) -> Result<(), BackendError>;
}
