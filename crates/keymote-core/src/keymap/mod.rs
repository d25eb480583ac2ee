//! Symbolic key names for keyboard injection.
//!
//! Remotes name keys the way a browser's `KeyboardEvent.key` does (`"Enter"`,
//! `"ArrowLeft"`, `"F5"`) plus a few friendlier aliases (`"Win"`, `"Esc"`).
//! The host resolves each name to a Windows virtual-key code, which is what
//! the keyboard worker process injects.

pub mod windows_vk;

use std::fmt;

/// A Windows virtual-key code (`VK_*` in `winuser.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u8);

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Names that mean "the meta / Super / Windows key" on their own.
///
/// A standalone press of one of these opens the start menu, which the keyboard
/// worker handles with a dedicated command.
pub const META_KEY_NAMES: &[&str] = &["Win", "Windows", "Meta"];

/// Resolves a symbolic key name to its virtual-key code.
///
/// The exact name is tried first, then its ASCII-uppercased form, so `"a"`
/// resolves like `"A"`.  Returns `None` for names not in the table.
///
/// # Examples
///
/// ```rust
/// use keymote_core::keymap::{resolve_key, KeyCode};
///
/// assert_eq!(resolve_key("Enter"), Some(KeyCode(0x0D)));
/// assert_eq!(resolve_key("q"), Some(KeyCode(0x51)));
/// assert_eq!(resolve_key("Hyper"), None);
/// ```
pub fn resolve_key(name: &str) -> Option<KeyCode> {
    windows_vk::lookup(name)
        .or_else(|| windows_vk::lookup(&name.to_ascii_uppercase()))
        .map(KeyCode)
}

/// Returns `true` if `name` is one of the [`META_KEY_NAMES`].
pub fn is_meta_key(name: &str) -> bool {
    META_KEY_NAMES.contains(&name)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
