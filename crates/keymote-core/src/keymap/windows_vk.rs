//! Symbolic key name to Windows Virtual Key (VK) code table.
//!
//! Reference: Windows Virtual-Key Codes (winuser.h).
//!
//! # What is a Windows Virtual Key (VK) code?
//!
//! Windows assigns each keyboard key a number called a "Virtual Key code".
//! They are "virtual" because they represent *logical* keys rather than
//! physical scan codes: pressing the letter A on any keyboard layout always
//! produces `VK_A = 0x41`.
//!
//! # How this table works
//!
//! `KEY_NAMES` is a compile-time constant slice of `(name, vk)` pairs.  Several
//! names may share one code (`"Win"`, `"Meta"` and `"LeftWin"` are all
//! `VK_LWIN`).  A lookup is a linear scan; the table is small enough that this
//! stays in the sub-microsecond range (see `benches/keymap_bench.rs`).

/// Looks up the VK code for an exact key name.
pub fn lookup(name: &str) -> Option<u8> {
    KEY_NAMES
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|&(_, vk)| vk)
}

/// Returns every `(name, vk)` pair in the table.
pub fn entries() -> &'static [(&'static str, u8)] {
    KEY_NAMES
}

/// Complete name → VK mapping.
///
/// Reference: https://learn.microsoft.com/windows/win32/inputdev/virtual-key-codes
const KEY_NAMES: &[(&str, u8)] = &[
    // Editing and control
    ("Backspace", 0x08),
    ("Tab", 0x09),
    ("Clear", 0x0C),
    ("Enter", 0x0D),
    ("Return", 0x0D),
    ("Shift", 0x10),
    ("Control", 0x11),
    ("Ctrl", 0x11),
    ("Alt", 0x12),
    ("Pause", 0x13),
    ("CapsLock", 0x14),
    ("Escape", 0x1B),
    ("Esc", 0x1B),
    ("Space", 0x20),
    (" ", 0x20),
    // Navigation
    ("PageUp", 0x21),
    ("PageDown", 0x22),
    ("End", 0x23),
    ("Home", 0x24),
    ("ArrowLeft", 0x25),
    ("ArrowUp", 0x26),
    ("ArrowRight", 0x27),
    ("ArrowDown", 0x28),
    ("Select", 0x29),
    ("Print", 0x2A),
    ("Execute", 0x2B),
    ("PrintScreen", 0x2C),
    ("Insert", 0x2D),
    ("Delete", 0x2E),
    ("Del", 0x2E),
    ("Help", 0x2F),
    // Digits
    ("0", 0x30),
    ("1", 0x31),
    ("2", 0x32),
    ("3", 0x33),
    ("4", 0x34),
    ("5", 0x35),
    ("6", 0x36),
    ("7", 0x37),
    ("8", 0x38),
    ("9", 0x39),
    // Letters
    ("A", 0x41),
    ("B", 0x42),
    ("C", 0x43),
    ("D", 0x44),
    ("E", 0x45),
    ("F", 0x46),
    ("G", 0x47),
    ("H", 0x48),
    ("I", 0x49),
    ("J", 0x4A),
    ("K", 0x4B),
    ("L", 0x4C),
    ("M", 0x4D),
    ("N", 0x4E),
    ("O", 0x4F),
    ("P", 0x50),
    ("Q", 0x51),
    ("R", 0x52),
    ("S", 0x53),
    ("T", 0x54),
    ("U", 0x55),
    ("V", 0x56),
    ("W", 0x57),
    ("X", 0x58),
    ("Y", 0x59),
    ("Z", 0x5A),
    // Windows keys
    ("Meta", 0x5B),
    ("Win", 0x5B),
    ("Windows", 0x5B),
    ("LeftWin", 0x5B),
    ("RightWin", 0x5C),
    ("ContextMenu", 0x5D),
    ("Apps", 0x5D),
    // Numpad
    ("Numpad0", 0x60),
    ("Numpad1", 0x61),
    ("Numpad2", 0x62),
    ("Numpad3", 0x63),
    ("Numpad4", 0x64),
    ("Numpad5", 0x65),
    ("Numpad6", 0x66),
    ("Numpad7", 0x67),
    ("Numpad8", 0x68),
    ("Numpad9", 0x69),
    ("NumpadMultiply", 0x6A),
    ("Multiply", 0x6A),
    ("NumpadAdd", 0x6B),
    ("Add", 0x6B),
    ("NumpadSeparator", 0x6C),
    ("NumpadSubtract", 0x6D),
    ("Subtract", 0x6D),
    ("NumpadDecimal", 0x6E),
    ("Decimal", 0x6E),
    ("NumpadDivide", 0x6F),
    ("Divide", 0x6F),
    // Function keys
    ("F1", 0x70),
    ("F2", 0x71),
    ("F3", 0x72),
    ("F4", 0x73),
    ("F5", 0x74),
    ("F6", 0x75),
    ("F7", 0x76),
    ("F8", 0x77),
    ("F9", 0x78),
    ("F10", 0x79),
    ("F11", 0x7A),
    ("F12", 0x7B),
    ("F13", 0x7C),
    ("F14", 0x7D),
    ("F15", 0x7E),
    ("F16", 0x7F),
    ("F17", 0x80),
    ("F18", 0x81),
    ("F19", 0x82),
    ("F20", 0x83),
    ("F21", 0x84),
    ("F22", 0x85),
    ("F23", 0x86),
    ("F24", 0x87),
    // Locks
    ("NumLock", 0x90),
    ("ScrollLock", 0x91),
    // Left/right modifiers
    ("ShiftLeft", 0xA0),
    ("LeftShift", 0xA0),
    ("ShiftRight", 0xA1),
    ("RightShift", 0xA1),
    ("ControlLeft", 0xA2),
    ("LeftControl", 0xA2),
    ("ControlRight", 0xA3),
    ("RightControl", 0xA3),
    ("AltLeft", 0xA4),
    ("LeftAlt", 0xA4),
    ("AltRight", 0xA5),
    ("RightAlt", 0xA5),
    // Browser
    ("BrowserBack", 0xA6),
    ("BrowserForward", 0xA7),
    ("BrowserRefresh", 0xA8),
    ("BrowserStop", 0xA9),
    ("BrowserSearch", 0xAA),
    ("BrowserFavorites", 0xAB),
    ("BrowserHome", 0xAC),
    // Media
    ("VolumeMute", 0xAD),
    ("VolumeDown", 0xAE),
    ("VolumeUp", 0xAF),
    ("MediaNextTrack", 0xB0),
    ("MediaPrevTrack", 0xB1),
    ("MediaStop", 0xB2),
    ("MediaPlayPause", 0xB3),
    // OEM punctuation (US layout)
    ("Semicolon", 0xBA),
    (";", 0xBA),
    ("Equal", 0xBB),
    ("=", 0xBB),
    ("Comma", 0xBC),
    (",", 0xBC),
    ("Minus", 0xBD),
    ("-", 0xBD),
    ("Period", 0xBE),
    (".", 0xBE),
    ("Slash", 0xBF),
    ("/", 0xBF),
    ("Backquote", 0xC0),
    ("`", 0xC0),
    ("BracketLeft", 0xDB),
    ("[", 0xDB),
    ("Backslash", 0xDC),
    ("\\", 0xDC),
    ("BracketRight", 0xDD),
    ("]", 0xDD),
    ("Quote", 0xDE),
    ("'", 0xDE),
];

// ── Tests ─────────────────────────────────────────────────────────────────────
