//! Backends that shell out to desktop helper programs.
//!
//! [`XdotoolBackend`] injects keys and pointer events on X11 desktops through
//! `xdotool`.  [`HelperMuteBackend`] sets the output mute flag with `pactl`
//! (PulseAudio / PipeWire) or `osascript` (macOS).
//!
//! Each command runs one helper process to completion.  That costs a few
//! milliseconds per event, which the host's reply deadline absorbs easily.

use std::borrow::Cow;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::application::backend::{BackendError, KeyboardBackend, MouseBackend, MuteBackend};
use crate::domain::command::{Modifier, MouseButton};

/// Windows wheel units per notch.
const WHEEL_DELTA: u32 = 120;

/// Runs helper programs.  Swapped out in tests to capture argv.
pub trait HelperRunner: Send {
    fn run(&mut self, program: &str, args: &[String]) -> Result<(), BackendError>;
}

/// Runs helpers as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl HelperRunner for SystemRunner {
    fn run(&mut self, program: &str, args: &[String]) -> Result<(), BackendError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| BackendError::Helper {
                program: program.to_string(),
                detail: e.to_string(),
            })?;
        if output.status.success() {
            return Ok(());
        }
        Err(BackendError::Helper {
            program: program.to_string(),
            detail: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        })
    }
}

// ── xdotool ───────────────────────────────────────────────────────────────────

const XDOTOOL: &str = "xdotool";

/// Keyboard and mouse through `xdotool`.
pub struct XdotoolBackend<R = SystemRunner> {
    runner: R,
}

impl XdotoolBackend<SystemRunner> {
    /// Checks that `xdotool` runs, so a missing helper fails the worker before
    /// it reports ready.
    pub fn connect() -> Result<Self, BackendError> {
        let mut runner = SystemRunner;
        runner.run(XDOTOOL, &["version".to_string()])?;
        Ok(Self { runner })
    }
}

impl<R: HelperRunner> XdotoolBackend<R> {
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    fn xdotool(&mut self, args: Vec<String>) -> Result<(), BackendError> {
        debug!(?args, "xdotool");
        self.runner.run(XDOTOOL, &args)
    }
}

impl<R: HelperRunner> KeyboardBackend for XdotoolBackend<R> {
    fn type_text(&mut self, text: &str) -> Result<(), BackendError> {
        if text.is_empty() {
            return Ok(());
        }
        self.xdotool(strings(&["type", "--delay", "0", "--", text]))
    }

    fn tap_key(&mut self, vk: u8, modifiers: &[Modifier]) -> Result<(), BackendError> {
        let keysym = keysym_for_vk(vk).ok_or(BackendError::InvalidKeyCode(vk))?;
        let mut combo: Vec<&str> = modifiers.iter().map(|m| modifier_keysym(*m)).collect();
        combo.push(&keysym);
        self.xdotool(strings(&["key", "--clearmodifiers", &combo.join("+")]))
    }

    fn tap_win(&mut self) -> Result<(), BackendError> {
        self.xdotool(strings(&["key", "Super_L"]))
    }
}

impl<R: HelperRunner> MouseBackend for XdotoolBackend<R> {
    fn move_by(&mut self, dx: i32, dy: i32) -> Result<(), BackendError> {
        if dx == 0 && dy == 0 {
            return Ok(());
        }
        self.xdotool(strings(&[
            "mousemove_relative",
            "--",
            &dx.to_string(),
            &dy.to_string(),
        ]))
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<(), BackendError> {
        self.xdotool(strings(&[
            "mousemove",
            &x.max(0).to_string(),
            &y.max(0).to_string(),
        ]))
    }

    fn click(&mut self, button: MouseButton) -> Result<(), BackendError> {
        let number = match button {
            MouseButton::Left => "1",
            MouseButton::Middle => "2",
            MouseButton::Right => "3",
        };
        self.xdotool(strings(&["click", number]))
    }

    fn scroll(&mut self, delta: i32) -> Result<(), BackendError> {
        if delta == 0 {
            return Ok(());
        }
        // X11 scrolls in whole notches: button 4 is up, 5 is down.
        let notches = delta.unsigned_abs().div_ceil(WHEEL_DELTA);
        let button = if delta > 0 { "4" } else { "5" };
        self.xdotool(strings(&[
            "click",
            "--repeat",
            &notches.to_string(),
            button,
        ]))
    }
}

fn modifier_keysym(modifier: Modifier) -> &'static str {
    match modifier {
        Modifier::Ctrl => "ctrl",
        Modifier::Alt => "alt",
        Modifier::Shift => "shift",
        Modifier::Win => "super",
    }
}

/// X keysym name for a Windows virtual-key code (US layout).
pub fn keysym_for_vk(vk: u8) -> Option<Cow<'static, str>> {
    let name = match vk {
        0x30..=0x39 | 0x41..=0x5A => {
            return Some(Cow::Owned((vk as char).to_ascii_lowercase().to_string()))
        }
        0x60..=0x69 => return Some(Cow::Owned(format!("KP_{}", vk - 0x60))),
        0x70..=0x87 => return Some(Cow::Owned(format!("F{}", vk - 0x6F))),
        0x08 => "BackSpace",
        0x09 => "Tab",
        0x0C => "Clear",
        0x0D => "Return",
        0x10 | 0xA0 => "Shift_L",
        0xA1 => "Shift_R",
        0x11 | 0xA2 => "Control_L",
        0xA3 => "Control_R",
        0x12 | 0xA4 => "Alt_L",
        0xA5 => "Alt_R",
        0x13 => "Pause",
        0x14 => "Caps_Lock",
        0x1B => "Escape",
        0x20 => "space",
        0x21 => "Prior",
        0x22 => "Next",
        0x23 => "End",
        0x24 => "Home",
        0x25 => "Left",
        0x26 => "Up",
        0x27 => "Right",
        0x28 => "Down",
        0x29 => "Select",
        0x2A | 0x2C => "Print",
        0x2B => "Execute",
        0x2D => "Insert",
        0x2E => "Delete",
        0x2F => "Help",
        0x5B => "Super_L",
        0x5C => "Super_R",
        0x5D => "Menu",
        0x6A => "KP_Multiply",
        0x6B => "KP_Add",
        0x6C => "KP_Separator",
        0x6D => "KP_Subtract",
        0x6E => "KP_Decimal",
        0x6F => "KP_Divide",
        0x90 => "Num_Lock",
        0x91 => "Scroll_Lock",
        0xA6 => "XF86Back",
        0xA7 => "XF86Forward",
        0xA8 => "XF86Refresh",
        0xA9 => "XF86Stop",
        0xAA => "XF86Search",
        0xAB => "XF86Favorites",
        0xAC => "XF86HomePage",
        0xAD => "XF86AudioMute",
        0xAE => "XF86AudioLowerVolume",
        0xAF => "XF86AudioRaiseVolume",
        0xB0 => "XF86AudioNext",
        0xB1 => "XF86AudioPrev",
        0xB2 => "XF86AudioStop",
        0xB3 => "XF86AudioPlay",
        0xBA => "semicolon",
        0xBB => "equal",
        0xBC => "comma",
        0xBD => "minus",
        0xBE => "period",
        0xBF => "slash",
        0xC0 => "grave",
        0xDB => "bracketleft",
        0xDC => "backslash",
        0xDD => "bracketright",
        0xDE => "apostrophe",
        _ => return None,
    };
    Some(Cow::Borrowed(name))
}

// ── Mute ──────────────────────────────────────────────────────────────────────

/// Mute through a helper program that takes the desired state as an argument.
pub struct HelperMuteBackend<R = SystemRunner> {
    program: &'static str,
    mute_args: Vec<String>,
    unmute_args: Vec<String>,
    runner: R,
}

impl<R: HelperRunner> HelperMuteBackend<R> {
    /// `pactl set-sink-mute @DEFAULT_SINK@ 1|0`.
    pub fn pactl(runner: R) -> Self {
        let args = |state: &str| strings(&["set-sink-mute", "@DEFAULT_SINK@", state]);
        Self {
            program: "pactl",
            mute_args: args("1"),
            unmute_args: args("0"),
            runner,
        }
    }

    /// `osascript -e "set volume output muted true|false"`.
    pub fn osascript(runner: R) -> Self {
        let args = |state: &str| strings(&["-e", &format!("set volume output muted {state}")]);
        Self {
            program: "osascript",
            mute_args: args("true"),
            unmute_args: args("false"),
            runner,
        }
    }
}

impl<R: HelperRunner> MuteBackend for HelperMuteBackend<R> {
    fn set_muted(&mut self, muted: bool) -> Result<(), BackendError> {
        let args = if muted {
            &self.mute_args
        } else {
            &self.unmute_args
        };
        debug!(program = self.program, ?args, "mute helper");
        self.runner.run(self.program, args)
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
