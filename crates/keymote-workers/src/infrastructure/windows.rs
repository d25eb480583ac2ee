//! Windows backends: SendInput for keys and buttons, the cursor API for
//! pointer moves, and Core Audio for the mute flag.

#![cfg(target_os = "windows")]

use windows::Win32::Foundation::{BOOL, POINT};
use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
use windows::Win32::Media::Audio::{eConsole, eRender, IMMDeviceEnumerator, MMDeviceEnumerator};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CLSCTX_ALL, COINIT_MULTITHREADED,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, KEYEVENTF_UNICODE, MOUSEEVENTF_LEFTDOWN,
    MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_RIGHTDOWN,
    MOUSEEVENTF_RIGHTUP, MOUSEEVENTF_WHEEL, MOUSEINPUT, MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{GetCursorPos, SetCursorPos};

use crate::application::backend::{BackendError, KeyboardBackend, MouseBackend, MuteBackend};
use crate::domain::command::{Modifier, MouseButton};

const VK_RETURN: u8 = 0x0D;
const VK_TAB: u8 = 0x09;
const VK_SHIFT: u8 = 0x10;
const VK_CONTROL: u8 = 0x11;
const VK_MENU: u8 = 0x12;
const VK_LWIN: u8 = 0x5B;

/// Keys that need `KEYEVENTF_EXTENDEDKEY`: navigation, Insert/Delete, the
/// Windows keys, right Ctrl/Alt, and numpad divide.
const EXTENDED_VKS: &[u8] = &[
    0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x2D, 0x2E, 0x5B, 0x5C, 0x5D, 0x6F, 0xA3,
    0xA5,
];

// ── Keyboard ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct SendInputKeyboard;

impl KeyboardBackend for SendInputKeyboard {
    fn type_text(&mut self, text: &str) -> Result<(), BackendError> {
        let mut inputs = Vec::with_capacity(text.len() * 2);
        for ch in text.chars() {
            match ch {
                '\r' => {}
                '\n' => inputs.extend(tap(VK_RETURN)),
                '\t' => inputs.extend(tap(VK_TAB)),
                _ => {
                    let mut units = [0u16; 2];
                    for unit in ch.encode_utf16(&mut units).iter() {
                        inputs.push(unicode_input(*unit, false));
                        inputs.push(unicode_input(*unit, true));
                    }
                }
            }
        }
        send(&inputs)
    }

    fn tap_key(&mut self, vk: u8, modifiers: &[Modifier]) -> Result<(), BackendError> {
        let held: Vec<u8> = modifiers.iter().map(|m| modifier_vk(*m)).collect();
        let mut inputs = Vec::with_capacity(held.len() * 2 + 2);
        inputs.extend(held.iter().map(|m| key_input(*m, false)));
        inputs.extend(tap(vk));
        inputs.extend(held.iter().rev().map(|m| key_input(*m, true)));
        send(&inputs)
    }

    fn tap_win(&mut self) -> Result<(), BackendError> {
        send(&tap(VK_LWIN))
    }
}

fn modifier_vk(modifier: Modifier) -> u8 {
    match modifier {
        Modifier::Ctrl => VK_CONTROL,
        Modifier::Alt => VK_MENU,
        Modifier::Shift => VK_SHIFT,
        Modifier::Win => VK_LWIN,
    }
}

fn tap(vk: u8) -> [INPUT; 2] {
    [key_input(vk, false), key_input(vk, true)]
}

fn key_input(vk: u8, key_up: bool) -> INPUT {
    let mut flags = KEYBD_EVENT_FLAGS(0);
    if key_up {
        flags |= KEYEVENTF_KEYUP;
    }
    if EXTENDED_VKS.contains(&vk) {
        flags |= KEYEVENTF_EXTENDEDKEY;
    }
    keyboard_input(VIRTUAL_KEY(vk as u16), 0, flags)
}

fn unicode_input(unit: u16, key_up: bool) -> INPUT {
    let mut flags = KEYEVENTF_UNICODE;
    if key_up {
        flags |= KEYEVENTF_KEYUP;
    }
    keyboard_input(VIRTUAL_KEY(0), unit, flags)
}

fn keyboard_input(vk: VIRTUAL_KEY, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

// ── Mouse ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct SendInputMouse;

impl MouseBackend for SendInputMouse {
    fn move_by(&mut self, dx: i32, dy: i32) -> Result<(), BackendError> {
        let mut point = POINT::default();
        // SAFETY: `point` is a valid, writable POINT on the stack.
        unsafe { GetCursorPos(&mut point) }.map_err(platform)?;
        // SAFETY: SetCursorPos takes plain integers and clamps to the desktop.
        unsafe { SetCursorPos(point.x + dx, point.y + dy) }.map_err(platform)
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<(), BackendError> {
        // SAFETY: as above.
        unsafe { SetCursorPos(x, y) }.map_err(platform)
    }

    fn click(&mut self, button: MouseButton) -> Result<(), BackendError> {
        let (down, up) = match button {
            MouseButton::Left => (MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP),
            MouseButton::Right => (MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP),
            MouseButton::Middle => (MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP),
        };
        send(&[mouse_input(down, 0), mouse_input(up, 0)])
    }

    fn scroll(&mut self, delta: i32) -> Result<(), BackendError> {
        if delta == 0 {
            return Ok(());
        }
        send(&[mouse_input(MOUSEEVENTF_WHEEL, delta as u32)])
    }
}

fn mouse_input(flags: MOUSE_EVENT_FLAGS, data: u32) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: data,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

// ── Mute ──────────────────────────────────────────────────────────────────────

/// Sets the mute flag of the default render endpoint.
///
/// The endpoint is looked up on every call, so switching the default output
/// device while the host runs is picked up.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreAudioMute;

impl CoreAudioMute {
    /// Initialises COM on the calling thread and checks an endpoint exists.
    pub fn connect() -> Result<Self, BackendError> {
        endpoint_volume()?;
        Ok(Self)
    }
}

impl MuteBackend for CoreAudioMute {
    fn set_muted(&mut self, muted: bool) -> Result<(), BackendError> {
        let volume = endpoint_volume()?;
        // SAFETY: `volume` is a live interface; a null event context is allowed.
        unsafe { volume.SetMute(BOOL::from(muted), std::ptr::null()) }.map_err(platform)
    }
}

fn endpoint_volume() -> Result<IAudioEndpointVolume, BackendError> {
    // SAFETY: COM calls on the worker's only thread; a repeated CoInitializeEx
    // returns S_FALSE, which `ok()` accepts.
    unsafe {
        CoInitializeEx(None, COINIT_MULTITHREADED)
            .ok()
            .map_err(platform)?;
        let enumerator: IMMDeviceEnumerator =
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(platform)?;
        let device = enumerator
            .GetDefaultAudioEndpoint(eRender, eConsole)
            .map_err(platform)?;
        device.Activate(CLSCTX_ALL, None).map_err(platform)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn send(inputs: &[INPUT]) -> Result<(), BackendError> {
    if inputs.is_empty() {
        return Ok(());
    }
    // SAFETY: every element is a fully initialised INPUT.
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize == inputs.len() {
        Ok(())
    } else {
        // Typically UIPI: the foreground window runs at a higher integrity level.
        Err(BackendError::Platform(format!(
            "SendInput injected {sent} of {} events",
            inputs.len()
        )))
    }
}

fn platform(e: windows::core::Error) -> BackendError {
    BackendError::Platform(e.to_string())
}
