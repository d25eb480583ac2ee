//! Command lines a worker accepts, parsed into typed values.
//!
//! | Worker   | Line                        | Parsed as                                 |
//! |----------|-----------------------------|-------------------------------------------|
//! | keyboard | `text,"héllo"`              | `KeyboardCommand::Text("héllo")`          |
//! | keyboard | `key,84,ctrl+shift`         | `KeyboardCommand::Key { vk: 84, .. }`     |
//! | keyboard | `winkey`                    | `KeyboardCommand::WinKey`                 |
//! | mouse    | `move,-4,10`                | `MouseCommand::Move { dx: -4, dy: 10 }`   |
//! | mouse    | `moveto,640,360`            | `MouseCommand::MoveTo { x: 640, y: 360 }` |
//! | mouse    | `left` / `right` / `middle` | `MouseCommand::Click(..)`                 |
//! | mouse    | `scroll,-120`               | `MouseCommand::Scroll(-120)`              |
//! | mute     | `MUTE` / `UNMUTE`           | `MuteCommand::Mute` / `MuteCommand::Unmute` |

use std::str::FromStr;

use thiserror::Error;

// ── Protocol lines ────────────────────────────────────────────────────────────

/// Printed once, before the first command is read.
pub const READY_LINE: &str = "READY";

/// Ends the command loop.
pub const EXIT_LINE: &str = "EXIT";

/// Keyboard and mouse success reply.
pub const OK_LINE: &str = "OK";

/// Failure reply for every worker kind.
pub const ERR_LINE: &str = "ERR";

/// Mute worker success replies.
pub const MUTED_LINE: &str = "MUTED";
pub const UNMUTED_LINE: &str = "UNMUTED";

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a command line was rejected before reaching a backend.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command {0:?}")]
    Unknown(String),

    #[error("{command}: missing argument")]
    MissingArgument { command: &'static str },

    #[error("{command}: invalid argument {value:?}")]
    InvalidArgument { command: &'static str, value: String },

    #[error("unknown modifier {0:?}")]
    UnknownModifier(String),

    #[error("text payload is not a JSON string: {0}")]
    Text(#[from] serde_json::Error),
}

// ── Keyboard ──────────────────────────────────────────────────────────────────

/// A modifier held around a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Win,
}

impl FromStr for Modifier {
    type Err = CommandError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "ctrl" => Ok(Self::Ctrl),
            "alt" => Ok(Self::Alt),
            "shift" => Ok(Self::Shift),
            "win" => Ok(Self::Win),
            other => Err(CommandError::UnknownModifier(other.to_string())),
        }
    }
}

/// A keyboard worker command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyboardCommand {
    /// Type a literal string.
    Text(String),
    /// Tap one virtual key while `modifiers` are held, in the given order.
    Key { vk: u8, modifiers: Vec<Modifier> },
    /// Tap the Windows / Super key on its own.
    WinKey,
}

impl FromStr for KeyboardCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        if line == "winkey" {
            return Ok(Self::WinKey);
        }
        let (name, rest) = line.split_once(',').unwrap_or((line, ""));
        match name {
            // The payload is JSON so it may itself contain commas.
            "text" => Ok(Self::Text(serde_json::from_str(rest)?)),
            "key" => {
                let mut parts = rest.splitn(2, ',');
                let vk = number::<u8>("key", parts.next())?;
                let modifiers = match parts.next() {
                    Some(list) if !list.is_empty() => list
                        .split('+')
                        .map(str::parse)
                        .collect::<Result<Vec<Modifier>, _>>()?,
                    _ => Vec::new(),
                };
                Ok(Self::Key { vk, modifiers })
            }
            _ => Err(CommandError::Unknown(line.to_string())),
        }
    }
}

// ── Mouse ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// A mouse worker command.  Coordinates are screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseCommand {
    Move { dx: i32, dy: i32 },
    MoveTo { x: i32, y: i32 },
    Click(MouseButton),
    /// Wheel delta in Windows units (120 per notch, positive is away from the user).
    Scroll(i32),
}

impl FromStr for MouseCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split(',');
        let name = parts.next().unwrap_or_default();
        let command = match name {
            "left" => Self::Click(MouseButton::Left),
            "right" => Self::Click(MouseButton::Right),
            "middle" => Self::Click(MouseButton::Middle),
            "move" => Self::Move {
                dx: number("move", parts.next())?,
                dy: number("move", parts.next())?,
            },
            "moveto" => Self::MoveTo {
                x: number("moveto", parts.next())?,
                y: number("moveto", parts.next())?,
            },
            "scroll" => Self::Scroll(number("scroll", parts.next())?),
            _ => return Err(CommandError::Unknown(line.to_string())),
        };
        if parts.next().is_some() {
            return Err(CommandError::Unknown(line.to_string()));
        }
        Ok(command)
    }
}

// ── Mute ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteCommand {
    Mute,
    Unmute,
}

impl MuteCommand {
    /// Whether the command leaves the output muted.
    pub fn muted(self) -> bool {
        matches!(self, Self::Mute)
    }

    /// The success reply for this command.
    pub fn reply(self) -> &'static str {
        match self {
            Self::Mute => MUTED_LINE,
            Self::Unmute => UNMUTED_LINE,
        }
    }
}

impl FromStr for MuteCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line {
            "MUTE" => Ok(Self::Mute),
            "UNMUTE" => Ok(Self::Unmute),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn number<T: FromStr>(command: &'static str, value: Option<&str>) -> Result<T, CommandError> {
    let value = value.ok_or(CommandError::MissingArgument { command })?;
    value
        .trim()
        .parse()
        .map_err(|_| CommandError::InvalidArgument {
            command,
            value: value.to_string(),
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
