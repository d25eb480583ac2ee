//! Parses the lines typed into the remote's terminal.
//!
//! Anything that does not start with `/` is typed on the host as text.  A
//! leading `//` sends the rest of the line, starting with one `/`, as text.
//!
//! | Line                              | Sends                                    |
//! |-----------------------------------|------------------------------------------|
//! | `hello world`                     | `text{"hello world"}`                    |
//! | `/key Enter [ctrl] [alt] ...`     | `key{key, modifiers}`                    |
//! | `/shortcut Ctrl+Shift+T`          | `shortcut{combo}`                        |
//! | `/move 10 -4`                     | `mouse{move, dx, dy}`                    |
//! | `/moveto 640 360`                 | `mouse{moveto, x, y}`                    |
//! | `/click [left\|right\|middle]`    | `mouse{left\|right\|middle}`             |
//! | `/scroll -3`                      | `mouse{scroll, delta}`                   |
//! | `/screen start\|stop`             | `screen{action}`                         |
//! | `/audio start\|stop`              | `audio{action}`                          |
//! | `/reconnect`, `/quit`, `/help`    | handled locally                          |

use keymote_core::protocol::messages::{ClientMessage, Modifiers, MouseAction, StreamAction};
use thiserror::Error;

/// Help text printed for `/help`.
pub const HELP: &str = "\
commands:
  <text>                      type text on the host
  /key <name> [ctrl alt shift win]
  /shortcut <combo>           e.g. Ctrl+Shift+T
  /move <dx> <dy>             relative pointer move
  /moveto <x> <y>             absolute pointer move
  /click [left|right|middle]
  /scroll <delta>
  /screen start|stop
  /audio start|stop
  /reconnect                  reconnect now
  /quit";

/// One parsed terminal line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(ClientMessage),
    Reconnect,
    Quit,
    Help,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command /{0} (try /help)")]
    UnknownCommand(String),

    #[error("/{command} needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("not a number: {0}")]
    InvalidNumber(String),

    #[error("unknown modifier {0}")]
    InvalidModifier(String),

    #[error("expected {expected}, got {got}")]
    InvalidAction {
        expected: &'static str,
        got: String,
    },
}

/// Parses one line.  Returns `Ok(None)` for a blank line.
pub fn parse_line(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    if let Some(escaped) = line.strip_prefix("//") {
        return Ok(Some(text(format!("/{escaped}"))));
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(text(line.to_string())));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let command = match name {
        "key" => {
            let key = words.next().ok_or(CommandError::MissingArgument {
                command: "key",
                argument: "a key name",
            })?;
            Command::Send(ClientMessage::Key {
                key: key.to_string(),
                modifiers: parse_modifiers(words)?,
                id: None,
            })
        }
        "shortcut" => {
            let combo = words.collect::<Vec<_>>().join("");
            if combo.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "shortcut",
                    argument: "a combo such as Ctrl+C",
                });
            }
            Command::Send(ClientMessage::Shortcut {
                combo: Some(combo),
                key: None,
                modifiers: Modifiers::default(),
                id: None,
            })
        }
        "move" => {
            let (dx, dy) = pair(&mut words, "move", "<dx> <dy>")?;
            Command::Send(mouse(MouseAction::Move, (dx, dy), (0.0, 0.0), 0.0))
        }
        "moveto" => {
            let (x, y) = pair(&mut words, "moveto", "<x> <y>")?;
            Command::Send(mouse(MouseAction::MoveTo, (0.0, 0.0), (x, y), 0.0))
        }
        "click" => {
            let action = match words.next().unwrap_or("left") {
                "left" => MouseAction::Left,
                "right" => MouseAction::Right,
                "middle" => MouseAction::Middle,
                other => {
                    return Err(CommandError::InvalidAction {
                        expected: "left, right or middle",
                        got: other.to_string(),
                    })
                }
            };
            Command::Send(mouse(action, (0.0, 0.0), (0.0, 0.0), 0.0))
        }
        "scroll" => {
            let delta = number(words.next(), "scroll", "<delta>")?;
            Command::Send(mouse(MouseAction::Scroll, (0.0, 0.0), (0.0, 0.0), delta))
        }
        "screen" => Command::Send(ClientMessage::Screen {
            action: stream_action(words.next(), "screen")?,
        }),
        "audio" => Command::Send(ClientMessage::Audio {
            action: stream_action(words.next(), "audio")?,
        }),
        "reconnect" => Command::Reconnect,
        "quit" | "exit" => Command::Quit,
        "help" => Command::Help,
        other => return Err(CommandError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

fn text(text: String) -> Command {
    Command::Send(ClientMessage::Text { text, id: None })
}

fn mouse(action: MouseAction, (dx, dy): (f64, f64), (x, y): (f64, f64), delta: f64) -> ClientMessage {
    ClientMessage::Mouse {
        action,
        dx,
        dy,
        x,
        y,
        delta,
        id: None,
    }
}

fn number(word: Option<&str>, command: &'static str, argument: &'static str) -> Result<f64, CommandError> {
    let word = word.ok_or(CommandError::MissingArgument { command, argument })?;
    word.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CommandError::InvalidNumber(word.to_string()))
}

fn pair<'a>(
    words: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
    argument: &'static str,
) -> Result<(f64, f64), CommandError> {
    let a = number(words.next(), command, argument)?;
    let b = number(words.next(), command, argument)?;
    Ok((a, b))
}

fn parse_modifiers<'a>(words: impl Iterator<Item = &'a str>) -> Result<Modifiers, CommandError> {
    let mut modifiers = Modifiers::default();
    for word in words {
        match word.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => modifiers.ctrl = true,
            "alt" => modifiers.alt = true,
            "shift" => modifiers.shift = true,
            "win" | "meta" | "cmd" | "super" => modifiers.win = true,
            _ => return Err(CommandError::InvalidModifier(word.to_string())),
        }
    }
    Ok(modifiers)
}

fn stream_action(word: Option<&str>, command: &'static str) -> Result<StreamAction, CommandError> {
    match word {
        Some("start") => Ok(StreamAction::Start),
        Some("stop") => Ok(StreamAction::Stop),
        Some(other) => Err(CommandError::InvalidAction {
            expected: "start or stop",
            got: other.to_string(),
        }),
        None => Err(CommandError::MissingArgument {
            command,
            argument: "start or stop",
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
