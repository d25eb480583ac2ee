//! Command Translator: typed input events to worker command lines.
//!
//! Each [`InputEvent`] becomes exactly one [`WorkerCommand`]:
//!
//! | Event                      | Worker   | Line                          |
//! |----------------------------|----------|-------------------------------|
//! | `Text("hi")`               | keyboard | `text,"hi"`                   |
//! | `Key("Enter", ctrl)`       | keyboard | `key,13,ctrl`                 |
//! | `Key("Win", none)`         | keyboard | `winkey`                      |
//! | `Shortcut("Ctrl+Shift+T")` | keyboard | `key,84,ctrl+shift`           |
//! | `MouseMove(3.4, -1.6)`     | mouse    | `move,3,-2`                   |
//! | `MouseAbsolute(10, 20)`    | mouse    | `moveto,10,20`                |
//! | `MouseButton(Left)`        | mouse    | `left`                        |
//! | `MouseScroll(-3)`          | mouse    | `scroll,-3`                   |
//!
//! Text is JSON-encoded so commas and newlines inside it cannot break the
//! one-command-per-line framing.
//!
//! [`InputPipeline`] pairs the translator with the keyboard and mouse
//! [`WorkerProcessManager`]s, so the router never touches a worker directly.

use std::future::Future;

use keymote_core::keymap::{is_meta_key, resolve_key};
use keymote_core::protocol::messages::Modifiers;
use thiserror::Error;

use crate::application::worker::{WorkerError, WorkerProcessManager};
use crate::domain::command::WorkerCommand;
use crate::domain::input::{InputEvent, MouseButton};

/// Keyboard line for a standalone meta key press.
pub const WIN_KEY_COMMAND: &str = "winkey";

/// Translation failures.  A failed translation submits nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("unknown key: {0:?}")]
    UnknownKey(String),
}

/// Translates one input event into its worker command.
///
/// # Errors
///
/// Returns [`TranslateError::UnknownKey`] if a key name (or a combo's key)
/// is not in the key table.
pub fn translate(event: &InputEvent) -> Result<WorkerCommand, TranslateError> {
    let command = match event {
        InputEvent::Text(text) => WorkerCommand::Keyboard(format!("text,{}", json_string(text))),
        InputEvent::Key { name, modifiers } => key_command(name, *modifiers)?,
        InputEvent::Shortcut(combo) => {
            let (name, modifiers) = parse_combo(combo)?;
            key_command(&name, modifiers)?
        }
        InputEvent::MouseMove { dx, dy } => {
            WorkerCommand::Mouse(format!("move,{},{}", round(*dx), round(*dy)))
        }
        InputEvent::MouseAbsolute { x, y } => {
            WorkerCommand::Mouse(format!("moveto,{},{}", round(*x), round(*y)))
        }
        InputEvent::MouseButton(button) => {
            let line = match button {
                MouseButton::Left => "left",
                MouseButton::Right => "right",
                MouseButton::Middle => "middle",
            };
            WorkerCommand::Mouse(line.to_string())
        }
        InputEvent::MouseScroll { delta } => {
            WorkerCommand::Mouse(format!("scroll,{}", round(*delta)))
        }
    };
    Ok(command)
}

fn key_command(name: &str, modifiers: Modifiers) -> Result<WorkerCommand, TranslateError> {
    if is_meta_key(name) && !modifiers.has_non_meta() {
        return Ok(WorkerCommand::Keyboard(WIN_KEY_COMMAND.to_string()));
    }

    let vk = resolve_key(name).ok_or_else(|| TranslateError::UnknownKey(name.to_string()))?;
    let mut line = format!("key,{vk}");
    let held = modifier_list(modifiers);
    if !held.is_empty() {
        line.push(',');
        line.push_str(&held.join("+"));
    }
    Ok(WorkerCommand::Keyboard(line))
}

/// Held modifiers in the fixed order the keyboard worker presses them.
fn modifier_list(modifiers: Modifiers) -> Vec<&'static str> {
    [
        (modifiers.ctrl, "ctrl"),
        (modifiers.alt, "alt"),
        (modifiers.shift, "shift"),
        (modifiers.win, "win"),
    ]
    .into_iter()
    .filter_map(|(held, name)| held.then_some(name))
    .collect()
}

/// Splits a combo such as `"Ctrl+Shift+T"` into its key and modifiers.
///
/// Modifier names are case-insensitive.  A combo made only of modifiers that
/// includes the meta key (`"Win"`, `"Ctrl+Win"`) presses the meta key itself.
///
/// # Errors
///
/// [`TranslateError::UnknownKey`] (carrying the whole combo) if the combo has
/// no key, or more than one non-modifier part.
pub fn parse_combo(combo: &str) -> Result<(String, Modifiers), TranslateError> {
    let mut modifiers = Modifiers::default();
    let mut key: Option<&str> = None;

    for part in combo.split('+').map(str::trim).filter(|p| !p.is_empty()) {
        match part.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => modifiers.ctrl = true,
            "alt" | "option" => modifiers.alt = true,
            "shift" => modifiers.shift = true,
            "win" | "windows" | "meta" | "super" | "cmd" | "command" => modifiers.win = true,
            _ if key.is_none() => key = Some(part),
            _ => return Err(TranslateError::UnknownKey(combo.to_string())),
        }
    }

    match key {
        Some(key) => Ok((key.to_string(), modifiers)),
        None if modifiers.win => {
            modifiers.win = false;
            Ok(("Win".to_string(), modifiers))
        }
        None => Err(TranslateError::UnknownKey(combo.to_string())),
    }
}

fn json_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

/// Rounds half-way values towards positive infinity, the convention remotes
/// use for their own pointer maths (`-2.5` becomes `-2`).
fn round(value: f64) -> i64 {
    if value.is_finite() {
        (value + 0.5).floor() as i64
    } else {
        0
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// The keyboard and mouse workers behind one dispatch call.
#[derive(Clone)]
pub struct InputPipeline {
    keyboard: WorkerProcessManager,
    mouse: WorkerProcessManager,
}

impl InputPipeline {
    pub fn new(keyboard: WorkerProcessManager, mouse: WorkerProcessManager) -> Self {
        Self { keyboard, mouse }
    }

    /// Translates `event` and submits it to its worker.
    ///
    /// The submission happens before this returns, so calls made in order
    /// reach the worker in order even if the returned futures are awaited
    /// elsewhere.  Nothing is submitted when translation fails.
    pub fn dispatch(
        &self,
        event: &InputEvent,
    ) -> Result<impl Future<Output = Result<(), WorkerError>> + Send + 'static, TranslateError> {
        let command = translate(event)?;
        let worker = match &command {
            WorkerCommand::Keyboard(_) => &self.keyboard,
            WorkerCommand::Mouse(_) => &self.mouse,
        };
        Ok(worker.submit(command.into_payload()))
    }

    /// Spawns both workers ahead of the first event.
    pub fn warm_up(&self) {
        self.keyboard.start();
        self.mouse.start();
    }

    /// Stops both workers.
    pub async fn stop(&self) {
        tokio::join!(self.keyboard.stop(), self.mouse.stop());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::command::WorkerKind;
    use crate::domain::config::WorkerTimings;
    use crate::infrastructure::worker::mock::ScriptedLauncher;

    fn key(name: &str, modifiers: Modifiers) -> InputEvent {
        InputEvent::Key {
            name: name.to_string(),
            modifiers,
        }
    }

    fn ctrl() -> Modifiers {
        Modifiers {
            ctrl: true,
            ..Modifiers::default()
        }
    }

    #[test]
    fn test_text_is_json_encoded() {
        let cmd = translate(&InputEvent::Text("a,b\n\"c\"".to_string())).unwrap();
        assert_eq!(cmd, WorkerCommand::Keyboard(r#"text,"a,b\n\"c\"""#.to_string()));
    }

    #[test]
    fn test_key_without_modifiers() {
        let cmd = translate(&key("Enter", Modifiers::default())).unwrap();
        assert_eq!(cmd.payload(), "key,13");
    }

    #[test]
    fn test_key_with_modifiers_lists_them_in_fixed_order() {
        // Arrange
        let modifiers = Modifiers {
            ctrl: true,
            alt: false,
            shift: true,
            win: true,
        };

        // Act
        let cmd = translate(&key("c", modifiers)).unwrap();

        // Assert
        assert_eq!(cmd.payload(), "key,67,ctrl+shift+win");
    }

    #[test]
    fn test_standalone_meta_key_is_winkey() {
        for name in ["Win", "Windows", "Meta"] {
            let cmd = translate(&key(name, Modifiers::default())).unwrap();
            assert_eq!(cmd, WorkerCommand::Keyboard("winkey".to_string()));
        }
    }

    #[test]
    fn test_meta_key_with_only_win_modifier_is_still_winkey() {
        let modifiers = Modifiers {
            win: true,
            ..Modifiers::default()
        };
        let cmd = translate(&key("Win", modifiers)).unwrap();
        assert_eq!(cmd.payload(), "winkey");
    }

    #[test]
    fn test_meta_key_with_ctrl_is_a_normal_key_press() {
        let cmd = translate(&key("Win", ctrl())).unwrap();
        assert_eq!(cmd.payload(), "key,91,ctrl");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = translate(&key("Hyper", Modifiers::default())).unwrap_err();
        assert_eq!(err, TranslateError::UnknownKey("Hyper".to_string()));
    }

    #[test]
    fn test_shortcut_combo_is_parsed() {
        let cmd = translate(&InputEvent::Shortcut("Ctrl+Shift+T".to_string())).unwrap();
        assert_eq!(cmd.payload(), "key,84,ctrl+shift");
    }

    #[test]
    fn test_parse_combo_accepts_mac_names_and_spaces() {
        let (name, modifiers) = parse_combo("cmd + option + Escape").unwrap();
        assert_eq!(name, "Escape");
        assert!(modifiers.win && modifiers.alt);
        assert!(!modifiers.ctrl && !modifiers.shift);
    }

    #[test]
    fn test_parse_combo_meta_only_presses_meta_key() {
        assert_eq!(
            translate(&InputEvent::Shortcut("Win".to_string()))
                .unwrap()
                .payload(),
            "winkey"
        );
        assert_eq!(
            translate(&InputEvent::Shortcut("Ctrl+Win".to_string()))
                .unwrap()
                .payload(),
            "key,91,ctrl"
        );
    }

    #[test]
    fn test_parse_combo_rejects_two_keys_and_no_key() {
        assert!(parse_combo("A+B").is_err());
        assert!(parse_combo("Ctrl+Shift").is_err());
        assert!(parse_combo("").is_err());
    }

    #[test]
    fn test_mouse_values_are_rounded() {
        let moved = translate(&InputEvent::MouseMove { dx: 3.4, dy: -1.6 }).unwrap();
        let half = translate(&InputEvent::MouseScroll { delta: -2.5 }).unwrap();
        let abs = translate(&InputEvent::MouseAbsolute { x: 10.5, y: 20.0 }).unwrap();

        assert_eq!(moved, WorkerCommand::Mouse("move,3,-2".to_string()));
        assert_eq!(half.payload(), "scroll,-2");
        assert_eq!(abs.payload(), "moveto,11,20");
    }

    #[test]
    fn test_mouse_buttons() {
        let right = translate(&InputEvent::MouseButton(MouseButton::Right)).unwrap();
        assert_eq!(right, WorkerCommand::Mouse("right".to_string()));
    }

    #[test]
    fn test_non_finite_coordinates_become_zero() {
        let cmd = translate(&InputEvent::MouseMove {
            dx: f64::NAN,
            dy: f64::INFINITY,
        })
        .unwrap();
        assert_eq!(cmd.payload(), "move,0,0");
    }

    // ── Pipeline ──────────────────────────────────────────────────────────────

    fn pipeline(launcher: std::sync::Arc<ScriptedLauncher>) -> InputPipeline {
        let timings = WorkerTimings {
            ready_timeout: Duration::from_millis(500),
            response_timeout: Duration::from_millis(500),
        };
        InputPipeline::new(
            WorkerProcessManager::new(WorkerKind::Keyboard, launcher.clone(), timings),
            WorkerProcessManager::new(WorkerKind::Mouse, launcher, timings),
        )
    }

    #[tokio::test]
    async fn test_dispatch_submits_exactly_one_command() {
        // Arrange
        let launcher = ScriptedLauncher::ok();
        let pipeline = pipeline(launcher.clone());

        // Act
        let done = pipeline
            .dispatch(&InputEvent::MouseButton(MouseButton::Left))
            .unwrap();
        let result = done.await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(launcher.commands(), vec!["left".to_string()]);
        assert_eq!(launcher.launch_count(), 1, "only the mouse worker starts");
        pipeline.stop().await;
    }

    #[tokio::test]
    async fn test_failed_translation_submits_nothing() {
        let launcher = ScriptedLauncher::ok();
        let pipeline = pipeline(launcher.clone());

        let result = pipeline.dispatch(&key("Hyper", Modifiers::default()));

        assert!(result.is_err());
        assert_eq!(launcher.launch_count(), 0);
    }
}
