//! Typed input events, the Command Translator's input.

use keymote_core::protocol::messages::{ClientMessage, Modifiers, MouseAction};

/// Mouse buttons the mouse worker can click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// One input action requested by a remote.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Type a string.  `char` messages arrive here too.
    Text(String),
    /// Press a named key with modifiers.
    Key { name: String, modifiers: Modifiers },
    /// Press a combo such as `"Ctrl+Shift+T"`.
    Shortcut(String),
    MouseMove { dx: f64, dy: f64 },
    MouseAbsolute { x: f64, y: f64 },
    MouseButton(MouseButton),
    MouseScroll { delta: f64 },
}

impl InputEvent {
    /// Extracts the input event carried by a wire message.
    ///
    /// Returns `None` for control messages (`auth`, `ping`, `screen`, ...).
    /// A `shortcut` without a combo string is treated as a `key` press, the
    /// form older remotes send.
    pub fn from_message(msg: &ClientMessage) -> Option<Self> {
        let event = match msg {
            ClientMessage::Text { text, .. } => Self::Text(text.clone()),
            ClientMessage::Char { character, .. } => Self::Text(character.clone()),
            ClientMessage::Key { key, modifiers, .. } => Self::Key {
                name: key.clone(),
                modifiers: *modifiers,
            },
            ClientMessage::Shortcut {
                combo: Some(combo), ..
            } => Self::Shortcut(combo.clone()),
            ClientMessage::Shortcut {
                combo: None,
                key,
                modifiers,
                ..
            } => Self::Key {
                name: key.clone().unwrap_or_default(),
                modifiers: *modifiers,
            },
            ClientMessage::Mouse {
                action,
                dx,
                dy,
                x,
                y,
                delta,
                ..
            } => match action {
                MouseAction::Left => Self::MouseButton(MouseButton::Left),
                MouseAction::Right => Self::MouseButton(MouseButton::Right),
                MouseAction::Middle => Self::MouseButton(MouseButton::Middle),
                MouseAction::Move => Self::MouseMove { dx: *dx, dy: *dy },
                MouseAction::MoveTo => Self::MouseAbsolute { x: *x, y: *y },
                MouseAction::Scroll => Self::MouseScroll { delta: *delta },
            },
            ClientMessage::Auth { .. }
            | ClientMessage::Ping { .. }
            | ClientMessage::Pong { .. }
            | ClientMessage::Screen { .. }
            | ClientMessage::Audio { .. } => return None,
        };
        Some(event)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keymote_core::protocol::messages::StreamAction;

    #[test]
    fn test_char_becomes_text() {
        let msg = ClientMessage::Char {
            character: "é".to_string(),
            id: None,
        };
        assert_eq!(
            InputEvent::from_message(&msg),
            Some(InputEvent::Text("é".to_string()))
        );
    }

    #[test]
    fn test_shortcut_with_combo_keeps_combo() {
        let msg = ClientMessage::Shortcut {
            combo: Some("Alt+F4".to_string()),
            key: None,
            modifiers: Modifiers::default(),
            id: None,
        };
        assert_eq!(
            InputEvent::from_message(&msg),
            Some(InputEvent::Shortcut("Alt+F4".to_string()))
        );
    }

    #[test]
    fn test_shortcut_with_key_and_modifiers_becomes_key_press() {
        // Arrange
        let modifiers = Modifiers {
            ctrl: true,
            ..Modifiers::default()
        };
        let msg = ClientMessage::Shortcut {
            combo: None,
            key: Some("C".to_string()),
            modifiers,
            id: Some(2),
        };

        // Act
        let event = InputEvent::from_message(&msg);

        // Assert
        assert_eq!(
            event,
            Some(InputEvent::Key {
                name: "C".to_string(),
                modifiers
            })
        );
    }

    #[test]
    fn test_mouse_scroll_carries_delta() {
        let msg = ClientMessage::Mouse {
            action: MouseAction::Scroll,
            dx: 0.0,
            dy: 0.0,
            x: 0.0,
            y: 0.0,
            delta: -3.0,
            id: None,
        };
        assert_eq!(
            InputEvent::from_message(&msg),
            Some(InputEvent::MouseScroll { delta: -3.0 })
        );
    }

    #[test]
    fn test_control_messages_are_not_input() {
        let msg = ClientMessage::Screen {
            action: StreamAction::Start,
        };
        assert_eq!(InputEvent::from_message(&msg), None);
    }
}
