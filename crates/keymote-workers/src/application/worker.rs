//! The three workers: parse a command line, drive a backend, pick the reply.

use thiserror::Error;
use tracing::{debug, warn};

use crate::application::backend::{BackendError, KeyboardBackend, MouseBackend, MuteBackend};
use crate::domain::command::{CommandError, KeyboardCommand, MouseCommand, MuteCommand, OK_LINE};

/// Why a command produced an `ERR` reply.
#[derive(Debug, Error)]
pub enum WorkerFault {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// One command-line handler, as driven by [`crate::application::serve::serve`].
pub trait LineWorker {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Executes one trimmed, non-empty command line and returns the success reply.
    fn execute(&mut self, line: &str) -> Result<&'static str, WorkerFault>;

    /// Called once when the command loop ends, by `EXIT` or end of input.
    fn finish(&mut self) {}
}

// ── Keyboard ──────────────────────────────────────────────────────────────────

pub struct KeyboardWorker {
    backend: Box<dyn KeyboardBackend>,
}

impl KeyboardWorker {
    pub fn new(backend: Box<dyn KeyboardBackend>) -> Self {
        Self { backend }
    }
}

impl LineWorker for KeyboardWorker {
    fn name(&self) -> &'static str {
        "keyboard"
    }

    fn execute(&mut self, line: &str) -> Result<&'static str, WorkerFault> {
        match line.parse::<KeyboardCommand>()? {
            KeyboardCommand::Text(text) => self.backend.type_text(&text)?,
            KeyboardCommand::Key { vk, modifiers } => self.backend.tap_key(vk, &modifiers)?,
            KeyboardCommand::WinKey => self.backend.tap_win()?,
        }
        Ok(OK_LINE)
    }
}

// ── Mouse ─────────────────────────────────────────────────────────────────────

pub struct MouseWorker {
    backend: Box<dyn MouseBackend>,
}

impl MouseWorker {
    pub fn new(backend: Box<dyn MouseBackend>) -> Self {
        Self { backend }
    }
}

impl LineWorker for MouseWorker {
    fn name(&self) -> &'static str {
        "mouse"
    }

    fn execute(&mut self, line: &str) -> Result<&'static str, WorkerFault> {
        match line.parse::<MouseCommand>()? {
            MouseCommand::Move { dx, dy } => self.backend.move_by(dx, dy)?,
            MouseCommand::MoveTo { x, y } => self.backend.move_to(x, y)?,
            MouseCommand::Click(button) => self.backend.click(button)?,
            MouseCommand::Scroll(delta) => self.backend.scroll(delta)?,
        }
        Ok(OK_LINE)
    }
}

// ── Mute ──────────────────────────────────────────────────────────────────────

/// Mute worker.  Unmutes on the way out if it left the output muted, so a
/// host that dies mid-session does not leave the machine silent.
pub struct MuteWorker {
    backend: Box<dyn MuteBackend>,
    muted: bool,
}

impl MuteWorker {
    pub fn new(backend: Box<dyn MuteBackend>) -> Self {
        Self {
            backend,
            muted: false,
        }
    }
}

impl LineWorker for MuteWorker {
    fn name(&self) -> &'static str {
        "mute"
    }

    fn execute(&mut self, line: &str) -> Result<&'static str, WorkerFault> {
        let command = line.parse::<MuteCommand>()?;
        self.backend.set_muted(command.muted())?;
        self.muted = command.muted();
        Ok(command.reply())
    }

    fn finish(&mut self) {
        if !self.muted {
            return;
        }
        match self.backend.set_muted(false) {
            Ok(()) => {
                self.muted = false;
                debug!("restored audio on exit");
            }
            Err(e) => warn!(error = %e, "could not restore audio on exit"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::backend::{MockKeyboardBackend, MockMouseBackend, MockMuteBackend};
    use crate::domain::command::{Modifier, MouseButton};
    use mockall::predicate::eq;

    #[test]
    fn test_key_combo_reaches_backend_with_modifiers() {
        // Arrange
        let mut backend = MockKeyboardBackend::new();
        backend
            .expect_tap_key()
            .withf(|vk, mods| {
                *vk == 84 && mods.to_vec() == vec![Modifier::Ctrl, Modifier::Shift]
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let mut worker = KeyboardWorker::new(Box::new(backend));

        // Act
        let reply = worker.execute("key,84,ctrl+shift").unwrap();

        // Assert
        assert_eq!(reply, "OK");
    }

    #[test]
    fn test_text_is_decoded_before_typing() {
        let mut backend = MockKeyboardBackend::new();
        backend
            .expect_type_text()
            .withf(|text| text.to_string() == "hi, there")
            .times(1)
            .returning(|_| Ok(()));
        let mut worker = KeyboardWorker::new(Box::new(backend));

        assert_eq!(worker.execute(r#"text,"hi, there""#).unwrap(), "OK");
    }

    #[test]
    fn test_unparseable_line_never_reaches_backend() {
        // Arrange: a mock with no expectations panics on any call.
        let mut worker = KeyboardWorker::new(Box::new(MockKeyboardBackend::new()));

        // Act
        let result = worker.execute("key,not-a-number");

        // Assert
        assert!(matches!(result, Err(WorkerFault::Command(_))));
    }

    #[test]
    fn test_backend_failure_is_a_fault() {
        let mut backend = MockMouseBackend::new();
        backend
            .expect_click()
            .with(eq(MouseButton::Right))
            .returning(|_| Err(BackendError::Unsupported("right click")));
        let mut worker = MouseWorker::new(Box::new(backend));

        assert!(matches!(
            worker.execute("right"),
            Err(WorkerFault::Backend(BackendError::Unsupported(_)))
        ));
    }

    #[test]
    fn test_mouse_move_and_scroll_dispatch() {
        let mut backend = MockMouseBackend::new();
        backend
            .expect_move_by()
            .with(eq(-3), eq(7))
            .times(1)
            .returning(|_, _| Ok(()));
        backend
            .expect_scroll()
            .with(eq(240))
            .times(1)
            .returning(|_| Ok(()));
        let mut worker = MouseWorker::new(Box::new(backend));

        assert_eq!(worker.execute("move,-3,7").unwrap(), "OK");
        assert_eq!(worker.execute("scroll,240").unwrap(), "OK");
    }

    #[test]
    fn test_mute_replies_name_the_new_state() {
        let mut backend = MockMuteBackend::new();
        backend.expect_set_muted().returning(|_| Ok(()));
        let mut worker = MuteWorker::new(Box::new(backend));

        assert_eq!(worker.execute("MUTE").unwrap(), "MUTED");
        assert_eq!(worker.execute("UNMUTE").unwrap(), "UNMUTED");
    }

    #[test]
    fn test_finish_unmutes_when_left_muted() {
        // Arrange
        let mut backend = MockMuteBackend::new();
        backend
            .expect_set_muted()
            .with(eq(true))
            .times(1)
            .returning(|_| Ok(()));
        backend
            .expect_set_muted()
            .with(eq(false))
            .times(1)
            .returning(|_| Ok(()));
        let mut worker = MuteWorker::new(Box::new(backend));
        worker.execute("MUTE").unwrap();

        // Act
        worker.finish();
        worker.finish();

        // Assert: the `times(1)` expectations are checked when the mock drops.
    }

    #[test]
    fn test_finish_is_quiet_when_not_muted() {
        let mut worker = MuteWorker::new(Box::new(MockMuteBackend::new()));
        worker.finish();
    }
}
