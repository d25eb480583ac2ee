//! Backend that logs each action instead of performing it.
//!
//! Selected with `--dry-run`; useful for exercising a host end to end on a
//! machine where injection is unwanted or unavailable.

use tracing::info;

use crate::application::backend::{BackendError, KeyboardBackend, MouseBackend, MuteBackend};
use crate::domain::command::{Modifier, MouseButton};

#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunBackend;

impl KeyboardBackend for DryRunBackend {
    fn type_text(&mut self, text: &str) -> Result<(), BackendError> {
        info!(chars = text.chars().count(), "dry run: type text");
        Ok(())
    }

    fn tap_key(&mut self, vk: u8, modifiers: &[Modifier]) -> Result<(), BackendError> {
        info!(vk, ?modifiers, "dry run: tap key");
        Ok(())
    }

    fn tap_win(&mut self) -> Result<(), BackendError> {
        info!("dry run: tap win");
        Ok(())
    }
}

impl MouseBackend for DryRunBackend {
    fn move_by(&mut self, dx: i32, dy: i32) -> Result<(), BackendError> {
        info!(dx, dy, "dry run: move");
        Ok(())
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<(), BackendError> {
        info!(x, y, "dry run: move to");
        Ok(())
    }

    fn click(&mut self, button: MouseButton) -> Result<(), BackendError> {
        info!(?button, "dry run: click");
        Ok(())
    }

    fn scroll(&mut self, delta: i32) -> Result<(), BackendError> {
        info!(delta, "dry run: scroll");
        Ok(())
    }
}

impl MuteBackend for DryRunBackend {
    fn set_muted(&mut self, muted: bool) -> Result<(), BackendError> {
        info!(muted, "dry run: set mute");
        Ok(())
    }
}
