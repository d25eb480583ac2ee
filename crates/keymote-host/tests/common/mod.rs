//! Shared wiring for the host integration tests.
//!
//! Builds a [`MessageRouter`] the way `main` does, but with self-answering
//! in-memory workers and a capture backend that produces one fixed frame.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keymote_host::application::auth::{AuthGate, AuthPolicy};
use keymote_host::application::broadcaster::{
    CaptureError, CapturedFrame, FrameBroadcaster, ScreenCapture,
};
use keymote_host::application::credentials::CredentialStore;
use keymote_host::application::mute::MuteController;
use keymote_host::application::registry::SessionRegistry;
use keymote_host::application::router::MessageRouter;
use keymote_host::application::translate::InputPipeline;
use keymote_host::application::worker::WorkerProcessManager;
use keymote_host::domain::{WorkerKind, WorkerTimings};
use keymote_host::infrastructure::worker::mock::ScriptedLauncher;

pub const COMPUTER_NAME: &str = "Desk";

/// Always returns the same tiny frame.
pub struct FixedFrame;

#[async_trait]
impl ScreenCapture for FixedFrame {
    async fn capture(&self) -> Result<Option<CapturedFrame>, CaptureError> {
        Ok(Some(CapturedFrame {
            data: "data:image/jpeg;base64,AAAA".to_string(),
            width: 4,
            height: 3,
            cursor_x: 1,
            cursor_y: 2,
        }))
    }
}

pub fn timings() -> WorkerTimings {
    WorkerTimings {
        ready_timeout: Duration::from_millis(500),
        response_timeout: Duration::from_millis(500),
    }
}

/// A router over `store` whose workers answer through `launcher`.
pub fn router_with(
    pin: Option<&str>,
    store: Arc<dyn CredentialStore>,
    launcher: Arc<ScriptedLauncher>,
) -> Arc<MessageRouter> {
    let worker = |kind| WorkerProcessManager::new(kind, launcher.clone(), timings());
    let registry = Arc::new(SessionRegistry::new());
    Arc::new(MessageRouter::new(
        Arc::clone(&registry),
        AuthGate::new(
            AuthPolicy {
                pin: pin.map(str::to_string),
                computer_name: COMPUTER_NAME.to_string(),
            },
            store,
        ),
        InputPipeline::new(worker(WorkerKind::Keyboard), worker(WorkerKind::Mouse)),
        Arc::new(MuteController::new(worker(WorkerKind::Mute))),
        Arc::new(FrameBroadcaster::new(registry, Arc::new(FixedFrame), 30)),
    ))
}
