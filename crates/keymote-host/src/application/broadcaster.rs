//! Frame Broadcaster: fixed-rate screen frames to every authenticated session.
//!
//! ```text
//!   interval tick ──► ScreenCapture::capture() ──► Some(frame) ──► registry.broadcast(screen-frame)
//!                                               └─► None / Err ──► skip this tick
//! ```
//!
//! The loop runs as one tokio task.  `stop()` aborts it *and awaits the
//! handle*, so once `stop()` returns no further frame can be sent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keymote_core::protocol::messages::{timestamp_ms, ServerMessage};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::registry::SessionRegistry;

/// Lowest and highest accepted frame rates.
pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 30;

/// One encoded screen image plus the cursor position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Opaque payload, typically a `data:image/jpeg;base64,...` URL.
    pub data: String,
    pub width: u32,
    pub height: u32,
    pub cursor_x: i32,
    pub cursor_y: i32,
}

impl CapturedFrame {
    /// Wraps the frame in its wire message, stamped with the current time.
    pub fn into_message(self) -> ServerMessage {
        ServerMessage::ScreenFrame {
            data: self.data,
            width: self.width,
            height: self.height,
            cursor_x: self.cursor_x,
            cursor_y: self.cursor_y,
            timestamp: timestamp_ms(),
        }
    }
}

/// Errors from a capture backend.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture command failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("capture command exited with {0}")]
    CommandFailed(String),

    #[error("captured image is not a JPEG")]
    NotJpeg,
}

/// Source of screen frames.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Produces the next frame, or `None` if nothing is available this tick.
    async fn capture(&self) -> Result<Option<CapturedFrame>, CaptureError>;

    /// Called when streaming starts, before the first capture.
    async fn start_streaming(&self) {}

    /// Called after streaming stops.
    async fn stop_streaming(&self) {}
}

/// Streaming state reported by [`FrameBroadcaster::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamStatus {
    pub streaming: bool,
    pub fps: u32,
}

struct LoopState {
    fps: u32,
    task: Option<JoinHandle<()>>,
}

/// Owns the frame loop.
pub struct FrameBroadcaster {
    registry: Arc<SessionRegistry>,
    capture: Arc<dyn ScreenCapture>,
    state: Mutex<LoopState>,
}

impl FrameBroadcaster {
    pub fn new(registry: Arc<SessionRegistry>, capture: Arc<dyn ScreenCapture>, fps: u32) -> Self {
        Self {
            registry,
            capture,
            state: Mutex::new(LoopState {
                fps: clamp_fps(fps),
                task: None,
            }),
        }
    }

    /// Starts the loop.  A no-op if it is already running.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("screen stream already running");
            return;
        }
        self.capture.start_streaming().await;
        state.task = Some(self.spawn_loop(state.fps));
        info!("screen stream started at {} fps", state.fps);
    }

    /// Stops the loop and waits for it to finish.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.task.take() {
            task.abort();
            let _ = task.await;
            self.capture.stop_streaming().await;
            info!("screen stream stopped");
        }
    }

    /// Changes the frame rate, clamped to `1..=30`.  A running loop is
    /// restarted at the new rate.  Returns the rate actually applied.
    pub async fn set_fps(&self, fps: u32) -> u32 {
        let fps = clamp_fps(fps);
        let mut state = self.state.lock().await;
        state.fps = fps;
        if let Some(task) = state.task.take() {
            task.abort();
            let _ = task.await;
            state.task = Some(self.spawn_loop(fps));
            info!("screen stream restarted at {fps} fps");
        }
        fps
    }

    pub async fn status(&self) -> StreamStatus {
        let state = self.state.lock().await;
        StreamStatus {
            streaming: state.task.as_ref().is_some_and(|t| !t.is_finished()),
            fps: state.fps,
        }
    }

    fn spawn_loop(&self, fps: u32) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let capture = Arc::clone(&self.capture);
        let period = Duration::from_millis(1000 / u64::from(fps));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match capture.capture().await {
                    Ok(Some(frame)) => {
                        registry.broadcast(&frame.into_message()).await;
                    }
                    Ok(None) => {}
                    Err(e) => warn!("screen capture failed: {e}"),
                }
            }
        })
    }
}

fn clamp_fps(fps: u32) -> u32 {
    fps.clamp(MIN_FPS, MAX_FPS)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
