//! Integration tests for the input pipeline against real child processes.
//!
//! Each test starts `sh` scripts that speak the worker line protocol:
//!
//! ```text
//! READY              printed once at start
//! <command>  → OK    appended to a log file, then acknowledged
//! EXIT               terminates the script
//! ```
//!
//! The log file shows exactly what reached the "actuator", in order.

#![cfg(unix)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use keymote_core::protocol::messages::Modifiers;
use keymote_host::application::mute::MuteController;
use keymote_host::application::translate::{InputPipeline, TranslateError};
use keymote_host::application::worker::{WorkerError, WorkerProcessManager, WorkerState};
use keymote_host::domain::{InputEvent, MouseButton, WorkerKind, WorkerSpec, WorkerTimings};
use keymote_host::infrastructure::worker::ChildProcessLauncher;

const WORKER_SCRIPT: &str = r#"
echo READY
while IFS= read -r line; do
  [ "$line" = "EXIT" ] && exit 0
  printf '%s\n' "$line" >> "$1"
  case "$line" in
    MUTE) echo MUTED ;;
    UNMUTE) echo UNMUTED ;;
    *) echo OK ;;
  esac
done
"#;

fn script_worker(log: &Path) -> WorkerSpec {
    WorkerSpec {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            WORKER_SCRIPT.to_string(),
            "worker".to_string(),
            log.display().to_string(),
        ],
    }
}

fn timings() -> WorkerTimings {
    WorkerTimings {
        ready_timeout: Duration::from_secs(5),
        response_timeout: Duration::from_secs(5),
    }
}

fn read_log(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

struct Rig {
    _dir: tempfile::TempDir,
    keyboard_log: std::path::PathBuf,
    mouse_log: std::path::PathBuf,
    mute_log: std::path::PathBuf,
    launcher: Arc<ChildProcessLauncher>,
}

fn rig() -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let keyboard_log = dir.path().join("keyboard.log");
    let mouse_log = dir.path().join("mouse.log");
    let mute_log = dir.path().join("mute.log");
    let specs = HashMap::from([
        (WorkerKind::Keyboard, script_worker(&keyboard_log)),
        (WorkerKind::Mouse, script_worker(&mouse_log)),
        (WorkerKind::Mute, script_worker(&mute_log)),
    ]);
    Rig {
        _dir: dir,
        keyboard_log,
        mouse_log,
        mute_log,
        launcher: Arc::new(ChildProcessLauncher::new(specs)),
    }
}

impl Rig {
    fn manager(&self, kind: WorkerKind) -> WorkerProcessManager {
        WorkerProcessManager::new(kind, self.launcher.clone(), timings())
    }

    fn pipeline(&self) -> InputPipeline {
        InputPipeline::new(
            self.manager(WorkerKind::Keyboard),
            self.manager(WorkerKind::Mouse),
        )
    }
}

/// Events dispatched back to back (before the worker is ready) arrive in
/// dispatch order, each on its own worker.
#[tokio::test]
async fn test_events_reach_their_workers_in_dispatch_order() {
    // Arrange
    let rig = rig();
    let pipeline = rig.pipeline();
    let events = [
        InputEvent::Text("hello".to_string()),
        InputEvent::MouseMove { dx: 4.6, dy: -2.0 },
        InputEvent::Key {
            name: "Enter".to_string(),
            modifiers: Modifiers::default(),
        },
        InputEvent::Shortcut("Ctrl+C".to_string()),
        InputEvent::MouseButton(MouseButton::Left),
    ];

    // Act
    let pending: Vec<_> = events
        .iter()
        .map(|event| pipeline.dispatch(event).unwrap())
        .collect();
    for done in pending {
        done.await.unwrap();
    }
    pipeline.stop().await;

    // Assert
    assert_eq!(
        read_log(&rig.keyboard_log),
        vec![r#"text,"hello""#, "key,13", "key,67,ctrl"]
    );
    assert_eq!(read_log(&rig.mouse_log), vec!["move,5,-2", "left"]);
}

#[tokio::test]
async fn test_unknown_key_never_reaches_a_worker() {
    // Arrange
    let rig = rig();
    let pipeline = rig.pipeline();

    // Act
    let result = pipeline.dispatch(&InputEvent::Key {
        name: "NoSuchKey".to_string(),
        modifiers: Modifiers::default(),
    });

    // Assert
    assert!(matches!(result, Err(TranslateError::UnknownKey(_))));
    pipeline.stop().await;
    assert!(read_log(&rig.keyboard_log).is_empty());
}

#[tokio::test]
async fn test_missing_worker_program_is_unavailable() {
    // Arrange
    let launcher = Arc::new(ChildProcessLauncher::new(HashMap::from([(
        WorkerKind::Mouse,
        WorkerSpec::new("/nonexistent/keymote-mouse-worker"),
    )])));
    let manager = WorkerProcessManager::new(WorkerKind::Mouse, launcher, timings());

    // Act
    let result = manager.submit("left").await;

    // Assert
    assert_eq!(result, Err(WorkerError::WorkerUnavailable(WorkerKind::Mouse)));
    manager.stop().await;
    assert_eq!(manager.state(), WorkerState::Closed);
}

/// Two holders mute once; only the last release unmutes; cleanup leaves the
/// speakers unmuted even with no holders.
#[tokio::test]
async fn test_mute_edges_reach_the_mute_worker() {
    // Arrange
    let rig = rig();
    let mute = MuteController::new(rig.manager(WorkerKind::Mute));

    // Act
    mute.set_mute(true).await.unwrap();
    mute.set_mute(true).await.unwrap();
    mute.set_mute(false).await.unwrap();
    let still_muted = mute.is_muted();
    mute.set_mute(false).await.unwrap();
    mute.cleanup().await;

    // Assert
    assert!(still_muted);
    assert!(!mute.is_muted());
    assert_eq!(read_log(&rig.mute_log), vec!["MUTE", "UNMUTE", "UNMUTE"]);
}
