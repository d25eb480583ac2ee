//! Screen capture backends.
//!
//! [`CommandCapture`] shells out to a configured screenshot tool that writes
//! one JPEG image to stdout (`grim -t jpeg -`, `screencapture -t jpg -x
//! /dev/stdout`, a small PowerShell script, …).  The image size comes from
//! the JPEG start-of-frame header, so no image library is needed.
//!
//! [`NullCapture`] never yields a frame; the host uses it when no capture
//! command is configured.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::process::Command;
use tracing::debug;

use crate::application::broadcaster::{CaptureError, CapturedFrame, ScreenCapture};

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Capture by running external commands once per frame.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    capture: Vec<String>,
    cursor: Option<Vec<String>>,
}

impl CommandCapture {
    /// `capture` prints a JPEG; the optional `cursor` command prints `X Y`.
    ///
    /// Returns `None` when `capture` is empty.
    pub fn new(capture: Vec<String>, cursor: Option<Vec<String>>) -> Option<Self> {
        if capture.is_empty() {
            return None;
        }
        Some(Self {
            capture,
            cursor: cursor.filter(|c| !c.is_empty()),
        })
    }

    async fn cursor_position(&self) -> (i32, i32) {
        let Some(argv) = &self.cursor else {
            return (0, 0);
        };
        match run(argv).await {
            Ok(Some(stdout)) => parse_cursor(&String::from_utf8_lossy(&stdout)).unwrap_or((0, 0)),
            Ok(None) => (0, 0),
            Err(e) => {
                debug!("cursor command failed: {e}");
                (0, 0)
            }
        }
    }
}

#[async_trait]
impl ScreenCapture for CommandCapture {
    async fn capture(&self) -> Result<Option<CapturedFrame>, CaptureError> {
        let Some(jpeg) = run(&self.capture).await? else {
            return Ok(None);
        };
        let (width, height) = jpeg_dimensions(&jpeg).ok_or(CaptureError::NotJpeg)?;
        let (cursor_x, cursor_y) = self.cursor_position().await;

        let mut data = String::with_capacity(DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        data.push_str(DATA_URL_PREFIX);
        STANDARD.encode_string(&jpeg, &mut data);

        Ok(Some(CapturedFrame {
            data,
            width,
            height,
            cursor_x,
            cursor_y,
        }))
    }
}

/// Capture backend that never produces a frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCapture;

#[async_trait]
impl ScreenCapture for NullCapture {
    async fn capture(&self) -> Result<Option<CapturedFrame>, CaptureError> {
        Ok(None)
    }
}

/// Runs `argv` and returns its stdout.  Empty output is `None`; a non-zero
/// exit is an error.
async fn run(argv: &[String]) -> Result<Option<Vec<u8>>, CaptureError> {
    let Some((program, args)) = argv.split_first() else {
        return Ok(None);
    };
    let output = Command::new(program).args(args).kill_on_drop(true).output().await?;
    if !output.status.success() {
        return Err(CaptureError::CommandFailed(output.status.to_string()));
    }
    if output.stdout.is_empty() {
        return Ok(None);
    }
    Ok(Some(output.stdout))
}

/// Parses `"X Y"` (any whitespace or a comma between the numbers).
fn parse_cursor(text: &str) -> Option<(i32, i32)> {
    let mut parts = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|p| !p.is_empty());
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    Some((x, y))
}

/// Reads `(width, height)` from the first start-of-frame segment of a JPEG.
///
/// Returns `None` if `bytes` does not start with the SOI marker or no SOF
/// segment is found before the data ends.
pub fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 1 < bytes.len() {
        if bytes[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = bytes[i + 1];
        match marker {
            // Fill byte.
            0xFF => {
                i += 1;
                continue;
            }
            // Markers without a length field.
            0x01 | 0xD0..=0xD7 => {
                i += 2;
                continue;
            }
            // End of image or start of scan: no SOF seen before the data.
            0xD9 | 0xDA => return None,
            _ => {}
        }

        let len = u16::from_be_bytes([*bytes.get(i + 2)?, *bytes.get(i + 3)?]) as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let height = u16::from_be_bytes([*bytes.get(i + 5)?, *bytes.get(i + 6)?]);
            let width = u16::from_be_bytes([*bytes.get(i + 7)?, *bytes.get(i + 8)?]);
            return Some((u32::from(width), u32::from(height)));
        }
        if len < 2 {
            return None;
        }
        i += 2 + len;
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────
