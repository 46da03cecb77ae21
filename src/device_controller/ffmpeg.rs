//! ffmpeg-backed video device
//!
//! Grabs single MJPEG frames from a local V4L2 device (or any ffmpeg
//! input) via short-lived ffmpeg processes, the same technique the
//! snapshot path uses for RTSP cameras: one process per frame,
//! `kill_on_drop(true)`, bounded by a timeout.

use super::{DeviceSource, VideoDevice};
use crate::error::{Error, Result};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::watch;

/// ffmpeg device configuration
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    /// Input URL or device node (e.g. `/dev/video0`)
    pub input: String,
    /// ffmpeg input format (e.g. `v4l2`)
    pub input_format: String,
    /// Timeout for one frame grab in seconds
    pub frame_timeout_sec: u64,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            input: "/dev/video0".to_string(),
            input_format: "v4l2".to_string(),
            frame_timeout_sec: 10,
        }
    }
}

/// Video device driven by ffmpeg/ffprobe subprocesses
#[derive(Debug)]
pub struct FfmpegDevice {
    config: FfmpegConfig,
    events: watch::Sender<(u32, u32)>,
    stopped: AtomicBool,
}

impl FfmpegDevice {
    /// Open the device
    ///
    /// Verifies the input node is accessible, then probes dimensions in the
    /// background; the probe result arrives as a ready event. Devices where
    /// ffprobe hangs or reports nothing are caught by the controller's
    /// fallback timer re-check instead.
    pub async fn open(config: FfmpegConfig) -> Result<Self> {
        // Local device nodes can be checked up front; a missing or
        // unreadable node is an acquisition failure, not a timeout later.
        if config.input.starts_with('/') {
            tokio::fs::metadata(&config.input).await.map_err(|e| {
                Error::Acquisition(format!(
                    "capture device {} not accessible: {}",
                    config.input, e
                ))
            })?;
        }

        let (events, _) = watch::channel((0, 0));
        let device = Self {
            config,
            events,
            stopped: AtomicBool::new(false),
        };
        device.spawn_probe();
        Ok(device)
    }

    /// Probe frame dimensions with ffprobe and publish them as a ready event
    fn spawn_probe(&self) {
        let config = self.config.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            match probe_dimensions(&config).await {
                Ok((w, h)) => {
                    tracing::debug!(width = w, height = h, input = %config.input, "Device probe complete");
                    let _ = events.send((w, h));
                }
                Err(e) => {
                    tracing::warn!(input = %config.input, error = %e, "Device probe failed");
                }
            }
        });
    }
}

impl VideoDevice for FfmpegDevice {
    fn dimensions(&self) -> (u32, u32) {
        *self.events.borrow()
    }

    fn ready_events(&self) -> watch::Receiver<(u32, u32)> {
        self.events.subscribe()
    }

    async fn grab_frame(&self) -> Result<Vec<u8>> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::Acquisition("device stopped".to_string()));
        }
        grab_frame(&self.config).await
    }

    async fn stop(&self) {
        // Per-frame processes are short-lived; stopping just bars new grabs
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Probe frame dimensions via ffprobe
async fn probe_dimensions(config: &FfmpegConfig) -> Result<(u32, u32)> {
    let child = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
            "-f",
            &config.input_format,
            "-i",
            &config.input,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Acquisition(format!("ffprobe spawn failed: {}", e)))?;

    let timeout = Duration::from_secs(config.frame_timeout_sec);
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(Error::Acquisition(format!("ffprobe failed: {}", e)));
        }
        Err(_) => {
            return Err(Error::Acquisition(format!(
                "ffprobe timeout ({}s)",
                config.frame_timeout_sec
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Acquisition(format!(
            "ffprobe failed: {}",
            stderr.trim()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    parse_dimensions(text.trim())
        .ok_or_else(|| Error::Acquisition(format!("ffprobe returned no dimensions: {}", text)))
}

fn parse_dimensions(text: &str) -> Option<(u32, u32)> {
    let (w, h) = text.lines().next()?.split_once('x')?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

/// Grab one frame as MJPEG
///
/// `kill_on_drop(true)` ensures the ffmpeg process is killed when the
/// timeout cancels the future and the Child is dropped, so unresponsive
/// devices cannot accumulate zombie processes.
async fn grab_frame(config: &FfmpegConfig) -> Result<Vec<u8>> {
    let child = Command::new("ffmpeg")
        .args([
            "-f",
            &config.input_format,
            "-i",
            &config.input,
            "-frames:v",
            "1",
            "-f",
            "image2pipe",
            "-vcodec",
            "mjpeg",
            "-loglevel",
            "error",
            "-y",
            "-",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Acquisition(format!("ffmpeg spawn failed: {}", e)))?;

    let timeout = Duration::from_secs(config.frame_timeout_sec);
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(Error::Acquisition(format!(
                    "ffmpeg failed: {}",
                    stderr.trim()
                )));
            }
            if output.stdout.is_empty() {
                return Err(Error::Acquisition("ffmpeg returned empty output".to_string()));
            }
            Ok(output.stdout)
        }
        Ok(Err(e)) => Err(Error::Acquisition(format!("ffmpeg execution failed: {}", e))),
        Err(_) => {
            tracing::warn!(
                timeout_sec = config.frame_timeout_sec,
                input = %config.input,
                "ffmpeg timeout, process killed via kill_on_drop"
            );
            Err(Error::Acquisition(format!(
                "ffmpeg timeout ({}s)",
                config.frame_timeout_sec
            )))
        }
    }
}

/// Device source handing out ffmpeg devices for the configured input
pub struct FfmpegSource {
    config: FfmpegConfig,
}

impl FfmpegSource {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }
}

impl DeviceSource for FfmpegSource {
    type Device = FfmpegDevice;

    async fn acquire(&self) -> Result<FfmpegDevice> {
        FfmpegDevice::open(self.config.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dimensions() {
        assert_eq!(parse_dimensions("640x480"), Some((640, 480)));
        assert_eq!(parse_dimensions("1920x1080\n"), Some((1920, 1080)));
        assert_eq!(parse_dimensions("0x480"), None);
        assert_eq!(parse_dimensions("garbage"), None);
        assert_eq!(parse_dimensions(""), None);
    }

    #[tokio::test]
    async fn test_open_rejects_missing_device_node() {
        let config = FfmpegConfig {
            input: "/dev/video-does-not-exist".to_string(),
            ..Default::default()
        };
        let err = FfmpegDevice::open(config).await.unwrap_err();
        assert!(matches!(err, Error::Acquisition(_)));
    }
}
