//! DeviceController - Capture Device Lifecycle
//!
//! ## Responsibilities
//!
//! - Exclusive acquisition of the capture device (one session at a time)
//! - Readiness detection (device events racing a fixed fallback timer)
//! - Frame capture as encoded JPEG
//! - Teardown on every exit path (success, cancel, failure)

mod ffmpeg;

pub use ffmpeg::{FfmpegConfig, FfmpegDevice, FfmpegSource};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

/// Fallback readiness re-check, for devices that never emit ready events
const READY_FALLBACK: Duration = Duration::from_millis(3000);

/// Poll interval for detecting a session closed while waiting for readiness
const READY_STATE_CHECK: Duration = Duration::from_millis(100);

/// Capture session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// No session open
    Idle,
    /// Device acquired, waiting for valid frame dimensions
    Initializing,
    /// Device reported non-zero frame dimensions, capture allowed
    Ready,
    /// Device acquisition failed
    Failed,
    /// Session torn down, device released
    Closed,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Initializing => "initializing",
            CaptureState::Ready => "ready",
            CaptureState::Failed => "failed",
            CaptureState::Closed => "closed",
        }
    }
}

/// A video capture device
///
/// Dimensions are (0, 0) until the device has produced a first frame.
/// Ready events carry the dimensions known at event time; the controller
/// also re-checks `dimensions()` on its fallback timer for devices that
/// never emit the expected events.
#[allow(async_fn_in_trait)]
pub trait VideoDevice: Send + Sync + 'static {
    /// Latest known frame dimensions
    fn dimensions(&self) -> (u32, u32);

    /// Subscribe to device-ready events
    fn ready_events(&self) -> watch::Receiver<(u32, u32)>;

    /// Grab the current frame as an encoded JPEG buffer
    async fn grab_frame(&self) -> Result<Vec<u8>>;

    /// Stop the device and release the hardware, idempotent
    async fn stop(&self);
}

/// Produces a device per capture session
#[allow(async_fn_in_trait)]
pub trait DeviceSource: Send + Sync + 'static {
    type Device: VideoDevice;

    /// Request the capture device from the platform
    async fn acquire(&self) -> Result<Self::Device>;
}

struct ActiveSession<D> {
    device: Option<Arc<D>>,
    state: CaptureState,
}

impl<D> ActiveSession<D> {
    /// Single-writer transition function, all state changes go through here
    fn transition(&mut self, next: CaptureState) {
        if self.state == next {
            return;
        }
        tracing::info!(
            from = self.state.as_str(),
            to = next.as_str(),
            "Capture session state changed"
        );
        self.state = next;
    }
}

/// DeviceController instance
///
/// Owns at most one capture session. Opening a new session while another
/// is live is rejected; the previous session must be closed first.
pub struct DeviceController<S: DeviceSource> {
    source: S,
    session: RwLock<Option<ActiveSession<S::Device>>>,
}

impl<S: DeviceSource> DeviceController<S> {
    /// Create new controller around a device source
    pub fn new(source: S) -> Self {
        Self {
            source,
            session: RwLock::new(None),
        }
    }

    /// Current session state (`Idle` when no session has been opened yet)
    pub async fn state(&self) -> CaptureState {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(CaptureState::Idle)
    }

    /// Open a new capture session
    ///
    /// Transitions `Idle -> Initializing`. On acquisition failure the
    /// session transitions to `Failed`, the device is released, and an
    /// `Acquisition` error is returned. No retry.
    pub async fn open(&self) -> Result<()> {
        let mut session = self.session.write().await;

        if let Some(s) = session.as_ref() {
            match s.state {
                CaptureState::Closed | CaptureState::Failed => {}
                state => {
                    return Err(Error::Validation(format!(
                        "capture session already open (state: {})",
                        state.as_str()
                    )));
                }
            }
        }

        let mut next = ActiveSession {
            device: None,
            state: CaptureState::Idle,
        };
        next.transition(CaptureState::Initializing);

        match self.source.acquire().await {
            Ok(device) => {
                next.device = Some(Arc::new(device));
                *session = Some(next);
                Ok(())
            }
            Err(e) => {
                next.transition(CaptureState::Failed);
                *session = Some(next);
                Err(Error::Acquisition(format!(
                    "capture device unavailable: {}",
                    e
                )))
            }
        }
    }

    /// Wait until the device reports valid frame dimensions
    ///
    /// Two signals race: device-ready events, and a fixed 3000 ms fallback
    /// timer that re-checks dimensions once. Whichever fires first with
    /// non-zero dimensions wins; a fallback check that still sees zero
    /// dimensions keeps waiting on events. Returns an `Acquisition` error
    /// if the session is closed while waiting.
    pub async fn wait_ready(&self) -> Result<()> {
        let device = {
            let session = self.session.read().await;
            let s = session
                .as_ref()
                .ok_or_else(|| Error::Validation("no capture session open".to_string()))?;
            match s.state {
                CaptureState::Ready => return Ok(()),
                CaptureState::Initializing => {}
                state => {
                    return Err(Error::Validation(format!(
                        "capture session not initializing (state: {})",
                        state.as_str()
                    )));
                }
            }
            s.device
                .clone()
                .ok_or_else(|| Error::Internal("session without device".to_string()))?
        };

        // Subscribe before the dimension check; an event sent in between
        // would be marked seen by the watch receiver and lost
        let mut events = device.ready_events();

        // Already producing frames
        let (w, h) = device.dimensions();
        if w > 0 && h > 0 {
            return self.mark_ready(w, h).await;
        }
        let fallback = tokio::time::sleep(READY_FALLBACK);
        tokio::pin!(fallback);
        let mut fallback_armed = true;
        let mut state_check = tokio::time::interval(READY_STATE_CHECK);
        state_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = events.changed() => {
                    if changed.is_err() {
                        return Err(Error::Acquisition(
                            "capture device went away while initializing".to_string(),
                        ));
                    }
                    let (w, h) = *events.borrow();
                    if w > 0 && h > 0 {
                        return self.mark_ready(w, h).await;
                    }
                }
                _ = &mut fallback, if fallback_armed => {
                    fallback_armed = false;
                    let (w, h) = device.dimensions();
                    if w > 0 && h > 0 {
                        return self.mark_ready(w, h).await;
                    }
                    tracing::debug!(
                        "Readiness fallback fired with zero dimensions, waiting on events"
                    );
                }
                _ = state_check.tick() => {
                    if self.state().await != CaptureState::Initializing {
                        return Err(Error::Acquisition(
                            "capture session closed while initializing".to_string(),
                        ));
                    }
                }
            }
        }
    }

    async fn mark_ready(&self, width: u32, height: u32) -> Result<()> {
        let mut session = self.session.write().await;
        match session.as_mut() {
            Some(s) if s.state == CaptureState::Initializing => {
                tracing::debug!(width, height, "Capture device ready");
                s.transition(CaptureState::Ready);
                Ok(())
            }
            Some(s) if s.state == CaptureState::Ready => Ok(()),
            // Session closed or failed while we were waiting
            _ => Err(Error::Acquisition(
                "capture session closed while initializing".to_string(),
            )),
        }
    }

    /// Grab the current frame as an encoded JPEG buffer
    ///
    /// Valid only in `Ready`; does not change state.
    pub async fn capture(&self) -> Result<Vec<u8>> {
        let device = {
            let session = self.session.read().await;
            let s = session
                .as_ref()
                .ok_or_else(|| Error::Validation("no capture session open".to_string()))?;
            if s.state != CaptureState::Ready {
                return Err(Error::Validation(format!(
                    "capture session not ready (state: {})",
                    s.state.as_str()
                )));
            }
            s.device
                .clone()
                .ok_or_else(|| Error::Internal("session without device".to_string()))?
        };

        let frame = device.grab_frame().await?;
        if frame.is_empty() {
            return Err(Error::Acquisition(
                "device returned empty frame".to_string(),
            ));
        }

        tracing::debug!(size = frame.len(), "Frame captured");
        Ok(frame)
    }

    /// Stop the device and close the session
    ///
    /// Invoked on every exit path (success, cancel, failure). Idempotent.
    pub async fn close(&self) {
        let mut session = self.session.write().await;
        if let Some(s) = session.as_mut() {
            if let Some(device) = s.device.take() {
                device.stop().await;
            }
            s.transition(CaptureState::Closed);
        }
    }
}
