//! Thorlabs TSI Acquisition Logic
//!
//! Handles arming, software triggering, frame polling, and the high level
//! snap / grab sequences.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use daq_core::data::Frame;
use daq_core::parameter::Parameter;

use crate::components::connection::ThorcamConnection;
use crate::components::features::{OperationMode, ThorcamFeatures};

#[cfg(feature = "thorcam_hardware")]
use anyhow::anyhow;
#[cfg(feature = "thorcam_hardware")]
use crate::components::connection::get_tsi_error;
#[cfg(feature = "thorcam_hardware")]
use tlcamera_sys::*;

/// Number of frames the SDK buffers between arm and disarm.
///
/// Large enough that a hardware-triggered burst is not dropped while the
/// host is busy decoding earlier images.
pub const ARM_FRAME_BUFFER: u32 = 50;

pub struct ThorcamAcquisition {
    pub armed: Parameter<bool>,
    pub frame_count: Arc<AtomicU64>,
    pub frame_tx: tokio::sync::broadcast::Sender<Arc<Frame>>,

    abort_flag: Arc<AtomicBool>,
}

impl ThorcamAcquisition {
    pub fn new(armed: Parameter<bool>) -> Self {
        let (frame_tx, _) = tokio::sync::broadcast::channel(16);
        Self {
            armed,
            frame_count: Arc::new(AtomicU64::new(0)),
            frame_tx,
            abort_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Arm the camera with the standard frame buffer.
    pub async fn arm(&self, conn: &ThorcamConnection) -> Result<()> {
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            unsafe {
                // SAFETY: h is an open camera handle.
                if tl_camera_arm(h, ARM_FRAME_BUFFER as i32) != 0 {
                    return Err(anyhow!("Failed to arm camera: {}", get_tsi_error()));
                }
            }
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            let mut state = conn
                .mock_state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state.armed = true;
            state.pending_triggers = 0;
            state.frames_emitted = 0;
            state.armed_at = Some(std::time::Instant::now());
        }

        self.armed.set(true).await
    }

    /// Disarm the camera. Safe to call when not armed.
    pub async fn disarm(&self, conn: &ThorcamConnection) -> Result<()> {
        #[cfg(feature = "thorcam_hardware")]
        {
            if let Some(h) = conn.handle() {
                unsafe {
                    // SAFETY: h is an open camera handle.
                    if tl_camera_disarm(h) != 0 {
                        return Err(anyhow!("Failed to disarm camera: {}", get_tsi_error()));
                    }
                }
            }
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            let mut state = conn
                .mock_state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state.armed = false;
            state.pending_triggers = 0;
            state.armed_at = None;
        }

        self.armed.set(false).await
    }

    /// Issue a software trigger. The camera must be armed.
    pub fn issue_software_trigger(&self, conn: &ThorcamConnection) -> Result<()> {
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            unsafe {
                // SAFETY: h is an open camera handle.
                if tl_camera_issue_software_trigger(h) != 0 {
                    return Err(anyhow!(
                        "Failed to issue software trigger: {}",
                        get_tsi_error()
                    ));
                }
            }
            Ok(())
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            let mut state = conn
                .mock_state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !state.armed {
                anyhow::bail!("Cannot trigger: camera is not armed");
            }
            state.pending_triggers += 1;
            Ok(())
        }
    }

    /// Poll for a pending frame without blocking.
    ///
    /// Returns `Ok(None)` when no frame is ready yet. Delivered frames are
    /// counted and published to subscribers.
    pub fn poll_frame(
        &self,
        conn: &ThorcamConnection,
        width: u32,
        height: u32,
    ) -> Result<Option<Frame>> {
        match self.take_pending_frame(conn, width, height)? {
            Some(frame) => {
                self.frame_count.fetch_add(1, Ordering::SeqCst);
                let _ = self.frame_tx.send(Arc::new(frame.clone()));
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Pull the next pending frame off the camera without publishing it.
    ///
    /// Used to discard stale frames: drained frames must not show up in the
    /// frame counter or on the broadcast channel.
    fn take_pending_frame(
        &self,
        conn: &ThorcamConnection,
        width: u32,
        height: u32,
    ) -> Result<Option<Frame>> {
        #[cfg(feature = "thorcam_hardware")]
        let frame = {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            let mut image_buffer: *mut u16 = std::ptr::null_mut();
            let mut sdk_frame_count: i32 = 0;
            let mut metadata: *mut u8 = std::ptr::null_mut();
            let mut metadata_size: i32 = 0;
            unsafe {
                // SAFETY: h is an open camera handle; all out pointers are valid.
                if tl_camera_get_pending_frame_or_null(
                    h,
                    &mut image_buffer,
                    &mut sdk_frame_count,
                    &mut metadata,
                    &mut metadata_size,
                ) != 0
                {
                    return Err(anyhow!("Failed to poll for frame: {}", get_tsi_error()));
                }
                if image_buffer.is_null() {
                    return Ok(None);
                }
                // SAFETY: the SDK guarantees the buffer holds width*height
                // pixels and stays valid until the next poll or disarm. We
                // copy it out immediately.
                let pixels =
                    std::slice::from_raw_parts(image_buffer, (width * height) as usize);
                Frame::from_u16(width, height, pixels)
            }
        };

        #[cfg(not(feature = "thorcam_hardware"))]
        let frame = {
            let mut state = conn
                .mock_state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if state.poll_failures > 0 {
                state.poll_failures -= 1;
                anyhow::bail!("Injected frame poll failure");
            }
            if !state.armed {
                return Ok(None);
            }

            let ready = match OperationMode::from_sdk(state.operation_mode) {
                OperationMode::SoftwareTriggered => {
                    if state.pending_triggers > 0 {
                        state.pending_triggers -= 1;
                        true
                    } else {
                        false
                    }
                }
                // Emulate an external trigger source running at the exposure
                // period: frame k becomes ready k periods after arming.
                OperationMode::HardwareTriggered | OperationMode::Bulb => {
                    let period =
                        Duration::from_micros(state.exposure_time_us.max(1.0) as u64);
                    match state.armed_at {
                        Some(armed_at) => {
                            armed_at.elapsed() >= period * (state.frames_emitted as u32 + 1)
                        }
                        None => false,
                    }
                }
            };

            if !ready {
                return Ok(None);
            }

            state.frames_emitted += 1;
            let frame_num = state.frame_counter;
            state.frame_counter += 1;
            drop(state);

            let mut pixels = vec![0u16; (width * height) as usize];
            for y in 0..height {
                for x in 0..width {
                    let value =
                        (((x + y + frame_num as u32) % 4096) as u16).saturating_add(100);
                    pixels[(y * width + x) as usize] = value;
                }
            }
            Frame::from_u16(width, height, &pixels)
        };

        Ok(Some(frame))
    }

    /// Acquire a single image using a software trigger.
    ///
    /// The camera is temporarily switched to software triggering with one
    /// frame per trigger; the configured operation mode is reapplied by the
    /// next triggered acquisition.
    pub async fn snap(
        &self,
        conn: &ThorcamConnection,
        width: u32,
        height: u32,
    ) -> Result<Frame> {
        if self.armed.get() {
            self.disarm(conn).await?;
        }

        ThorcamFeatures::set_operation_mode(conn, OperationMode::SoftwareTriggered)?;
        ThorcamFeatures::set_frames_per_trigger(conn, 1)?;

        self.arm(conn).await?;
        self.issue_software_trigger(conn)?;

        let mut polls: u64 = 0;
        let frame = loop {
            match self.poll_frame(conn, width, height) {
                Ok(Some(frame)) => break frame,
                Ok(None) => {}
                // Transient poll errors are retried; the next poll usually
                // succeeds, and bailing out here would leave the camera armed.
                Err(e) => tracing::warn!("Frame poll failed, retrying: {}", e),
            }
            polls += 1;
            if polls % 1000 == 0 {
                tracing::debug!("Still waiting for snap frame ({} polls)", polls);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        };

        self.disarm(conn).await?;
        Ok(frame)
    }

    /// Acquire `n` triggered images in the given operation mode.
    ///
    /// Stale frames from a previous acquisition are discarded before the
    /// camera is re-armed. Each image is waited for indefinitely and poll
    /// errors are logged and retried; a pending abort request ends the
    /// acquisition early and returns the images captured so far.
    pub async fn grab_multiple(
        &self,
        conn: &ThorcamConnection,
        n: usize,
        mode: OperationMode,
        frames_per_trigger: i64,
        width: u32,
        height: u32,
    ) -> Result<Vec<Frame>> {
        // Drain leftovers from a prior acquisition before reconfiguring.
        // Drained frames bypass the counter and the broadcast channel.
        let mut stale: u32 = 0;
        loop {
            match self.take_pending_frame(conn, width, height) {
                Ok(Some(_)) => stale += 1,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Stale frame drain stopped: {}", e);
                    break;
                }
            }
        }
        if stale > 0 {
            tracing::debug!("Discarded {} stale frames before grab", stale);
        }

        if self.armed.get() {
            self.disarm(conn).await?;
        }

        ThorcamFeatures::set_operation_mode(conn, mode)?;
        ThorcamFeatures::set_frames_per_trigger(conn, frames_per_trigger)?;
        self.arm(conn).await?;

        tracing::info!("Attempting to grab {} images ({})", n, mode.as_str());

        let mut frames = Vec::with_capacity(n);
        for i in 0..n {
            loop {
                if self.abort_flag.swap(false, Ordering::SeqCst) {
                    tracing::warn!(
                        "Acquisition aborted after {} of {} images",
                        frames.len(),
                        n
                    );
                    self.disarm(conn).await?;
                    return Ok(frames);
                }
                match self.poll_frame(conn, width, height) {
                    Ok(Some(frame)) => {
                        frames.push(frame);
                        tracing::info!("Got image {} of {}", i + 1, n);
                        break;
                    }
                    Ok(None) => {}
                    // A failed poll does not end the acquisition: log it and
                    // keep waiting for the frame (abort remains available).
                    Err(e) => tracing::warn!("Frame poll failed, retrying: {}", e),
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }

        self.disarm(conn).await?;
        Ok(frames)
    }

    /// Request that an in-flight grab ends early.
    ///
    /// The grab loop consumes the flag, so a request made while idle affects
    /// at most the next grab.
    pub fn request_abort(&self) {
        self.abort_flag.store(true, Ordering::SeqCst);
    }

    /// Whether an abort request is pending.
    pub fn abort_requested(&self) -> bool {
        self.abort_flag.load(Ordering::SeqCst)
    }
}
