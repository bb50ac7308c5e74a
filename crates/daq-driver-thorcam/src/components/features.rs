//! Thorlabs TSI Feature Control
//!
//! Handles getting/setting camera settings (exposure, gain, black level,
//! trigger configuration) and static camera information.
//!
//! Setters validate ranges before touching the SDK, so an out-of-range
//! request leaves the camera untouched.

use crate::components::connection::ThorcamConnection;
use anyhow::Result;
#[cfg(feature = "thorcam_hardware")]
use anyhow::anyhow;

#[cfg(feature = "thorcam_hardware")]
use crate::components::connection::get_tsi_error;
#[cfg(feature = "thorcam_hardware")]
use tlcamera_sys::*;

/// Gain range accepted by the TSI cameras, in tenths of dB.
pub const GAIN_RANGE: std::ops::RangeInclusive<i64> = 0..=48;

/// Black level (ADC offset) range accepted by the TSI cameras.
pub const BLACK_LEVEL_RANGE: std::ops::RangeInclusive<i64> = 0..=511;

// =============================================================================
// Data Structures
// =============================================================================

/// Static camera information queried once at open.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    /// Camera model name (e.g., "CS2100M-USB")
    pub model: String,
    /// Camera serial number
    pub serial_number: String,
    /// Firmware version string
    pub firmware_version: String,
    /// Sensor size in pixels (width, height)
    pub sensor_size: (u32, u32),
    /// ADC bit depth
    pub bit_depth: u32,
}

/// Camera trigger/operation mode.
///
/// Values match the TSI SDK's TL_CAMERA_OPERATION_MODE enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Each software trigger starts one exposure sequence
    SoftwareTriggered,
    /// Each hardware trigger edge starts one fixed-length exposure
    HardwareTriggered,
    /// Exposure duration follows the hardware trigger pulse width
    Bulb,
}

impl OperationMode {
    pub fn from_sdk(value: i32) -> Self {
        match value {
            0 => OperationMode::SoftwareTriggered,
            1 => OperationMode::HardwareTriggered,
            2 => OperationMode::Bulb,
            _ => OperationMode::SoftwareTriggered,
        }
    }

    pub fn to_sdk(self) -> i32 {
        match self {
            OperationMode::SoftwareTriggered => 0,
            OperationMode::HardwareTriggered => 1,
            OperationMode::Bulb => 2,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s {
            "Software Triggered" => OperationMode::SoftwareTriggered,
            "Hardware Triggered" => OperationMode::HardwareTriggered,
            "Bulb" => OperationMode::Bulb,
            _ => OperationMode::SoftwareTriggered,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationMode::SoftwareTriggered => "Software Triggered",
            OperationMode::HardwareTriggered => "Hardware Triggered",
            OperationMode::Bulb => "Bulb",
        }
    }

    pub fn all_choices() -> Vec<String> {
        vec![
            "Software Triggered".into(),
            "Hardware Triggered".into(),
            "Bulb".into(),
        ]
    }
}

// =============================================================================
// Feature Access
// =============================================================================

/// Stateless accessors for camera settings.
///
/// All functions take the connection by reference; callers hold the
/// connection mutex for the duration of the call.
pub struct ThorcamFeatures;

#[cfg(not(feature = "thorcam_hardware"))]
fn mock_state(
    conn: &ThorcamConnection,
) -> std::sync::MutexGuard<'_, crate::components::connection::MockCameraState> {
    conn.mock_state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl ThorcamFeatures {
    /// Query static camera information (model, serial, firmware, sensor size).
    pub fn get_camera_info(conn: &ThorcamConnection) -> Result<CameraInfo> {
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn
                .handle()
                .ok_or_else(|| anyhow!("Camera not open"))?;

            let read_string = |getter: unsafe extern "C" fn(
                *mut std::os::raw::c_void,
                *mut i8,
                i32,
            ) -> i32|
             -> Result<String> {
                let mut buf = vec![0i8; 256];
                unsafe {
                    // SAFETY: h is an open camera handle; buf is writable and
                    // its length is passed to the SDK.
                    if getter(h, buf.as_mut_ptr(), buf.len() as i32) != 0 {
                        return Err(anyhow!("Failed to read camera string: {}", get_tsi_error()));
                    }
                    Ok(std::ffi::CStr::from_ptr(buf.as_ptr())
                        .to_string_lossy()
                        .into_owned())
                }
            };

            let model = read_string(tl_camera_get_model)?;
            let serial_number = read_string(tl_camera_get_serial_number)?;
            let firmware_version = read_string(tl_camera_get_firmware_version)?;

            let mut width: i32 = 0;
            let mut height: i32 = 0;
            let mut bit_depth: i32 = 0;
            unsafe {
                // SAFETY: h is an open camera handle; out pointers are valid.
                if tl_camera_get_sensor_width(h, &mut width) != 0
                    || tl_camera_get_sensor_height(h, &mut height) != 0
                    || tl_camera_get_bit_depth(h, &mut bit_depth) != 0
                {
                    return Err(anyhow!("Failed to read sensor geometry: {}", get_tsi_error()));
                }
            }

            Ok(CameraInfo {
                model,
                serial_number,
                firmware_version,
                sensor_size: (width.max(0) as u32, height.max(0) as u32),
                bit_depth: bit_depth.max(0) as u32,
            })
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            use crate::components::connection::{
                MOCK_BIT_DEPTH, MOCK_SENSOR_HEIGHT, MOCK_SENSOR_WIDTH,
            };
            let _ = conn;
            Ok(CameraInfo {
                model: "CS2100M-USB".to_string(),
                serial_number: "00001".to_string(),
                firmware_version: "1.0.0".to_string(),
                sensor_size: (MOCK_SENSOR_WIDTH, MOCK_SENSOR_HEIGHT),
                bit_depth: MOCK_BIT_DEPTH,
            })
        }
    }

    /// Set exposure time in microseconds.
    pub fn set_exposure_time_us(conn: &ThorcamConnection, us: f64) -> Result<()> {
        if !us.is_finite() || us < 0.0 {
            anyhow::bail!("Exposure time must be a non-negative number, got {}", us);
        }
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            unsafe {
                // SAFETY: h is an open camera handle.
                if tl_camera_set_exposure_time(h, us.round() as i64) != 0 {
                    return Err(anyhow!("Failed to set exposure time: {}", get_tsi_error()));
                }
            }
            Ok(())
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            mock_state(conn).exposure_time_us = us;
            Ok(())
        }
    }

    /// Get exposure time in microseconds.
    pub fn get_exposure_time_us(conn: &ThorcamConnection) -> Result<f64> {
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            let mut us: i64 = 0;
            unsafe {
                // SAFETY: h is an open camera handle; us is a valid out pointer.
                if tl_camera_get_exposure_time(h, &mut us) != 0 {
                    return Err(anyhow!("Failed to get exposure time: {}", get_tsi_error()));
                }
            }
            Ok(us as f64)
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            Ok(mock_state(conn).exposure_time_us)
        }
    }

    /// Set sensor gain. Rejects values outside 0..=48 before touching hardware.
    pub fn set_gain(conn: &ThorcamConnection, gain: i64) -> Result<()> {
        if !GAIN_RANGE.contains(&gain) {
            anyhow::bail!(
                "Gain {} out of range {}..={}",
                gain,
                GAIN_RANGE.start(),
                GAIN_RANGE.end()
            );
        }
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            unsafe {
                // SAFETY: h is an open camera handle; gain is range checked above.
                if tl_camera_set_gain(h, gain as i32) != 0 {
                    return Err(anyhow!("Failed to set gain: {}", get_tsi_error()));
                }
            }
            Ok(())
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            mock_state(conn).gain = gain;
            Ok(())
        }
    }

    /// Get sensor gain.
    pub fn get_gain(conn: &ThorcamConnection) -> Result<i64> {
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            let mut gain: i32 = 0;
            unsafe {
                // SAFETY: h is an open camera handle; gain is a valid out pointer.
                if tl_camera_get_gain(h, &mut gain) != 0 {
                    return Err(anyhow!("Failed to get gain: {}", get_tsi_error()));
                }
            }
            Ok(gain as i64)
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            Ok(mock_state(conn).gain)
        }
    }

    /// Set black level. Rejects values outside 0..=511 before touching hardware.
    pub fn set_black_level(conn: &ThorcamConnection, level: i64) -> Result<()> {
        if !BLACK_LEVEL_RANGE.contains(&level) {
            anyhow::bail!(
                "Black level {} out of range {}..={}",
                level,
                BLACK_LEVEL_RANGE.start(),
                BLACK_LEVEL_RANGE.end()
            );
        }
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            unsafe {
                // SAFETY: h is an open camera handle; level is range checked above.
                if tl_camera_set_black_level(h, level as i32) != 0 {
                    return Err(anyhow!("Failed to set black level: {}", get_tsi_error()));
                }
            }
            Ok(())
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            mock_state(conn).black_level = level;
            Ok(())
        }
    }

    /// Get black level.
    pub fn get_black_level(conn: &ThorcamConnection) -> Result<i64> {
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            let mut level: i32 = 0;
            unsafe {
                // SAFETY: h is an open camera handle; level is a valid out pointer.
                if tl_camera_get_black_level(h, &mut level) != 0 {
                    return Err(anyhow!("Failed to get black level: {}", get_tsi_error()));
                }
            }
            Ok(level as i64)
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            Ok(mock_state(conn).black_level)
        }
    }

    /// Set the camera operation (trigger) mode.
    pub fn set_operation_mode(conn: &ThorcamConnection, mode: OperationMode) -> Result<()> {
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            unsafe {
                // SAFETY: h is an open camera handle.
                if tl_camera_set_operation_mode(h, mode.to_sdk()) != 0 {
                    return Err(anyhow!("Failed to set operation mode: {}", get_tsi_error()));
                }
            }
            Ok(())
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            mock_state(conn).operation_mode = mode.to_sdk();
            Ok(())
        }
    }

    /// Get the camera operation (trigger) mode.
    pub fn get_operation_mode(conn: &ThorcamConnection) -> Result<OperationMode> {
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            let mut mode: i32 = 0;
            unsafe {
                // SAFETY: h is an open camera handle; mode is a valid out pointer.
                if tl_camera_get_operation_mode(h, &mut mode) != 0 {
                    return Err(anyhow!("Failed to get operation mode: {}", get_tsi_error()));
                }
            }
            Ok(OperationMode::from_sdk(mode))
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            Ok(OperationMode::from_sdk(mock_state(conn).operation_mode))
        }
    }

    /// Set frames per trigger. Zero means unlimited (free run until disarm).
    pub fn set_frames_per_trigger(conn: &ThorcamConnection, frames: i64) -> Result<()> {
        if frames < 0 || frames > i64::from(u32::MAX) {
            anyhow::bail!(
                "Frames per trigger must be in 0..={}, got {}",
                u32::MAX,
                frames
            );
        }
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            unsafe {
                // SAFETY: h is an open camera handle; frames is range checked above.
                if tl_camera_set_frames_per_trigger_zero_for_unlimited(h, frames as u32) != 0 {
                    return Err(anyhow!(
                        "Failed to set frames per trigger: {}",
                        get_tsi_error()
                    ));
                }
            }
            Ok(())
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            mock_state(conn).frames_per_trigger = frames;
            Ok(())
        }
    }

    /// Get frames per trigger.
    pub fn get_frames_per_trigger(conn: &ThorcamConnection) -> Result<i64> {
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            let mut frames: u32 = 0;
            unsafe {
                // SAFETY: h is an open camera handle; frames is a valid out pointer.
                if tl_camera_get_frames_per_trigger_zero_for_unlimited(h, &mut frames) != 0 {
                    return Err(anyhow!(
                        "Failed to get frames per trigger: {}",
                        get_tsi_error()
                    ));
                }
            }
            Ok(frames as i64)
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            Ok(mock_state(conn).frames_per_trigger)
        }
    }

    /// Get the current image size in pixels (width, height).
    ///
    /// This can differ from the sensor size when a ROI is active on the
    /// camera; we always run full frame, so it normally matches.
    pub fn get_image_size(conn: &ThorcamConnection) -> Result<(u32, u32)> {
        #[cfg(feature = "thorcam_hardware")]
        {
            let h = conn.handle().ok_or_else(|| anyhow!("Camera not open"))?;
            let mut width: i32 = 0;
            let mut height: i32 = 0;
            unsafe {
                // SAFETY: h is an open camera handle; out pointers are valid.
                if tl_camera_get_image_width(h, &mut width) != 0
                    || tl_camera_get_image_height(h, &mut height) != 0
                {
                    return Err(anyhow!("Failed to get image size: {}", get_tsi_error()));
                }
            }
            Ok((width.max(0) as u32, height.max(0) as u32))
        }
        #[cfg(not(feature = "thorcam_hardware"))]
        {
            use crate::components::connection::{MOCK_SENSOR_HEIGHT, MOCK_SENSOR_WIDTH};
            let _ = conn;
            Ok((MOCK_SENSOR_WIDTH, MOCK_SENSOR_HEIGHT))
        }
    }
}
