//! Atomic Hardware Capabilities
//!
//! This module defines fine-grained capability traits that hardware devices can
//! implement. Instead of one monolithic device trait, devices implement the
//! specific capabilities they actually support:
//!
//! - A triggered camera implements: `Triggerable + ExposureControl + FrameCapture`
//! - A simple detector might implement only `FrameCapture`
//!
//! This approach enables:
//! - Better composition (devices can mix capabilities)
//! - Clearer contracts (traits are small and focused)
//! - Easier testing (mock individual capabilities)
//! - Hardware-agnostic code (functions work with trait bounds)
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE thing
//!
//! # Example
//!
//! ```rust,ignore
//! // Use in generic acquisition code
//! async fn triggered_acquisition<C>(camera: &C, n: usize) -> Result<Vec<Frame>>
//! where
//!     C: Triggerable + ExposureControl + FrameCapture,
//! {
//!     camera.set_exposure(0.1).await?;
//!     camera.grab_multiple(n).await
//! }
//! ```

use crate::observable::ParameterSet;
use anyhow::Result;
use async_trait::async_trait;

pub use crate::data::Frame;

// =============================================================================
// Device Category
// =============================================================================

/// Device category for classification and registry grouping
///
/// Drivers should explicitly set their category in [`crate::driver::DeviceMetadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceCategory {
    /// Cameras and imaging devices (FrameCapture)
    Camera,
    /// Detectors and sensors
    Detector,
    /// Devices that don't fit other categories
    #[default]
    Other,
}

impl DeviceCategory {
    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Camera => "Cameras",
            Self::Detector => "Detectors",
            Self::Other => "Other",
        }
    }
}

// =============================================================================
// Capability Traits
// =============================================================================

/// Capability: External Triggering
///
/// Devices that can be armed and triggered (cameras, detectors, pulse generators).
///
/// # Contract
/// - `arm()` prepares the device for triggers (may configure hardware buffers)
/// - `trigger()` initiates acquisition (software trigger)
/// - `disarm()` returns the device to idle; safe to call when not armed
/// - Calling `trigger()` on an unarmed device should return Err
///
/// # Thread Safety
/// - All methods are async and require `&self` (immutable reference)
/// - Interior mutability (Mutex/RwLock) should be used for state
#[async_trait]
pub trait Triggerable: Send + Sync {
    /// Arm device for triggers
    ///
    /// Prepares hardware to respond to trigger signals. May configure
    /// buffers, clear counters, or enter standby mode.
    ///
    /// # Returns
    /// - Ok(()) if armed successfully
    /// - Err if device is busy or in error state
    async fn arm(&self) -> Result<()>;

    /// Send software trigger
    ///
    /// Initiates acquisition. Device must be armed first.
    ///
    /// # Returns
    /// - Ok(()) if trigger accepted
    /// - Err if not armed or hardware error
    async fn trigger(&self) -> Result<()>;

    /// Disarm device
    ///
    /// Returns the device to idle. Safe to call when not armed.
    ///
    /// # Returns
    /// - Ok(()) if disarmed
    /// - Err on hardware error
    async fn disarm(&self) -> Result<()>;

    /// Check if device is currently armed
    ///
    /// # Returns
    /// - Ok(true) if device is armed and ready for trigger
    /// - Ok(false) if device is not armed
    /// - Err if state cannot be determined or not supported
    ///
    /// # Default Implementation
    /// Returns an error indicating state query is not supported.
    async fn is_armed(&self) -> Result<bool> {
        anyhow::bail!("Armed state query not supported by this device")
    }
}

/// Capability: Exposure Time Control
///
/// Devices with configurable integration time (cameras, spectrometers, photodetectors).
///
/// # Contract
/// - Exposure is in seconds (not milliseconds)
/// - Setting exposure does not start acquisition
/// - Exposure applies to the next acquisition
#[async_trait]
pub trait ExposureControl: Send + Sync {
    /// Set exposure/integration time
    ///
    /// # Arguments
    /// * `seconds` - Exposure time in seconds
    ///
    /// # Returns
    /// - Ok(()) if exposure set successfully
    /// - Err if value is out of hardware range
    async fn set_exposure(&self, seconds: f64) -> Result<()>;

    /// Get current exposure setting
    ///
    /// # Returns
    /// Current exposure time in seconds
    async fn get_exposure(&self) -> Result<f64>;
}

/// Capability: Frame Acquisition
///
/// Devices that produce 2D image frames on demand (cameras, beam profilers).
///
/// # Contract
/// - `snap()` captures exactly one frame, software-triggered, and returns it
/// - `grab_multiple(n)` captures `n` frames using the device's configured
///   trigger mode; it may return fewer frames only if aborted
/// - `abort_acquisition()` requests that an in-progress `grab_multiple` stop
///   early and return the frames received so far
/// - `stop_acquisition()` halts acquisition and disarms the device
/// - `resolution()` returns the current image size in pixels
#[async_trait]
pub trait FrameCapture: Send + Sync {
    /// Capture a single frame
    ///
    /// Performs a complete single-shot acquisition: software trigger, wait
    /// for the frame, return it. The device's configured exposure and image
    /// settings apply.
    ///
    /// # Returns
    /// - Ok(frame) on success
    /// - Err on hardware error or timeout
    async fn snap(&self) -> Result<Frame>;

    /// Capture a burst of triggered frames
    ///
    /// Arms the device in its configured trigger mode and collects `count`
    /// frames. With an external trigger source there is no upper bound on how
    /// long this may take; use `abort_acquisition()` to bail out early.
    ///
    /// # Arguments
    /// * `count` - Number of frames expected
    ///
    /// # Returns
    /// - Ok(frames) with exactly `count` frames, or fewer if aborted
    /// - Err on hardware error
    async fn grab_multiple(&self, count: usize) -> Result<Vec<Frame>>;

    /// Request that an in-progress acquisition stop early
    ///
    /// Sets an abort flag checked by `grab_multiple`. The running call
    /// returns the frames received so far. Calling this while no acquisition
    /// is running is harmless.
    async fn abort_acquisition(&self) -> Result<()>;

    /// Stop acquisition and disarm
    ///
    /// # Returns
    /// - Ok(()) if stopped
    /// - Err on hardware error
    async fn stop_acquisition(&self) -> Result<()>;

    /// Get frame resolution (width, height)
    ///
    /// Returns the current image size in pixels.
    fn resolution(&self) -> (u32, u32);

    /// Get the number of frames captured since the driver was created
    ///
    /// # Default Implementation
    /// Returns 0 (no frame count tracking)
    fn frame_count(&self) -> u64 {
        0
    }

    /// Subscribe to the frame stream
    ///
    /// Returns a broadcast receiver that will receive `Arc<Frame>` for each
    /// captured frame. Can be called multiple times to create additional
    /// subscribers.
    ///
    /// # Returns
    /// - Some(receiver) if subscription succeeded
    /// - None if frame broadcast is not supported by this device
    ///
    /// # Default Implementation
    /// Returns None (no broadcast support).
    async fn subscribe_frames(
        &self,
    ) -> Option<tokio::sync::broadcast::Receiver<std::sync::Arc<Frame>>> {
        None
    }
}

/// Capability: Parameter Registry Access
///
/// Devices that expose their parameters for introspection and control.
///
/// This trait enables generic code (config layers, snapshot writers) to:
/// - List all parameters of a device
/// - Subscribe to parameter changes
/// - Snapshot device state for reproducibility
///
/// # Contract
/// - `parameters()` returns a reference to the device's parameter registry
/// - The ParameterSet should contain all mutable device parameters
/// - Parameters must use Parameter<T> for hardware-backed state
///
/// # Example
///
/// ```rust,ignore
/// impl Parameterized for ThorcamDriver {
///     fn parameters(&self) -> &ParameterSet {
///         &self.params
///     }
/// }
///
/// // Generic code can now enumerate parameters
/// fn list_all_parameters<D: Parameterized>(device: &D) {
///     for name in device.parameters().names() {
///         println!("Parameter: {}", name);
///     }
/// }
/// ```
pub trait Parameterized: Send + Sync {
    /// Get device's parameter registry
    fn parameters(&self) -> &ParameterSet;
}

/// Capability: Generic Command Execution
///
/// Devices that can execute specialized commands with structured arguments.
///
/// # Contract
/// - `execute_command()` takes a command name and JSON arguments.
/// - Returns a JSON object with results.
#[async_trait]
pub trait Commandable: Send + Sync {
    /// Execute a specialized command
    ///
    /// # Arguments
    /// * `command` - Command identifier
    /// * `args` - Command arguments as a JSON object
    ///
    /// # Returns
    /// - Ok(JSON object) with results
    /// - Err if command unknown or execution failed
    async fn execute_command(
        &self,
        command: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

// =============================================================================
// Combined Traits (for trait objects)
// =============================================================================

/// Composite trait for cameras (convenience)
pub trait Camera: Triggerable + FrameCapture {}

/// Blanket implementation - any type implementing both traits gets Camera for free
impl<T: Triggerable + FrameCapture> Camera for T {}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    // Mock implementations for testing

    struct MockCamera {
        armed: AtomicBool,
        exposure_s: Mutex<f64>,
    }

    impl MockCamera {
        fn new() -> Self {
            Self {
                armed: AtomicBool::new(false),
                exposure_s: Mutex::new(0.01),
            }
        }
    }

    #[async_trait]
    impl Triggerable for MockCamera {
        async fn arm(&self) -> Result<()> {
            self.armed.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn trigger(&self) -> Result<()> {
            if !self.armed.load(Ordering::SeqCst) {
                anyhow::bail!("Camera not armed");
            }
            Ok(())
        }

        async fn disarm(&self) -> Result<()> {
            self.armed.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn is_armed(&self) -> Result<bool> {
            Ok(self.armed.load(Ordering::SeqCst))
        }
    }

    #[async_trait]
    impl ExposureControl for MockCamera {
        async fn set_exposure(&self, seconds: f64) -> Result<()> {
            *self.exposure_s.lock().unwrap() = seconds;
            Ok(())
        }

        async fn get_exposure(&self) -> Result<f64> {
            Ok(*self.exposure_s.lock().unwrap())
        }
    }

    #[async_trait]
    impl FrameCapture for MockCamera {
        async fn snap(&self) -> Result<Frame> {
            Ok(Frame::from_u16(4, 4, &[0u16; 16]))
        }

        async fn grab_multiple(&self, count: usize) -> Result<Vec<Frame>> {
            let mut frames = Vec::with_capacity(count);
            for _ in 0..count {
                frames.push(Frame::from_u16(4, 4, &[0u16; 16]));
            }
            Ok(frames)
        }

        async fn abort_acquisition(&self) -> Result<()> {
            Ok(())
        }

        async fn stop_acquisition(&self) -> Result<()> {
            self.armed.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn resolution(&self) -> (u32, u32) {
            (4, 4)
        }
    }

    #[tokio::test]
    async fn test_triggerable_trait() {
        let camera = MockCamera::new();

        // Trigger before arm fails
        assert!(camera.trigger().await.is_err());

        camera.arm().await.unwrap();
        assert!(camera.is_armed().await.unwrap());
        camera.trigger().await.unwrap();

        camera.disarm().await.unwrap();
        assert!(!camera.is_armed().await.unwrap());
    }

    #[tokio::test]
    async fn test_exposure_control_trait() {
        let camera = MockCamera::new();
        camera.set_exposure(0.05).await.unwrap();
        assert_eq!(camera.get_exposure().await.unwrap(), 0.05);
    }

    #[tokio::test]
    async fn test_frame_capture_trait() {
        let camera = MockCamera::new();

        let frame = camera.snap().await.unwrap();
        assert_eq!((frame.width, frame.height), camera.resolution());

        let frames = camera.grab_multiple(3).await.unwrap();
        assert_eq!(frames.len(), 3);

        // Defaults
        assert_eq!(camera.frame_count(), 0);
        assert!(camera.subscribe_frames().await.is_none());
    }

    #[tokio::test]
    async fn test_camera_composite_trait() {
        // Blanket impl: anything Triggerable + FrameCapture is a Camera
        fn assert_camera<C: Camera>(_c: &C) {}
        let camera = MockCamera::new();
        assert_camera(&camera);
    }

    #[test]
    fn test_device_category_label() {
        assert_eq!(DeviceCategory::Camera.label(), "Cameras");
        assert_eq!(DeviceCategory::default().label(), "Other");
    }
}
