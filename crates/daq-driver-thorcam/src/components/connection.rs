//! Thorlabs TSI Connection Management
//!
//! Handles SDK initialization, camera discovery, opening/closing, and
//! resource cleanup.
//!
//! ## SDK Reference Counting
//!
//! The TSI SDK uses global state: `tl_camera_open_sdk()` and
//! `tl_camera_close_sdk()` affect the entire process. To support multiple
//! `ThorcamDriver` instances, we use a global reference counter. The SDK is
//! only closed when the last connection closes.

// Common imports for all configurations
use anyhow::Result;

#[cfg(feature = "thorcam_hardware")]
use anyhow::{anyhow, Context};
#[cfg(feature = "thorcam_hardware")]
use std::ffi::CString;
#[cfg(feature = "thorcam_hardware")]
use std::os::raw::c_void;
#[cfg(feature = "thorcam_hardware")]
use std::sync::atomic::{AtomicU32, Ordering};
#[cfg(feature = "thorcam_hardware")]
use std::sync::Mutex;

#[cfg(feature = "thorcam_hardware")]
use tlcamera_sys::*;

/// Global reference counter for TSI SDK initialization.
///
/// The SDK uses global state, so we track how many connections exist.
/// - When count goes 0 → 1: call tl_camera_open_sdk()
/// - When count goes 1 → 0: call tl_camera_close_sdk()
#[cfg(feature = "thorcam_hardware")]
static SDK_REF_COUNT: AtomicU32 = AtomicU32::new(0);

/// Mutex to ensure atomic increment + open and decrement + close.
#[cfg(feature = "thorcam_hardware")]
static SDK_INIT_MUTEX: Mutex<()> = Mutex::new(());

/// Helper to get the last TSI SDK error string
#[cfg(feature = "thorcam_hardware")]
pub(crate) fn get_tsi_error() -> String {
    unsafe {
        // SAFETY: tl_camera_get_last_error returns a pointer to a static
        // buffer owned by the SDK; it is valid until the next SDK call.
        let err_ptr = tl_camera_get_last_error();
        if err_ptr.is_null() {
            "unknown error".to_string()
        } else {
            std::ffi::CStr::from_ptr(err_ptr)
                .to_string_lossy()
                .into_owned()
        }
    }
}

/// Manages the connection to the TSI SDK and a specific camera.
#[derive(Default)]
pub struct ThorcamConnection {
    /// Opaque camera handle from the TSI SDK.
    ///
    /// Stored as usize because the raw `*mut c_void` is not Send, and the
    /// connection is shared across async tasks. The SDK handle is only ever
    /// used while the owning mutex is held.
    #[cfg(feature = "thorcam_hardware")]
    handle: usize,
    /// Whether SDK is initialized
    #[cfg(feature = "thorcam_hardware")]
    sdk_initialized: bool,

    /// Mock state for testing without hardware
    #[cfg(not(feature = "thorcam_hardware"))]
    pub mock_state: std::sync::Mutex<MockCameraState>,
}

#[cfg(not(feature = "thorcam_hardware"))]
#[derive(Debug, Clone)]
pub struct MockCameraState {
    pub exposure_time_us: f64,
    pub gain: i64,
    pub black_level: i64,
    pub operation_mode: i32,
    pub frames_per_trigger: i64,
    pub armed: bool,
    /// Software triggers received while armed but not yet consumed
    pub pending_triggers: u32,
    /// Monotonic frame number used to synthesize pixel data
    pub frame_counter: u64,
    /// When the camera was last armed (drives hardware-trigger emulation)
    pub armed_at: Option<std::time::Instant>,
    /// Frames emitted since the last arm
    pub frames_emitted: u64,
    /// When non-zero, the next N frame polls fail (transient-fault injection)
    pub poll_failures: u32,
}

#[cfg(not(feature = "thorcam_hardware"))]
impl Default for MockCameraState {
    fn default() -> Self {
        Self {
            exposure_time_us: 10_000.0,
            gain: 0,
            black_level: 0,
            operation_mode: 0, // SoftwareTriggered
            frames_per_trigger: 1,
            armed: false,
            pending_triggers: 0,
            frame_counter: 0,
            armed_at: None,
            frames_emitted: 0,
            poll_failures: 0,
        }
    }
}

/// Mock sensor geometry (Zelux-class sensor)
#[cfg(not(feature = "thorcam_hardware"))]
pub const MOCK_SENSOR_WIDTH: u32 = 1920;
#[cfg(not(feature = "thorcam_hardware"))]
pub const MOCK_SENSOR_HEIGHT: u32 = 1080;
#[cfg(not(feature = "thorcam_hardware"))]
pub const MOCK_BIT_DEPTH: u32 = 16;

impl ThorcamConnection {
    /// Create a new, unconnected connection manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize the TSI SDK.
    ///
    /// This must be called before opening a camera.
    ///
    /// Uses global reference counting to ensure the SDK is only opened once,
    /// even with multiple ThorcamDriver instances.
    #[cfg(feature = "thorcam_hardware")]
    pub fn initialize(&mut self) -> Result<()> {
        if self.sdk_initialized {
            return Ok(());
        }

        // Lock to ensure atomic check-and-open.
        // Recover from poison since we need to manage ref count consistently.
        let _guard = match SDK_INIT_MUTEX.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("SDK init mutex poisoned during initialize - recovering");
                poisoned.into_inner()
            }
        };

        // Increment ref count first, then open if we're the first
        let prev_count = SDK_REF_COUNT.fetch_add(1, Ordering::SeqCst);

        if prev_count == 0 {
            // We're the first connection - open the SDK
            unsafe {
                // SAFETY: Global TSI SDK open; protected by SDK_INIT_MUTEX.
                if tl_camera_open_sdk() != 0 {
                    // Rollback ref count on failure
                    SDK_REF_COUNT.fetch_sub(1, Ordering::SeqCst);
                    return Err(anyhow!("Failed to open TSI SDK: {}", get_tsi_error()));
                }
            }
            tracing::info!("TSI SDK opened (ref count: 1)");
        } else {
            tracing::debug!("TSI SDK already open (ref count: {})", prev_count + 1);
        }

        self.sdk_initialized = true;
        Ok(())
    }

    /// Open a camera by serial number.
    ///
    /// The serial must appear in the SDK's discovery list; unknown serials
    /// fail rather than silently opening a different camera.
    #[cfg(feature = "thorcam_hardware")]
    pub fn open(&mut self, serial: &str) -> Result<()> {
        if !self.sdk_initialized {
            return Err(anyhow!("SDK not initialized"));
        }
        if self.handle != 0 {
            return Ok(()); // Already open
        }

        let available = Self::list_available_cameras()?;
        if available.is_empty() {
            return Err(anyhow!("No Thorlabs cameras detected"));
        }
        if !available.iter().any(|s| s == serial) {
            return Err(daq_core::DaqError::CameraNotFound(serial.to_string()).into());
        }

        let serial_cstr = CString::new(serial).context("Invalid camera serial")?;
        let mut hcam: *mut c_void = std::ptr::null_mut();

        unsafe {
            // SAFETY: serial_cstr is a valid C string; hcam is a valid out pointer.
            if tl_camera_open_camera(serial_cstr.as_ptr() as *mut i8, &mut hcam) != 0 {
                return Err(anyhow!(
                    "Failed to open camera {}: {}",
                    serial,
                    get_tsi_error()
                ));
            }
        }

        self.handle = hcam as usize;
        Ok(())
    }

    /// Close the camera if open.
    #[cfg(feature = "thorcam_hardware")]
    pub fn close(&mut self) {
        if self.handle != 0 {
            let h = self.handle as *mut c_void;
            self.handle = 0;
            unsafe {
                // SAFETY: h was returned by tl_camera_open_camera and is still
                // owned by this connection.
                tl_camera_close_camera(h);
            }
        }
    }

    /// Close the SDK.
    ///
    /// Uses global reference counting to ensure the SDK is only closed when
    /// the last connection closes.
    ///
    /// Recovers from mutex poisoning to ensure ref count is always decremented.
    #[cfg(feature = "thorcam_hardware")]
    pub fn uninitialize(&mut self) {
        self.close(); // Ensure camera closed first

        if !self.sdk_initialized {
            return;
        }
        self.sdk_initialized = false;

        // Lock to ensure atomic check-and-close.
        // Use into_inner() to recover from poison - we MUST decrement ref count.
        let _guard = match SDK_INIT_MUTEX.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("SDK init mutex poisoned during uninitialize - recovering");
                poisoned.into_inner()
            }
        };

        // Decrement ref count, then close if we're the last
        let prev_count = SDK_REF_COUNT.fetch_sub(1, Ordering::SeqCst);

        if prev_count == 1 {
            // We were the last connection - close the SDK
            unsafe {
                // SAFETY: Global TSI SDK close; protected by SDK_INIT_MUTEX and ref count.
                tl_camera_close_sdk();
            }
            tracing::info!("TSI SDK closed (last connection closed)");
        } else if prev_count == 0 {
            // This shouldn't happen - we decremented below zero
            tracing::error!("TSI SDK ref count underflow - this indicates a bug");
            SDK_REF_COUNT.store(0, Ordering::SeqCst);
        } else {
            tracing::debug!("TSI SDK still in use (ref count: {})", prev_count - 1);
        }
    }

    /// Get the raw camera handle.
    #[cfg(feature = "thorcam_hardware")]
    pub fn handle(&self) -> Option<*mut c_void> {
        if self.handle == 0 {
            None
        } else {
            Some(self.handle as *mut c_void)
        }
    }

    /// List the serial numbers of all Thorlabs cameras connected to the system.
    ///
    /// Returns serial strings that can be used to open connections.
    /// The SDK must be initialized before calling this function.
    ///
    /// # Example
    /// ```ignore
    /// let mut conn = ThorcamConnection::new();
    /// conn.initialize()?;
    /// for serial in ThorcamConnection::list_available_cameras()? {
    ///     println!("Found camera: {}", serial);
    /// }
    /// ```
    #[cfg(feature = "thorcam_hardware")]
    pub fn list_available_cameras() -> Result<Vec<String>> {
        // Note: SDK must be initialized before calling this
        // We check if ref count > 0 to verify SDK is ready
        let ref_count = SDK_REF_COUNT.load(Ordering::SeqCst);
        if ref_count == 0 {
            return Err(anyhow!("TSI SDK not initialized. Call initialize() first."));
        }

        let mut buffer = vec![0i8; 1024];
        unsafe {
            // SAFETY: buffer is writable and its length is passed to the SDK.
            if tl_camera_discover_available_cameras(buffer.as_mut_ptr(), buffer.len() as i32) != 0 {
                return Err(anyhow!("Failed to discover cameras: {}", get_tsi_error()));
            }
        }

        // The SDK returns a space-separated list of serial numbers.
        let list = unsafe {
            // SAFETY: the SDK null-terminates the list within the buffer.
            std::ffi::CStr::from_ptr(buffer.as_ptr())
                .to_string_lossy()
                .into_owned()
        };

        Ok(list
            .split_whitespace()
            .map(|s| s.to_string())
            .collect())
    }

    /// List available camera serials (mock mode).
    #[cfg(not(feature = "thorcam_hardware"))]
    pub fn list_available_cameras() -> Result<Vec<String>> {
        Ok(vec!["00001".to_string(), "12345".to_string()])
    }

    /// Open a camera by serial number (mock mode).
    ///
    /// Validates the serial against the canned discovery list so unknown
    /// serials fail the same way they would against hardware.
    #[cfg(not(feature = "thorcam_hardware"))]
    pub fn open(&mut self, serial: &str) -> Result<()> {
        let available = Self::list_available_cameras()?;
        if !available.iter().any(|s| s == serial) {
            return Err(daq_core::DaqError::CameraNotFound(serial.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(feature = "thorcam_hardware")]
impl Drop for ThorcamConnection {
    fn drop(&mut self) {
        self.uninitialize();
    }
}
