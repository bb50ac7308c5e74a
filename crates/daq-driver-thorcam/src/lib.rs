//! Thorlabs Scientific Camera Driver (Componentized)
//!
//! Built on the component architecture:
//! - Connection: SDK lifetime, discovery, and camera handles
//! - Acquisition: Arming, triggering, snap/grab sequences
//! - Features: Settings and static camera information

pub mod components;
pub mod factory;

use anyhow::Result;
use async_trait::async_trait;
use daq_core::capabilities::{
    Commandable, ExposureControl, Frame, FrameCapture, Parameterized, Triggerable,
};
use daq_core::error::DaqError;
use daq_core::observable::ParameterSet;
use daq_core::parameter::Parameter;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;

// Re-export public types from the components
pub use crate::components::features::{
    CameraInfo, OperationMode, ThorcamFeatures, BLACK_LEVEL_RANGE, GAIN_RANGE,
};
pub use crate::factory::ThorcamFactory;

use crate::components::acquisition::ThorcamAcquisition;
use crate::components::connection::ThorcamConnection;

/// Driver for Thorlabs scientific cameras (TSI SDK)
///
/// # Drop Order
///
/// Fields drop in declaration order. `acquisition` MUST drop before
/// `connection` so that nothing can touch the camera handle after the SDK
/// connection starts tearing down.
#[allow(dead_code)]
pub struct ThorcamDriver {
    serial: String,

    // Components - ORDER MATTERS for drop safety
    // acquisition must drop BEFORE connection
    acquisition: Arc<ThorcamAcquisition>,
    connection: Arc<Mutex<ThorcamConnection>>,

    // Acquisition Parameters
    exposure_time_us: Parameter<f64>,
    operation_mode: Parameter<String>,
    frames_per_trigger: Parameter<i64>,
    armed: Parameter<bool>,

    // Image Parameters
    gain: Parameter<i64>,
    black_level: Parameter<i64>,
    width: Parameter<i64>,
    height: Parameter<i64>,

    // Metadata (Info)
    model: Parameter<String>,
    serial_number: Parameter<String>,
    firmware_version: Parameter<String>,

    params: ParameterSet,

    image_width: u32,
    image_height: u32,
    bit_depth: u32,
}

impl ThorcamDriver {
    pub async fn new_async(serial: String) -> Result<Self> {
        tracing::info!("ThorcamDriver::new_async called for serial: {}", serial);
        tracing::info!(
            "thorcam_hardware feature enabled: {}",
            cfg!(feature = "thorcam_hardware")
        );

        // Run initialization in blocking task
        let connection = tokio::task::spawn_blocking({
            let serial = serial.clone();
            move || -> Result<Arc<Mutex<ThorcamConnection>>> {
                let mut conn = ThorcamConnection::new();

                #[cfg(feature = "thorcam_hardware")]
                {
                    tracing::info!("Opening TSI SDK...");
                    conn.initialize()?;
                    tracing::info!("TSI SDK open, opening camera: {}", serial);
                    conn.open(&serial)?;
                    tracing::info!("Camera opened successfully");
                }
                #[cfg(not(feature = "thorcam_hardware"))]
                {
                    tracing::warn!("thorcam_hardware feature NOT enabled - using mock mode");
                    conn.open(&serial)?;
                }
                Ok(Arc::new(Mutex::new(conn)))
            }
        })
        .await??;

        Self::create(serial, connection).await
    }

    async fn create(serial: String, connection: Arc<Mutex<ThorcamConnection>>) -> Result<Self> {
        // Query camera info and image geometry once at startup
        let (info, image_size) = {
            let conn = connection.lock().await;
            let info = ThorcamFeatures::get_camera_info(&conn)?;
            let image_size = ThorcamFeatures::get_image_size(&conn)?;
            (info, image_size)
        };
        let (image_width, image_height) = image_size;

        // Acquisition Group
        let exposure_time_us = Parameter::new("acquisition.exposure_time_us", 10_000.0)
            .with_description("Exposure time")
            .with_unit("us");

        let operation_mode = Parameter::new(
            "acquisition.operation_mode",
            OperationMode::SoftwareTriggered.as_str().to_string(),
        )
        .with_description("Trigger mode")
        .with_choices_introspectable(OperationMode::all_choices());

        let frames_per_trigger = Parameter::new("acquisition.frames_per_trigger", 1i64)
            .with_description("Frames per trigger (0 = unlimited)")
            .with_validator(|v: &i64| {
                if *v < 0 {
                    Err(anyhow::anyhow!(
                        "Frames per trigger must be non-negative, got {}",
                        v
                    ))
                } else {
                    Ok(())
                }
            });

        let armed =
            Parameter::new("acquisition.armed", false).with_description("Camera armed for trigger");

        // Image Group
        let gain = Parameter::new("image.gain", 0i64)
            .with_description("Sensor gain")
            .with_range_introspectable(*GAIN_RANGE.start(), *GAIN_RANGE.end());

        let black_level = Parameter::new("image.black_level", 0i64)
            .with_description("Black level offset")
            .with_range_introspectable(*BLACK_LEVEL_RANGE.start(), *BLACK_LEVEL_RANGE.end());

        let width = Parameter::new("image.width", image_width as i64)
            .with_description("Image width")
            .with_unit("px")
            .read_only();

        let height = Parameter::new("image.height", image_height as i64)
            .with_description("Image height")
            .with_unit("px")
            .read_only();

        // Metadata Info Group
        let model = Parameter::new("info.model", info.model)
            .with_description("Camera Model")
            .read_only();

        let serial_number = Parameter::new("info.serial_number", info.serial_number)
            .with_description("Camera Serial Number")
            .read_only();

        let firmware_version = Parameter::new("info.firmware_version", info.firmware_version)
            .with_description("Camera Firmware Version")
            .read_only();

        let acquisition = Arc::new(ThorcamAcquisition::new(armed.clone()));

        let mut driver = Self {
            serial,
            acquisition,
            connection,
            exposure_time_us,
            operation_mode,
            frames_per_trigger,
            armed,
            gain,
            black_level,
            width,
            height,
            model,
            serial_number,
            firmware_version,
            params: ParameterSet::new(),
            image_width,
            image_height,
            bit_depth: info.bit_depth,
        };

        driver.connect_params();

        // Register AFTER hardware wiring: clones share the writer, so
        // parameters fetched from the set drive the camera too.
        driver.params.register(driver.exposure_time_us.clone());
        driver.params.register(driver.operation_mode.clone());
        driver.params.register(driver.frames_per_trigger.clone());
        driver.params.register(driver.armed.clone());
        driver.params.register(driver.gain.clone());
        driver.params.register(driver.black_level.clone());
        driver.params.register(driver.width.clone());
        driver.params.register(driver.height.clone());
        driver.params.register(driver.model.clone());
        driver.params.register(driver.serial_number.clone());
        driver.params.register(driver.firmware_version.clone());

        Ok(driver)
    }

    fn connect_params(&mut self) {
        let conn = self.connection.clone();

        // Exposure Time
        self.exposure_time_us.connect_to_hardware_write({
            let conn = conn.clone();
            move |val| {
                let conn = conn.clone();
                Box::pin(async move {
                    let conn_guard = conn.lock().await;
                    ThorcamFeatures::set_exposure_time_us(&conn_guard, val)
                        .map_err(|e| DaqError::Instrument(e.to_string()))
                })
            }
        });

        // Gain
        self.gain.connect_to_hardware_write({
            let conn = conn.clone();
            move |val| {
                let conn = conn.clone();
                Box::pin(async move {
                    let conn_guard = conn.lock().await;
                    ThorcamFeatures::set_gain(&conn_guard, val)
                        .map_err(|e| DaqError::Instrument(e.to_string()))
                })
            }
        });

        // Black Level
        self.black_level.connect_to_hardware_write({
            let conn = conn.clone();
            move |val| {
                let conn = conn.clone();
                Box::pin(async move {
                    let conn_guard = conn.lock().await;
                    ThorcamFeatures::set_black_level(&conn_guard, val)
                        .map_err(|e| DaqError::Instrument(e.to_string()))
                })
            }
        });

        // Operation Mode
        self.operation_mode.connect_to_hardware_write({
            let conn = conn.clone();
            move |val| {
                let conn = conn.clone();
                Box::pin(async move {
                    let conn_guard = conn.lock().await;
                    let mode = OperationMode::from_str(&val);
                    ThorcamFeatures::set_operation_mode(&conn_guard, mode)
                        .map_err(|e| DaqError::Instrument(e.to_string()))
                })
            }
        });

        // Frames Per Trigger
        self.frames_per_trigger.connect_to_hardware_write({
            let conn = conn.clone();
            move |val| {
                let conn = conn.clone();
                Box::pin(async move {
                    let conn_guard = conn.lock().await;
                    ThorcamFeatures::set_frames_per_trigger(&conn_guard, val)
                        .map_err(|e| DaqError::Instrument(e.to_string()))
                })
            }
        });
    }

    /// Serial number this driver was opened with.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Current image size in pixels.
    pub fn resolution(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    /// ADC bit depth reported by the camera.
    pub fn bit_depth(&self) -> u32 {
        self.bit_depth
    }

    /// The operation mode currently configured on the parameter.
    fn configured_mode(&self) -> OperationMode {
        OperationMode::from_str(&self.operation_mode.get())
    }

    /// Gracefully shutdown the driver, disarming the camera if needed.
    ///
    /// This method should be called before dropping the driver when running
    /// in an async context. The Drop implementation cannot perform async
    /// operations, so this explicit shutdown method is preferred.
    pub async fn shutdown(&self) -> Result<()> {
        if self.armed.get() {
            tracing::debug!("ThorcamDriver::shutdown - disarming camera");
            let conn = self.connection.lock().await;
            self.acquisition.disarm(&conn).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ExposureControl for ThorcamDriver {
    async fn set_exposure(&self, seconds: f64) -> Result<()> {
        self.exposure_time_us.set(seconds * 1e6).await
    }
    async fn get_exposure(&self) -> Result<f64> {
        Ok(self.exposure_time_us.get() / 1e6)
    }
}

#[async_trait]
impl Triggerable for ThorcamDriver {
    async fn arm(&self) -> Result<()> {
        let conn = self.connection.lock().await;
        ThorcamFeatures::set_operation_mode(&conn, self.configured_mode())?;
        ThorcamFeatures::set_frames_per_trigger(&conn, self.frames_per_trigger.get())?;
        self.acquisition.arm(&conn).await
    }

    async fn trigger(&self) -> Result<()> {
        let conn = self.connection.lock().await;
        self.acquisition.issue_software_trigger(&conn)
    }

    async fn disarm(&self) -> Result<()> {
        let conn = self.connection.lock().await;
        self.acquisition.disarm(&conn).await
    }

    async fn is_armed(&self) -> Result<bool> {
        Ok(self.armed.get())
    }
}

#[async_trait]
impl FrameCapture for ThorcamDriver {
    async fn snap(&self) -> Result<Frame> {
        let conn = self.connection.lock().await;
        self.acquisition
            .snap(&conn, self.image_width, self.image_height)
            .await
    }

    async fn grab_multiple(&self, count: usize) -> Result<Vec<Frame>> {
        let conn = self.connection.lock().await;
        self.acquisition
            .grab_multiple(
                &conn,
                count,
                self.configured_mode(),
                self.frames_per_trigger.get(),
                self.image_width,
                self.image_height,
            )
            .await
    }

    async fn abort_acquisition(&self) -> Result<()> {
        // Deliberately does not take the connection lock: the running grab
        // holds it, and the abort flag is all we need to touch.
        self.acquisition.request_abort();
        Ok(())
    }

    async fn stop_acquisition(&self) -> Result<()> {
        let conn = self.connection.lock().await;
        self.acquisition.disarm(&conn).await
    }

    fn resolution(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    fn frame_count(&self) -> u64 {
        self.acquisition.frame_count.load(Ordering::SeqCst)
    }

    async fn subscribe_frames(
        &self,
    ) -> Option<tokio::sync::broadcast::Receiver<Arc<Frame>>> {
        Some(self.acquisition.frame_tx.subscribe())
    }
}

impl Parameterized for ThorcamDriver {
    fn parameters(&self) -> &ParameterSet {
        &self.params
    }
}

#[async_trait]
impl Commandable for ThorcamDriver {
    async fn execute_command(
        &self,
        command: &str,
        _args: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        match command {
            "snap" => {
                let frame = FrameCapture::snap(self).await?;
                Ok(serde_json::json!({
                    "width": frame.width,
                    "height": frame.height,
                    "mean": frame.mean(),
                }))
            }
            "abort_acquisition" => {
                self.acquisition.request_abort();
                Ok(serde_json::json!({ "success": true }))
            }
            "list_cameras" => {
                let serials = ThorcamConnection::list_available_cameras()?;
                Ok(serde_json::json!({ "serials": serials }))
            }
            _ => anyhow::bail!("Unknown command: {}", command),
        }
    }
}

/// Drop impl warns if the camera was left armed.
///
/// Does NOT call `block_on()` to avoid panicking when dropped inside an
/// async context. For clean shutdown, call `driver.shutdown().await` before
/// dropping.
impl Drop for ThorcamDriver {
    fn drop(&mut self) {
        if self.armed.get() {
            tracing::warn!(
                "ThorcamDriver dropped while armed. \
                 Call driver.shutdown().await before dropping for clean shutdown."
            );
        }
    }
}
