//! Driver factory for registry integration.
//!
//! Registered at the composition root:
//!
//! ```rust,ignore
//! registry.register_factory(Box::new(ThorcamFactory));
//! ```
//!
//! Config section:
//!
//! ```toml
//! [devices.camera.driver]
//! type = "thorcam"
//! serial = "12345"
//! ```

use anyhow::Result;
use daq_core::capabilities::DeviceCategory;
use daq_core::driver::{Capability, DeviceComponents, DeviceMetadata, DriverFactory};
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::ThorcamDriver;

/// Factory for Thorlabs scientific cameras.
pub struct ThorcamFactory;

fn serial_from_config(config: &toml::Value) -> Result<String> {
    config
        .get("serial")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("thorcam config requires a 'serial' string field"))
}

impl DriverFactory for ThorcamFactory {
    fn driver_type(&self) -> &'static str {
        "thorcam"
    }

    fn name(&self) -> &'static str {
        "Thorlabs Scientific Camera"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[
            Capability::Triggerable,
            Capability::FrameCapture,
            Capability::ExposureControl,
            Capability::Commandable,
            Capability::Parameterized,
        ]
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        serial_from_config(config)?;
        Ok(())
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        Box::pin(async move {
            let serial = serial_from_config(&config)?;
            let driver = Arc::new(ThorcamDriver::new_async(serial).await?);

            let (frame_width, frame_height) = driver.resolution();
            let metadata = DeviceMetadata {
                category: Some(DeviceCategory::Camera),
                frame_width: Some(frame_width),
                frame_height: Some(frame_height),
                bits_per_pixel: Some(driver.bit_depth()),
            };

            Ok(DeviceComponents::new()
                .with_category(DeviceCategory::Camera)
                .with_triggerable(driver.clone())
                .with_frame_capture(driver.clone())
                .with_exposure_control(driver.clone())
                .with_commandable(driver.clone())
                .with_parameterized(driver)
                .with_metadata(metadata))
        })
    }
}
