//! Driver Factory and Component Types
//!
//! This module provides the plugin API for dynamically registered drivers.
//! Drivers implement [`DriverFactory`] and are registered with a device
//! registry at startup via explicit `registry.register_factory(factory)`
//! calls. This is the binding point between a driver type name and the
//! capability objects that control the device.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Composition Root (main.rs)                     │
//! │  registry.register_factory(ThorcamFactory::new());             │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        DeviceRegistry                           │
//! │  factories: HashMap<driver_type, Box<dyn DriverFactory>>       │
//! │  devices: HashMap<device_id, DeviceComponents>                 │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    DriverFactory::build()                       │
//! │  Parses TOML config, instantiates driver, returns capabilities │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example: Implementing a Driver Factory
//!
//! ```rust,ignore
//! use daq_core::driver::{DriverFactory, DeviceComponents, Capability};
//! use futures::future::BoxFuture;
//! use std::sync::Arc;
//!
//! pub struct ThorcamFactory;
//!
//! impl DriverFactory for ThorcamFactory {
//!     fn driver_type(&self) -> &'static str { "thorcam" }
//!     fn name(&self) -> &'static str { "Thorlabs Scientific Camera" }
//!     fn capabilities(&self) -> &'static [Capability] {
//!         &[Capability::Triggerable, Capability::FrameCapture]
//!     }
//!
//!     fn validate(&self, config: &toml::Value) -> anyhow::Result<()> {
//!         let table = config.as_table().ok_or_else(|| anyhow::anyhow!("expected table"))?;
//!         if !table.contains_key("serial") {
//!             anyhow::bail!("missing 'serial' field");
//!         }
//!         Ok(())
//!     }
//!
//!     fn build(&self, config: toml::Value) -> BoxFuture<'static, anyhow::Result<DeviceComponents>> {
//!         Box::pin(async move {
//!             let serial = config.get("serial").and_then(|v| v.as_str()).unwrap();
//!             let driver = Arc::new(ThorcamDriver::new_async(serial).await?);
//!
//!             Ok(DeviceComponents::new()
//!                 .with_triggerable(driver.clone())
//!                 .with_parameterized(driver))
//!         })
//!     }
//! }
//! ```

use crate::capabilities::{
    Commandable, DeviceCategory, ExposureControl, FrameCapture, Parameterized, Triggerable,
};
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Capability Enum (Runtime Introspection)
// =============================================================================

/// Runtime capability flags for device introspection.
///
/// This enum is used for querying what capabilities a device supports
/// without needing to check each trait individually. It mirrors the
/// capability traits but as an enum for easy matching and listing.
///
/// # Example
///
/// ```rust,ignore
/// use daq_core::driver::Capability;
///
/// let caps = components.capabilities();
/// if caps.contains(&Capability::FrameCapture) {
///     println!("Device produces image frames");
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Can be armed and triggered (cameras, pulse generators)
    /// Corresponds to [`crate::capabilities::Triggerable`]
    Triggerable,

    /// Captures image frames (cameras)
    /// Corresponds to [`crate::capabilities::FrameCapture`]
    FrameCapture,

    /// Has exposure/integration time control
    /// Corresponds to [`crate::capabilities::ExposureControl`]
    ExposureControl,

    /// Can execute structured JSON commands
    /// Corresponds to [`crate::capabilities::Commandable`]
    Commandable,

    /// Has observable parameters with subscriptions
    /// Corresponds to [`crate::capabilities::Parameterized`]
    Parameterized,
}

impl Capability {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Triggerable => "Triggerable",
            Self::FrameCapture => "Frame Capture",
            Self::ExposureControl => "Exposure Control",
            Self::Commandable => "Commandable",
            Self::Parameterized => "Parameterized",
        }
    }
}

// =============================================================================
// Device Components (Capability Bag)
// =============================================================================

/// Container for capability trait objects returned by drivers.
///
/// When a driver is instantiated, it returns a `DeviceComponents` struct
/// containing all the capabilities it implements. The registry then uses
/// these to populate its internal maps for capability-based lookups.
///
/// # Builder Pattern
///
/// Use the builder methods to construct a `DeviceComponents`:
///
/// ```rust,ignore
/// let driver = Arc::new(MyDriver::new_async(serial).await?);
///
/// let components = DeviceComponents::new()
///     .with_triggerable(driver.clone())
///     .with_frame_capture(driver.clone())
///     .with_parameterized(driver);
/// ```
///
/// # Why Not a Single `Arc<dyn Driver>`?
///
/// By storing each capability separately, we:
/// 1. Avoid runtime downcasting (no `Any` bounds)
/// 2. Enable compile-time type safety for capability access
/// 3. Allow drivers to implement only the capabilities they need
/// 4. Support drivers that use different objects for different capabilities
#[derive(Default)]
pub struct DeviceComponents {
    /// Device category for registry grouping
    pub category: Option<DeviceCategory>,

    /// Triggerable implementation (arm/trigger/disarm)
    pub triggerable: Option<Arc<dyn Triggerable>>,

    /// FrameCapture implementation (snap/grab_multiple)
    pub frame_capture: Option<Arc<dyn FrameCapture>>,

    /// ExposureControl implementation (exposure time)
    pub exposure_control: Option<Arc<dyn ExposureControl>>,

    /// Commandable implementation (structured commands)
    pub commandable: Option<Arc<dyn Commandable>>,

    /// Parameterized implementation (parameter registry)
    pub parameterized: Option<Arc<dyn Parameterized>>,

    /// Capability-specific metadata (frame size, bit depth, etc.)
    pub metadata: DeviceMetadata,
}

impl DeviceComponents {
    /// Create a new empty DeviceComponents
    pub fn new() -> Self {
        Self::default()
    }

    /// Get list of capabilities this device supports
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();

        if self.triggerable.is_some() {
            caps.push(Capability::Triggerable);
        }
        if self.frame_capture.is_some() {
            caps.push(Capability::FrameCapture);
        }
        if self.exposure_control.is_some() {
            caps.push(Capability::ExposureControl);
        }
        if self.commandable.is_some() {
            caps.push(Capability::Commandable);
        }
        if self.parameterized.is_some() {
            caps.push(Capability::Parameterized);
        }

        caps
    }

    // Builder methods

    /// Set device category
    pub fn with_category(mut self, category: DeviceCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Set Triggerable implementation
    pub fn with_triggerable(mut self, t: Arc<dyn Triggerable>) -> Self {
        self.triggerable = Some(t);
        self
    }

    /// Set FrameCapture implementation
    pub fn with_frame_capture(mut self, f: Arc<dyn FrameCapture>) -> Self {
        self.frame_capture = Some(f);
        self
    }

    /// Set ExposureControl implementation
    pub fn with_exposure_control(mut self, e: Arc<dyn ExposureControl>) -> Self {
        self.exposure_control = Some(e);
        self
    }

    /// Set Commandable implementation
    pub fn with_commandable(mut self, c: Arc<dyn Commandable>) -> Self {
        self.commandable = Some(c);
        self
    }

    /// Set Parameterized implementation
    pub fn with_parameterized(mut self, p: Arc<dyn Parameterized>) -> Self {
        self.parameterized = Some(p);
        self
    }

    /// Set device metadata
    pub fn with_metadata(mut self, metadata: DeviceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

// =============================================================================
// Device Metadata
// =============================================================================

/// Capability-specific metadata for a device.
///
/// This struct holds additional information about device capabilities
/// that isn't captured in the trait objects themselves.
#[derive(Debug, Clone, Default)]
pub struct DeviceMetadata {
    /// Device category for registry grouping
    pub category: Option<DeviceCategory>,

    /// For FrameCapture devices: frame width in pixels
    pub frame_width: Option<u32>,

    /// For FrameCapture devices: frame height in pixels
    pub frame_height: Option<u32>,

    /// For FrameCapture devices: bits per pixel (e.g., 8, 12, 16)
    pub bits_per_pixel: Option<u32>,
}

// =============================================================================
// Driver Factory Trait
// =============================================================================

/// Trait for driver factories that create device instances.
///
/// Each driver crate implements this trait to register itself with the
/// device registry. The factory is responsible for:
///
/// 1. Declaring what driver type it handles (matching TOML `type` field)
/// 2. Validating configuration before instantiation
/// 3. Asynchronously creating the driver and returning capabilities
///
/// # Lifetime
///
/// Factories are registered once at startup and live for the program's lifetime.
/// They must be `Send + Sync + 'static` because they may be called from any task.
///
/// # Thread Safety
///
/// The `build()` method takes `&self` and returns a `BoxFuture<'static, ...>`.
/// This means:
/// - The factory must not hold mutable state across builds
/// - If shared state is needed (e.g., a shared SDK handle), use internal
///   synchronization
///
/// # Error Handling
///
/// Both `validate()` and `build()` return `Result`. Validation errors should be
/// descriptive and actionable. Build errors may include hardware connection failures.
pub trait DriverFactory: Send + Sync + 'static {
    /// Driver type name used in TOML config `type` field.
    ///
    /// This must match exactly what users write in their config:
    /// ```toml
    /// [devices.driver]
    /// type = "thorcam"  # matches driver_type() returning "thorcam"
    /// ```
    fn driver_type(&self) -> &'static str;

    /// Human-readable name for documentation and error messages.
    ///
    /// Example: "Thorlabs Scientific Camera"
    fn name(&self) -> &'static str;

    /// List of capabilities this driver type provides.
    ///
    /// Used for introspection and documentation. The actual capabilities
    /// are determined by what's returned from `build()`.
    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    /// Validate configuration without instantiating.
    ///
    /// Called before `build()` to provide early error feedback.
    /// Should check that all required fields exist and have valid types.
    ///
    /// # Arguments
    ///
    /// * `config` - TOML value containing driver configuration (the `[devices.driver]` section)
    ///
    /// # Returns
    ///
    /// - `Ok(())` if configuration is valid
    /// - `Err` with descriptive message if validation fails
    fn validate(&self, config: &toml::Value) -> Result<()>;

    /// Async instantiation of the driver.
    ///
    /// This method is called after validation passes. It should:
    /// 1. Parse the configuration
    /// 2. Open connections to hardware (SDK handles, ports, etc.)
    /// 3. Optionally validate device identity (query model/firmware strings)
    /// 4. Return DeviceComponents with all implemented capabilities
    ///
    /// # Arguments
    ///
    /// * `config` - TOML value containing driver configuration
    ///
    /// # Returns
    ///
    /// - `Ok(DeviceComponents)` with populated capability trait objects
    /// - `Err` if driver fails to initialize (camera not found, SDK error, etc.)
    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_name() {
        assert_eq!(Capability::Triggerable.name(), "Triggerable");
        assert_eq!(Capability::FrameCapture.name(), "Frame Capture");
    }

    #[test]
    fn test_device_components_builder() {
        let components = DeviceComponents::new()
            .with_category(DeviceCategory::Camera)
            .with_metadata(DeviceMetadata {
                category: Some(DeviceCategory::Camera),
                frame_width: Some(1920),
                frame_height: Some(1080),
                bits_per_pixel: Some(16),
            });

        assert_eq!(components.category, Some(DeviceCategory::Camera));
        assert_eq!(components.metadata.frame_width, Some(1920));
        assert_eq!(components.metadata.bits_per_pixel, Some(16));
    }

    #[test]
    fn test_device_components_capabilities() {
        // Empty components should have no capabilities
        let empty = DeviceComponents::new();
        assert!(empty.capabilities().is_empty());
    }

    #[test]
    fn test_capability_serde() {
        // Test serialization
        let cap = Capability::Triggerable;
        let json = serde_json::to_string(&cap).unwrap();
        assert_eq!(json, "\"triggerable\"");

        // Test deserialization
        let cap: Capability = serde_json::from_str("\"frame_capture\"").unwrap();
        assert_eq!(cap, Capability::FrameCapture);
    }
}
