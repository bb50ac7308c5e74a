//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, shared by driver
//! crates and composition roots. Using the `thiserror` crate, it provides a
//! centralized and consistent way to handle the different kinds of errors that
//! can occur, from configuration issues to hardware faults.
//!
//! Driver-internal failures are usually wrapped into `DaqError::Instrument`
//! (free-form message) or `DaqError::Driver` (categorized via
//! [`DriverErrorKind`]). Parameter plumbing has its own dedicated variants so
//! callers can distinguish validation failures from hardware failures.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Initialization,
    Configuration,
    Communication,
    Shutdown,
    Hardware,
    Timeout,
    Permission,
    InvalidParameter,
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Shutdown => "shutdown",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::Permission => "permission",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    pub driver_type: String,
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the DAQ application.
///
/// # Error Categories
///
/// Errors fall into three broad categories:
///
/// 1. **Configuration errors** - `Configuration`, `FeatureNotEnabled`
///    - Occur during startup or configuration reload
///    - Permanent errors requiring config changes or a rebuild
///
/// 2. **Hardware/communication errors** - `Instrument`, `Driver`,
///    `CameraNotFound`
///    - Occur during instrument communication
///    - May be transient (SDK busy) or permanent (device unplugged)
///
/// 3. **Parameter errors** - `ParameterReadOnly`, `ParameterInvalidChoice`,
///    `ParameterNoHardwareReader`
///    - Indicate validation failures or incomplete wiring; the hardware is
///      never touched when one of these is returned
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration validation failed.
    ///
    /// Occurs when configuration values parse correctly but fail semantic
    /// validation (e.g., a missing `serial` field or an out-of-range value).
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Instrument hardware error.
    ///
    /// General category for errors originating from an SDK call: command
    /// failures, invalid responses, hardware faults.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// Structured driver error with category
    #[error("{0}")]
    Driver(DriverError),

    /// No camera with the requested serial number was found.
    ///
    /// Returned at construction time when discovery does not list the
    /// requested device. Check cabling and that no other process holds the
    /// camera open.
    #[error("Camera '{0}' not found")]
    CameraNotFound(String),

    /// Module does not support the requested operation.
    #[error("Module does not support operation: {0}")]
    ModuleOperationNotSupported(String),

    /// Required feature not enabled at compile time.
    ///
    /// Occurs when attempting to use functionality (hardware driver, SDK
    /// binding) that wasn't included in the build due to missing feature
    /// flags. The message names the feature to enable.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    /// Attempted to modify a read-only parameter.
    ///
    /// Examples include hardware-determined values like the sensor width or
    /// the device firmware version.
    #[error("Parameter is read-only")]
    ParameterReadOnly,

    /// Invalid choice for enumerated parameter.
    ///
    /// Occurs when setting a parameter to a value not in its allowed choices
    /// (e.g., an unknown trigger mode name).
    #[error("Invalid choice for parameter")]
    ParameterInvalidChoice,

    /// No hardware reader connected for parameter.
    ///
    /// Occurs when attempting to read a hardware-backed parameter but no
    /// hardware interface has been registered. This indicates incomplete
    /// driver initialization.
    #[error("No hardware reader connected")]
    ParameterNoHardwareReader,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaqError::Instrument("camera timeout".to_string());
        assert_eq!(err.to_string(), "Instrument error: camera timeout");
    }

    #[test]
    fn test_feature_not_enabled_names_feature() {
        let err = DaqError::FeatureNotEnabled("thorcam_hardware".to_string());
        assert_eq!(
            err.to_string(),
            "Feature 'thorcam_hardware' is not enabled. Please build with --features thorcam_hardware"
        );
    }

    #[test]
    fn test_driver_error_display() {
        let err = DaqError::Driver(DriverError::new(
            "thorcam",
            DriverErrorKind::Initialization,
            "failed to open SDK",
        ));
        assert!(err
            .to_string()
            .contains("Driver 'thorcam' initialization error"));
    }

    #[test]
    fn test_camera_not_found_display() {
        let err = DaqError::CameraNotFound("08153".to_string());
        assert_eq!(err.to_string(), "Camera '08153' not found");
    }
}
