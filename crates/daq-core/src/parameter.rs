//! Parameter<T> - Declarative parameter management (ScopeFoundry pattern)
//!
//! Inspired by ScopeFoundry's LoggedQuantity, this module provides a unified
//! abstraction for instrument parameters that automatically synchronizes:
//! - Observers (via watch channels)
//! - Hardware devices (via callbacks)
//! - Side effects like logging (via change listeners)
//!
//! # Architecture
//!
//! Parameter<T> **composes** Observable<T> to avoid code duplication:
//! - Observable<T> handles: watch channels, subscriptions, validation, metadata
//! - Parameter<T> adds: hardware write/read callbacks, change listeners
//!
//! # Basic Example
//!
//! ```rust,ignore
//! use daq_core::parameter::Parameter;
//!
//! // Create parameter with introspectable constraints
//! let mut gain = Parameter::new("image.gain", 0i64)
//!     .with_range_introspectable(0, 48);
//!
//! // Connect to async hardware
//! gain.connect_to_hardware_write(|val| {
//!     Box::pin(async move {
//!         camera.set_gain(val).await
//!     })
//! });
//!
//! // Set value (validates, writes to hardware, notifies subscribers)
//! gain.set(12).await?;
//! ```
//!
//! # Data Flow
//!
//! `set(value)` performs, in order:
//!
//! 1. Validate against constraints (range, choices, read-only). Fails here
//!    if invalid, BEFORE the hardware is touched.
//! 2. Write to hardware (if a hardware writer is connected). Fails here on
//!    hardware error, leaving the stored value unchanged.
//! 3. Update the internal value, notifying all watch channel subscribers.
//! 4. Call change listeners (for logging, dependent parameters).

use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use crate::error::DaqError;
use crate::observable::{Observable, ObservableMetadata, ParameterAny, ParameterBase};

// =============================================================================
// Parameter<T> - Hardware-connected Observable
// =============================================================================

/// Typed parameter with automatic hardware synchronization
///
/// Composes `Observable<T>` with hardware callbacks. When you call `set()`:
/// 1. Validates against constraints (via Observable)
/// 2. Writes to hardware (via hardware_writer callback)
/// 3. Updates internal value and notifies subscribers (via Observable)
/// 4. Calls change listeners (for logging, dependent parameters, etc.)
///
/// # Type Requirements
///
/// T must implement:
/// - Clone: For distributing values to subscribers
/// - Send + Sync: For thread-safe access
/// - PartialEq: For choice validation
/// - Debug: For logging and error messages
/// - 'static: Required for tokio::sync::watch
#[derive(Clone)]
pub struct Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    /// Base reactive primitive (handles watch channels, validation, metadata)
    inner: Observable<T>,

    /// Hardware write function (optional)
    ///
    /// When set, calling `set()` will write to hardware before updating
    /// the internal value. Function should return error if write fails.
    hardware_writer:
        Option<Arc<dyn Fn(T) -> BoxFuture<'static, Result<(), DaqError>> + Send + Sync>>,

    /// Hardware read function (optional)
    ///
    /// When set, calling `read_from_hardware()` will fetch the current
    /// hardware value and update the internal value.
    hardware_reader: Option<Arc<dyn Fn() -> BoxFuture<'static, Result<T, DaqError>> + Send + Sync>>,

    /// Change listeners (called after value changes)
    ///
    /// Useful for side effects like updating dependent parameters or
    /// logging changes. These are called AFTER Observable has notified all
    /// subscribers.
    change_listeners: Arc<RwLock<Vec<Arc<dyn Fn(&T) + Send + Sync>>>>,
}

impl<T> Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    /// Create new parameter with initial value
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        let inner = Observable::new(name, initial);

        Self {
            inner,
            hardware_writer: None,
            hardware_reader: None,
            change_listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Set parameter description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.inner = self.inner.with_description(description);
        self
    }

    /// Set parameter unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.inner = self.inner.with_units(unit);
        self
    }

    /// Set numeric range constraints
    pub fn with_range(mut self, min: T, max: T) -> Self
    where
        T: PartialOrd,
    {
        self.inner = self.inner.with_range(min, max);
        self
    }

    /// Set discrete choice constraints
    pub fn with_choices(mut self, choices: Vec<T>) -> Self
    where
        T: PartialEq,
    {
        let choices_clone = choices.clone();
        self.inner = self.inner.with_validator(move |value| {
            if choices_clone.iter().any(|c| c == value) {
                Ok(())
            } else {
                Err(DaqError::ParameterInvalidChoice.into())
            }
        });
        self
    }

    /// Set custom validation function
    pub fn with_validator(
        mut self,
        validator: impl Fn(&T) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.inner = self.inner.with_validator(validator);
        self
    }

    /// Make parameter read-only
    pub fn read_only(mut self) -> Self {
        self.inner = self.inner.read_only();
        self
    }

    /// Connect hardware write function
    ///
    /// After calling this, `set()` will write to hardware before updating
    /// the internal value. If hardware write fails, value is not updated.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// exposure.connect_to_hardware_write(|val| {
    ///     camera.set_exposure(val)
    /// });
    /// ```
    pub fn connect_to_hardware_write(
        &mut self,
        writer: impl Fn(T) -> BoxFuture<'static, Result<(), DaqError>> + Send + Sync + 'static,
    ) {
        self.hardware_writer = Some(Arc::new(writer));
    }

    /// Connect hardware read function
    ///
    /// After calling this, `read_from_hardware()` will fetch the current
    /// hardware value and update the parameter.
    pub fn connect_to_hardware_read(
        &mut self,
        reader: impl Fn() -> BoxFuture<'static, Result<T, DaqError>> + Send + Sync + 'static,
    ) {
        self.hardware_reader = Some(Arc::new(reader));
    }

    /// Connect both hardware read and write functions
    pub fn connect_to_hardware(
        &mut self,
        writer: impl Fn(T) -> BoxFuture<'static, Result<(), DaqError>> + Send + Sync + 'static,
        reader: impl Fn() -> BoxFuture<'static, Result<T, DaqError>> + Send + Sync + 'static,
    ) {
        self.connect_to_hardware_write(writer);
        self.connect_to_hardware_read(reader);
    }

    /// Add change listener (called after value changes)
    ///
    /// Useful for side effects like updating dependent parameters or
    /// logging changes.
    pub async fn add_change_listener(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        let mut listeners = self.change_listeners.write().await;
        listeners.push(Arc::new(listener));
    }

    /// Get current value (delegates to Observable)
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Set value (validates, writes to hardware if connected, notifies subscribers)
    ///
    /// This is the main method for changing parameter values. It:
    /// 1. Validates against constraints (via Observable) - BEFORE hardware write
    /// 2. Writes to hardware (if connected)
    /// 3. Updates internal value and notifies subscribers (via Observable)
    /// 4. Calls change listeners
    ///
    /// Returns error if validation fails or hardware write fails. An
    /// out-of-range value never reaches the device.
    pub async fn set(&self, value: T) -> Result<()> {
        // Validate BEFORE hardware write so an invalid value never reaches
        // the device.
        self.inner.validate(&value)?;

        if let Some(writer) = &self.hardware_writer {
            writer(value.clone()).await?;
        }

        // Already validated above, so skip re-validation on the inner set.
        self.inner.set_unchecked(value.clone());

        let listeners = self.change_listeners.read().await;
        for listener in listeners.iter() {
            listener(&value);
        }

        Ok(())
    }

    /// Read current value from hardware and update parameter
    ///
    /// Only works if hardware reader is connected. Does NOT validate
    /// (the hardware is the source of truth).
    pub async fn read_from_hardware(&self) -> Result<()> {
        let reader = self
            .hardware_reader
            .as_ref()
            .ok_or(DaqError::ParameterNoHardwareReader)?;

        let value = reader().await?;

        self.inner.set_unchecked(value.clone());

        let listeners = self.change_listeners.read().await;
        for listener in listeners.iter() {
            listener(&value);
        }

        Ok(())
    }

    /// Subscribe to value changes (delegates to Observable)
    ///
    /// Returns a watch receiver that notifies whenever the value changes.
    /// Multiple subscribers can observe independently.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.inner.subscribe()
    }

    /// Get parameter name (delegates to Observable)
    pub fn name(&self) -> String {
        self.inner.name()
    }

    /// Get parameter description (delegates to Observable)
    pub fn description(&self) -> Option<String> {
        self.inner.metadata().description
    }

    /// Get parameter unit of measurement (delegates to Observable)
    pub fn unit(&self) -> Option<String> {
        self.inner.metadata().units
    }

    /// Check if parameter is read-only (delegates to Observable)
    pub fn is_read_only(&self) -> bool {
        self.inner.metadata().read_only
    }

    /// Get direct access to inner Observable (for advanced use)
    pub fn inner(&self) -> &Observable<T> {
        &self.inner
    }
}

// =============================================================================
// ParameterBase / ParameterAny Implementations (for dynamic collections)
// =============================================================================

impl<T> ParameterBase for Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + Serialize + for<'de> Deserialize<'de> + 'static,
{
    fn name(&self) -> String {
        self.inner.name()
    }

    fn get_json(&self) -> Result<serde_json::Value> {
        self.inner.get_json()
    }

    fn set_json(&self, value: serde_json::Value) -> Result<()> {
        let typed_value: T = serde_json::from_value(value)?;
        // JSON access is a synchronous surface. The hardware writer, if any,
        // runs to completion here.
        futures::executor::block_on(self.set(typed_value))
    }

    fn metadata(&self) -> ObservableMetadata {
        self.inner.metadata()
    }

    fn has_subscribers(&self) -> bool {
        self.inner.has_subscribers()
    }

    fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }
}

impl<T> ParameterAny for Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + Serialize + for<'de> Deserialize<'de> + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn value_as_f64(&self) -> Option<f64> {
        self.as_any()
            .downcast_ref::<Parameter<f64>>()
            .map(|p| p.get())
    }

    fn value_as_bool(&self) -> Option<bool> {
        self.as_any()
            .downcast_ref::<Parameter<bool>>()
            .map(|p| p.get())
    }

    fn value_as_string(&self) -> Option<String> {
        self.as_any()
            .downcast_ref::<Parameter<String>>()
            .map(|p| p.get())
    }

    fn value_as_i64(&self) -> Option<i64> {
        self.as_any()
            .downcast_ref::<Parameter<i64>>()
            .map(|p| p.get())
    }
}

// =============================================================================
// Type-specific Parameter Extensions (Introspectable Constraints)
// =============================================================================
//
// These methods delegate to Observable<T> for actual implementation.
// See observable.rs for detailed documentation on constraint behavior.

impl Parameter<f64> {
    /// Set numeric range constraints with introspectable metadata.
    ///
    /// Delegates to [`Observable<f64>::with_range_introspectable()`] which:
    /// - Sets `metadata.min_value` and `metadata.max_value`
    /// - Sets `metadata.dtype = "float"`
    /// - Adds a validator that rejects values outside `[min, max]`
    /// - Rejects NaN and Infinity values
    ///
    /// # Panics
    ///
    /// Panics if `min` or `max` is non-finite, or if `min > max`.
    pub fn with_range_introspectable(mut self, min: f64, max: f64) -> Self {
        self.inner = self.inner.with_range_introspectable(min, max);
        self
    }
}

impl Parameter<i64> {
    /// Set numeric range constraints with introspectable metadata.
    ///
    /// Delegates to [`Observable<i64>::with_range_introspectable()`] which:
    /// - Sets `metadata.min_value` and `metadata.max_value`
    /// - Sets `metadata.dtype = "int"`
    /// - Adds a validator that rejects values outside `[min, max]`
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    pub fn with_range_introspectable(mut self, min: i64, max: i64) -> Self {
        self.inner = self.inner.with_range_introspectable(min, max);
        self
    }
}

impl Parameter<String> {
    /// Set choice constraints with introspectable metadata.
    ///
    /// Delegates to [`Observable<String>::with_choices_introspectable()`]
    /// which:
    /// - Sets `metadata.enum_values` with the allowed choices
    /// - Sets `metadata.dtype = "enum"`
    /// - Adds a validator that rejects values not in the choices list
    pub fn with_choices_introspectable(mut self, choices: Vec<String>) -> Self {
        self.inner = self.inner.with_choices_introspectable(choices);
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parameter_basic() {
        let param = Parameter::new("test", 42.0);
        assert_eq!(param.get(), 42.0);

        param.set(100.0).await.unwrap();
        assert_eq!(param.get(), 100.0);
    }

    #[tokio::test]
    async fn test_parameter_range_validation() {
        let param = Parameter::new("test", 50.0).with_range(0.0, 100.0);

        assert!(param.set(50.0).await.is_ok());
        assert!(param.set(150.0).await.is_err()); // Out of range
        assert!(param.set(-10.0).await.is_err()); // Out of range
    }

    #[tokio::test]
    async fn test_parameter_choices() {
        let param = Parameter::new("operation_mode", "software".to_string())
            .with_choices(vec!["software".to_string(), "hardware".to_string()]);

        assert!(param.set("hardware".to_string()).await.is_ok());
        assert!(param.set("invalid".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_parameter_read_only() {
        let param = Parameter::new("readonly", 42.0).read_only();

        assert!(param.set(100.0).await.is_err());
        assert_eq!(param.get(), 42.0); // Unchanged
    }

    #[tokio::test]
    async fn test_parameter_hardware_write() {
        use std::sync::atomic::{AtomicU64, Ordering};

        let hardware_value = Arc::new(AtomicU64::new(0));
        let hw_val_clone = hardware_value.clone();

        let mut param = Parameter::new("exposure", 100.0);
        param.connect_to_hardware_write(move |val| {
            let hw = hw_val_clone.clone();
            Box::pin(async move {
                hw.store(val as u64, Ordering::SeqCst);
                Ok(())
            })
        });

        param.set(250.0).await.unwrap();
        assert_eq!(hardware_value.load(Ordering::SeqCst), 250);
    }

    #[tokio::test]
    async fn test_parameter_hardware_read() {
        let mut param = Parameter::new("gain", 0i64);
        param.connect_to_hardware_read(|| Box::pin(async { Ok(24) }));

        param.read_from_hardware().await.unwrap();
        assert_eq!(param.get(), 24);
    }

    #[tokio::test]
    async fn test_parameter_read_without_reader_fails() {
        let param = Parameter::new("gain", 0i64);
        let err = param.read_from_hardware().await.unwrap_err();
        assert!(err.to_string().contains("No hardware reader"));
    }

    #[tokio::test]
    async fn test_parameter_subscription() {
        let param = Parameter::new("test", 0.0);
        let mut rx = param.subscribe();

        // Initial value
        assert_eq!(*rx.borrow(), 0.0);

        // Change value
        param.set(42.0).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 42.0);
    }

    #[tokio::test]
    async fn test_parameter_change_listener() {
        use std::sync::atomic::{AtomicU64, Ordering};

        let listener_called = Arc::new(AtomicU64::new(0));
        let lc_clone = listener_called.clone();

        let param = Parameter::new("test", 0.0);
        param
            .add_change_listener(move |_val| {
                lc_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        param.set(10.0).await.unwrap();
        param.set(20.0).await.unwrap();

        assert_eq!(listener_called.load(Ordering::SeqCst), 2);
    }

    /// Critical safety test: Validation MUST happen BEFORE hardware write.
    /// This prevents driving hardware to an invalid state if validation fails.
    #[tokio::test]
    async fn test_parameter_validates_before_hardware_write() {
        use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

        let hardware_write_called = Arc::new(AtomicBool::new(false));
        let hardware_value = Arc::new(AtomicU64::new(0));
        let hw_called_clone = hardware_write_called.clone();
        let hw_val_clone = hardware_value.clone();

        // Create parameter with range validation (0 to 48)
        let mut param = Parameter::new("gain", 0i64).with_range_introspectable(0, 48);

        // Connect hardware writer that tracks if it was called
        param.connect_to_hardware_write(move |val| {
            let hw_called = hw_called_clone.clone();
            let hw_val = hw_val_clone.clone();
            Box::pin(async move {
                hw_called.store(true, Ordering::SeqCst);
                hw_val.store(val as u64, Ordering::SeqCst);
                Ok(())
            })
        });

        // Try to set an INVALID value (49 is outside range 0-48)
        let result = param.set(49).await;

        // Validation should fail
        assert!(result.is_err(), "Setting out-of-range value should fail");

        // CRITICAL: Hardware write should NOT have been called
        assert!(
            !hardware_write_called.load(Ordering::SeqCst),
            "Hardware write should NOT be called when validation fails"
        );

        // Value should remain unchanged
        assert_eq!(param.get(), 0, "Parameter value should not change on failed set");

        // Now try a VALID value
        let result = param.set(24).await;

        // Should succeed
        assert!(result.is_ok(), "Setting valid value should succeed");

        // Hardware should have been written
        assert!(
            hardware_write_called.load(Ordering::SeqCst),
            "Hardware write should be called for valid values"
        );
        assert_eq!(hardware_value.load(Ordering::SeqCst), 24);
        assert_eq!(param.get(), 24);
    }

    /// Test that read-only parameters don't trigger hardware writes
    #[tokio::test]
    async fn test_parameter_readonly_no_hardware_write() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let hardware_write_called = Arc::new(AtomicBool::new(false));
        let hw_called_clone = hardware_write_called.clone();

        let mut param = Parameter::new("readonly_param", 42.0).read_only();

        param.connect_to_hardware_write(move |_val| {
            let hw_called = hw_called_clone.clone();
            Box::pin(async move {
                hw_called.store(true, Ordering::SeqCst);
                Ok(())
            })
        });

        // Try to set value on read-only parameter
        let result = param.set(100.0).await;

        // Should fail
        assert!(result.is_err());

        // Hardware should NOT have been written
        assert!(
            !hardware_write_called.load(Ordering::SeqCst),
            "Hardware write should NOT be called for read-only parameter"
        );
    }

    /// Hardware write failure leaves the stored value unchanged.
    #[tokio::test]
    async fn test_parameter_hardware_failure_preserves_value() {
        let mut param = Parameter::new("exposure", 100.0);
        param.connect_to_hardware_write(|_val| {
            Box::pin(async { Err(DaqError::Instrument("device busy".into())) })
        });

        assert!(param.set(250.0).await.is_err());
        assert_eq!(param.get(), 100.0);
    }
}
