//! `daq-core`
//!
//! Core trait definitions and types for instrument abstraction.
//!
//! This crate provides the fundamental building blocks shared by driver
//! crates and composition roots:
//!
//! - [`capabilities`]: fine-grained async traits devices implement
//!   ([`Triggerable`], [`ExposureControl`], [`FrameCapture`], ...)
//! - [`observable`] / [`parameter`]: reactive, validated parameters with
//!   optional hardware synchronization
//! - [`data`]: the [`Frame`] image container
//! - [`driver`]: the [`DriverFactory`] plugin API binding a driver type name
//!   to the capability objects that control a device
//! - [`error`]: the [`DaqError`] error type
//!
//! Driver crates depend only on this crate. Composition roots register
//! factories and talk to devices exclusively through the capability traits,
//! so drivers stay swappable.

pub mod capabilities;
pub mod data;
pub mod driver;
pub mod error;
pub mod observable;
pub mod parameter;

pub use capabilities::{
    Camera, Commandable, DeviceCategory, ExposureControl, FrameCapture, Parameterized, Triggerable,
};
pub use data::Frame;
pub use driver::{Capability, DeviceComponents, DeviceMetadata, DriverFactory};
pub use error::{AppResult, DaqError, DriverError, DriverErrorKind};
pub use observable::{Observable, ObservableMetadata, ParameterAny, ParameterBase, ParameterSet};
pub use parameter::Parameter;
