//! Raw FFI bindings for the Thorlabs TSI camera C SDK.
//!
//! Bindings are generated at build time by bindgen when the `tlcamera-sdk`
//! feature is enabled. Without the feature this crate is empty, which lets
//! dependent crates compile on machines without the SDK installed.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(unsafe_code)]
#![allow(clippy::missing_safety_doc)]

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
