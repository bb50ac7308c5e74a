//! Integration tests for ThorcamDriver
//!
//! Tests the high-level driver interface including:
//! - Async driver creation and discovery
//! - Parameter access and range guards
//! - Single-shot acquisition (mock mode)
//! - Triggered bursts and abort (mock mode)
//!
//! ## Running Tests
//!
//! ```bash
//! # Mock mode tests
//! cargo test -p daq-driver-thorcam --test driver_test
//!
//! # Hardware tests
//! cargo test -p daq-driver-thorcam --test driver_test --features "thorcam_hardware,hardware_tests"
//! ```

use daq_core::capabilities::{ExposureControl, FrameCapture, Parameterized, Triggerable};
use daq_driver_thorcam::{OperationMode, ThorcamDriver};
use std::time::Duration;

#[cfg(all(feature = "thorcam_hardware", feature = "hardware_tests"))]
use tracing_subscriber::EnvFilter;

// =============================================================================
// Mock Mode Driver Tests
// =============================================================================

#[cfg(not(feature = "thorcam_hardware"))]
mod mock_driver {
    use super::*;
    use daq_core::driver::{Capability, DriverFactory};
    use daq_core::parameter::Parameter;
    use daq_driver_thorcam::ThorcamFactory;
    use std::sync::Arc;

    #[tokio::test]
    async fn create_driver_mock() {
        let driver = ThorcamDriver::new_async("12345".to_string()).await;
        assert!(driver.is_ok(), "Should create driver in mock mode");
    }

    #[tokio::test]
    async fn unknown_serial_fails() {
        let driver = ThorcamDriver::new_async("99999".to_string()).await;
        let err = driver.err().expect("Unknown serial should fail");
        assert!(
            err.to_string().contains("not found"),
            "Error should name the missing camera: {}",
            err
        );
    }

    #[tokio::test]
    async fn driver_resolution() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();
        let (width, height) = driver.resolution();

        // Mock sensor is 1920x1080
        assert_eq!(width, 1920);
        assert_eq!(height, 1080);
        assert_eq!(driver.bit_depth(), 16);
    }

    #[tokio::test]
    async fn driver_exposure_control() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();

        // Set exposure to 50ms
        driver.set_exposure(0.050).await.unwrap();

        // Read back in seconds
        let exposure = driver.get_exposure().await.unwrap();
        assert!((exposure - 0.050).abs() < 1e-9, "Exposure should be 50ms");

        // The parameter stores microseconds
        let param = driver
            .parameters()
            .get_typed::<Parameter<f64>>("acquisition.exposure_time_us")
            .unwrap();
        assert!((param.get() - 50_000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn driver_arm_trigger() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();

        // Trigger before arm must fail
        assert!(driver.trigger().await.is_err());

        // Initially not armed
        assert!(!driver.is_armed().await.unwrap());

        driver.arm().await.unwrap();
        assert!(driver.is_armed().await.unwrap());

        driver.trigger().await.unwrap();

        driver.disarm().await.unwrap();
        assert!(!driver.is_armed().await.unwrap());
    }

    #[tokio::test]
    async fn driver_parameters() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();
        let params = driver.parameters();

        let names = params.names();
        for expected in [
            "acquisition.exposure_time_us",
            "acquisition.operation_mode",
            "acquisition.frames_per_trigger",
            "acquisition.armed",
            "image.gain",
            "image.black_level",
            "image.width",
            "image.height",
            "info.model",
            "info.serial_number",
            "info.firmware_version",
        ] {
            assert!(names.contains(&expected), "Should have {} parameter", expected);
        }
    }

    #[tokio::test]
    async fn gain_range_guard() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();

        let gain = driver
            .parameters()
            .get_typed::<Parameter<i64>>("image.gain")
            .unwrap();

        gain.set(24).await.unwrap();
        assert_eq!(gain.get(), 24);

        // Out-of-range values fail and leave the value untouched
        assert!(gain.set(49).await.is_err());
        assert!(gain.set(-1).await.is_err());
        assert_eq!(gain.get(), 24);
    }

    #[tokio::test]
    async fn black_level_range_guard() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();

        let black_level = driver
            .parameters()
            .get_typed::<Parameter<i64>>("image.black_level")
            .unwrap();

        black_level.set(511).await.unwrap();
        assert_eq!(black_level.get(), 511);

        assert!(black_level.set(512).await.is_err());
        assert_eq!(black_level.get(), 511);
    }

    #[tokio::test]
    async fn width_and_height_are_read_only() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();

        let width = driver
            .parameters()
            .get_typed::<Parameter<i64>>("image.width")
            .unwrap();
        let height = driver
            .parameters()
            .get_typed::<Parameter<i64>>("image.height")
            .unwrap();

        assert_eq!(width.get(), 1920);
        assert_eq!(height.get(), 1080);
        assert!(width.set(640).await.is_err());
        assert!(height.set(480).await.is_err());
    }

    #[tokio::test]
    async fn operation_mode_choices() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();

        let mode = driver
            .parameters()
            .get_typed::<Parameter<String>>("acquisition.operation_mode")
            .unwrap();

        assert_eq!(mode.get(), "Software Triggered");

        mode.set("Hardware Triggered".to_string()).await.unwrap();
        assert_eq!(mode.get(), "Hardware Triggered");

        assert!(mode.set("Continuous".to_string()).await.is_err());
        assert_eq!(mode.get(), "Hardware Triggered");
    }

    #[tokio::test]
    async fn snap_returns_single_frame() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();

        driver.set_exposure(0.001).await.unwrap();
        let frame = driver.snap().await.unwrap();

        assert_eq!(frame.width, 1920);
        assert_eq!(frame.height, 1080);
        assert_eq!(frame.bit_depth, 16);
        assert!(frame.mean() > 0.0);

        // snap disarms the camera when done
        assert!(!driver.is_armed().await.unwrap());
        assert!(driver.frame_count() >= 1);
    }

    #[tokio::test]
    async fn snap_does_not_modify_operation_mode_parameter() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();

        let mode = driver
            .parameters()
            .get_typed::<Parameter<String>>("acquisition.operation_mode")
            .unwrap();
        mode.set("Hardware Triggered".to_string()).await.unwrap();

        driver.set_exposure(0.001).await.unwrap();
        driver.snap().await.unwrap();

        // snap forces a software trigger on the hardware but leaves the
        // configured mode parameter alone
        assert_eq!(mode.get(), "Hardware Triggered");
    }

    #[tokio::test]
    async fn grab_multiple_returns_exact_count() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();

        driver.set_exposure(0.001).await.unwrap();
        driver
            .parameters()
            .get_typed::<Parameter<String>>("acquisition.operation_mode")
            .unwrap()
            .set(OperationMode::HardwareTriggered.as_str().to_string())
            .await
            .unwrap();

        let frames = driver.grab_multiple(3).await.unwrap();
        assert_eq!(frames.len(), 3);
        for frame in &frames {
            assert_eq!(frame.width, 1920);
            assert_eq!(frame.height, 1080);
        }

        assert!(!driver.is_armed().await.unwrap());
    }

    #[tokio::test]
    async fn abort_returns_partial_results_and_clears_flag() {
        let driver = Arc::new(
            ThorcamDriver::new_async("12345".to_string())
                .await
                .unwrap(),
        );

        // Very long exposure so the grab cannot finish on its own
        driver.set_exposure(5.0).await.unwrap();
        driver
            .parameters()
            .get_typed::<Parameter<String>>("acquisition.operation_mode")
            .unwrap()
            .set(OperationMode::HardwareTriggered.as_str().to_string())
            .await
            .unwrap();

        let grab_driver = driver.clone();
        let grab = tokio::spawn(async move { grab_driver.grab_multiple(5).await });

        // Let the grab start polling, then abort
        tokio::time::sleep(Duration::from_millis(50)).await;
        driver.abort_acquisition().await.unwrap();

        let frames = grab.await.unwrap().unwrap();
        assert!(frames.len() < 5, "Aborted grab should be partial");
        assert!(!driver.is_armed().await.unwrap());

        // The abort flag was consumed: a fresh grab completes normally
        driver.set_exposure(0.001).await.unwrap();
        let frames = driver.grab_multiple(2).await.unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[tokio::test]
    async fn snap_retries_after_transient_poll_errors() {
        use daq_driver_thorcam::components::acquisition::ThorcamAcquisition;
        use daq_driver_thorcam::components::connection::ThorcamConnection;

        let conn = ThorcamConnection::new();
        conn.mock_state.lock().unwrap().poll_failures = 3;

        let acq = ThorcamAcquisition::new(Parameter::new("acquisition.armed", false));
        let frame = acq.snap(&conn, 64, 48).await.unwrap();
        assert_eq!(frame.width, 64);

        // All injected failures were consumed by retries, and the camera
        // still ends up disarmed
        let state = conn.mock_state.lock().unwrap();
        assert_eq!(state.poll_failures, 0);
        assert!(!state.armed);
    }

    #[tokio::test]
    async fn grab_retries_after_transient_poll_errors() {
        use daq_driver_thorcam::components::acquisition::ThorcamAcquisition;
        use daq_driver_thorcam::components::connection::ThorcamConnection;

        let conn = ThorcamConnection::new();
        {
            let mut state = conn.mock_state.lock().unwrap();
            state.exposure_time_us = 1_000.0;
            state.poll_failures = 2;
        }

        let acq = ThorcamAcquisition::new(Parameter::new("acquisition.armed", false));
        let frames = acq
            .grab_multiple(&conn, 2, OperationMode::HardwareTriggered, 1, 64, 48)
            .await
            .unwrap();

        assert_eq!(frames.len(), 2, "Poll errors must not cut the grab short");
        assert!(!conn.mock_state.lock().unwrap().armed);
    }

    #[tokio::test]
    async fn stale_frames_are_not_published_to_subscribers() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();

        driver.set_exposure(0.001).await.unwrap();
        driver
            .parameters()
            .get_typed::<Parameter<String>>("acquisition.operation_mode")
            .unwrap()
            .set(OperationMode::HardwareTriggered.as_str().to_string())
            .await
            .unwrap();

        // Arm and wait without polling so frames pile up on the camera
        driver.arm().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut rx = driver.subscribe_frames().await.unwrap();
        let frames = driver.grab_multiple(2).await.unwrap();
        assert_eq!(frames.len(), 2);

        // Only the delivered frames are counted and broadcast; the stale
        // frames discarded at the start of the grab are not
        assert_eq!(driver.frame_count(), 2);
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err(), "No extra frames should be published");
    }

    #[tokio::test]
    async fn frame_subscription_receives_snapped_frame() {
        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();

        let mut rx = driver.subscribe_frames().await.unwrap();

        driver.set_exposure(0.001).await.unwrap();
        driver.snap().await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Should receive frame before timeout")
            .expect("Frame channel should be open");
        assert_eq!(frame.width, 1920);
    }

    #[tokio::test]
    async fn execute_snap_command() {
        use daq_core::capabilities::Commandable;

        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();
        driver.set_exposure(0.001).await.unwrap();

        let result = driver
            .execute_command("snap", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result["width"], 1920);
        assert_eq!(result["height"], 1080);

        let err = driver
            .execute_command("does_not_exist", serde_json::json!({}))
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn execute_abort_acquisition_command() {
        use daq_core::capabilities::Commandable;

        let driver = ThorcamDriver::new_async("12345".to_string())
            .await
            .unwrap();

        let result = driver
            .execute_command("abort_acquisition", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result["success"], true);

        // The request is observed by the next grab before its first frame
        driver.set_exposure(0.001).await.unwrap();
        driver
            .parameters()
            .get_typed::<Parameter<String>>("acquisition.operation_mode")
            .unwrap()
            .set(OperationMode::HardwareTriggered.as_str().to_string())
            .await
            .unwrap();
        let frames = driver.grab_multiple(3).await.unwrap();
        assert!(frames.is_empty(), "Pending abort should end the grab early");
    }

    #[tokio::test]
    async fn factory_builds_camera_components() {
        let factory = ThorcamFactory;

        let config: toml::Value = toml::from_str(r#"serial = "12345""#).unwrap();
        factory.validate(&config).unwrap();

        let components = factory.build(config).await.unwrap();
        let caps = components.capabilities();
        assert!(caps.contains(&Capability::Triggerable));
        assert!(caps.contains(&Capability::FrameCapture));
        assert!(caps.contains(&Capability::ExposureControl));
        assert!(caps.contains(&Capability::Commandable));
        assert!(caps.contains(&Capability::Parameterized));

        assert_eq!(components.metadata.frame_width, Some(1920));
        assert_eq!(components.metadata.frame_height, Some(1080));
        assert_eq!(components.metadata.bits_per_pixel, Some(16));
    }
}

// =============================================================================
// Hardware Driver Tests
// =============================================================================

#[cfg(all(feature = "thorcam_hardware", feature = "hardware_tests"))]
mod hardware_driver {
    use super::*;
    use std::sync::Mutex;

    // Set to the serial of the attached camera before running
    const TEST_SERIAL: &str = "12345";

    lazy_static::lazy_static! {
        static ref CAMERA_LOCK: Mutex<()> = Mutex::new(());
        static ref LOG_INIT: () = {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(EnvFilter::new("debug,tlcamera_sys=trace"))
                .try_init();
        };
    }

    #[tokio::test]
    async fn hardware_create_driver() {
        let _ = *LOG_INIT;
        let _lock = CAMERA_LOCK.lock().unwrap();

        let driver = ThorcamDriver::new_async(TEST_SERIAL.to_string()).await;
        assert!(
            driver.is_ok(),
            "Should create driver with real hardware: {:?}",
            driver.err()
        );
    }

    #[tokio::test]
    async fn hardware_exposure_control() {
        let _lock = CAMERA_LOCK.lock().unwrap();

        let driver = ThorcamDriver::new_async(TEST_SERIAL.to_string())
            .await
            .unwrap();

        driver.set_exposure(0.100).await.unwrap();
        let exposure = driver.get_exposure().await.unwrap();
        assert!(
            (exposure - 0.100).abs() < 0.01,
            "Exposure should be ~100ms, got {}",
            exposure
        );
    }

    #[tokio::test]
    async fn hardware_snap() {
        let _lock = CAMERA_LOCK.lock().unwrap();

        let driver = ThorcamDriver::new_async(TEST_SERIAL.to_string())
            .await
            .unwrap();

        driver.set_exposure(0.010).await.unwrap();
        let frame = driver.snap().await.unwrap();

        let (width, height) = driver.resolution();
        assert_eq!(frame.width, width);
        assert_eq!(frame.height, height);
        println!("Snapped hardware frame: {}x{}", frame.width, frame.height);
    }
}
