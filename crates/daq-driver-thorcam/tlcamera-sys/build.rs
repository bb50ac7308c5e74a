use std::env;
use std::path::PathBuf;

fn main() {
    // Only run bindgen and linking logic if the `tlcamera-sdk` feature is enabled.
    // This allows the crate to compile without the SDK if the feature is not active.
    #[cfg(feature = "tlcamera-sdk")]
    {
        println!("cargo:rerun-if-env-changed=THORLABS_TSI_SDK_DIR");
        println!("cargo:rerun-if-changed=wrapper.h"); // For bindgen to re-run if wrapper changes

        let sdk_dir = env::var("THORLABS_TSI_SDK_DIR").expect(
            "THORLABS_TSI_SDK_DIR environment variable must be set when `tlcamera-sdk` feature is enabled.",
        );

        let sdk_include_path = PathBuf::from(&sdk_dir).join("include");

        // Allow THORLABS_TSI_LIB_DIR to override the default lib path
        let sdk_lib_path = if let Ok(lib_dir) = env::var("THORLABS_TSI_LIB_DIR") {
            PathBuf::from(lib_dir)
        } else {
            PathBuf::from(&sdk_dir).join("lib")
        };

        if !sdk_include_path.exists() {
            panic!(
                "Thorlabs TSI SDK include path does not exist: {:?}",
                sdk_include_path
            );
        }
        // The lib path might not exist if libraries are installed globally,
        // but it's a common place. Warn rather than panic.
        if !sdk_lib_path.exists() {
            eprintln!(
                "Warning: Thorlabs TSI SDK lib path does not exist: {:?}",
                sdk_lib_path
            );
        }

        // Generate bindings
        let bindings = bindgen::Builder::default()
            // The input header we would like to generate bindings for.
            .header("wrapper.h")
            // Tell cargo to invalidate the built crate whenever any of the
            // included header files changed.
            .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
            // Add include path for the TSI headers
            .clang_arg(format!("-I{}", sdk_include_path.display()))
            // Allowlist the camera entry points
            .allowlist_function("tl_camera_.*")
            .allowlist_type("TL_CAMERA_.*")
            .allowlist_var("TL_CAMERA_.*")
            .default_enum_style(bindgen::EnumVariation::Rust {
                non_exhaustive: false,
            })
            // Finish the builder and generate the bindings.
            .generate()
            .expect("Unable to generate bindings");

        // Write the bindings to the $OUT_DIR/bindings.rs file.
        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        bindings
            .write_to_file(out_path.join("bindings.rs"))
            .expect("Couldn't write bindings!");

        // Link to the TSI camera library
        println!("cargo:rustc-link-search=native={}", sdk_lib_path.display());

        #[cfg(target_os = "windows")]
        {
            println!("cargo:rustc-link-lib=thorlabs_tsi_camera_sdk");
        }
        #[cfg(target_os = "linux")]
        {
            println!("cargo:rustc-link-lib=thorlabs_tsi_camera_sdk"); // libthorlabs_tsi_camera_sdk.so
        }
    }
    #[cfg(not(feature = "tlcamera-sdk"))]
    {
        // If the tlcamera-sdk feature is not enabled, create a dummy bindings file
        // to allow src/lib.rs to compile without actual SDK presence.
        let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
        std::fs::write(
            out_path.join("bindings.rs"),
            "// Dummy bindings when tlcamera-sdk feature is not enabled\n",
        )
        .expect("Couldn't write dummy bindings!");
    }
}
