// SPDX-License-Identifier: MPL-2.0

//! Kinect Bridge - safe bindings for the Kinect Common Bridge v2 library
//!
//! The vendor library exposes the Kinect v2 sensor through a small C ABI of
//! integer handles, HRESULT status codes and natively allocated frame
//! buffers. This crate mirrors that ABI exactly and layers an ownership-based
//! API on top of it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`ffi`]: layout-exact structures, constants and `extern` declarations
//! - [`backends`]: the [`backends::KinectBridge`] seam, with the native
//!   library and an in-process emulator behind it
//! - [`sensor`]: handle lifecycle, frame ownership and bounded buffer views
//! - [`config`]: user configuration handling
//! - [`errors`]: contract and application error types
//!
//! # Example
//!
//! ```no_run
//! use kinect_bridge::backends::{BridgeType, EmulatorConfig, get_bridge};
//! use kinect_bridge::sensor::{BodyIndex, Sensor};
//!
//! let bridge = get_bridge(BridgeType::Emulated, &EmulatorConfig::default())?;
//! let sensor = Sensor::open_default(bridge)?;
//! let mut frame = sensor.create_frame(BodyIndex)?;
//! sensor.acquire(&mut frame)?;
//! if let Some(view) = frame.buffer() {
//!     println!("{} pixels at generation {}", view.len(), view.generation());
//! }
//! sensor.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod ffi;
#[cfg(feature = "python")]
pub mod python;
pub mod sensor;

// Re-export commonly used types
pub use backends::{BridgeType, KinectBridge};
pub use config::Config;
pub use errors::{AppError, SensorError};
pub use sensor::{Frame, Sensor, SensorHandle};
