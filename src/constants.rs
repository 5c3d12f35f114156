// SPDX-License-Identifier: GPL-3.0-only

//! Sensor-wide constants
//!
//! Geometry values are the ones the Kinect v2 runtime reports through
//! `IFrameDescription`; the emulated bridge serves them verbatim.

use std::time::Duration;

/// Maximum number of tracked bodies
pub const BODY_COUNT: u8 = 6;

/// Body index value for pixels that belong to no tracked body
pub const BODY_INDEX_NO_BODY: u8 = 0xff;

/// Native timestamps are `TIMESPAN` ticks of 100 ns
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Nominal frame rate of every image source
pub const NOMINAL_FRAME_RATE: u32 = 30;

/// Ticks between two frames at the nominal frame rate
pub const TICKS_PER_FRAME: i64 = TICKS_PER_SECOND / NOMINAL_FRAME_RATE as i64;

// ===== Depth / infrared / body index camera =====

pub const DEPTH_WIDTH: i32 = 512;
pub const DEPTH_HEIGHT: i32 = 424;
pub const DEPTH_HORIZONTAL_FOV: f32 = 70.6;
pub const DEPTH_VERTICAL_FOV: f32 = 60.0;
pub const DEPTH_DIAGONAL_FOV: f32 = 89.5;

/// Closest reliable depth reading in millimetres
pub const DEPTH_MIN_RELIABLE_MM: u16 = 500;
/// Farthest reliable depth reading in millimetres
pub const DEPTH_MAX_RELIABLE_MM: u16 = 4500;

/// Depth camera focal length X (pixels)
pub const DEPTH_FX: f32 = 365.456;
/// Depth camera focal length Y (pixels)
pub const DEPTH_FY: f32 = 365.456;
/// Depth camera principal point X (pixels)
pub const DEPTH_CX: f32 = 254.878;
/// Depth camera principal point Y (pixels)
pub const DEPTH_CY: f32 = 205.395;

// ===== Color camera =====

pub const COLOR_WIDTH: i32 = 1920;
pub const COLOR_HEIGHT: i32 = 1080;
pub const COLOR_HORIZONTAL_FOV: f32 = 84.1;
pub const COLOR_VERTICAL_FOV: f32 = 53.8;
pub const COLOR_DIAGONAL_FOV: f32 = 91.9;

/// Color camera focal length X (pixels)
pub const COLOR_FX: f32 = 1081.372;
/// Color camera focal length Y (pixels)
pub const COLOR_FY: f32 = 1081.372;
/// Color camera principal point X (pixels)
pub const COLOR_CX: f32 = 959.5;
/// Color camera principal point Y (pixels)
pub const COLOR_CY: f32 = 539.5;
/// Horizontal offset of the color camera from the depth camera (metres)
pub const COLOR_BASELINE_M: f32 = 0.052;

// ===== Audio =====

/// Microphone array sample rate
pub const AUDIO_SAMPLE_RATE: u32 = 16_000;
/// Samples are mono IEEE float
pub const AUDIO_BYTES_PER_SAMPLE: u32 = 4;
/// Beam angle range of the microphone array (radians, symmetric)
pub const AUDIO_BEAM_ANGLE_LIMIT: f32 = 0.872_664_6;
/// Default scratch size for one audio read: 16 ms of samples
pub const DEFAULT_AUDIO_BUFFER_SIZE: u32 = 1024;

// ===== Open policy =====

/// Default delay between two attempts of the `connect` poll loop
pub const DEFAULT_OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Default attempt limit of the `connect` poll loop (0 = unlimited)
pub const DEFAULT_OPEN_MAX_ATTEMPTS: u32 = 20;

/// Bytes per pixel for a color image format, as reported by the runtime
pub fn color_bytes_per_pixel(format: crate::ffi::ColorImageFormat) -> u32 {
    use crate::ffi::*;
    match format {
        COLOR_IMAGE_FORMAT_RGBA | COLOR_IMAGE_FORMAT_BGRA => 4,
        COLOR_IMAGE_FORMAT_YUV | COLOR_IMAGE_FORMAT_YUY2 => 2,
        COLOR_IMAGE_FORMAT_BAYER => 1,
        _ => 0,
    }
}
