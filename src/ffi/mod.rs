// SPDX-License-Identifier: GPL-3.0-only

//! Raw KCBv2 ABI surface
//!
//! Layout-exact mirrors of the structures declared in `KCBv2Lib.h`. Field
//! order and scalar widths follow the vendor header verbatim; only the field
//! names are converted to Rust casing.
//!
//! The native library is built for Windows (LLP64), so the Win32 typedefs map
//! to fixed widths regardless of the host running the emulated bridge:
//!
//! | Win32 | Rust |
//! |---|---|
//! | `int` / `KCBHANDLE` | `c_int` (32-bit) |
//! | `unsigned int` / `UINT` | `c_uint` (32-bit) |
//! | `ULONG` / `DWORD` | `u32` |
//! | `LONGLONG` / `TIMESPAN` | `i64` |
//! | `HRESULT` | `i32` |
//! | `FLOAT` | `f32` |

#[cfg(all(windows, feature = "kcbv2"))]
pub mod native;

use bytemuck::{Pod, Zeroable};
use libc::{c_int, c_uint};

/// Native sensor handle (`KCBHANDLE`)
pub type KcbHandle = c_int;

/// Win32 status code
pub type Hresult = i32;

/// Win32 `ULONG` (32-bit on every Windows target)
pub type Ulong = u32;

/// `ColorImageFormat` enumeration value from `Kinect.h`
pub type ColorImageFormat = c_int;

/// `FrameSourceTypes` bit flags from `Kinect.h`
pub type FrameSourceTypes = u32;

// ===== Handles =====

/// Sentinel for "no sensor" (`0xffffffff` in the vendor header)
pub const KCB_INVALID_HANDLE: KcbHandle = -1;

/// First handle value issued by the native sensor registry
pub const KCB_DEFAULT_HANDLE: KcbHandle = 0x0000_e000;

// ===== HRESULT codes =====

pub const S_OK: Hresult = 0;
pub const S_FALSE: Hresult = 1;
pub const E_NOTIMPL: Hresult = 0x8000_4001_u32 as i32;
pub const E_NOINTERFACE: Hresult = 0x8000_4002_u32 as i32;
pub const E_POINTER: Hresult = 0x8000_4003_u32 as i32;
pub const E_FAIL: Hresult = 0x8000_4005_u32 as i32;
pub const E_PENDING: Hresult = 0x8000_000a_u32 as i32;
pub const E_OUTOFMEMORY: Hresult = 0x8007_000e_u32 as i32;
pub const E_INVALIDARG: Hresult = 0x8007_0057_u32 as i32;

/// Equivalent of the `SUCCEEDED` macro
#[inline]
pub const fn succeeded(hr: Hresult) -> bool {
    hr >= 0
}

/// Equivalent of the `FAILED` macro
#[inline]
pub const fn failed(hr: Hresult) -> bool {
    hr < 0
}

// ===== ColorImageFormat =====

pub const COLOR_IMAGE_FORMAT_NONE: ColorImageFormat = 0;
pub const COLOR_IMAGE_FORMAT_RGBA: ColorImageFormat = 1;
pub const COLOR_IMAGE_FORMAT_YUV: ColorImageFormat = 2;
pub const COLOR_IMAGE_FORMAT_BGRA: ColorImageFormat = 3;
pub const COLOR_IMAGE_FORMAT_BAYER: ColorImageFormat = 4;
pub const COLOR_IMAGE_FORMAT_YUY2: ColorImageFormat = 5;

// ===== FrameSourceTypes =====

pub const FRAME_SOURCE_TYPES_NONE: FrameSourceTypes = 0x00;
pub const FRAME_SOURCE_TYPES_COLOR: FrameSourceTypes = 0x01;
pub const FRAME_SOURCE_TYPES_INFRARED: FrameSourceTypes = 0x02;
pub const FRAME_SOURCE_TYPES_LONG_EXPOSURE_INFRARED: FrameSourceTypes = 0x04;
pub const FRAME_SOURCE_TYPES_DEPTH: FrameSourceTypes = 0x08;
pub const FRAME_SOURCE_TYPES_BODY_INDEX: FrameSourceTypes = 0x10;
pub const FRAME_SOURCE_TYPES_BODY: FrameSourceTypes = 0x20;
pub const FRAME_SOURCE_TYPES_AUDIO: FrameSourceTypes = 0x40;

// ===== Structures =====

/// `KCBFrameDescription`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct KcbFrameDescription {
    pub width: c_int,
    pub height: c_int,
    pub horizontal_field_of_view: f32,
    pub vertical_field_of_view: f32,
    pub diagonal_field_of_view: f32,
    pub length_in_pixels: c_uint,
    pub bytes_per_pixel: c_uint,
}

/// `KCBAudioFrame`
///
/// `audio_buffer` is supplied by the caller and filled in place with IEEE
/// float samples (4 bytes each).
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct KcbAudioFrame {
    pub audio_buffer_size: Ulong,
    pub audio_buffer: *mut u8,
    pub bytes_read: Ulong,
    pub beam_angle: f32,
    pub beam_angle_confidence: f32,
}

/// `KCBBodyIndexFrame`
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct KcbBodyIndexFrame {
    pub size: Ulong,
    pub buffer: *mut u8,
    pub time_stamp: i64,
}

/// `KCBColorFrame`
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct KcbColorFrame {
    pub format: ColorImageFormat,
    pub size: Ulong,
    pub buffer: *mut u8,
    pub time_stamp: i64,
}

/// `KCBDepthFrame`, also typedef'd as `KCBInfraredFrame` and
/// `KCBLongExposureInfraredFrame`
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct KcbDepthFrame {
    pub size: Ulong,
    pub buffer: *mut u16,
    pub time_stamp: i64,
}

pub type KcbInfraredFrame = KcbDepthFrame;
pub type KcbLongExposureInfraredFrame = KcbDepthFrame;

/// `WAVEFORMATEX` (declared under `#pragma pack(1)` in `mmreg.h`)
#[repr(C, packed(1))]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct WaveFormatEx {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub cb_size: u16,
}

/// `WAVE_FORMAT_IEEE_FLOAT`
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;

/// `CameraSpacePoint` (metres)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct CameraSpacePoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// `DepthSpacePoint` (pixels)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct DepthSpacePoint {
    pub x: f32,
    pub y: f32,
}

/// `ColorSpacePoint` (pixels)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ColorSpacePoint {
    pub x: f32,
    pub y: f32,
}

/// `PointF`, one entry of the depth-to-camera lookup table
///
/// Multiplying an entry by a pixel's depth in metres gives the camera space
/// X and Y of that pixel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}
