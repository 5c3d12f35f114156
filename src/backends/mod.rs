// SPDX-License-Identifier: GPL-3.0-only

//! Bridge abstraction over the KCBv2 entry points
//!
//! The safe sensor layer talks to the device through one trait so that the
//! same code drives the real library on Windows and an in-process emulator
//! everywhere else:
//!
//! ```text
//! ┌─────────────────────┐
//! │  Sensor / Frame<K>  │  ← ownership, bounded views
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │  KinectBridge Trait │  ← raw status codes, raw frame pointers
//! └──────────┬──────────┘
//!            │
//!      ┌─────┴──────┐
//!      ▼            ▼
//! ┌────────┐   ┌──────────┐
//! │ Native │   │ Emulated │
//! └────────┘   └──────────┘
//! ```
//!
//! Methods keep the native calling convention on purpose: status codes are
//! returned rather than mapped, and out-parameters stay out-parameters. The
//! mapping to `Result` happens once, in [`crate::sensor`].

pub mod emulated;
#[cfg(all(windows, feature = "kcbv2"))]
pub mod native;

use crate::errors::AppResult;
use crate::ffi::{
    CameraSpacePoint, ColorImageFormat, ColorSpacePoint, DepthSpacePoint, FrameSourceTypes,
    Hresult, KcbAudioFrame, KcbBodyIndexFrame, KcbColorFrame, KcbDepthFrame, KcbFrameDescription,
    KcbHandle, PointF, WaveFormatEx,
};
use crate::sensor::types::{Depth16Source, FrameSource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use emulated::{EmulatedBridge, EmulatorConfig, SecondOpenPolicy};

/// Common interface of every KCBv2 implementation
///
/// Handle arguments are raw integers and may be the sentinel or a stale
/// value; implementations must answer those with a status code, never panic.
pub trait KinectBridge: Send + Sync {
    /// Which implementation this is
    fn bridge_type(&self) -> BridgeType;

    // ===== Lifecycle =====

    /// `KCBOpenDefaultSensor`: a fresh handle, or the sentinel on failure
    fn open_default_sensor(&self) -> KcbHandle;

    /// `KCBCloseSensor`
    ///
    /// Returns `E_INVALIDARG` for the sentinel and `E_NOINTERFACE` for a
    /// handle that is not open. The slot is reset to the sentinel in both the
    /// success and unknown-handle cases.
    fn close_sensor(&self, handle: &mut KcbHandle) -> Hresult;

    // ===== Descriptions =====

    /// `KCBGetAudioFormat`
    fn audio_format(&self, handle: KcbHandle, format: &mut WaveFormatEx) -> Hresult;

    /// `KCBGet*FrameDescription`
    ///
    /// On failure with a recognised handle the description is zeroed.
    fn frame_description(
        &self,
        handle: KcbHandle,
        source: FrameSource,
        description: &mut KcbFrameDescription,
    ) -> Hresult;

    /// `KCBGetColorFrameDescription` with an unchecked format value
    ///
    /// Lets `ColorImageFormat_None` reach the implementation, which rejects it.
    fn color_frame_description(
        &self,
        handle: KcbHandle,
        format: ColorImageFormat,
        description: &mut KcbFrameDescription,
    ) -> Hresult;

    // ===== Frame buffers =====

    /// `KCBCreateBodyIndexFrame`
    ///
    /// # Safety
    /// `frame` must be valid for one pointer write.
    unsafe fn create_body_index_frame(
        &self,
        description: KcbFrameDescription,
        frame: *mut *mut KcbBodyIndexFrame,
    ) -> Hresult;

    /// `KCBReleaseBodyIndexFrame`
    ///
    /// # Safety
    /// `frame` must be valid for reads and writes, and `*frame` must be null or
    /// a frame created by this bridge that has not been released.
    unsafe fn release_body_index_frame(&self, frame: *mut *mut KcbBodyIndexFrame) -> Hresult;

    /// `KCBGetBodyIndexFrame`
    ///
    /// # Safety
    /// `frame` must be null or a live frame created by this bridge whose
    /// `size` and `buffer` fields have not been modified.
    unsafe fn get_body_index_frame(
        &self,
        handle: KcbHandle,
        frame: *mut KcbBodyIndexFrame,
    ) -> Hresult;

    /// `KCBCreateColorFrame`
    ///
    /// # Safety
    /// `frame` must be valid for one pointer write.
    unsafe fn create_color_frame(
        &self,
        format: ColorImageFormat,
        description: KcbFrameDescription,
        frame: *mut *mut KcbColorFrame,
    ) -> Hresult;

    /// `KCBReleaseColorFrame`
    ///
    /// # Safety
    /// Same contract as [`KinectBridge::release_body_index_frame`].
    unsafe fn release_color_frame(&self, frame: *mut *mut KcbColorFrame) -> Hresult;

    /// `KCBGetColorFrame`
    ///
    /// # Safety
    /// Same contract as [`KinectBridge::get_body_index_frame`].
    unsafe fn get_color_frame(&self, handle: KcbHandle, frame: *mut KcbColorFrame) -> Hresult;

    /// `KCBCreate{Depth,Infrared,LongExposureInfrared}Frame`
    ///
    /// # Safety
    /// `frame` must be valid for one pointer write.
    unsafe fn create_depth16_frame(
        &self,
        source: Depth16Source,
        description: KcbFrameDescription,
        frame: *mut *mut KcbDepthFrame,
    ) -> Hresult;

    /// `KCBRelease{Depth,Infrared,LongExposureInfrared}Frame`
    ///
    /// # Safety
    /// Same contract as [`KinectBridge::release_body_index_frame`], with the
    /// frame created for the same `source`.
    unsafe fn release_depth16_frame(
        &self,
        source: Depth16Source,
        frame: *mut *mut KcbDepthFrame,
    ) -> Hresult;

    /// `KCBGet{Depth,Infrared,LongExposureInfrared}Frame`
    ///
    /// # Safety
    /// Same contract as [`KinectBridge::get_body_index_frame`].
    unsafe fn get_depth16_frame(
        &self,
        source: Depth16Source,
        handle: KcbHandle,
        frame: *mut KcbDepthFrame,
    ) -> Hresult;

    /// `KCBGetAudioFrame`
    ///
    /// # Safety
    /// `frame` must be null or valid for reads and writes, and its
    /// `audio_buffer` must be null or writable for `audio_buffer_size` bytes.
    unsafe fn get_audio_frame(&self, handle: KcbHandle, frame: *mut KcbAudioFrame) -> Hresult;

    /// `KCBGetAllFrameData` without the body frame
    ///
    /// Fills every non-null frame from the same instant. Returns `E_PENDING`,
    /// writing nothing, unless all requested sources have a new frame.
    ///
    /// # Safety
    /// Each pointer must be null or satisfy the contract of the matching
    /// single-source get method.
    unsafe fn get_all_frame_data(
        &self,
        handle: KcbHandle,
        body_index: *mut KcbBodyIndexFrame,
        color: *mut KcbColorFrame,
        depth: *mut KcbDepthFrame,
        infrared: *mut KcbDepthFrame,
        long_exposure_infrared: *mut KcbDepthFrame,
    ) -> Hresult;

    // ===== Readiness =====

    /// `KCBIsFrameReady`; false for an invalid handle
    fn is_frame_ready(&self, handle: KcbHandle, source: FrameSourceTypes) -> bool;

    /// `KCBAnyFrameReady`; false for an invalid handle
    fn any_frame_ready(&self, handle: KcbHandle) -> bool;

    /// `KCBAllFramesReady`; false for an invalid handle
    fn all_frames_ready(&self, handle: KcbHandle) -> bool;

    // ===== Coordinate mapping =====

    /// `KCBMapCameraPointToDepthSpace`
    fn map_camera_point_to_depth_space(
        &self,
        handle: KcbHandle,
        camera_point: CameraSpacePoint,
        depth_point: &mut DepthSpacePoint,
    ) -> Hresult;

    /// `KCBMapCameraPointToColorSpace`
    fn map_camera_point_to_color_space(
        &self,
        handle: KcbHandle,
        camera_point: CameraSpacePoint,
        color_point: &mut ColorSpacePoint,
    ) -> Hresult;

    /// `KCBMapDepthPointToCameraSpace`
    fn map_depth_point_to_camera_space(
        &self,
        handle: KcbHandle,
        depth_point: DepthSpacePoint,
        depth: u16,
        camera_point: &mut CameraSpacePoint,
    ) -> Hresult;

    /// `KCBMapDepthFrameToCameraSpace`
    fn map_depth_frame_to_camera_space(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        camera_points: &mut [CameraSpacePoint],
    ) -> Hresult;

    /// `KCBMapDepthPointToColorSpace`
    fn map_depth_point_to_color_space(
        &self,
        handle: KcbHandle,
        depth_point: DepthSpacePoint,
        depth: u16,
        color_point: &mut ColorSpacePoint,
    ) -> Hresult;

    /// `KCBMapCameraPointsToDepthSpace`
    fn map_camera_points_to_depth_space(
        &self,
        handle: KcbHandle,
        camera_points: &[CameraSpacePoint],
        depth_points: &mut [DepthSpacePoint],
    ) -> Hresult;

    /// `KCBMapCameraPointsToColorSpace`
    fn map_camera_points_to_color_space(
        &self,
        handle: KcbHandle,
        camera_points: &[CameraSpacePoint],
        color_points: &mut [ColorSpacePoint],
    ) -> Hresult;

    /// `KCBMapDepthPointsToCameraSpace`; `depths` pairs with `depth_points`
    fn map_depth_points_to_camera_space(
        &self,
        handle: KcbHandle,
        depth_points: &[DepthSpacePoint],
        depths: &[u16],
        camera_points: &mut [CameraSpacePoint],
    ) -> Hresult;

    /// `KCBMapDepthPointsToColorSpace`; `depths` pairs with `depth_points`
    fn map_depth_points_to_color_space(
        &self,
        handle: KcbHandle,
        depth_points: &[DepthSpacePoint],
        depths: &[u16],
        color_points: &mut [ColorSpacePoint],
    ) -> Hresult;

    /// `KCBMapDepthFrameToColorSpace`: one color point per depth pixel
    fn map_depth_frame_to_color_space(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        color_points: &mut [ColorSpacePoint],
    ) -> Hresult;

    /// `KCBMapColorFrameToDepthSpace`: one depth point per color pixel
    fn map_color_frame_to_depth_space(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        depth_points: &mut [DepthSpacePoint],
    ) -> Hresult;

    /// `KCBMapColorFrameToCameraSpace`: one camera point per color pixel
    fn map_color_frame_to_camera_space(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        camera_points: &mut [CameraSpacePoint],
    ) -> Hresult;

    /// `GetDepthFrameToCameraSpaceTable`, copied into `table`
    ///
    /// The table holds one entry per depth pixel in row order. On failure
    /// `table` is left empty.
    fn depth_frame_to_camera_space_table(&self, handle: KcbHandle, table: &mut Vec<PointF>)
    -> Hresult;
}

/// Which bridge implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BridgeType {
    /// In-process emulator with synthetic frames
    #[default]
    Emulated,
    /// The vendor `KCBv2` library (Windows, `kcbv2` feature)
    Native,
}

impl std::fmt::Display for BridgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeType::Emulated => write!(f, "emulated"),
            BridgeType::Native => write!(f, "native KCBv2"),
        }
    }
}

/// True when this build links the native library
pub const fn native_available() -> bool {
    cfg!(all(windows, feature = "kcbv2"))
}

/// Get a concrete bridge instance
///
/// `emulator` is only consulted for [`BridgeType::Emulated`].
pub fn get_bridge(
    bridge_type: BridgeType,
    emulator: &EmulatorConfig,
) -> AppResult<Arc<dyn KinectBridge>> {
    match bridge_type {
        BridgeType::Emulated => Ok(Arc::new(EmulatedBridge::new(emulator.clone()))),
        BridgeType::Native => native_bridge(),
    }
}

#[cfg(all(windows, feature = "kcbv2"))]
fn native_bridge() -> AppResult<Arc<dyn KinectBridge>> {
    Ok(Arc::new(native::NativeBridge))
}

#[cfg(not(all(windows, feature = "kcbv2")))]
fn native_bridge() -> AppResult<Arc<dyn KinectBridge>> {
    Err(crate::errors::AppError::Config(
        "the native bridge needs a Windows build with the `kcbv2` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bridge_is_emulated() {
        assert_eq!(BridgeType::default(), BridgeType::Emulated);
        let bridge = get_bridge(BridgeType::Emulated, &EmulatorConfig::default()).unwrap();
        assert_eq!(bridge.bridge_type(), BridgeType::Emulated);
    }

    #[test]
    #[cfg(not(all(windows, feature = "kcbv2")))]
    fn test_native_bridge_unavailable_without_feature() {
        use crate::errors::AppError;

        assert!(!native_available());
        let err = get_bridge(BridgeType::Native, &EmulatorConfig::default()).err();
        assert!(matches!(err, Some(AppError::Config(_))));
    }
}
