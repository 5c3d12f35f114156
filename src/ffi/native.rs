// SPDX-License-Identifier: GPL-3.0-only

//! `extern` declarations for the exported KCBv2 entry points
//!
//! Only symbols that the shipped library actually defines are declared here.
//! The header also names `KCBMultiFrameReady` and `KCBGetBodyIndexData`, but
//! the library exports neither, so binding them would fail at link time.
//!
//! Body tracking is not bound, so the body frame argument of
//! `KCBGetAllFrameData` is an opaque pointer that callers leave null.

use super::*;
use libc::{c_uint, c_void};

#[link(name = "KCBv2")]
unsafe extern "system" {
    pub fn KCBOpenDefaultSensor() -> KcbHandle;
    pub fn KCBCloseSensor(kcb_handle: *mut KcbHandle) -> Hresult;

    pub fn KCBGetAudioFormat(kcb_handle: KcbHandle, audio_format: *mut WaveFormatEx) -> Hresult;
    pub fn KCBGetBodyIndexFrameDescription(
        kcb_handle: KcbHandle,
        frame_description: *mut KcbFrameDescription,
    ) -> Hresult;
    pub fn KCBGetColorFrameDescription(
        kcb_handle: KcbHandle,
        format: ColorImageFormat,
        frame_description: *mut KcbFrameDescription,
    ) -> Hresult;
    pub fn KCBGetDepthFrameDescription(
        kcb_handle: KcbHandle,
        frame_description: *mut KcbFrameDescription,
    ) -> Hresult;
    pub fn KCBGetInfraredFrameDescription(
        kcb_handle: KcbHandle,
        frame_description: *mut KcbFrameDescription,
    ) -> Hresult;
    pub fn KCBGetLongExposureInfraredFrameDescription(
        kcb_handle: KcbHandle,
        frame_description: *mut KcbFrameDescription,
    ) -> Hresult;

    pub fn KCBCreateBodyIndexFrame(
        frame_description: KcbFrameDescription,
        body_index_frame: *mut *mut KcbBodyIndexFrame,
    ) -> Hresult;
    pub fn KCBCreateColorFrame(
        color_format: ColorImageFormat,
        frame_description: KcbFrameDescription,
        color_frame: *mut *mut KcbColorFrame,
    ) -> Hresult;
    pub fn KCBCreateDepthFrame(
        frame_description: KcbFrameDescription,
        depth_frame: *mut *mut KcbDepthFrame,
    ) -> Hresult;
    pub fn KCBCreateInfraredFrame(
        frame_description: KcbFrameDescription,
        infrared_frame: *mut *mut KcbInfraredFrame,
    ) -> Hresult;
    pub fn KCBCreateLongExposureInfraredFrame(
        frame_description: KcbFrameDescription,
        long_exposure_infrared_frame: *mut *mut KcbLongExposureInfraredFrame,
    ) -> Hresult;

    pub fn KCBReleaseBodyIndexFrame(body_index_frame: *mut *mut KcbBodyIndexFrame) -> Hresult;
    pub fn KCBReleaseColorFrame(color_frame: *mut *mut KcbColorFrame) -> Hresult;
    pub fn KCBReleaseDepthFrame(depth_frame: *mut *mut KcbDepthFrame) -> Hresult;
    pub fn KCBReleaseInfraredFrame(infrared_frame: *mut *mut KcbInfraredFrame) -> Hresult;
    pub fn KCBReleaseLongExposureInfraredFrame(
        long_exposure_infrared_frame: *mut *mut KcbLongExposureInfraredFrame,
    ) -> Hresult;

    pub fn KCBGetAudioFrame(kcb_handle: KcbHandle, audio_frame: *mut KcbAudioFrame) -> Hresult;
    pub fn KCBGetBodyIndexFrame(
        kcb_handle: KcbHandle,
        body_index_frame: *mut KcbBodyIndexFrame,
    ) -> Hresult;
    pub fn KCBGetColorFrame(kcb_handle: KcbHandle, color_frame: *mut KcbColorFrame) -> Hresult;
    pub fn KCBGetDepthFrame(kcb_handle: KcbHandle, depth_frame: *mut KcbDepthFrame) -> Hresult;
    pub fn KCBGetInfraredFrame(
        kcb_handle: KcbHandle,
        infrared_frame: *mut KcbInfraredFrame,
    ) -> Hresult;
    pub fn KCBGetLongExposureInfraredFrame(
        kcb_handle: KcbHandle,
        long_exposure_infrared_frame: *mut KcbLongExposureInfraredFrame,
    ) -> Hresult;

    pub fn KCBIsFrameReady(kcb_handle: KcbHandle, source_type: FrameSourceTypes) -> bool;
    pub fn KCBAnyFrameReady(kcb_handle: KcbHandle) -> bool;
    pub fn KCBAllFramesReady(kcb_handle: KcbHandle) -> bool;

    pub fn KCBMapCameraPointToDepthSpace(
        kcb_handle: KcbHandle,
        camera_point: CameraSpacePoint,
        depth_point: *mut DepthSpacePoint,
    ) -> Hresult;
    pub fn KCBMapCameraPointToColorSpace(
        kcb_handle: KcbHandle,
        camera_point: CameraSpacePoint,
        color_point: *mut ColorSpacePoint,
    ) -> Hresult;
    pub fn KCBMapDepthPointToCameraSpace(
        kcb_handle: KcbHandle,
        depth_point: DepthSpacePoint,
        depth: u16,
        camera_point: *mut CameraSpacePoint,
    ) -> Hresult;
    pub fn KCBMapDepthFrameToCameraSpace(
        kcb_handle: KcbHandle,
        depth_point_count: c_uint,
        depth_frame_data: *const u16,
        camera_point_count: c_uint,
        camera_space_points: *mut CameraSpacePoint,
    ) -> Hresult;
    pub fn KCBMapDepthPointToColorSpace(
        kcb_handle: KcbHandle,
        depth_point: DepthSpacePoint,
        depth: u16,
        color_point: *mut ColorSpacePoint,
    ) -> Hresult;
    pub fn KCBMapCameraPointsToDepthSpace(
        kcb_handle: KcbHandle,
        camera_point_count: c_uint,
        camera_points: *const CameraSpacePoint,
        depth_point_count: c_uint,
        depth_points: *mut DepthSpacePoint,
    ) -> Hresult;
    pub fn KCBMapCameraPointsToColorSpace(
        kcb_handle: KcbHandle,
        camera_point_count: c_uint,
        camera_points: *const CameraSpacePoint,
        color_point_count: c_uint,
        color_points: *mut ColorSpacePoint,
    ) -> Hresult;
    pub fn KCBMapDepthPointsToCameraSpace(
        kcb_handle: KcbHandle,
        depth_point_count: c_uint,
        depth_points: *const DepthSpacePoint,
        depth_count: c_uint,
        depths: *const u16,
        camera_point_count: c_uint,
        camera_points: *mut CameraSpacePoint,
    ) -> Hresult;
    pub fn KCBMapDepthPointsToColorSpace(
        kcb_handle: KcbHandle,
        depth_point_count: c_uint,
        depth_points: *const DepthSpacePoint,
        depth_count: c_uint,
        depths: *const u16,
        color_point_count: c_uint,
        color_points: *mut ColorSpacePoint,
    ) -> Hresult;
    pub fn KCBMapDepthFrameToColorSpace(
        kcb_handle: KcbHandle,
        depth_point_count: c_uint,
        depth_frame_data: *const u16,
        color_point_count: c_uint,
        color_space_points: *mut ColorSpacePoint,
    ) -> Hresult;
    pub fn KCBMapColorFrameToDepthSpace(
        kcb_handle: KcbHandle,
        depth_data_point_count: c_uint,
        depth_frame_data: *const u16,
        depth_point_count: c_uint,
        depth_space_points: *mut DepthSpacePoint,
    ) -> Hresult;
    pub fn KCBMapColorFrameToCameraSpace(
        kcb_handle: KcbHandle,
        depth_data_point_count: c_uint,
        depth_frame_data: *const u16,
        camera_point_count: c_uint,
        camera_space_points: *mut CameraSpacePoint,
    ) -> Hresult;
    pub fn GetDepthFrameToCameraSpaceTable(
        kcb_handle: KcbHandle,
        table_entry_count: *mut c_uint,
        table_entries: *mut *mut PointF,
    ) -> Hresult;

    pub fn KCBGetAllFrameData(
        kcb_handle: KcbHandle,
        body_frame: *mut c_void,
        body_index_frame: *mut KcbBodyIndexFrame,
        color_frame: *mut KcbColorFrame,
        depth_frame: *mut KcbDepthFrame,
        infrared_frame: *mut KcbInfraredFrame,
        long_exposure_infrared_frame: *mut KcbLongExposureInfraredFrame,
    ) -> Hresult;
}

/// Frees the lookup table returned by `GetDepthFrameToCameraSpaceTable`
#[link(name = "ole32")]
unsafe extern "system" {
    pub fn CoTaskMemFree(pv: *mut c_void);
}
