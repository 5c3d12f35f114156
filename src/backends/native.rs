// SPDX-License-Identifier: GPL-3.0-only

//! Bridge backed by the vendor `KCBv2` library
//!
//! Every method is a direct forward. The library serialises access to its
//! sensor registry internally, so the bridge carries no state of its own.

use super::{BridgeType, KinectBridge};
use crate::ffi::native as sys;
use crate::ffi::{
    self, CameraSpacePoint, ColorImageFormat, ColorSpacePoint, DepthSpacePoint, FrameSourceTypes,
    Hresult, KcbAudioFrame, KcbBodyIndexFrame, KcbColorFrame, KcbDepthFrame, KcbFrameDescription,
    KcbHandle, PointF, WaveFormatEx,
};
use crate::sensor::types::{Depth16Source, FrameSource};
use libc::c_uint;
use tracing::warn;

/// Zero-sized forwarder to the linked library
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBridge;

impl KinectBridge for NativeBridge {
    fn bridge_type(&self) -> BridgeType {
        BridgeType::Native
    }

    fn open_default_sensor(&self) -> KcbHandle {
        unsafe { sys::KCBOpenDefaultSensor() }
    }

    fn close_sensor(&self, handle: &mut KcbHandle) -> Hresult {
        unsafe { sys::KCBCloseSensor(handle) }
    }

    fn audio_format(&self, handle: KcbHandle, format: &mut WaveFormatEx) -> Hresult {
        unsafe { sys::KCBGetAudioFormat(handle, format) }
    }

    fn frame_description(
        &self,
        handle: KcbHandle,
        source: FrameSource,
        description: &mut KcbFrameDescription,
    ) -> Hresult {
        unsafe {
            match source {
                FrameSource::Color(format) => {
                    sys::KCBGetColorFrameDescription(handle, format.raw(), description)
                }
                FrameSource::Depth => sys::KCBGetDepthFrameDescription(handle, description),
                FrameSource::Infrared => sys::KCBGetInfraredFrameDescription(handle, description),
                FrameSource::LongExposureInfrared => {
                    sys::KCBGetLongExposureInfraredFrameDescription(handle, description)
                }
                FrameSource::BodyIndex => sys::KCBGetBodyIndexFrameDescription(handle, description),
            }
        }
    }

    fn color_frame_description(
        &self,
        handle: KcbHandle,
        format: ColorImageFormat,
        description: &mut KcbFrameDescription,
    ) -> Hresult {
        unsafe { sys::KCBGetColorFrameDescription(handle, format, description) }
    }

    unsafe fn create_body_index_frame(
        &self,
        description: KcbFrameDescription,
        frame: *mut *mut KcbBodyIndexFrame,
    ) -> Hresult {
        unsafe { sys::KCBCreateBodyIndexFrame(description, frame) }
    }

    unsafe fn release_body_index_frame(&self, frame: *mut *mut KcbBodyIndexFrame) -> Hresult {
        let hr = unsafe { sys::KCBReleaseBodyIndexFrame(frame) };
        report_release("KCBReleaseBodyIndexFrame", hr);
        hr
    }

    unsafe fn get_body_index_frame(
        &self,
        handle: KcbHandle,
        frame: *mut KcbBodyIndexFrame,
    ) -> Hresult {
        unsafe { sys::KCBGetBodyIndexFrame(handle, frame) }
    }

    unsafe fn create_color_frame(
        &self,
        format: ColorImageFormat,
        description: KcbFrameDescription,
        frame: *mut *mut KcbColorFrame,
    ) -> Hresult {
        unsafe { sys::KCBCreateColorFrame(format, description, frame) }
    }

    unsafe fn release_color_frame(&self, frame: *mut *mut KcbColorFrame) -> Hresult {
        let hr = unsafe { sys::KCBReleaseColorFrame(frame) };
        report_release("KCBReleaseColorFrame", hr);
        hr
    }

    unsafe fn get_color_frame(&self, handle: KcbHandle, frame: *mut KcbColorFrame) -> Hresult {
        unsafe { sys::KCBGetColorFrame(handle, frame) }
    }

    unsafe fn create_depth16_frame(
        &self,
        source: Depth16Source,
        description: KcbFrameDescription,
        frame: *mut *mut KcbDepthFrame,
    ) -> Hresult {
        unsafe {
            match source {
                Depth16Source::Depth => sys::KCBCreateDepthFrame(description, frame),
                Depth16Source::Infrared => sys::KCBCreateInfraredFrame(description, frame),
                Depth16Source::LongExposureInfrared => {
                    sys::KCBCreateLongExposureInfraredFrame(description, frame)
                }
            }
        }
    }

    unsafe fn release_depth16_frame(
        &self,
        source: Depth16Source,
        frame: *mut *mut KcbDepthFrame,
    ) -> Hresult {
        let (operation, hr) = unsafe {
            match source {
                Depth16Source::Depth => ("KCBReleaseDepthFrame", sys::KCBReleaseDepthFrame(frame)),
                Depth16Source::Infrared => {
                    ("KCBReleaseInfraredFrame", sys::KCBReleaseInfraredFrame(frame))
                }
                Depth16Source::LongExposureInfrared => (
                    "KCBReleaseLongExposureInfraredFrame",
                    sys::KCBReleaseLongExposureInfraredFrame(frame),
                ),
            }
        };
        report_release(operation, hr);
        hr
    }

    unsafe fn get_depth16_frame(
        &self,
        source: Depth16Source,
        handle: KcbHandle,
        frame: *mut KcbDepthFrame,
    ) -> Hresult {
        unsafe {
            match source {
                Depth16Source::Depth => sys::KCBGetDepthFrame(handle, frame),
                Depth16Source::Infrared => sys::KCBGetInfraredFrame(handle, frame),
                Depth16Source::LongExposureInfrared => {
                    sys::KCBGetLongExposureInfraredFrame(handle, frame)
                }
            }
        }
    }

    unsafe fn get_audio_frame(&self, handle: KcbHandle, frame: *mut KcbAudioFrame) -> Hresult {
        unsafe { sys::KCBGetAudioFrame(handle, frame) }
    }

    fn is_frame_ready(&self, handle: KcbHandle, source: FrameSourceTypes) -> bool {
        unsafe { sys::KCBIsFrameReady(handle, source) }
    }

    fn any_frame_ready(&self, handle: KcbHandle) -> bool {
        unsafe { sys::KCBAnyFrameReady(handle) }
    }

    fn all_frames_ready(&self, handle: KcbHandle) -> bool {
        unsafe { sys::KCBAllFramesReady(handle) }
    }

    fn map_camera_point_to_depth_space(
        &self,
        handle: KcbHandle,
        camera_point: CameraSpacePoint,
        depth_point: &mut DepthSpacePoint,
    ) -> Hresult {
        unsafe { sys::KCBMapCameraPointToDepthSpace(handle, camera_point, depth_point) }
    }

    fn map_camera_point_to_color_space(
        &self,
        handle: KcbHandle,
        camera_point: CameraSpacePoint,
        color_point: &mut ColorSpacePoint,
    ) -> Hresult {
        unsafe { sys::KCBMapCameraPointToColorSpace(handle, camera_point, color_point) }
    }

    fn map_depth_point_to_camera_space(
        &self,
        handle: KcbHandle,
        depth_point: DepthSpacePoint,
        depth: u16,
        camera_point: &mut CameraSpacePoint,
    ) -> Hresult {
        unsafe { sys::KCBMapDepthPointToCameraSpace(handle, depth_point, depth, camera_point) }
    }

    fn map_depth_frame_to_camera_space(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        camera_points: &mut [CameraSpacePoint],
    ) -> Hresult {
        let Some((depth_count, point_count)) = counts(depth_frame.len(), camera_points.len()) else {
            return ffi::E_INVALIDARG;
        };
        unsafe {
            sys::KCBMapDepthFrameToCameraSpace(
                handle,
                depth_count,
                depth_frame.as_ptr(),
                point_count,
                camera_points.as_mut_ptr(),
            )
        }
    }

    fn map_depth_point_to_color_space(
        &self,
        handle: KcbHandle,
        depth_point: DepthSpacePoint,
        depth: u16,
        color_point: &mut ColorSpacePoint,
    ) -> Hresult {
        unsafe { sys::KCBMapDepthPointToColorSpace(handle, depth_point, depth, color_point) }
    }

    fn map_camera_points_to_depth_space(
        &self,
        handle: KcbHandle,
        camera_points: &[CameraSpacePoint],
        depth_points: &mut [DepthSpacePoint],
    ) -> Hresult {
        let Some((in_count, out_count)) = counts(camera_points.len(), depth_points.len()) else {
            return ffi::E_INVALIDARG;
        };
        unsafe {
            sys::KCBMapCameraPointsToDepthSpace(
                handle,
                in_count,
                camera_points.as_ptr(),
                out_count,
                depth_points.as_mut_ptr(),
            )
        }
    }

    fn map_camera_points_to_color_space(
        &self,
        handle: KcbHandle,
        camera_points: &[CameraSpacePoint],
        color_points: &mut [ColorSpacePoint],
    ) -> Hresult {
        let Some((in_count, out_count)) = counts(camera_points.len(), color_points.len()) else {
            return ffi::E_INVALIDARG;
        };
        unsafe {
            sys::KCBMapCameraPointsToColorSpace(
                handle,
                in_count,
                camera_points.as_ptr(),
                out_count,
                color_points.as_mut_ptr(),
            )
        }
    }

    fn map_depth_points_to_camera_space(
        &self,
        handle: KcbHandle,
        depth_points: &[DepthSpacePoint],
        depths: &[u16],
        camera_points: &mut [CameraSpacePoint],
    ) -> Hresult {
        let (Some((in_count, out_count)), Ok(depth_count)) = (
            counts(depth_points.len(), camera_points.len()),
            c_uint::try_from(depths.len()),
        ) else {
            return ffi::E_INVALIDARG;
        };
        unsafe {
            sys::KCBMapDepthPointsToCameraSpace(
                handle,
                in_count,
                depth_points.as_ptr(),
                depth_count,
                depths.as_ptr(),
                out_count,
                camera_points.as_mut_ptr(),
            )
        }
    }

    fn map_depth_points_to_color_space(
        &self,
        handle: KcbHandle,
        depth_points: &[DepthSpacePoint],
        depths: &[u16],
        color_points: &mut [ColorSpacePoint],
    ) -> Hresult {
        let (Some((in_count, out_count)), Ok(depth_count)) = (
            counts(depth_points.len(), color_points.len()),
            c_uint::try_from(depths.len()),
        ) else {
            return ffi::E_INVALIDARG;
        };
        unsafe {
            sys::KCBMapDepthPointsToColorSpace(
                handle,
                in_count,
                depth_points.as_ptr(),
                depth_count,
                depths.as_ptr(),
                out_count,
                color_points.as_mut_ptr(),
            )
        }
    }

    fn map_depth_frame_to_color_space(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        color_points: &mut [ColorSpacePoint],
    ) -> Hresult {
        let Some((in_count, out_count)) = counts(depth_frame.len(), color_points.len()) else {
            return ffi::E_INVALIDARG;
        };
        unsafe {
            sys::KCBMapDepthFrameToColorSpace(
                handle,
                in_count,
                depth_frame.as_ptr(),
                out_count,
                color_points.as_mut_ptr(),
            )
        }
    }

    fn map_color_frame_to_depth_space(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        depth_points: &mut [DepthSpacePoint],
    ) -> Hresult {
        let Some((in_count, out_count)) = counts(depth_frame.len(), depth_points.len()) else {
            return ffi::E_INVALIDARG;
        };
        unsafe {
            sys::KCBMapColorFrameToDepthSpace(
                handle,
                in_count,
                depth_frame.as_ptr(),
                out_count,
                depth_points.as_mut_ptr(),
            )
        }
    }

    fn map_color_frame_to_camera_space(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        camera_points: &mut [CameraSpacePoint],
    ) -> Hresult {
        let Some((in_count, out_count)) = counts(depth_frame.len(), camera_points.len()) else {
            return ffi::E_INVALIDARG;
        };
        unsafe {
            sys::KCBMapColorFrameToCameraSpace(
                handle,
                in_count,
                depth_frame.as_ptr(),
                out_count,
                camera_points.as_mut_ptr(),
            )
        }
    }

    fn depth_frame_to_camera_space_table(
        &self,
        handle: KcbHandle,
        table: &mut Vec<PointF>,
    ) -> Hresult {
        table.clear();
        let mut count: c_uint = 0;
        let mut entries: *mut PointF = std::ptr::null_mut();
        let hr = unsafe { sys::GetDepthFrameToCameraSpaceTable(handle, &mut count, &mut entries) };
        if entries.is_null() {
            return if ffi::succeeded(hr) { ffi::E_POINTER } else { hr };
        }
        if ffi::succeeded(hr) {
            // The mapper owns the allocation; copy out before freeing it
            let entries_slice = unsafe { std::slice::from_raw_parts(entries, count as usize) };
            table.extend_from_slice(entries_slice);
        }
        unsafe { sys::CoTaskMemFree(entries.cast()) };
        hr
    }

    unsafe fn get_all_frame_data(
        &self,
        handle: KcbHandle,
        body_index: *mut KcbBodyIndexFrame,
        color: *mut KcbColorFrame,
        depth: *mut KcbDepthFrame,
        infrared: *mut KcbDepthFrame,
        long_exposure_infrared: *mut KcbDepthFrame,
    ) -> Hresult {
        unsafe {
            sys::KCBGetAllFrameData(
                handle,
                std::ptr::null_mut(),
                body_index,
                color,
                depth,
                infrared,
                long_exposure_infrared,
            )
        }
    }
}

/// Element counts of an input and an output slice as native `UINT`s
fn counts(input: usize, output: usize) -> Option<(c_uint, c_uint)> {
    Some((c_uint::try_from(input).ok()?, c_uint::try_from(output).ok()?))
}

/// The shipped release functions test their argument backwards: any live
/// frame is answered with `E_INVALIDARG` and left allocated.
fn report_release(operation: &'static str, hr: Hresult) {
    if ffi::failed(hr) {
        warn!(
            operation,
            hr = %crate::errors::DisplayHresult(hr),
            "Native release refused the frame, buffer leaked"
        );
    }
}
