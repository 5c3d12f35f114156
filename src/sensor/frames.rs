// SPDX-License-Identifier: GPL-3.0-only

//! Frame objects and the views they lend
//!
//! Image frames are allocated by the native library, sized from a frame
//! description. [`Frame`] owns one such allocation and releases it on drop.
//! Its buffer is only reachable through a [`BufferView`], which borrows the
//! frame: the next acquisition needs `&mut Frame`, so it cannot run while a
//! view is alive.
//!
//! Every successful acquisition bumps the frame's generation. Views carry the
//! generation they were taken at, for consumers that cannot rely on the
//! borrow checker (the Python module checks it before every access).

use crate::backends::KinectBridge;
use crate::errors::{DisplayHresult, SensorError, SensorResult, check};
use crate::ffi::{
    self, Hresult, KcbBodyIndexFrame, KcbColorFrame, KcbDepthFrame, KcbFrameDescription,
    KcbHandle, WaveFormatEx,
};
use crate::sensor::types::{ColorFormat, Depth16Source, FrameSource, SensorHandle};
use bytemuck::Pod;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::{debug, warn};

/// Geometry snapshot of an image source
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameDescription(KcbFrameDescription);

impl FrameDescription {
    pub fn width(&self) -> i32 {
        self.0.width
    }

    pub fn height(&self) -> i32 {
        self.0.height
    }

    /// Horizontal field of view in degrees
    pub fn horizontal_field_of_view(&self) -> f32 {
        self.0.horizontal_field_of_view
    }

    /// Vertical field of view in degrees
    pub fn vertical_field_of_view(&self) -> f32 {
        self.0.vertical_field_of_view
    }

    /// Diagonal field of view in degrees
    pub fn diagonal_field_of_view(&self) -> f32 {
        self.0.diagonal_field_of_view
    }

    pub fn length_in_pixels(&self) -> u32 {
        self.0.length_in_pixels
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.0.bytes_per_pixel
    }

    pub fn raw(&self) -> &KcbFrameDescription {
        &self.0
    }
}

impl From<KcbFrameDescription> for FrameDescription {
    fn from(raw: KcbFrameDescription) -> Self {
        FrameDescription(raw)
    }
}

impl std::fmt::Display for FrameDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} ({} px, {} B/px), FOV {:.1}°x{:.1}° (diag {:.1}°)",
            self.width(),
            self.height(),
            self.length_in_pixels(),
            self.bytes_per_pixel(),
            self.horizontal_field_of_view(),
            self.vertical_field_of_view(),
            self.diagonal_field_of_view()
        )
    }
}

/// Audio stream format (`WAVEFORMATEX`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn is_ieee_float(&self) -> bool {
        self.format_tag == ffi::WAVE_FORMAT_IEEE_FLOAT
    }
}

impl From<WaveFormatEx> for AudioFormat {
    fn from(raw: WaveFormatEx) -> Self {
        // Packed fields are copied out by value
        Self {
            format_tag: raw.format_tag,
            channels: raw.channels,
            samples_per_sec: raw.samples_per_sec,
            avg_bytes_per_sec: raw.avg_bytes_per_sec,
            block_align: raw.block_align,
            bits_per_sample: raw.bits_per_sample,
        }
    }
}

mod private {
    pub trait Sealed {}
}

/// A source with a native frame buffer
///
/// Implemented for the five image sources only. The unsafe methods are the
/// raw create/release/get triple of the source and are not meant to be
/// called directly; use [`crate::sensor::Sensor::create_frame`] and
/// [`crate::sensor::Sensor::acquire`].
pub trait FrameKind: private::Sealed {
    /// Native frame struct
    type Raw;
    /// Buffer element (one per pixel, or one per byte for color)
    type Element: Pod;

    const CREATE_OPERATION: &'static str;
    const GET_OPERATION: &'static str;

    fn source(&self) -> FrameSource;

    #[doc(hidden)]
    unsafe fn create(
        &self,
        bridge: &dyn KinectBridge,
        description: KcbFrameDescription,
        frame: *mut *mut Self::Raw,
    ) -> Hresult;

    #[doc(hidden)]
    unsafe fn release(&self, bridge: &dyn KinectBridge, frame: *mut *mut Self::Raw) -> Hresult;

    #[doc(hidden)]
    unsafe fn get(&self, bridge: &dyn KinectBridge, handle: KcbHandle, frame: *mut Self::Raw)
    -> Hresult;

    /// Buffer pointer, element count and timestamp of a native frame
    #[doc(hidden)]
    fn parts(raw: &Self::Raw) -> (*const Self::Element, u32, i64);
}

/// Body index source: one byte per depth pixel, `0..=5` or `0xFF`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BodyIndex;

impl private::Sealed for BodyIndex {}

impl FrameKind for BodyIndex {
    type Raw = KcbBodyIndexFrame;
    type Element = u8;

    const CREATE_OPERATION: &'static str = "KCBCreateBodyIndexFrame";
    const GET_OPERATION: &'static str = "KCBGetBodyIndexFrame";

    fn source(&self) -> FrameSource {
        FrameSource::BodyIndex
    }

    unsafe fn create(
        &self,
        bridge: &dyn KinectBridge,
        description: KcbFrameDescription,
        frame: *mut *mut KcbBodyIndexFrame,
    ) -> Hresult {
        unsafe { bridge.create_body_index_frame(description, frame) }
    }

    unsafe fn release(
        &self,
        bridge: &dyn KinectBridge,
        frame: *mut *mut KcbBodyIndexFrame,
    ) -> Hresult {
        unsafe { bridge.release_body_index_frame(frame) }
    }

    unsafe fn get(
        &self,
        bridge: &dyn KinectBridge,
        handle: KcbHandle,
        frame: *mut KcbBodyIndexFrame,
    ) -> Hresult {
        unsafe { bridge.get_body_index_frame(handle, frame) }
    }

    fn parts(raw: &KcbBodyIndexFrame) -> (*const u8, u32, i64) {
        (raw.buffer.cast_const(), raw.size, raw.time_stamp)
    }
}

/// Color source in a fixed pixel format; elements are bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Color(pub ColorFormat);

impl private::Sealed for Color {}

impl FrameKind for Color {
    type Raw = KcbColorFrame;
    type Element = u8;

    const CREATE_OPERATION: &'static str = "KCBCreateColorFrame";
    const GET_OPERATION: &'static str = "KCBGetColorFrame";

    fn source(&self) -> FrameSource {
        FrameSource::Color(self.0)
    }

    unsafe fn create(
        &self,
        bridge: &dyn KinectBridge,
        description: KcbFrameDescription,
        frame: *mut *mut KcbColorFrame,
    ) -> Hresult {
        unsafe { bridge.create_color_frame(self.0.raw(), description, frame) }
    }

    unsafe fn release(&self, bridge: &dyn KinectBridge, frame: *mut *mut KcbColorFrame) -> Hresult {
        unsafe { bridge.release_color_frame(frame) }
    }

    unsafe fn get(
        &self,
        bridge: &dyn KinectBridge,
        handle: KcbHandle,
        frame: *mut KcbColorFrame,
    ) -> Hresult {
        unsafe { bridge.get_color_frame(handle, frame) }
    }

    fn parts(raw: &KcbColorFrame) -> (*const u8, u32, i64) {
        (raw.buffer.cast_const(), raw.size, raw.time_stamp)
    }
}

macro_rules! depth16_kind {
    ($(#[$doc:meta])* $name:ident, $source:ident, $create:literal, $get:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl private::Sealed for $name {}

        impl FrameKind for $name {
            type Raw = KcbDepthFrame;
            type Element = u16;

            const CREATE_OPERATION: &'static str = $create;
            const GET_OPERATION: &'static str = $get;

            fn source(&self) -> FrameSource {
                Depth16Source::$source.frame_source()
            }

            unsafe fn create(
                &self,
                bridge: &dyn KinectBridge,
                description: KcbFrameDescription,
                frame: *mut *mut KcbDepthFrame,
            ) -> Hresult {
                unsafe { bridge.create_depth16_frame(Depth16Source::$source, description, frame) }
            }

            unsafe fn release(
                &self,
                bridge: &dyn KinectBridge,
                frame: *mut *mut KcbDepthFrame,
            ) -> Hresult {
                unsafe { bridge.release_depth16_frame(Depth16Source::$source, frame) }
            }

            unsafe fn get(
                &self,
                bridge: &dyn KinectBridge,
                handle: KcbHandle,
                frame: *mut KcbDepthFrame,
            ) -> Hresult {
                unsafe { bridge.get_depth16_frame(Depth16Source::$source, handle, frame) }
            }

            fn parts(raw: &KcbDepthFrame) -> (*const u16, u32, i64) {
                (raw.buffer.cast_const(), raw.size, raw.time_stamp)
            }
        }
    };
}

depth16_kind!(
    /// Depth source: millimetres per pixel, 0 where no reading
    Depth,
    Depth,
    "KCBCreateDepthFrame",
    "KCBGetDepthFrame"
);
depth16_kind!(
    /// Active infrared source: 16-bit intensity per pixel
    Infrared,
    Infrared,
    "KCBCreateInfraredFrame",
    "KCBGetInfraredFrame"
);
depth16_kind!(
    /// Long exposure infrared source: 16-bit intensity per pixel
    LongExposureInfrared,
    LongExposureInfrared,
    "KCBCreateLongExposureInfraredFrame",
    "KCBGetLongExposureInfraredFrame"
);

/// A natively allocated frame of one source
pub struct Frame<K: FrameKind> {
    bridge: Arc<dyn KinectBridge>,
    kind: K,
    raw: NonNull<K::Raw>,
    generation: u64,
}

impl<K: FrameKind> Frame<K> {
    /// Allocate through `bridge`, sized from `description`
    pub fn create(
        bridge: Arc<dyn KinectBridge>,
        kind: K,
        description: &FrameDescription,
    ) -> SensorResult<Self> {
        let mut raw: *mut K::Raw = std::ptr::null_mut();
        let hr = unsafe { kind.create(bridge.as_ref(), *description.raw(), &mut raw) };
        check(K::CREATE_OPERATION, hr)?;
        let raw = NonNull::new(raw)
            .ok_or_else(|| SensorError::failed(K::CREATE_OPERATION, ffi::E_POINTER))?;

        let frame = Self {
            bridge,
            kind,
            raw,
            generation: 0,
        };
        let (buffer, size, _) = frame.parts();
        if buffer.is_null() && size > 0 {
            // Allocation failed on the native side; dropping releases the struct
            return Err(SensorError::failed(K::CREATE_OPERATION, ffi::E_OUTOFMEMORY));
        }
        debug!(source = %frame.kind.source(), size, "Created frame");
        Ok(frame)
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Number of successful acquisitions so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when a view taken at `generation` still shows the current data
    pub fn is_current(&self, generation: u64) -> bool {
        generation != 0 && generation == self.generation
    }

    /// Buffer length in elements, as reported by the native frame
    pub fn size(&self) -> usize {
        self.parts().1 as usize
    }

    /// Relative time of the last acquisition, in 100 ns ticks
    pub fn timestamp(&self) -> i64 {
        self.parts().2
    }

    /// View of the buffer, `None` until the first successful acquisition
    ///
    /// Native buffers are not initialised at creation.
    pub fn buffer(&self) -> Option<BufferView<'_, K::Element>> {
        if self.generation == 0 {
            return None;
        }
        let (buffer, size, _) = self.parts();
        let data: &[K::Element] = if size == 0 {
            &[]
        } else {
            // The native frame owns `size` elements at `buffer` until release,
            // and `&self` rules out a concurrent acquisition.
            unsafe { std::slice::from_raw_parts(buffer, size as usize) }
        };
        Some(BufferView {
            data,
            generation: self.generation,
        })
    }

    /// Fill the frame from `handle`
    ///
    /// Fails with `E_INVALIDARG` when the handle was issued by a different
    /// bridge than the one that created this frame.
    pub(crate) fn acquire_from(
        &mut self,
        bridge: &Arc<dyn KinectBridge>,
        handle: SensorHandle,
    ) -> SensorResult<()> {
        if !same_bridge(&self.bridge, bridge) {
            return Err(SensorError::failed(K::GET_OPERATION, ffi::E_INVALIDARG));
        }
        self.acquire(handle)
    }

    /// Native frame pointer for a call through `bridge`
    ///
    /// Fails with `E_INVALIDARG` under `operation` when `bridge` did not
    /// create this frame.
    pub(crate) fn raw_for(
        &mut self,
        bridge: &Arc<dyn KinectBridge>,
        operation: &'static str,
    ) -> SensorResult<*mut K::Raw> {
        if !same_bridge(&self.bridge, bridge) {
            return Err(SensorError::failed(operation, ffi::E_INVALIDARG));
        }
        Ok(self.raw.as_ptr())
    }

    /// Record a successful fill made outside [`Frame::acquire_from`]
    pub(crate) fn mark_acquired(&mut self) {
        self.generation += 1;
    }

    fn acquire(&mut self, handle: SensorHandle) -> SensorResult<()> {
        let hr = unsafe {
            self.kind
                .get(self.bridge.as_ref(), handle.raw(), self.raw.as_ptr())
        };
        check(K::GET_OPERATION, hr)?;
        self.generation += 1;
        Ok(())
    }

    fn parts(&self) -> (*const K::Element, u32, i64) {
        K::parts(unsafe { self.raw.as_ref() })
    }
}

impl<K: FrameKind> Drop for Frame<K> {
    fn drop(&mut self) {
        let mut raw = self.raw.as_ptr();
        let hr = unsafe { self.kind.release(self.bridge.as_ref(), &mut raw) };
        if ffi::failed(hr) {
            debug!(source = %self.kind.source(), hr = %DisplayHresult(hr), "Frame release failed");
        }
    }
}

impl<K: FrameKind + std::fmt::Debug> std::fmt::Debug for Frame<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind)
            .field("size", &self.size())
            .field("generation", &self.generation)
            .field("timestamp", &self.timestamp())
            .finish()
    }
}

fn same_bridge(a: &Arc<dyn KinectBridge>, b: &Arc<dyn KinectBridge>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Frames to fill together with [`crate::sensor::Sensor::acquire_all`]
///
/// Sources left as `None` are not requested. Either every requested frame
/// receives data from the same instant or none of them changes.
#[derive(Debug, Default)]
pub struct FrameSet<'a> {
    pub body_index: Option<&'a mut Frame<BodyIndex>>,
    pub color: Option<&'a mut Frame<Color>>,
    pub depth: Option<&'a mut Frame<Depth>>,
    pub infrared: Option<&'a mut Frame<Infrared>>,
    pub long_exposure_infrared: Option<&'a mut Frame<LongExposureInfrared>>,
}

impl FrameSet<'_> {
    pub fn is_empty(&self) -> bool {
        self.body_index.is_none()
            && self.color.is_none()
            && self.depth.is_none()
            && self.infrared.is_none()
            && self.long_exposure_infrared.is_none()
    }
}

/// Read-only window onto a frame buffer
///
/// Bounded by the frame's size field and valid until the next acquisition on
/// the same frame, which the borrow enforces.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a, T> {
    data: &'a [T],
    generation: u64,
}

impl<'a, T: Pod> BufferView<'a, T> {
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// The same memory as bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.data)
    }

    /// Acquisition this view was taken at
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<T> std::ops::Deref for BufferView<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data
    }
}

/// Caller-owned scratch buffer for audio reads
///
/// The buffer is lent to the native call for its duration only; afterwards
/// [`AudioFrame::data`] exposes the bytes that were actually written.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    samples: Box<[f32]>,
    bytes_read: usize,
    beam_angle: f32,
    beam_angle_confidence: f32,
    generation: u64,
}

impl AudioFrame {
    /// Scratch buffer of at least `bytes` bytes, rounded up to whole samples
    pub fn with_capacity(bytes: u32) -> Self {
        let count = bytes.div_ceil(crate::constants::AUDIO_BYTES_PER_SAMPLE) as usize;
        Self {
            samples: vec![0.0; count].into_boxed_slice(),
            bytes_read: 0,
            beam_angle: 0.0,
            beam_angle_confidence: 0.0,
            generation: 0,
        }
    }

    /// Scratch size in bytes
    pub fn capacity(&self) -> usize {
        std::mem::size_of_val(&*self.samples)
    }

    /// Bytes written by the last successful read
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Raw IEEE float bytes of the last read
    pub fn data(&self) -> &[u8] {
        &bytemuck::cast_slice::<f32, u8>(&self.samples)[..self.bytes_read]
    }

    /// Samples of the last read
    pub fn samples(&self) -> &[f32] {
        &self.samples[..self.bytes_read / std::mem::size_of::<f32>()]
    }

    /// Beam angle in radians
    pub fn beam_angle(&self) -> f32 {
        self.beam_angle
    }

    /// Beam angle confidence, 0 to 1
    pub fn beam_angle_confidence(&self) -> f32 {
        self.beam_angle_confidence
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn read(&mut self, bridge: &dyn KinectBridge, handle: SensorHandle) -> SensorResult<()> {
        let capacity = self.capacity();
        let mut raw = ffi::KcbAudioFrame {
            audio_buffer_size: u32::try_from(capacity).unwrap_or(u32::MAX),
            audio_buffer: self.samples.as_mut_ptr().cast::<u8>(),
            bytes_read: 0,
            beam_angle: 0.0,
            beam_angle_confidence: 0.0,
        };
        let hr = unsafe { bridge.get_audio_frame(handle.raw(), &mut raw) };
        if let Err(err) = check("KCBGetAudioFrame", hr) {
            // The buffer may have been partly overwritten
            self.bytes_read = 0;
            return Err(err);
        }

        let reported = raw.bytes_read as usize;
        if reported > capacity {
            warn!(reported, capacity, "Audio read reported more bytes than lent");
        }
        self.bytes_read = reported.min(capacity);
        self.beam_angle = raw.beam_angle;
        self.beam_angle_confidence = raw.beam_angle_confidence;
        self.generation += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_capacity_rounds_up() {
        let frame = AudioFrame::with_capacity(10);
        assert_eq!(frame.capacity(), 12);
        assert!(frame.data().is_empty());
        assert!(frame.samples().is_empty());
    }

    #[test]
    fn test_audio_format_from_packed() {
        let raw = WaveFormatEx {
            format_tag: ffi::WAVE_FORMAT_IEEE_FLOAT,
            channels: 1,
            samples_per_sec: 16_000,
            avg_bytes_per_sec: 64_000,
            block_align: 4,
            bits_per_sample: 32,
            cb_size: 0,
        };
        let format = AudioFormat::from(raw);
        assert!(format.is_ieee_float());
        assert_eq!(format.samples_per_sec, 16_000);
        assert_eq!(format.bits_per_sample, 32);
    }

    #[test]
    fn test_description_accessors() {
        let description = FrameDescription::from(KcbFrameDescription {
            width: 512,
            height: 424,
            horizontal_field_of_view: 70.6,
            vertical_field_of_view: 60.0,
            diagonal_field_of_view: 89.5,
            length_in_pixels: 512 * 424,
            bytes_per_pixel: 2,
        });
        assert_eq!(description.width(), 512);
        assert_eq!(description.length_in_pixels(), 217_088);
        assert_eq!(description.bytes_per_pixel(), 2);
        assert!(description.to_string().starts_with("512x424"));
    }

    #[test]
    fn test_kind_sources() {
        assert_eq!(BodyIndex.source(), FrameSource::BodyIndex);
        assert_eq!(Depth.source(), FrameSource::Depth);
        assert_eq!(
            Color(ColorFormat::Rgba).source(),
            FrameSource::Color(ColorFormat::Rgba)
        );
        assert_eq!(LongExposureInfrared.source(), FrameSource::LongExposureInfrared);
    }
}
