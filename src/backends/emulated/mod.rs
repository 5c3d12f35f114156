// SPDX-License-Identifier: GPL-3.0-only

//! In-process stand-in for the KCBv2 library
//!
//! Reproduces the library's observable contract without hardware: handle
//! issue and close semantics, frame buffer allocation sized from a frame
//! description, `E_PENDING` pacing, and coordinate mapping. Frames carry a
//! synthetic [`scene::Scene`].
//!
//! Two behaviours deliberately differ from the shipped library:
//! - release functions free the frame and return `S_OK` instead of refusing
//!   every non-null frame
//! - frame pointers are checked against the frames this bridge created, so a
//!   foreign or already released pointer is answered with `E_INVALIDARG`
//!   instead of undefined behaviour
//!
//! Buffers are capped at the size of the modeled sensor's largest frame; a
//! description asking for more is answered with `E_OUTOFMEMORY`.

pub mod scene;

use super::{BridgeType, KinectBridge};
use crate::constants::*;
use crate::ffi::{
    self, CameraSpacePoint, ColorImageFormat, ColorSpacePoint, DepthSpacePoint, FrameSourceTypes,
    Hresult, KcbAudioFrame, KcbBodyIndexFrame, KcbColorFrame, KcbDepthFrame, KcbFrameDescription,
    KcbHandle, PointF, WaveFormatEx,
};
use crate::sensor::types::{Depth16Source, FrameSource, SourceKind};
use bytemuck::Zeroable;
use scene::{Scene, UNMAPPED_CAMERA_POINT, UNMAPPED_DEPTH_POINT};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a second open does while another handle is still live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SecondOpenPolicy {
    /// Issue another distinct handle (the shipped library's behaviour)
    #[default]
    NewHandle,
    /// Return the invalid sentinel until every handle is closed
    Refuse,
}

/// Emulator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Whether a sensor is plugged in
    pub sensor_attached: bool,
    /// Number of opens that fail before the sensor appears
    pub attach_after_attempts: u32,
    /// Outcome of an open while another handle is live
    pub second_open: SecondOpenPolicy,
    /// Frames per second per source; `None` delivers a new frame on every call
    pub frame_rate: Option<u32>,
    /// Number of people standing in the synthetic scene
    pub tracked_bodies: u8,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            sensor_attached: true,
            attach_after_attempts: 0,
            second_open: SecondOpenPolicy::default(),
            frame_rate: None,
            tracked_bodies: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameLayout {
    BodyIndex,
    Color,
    Depth16(Depth16Source),
}

impl FrameLayout {
    /// Largest buffer, in elements, a frame of this layout can need
    fn capacity(self) -> usize {
        match self {
            FrameLayout::BodyIndex | FrameLayout::Depth16(_) => DEPTH_PIXELS,
            FrameLayout::Color => COLOR_PIXELS * MAX_COLOR_BYTES_PER_PIXEL,
        }
    }
}

const DEPTH_PIXELS: usize = (DEPTH_WIDTH * DEPTH_HEIGHT) as usize;
const COLOR_PIXELS: usize = (COLOR_WIDTH * COLOR_HEIGHT) as usize;
const MAX_COLOR_BYTES_PER_PIXEL: usize = 4;

/// A frame handed out by `create_*`, keyed by the frame struct's address
#[derive(Debug, Clone, Copy)]
struct Allocation {
    layout: FrameLayout,
    buffer: usize,
    len: usize,
}

#[derive(Debug, Default)]
struct SourceClock {
    delivered: u64,
    last_delivery: Option<Instant>,
}

#[derive(Debug, Default)]
struct Session {
    /// Sources touched through this handle, as a reader opened on first use
    active: HashSet<SourceKind>,
    clocks: HashMap<SourceKind, SourceClock>,
    audio_position: u64,
}

#[derive(Debug)]
struct EmulatorState {
    config: EmulatorConfig,
    scene: Scene,
    /// `None` once the handle space is used up
    next_handle: Option<KcbHandle>,
    open_attempts: u32,
    sessions: HashMap<KcbHandle, Session>,
    frames: HashMap<usize, Allocation>,
}

impl EmulatorState {
    fn frame_interval(&self) -> Option<Duration> {
        self.config
            .frame_rate
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)))
    }

    fn ready(&self, session: &Session, kind: SourceKind) -> bool {
        if !self.config.sensor_attached || kind == SourceKind::Body {
            return false;
        }
        let Some(interval) = self.frame_interval() else {
            return true;
        };
        match session.clocks.get(&kind).and_then(|c| c.last_delivery) {
            Some(last) => last.elapsed() >= interval,
            None => true,
        }
    }

    /// Validate the handle, mark the source active and advance its clock
    ///
    /// Returns the frame number to render.
    fn next_frame(&mut self, handle: KcbHandle, kind: SourceKind) -> Result<u64, Hresult> {
        self.next_frames(handle, &[kind])
    }

    /// [`EmulatorState::next_frame`] for several sources at once
    ///
    /// Either every clock advances or none does. The shared frame number is
    /// the furthest along of the sources.
    fn next_frames(&mut self, handle: KcbHandle, kinds: &[SourceKind]) -> Result<u64, Hresult> {
        if handle == ffi::KCB_INVALID_HANDLE {
            return Err(ffi::E_INVALIDARG);
        }
        let ready = match self.sessions.get(&handle) {
            Some(session) => kinds.iter().all(|&kind| self.ready(session, kind)),
            None => return Err(ffi::E_NOINTERFACE),
        };
        let session = self
            .sessions
            .get_mut(&handle)
            .ok_or(ffi::E_NOINTERFACE)?;
        session.active.extend(kinds.iter().copied());
        if !ready {
            return Err(ffi::E_PENDING);
        }
        let now = Instant::now();
        let mut frame = 0;
        for &kind in kinds {
            let clock = session.clocks.entry(kind).or_default();
            frame = frame.max(clock.delivered);
            clock.delivered += 1;
            clock.last_delivery = Some(now);
        }
        Ok(frame)
    }

    fn allocation(&self, frame: usize, layout: FrameLayout) -> Option<Allocation> {
        self.frames
            .get(&frame)
            .copied()
            .filter(|allocation| allocation.layout == layout)
    }
}

/// A caller frame that passed the ownership and size checks
#[derive(Debug, Clone, Copy)]
enum Target {
    BodyIndex {
        frame: *mut KcbBodyIndexFrame,
        len: usize,
    },
    Color {
        frame: *mut KcbColorFrame,
        format: ColorImageFormat,
        len: usize,
    },
    Depth16 {
        frame: *mut KcbDepthFrame,
        source: Depth16Source,
        len: usize,
    },
}

impl Target {
    /// # Safety
    /// `frame` must be non-null and valid for reads.
    unsafe fn body_index(
        state: &EmulatorState,
        frame: *mut KcbBodyIndexFrame,
    ) -> Result<Self, Hresult> {
        let (buffer, size) = unsafe { ((*frame).buffer, (*frame).size as usize) };
        let len = writable(state, frame as usize, FrameLayout::BodyIndex, buffer as usize, size)?;
        Ok(Target::BodyIndex { frame, len })
    }

    /// # Safety
    /// `frame` must be non-null and valid for reads.
    unsafe fn color(state: &EmulatorState, frame: *mut KcbColorFrame) -> Result<Self, Hresult> {
        let (format, buffer, size) =
            unsafe { ((*frame).format, (*frame).buffer, (*frame).size as usize) };
        if format == ffi::COLOR_IMAGE_FORMAT_NONE {
            return Err(ffi::E_INVALIDARG);
        }
        let len = writable(state, frame as usize, FrameLayout::Color, buffer as usize, size)?;
        Ok(Target::Color { frame, format, len })
    }

    /// # Safety
    /// `frame` must be non-null and valid for reads.
    unsafe fn depth16(
        state: &EmulatorState,
        source: Depth16Source,
        frame: *mut KcbDepthFrame,
    ) -> Result<Self, Hresult> {
        let (buffer, size) = unsafe { ((*frame).buffer, (*frame).size as usize) };
        let layout = FrameLayout::Depth16(source);
        let len = writable(state, frame as usize, layout, buffer as usize, size)?;
        Ok(Target::Depth16 { frame, source, len })
    }

    fn kind(&self) -> SourceKind {
        match self {
            Target::BodyIndex { .. } => SourceKind::BodyIndex,
            Target::Color { .. } => SourceKind::Color,
            Target::Depth16 { source, .. } => source.frame_source().kind(),
        }
    }

    /// Render frame `number` into the buffer and stamp it
    ///
    /// # Safety
    /// The frame must still be the live allocation that was checked.
    unsafe fn fill(&self, scene: &Scene, number: u64) {
        match *self {
            Target::BodyIndex { frame, len } => unsafe {
                let data = std::slice::from_raw_parts_mut((*frame).buffer, len);
                scene.fill_body_index(data, number);
                (*frame).time_stamp = timestamp(number);
            },
            Target::Color { frame, format, len } => unsafe {
                let data = std::slice::from_raw_parts_mut((*frame).buffer, len);
                scene.fill_color(format, data, number);
                (*frame).time_stamp = timestamp(number);
            },
            Target::Depth16 { frame, source, len } => unsafe {
                let data = std::slice::from_raw_parts_mut((*frame).buffer, len);
                match source {
                    Depth16Source::Depth => scene.fill_depth(data, number),
                    Depth16Source::Infrared => scene.fill_infrared(data, number, false),
                    Depth16Source::LongExposureInfrared => {
                        scene.fill_infrared(data, number, true)
                    }
                }
                (*frame).time_stamp = timestamp(number);
            },
        }
    }
}

/// Check a caller-held frame before writing into its buffer
///
/// The recorded length bounds the write even if the caller shrank `size`.
fn writable(
    state: &EmulatorState,
    frame: usize,
    layout: FrameLayout,
    buffer: usize,
    size: usize,
) -> Result<usize, Hresult> {
    if buffer == 0 {
        return Err(ffi::E_POINTER);
    }
    match state.allocation(frame, layout) {
        Some(allocation) if allocation.buffer == buffer && size <= allocation.len => Ok(size),
        _ => Err(ffi::E_INVALIDARG),
    }
}

/// Advance the clocks of every target together and fill them all
fn deliver(
    state: &mut EmulatorState,
    handle: KcbHandle,
    targets: &[Target],
) -> Result<(), Hresult> {
    let kinds: Vec<SourceKind> = targets.iter().map(Target::kind).collect();
    let number = state.next_frames(handle, &kinds)?;
    let scene = state.scene;
    for target in targets {
        unsafe { target.fill(&scene, number) };
    }
    Ok(())
}

fn status(result: Result<(), Hresult>) -> Hresult {
    result.err().unwrap_or(ffi::S_OK)
}

/// Emulated sensor bridge
pub struct EmulatedBridge {
    state: Mutex<EmulatorState>,
}

impl EmulatedBridge {
    pub fn new(config: EmulatorConfig) -> Self {
        info!(
            attached = config.sensor_attached,
            bodies = config.tracked_bodies,
            frame_rate = ?config.frame_rate,
            "Starting emulated sensor bridge"
        );
        Self {
            state: Mutex::new(EmulatorState {
                scene: Scene::new(config.tracked_bodies),
                config,
                next_handle: Some(ffi::KCB_DEFAULT_HANDLE),
                open_attempts: 0,
                sessions: HashMap::new(),
                frames: HashMap::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, EmulatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plug or unplug the emulated sensor
    ///
    /// Open handles survive an unplug, but no new frames arrive until the
    /// sensor is back.
    pub fn set_sensor_attached(&self, attached: bool) {
        info!(attached, "Emulated sensor attachment changed");
        self.state().config.sensor_attached = attached;
    }

    /// Number of `open_default_sensor` calls so far
    pub fn open_attempts(&self) -> u32 {
        self.state().open_attempts
    }

    /// Number of handles currently open
    pub fn open_handles(&self) -> usize {
        self.state().sessions.len()
    }

    /// Number of frames created and not yet released
    pub fn live_frames(&self) -> usize {
        self.state().frames.len()
    }

    fn description(source: FrameSource) -> KcbFrameDescription {
        let (width, height, h_fov, v_fov, d_fov) = match source {
            FrameSource::Color(_) => (
                COLOR_WIDTH,
                COLOR_HEIGHT,
                COLOR_HORIZONTAL_FOV,
                COLOR_VERTICAL_FOV,
                COLOR_DIAGONAL_FOV,
            ),
            _ => (
                DEPTH_WIDTH,
                DEPTH_HEIGHT,
                DEPTH_HORIZONTAL_FOV,
                DEPTH_VERTICAL_FOV,
                DEPTH_DIAGONAL_FOV,
            ),
        };
        let bytes_per_pixel = match source {
            FrameSource::Color(format) => color_bytes_per_pixel(format.raw()),
            FrameSource::BodyIndex => 1,
            FrameSource::Depth | FrameSource::Infrared | FrameSource::LongExposureInfrared => 2,
        };
        KcbFrameDescription {
            width,
            height,
            horizontal_field_of_view: h_fov,
            vertical_field_of_view: v_fov,
            diagonal_field_of_view: d_fov,
            length_in_pixels: (width * height) as u32,
            bytes_per_pixel,
        }
    }

    /// Allocate a zeroed frame buffer of `len` elements
    ///
    /// Fails with `E_OUTOFMEMORY` past the layout's capacity or when the
    /// allocator refuses.
    fn allocate<T: Zeroable + Clone>(
        layout: FrameLayout,
        len: usize,
    ) -> Result<Box<[T]>, Hresult> {
        if len > layout.capacity() {
            warn!(?layout, len, "Frame buffer larger than the sensor produces");
            return Err(ffi::E_OUTOFMEMORY);
        }
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(len)
            .map_err(|_| ffi::E_OUTOFMEMORY)?;
        buffer.resize(len, T::zeroed());
        Ok(buffer.into_boxed_slice())
    }

    /// Hand out a frame buffer and record it against its frame struct
    fn register<T>(
        state: &mut EmulatorState,
        frame: usize,
        layout: FrameLayout,
        buffer: Box<[T]>,
    ) -> *mut T {
        let len = buffer.len();
        let buffer = Box::into_raw(buffer) as *mut T;
        state.frames.insert(
            frame,
            Allocation {
                layout,
                buffer: buffer as usize,
                len,
            },
        );
        buffer
    }

    /// Free a frame struct and its buffer, using the recorded length
    ///
    /// # Safety
    /// `frame` must be an address recorded for `layout` whose struct type is
    /// `F` and whose buffer element type is `T`.
    unsafe fn unregister<F, T>(
        state: &mut EmulatorState,
        frame: *mut F,
        layout: FrameLayout,
    ) -> Hresult {
        let Some(allocation) = state.allocation(frame as usize, layout) else {
            warn!(?layout, "Release of a frame this bridge does not own");
            return ffi::E_INVALIDARG;
        };
        state.frames.remove(&(frame as usize));
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                allocation.buffer as *mut T,
                allocation.len,
            )));
            drop(Box::from_raw(frame));
        }
        ffi::S_OK
    }

    fn check_handle(&self, handle: KcbHandle) -> Result<(), Hresult> {
        if handle == ffi::KCB_INVALID_HANDLE {
            return Err(ffi::E_INVALIDARG);
        }
        if self.state().sessions.contains_key(&handle) {
            Ok(())
        } else {
            Err(ffi::E_NOINTERFACE)
        }
    }

    /// Map paired input and output slices one element at a time
    fn map_each<I: Copy, O>(
        &self,
        handle: KcbHandle,
        input: &[I],
        output: &mut [O],
        map: impl Fn(I) -> O,
    ) -> Hresult {
        if let Err(hr) = self.check_handle(handle) {
            return hr;
        }
        if input.len() != output.len() {
            return ffi::E_INVALIDARG;
        }
        for (point, out) in input.iter().zip(output.iter_mut()) {
            *out = map(*point);
        }
        ffi::S_OK
    }

    /// Walk every color pixel with the depth reading behind it
    fn map_color_frame<O>(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        output: &mut [O],
        map: impl Fn(Option<(DepthSpacePoint, u16)>) -> O,
    ) -> Hresult {
        if let Err(hr) = self.check_handle(handle) {
            return hr;
        }
        if depth_frame.len() != DEPTH_PIXELS || output.len() != COLOR_PIXELS {
            return ffi::E_INVALIDARG;
        }
        for (i, out) in output.iter_mut().enumerate() {
            *out = map(scene::color_to_depth(scene::color_pixel(i), depth_frame));
        }
        ffi::S_OK
    }

    fn get_all(
        &self,
        handle: KcbHandle,
        body_index: *mut KcbBodyIndexFrame,
        color: *mut KcbColorFrame,
        depths: [(Depth16Source, *mut KcbDepthFrame); 3],
    ) -> Result<(), Hresult> {
        if handle == ffi::KCB_INVALID_HANDLE {
            return Err(ffi::E_INVALIDARG);
        }
        if body_index.is_null() && color.is_null() && depths.iter().all(|(_, f)| f.is_null()) {
            return Err(ffi::E_INVALIDARG);
        }
        let mut state = self.state();
        if !state.sessions.contains_key(&handle) {
            return Err(ffi::E_NOINTERFACE);
        }

        let mut targets = Vec::with_capacity(5);
        if !body_index.is_null() {
            targets.push(unsafe { Target::body_index(&state, body_index)? });
        }
        if !color.is_null() {
            // A color frame without a format never becomes available
            if unsafe { (*color).format } == ffi::COLOR_IMAGE_FORMAT_NONE {
                debug!("Color frame without a format in a multi-source read");
                return Err(ffi::E_PENDING);
            }
            targets.push(unsafe { Target::color(&state, color)? });
        }
        for (source, frame) in depths {
            if !frame.is_null() {
                targets.push(unsafe { Target::depth16(&state, source, frame)? });
            }
        }
        deliver(&mut state, handle, &targets)
    }
}

impl Drop for EmulatedBridge {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.frames.is_empty() {
            // Frames must be released before the bridge goes away; their
            // buffers are leaked rather than freed under a live caller.
            warn!(count = state.frames.len(), "Emulated bridge dropped with live frames");
        }
    }
}

impl KinectBridge for EmulatedBridge {
    fn bridge_type(&self) -> BridgeType {
        BridgeType::Emulated
    }

    fn open_default_sensor(&self) -> KcbHandle {
        let mut state = self.state();
        state.open_attempts += 1;

        if !state.config.sensor_attached
            || state.open_attempts <= state.config.attach_after_attempts
        {
            debug!(attempt = state.open_attempts, "No emulated sensor attached");
            return ffi::KCB_INVALID_HANDLE;
        }
        if state.config.second_open == SecondOpenPolicy::Refuse && !state.sessions.is_empty() {
            debug!(live = state.sessions.len(), "Refusing second open");
            return ffi::KCB_INVALID_HANDLE;
        }

        let Some(handle) = state.next_handle else {
            warn!("Emulated handle space exhausted");
            return ffi::KCB_INVALID_HANDLE;
        };
        state.next_handle = handle
            .checked_add(1)
            .filter(|&next| next != ffi::KCB_INVALID_HANDLE);
        state.sessions.insert(handle, Session::default());
        debug!(handle, "Opened emulated sensor");
        handle
    }

    fn close_sensor(&self, handle: &mut KcbHandle) -> Hresult {
        if *handle == ffi::KCB_INVALID_HANDLE {
            return ffi::E_INVALIDARG;
        }
        let closing = std::mem::replace(handle, ffi::KCB_INVALID_HANDLE);
        match self.state().sessions.remove(&closing) {
            Some(_) => {
                debug!(handle = closing, "Closed emulated sensor");
                ffi::S_OK
            }
            None => ffi::E_NOINTERFACE,
        }
    }

    fn audio_format(&self, handle: KcbHandle, format: &mut WaveFormatEx) -> Hresult {
        if handle == ffi::KCB_INVALID_HANDLE {
            return ffi::E_INVALIDARG;
        }
        if !self.state().sessions.contains_key(&handle) {
            *format = WaveFormatEx::zeroed();
            return ffi::E_NOINTERFACE;
        }
        *format = WaveFormatEx {
            format_tag: ffi::WAVE_FORMAT_IEEE_FLOAT,
            channels: 1,
            samples_per_sec: AUDIO_SAMPLE_RATE,
            avg_bytes_per_sec: AUDIO_SAMPLE_RATE * AUDIO_BYTES_PER_SAMPLE,
            block_align: AUDIO_BYTES_PER_SAMPLE as u16,
            bits_per_sample: (AUDIO_BYTES_PER_SAMPLE * 8) as u16,
            cb_size: 0,
        };
        ffi::S_OK
    }

    fn frame_description(
        &self,
        handle: KcbHandle,
        source: FrameSource,
        description: &mut KcbFrameDescription,
    ) -> Hresult {
        if let FrameSource::Color(format) = source {
            return self.color_frame_description(handle, format.raw(), description);
        }
        if handle == ffi::KCB_INVALID_HANDLE {
            return ffi::E_INVALIDARG;
        }
        let mut state = self.state();
        let Some(session) = state.sessions.get_mut(&handle) else {
            *description = KcbFrameDescription::zeroed();
            return ffi::E_NOINTERFACE;
        };
        session.active.insert(source.kind());
        *description = Self::description(source);
        ffi::S_OK
    }

    fn color_frame_description(
        &self,
        handle: KcbHandle,
        format: ColorImageFormat,
        description: &mut KcbFrameDescription,
    ) -> Hresult {
        if handle == ffi::KCB_INVALID_HANDLE {
            return ffi::E_INVALIDARG;
        }
        let mut state = self.state();
        let Some(session) = state.sessions.get_mut(&handle) else {
            *description = KcbFrameDescription::zeroed();
            return ffi::E_NOINTERFACE;
        };
        let Some(format) = crate::sensor::types::ColorFormat::from_raw(format) else {
            *description = KcbFrameDescription::zeroed();
            return ffi::E_INVALIDARG;
        };
        session.active.insert(SourceKind::Color);
        *description = Self::description(FrameSource::Color(format));
        ffi::S_OK
    }

    unsafe fn create_body_index_frame(
        &self,
        description: KcbFrameDescription,
        frame: *mut *mut KcbBodyIndexFrame,
    ) -> Hresult {
        if frame.is_null() {
            return ffi::E_POINTER;
        }
        let layout = FrameLayout::BodyIndex;
        let buffer = match Self::allocate::<u8>(layout, description.length_in_pixels as usize) {
            Ok(buffer) => buffer,
            Err(hr) => return hr,
        };
        let mut state = self.state();
        let raw = Box::into_raw(Box::new(KcbBodyIndexFrame::zeroed()));
        let buffer = Self::register(&mut state, raw as usize, layout, buffer);
        unsafe {
            (*raw).size = description.length_in_pixels;
            (*raw).buffer = buffer;
            *frame = raw;
        }
        ffi::S_OK
    }

    unsafe fn release_body_index_frame(&self, frame: *mut *mut KcbBodyIndexFrame) -> Hresult {
        if frame.is_null() || unsafe { (*frame).is_null() } {
            return ffi::E_INVALIDARG;
        }
        let mut state = self.state();
        let hr = unsafe {
            Self::unregister::<_, u8>(&mut state, *frame, FrameLayout::BodyIndex)
        };
        if ffi::succeeded(hr) {
            unsafe { *frame = std::ptr::null_mut() };
        }
        hr
    }

    unsafe fn get_body_index_frame(
        &self,
        handle: KcbHandle,
        frame: *mut KcbBodyIndexFrame,
    ) -> Hresult {
        if handle == ffi::KCB_INVALID_HANDLE {
            return ffi::E_INVALIDARG;
        }
        if frame.is_null() {
            return ffi::E_POINTER;
        }
        let mut state = self.state();
        status(
            unsafe { Target::body_index(&state, frame) }
                .and_then(|target| deliver(&mut state, handle, &[target])),
        )
    }

    unsafe fn create_color_frame(
        &self,
        format: ColorImageFormat,
        description: KcbFrameDescription,
        frame: *mut *mut KcbColorFrame,
    ) -> Hresult {
        if frame.is_null() {
            return ffi::E_POINTER;
        }
        if format == ffi::COLOR_IMAGE_FORMAT_NONE {
            return ffi::E_INVALIDARG;
        }
        let Some(size) = description
            .length_in_pixels
            .checked_mul(description.bytes_per_pixel)
        else {
            return ffi::E_OUTOFMEMORY;
        };
        let layout = FrameLayout::Color;
        let buffer = match Self::allocate::<u8>(layout, size as usize) {
            Ok(buffer) => buffer,
            Err(hr) => return hr,
        };
        let mut state = self.state();
        let raw = Box::into_raw(Box::new(KcbColorFrame::zeroed()));
        let buffer = Self::register(&mut state, raw as usize, layout, buffer);
        unsafe {
            (*raw).format = format;
            (*raw).size = size;
            (*raw).buffer = buffer;
            *frame = raw;
        }
        ffi::S_OK
    }

    unsafe fn release_color_frame(&self, frame: *mut *mut KcbColorFrame) -> Hresult {
        if frame.is_null() || unsafe { (*frame).is_null() } {
            return ffi::E_INVALIDARG;
        }
        let mut state = self.state();
        let hr = unsafe { Self::unregister::<_, u8>(&mut state, *frame, FrameLayout::Color) };
        if ffi::succeeded(hr) {
            unsafe { *frame = std::ptr::null_mut() };
        }
        hr
    }

    unsafe fn get_color_frame(&self, handle: KcbHandle, frame: *mut KcbColorFrame) -> Hresult {
        if handle == ffi::KCB_INVALID_HANDLE {
            return ffi::E_INVALIDARG;
        }
        if frame.is_null() {
            return ffi::E_POINTER;
        }
        let mut state = self.state();
        status(
            unsafe { Target::color(&state, frame) }
                .and_then(|target| deliver(&mut state, handle, &[target])),
        )
    }

    unsafe fn create_depth16_frame(
        &self,
        source: Depth16Source,
        description: KcbFrameDescription,
        frame: *mut *mut KcbDepthFrame,
    ) -> Hresult {
        if frame.is_null() {
            return ffi::E_POINTER;
        }
        let layout = FrameLayout::Depth16(source);
        let buffer = match Self::allocate::<u16>(layout, description.length_in_pixels as usize) {
            Ok(buffer) => buffer,
            Err(hr) => return hr,
        };
        let mut state = self.state();
        let raw = Box::into_raw(Box::new(KcbDepthFrame::zeroed()));
        let buffer = Self::register(&mut state, raw as usize, layout, buffer);
        unsafe {
            (*raw).size = description.length_in_pixels;
            (*raw).buffer = buffer;
            *frame = raw;
        }
        ffi::S_OK
    }

    unsafe fn release_depth16_frame(
        &self,
        source: Depth16Source,
        frame: *mut *mut KcbDepthFrame,
    ) -> Hresult {
        if frame.is_null() || unsafe { (*frame).is_null() } {
            return ffi::E_INVALIDARG;
        }
        let mut state = self.state();
        let hr = unsafe {
            Self::unregister::<_, u16>(&mut state, *frame, FrameLayout::Depth16(source))
        };
        if ffi::succeeded(hr) {
            unsafe { *frame = std::ptr::null_mut() };
        }
        hr
    }

    unsafe fn get_depth16_frame(
        &self,
        source: Depth16Source,
        handle: KcbHandle,
        frame: *mut KcbDepthFrame,
    ) -> Hresult {
        if handle == ffi::KCB_INVALID_HANDLE {
            return ffi::E_INVALIDARG;
        }
        if frame.is_null() {
            return ffi::E_POINTER;
        }
        let mut state = self.state();
        status(
            unsafe { Target::depth16(&state, source, frame) }
                .and_then(|target| deliver(&mut state, handle, &[target])),
        )
    }

    unsafe fn get_audio_frame(&self, handle: KcbHandle, frame: *mut KcbAudioFrame) -> Hresult {
        if handle == ffi::KCB_INVALID_HANDLE {
            return ffi::E_INVALIDARG;
        }
        if frame.is_null() {
            return ffi::E_POINTER;
        }
        let (buffer, size) = unsafe { ((*frame).audio_buffer, (*frame).audio_buffer_size) };
        if buffer.is_null() {
            return ffi::E_POINTER;
        }
        if buffer.align_offset(std::mem::align_of::<f32>()) != 0 {
            return ffi::E_INVALIDARG;
        }

        let mut state = self.state();
        if let Err(hr) = state.next_frame(handle, SourceKind::Audio) {
            unsafe { (*frame).bytes_read = 0 };
            return hr;
        }
        let count = (size / AUDIO_BYTES_PER_SAMPLE) as usize;
        let samples = unsafe { std::slice::from_raw_parts_mut(buffer as *mut f32, count) };

        let scene = state.scene;
        let Some(session) = state.sessions.get_mut(&handle) else {
            return ffi::E_NOINTERFACE;
        };
        let (angle, confidence) = scene.fill_audio(samples, &mut session.audio_position);
        unsafe {
            (*frame).bytes_read = count as u32 * AUDIO_BYTES_PER_SAMPLE;
            (*frame).beam_angle = angle;
            (*frame).beam_angle_confidence = confidence;
        }
        ffi::S_OK
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
        let depths = [
            (Depth16Source::Depth, depth),
            (Depth16Source::Infrared, infrared),
            (Depth16Source::LongExposureInfrared, long_exposure_infrared),
        ];
        status(self.get_all(handle, body_index, color, depths))
    }

    fn is_frame_ready(&self, handle: KcbHandle, source: FrameSourceTypes) -> bool {
        let state = self.state();
        let (Some(session), Some(kind)) = (state.sessions.get(&handle), SourceKind::from_flag(source))
        else {
            return false;
        };
        state.ready(session, kind)
    }

    fn any_frame_ready(&self, handle: KcbHandle) -> bool {
        let state = self.state();
        state
            .sessions
            .get(&handle)
            .is_some_and(|session| session.active.iter().any(|&kind| state.ready(session, kind)))
    }

    fn all_frames_ready(&self, handle: KcbHandle) -> bool {
        let state = self.state();
        state.sessions.get(&handle).is_some_and(|session| {
            !session.active.is_empty()
                && session.active.iter().all(|&kind| state.ready(session, kind))
        })
    }

    fn map_camera_point_to_depth_space(
        &self,
        handle: KcbHandle,
        camera_point: CameraSpacePoint,
        depth_point: &mut DepthSpacePoint,
    ) -> Hresult {
        if let Err(hr) = self.check_handle(handle) {
            return hr;
        }
        *depth_point = scene::camera_to_depth(camera_point);
        ffi::S_OK
    }

    fn map_camera_point_to_color_space(
        &self,
        handle: KcbHandle,
        camera_point: CameraSpacePoint,
        color_point: &mut ColorSpacePoint,
    ) -> Hresult {
        if let Err(hr) = self.check_handle(handle) {
            return hr;
        }
        *color_point = scene::camera_to_color(camera_point);
        ffi::S_OK
    }

    fn map_depth_point_to_camera_space(
        &self,
        handle: KcbHandle,
        depth_point: DepthSpacePoint,
        depth: u16,
        camera_point: &mut CameraSpacePoint,
    ) -> Hresult {
        if let Err(hr) = self.check_handle(handle) {
            return hr;
        }
        *camera_point = scene::depth_to_camera(depth_point, depth);
        ffi::S_OK
    }

    fn map_depth_frame_to_camera_space(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        camera_points: &mut [CameraSpacePoint],
    ) -> Hresult {
        if let Err(hr) = self.check_handle(handle) {
            return hr;
        }
        if depth_frame.len() != DEPTH_PIXELS || camera_points.len() != DEPTH_PIXELS {
            return ffi::E_INVALIDARG;
        }
        for (i, (depth, point)) in depth_frame.iter().zip(camera_points.iter_mut()).enumerate() {
            *point = scene::depth_to_camera(scene::depth_point(i), *depth);
        }
        ffi::S_OK
    }

    fn map_depth_point_to_color_space(
        &self,
        handle: KcbHandle,
        depth_point: DepthSpacePoint,
        depth: u16,
        color_point: &mut ColorSpacePoint,
    ) -> Hresult {
        if let Err(hr) = self.check_handle(handle) {
            return hr;
        }
        *color_point = scene::depth_to_color(depth_point, depth);
        ffi::S_OK
    }

    fn map_camera_points_to_depth_space(
        &self,
        handle: KcbHandle,
        camera_points: &[CameraSpacePoint],
        depth_points: &mut [DepthSpacePoint],
    ) -> Hresult {
        self.map_each(handle, camera_points, depth_points, scene::camera_to_depth)
    }

    fn map_camera_points_to_color_space(
        &self,
        handle: KcbHandle,
        camera_points: &[CameraSpacePoint],
        color_points: &mut [ColorSpacePoint],
    ) -> Hresult {
        self.map_each(handle, camera_points, color_points, scene::camera_to_color)
    }

    fn map_depth_points_to_camera_space(
        &self,
        handle: KcbHandle,
        depth_points: &[DepthSpacePoint],
        depths: &[u16],
        camera_points: &mut [CameraSpacePoint],
    ) -> Hresult {
        if depths.len() != depth_points.len() {
            return ffi::E_INVALIDARG;
        }
        let input: Vec<_> = depth_points.iter().copied().zip(depths.iter().copied()).collect();
        self.map_each(handle, &input, camera_points, |(point, depth)| {
            scene::depth_to_camera(point, depth)
        })
    }

    fn map_depth_points_to_color_space(
        &self,
        handle: KcbHandle,
        depth_points: &[DepthSpacePoint],
        depths: &[u16],
        color_points: &mut [ColorSpacePoint],
    ) -> Hresult {
        if depths.len() != depth_points.len() {
            return ffi::E_INVALIDARG;
        }
        let input: Vec<_> = depth_points.iter().copied().zip(depths.iter().copied()).collect();
        self.map_each(handle, &input, color_points, |(point, depth)| {
            scene::depth_to_color(point, depth)
        })
    }

    fn map_depth_frame_to_color_space(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        color_points: &mut [ColorSpacePoint],
    ) -> Hresult {
        if depth_frame.len() != DEPTH_PIXELS {
            return ffi::E_INVALIDARG;
        }
        let input: Vec<_> = depth_frame.iter().copied().enumerate().collect();
        self.map_each(handle, &input, color_points, |(i, depth)| {
            scene::depth_to_color(scene::depth_point(i), depth)
        })
    }

    fn map_color_frame_to_depth_space(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        depth_points: &mut [DepthSpacePoint],
    ) -> Hresult {
        self.map_color_frame(handle, depth_frame, depth_points, |hit| {
            hit.map_or(UNMAPPED_DEPTH_POINT, |(point, _)| point)
        })
    }

    fn map_color_frame_to_camera_space(
        &self,
        handle: KcbHandle,
        depth_frame: &[u16],
        camera_points: &mut [CameraSpacePoint],
    ) -> Hresult {
        self.map_color_frame(handle, depth_frame, camera_points, |hit| {
            hit.map_or(UNMAPPED_CAMERA_POINT, |(point, depth)| {
                scene::depth_to_camera(point, depth)
            })
        })
    }

    fn depth_frame_to_camera_space_table(
        &self,
        handle: KcbHandle,
        table: &mut Vec<PointF>,
    ) -> Hresult {
        table.clear();
        if let Err(hr) = self.check_handle(handle) {
            return hr;
        }
        table.extend((0..DEPTH_PIXELS).map(scene::depth_table_entry));
        ffi::S_OK
    }
}

/// Relative time of frame `number`, in 100 ns ticks
fn timestamp(number: u64) -> i64 {
    (number as i64 + 1) * TICKS_PER_FRAME
}
