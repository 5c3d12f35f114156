// SPDX-License-Identifier: GPL-3.0-only

//! Safe sensor layer
//!
//! Two levels live here:
//!
//! - [`open_default_sensor`] / [`close_sensor`] keep the raw handle contract:
//!   the sentinel means "no sensor", close writes the sentinel back in place.
//! - [`Sensor`] owns one open handle. Closing consumes it and `Drop` closes
//!   at most once, so a double close cannot be written.
//!
//! Frames created through a sensor own their native allocation and lend
//! bounded views of it; see [`frames`].

pub mod frames;
pub mod mapping;
pub mod types;

pub use frames::{
    AudioFormat, AudioFrame, BodyIndex, BufferView, Color, Depth, Frame, FrameDescription,
    FrameKind, FrameSet, Infrared, LongExposureInfrared,
};
pub use types::{ColorFormat, Depth16Source, FrameSource, SensorHandle, SourceKind};

use crate::backends::KinectBridge;
use crate::errors::{DisplayHresult, SensorError, SensorResult, check};
use crate::ffi::{self, Hresult, KcbFrameDescription, WaveFormatEx};
use bytemuck::Zeroable;
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Acquire the default sensor
///
/// Returns the sentinel when no sensor can be opened. Never retries.
pub fn open_default_sensor(bridge: &dyn KinectBridge) -> SensorHandle {
    let handle = SensorHandle::from_raw(bridge.open_default_sensor());
    if handle.is_valid() {
        info!(handle = %handle, bridge = %bridge.bridge_type(), "Opened default sensor");
    } else {
        debug!(bridge = %bridge.bridge_type(), "No sensor available");
    }
    handle
}

/// Release a sensor handle in place
///
/// The native status is returned unchanged. On success, and when the handle
/// was not open, `handle` is left as the sentinel.
pub fn close_sensor(bridge: &dyn KinectBridge, handle: &mut SensorHandle) -> Hresult {
    let closing = *handle;
    let hr = bridge.close_sensor(handle.as_raw_mut());
    if ffi::succeeded(hr) {
        info!(handle = %closing, "Closed sensor");
    } else {
        warn!(handle = %closing, hr = %DisplayHresult(hr), "Closing sensor failed");
    }
    hr
}

/// An open sensor session
///
/// `Send` so it can move to a capture thread, but not `Sync`: one owner
/// drives a handle at a time.
pub struct Sensor {
    bridge: Arc<dyn KinectBridge>,
    handle: SensorHandle,
    _not_sync: PhantomData<Cell<()>>,
}

impl Sensor {
    /// Open the default sensor, failing with [`SensorError::SensorUnavailable`]
    /// when the bridge returns the sentinel
    pub fn open_default(bridge: Arc<dyn KinectBridge>) -> SensorResult<Self> {
        let handle = open_default_sensor(bridge.as_ref());
        if !handle.is_valid() {
            return Err(SensorError::SensorUnavailable);
        }
        Ok(Self {
            bridge,
            handle,
            _not_sync: PhantomData,
        })
    }

    pub fn handle(&self) -> SensorHandle {
        self.handle
    }

    pub fn bridge(&self) -> &Arc<dyn KinectBridge> {
        &self.bridge
    }

    /// Close the session, reporting the native status
    pub fn close(mut self) -> SensorResult<()> {
        let hr = close_sensor(self.bridge.as_ref(), &mut self.handle);
        // Drop sees the sentinel and does nothing further
        self.handle.invalidate();
        check("KCBCloseSensor", hr)
    }

    /// Geometry of an image source
    ///
    /// Returns `E_INVALIDARG` as an error for an invalid handle.
    pub fn frame_description(&self, source: FrameSource) -> SensorResult<FrameDescription> {
        let mut raw = KcbFrameDescription::zeroed();
        let hr = self
            .bridge
            .frame_description(self.handle.raw(), source, &mut raw);
        check(source.description_operation(), hr)?;
        Ok(FrameDescription::from(raw))
    }

    /// Format of the microphone array stream
    pub fn audio_format(&self) -> SensorResult<AudioFormat> {
        let mut raw = WaveFormatEx::zeroed();
        let hr = self.bridge.audio_format(self.handle.raw(), &mut raw);
        check("KCBGetAudioFormat", hr)?;
        Ok(AudioFormat::from(raw))
    }

    /// Create a frame sized from this sensor's description of `kind`'s source
    pub fn create_frame<K: FrameKind>(&self, kind: K) -> SensorResult<Frame<K>> {
        let description = self.frame_description(kind.source())?;
        Frame::create(Arc::clone(&self.bridge), kind, &description)
    }

    /// Fill `frame` with the newest frame of its source
    ///
    /// `E_PENDING` (see [`SensorError::is_pending`]) means no new frame has
    /// arrived since the last acquisition; the frame keeps its old contents.
    pub fn acquire<K: FrameKind>(&self, frame: &mut Frame<K>) -> SensorResult<()> {
        frame.acquire_from(&self.bridge, self.handle)
    }

    /// Fill every frame in `frames` from one instant
    ///
    /// `E_PENDING` unless all requested sources have a new frame; then no
    /// frame changes. An empty set is rejected with `E_INVALIDARG`.
    pub fn acquire_all(&self, mut frames: FrameSet<'_>) -> SensorResult<()> {
        const OPERATION: &str = "KCBGetAllFrameData";
        if frames.is_empty() {
            return Err(SensorError::failed(OPERATION, ffi::E_INVALIDARG));
        }
        let body_index = raw_or_null(frames.body_index.as_deref_mut(), &self.bridge, OPERATION)?;
        let color = raw_or_null(frames.color.as_deref_mut(), &self.bridge, OPERATION)?;
        let depth = raw_or_null(frames.depth.as_deref_mut(), &self.bridge, OPERATION)?;
        let infrared = raw_or_null(frames.infrared.as_deref_mut(), &self.bridge, OPERATION)?;
        let long_exposure_infrared = raw_or_null(
            frames.long_exposure_infrared.as_deref_mut(),
            &self.bridge,
            OPERATION,
        )?;

        // Each pointer belongs to a frame borrowed mutably by `frames`
        let hr = unsafe {
            self.bridge.get_all_frame_data(
                self.handle.raw(),
                body_index,
                color,
                depth,
                infrared,
                long_exposure_infrared,
            )
        };
        check(OPERATION, hr)?;

        if let Some(frame) = frames.body_index {
            frame.mark_acquired();
        }
        if let Some(frame) = frames.color {
            frame.mark_acquired();
        }
        if let Some(frame) = frames.depth {
            frame.mark_acquired();
        }
        if let Some(frame) = frames.infrared {
            frame.mark_acquired();
        }
        if let Some(frame) = frames.long_exposure_infrared {
            frame.mark_acquired();
        }
        Ok(())
    }

    /// Read the next block of audio into `frame`
    pub fn read_audio(&self, frame: &mut AudioFrame) -> SensorResult<()> {
        frame.read(self.bridge.as_ref(), self.handle)
    }

    /// True when a new frame of `source` is waiting
    pub fn is_frame_ready(&self, source: SourceKind) -> bool {
        self.bridge.is_frame_ready(self.handle.raw(), source.flag())
    }

    /// True when any source in use has a new frame
    pub fn any_frame_ready(&self) -> bool {
        self.bridge.any_frame_ready(self.handle.raw())
    }

    /// True when every source in use has a new frame
    pub fn all_frames_ready(&self) -> bool {
        self.bridge.all_frames_ready(self.handle.raw())
    }
}

fn raw_or_null<K: FrameKind>(
    frame: Option<&mut Frame<K>>,
    bridge: &Arc<dyn KinectBridge>,
    operation: &'static str,
) -> SensorResult<*mut K::Raw> {
    match frame {
        Some(frame) => frame.raw_for(bridge, operation),
        None => Ok(std::ptr::null_mut()),
    }
}

impl Drop for Sensor {
    fn drop(&mut self) {
        if self.handle.is_valid() {
            close_sensor(self.bridge.as_ref(), &mut self.handle);
        }
    }
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor")
            .field("handle", &self.handle)
            .field("bridge", &self.bridge.bridge_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{EmulatedBridge, EmulatorConfig};

    fn emulated(config: EmulatorConfig) -> Arc<EmulatedBridge> {
        Arc::new(EmulatedBridge::new(config))
    }

    #[test]
    fn test_open_without_sensor_is_unavailable() {
        let bridge = emulated(EmulatorConfig {
            sensor_attached: false,
            ..Default::default()
        });
        let err = Sensor::open_default(bridge).unwrap_err();
        assert_eq!(err, SensorError::SensorUnavailable);
    }

    #[test]
    fn test_drop_closes_once() {
        let bridge = emulated(EmulatorConfig::default());
        {
            let _sensor = Sensor::open_default(bridge.clone()).unwrap();
            assert_eq!(bridge.open_handles(), 1);
        }
        assert_eq!(bridge.open_handles(), 0);
    }

    #[test]
    fn test_close_consumes_and_reports() {
        let bridge = emulated(EmulatorConfig::default());
        let sensor = Sensor::open_default(bridge.clone()).unwrap();
        assert!(sensor.handle().is_valid());
        sensor.close().unwrap();
        assert_eq!(bridge.open_handles(), 0);
    }

    #[test]
    fn test_close_sensor_in_place() {
        let bridge = emulated(EmulatorConfig::default());
        let mut handle = open_default_sensor(bridge.as_ref());
        assert!(handle.is_valid());

        assert_eq!(close_sensor(bridge.as_ref(), &mut handle), ffi::S_OK);
        assert_eq!(handle, SensorHandle::INVALID);

        // Second close hits the sentinel and fails cleanly
        assert_eq!(close_sensor(bridge.as_ref(), &mut handle), ffi::E_INVALIDARG);
    }

    #[test]
    fn test_sensor_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Sensor>();
    }
}
