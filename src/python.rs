// SPDX-License-Identifier: GPL-3.0-only

//! Python module `KCBv2Lib`
//!
//! Keeps the two entry points scripts have always used
//! (`KCBOpenDefaultSensor`, `KCBCloseSensor`) and the historical struct
//! names (`KCBFrameDescription`, `KCBAudioFrame`, `KCB*Frame` with `Size`,
//! `Buffer` and `TimeStamp`), and adds sensor and frame classes on top of the
//! safe layer.
//!
//! Frame data is reached through a [`PyFrameBuffer`]. Its `view()` is a
//! read-only `memoryview` over the native buffer with no copy; `tobytes()`
//! copies. A buffer refuses both once the frame has been re-acquired, and a
//! frame refuses to re-acquire while a `memoryview` of it is alive, so Python
//! never sees pixels change underneath it.

use crate::backends::{KinectBridge, get_bridge};
use crate::config::Config;
use crate::errors::SensorError;
use crate::ffi::{self, KCB_INVALID_HANDLE, KcbHandle};
use crate::sensor::{
    self, AudioFrame, BodyIndex, Color, ColorFormat, Depth, Frame, FrameSource, Infrared,
    LongExposureInfrared, Sensor, SensorHandle,
};
use pyo3::create_exception;
use pyo3::exceptions::{PyBufferError, PyOSError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyMemoryView};
use std::cell::Cell;
use std::os::raw::c_int;
use std::sync::{Arc, PoisonError, RwLock};

create_exception!(KCBv2Lib, SensorUnavailableError, PyRuntimeError);
create_exception!(KCBv2Lib, StaleBufferError, PyRuntimeError);
create_exception!(KCBv2Lib, KCBError, PyOSError);

static BRIDGE: RwLock<Option<Arc<dyn KinectBridge>>> = RwLock::new(None);

/// Use `bridge` for sensors opened from now on
///
/// Lets an embedding application pick the bridge instead of the user config.
/// Sensors and frames that already exist keep the bridge they were made with.
pub fn set_bridge(bridge: Arc<dyn KinectBridge>) {
    *BRIDGE.write().unwrap_or_else(PoisonError::into_inner) = Some(bridge);
}

/// Bridge shared by every object of the module, chosen from the user config
/// unless [`set_bridge`] picked one
fn bridge() -> PyResult<Arc<dyn KinectBridge>> {
    if let Some(bridge) = BRIDGE.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return Ok(bridge.clone());
    }
    let config = Config::load().map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
    let bridge = get_bridge(config.backend, &config.emulator)
        .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
    let mut slot = BRIDGE.write().unwrap_or_else(PoisonError::into_inner);
    Ok(slot.get_or_insert(bridge).clone())
}

impl From<SensorError> for PyErr {
    fn from(err: SensorError) -> Self {
        match err {
            SensorError::SensorUnavailable => SensorUnavailableError::new_err(err.to_string()),
            SensorError::OperationFailed { .. } => KCBError::new_err(err.to_string()),
        }
    }
}

fn parse_color_format(name: &str) -> PyResult<ColorFormat> {
    match name.to_ascii_lowercase().as_str() {
        "rgba" => Ok(ColorFormat::Rgba),
        "yuv" => Ok(ColorFormat::Yuv),
        "bgra" => Ok(ColorFormat::Bgra),
        "bayer" => Ok(ColorFormat::Bayer),
        "yuy2" => Ok(ColorFormat::Yuy2),
        other => Err(PyValueError::new_err(format!(
            "unknown color format '{}'",
            other
        ))),
    }
}

fn parse_source(name: &str, format: ColorFormat) -> PyResult<FrameSource> {
    match name {
        "body_index" => Ok(FrameSource::BodyIndex),
        "depth" => Ok(FrameSource::Depth),
        "infrared" => Ok(FrameSource::Infrared),
        "long_exposure_infrared" => Ok(FrameSource::LongExposureInfrared),
        "color" => Ok(FrameSource::Color(format)),
        other => Err(PyValueError::new_err(format!("unknown source '{}'", other))),
    }
}

/// Open the default sensor, returning `KCB_INVALID_HANDLE` when none is available
#[pyfunction]
#[pyo3(name = "KCBOpenDefaultSensor")]
fn open_default_sensor() -> PyResult<KcbHandle> {
    let bridge = bridge()?;
    Ok(sensor::open_default_sensor(bridge.as_ref()).raw())
}

/// Close a handle
///
/// Returns `(hresult, handle)`; the second element is the value the handle
/// slot holds afterwards.
#[pyfunction]
#[pyo3(name = "KCBCloseSensor")]
fn close_sensor(handle: KcbHandle) -> PyResult<(ffi::Hresult, KcbHandle)> {
    let bridge = bridge()?;
    let mut handle = SensorHandle::from_raw(handle);
    let hr = sensor::close_sensor(bridge.as_ref(), &mut handle);
    Ok((hr, handle.raw()))
}

#[pyclass(name = "KCBFrameDescription", module = "KCBv2Lib", get_all)]
pub struct PyFrameDescription {
    pub width: i32,
    pub height: i32,
    #[pyo3(name = "horizontalFieldOfView")]
    pub horizontal_field_of_view: f32,
    #[pyo3(name = "verticalFieldOfView")]
    pub vertical_field_of_view: f32,
    #[pyo3(name = "diagonalFieldOfView")]
    pub diagonal_field_of_view: f32,
    #[pyo3(name = "lengthInPixels")]
    pub length_in_pixels: u32,
    #[pyo3(name = "bytesPerPixel")]
    pub bytes_per_pixel: u32,
}

/// An open sensor
#[pyclass(name = "Sensor", module = "KCBv2Lib", unsendable)]
pub struct PySensor {
    inner: Option<Sensor>,
}

impl PySensor {
    fn sensor(&self) -> PyResult<&Sensor> {
        self.inner
            .as_ref()
            .ok_or_else(|| PyRuntimeError::new_err("sensor is closed"))
    }
}

#[pymethods]
impl PySensor {
    /// Open the default sensor, raising `SensorUnavailableError` when none is attached
    #[staticmethod]
    fn open() -> PyResult<Self> {
        let sensor = Sensor::open_default(bridge()?)?;
        Ok(Self {
            inner: Some(sensor),
        })
    }

    #[getter]
    fn handle(&self) -> KcbHandle {
        self.inner
            .as_ref()
            .map_or(KCB_INVALID_HANDLE, |sensor| sensor.handle().raw())
    }

    /// Close the sensor. Closing twice is a no-op.
    fn close(&mut self) -> PyResult<()> {
        match self.inner.take() {
            Some(sensor) => Ok(sensor.close()?),
            None => Ok(()),
        }
    }

    #[pyo3(signature = (source, color_format = "bgra"))]
    fn frame_description(&self, source: &str, color_format: &str) -> PyResult<PyFrameDescription> {
        let source = parse_source(source, parse_color_format(color_format)?)?;
        let desc = self.sensor()?.frame_description(source)?;
        Ok(PyFrameDescription {
            width: desc.width(),
            height: desc.height(),
            horizontal_field_of_view: desc.horizontal_field_of_view(),
            vertical_field_of_view: desc.vertical_field_of_view(),
            diagonal_field_of_view: desc.diagonal_field_of_view(),
            length_in_pixels: desc.length_in_pixels(),
            bytes_per_pixel: desc.bytes_per_pixel(),
        })
    }

    /// Create a frame for one image source
    ///
    /// `source` is one of `body_index`, `depth`, `infrared`,
    /// `long_exposure_infrared` or `color`.
    #[pyo3(signature = (source, color_format = "bgra"))]
    fn create_frame(
        slf: PyRef<'_, Self>,
        source: &str,
        color_format: &str,
    ) -> PyResult<PyImageFrame> {
        let source = parse_source(source, parse_color_format(color_format)?)?;
        let sensor = slf.sensor()?;
        let frame = match source {
            FrameSource::BodyIndex => ImageFrame::BodyIndex(sensor.create_frame(BodyIndex)?),
            FrameSource::Depth => ImageFrame::Depth(sensor.create_frame(Depth)?),
            FrameSource::Infrared => ImageFrame::Infrared(sensor.create_frame(Infrared)?),
            FrameSource::LongExposureInfrared => {
                ImageFrame::LongExposureInfrared(sensor.create_frame(LongExposureInfrared)?)
            }
            FrameSource::Color(format) => ImageFrame::Color(sensor.create_frame(Color(format))?),
        };
        Ok(PyImageFrame {
            sensor: slf.into(),
            source,
            frame,
            exports: Cell::new(0),
        })
    }

    /// Read one block of audio into a fresh frame of `size` bytes
    #[pyo3(signature = (size = crate::constants::DEFAULT_AUDIO_BUFFER_SIZE))]
    fn read_audio(&self, size: u32) -> PyResult<PyAudioFrame> {
        let mut frame = AudioFrame::with_capacity(size);
        self.sensor()?.read_audio(&mut frame)?;
        Ok(PyAudioFrame { inner: frame })
    }

    fn any_frame_ready(&self) -> PyResult<bool> {
        Ok(self.sensor()?.any_frame_ready())
    }

    fn all_frames_ready(&self) -> PyResult<bool> {
        Ok(self.sensor()?.all_frames_ready())
    }

    fn __enter__(slf: Py<Self>) -> Py<Self> {
        slf
    }

    fn __exit__(
        &mut self,
        _exc_type: Py<PyAny>,
        _exc_value: Py<PyAny>,
        _traceback: Py<PyAny>,
    ) -> PyResult<bool> {
        self.close()?;
        Ok(false)
    }

    fn __repr__(&self) -> String {
        match &self.inner {
            Some(sensor) => format!("Sensor(handle={})", sensor.handle()),
            None => "Sensor(closed)".to_string(),
        }
    }
}

enum ImageFrame {
    BodyIndex(Frame<BodyIndex>),
    Depth(Frame<Depth>),
    Infrared(Frame<Infrared>),
    LongExposureInfrared(Frame<LongExposureInfrared>),
    Color(Frame<Color>),
}

macro_rules! with_frame {
    ($frame:expr, $f:ident => $body:expr) => {
        match $frame {
            ImageFrame::BodyIndex($f) => $body,
            ImageFrame::Depth($f) => $body,
            ImageFrame::Infrared($f) => $body,
            ImageFrame::LongExposureInfrared($f) => $body,
            ImageFrame::Color($f) => $body,
        }
    };
}

/// A frame owned by Python, released when it is garbage collected
///
/// Exposed as `KCBFrame` and under each of the header's per-source names.
#[pyclass(name = "KCBFrame", module = "KCBv2Lib", unsendable)]
pub struct PyImageFrame {
    sensor: Py<PySensor>,
    source: FrameSource,
    frame: ImageFrame,
    /// Live `memoryview` exports of the buffer
    exports: Cell<usize>,
}

impl PyImageFrame {
    fn bytes(&self) -> Option<&[u8]> {
        with_frame!(&self.frame, f => f.buffer().map(|view| view.as_bytes()))
    }
}

#[pymethods]
impl PyImageFrame {
    #[getter]
    fn source(&self) -> String {
        self.source.to_string()
    }

    #[getter]
    fn generation(&self) -> u64 {
        with_frame!(&self.frame, f => f.generation())
    }

    #[getter]
    fn size(&self) -> usize {
        with_frame!(&self.frame, f => f.size())
    }

    #[getter]
    fn timestamp(&self) -> i64 {
        with_frame!(&self.frame, f => f.timestamp())
    }

    #[getter(Size)]
    fn size_field(&self) -> usize {
        self.size()
    }

    #[getter(TimeStamp)]
    fn time_stamp_field(&self) -> i64 {
        self.timestamp()
    }

    /// Zero-copy `memoryview` of the last acquired data, `None` before the
    /// first acquire
    #[getter(Buffer)]
    fn buffer_field<'py>(slf: &Bound<'py, Self>) -> PyResult<Option<Bound<'py, PyMemoryView>>> {
        let Some(buffer) = Self::buffer(slf.borrow()) else {
            return Ok(None);
        };
        let buffer = Bound::new(slf.py(), buffer)?;
        PyMemoryView::from(buffer.as_any()).map(Some)
    }

    /// Fetch the newest frame
    ///
    /// Returns `False` when no new frame is available yet; other failures
    /// raise. Raises `BufferError` while a `memoryview` of the data is alive.
    fn acquire(&mut self, py: Python<'_>) -> PyResult<bool> {
        if self.exports.get() > 0 {
            return Err(PyBufferError::new_err(
                "frame data is still exported; release its memoryviews before acquiring",
            ));
        }
        let owner = self.sensor.borrow(py);
        let sensor = owner.sensor()?;
        let result = with_frame!(&mut self.frame, f => sensor.acquire(f));
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_pending() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// View of the last acquired data, or `None` before the first acquire
    fn buffer(slf: PyRef<'_, Self>) -> Option<PyFrameBuffer> {
        let generation = slf.generation();
        if generation == 0 {
            return None;
        }
        Some(PyFrameBuffer {
            frame: slf.into(),
            generation,
        })
    }

    fn __repr__(&self) -> String {
        format!(
            "KCBFrame(source={}, size={}, generation={})",
            self.source,
            self.size(),
            self.generation()
        )
    }
}

/// Data of one acquisition
///
/// Only readable while the frame still holds that acquisition.
#[pyclass(name = "FrameBuffer", module = "KCBv2Lib", unsendable)]
pub struct PyFrameBuffer {
    frame: Py<PyImageFrame>,
    generation: u64,
}

impl PyFrameBuffer {
    fn ensure_current(&self, py: Python<'_>) -> PyResult<()> {
        if self.is_current(py) {
            Ok(())
        } else {
            Err(StaleBufferError::new_err(format!(
                "frame was re-acquired after generation {}",
                self.generation
            )))
        }
    }
}

#[pymethods]
impl PyFrameBuffer {
    #[getter]
    fn generation(&self) -> u64 {
        self.generation
    }

    fn is_current(&self, py: Python<'_>) -> bool {
        let frame = self.frame.borrow(py);
        with_frame!(&frame.frame, f => f.is_current(self.generation))
    }

    /// Copy of the frame bytes
    fn tobytes<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyBytes>> {
        self.ensure_current(py)?;
        let frame = self.frame.borrow(py);
        let bytes = frame.bytes().unwrap_or_default();
        Ok(PyBytes::new(py, bytes))
    }

    /// Read-only `memoryview` over the native buffer, without copying
    fn view<'py>(slf: &Bound<'py, Self>) -> PyResult<Bound<'py, PyMemoryView>> {
        PyMemoryView::from(slf.as_any())
    }

    unsafe fn __getbuffer__(
        slf: Bound<'_, Self>,
        view: *mut pyo3::ffi::Py_buffer,
        flags: c_int,
    ) -> PyResult<()> {
        let py = slf.py();
        let this = slf.borrow();
        this.ensure_current(py)?;
        let frame = this.frame.borrow(py);
        let bytes = frame.bytes().unwrap_or_default();
        let len = pyo3::ffi::Py_ssize_t::try_from(bytes.len())
            .map_err(|_| PyBufferError::new_err("frame buffer too large to export"))?;

        // The memoryview keeps this object, and through it the frame, alive;
        // the export count keeps the frame from being re-acquired meanwhile.
        let filled = unsafe {
            pyo3::ffi::PyBuffer_FillInfo(
                view,
                slf.as_ptr(),
                bytes.as_ptr().cast_mut().cast(),
                len,
                1,
                flags,
            )
        };
        if filled == -1 {
            return Err(PyErr::fetch(py));
        }
        frame.exports.set(frame.exports.get() + 1);
        Ok(())
    }

    unsafe fn __releasebuffer__(&self, _view: *mut pyo3::ffi::Py_buffer) {
        Python::attach(|py| {
            let frame = self.frame.borrow(py);
            frame.exports.set(frame.exports.get().saturating_sub(1));
        });
    }

    fn __len__(&self, py: Python<'_>) -> usize {
        self.frame.borrow(py).bytes().map_or(0, <[u8]>::len)
    }
}

/// One block of audio samples
#[pyclass(name = "KCBAudioFrame", module = "KCBv2Lib", unsendable)]
pub struct PyAudioFrame {
    inner: AudioFrame,
}

#[pymethods]
impl PyAudioFrame {
    #[getter(cAudioBufferSize)]
    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Samples read, as packed 32-bit floats
    #[getter(pAudioBuffer)]
    fn audio_buffer<'py>(&self, py: Python<'py>) -> Bound<'py, PyBytes> {
        PyBytes::new(py, self.inner.data())
    }

    #[getter(ulBytesRead)]
    fn bytes_read(&self) -> usize {
        self.inner.bytes_read()
    }

    #[getter(fBeamAngle)]
    fn beam_angle(&self) -> f32 {
        self.inner.beam_angle()
    }

    #[getter(fBeamAngleConfidence)]
    fn beam_angle_confidence(&self) -> f32 {
        self.inner.beam_angle_confidence()
    }

    /// Bytes read, as packed 32-bit float samples
    fn tobytes<'py>(&self, py: Python<'py>) -> Bound<'py, PyBytes> {
        PyBytes::new(py, self.inner.data())
    }
}

#[pymodule]
#[pyo3(name = "KCBv2Lib")]
pub fn kcbv2lib(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("KCB_INVALID_HANDLE", KCB_INVALID_HANDLE)?;
    m.add_function(wrap_pyfunction!(open_default_sensor, m)?)?;
    m.add_function(wrap_pyfunction!(close_sensor, m)?)?;

    m.add_class::<PySensor>()?;
    m.add_class::<PyFrameDescription>()?;
    m.add_class::<PyImageFrame>()?;
    m.add_class::<PyFrameBuffer>()?;
    m.add_class::<PyAudioFrame>()?;

    let py = m.py();
    // The header typedefs every image frame struct to the same layout
    for alias in [
        "KCBBodyIndexFrame",
        "KCBColorFrame",
        "KCBDepthFrame",
        "KCBInfraredFrame",
        "KCBLongExposureInfraredFrame",
    ] {
        m.add(alias, py.get_type::<PyImageFrame>())?;
    }

    m.add("SensorUnavailableError", py.get_type::<SensorUnavailableError>())?;
    m.add("StaleBufferError", py.get_type::<StaleBufferError>())?;
    m.add("KCBError", py.get_type::<KCBError>())?;
    Ok(())
}
