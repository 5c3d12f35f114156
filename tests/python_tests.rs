// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the `KCBv2Lib` Python module
//!
//! The module is built in-process with an embedded interpreter and driven
//! against the emulated bridge.

#![cfg(feature = "python")]

use kinect_bridge::backends::{EmulatedBridge, EmulatorConfig};
use kinect_bridge::constants::{DEPTH_HEIGHT, DEPTH_WIDTH};
use kinect_bridge::ffi::{self, KCB_INVALID_HANDLE};
use kinect_bridge::python::{self as kcb, SensorUnavailableError, StaleBufferError};
use pyo3::exceptions::PyBufferError;
use pyo3::prelude::*;
use std::sync::{Arc, Mutex, PoisonError};

const DEPTH_PIXELS: usize = (DEPTH_WIDTH * DEPTH_HEIGHT) as usize;

/// The module's bridge is process-wide, so tests take turns
static BRIDGE_LOCK: Mutex<()> = Mutex::new(());

fn with_module<F>(config: EmulatorConfig, test: F)
where
    F: for<'py> FnOnce(Python<'py>, &Bound<'py, PyModule>),
{
    let _guard = BRIDGE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    kcb::set_bridge(Arc::new(EmulatedBridge::new(config)));

    #[allow(deprecated)]
    pyo3::prepare_freethreaded_python();

    #[allow(deprecated)]
    Python::with_gil(|py| {
        let module = pyo3::wrap_pymodule!(kcb::kcbv2lib)(py);
        test(py, module.bind(py));
    });
}

fn open_sensor<'py>(module: &Bound<'py, PyModule>) -> Bound<'py, PyAny> {
    module
        .getattr("Sensor")
        .unwrap()
        .call_method0("open")
        .expect("emulated sensor should open")
}

#[test]
fn test_close_sensor_returns_status_and_slot() {
    with_module(EmulatorConfig::default(), |_py, module| {
        let handle: i32 = module
            .getattr("KCBOpenDefaultSensor")
            .unwrap()
            .call0()
            .unwrap()
            .extract()
            .unwrap();
        assert_eq!(handle, ffi::KCB_DEFAULT_HANDLE);

        let close = module.getattr("KCBCloseSensor").unwrap();
        let result: (i32, i32) = close.call1((handle,)).unwrap().extract().unwrap();
        assert_eq!(result, (ffi::S_OK, KCB_INVALID_HANDLE));

        // Closing the sentinel again reports the bad argument and keeps the slot
        let result: (i32, i32) = close.call1((result.1,)).unwrap().extract().unwrap();
        assert_eq!(result, (ffi::E_INVALIDARG, -1));
    });
}

#[test]
fn test_open_without_sensor_raises() {
    let config = EmulatorConfig {
        sensor_attached: false,
        ..Default::default()
    };
    with_module(config, |py, module| {
        let handle: i32 = module
            .getattr("KCBOpenDefaultSensor")
            .unwrap()
            .call0()
            .unwrap()
            .extract()
            .unwrap();
        assert_eq!(handle, KCB_INVALID_HANDLE);

        let err = module
            .getattr("Sensor")
            .unwrap()
            .call_method0("open")
            .unwrap_err();
        assert!(
            err.is_instance_of::<SensorUnavailableError>(py),
            "Expected SensorUnavailableError, got {err}"
        );
    });
}

#[test]
fn test_frame_description_uses_header_names() {
    with_module(EmulatorConfig::default(), |_py, module| {
        let sensor = open_sensor(module);
        let desc = sensor
            .call_method1("frame_description", ("depth",))
            .unwrap();

        let width: i32 = desc.getattr("width").unwrap().extract().unwrap();
        let length: u32 = desc.getattr("lengthInPixels").unwrap().extract().unwrap();
        let bpp: u32 = desc.getattr("bytesPerPixel").unwrap().extract().unwrap();
        let fov: f32 = desc
            .getattr("horizontalFieldOfView")
            .unwrap()
            .extract()
            .unwrap();

        assert_eq!(width, DEPTH_WIDTH);
        assert_eq!(length as usize, DEPTH_PIXELS);
        assert_eq!(bpp, 2);
        assert!(fov > 0.0);
        assert!(desc.is_instance(&module.getattr("KCBFrameDescription").unwrap()).unwrap());
    });
}

#[test]
fn test_stale_buffer_refuses_copy() {
    with_module(EmulatorConfig::default(), |py, module| {
        let sensor = open_sensor(module);
        let frame = sensor.call_method1("create_frame", ("depth",)).unwrap();
        assert!(frame.call_method0("buffer").unwrap().is_none());

        let acquired: bool = frame.call_method0("acquire").unwrap().extract().unwrap();
        assert!(acquired);
        let buffer = frame.call_method0("buffer").unwrap();
        let bytes: Vec<u8> = buffer.call_method0("tobytes").unwrap().extract().unwrap();
        assert_eq!(bytes.len(), DEPTH_PIXELS * 2);

        frame.call_method0("acquire").unwrap();
        let current: bool = buffer.call_method0("is_current").unwrap().extract().unwrap();
        assert!(!current);

        let err = buffer.call_method0("tobytes").unwrap_err();
        assert!(
            err.is_instance_of::<StaleBufferError>(py),
            "Expected StaleBufferError, got {err}"
        );
        let err = buffer.call_method0("view").unwrap_err();
        assert!(err.is_instance_of::<StaleBufferError>(py));
    });
}

#[test]
fn test_memoryview_shares_frame_memory() {
    with_module(EmulatorConfig::default(), |py, module| {
        let sensor = open_sensor(module);
        let frame = sensor.call_method1("create_frame", ("body_index",)).unwrap();
        frame.call_method0("acquire").unwrap();

        let view = frame.getattr("Buffer").unwrap();
        let readonly: bool = view.getattr("readonly").unwrap().extract().unwrap();
        assert!(readonly);
        assert_eq!(view.len().unwrap(), DEPTH_PIXELS);

        let copied = frame
            .call_method0("buffer")
            .unwrap()
            .call_method0("tobytes")
            .unwrap();
        let from_view = view.call_method0("tobytes").unwrap();
        assert!(from_view.eq(&copied).unwrap());

        // Re-acquiring under a live view would change its contents
        let err = frame.call_method0("acquire").unwrap_err();
        assert!(err.is_instance_of::<PyBufferError>(py));

        view.call_method0("release").unwrap();
        let acquired: bool = frame.call_method0("acquire").unwrap().extract().unwrap();
        assert!(acquired);
    });
}

#[test]
fn test_frame_fields_and_aliases() {
    with_module(EmulatorConfig::default(), |_py, module| {
        let sensor = open_sensor(module);
        let frame = sensor.call_method1("create_frame", ("infrared",)).unwrap();
        assert!(frame.getattr("Buffer").unwrap().is_none());
        frame.call_method0("acquire").unwrap();

        let size: usize = frame.getattr("Size").unwrap().extract().unwrap();
        let stamp: i64 = frame.getattr("TimeStamp").unwrap().extract().unwrap();
        assert_eq!(size, DEPTH_PIXELS);
        assert!(stamp > 0);

        let class = module.getattr("KCBFrame").unwrap();
        for alias in ["KCBBodyIndexFrame", "KCBColorFrame", "KCBDepthFrame", "KCBInfraredFrame"] {
            assert_eq!(module.getattr(alias).unwrap().as_ptr(), class.as_ptr());
        }
        assert!(frame.is_instance(&class).unwrap());
    });
}

#[test]
fn test_audio_frame_fields() {
    with_module(EmulatorConfig::default(), |_py, module| {
        let sensor = open_sensor(module);
        let audio = sensor.call_method1("read_audio", (256u32,)).unwrap();

        let capacity: usize = audio.getattr("cAudioBufferSize").unwrap().extract().unwrap();
        let read: usize = audio.getattr("ulBytesRead").unwrap().extract().unwrap();
        let samples: Vec<u8> = audio.getattr("pAudioBuffer").unwrap().extract().unwrap();
        let confidence: f32 = audio
            .getattr("fBeamAngleConfidence")
            .unwrap()
            .extract()
            .unwrap();

        assert_eq!(capacity, 256);
        assert_eq!(read, 256);
        assert_eq!(samples.len(), read);
        assert!((0.0..=1.0).contains(&confidence));

        sensor.call_method0("close").unwrap();
    });
}
