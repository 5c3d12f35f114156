// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the sensor handle lifecycle

use kinect_bridge::backends::{EmulatedBridge, EmulatorConfig, KinectBridge, SecondOpenPolicy};
use kinect_bridge::errors::SensorError;
use kinect_bridge::ffi::{self, KCB_INVALID_HANDLE, KcbFrameDescription};
use kinect_bridge::sensor::{
    self, ColorFormat, FrameSource, Sensor, SensorHandle, SourceKind,
};
use std::sync::Arc;

fn emulated(config: EmulatorConfig) -> Arc<dyn KinectBridge> {
    Arc::new(EmulatedBridge::new(config))
}

fn detached() -> EmulatorConfig {
    EmulatorConfig {
        sensor_attached: false,
        ..Default::default()
    }
}

#[test]
fn test_open_returns_valid_handle() {
    let bridge = emulated(EmulatorConfig::default());
    let handle = sensor::open_default_sensor(bridge.as_ref());
    assert_ne!(
        handle.raw(),
        KCB_INVALID_HANDLE,
        "An attached sensor should never yield the sentinel"
    );
}

#[test]
fn test_open_without_sensor_returns_sentinel() {
    let bridge = emulated(detached());
    let handle = sensor::open_default_sensor(bridge.as_ref());
    assert_eq!(handle, SensorHandle::INVALID);

    let err = Sensor::open_default(bridge).unwrap_err();
    assert_eq!(err, SensorError::SensorUnavailable);
}

#[test]
fn test_close_resets_handle() {
    let bridge = emulated(EmulatorConfig::default());
    let mut handle = sensor::open_default_sensor(bridge.as_ref());

    let hr = sensor::close_sensor(bridge.as_ref(), &mut handle);
    assert_eq!(hr, ffi::S_OK);
    assert_eq!(handle.raw(), KCB_INVALID_HANDLE, "Close should reset the slot");
}

#[test]
fn test_close_sentinel_fails() {
    let bridge = emulated(EmulatorConfig::default());
    let mut handle = SensorHandle::INVALID;

    let hr = sensor::close_sensor(bridge.as_ref(), &mut handle);
    assert!(ffi::failed(hr), "Closing the sentinel should fail");
    assert_eq!(hr, ffi::E_INVALIDARG);
    assert_eq!(handle, SensorHandle::INVALID);
}

#[test]
fn test_double_close_fails() {
    let bridge = emulated(EmulatorConfig::default());
    let mut handle = sensor::open_default_sensor(bridge.as_ref());
    let stale = handle;

    assert_eq!(sensor::close_sensor(bridge.as_ref(), &mut handle), ffi::S_OK);

    // Closing a copy of the released value is answered, not honoured
    let mut copy = stale;
    assert_eq!(
        sensor::close_sensor(bridge.as_ref(), &mut copy),
        ffi::E_NOINTERFACE
    );
    assert_eq!(copy, SensorHandle::INVALID);
}

#[test]
fn test_handles_start_at_base() {
    let bridge = emulated(EmulatorConfig::default());
    let first = sensor::open_default_sensor(bridge.as_ref());
    let second = sensor::open_default_sensor(bridge.as_ref());
    assert_eq!(first.raw(), 0xE000);
    assert_eq!(second.raw(), 0xE001);
}

#[test]
fn test_handles_never_alias() {
    let bridge = emulated(EmulatorConfig::default());
    let first = sensor::open_default_sensor(bridge.as_ref());
    let second = sensor::open_default_sensor(bridge.as_ref());
    assert!(first.is_valid() && second.is_valid());
    assert_ne!(first, second, "Live handles must be distinct");

    let mut closing = first;
    sensor::close_sensor(bridge.as_ref(), &mut closing);
    let third = sensor::open_default_sensor(bridge.as_ref());
    assert_ne!(third, first, "A closed handle value is not reissued");
    assert_ne!(third, second);
}

#[test]
fn test_refuse_policy_blocks_second_open() {
    let bridge = emulated(EmulatorConfig {
        second_open: SecondOpenPolicy::Refuse,
        ..Default::default()
    });
    let mut first = sensor::open_default_sensor(bridge.as_ref());
    assert!(first.is_valid());
    assert!(!sensor::open_default_sensor(bridge.as_ref()).is_valid());

    sensor::close_sensor(bridge.as_ref(), &mut first);
    assert!(sensor::open_default_sensor(bridge.as_ref()).is_valid());
}

#[test]
fn test_sensor_appears_after_attempts() {
    let bridge = Arc::new(EmulatedBridge::new(EmulatorConfig {
        attach_after_attempts: 2,
        ..Default::default()
    }));
    assert!(!sensor::open_default_sensor(bridge.as_ref()).is_valid());
    assert!(!sensor::open_default_sensor(bridge.as_ref()).is_valid());
    assert!(sensor::open_default_sensor(bridge.as_ref()).is_valid());
    assert_eq!(bridge.open_attempts(), 3);
}

#[test]
fn test_sensor_close_consumes() {
    let emulator = Arc::new(EmulatedBridge::new(EmulatorConfig::default()));
    let sensor = Sensor::open_default(emulator.clone()).expect("sensor should open");
    assert_eq!(emulator.open_handles(), 1);

    sensor.close().expect("close should succeed");
    assert_eq!(emulator.open_handles(), 0);
}

#[test]
fn test_sensor_drop_closes() {
    let emulator = Arc::new(EmulatedBridge::new(EmulatorConfig::default()));
    {
        let _sensor = Sensor::open_default(emulator.clone()).expect("sensor should open");
        assert_eq!(emulator.open_handles(), 1);
    }
    assert_eq!(emulator.open_handles(), 0, "Drop should close the handle");
}

#[test]
fn test_description_failure_zeroes_struct() {
    let bridge = emulated(EmulatorConfig::default());
    let mut desc = KcbFrameDescription {
        width: 7,
        height: 7,
        horizontal_field_of_view: 1.0,
        vertical_field_of_view: 1.0,
        diagonal_field_of_view: 1.0,
        length_in_pixels: 49,
        bytes_per_pixel: 2,
    };

    let hr = bridge.frame_description(0x1234, FrameSource::Depth, &mut desc);
    assert!(ffi::failed(hr));
    assert_eq!(desc.width, 0);
    assert_eq!(desc.height, 0);
    assert_eq!(desc.length_in_pixels, 0);
    assert_eq!(desc.bytes_per_pixel, 0);
}

#[test]
fn test_color_description_rejects_none() {
    let bridge = emulated(EmulatorConfig::default());
    let handle = sensor::open_default_sensor(bridge.as_ref());
    let mut desc = KcbFrameDescription::default();

    let hr = bridge.color_frame_description(
        handle.raw(),
        ffi::COLOR_IMAGE_FORMAT_NONE,
        &mut desc,
    );
    assert_eq!(hr, ffi::E_INVALIDARG);
    assert_eq!(desc.length_in_pixels, 0);
}

#[test]
fn test_descriptions_match_runtime_geometry() {
    let sensor = Sensor::open_default(emulated(EmulatorConfig::default())).unwrap();

    let depth = sensor.frame_description(FrameSource::Depth).unwrap();
    assert_eq!((depth.width(), depth.height()), (512, 424));
    assert_eq!(depth.length_in_pixels(), 512 * 424);
    assert_eq!(depth.bytes_per_pixel(), 2);

    let body = sensor.frame_description(FrameSource::BodyIndex).unwrap();
    assert_eq!(body.bytes_per_pixel(), 1);

    let color = sensor
        .frame_description(FrameSource::Color(ColorFormat::Bgra))
        .unwrap();
    assert_eq!((color.width(), color.height()), (1920, 1080));
    assert_eq!(color.bytes_per_pixel(), 4);
}

#[test]
fn test_audio_format_is_float_mono() {
    let sensor = Sensor::open_default(emulated(EmulatorConfig::default())).unwrap();
    let format = sensor.audio_format().unwrap();
    assert!(format.is_ieee_float());
    assert_eq!(format.channels, 1);
    assert_eq!(format.samples_per_sec, 16_000);
    assert_eq!(format.bits_per_sample, 32);
}

#[test]
fn test_readiness_false_for_invalid_handle() {
    let bridge = emulated(EmulatorConfig::default());
    assert!(!bridge.is_frame_ready(KCB_INVALID_HANDLE, SourceKind::Depth.flag()));
    assert!(!bridge.any_frame_ready(KCB_INVALID_HANDLE));
    assert!(!bridge.all_frames_ready(KCB_INVALID_HANDLE));
}
